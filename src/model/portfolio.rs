use crate::model::transaction::TransactionType;
use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum PortfolioError {
    #[error("Withdrawal of {amount} exceeds fiat balance {balance}")]
    Overdraft { amount: Decimal, balance: Decimal },

    #[error("Spending {amount} {symbol} exceeds holding of {quantity}")]
    InsufficientTokens {
        symbol: String,
        amount: Decimal,
        quantity: Decimal,
    },

    #[error("Token {0} has never been received")]
    UnknownToken(String),

    #[error("Negative amount {0}")]
    NegativeAmount(Decimal),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TokenHolding {
    pub quantity: Decimal,

    /// Fiat-equivalent price of one unit, as last observed. Never averaged.
    pub last_unit_price: Decimal,
}

/// Running state of one simulation.
///
/// Entries in the token bag are created on first receipt and never removed, even when their
/// quantity drops to zero.
#[derive(Clone, Debug)]
pub struct Portfolio {
    fiat_balance: Decimal,
    fiat_currency: String,
    fiat_exchange_rate: Decimal,
    tokens: HashMap<String, TokenHolding>,

    pub(crate) transactions_generated: usize,
    pub(crate) target_transaction_count: usize,
}

impl Portfolio {
    pub fn new(fiat_currency: impl Into<String>, fiat_exchange_rate: Decimal) -> Self {
        Self {
            fiat_balance: Decimal::ZERO,
            fiat_currency: fiat_currency.into(),
            fiat_exchange_rate,
            tokens: HashMap::new(),
            transactions_generated: 0,
            target_transaction_count: 0,
        }
    }

    pub fn fiat_balance(&self) -> Decimal {
        self.fiat_balance
    }

    pub fn fiat_currency(&self) -> &str {
        &self.fiat_currency
    }

    pub fn fiat_exchange_rate(&self) -> Decimal {
        self.fiat_exchange_rate
    }

    pub fn transactions_generated(&self) -> usize {
        self.transactions_generated
    }

    pub fn target_transaction_count(&self) -> usize {
        self.target_transaction_count
    }

    pub fn holding(&self, symbol: &str) -> Option<&TokenHolding> {
        self.tokens.get(symbol)
    }

    pub fn tokens(&self) -> impl Iterator<Item = (&str, &TokenHolding)> {
        self.tokens.iter().map(|(symbol, holding)| (symbol.as_str(), holding))
    }

    /// Every symbol ever received, sorted so that random picks are reproducible from a seed.
    pub fn tracked_tokens(&self) -> Vec<&str> {
        let mut symbols: Vec<_> = self.tokens.keys().map(String::as_str).collect();
        symbols.sort_unstable();
        symbols
    }

    /// Symbols with a positive quantity, sorted.
    pub fn held_tokens(&self) -> Vec<&str> {
        let mut symbols: Vec<_> = self
            .tokens
            .iter()
            .filter(|(_, holding)| holding.quantity > Decimal::ZERO)
            .map(|(symbol, _)| symbol.as_str())
            .collect();
        symbols.sort_unstable();
        symbols
    }

    pub fn has_holdings(&self) -> bool {
        self.tokens
            .values()
            .any(|holding| holding.quantity > Decimal::ZERO)
    }

    /// Withdrawals subtract from the fiat balance, every other kind adds to it.
    pub fn apply_fiat_delta(
        &mut self,
        amount: Decimal,
        kind: TransactionType,
    ) -> Result<(), PortfolioError> {
        if amount < Decimal::ZERO {
            return Err(PortfolioError::NegativeAmount(amount));
        }

        if kind == TransactionType::Withdraw {
            if amount > self.fiat_balance {
                return Err(PortfolioError::Overdraft {
                    amount,
                    balance: self.fiat_balance,
                });
            }
            self.fiat_balance -= amount;
        } else {
            self.fiat_balance += amount;
        }

        Ok(())
    }

    /// Add `quantity` to the holding, creating it if unseen. The price always becomes
    /// `unit_price`.
    pub fn apply_token_receipt(&mut self, symbol: &str, quantity: Decimal, unit_price: Decimal) {
        self.tokens
            .entry(symbol.to_string())
            .and_modify(|holding| {
                holding.quantity += quantity;
                holding.last_unit_price = unit_price;
            })
            .or_insert(TokenHolding {
                quantity,
                last_unit_price: unit_price,
            });
    }

    pub fn apply_token_spend(
        &mut self,
        symbol: &str,
        amount: Decimal,
    ) -> Result<(), PortfolioError> {
        if amount < Decimal::ZERO {
            return Err(PortfolioError::NegativeAmount(amount));
        }

        let holding = self
            .tokens
            .get_mut(symbol)
            .ok_or_else(|| PortfolioError::UnknownToken(symbol.to_string()))?;
        if amount > holding.quantity {
            return Err(PortfolioError::InsufficientTokens {
                symbol: symbol.to_string(),
                amount,
                quantity: holding.quantity,
            });
        }
        holding.quantity -= amount;

        Ok(())
    }

    pub fn reprice_token(
        &mut self,
        symbol: &str,
        unit_price: Decimal,
    ) -> Result<(), PortfolioError> {
        let holding = self
            .tokens
            .get_mut(symbol)
            .ok_or_else(|| PortfolioError::UnknownToken(symbol.to_string()))?;
        holding.last_unit_price = unit_price;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn fiat_delta_direction() {
        let mut portfolio = Portfolio::new("EUR", dec("0.9312"));

        portfolio.apply_fiat_delta(dec("100.50"), TransactionType::Deposit).unwrap();
        portfolio.apply_fiat_delta(dec("20"), TransactionType::Trade).unwrap();
        portfolio.apply_fiat_delta(dec("0.50"), TransactionType::Withdraw).unwrap();
        assert_eq!(portfolio.fiat_balance(), dec("120"));

        let err = portfolio
            .apply_fiat_delta(dec("120.01"), TransactionType::Withdraw)
            .unwrap_err();
        assert_eq!(
            err,
            PortfolioError::Overdraft {
                amount: dec("120.01"),
                balance: dec("120"),
            },
        );
        // Rejected withdrawals leave the balance untouched.
        assert_eq!(portfolio.fiat_balance(), dec("120"));

        portfolio.apply_fiat_delta(dec("120"), TransactionType::Withdraw).unwrap();
        assert!(portfolio.fiat_balance().is_zero());
    }

    #[test]
    fn token_receipt_last_price_wins() {
        let mut portfolio = Portfolio::new("USD", Decimal::ONE);

        portfolio.apply_token_receipt("ABC", dec("2"), dec("10"));
        portfolio.apply_token_receipt("ABC", dec("3"), dec("30"));

        let holding = portfolio.holding("ABC").unwrap();
        assert_eq!(holding.quantity, dec("5"));
        // Not the volume-weighted 22.
        assert_eq!(holding.last_unit_price, dec("30"));
    }

    #[test]
    fn token_spend_is_bounded() {
        let mut portfolio = Portfolio::new("USD", Decimal::ONE);
        portfolio.apply_token_receipt("XYZ", dec("1.5"), dec("4"));

        assert!(matches!(
            portfolio.apply_token_spend("XYZ", dec("1.6")),
            Err(PortfolioError::InsufficientTokens { .. }),
        ));
        assert!(matches!(
            portfolio.apply_token_spend("NOPE", dec("1")),
            Err(PortfolioError::UnknownToken(_)),
        ));

        portfolio.apply_token_spend("XYZ", dec("1.5")).unwrap();

        // Emptied holdings stay tracked but no longer count as held.
        assert!(portfolio.holding("XYZ").unwrap().quantity.is_zero());
        assert_eq!(portfolio.tracked_tokens(), ["XYZ"]);
        assert!(portfolio.held_tokens().is_empty());
        assert!(!portfolio.has_holdings());
    }

    #[test]
    fn held_tokens_are_sorted() {
        let mut portfolio = Portfolio::new("USD", Decimal::ONE);
        for symbol in ["QRS", "ABC", "MNOP"] {
            portfolio.apply_token_receipt(symbol, Decimal::ONE, Decimal::ONE);
        }

        assert_eq!(portfolio.held_tokens(), ["ABC", "MNOP", "QRS"]);
    }
}
