use crate::util::period::GetDateTime;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::{fmt, str::FromStr};
use thiserror::Error;

/// The `type` tag did not name any known transaction kind.
#[derive(Debug, Error, Eq, PartialEq)]
#[error("Unknown transaction type `{0}`")]
pub struct UnknownTransactionKind(pub String);

#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum TransactionType {
    Deposit,
    Withdraw,
    Trade,
    Transfer,
}

impl TransactionType {
    pub const ALL: [Self; 4] = [Self::Deposit, Self::Withdraw, Self::Trade, Self::Transfer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "DEPOSIT",
            Self::Withdraw => "WITHDRAW",
            Self::Trade => "TRADE",
            Self::Transfer => "TRANSFER",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = UnknownTransactionKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownTransactionKind(s.to_string()))
    }
}

/// Fiat on-ramp or off-ramp. The variant in [`Transaction`] decides the direction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RampTransaction {
    pub dt: DateTime<Utc>,
    pub exchange: Option<String>,
    pub receive_qty: Decimal,
    pub receive_token: String, // Fiat currency code
    pub fee_1x_fiat: Option<Decimal>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TradeTransaction {
    pub dt: DateTime<Utc>,
    pub exchange: Option<String>,

    pub receive_qty: Decimal,
    pub receive_token: String,
    pub receive_1x_fiat: Decimal,

    pub sent_qty: Decimal,
    pub sent_token: String,
    pub sent_1x_fiat: Decimal,

    pub fees: Decimal,
    pub fee_currency: String, // Either `sent_token` or `receive_token`
    pub fee_1x_fiat: Decimal,
}

/// A single token moving between two venues. `to_qty` is `from_qty` less `fees`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransferTransaction {
    pub dt: DateTime<Utc>,
    pub from_exchange: Option<String>,
    pub to_exchange: Option<String>,
    pub from_qty: Decimal,
    pub to_qty: Decimal,
    pub token: String,
    pub token_1x_fiat: Decimal,
    pub fees: Decimal,
    pub fee_1x_fiat: Decimal,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Transaction {
    Deposit(RampTransaction),
    Withdraw(RampTransaction),
    Trade(TradeTransaction),
    Transfer(TransferTransaction),
}

impl Transaction {
    pub fn dt(&self) -> DateTime<Utc> {
        match self {
            Self::Deposit(ramp) | Self::Withdraw(ramp) => ramp.dt,
            Self::Trade(trade) => trade.dt,
            Self::Transfer(transfer) => transfer.dt,
        }
    }

    pub fn kind(&self) -> TransactionType {
        match self {
            Self::Deposit(_) => TransactionType::Deposit,
            Self::Withdraw(_) => TransactionType::Withdraw,
            Self::Trade(_) => TransactionType::Trade,
            Self::Transfer(_) => TransactionType::Transfer,
        }
    }
}

impl GetDateTime for Transaction {
    fn get_dt(&self) -> DateTime<Utc> {
        self.dt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_type_strings() {
        for kind in TransactionType::ALL {
            assert_eq!(kind.as_str().parse::<TransactionType>(), Ok(kind));
        }

        assert_eq!(
            "FOO".parse::<TransactionType>(),
            Err(UnknownTransactionKind("FOO".to_string())),
        );
        // Tags are case sensitive.
        assert!("trade".parse::<TransactionType>().is_err());
    }
}
