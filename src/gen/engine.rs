//! The random-walk engine.
//!
//! Each step draws a transaction kind, computes its quantities from the current [`Portfolio`],
//! appends it, and updates the portfolio in the same call. Steps that cannot be satisfied
//! (nothing to withdraw, nothing to transfer) are retried with a fresh kind and never counted.

use crate::gen::config::{SimConfig, SimConfigError};
use crate::gen::values;
use crate::model::transaction::{
    RampTransaction, TradeTransaction, Transaction, TransactionType, TransferTransaction,
};
use crate::model::{Portfolio, PortfolioError, Stats};
use chrono::{DateTime, SubsecRound as _, Utc};
use rand::Rng;
use rust_decimal::{Decimal, RoundingStrategy};
use std::ops::RangeInclusive;
use thiserror::Error;
use tracing::{debug, trace};

/// Fiat quantities are kept to cents.
pub const FIAT_DIGITS: u32 = 2;
pub const TOKEN_DIGITS: u32 = 12;
pub const PRICE_DIGITS: u32 = 12;

/// Floor for drifting prices, so a long losing streak never reaches zero.
const MIN_UNIT_PRICE: Decimal = Decimal::from_parts(1, 0, 0, false, PRICE_DIGITS);

/// Number of steps drawn when the caller does not ask for a specific count.
pub const DEFAULT_TARGET_RANGE: RangeInclusive<usize> = 49..=999;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Invalid random configuration")]
    Config(#[from] SimConfigError),

    #[error("Portfolio accounting error")]
    Portfolio(#[from] PortfolioError),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StepOutcome {
    Accepted,

    /// Nothing was emitted and the portfolio is unchanged.
    Skipped,
}

/// Generate a complete history: one seed deposit followed by `target` steps.
///
/// `start` defaults to the current time truncated to whole seconds. `target` defaults to a
/// random count in [`DEFAULT_TARGET_RANGE`].
pub fn generate_history<R: Rng>(
    mut rng: R,
    config: &SimConfig,
    start: Option<DateTime<Utc>>,
    target: Option<usize>,
) -> Result<Vec<Transaction>, SimulationError> {
    let target = target.unwrap_or_else(|| rng.gen_range(DEFAULT_TARGET_RANGE));
    let start = start.unwrap_or_else(|| Utc::now().trunc_subsecs(0));

    let mut sim = Simulator::new(rng, config.clone(), start)?;
    sim.run(target)?;

    Ok(sim.into_transactions())
}

#[derive(Debug)]
pub struct Simulator<R> {
    rng: R,
    config: SimConfig,
    portfolio: Portfolio,
    transactions: Vec<Transaction>,
    last_dt: DateTime<Utc>,
    stats: Stats,
}

impl<R: Rng> Simulator<R> {
    /// Choose the run's fiat currency and emit the unconditional seed deposit at `start`.
    pub fn new(
        mut rng: R,
        config: SimConfig,
        start: DateTime<Utc>,
    ) -> Result<Self, SimulationError> {
        let (fiat_currency, fiat_exchange_rate) = values::fiat_currency(&mut rng);
        debug!("Simulating in {fiat_currency} at {fiat_exchange_rate} per USD");

        let portfolio = Portfolio::new(fiat_currency, fiat_exchange_rate);
        let mut sim = Self::from_portfolio(rng, config, portfolio, start)?;
        sim.deposit(start)?;

        Ok(sim)
    }

    /// Continue from an existing portfolio without a seed deposit. The next transaction will be
    /// timestamped after `last_dt`.
    pub fn from_portfolio(
        rng: R,
        config: SimConfig,
        portfolio: Portfolio,
        last_dt: DateTime<Utc>,
    ) -> Result<Self, SimulationError> {
        config.validate()?;

        Ok(Self {
            rng,
            config,
            portfolio,
            transactions: Vec::new(),
            last_dt,
            stats: Stats::default(),
        })
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn into_transactions(self) -> Vec<Transaction> {
        self.transactions
    }

    /// Advance until `target` steps have been counted.
    pub fn run(&mut self, target: usize) -> Result<(), SimulationError> {
        self.portfolio.target_transaction_count = target;

        while self.portfolio.transactions_generated < self.portfolio.target_transaction_count {
            self.advance()?;
        }

        Ok(())
    }

    /// One counted step with a randomly drawn kind.
    pub fn advance(&mut self) -> Result<&Transaction, SimulationError> {
        let kind = self.config.weights.choose(&mut self.rng);

        self.advance_as(kind)
    }

    /// One counted step, attempting `kind` first. A skipped attempt redraws the timestamp and the
    /// kind until some transaction is accepted.
    pub fn advance_as(&mut self, kind: TransactionType) -> Result<&Transaction, SimulationError> {
        let mut kind = kind;
        let mut accepted = false;

        while !accepted {
            let dt = values::next_dt(&mut self.rng, self.last_dt);
            accepted = self.step(kind, dt)? == StepOutcome::Accepted;

            if !accepted {
                trace!("Skipped {kind} at {dt}");
                self.stats.inc_skipped();
                kind = self.config.weights.choose(&mut self.rng);
            }
        }
        self.portfolio.transactions_generated += 1;

        // `step` pushes exactly one transaction when accepted.
        Ok(&self.transactions[self.transactions.len() - 1])
    }

    /// Attempt a single transaction of `kind` at `dt`. Does not touch the step counter.
    pub fn step(
        &mut self,
        kind: TransactionType,
        dt: DateTime<Utc>,
    ) -> Result<StepOutcome, SimulationError> {
        match kind {
            TransactionType::Deposit => self.deposit(dt),
            TransactionType::Withdraw => self.withdraw(dt),
            TransactionType::Trade => self.trade(dt),
            TransactionType::Transfer => self.transfer(dt),
        }
    }

    fn emit(&mut self, tx: Transaction) {
        debug!("Generated: {tx:?}");

        self.stats.inc(tx.kind());
        self.last_dt = tx.dt();
        self.transactions.push(tx);
    }

    fn deposit(&mut self, dt: DateTime<Utc>) -> Result<StepOutcome, SimulationError> {
        let amount = values::ramp_amount(&mut self.rng, self.config.max_ramp_amount);

        self.ramp(TransactionType::Deposit, dt, amount)
    }

    fn withdraw(&mut self, dt: DateTime<Utc>) -> Result<StepOutcome, SimulationError> {
        let balance = self.portfolio.fiat_balance();
        if balance.is_zero() {
            return Ok(StepOutcome::Skipped);
        }
        let amount = values::ramp_amount(&mut self.rng, self.config.max_ramp_amount).min(balance);

        self.ramp(TransactionType::Withdraw, dt, amount)
    }

    fn ramp(
        &mut self,
        kind: TransactionType,
        dt: DateTime<Utc>,
        amount: Decimal,
    ) -> Result<StepOutcome, SimulationError> {
        // TODO: Withdrawals should come from an exchange that actually holds fiat. Exchanges are
        // not tracked per balance yet, so any centralized exchange is picked.
        let ramp = RampTransaction {
            dt,
            exchange: Some(values::cex(&mut self.rng)),
            receive_qty: amount,
            receive_token: self.portfolio.fiat_currency().to_string(),
            fee_1x_fiat: None,
        };

        self.portfolio.apply_fiat_delta(amount, kind)?;
        self.emit(match kind {
            TransactionType::Withdraw => Transaction::Withdraw(ramp),
            _ => Transaction::Deposit(ramp),
        });

        Ok(StepOutcome::Accepted)
    }

    fn trade(&mut self, dt: DateTime<Utc>) -> Result<StepOutcome, SimulationError> {
        let fiat_balance = self.portfolio.fiat_balance();

        // Nothing to sell. Fund the account instead.
        if fiat_balance.is_zero() && !self.portfolio.has_holdings() {
            self.stats.inc_bootstrap();
            return self.deposit(dt);
        }

        let fee_percentage = values::fee_percentage(&mut self.rng);
        let swap_percentage = values::swap_percentage(&mut self.rng);
        let price_delta = values::price_delta(&mut self.rng);

        // Fiat is always spent first. A share that rounds away to nothing spends everything.
        let sells_fiat = fiat_balance > Decimal::ZERO;
        let (sent_token, sent_qty, sent_1x_fiat) = if sells_fiat {
            let sent_qty = round_down(fiat_balance * swap_percentage, FIAT_DIGITS);

            (
                self.portfolio.fiat_currency().to_string(),
                if sent_qty.is_zero() { fiat_balance } else { sent_qty },
                Decimal::ONE,
            )
        } else {
            let held = self.portfolio.held_tokens();
            let symbol = held[self.rng.gen_range(0..held.len())].to_string();
            let holding = self
                .portfolio
                .holding(&symbol)
                .ok_or_else(|| PortfolioError::UnknownToken(symbol.clone()))?;

            let sent_qty = match round_down(holding.quantity * swap_percentage, TOKEN_DIGITS) {
                qty if qty.is_zero() => holding.quantity,
                qty => qty,
            };
            let sent_1x_fiat = unit_price(holding.last_unit_price * price_delta);
            (symbol, sent_qty, sent_1x_fiat)
        };

        let receive_token = if sells_fiat {
            self.choose_stable_token()
        } else {
            self.choose_token(&sent_token)
        };

        // Held assets keep their price. New ones are priced in the run's fiat.
        let rate = self.portfolio.fiat_exchange_rate();
        let receive_1x_fiat = match self.portfolio.holding(&receive_token) {
            _ if receive_token == sent_token => sent_1x_fiat,
            Some(holding) => holding.last_unit_price,
            None if sells_fiat => rate,
            None => unit_price(values::token_price(&mut self.rng) * rate),
        };

        let gross_qty = if receive_token == sent_token {
            sent_qty
        } else {
            round_down(sent_qty * sent_1x_fiat / receive_1x_fiat, TOKEN_DIGITS)
        };
        let fees = round_down(gross_qty * fee_percentage, TOKEN_DIGITS);
        let receive_qty = gross_qty - fees;

        let (fee_currency, fee_1x_fiat) = if self.rng.gen_bool(0.5) {
            (sent_token.clone(), sent_1x_fiat)
        } else {
            (receive_token.clone(), receive_1x_fiat)
        };
        let exchange = values::option(&mut self.rng, values::exchange);

        self.portfolio
            .apply_token_receipt(&receive_token, receive_qty, receive_1x_fiat);
        if sells_fiat {
            self.portfolio
                .apply_fiat_delta(sent_qty, TransactionType::Withdraw)?;
        } else {
            self.portfolio.apply_token_spend(&sent_token, sent_qty)?;
            self.portfolio.reprice_token(&sent_token, sent_1x_fiat)?;
        }

        self.emit(Transaction::Trade(TradeTransaction {
            dt,
            exchange,
            receive_qty,
            receive_token,
            receive_1x_fiat,
            sent_qty,
            sent_token,
            sent_1x_fiat,
            fees,
            fee_currency,
            fee_1x_fiat,
        }));

        Ok(StepOutcome::Accepted)
    }

    fn transfer(&mut self, dt: DateTime<Utc>) -> Result<StepOutcome, SimulationError> {
        let held = self.portfolio.held_tokens();
        if held.is_empty() {
            return Ok(StepOutcome::Skipped);
        }

        let token = held[self.rng.gen_range(0..held.len())].to_string();
        let holding = self
            .portfolio
            .holding(&token)
            .cloned()
            .ok_or_else(|| PortfolioError::UnknownToken(token.clone()))?;

        let from_qty = round_down(
            holding.quantity * values::transfer_percentage(&mut self.rng),
            TOKEN_DIGITS,
        );
        let fees = round_down(
            from_qty * values::fee_percentage(&mut self.rng),
            TOKEN_DIGITS,
        );
        let to_qty = from_qty - fees;
        let price_delta = values::price_delta(&mut self.rng);
        let token_1x_fiat = unit_price(holding.last_unit_price * price_delta);

        let from_exchange = values::option(&mut self.rng, values::exchange);
        let to_exchange = values::option(&mut self.rng, values::exchange);

        // Both legs stay in the portfolio. Only the fee leaves it.
        self.portfolio.reprice_token(&token, token_1x_fiat)?;
        self.portfolio.apply_token_spend(&token, fees)?;

        self.emit(Transaction::Transfer(TransferTransaction {
            dt,
            from_exchange,
            to_exchange,
            from_qty,
            to_qty,
            token,
            token_1x_fiat,
            fees,
            fee_1x_fiat: token_1x_fiat,
        }));

        Ok(StepOutcome::Accepted)
    }

    fn cap_reached(&self) -> bool {
        self.config
            .max_distinct_tokens
            .is_some_and(|cap| self.portfolio.tracked_tokens().len() >= cap)
    }

    /// Receive side when fiat is sold. Once the cap is reached, tracked stable tokens are reused,
    /// or any tracked token when none of them is stable.
    fn choose_stable_token(&mut self) -> String {
        if !self.cap_reached() {
            return values::stable_token(&mut self.rng);
        }

        let tracked = self.portfolio.tracked_tokens();
        let stables: Vec<_> = tracked
            .iter()
            .copied()
            .filter(|symbol| values::STABLE_TOKENS.contains(symbol))
            .collect();
        let candidates = if stables.is_empty() { &tracked } else { &stables };

        candidates[self.rng.gen_range(0..candidates.len())].to_string()
    }

    /// Receive side when a token is sold. Once the cap is reached only tracked symbols are
    /// eligible, preferring any other than `sent`. When `sent` is the only one, the trade swaps it
    /// into itself.
    fn choose_token(&mut self, sent: &str) -> String {
        if !self.cap_reached() {
            return values::token(&mut self.rng, Some(sent));
        }

        let candidates: Vec<_> = self
            .portfolio
            .tracked_tokens()
            .into_iter()
            .filter(|&symbol| symbol != sent)
            .collect();
        if candidates.is_empty() {
            return sent.to_string();
        }

        candidates[self.rng.gen_range(0..candidates.len())].to_string()
    }
}

/// Truncate toward zero, so a derived quantity never exceeds what it was derived from.
fn round_down(value: Decimal, digits: u32) -> Decimal {
    value.round_dp_with_strategy(digits, RoundingStrategy::ToZero)
}

fn unit_price(value: Decimal) -> Decimal {
    value.round_dp(PRICE_DIGITS).max(MIN_UNIT_PRICE)
}
