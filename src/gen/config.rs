use crate::gen::values::{DEFAULT_MAX_RAMP_AMOUNT, MAX_RAMP_AMOUNT, MIN_RAMP_AMOUNT};
use crate::model::transaction::TransactionType;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use thiserror::Error;

/// Resolution of the uniform draw used to pick a transaction kind.
const KIND_DRAW_UNITS: i64 = 1_000_000;
const KIND_DRAW_DIGITS: u32 = 6;

/// Invalid random configuration.
#[derive(Debug, Error)]
pub enum SimConfigError {
    #[error("Weight for {0} is negative")]
    NegativeWeight(TransactionType),

    #[error("Transaction kind weights sum to {0}, expected 1")]
    WeightSum(Decimal),

    #[error("Deposit and trade weights are both zero, the run could never fund itself")]
    NoFunding,

    #[error("Distinct token cap must be at least 1")]
    TokenCap,

    #[error(
        "Maximum ramp amount {0} is outside of [{min}, {max}]",
        min = MIN_RAMP_AMOUNT,
        max = MAX_RAMP_AMOUNT,
    )]
    MaxRampAmount(Decimal),

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("RON parsing error")]
    Parse(#[from] ron::de::SpannedError),
}

/// Probability of each transaction kind per step. Must sum to exactly 1.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct KindWeights {
    pub deposit: Decimal,
    pub withdraw: Decimal,
    pub trade: Decimal,
    pub transfer: Decimal,
}

impl Default for KindWeights {
    fn default() -> Self {
        Self {
            deposit: Decimal::new(5, 2),
            withdraw: Decimal::new(5, 2),
            trade: Decimal::new(70, 2),
            transfer: Decimal::new(20, 2),
        }
    }
}

impl KindWeights {
    /// Every step picks `kind`.
    pub fn only(kind: TransactionType) -> Self {
        let mut weights = Self {
            deposit: Decimal::ZERO,
            withdraw: Decimal::ZERO,
            trade: Decimal::ZERO,
            transfer: Decimal::ZERO,
        };
        *weights.get_mut(kind) = Decimal::ONE;
        weights
    }

    pub fn get(&self, kind: TransactionType) -> Decimal {
        match kind {
            TransactionType::Deposit => self.deposit,
            TransactionType::Withdraw => self.withdraw,
            TransactionType::Trade => self.trade,
            TransactionType::Transfer => self.transfer,
        }
    }

    fn get_mut(&mut self, kind: TransactionType) -> &mut Decimal {
        match kind {
            TransactionType::Deposit => &mut self.deposit,
            TransactionType::Withdraw => &mut self.withdraw,
            TransactionType::Trade => &mut self.trade,
            TransactionType::Transfer => &mut self.transfer,
        }
    }

    pub fn validate(&self) -> Result<(), SimConfigError> {
        for kind in TransactionType::ALL {
            if self.get(kind) < Decimal::ZERO {
                return Err(SimConfigError::NegativeWeight(kind));
            }
        }

        let sum: Decimal = TransactionType::ALL.into_iter().map(|kind| self.get(kind)).sum();
        if sum != Decimal::ONE {
            return Err(SimConfigError::WeightSum(sum));
        }

        // Withdrawals and transfers are skipped without funds, so one of these must be drawable.
        if (self.deposit + self.trade).is_zero() {
            return Err(SimConfigError::NoFunding);
        }

        Ok(())
    }

    /// `(kind, cumulative weight)` in declaration order. The last entry is always 1.
    pub fn cumulative(&self) -> [(TransactionType, Decimal); 4] {
        let mut total = Decimal::ZERO;

        TransactionType::ALL.map(|kind| {
            total += self.get(kind);
            (kind, total)
        })
    }

    /// Pick a kind against a single uniform draw in `[0, 1)`.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> TransactionType {
        let draw = Decimal::new(rng.gen_range(0..KIND_DRAW_UNITS), KIND_DRAW_DIGITS);

        self.pick(draw)
    }

    fn pick(&self, draw: Decimal) -> TransactionType {
        let table = self.cumulative();

        table
            .iter()
            .find(|(_, cumulative)| draw < *cumulative)
            .map(|(kind, _)| *kind)
            // Only reachable for a table that fails validation.
            .unwrap_or(table[table.len() - 1].0)
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct SimConfig {
    pub weights: KindWeights,

    /// Upper bound for a single deposit or withdrawal, in fiat.
    pub max_ramp_amount: Decimal,

    /// Maximum number of distinct token symbols introduced in one run. `None` is unbounded.
    pub max_distinct_tokens: Option<usize>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            weights: KindWeights::default(),
            max_ramp_amount: DEFAULT_MAX_RAMP_AMOUNT,
            max_distinct_tokens: Some(10),
        }
    }
}

impl SimConfig {
    /// Read a config from a RON file. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SimConfigError> {
        let config: Self = ron::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SimConfigError> {
        self.weights.validate()?;

        if self.max_distinct_tokens == Some(0) {
            return Err(SimConfigError::TokenCap);
        }
        if !(MIN_RAMP_AMOUNT..=MAX_RAMP_AMOUNT).contains(&self.max_ramp_amount) {
            return Err(SimConfigError::MaxRampAmount(self.max_ramp_amount));
        }

        Ok(())
    }
}
