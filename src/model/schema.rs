//! Structural validation of decoded CSV rows.
//!
//! The decoder collects the non-empty values of a row under camelCase labels, then hands them to
//! one of the per-variant schemas below. The first failing field aborts validation.

use crate::model::transaction::{
    RampTransaction, TradeTransaction, TransactionType, TransferTransaction,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use std::{collections::BTreeMap, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq)]
#[error("`{field}` {reason}")]
pub struct SchemaError {
    pub field: &'static str,
    pub reason: SchemaReason,
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum SchemaReason {
    #[error("is required")]
    Missing,

    #[error("is not a timestamp: {0:?}")]
    Timestamp(String),

    #[error("is not a decimal: {0:?}")]
    Decimal(String),

    #[error("must be positive, found {0}")]
    NotPositive(Decimal),

    #[error("must not be negative, found {0}")]
    Negative(Decimal),

    #[error("must be one of {expected:?}, found {found:?}")]
    Kind {
        expected: &'static [TransactionType],
        found: String,
    },
}

#[derive(Copy, Clone, Debug)]
enum Sign {
    Positive,
    NonNegative,
}

/// Labelled field values of one row. Empty values are never stored.
#[derive(Debug, Default)]
pub struct Fields<'a> {
    values: BTreeMap<&'static str, &'a str>,
}

impl<'a> Fields<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert. `None` and blank values are dropped.
    pub fn with(mut self, label: &'static str, value: Option<&'a str>) -> Self {
        self.insert(label, value);
        self
    }

    pub fn insert(&mut self, label: &'static str, value: Option<&'a str>) {
        if let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) {
            self.values.insert(label, value);
        }
    }

    pub fn get(&self, label: &'static str) -> Option<&'a str> {
        self.values.get(label).copied()
    }

    fn required(&self, label: &'static str) -> Result<&'a str, SchemaError> {
        self.get(label).ok_or(SchemaError {
            field: label,
            reason: SchemaReason::Missing,
        })
    }

    fn text(&self, label: &'static str) -> Result<String, SchemaError> {
        self.required(label).map(str::to_string)
    }

    fn optional_text(&self, label: &'static str) -> Option<String> {
        self.get(label).map(str::to_string)
    }

    fn timestamp(&self, label: &'static str) -> Result<DateTime<Utc>, SchemaError> {
        let value = self.required(label)?;

        parse_timestamp(value).ok_or_else(|| SchemaError {
            field: label,
            reason: SchemaReason::Timestamp(value.to_string()),
        })
    }

    fn kind(
        &self,
        label: &'static str,
        expected: &'static [TransactionType],
    ) -> Result<TransactionType, SchemaError> {
        let value = self.required(label)?;

        TransactionType::from_str(value)
            .ok()
            .filter(|kind| expected.contains(kind))
            .ok_or_else(|| SchemaError {
                field: label,
                reason: SchemaReason::Kind {
                    expected,
                    found: value.to_string(),
                },
            })
    }

    fn decimal(&self, label: &'static str, sign: Sign) -> Result<Decimal, SchemaError> {
        let value = self.required(label)?;
        parse_decimal(label, value, sign)
    }

    fn optional_decimal(
        &self,
        label: &'static str,
        sign: Sign,
    ) -> Result<Option<Decimal>, SchemaError> {
        self.get(label)
            .map(|value| parse_decimal(label, value, sign))
            .transpose()
    }
}

/// Accepts RFC 3339 (what the encoder writes) and the `%F %T` form used by exchange exports,
/// which is taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%F %T").map(|dt| dt.and_utc()))
        .ok()
}

fn parse_decimal(label: &'static str, value: &str, sign: Sign) -> Result<Decimal, SchemaError> {
    let decimal = Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .map_err(|_| SchemaError {
            field: label,
            reason: SchemaReason::Decimal(value.to_string()),
        })?;

    let reason = match sign {
        Sign::Positive if decimal <= Decimal::ZERO => Some(SchemaReason::NotPositive(decimal)),
        Sign::NonNegative if decimal < Decimal::ZERO => Some(SchemaReason::Negative(decimal)),
        _ => None,
    };

    match reason {
        Some(reason) => Err(SchemaError {
            field: label,
            reason,
        }),
        None => Ok(decimal),
    }
}

const RAMP_KINDS: &[TransactionType] = &[TransactionType::Deposit, TransactionType::Withdraw];
const TRADE_KINDS: &[TransactionType] = &[TransactionType::Trade];
const TRANSFER_KINDS: &[TransactionType] = &[TransactionType::Transfer];

/// Deposit and withdrawal rows. Returns the validated kind along with the ramp fields.
pub fn validate_ramp(
    fields: &Fields<'_>,
) -> Result<(TransactionType, RampTransaction), SchemaError> {
    let kind = fields.kind("type", RAMP_KINDS)?;
    let ramp = RampTransaction {
        dt: fields.timestamp("dt")?,
        exchange: fields.optional_text("exchange"),
        receive_qty: fields.decimal("receiveQty", Sign::Positive)?,
        receive_token: fields.text("receiveToken")?,
        fee_1x_fiat: fields.optional_decimal("fee1xFiat", Sign::NonNegative)?,
    };

    Ok((kind, ramp))
}

pub fn validate_trade(fields: &Fields<'_>) -> Result<TradeTransaction, SchemaError> {
    fields.kind("type", TRADE_KINDS)?;

    Ok(TradeTransaction {
        dt: fields.timestamp("dt")?,
        exchange: fields.optional_text("exchange"),
        receive_qty: fields.decimal("receiveQty", Sign::NonNegative)?,
        receive_token: fields.text("receiveToken")?,
        receive_1x_fiat: fields.decimal("receive1xFiat", Sign::Positive)?,
        sent_qty: fields.decimal("sentQty", Sign::NonNegative)?,
        sent_token: fields.text("sentToken")?,
        sent_1x_fiat: fields.decimal("sent1xFiat", Sign::Positive)?,
        fees: fields.decimal("fees", Sign::NonNegative)?,
        fee_currency: fields.text("feeCurrency")?,
        fee_1x_fiat: fields.decimal("fee1xFiat", Sign::Positive)?,
    })
}

pub fn validate_transfer(fields: &Fields<'_>) -> Result<TransferTransaction, SchemaError> {
    fields.kind("type", TRANSFER_KINDS)?;

    Ok(TransferTransaction {
        dt: fields.timestamp("dt")?,
        from_exchange: fields.optional_text("fromExchange"),
        to_exchange: fields.optional_text("toExchange"),
        from_qty: fields.decimal("fromQty", Sign::NonNegative)?,
        to_qty: fields.decimal("toQty", Sign::NonNegative)?,
        token: fields.text("token")?,
        token_1x_fiat: fields.decimal("token1xFiat", Sign::Positive)?,
        fees: fields.decimal("fees", Sign::NonNegative)?,
        fee_1x_fiat: fields.decimal("fee1xFiat", Sign::Positive)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    const TRADE_ROW: [(&str, &str); 11] = [
        ("dt", "2022-07-01T10:00:00Z"),
        ("type", "TRADE"),
        ("receiveQty", "12.5"),
        ("receiveToken", "USDC"),
        ("receive1xFiat", "1"),
        ("sentQty", "12.625"),
        ("sentToken", "USD"),
        ("sent1xFiat", "1"),
        ("fees", "0.125"),
        ("feeCurrency", "USDC"),
        ("fee1xFiat", "1"),
    ];

    fn trade_fields(skip: Option<&str>) -> Fields<'static> {
        let mut fields = Fields::new();
        for (label, value) in TRADE_ROW {
            if Some(label) != skip {
                fields.insert(label, Some(value));
            }
        }
        fields
    }

    #[test]
    fn trade_schema_accepts_complete_row() {
        let trade = validate_trade(&trade_fields(None)).unwrap();

        assert_eq!(trade.dt, Utc.with_ymd_and_hms(2022, 7, 1, 10, 0, 0).unwrap());
        assert_eq!(trade.exchange, None);
        assert_eq!(trade.sent_qty, Decimal::new(12625, 3));
        assert_eq!(trade.fee_currency, "USDC");
    }

    #[test]
    fn trade_schema_names_missing_field() {
        let err = validate_trade(&trade_fields(Some("sentQty"))).unwrap_err();
        assert_eq!(
            err,
            SchemaError {
                field: "sentQty",
                reason: SchemaReason::Missing,
            },
        );
        assert_eq!(err.to_string(), "`sentQty` is required");
    }

    #[test]
    fn blank_values_are_dropped() {
        let fields = Fields::new()
            .with("exchange", Some(""))
            .with("dt", Some("   "))
            .with("type", None);

        assert!(fields.values.is_empty());
    }

    #[test]
    fn ramp_schema_checks_kind_and_sign() {
        let fields = Fields::new()
            .with("dt", Some("2022-07-01 10:00:00"))
            .with("type", Some("WITHDRAW"))
            .with("exchange", Some("Kraken"))
            .with("receiveQty", Some("5.00"))
            .with("receiveToken", Some("AUD"));
        let (kind, ramp) = validate_ramp(&fields).unwrap();
        assert_eq!(kind, TransactionType::Withdraw);
        assert_eq!(ramp.exchange.as_deref(), Some("Kraken"));
        assert_eq!(ramp.receive_qty, Decimal::new(5, 0));
        assert_eq!(ramp.fee_1x_fiat, None);

        let fields = Fields::new()
            .with("dt", Some("2022-07-01T10:00:00Z"))
            .with("type", Some("TRADE"))
            .with("receiveQty", Some("5"))
            .with("receiveToken", Some("AUD"));
        let err = validate_ramp(&fields).unwrap_err();
        assert_eq!(err.field, "type");
        assert!(matches!(err.reason, SchemaReason::Kind { .. }));

        let fields = Fields::new()
            .with("dt", Some("2022-07-01T10:00:00Z"))
            .with("type", Some("DEPOSIT"))
            .with("receiveQty", Some("0"))
            .with("receiveToken", Some("AUD"));
        let err = validate_ramp(&fields).unwrap_err();
        assert_eq!(
            err,
            SchemaError {
                field: "receiveQty",
                reason: SchemaReason::NotPositive(Decimal::ZERO),
            },
        );
    }

    #[test]
    fn transfer_schema_rejects_bad_shapes() {
        let fields = Fields::new()
            .with("dt", Some("yesterday"))
            .with("type", Some("TRANSFER"));
        let err = validate_transfer(&fields).unwrap_err();
        assert_eq!(err.field, "dt");
        assert_eq!(err.reason, SchemaReason::Timestamp("yesterday".to_string()));

        let fields = Fields::new()
            .with("dt", Some("2022-07-01T10:00:00Z"))
            .with("type", Some("TRANSFER"))
            .with("fromQty", Some("1.5"))
            .with("toQty", Some("1.4x"));
        let err = validate_transfer(&fields).unwrap_err();
        assert_eq!(err.field, "toQty");
        assert_eq!(err.reason, SchemaReason::Decimal("1.4x".to_string()));

        let fields = Fields::new()
            .with("dt", Some("2022-07-01T10:00:00Z"))
            .with("type", Some("TRANSFER"))
            .with("fromQty", Some("-1"));
        let err = validate_transfer(&fields).unwrap_err();
        assert_eq!(err.field, "fromQty");
        assert_eq!(err.reason, SchemaReason::Negative(Decimal::NEGATIVE_ONE));
    }
}
