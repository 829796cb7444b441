//! CSV form of a generated transaction history.
//!
//! Every variant maps onto the same 13 columns. Ramp rows leave the sent side empty, and transfer
//! rows repeat the token and its price on both sides.

use crate::model::schema::{self, Fields, SchemaError};
use crate::model::transaction::{Transaction, TransactionType};
use csv::{Reader, ReaderBuilder, Writer, WriterBuilder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::{path::Path, str::FromStr};
use thiserror::Error;
use tracing::debug;

pub const CSV_HEADER: [&str; 13] = [
    "dt",
    "type",
    "exchange",
    "exchange_dest",
    "receive_qty",
    "receive_token",
    "sent_qty",
    "sent_token",
    "fees",
    "fees_currency",
    "receive_1x_fiat",
    "sent_1x_fiat",
    "fee_1x_fiat",
];

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Row {row}: unknown transaction type `{kind}`")]
    UnknownTransactionKind { row: usize, kind: String },

    #[error("Row {row}: schema violation")]
    SchemaViolation { row: usize, source: SchemaError },

    #[error("CSV Error")]
    Csv(#[from] csv::Error),

    #[error("FS Error")]
    Io(#[from] std::io::Error),

    #[error("CSV output is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub(crate) struct TransactionCSVRow {
    pub(crate) dt: String,
    #[serde(rename = "type")]
    pub(crate) tx_type: String,
    pub(crate) exchange: String,
    pub(crate) exchange_dest: String,
    pub(crate) receive_qty: String,
    pub(crate) receive_token: String,
    pub(crate) sent_qty: String,
    pub(crate) sent_token: String,
    pub(crate) fees: String,
    pub(crate) fees_currency: String,
    pub(crate) receive_1x_fiat: String,
    pub(crate) sent_1x_fiat: String,
    pub(crate) fee_1x_fiat: String,
}

fn decimal(value: Decimal) -> String {
    value.to_string()
}

fn optional(value: Option<&str>) -> String {
    value.unwrap_or_default().to_string()
}

impl From<&Transaction> for TransactionCSVRow {
    fn from(tx: &Transaction) -> Self {
        let tx_type = tx.kind().to_string();
        let dt = tx.dt().to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true);

        match tx {
            Transaction::Deposit(ramp) | Transaction::Withdraw(ramp) => Self {
                dt,
                tx_type,
                exchange: optional(ramp.exchange.as_deref()),
                receive_qty: decimal(ramp.receive_qty),
                receive_token: ramp.receive_token.clone(),
                fee_1x_fiat: ramp.fee_1x_fiat.map(decimal).unwrap_or_default(),
                ..Self::default()
            },
            Transaction::Trade(trade) => Self {
                dt,
                tx_type,
                exchange: optional(trade.exchange.as_deref()),
                exchange_dest: String::new(),
                receive_qty: decimal(trade.receive_qty),
                receive_token: trade.receive_token.clone(),
                sent_qty: decimal(trade.sent_qty),
                sent_token: trade.sent_token.clone(),
                fees: decimal(trade.fees),
                fees_currency: trade.fee_currency.clone(),
                receive_1x_fiat: decimal(trade.receive_1x_fiat),
                sent_1x_fiat: decimal(trade.sent_1x_fiat),
                fee_1x_fiat: decimal(trade.fee_1x_fiat),
            },
            Transaction::Transfer(transfer) => Self {
                dt,
                tx_type,
                exchange: optional(transfer.from_exchange.as_deref()),
                exchange_dest: optional(transfer.to_exchange.as_deref()),
                receive_qty: decimal(transfer.to_qty),
                receive_token: transfer.token.clone(),
                sent_qty: decimal(transfer.from_qty),
                sent_token: transfer.token.clone(),
                fees: decimal(transfer.fees),
                fees_currency: transfer.token.clone(),
                receive_1x_fiat: decimal(transfer.token_1x_fiat),
                sent_1x_fiat: decimal(transfer.token_1x_fiat),
                fee_1x_fiat: decimal(transfer.fee_1x_fiat),
            },
        }
    }
}

/// Validate one row. `row` is the 1-based data row, used for error reporting only.
fn transaction_parse(row: usize, record: &TransactionCSVRow) -> Result<Transaction, HistoryError> {
    let kind = TransactionType::from_str(record.tx_type.trim()).map_err(|err| {
        HistoryError::UnknownTransactionKind {
            row,
            kind: err.0,
        }
    })?;
    let fields = Fields::new()
        .with("type", Some(record.tx_type.as_str()))
        .with("dt", Some(record.dt.as_str()));
    let violation = |source: SchemaError| HistoryError::SchemaViolation { row, source };

    let tx = match kind {
        TransactionType::Deposit | TransactionType::Withdraw => {
            let fields = fields
                .with("exchange", Some(record.exchange.as_str()))
                .with("receiveQty", Some(record.receive_qty.as_str()))
                .with("receiveToken", Some(record.receive_token.as_str()))
                .with("fee1xFiat", Some(record.fee_1x_fiat.as_str()));

            match schema::validate_ramp(&fields).map_err(violation)? {
                (TransactionType::Withdraw, ramp) => Transaction::Withdraw(ramp),
                (_, ramp) => Transaction::Deposit(ramp),
            }
        }
        TransactionType::Trade => {
            let fields = fields
                .with("exchange", Some(record.exchange.as_str()))
                .with("receiveQty", Some(record.receive_qty.as_str()))
                .with("receiveToken", Some(record.receive_token.as_str()))
                .with("receive1xFiat", Some(record.receive_1x_fiat.as_str()))
                .with("sentQty", Some(record.sent_qty.as_str()))
                .with("sentToken", Some(record.sent_token.as_str()))
                .with("sent1xFiat", Some(record.sent_1x_fiat.as_str()))
                .with("fees", Some(record.fees.as_str()))
                .with("feeCurrency", Some(record.fees_currency.as_str()))
                .with("fee1xFiat", Some(record.fee_1x_fiat.as_str()));

            Transaction::Trade(schema::validate_trade(&fields).map_err(violation)?)
        }
        TransactionType::Transfer => {
            let mut fields = fields
                .with("fromExchange", Some(record.exchange.as_str()))
                .with("toExchange", Some(record.exchange_dest.as_str()))
                .with("fromQty", Some(record.sent_qty.as_str()))
                .with("toQty", Some(record.receive_qty.as_str()))
                .with("fees", Some(record.fees.as_str()))
                .with("fee1xFiat", Some(record.fee_1x_fiat.as_str()));

            // Either side carries the token, the receive side is preferred.
            fields.insert("token", Some(record.sent_token.as_str()));
            fields.insert("token", Some(record.receive_token.as_str()));
            fields.insert("token1xFiat", Some(record.sent_1x_fiat.as_str()));
            fields.insert("token1xFiat", Some(record.receive_1x_fiat.as_str()));

            Transaction::Transfer(schema::validate_transfer(&fields).map_err(violation)?)
        }
    };

    Ok(tx)
}

fn write_rows<W: Write>(mut writer: Writer<W>, txs: &[Transaction]) -> Result<W, HistoryError> {
    writer.write_record(CSV_HEADER)?;
    for tx in txs {
        writer.serialize(TransactionCSVRow::from(tx))?;
    }

    writer
        .into_inner()
        .map_err(|err| HistoryError::Io(err.into_error()))
}

fn read_rows<R: Read>(mut reader: Reader<R>) -> Result<Vec<Transaction>, HistoryError> {
    let mut txs = Vec::new();

    debug!("Parsing transaction rows");
    for (i, result) in reader.deserialize().enumerate() {
        let record: TransactionCSVRow = result?;
        debug!("Deserialized: {record:?}");

        let tx = transaction_parse(i + 1, &record)?;
        debug!("Parsed: {tx:?}");

        txs.push(tx);
    }

    Ok(txs)
}

fn writer_builder() -> WriterBuilder {
    let mut builder = WriterBuilder::new();
    builder.has_headers(false);
    builder
}

fn reader_builder() -> ReaderBuilder {
    let mut builder = ReaderBuilder::new();
    builder.comment(Some(b'#'));
    builder
}

/// Serialize `txs` to CSV text, header first.
pub fn encode_to_rows(txs: &[Transaction]) -> Result<String, HistoryError> {
    let bytes = write_rows(writer_builder().from_writer(Vec::new()), txs)?;

    Ok(String::from_utf8(bytes)?)
}

/// Parse and validate CSV text. Lines starting with `#` are ignored. The first failing row aborts
/// the whole decode.
pub fn decode_from_rows(text: &str) -> Result<Vec<Transaction>, HistoryError> {
    read_rows(reader_builder().from_reader(text.as_bytes()))
}

pub fn write_history(path: impl AsRef<Path>, txs: &[Transaction]) -> Result<(), HistoryError> {
    let mut file = write_rows(writer_builder().from_path(path)?, txs)?;
    file.flush()?;

    Ok(())
}

pub fn read_history(path: impl AsRef<Path>) -> Result<Vec<Transaction>, HistoryError> {
    read_rows(reader_builder().from_path(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::schema::SchemaReason;
    use crate::model::transaction::{RampTransaction, TradeTransaction, TransferTransaction};
    use chrono::{TimeZone as _, Utc};
    use similar_asserts::assert_eq;
    use tracing_test::traced_test;

    const HEADER: &str = "dt,type,exchange,exchange_dest,receive_qty,receive_token,sent_qty,\
        sent_token,fees,fees_currency,receive_1x_fiat,sent_1x_fiat,fee_1x_fiat";

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn history() -> Vec<Transaction> {
        let dt = |h| Utc.with_ymd_and_hms(2022, 7, 1, h, 0, 0).unwrap();

        vec![
            Transaction::Deposit(RampTransaction {
                dt: dt(10),
                exchange: Some("Kraken".to_string()),
                receive_qty: dec("1000.00"),
                receive_token: "USD".to_string(),
                fee_1x_fiat: None,
            }),
            Transaction::Trade(TradeTransaction {
                dt: dt(11),
                exchange: None,
                receive_qty: dec("497.5"),
                receive_token: "USDC".to_string(),
                receive_1x_fiat: Decimal::ONE,
                sent_qty: dec("500.00"),
                sent_token: "USD".to_string(),
                sent_1x_fiat: Decimal::ONE,
                fees: dec("2.5"),
                fee_currency: "USDC".to_string(),
                fee_1x_fiat: Decimal::ONE,
            }),
            Transaction::Transfer(TransferTransaction {
                dt: dt(12),
                from_exchange: Some("Crypto.com".to_string()),
                to_exchange: Some("BTC Markets".to_string()),
                from_qty: dec("497.5"),
                to_qty: dec("497.4"),
                token: "USDC".to_string(),
                token_1x_fiat: dec("1.0001"),
                fees: dec("0.1"),
                fee_1x_fiat: dec("1.0001"),
            }),
            Transaction::Withdraw(RampTransaction {
                dt: dt(13),
                exchange: None,
                receive_qty: dec("5"),
                receive_token: "USD".to_string(),
                fee_1x_fiat: Some(dec("0.5")),
            }),
        ]
    }

    #[test]
    #[traced_test]
    fn encode_layout() {
        let _ = tracing_log::LogTracer::init();

        let text = encode_to_rows(&history()).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(
            lines,
            [
                HEADER,
                "2022-07-01T10:00:00Z,DEPOSIT,Kraken,,1000.00,USD,,,,,,,",
                "2022-07-01T11:00:00Z,TRADE,,,497.5,USDC,500.00,USD,2.5,USDC,1,1,1",
                "2022-07-01T12:00:00Z,TRANSFER,Crypto.com,BTC Markets,497.4,USDC,497.5,USDC,0.1,\
                    USDC,1.0001,1.0001,1.0001",
                "2022-07-01T13:00:00Z,WITHDRAW,,,5,USD,,,,,,,0.5",
            ],
        );

        // An empty history is just the header.
        assert_eq!(encode_to_rows(&[]).unwrap().trim_end(), HEADER);
    }

    #[test]
    #[traced_test]
    fn decode_round_trip() {
        let _ = tracing_log::LogTracer::init();

        let txs = history();
        let text = encode_to_rows(&txs).unwrap();

        assert_eq!(decode_from_rows(&text).unwrap(), txs);
    }

    #[test]
    fn decode_compares_decimals_numerically() {
        let text = format!(
            "{HEADER}\n\
            # comment lines are skipped\n\
            2022-07-01 10:00:00,DEPOSIT,Kraken,,1000,USD,,,,,,,\n"
        );
        let txs = decode_from_rows(&text).unwrap();

        assert_eq!(txs, history()[..1].to_vec());
    }

    #[test]
    fn decode_trade_missing_sent_qty() {
        let text =
            format!("{HEADER}\n2022-07-01T11:00:00Z,TRADE,,,497.5,USDC,,USD,2.5,USDC,1,1,1\n");
        let err = decode_from_rows(&text).unwrap_err();

        let HistoryError::SchemaViolation { row, source } = err else {
            panic!("Expected a schema violation, found {err:?}");
        };
        assert_eq!(row, 1);
        assert_eq!(
            source,
            SchemaError {
                field: "sentQty",
                reason: SchemaReason::Missing,
            },
        );
    }

    #[test]
    fn decode_unknown_kind_aborts() {
        let text = format!(
            "{HEADER}\n\
            2022-07-01T10:00:00Z,DEPOSIT,Kraken,,1000,USD,,,,,,,\n\
            2022-07-01T11:00:00Z,FOO,,,1,USD,,,,,,,\n"
        );
        let err = decode_from_rows(&text).unwrap_err();

        assert!(matches!(
            err,
            HistoryError::UnknownTransactionKind { row: 2, ref kind } if kind == "FOO"
        ));
        assert_eq!(err.to_string(), "Row 2: unknown transaction type `FOO`");
    }

    #[test]
    fn decode_transfer_from_either_side() {
        let text = format!(
            "{HEADER}\n2022-07-01T12:00:00Z,TRANSFER,,,0.9,,1,ABC,0.1,,,2.5,2.5\n"
        );
        let txs = decode_from_rows(&text).unwrap();

        let Transaction::Transfer(transfer) = &txs[0] else {
            panic!("Expected a transfer");
        };
        assert_eq!(transfer.token, "ABC");
        assert_eq!(transfer.token_1x_fiat, dec("2.5"));
        assert_eq!(transfer.from_exchange, None);
    }

    #[test]
    #[traced_test]
    fn file_round_trip() {
        let _ = tracing_log::LogTracer::init();

        let path = std::env::temp_dir().join(format!("taxsim-history-{}.csv", std::process::id()));
        let txs = history();

        write_history(&path, &txs).unwrap();
        let decoded = read_history(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(decoded.unwrap(), txs);
    }
}
