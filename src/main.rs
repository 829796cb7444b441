//  taxsim: synthetic transaction histories

#![forbid(unsafe_code)]

use chrono::{SubsecRound as _, Utc};
use error_iter::ErrorIter as _;
use is_terminal::IsTerminal as _;
use onlyargs::{CliError, OnlyArgs as _};
use onlyargs_derive::OnlyArgs;
use rand::Rng as _;
use std::path::PathBuf;
use std::{env, process::ExitCode};
use taxsim::gen::{seeded_rng, SimConfig, Simulator, DEFAULT_TARGET_RANGE};
use taxsim::imports::history::{encode_to_rows, read_history, write_history};
use taxsim::model::{schema::parse_timestamp, Stats, Transaction};
use taxsim::util::period::{FilterPeriodExt as _, Period};
use thiserror::Error;
use tracing::{debug, info, warn};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

/// Generate a random but internally consistent crypto transaction history, or summarize one.
#[derive(Debug, OnlyArgs)]
#[footer = "Without --input, a new history is generated and written as CSV to --output,"]
#[footer = "  or to stdout when no output path is given."]
#[footer = ""]
#[footer = "Additional environment variables:"]
#[footer = "  - RUST_LOG sets the log filter, default is \"info\""]
#[footer = "  - TERM_COLOR accepts \"always\" to override automatic terminal sensing"]
struct Args {
    /// Number of steps to generate after the seed deposit.
    ///   Default is a random count from 49 to 999.
    count: Option<usize>,

    /// Timestamp of the seed deposit, RFC 3339 or "YYYY-MM-DD HH:MM:SS".
    ///   Default is the current time.
    start: Option<String>,

    /// Maximum number of distinct token symbols in one run.
    max_tokens: Option<usize>,

    /// Seed for the random source. A random seed is logged when omitted.
    #[long]
    seed: Option<u64>,

    /// Read kind weights and limits from a RON file.
    #[long]
    config: Option<PathBuf>,

    /// Read a transaction history CSV instead of generating one.
    #[short('i')]
    input: Option<PathBuf>,

    /// Write the transaction history CSV to a file.
    #[short('o')]
    output: Option<PathBuf>,

    /// Only keep transactions within a range of months, both inclusive.
    ///   E.g. "2021-07..2022-06"
    ///
    #[short('p')]
    period: Option<String>,

    /// Log run statistics, including skipped steps.
    verbose: bool,
}

#[derive(Debug, Error)]
enum Error {
    #[error("CLI error")]
    Cli(#[from] CliError),

    #[error("Unable to load config {0:?}")]
    Config(PathBuf, #[source] taxsim::errors::SimConfigError),

    #[error("Invalid start timestamp: {0}")]
    Start(String),

    #[error("Invalid period")]
    Period(#[from] taxsim::errors::PeriodError),

    #[error("Simulation error")]
    Simulation(#[from] taxsim::errors::SimulationError),

    #[error("Failed to import {0:?}")]
    Import(PathBuf, #[source] taxsim::errors::HistoryError),

    #[error("Failed to export {0:?}")]
    Export(PathBuf, #[source] taxsim::errors::HistoryError),

    #[error("Failed to encode transaction history")]
    Encode(#[from] taxsim::errors::HistoryError),
}

fn main() -> ExitCode {
    // Uses the `RUST_LOG` environment var for configuration. E.g. `RUST_LOG=debug cargo run`
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let term_color = env::var("TERM_COLOR")
        .map(|color| color == "always")
        .unwrap_or_else(|_| std::io::stderr().is_terminal());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(term_color)
                .with_writer(std::io::stderr),
        )
        .with(env_filter)
        .init();

    match run(onlyargs::parse()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            if matches!(err, Error::Cli(_)) {
                eprintln!("{}", Args::HELP);
            }

            eprintln!("Error: {err}");
            for source in err.sources().skip(1) {
                eprintln!("  Caused by: {source}");
            }

            ExitCode::FAILURE
        }
    }
}

fn run(args: Result<Args, CliError>) -> Result<(), Error> {
    let args = args?;
    let period = args.period.as_deref().map(str::parse::<Period>).transpose()?;

    let txs = match &args.input {
        Some(input) => {
            debug!("Reading transaction history from {input:?}");
            let txs = read_history(input).map_err(|e| Error::Import(input.clone(), e))?;
            info!("Read {} transactions from {input:?}", txs.len());
            txs
        }
        None => generate(&args)?,
    };

    // Restrict to the reporting period.
    let txs: Vec<Transaction> = match period {
        Some(period) => {
            if let Err(years) = txs.check_period(&period) {
                warn!("Dropping transactions outside of {period}, found years {years:?}");
            }
            txs.filter_period(&period).into_iter().cloned().collect()
        }
        None => txs,
    };

    if args.input.is_some() {
        let stats = Stats::from_transactions(&txs);
        info!("{} transactions", stats.total());
        stats.pretty_print();
    }

    match args.output {
        Some(output) => {
            write_history(&output, &txs).map_err(|e| Error::Export(output.clone(), e))?;
            info!("Wrote {} transactions to {output:?}", txs.len());
        }
        None if args.input.is_none() => print!("{}", encode_to_rows(&txs)?),
        None => (),
    }

    Ok(())
}

fn generate(args: &Args) -> Result<Vec<Transaction>, Error> {
    let mut config = args
        .config
        .as_ref()
        .map(|path| {
            debug!("Loading config from {path:?}");

            SimConfig::load(path).map_err(|e| Error::Config(path.clone(), e))
        })
        .transpose()?
        .unwrap_or_default();
    if let Some(max_tokens) = args.max_tokens {
        config.max_distinct_tokens = Some(max_tokens);
    }

    let start = match &args.start {
        Some(start) => parse_timestamp(start).ok_or_else(|| Error::Start(start.clone()))?,
        None => Utc::now().trunc_subsecs(0),
    };

    let seed = args.seed.unwrap_or_else(rand::random);
    info!("Using seed {seed}");

    // Same draw order as `generate_history`, so a seed reproduces either way.
    let mut rng = seeded_rng(seed);
    let target = args
        .count
        .unwrap_or_else(|| rng.gen_range(DEFAULT_TARGET_RANGE));

    let mut sim = Simulator::new(rng, config, start)?;
    sim.run(target)?;
    if args.verbose {
        info!("Run statistics: {:?}", sim.stats());
    }

    Ok(sim.into_transactions())
}
