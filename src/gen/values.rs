//! Randomized value providers.
//!
//! Every provider only consumes the injected random source. Money, quantities and prices are
//! drawn as uniform integers over a fixed decimal scale, so a seeded run is reproducible to the
//! last digit.

use chrono::{DateTime, TimeDelta, Utc};
use rand::seq::SliceRandom as _;
use rand::Rng;
use rust_decimal::prelude::ToPrimitive as _;
use rust_decimal::Decimal;
use std::ops::RangeInclusive;

/// Smallest deposit or withdrawal the simulator produces.
pub const MIN_RAMP_AMOUNT: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

pub const DEFAULT_MAX_RAMP_AMOUNT: Decimal = Decimal::from_parts(50_000, 0, 0, false, 0);

/// Largest configurable ramp amount. Keeps every draw within `i128` units at cent scale.
pub const MAX_RAMP_AMOUNT: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

pub const RAMP_AMOUNT_DIGITS: u32 = 2;
const EXCHANGE_RATE_DIGITS: u32 = 4;
const FEE_PERCENT_DIGITS: u32 = 6;
const TOKEN_PRICE_DIGITS: u32 = 4;
const PRICE_DELTA_DIGITS: u32 = 4;

// 1%
const MAX_FEE_PERCENT: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

const MIN_TOKEN_PRICE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);
const MAX_TOKEN_PRICE: Decimal = Decimal::from_parts(1000, 0, 0, false, 0);

// Price moves by at most 10% each time a held token is touched.
const MAX_PRICE_DELTA: Decimal = Decimal::from_parts(1, 0, 0, false, 1);

pub const SWAP_PERCENTAGES: [Decimal; 6] = [
    Decimal::from_parts(1, 0, 0, false, 1),
    Decimal::from_parts(2, 0, 0, false, 1),
    Decimal::from_parts(25, 0, 0, false, 2),
    Decimal::from_parts(5, 0, 0, false, 1),
    Decimal::from_parts(75, 0, 0, false, 2),
    Decimal::ONE,
];

pub const TRANSFER_PERCENTAGES: [Decimal; 3] = [
    Decimal::from_parts(5, 0, 0, false, 1),
    Decimal::from_parts(75, 0, 0, false, 2),
    Decimal::ONE,
];

pub const CENTRALIZED_EXCHANGES: [&str; 10] = [
    "Binance",
    "FTX",
    "Kraken",
    "KuCoin",
    "Crypto.com",
    "BTC Markets",
    "Coinbase",
    "Bitfinex",
    "Gate.io",
    "Coinspot",
];

pub const DECENTRALIZED_EXCHANGES: [&str; 10] = [
    "Uniswap",
    "PancakeSwap",
    "dYdX",
    "Curve Finance",
    "SushiSwap",
    "TraderJoe",
    "Orca",
    "Astroport",
    "THORChain",
    "PRISM Swap",
];

pub const STABLE_TOKENS: [&str; 7] = ["USDC", "BUSD", "USDT", "MIM", "DAI", "TUSD", "sUSD"];

const TOKEN_ALPHABET: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// A fiat currency and the band its USD exchange rate is drawn from.
struct FiatBand {
    code: &'static str,
    low: Decimal,
    high: Decimal,
}

const FIAT_CURRENCIES: [FiatBand; 5] = [
    FiatBand {
        code: "USD",
        low: Decimal::ONE,
        high: Decimal::ONE,
    },
    FiatBand {
        code: "EUR",
        low: Decimal::from_parts(930, 0, 0, false, 3),
        high: Decimal::from_parts(933, 0, 0, false, 3),
    },
    FiatBand {
        code: "JPY",
        low: Decimal::from_parts(11058, 0, 0, false, 2),
        high: Decimal::from_parts(13071, 0, 0, false, 2),
    },
    FiatBand {
        code: "AUD",
        low: Decimal::from_parts(136, 0, 0, false, 2),
        high: Decimal::from_parts(142, 0, 0, false, 2),
    },
    FiatBand {
        code: "CAD",
        low: Decimal::from_parts(120, 0, 0, false, 2),
        high: Decimal::from_parts(139, 0, 0, false, 2),
    },
];

/// Uniform draw over `range` in steps of `10^-digits`. Reversed bounds are swapped.
pub fn uniform_decimal<R: Rng + ?Sized>(
    rng: &mut R,
    range: RangeInclusive<Decimal>,
    digits: u32,
) -> Decimal {
    let factor = Decimal::from(10_u64.pow(digits));
    let to_units = |value: Decimal| (value * factor).trunc().to_i128().unwrap_or_default();

    let (a, b) = (to_units(*range.start()), to_units(*range.end()));
    let units = rng.gen_range(a.min(b)..=a.max(b));

    Decimal::from_i128_with_scale(units, digits).normalize()
}

/// Returns `Some(f())` half of the time.
pub fn option<R, A, F>(rng: &mut R, f: F) -> Option<A>
where
    R: Rng + ?Sized,
    F: FnOnce(&mut R) -> A,
{
    if rng.gen_bool(0.5) {
        Some(f(rng))
    } else {
        None
    }
}

pub fn ramp_amount<R: Rng + ?Sized>(rng: &mut R, max: Decimal) -> Decimal {
    uniform_decimal(rng, MIN_RAMP_AMOUNT..=max, RAMP_AMOUNT_DIGITS)
}

/// Fiat currency code and its USD -> X exchange rate. The rate is sampled here, once.
pub fn fiat_currency<R: Rng + ?Sized>(rng: &mut R) -> (String, Decimal) {
    let band = &FIAT_CURRENCIES[rng.gen_range(0..FIAT_CURRENCIES.len())];
    let rate = uniform_decimal(rng, band.low..=band.high, EXCHANGE_RATE_DIGITS);

    (band.code.to_string(), rate)
}

pub fn next_dt<R: Rng + ?Sized>(rng: &mut R, dt: DateTime<Utc>) -> DateTime<Utc> {
    dt + TimeDelta::hours(rng.gen_range(1..=24))
        + TimeDelta::minutes(rng.gen_range(1..=60))
        + TimeDelta::seconds(rng.gen_range(1..=60))
}

fn pick<R: Rng + ?Sized, T: Copy>(rng: &mut R, items: &[T]) -> T {
    items[rng.gen_range(0..items.len())]
}

pub fn swap_percentage<R: Rng + ?Sized>(rng: &mut R) -> Decimal {
    pick(rng, &SWAP_PERCENTAGES)
}

pub fn transfer_percentage<R: Rng + ?Sized>(rng: &mut R) -> Decimal {
    pick(rng, &TRANSFER_PERCENTAGES)
}

pub fn fee_percentage<R: Rng + ?Sized>(rng: &mut R) -> Decimal {
    uniform_decimal(rng, Decimal::ZERO..=MAX_FEE_PERCENT, FEE_PERCENT_DIGITS)
}

pub fn cex<R: Rng + ?Sized>(rng: &mut R) -> String {
    pick(rng, &CENTRALIZED_EXCHANGES).to_string()
}

pub fn dex<R: Rng + ?Sized>(rng: &mut R) -> String {
    pick(rng, &DECENTRALIZED_EXCHANGES).to_string()
}

/// A centralized or decentralized exchange, with equal odds.
pub fn exchange<R: Rng + ?Sized>(rng: &mut R) -> String {
    if rng.gen_bool(0.5) {
        cex(rng)
    } else {
        dex(rng)
    }
}

pub fn stable_token<R: Rng + ?Sized>(rng: &mut R) -> String {
    pick(rng, &STABLE_TOKENS).to_string()
}

/// 3 to 5 distinct uppercase letters, never equal to `exclude`.
pub fn token<R: Rng + ?Sized>(rng: &mut R, exclude: Option<&str>) -> String {
    loop {
        let mut letters = *TOKEN_ALPHABET;
        let len = rng.gen_range(3..=5);
        let (picked, _) = letters.partial_shuffle(rng, len);
        let symbol: String = picked.iter().map(|&b| char::from(b)).collect();

        if Some(symbol.as_str()) != exclude {
            return symbol;
        }
    }
}

pub fn token_price<R: Rng + ?Sized>(rng: &mut R) -> Decimal {
    uniform_decimal(rng, MIN_TOKEN_PRICE..=MAX_TOKEN_PRICE, TOKEN_PRICE_DIGITS)
}

/// Multiplier in `[0.9, 1.1]` applied to a held token's last price.
pub fn price_delta<R: Rng + ?Sized>(rng: &mut R) -> Decimal {
    Decimal::ONE + uniform_decimal(rng, -MAX_PRICE_DELTA..=MAX_PRICE_DELTA, PRICE_DELTA_DIGITS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;
    use rand::SeedableRng as _;
    use rand_chacha::ChaCha8Rng;
    use std::collections::BTreeSet;

    const DRAWS: usize = 2_000;

    #[test]
    fn uniform_decimal_stays_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let low = Decimal::new(930, 3);
        let high = Decimal::new(933, 3);

        for _ in 0..DRAWS {
            let value = uniform_decimal(&mut rng, low..=high, 4);
            assert!((low..=high).contains(&value), "{value}");
            assert!(value.scale() <= 4);
        }

        // Reversed bounds are swapped.
        for _ in 0..DRAWS {
            let value = uniform_decimal(&mut rng, high..=low, 4);
            assert!((low..=high).contains(&value), "{value}");
        }
    }

    #[test]
    fn ramp_amounts() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        for _ in 0..DRAWS {
            let amount = ramp_amount(&mut rng, DEFAULT_MAX_RAMP_AMOUNT);
            assert!(amount >= MIN_RAMP_AMOUNT && amount <= DEFAULT_MAX_RAMP_AMOUNT);
            assert!(amount.scale() <= RAMP_AMOUNT_DIGITS);
        }
    }

    #[test]
    fn fiat_currencies_have_banded_rates() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut seen = BTreeSet::new();

        for _ in 0..DRAWS {
            let (code, rate) = fiat_currency(&mut rng);
            let band = FIAT_CURRENCIES.iter().find(|band| band.code == code).unwrap();
            assert!(rate >= band.low && rate <= band.high, "{code} {rate}");
            seen.insert(code);
        }

        assert_eq!(seen.len(), FIAT_CURRENCIES.len());
    }

    #[test]
    fn next_dt_is_strictly_later() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut dt = Utc.with_ymd_and_hms(2021, 7, 1, 0, 0, 0).unwrap();

        for _ in 0..DRAWS {
            let next = next_dt(&mut rng, dt);
            let delta = next - dt;
            assert!(delta >= TimeDelta::seconds(3600 + 60 + 1));
            assert!(delta <= TimeDelta::seconds(24 * 3600 + 3600 + 60));
            dt = next;
        }
    }

    #[test]
    fn percentages() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);

        for _ in 0..DRAWS {
            assert!(SWAP_PERCENTAGES.contains(&swap_percentage(&mut rng)));
            assert!(TRANSFER_PERCENTAGES.contains(&transfer_percentage(&mut rng)));

            let fee = fee_percentage(&mut rng);
            assert!(fee >= Decimal::ZERO && fee <= MAX_FEE_PERCENT);

            let delta = price_delta(&mut rng);
            assert!(delta >= Decimal::new(9, 1) && delta <= Decimal::new(11, 1));

            let price = token_price(&mut rng);
            assert!(price >= MIN_TOKEN_PRICE && price <= MAX_TOKEN_PRICE);
        }
    }

    #[test]
    fn token_symbols() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        for _ in 0..DRAWS {
            let symbol = token(&mut rng, None);
            assert!((3..=5).contains(&symbol.len()), "{symbol}");
            assert!(symbol.bytes().all(|b| b.is_ascii_uppercase()));

            // Letters are drawn without replacement.
            let letters: BTreeSet<_> = symbol.bytes().collect();
            assert_eq!(letters.len(), symbol.len());

            assert_ne!(token(&mut rng, Some(&symbol)), symbol);
        }
    }

    #[test]
    fn names_come_from_fixed_lists() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let mut some = 0;

        for _ in 0..DRAWS {
            let name = exchange(&mut rng);
            assert!(
                CENTRALIZED_EXCHANGES.contains(&name.as_str())
                    || DECENTRALIZED_EXCHANGES.contains(&name.as_str())
            );
            assert!(STABLE_TOKENS.contains(&stable_token(&mut rng).as_str()));

            if option(&mut rng, cex).is_some() {
                some += 1;
            }
        }

        // Roughly half of the optional values are present.
        assert!(some > DRAWS / 4 && some < DRAWS * 3 / 4, "{some}");
    }
}
