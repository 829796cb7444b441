use chrono::{DateTime, Datelike as _, NaiveDate, Utc};
use std::{collections::BTreeSet, fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum PeriodError {
    #[error("Expected a period like `2021-07..2022-06`, found `{0}`")]
    Format(String),

    #[error("Invalid month `{0}`, expected `YYYY-MM`")]
    Month(String),

    #[error("Period ends before it starts")]
    Reversed,
}

/// A reporting window of whole calendar months, both ends inclusive.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Period {
    first: NaiveDate,

    /// First day after the window.
    end: NaiveDate,
}

fn parse_month(s: &str) -> Result<NaiveDate, PeriodError> {
    let invalid = || PeriodError::Month(s.to_string());

    let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
    let year = year.parse().map_err(|_| invalid())?;
    let month = month.parse().map_err(|_| invalid())?;

    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)
}

fn next_month(date: NaiveDate) -> Option<NaiveDate> {
    match date.month() {
        12 => NaiveDate::from_ymd_opt(date.year() + 1, 1, 1),
        month => NaiveDate::from_ymd_opt(date.year(), month + 1, 1),
    }
}

impl FromStr for Period {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (first, last) = s
            .split_once("..")
            .ok_or_else(|| PeriodError::Format(s.to_string()))?;
        let first = parse_month(first)?;
        let last = parse_month(last)?;

        if last < first {
            return Err(PeriodError::Reversed);
        }
        let end = next_month(last).ok_or_else(|| PeriodError::Month(s.to_string()))?;

        Ok(Self { first, end })
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last = self.end.pred_opt().unwrap_or(self.end);

        write!(f, "{}..{}", self.first.format("%Y-%m"), last.format("%Y-%m"))
    }
}

impl Period {
    pub fn contains(&self, dt: DateTime<Utc>) -> bool {
        let date = dt.date_naive();

        self.first <= date && date < self.end
    }
}

pub trait GetDateTime {
    fn get_dt(&self) -> DateTime<Utc>;
}

pub trait FilterPeriodExt<T> {
    fn filter_period(&self, period: &Period) -> Vec<&T>;

    /// `Err` holds the years of every item outside `period`.
    fn check_period(&self, period: &Period) -> Result<(), BTreeSet<i32>>;
}

/// Blanket implementation for every slice whose items implement `GetDateTime`.
impl<T> FilterPeriodExt<T> for [T]
where
    T: GetDateTime,
{
    fn filter_period(&self, period: &Period) -> Vec<&T> {
        self.iter()
            .filter(|item| period.contains(item.get_dt()))
            .collect()
    }

    fn check_period(&self, period: &Period) -> Result<(), BTreeSet<i32>> {
        let errors: BTreeSet<_> = self
            .iter()
            .filter_map(|item| {
                let dt = item.get_dt();

                (!period.contains(dt)).then_some(dt.year())
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
