//! Human-readable order numbers of the form `ORD-YYYYMMDD-NNNN`.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

const PREFIX: &str = "ORD";

/// A unique, per-business-day sequential order number.
///
/// Numbers order by business date, then by sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Formats the `sequence`-th order of `date`. Sequences past 9999 widen the field.
    pub fn new(date: NaiveDate, sequence: u64) -> Self {
        Self(format!("{PREFIX}-{}-{sequence:04}", date.format("%Y%m%d")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Business date encoded in the number.
    pub fn date(&self) -> Option<NaiveDate> {
        let (date, _) = self.parts()?;
        NaiveDate::parse_from_str(date, "%Y%m%d").ok()
    }

    /// Sequence within the business day.
    pub fn sequence(&self) -> Option<u64> {
        let (_, sequence) = self.parts()?;
        sequence.parse().ok()
    }

    fn parts(&self) -> Option<(&str, &str)> {
        let rest = self.0.strip_prefix(PREFIX)?.strip_prefix('-')?;
        rest.split_once('-')
    }
}

impl Ord for OrderNumber {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // The field widens past 9999, so the text alone sorts 10000 first.
        (self.date(), self.sequence(), &self.0).cmp(&(other.date(), other.sequence(), &other.0))
    }
}

impl PartialOrd for OrderNumber {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for OrderNumber {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let number = Self(s.to_string());
        match (number.date(), number.sequence()) {
            (Some(_), Some(_)) => Ok(number),
            _ => Err(ParseError::new("order number", s)),
        }
    }
}

/// One business day expressed as a half-open UTC range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessDay {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BusinessDay {
    /// The business day that contains `now` in the timezone `offset`.
    pub fn containing(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        let date = now.with_timezone(&offset).date_naive();
        let local_midnight = date.and_time(NaiveTime::MIN);
        let start = (local_midnight - Duration::seconds(i64::from(offset.local_minus_utc())))
            .and_utc();

        Self {
            date,
            start,
            end: start + Duration::days(1),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Number for an order following `existing` orders placed today.
    pub fn order_number(&self, existing: u64) -> OrderNumber {
        OrderNumber::new(self.date, existing + 1)
    }
}
