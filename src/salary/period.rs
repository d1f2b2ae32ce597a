//! Calculation period
//!
//! Dates arrive as `YYYY-MM-DD`. The start covers its whole day from
//! midnight, the end covers its whole day up to the last microsecond.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;

use crate::error::{AppError, AppResult};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SalaryPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SalaryPeriod {
    /// Resolve optional request dates against `now`.
    ///
    /// A missing start means the first day of the current month, a missing
    /// end means `now`.
    pub fn resolve(start: Option<&str>, end: Option<&str>, now: DateTime<Utc>) -> AppResult<Self> {
        let start = match non_empty(start) {
            Some(raw) => start_of_day(parse_date(raw)?),
            None => start_of_month(now),
        };
        let end = match non_empty(end) {
            Some(raw) => end_of_day(parse_date(raw)?),
            None => now,
        };
        Self::new(start, end)
    }

    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> AppResult<Self> {
        if start > end {
            return Err(AppError::BadRequest(
                "start_date must not be after end_date".to_string(),
            ));
        }
        Ok(Self { start, end })
    }

    /// From the first day of `now`'s month up to `now`
    pub fn current_month(now: DateTime<Utc>) -> Self {
        Self {
            start: start_of_month(now),
            end: now,
        }
    }

    /// Inclusive range of whole days
    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> AppResult<Self> {
        Self::new(start_of_day(start), end_of_day(end))
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end.date_naive()
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }

    /// Whether a date range `[from, to]` touches this period
    pub fn overlaps(&self, from: NaiveDate, to: NaiveDate) -> bool {
        from <= self.end_date() && to >= self.start_date()
    }

    pub fn label(&self) -> String {
        format!(
            "{} - {}",
            self.start_date().format(DATE_FORMAT),
            self.end_date().format(DATE_FORMAT)
        )
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub fn parse_date(raw: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| AppError::BadRequest(format!("invalid date '{}', expected YYYY-MM-DD", raw)))
}

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    let last = NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&date.and_time(last))
}

pub fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    let first = now.date_naive().with_day(1).unwrap_or_else(|| now.date_naive());
    start_of_day(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_explicit_dates_cover_whole_days() {
        let now = at("2024-03-20T10:00:00Z");
        let period = SalaryPeriod::resolve(Some("2024-01-01"), Some("2024-01-31"), now).unwrap();

        assert_eq!(period.start, at("2024-01-01T00:00:00Z"));
        assert!(period.contains(at("2024-01-31T23:59:59Z")));
        assert!(!period.contains(at("2024-02-01T00:00:00Z")));
        assert_eq!(period.label(), "2024-01-01 - 2024-01-31");
    }

    #[test]
    fn test_defaults_to_current_month_until_now() {
        let now = at("2024-03-20T10:00:00Z");
        let period = SalaryPeriod::resolve(None, Some(""), now).unwrap();

        assert_eq!(period.start, at("2024-03-01T00:00:00Z"));
        assert_eq!(period.end, now);
        assert_eq!(period, SalaryPeriod::current_month(now));
    }

    #[test]
    fn test_malformed_date_is_rejected() {
        let now = Utc::now();
        let err = SalaryPeriod::resolve(Some("01.02.2024"), None, now).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_reversed_range_is_rejected() {
        let now = Utc::now();
        let err = SalaryPeriod::resolve(Some("2024-02-01"), Some("2024-01-01"), now).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_single_day_period() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 9).unwrap();
        let period = SalaryPeriod::from_dates(day, day).unwrap();
        assert!(period.contains(at("2024-05-09T12:00:00Z")));
        assert_eq!(period.start_date(), day);
        assert_eq!(period.end_date(), day);
    }

    #[test]
    fn test_overlap() {
        let period = SalaryPeriod::from_dates(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .unwrap();
        let d = |m, day| NaiveDate::from_ymd_opt(2024, m, day).unwrap();

        assert!(period.overlaps(d(1, 15), d(1, 20)));
        assert!(period.overlaps(d(1, 31), d(2, 28)));
        assert!(period.overlaps(d(1, 1), d(1, 1)));
        assert!(!period.overlaps(d(2, 1), d(2, 28)));
    }
}
