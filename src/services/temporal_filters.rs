use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};

use crate::{
    error::{AppError, AppResult},
    schemas::{validate_input, ReportFilterQuery},
};

pub const WEEK_OF_MONTH_RANGE: std::ops::RangeInclusive<u32> = 1..=5;

/// 1-based week index within the month: days 1-7 are week 1, 29-31 week 5.
pub fn week_of_month(date: NaiveDate) -> u32 {
    (date.day() - 1) / 7 + 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Normalised temporal filters for one report request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FilterParams {
    pub organisation_id: String,
    pub exact_date: Option<NaiveDate>,
    pub date_range: Option<DateRange>,
    pub years: BTreeSet<i32>,
    pub months: BTreeSet<u32>,
    pub weeks_of_month: BTreeSet<u32>,
    pub quarters: BTreeSet<u32>,
}

impl FilterParams {
    pub fn for_organisation(organisation_id: impl Into<String>) -> Self {
        Self {
            organisation_id: organisation_id.into(),
            ..Self::default()
        }
    }

    /// Converts the raw query into typed filters.
    ///
    /// Malformed dates, years, months and quarters are rejected. Week values
    /// that are not integers in 1-5 are dropped without error.
    pub fn from_query(query: &ReportFilterQuery) -> AppResult<Self> {
        let organisation_id = query.organisation_id.trim();
        if organisation_id.is_empty() {
            return Err(AppError::BadRequest(
                "organisation_id is required.".to_string(),
            ));
        }
        validate_input(query)?;

        let exact_date = query.date.as_deref().map(parse_date).transpose()?;
        let date_range = match (query.start_date.as_deref(), query.end_date.as_deref()) {
            (Some(start), Some(end)) => {
                let start = parse_date(start)?;
                let end = parse_date(end)?;
                if start > end {
                    return Err(AppError::BadRequest(
                        "start_date must not be after end_date.".to_string(),
                    ));
                }
                Some(DateRange { start, end })
            }
            (None, None) => None,
            _ => {
                return Err(AppError::BadRequest(
                    "start_date and end_date must be provided together.".to_string(),
                ))
            }
        };

        let years = query
            .year
            .iter()
            .map(|raw| parse_int::<i32>("year", raw))
            .collect::<AppResult<BTreeSet<_>>>()?;
        let months = query
            .month
            .iter()
            .map(|raw| parse_bounded("month", raw, 1..=12))
            .collect::<AppResult<BTreeSet<_>>>()?;
        let quarters = query
            .quarter
            .iter()
            .map(|raw| parse_bounded("quarter", raw, 1..=4))
            .collect::<AppResult<BTreeSet<_>>>()?;

        Ok(Self {
            organisation_id: organisation_id.to_string(),
            exact_date,
            date_range,
            years,
            months,
            quarters,
            ..Self::default()
        }
        .with_weeks(query.week.iter().filter_map(|raw| raw.trim().parse::<i64>().ok())))
    }

    /// Adds week-of-month values, silently discarding anything outside 1-5.
    pub fn with_weeks<I>(mut self, weeks: I) -> Self
    where
        I: IntoIterator<Item = i64>,
    {
        self.weeks_of_month.extend(
            weeks
                .into_iter()
                .filter_map(|week| u32::try_from(week).ok())
                .filter(|week| WEEK_OF_MONTH_RANGE.contains(week)),
        );
        self
    }

    /// True when any filter narrows the time axis. Without one the default
    /// trailing window applies.
    pub fn has_temporal_filter(&self) -> bool {
        self.exact_date.is_some()
            || self.date_range.is_some()
            || !self.years.is_empty()
            || !self.months.is_empty()
            || !self.weeks_of_month.is_empty()
            || !self.quarters.is_empty()
    }

    /// Stable textual fingerprint, used to key cached responses.
    pub fn fingerprint(&self) -> String {
        fn join<T: ToString>(values: &BTreeSet<T>) -> String {
            values
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        }

        format!(
            "org={}|date={}|range={}|y={}|m={}|w={}|q={}",
            self.organisation_id,
            self.exact_date.map(|date| date.to_string()).unwrap_or_default(),
            self.date_range
                .map(|range| format!("{}..{}", range.start, range.end))
                .unwrap_or_default(),
            join(&self.years),
            join(&self.months),
            join(&self.weeks_of_month),
            join(&self.quarters),
        )
    }
}

/// Strict `YYYY-MM-DD`; chrono alone would also take unpadded `2025-3-4`.
pub fn parse_date(value: &str) -> AppResult<NaiveDate> {
    let trimmed = value.trim();
    let invalid =
        || AppError::BadRequest(format!("Invalid ISO date '{trimmed}'. Expected YYYY-MM-DD."));
    if trimmed.len() != 10 {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|_| invalid())
}

fn parse_int<T: std::str::FromStr>(field: &str, raw: &str) -> AppResult<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| AppError::BadRequest(format!("Invalid {field} '{}'.", raw.trim())))
}

fn parse_bounded(field: &str, raw: &str, bounds: std::ops::RangeInclusive<u32>) -> AppResult<u32> {
    let value = parse_int::<u32>(field, raw)?;
    if !bounds.contains(&value) {
        return Err(AppError::BadRequest(format!(
            "{field} must be between {} and {}.",
            bounds.start(),
            bounds.end()
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{week_of_month, FilterParams};
    use crate::{error::AppError, schemas::ReportFilterQuery};

    fn params(raw: &str) -> Result<FilterParams, AppError> {
        FilterParams::from_query(&ReportFilterQuery::from_query_string(Some(raw)))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn computes_week_of_month() {
        assert_eq!(week_of_month(date(2025, 3, 1)), 1);
        assert_eq!(week_of_month(date(2025, 3, 7)), 1);
        assert_eq!(week_of_month(date(2025, 3, 8)), 2);
        assert_eq!(week_of_month(date(2025, 3, 28)), 4);
        assert_eq!(week_of_month(date(2025, 3, 29)), 5);
        assert_eq!(week_of_month(date(2025, 3, 31)), 5);
    }

    #[test]
    fn requires_organisation() {
        assert!(matches!(params("month=3"), Err(AppError::BadRequest(_))));
        assert!(matches!(
            params("organisation_id=%20%20"),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn rejects_malformed_dates() {
        assert!(matches!(
            params("organisation_id=UNI0024&date=2025-13-01"),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            params("organisation_id=UNI0024&start_date=01/01/2025&end_date=2025-01-31"),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn requires_zero_padded_dates() {
        assert!(matches!(
            params("organisation_id=UNI0024&date=2025-3-4"),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            params("organisation_id=UNI0024&start_date=2025-03-01&end_date=2025-3-31"),
            Err(AppError::BadRequest(_))
        ));
        let parsed = params("organisation_id=UNI0024&date=%202025-03-04%20").expect("padded date");
        assert_eq!(parsed.exact_date.map(|date| date.to_string()).as_deref(), Some("2025-03-04"));
    }

    #[test]
    fn rejects_half_open_or_inverted_ranges() {
        assert!(params("organisation_id=UNI0024&start_date=2025-01-01").is_err());
        assert!(params("organisation_id=UNI0024&end_date=2025-01-01").is_err());
        assert!(
            params("organisation_id=UNI0024&start_date=2025-02-01&end_date=2025-01-01").is_err()
        );
    }

    #[test]
    fn drops_out_of_range_weeks_silently() {
        let parsed = params("organisation_id=UNI0024&week=0&week=2&week=6&week=abc&week=-1")
            .expect("weeks never fail");
        assert_eq!(parsed.weeks_of_month.into_iter().collect::<Vec<_>>(), vec![2]);

        let parsed = params("organisation_id=UNI0024&week=9").expect("weeks never fail");
        assert!(parsed.weeks_of_month.is_empty());
        assert!(!parsed.has_temporal_filter());
    }

    #[test]
    fn rejects_out_of_range_months_and_quarters() {
        assert!(params("organisation_id=UNI0024&month=13").is_err());
        assert!(params("organisation_id=UNI0024&month=march").is_err());
        assert!(params("organisation_id=UNI0024&quarter=5").is_err());
        assert!(params("organisation_id=UNI0024&year=twenty").is_err());
    }

    #[test]
    fn normalises_full_query() {
        let parsed = params(
            "organisation_id=UNI0024&start_date=2025-01-01&end_date=2025-03-31&month=3&month=1&month=3&quarter=1&year=2024",
        )
        .expect("valid filters");
        assert_eq!(parsed.organisation_id, "UNI0024");
        assert_eq!(parsed.date_range.map(|range| range.start), Some(date(2025, 1, 1)));
        assert_eq!(parsed.months.iter().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(parsed.quarters.len(), 1);
        assert!(parsed.years.contains(&2024));
        assert!(parsed.has_temporal_filter());
    }

    #[test]
    fn fingerprint_ignores_input_order() {
        let left = params("organisation_id=UNI0024&month=4&month=3").expect("valid");
        let right = params("organisation_id=UNI0024&month=3,4").expect("valid");
        assert_eq!(left.fingerprint(), right.fingerprint());
        assert_ne!(
            left.fingerprint(),
            FilterParams::for_organisation("UNI0024").fingerprint()
        );
    }
}
