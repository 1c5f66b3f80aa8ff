use chrono::{Datelike, Months, NaiveDate};

use crate::{
    error::{AppError, AppResult},
    services::{
        quarter_map::QuarterMap,
        temporal_filters::{DateRange, FilterParams},
    },
};

/// Number of calendar months covered by the default window, current month included.
pub const DEFAULT_WINDOW_MONTHS: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatePart {
    Year,
    Month,
    WeekOfMonth,
}

impl DatePart {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::WeekOfMonth => "week_of_month",
        }
    }
}

/// One condition of the WHERE clause. Values stay typed so the SQL layer can
/// bind them; nothing here is ever spliced into query text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Predicate {
    Organisation(String),
    DateEquals(NaiveDate),
    DateBetween(DateRange),
    DatePartIn { part: DatePart, values: Vec<i32> },
}

impl Predicate {
    pub fn describe(&self) -> String {
        match self {
            Self::Organisation(id) => format!("organisation = {id}"),
            Self::DateEquals(date) => format!("date = {date}"),
            Self::DateBetween(range) => format!("date BETWEEN {} AND {}", range.start, range.end),
            Self::DatePartIn { part, values } => format!(
                "{}(date) IN ({})",
                part.as_str(),
                values
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

/// Which branch scoped the date axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateScope {
    ExactDate,
    DateRange,
    Years,
    /// Only month/week/quarter refinements: rows from any year qualify.
    RefinementsOnly,
    DefaultWindow,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PredicateList {
    pub predicates: Vec<Predicate>,
    pub scope: DateScope,
    /// Set only when no temporal filter was supplied.
    pub default_window: Option<DateRange>,
}

impl PredicateList {
    pub fn describe(&self) -> String {
        self.predicates
            .iter()
            .map(Predicate::describe)
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

/// Resolves filters into an ordered predicate list.
///
/// The organisation scope always comes first. Exactly one of exact date, date
/// range or year set scopes the date axis (in that precedence); month, week and
/// quarter refinements are ANDed on top of whichever branch fired. With no
/// temporal filter at all, the trailing twelve-month window anchored on
/// `today` is applied.
pub fn build_predicates(
    params: &FilterParams,
    quarter_map: &QuarterMap,
    today: NaiveDate,
) -> AppResult<PredicateList> {
    let organisation_id = params.organisation_id.trim();
    if organisation_id.is_empty() {
        return Err(AppError::BadRequest(
            "organisation_id is required.".to_string(),
        ));
    }

    let mut predicates = vec![Predicate::Organisation(organisation_id.to_string())];

    let mut scope = if let Some(date) = params.exact_date {
        predicates.push(Predicate::DateEquals(date));
        DateScope::ExactDate
    } else if let Some(range) = params.date_range {
        predicates.push(Predicate::DateBetween(range));
        DateScope::DateRange
    } else if !params.years.is_empty() {
        predicates.push(Predicate::DatePartIn {
            part: DatePart::Year,
            values: params.years.iter().copied().collect(),
        });
        DateScope::Years
    } else {
        DateScope::RefinementsOnly
    };

    if !params.months.is_empty() {
        predicates.push(Predicate::DatePartIn {
            part: DatePart::Month,
            values: as_i32(params.months.iter().copied()),
        });
    }

    if !params.weeks_of_month.is_empty() {
        predicates.push(Predicate::DatePartIn {
            part: DatePart::WeekOfMonth,
            values: as_i32(params.weeks_of_month.iter().copied()),
        });
    }

    let quarter_months = quarter_map.expand(&params.quarters);
    if !quarter_months.is_empty() {
        predicates.push(Predicate::DatePartIn {
            part: DatePart::Month,
            values: as_i32(quarter_months),
        });
    }

    let mut default_window = None;
    if !params.has_temporal_filter() {
        let window = trailing_window(today, DEFAULT_WINDOW_MONTHS)?;
        tracing::debug!(
            organisation_id,
            from = %window.start,
            to = %window.end,
            "No temporal filter supplied, applying default window"
        );
        predicates.push(Predicate::DateBetween(window));
        default_window = Some(window);
        scope = DateScope::DefaultWindow;
    }

    Ok(PredicateList {
        predicates,
        scope,
        default_window,
    })
}

/// `months` whole calendar months ending with the month containing `today`.
pub fn trailing_window(today: NaiveDate, months: u32) -> AppResult<DateRange> {
    let overflow = || AppError::Internal("Default reporting window is out of range.".to_string());

    let month_start = today.with_day(1).ok_or_else(overflow)?;
    let start = month_start
        .checked_sub_months(Months::new(months.saturating_sub(1)))
        .ok_or_else(overflow)?;
    let end = month_start
        .checked_add_months(Months::new(1))
        .and_then(|next_month| next_month.pred_opt())
        .ok_or_else(overflow)?;
    Ok(DateRange { start, end })
}

fn as_i32<I: IntoIterator<Item = u32>>(values: I) -> Vec<i32> {
    values
        .into_iter()
        .filter_map(|value| i32::try_from(value).ok())
        .collect()
}
