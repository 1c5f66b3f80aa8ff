use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::services::temporal_filters::{week_of_month, FilterParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketGranularity {
    Daily,
    WeeklyInMonth,
    Monthly,
}

impl BucketGranularity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::WeeklyInMonth => "weekly_in_month",
            Self::Monthly => "monthly",
        }
    }
}

/// Expression a bucket is grouped on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupExpr {
    Date,
    WeekOfMonth,
    MonthLabel,
}

/// How the human-readable label is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelExpr {
    /// `2025-03-14`
    IsoDate,
    /// `Week 2-Mar 2025`
    WeekOfMonth,
    /// `Mar 2025`
    MonthLabel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderKey {
    Date,
    /// Earliest date inside each group.
    MinDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketSpec {
    pub granularity: BucketGranularity,
    pub label: LabelExpr,
    pub group_by: Vec<GroupExpr>,
    pub order_by: OrderKey,
}

/// Picks the grouping granularity from the shape of the filters.
///
/// A date range or any week filter buckets daily; otherwise a month filter
/// buckets by week within month; everything else (including no filters at
/// all) buckets monthly. Which predicate branch fired is irrelevant here.
pub fn resolve_bucket(params: &FilterParams) -> BucketSpec {
    if params.date_range.is_some() || !params.weeks_of_month.is_empty() {
        return BucketSpec {
            granularity: BucketGranularity::Daily,
            label: LabelExpr::IsoDate,
            group_by: vec![GroupExpr::Date],
            order_by: OrderKey::Date,
        };
    }

    if !params.months.is_empty() {
        return BucketSpec {
            granularity: BucketGranularity::WeeklyInMonth,
            label: LabelExpr::WeekOfMonth,
            group_by: vec![GroupExpr::WeekOfMonth, GroupExpr::MonthLabel],
            order_by: OrderKey::MinDate,
        };
    }

    BucketSpec {
        granularity: BucketGranularity::Monthly,
        label: LabelExpr::MonthLabel,
        group_by: vec![GroupExpr::MonthLabel],
        order_by: OrderKey::MinDate,
    }
}

pub fn format_label(granularity: BucketGranularity, date: NaiveDate) -> String {
    match granularity {
        BucketGranularity::Daily => date.format("%Y-%m-%d").to_string(),
        BucketGranularity::WeeklyInMonth => {
            format!("Week {}-{}", week_of_month(date), date.format("%b %Y"))
        }
        BucketGranularity::Monthly => date.format("%b %Y").to_string(),
    }
}

/// First calendar day covered by a bucket label, if the label is well formed.
pub fn label_period_start(granularity: BucketGranularity, label: &str) -> Option<NaiveDate> {
    let label = label.trim();
    match granularity {
        BucketGranularity::Daily => NaiveDate::parse_from_str(label, "%Y-%m-%d").ok(),
        BucketGranularity::WeeklyInMonth => {
            let (week, month) = label.strip_prefix("Week ")?.split_once('-')?;
            let week = week.trim().parse::<u32>().ok().filter(|w| (1..=5).contains(w))?;
            parse_month_label(month)?.with_day0((week - 1) * 7)
        }
        BucketGranularity::Monthly => parse_month_label(label),
    }
}

fn parse_month_label(label: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&format!("01 {}", label.trim()), "%d %b %Y").ok()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{
        format_label, label_period_start, resolve_bucket, BucketGranularity, GroupExpr, OrderKey,
    };
    use crate::services::temporal_filters::{DateRange, FilterParams};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn no_filters_bucket_monthly() {
        let spec = resolve_bucket(&FilterParams::for_organisation("UNI0024"));
        assert_eq!(spec.granularity, BucketGranularity::Monthly);
        assert_eq!(spec.group_by, vec![GroupExpr::MonthLabel]);
        assert_eq!(spec.order_by, OrderKey::MinDate);
    }

    #[test]
    fn date_range_always_buckets_daily() {
        let mut params = FilterParams::for_organisation("UNI0024");
        params.date_range = Some(DateRange {
            start: date(2025, 1, 1),
            end: date(2025, 3, 31),
        });
        params.months.insert(3);
        params.quarters.insert(2);
        params.years.insert(2025);
        let spec = resolve_bucket(&params);
        assert_eq!(spec.granularity, BucketGranularity::Daily);
        assert_eq!(spec.order_by, OrderKey::Date);
    }

    #[test]
    fn weeks_bucket_daily_even_with_months() {
        let mut params = FilterParams::for_organisation("UNI0024").with_weeks([2]);
        params.months.insert(3);
        assert_eq!(resolve_bucket(&params).granularity, BucketGranularity::Daily);
    }

    #[test]
    fn dropped_weeks_do_not_force_daily() {
        let params = FilterParams::for_organisation("UNI0024").with_weeks([6]);
        assert_eq!(resolve_bucket(&params).granularity, BucketGranularity::Monthly);
    }

    #[test]
    fn months_bucket_weekly_in_month() {
        let mut params = FilterParams::for_organisation("UNI0024");
        params.months.extend([3, 4]);
        let spec = resolve_bucket(&params);
        assert_eq!(spec.granularity, BucketGranularity::WeeklyInMonth);
        assert_eq!(
            spec.group_by,
            vec![GroupExpr::WeekOfMonth, GroupExpr::MonthLabel]
        );
    }

    #[test]
    fn quarter_and_exact_date_bucket_monthly() {
        let mut params = FilterParams::for_organisation("UNI0024");
        params.quarters.insert(1);
        assert_eq!(resolve_bucket(&params).granularity, BucketGranularity::Monthly);

        let mut params = FilterParams::for_organisation("UNI0024");
        params.exact_date = Some(date(2025, 3, 4));
        assert_eq!(resolve_bucket(&params).granularity, BucketGranularity::Monthly);
    }

    #[test]
    fn formats_labels() {
        let day = date(2025, 3, 12);
        assert_eq!(format_label(BucketGranularity::Daily, day), "2025-03-12");
        assert_eq!(
            format_label(BucketGranularity::WeeklyInMonth, day),
            "Week 2-Mar 2025"
        );
        assert_eq!(format_label(BucketGranularity::Monthly, day), "Mar 2025");
    }

    #[test]
    fn reads_period_start_back_from_labels() {
        assert_eq!(
            label_period_start(BucketGranularity::Monthly, "Jan 2025"),
            Some(date(2025, 1, 1))
        );
        assert_eq!(
            label_period_start(BucketGranularity::WeeklyInMonth, "Week 2-Mar 2025"),
            Some(date(2025, 3, 8))
        );
        assert_eq!(
            label_period_start(BucketGranularity::WeeklyInMonth, "Week 5-Feb 2024"),
            Some(date(2024, 2, 29))
        );
        assert_eq!(
            label_period_start(BucketGranularity::Daily, "2025-03-12"),
            Some(date(2025, 3, 12))
        );
        assert_eq!(label_period_start(BucketGranularity::Monthly, "Smarch 2025"), None);
        assert_eq!(
            label_period_start(BucketGranularity::WeeklyInMonth, "Week 9-Mar 2025"),
            None
        );
    }
}
