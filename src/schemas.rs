use validator::Validate;

use crate::error::AppError;

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::BadRequest(format!("Validation failed: {errors}")))
}

/// Report filters exactly as they arrived on the query string.
///
/// Scalar parameters keep their last non-blank occurrence. List parameters
/// accept repeated keys (`month=3&month=4`), bracket keys (`month[]=3`) and
/// comma lists (`month=3,4`); a single value becomes a one-element list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Validate)]
pub struct ReportFilterQuery {
    #[validate(length(min = 1, max = 64))]
    pub organisation_id: String,
    pub date: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub year: Vec<String>,
    pub month: Vec<String>,
    pub week: Vec<String>,
    pub quarter: Vec<String>,
}

impl ReportFilterQuery {
    pub fn from_query_string(raw: Option<&str>) -> Self {
        let mut query = Self::default();
        let Some(raw) = raw else {
            return query;
        };

        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            let key = key.trim();
            let key = key.strip_suffix("[]").unwrap_or(key);
            let value = value.trim();
            match key {
                "organisation_id" | "organization_id" => {
                    if !value.is_empty() {
                        query.organisation_id = value.to_string();
                    }
                }
                "date" => set_scalar(&mut query.date, value),
                "start_date" => set_scalar(&mut query.start_date, value),
                "end_date" => set_scalar(&mut query.end_date, value),
                "year" => push_list(&mut query.year, value),
                "month" => push_list(&mut query.month, value),
                "week" => push_list(&mut query.week, value),
                "quarter" => push_list(&mut query.quarter, value),
                _ => {}
            }
        }
        query
    }
}

fn set_scalar(slot: &mut Option<String>, value: &str) {
    if !value.is_empty() {
        *slot = Some(value.to_string());
    }
}

fn push_list(list: &mut Vec<String>, value: &str) {
    list.extend(
        value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(ToOwned::to_owned),
    );
}
