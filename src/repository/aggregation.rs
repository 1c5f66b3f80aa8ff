use std::collections::HashSet;

use serde_json::Value;
use sqlx::{postgres::PgRow, Postgres, QueryBuilder, Row};

use crate::{
    error::{AppError, AppResult},
    repository::report_catalog::{AggregateFn, MetricSpec, SourceRef},
    services::{
        buckets::{BucketSpec, GroupExpr, LabelExpr, OrderKey},
        predicates::{DatePart, Predicate, PredicateList},
    },
};

const LABEL_ALIAS: &str = "label";
const BUCKET_START_ALIAS: &str = "bucket_start";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricColumn {
    pub column: &'static str,
    pub alias: &'static str,
    pub function: AggregateFn,
}

impl From<&MetricSpec> for MetricColumn {
    fn from(spec: &MetricSpec) -> Self {
        Self {
            column: spec.column,
            alias: spec.alias,
            function: spec.function,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SelectItem {
    BucketLabel(LabelExpr),
    BucketStart(OrderKey),
    Metric(MetricColumn),
}

/// Executable description of one bucketed aggregation. Rendering to SQL happens
/// in [`render_query`]; values never leave their typed form before binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryDescriptor {
    pub source: SourceRef,
    pub select: Vec<SelectItem>,
    pub predicates: Vec<Predicate>,
    pub group_by: Vec<GroupExpr>,
    pub order_by: OrderKey,
}

pub fn build_aggregation(
    predicates: &PredicateList,
    bucket: &BucketSpec,
    source: SourceRef,
    metrics: &[MetricColumn],
) -> AppResult<QueryDescriptor> {
    if metrics.is_empty() {
        return Err(AppError::Internal(
            "Aggregation requires at least one metric.".to_string(),
        ));
    }

    let mut aliases = HashSet::from([LABEL_ALIAS, BUCKET_START_ALIAS]);
    for metric in metrics {
        if !aliases.insert(metric.alias) {
            return Err(AppError::Internal(format!(
                "Metric alias '{}' is used more than once.",
                metric.alias
            )));
        }
    }

    let mut select = vec![
        SelectItem::BucketLabel(bucket.label),
        SelectItem::BucketStart(bucket.order_by),
    ];
    select.extend(metrics.iter().copied().map(SelectItem::Metric));

    Ok(QueryDescriptor {
        source,
        select,
        predicates: predicates.predicates.clone(),
        group_by: bucket.group_by.clone(),
        order_by: bucket.order_by,
    })
}

/// Renders the descriptor as a parameterised Postgres query that yields one
/// `row_to_json` object per bucket, oldest bucket first.
pub fn render_query(descriptor: &QueryDescriptor) -> AppResult<QueryBuilder<'static, Postgres>> {
    let table = validate_identifier(descriptor.source.table)?;
    let date = format!("t.{}::date", validate_identifier(descriptor.source.date_column)?);
    let organisation = validate_identifier(descriptor.source.organisation_column)?;

    let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(r) AS row FROM (SELECT ");
    {
        let mut separated = query.separated(", ");
        for item in &descriptor.select {
            match item {
                SelectItem::BucketLabel(label) => {
                    separated.push(label_sql(*label, &date));
                    separated.push_unseparated(format!(" AS {LABEL_ALIAS}"));
                }
                SelectItem::BucketStart(order) => {
                    separated.push(bucket_start_sql(*order, &date));
                    separated.push_unseparated(format!(" AS {BUCKET_START_ALIAS}"));
                }
                SelectItem::Metric(metric) => {
                    let column = validate_identifier(metric.column)?;
                    let alias = validate_identifier(metric.alias)?;
                    separated.push(metric_sql(metric.function, column));
                    separated.push_unseparated(format!(" AS {alias}"));
                }
            }
        }
    }
    query.push(" FROM ").push(table).push(" t WHERE 1=1");

    for predicate in &descriptor.predicates {
        query.push(" AND ");
        match predicate {
            Predicate::Organisation(id) => {
                query
                    .push(format!("t.{organisation}::text = "))
                    .push_bind(id.clone());
            }
            Predicate::DateEquals(value) => {
                query.push(format!("{date} = ")).push_bind(*value);
            }
            Predicate::DateBetween(range) => {
                query
                    .push(format!("{date} BETWEEN "))
                    .push_bind(range.start)
                    .push(" AND ")
                    .push_bind(range.end);
            }
            Predicate::DatePartIn { part, values } => {
                query
                    .push(date_part_sql(*part, &date))
                    .push(" = ANY(")
                    .push_bind(values.clone())
                    .push(")");
            }
        }
    }

    if !descriptor.group_by.is_empty() {
        query.push(" GROUP BY ");
        let mut separated = query.separated(", ");
        for group in &descriptor.group_by {
            separated.push(group_sql(*group, &date));
        }
    }

    query
        .push(") r ORDER BY r.")
        .push(BUCKET_START_ALIAS)
        .push(" ASC");
    Ok(query)
}

/// Runs the aggregation. Any driver failure aborts the whole request; rows
/// already received are discarded.
pub async fn fetch_aggregate(
    pool: &sqlx::PgPool,
    descriptor: &QueryDescriptor,
) -> AppResult<Vec<Value>> {
    let mut query = render_query(descriptor)?;
    let rows = query
        .build()
        .fetch_all(pool)
        .await
        .map_err(|error| map_db_error(error, descriptor))?;
    read_rows(rows, descriptor)
}

fn read_rows(rows: Vec<PgRow>, descriptor: &QueryDescriptor) -> AppResult<Vec<Value>> {
    collect_rows(
        rows.iter().map(|row| row.try_get::<Option<Value>, _>("row")),
        descriptor,
    )
}

/// A bucket that fails to decode, or decodes to NULL, fails the whole series.
fn collect_rows(
    decoded: impl IntoIterator<Item = Result<Option<Value>, sqlx::Error>>,
    descriptor: &QueryDescriptor,
) -> AppResult<Vec<Value>> {
    decoded
        .into_iter()
        .map(|row| match row {
            Ok(Some(value)) => Ok(value),
            Ok(None) => {
                let error = sqlx::Error::ColumnDecode {
                    index: "row".to_string(),
                    source: "aggregate row decoded to NULL".into(),
                };
                Err(map_db_error(error, descriptor))
            }
            Err(error) => Err(map_db_error(error, descriptor)),
        })
        .collect()
}

fn label_sql(label: LabelExpr, date: &str) -> String {
    match label {
        LabelExpr::IsoDate => format!("to_char({date}, 'YYYY-MM-DD')"),
        LabelExpr::WeekOfMonth => format!(
            "concat('Week ', {}, '-', {})",
            week_of_month_sql(date),
            month_label_sql(date)
        ),
        LabelExpr::MonthLabel => month_label_sql(date),
    }
}

fn bucket_start_sql(order: OrderKey, date: &str) -> String {
    match order {
        OrderKey::Date => date.to_string(),
        OrderKey::MinDate => format!("MIN({date})"),
    }
}

fn group_sql(group: GroupExpr, date: &str) -> String {
    match group {
        GroupExpr::Date => date.to_string(),
        GroupExpr::WeekOfMonth => week_of_month_sql(date),
        GroupExpr::MonthLabel => month_label_sql(date),
    }
}

fn metric_sql(function: AggregateFn, column: &str) -> String {
    match function {
        AggregateFn::Sum => format!("COALESCE(SUM(COALESCE(t.{column}, 0)), 0)"),
        AggregateFn::Avg => format!("ROUND(AVG(t.{column})::numeric, 2)"),
    }
}

fn date_part_sql(part: DatePart, date: &str) -> String {
    match part {
        DatePart::Year => format!("EXTRACT(YEAR FROM {date})::int"),
        DatePart::Month => format!("EXTRACT(MONTH FROM {date})::int"),
        DatePart::WeekOfMonth => week_of_month_sql(date),
    }
}

fn week_of_month_sql(date: &str) -> String {
    format!("((EXTRACT(DAY FROM {date})::int - 1) / 7 + 1)")
}

fn month_label_sql(date: &str) -> String {
    format!("to_char({date}, 'Mon YYYY')")
}

fn validate_identifier(identifier: &str) -> AppResult<&str> {
    let trimmed = identifier.trim();
    let valid = !trimmed.is_empty()
        && trimmed.chars().all(|character| {
            character.is_ascii_lowercase() || character.is_ascii_digit() || character == '_'
        })
        && !trimmed
            .chars()
            .next()
            .is_some_and(|first| first.is_ascii_digit());
    if valid {
        return Ok(trimmed);
    }
    Err(AppError::Internal(format!(
        "Invalid identifier '{trimmed}' in report definition."
    )))
}

fn map_db_error(error: sqlx::Error, descriptor: &QueryDescriptor) -> AppError {
    let organisation_id = descriptor
        .predicates
        .iter()
        .find_map(|predicate| match predicate {
            Predicate::Organisation(id) => Some(id.as_str()),
            _ => None,
        })
        .unwrap_or_default();
    let predicate = descriptor
        .predicates
        .iter()
        .map(Predicate::describe)
        .collect::<Vec<_>>()
        .join(" AND ");
    tracing::error!(
        db_error = %error,
        organisation_id,
        table = descriptor.source.table,
        predicate = %predicate,
        group_by = ?descriptor.group_by,
        "Aggregation query failed"
    );
    AppError::AggregationFailed("Aggregation query failed.".to_string())
}
