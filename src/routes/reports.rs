use axum::{
    extract::{Path, RawQuery, State},
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    error::{AppError, AppResult},
    repository::{
        aggregation::{build_aggregation, fetch_aggregate, MetricColumn},
        report_catalog::{find_report, ReportDefinition, REPORTS},
    },
    schemas::ReportFilterQuery,
    services::{
        buckets::{resolve_bucket, BucketSpec},
        predicates::{build_predicates, PredicateList},
        result_shaper::{shape_rows, ShapeContext},
        temporal_filters::FilterParams,
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/reports", axum::routing::get(list_reports))
        .route("/reports/{slug}", axum::routing::get(report_series))
}

async fn list_reports() -> Json<Value> {
    Json(json!({
        "data": REPORTS.iter().map(ReportDefinition::to_json).collect::<Vec<_>>(),
    }))
}

async fn report_series(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    RawQuery(raw_query): RawQuery,
) -> AppResult<Json<Value>> {
    let report = find_report(&slug)
        .ok_or_else(|| AppError::NotFound(format!("Unknown report '{}'.", slug.trim())))?;

    let query = ReportFilterQuery::from_query_string(raw_query.as_deref());
    let params = FilterParams::from_query(&query)?;
    let today = state.config.report_today();

    let predicates = build_predicates(&params, &state.quarter_map, today)?;
    let bucket = resolve_bucket(&params);

    let cache_key = format!("{}|{today}|{}", report.slug, params.fingerprint());
    if let Some(cached) = state.report_cache.get(&cache_key).await {
        return Ok(Json(cached));
    }

    let metrics = report
        .metrics
        .iter()
        .map(MetricColumn::from)
        .collect::<Vec<_>>();
    let descriptor = build_aggregation(&predicates, &bucket, report.source, &metrics)?;

    let pool = db_pool(&state)?;
    let rows = fetch_aggregate(pool, &descriptor).await?;
    let data = shape_rows(
        rows,
        &ShapeContext {
            granularity: bucket.granularity,
            metrics: report.metrics,
            ratios: report.ratios,
        },
    );

    tracing::debug!(
        report = report.slug,
        organisation_id = %params.organisation_id,
        granularity = bucket.granularity.as_str(),
        scope = ?predicates.scope,
        predicate = %predicates.describe(),
        buckets = data.len(),
        "Report series resolved"
    );

    let body = report_body(report, &params, &predicates, &bucket, data);
    state.report_cache.insert(cache_key, body.clone()).await;
    Ok(Json(body))
}

fn report_body(
    report: &ReportDefinition,
    params: &FilterParams,
    predicates: &PredicateList,
    bucket: &BucketSpec,
    data: Vec<Map<String, Value>>,
) -> Value {
    let window = predicates.default_window.map(|window| {
        json!({
            "from": window.start.to_string(),
            "to": window.end.to_string(),
        })
    });

    json!({
        "organisation_id": params.organisation_id,
        "report": report.slug,
        "granularity": bucket.granularity,
        "window": window,
        "data": data,
    })
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}
