use std::time::Duration;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use crate::state::AppState;

const DB_PING_TIMEOUT: Duration = Duration::from_secs(3);

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let db = match &state.db_pool {
        Some(pool) => {
            match tokio::time::timeout(DB_PING_TIMEOUT, sqlx::query("SELECT 1").fetch_one(pool))
                .await
            {
                Ok(Ok(_)) => Some(true),
                Ok(Err(error)) => {
                    tracing::error!(error = %error, "Health check DB query failed");
                    Some(false)
                }
                Err(_) => {
                    tracing::error!("Health check DB query timed out");
                    Some(false)
                }
            }
        }
        None => None,
    };

    let status = if db == Some(false) { "degraded" } else { "ok" };
    Json(json!({
        "status": status,
        "app": state.config.app_name,
        "environment": state.config.environment,
        "now": Utc::now().to_rfc3339(),
        "db": db,
        "fiscal_year_start_month": state.quarter_map.start_month(),
        "cached_reports": state.report_cache.entry_count(),
    }))
}
