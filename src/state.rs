use std::{sync::Arc, time::Duration};

use moka::future::Cache;
use serde_json::Value;
use sqlx::PgPool;

use crate::{config::AppConfig, db::build_pool, services::quarter_map::QuarterMap};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: Option<PgPool>,
    pub quarter_map: QuarterMap,
    pub report_cache: Cache<String, Value>,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, sqlx::Error> {
        let db_pool = build_pool(&config)?;
        let quarter_map = QuarterMap::new(config.fiscal_year_start_month);
        let report_cache = Cache::builder()
            .max_capacity(config.report_response_cache_max_entries)
            .time_to_live(Duration::from_secs(
                config.report_response_cache_ttl_seconds.max(1),
            ))
            .build();

        Ok(Self {
            config: Arc::new(config),
            db_pool,
            quarter_map,
            report_cache,
        })
    }
}
