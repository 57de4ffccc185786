//! Log-level admin endpoints
//!
//! Mounted under [`ADMIN_PREFIX`]:
//!
//! | Method | Path | Purpose |
//! |---|---|---|
//! | GET | `level?logger=` | current status of one logger |
//! | PUT | `level?logger=&level=&seconds=` | override a logger temporarily |
//! | GET | `modifications` | active overrides with remaining time |
//! | PUT | `reset?logger=` | undo one override |
//! | PUT | `reset-all` | undo every override |
//! | GET | `loggers` | known loggers and their levels |
//! | GET | `stats` | override counters |
//!
//! ```bash
//! curl -X PUT 'http://localhost:8080/admin/logging/level?logger=app::db&level=DEBUG&seconds=120'
//! ```

use crate::error::ApiError;
use axum::{
    Json, Router,
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, put},
};
use opsctl_core::level::{
    LevelOverrides, LevelStatus, LoggerInfo, LoggerRegistry, ModificationView, OverrideRecord,
    OverrideStats, ResetOutcome, RestoredRecord,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::info;

/// Path the admin router is nested under.
pub const ADMIN_PREFIX: &str = "/admin/logging";

#[derive(Debug, Default, Deserialize)]
pub struct LoggerParams {
    logger: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SetLevelParams {
    logger: Option<String>,
    level: Option<String>,
    seconds: Option<String>,
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ApiError::MissingParameter(name))
}

/// Build the admin router. Paths are relative; nest it under [`ADMIN_PREFIX`].
pub fn admin_router(overrides: LevelOverrides) -> Router {
    Router::new()
        .route("/level", get(get_level).put(put_level))
        .route("/modifications", get(get_modifications))
        .route("/reset", put(put_reset))
        .route("/reset-all", put(put_reset_all))
        .route("/loggers", get(get_loggers))
        .route("/stats", get(get_stats))
        .with_state(overrides)
}

async fn get_level(
    State(overrides): State<LevelOverrides>,
    Query(params): Query<LoggerParams>,
) -> Result<Json<LevelStatus>, ApiError> {
    let logger = required(params.logger, "logger")?;
    Ok(Json(overrides.query_level(&logger)))
}

async fn put_level(
    State(overrides): State<LevelOverrides>,
    Query(params): Query<SetLevelParams>,
) -> Result<Json<OverrideRecord>, ApiError> {
    let logger = required(params.logger, "logger")?;
    let level = required(params.level, "level")?;
    let raw_seconds = required(params.seconds, "seconds")?;
    let seconds: i64 = raw_seconds
        .trim()
        .parse()
        .map_err(|_| ApiError::InvalidParameter {
            name: "seconds",
            value: raw_seconds.clone(),
        })?;

    let record = overrides.set_level(&logger, &level, seconds)?;
    Ok(Json(record))
}

async fn get_modifications(
    State(overrides): State<LevelOverrides>,
) -> Json<BTreeMap<String, ModificationView>> {
    Json(
        overrides
            .query_modifications()
            .into_iter()
            .map(|view| (view.record.logger.clone(), view))
            .collect(),
    )
}

async fn put_reset(
    State(overrides): State<LevelOverrides>,
    Query(params): Query<LoggerParams>,
) -> Result<Json<RestoredRecord>, ApiError> {
    let logger = required(params.logger, "logger")?;
    match overrides.reset_level(&logger)? {
        ResetOutcome::Restored(restored) => Ok(Json(restored)),
        ResetOutcome::NotModified => Err(ApiError::NotModified(logger)),
    }
}

async fn put_reset_all(State(overrides): State<LevelOverrides>) -> Json<Vec<RestoredRecord>> {
    let restored = overrides.reset_all();
    info!(count = restored.len(), "Reset all logger overrides");
    Json(restored)
}

async fn get_loggers(State(overrides): State<LevelOverrides>) -> Json<Vec<LoggerInfo>> {
    Json(overrides.registry().loggers())
}

async fn get_stats(State(overrides): State<LevelOverrides>) -> impl IntoResponse {
    Json::<OverrideStats>(overrides.stats())
}
