//! The rating endpoint.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tracing::debug;

use crate::api::error::ApiError;
use crate::api::server::AppState;
use crate::meter::{NewsItem, Verdict};

/// POST /meter — rate a JSON array of news items.
///
/// Provider and parse failures still answer 200 with a fallback verdict;
/// only a malformed or empty body (400) and configuration problems (500)
/// are reported as errors.
pub async fn rate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Vec<NewsItem>>, JsonRejection>,
) -> Result<Json<Verdict>, ApiError> {
    let Json(items) = payload.map_err(|rejection| {
        debug!(error = %rejection, "Rejected /meter body");
        ApiError::bad_request("Invalid request body")
    })?;
    let verdict = state.meter.rate(&items).await?;
    Ok(Json(verdict))
}
