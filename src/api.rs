//! Control API: a thin JSON-over-HTTP dispatcher over the job registry and
//! the search engine.
//!
//! | Method | Path | Effect |
//! |---|---|---|
//! | POST | `/crawler/create` | Create and start a job |
//! | GET | `/crawler/status/{id}` | Full status snapshot |
//! | POST | `/crawler/pause/{id}` | Active -> Paused |
//! | POST | `/crawler/resume/{id}` | Paused -> Active |
//! | POST | `/crawler/stop/{id}` | Active/Paused -> Stopped |
//! | POST | `/crawler/resume-from-files/{id}` | Rebuild from disk -> Active |
//! | GET | `/crawler/list` | All crawlers |
//! | GET | `/crawler/stats` | Platform counters |
//! | POST | `/crawler/clear` | Wipe all persisted state |
//! | GET | `/search` | Paginated ranked query |
//! | GET | `/search/random` | Random indexed word |
//!
//! Every error is `{"error": "<message>"}` with 400 for bad input, 404 for
//! unknown jobs, 409 for illegal transitions, and 500 otherwise.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::config::JobConfig;
use crate::error::CrawlError;
use crate::registry::JobRegistry;
use crate::search::{SearchEngine, SortBy};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<JobRegistry>,
    pub search: Arc<SearchEngine>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/crawler/create", post(create_crawler))
        .route("/crawler/status/{id}", get(crawler_status))
        .route("/crawler/pause/{id}", post(pause_crawler))
        .route("/crawler/resume/{id}", post(resume_crawler))
        .route("/crawler/stop/{id}", post(stop_crawler))
        .route("/crawler/resume-from-files/{id}", post(resume_from_files))
        .route("/crawler/list", get(list_crawlers))
        .route("/crawler/stats", get(crawler_stats))
        .route("/crawler/clear", post(clear_all))
        .route("/search", get(search))
        .route("/search/random", get(random_word))
        .with_state(state)
}

/// Adapter giving every registry error its documented status code.
pub struct ApiError(CrawlError);

impl From<CrawlError> for ApiError {
    fn from(error: CrawlError) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CrawlError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CrawlError::NotFound(_) => StatusCode::NOT_FOUND,
            CrawlError::IllegalTransition(_) => StatusCode::CONFLICT,
            CrawlError::Persistence(_) | CrawlError::Fatal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn create_crawler(
    State(state): State<AppState>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(body) = body.map_err(|e| CrawlError::invalid(format!("invalid JSON body: {e}")))?;
    let config: JobConfig = serde_json::from_value(body)
        .map_err(|e| CrawlError::invalid(format!("invalid crawler config: {e}")))?;

    let crawler_id = state.registry.create(config)?;
    Ok(Json(json!({ "crawler_id": crawler_id, "status": "Active" })))
}

async fn crawler_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let snapshot = state.registry.get(&id)?;
    Ok(Json(snapshot).into_response())
}

async fn pause_crawler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.registry.pause(&id)?;
    Ok(Json(json!({ "crawler_id": id, "status": "Paused" })))
}

async fn resume_crawler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.registry.resume(&id)?;
    Ok(Json(json!({ "crawler_id": id, "status": "Active" })))
}

async fn stop_crawler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.registry.stop(&id)?;
    Ok(Json(json!({ "crawler_id": id, "status": "Stopped" })))
}

async fn resume_from_files(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.registry.resume_from_files(&id)?;
    Ok(Json(json!({ "crawler_id": id, "status": "Active" })))
}

async fn list_crawlers(State(state): State<AppState>) -> Result<Response, ApiError> {
    let listing = state.registry.list()?;
    Ok(Json(listing).into_response())
}

async fn crawler_stats(State(state): State<AppState>) -> Result<Response, ApiError> {
    let stats = state.registry.stats()?;
    Ok(Json(stats).into_response())
}

async fn clear_all(State(state): State<AppState>) -> Result<Response, ApiError> {
    let report = state.registry.clear_all()?;
    Ok(Json(report).into_response())
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: Option<String>,
    #[serde(rename = "pageLimit", default = "default_page_limit")]
    page_limit: usize,
    #[serde(rename = "pageOffset", default)]
    page_offset: usize,
    #[serde(rename = "sortBy")]
    sort_by: Option<String>,
}

fn default_page_limit() -> usize {
    10
}

async fn search(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) =
        params.map_err(|e| CrawlError::invalid(format!("invalid query parameters: {e}")))?;
    let query = params
        .query
        .ok_or_else(|| CrawlError::invalid("missing required parameter: query"))?;
    let sort_by = match params.sort_by.as_deref() {
        Some(raw) => SortBy::from_str(raw).map_err(CrawlError::InvalidInput)?,
        None => SortBy::default(),
    };

    let response = state
        .search
        .search(&query, params.page_limit, params.page_offset, sort_by)
        .map_err(CrawlError::from)?;
    Ok(Json(response).into_response())
}

async fn random_word(State(state): State<AppState>) -> Result<Response, ApiError> {
    match state.search.random_word().map_err(CrawlError::from)? {
        Some(word) => Ok(Json(json!({ "word": word })).into_response()),
        None => Err(CrawlError::NotFound("no words indexed yet".to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (CrawlError::invalid("x"), StatusCode::BAD_REQUEST),
            (
                CrawlError::NotFound("x".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                CrawlError::IllegalTransition("x".to_string()),
                StatusCode::CONFLICT,
            ),
            (
                CrawlError::Fatal("x".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            let response = ApiError(error).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
