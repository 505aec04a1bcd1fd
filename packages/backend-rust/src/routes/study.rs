use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use vocab_srs::CardStatus;

use crate::response::{ok, AppError};
use crate::services::study::StudyQueueRequest;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/study/queue", get(study_queue))
        .route("/api/study/stats", get(study_stats))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueueQuery {
    limit: Option<i64>,
    /// Comma-separated statuses, e.g. `NEW,LEARNING`.
    status: Option<String>,
    #[serde(default)]
    with_entries: bool,
}

async fn study_queue(
    State(state): State<AppState>,
    query: Result<Query<QueueQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(query) = query?;
    let request = StudyQueueRequest {
        limit: query.limit,
        statuses: parse_statuses(query.status.as_deref())?,
    };

    if query.with_entries {
        let items = state.reviews().study_queue_entries(request).await?;
        Ok(ok(items))
    } else {
        let cards = state.reviews().study_queue(request).await?;
        Ok(ok(cards))
    }
}

async fn study_stats(State(state): State<AppState>) -> Result<Response, AppError> {
    let stats = state.reviews().dashboard_stats().await?;
    Ok(ok(stats))
}

fn parse_statuses(raw: Option<&str>) -> Result<Option<Vec<CardStatus>>, AppError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let statuses = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<CardStatus>()
                .map_err(|err| AppError::invalid_input(err.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(statuses))
}
