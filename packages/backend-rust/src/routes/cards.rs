use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use vocab_srs::Grade;

use crate::response::{created, ok, AppError};
use crate::routes::parse_id;
use crate::services::cards::{CreateCardInput, UpdateCardInput};
use crate::services::study::ReviewCardInput;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/entries", post(register_entry))
        .route("/api/cards", post(create_card))
        .route("/api/cards/:id", get(get_card).patch(update_card))
        .route("/api/cards/:id/history", get(card_history))
        .route("/api/cards/:id/audit", get(card_audit))
        .route("/api/cards/:id/review", post(review_card))
}

#[derive(Debug, Deserialize)]
struct RegisterEntryRequest {
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewRequest {
    grade: Grade,
    duration_ms: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryQuery {
    limit: Option<i64>,
}

async fn register_entry(
    State(state): State<AppState>,
    body: Result<Json<RegisterEntryRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(body) = body?;
    let entry = state.cards().register_entry(&body.text).await?;
    Ok(created(entry))
}

async fn create_card(
    State(state): State<AppState>,
    body: Result<Json<CreateCardInput>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(input) = body?;
    let card = state.cards().create_card(input).await?;
    Ok(created(card))
}

async fn get_card(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let card = state.cards().get_card(parse_id(&id)?).await?;
    Ok(ok(card))
}

async fn update_card(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<UpdateCardInput>, JsonRejection>,
) -> Result<Response, AppError> {
    let card_id = parse_id(&id)?;
    let Json(input) = body?;
    let card = state.cards().update_card(card_id, input).await?;
    Ok(ok(card))
}

async fn card_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let card_id = parse_id(&id)?;
    let Query(query) = query?;
    let logs = state.reviews().card_history(card_id, query.limit).await?;
    Ok(ok(logs))
}

async fn card_audit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let records = state.cards().audit_trail(parse_id(&id)?).await?;
    Ok(ok(records))
}

async fn review_card(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<ReviewRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let card_id = parse_id(&id)?;
    let Json(body) = body?;

    let result = state
        .reviews()
        .review_card(ReviewCardInput {
            card_id,
            grade: body.grade,
            duration_ms: body.duration_ms,
            reviewed_at: None,
        })
        .await?;
    Ok(ok(result))
}
