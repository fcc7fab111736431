//! Start/answer handlers for CAT sessions.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use cat_domain::{
    AnswerCatRequest, AnswerCatResponse, ServedItemOptionView, ServedItemView, StartCatRequest,
    StartCatResponse,
};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use crate::errors::ApiError;

fn served_item_view(item: cat_core::ports::CandidateItem, position: u32, served_at: chrono::DateTime<chrono::Utc>) -> ServedItemView {
    ServedItemView {
        item_id: item.item.id,
        stem: item.item.stem,
        difficulty_tag: item.item.difficulty_tag,
        options: item
            .item
            .options
            .into_iter()
            .map(|o| ServedItemOptionView {
                option_id: o.id,
                label: o.label,
                text: o.text,
            })
            .collect(),
        position,
        served_at,
    }
}

/// Start a new CAT session.
pub async fn start_cat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartCatRequest>,
) -> Result<Json<StartCatResponse>, ApiError> {
    req.validate().map_err(|e| cat_core::CoreError::BadRequest(e.to_string()))?;

    let mut rng = rand::thread_rng();
    let outcome = state
        .controller
        .start(req.learner_id, req.subject_id, req.target_items, req.locked_topic_id, &mut rng)
        .await?;

    tracing::info!(
        session_id = %outcome.session.id,
        learner_id = %req.learner_id,
        subject_id = %req.subject_id,
        "cat session started"
    );

    Ok(Json(StartCatResponse {
        session_id: outcome.session.id,
        mode: outcome.session.mode,
        ability_vector: outcome.ability_vector,
        first_item: served_item_view(outcome.first_item, 1, outcome.session.started_at),
    }))
}

/// Submit an answer for the current item in a session.
pub async fn answer_cat(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<AnswerCatRequest>,
) -> Result<Json<AnswerCatResponse>, ApiError> {
    req.validate().map_err(|e| cat_core::CoreError::BadRequest(e.to_string()))?;

    let mut rng = rand::thread_rng();
    let outcome = state
        .controller
        .answer(session_id, req.item_id, req.option_id, req.latency_ms, &mut rng)
        .await?;

    tracing::info!(
        session_id = %session_id,
        is_correct = outcome.is_correct,
        theta = outcome.theta,
        se = outcome.se,
        status = ?outcome.session_status,
        "cat answer scored"
    );

    let now = chrono::Utc::now();
    Ok(Json(AnswerCatResponse {
        is_correct: outcome.is_correct,
        theta: outcome.theta,
        se: outcome.se,
        ability_vector: outcome.ability_vector,
        session_status: outcome.session_status,
        next_item: outcome.next_item.map(|item| served_item_view(item, outcome.current_position, now)),
    }))
}
