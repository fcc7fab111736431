//! Request/response shapes for the thin HTTP binding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{AbilityVector, DifficultyTag, SessionMode};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StartCatRequest {
    pub learner_id: Uuid,
    pub subject_id: Uuid,
    pub locked_topic_id: Option<Uuid>,
    #[validate(range(min = 1, max = 200))]
    pub target_items: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartCatResponse {
    pub session_id: Uuid,
    pub mode: SessionMode,
    pub ability_vector: AbilityVector,
    pub first_item: ServedItemView,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AnswerCatRequest {
    pub item_id: Uuid,
    pub option_id: Uuid,
    #[validate(range(min = 0))]
    pub latency_ms: Option<i32>,
}

/// Returned after scoring an answer: the updated ability
/// estimate, whether the session just finished, and the next item to serve
/// (absent once the session is FINISHED).
#[derive(Debug, Clone, Serialize)]
pub struct AnswerCatResponse {
    pub is_correct: bool,
    pub theta: f64,
    pub se: f64,
    pub ability_vector: AbilityVector,
    pub session_status: crate::SessionStatus,
    pub next_item: Option<ServedItemView>,
}

/// Item payload handed to a client: the stem and answer options, without any
/// IRT parameters or correctness flags.
#[derive(Debug, Clone, Serialize)]
pub struct ServedItemView {
    pub item_id: Uuid,
    pub stem: String,
    pub difficulty_tag: Option<DifficultyTag>,
    pub options: Vec<ServedItemOptionView>,
    pub position: u32,
    pub served_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServedItemOptionView {
    pub option_id: Uuid,
    pub label: String,
    pub text: String,
}
