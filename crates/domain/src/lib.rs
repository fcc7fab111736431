//! Domain types for the CAT engine: entities, rule schema, and request/response DTOs.

pub mod dto;
pub mod rules;

pub use dto::*;
pub use rules::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Human difficulty tag, independent of the calibrated IRT `b` parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyTag {
    Easy,
    Medium,
    Hard,
}

/// Test mode. The core only implements CAT; FIXED is an external collaborator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Cat,
    Fixed,
}

/// Session lifecycle state. ONGOING -> FINISHED is the only transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Ongoing,
    Finished,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemOption {
    pub id: Uuid,
    pub item_id: Uuid,
    pub label: String,
    pub text: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub stem: String,
    pub difficulty_tag: Option<DifficultyTag>,
    pub avg_time_ms: Option<i32>,
    pub options: Vec<ItemOption>,
}

/// 1:1 with `Item`. Any of `a`, `b`, `c` may be absent
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ItemIrt {
    pub a: Option<f64>,
    pub b: Option<f64>,
    pub c: Option<f64>,
}

impl ItemIrt {
    /// True when all three parameters are calibrated and the item is eligible
    /// for information-based scoring.
    pub fn is_fully_calibrated(&self) -> bool {
        self.a.is_some() && self.b.is_some() && self.c.is_some()
    }
}

/// (learner, topic) -> posterior ability estimate. Default prior: θ=0, SE=1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AbilityPoint {
    pub learner_id: Uuid,
    pub topic_id: Uuid,
    pub theta: f64,
    pub se: f64,
    pub updated_at: DateTime<Utc>,
}

/// Per-topic ability vector plus the subject-wide average, used whenever an
/// item carries no topic tags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AbilityVector {
    pub theta_by_topic: HashMap<Uuid, f64>,
    pub se_by_topic: HashMap<Uuid, f64>,
    pub avg_theta: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub learner_id: Uuid,
    pub subject_id: Uuid,
    pub locked_topic_id: Option<Uuid>,
    pub mode: SessionMode,
    pub target_items: u32,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServedItem {
    pub session_id: Uuid,
    pub item_id: Uuid,
    pub position: u32,
    pub served_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub session_id: Uuid,
    pub item_id: Uuid,
    pub option_id: Uuid,
    pub is_correct: bool,
    pub latency_ms: Option<i32>,
    pub answered_at: DateTime<Utc>,
}

/// A single historical response joined with the responding item's IRT
/// parameters and topic tags, as returned by `CatalogueView::recent_responses`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredResponse {
    pub item_id: Uuid,
    pub topic_ids: Vec<Uuid>,
    pub irt: ItemIrt,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

/// Persisted rule row. `condition`/`action` are opaque JSON until
/// decoded by [`rules::RuleCondition`]/[`rules::RuleAction`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: Uuid,
    pub name: String,
    pub condition: serde_json::Value,
    pub action: serde_json::Value,
    pub is_active: bool,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub build_sha: String,
    pub uptime_seconds: u64,
}

/// Ready check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub database: String,
}
