//! Rule schema: tagged condition/action variants decoded from the
//! opaque JSON stored on a `Rule` row, plus the `SelectionContext` they
//! produce for the item selector.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Decoded `condition` field of a `Rule`. Unknown `type` tags (or conditions
/// that don't parse into a known shape) decode to `NoOp` rather than failing,
/// so a malformed rule is silently ignored instead of breaking evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleCondition {
    TopicMasteryBelow {
        topic_id: Uuid,
        #[serde(default = "default_mastery_threshold")]
        threshold: f64,
    },
    TopicThetaBelow {
        topic_id: Uuid,
        #[serde(default)]
        threshold: f64,
    },
    SessionStage {
        lte_position: u32,
    },
    ExposureCooldown {
        #[serde(default = "default_cooldown_days")]
        days: i64,
    },
    BlockTopic {
        topic_id: Uuid,
    },
    #[serde(other)]
    NoOp,
}

fn default_mastery_threshold() -> f64 {
    0.5
}

fn default_cooldown_days() -> i64 {
    7
}

/// Decoded `action` field of a `Rule`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleAction {
    BoostTopicProbability {
        #[serde(default = "default_boost_weight")]
        weight: f64,
    },
    SetDifficultyRange {
        b_min: Option<f64>,
        b_max: Option<f64>,
    },
    BlockItems,
    #[serde(other)]
    NoOp,
}

fn default_boost_weight() -> f64 {
    1.2
}

impl RuleCondition {
    /// Best-effort decode: a row whose JSON doesn't match any known shape
    /// becomes `NoOp` instead of an error.
    pub fn decode(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or(RuleCondition::NoOp)
    }
}

impl RuleAction {
    pub fn decode(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or(RuleAction::NoOp)
    }
}

/// A difficulty band gated by session position.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct DifficultyRange {
    pub b_min: Option<f64>,
    pub b_max: Option<f64>,
    pub lte_position: Option<u32>,
}

/// Output of the Rule Evaluator: the constraints and weights the Item
/// Selector applies to candidate items.
#[derive(Debug, Clone, Default)]
pub struct SelectionContext {
    pub topic_boost: HashMap<Uuid, f64>,
    pub difficulty_range: Option<DifficultyRange>,
    pub block_item_ids: HashSet<Uuid>,
}
