//! Turns the active rule set plus a learner's recent history into a
//! [`SelectionContext`].

use cat_domain::{AbilityVector, DifficultyRange, Rule, RuleAction, RuleCondition, SelectionContext};
use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use crate::ports::CatalogueView;

const MASTERY_PER_TOPIC: usize = 20;

/// Rule ids already warned about for decoding to `NoOp`, so a persistently
/// malformed rule logs once instead of on every `evaluate` call.
static WARNED_NOOP_RULE_IDS: Lazy<Mutex<HashSet<Uuid>>> = Lazy::new(|| Mutex::new(HashSet::new()));

fn warn_noop_once(rule: &Rule) {
    let mut seen = WARNED_NOOP_RULE_IDS.lock().unwrap();
    if seen.insert(rule.id) {
        tracing::warn!(rule_id = %rule.id, rule_name = %rule.name, "rule decoded to NoOp: unknown condition or action type");
    }
}

/// Mean correctness over the given responses (already window-limited by the
/// caller's `recent_responses` query), grouped by topic and capped at
/// [`MASTERY_PER_TOPIC`] per topic.
pub fn topic_mastery(recent: &[cat_domain::ScoredResponse]) -> HashMap<Uuid, f64> {
    let mut per_topic: HashMap<Uuid, Vec<bool>> = HashMap::new();
    for response in recent.iter() {
        for topic_id in &response.topic_ids {
            let bucket = per_topic.entry(*topic_id).or_default();
            if bucket.len() < MASTERY_PER_TOPIC {
                bucket.push(response.is_correct);
            }
        }
    }
    per_topic
        .into_iter()
        .map(|(topic_id, outcomes)| {
            let mean = outcomes.iter().filter(|c| **c).count() as f64 / outcomes.len() as f64;
            (topic_id, mean)
        })
        .collect()
}

/// Evaluates every active rule against a learner's recent history and
/// ability vector, producing the [`SelectionContext`] the Item Selector
/// consumes.
pub async fn evaluate(
    catalogue: &dyn CatalogueView,
    rules: &[Rule],
    learner_id: Uuid,
    subject_id: Uuid,
    ability: &AbilityVector,
    recent_responses_limit: u32,
) -> anyhow::Result<SelectionContext> {
    let recent = catalogue
        .recent_responses(learner_id, subject_id, recent_responses_limit)
        .await?;
    let mastery = topic_mastery(&recent);

    let mut ctx = SelectionContext::default();
    let mut difficulty_range: Option<DifficultyRange> = None;

    for rule in rules.iter().filter(|r| r.is_active) {
        let condition = RuleCondition::decode(&rule.condition);
        let action = RuleAction::decode(&rule.action);

        if matches!(condition, RuleCondition::NoOp) || matches!(action, RuleAction::NoOp) {
            warn_noop_once(rule);
        }

        match (condition, action) {
            (RuleCondition::TopicMasteryBelow { topic_id, threshold }, RuleAction::BoostTopicProbability { weight }) => {
                let below = mastery.get(&topic_id).map(|m| *m < threshold).unwrap_or(true);
                if below {
                    let slot = ctx.topic_boost.entry(topic_id).or_insert(1.0);
                    *slot = slot.max(weight);
                }
            }
            (RuleCondition::TopicThetaBelow { topic_id, threshold }, RuleAction::BoostTopicProbability { weight }) => {
                let theta = ability.theta_by_topic.get(&topic_id).copied().unwrap_or(0.0);
                if theta < threshold {
                    let slot = ctx.topic_boost.entry(topic_id).or_insert(1.0);
                    *slot = slot.max(weight);
                }
            }
            (RuleCondition::SessionStage { lte_position }, RuleAction::SetDifficultyRange { b_min, b_max }) => {
                difficulty_range = Some(match difficulty_range {
                    None => DifficultyRange {
                        b_min,
                        b_max,
                        lte_position: Some(lte_position),
                    },
                    Some(existing) => narrowest_band(existing, b_min, b_max, lte_position),
                });
            }
            (RuleCondition::ExposureCooldown { days }, RuleAction::BlockItems) => {
                let cutoff = Utc::now() - Duration::days(days);
                let blocked = catalogue.items_answered_since(learner_id, subject_id, cutoff).await?;
                ctx.block_item_ids.extend(blocked);
            }
            (RuleCondition::BlockTopic { topic_id }, RuleAction::BlockItems) => {
                let blocked = block_items_for_topic(catalogue, topic_id).await?;
                ctx.block_item_ids.extend(blocked);
            }
            _ => {
                // Mismatched or unknown condition/action pairing: ignored.
            }
        }
    }

    ctx.difficulty_range = difficulty_range;
    Ok(ctx)
}

/// Resolves two active `session_stage` bands to the narrowest overlap: max
/// of the lower bounds, min of the upper bounds.
fn narrowest_band(
    existing: DifficultyRange,
    b_min: Option<f64>,
    b_max: Option<f64>,
    lte_position: u32,
) -> DifficultyRange {
    DifficultyRange {
        b_min: max_opt(existing.b_min, b_min),
        b_max: min_opt(existing.b_max, b_max),
        lte_position: Some(existing.lte_position.map_or(lte_position, |p| p.max(lte_position))),
    }
}

fn max_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (Some(x), None) => Some(x),
        (None, Some(y)) => Some(y),
        (None, None) => None,
    }
}

fn min_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (Some(x), None) => Some(x),
        (None, Some(y)) => Some(y),
        (None, None) => None,
    }
}

async fn block_items_for_topic(catalogue: &dyn CatalogueView, topic_id: Uuid) -> anyhow::Result<HashSet<Uuid>> {
    let query = crate::ports::CandidateQuery {
        subject_id: catalogue
            .topic_subject_id(topic_id)
            .await?
            .unwrap_or_else(Uuid::nil),
        exclude_ids: Vec::new(),
        b_min: None,
        b_max: None,
        topic_filter: vec![topic_id],
    };
    let items = catalogue.candidate_items(&query).await?;
    Ok(items.into_iter().map(|c| c.item.id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cat_domain::ScoredResponse;
    use chrono::Utc;

    fn response(topic_ids: Vec<Uuid>, is_correct: bool) -> ScoredResponse {
        ScoredResponse {
            item_id: Uuid::new_v4(),
            topic_ids,
            irt: Default::default(),
            is_correct,
            answered_at: Utc::now(),
        }
    }

    #[test]
    fn topic_mastery_computes_mean_correctness() {
        let t1 = Uuid::new_v4();
        let responses = vec![
            response(vec![t1], true),
            response(vec![t1], true),
            response(vec![t1], false),
            response(vec![t1], false),
        ];
        let mastery = topic_mastery(&responses);
        assert_eq!(mastery.get(&t1).copied(), Some(0.5));
    }

    #[test]
    fn topic_mastery_caps_per_topic_window() {
        let t1 = Uuid::new_v4();
        let mut responses = vec![response(vec![t1], true); 20];
        responses.extend(vec![response(vec![t1], false); 20]);
        let mastery = topic_mastery(&responses);
        // Only the first 20 (all correct) count toward the per-topic cap.
        assert_eq!(mastery.get(&t1).copied(), Some(1.0));
    }

    #[test]
    fn narrowest_band_takes_max_min_and_min_max() {
        let existing = DifficultyRange {
            b_min: Some(-1.0),
            b_max: Some(1.0),
            lte_position: Some(5),
        };
        let merged = narrowest_band(existing, Some(-0.5), Some(0.5), 3);
        assert_eq!(merged.b_min, Some(-0.5));
        assert_eq!(merged.b_max, Some(0.5));
    }

    #[tokio::test]
    async fn exposure_cooldown_blocks_every_match_not_just_the_mastery_window() {
        let learner_id = Uuid::new_v4();
        let subject_id = Uuid::new_v4();
        let blocked_item = Uuid::new_v4();

        let mut catalogue = crate::testing::MockCatalogueView::new();
        catalogue.expect_recent_responses().returning(|_, _, _| Ok(vec![]));
        catalogue
            .expect_items_answered_since()
            .withf(move |l, s, _| *l == learner_id && *s == subject_id)
            .returning(move |_, _, _| Ok(std::iter::once(blocked_item).collect()));

        let rule = Rule {
            id: Uuid::new_v4(),
            name: "cooldown".into(),
            condition: serde_json::json!({"type": "exposure_cooldown", "days": 7}),
            action: serde_json::json!({"type": "block_items"}),
            is_active: true,
        };

        let ctx = evaluate(&catalogue, &[rule], learner_id, subject_id, &AbilityVector::default(), 20)
            .await
            .unwrap();
        assert!(ctx.block_item_ids.contains(&blocked_item));
    }
}
