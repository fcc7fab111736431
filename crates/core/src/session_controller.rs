//! Orchestrates start -> serve -> answer -> update -> decide -> stop.

use cat_domain::{ResponseRecord, ServedItem, Session, SessionMode, SessionStatus};
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::{CoreError, CoreResult};
use crate::irt::{update_theta, IrtParams, Observation};
use crate::ports::{AbilityStore, CatalogueView, RuleRepository, SessionRepository};
use crate::rule_evaluator;
use crate::selector::{self, SelectorInput};

const MIN_TARGET_ITEMS: u32 = 3;

/// Tunable parameters for ability estimation and the stopping rule, sourced
/// from environment configuration at the transport edge rather than
/// hardcoded, so operators can retune without a rebuild.
#[derive(Debug, Clone, Copy)]
pub struct SessionControllerConfig {
    pub irt_prior_var: f64,
    pub stop_se_threshold: f64,
    pub irt_max_iterations: u32,
    pub recent_responses_limit: u32,
}

impl Default for SessionControllerConfig {
    fn default() -> Self {
        Self {
            irt_prior_var: 1.0,
            stop_se_threshold: 0.30,
            irt_max_iterations: 25,
            recent_responses_limit: 200,
        }
    }
}

pub struct StartOutcome {
    pub session: Session,
    pub ability_vector: cat_domain::AbilityVector,
    pub first_item: crate::ports::CandidateItem,
}

pub struct AnswerOutcome {
    pub is_correct: bool,
    pub theta: f64,
    pub se: f64,
    pub ability_vector: cat_domain::AbilityVector,
    pub session_status: SessionStatus,
    pub current_position: u32,
    pub target_items: u32,
    pub next_item: Option<crate::ports::CandidateItem>,
}

/// Coordinates the IRT kernel, rule evaluator, and item selector against the
/// persistence ports. Has no direct dependency on any storage or transport
/// crate, so it is testable with mock ports.
pub struct SessionController {
    catalogue: Arc<dyn CatalogueView>,
    ability: Arc<dyn AbilityStore>,
    rules: Arc<dyn RuleRepository>,
    sessions: Arc<dyn SessionRepository>,
    config: SessionControllerConfig,
}

impl SessionController {
    pub fn new(
        catalogue: Arc<dyn CatalogueView>,
        ability: Arc<dyn AbilityStore>,
        rules: Arc<dyn RuleRepository>,
        sessions: Arc<dyn SessionRepository>,
        config: SessionControllerConfig,
    ) -> Self {
        Self {
            catalogue,
            ability,
            rules,
            sessions,
            config,
        }
    }

    #[instrument(skip(self, rng))]
    pub async fn start<R: Rng>(
        &self,
        learner_id: Uuid,
        subject_id: Uuid,
        target_items: u32,
        locked_topic_id: Option<Uuid>,
        rng: &mut R,
    ) -> CoreResult<StartOutcome> {
        if target_items < MIN_TARGET_ITEMS {
            return Err(CoreError::BadRequest(format!(
                "target_items must be >= {MIN_TARGET_ITEMS}"
            )));
        }

        if let Some(topic_id) = locked_topic_id {
            let owner = self.catalogue.topic_subject_id(topic_id).await?;
            match owner {
                Some(owner_subject) if owner_subject == subject_id => {}
                _ => {
                    return Err(CoreError::TopicNotInSubject { topic_id, subject_id });
                }
            }
        }

        let ability = self.ability.get_vector(learner_id, subject_id).await?;
        let rules = self.rules.active_rules().await?;
        let ctx = rule_evaluator::evaluate(
            self.catalogue.as_ref(),
            &rules,
            learner_id,
            subject_id,
            &ability,
            self.config.recent_responses_limit,
        )
        .await?;

        let topic_filter: Vec<Uuid> = locked_topic_id.into_iter().collect();
        let chosen = selector::select_next(
            self.catalogue.as_ref(),
            SelectorInput {
                subject_id,
                used_ids: &[],
                ctx: &ctx,
                position: Some(1),
                topic_filter: &topic_filter,
                ability: &ability,
            },
            rng,
        )
        .await?;

        let Some(first_item) = chosen else {
            return Err(CoreError::NoEligibleItem);
        };

        let session = Session {
            id: Uuid::new_v4(),
            learner_id,
            subject_id,
            locked_topic_id,
            mode: SessionMode::Cat,
            target_items,
            status: SessionStatus::Ongoing,
            started_at: Utc::now(),
            finished_at: None,
        };
        let served = ServedItem {
            session_id: session.id,
            item_id: first_item.item.id,
            position: 1,
            served_at: Utc::now(),
        };

        self.sessions.create_session(&session, &served).await?;
        info!(session_id = %session.id, item_id = %first_item.item.id, "session started");

        Ok(StartOutcome {
            session,
            ability_vector: ability,
            first_item,
        })
    }

    #[instrument(skip(self, rng))]
    pub async fn answer<R: Rng>(
        &self,
        session_id: Uuid,
        item_id: Uuid,
        option_id: Uuid,
        latency_ms: Option<i32>,
        rng: &mut R,
    ) -> CoreResult<AnswerOutcome> {
        let mut tx = self
            .sessions
            .begin_answer(session_id)
            .await?
            .ok_or(CoreError::SessionNotFound(session_id))?;

        let session = tx.session().await?;
        if session.status != SessionStatus::Ongoing {
            return Err(CoreError::SessionNotOngoing(session_id));
        }

        let served_items = tx.served_items().await?;
        if !served_items.iter().any(|s| s.item_id == item_id) {
            return Err(CoreError::ItemNotServed { session_id, item_id });
        }

        let option = self
            .catalogue
            .option_of(item_id, option_id)
            .await?
            .ok_or(CoreError::OptionMismatch { item_id, option_id })?;

        let response = ResponseRecord {
            session_id,
            item_id,
            option_id,
            is_correct: option.is_correct,
            latency_ms,
            answered_at: Utc::now(),
        };
        tx.insert_response(&response).await?;

        let topic_map = self.catalogue.topics_of(&[item_id]).await?;
        let item_topics = topic_map.get(&item_id).cloned().unwrap_or_default();
        let item_irt = self.catalogue.irt_of(item_id).await?;

        let mut touched_se = Vec::with_capacity(item_topics.len());
        for topic_id in &item_topics {
            let (theta_prior, _se_prior) = tx.ability_get_or_init(session.learner_id, *topic_id).await?;
            let observation = Observation {
                params: IrtParams {
                    a: item_irt.a,
                    b: item_irt.b,
                    c: item_irt.c,
                },
                correct: response.is_correct,
            };
            let (theta, se) = update_theta(
                theta_prior,
                &[observation],
                Some(self.config.irt_prior_var),
                self.config.irt_max_iterations,
            );
            tx.ability_put(session.learner_id, *topic_id, theta, se).await?;
            touched_se.push(se);
        }

        let ability = self.ability.get_vector(session.learner_id, session.subject_id).await?;

        let served_count = served_items.len() as u32;
        let mean_se = if touched_se.is_empty() {
            1.0
        } else {
            touched_se.iter().sum::<f64>() / touched_se.len() as f64
        };
        let mut stop = mean_se < self.config.stop_se_threshold || served_count >= session.target_items;

        let mut next_item = None;
        if !stop {
            let rules = self.rules.active_rules().await?;
            let ctx = rule_evaluator::evaluate(
                self.catalogue.as_ref(),
                &rules,
                session.learner_id,
                session.subject_id,
                &ability,
                self.config.recent_responses_limit,
            )
            .await?;
            let used_ids: Vec<Uuid> = served_items.iter().map(|s| s.item_id).collect();
            let topic_filter: Vec<Uuid> = session.locked_topic_id.into_iter().collect();

            let chosen = selector::select_next(
                self.catalogue.as_ref(),
                SelectorInput {
                    subject_id: session.subject_id,
                    used_ids: &used_ids,
                    ctx: &ctx,
                    position: Some(served_count + 1),
                    topic_filter: &topic_filter,
                    ability: &ability,
                },
                rng,
            )
            .await?;

            match chosen {
                Some(item) => {
                    let served = ServedItem {
                        session_id,
                        item_id: item.item.id,
                        position: served_count + 1,
                        served_at: Utc::now(),
                    };
                    tx.insert_served_item(&served).await?;
                    next_item = Some(item);
                }
                None => {
                    stop = true;
                    warn!(session_id = %session_id, "no eligible item remains, ending session early");
                }
            }
        }

        let current_position = if next_item.is_some() { served_count + 1 } else { served_count };

        if stop {
            tx.finish_session(Utc::now()).await?;
        }
        tx.commit().await?;

        let theta = item_topics
            .first()
            .and_then(|t| ability.theta_by_topic.get(t).copied())
            .unwrap_or(ability.avg_theta);
        let se = mean_se;

        Ok(AnswerOutcome {
            is_correct: response.is_correct,
            theta,
            se,
            ability_vector: ability,
            session_status: if stop { SessionStatus::Finished } else { SessionStatus::Ongoing },
            current_position,
            target_items: session.target_items,
            next_item,
        })
    }
}
