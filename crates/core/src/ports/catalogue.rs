//! Read-only catalogue queries used by the Selector and the Controller.

use async_trait::async_trait;
use cat_domain::{Item, ItemIrt, ItemOption, ScoredResponse};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub subject_id: Uuid,
    pub exclude_ids: Vec<Uuid>,
    pub b_min: Option<f64>,
    pub b_max: Option<f64>,
    pub topic_filter: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct CandidateItem {
    pub item: Item,
    pub irt: ItemIrt,
    pub topic_ids: Vec<Uuid>,
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CatalogueView: Send + Sync {
    /// Most-recent-first response history for a learner in a subject.
    async fn recent_responses(
        &self,
        learner_id: Uuid,
        subject_id: Uuid,
        limit: u32,
    ) -> anyhow::Result<Vec<ScoredResponse>>;

    /// Every item the learner answered in this subject at or after `since`,
    /// unbounded. Exposure-cooldown blocking needs every response in the
    /// window, not just however many fit in `recent_responses`'s limit.
    async fn items_answered_since(
        &self,
        learner_id: Uuid,
        subject_id: Uuid,
        since: DateTime<Utc>,
    ) -> anyhow::Result<HashSet<Uuid>>;

    /// item_id -> set of tagged topic ids, for the given items.
    async fn topics_of(&self, item_ids: &[Uuid]) -> anyhow::Result<HashMap<Uuid, Vec<Uuid>>>;

    /// Candidates honoring exclusions, optional difficulty band, optional topic filter.
    async fn candidate_items(&self, query: &CandidateQuery) -> anyhow::Result<Vec<CandidateItem>>;

    /// Same filters as `candidate_items`, minus the IRT join; one uniformly random match.
    async fn random_candidate(&self, query: &CandidateQuery) -> anyhow::Result<Option<CandidateItem>>;

    /// IRT parameters for a single item (possibly partially missing).
    async fn irt_of(&self, item_id: Uuid) -> anyhow::Result<ItemIrt>;

    async fn correct_option_of(&self, item_id: Uuid) -> anyhow::Result<Option<ItemOption>>;

    async fn option_of(&self, item_id: Uuid, option_id: Uuid) -> anyhow::Result<Option<ItemOption>>;

    async fn topic_subject_id(&self, topic_id: Uuid) -> anyhow::Result<Option<Uuid>>;
}
