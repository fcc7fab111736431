//! Per-(learner, topic) posterior ability store.

use async_trait::async_trait;
use cat_domain::AbilityVector;
use uuid::Uuid;

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AbilityStore: Send + Sync {
    /// Full ability vector for a learner/subject plus the average θ over
    /// existing entries (0.0 if none).
    async fn get_vector(&self, learner_id: Uuid, subject_id: Uuid) -> anyhow::Result<AbilityVector>;

    /// (θ, SE) for a (learner, topic) pair; creates with (0.0, 1.0) if absent.
    async fn get_or_init(&self, learner_id: Uuid, topic_id: Uuid) -> anyhow::Result<(f64, f64)>;

    /// Atomic upsert of θ, SE, and updated_at for a (learner, topic) pair.
    async fn put(&self, learner_id: Uuid, topic_id: Uuid, theta: f64, se: f64) -> anyhow::Result<()>;
}
