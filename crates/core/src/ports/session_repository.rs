//! Session/served-item/response persistence. `answer` needs a
//! row-level lock spanning a read of session/served-items/ability and a
//! write of response/ability/served-item, so the repository hands out a
//! transaction handle rather than one-shot methods.

use async_trait::async_trait;
use cat_domain::{ResponseRecord, ServedItem, Session};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A transaction begun by [`SessionRepository::begin_answer`], holding the
/// row-level lock on the session for its lifetime. Adapters implement this
/// over a single `sqlx::Transaction`; dropping without calling `commit`
/// rolls back.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SessionTransaction: Send + Sync {
    async fn session(&mut self) -> anyhow::Result<Session>;

    async fn served_items(&mut self) -> anyhow::Result<Vec<ServedItem>>;

    /// (θ, SE) for a (learner, topic) pair, creating with (0.0, 1.0) if absent.
    async fn ability_get_or_init(&mut self, learner_id: Uuid, topic_id: Uuid) -> anyhow::Result<(f64, f64)>;

    async fn ability_put(&mut self, learner_id: Uuid, topic_id: Uuid, theta: f64, se: f64) -> anyhow::Result<()>;

    async fn insert_response(&mut self, response: &ResponseRecord) -> anyhow::Result<()>;

    async fn insert_served_item(&mut self, served: &ServedItem) -> anyhow::Result<()>;

    async fn finish_session(&mut self, finished_at: DateTime<Utc>) -> anyhow::Result<()>;

    /// Commits all writes made through this handle. On failure the handle
    /// is gone; the caller must redo `begin_answer` and replay its writes
    /// to retry.
    async fn commit(self: Box<Self>) -> anyhow::Result<()>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Creates a session and its first served item atomically.
    async fn create_session(&self, session: &Session, first_item: &ServedItem) -> anyhow::Result<()>;

    /// Acquires the row-level lock on the session, returning `None` if the
    /// session id is unknown. The returned handle must be committed or
    /// dropped by the caller.
    async fn begin_answer(&self, session_id: Uuid) -> anyhow::Result<Option<Box<dyn SessionTransaction>>>;
}
