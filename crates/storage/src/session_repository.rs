//! PostgreSQL-backed session/served-item/response persistence.
//!
//! `begin_answer` issues `SELECT ... FOR UPDATE` to acquire the row-level
//! lock before any reads or writes happen through the returned
//! [`SessionTransactionPg`] handle. A failed commit can't be retried in
//! place (see [`SessionTransactionPg::commit`]).

use async_trait::async_trait;
use cat_core::ports::{SessionRepository, SessionTransaction};
use cat_domain::{ResponseRecord, ServedItem, Session, SessionMode, SessionStatus};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::StorageError;

#[derive(Clone)]
pub struct SessionRepositoryPg {
    pool: PgPool,
}

impl SessionRepositoryPg {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    learner_id: Uuid,
    subject_id: Uuid,
    locked_topic_id: Option<Uuid>,
    mode: String,
    target_items: i32,
    status: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl SessionRow {
    fn into_domain(self) -> Session {
        Session {
            id: self.id,
            learner_id: self.learner_id,
            subject_id: self.subject_id,
            locked_topic_id: self.locked_topic_id,
            mode: if self.mode == "fixed" { SessionMode::Fixed } else { SessionMode::Cat },
            target_items: self.target_items as u32,
            status: if self.status == "finished" { SessionStatus::Finished } else { SessionStatus::Ongoing },
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

#[async_trait]
impl SessionRepository for SessionRepositoryPg {
    async fn create_session(&self, session: &Session, first_item: &ServedItem) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await.map_err(StorageError::Query)?;

        sqlx::query(
            r#"
            INSERT INTO sessions (id, learner_id, subject_id, locked_topic_id, mode, target_items, status, started_at, finished_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(session.id)
        .bind(session.learner_id)
        .bind(session.subject_id)
        .bind(session.locked_topic_id)
        .bind(mode_str(session.mode))
        .bind(session.target_items as i32)
        .bind(status_str(session.status))
        .bind(session.started_at)
        .bind(session.finished_at)
        .execute(&mut *tx)
        .await
        .map_err(StorageError::Query)?;

        insert_served_item(&mut tx, first_item).await?;

        tx.commit().await.map_err(StorageError::Query)?;
        Ok(())
    }

    async fn begin_answer(&self, session_id: Uuid) -> anyhow::Result<Option<Box<dyn SessionTransaction>>> {
        let mut tx = self.pool.begin().await.map_err(StorageError::Query)?;

        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, learner_id, subject_id, locked_topic_id, mode, target_items, status, started_at, finished_at
            FROM sessions WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(StorageError::Query)?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Box::new(SessionTransactionPg {
            tx: Some(tx),
            session: row.into_domain(),
        })))
    }
}

fn mode_str(mode: SessionMode) -> &'static str {
    match mode {
        SessionMode::Cat => "cat",
        SessionMode::Fixed => "fixed",
    }
}

fn status_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Ongoing => "ongoing",
        SessionStatus::Finished => "finished",
    }
}

async fn insert_served_item(tx: &mut Transaction<'_, Postgres>, served: &ServedItem) -> Result<(), StorageError> {
    sqlx::query(
        r#"INSERT INTO served_items (session_id, item_id, position, served_at) VALUES ($1, $2, $3, $4)"#,
    )
    .bind(served.session_id)
    .bind(served.item_id)
    .bind(served.position as i32)
    .bind(served.served_at)
    .execute(&mut **tx)
    .await
    .map_err(StorageError::Query)?;
    Ok(())
}

/// Live transaction handle backing one `answer` call. Holds the row lock on
/// the session for its entire lifetime; dropping without `commit` rolls back.
struct SessionTransactionPg {
    tx: Option<Transaction<'static, Postgres>>,
    session: Session,
}

impl SessionTransactionPg {
    fn tx_mut(&mut self) -> &mut Transaction<'static, Postgres> {
        self.tx.as_mut().expect("transaction used after commit")
    }
}

#[async_trait]
impl SessionTransaction for SessionTransactionPg {
    async fn session(&mut self) -> anyhow::Result<Session> {
        Ok(self.session.clone())
    }

    async fn served_items(&mut self) -> anyhow::Result<Vec<ServedItem>> {
        let session_id = self.session.id;
        let rows: Vec<(Uuid, Uuid, i32, DateTime<Utc>)> = sqlx::query_as(
            r#"SELECT session_id, item_id, position, served_at FROM served_items WHERE session_id = $1 ORDER BY position"#,
        )
        .bind(session_id)
        .fetch_all(&mut *self.tx_mut())
        .await
        .map_err(StorageError::Query)?;
        Ok(rows
            .into_iter()
            .map(|(session_id, item_id, position, served_at)| ServedItem {
                session_id,
                item_id,
                position: position as u32,
                served_at,
            })
            .collect())
    }

    async fn ability_get_or_init(&mut self, learner_id: Uuid, topic_id: Uuid) -> anyhow::Result<(f64, f64)> {
        let row: Option<(f64, f64)> = sqlx::query_as(
            r#"SELECT theta, se FROM ability_points WHERE learner_id = $1 AND topic_id = $2 FOR UPDATE"#,
        )
        .bind(learner_id)
        .bind(topic_id)
        .fetch_optional(&mut *self.tx_mut())
        .await
        .map_err(StorageError::Query)?;
        Ok(row.unwrap_or((0.0, 1.0)))
    }

    async fn ability_put(&mut self, learner_id: Uuid, topic_id: Uuid, theta: f64, se: f64) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ability_points (learner_id, topic_id, theta, se, updated_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (learner_id, topic_id)
            DO UPDATE SET theta = EXCLUDED.theta, se = EXCLUDED.se, updated_at = now()
            "#,
        )
        .bind(learner_id)
        .bind(topic_id)
        .bind(theta)
        .bind(se)
        .execute(&mut *self.tx_mut())
        .await
        .map_err(StorageError::Query)?;
        Ok(())
    }

    async fn insert_response(&mut self, response: &ResponseRecord) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO responses (session_id, item_id, option_id, is_correct, latency_ms, answered_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(response.session_id)
        .bind(response.item_id)
        .bind(response.option_id)
        .bind(response.is_correct)
        .bind(response.latency_ms)
        .bind(response.answered_at)
        .execute(&mut *self.tx_mut())
        .await
        .map_err(StorageError::Query)?;
        Ok(())
    }

    async fn insert_served_item(&mut self, served: &ServedItem) -> anyhow::Result<()> {
        let tx = self.tx_mut();
        insert_served_item(tx, served).await?;
        Ok(())
    }

    async fn finish_session(&mut self, finished_at: DateTime<Utc>) -> anyhow::Result<()> {
        let session_id = self.session.id;
        sqlx::query(r#"UPDATE sessions SET status = 'finished', finished_at = $1 WHERE id = $2"#)
            .bind(finished_at)
            .bind(session_id)
            .execute(&mut *self.tx_mut())
            .await
            .map_err(StorageError::Query)?;
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> anyhow::Result<()> {
        let tx = self.tx.take().expect("transaction used after commit");
        // sqlx::Transaction::commit consumes self, so a failed commit can't
        // be retried in place here. It surfaces as CoreError::Storage; a
        // caller that wants to retry must redo begin_answer and replay its
        // writes against a fresh transaction.
        tx.commit().await.map_err(StorageError::Query)?;
        Ok(())
    }
}
