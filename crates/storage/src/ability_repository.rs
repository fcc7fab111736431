//! PostgreSQL-backed ability store.

use async_trait::async_trait;
use cat_core::ports::AbilityStore;
use cat_domain::AbilityVector;
use sqlx::PgPool;
use uuid::Uuid;

use crate::StorageError;

#[derive(Clone)]
pub struct AbilityRepository {
    pool: PgPool,
}

impl AbilityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AbilityStore for AbilityRepository {
    async fn get_vector(&self, learner_id: Uuid, subject_id: Uuid) -> anyhow::Result<AbilityVector> {
        let rows: Vec<(Uuid, f64, f64)> = sqlx::query_as(
            r#"
            SELECT ap.topic_id, ap.theta, ap.se
            FROM ability_points ap
            JOIN topics t ON t.id = ap.topic_id
            WHERE ap.learner_id = $1 AND t.subject_id = $2
            "#,
        )
        .bind(learner_id)
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)?;

        let mut theta_by_topic = std::collections::HashMap::with_capacity(rows.len());
        let mut se_by_topic = std::collections::HashMap::with_capacity(rows.len());
        for (topic_id, theta, se) in rows {
            theta_by_topic.insert(topic_id, theta);
            se_by_topic.insert(topic_id, se);
        }
        let avg_theta = if theta_by_topic.is_empty() {
            0.0
        } else {
            theta_by_topic.values().sum::<f64>() / theta_by_topic.len() as f64
        };
        Ok(AbilityVector {
            theta_by_topic,
            se_by_topic,
            avg_theta,
        })
    }

    async fn get_or_init(&self, learner_id: Uuid, topic_id: Uuid) -> anyhow::Result<(f64, f64)> {
        let row: Option<(f64, f64)> =
            sqlx::query_as(r#"SELECT theta, se FROM ability_points WHERE learner_id = $1 AND topic_id = $2"#)
                .bind(learner_id)
                .bind(topic_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(StorageError::Query)?;
        Ok(row.unwrap_or((0.0, 1.0)))
    }

    async fn put(&self, learner_id: Uuid, topic_id: Uuid, theta: f64, se: f64) -> anyhow::Result<()> {
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
        .execute(&self.pool)
        .await
        .map_err(StorageError::Query)?;
        Ok(())
    }
}
