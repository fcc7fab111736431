//! PostgreSQL-backed access to the active rule set.

use async_trait::async_trait;
use cat_core::ports::RuleRepository;
use cat_domain::Rule;
use sqlx::PgPool;

use crate::StorageError;

#[derive(Clone)]
pub struct RuleRepositoryPg {
    pool: PgPool,
}

impl RuleRepositoryPg {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RuleRow {
    id: uuid::Uuid,
    name: String,
    condition: serde_json::Value,
    action: serde_json::Value,
    is_active: bool,
}

#[async_trait]
impl RuleRepository for RuleRepositoryPg {
    async fn active_rules(&self) -> anyhow::Result<Vec<Rule>> {
        let rows: Vec<RuleRow> =
            sqlx::query_as(r#"SELECT id, name, condition, action, is_active FROM rules WHERE is_active = true"#)
                .fetch_all(&self.pool)
                .await
                .map_err(StorageError::Query)?;
        Ok(rows
            .into_iter()
            .map(|r| Rule {
                id: r.id,
                name: r.name,
                condition: r.condition,
                action: r.action,
                is_active: r.is_active,
            })
            .collect())
    }
}
