//! PostgreSQL-backed read side of the catalogue.

use async_trait::async_trait;
use cat_core::ports::{CandidateItem, CandidateQuery, CatalogueView};
use cat_domain::{Item, ItemIrt, ItemOption, ScoredResponse};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::StorageError;

#[derive(Clone)]
pub struct CatalogueRepository {
    pool: PgPool,
}

impl CatalogueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn options_for(&self, item_id: Uuid) -> Result<Vec<ItemOption>, StorageError> {
        let rows: Vec<ItemOptionRow> = sqlx::query_as(
            r#"SELECT id, item_id, label, text, is_correct FROM item_options WHERE item_id = $1 ORDER BY label"#,
        )
        .bind(item_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)?;
        Ok(rows.into_iter().map(ItemOptionRow::into_domain).collect())
    }

    async fn load_candidates(&self, rows: Vec<ItemRow>) -> Result<Vec<CandidateItem>, StorageError> {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let options = self.options_for(row.id).await?;
            let topic_ids = self.topic_ids_for(row.id).await?;
            out.push(CandidateItem {
                item: Item {
                    id: row.id,
                    subject_id: row.subject_id,
                    stem: row.stem,
                    difficulty_tag: row.difficulty_tag.and_then(|t| parse_difficulty(&t)),
                    avg_time_ms: row.avg_time_ms,
                    options,
                },
                irt: ItemIrt {
                    a: row.a,
                    b: row.b,
                    c: row.c,
                },
                topic_ids,
            });
        }
        Ok(out)
    }

    async fn topic_ids_for(&self, item_id: Uuid) -> Result<Vec<Uuid>, StorageError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(r#"SELECT topic_id FROM item_tags WHERE item_id = $1"#)
            .bind(item_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::Query)?;
        Ok(rows.into_iter().map(|(t,)| t).collect())
    }
}

fn parse_difficulty(raw: &str) -> Option<cat_domain::DifficultyTag> {
    match raw {
        "easy" => Some(cat_domain::DifficultyTag::Easy),
        "medium" => Some(cat_domain::DifficultyTag::Medium),
        "hard" => Some(cat_domain::DifficultyTag::Hard),
        _ => None,
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    subject_id: Uuid,
    stem: String,
    difficulty_tag: Option<String>,
    avg_time_ms: Option<i32>,
    a: Option<f64>,
    b: Option<f64>,
    c: Option<f64>,
}

#[derive(Debug, sqlx::FromRow)]
struct ItemOptionRow {
    id: Uuid,
    item_id: Uuid,
    label: String,
    text: String,
    is_correct: bool,
}

impl ItemOptionRow {
    fn into_domain(self) -> ItemOption {
        ItemOption {
            id: self.id,
            item_id: self.item_id,
            label: self.label,
            text: self.text,
            is_correct: self.is_correct,
        }
    }
}

#[async_trait]
impl CatalogueView for CatalogueRepository {
    async fn recent_responses(
        &self,
        learner_id: Uuid,
        subject_id: Uuid,
        limit: u32,
    ) -> anyhow::Result<Vec<ScoredResponse>> {
        let rows: Vec<ResponseRow> = sqlx::query_as(
            r#"
            SELECT r.item_id, r.is_correct, r.answered_at, ii.a, ii.b, ii.c
            FROM responses r
            JOIN sessions s ON s.id = r.session_id
            LEFT JOIN item_irt ii ON ii.item_id = r.item_id
            WHERE s.learner_id = $1 AND s.subject_id = $2
            ORDER BY r.answered_at DESC
            LIMIT $3
            "#,
        )
        .bind(learner_id)
        .bind(subject_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let topic_ids = self.topic_ids_for(row.item_id).await.map_err(anyhow::Error::from)?;
            out.push(ScoredResponse {
                item_id: row.item_id,
                topic_ids,
                irt: ItemIrt {
                    a: row.a,
                    b: row.b,
                    c: row.c,
                },
                is_correct: row.is_correct,
                answered_at: row.answered_at,
            });
        }
        Ok(out)
    }

    async fn items_answered_since(
        &self,
        learner_id: Uuid,
        subject_id: Uuid,
        since: DateTime<Utc>,
    ) -> anyhow::Result<HashSet<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT r.item_id
            FROM responses r
            JOIN sessions s ON s.id = r.session_id
            WHERE s.learner_id = $1 AND s.subject_id = $2 AND r.answered_at >= $3
            "#,
        )
        .bind(learner_id)
        .bind(subject_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)?;
        Ok(rows.into_iter().map(|(item_id,)| item_id).collect())
    }

    async fn topics_of(&self, item_ids: &[Uuid]) -> anyhow::Result<HashMap<Uuid, Vec<Uuid>>> {
        if item_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(Uuid, Uuid)> =
            sqlx::query_as(r#"SELECT item_id, topic_id FROM item_tags WHERE item_id = ANY($1)"#)
                .bind(item_ids)
                .fetch_all(&self.pool)
                .await
                .map_err(StorageError::Query)?;
        let mut map: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for (item_id, topic_id) in rows {
            map.entry(item_id).or_default().push(topic_id);
        }
        Ok(map)
    }

    async fn candidate_items(&self, query: &CandidateQuery) -> anyhow::Result<Vec<CandidateItem>> {
        let rows: Vec<ItemRow> = sqlx::query_as(
            r#"
            SELECT i.id, i.subject_id, i.stem, i.difficulty_tag, i.avg_time_ms, ii.a, ii.b, ii.c
            FROM items i
            LEFT JOIN item_irt ii ON ii.item_id = i.id
            WHERE i.subject_id = $1
              AND NOT (i.id = ANY($2))
              AND ($3::double precision IS NULL OR ii.b >= $3)
              AND ($4::double precision IS NULL OR ii.b <= $4)
              AND (
                  array_length($5::uuid[], 1) IS NULL
                  OR EXISTS (SELECT 1 FROM item_tags t WHERE t.item_id = i.id AND t.topic_id = ANY($5))
              )
            "#,
        )
        .bind(query.subject_id)
        .bind(&query.exclude_ids)
        .bind(query.b_min)
        .bind(query.b_max)
        .bind(&query.topic_filter)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)?;

        self.load_candidates(rows).await.map_err(anyhow::Error::from)
    }

    async fn random_candidate(&self, query: &CandidateQuery) -> anyhow::Result<Option<CandidateItem>> {
        let rows: Vec<ItemRow> = sqlx::query_as(
            r#"
            SELECT i.id, i.subject_id, i.stem, i.difficulty_tag, i.avg_time_ms, ii.a, ii.b, ii.c
            FROM items i
            LEFT JOIN item_irt ii ON ii.item_id = i.id
            WHERE i.subject_id = $1
              AND NOT (i.id = ANY($2))
              AND (
                  array_length($3::uuid[], 1) IS NULL
                  OR EXISTS (SELECT 1 FROM item_tags t WHERE t.item_id = i.id AND t.topic_id = ANY($3))
              )
            ORDER BY random()
            LIMIT 1
            "#,
        )
        .bind(query.subject_id)
        .bind(&query.exclude_ids)
        .bind(&query.topic_filter)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)?;

        let candidates = self.load_candidates(rows).await.map_err(anyhow::Error::from)?;
        Ok(candidates.into_iter().next())
    }

    async fn irt_of(&self, item_id: Uuid) -> anyhow::Result<ItemIrt> {
        let row: Option<(Option<f64>, Option<f64>, Option<f64>)> =
            sqlx::query_as(r#"SELECT a, b, c FROM item_irt WHERE item_id = $1"#)
                .bind(item_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(StorageError::Query)?;
        Ok(row
            .map(|(a, b, c)| ItemIrt { a, b, c })
            .unwrap_or_default())
    }

    async fn correct_option_of(&self, item_id: Uuid) -> anyhow::Result<Option<ItemOption>> {
        let row: Option<ItemOptionRow> = sqlx::query_as(
            r#"SELECT id, item_id, label, text, is_correct FROM item_options WHERE item_id = $1 AND is_correct = true"#,
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Query)?;
        Ok(row.map(ItemOptionRow::into_domain))
    }

    async fn option_of(&self, item_id: Uuid, option_id: Uuid) -> anyhow::Result<Option<ItemOption>> {
        let row: Option<ItemOptionRow> = sqlx::query_as(
            r#"SELECT id, item_id, label, text, is_correct FROM item_options WHERE item_id = $1 AND id = $2"#,
        )
        .bind(item_id)
        .bind(option_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Query)?;
        Ok(row.map(ItemOptionRow::into_domain))
    }

    async fn topic_subject_id(&self, topic_id: Uuid) -> anyhow::Result<Option<Uuid>> {
        let row: Option<(Uuid,)> = sqlx::query_as(r#"SELECT subject_id FROM topics WHERE id = $1"#)
            .bind(topic_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Query)?;
        Ok(row.map(|(s,)| s))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ResponseRow {
    item_id: Uuid,
    is_correct: bool,
    answered_at: chrono::DateTime<chrono::Utc>,
    a: Option<f64>,
    b: Option<f64>,
    c: Option<f64>,
}
