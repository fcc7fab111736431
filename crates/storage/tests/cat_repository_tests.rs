#![cfg(feature = "postgres-tests")]

use cat_core::ports::{AbilityStore, CandidateQuery, CatalogueView, SessionRepository};
use cat_domain::{ResponseRecord, ServedItem, Session, SessionMode, SessionStatus};
use cat_storage::{AbilityRepository, CatalogueRepository, SessionRepositoryPg};
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

async fn seed_subject_with_item(pool: &PgPool) -> (Uuid, Uuid, Uuid, Uuid) {
    let subject_id = Uuid::new_v4();
    let topic_id = Uuid::new_v4();
    let item_id = Uuid::new_v4();
    let option_id = Uuid::new_v4();

    sqlx::query("INSERT INTO subjects (id, name) VALUES ($1, $2)")
        .bind(subject_id)
        .bind("arithmetic")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO topics (id, subject_id, name) VALUES ($1, $2, $3)")
        .bind(topic_id)
        .bind(subject_id)
        .bind("addition")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO items (id, subject_id, stem) VALUES ($1, $2, $3)")
        .bind(item_id)
        .bind(subject_id)
        .bind("2 + 2 = ?")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO item_irt (item_id, a, b, c) VALUES ($1, $2, $3, $4)")
        .bind(item_id)
        .bind(1.0_f64)
        .bind(0.0_f64)
        .bind(0.25_f64)
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO item_tags (item_id, topic_id) VALUES ($1, $2)")
        .bind(item_id)
        .bind(topic_id)
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO item_options (id, item_id, label, text, is_correct) VALUES ($1, $2, 'A', '4', true)")
        .bind(option_id)
        .bind(item_id)
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO item_options (id, item_id, label, text, is_correct) VALUES ($1, $2, 'B', '5', false)")
        .bind(Uuid::new_v4())
        .bind(item_id)
        .execute(pool)
        .await
        .unwrap();

    (subject_id, topic_id, item_id, option_id)
}

#[sqlx::test(migrations = "../../migrations")]
async fn candidate_items_respects_subject_and_exclusions(pool: PgPool) -> Result<(), sqlx::Error> {
    let (subject_id, _topic_id, item_id, _option_id) = seed_subject_with_item(&pool).await;
    let repo = CatalogueRepository::new(pool.clone());

    let found = repo
        .candidate_items(&CandidateQuery {
            subject_id,
            exclude_ids: vec![],
            b_min: None,
            b_max: None,
            topic_filter: vec![],
        })
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].item.id, item_id);
    assert!(found[0].irt.is_fully_calibrated());

    let excluded = repo
        .candidate_items(&CandidateQuery {
            subject_id,
            exclude_ids: vec![item_id],
            b_min: None,
            b_max: None,
            topic_filter: vec![],
        })
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    assert!(excluded.is_empty());

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn option_of_finds_only_matching_item(pool: PgPool) -> Result<(), sqlx::Error> {
    let (_subject_id, _topic_id, item_id, option_id) = seed_subject_with_item(&pool).await;
    let repo = CatalogueRepository::new(pool.clone());

    let found = repo
        .option_of(item_id, option_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    assert!(found.is_some());
    assert!(found.unwrap().is_correct);

    let wrong_item = repo
        .option_of(Uuid::new_v4(), option_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    assert!(wrong_item.is_none());

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn ability_store_round_trips_theta_and_se(pool: PgPool) -> Result<(), sqlx::Error> {
    let (subject_id, topic_id, _item_id, _option_id) = seed_subject_with_item(&pool).await;
    let repo = AbilityRepository::new(pool.clone());
    let learner_id = Uuid::new_v4();

    let (theta, se) = repo
        .get_or_init(learner_id, topic_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    assert_eq!((theta, se), (0.0, 1.0));

    repo.put(learner_id, topic_id, 0.8, 0.4)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    let vector = repo
        .get_vector(learner_id, subject_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    assert_eq!(vector.theta_by_topic.get(&topic_id), Some(&0.8));
    assert_eq!(vector.se_by_topic.get(&topic_id), Some(&0.4));
    assert!((vector.avg_theta - 0.8).abs() < 1e-9);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn items_answered_since_is_unbounded_by_a_result_count(pool: PgPool) -> Result<(), sqlx::Error> {
    let (subject_id, _topic_id, item_id, option_id) = seed_subject_with_item(&pool).await;
    let session_repo = SessionRepositoryPg::new(pool.clone());
    let catalogue_repo = CatalogueRepository::new(pool.clone());
    let learner_id = Uuid::new_v4();
    let session_id = Uuid::new_v4();
    let answered_at = Utc::now();

    let session = Session {
        id: session_id,
        learner_id,
        subject_id,
        locked_topic_id: None,
        mode: SessionMode::Cat,
        target_items: 1,
        status: SessionStatus::Ongoing,
        started_at: answered_at,
        finished_at: None,
    };
    let first_served = ServedItem {
        session_id,
        item_id,
        position: 1,
        served_at: answered_at,
    };
    session_repo
        .create_session(&session, &first_served)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    let mut tx = session_repo
        .begin_answer(session_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?
        .expect("session exists");
    tx.insert_response(&ResponseRecord {
        session_id,
        item_id,
        option_id,
        is_correct: true,
        latency_ms: None,
        answered_at,
    })
    .await
    .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    tx.commit().await.map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    let blocked = catalogue_repo
        .items_answered_since(learner_id, subject_id, answered_at - chrono::Duration::days(1))
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    assert!(blocked.contains(&item_id));

    let blocked_after_cutoff = catalogue_repo
        .items_answered_since(learner_id, subject_id, answered_at + chrono::Duration::days(1))
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    assert!(!blocked_after_cutoff.contains(&item_id));

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn session_lifecycle_locks_and_finishes(pool: PgPool) -> Result<(), sqlx::Error> {
    let (subject_id, _topic_id, item_id, option_id) = seed_subject_with_item(&pool).await;
    let repo = SessionRepositoryPg::new(pool.clone());
    let learner_id = Uuid::new_v4();
    let session_id = Uuid::new_v4();

    let session = Session {
        id: session_id,
        learner_id,
        subject_id,
        locked_topic_id: None,
        mode: SessionMode::Cat,
        target_items: 1,
        status: SessionStatus::Ongoing,
        started_at: Utc::now(),
        finished_at: None,
    };
    let first_served = ServedItem {
        session_id,
        item_id,
        position: 1,
        served_at: Utc::now(),
    };
    repo.create_session(&session, &first_served)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    let mut tx = repo
        .begin_answer(session_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?
        .expect("session exists");

    let locked = tx.session().await.map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    assert_eq!(locked.status, SessionStatus::Ongoing);

    let served = tx.served_items().await.map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    assert_eq!(served.len(), 1);

    tx.insert_response(&ResponseRecord {
        session_id,
        item_id,
        option_id,
        is_correct: true,
        latency_ms: Some(900),
        answered_at: Utc::now(),
    })
    .await
    .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    tx.finish_session(Utc::now())
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    tx.commit().await.map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    let row: (String,) = sqlx::query_as("SELECT status FROM sessions WHERE id = $1")
        .bind(session_id)
        .fetch_one(&pool)
        .await?;
    assert_eq!(row.0, "finished");

    Ok(())
}
