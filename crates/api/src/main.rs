//! CAT engine server entrypoint.

use std::sync::Arc;
use std::time::Instant;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cat_api::{AppState, build_router};
use cat_config::AppConfig;
use cat_core::{SessionController, SessionControllerConfig};
use cat_storage::{AbilityRepository, CatalogueRepository, RuleRepositoryPg, SessionRepositoryPg, create_pool, run_migrations};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting CAT engine server");

    let config = AppConfig::from_env()?;
    tracing::info!("binding to {}", config.bind_address);

    let pool = create_pool(&config.database_url).await?;
    tracing::info!("database connection pool created");

    run_migrations(&pool).await?;
    tracing::info!("database migrations complete");

    let catalogue = Arc::new(CatalogueRepository::new(pool.clone()));
    let ability = Arc::new(AbilityRepository::new(pool.clone()));
    let rules = Arc::new(RuleRepositoryPg::new(pool.clone()));
    let sessions = Arc::new(SessionRepositoryPg::new(pool.clone()));
    let controller_config = SessionControllerConfig {
        irt_prior_var: config.irt_prior_var,
        stop_se_threshold: config.stop_se_threshold,
        irt_max_iterations: config.irt_max_iterations,
        recent_responses_limit: config.recent_responses_limit,
    };
    let controller = SessionController::new(catalogue, ability, rules, sessions, controller_config);

    let bind_address = config.bind_address.clone();
    let state = Arc::new(AppState {
        pool,
        controller,
        config,
        start_time: Instant::now(),
    });

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("server listening on {}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
