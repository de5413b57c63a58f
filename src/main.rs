use std::sync::Arc;

use dca_scheduler::{
    api::{ self, AppState },
    chains,
    clock::{ Clock, SystemClock },
    db::{ PlanRepository, PlanStore },
    executor::PlanExecutor,
    scheduler::PlanScheduler,
    services::{ PlanService, PriceAnalysisService },
    AppError,
    Config,
    Result,
};
use migration::MigratorTrait;
use tracing_subscriber::{ layer::SubscriberExt, util::SubscriberInitExt };

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber
        ::registry()
        .with(
            tracing_subscriber::EnvFilter
                ::try_from_default_env()
                .unwrap_or_else(|_| "dca_scheduler=debug,tower_http=debug".into())
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().map_err(|e| AppError::Config(e.to_string()))?;

    tracing::info!(
        "Starting dca-scheduler with network mode: {:?}, chain backend: {}",
        config.network_mode,
        config.chain.backend
    );

    // Initialize database connection
    let db = sea_orm::Database::connect(&config.database_url).await?;

    tracing::info!("Database connected successfully");

    // Run migrations
    migration::Migrator::up(&db, None).await?;

    tracing::info!("Migrations completed successfully");

    let store: Arc<dyn PlanStore> = Arc::new(PlanRepository::new(db));
    let transactor = chains::build_transactor(&config.chain)?;
    let price_analysis = Arc::new(PriceAnalysisService::from_config(&config.price)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let executor = Arc::new(
        PlanExecutor::new(
            store.clone(),
            transactor.clone(),
            price_analysis.clone(),
            clock.clone(),
            config.price.asset_id.clone()
        ).with_timeouts(config.transactor_timeout, config.oracle_timeout)
    );

    // Rebuild timers for plans that were active before the restart
    let scheduler = Arc::new(PlanScheduler::new(executor.clone(), clock));
    let restored = scheduler.initialize_from_store(store.as_ref()).await;
    tracing::info!("Scheduler started with {} active plans", restored);

    let plan_service = Arc::new(
        PlanService::new(store, transactor, executor, scheduler.clone())
    );

    let app = api::router(AppState::new(plan_service, price_analysis));

    // Start server
    let addr = format!("{}:{}", config.server_host, config.server_port);
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener
        ::bind(&addr).await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal()).await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    scheduler.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
