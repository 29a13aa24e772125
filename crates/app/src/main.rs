use std::sync::Arc;

use extractor::{ExtractionWorker, GeminiModel};
use migration::{Migrator, MigratorTrait};
use queue::{BudgetUpdate, Consumer, ExtractionJob, ExtractionResult};
use server::{ResultRecorder, ServerState};
use settings::Database;
use storage::{FilesystemStore, MemoryStore, ObjectStore};
use tokio_util::sync::CancellationToken;

mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;
    let mut tasks = tokio::task::JoinSet::new();

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "mheetang={level},server={level},engine={level},queue={level},extractor={level},storage={level}",
            level = settings.app.level
        ))
        .init();

    let db = parse_database(&settings.database).await?;
    let engine = Arc::new(
        engine::Engine::builder()
            .database(db.clone())
            .build()
            .await?,
    );
    let store: Arc<dyn ObjectStore> = match &settings.storage {
        settings::Storage::Memory => Arc::new(MemoryStore::new()),
        settings::Storage::Filesystem(root) => Arc::new(FilesystemStore::new(root)),
    };
    let model = Arc::new(GeminiModel::new(settings.extractor.gemini())?);
    let poll_interval = settings.queue.poll_interval();
    let shutdown = CancellationToken::new();

    let extraction: Consumer<ExtractionJob, _> = Consumer::new(
        db.clone(),
        Arc::new(ExtractionWorker::new(db.clone(), store.clone(), model)),
    )
    .poll_interval(poll_interval);
    let results: Consumer<ExtractionResult, _> = Consumer::new(
        db.clone(),
        Arc::new(ResultRecorder::new(engine.clone(), store.clone())),
    )
    .poll_interval(poll_interval);
    let budgets: Consumer<BudgetUpdate, _> =
        Consumer::new(db.clone(), engine.clone()).poll_interval(poll_interval);

    for (name, task) in [
        ("extraction", tokio::spawn(extraction.run(shutdown.clone()))),
        ("result", tokio::spawn(results.run(shutdown.clone()))),
        ("budget", tokio::spawn(budgets.run(shutdown.clone()))),
    ] {
        tasks.spawn(async move {
            match task.await {
                Ok(Ok(())) => tracing::info!("{name} consumer stopped"),
                Ok(Err(err)) => tracing::error!("{name} consumer failed: {err}"),
                Err(err) => tracing::error!("{name} consumer panicked: {err}"),
            }
        });
    }

    let bind = settings
        .server
        .bind
        .clone()
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let addr = format!("{}:{}", bind, settings.server.port);
    let state = ServerState {
        body_limit: settings.server.body_limit_mb * 1024 * 1024,
        ..ServerState::new(engine, db)
    };
    let server_shutdown = shutdown.clone();
    tasks.spawn(async move {
        if let Err(err) = server::run(state, &addr, server_shutdown.clone()).await {
            tracing::error!("server failed: {err}");
            server_shutdown.cancel();
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("shutdown requested"),
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();

    while tasks.join_next().await.is_some() {}

    Ok(())
}

async fn parse_database(
    config: &Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let url = match config {
        Database::Memory => String::from("sqlite::memory:"),
        Database::Sqlite(path) => format!("sqlite:{}?mode=rwc", path),
    };

    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
