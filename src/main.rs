use std::process;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

use vetrina::cache::{CacheKeyDeriver, ConditionalCacheGate, MemoryCacheStore};
use vetrina::config::{self, Settings};
use vetrina::infra::docstore::MemoryDocumentStore;
use vetrina::infra::error::InfraError;
use vetrina::infra::http::{self, AppState};
use vetrina::infra::telemetry;
use vetrina::query::AggregationExecutor;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &InfraError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), InfraError> {
    let (_cli, settings) = config::load_with_cli()
        .map_err(|err| InfraError::configuration(err.to_string()))?;

    telemetry::init(&settings.logging)?;

    let documents = Arc::new(load_documents(&settings).await?);
    let cache = Arc::new(MemoryCacheStore::new());

    let executor = AggregationExecutor::new(documents, settings.store.query_deadline());
    let gate = Arc::new(ConditionalCacheGate::new(cache, executor));
    let keys = Arc::new(CacheKeyDeriver::new(settings.cache.namespace.clone()));

    let router = http::build_router(AppState::new(gate, keys));

    let addr = settings
        .server
        .socket_addr()
        .map_err(|err| InfraError::configuration(err.to_string()))?;
    let listener = TcpListener::bind(addr).await?;

    info!(
        target = "vetrina::serve",
        addr = %addr,
        namespace = %settings.cache.namespace,
        "listening",
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn load_documents(settings: &Settings) -> Result<MemoryDocumentStore, InfraError> {
    let Some(path) = &settings.store.seed_file else {
        return Ok(MemoryDocumentStore::new());
    };

    let raw = tokio::fs::read(path)
        .await
        .map_err(|err| InfraError::seed(format!("{}: {err}", path.display())))?;
    let documents: Vec<serde_json::Value> = serde_json::from_slice(&raw).map_err(|err| {
        InfraError::seed(format!("{}: expected a JSON array: {err}", path.display()))
    })?;

    info!(
        target = "vetrina::serve",
        seed_file = %path.display(),
        documents = documents.len(),
        "seeded document store",
    );
    Ok(MemoryDocumentStore::seed(documents))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!(target = "vetrina::serve", "shutdown signal received");
}
