//! GDM Inference Service - Main Entry Point
//!
//! Loads the model bundle, then answers prediction, health and model-info
//! requests over NATS request/reply. Requests are processed concurrently.

use anyhow::{Context, Result};
use futures::StreamExt;
use gdm_inference::{
    config::AppConfig,
    consumer::RequestConsumer,
    error::ServiceError,
    metrics::{MetricsReporter, PipelineMetrics},
    models::loader::BundleLoader,
    producer::ReplyPublisher,
    service::ServiceContext,
    types::ErrorResponse,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

const METRICS_INTERVAL_SECS: u64 = 30;

fn init_tracing(config: &AppConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().or_else(|_| {
        tracing_subscriber::EnvFilter::try_new(format!("gdm_inference={}", config.logging.level))
    })?;

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("Failed to load config/config.toml")?;
    init_tracing(&config)?;

    info!("Starting GDM Inference Service");
    info!(
        variant = ?config.pipeline.variant,
        workers = config.pipeline.workers,
        timeout_ms = config.pipeline.timeout_ms,
        "Configuration loaded successfully"
    );

    let metrics = Arc::new(PipelineMetrics::new());

    // A failed load keeps the service up in degraded mode
    let loader = BundleLoader::with_threads(config.models.onnx_threads);
    let bundle_dir = config.models.bundle_dir.clone();
    let loaded = tokio::task::spawn_blocking(move || loader.load(&bundle_dir))
        .await
        .context("Bundle loading task panicked")?;

    let ctx = Arc::new(ServiceContext::from_load(
        loaded,
        config.pipeline.options(),
        Duration::from_millis(config.pipeline.timeout_ms),
        metrics.clone(),
    ));
    if !ctx.is_loaded() {
        warn!("No model loaded; prediction requests will be refused");
    }

    let client = async_nats::connect(&config.nats.url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", config.nats.url))?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = RequestConsumer::new(client.clone(), &config.nats.subject_prefix);
    let publisher = ReplyPublisher::new(client.clone());

    let num_workers = config.pipeline.workers;
    info!(
        "Starting request loop with {} parallel workers on {}",
        num_workers,
        consumer.subject()
    );

    // Semaphore to limit concurrent processing
    let semaphore = Arc::new(Semaphore::new(num_workers));

    let reporter_metrics = metrics.clone();
    tokio::spawn(async move {
        MetricsReporter::new(reporter_metrics, METRICS_INTERVAL_SECS)
            .start()
            .await;
    });

    let mut subscription = consumer.subscribe().await?;

    while let Some(message) = subscription.next().await {
        let Some(reply) = message.reply.clone() else {
            warn!(subject = %message.subject, "Dropping request without reply subject");
            continue;
        };

        let Some(route) = consumer.route(message.subject.as_str()) else {
            warn!(subject = %message.subject, "No route for subject");
            let err = ServiceError::UnknownRoute(message.subject.to_string());
            let body = serde_json::to_vec(&ErrorResponse::from(&err))?;
            if let Err(e) = publisher.reply(reply, body).await {
                error!(error = %e, "Failed to publish error reply");
            }
            continue;
        };

        // Acquire permit (limits concurrent tasks)
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .context("Request semaphore closed")?;

        let ctx = ctx.clone();
        let publisher = publisher.clone();

        tokio::spawn(async move {
            let body = ctx.handle(route, &message.payload).await;
            if let Err(e) = publisher.reply(reply, body).await {
                error!(route = route.suffix(), error = %e, "Failed to publish reply");
            }
            drop(permit);
        });
    }

    info!("Service shutting down...");
    metrics.print_summary();

    Ok(())
}
