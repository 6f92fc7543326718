//! Conduit order service demo entry point.

use std::error::Error;
use std::io;
use std::sync::Arc;

use conduit_core::clock::SystemClock;
use conduit_core::error::PipelineError;
use conduit_demo::application::command_handlers::Receipt;
use conduit_demo::domain::aggregates::OrderView;
use conduit_demo::domain::commands::{FindOrder, PlaceOrder};
use conduit_demo::state::{AppState, Operator};
use conduit_logging::layer::WorkerLayer;
use conduit_logging::sink::{JsonLinesSink, LogFailure, spawn_sink_worker};
use conduit_pipeline::settings::PipelineSettings;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let settings = PipelineSettings::from_env()?;

    // Warnings and above also go through the background log worker.
    let worker = Arc::new(spawn_sink_worker(
        JsonLinesSink::new(io::stderr()),
        settings.log_queue_capacity,
        report_log_failure,
    )?);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .with(
            WorkerLayer::new(Arc::clone(&worker), Arc::new(SystemClock))
                .with_filter(LevelFilter::WARN),
        )
        .init();

    info!(?settings, "Starting Conduit order service");

    let operator = Operator::new(std::env::var("CONDUIT_OPERATOR").ok());
    let state = AppState::new(&settings, Arc::new(operator));
    let cancel = CancellationToken::new();

    let receipt: Receipt = state
        .mediator
        .send(
            &PlaceOrder {
                sku: "BOOK-42".to_owned(),
                quantity: 2,
            },
            &cancel,
        )
        .await?;

    let view: OrderView = state
        .mediator
        .send(
            &FindOrder {
                order_id: receipt.order_id,
            },
            &cancel,
        )
        .await?;
    info!(order = %serde_json::to_string(&view)?, "order loaded");

    let bulk = vec![
        PlaceOrder {
            sku: "PEN-7".to_owned(),
            quantity: 10,
        },
        PlaceOrder {
            sku: String::new(),
            quantity: 0,
        },
        PlaceOrder {
            sku: "INK-3".to_owned(),
            quantity: 75,
        },
    ];
    match state.mediator.send::<_, Vec<Receipt>>(&bulk, &cancel).await {
        Ok(receipts) => info!(placed = receipts.len(), "bulk order placed"),
        Err(PipelineError::Batch(error)) => {
            for (position, failure) in error.failures() {
                warn!(position, error = %failure, "bulk order line rejected");
            }
        }
        Err(error) => return Err(error.into()),
    }

    info!(
        orders = state.store.len(),
        notified = state.outbox.sent().len(),
        "Conduit order service finished"
    );
    worker.shutdown();
    Ok(())
}

/// Reports entries the log worker could not write. Must not use `tracing`.
fn report_log_failure(failure: LogFailure) {
    match failure {
        LogFailure::Rejected { entry, reason } => {
            eprintln!("log entry dropped ({reason}): {}", entry.message);
        }
        LogFailure::Sink { entry, error } => {
            eprintln!("{error}: {}", entry.message);
        }
    }
}
