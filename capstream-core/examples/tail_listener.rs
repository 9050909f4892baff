//! Tail Listener Example
//!
//! Tails a capped collection and prints every document as it arrives, using
//! a transient consumer (no bookmark persistence; restarts pick up from the
//! current tail).
//!
//! # Prerequisites
//!
//! Start MongoDB:
//! ```bash
//! docker run -d --name mongodb -p 27017:27017 mongo:7.0
//! ```
//!
//! # Running the Example
//!
//! ```bash
//! cargo run --example tail_listener
//! ```
//!
//! # Generate Test Data
//!
//! In another terminal:
//! ```bash
//! docker exec mongodb mongosh flights --eval '
//!   db.cancellations.insertOne({seq: 1, flight: "AZ 604"})
//! '
//! ```

use capstream_core::config::{EndpointConfig, TailConfig};
use capstream_core::message::TailedDocument;
use capstream_core::processor::{Processor, ProcessorError};
use capstream_core::tailing::TailingProcess;
use mongodb::options::CreateCollectionOptions;
use mongodb::Client;
use std::error::Error;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

const DATABASE: &str = "flights";
const COLLECTION: &str = "cancellations";

/// Processor that logs every tailed document.
struct ConsoleProcessor;

#[async_trait::async_trait]
impl Processor for ConsoleProcessor {
    async fn process(&self, unit: TailedDocument) -> Result<(), ProcessorError> {
        info!(
            namespace = %unit.namespace(),
            document = ?unit.document,
            "Document tailed"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_logging();

    let uri = std::env::var("MONGODB_URI")
        .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
    let client = Client::with_uri_str(&uri).await?;

    ensure_capped_collection(&client).await?;

    let config = EndpointConfig::builder()
        .database(DATABASE)
        .collection(COLLECTION)
        .consumer(
            TailConfig::builder()
                .increasing_field("seq")
                .cursor_regeneration_delay(Duration::from_millis(500))
                .build()?,
        )
        .build()?;

    let mut process = TailingProcess::new(client, config, None, ConsoleProcessor)?;
    process.start().await?;
    info!("Tailing {DATABASE}.{COLLECTION}; insert documents with an increasing 'seq' field");
    info!("Press Ctrl+C to stop");

    signal::ctrl_c().await?;

    info!("Shutting down");
    process.stop().await?;
    info!("Stopped cleanly");
    Ok(())
}

/// Creates the demo capped collection if it does not exist yet.
async fn ensure_capped_collection(client: &Client) -> Result<(), Box<dyn Error>> {
    let db = client.database(DATABASE);
    let existing = db.list_collection_names().await?;
    if !existing.iter().any(|name| name == COLLECTION) {
        db.create_collection(COLLECTION)
            .with_options(
                CreateCollectionOptions::builder()
                    .capped(true)
                    .size(1024 * 1024)
                    .build(),
            )
            .await?;
        info!("Created capped collection {DATABASE}.{COLLECTION}");
    }
    Ok(())
}

/// Initialize structured logging.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,capstream_core=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
