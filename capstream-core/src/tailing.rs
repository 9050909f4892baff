// Copyright 2025 Capstream Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

//! The tailing process: a long-running consumer over a capped collection.
//!
//! [`TailingProcess`] owns one dedicated worker task per consumer instance.
//! The worker holds the only handle to the tailable/await cursor; nothing
//! else ever reads from it. Lifecycle:
//!
//! ```text
//! Initializing ──► Running ◄──► Regenerating
//!                     │               │
//!                     └────► Stopped ◄┘
//! ```
//!
//! - **Initializing** (inside [`TailingProcess::start`], fatal on failure):
//!   verify the target collection is capped, recover the bookmark, open the
//!   first cursor, spawn the worker.
//! - **Running**: block on the cursor awaiting data; forward each document to
//!   the downstream [`Processor`]; advance the tracker after every document.
//! - **Regenerating**: the store reaped or exhausted the cursor (expected
//!   steady-state behavior); persist the bookmark, wait the configured delay,
//!   reopen after the tracked position. Retries indefinitely with the fixed
//!   delay; a stuck consumer is an external-monitoring concern, surfaced via
//!   the regeneration counter metric.
//! - **Stopped**: reached only through [`TailingProcess::stop`] (or a fatal
//!   tracking failure when `halt_on_tracking_failure` is set).
//!
//! Shutdown is two-phase: `stop()` broadcasts the shutdown signal — the
//! worker's `select!` acts as the forced unblock for a task parked in the
//! blocking read — then awaits the worker's join handle as the single-use
//! completion signal. Bounded time, no new data required.
//!
//! Delivery is best-effort, at-most-once: processor faults are logged,
//! counted, and swallowed, and the position still advances, so one bad
//! document can never wedge the consumer.
//!
//! # Example
//!
//! ```rust,no_run
//! use capstream_core::config::{EndpointConfig, TailConfig};
//! use capstream_core::message::TailedDocument;
//! use capstream_core::processor::{Processor, ProcessorError};
//! use capstream_core::tailing::TailingProcess;
//! use mongodb::Client;
//!
//! struct LogProcessor;
//!
//! #[async_trait::async_trait]
//! impl Processor for LogProcessor {
//!     async fn process(&self, unit: TailedDocument) -> Result<(), ProcessorError> {
//!         println!("{}: {:?}", unit.namespace(), unit.document);
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::with_uri_str("mongodb://localhost:27017").await?;
//! let config = EndpointConfig::builder()
//!     .database("flights")
//!     .collection("cancellations")
//!     .consumer(TailConfig::builder().increasing_field("seq").build()?)
//!     .build()?;
//!
//! let mut process = TailingProcess::new(client, config, None, LogProcessor)?;
//! process.start().await?;
//! // ... later ...
//! process.stop().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{ConfigError, EndpointConfig, TailConfig};
use crate::message::TailedDocument;
use crate::metrics;
use crate::processor::Processor;
use crate::store::{MongoStore, MongoStoreConfig, TailStore};
use crate::tracking::{TailTracker, TrackingError};
use bson::{doc, Document};
use futures::StreamExt;
use mongodb::error::{Error as MongoError, ErrorKind as MongoErrorKind};
use mongodb::options::CursorType;
use mongodb::{Client, Collection, Cursor};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// MongoDB server error code for `CursorNotFound`.
const CURSOR_NOT_FOUND: i32 = 43;
/// MongoDB server error code for `CursorKilled`.
const CURSOR_KILLED: i32 = 237;

/// Errors raised by the tailing process.
#[derive(Debug, thiserror::Error)]
pub enum TailError {
    /// The endpoint is not configured as a consumer.
    #[error("Endpoint configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// The target collection is not capped; tailable cursors require one.
    #[error("Collection '{namespace}' is not capped; tailable consumers require a capped collection")]
    NotCapped {
        /// The offending "database.collection"
        namespace: String,
    },

    /// The process was started twice.
    #[error("Tailing process is already running")]
    AlreadyRunning,

    /// Driver failure during initialization (fatal to consumer startup).
    #[error("MongoDB error: {0}")]
    Mongo(#[from] MongoError),

    /// Bookmark recovery failed during initialization.
    #[error("Tail tracking error: {0}")]
    Tracking(#[from] TrackingError),

    /// The worker task panicked.
    #[error("Tailing worker task failed: {0}")]
    Worker(String),
}

/// Observable state of the tailing process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    /// Not started, or terminated.
    Stopped,
    /// Startup checks and first cursor open in progress.
    Initializing,
    /// Blocked in the cursor read or dispatching documents.
    Running,
    /// Between cursor lifetimes: persisting, waiting, reopening.
    Regenerating,
}

impl TailState {
    fn gauge_value(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Initializing => 1,
            Self::Running => 2,
            Self::Regenerating => 3,
        }
    }
}

/// Tailing statistics.
#[derive(Debug, Clone, Default)]
pub struct TailStats {
    /// Documents read from the cursor and dispatched downstream. Deliveries
    /// whose processor faulted are included; compare with
    /// `processor_failures` for the success count.
    pub documents_dispatched: u64,

    /// Downstream processor faults swallowed by the loop.
    pub processor_failures: u64,

    /// Documents whose increasing-field extraction failed and were advanced
    /// past on a best-effort basis.
    pub tracking_skips: u64,

    /// Cursor regenerations performed.
    pub cursor_regenerations: u64,
}

/// Everything the worker task owns. Built during initialization, moved into
/// the spawned task; nothing here is shared with the management side except
/// the state and stats cells.
struct Worker<P: Processor> {
    database: String,
    collection: Collection<Document>,
    tail: TailConfig,
    tracker: TailTracker,
    processor: Arc<P>,
    state: Arc<RwLock<TailState>>,
    stats: Arc<RwLock<TailStats>>,
    shutdown_rx: broadcast::Receiver<()>,
}

/// A tailable-cursor consumer over a capped collection.
pub struct TailingProcess<P: Processor + 'static> {
    client: Client,
    config: EndpointConfig,
    store: Option<Arc<dyn TailStore>>,
    processor: Arc<P>,
    state: Arc<RwLock<TailState>>,
    stats: Arc<RwLock<TailStats>>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl<P: Processor + 'static> std::fmt::Debug for TailingProcess<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailingProcess")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<P: Processor + 'static> TailingProcess<P> {
    /// Creates a tailing process from a consumer endpoint configuration.
    ///
    /// `store` overrides bookmark persistence. When persistence is enabled
    /// and no store is given, a [`MongoStore`] over the configured tracking
    /// location (`track_db`/`track_collection`/`track_field`, defaulting to a
    /// tracking collection in the tailed database) is built from the same
    /// client.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the endpoint has no consumer half.
    pub fn new(
        client: Client,
        config: EndpointConfig,
        store: Option<Arc<dyn TailStore>>,
        processor: P,
    ) -> Result<Self, TailError> {
        let Some(tail) = &config.consumer else {
            return Err(ConfigError::Invalid(
                "tailing process requires a consumer endpoint configuration".to_string(),
            )
            .into());
        };

        let store = match store {
            Some(store) => Some(store),
            None if tail.persistent => MongoStoreConfig::for_endpoint(&config)
                .map(|cfg| Arc::new(MongoStore::new(&client, cfg)) as Arc<dyn TailStore>),
            None => None,
        };

        Ok(Self {
            client,
            config,
            store,
            processor: Arc::new(processor),
            state: Arc::new(RwLock::new(TailState::Stopped)),
            stats: Arc::new(RwLock::new(TailStats::default())),
            shutdown_tx: None,
            worker: None,
        })
    }

    /// Initializes and starts the consumer.
    ///
    /// Runs the startup sequence inline so all initialization faults are
    /// fatal to the caller: capped-collection check, bookmark recovery,
    /// cold-start seeding, first cursor open. Only then is the worker task
    /// spawned.
    ///
    /// # Errors
    ///
    /// - [`TailError::AlreadyRunning`] when started twice
    /// - [`TailError::NotCapped`] when the target collection is not capped
    ///   (checked before any cursor is opened)
    /// - [`TailError::Mongo`] / [`TailError::Tracking`] for store failures
    ///   during initialization
    #[instrument(skip(self), fields(database = %self.config.database, collection = %self.config.collection))]
    pub async fn start(&mut self) -> Result<(), TailError> {
        if self.worker.is_some() {
            return Err(TailError::AlreadyRunning);
        }
        let Some(tail) = self.config.consumer.clone() else {
            return Err(ConfigError::Invalid(
                "tailing process requires a consumer endpoint configuration".to_string(),
            )
            .into());
        };

        self.set_state(TailState::Initializing).await;
        info!("Initializing tailing consumer");

        let (tracker, cursor) = match self.initialize(&tail).await {
            Ok(ready) => ready,
            Err(err) => {
                self.set_state(TailState::Stopped).await;
                return Err(err);
            }
        };

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        self.shutdown_tx = Some(shutdown_tx);

        let worker = Worker {
            database: self.config.database.clone(),
            collection: self
                .client
                .database(&self.config.database)
                .collection::<Document>(&self.config.collection),
            tail,
            tracker,
            processor: Arc::clone(&self.processor),
            state: Arc::clone(&self.state),
            stats: Arc::clone(&self.stats),
            shutdown_rx,
        };

        self.set_state(TailState::Running).await;
        self.worker = Some(tokio::spawn(run_worker(worker, cursor)));

        info!("Tailing consumer started");
        Ok(())
    }

    /// The fatal part of startup: capped check, bookmark recovery, cold-start
    /// seeding, first cursor open. Any failure here aborts `start()`.
    async fn initialize(
        &self,
        tail: &TailConfig,
    ) -> Result<(TailTracker, Cursor<Document>), TailError> {
        let db = self.client.database(&self.config.database);
        let collection = db.collection::<Document>(&self.config.collection);

        // Precondition: capped collection, verified before any cursor exists.
        let coll_stats = db
            .run_command(doc! { "collStats": &self.config.collection })
            .await?;
        if !coll_stats.get_bool("capped").unwrap_or(false) {
            return Err(TailError::NotCapped {
                namespace: format!("{}.{}", self.config.database, self.config.collection),
            });
        }

        let mut tracker = match (tail.persistent, &self.store) {
            (true, Some(store)) => TailTracker::persistent(
                &tail.increasing_field,
                tail.tracker_id.as_deref().unwrap_or_default(),
                Arc::clone(store),
            ),
            _ => TailTracker::transient(&tail.increasing_field),
        };

        // Connectivity faults during recovery are fatal to startup.
        tracker.recover().await?;

        // Cold start: without a recovered bookmark, seed the position from
        // the newest existing document so history is never replayed.
        if tracker.last_value().is_none() {
            let newest = collection
                .find_one(doc! {})
                .sort(doc! { &tail.increasing_field: -1 })
                .await?;
            if let Some(doc) = newest {
                if let Some(value) = doc.get(&tail.increasing_field) {
                    tracker.seed(value.clone());
                }
            }
        }

        let cursor = open_tail_cursor(&collection, tail.batch_size, tracker.resume_filter()).await?;
        Ok((tracker, cursor))
    }

    /// Stops the consumer.
    ///
    /// Phase one broadcasts the shutdown signal, unblocking a worker parked
    /// in the cursor read; phase two awaits the worker's completion. Returns
    /// once the worker has persisted its bookmark and terminated. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`TailError::Worker`] if the worker task panicked.
    #[instrument(skip(self), fields(collection = %self.config.collection))]
    pub async fn stop(&mut self) -> Result<(), TailError> {
        let Some(worker) = self.worker.take() else {
            warn!("Tailing consumer is not running");
            return Ok(());
        };

        info!("Stopping tailing consumer");
        if let Some(tx) = self.shutdown_tx.take() {
            // The worker may already have exited on its own; a closed
            // channel is not an error here.
            let _ = tx.send(());
        }

        worker
            .await
            .map_err(|e| TailError::Worker(e.to_string()))?;

        info!("Tailing consumer stopped");
        Ok(())
    }

    /// Returns the current observable state.
    pub async fn state(&self) -> TailState {
        *self.state.read().await
    }

    /// Returns true while the worker task is alive.
    pub async fn is_running(&self) -> bool {
        !matches!(*self.state.read().await, TailState::Stopped)
    }

    /// Returns a snapshot of the tailing statistics.
    pub async fn stats(&self) -> TailStats {
        self.stats.read().await.clone()
    }

    async fn set_state(&self, state: TailState) {
        *self.state.write().await = state;
        metrics::set_tail_state(&self.config.collection, state.gauge_value());
    }
}

/// Opens a tailable/await cursor, optionally bounded below by the tracker's
/// resume filter. The await mode blocks server-side until data arrives or
/// the store's own idle timeout fires; this is not a tight poll loop.
async fn open_tail_cursor(
    collection: &Collection<Document>,
    batch_size: Option<u32>,
    filter: Option<Document>,
) -> Result<Cursor<Document>, MongoError> {
    let mut find = collection
        .find(filter.unwrap_or_default())
        .cursor_type(CursorType::TailableAwait);
    if let Some(size) = batch_size {
        find = find.batch_size(size);
    }
    find.await
}

/// Returns true for server faults meaning "this cursor is gone, open a new
/// one": the store proactively reaps idle tailable cursors, so these are
/// expected in steady state.
fn is_cursor_killed(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        MongoErrorKind::Command(cmd) if cmd.code == CURSOR_NOT_FOUND || cmd.code == CURSOR_KILLED
    )
}

/// The worker task body: read loop, regeneration, teardown.
#[instrument(skip_all, fields(database = %worker.database, collection = %worker.collection.name()))]
async fn run_worker<P: Processor>(mut worker: Worker<P>, mut cursor: Cursor<Document>) {
    let collection_name = worker.collection.name().to_string();
    debug!("Tailing worker started");

    'process: loop {
        // One cursor lifetime.
        loop {
            tokio::select! {
                _ = worker.shutdown_rx.recv() => {
                    debug!("Shutdown signal received");
                    break 'process;
                }
                next = cursor.next() => match next {
                    Some(Ok(document)) => {
                        if !handle_document(&mut worker, &collection_name, document).await {
                            break 'process;
                        }
                    }
                    Some(Err(err)) => {
                        if is_cursor_killed(&err) {
                            debug!(error = %err, "Tail cursor reaped by server; regenerating");
                        } else {
                            warn!(error = %err, "Tail cursor failed; regenerating");
                        }
                        break;
                    }
                    None => {
                        debug!("Tail cursor exhausted; regenerating");
                        break;
                    }
                }
            }
        }

        // End of a cursor lifetime: persist unconditionally.
        persist_bookmark(&worker.tracker).await;

        *worker.state.write().await = TailState::Regenerating;
        metrics::set_tail_state(&collection_name, TailState::Regenerating.gauge_value());
        metrics::increment_cursor_regenerations(&worker.database, &collection_name);
        worker.stats.write().await.cursor_regenerations += 1;

        // Close-then-reopen: the old handle is dropped before the new one is
        // created, so at most one cursor is ever open per session.
        drop(cursor);

        let delay = worker.tail.cursor_regeneration_delay;
        if !delay.is_zero() && !sleep_or_shutdown(&mut worker.shutdown_rx, delay).await {
            break 'process;
        }

        // Reopen per the opening policy (no capped re-check). Connectivity
        // faults here retry indefinitely with the fixed delay; detecting a
        // permanently stuck consumer is an external monitoring concern.
        cursor = loop {
            match open_tail_cursor(
                &worker.collection,
                worker.tail.batch_size,
                worker.tracker.resume_filter(),
            )
            .await
            {
                Ok(cursor) => break cursor,
                Err(err) => {
                    warn!(error = %err, delay_ms = delay.as_millis(), "Failed to reopen tail cursor; retrying");
                    if !sleep_or_shutdown(&mut worker.shutdown_rx, delay).await {
                        break 'process;
                    }
                }
            }
        };

        *worker.state.write().await = TailState::Running;
        metrics::set_tail_state(&collection_name, TailState::Running.gauge_value());
    }

    // Teardown: final persist, then signal termination via task completion.
    persist_bookmark(&worker.tracker).await;
    *worker.state.write().await = TailState::Stopped;
    metrics::set_tail_state(&collection_name, TailState::Stopped.gauge_value());
    debug!("Tailing worker terminated");
}

/// Dispatches one document downstream and advances the tracker.
///
/// Returns false only when a tracking failure must halt the consumer.
async fn handle_document<P: Processor>(
    worker: &mut Worker<P>,
    collection_name: &str,
    document: Document,
) -> bool {
    let unit = TailedDocument::new(&worker.database, collection_name, document.clone());

    // Best-effort, at-most-once: a failing document must not kill the loop.
    if let Err(err) = worker.processor.process(unit).await {
        warn!(error = %err, "Downstream processor failed; continuing");
        metrics::increment_processor_failures(&worker.database, collection_name);
        worker.stats.write().await.processor_failures += 1;
    }

    metrics::increment_documents_tailed(&worker.database, collection_name);
    worker.stats.write().await.documents_dispatched += 1;

    // Advance unconditionally, even after a downstream fault, so one bad
    // document cannot block forward progress forever.
    match worker.tracker.set_last_value(&document) {
        Ok(()) => true,
        Err(err @ TrackingError::MissingField { .. }) => {
            if worker.tail.halt_on_tracking_failure {
                error!(error = %err, "Tracking failure with halt_on_tracking_failure set; stopping consumer");
                return false;
            }
            warn!(error = %err, "Could not extract increasing field; skipping position update");
            metrics::increment_tracking_skips(&worker.database, collection_name);
            worker.stats.write().await.tracking_skips += 1;
            true
        }
        Err(err) => {
            warn!(error = %err, "Tracking error; continuing");
            true
        }
    }
}

async fn persist_bookmark(tracker: &TailTracker) {
    match tracker.persist().await {
        Ok(()) => metrics::increment_bookmark_persists(true),
        Err(err) => {
            warn!(error = %err, "Failed to persist tail tracking bookmark");
            metrics::increment_bookmark_persists(false);
        }
    }
}

/// Sleeps for `delay`, returning false if shutdown was signaled first.
async fn sleep_or_shutdown(shutdown_rx: &mut broadcast::Receiver<()>, delay: Duration) -> bool {
    tokio::select! {
        _ = shutdown_rx.recv() => {
            debug!("Shutdown signal received during regeneration wait");
            false
        }
        () = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TailConfig;
    use crate::processor::ProcessorError;

    struct NoopProcessor;

    #[async_trait::async_trait]
    impl Processor for NoopProcessor {
        async fn process(&self, _unit: TailedDocument) -> Result<(), ProcessorError> {
            Ok(())
        }
    }

    fn consumer_config() -> EndpointConfig {
        EndpointConfig::builder()
            .database("flights")
            .collection("cancellations")
            .consumer(TailConfig::builder().increasing_field("seq").build().unwrap())
            .build()
            .unwrap()
    }

    fn producer_config() -> EndpointConfig {
        EndpointConfig::builder()
            .database("flights")
            .collection("cancellations")
            .producer(
                crate::config::ProducerConfig::builder()
                    .operation(crate::operation::Operation::Insert)
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap()
    }

    async fn test_client() -> Client {
        // Never connected in these tests; construction is lazy.
        Client::with_uri_str("mongodb://localhost:27017")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn new_rejects_producer_endpoint() {
        let client = test_client().await;
        let err = TailingProcess::new(client, producer_config(), None, NoopProcessor).unwrap_err();
        assert!(matches!(err, TailError::Configuration(_)));
    }

    #[tokio::test]
    async fn persistent_tracking_defaults_to_a_mongo_store() {
        let client = test_client().await;
        let config = EndpointConfig::builder()
            .database("flights")
            .collection("cancellations")
            .consumer(
                TailConfig::builder()
                    .increasing_field("seq")
                    .persistent("tracker-1")
                    .track_collection("flightsTailTracking")
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();

        // No explicit store: persistence falls back to the tracking
        // collection named by the endpoint configuration.
        let process = TailingProcess::new(client, config, None, NoopProcessor).unwrap();
        assert!(process.store.is_some());
    }

    #[tokio::test]
    async fn starts_in_stopped_state() {
        let client = test_client().await;
        let process = TailingProcess::new(client, consumer_config(), None, NoopProcessor).unwrap();
        assert_eq!(process.state().await, TailState::Stopped);
        assert!(!process.is_running().await);
    }

    #[tokio::test]
    async fn stop_before_start_is_a_no_op() {
        let client = test_client().await;
        let mut process =
            TailingProcess::new(client, consumer_config(), None, NoopProcessor).unwrap();
        process.stop().await.unwrap();
        assert_eq!(process.state().await, TailState::Stopped);
    }

    #[test]
    fn non_command_errors_are_not_cursor_killed() {
        let err = MongoError::custom("connection reset");
        assert!(!is_cursor_killed(&err));
    }

    #[test]
    fn state_gauge_values_are_stable() {
        assert_eq!(TailState::Stopped.gauge_value(), 0);
        assert_eq!(TailState::Initializing.gauge_value(), 1);
        assert_eq!(TailState::Running.gauge_value(), 2);
        assert_eq!(TailState::Regenerating.gauge_value(), 3);
    }
}
