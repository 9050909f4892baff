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

//! Durable bookmark storage for tail tracking.
//!
//! The [`TailStore`] trait abstracts the key-document store that persists the
//! last-seen value of the increasing field, keyed by tracker identity. The
//! default backend is [`MongoStore`], a tracking collection typically in the
//! same deployment being tailed; the tailing process builds one automatically
//! from the endpoint's tracking-location options when persistence is enabled
//! and no explicit store is supplied. The `capstream-stores` crate ships
//! additional backends (in-memory, for tests and single-process setups).
//!
//! Semantics are deliberately simple: saves are idempotent upserts with
//! last-writer-wins and no versioning. Trackers sharing a store must use
//! distinct identities.
//!
//! # Example
//!
//! ```rust
//! use capstream_core::store::{TailStore, TailStoreError};
//! use bson::Bson;
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use tokio::sync::Mutex;
//!
//! #[derive(Default)]
//! struct MapStore {
//!     bookmarks: Arc<Mutex<HashMap<String, Bson>>>,
//! }
//!
//! #[async_trait::async_trait]
//! impl TailStore for MapStore {
//!     async fn save_bookmark(&self, tracker_id: &str, value: &Bson) -> Result<(), TailStoreError> {
//!         self.bookmarks.lock().await.insert(tracker_id.to_string(), value.clone());
//!         Ok(())
//!     }
//!
//!     async fn load_bookmark(&self, tracker_id: &str) -> Result<Option<Bson>, TailStoreError> {
//!         Ok(self.bookmarks.lock().await.get(tracker_id).cloned())
//!     }
//!
//!     async fn delete_bookmark(&self, tracker_id: &str) -> Result<(), TailStoreError> {
//!         self.bookmarks.lock().await.remove(tracker_id);
//!         Ok(())
//!     }
//!
//!     async fn close(&self) -> Result<(), TailStoreError> {
//!         Ok(())
//!     }
//! }
//! ```

use crate::config::{EndpointConfig, DEFAULT_TRACK_COLLECTION, DEFAULT_TRACK_FIELD};
use bson::{doc, Bson, Document};
use mongodb::{Client, Collection};
use tracing::{debug, trace};

/// Trait for bookmark storage backends.
///
/// Implementations must be safe for concurrent use; the tailing process calls
/// into the store from its worker task while management code may read from
/// elsewhere.
#[async_trait::async_trait]
pub trait TailStore: Send + Sync {
    /// Upserts the bookmark for a tracker identity.
    ///
    /// Must be idempotent; repeated saves of the same value are harmless.
    ///
    /// # Errors
    ///
    /// Returns an error if the bookmark cannot be written.
    async fn save_bookmark(&self, tracker_id: &str, value: &Bson) -> Result<(), TailStoreError>;

    /// Loads the bookmark for a tracker identity.
    ///
    /// Returns `None` when no bookmark has ever been persisted for this
    /// identity, which the tracker treats as "start from the current tail".
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    async fn load_bookmark(&self, tracker_id: &str) -> Result<Option<Bson>, TailStoreError>;

    /// Deletes the bookmark for a tracker identity.
    ///
    /// The tailing subsystem never calls this; it exists for operator tooling
    /// (forcing a consumer to restart from the current tail).
    ///
    /// # Errors
    ///
    /// Returns an error if the bookmark cannot be deleted.
    async fn delete_bookmark(&self, tracker_id: &str) -> Result<(), TailStoreError>;

    /// Closes the store, releasing any resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be closed cleanly.
    async fn close(&self) -> Result<(), TailStoreError>;
}

/// Errors that can occur during bookmark store operations.
#[derive(Debug, thiserror::Error)]
pub enum TailStoreError {
    /// Connection to the backing store failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The stored bookmark could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Underlying driver error.
    #[error("Store error: {0}")]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),

    /// Other errors.
    #[error("Bookmark store error: {0}")]
    Other(String),
}

/// Configuration for [`MongoStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MongoStoreConfig {
    /// Database holding the tracking collection.
    pub database: String,

    /// Tracking collection name.
    pub collection: String,

    /// Field storing the bookmark value inside a tracking record.
    pub track_field: String,
}

impl MongoStoreConfig {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> MongoStoreConfigBuilder {
        MongoStoreConfigBuilder::default()
    }

    /// Derives the tracking-storage location from a consumer endpoint
    /// configuration: `track_db` (defaulting to the tailed database),
    /// `track_collection`, and `track_field`.
    ///
    /// Returns `None` when the endpoint has no consumer half.
    #[must_use]
    pub fn for_endpoint(config: &EndpointConfig) -> Option<Self> {
        let tail = config.consumer.as_ref()?;
        Some(Self {
            database: config.track_db().to_string(),
            collection: tail.track_collection.clone(),
            track_field: tail.track_field.clone(),
        })
    }
}

/// Builder for [`MongoStoreConfig`].
#[derive(Debug, Default)]
pub struct MongoStoreConfigBuilder {
    database: Option<String>,
    collection: Option<String>,
    track_field: Option<String>,
}

impl MongoStoreConfigBuilder {
    /// Sets the database holding the tracking collection. Required.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Overrides the tracking collection name.
    ///
    /// Default: `capstream_tail_tracking`.
    #[must_use]
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Overrides the bookmark field name inside tracking records.
    ///
    /// Default: `lastTrackingValue`.
    #[must_use]
    pub fn track_field(mut self, field: impl Into<String>) -> Self {
        self.track_field = Some(field.into());
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Fails when `database` is unset.
    pub fn build(self) -> Result<MongoStoreConfig, TailStoreError> {
        let database = self
            .database
            .ok_or_else(|| TailStoreError::Other("database is required".to_string()))?;

        Ok(MongoStoreConfig {
            database,
            collection: self
                .collection
                .unwrap_or_else(|| DEFAULT_TRACK_COLLECTION.to_string()),
            track_field: self
                .track_field
                .unwrap_or_else(|| DEFAULT_TRACK_FIELD.to_string()),
        })
    }
}

/// MongoDB-backed tail store.
///
/// Persists one record per tracker identity in a tracking collection:
///
/// ```text
/// {
///   "trackerId": "cancellations-tracker",
///   "lastTrackingValue": <bookmark>,
///   "updatedAt": <timestamp>
/// }
/// ```
///
/// Saves are idempotent upserts against the `trackerId` key. The bookmark
/// field name is configurable for compatibility with pre-existing tracking
/// collections. Cheap to clone; clones share the underlying client.
#[derive(Debug, Clone)]
pub struct MongoStore {
    collection: Collection<Document>,
    track_field: String,
}

impl MongoStore {
    /// Creates a store over an existing client.
    ///
    /// The tracking collection is created implicitly on first save.
    #[must_use]
    pub fn new(client: &Client, config: MongoStoreConfig) -> Self {
        debug!(
            database = %config.database,
            collection = %config.collection,
            "Creating MongoDB tail store"
        );
        Self {
            collection: client
                .database(&config.database)
                .collection::<Document>(&config.collection),
            track_field: config.track_field,
        }
    }

    /// Returns the tracking collection name.
    #[must_use]
    pub fn collection_name(&self) -> &str {
        self.collection.name()
    }
}

fn backend(err: mongodb::error::Error) -> TailStoreError {
    TailStoreError::Backend(Box::new(err))
}

#[async_trait::async_trait]
impl TailStore for MongoStore {
    async fn save_bookmark(&self, tracker_id: &str, value: &Bson) -> Result<(), TailStoreError> {
        trace!(tracker_id, value = ?value, "Saving bookmark to MongoDB");

        let record = doc! {
            "trackerId": tracker_id,
            &self.track_field: value.clone(),
            "updatedAt": bson::DateTime::now(),
        };

        self.collection
            .replace_one(doc! { "trackerId": tracker_id }, record)
            .upsert(true)
            .await
            .map_err(backend)?;

        debug!(tracker_id, "Saved bookmark to MongoDB");
        Ok(())
    }

    async fn load_bookmark(&self, tracker_id: &str) -> Result<Option<Bson>, TailStoreError> {
        trace!(tracker_id, "Loading bookmark from MongoDB");

        let record = self
            .collection
            .find_one(doc! { "trackerId": tracker_id })
            .await
            .map_err(backend)?;

        let Some(record) = record else {
            debug!(tracker_id, "No bookmark record in MongoDB");
            return Ok(None);
        };

        match record.get(&self.track_field) {
            Some(value) => {
                debug!(tracker_id, "Found bookmark in MongoDB");
                Ok(Some(value.clone()))
            }
            None => Err(TailStoreError::Serialization(format!(
                "tracking record for '{tracker_id}' is missing field '{}'",
                self.track_field
            ))),
        }
    }

    async fn delete_bookmark(&self, tracker_id: &str) -> Result<(), TailStoreError> {
        trace!(tracker_id, "Deleting bookmark from MongoDB");

        self.collection
            .delete_one(doc! { "trackerId": tracker_id })
            .await
            .map_err(backend)?;

        debug!(tracker_id, "Deleted bookmark from MongoDB");
        Ok(())
    }

    async fn close(&self) -> Result<(), TailStoreError> {
        // The client is shared and owned by the caller; nothing to release.
        debug!("Closing MongoDB tail store (no-op)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TailConfig;

    #[test]
    fn config_requires_database() {
        let err = MongoStoreConfig::builder().build().unwrap_err();
        assert!(matches!(err, TailStoreError::Other(_)));
    }

    #[test]
    fn config_defaults() {
        let config = MongoStoreConfig::builder().database("flights").build().unwrap();
        assert_eq!(config.collection, DEFAULT_TRACK_COLLECTION);
        assert_eq!(config.track_field, DEFAULT_TRACK_FIELD);
    }

    #[test]
    fn config_overrides() {
        let config = MongoStoreConfig::builder()
            .database("bookkeeping")
            .collection("flightsTailTracking")
            .track_field("lastValue")
            .build()
            .unwrap();
        assert_eq!(config.database, "bookkeeping");
        assert_eq!(config.collection, "flightsTailTracking");
        assert_eq!(config.track_field, "lastValue");
    }

    #[test]
    fn endpoint_defaults_to_tailed_database() {
        let config = EndpointConfig::builder()
            .database("flights")
            .collection("cancellations")
            .consumer(TailConfig::builder().increasing_field("seq").build().unwrap())
            .build()
            .unwrap();

        let derived = MongoStoreConfig::for_endpoint(&config).unwrap();
        assert_eq!(derived.database, "flights");
        assert_eq!(derived.collection, DEFAULT_TRACK_COLLECTION);
        assert_eq!(derived.track_field, DEFAULT_TRACK_FIELD);
    }

    #[test]
    fn endpoint_tracking_location_overrides_are_honored() {
        let config = EndpointConfig::builder()
            .database("flights")
            .collection("cancellations")
            .consumer(
                TailConfig::builder()
                    .increasing_field("seq")
                    .persistent("tracker-1")
                    .track_db("bookkeeping")
                    .track_collection("flightsTailTracking")
                    .track_field("lastValue")
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();

        let derived = MongoStoreConfig::for_endpoint(&config).unwrap();
        assert_eq!(derived.database, "bookkeeping");
        assert_eq!(derived.collection, "flightsTailTracking");
        assert_eq!(derived.track_field, "lastValue");
    }

    #[test]
    fn no_tracking_location_for_producer_endpoints() {
        let config = EndpointConfig::builder()
            .database("flights")
            .collection("tickets")
            .producer(
                crate::config::ProducerConfig::builder()
                    .operation(crate::operation::Operation::Insert)
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();
        assert!(MongoStoreConfig::for_endpoint(&config).is_none());
    }
}
