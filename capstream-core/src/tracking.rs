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

//! Tail tracking: a durable, monotonic bookmark over the tailed stream.
//!
//! The [`TailTracker`] owns the last-seen value of the configured increasing
//! field and persists it through a [`TailStore`]. Lifecycle:
//!
//! 1. [`TailTracker::recover`] at tailing-process startup loads the persisted
//!    bookmark (if persistence is enabled and a record exists).
//! 2. [`TailTracker::set_last_value`] after every forwarded document updates
//!    the in-memory position.
//! 3. [`TailTracker::persist`] at the end of every cursor lifetime and on
//!    shutdown upserts the bookmark; last writer wins, no versioning.
//!
//! The tracker never deletes its record. Concurrent trackers sharing a store
//! must use distinct identities.

use crate::store::{TailStore, TailStoreError};
use bson::{doc, Bson, Document};
use std::sync::Arc;
use tracing::{debug, trace};

/// Errors raised by the tracking manager.
#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    /// A tailed document is missing the increasing field. This is a
    /// data-shape violation the operator must fix; the tailing loop decides
    /// whether to advance past it or halt.
    #[error("Document is missing increasing field '{field}'")]
    MissingField {
        /// The configured increasing field name
        field: String,
    },

    /// The bookmark store failed.
    #[error("Bookmark store error: {0}")]
    Store(#[from] TailStoreError),
}

/// Durable, monotonic bookmark over a tailed capped collection.
pub struct TailTracker {
    /// Bookmark storage; `None` when persistence is disabled.
    store: Option<Arc<dyn TailStore>>,

    /// Identity of this tracker's persisted record.
    tracker_id: String,

    /// The field whose value defines progress order. No dotted paths.
    increasing_field: String,

    /// Last-seen value of the increasing field.
    last_value: Option<Bson>,
}

impl TailTracker {
    /// Creates a tracker without persistence: the bookmark lives only in
    /// memory and every restart begins from the current tail.
    #[must_use]
    pub fn transient(increasing_field: impl Into<String>) -> Self {
        Self {
            store: None,
            tracker_id: String::new(),
            increasing_field: increasing_field.into(),
            last_value: None,
        }
    }

    /// Creates a tracker with durable persistence under `tracker_id`.
    #[must_use]
    pub fn persistent(
        increasing_field: impl Into<String>,
        tracker_id: impl Into<String>,
        store: Arc<dyn TailStore>,
    ) -> Self {
        Self {
            store: Some(store),
            tracker_id: tracker_id.into(),
            increasing_field: increasing_field.into(),
            last_value: None,
        }
    }

    /// Returns the configured increasing field name.
    #[must_use]
    pub fn increasing_field(&self) -> &str {
        &self.increasing_field
    }

    /// Returns the current in-memory position.
    #[must_use]
    pub fn last_value(&self) -> Option<&Bson> {
        self.last_value.as_ref()
    }

    /// Returns true when this tracker persists its bookmark.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    /// Loads the persisted bookmark, if any.
    ///
    /// With persistence disabled, or no record for this identity, the
    /// position stays unset, meaning "start from the current tail and ignore
    /// history".
    ///
    /// # Errors
    ///
    /// Store failures propagate; recovery runs during consumer
    /// initialization, where connectivity faults are fatal.
    pub async fn recover(&mut self) -> Result<(), TrackingError> {
        let Some(store) = &self.store else {
            debug!("Tail tracking persistence disabled; starting from current tail");
            return Ok(());
        };

        match store.load_bookmark(&self.tracker_id).await? {
            Some(value) => {
                debug!(
                    tracker_id = %self.tracker_id,
                    ?value,
                    "Recovered tail tracking bookmark"
                );
                self.last_value = Some(value);
            }
            None => {
                debug!(
                    tracker_id = %self.tracker_id,
                    "No persisted bookmark; starting from current tail"
                );
            }
        }

        Ok(())
    }

    /// Extracts the increasing field from `document` and records it as the
    /// new position.
    ///
    /// # Errors
    ///
    /// Returns [`TrackingError::MissingField`] when the field is absent.
    /// The in-memory position is left unchanged in that case.
    pub fn set_last_value(&mut self, document: &Document) -> Result<(), TrackingError> {
        match document.get(&self.increasing_field) {
            Some(value) => {
                trace!(field = %self.increasing_field, ?value, "Advancing tail position");
                self.last_value = Some(value.clone());
                Ok(())
            }
            None => Err(TrackingError::MissingField {
                field: self.increasing_field.clone(),
            }),
        }
    }

    /// Sets the position directly.
    ///
    /// Used at cold start to seed the position from the newest document
    /// already in the collection, so pre-existing documents are not replayed.
    pub fn seed(&mut self, value: Bson) {
        debug!(?value, "Seeding tail position");
        self.last_value = Some(value);
    }

    /// Upserts the bookmark into the store.
    ///
    /// Idempotent; safe to call repeatedly. No-op when persistence is
    /// disabled or nothing has been tracked yet.
    ///
    /// # Errors
    ///
    /// Returns the store failure; steady-state callers log and continue,
    /// shutdown callers log and proceed with teardown.
    pub async fn persist(&self) -> Result<(), TrackingError> {
        let (Some(store), Some(value)) = (&self.store, &self.last_value) else {
            return Ok(());
        };

        store.save_bookmark(&self.tracker_id, value).await?;
        debug!(tracker_id = %self.tracker_id, ?value, "Persisted tail tracking bookmark");
        Ok(())
    }

    /// Returns the cursor filter for the current position:
    /// `{ increasing_field: { $gt: last_value } }`, or `None` when no
    /// position is held (consume from now forward, no lower bound).
    #[must_use]
    pub fn resume_filter(&self) -> Option<Document> {
        self.last_value
            .as_ref()
            .map(|value| doc! { &self.increasing_field: { "$gt": value.clone() } })
    }
}

impl std::fmt::Debug for TailTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailTracker")
            .field("tracker_id", &self.tracker_id)
            .field("increasing_field", &self.increasing_field)
            .field("last_value", &self.last_value)
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MapStore {
        bookmarks: Mutex<HashMap<String, Bson>>,
    }

    #[async_trait::async_trait]
    impl TailStore for MapStore {
        async fn save_bookmark(&self, tracker_id: &str, value: &Bson) -> Result<(), TailStoreError> {
            self.bookmarks
                .lock()
                .await
                .insert(tracker_id.to_string(), value.clone());
            Ok(())
        }

        async fn load_bookmark(&self, tracker_id: &str) -> Result<Option<Bson>, TailStoreError> {
            Ok(self.bookmarks.lock().await.get(tracker_id).cloned())
        }

        async fn delete_bookmark(&self, tracker_id: &str) -> Result<(), TailStoreError> {
            self.bookmarks.lock().await.remove(tracker_id);
            Ok(())
        }

        async fn close(&self) -> Result<(), TailStoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn transient_tracker_recovers_nothing() {
        let mut tracker = TailTracker::transient("seq");
        tracker.recover().await.unwrap();
        assert!(tracker.last_value().is_none());
        assert!(tracker.resume_filter().is_none());
    }

    #[tokio::test]
    async fn set_last_value_advances_position() {
        let mut tracker = TailTracker::transient("seq");
        tracker.set_last_value(&doc! { "seq": 5, "body": "x" }).unwrap();
        assert_eq!(tracker.last_value(), Some(&Bson::Int32(5)));

        tracker.set_last_value(&doc! { "seq": 6 }).unwrap();
        assert_eq!(tracker.last_value(), Some(&Bson::Int32(6)));
    }

    #[tokio::test]
    async fn missing_field_is_an_error_and_keeps_position() {
        let mut tracker = TailTracker::transient("seq");
        tracker.set_last_value(&doc! { "seq": 5 }).unwrap();

        let err = tracker.set_last_value(&doc! { "other": 1 }).unwrap_err();
        assert!(matches!(err, TrackingError::MissingField { ref field } if field == "seq"));
        assert_eq!(tracker.last_value(), Some(&Bson::Int32(5)));
    }

    #[tokio::test]
    async fn persist_and_recover_round_trip() {
        let store = Arc::new(MapStore::default());

        let mut tracker = TailTracker::persistent("seq", "flights-tracker", store.clone());
        tracker.set_last_value(&doc! { "seq": 41 }).unwrap();
        tracker.persist().await.unwrap();

        // Simulated restart: fresh tracker, same identity.
        let mut resumed = TailTracker::persistent("seq", "flights-tracker", store.clone());
        resumed.recover().await.unwrap();
        assert_eq!(resumed.last_value(), Some(&Bson::Int32(41)));
        assert_eq!(
            resumed.resume_filter(),
            Some(doc! { "seq": { "$gt": 41 } })
        );
    }

    #[tokio::test]
    async fn persist_is_idempotent_and_last_writer_wins() {
        let store = Arc::new(MapStore::default());

        let mut tracker = TailTracker::persistent("seq", "t", store.clone());
        tracker.set_last_value(&doc! { "seq": 1 }).unwrap();
        tracker.persist().await.unwrap();
        tracker.persist().await.unwrap();
        tracker.set_last_value(&doc! { "seq": 2 }).unwrap();
        tracker.persist().await.unwrap();

        let mut resumed = TailTracker::persistent("seq", "t", store);
        resumed.recover().await.unwrap();
        assert_eq!(resumed.last_value(), Some(&Bson::Int32(2)));
    }

    #[tokio::test]
    async fn distinct_identities_do_not_collide() {
        let store = Arc::new(MapStore::default());

        let mut a = TailTracker::persistent("seq", "a", store.clone());
        let mut b = TailTracker::persistent("seq", "b", store.clone());
        a.set_last_value(&doc! { "seq": 10 }).unwrap();
        b.set_last_value(&doc! { "seq": 20 }).unwrap();
        a.persist().await.unwrap();
        b.persist().await.unwrap();

        let mut a2 = TailTracker::persistent("seq", "a", store);
        a2.recover().await.unwrap();
        assert_eq!(a2.last_value(), Some(&Bson::Int32(10)));
    }

    #[tokio::test]
    async fn persist_without_position_is_a_no_op() {
        let store = Arc::new(MapStore::default());
        let tracker = TailTracker::persistent("seq", "t", store.clone());
        tracker.persist().await.unwrap();
        assert!(store.load_bookmark("t").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn seed_sets_exclusive_lower_bound() {
        let mut tracker = TailTracker::transient("seq");
        tracker.seed(Bson::Int32(99));
        assert_eq!(
            tracker.resume_filter(),
            Some(doc! { "seq": { "$gt": 99 } })
        );
    }
}
