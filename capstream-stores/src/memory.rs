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

//! In-memory tail store implementation.
//!
//! This module provides a thread-safe, in-memory implementation of the
//! [`TailStore`] trait for storing tail-tracking bookmarks.
//!
//! # Use Cases
//!
//! The in-memory store is suitable for:
//!
//! - **Local development and testing** - No external dependencies required
//! - **Single-instance deployments** - Where the consumer restarting from the
//!   current tail is acceptable
//!
//! # Limitations
//!
//! ⚠️ **Important**: bookmarks are lost on process restart; a consumer backed
//! by this store behaves like a transient tracker across restarts. For
//! durable resume positions use
//! [`MongoStore`](capstream_core::store::MongoStore) instead.
//!
//! # Example
//!
//! ```rust
//! use capstream_stores::memory::MemoryStore;
//! use capstream_core::store::TailStore;
//! use bson::Bson;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::new();
//!
//! store.save_bookmark("cancellations-tracker", &Bson::Int64(42)).await?;
//!
//! let recovered = store.load_bookmark("cancellations-tracker").await?;
//! assert_eq!(recovered, Some(Bson::Int64(42)));
//!
//! store.delete_bookmark("cancellations-tracker").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! The store uses [`Arc`] and [`RwLock`] internally, making it safe to share
//! across async tasks and threads. Clones share the same underlying storage.

use bson::Bson;
use capstream_core::store::{TailStore, TailStoreError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

/// In-memory tail store for tail-tracking bookmarks.
///
/// Bookmarks live in a [`HashMap`] keyed by tracker identity, protected by an
/// [`RwLock`].
///
/// # Example
///
/// ```rust
/// use capstream_stores::memory::MemoryStore;
///
/// let store = MemoryStore::new();
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStore {
    /// Internal storage for bookmarks
    bookmarks: Arc<RwLock<HashMap<String, Bson>>>,
}

impl MemoryStore {
    /// Creates a new, empty in-memory tail store.
    #[must_use]
    pub fn new() -> Self {
        debug!("Creating new in-memory tail store");
        Self {
            bookmarks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Creates a store with pre-populated bookmarks.
    ///
    /// Useful for testing, or when migrating from another store.
    ///
    /// # Example
    ///
    /// ```rust
    /// use capstream_stores::memory::MemoryStore;
    /// use bson::Bson;
    /// use std::collections::HashMap;
    ///
    /// let mut initial = HashMap::new();
    /// initial.insert("tracker-1".to_string(), Bson::Int64(100));
    ///
    /// let store = MemoryStore::with_bookmarks(initial);
    /// ```
    #[must_use]
    pub fn with_bookmarks(bookmarks: HashMap<String, Bson>) -> Self {
        debug!(
            bookmark_count = bookmarks.len(),
            "Creating in-memory tail store with initial bookmarks"
        );
        Self {
            bookmarks: Arc::new(RwLock::new(bookmarks)),
        }
    }

    /// Returns the current number of stored bookmarks.
    pub async fn len(&self) -> usize {
        self.bookmarks.read().await.len()
    }

    /// Returns `true` if the store contains no bookmarks.
    pub async fn is_empty(&self) -> bool {
        self.bookmarks.read().await.is_empty()
    }

    /// Removes all bookmarks.
    ///
    /// Every consumer backed by this store will start from the current tail
    /// on its next recovery.
    pub async fn clear(&self) {
        let mut bookmarks = self.bookmarks.write().await;
        let count = bookmarks.len();
        bookmarks.clear();
        debug!(cleared_count = count, "Cleared all bookmarks from memory store");
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TailStore for MemoryStore {
    async fn save_bookmark(&self, tracker_id: &str, value: &Bson) -> Result<(), TailStoreError> {
        trace!(tracker_id, value = ?value, "Saving bookmark to memory");

        let mut bookmarks = self.bookmarks.write().await;
        bookmarks.insert(tracker_id.to_string(), value.clone());

        debug!(
            tracker_id,
            total_bookmarks = bookmarks.len(),
            "Saved bookmark to memory"
        );

        Ok(())
    }

    async fn load_bookmark(&self, tracker_id: &str) -> Result<Option<Bson>, TailStoreError> {
        trace!(tracker_id, "Loading bookmark from memory");

        let bookmarks = self.bookmarks.read().await;
        let bookmark = bookmarks.get(tracker_id).cloned();

        if bookmark.is_some() {
            debug!(tracker_id, "Found bookmark in memory");
        } else {
            debug!(tracker_id, "No bookmark found in memory");
        }

        Ok(bookmark)
    }

    async fn delete_bookmark(&self, tracker_id: &str) -> Result<(), TailStoreError> {
        trace!(tracker_id, "Deleting bookmark from memory");

        let mut bookmarks = self.bookmarks.write().await;
        let removed = bookmarks.remove(tracker_id);

        if removed.is_some() {
            debug!(
                tracker_id,
                remaining_bookmarks = bookmarks.len(),
                "Deleted bookmark from memory"
            );
        } else {
            warn!(tracker_id, "Attempted to delete non-existent bookmark");
        }

        Ok(())
    }

    async fn close(&self) -> Result<(), TailStoreError> {
        debug!("Closing in-memory tail store (no-op)");
        // No resources to clean up for in-memory store
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_store_is_empty() {
        let store = MemoryStore::new();
        assert!(store.is_empty().await);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_save_and_load_bookmark() {
        let store = MemoryStore::new();

        store
            .save_bookmark("tracker-1", &Bson::Int64(42))
            .await
            .expect("Failed to save bookmark");

        let loaded = store
            .load_bookmark("tracker-1")
            .await
            .expect("Failed to load bookmark");

        assert_eq!(loaded, Some(Bson::Int64(42)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_load_nonexistent_bookmark() {
        let store = MemoryStore::new();
        let loaded = store.load_bookmark("nonexistent").await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_update_bookmark_last_writer_wins() {
        let store = MemoryStore::new();

        store.save_bookmark("t", &Bson::Int64(1)).await.unwrap();
        store.save_bookmark("t", &Bson::Int64(2)).await.unwrap();

        let loaded = store.load_bookmark("t").await.unwrap();
        assert_eq!(loaded, Some(Bson::Int64(2)));
        assert_eq!(store.len().await, 1); // Still only one record
    }

    #[tokio::test]
    async fn test_delete_bookmark() {
        let store = MemoryStore::new();

        store.save_bookmark("t", &Bson::Int64(1)).await.unwrap();
        store.delete_bookmark("t").await.unwrap();

        assert!(store.load_bookmark("t").await.unwrap().is_none());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_delete_nonexistent_bookmark() {
        let store = MemoryStore::new();
        // Should not error when deleting a nonexistent bookmark
        store.delete_bookmark("nonexistent").await.unwrap();
    }

    #[tokio::test]
    async fn test_distinct_identities() {
        let store = MemoryStore::new();

        store.save_bookmark("a", &Bson::Int64(10)).await.unwrap();
        store.save_bookmark("b", &Bson::Int64(20)).await.unwrap();

        assert_eq!(store.load_bookmark("a").await.unwrap(), Some(Bson::Int64(10)));
        assert_eq!(store.load_bookmark("b").await.unwrap(), Some(Bson::Int64(20)));
    }

    #[tokio::test]
    async fn test_non_numeric_bookmark_values() {
        let store = MemoryStore::new();
        let value = Bson::String("2026-01-01T00:00:00Z".to_string());

        store.save_bookmark("t", &value).await.unwrap();
        assert_eq!(store.load_bookmark("t").await.unwrap(), Some(value));
    }

    #[tokio::test]
    async fn test_clear() {
        let store = MemoryStore::new();

        store.save_bookmark("a", &Bson::Int64(1)).await.unwrap();
        store.save_bookmark("b", &Bson::Int64(2)).await.unwrap();
        assert_eq!(store.len().await, 2);

        store.clear().await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_with_bookmarks() {
        let mut initial = HashMap::new();
        initial.insert("tracker-1".to_string(), Bson::Int64(100));

        let store = MemoryStore::with_bookmarks(initial);
        assert_eq!(store.len().await, 1);
        assert_eq!(
            store.load_bookmark("tracker-1").await.unwrap(),
            Some(Bson::Int64(100))
        );
    }

    #[tokio::test]
    async fn test_close() {
        let store = MemoryStore::new();
        store.close().await.expect("Failed to close store");
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = vec![];

        for i in 0..10 {
            let store_clone = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let tracker_id = format!("tracker_{i}");
                store_clone
                    .save_bookmark(&tracker_id, &Bson::Int64(i))
                    .await
                    .unwrap();
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len().await, 10);
    }

    #[tokio::test]
    async fn test_clone_shares_storage() {
        let store1 = MemoryStore::new();
        store1.save_bookmark("t", &Bson::Int64(1)).await.unwrap();

        let store2 = store1.clone();
        assert_eq!(store2.len().await, 1);

        store2.save_bookmark("u", &Bson::Int64(2)).await.unwrap();
        assert_eq!(store1.len().await, 2);
    }
}
