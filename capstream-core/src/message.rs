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

//! Message model for producer requests/responses and tailed documents.
//!
//! Two shapes flow through Capstream:
//!
//! - [`Message`]: the producer-side request/response. A bag of named BSON
//!   headers plus a body. Inbound headers are always copied onto the outbound
//!   message; operation results land either in the body or in the
//!   [`headers::WRITE_RESULT`] header depending on endpoint configuration.
//! - [`TailedDocument`]: the unit of work the tailing process hands to the
//!   downstream [`Processor`](crate::processor::Processor). Carries the raw
//!   document plus fixed source metadata.
//!
//! # Example
//!
//! ```rust
//! use capstream_core::message::{headers, Message};
//! use bson::{bson, doc};
//!
//! let request = Message::with_body(bson!({ "name": "Alice" }))
//!     .header(headers::COLLECTION, "users");
//!
//! assert!(request.headers.contains_key(headers::COLLECTION));
//! ```

use bson::{Bson, Document};
use futures::Stream;
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;

/// Well-known header names.
///
/// Request headers drive per-request behavior (target overrides, filters,
/// pagination); result headers report operation outcomes.
pub mod headers {
    /// Per-request database override (honored only with dynamicity enabled).
    pub const DATABASE: &str = "capstream.database";

    /// Per-request collection override (honored only with dynamicity enabled).
    pub const COLLECTION: &str = "capstream.collection";

    /// Per-request operation override (honored only when enabled on the endpoint).
    pub const OPERATION: &str = "capstream.operation";

    /// Filter document for read/update/remove operations.
    pub const CRITERIA: &str = "capstream.criteria";

    /// Sort specification for read operations.
    pub const SORT: &str = "capstream.sortBy";

    /// Field projection for read operations.
    pub const PROJECTION: &str = "capstream.fieldsProjection";

    /// Number of documents to skip in a find.
    pub const SKIP: &str = "capstream.numToSkip";

    /// Maximum number of documents to return from a find.
    pub const LIMIT: &str = "capstream.limit";

    /// Driver batch size for cursors.
    pub const BATCH_SIZE: &str = "capstream.batchSize";

    /// Field name for `findDistinct`.
    pub const DISTINCT_FIELD: &str = "capstream.distinctQueryField";

    /// Upsert flag for `update`.
    pub const UPSERT: &str = "capstream.upsert";

    /// Multi-document flag for `update` (update all matches vs. the first).
    pub const MULTI_UPDATE: &str = "capstream.multiUpdate";

    /// Result: raw write result document (set when `write_result_as_header`).
    pub const WRITE_RESULT: &str = "capstream.writeResult";

    /// Result: generated id(s) for `insert`/`save`.
    pub const OID: &str = "capstream.oid";

    /// Result: number of documents matched by an `update`.
    pub const RECORDS_MATCHED: &str = "capstream.recordsMatched";

    /// Result: number of documents modified by an `update`.
    pub const RECORDS_MODIFIED: &str = "capstream.recordsModified";

    /// Result: number of documents removed by a `remove`.
    pub const RECORDS_DELETED: &str = "capstream.recordsDeleted";

    /// Result: total documents matching a find filter, ignoring pagination.
    pub const RESULT_TOTAL_SIZE: &str = "capstream.resultTotalSize";

    /// Result: number of documents in the returned page.
    pub const RESULT_PAGE_SIZE: &str = "capstream.resultPageSize";
}

/// A lazy stream of documents from the store.
///
/// Returned as a message body when the endpoint's output shape is
/// [`OutputShape::Stream`](crate::config::OutputShape). The stream owns the
/// underlying driver cursor; dropping it closes the cursor.
pub type DocumentStream =
    Pin<Box<dyn Stream<Item = Result<Document, mongodb::error::Error>> + Send>>;

/// Message body.
///
/// Bodies holding a [`DocumentStream`] are not cloneable; everything else is.
pub enum Body {
    /// No body.
    Empty,

    /// A BSON value (document, array, scalar).
    Value(Bson),

    /// A lazy cursor over result documents.
    Stream(DocumentStream),
}

impl Body {
    /// Returns the BSON value, if this body holds one.
    #[must_use]
    pub fn as_value(&self) -> Option<&Bson> {
        match self {
            Body::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the body as a document reference, if it holds one.
    #[must_use]
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Body::Value(Bson::Document(d)) => Some(d),
            _ => None,
        }
    }

    /// Returns true when the body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Body::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Bson> for Body {
    fn from(value: Bson) -> Self {
        Body::Value(value)
    }
}

impl From<Document> for Body {
    fn from(value: Document) -> Self {
        Body::Value(Bson::Document(value))
    }
}

/// A producer request or response.
#[derive(Debug)]
pub struct Message {
    /// Named BSON headers.
    pub headers: HashMap<String, Bson>,

    /// The payload.
    pub body: Body,
}

impl Message {
    /// Creates an empty message.
    #[must_use]
    pub fn new() -> Self {
        Self {
            headers: HashMap::new(),
            body: Body::Empty,
        }
    }

    /// Creates a message with the given body value.
    #[must_use]
    pub fn with_body(body: impl Into<Bson>) -> Self {
        Self {
            headers: HashMap::new(),
            body: Body::Value(body.into()),
        }
    }

    /// Adds a header, builder style.
    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<Bson>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }

    /// Sets a header in place.
    pub fn set_header(&mut self, name: &str, value: impl Into<Bson>) {
        self.headers.insert(name.to_string(), value.into());
    }

    /// Returns a header value by name.
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&Bson> {
        self.headers.get(name)
    }

    /// Returns a header interpreted as a string.
    #[must_use]
    pub fn header_str(&self, name: &str) -> Option<&str> {
        match self.headers.get(name) {
            Some(Bson::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns a header interpreted as a document.
    #[must_use]
    pub fn header_document(&self, name: &str) -> Option<&Document> {
        match self.headers.get(name) {
            Some(Bson::Document(d)) => Some(d),
            _ => None,
        }
    }

    /// Returns a header interpreted as a 64-bit integer.
    ///
    /// Accepts BSON `Int32`, `Int64`, and `Double` with an integral value.
    #[must_use]
    pub fn header_i64(&self, name: &str) -> Option<i64> {
        match self.headers.get(name) {
            Some(Bson::Int32(n)) => Some(i64::from(*n)),
            Some(Bson::Int64(n)) => Some(*n),
            #[allow(clippy::cast_possible_truncation)]
            Some(Bson::Double(f)) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// Returns a header interpreted as a boolean.
    #[must_use]
    pub fn header_bool(&self, name: &str) -> Option<bool> {
        match self.headers.get(name) {
            Some(Bson::Boolean(b)) => Some(*b),
            _ => None,
        }
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

/// The unit of work forwarded for each tailed document.
///
/// The metadata fields are fixed: source database, source collection, and a
/// marker flagging that the document came from tail-following rather than a
/// one-shot query.
#[derive(Debug, Clone, PartialEq)]
pub struct TailedDocument {
    /// Database the document was read from.
    pub database: String,

    /// Capped collection the document was read from.
    pub collection: String,

    /// Always true for documents produced by the tailing process.
    pub from_tail: bool,

    /// The raw document.
    pub document: Document,
}

impl TailedDocument {
    /// Creates a tailed-document unit of work.
    #[must_use]
    pub fn new(database: impl Into<String>, collection: impl Into<String>, document: Document) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
            from_tail: true,
            document,
        }
    }

    /// Returns the fully qualified namespace as "database.collection".
    #[must_use]
    pub fn namespace(&self) -> String {
        format!("{}.{}", self.database, self.collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{bson, doc};

    #[test]
    fn header_accessors() {
        let msg = Message::with_body(doc! { "a": 1 })
            .header(headers::COLLECTION, "users")
            .header(headers::LIMIT, 25_i32)
            .header(headers::UPSERT, true)
            .header(headers::CRITERIA, doc! { "x": 1 });

        assert_eq!(msg.header_str(headers::COLLECTION), Some("users"));
        assert_eq!(msg.header_i64(headers::LIMIT), Some(25));
        assert_eq!(msg.header_bool(headers::UPSERT), Some(true));
        assert_eq!(msg.header_document(headers::CRITERIA), Some(&doc! { "x": 1 }));
        assert_eq!(msg.header_str("missing"), None);
    }

    #[test]
    fn header_i64_accepts_wider_numeric_types() {
        let msg = Message::new()
            .header(headers::SKIP, Bson::Int64(7))
            .header(headers::LIMIT, Bson::Double(3.0));

        assert_eq!(msg.header_i64(headers::SKIP), Some(7));
        assert_eq!(msg.header_i64(headers::LIMIT), Some(3));
    }

    #[test]
    fn body_document_access() {
        let msg = Message::with_body(bson!({ "k": "v" }));
        assert_eq!(msg.body.as_document(), Some(&doc! { "k": "v" }));
        assert!(!msg.body.is_empty());

        let empty = Message::new();
        assert!(empty.body.is_empty());
        assert_eq!(empty.body.as_document(), None);
    }

    #[test]
    fn tailed_document_metadata() {
        let unit = TailedDocument::new("flights", "cancellations", doc! { "seq": 9 });
        assert!(unit.from_tail);
        assert_eq!(unit.namespace(), "flights.cancellations");
        assert_eq!(unit.document, doc! { "seq": 9 });
    }
}
