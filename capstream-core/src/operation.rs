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

//! Producer operation tags.
//!
//! The producer supports a fixed, enumerated set of operations against the
//! data store. Operation tags arriving as strings (endpoint configuration or
//! per-request header override) are parsed with [`Operation::parse`]; unknown
//! tags are a hard error, never a silent fallback to a default operation.
//!
//! # Example
//!
//! ```rust
//! use capstream_core::operation::Operation;
//!
//! let op = Operation::parse("findAll").unwrap();
//! assert_eq!(op, Operation::FindAll);
//! assert!(!op.is_write());
//!
//! assert!(Operation::parse("explode").is_err());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The fixed set of producer operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    /// Run an aggregation pipeline against the collection.
    Aggregate,

    /// Run a raw database command.
    Command,

    /// Count documents matching a filter.
    Count,

    /// Return the distinct values of a field.
    FindDistinct,

    /// Return all documents matching a filter.
    FindAll,

    /// Return the document with a given `_id`.
    FindById,

    /// Return the first document matching a filter.
    FindOneByQuery,

    /// Return collection statistics (`collStats`).
    GetColStats,

    /// Return database statistics (`dbStats`).
    GetDbStats,

    /// Insert one document or a list of documents.
    Insert,

    /// Remove documents matching a filter.
    Remove,

    /// Insert-or-replace a document keyed by its `_id`.
    Save,

    /// Apply an update specification to matching documents.
    Update,
}

/// All operations, in tag order. Used by dispatch-completeness tests.
pub const ALL_OPERATIONS: [Operation; 13] = [
    Operation::Aggregate,
    Operation::Command,
    Operation::Count,
    Operation::FindDistinct,
    Operation::FindAll,
    Operation::FindById,
    Operation::FindOneByQuery,
    Operation::GetColStats,
    Operation::GetDbStats,
    Operation::Insert,
    Operation::Remove,
    Operation::Save,
    Operation::Update,
];

/// Error raised when an operation tag is not one of the supported set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported operation: {0}")]
pub struct UnsupportedOperation(pub String);

impl Operation {
    /// Parses an operation tag.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedOperation`] naming the offending tag. This is a
    /// configuration-style error: callers must fail the request (or the
    /// endpoint) rather than substitute a default operation.
    pub fn parse(tag: &str) -> Result<Self, UnsupportedOperation> {
        match tag {
            "aggregate" => Ok(Self::Aggregate),
            "command" => Ok(Self::Command),
            "count" => Ok(Self::Count),
            "findDistinct" => Ok(Self::FindDistinct),
            "findAll" => Ok(Self::FindAll),
            "findById" => Ok(Self::FindById),
            "findOneByQuery" => Ok(Self::FindOneByQuery),
            "getColStats" => Ok(Self::GetColStats),
            "getDbStats" => Ok(Self::GetDbStats),
            "insert" => Ok(Self::Insert),
            "remove" => Ok(Self::Remove),
            "save" => Ok(Self::Save),
            "update" => Ok(Self::Update),
            other => Err(UnsupportedOperation(other.to_string())),
        }
    }

    /// Returns the canonical tag string for this operation.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Aggregate => "aggregate",
            Self::Command => "command",
            Self::Count => "count",
            Self::FindDistinct => "findDistinct",
            Self::FindAll => "findAll",
            Self::FindById => "findById",
            Self::FindOneByQuery => "findOneByQuery",
            Self::GetColStats => "getColStats",
            Self::GetDbStats => "getDbStats",
            Self::Insert => "insert",
            Self::Remove => "remove",
            Self::Save => "save",
            Self::Update => "update",
        }
    }

    /// Returns true for operations that mutate the store.
    ///
    /// Write operations produce a write result that is shaped onto the
    /// outbound message per the endpoint's `write_result_as_header` switch.
    #[inline]
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Insert | Self::Save | Self::Update | Self::Remove)
    }

    /// Returns true for operations that read documents and honor the
    /// sort / projection / pagination headers.
    #[inline]
    #[must_use]
    pub fn is_read(&self) -> bool {
        matches!(
            self,
            Self::FindAll | Self::FindOneByQuery | Self::FindDistinct | Self::Count | Self::FindById
        )
    }

    /// Returns true if the operation can yield a lazy document stream
    /// instead of a materialized list.
    #[inline]
    #[must_use]
    pub fn supports_streaming(&self) -> bool {
        matches!(self, Self::FindAll | Self::Aggregate)
    }
}

impl FromStr for Operation {
    type Err = UnsupportedOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_every_tag() {
        for op in ALL_OPERATIONS {
            assert_eq!(Operation::parse(op.tag()), Ok(op));
        }
    }

    #[test]
    fn parse_rejects_unknown_tag() {
        let err = Operation::parse("dropEverything").unwrap_err();
        assert_eq!(err.0, "dropEverything");
    }

    #[test]
    fn parse_is_case_sensitive() {
        // Tags are camelCase; "findall" is not a valid tag.
        assert!(Operation::parse("findall").is_err());
        assert!(Operation::parse("FINDALL").is_err());
    }

    #[test]
    fn write_classification() {
        assert!(Operation::Insert.is_write());
        assert!(Operation::Save.is_write());
        assert!(Operation::Update.is_write());
        assert!(Operation::Remove.is_write());
        assert!(!Operation::FindAll.is_write());
        assert!(!Operation::Command.is_write());
    }

    #[test]
    fn streaming_support() {
        assert!(Operation::FindAll.supports_streaming());
        assert!(Operation::Aggregate.supports_streaming());
        assert!(!Operation::FindById.supports_streaming());
        assert!(!Operation::Insert.supports_streaming());
    }
}
