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

//! Downstream handler for tailed documents.
//!
//! The tailing process dispatches each [`TailedDocument`] synchronously to a
//! [`Processor`]. Delivery is best-effort and at-most-once: a processor fault
//! is logged and counted, the tracking position still advances, and the loop
//! continues. Processors needing stronger guarantees must implement their own
//! durability (e.g., write to a queue before returning).
//!
//! # Example
//!
//! ```rust
//! use capstream_core::message::TailedDocument;
//! use capstream_core::processor::{Processor, ProcessorError};
//!
//! struct PrintProcessor;
//!
//! #[async_trait::async_trait]
//! impl Processor for PrintProcessor {
//!     async fn process(&self, unit: TailedDocument) -> Result<(), ProcessorError> {
//!         println!("{}: {:?}", unit.namespace(), unit.document);
//!         Ok(())
//!     }
//! }
//! ```

use crate::message::TailedDocument;

/// Trait for downstream document handlers.
///
/// Implementations must be `Send + Sync`: the tailing worker task owns a
/// shared reference and calls `process` from its own task.
#[async_trait::async_trait]
pub trait Processor: Send + Sync {
    /// Handles one tailed document.
    ///
    /// # Errors
    ///
    /// Errors are swallowed by the tailing loop (logged at warn, counted);
    /// they never abort the consumer.
    async fn process(&self, unit: TailedDocument) -> Result<(), ProcessorError>;
}

/// Errors returned by downstream processors.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// The document could not be handled.
    #[error("Processing failed: {message}")]
    Failed {
        /// Human-readable error message
        message: String,
        /// The underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ProcessorError {
    /// Creates a processing failure from a message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a processing failure wrapping a source error.
    #[must_use]
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Failed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
