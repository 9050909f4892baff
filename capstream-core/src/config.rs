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

//! Endpoint configuration.
//!
//! An endpoint is either a consumer (tailing a capped collection) or a
//! producer (dispatching operations). The two halves are mutually exclusive
//! on a single endpoint instance; configuring both, or neither, is a
//! [`ConfigError`] raised at startup, never at request time.
//!
//! # Examples
//!
//! ## Consumer endpoint
//!
//! ```rust
//! use capstream_core::config::{EndpointConfig, TailConfig};
//! use std::time::Duration;
//!
//! let config = EndpointConfig::builder()
//!     .database("flights")
//!     .collection("cancellations")
//!     .consumer(
//!         TailConfig::builder()
//!             .increasing_field("departure")
//!             .persistent("cancellations-tracker")
//!             .cursor_regeneration_delay(Duration::from_millis(1000))
//!             .build()
//!             .unwrap(),
//!     )
//!     .build()
//!     .unwrap();
//!
//! assert!(config.consumer.is_some());
//! ```
//!
//! ## Producer endpoint
//!
//! ```rust
//! use capstream_core::config::{EndpointConfig, ProducerConfig};
//! use capstream_core::operation::Operation;
//!
//! let config = EndpointConfig::builder()
//!     .database("flights")
//!     .collection("tickets")
//!     .dynamicity(true)
//!     .producer(ProducerConfig::builder().operation(Operation::Insert).build().unwrap())
//!     .build()
//!     .unwrap();
//! ```

use crate::operation::Operation;
use std::time::Duration;

/// Default collection holding persisted bookmarks.
pub const DEFAULT_TRACK_COLLECTION: &str = "capstream_tail_tracking";

/// Default field storing the bookmark value inside a tracking record.
pub const DEFAULT_TRACK_FIELD: &str = "lastTrackingValue";

/// Configuration errors. Fatal: raised at startup, never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required option is missing.
    #[error("Missing required option: {0}")]
    Missing(&'static str),

    /// Consumer-only and producer-only options were both set.
    #[error("Consumer and producer options are mutually exclusive on a single endpoint")]
    MutuallyExclusive,

    /// Neither consumer nor producer options were set.
    #[error("Endpoint must be configured as either a consumer or a producer")]
    NoRole,

    /// An option value is invalid for the chosen configuration.
    #[error("Invalid option: {0}")]
    Invalid(String),
}

/// How `findAll`/`aggregate` results are shaped onto the outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputShape {
    /// Materialize all result documents into a list body.
    #[default]
    List,

    /// Return a lazy document stream; the caller drives the cursor.
    Stream,
}

/// Consumer-side (tailing) options.
#[derive(Debug, Clone, PartialEq)]
pub struct TailConfig {
    /// Field whose strictly increasing value defines progress order.
    /// Must be present and comparable on every document; dotted paths are
    /// not supported.
    pub increasing_field: String,

    /// Enables durable bookmark recovery/persistence.
    pub persistent: bool,

    /// Distinguishes this tracker's record from others sharing the store.
    /// Required when `persistent` is true.
    pub tracker_id: Option<String>,

    /// Overrides the database holding the tracking collection.
    /// `None` means the tailed database.
    pub track_db: Option<String>,

    /// Overrides the tracking collection name.
    pub track_collection: String,

    /// Overrides the field storing the bookmark inside a tracking record.
    pub track_field: String,

    /// Wait between closing an exhausted cursor and opening its replacement.
    /// Zero disables the wait.
    pub cursor_regeneration_delay: Duration,

    /// Driver batch size for the tailable cursor.
    pub batch_size: Option<u32>,

    /// When true, a failure to extract the increasing field from a tailed
    /// document stops the consumer instead of advancing past it.
    pub halt_on_tracking_failure: bool,
}

impl TailConfig {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> TailConfigBuilder {
        TailConfigBuilder::default()
    }
}

/// Builder for [`TailConfig`].
#[derive(Debug, Default)]
pub struct TailConfigBuilder {
    increasing_field: Option<String>,
    persistent: bool,
    tracker_id: Option<String>,
    track_db: Option<String>,
    track_collection: Option<String>,
    track_field: Option<String>,
    cursor_regeneration_delay: Option<Duration>,
    batch_size: Option<u32>,
    halt_on_tracking_failure: bool,
}

impl TailConfigBuilder {
    /// Names the monotonic ordering field. Required.
    #[must_use]
    pub fn increasing_field(mut self, field: impl Into<String>) -> Self {
        self.increasing_field = Some(field.into());
        self
    }

    /// Enables persistent tail tracking under the given tracker identity.
    #[must_use]
    pub fn persistent(mut self, tracker_id: impl Into<String>) -> Self {
        self.persistent = true;
        self.tracker_id = Some(tracker_id.into());
        self
    }

    /// Overrides the database holding the tracking collection.
    #[must_use]
    pub fn track_db(mut self, db: impl Into<String>) -> Self {
        self.track_db = Some(db.into());
        self
    }

    /// Overrides the tracking collection name.
    #[must_use]
    pub fn track_collection(mut self, collection: impl Into<String>) -> Self {
        self.track_collection = Some(collection.into());
        self
    }

    /// Overrides the bookmark field name inside tracking records.
    #[must_use]
    pub fn track_field(mut self, field: impl Into<String>) -> Self {
        self.track_field = Some(field.into());
        self
    }

    /// Sets the wait between cursor lifetimes. Zero disables the wait.
    ///
    /// Default: 1 second.
    #[must_use]
    pub fn cursor_regeneration_delay(mut self, delay: Duration) -> Self {
        self.cursor_regeneration_delay = Some(delay);
        self
    }

    /// Sets the driver batch size for the tailable cursor.
    #[must_use]
    pub fn batch_size(mut self, size: u32) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Makes a tracking-field extraction failure fatal to the consumer
    /// instead of best-effort advance-and-count.
    #[must_use]
    pub fn halt_on_tracking_failure(mut self) -> Self {
        self.halt_on_tracking_failure = true;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when `increasing_field` is absent, or
    /// when persistence is enabled without a tracker identity.
    pub fn build(self) -> Result<TailConfig, ConfigError> {
        let increasing_field = self
            .increasing_field
            .ok_or(ConfigError::Missing("tailTrackIncreasingField"))?;

        if self.persistent && self.tracker_id.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::Missing("persistentId"));
        }

        Ok(TailConfig {
            increasing_field,
            persistent: self.persistent,
            tracker_id: self.tracker_id,
            track_db: self.track_db,
            track_collection: self
                .track_collection
                .unwrap_or_else(|| DEFAULT_TRACK_COLLECTION.to_string()),
            track_field: self
                .track_field
                .unwrap_or_else(|| DEFAULT_TRACK_FIELD.to_string()),
            cursor_regeneration_delay: self
                .cursor_regeneration_delay
                .unwrap_or(Duration::from_secs(1)),
            batch_size: self.batch_size,
            halt_on_tracking_failure: self.halt_on_tracking_failure,
        })
    }
}

/// Producer-side (dispatch) options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerConfig {
    /// The operation this endpoint dispatches.
    pub operation: Operation,

    /// Place raw write results in the `writeResult` header instead of the
    /// body. Fixed per endpoint, never per request.
    pub write_result_as_header: bool,

    /// Output shape for `findAll`/`aggregate`.
    pub output_shape: OutputShape,

    /// Honor a per-request operation override header.
    pub allow_operation_header: bool,
}

impl ProducerConfig {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> ProducerConfigBuilder {
        ProducerConfigBuilder::default()
    }
}

/// Builder for [`ProducerConfig`].
#[derive(Debug, Default)]
pub struct ProducerConfigBuilder {
    operation: Option<Operation>,
    write_result_as_header: bool,
    output_shape: OutputShape,
    allow_operation_header: bool,
}

impl ProducerConfigBuilder {
    /// Selects the dispatched operation. Required.
    #[must_use]
    pub fn operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Attach write results as a header instead of the body.
    #[must_use]
    pub fn write_result_as_header(mut self) -> Self {
        self.write_result_as_header = true;
        self
    }

    /// Sets the output shape for `findAll`/`aggregate`.
    #[must_use]
    pub fn output_shape(mut self, shape: OutputShape) -> Self {
        self.output_shape = shape;
        self
    }

    /// Allows requests to override the endpoint operation via header.
    /// Unknown tags in the header are still a hard error.
    #[must_use]
    pub fn allow_operation_header(mut self) -> Self {
        self.allow_operation_header = true;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when no operation is selected, or when
    /// [`OutputShape::Stream`] is combined with an operation that cannot
    /// stream (only `findAll` and `aggregate` can).
    pub fn build(self) -> Result<ProducerConfig, ConfigError> {
        let operation = self.operation.ok_or(ConfigError::Missing("operation"))?;

        if self.output_shape == OutputShape::Stream && !operation.supports_streaming() {
            return Err(ConfigError::Invalid(format!(
                "output shape 'stream' is not supported by operation '{operation}'"
            )));
        }

        Ok(ProducerConfig {
            operation,
            write_result_as_header: self.write_result_as_header,
            output_shape: self.output_shape,
            allow_operation_header: self.allow_operation_header,
        })
    }
}

/// Complete endpoint configuration: static target plus exactly one role.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointConfig {
    /// Statically configured database.
    pub database: String,

    /// Statically configured collection.
    pub collection: String,

    /// Allow per-request database/collection overrides via headers.
    pub dynamicity: bool,

    /// Consumer half. Mutually exclusive with `producer`.
    pub consumer: Option<TailConfig>,

    /// Producer half. Mutually exclusive with `consumer`.
    pub producer: Option<ProducerConfig>,
}

impl EndpointConfig {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> EndpointConfigBuilder {
        EndpointConfigBuilder::default()
    }

    /// Returns the database holding the tracking collection for this
    /// endpoint's consumer, defaulting to the tailed database.
    #[must_use]
    pub fn track_db(&self) -> &str {
        self.consumer
            .as_ref()
            .and_then(|c| c.track_db.as_deref())
            .unwrap_or(&self.database)
    }
}

/// Builder for [`EndpointConfig`].
#[derive(Debug, Default)]
pub struct EndpointConfigBuilder {
    database: Option<String>,
    collection: Option<String>,
    dynamicity: bool,
    consumer: Option<TailConfig>,
    producer: Option<ProducerConfig>,
}

impl EndpointConfigBuilder {
    /// Sets the statically configured database. Required.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Sets the statically configured collection. Required.
    #[must_use]
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Enables per-request target overrides.
    #[must_use]
    pub fn dynamicity(mut self, enabled: bool) -> Self {
        self.dynamicity = enabled;
        self
    }

    /// Configures the endpoint as a consumer.
    #[must_use]
    pub fn consumer(mut self, config: TailConfig) -> Self {
        self.consumer = Some(config);
        self
    }

    /// Configures the endpoint as a producer.
    #[must_use]
    pub fn producer(mut self, config: ProducerConfig) -> Self {
        self.producer = Some(config);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Missing`] when database or collection is unset
    /// - [`ConfigError::MutuallyExclusive`] when both roles are configured
    /// - [`ConfigError::NoRole`] when neither role is configured
    pub fn build(self) -> Result<EndpointConfig, ConfigError> {
        let database = self.database.ok_or(ConfigError::Missing("database"))?;
        let collection = self.collection.ok_or(ConfigError::Missing("collection"))?;

        match (&self.consumer, &self.producer) {
            (Some(_), Some(_)) => return Err(ConfigError::MutuallyExclusive),
            (None, None) => return Err(ConfigError::NoRole),
            _ => {}
        }

        Ok(EndpointConfig {
            database,
            collection,
            dynamicity: self.dynamicity,
            consumer: self.consumer,
            producer: self.producer,
        })
    }
}
