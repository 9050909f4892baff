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

//! Endpoint facade: a validated configuration bound to a client.
//!
//! An [`Endpoint`] is the entry point for both roles. Construction validates
//! nothing beyond what [`EndpointConfig`] already guarantees (exactly one
//! role); the role-specific constructors hand out the matching runtime
//! object and fail fast on a role mismatch.
//!
//! # Example
//!
//! ```rust,no_run
//! use capstream_core::config::{EndpointConfig, ProducerConfig};
//! use capstream_core::endpoint::Endpoint;
//! use capstream_core::message::Message;
//! use capstream_core::operation::Operation;
//! use bson::doc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EndpointConfig::builder()
//!     .database("flights")
//!     .collection("tickets")
//!     .producer(ProducerConfig::builder().operation(Operation::Insert).build()?)
//!     .build()?;
//!
//! let endpoint = Endpoint::connect("mongodb://localhost:27017", config).await?;
//! let producer = endpoint.producer()?;
//! producer.execute(Message::with_body(doc! { "passenger": "Alice" })).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::EndpointConfig;
use crate::processor::Processor;
use crate::producer::{Producer, ProducerError};
use crate::store::TailStore;
use crate::tailing::{TailError, TailingProcess};
use mongodb::error::Error as MongoError;
use mongodb::Client;
use std::sync::Arc;

/// A validated endpoint configuration bound to a MongoDB client.
#[derive(Debug, Clone)]
pub struct Endpoint {
    client: Client,
    config: EndpointConfig,
}

impl Endpoint {
    /// Creates an endpoint over an existing client.
    #[must_use]
    pub fn new(client: Client, config: EndpointConfig) -> Self {
        Self { client, config }
    }

    /// Creates an endpoint by connecting to the given URI.
    ///
    /// Client construction is lazy; connectivity faults surface on first use.
    ///
    /// # Errors
    ///
    /// Returns a driver error when the URI cannot be parsed.
    pub async fn connect(uri: &str, config: EndpointConfig) -> Result<Self, MongoError> {
        let client = Client::with_uri_str(uri).await?;
        Ok(Self::new(client, config))
    }

    /// Returns the endpoint configuration.
    #[must_use]
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Returns the underlying client.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Returns true when this endpoint is configured as a consumer.
    #[must_use]
    pub fn is_consumer(&self) -> bool {
        self.config.consumer.is_some()
    }

    /// Returns true when this endpoint is configured as a producer.
    #[must_use]
    pub fn is_producer(&self) -> bool {
        self.config.producer.is_some()
    }

    /// Creates the producer for this endpoint.
    ///
    /// # Errors
    ///
    /// Fails when the endpoint is configured as a consumer.
    pub fn producer(&self) -> Result<Producer, ProducerError> {
        Producer::new(self.client.clone(), self.config.clone())
    }

    /// Creates the tailing process for this endpoint.
    ///
    /// `store` overrides bookmark persistence. With persistence enabled and
    /// no store given, bookmarks go to the tracking collection named by the
    /// endpoint's `track_db`/`track_collection`/`track_field` options.
    ///
    /// # Errors
    ///
    /// Fails when the endpoint is configured as a producer.
    pub fn tailing_process<P: Processor + 'static>(
        &self,
        store: Option<Arc<dyn TailStore>>,
        processor: P,
    ) -> Result<TailingProcess<P>, TailError> {
        TailingProcess::new(self.client.clone(), self.config.clone(), store, processor)
    }
}
