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

//! Capstream Core - Capped-Collection Tailing and Operation Dispatch
//!
//! This crate provides the core types for Capstream: continuous consumption
//! of MongoDB capped collections through tailable/await cursors, with durable
//! resume bookmarks, plus a request/response producer over a fixed set of
//! collection operations.
//!
//! # Key Components
//!
//! - **Endpoint**: [`endpoint`] binds a validated configuration to a client
//! - **Tailing**: [`tailing`] runs the consumer worker and its cursor
//!   regeneration loop; [`tracking`] owns the resume bookmark
//! - **Dispatch**: [`producer`] executes [`operation`]s and shapes results
//!   onto [`message`]s
//! - **Persistence**: [`store`] abstracts bookmark storage and ships the
//!   MongoDB-backed default; alternative backends live in the
//!   `capstream-stores` crate
//!
//! # Example
//!
//! ```rust,no_run
//! use capstream_core::config::{EndpointConfig, TailConfig};
//! use capstream_core::endpoint::Endpoint;
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
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EndpointConfig::builder()
//!     .database("flights")
//!     .collection("cancellations")
//!     .consumer(TailConfig::builder().increasing_field("departure").build()?)
//!     .build()?;
//!
//! let endpoint = Endpoint::connect("mongodb://localhost:27017", config).await?;
//! let mut process = endpoint.tailing_process(None, PrintProcessor)?;
//! process.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod endpoint;
pub mod message;
pub mod metrics;
pub mod operation;
pub mod processor;
pub mod producer;
pub mod store;
pub mod tailing;
pub mod tracking;
