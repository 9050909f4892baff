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

//! Tail store implementations for Capstream.
//!
//! This crate provides backend implementations of the
//! [`TailStore`](capstream_core::store::TailStore) trait for persisting
//! tail-tracking bookmarks, beyond the MongoDB-backed default
//! ([`MongoStore`](capstream_core::store::MongoStore)) that ships with the
//! core crate.
//!
//! # Available Stores
//!
//! - **Memory**: [`memory::MemoryStore`], process-local, for tests and
//!   single-instance setups where losing the bookmark on restart is fine
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
//! store.save_bookmark("cancellations-tracker", &Bson::Int64(42)).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod memory;
