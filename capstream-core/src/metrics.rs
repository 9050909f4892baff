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

//! Metrics instrumentation for tailing and dispatch observability.
//!
//! Uses the `metrics` crate facade; any exporter (Prometheus, StatsD, ...)
//! installed by the embedding application picks these up. Names follow
//! Prometheus conventions: underscores, unit suffixes, counters ending in
//! `_total`, all prefixed `capstream_`.
//!
//! Labels are kept to low-cardinality values only: collection names,
//! operation tags, error categories. Never document ids or raw error strings.
//!
//! # Examples
//!
//! ```rust
//! use capstream_core::metrics;
//!
//! metrics::init_metrics();
//! metrics::increment_documents_tailed("flights", "cancellations");
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Total documents read from the tail cursor and dispatched downstream.
///
/// Type: Counter
/// Labels: database, collection
const DOCUMENTS_TAILED_TOTAL: &str = "capstream_documents_tailed_total";

/// Total downstream processor faults swallowed by the tailing loop.
///
/// Type: Counter
/// Labels: database, collection
const PROCESSOR_FAILURES_TOTAL: &str = "capstream_processor_failures_total";

/// Total documents whose increasing-field extraction failed and whose
/// position was advanced past on a best-effort basis.
///
/// Type: Counter
/// Labels: database, collection
const TRACKING_SKIPS_TOTAL: &str = "capstream_tracking_skips_total";

/// Total tailable-cursor regenerations (expected steady-state behavior).
///
/// Type: Counter
/// Labels: database, collection
const CURSOR_REGENERATIONS_TOTAL: &str = "capstream_cursor_regenerations_total";

/// Total bookmark persist calls against the tracking store.
///
/// Type: Counter
/// Labels: outcome ("ok" | "error")
const BOOKMARK_PERSISTS_TOTAL: &str = "capstream_bookmark_persists_total";

/// Total producer operations dispatched.
///
/// Type: Counter
/// Labels: operation, outcome ("ok" | error category)
const OPERATIONS_TOTAL: &str = "capstream_operations_total";

/// Time spent inside a single producer operation.
///
/// Type: Histogram
/// Labels: operation
/// Unit: seconds
const OPERATION_DURATION_SECONDS: &str = "capstream_operation_duration_seconds";

/// Tailing process state (0=stopped, 1=initializing, 2=running, 3=regenerating).
///
/// Type: Gauge
/// Labels: collection
const TAIL_STATE: &str = "capstream_tail_state";

/// Initializes metric descriptions for exporters.
///
/// Call once at application startup, before recording any metrics.
pub fn init_metrics() {
    describe_counter!(
        DOCUMENTS_TAILED_TOTAL,
        "Total documents read from the tail cursor and dispatched downstream"
    );

    describe_counter!(
        PROCESSOR_FAILURES_TOTAL,
        "Total downstream processor faults swallowed by the tailing loop"
    );

    describe_counter!(
        TRACKING_SKIPS_TOTAL,
        "Total documents advanced past after an increasing-field extraction failure"
    );

    describe_counter!(
        CURSOR_REGENERATIONS_TOTAL,
        "Total tailable cursor regenerations"
    );

    describe_counter!(
        BOOKMARK_PERSISTS_TOTAL,
        "Total bookmark persist attempts against the tracking store"
    );

    describe_counter!(OPERATIONS_TOTAL, "Total producer operations dispatched");

    describe_histogram!(
        OPERATION_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Time spent inside a single producer operation"
    );

    describe_gauge!(
        TAIL_STATE,
        "Tailing process state: 0=stopped, 1=initializing, 2=running, 3=regenerating"
    );
}

/// Increments the tailed-document counter.
pub fn increment_documents_tailed(database: &str, collection: &str) {
    counter!(DOCUMENTS_TAILED_TOTAL, "database" => database.to_string(), "collection" => collection.to_string())
        .increment(1);
}

/// Increments the swallowed processor-fault counter.
pub fn increment_processor_failures(database: &str, collection: &str) {
    counter!(PROCESSOR_FAILURES_TOTAL, "database" => database.to_string(), "collection" => collection.to_string())
        .increment(1);
}

/// Increments the best-effort tracking-skip counter.
///
/// A non-zero rate here means documents are flowing whose increasing field
/// is missing or unreadable; the operator should fix the data shape.
pub fn increment_tracking_skips(database: &str, collection: &str) {
    counter!(TRACKING_SKIPS_TOTAL, "database" => database.to_string(), "collection" => collection.to_string())
        .increment(1);
}

/// Increments the cursor-regeneration counter.
pub fn increment_cursor_regenerations(database: &str, collection: &str) {
    counter!(CURSOR_REGENERATIONS_TOTAL, "database" => database.to_string(), "collection" => collection.to_string())
        .increment(1);
}

/// Records a bookmark persist attempt.
pub fn increment_bookmark_persists(ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!(BOOKMARK_PERSISTS_TOTAL, "outcome" => outcome).increment(1);
}

/// Records a dispatched producer operation and its duration.
///
/// `outcome` is `"ok"` or an error category (see `ProducerError::category`).
pub fn record_operation(operation: &str, outcome: &'static str, duration_secs: f64) {
    counter!(OPERATIONS_TOTAL, "operation" => operation.to_string(), "outcome" => outcome)
        .increment(1);
    histogram!(OPERATION_DURATION_SECONDS, "operation" => operation.to_string())
        .record(duration_secs);
}

/// Sets the tailing state gauge.
pub fn set_tail_state(collection: &str, state: u8) {
    gauge!(TAIL_STATE, "collection" => collection.to_string()).set(f64::from(state));
}

#[cfg(test)]
mod tests {
    use super::*;

    // With no recorder installed the macros are no-ops; these tests just
    // exercise the helpers for panics and label formatting.

    #[test]
    fn helpers_do_not_panic_without_recorder() {
        init_metrics();
        increment_documents_tailed("db", "coll");
        increment_processor_failures("db", "coll");
        increment_tracking_skips("db", "coll");
        increment_cursor_regenerations("db", "coll");
        increment_bookmark_persists(true);
        increment_bookmark_persists(false);
        record_operation("insert", "ok", 0.01);
        record_operation("insert", "mongodb", 0.01);
        set_tail_state("coll", 2);
    }
}
