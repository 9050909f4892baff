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

//! Producer-side operation dispatch.
//!
//! A [`Producer`] executes one request at a time against the store: the
//! operation comes from the endpoint configuration (optionally overridden per
//! request via the [`headers::OPERATION`] header), the target
//! database/collection from static configuration (optionally overridden via
//! headers when dynamicity is enabled). Dispatch is a static match over
//! [`Operation`]; an unsupported tag is a hard error, never a fallback.
//!
//! Every inbound header is copied onto the outbound message. Read results
//! land in the body; write results land in the body or in the
//! [`headers::WRITE_RESULT`] header per the endpoint's
//! `write_result_as_header` switch, with the per-operation result headers
//! (oid, matched/modified/deleted counts) set either way.
//!
//! # Example
//!
//! ```rust,no_run
//! use capstream_core::config::{EndpointConfig, ProducerConfig};
//! use capstream_core::message::Message;
//! use capstream_core::operation::Operation;
//! use capstream_core::producer::Producer;
//! use bson::doc;
//! use mongodb::Client;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::with_uri_str("mongodb://localhost:27017").await?;
//! let config = EndpointConfig::builder()
//!     .database("flights")
//!     .collection("tickets")
//!     .producer(ProducerConfig::builder().operation(Operation::Insert).build()?)
//!     .build()?;
//!
//! let producer = Producer::new(client, config)?;
//! let response = producer
//!     .execute(Message::with_body(doc! { "passenger": "Alice" }))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{ConfigError, EndpointConfig, OutputShape, ProducerConfig};
use crate::message::{headers, Body, Message};
use crate::metrics;
use crate::operation::{Operation, UnsupportedOperation};
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::error::Error as MongoError;
use mongodb::{Client, Collection};
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Errors raised during producer dispatch.
#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    /// The endpoint is not configured as a producer.
    #[error("Endpoint configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// A per-request operation override named an unknown tag.
    #[error(transparent)]
    UnsupportedOperation(#[from] UnsupportedOperation),

    /// The request is missing a required payload or header, or its shape
    /// does not fit the operation.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Driver failure while executing the operation.
    #[error("MongoDB error: {0}")]
    Mongo(#[from] MongoError),
}

impl ProducerError {
    /// Returns whether retrying the same request can succeed.
    ///
    /// Configuration and request-shape errors fail the same way every time;
    /// only driver faults are worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Mongo(_) => true,
            Self::Configuration(_) | Self::UnsupportedOperation(_) | Self::InvalidRequest(_) => {
                false
            }
        }
    }

    /// Returns the error category for metrics/logging.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::UnsupportedOperation(_) => "unsupported_operation",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Mongo(_) => "mongodb",
        }
    }
}

/// The database/collection pair a request resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Target database.
    pub database: String,

    /// Target collection.
    pub collection: String,
}

/// Executes producer operations against the store.
pub struct Producer {
    client: Client,
    config: EndpointConfig,
    producer: ProducerConfig,
}

impl Producer {
    /// Creates a producer from a producer endpoint configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the endpoint has no producer half.
    pub fn new(client: Client, config: EndpointConfig) -> Result<Self, ProducerError> {
        let Some(producer) = config.producer.clone() else {
            return Err(ConfigError::Invalid(
                "producer requires a producer endpoint configuration".to_string(),
            )
            .into());
        };

        Ok(Self {
            client,
            config,
            producer,
        })
    }

    /// Executes one request and returns the response message.
    ///
    /// # Errors
    ///
    /// - [`ProducerError::UnsupportedOperation`] for an unknown operation
    ///   header value (the request fails; the endpoint operation is never
    ///   silently substituted)
    /// - [`ProducerError::InvalidRequest`] when the payload or headers do not
    ///   fit the operation
    /// - [`ProducerError::Mongo`] for driver failures
    #[instrument(skip(self, request), fields(operation, database, collection))]
    pub async fn execute(&self, request: Message) -> Result<Message, ProducerError> {
        let operation = self.resolve_operation(&request)?;
        let target = self.resolve_target(&request);

        tracing::Span::current()
            .record("operation", operation.tag())
            .record("database", target.database.as_str())
            .record("collection", target.collection.as_str());

        let started = Instant::now();
        let result = self.dispatch(operation, &target, &request).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => err.category(),
        };
        metrics::record_operation(operation.tag(), outcome, started.elapsed().as_secs_f64());

        if let Err(err) = &result {
            warn!(
                operation = operation.tag(),
                error = %err,
                retryable = err.is_retryable(),
                "Operation failed"
            );
        }
        result
    }

    /// Resolves the effective operation: the endpoint's configured operation,
    /// or the per-request header override when the endpoint allows it.
    fn resolve_operation(&self, request: &Message) -> Result<Operation, ProducerError> {
        let Some(tag) = request.header_str(headers::OPERATION) else {
            return Ok(self.producer.operation);
        };

        if !self.producer.allow_operation_header {
            debug!(tag, "Operation header present but overrides are disabled; ignoring");
            return Ok(self.producer.operation);
        }

        Ok(Operation::parse(tag)?)
    }

    /// Resolves the target: static configuration, with per-request header
    /// overrides when dynamicity is enabled. With dynamicity disabled the
    /// override headers are ignored, so the per-request cost is zero.
    fn resolve_target(&self, request: &Message) -> ResolvedTarget {
        if !self.config.dynamicity {
            return ResolvedTarget {
                database: self.config.database.clone(),
                collection: self.config.collection.clone(),
            };
        }

        ResolvedTarget {
            database: request
                .header_str(headers::DATABASE)
                .unwrap_or(&self.config.database)
                .to_string(),
            collection: request
                .header_str(headers::COLLECTION)
                .unwrap_or(&self.config.collection)
                .to_string(),
        }
    }

    async fn dispatch(
        &self,
        operation: Operation,
        target: &ResolvedTarget,
        request: &Message,
    ) -> Result<Message, ProducerError> {
        let collection = self
            .client
            .database(&target.database)
            .collection::<Document>(&target.collection);

        match operation {
            Operation::Aggregate => self.aggregate(&collection, request).await,
            Operation::Command => self.command(target, request).await,
            Operation::Count => self.count(&collection, request).await,
            Operation::FindDistinct => self.find_distinct(&collection, request).await,
            Operation::FindAll => self.find_all(&collection, request).await,
            Operation::FindById => self.find_by_id(&collection, request).await,
            Operation::FindOneByQuery => self.find_one_by_query(&collection, request).await,
            Operation::GetColStats => self.get_col_stats(target, request).await,
            Operation::GetDbStats => self.get_db_stats(target, request).await,
            Operation::Insert => self.insert(&collection, request).await,
            Operation::Remove => self.remove(&collection, request).await,
            Operation::Save => self.save(&collection, request).await,
            Operation::Update => self.update(&collection, request).await,
        }
    }

    async fn find_by_id(
        &self,
        collection: &Collection<Document>,
        request: &Message,
    ) -> Result<Message, ProducerError> {
        let Some(id) = request.body.as_value() else {
            return Err(ProducerError::InvalidRequest(
                "findById requires the document id as the message body".to_string(),
            ));
        };

        let mut find = collection.find_one(doc! { "_id": id.clone() });
        if let Some(projection) = request.header_document(headers::PROJECTION) {
            find = find.projection(projection.clone());
        }

        let mut response = respond_to(request);
        if let Some(document) = find.await? {
            response.body = document.into();
        }
        Ok(response)
    }

    async fn find_one_by_query(
        &self,
        collection: &Collection<Document>,
        request: &Message,
    ) -> Result<Message, ProducerError> {
        let mut find = collection.find_one(filter_from(request));
        if let Some(sort) = request.header_document(headers::SORT) {
            find = find.sort(sort.clone());
        }
        if let Some(projection) = request.header_document(headers::PROJECTION) {
            find = find.projection(projection.clone());
        }

        let mut response = respond_to(request);
        if let Some(document) = find.await? {
            response.body = document.into();
        }
        Ok(response)
    }

    async fn find_all(
        &self,
        collection: &Collection<Document>,
        request: &Message,
    ) -> Result<Message, ProducerError> {
        let filter = filter_from(request);
        let mut find = collection.find(filter.clone());
        if let Some(sort) = request.header_document(headers::SORT) {
            find = find.sort(sort.clone());
        }
        if let Some(projection) = request.header_document(headers::PROJECTION) {
            find = find.projection(projection.clone());
        }
        if let Some(skip) = request.header_i64(headers::SKIP) {
            find = find.skip(skip.max(0) as u64);
        }
        if let Some(limit) = request.header_i64(headers::LIMIT) {
            find = find.limit(limit);
        }
        if let Some(batch_size) = request.header_i64(headers::BATCH_SIZE) {
            find = find.batch_size(batch_size.clamp(0, i64::from(u32::MAX)) as u32);
        }

        let cursor = find.await?;
        let mut response = respond_to(request);

        match self.producer.output_shape {
            OutputShape::Stream => {
                // The caller drives the cursor; size headers are unknowable
                // up front and deliberately absent in this shape.
                response.body = Body::Stream(Box::pin(cursor));
            }
            OutputShape::List => {
                let documents: Vec<Document> = cursor.try_collect().await?;
                let total = collection.count_documents(filter).await?;
                response.set_header(headers::RESULT_PAGE_SIZE, int64(documents.len() as u64));
                response.set_header(headers::RESULT_TOTAL_SIZE, int64(total));
                response.body = Body::Value(Bson::Array(
                    documents.into_iter().map(Bson::Document).collect(),
                ));
            }
        }
        Ok(response)
    }

    async fn count(
        &self,
        collection: &Collection<Document>,
        request: &Message,
    ) -> Result<Message, ProducerError> {
        let total = collection.count_documents(filter_from(request)).await?;
        let mut response = respond_to(request);
        response.body = Body::Value(int64(total));
        Ok(response)
    }

    async fn find_distinct(
        &self,
        collection: &Collection<Document>,
        request: &Message,
    ) -> Result<Message, ProducerError> {
        let Some(field) = request.header_str(headers::DISTINCT_FIELD) else {
            return Err(ProducerError::InvalidRequest(format!(
                "findDistinct requires the '{}' header",
                headers::DISTINCT_FIELD
            )));
        };

        let values = collection.distinct(field, filter_from(request)).await?;
        let mut response = respond_to(request);
        response.body = Body::Value(Bson::Array(values));
        Ok(response)
    }

    async fn aggregate(
        &self,
        collection: &Collection<Document>,
        request: &Message,
    ) -> Result<Message, ProducerError> {
        let pipeline = pipeline_from(request)?;
        let mut aggregate = collection.aggregate(pipeline);
        if let Some(batch_size) = request.header_i64(headers::BATCH_SIZE) {
            aggregate = aggregate.batch_size(batch_size.clamp(0, i64::from(u32::MAX)) as u32);
        }

        let cursor = aggregate.await?;
        let mut response = respond_to(request);

        match self.producer.output_shape {
            OutputShape::Stream => {
                response.body = Body::Stream(Box::pin(cursor));
            }
            OutputShape::List => {
                let documents: Vec<Document> = cursor.try_collect().await?;
                response.set_header(headers::RESULT_PAGE_SIZE, int64(documents.len() as u64));
                response.body = Body::Value(Bson::Array(
                    documents.into_iter().map(Bson::Document).collect(),
                ));
            }
        }
        Ok(response)
    }

    async fn insert(
        &self,
        collection: &Collection<Document>,
        request: &Message,
    ) -> Result<Message, ProducerError> {
        let mut response = respond_to(request);

        match request.body.as_value() {
            Some(Bson::Document(document)) => {
                let result = collection.insert_one(document.clone()).await?;
                response.set_header(headers::OID, result.inserted_id.clone());
                self.attach_write_result(
                    &mut response,
                    doc! { "insertedId": result.inserted_id },
                );
            }
            Some(Bson::Array(values)) => {
                let documents = documents_from_array(values, "insert")?;
                let result = collection.insert_many(documents).await?;
                let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
                ids.sort_by_key(|(index, _)| *index);
                let ids: Vec<Bson> = ids.into_iter().map(|(_, id)| id).collect();
                response.set_header(headers::OID, Bson::Array(ids.clone()));
                self.attach_write_result(
                    &mut response,
                    doc! { "insertedIds": Bson::Array(ids) },
                );
            }
            _ => {
                return Err(ProducerError::InvalidRequest(
                    "insert requires a document or a list of documents as the message body"
                        .to_string(),
                ))
            }
        }
        Ok(response)
    }

    async fn save(
        &self,
        collection: &Collection<Document>,
        request: &Message,
    ) -> Result<Message, ProducerError> {
        let Some(document) = request.body.as_document() else {
            return Err(ProducerError::InvalidRequest(
                "save requires a document as the message body".to_string(),
            ));
        };

        let mut response = respond_to(request);

        if let Some(id) = document.get("_id") {
            // Insert-or-replace keyed by _id.
            let result = collection
                .replace_one(doc! { "_id": id.clone() }, document.clone())
                .upsert(true)
                .await?;
            let oid = result.upserted_id.clone().unwrap_or_else(|| id.clone());
            response.set_header(headers::OID, oid);
            self.attach_write_result(&mut response, update_result_doc(&result));
        } else {
            // No _id: a plain insert, letting the store mint the id.
            let result = collection.insert_one(document.clone()).await?;
            response.set_header(headers::OID, result.inserted_id.clone());
            self.attach_write_result(&mut response, doc! { "insertedId": result.inserted_id });
        }
        Ok(response)
    }

    async fn update(
        &self,
        collection: &Collection<Document>,
        request: &Message,
    ) -> Result<Message, ProducerError> {
        // Filter from the criteria header plus an update-spec body, or a
        // two-element [filter, update-spec] body.
        let (filter, update) = match request.header_document(headers::CRITERIA) {
            Some(criteria) => match request.body.as_document() {
                Some(update) => (criteria.clone(), update.clone()),
                None => {
                    return Err(ProducerError::InvalidRequest(
                        "update requires an update specification as the message body".to_string(),
                    ))
                }
            },
            None => match request.body.as_value() {
                Some(Bson::Array(pair)) => match pair.as_slice() {
                    [Bson::Document(filter), Bson::Document(update)] => {
                        (filter.clone(), update.clone())
                    }
                    _ => {
                        return Err(ProducerError::InvalidRequest(
                            "update body must be a two-element [filter, update-spec] list"
                                .to_string(),
                        ))
                    }
                },
                _ => {
                    return Err(ProducerError::InvalidRequest(format!(
                        "update requires the '{}' header or a [filter, update-spec] body",
                        headers::CRITERIA
                    )))
                }
            },
        };

        let upsert = request.header_bool(headers::UPSERT).unwrap_or(false);
        let multi = request.header_bool(headers::MULTI_UPDATE).unwrap_or(false);

        let result = if multi {
            collection
                .update_many(filter.clone(), update.clone())
                .upsert(upsert)
                .await?
        } else {
            collection
                .update_one(filter.clone(), update.clone())
                .upsert(upsert)
                .await?
        };

        let mut response = respond_to(request);
        response.set_header(headers::RECORDS_MATCHED, int64(result.matched_count));
        response.set_header(headers::RECORDS_MODIFIED, int64(result.modified_count));
        if let Some(id) = &result.upserted_id {
            response.set_header(headers::OID, id.clone());
        }
        self.attach_write_result(&mut response, update_result_doc(&result));
        Ok(response)
    }

    async fn remove(
        &self,
        collection: &Collection<Document>,
        request: &Message,
    ) -> Result<Message, ProducerError> {
        // An absent filter would silently empty the collection; require one.
        let filter = match request.header_document(headers::CRITERIA) {
            Some(criteria) => criteria.clone(),
            None => match request.body.as_document() {
                Some(document) => document.clone(),
                None => {
                    return Err(ProducerError::InvalidRequest(
                        "remove requires a filter in the criteria header or the message body"
                            .to_string(),
                    ))
                }
            },
        };

        let result = collection.delete_many(filter).await?;
        let mut response = respond_to(request);
        response.set_header(headers::RECORDS_DELETED, int64(result.deleted_count));
        self.attach_write_result(
            &mut response,
            doc! { "deletedCount": int64(result.deleted_count) },
        );
        Ok(response)
    }

    async fn run_database_command(
        &self,
        target: &ResolvedTarget,
        command: Document,
        request: &Message,
    ) -> Result<Message, ProducerError> {
        let stats = self
            .client
            .database(&target.database)
            .run_command(command)
            .await?;
        let mut response = respond_to(request);
        response.body = stats.into();
        Ok(response)
    }

    async fn get_col_stats(
        &self,
        target: &ResolvedTarget,
        request: &Message,
    ) -> Result<Message, ProducerError> {
        self.run_database_command(target, doc! { "collStats": &target.collection }, request)
            .await
    }

    async fn get_db_stats(
        &self,
        target: &ResolvedTarget,
        request: &Message,
    ) -> Result<Message, ProducerError> {
        self.run_database_command(target, doc! { "dbStats": 1 }, request)
            .await
    }

    async fn command(
        &self,
        target: &ResolvedTarget,
        request: &Message,
    ) -> Result<Message, ProducerError> {
        let Some(command) = request.body.as_document() else {
            return Err(ProducerError::InvalidRequest(
                "command requires a command document as the message body".to_string(),
            ));
        };

        self.run_database_command(target, command.clone(), request)
            .await
    }

    /// Places a raw write result on the response per the endpoint's
    /// `write_result_as_header` switch.
    fn attach_write_result(&self, response: &mut Message, write_result: Document) {
        if self.producer.write_result_as_header {
            response.set_header(headers::WRITE_RESULT, write_result);
        } else {
            response.body = write_result.into();
        }
    }
}

/// Starts a response: every inbound header is propagated.
fn respond_to(request: &Message) -> Message {
    Message {
        headers: request.headers.clone(),
        body: Body::Empty,
    }
}

/// The query filter for read/count/distinct operations: the criteria header
/// when present, else a document body, else match-all.
fn filter_from(request: &Message) -> Document {
    if let Some(criteria) = request.header_document(headers::CRITERIA) {
        return criteria.clone();
    }
    request.body.as_document().cloned().unwrap_or_default()
}

/// The aggregation pipeline from the message body: an array of stage
/// documents, or a single stage document.
fn pipeline_from(request: &Message) -> Result<Vec<Document>, ProducerError> {
    match request.body.as_value() {
        Some(Bson::Array(stages)) => documents_from_array(stages, "aggregate"),
        Some(Bson::Document(stage)) => Ok(vec![stage.clone()]),
        _ => Err(ProducerError::InvalidRequest(
            "aggregate requires a pipeline (array of stage documents) as the message body"
                .to_string(),
        )),
    }
}

fn documents_from_array(values: &[Bson], operation: &str) -> Result<Vec<Document>, ProducerError> {
    values
        .iter()
        .map(|value| match value {
            Bson::Document(document) => Ok(document.clone()),
            other => Err(ProducerError::InvalidRequest(format!(
                "{operation} requires documents; found {}",
                other.element_type() as u8
            ))),
        })
        .collect()
}

fn update_result_doc(result: &mongodb::results::UpdateResult) -> Document {
    let mut document = doc! {
        "matchedCount": int64(result.matched_count),
        "modifiedCount": int64(result.modified_count),
    };
    if let Some(id) = &result.upserted_id {
        document.insert("upsertedId", id.clone());
    }
    document
}

fn int64(value: u64) -> Bson {
    Bson::Int64(i64::try_from(value).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EndpointConfigBuilder, ProducerConfigBuilder, TailConfig};
    use crate::operation::ALL_OPERATIONS;

    async fn producer(configure: impl FnOnce(ProducerConfigBuilder) -> ProducerConfigBuilder) -> Producer {
        producer_with(|endpoint| endpoint, configure).await
    }

    async fn producer_with(
        endpoint_cfg: impl FnOnce(EndpointConfigBuilder) -> EndpointConfigBuilder,
        producer_cfg: impl FnOnce(ProducerConfigBuilder) -> ProducerConfigBuilder,
    ) -> Producer {
        let client = Client::with_uri_str("mongodb://localhost:27017")
            .await
            .unwrap();
        let config = endpoint_cfg(
            EndpointConfig::builder()
                .database("flights")
                .collection("tickets"),
        )
        .producer(
            producer_cfg(ProducerConfig::builder().operation(Operation::Count))
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();
        Producer::new(client, config).unwrap()
    }

    #[tokio::test]
    async fn new_rejects_consumer_endpoint() {
        let client = Client::with_uri_str("mongodb://localhost:27017")
            .await
            .unwrap();
        let config = EndpointConfig::builder()
            .database("flights")
            .collection("cancellations")
            .consumer(
                TailConfig::builder()
                    .increasing_field("seq")
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();

        assert!(matches!(
            Producer::new(client, config),
            Err(ProducerError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn static_target_ignores_headers_without_dynamicity() {
        let producer = producer(|p| p).await;
        let request = Message::new()
            .header(headers::DATABASE, "other-db")
            .header(headers::COLLECTION, "other-coll");

        let target = producer.resolve_target(&request);
        assert_eq!(target.database, "flights");
        assert_eq!(target.collection, "tickets");
    }

    #[tokio::test]
    async fn dynamic_target_honors_override_headers() {
        let producer = producer_with(|e| e.dynamicity(true), |p| p).await;
        let request = Message::new().header(headers::COLLECTION, "refunds");

        let target = producer.resolve_target(&request);
        // Only the collection was overridden; the database stays static.
        assert_eq!(target.database, "flights");
        assert_eq!(target.collection, "refunds");
    }

    #[tokio::test]
    async fn operation_header_ignored_unless_allowed() {
        let producer = producer(|p| p).await;
        let request = Message::new().header(headers::OPERATION, "findAll");
        assert_eq!(
            producer.resolve_operation(&request).unwrap(),
            Operation::Count
        );
    }

    #[tokio::test]
    async fn operation_header_override() {
        let producer = producer(|p| p.allow_operation_header()).await;
        let request = Message::new().header(headers::OPERATION, "findAll");
        assert_eq!(
            producer.resolve_operation(&request).unwrap(),
            Operation::FindAll
        );
    }

    #[tokio::test]
    async fn unknown_operation_header_is_a_hard_error() {
        let producer = producer(|p| p.allow_operation_header()).await;
        let request = Message::new().header(headers::OPERATION, "dropEverything");
        assert!(matches!(
            producer.resolve_operation(&request),
            Err(ProducerError::UnsupportedOperation(_))
        ));
    }

    #[tokio::test]
    async fn every_operation_tag_resolves() {
        let producer = producer(|p| p.allow_operation_header()).await;
        for op in ALL_OPERATIONS {
            let request = Message::new().header(headers::OPERATION, op.tag());
            assert_eq!(producer.resolve_operation(&request).unwrap(), op);
        }
    }

    #[test]
    fn filter_prefers_criteria_header_over_body() {
        let request = Message::with_body(doc! { "body": 1 })
            .header(headers::CRITERIA, doc! { "header": 1 });
        assert_eq!(filter_from(&request), doc! { "header": 1 });

        let request = Message::with_body(doc! { "body": 1 });
        assert_eq!(filter_from(&request), doc! { "body": 1 });

        let request = Message::new();
        assert_eq!(filter_from(&request), doc! {});
    }

    #[test]
    fn pipeline_accepts_array_and_single_stage() {
        let request = Message::with_body(Bson::Array(vec![
            Bson::Document(doc! { "$match": { "a": 1 } }),
            Bson::Document(doc! { "$limit": 5 }),
        ]));
        assert_eq!(pipeline_from(&request).unwrap().len(), 2);

        let request = Message::with_body(doc! { "$match": { "a": 1 } });
        assert_eq!(pipeline_from(&request).unwrap().len(), 1);

        let request = Message::new();
        assert!(pipeline_from(&request).is_err());

        let request = Message::with_body(Bson::Array(vec![Bson::Int32(1)]));
        assert!(pipeline_from(&request).is_err());
    }

    #[test]
    fn error_retryability() {
        assert!(ProducerError::Mongo(MongoError::custom("boom")).is_retryable());
        assert!(!ProducerError::InvalidRequest("bad".to_string()).is_retryable());
        assert!(!ProducerError::UnsupportedOperation(UnsupportedOperation(
            "dropEverything".to_string()
        ))
        .is_retryable());
    }

    #[test]
    fn error_categories() {
        assert_eq!(
            ProducerError::Mongo(MongoError::custom("boom")).category(),
            "mongodb"
        );
        assert_eq!(
            ProducerError::InvalidRequest("bad".to_string()).category(),
            "invalid_request"
        );
    }

    #[test]
    fn int64_saturates() {
        assert_eq!(int64(5), Bson::Int64(5));
        assert_eq!(int64(u64::MAX), Bson::Int64(i64::MAX));
    }
}
