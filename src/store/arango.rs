//! # ArangoDB backend for the persistence facade.
//!
//! Drives the ArangoDB HTTP API directly with the shared [`reqwest`] client:
//!
//! - `POST /_api/database` — ensure the database (duplicate is success)
//! - `POST /_api/collection` — ensure a collection (duplicate is success)
//! - `POST /_api/index` — persistent indexes declared by [`Document`]
//! - `POST /_api/document/<col>` — insert; key conflict falls back to a
//!   status-only `PATCH`
//! - `POST /_api/cursor` (+ `PUT /_api/cursor/<id>`) — AQL queries rendered
//!   from [`QuerySpec`]
//!
//! [`ArangoClient::connect`] retries the database bootstrap every second
//! until the endpoint answers, so the controller can start before the
//! database container does.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::DatabaseConfig;
use crate::error::StoreError;

use super::{Collection, Document, DocumentMeta, QuerySpec};

/// Connection handle to one ArangoDB database.
#[derive(Clone)]
pub struct ArangoClient {
    http: reqwest::Client,
    endpoint: String,
    database: String,
    user: String,
    pass: String,
}

#[derive(Deserialize)]
struct ArangoErrorBody {
    #[serde(rename = "errorMessage", default)]
    error_message: String,
}

#[derive(Deserialize)]
struct SavedMeta {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Deserialize)]
struct CursorBatch {
    #[serde(default)]
    result: Vec<Value>,
    #[serde(rename = "hasMore", default)]
    has_more: bool,
    #[serde(default)]
    id: Option<String>,
}

impl ArangoClient {
    /// Creates a client for the configured database.
    pub fn new(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            endpoint: config.host.trim_end_matches('/').to_string(),
            database: config.name.clone(),
            user: config.user.clone(),
            pass: config.pass.clone(),
        })
    }

    /// Creates a client and retries the database bootstrap every second
    /// until the endpoint accepts it.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let client = Self::new(config)?;
        loop {
            match client.ensure_database().await {
                Ok(()) => return Ok(client),
                Err(err) => {
                    warn!(error = %err, "database not ready, retrying");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Returns the typed facade for `T`'s collection.
    pub fn collection<T: Document>(&self) -> ArangoCollection<T> {
        ArangoCollection {
            client: self.clone(),
            _marker: PhantomData,
        }
    }

    /// Creates the database if it does not exist yet.
    pub async fn ensure_database(&self) -> Result<(), StoreError> {
        let url = format!("{}/_db/_system/_api/database", self.endpoint);
        let response = self
            .authed(self.http.post(url))
            .json(&json!({ "name": self.database }))
            .send()
            .await?;
        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => Ok(()),
            _ => Err(Self::database_error(response).await),
        }
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.user, Some(&self.pass))
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/_db/{}/_api/{}", self.endpoint, self.database, path)
    }

    async fn database_error(response: Response) -> StoreError {
        let status = response.status().as_u16();
        let message = response
            .json::<ArangoErrorBody>()
            .await
            .map(|body| body.error_message)
            .unwrap_or_default();
        StoreError::Database { status, message }
    }
}

/// Facade over one ArangoDB collection.
pub struct ArangoCollection<T> {
    client: ArangoClient,
    _marker: PhantomData<T>,
}

#[async_trait]
impl<T: Document> Collection<T> for ArangoCollection<T> {
    async fn create(&self) -> Result<(), StoreError> {
        let url = self.client.api_url("collection");
        let response = self
            .client
            .authed(self.client.http.post(url))
            .json(&json!({ "name": T::COLLECTION }))
            .send()
            .await?;
        match response.status() {
            s if s.is_success() => {}
            StatusCode::CONFLICT => {}
            _ => return Err(ArangoClient::database_error(response).await),
        }

        if let Some(field) = T::PERSISTENT_INDEX {
            let url = format!(
                "{}?collection={}",
                self.client.api_url("index"),
                T::COLLECTION
            );
            let response = self
                .client
                .authed(self.client.http.post(url))
                .json(&json!({ "type": "persistent", "fields": [field] }))
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(ArangoClient::database_error(response).await);
            }
        }
        Ok(())
    }

    async fn fetch_all(&self) -> Result<Vec<T>, StoreError> {
        self.query(QuerySpec::new()).await
    }

    async fn query(&self, spec: QuerySpec) -> Result<Vec<T>, StoreError> {
        let (query, bind_vars) = spec.to_aql(T::COLLECTION);
        let response = self
            .client
            .authed(self.client.http.post(self.client.api_url("cursor")))
            .json(&json!({ "query": query, "bindVars": bind_vars, "batchSize": 200 }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ArangoClient::database_error(response).await);
        }

        let mut batch: CursorBatch = response.json().await?;
        let mut raw = std::mem::take(&mut batch.result);
        while batch.has_more {
            let Some(cursor_id) = batch.id.clone() else {
                break;
            };
            let url = format!("{}/{}", self.client.api_url("cursor"), cursor_id);
            let response = self.client.authed(self.client.http.put(url)).send().await?;
            if !response.status().is_success() {
                return Err(ArangoClient::database_error(response).await);
            }
            batch = response.json().await?;
            raw.append(&mut batch.result);
        }

        raw.into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
            .collect()
    }

    async fn save(&self, entity: &T) -> Result<DocumentMeta, StoreError> {
        let url = self.client.api_url(&format!("document/{}", T::COLLECTION));
        let response = self
            .client
            .authed(self.client.http.post(url))
            .json(entity)
            .send()
            .await?;
        match response.status() {
            s if s.is_success() => {
                let meta: SavedMeta = response.json().await?;
                Ok(DocumentMeta { id: meta.id })
            }
            StatusCode::CONFLICT => {
                // key exists: patch the one mutable attribute instead
                let key = entity.key().ok_or(StoreError::MissingKey)?;
                let url = self
                    .client
                    .api_url(&format!("document/{}/{}", T::COLLECTION, key));
                let response = self
                    .client
                    .authed(self.client.http.patch(url))
                    .json(&entity.conflict_patch())
                    .send()
                    .await?;
                if !response.status().is_success() {
                    return Err(ArangoClient::database_error(response).await);
                }
                let meta: SavedMeta = response.json().await?;
                Ok(DocumentMeta { id: meta.id })
            }
            _ => Err(ArangoClient::database_error(response).await),
        }
    }

    async fn remove(&self, entity: &T) -> Result<(), StoreError> {
        let key = entity.key().ok_or(StoreError::MissingKey)?;
        let url = self
            .client
            .api_url(&format!("document/{}/{}", T::COLLECTION, key));
        let response = self.client.authed(self.client.http.delete(url)).send().await?;
        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound),
            _ => Err(ArangoClient::database_error(response).await),
        }
    }
}
