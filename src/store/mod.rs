//! # Persistence facade over typed document collections.
//!
//! Controller state survives restarts through three keyed collections
//! (`tasks`, `resources`, `task_stats`). The [`Collection`] trait is the
//! whole surface the rest of the crate sees:
//!
//! - [`Collection::create`] — ensure the collection exists (conflict is success)
//! - [`Collection::fetch_all`] — load every document
//! - [`Collection::query`] — filter with a [`QuerySpec`]
//! - [`Collection::save`] — insert-or-update by primary key
//! - [`Collection::remove`] — delete by primary key
//!
//! Two backends implement it: [`ArangoCollection`] drives the ArangoDB HTTP
//! API; [`MemoryCollection`] keeps documents in process memory and backs the
//! test suite.
//!
//! ## Save semantics
//! `save` inserts the full document; when the primary key already exists it
//! patches only the entity's `status` field (the single mutable attribute of
//! tasks and resources).

pub mod arango;
pub mod memory;

pub use arango::{ArangoClient, ArangoCollection};
pub use memory::MemoryCollection;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::StoreError;

/// A persistable entity tied to a named collection.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    /// Collection the entity lives in.
    const COLLECTION: &'static str;

    /// Field to keep a persistent index on, if any.
    const PERSISTENT_INDEX: Option<&'static str> = None;

    /// Primary key (`_key`), when the entity controls its own identity.
    /// `None` means the store assigns keys (append-only collections).
    fn key(&self) -> Option<&str>;

    /// Patch applied when an insert hits an existing key.
    fn conflict_patch(&self) -> Value;
}

/// Metadata returned for a saved document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMeta {
    /// Store-assigned document handle, e.g. `tasks/<key>`.
    pub id: String,
}

/// Typed facade over one document collection.
#[async_trait]
pub trait Collection<T>: Send + Sync {
    /// Ensures the collection (and its indexes) exist. Idempotent.
    async fn create(&self) -> Result<(), StoreError>;

    /// Fetches every document in the collection.
    async fn fetch_all(&self) -> Result<Vec<T>, StoreError>;

    /// Fetches the documents matching the query.
    async fn query(&self, spec: QuerySpec) -> Result<Vec<T>, StoreError>;

    /// Inserts the entity, or patches its status on key conflict.
    async fn save(&self, entity: &T) -> Result<DocumentMeta, StoreError>;

    /// Removes the entity's document by primary key.
    async fn remove(&self, entity: &T) -> Result<(), StoreError>;
}

/// A filter expression over one collection: equality predicates referencing
/// bind variables, an optional descending sort, and an optional limit.
///
/// Backends interpret the query themselves: ArangoDB renders it to AQL with
/// a bind-variable map, the in-memory store evaluates it directly.
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    filters: Vec<Filter>,
    sort_desc: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Clone)]
struct Filter {
    field: String,
    bind: String,
    value: Value,
}

impl QuerySpec {
    /// An unfiltered spec matching every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality predicate `doc.<field> == <value>`.
    pub fn filter_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        // bind variable names may not start with an underscore
        let bind = field.trim_start_matches('_').to_string();
        self.filters.push(Filter {
            field,
            bind,
            value: value.into(),
        });
        self
    }

    /// Sorts results by `field`, newest-style descending.
    pub fn sort_desc(mut self, field: impl Into<String>) -> Self {
        self.sort_desc = Some(field.into());
        self
    }

    /// Caps the number of returned documents.
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Renders the spec as an AQL query plus bind variables.
    pub fn to_aql(&self, collection: &str) -> (String, Map<String, Value>) {
        let mut query = format!("FOR d IN {collection}");
        let mut bind_vars = Map::new();
        if !self.filters.is_empty() {
            let predicates: Vec<String> = self
                .filters
                .iter()
                .map(|f| format!("d.`{}` == @{}", f.field, f.bind))
                .collect();
            query.push_str(" FILTER ");
            query.push_str(&predicates.join(" && "));
            for f in &self.filters {
                bind_vars.insert(f.bind.clone(), f.value.clone());
            }
        }
        if let Some(field) = &self.sort_desc {
            query.push_str(&format!(" SORT d.`{field}` DESC"));
        }
        if let Some(n) = self.limit {
            query.push_str(&format!(" LIMIT {n}"));
        }
        query.push_str(" RETURN d");
        (query, bind_vars)
    }

    /// Evaluates the filter predicates against a raw document.
    pub(crate) fn matches(&self, doc: &Value) -> bool {
        self.filters
            .iter()
            .all(|f| doc.get(&f.field) == Some(&f.value))
    }

    /// Applies sort and limit to raw documents, in-memory.
    pub(crate) fn order_and_cap(&self, mut docs: Vec<Value>) -> Vec<Value> {
        if let Some(field) = &self.sort_desc {
            docs.sort_by(|a, b| compare_values(b.get(field), a.get(field)));
        }
        if let Some(n) = self.limit {
            docs.truncate(n);
        }
        docs
    }
}

/// Total order over the JSON value shapes that appear in sort fields:
/// numbers by magnitude, strings lexicographically (RFC3339 instants sort
/// chronologically this way).
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}
