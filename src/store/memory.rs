//! # In-memory backend for the persistence facade.
//!
//! Keeps raw documents in a keyed map and evaluates [`QuerySpec`] directly.
//! Mirrors the ArangoDB backend's save semantics (insert, status-only patch
//! on key conflict) so controller behavior is identical under test.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

use super::{Collection, Document, DocumentMeta, QuerySpec};

/// In-memory document collection.
pub struct MemoryCollection<T> {
    docs: Mutex<BTreeMap<String, Value>>,
    next_key: AtomicU64,
    _marker: PhantomData<T>,
}

impl<T: Document> MemoryCollection<T> {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self {
            docs: Mutex::new(BTreeMap::new()),
            next_key: AtomicU64::new(1),
            _marker: PhantomData,
        }
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.docs.lock().expect("lock").len()
    }

    /// True when no documents are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw document by key, for assertions on the persisted shape.
    pub fn raw(&self, key: &str) -> Option<Value> {
        self.docs.lock().expect("lock").get(key).cloned()
    }
}

#[async_trait]
impl<T: Document> Collection<T> for MemoryCollection<T> {
    async fn create(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn fetch_all(&self) -> Result<Vec<T>, StoreError> {
        self.query(QuerySpec::new()).await
    }

    async fn query(&self, spec: QuerySpec) -> Result<Vec<T>, StoreError> {
        let matched: Vec<Value> = {
            let docs = self.docs.lock().expect("lock");
            docs.values().filter(|d| spec.matches(d)).cloned().collect()
        };
        spec.order_and_cap(matched)
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
            .collect()
    }

    async fn save(&self, entity: &T) -> Result<DocumentMeta, StoreError> {
        let doc = serde_json::to_value(entity)?;
        let mut docs = self.docs.lock().expect("lock");
        let key = match entity.key() {
            Some(key) => key.to_string(),
            None => self.next_key.fetch_add(1, Ordering::Relaxed).to_string(),
        };

        if entity.key().is_some() && docs.contains_key(&key) {
            // key conflict: patch only the fields the entity declares mutable
            if let (Some(Value::Object(target)), Value::Object(patch)) =
                (docs.get_mut(&key), entity.conflict_patch())
            {
                for (field, value) in patch {
                    target.insert(field, value);
                }
            }
        } else {
            docs.insert(key.clone(), doc);
        }
        Ok(DocumentMeta {
            id: format!("{}/{}", T::COLLECTION, key),
        })
    }

    async fn remove(&self, entity: &T) -> Result<(), StoreError> {
        let key = entity.key().ok_or(StoreError::MissingKey)?;
        let mut docs = self.docs.lock().expect("lock");
        match docs.remove(key) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound),
        }
    }
}
