//! In-process implementation of the store contract.
//!
//! Documents live in nested `BTreeMap`s behind one mutex.  Every write path
//! funnels through [`Inner::commit_entries`], which stages the whole batch
//! against committed state before writing anything, so a failing entry
//! aborts the batch cleanly and observers only ever see it as one change.
//!
//! Backs every test in the workspace and doubles as the local development
//! backend.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use tokio::sync::watch;
use uuid::Uuid;

use crate::document::{CollectionPath, Document, DocumentPath, Patch};
use crate::error::{Result, StoreError};
use crate::gateway::{
    BatchEntry, CancelGuard, DocSnapshot, DocSubscription, DocumentStore, QuerySnapshot,
    QuerySubscription, WriteBatch,
};
use crate::query::Query;

// ---------------------------------------------------------------------------
// Store state
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    collections: BTreeMap<String, BTreeMap<String, Value>>,
    query_watchers: Vec<QueryWatcher>,
    doc_watchers: Vec<DocWatcher>,
    next_watcher: u64,
    last_stamp: DateTime<Utc>,
}

struct QueryWatcher {
    id: u64,
    query: Query,
    tx: watch::Sender<QuerySnapshot>,
}

struct DocWatcher {
    id: u64,
    path: DocumentPath,
    tx: watch::Sender<DocSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                collections: BTreeMap::new(),
                query_watchers: Vec::new(),
                doc_watchers: Vec::new(),
                next_watcher: 0,
                last_stamp: DateTime::<Utc>::MIN_UTC,
            })),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("state mutex poisoned".to_string()))
    }

    /// A guard that detaches the query watcher with this id, best effort.
    fn query_guard(&self, id: u64) -> CancelGuard {
        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        CancelGuard::new(move || {
            if let Some(inner) = weak.upgrade() {
                if let Ok(mut inner) = inner.lock() {
                    inner.query_watchers.retain(|watcher| watcher.id != id);
                }
            }
        })
    }

    fn doc_guard(&self, id: u64) -> CancelGuard {
        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        CancelGuard::new(move || {
            if let Some(inner) = weak.upgrade() {
                if let Ok(mut inner) = inner.lock() {
                    inner.doc_watchers.retain(|watcher| watcher.id != id);
                }
            }
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    /// Commit-time clock.  Strictly monotone across batches so snapshots
    /// ordered by a server-stamped field never reorder on equal stamps.
    fn stamp(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if now <= self.last_stamp {
            now = self.last_stamp + Duration::microseconds(1);
        }
        self.last_stamp = now;
        now
    }

    fn read_doc(&self, path: &DocumentPath) -> DocSnapshot {
        self.collections
            .get(path.collection.as_str())
            .and_then(|docs| docs.get(&path.id))
            .map(|data| Document::new(path.id.clone(), data.clone()))
    }

    fn evaluate(&self, query: &Query) -> QuerySnapshot {
        match self.collections.get(query.collection.as_str()) {
            Some(docs) => query.evaluate(docs.iter()),
            None => Vec::new(),
        }
    }

    /// The latest value a batch entry for `path` would observe: an earlier
    /// staged write wins over committed state.
    fn staged_or_committed(
        &self,
        staged: &[(String, String, Option<Value>)],
        path: &DocumentPath,
    ) -> Option<Value> {
        for (collection, id, data) in staged.iter().rev() {
            if collection == path.collection.as_str() && id == &path.id {
                return data.clone();
            }
        }
        self.collections
            .get(path.collection.as_str())
            .and_then(|docs| docs.get(&path.id))
            .cloned()
    }

    fn commit_entries(&mut self, entries: &[BatchEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        // One stamp per batch: every ServerTimestamp in it resolves equal.
        let now = self.stamp();

        let mut staged: Vec<(String, String, Option<Value>)> = Vec::new();
        for entry in entries {
            match entry {
                BatchEntry::Set { path, patch } => {
                    let mut data = Value::Object(Map::new());
                    patch.apply(&mut data, now);
                    staged.push((path.collection.0.clone(), path.id.clone(), Some(data)));
                }
                BatchEntry::Merge { path, patch } => {
                    let mut data = self
                        .staged_or_committed(&staged, path)
                        .unwrap_or_else(|| Value::Object(Map::new()));
                    patch.apply(&mut data, now);
                    staged.push((path.collection.0.clone(), path.id.clone(), Some(data)));
                }
                BatchEntry::Update { path, patch } => {
                    let Some(mut data) = self.staged_or_committed(&staged, path) else {
                        return Err(StoreError::NotFound(path.to_string()));
                    };
                    patch.apply(&mut data, now);
                    staged.push((path.collection.0.clone(), path.id.clone(), Some(data)));
                }
                BatchEntry::Delete { path } => {
                    staged.push((path.collection.0.clone(), path.id.clone(), None));
                }
            }
        }

        let mut touched: BTreeSet<String> = BTreeSet::new();
        for (collection, id, data) in staged {
            touched.insert(collection.clone());
            let docs = self.collections.entry(collection).or_default();
            match data {
                Some(value) => {
                    docs.insert(id, value);
                }
                None => {
                    docs.remove(&id);
                }
            }
        }

        tracing::debug!(entries = entries.len(), collections = touched.len(), "commit");
        self.notify(&touched);
        Ok(())
    }

    /// Re-feed every watcher whose collection was written.  [`watch`] keeps
    /// only the latest value, so slow readers skip straight to it.
    fn notify(&self, touched: &BTreeSet<String>) {
        for watcher in &self.query_watchers {
            if !touched.contains(watcher.query.collection.as_str()) {
                continue;
            }
            let snapshot = self.evaluate(&watcher.query);
            watcher.tx.send_if_modified(move |current| {
                if *current == snapshot {
                    false
                } else {
                    *current = snapshot;
                    true
                }
            });
        }
        for watcher in &self.doc_watchers {
            if !touched.contains(watcher.path.collection.as_str()) {
                continue;
            }
            let snapshot = self.read_doc(&watcher.path);
            watcher.tx.send_if_modified(move |current| {
                if *current == snapshot {
                    false
                } else {
                    *current = snapshot;
                    true
                }
            });
        }
    }
}

// ---------------------------------------------------------------------------
// DocumentStore impl
// ---------------------------------------------------------------------------

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocumentPath) -> Result<DocSnapshot> {
        Ok(self.lock()?.read_doc(path))
    }

    async fn create(&self, collection: &CollectionPath, patch: Patch) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let entries = [BatchEntry::Set {
            path: collection.doc(id.clone()),
            patch,
        }];
        self.lock()?.commit_entries(&entries)?;
        Ok(id)
    }

    async fn set(&self, path: &DocumentPath, patch: Patch) -> Result<()> {
        let entries = [BatchEntry::Set {
            path: path.clone(),
            patch,
        }];
        self.lock()?.commit_entries(&entries)
    }

    async fn merge(&self, path: &DocumentPath, patch: Patch) -> Result<()> {
        let entries = [BatchEntry::Merge {
            path: path.clone(),
            patch,
        }];
        self.lock()?.commit_entries(&entries)
    }

    async fn update(&self, path: &DocumentPath, patch: Patch) -> Result<()> {
        let entries = [BatchEntry::Update {
            path: path.clone(),
            patch,
        }];
        self.lock()?.commit_entries(&entries)
    }

    async fn delete(&self, path: &DocumentPath) -> Result<()> {
        let entries = [BatchEntry::Delete { path: path.clone() }];
        self.lock()?.commit_entries(&entries)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.lock()?.commit_entries(&batch.entries)
    }

    async fn query(&self, query: &Query) -> Result<QuerySnapshot> {
        Ok(self.lock()?.evaluate(query))
    }

    async fn subscribe_doc(&self, path: &DocumentPath) -> Result<DocSubscription> {
        let mut inner = self.lock()?;
        let initial = inner.read_doc(path);
        let (tx, rx) = watch::channel(initial);
        let id = inner.next_watcher;
        inner.next_watcher += 1;
        inner.doc_watchers.push(DocWatcher {
            id,
            path: path.clone(),
            tx,
        });
        drop(inner);
        tracing::debug!(path = %path, "doc watcher registered");
        Ok(DocSubscription::new(rx, self.doc_guard(id)))
    }

    async fn subscribe(&self, query: Query) -> Result<QuerySubscription> {
        let mut inner = self.lock()?;
        let initial = inner.evaluate(&query);
        let (tx, rx) = watch::channel(initial);
        let id = inner.next_watcher;
        inner.next_watcher += 1;
        tracing::debug!(collection = %query.collection, "query watcher registered");
        inner.query_watchers.push(QueryWatcher { id, query, tx });
        drop(inner);
        Ok(QuerySubscription::new(rx, self.query_guard(id)))
    }
}
