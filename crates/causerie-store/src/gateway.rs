//! The [`DocumentStore`] trait: everything the client asks of the remote
//! document database.
//!
//! Implementations deliver realtime reads through [`watch`] channels wrapped
//! in owned subscription handles.  Dropping a handle runs its
//! [`CancelGuard`], which detaches the listener; callers never cancel
//! explicitly.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::document::{CollectionPath, Document, DocumentPath, Patch};
use crate::error::{Result, StoreError};
use crate::query::Query;

/// The result rows of one query evaluation, in query order.
pub type QuerySnapshot = Vec<Document>;

/// A single-document read; `None` means the document does not exist.
pub type DocSnapshot = Option<Document>;

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read one document.
    async fn get(&self, path: &DocumentPath) -> Result<DocSnapshot>;

    /// Create a document with a generated id and return that id.
    async fn create(&self, collection: &CollectionPath, patch: Patch) -> Result<String>;

    /// Replace the document's contents wholesale.
    async fn set(&self, path: &DocumentPath, patch: Patch) -> Result<()>;

    /// Merge into the document, creating it if absent.
    async fn merge(&self, path: &DocumentPath, patch: Patch) -> Result<()>;

    /// Merge into an existing document; fails with [`StoreError::NotFound`]
    /// if it does not exist.
    async fn update(&self, path: &DocumentPath, patch: Patch) -> Result<()>;

    /// Delete the document.  Deleting a missing document is not an error.
    async fn delete(&self, path: &DocumentPath) -> Result<()>;

    /// Apply every entry of the batch atomically: either all writes land or
    /// none do, and observers see the batch as a single change.
    async fn commit(&self, batch: WriteBatch) -> Result<()>;

    /// One-shot query evaluation.
    async fn query(&self, query: &Query) -> Result<QuerySnapshot>;

    /// Watch a single document.  The subscription holds the latest snapshot
    /// from the moment it is created.
    async fn subscribe_doc(&self, path: &DocumentPath) -> Result<DocSubscription>;

    /// Watch a query.  Re-evaluated whenever the collection changes; only
    /// the latest snapshot is retained, intermediate ones may be skipped.
    async fn subscribe(&self, query: Query) -> Result<QuerySubscription>;
}

// ---------------------------------------------------------------------------
// Write batches
// ---------------------------------------------------------------------------

/// One entry of a [`WriteBatch`].
#[derive(Debug, Clone)]
pub enum BatchEntry {
    Set { path: DocumentPath, patch: Patch },
    Merge { path: DocumentPath, patch: Patch },
    Update { path: DocumentPath, patch: Patch },
    Delete { path: DocumentPath },
}

/// An ordered list of writes committed as one atomic unit.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub entries: Vec<BatchEntry>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: DocumentPath, patch: Patch) -> &mut Self {
        self.entries.push(BatchEntry::Set { path, patch });
        self
    }

    pub fn merge(&mut self, path: DocumentPath, patch: Patch) -> &mut Self {
        self.entries.push(BatchEntry::Merge { path, patch });
        self
    }

    pub fn update(&mut self, path: DocumentPath, patch: Patch) -> &mut Self {
        self.entries.push(BatchEntry::Update { path, patch });
        self
    }

    pub fn delete(&mut self, path: DocumentPath) -> &mut Self {
        self.entries.push(BatchEntry::Delete { path });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

/// Runs a cleanup closure exactly once when dropped.
pub struct CancelGuard(Option<Box<dyn FnOnce() + Send>>);

impl CancelGuard {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(cancel)))
    }

    /// A guard with nothing to clean up, for implementations that do not
    /// track listeners.
    pub fn noop() -> Self {
        Self(None)
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if let Some(cancel) = self.0.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for CancelGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CancelGuard")
    }
}

/// A live query listener.  Holds the latest [`QuerySnapshot`]; dropping it
/// detaches the listener.
#[derive(Debug)]
pub struct QuerySubscription {
    rx: watch::Receiver<QuerySnapshot>,
    _guard: CancelGuard,
}

impl QuerySubscription {
    pub fn new(rx: watch::Receiver<QuerySnapshot>, guard: CancelGuard) -> Self {
        Self { rx, _guard: guard }
    }

    /// The most recent snapshot, without consuming the change notification.
    pub fn snapshot(&self) -> QuerySnapshot {
        self.rx.borrow().clone()
    }

    /// The most recent snapshot, marking it seen.
    pub fn current(&mut self) -> QuerySnapshot {
        self.rx.borrow_and_update().clone()
    }

    /// Wait until a snapshot newer than the last seen one is available.
    pub async fn changed(&mut self) -> Result<()> {
        self.rx
            .changed()
            .await
            .map_err(|_| StoreError::SubscriptionClosed)
    }
}

/// A live single-document listener, same shape as [`QuerySubscription`].
#[derive(Debug)]
pub struct DocSubscription {
    rx: watch::Receiver<DocSnapshot>,
    _guard: CancelGuard,
}

impl DocSubscription {
    pub fn new(rx: watch::Receiver<DocSnapshot>, guard: CancelGuard) -> Self {
        Self { rx, _guard: guard }
    }

    pub fn snapshot(&self) -> DocSnapshot {
        self.rx.borrow().clone()
    }

    pub fn current(&mut self) -> DocSnapshot {
        self.rx.borrow_and_update().clone()
    }

    pub async fn changed(&mut self) -> Result<()> {
        self.rx
            .changed()
            .await
            .map_err(|_| StoreError::SubscriptionClosed)
    }
}
