//! # causerie-store
//!
//! Gateway to the remote realtime document database.  The remote engine is
//! an external collaborator; this crate defines the surface the client
//! consumes: documents addressed by `collection/id` paths, merge patches
//! with field transforms, filtered/ordered queries, atomic write batches,
//! and realtime snapshot subscriptions delivered as owned, cancelable
//! handles.
//!
//! [`MemoryStore`] implements the full contract in-process and backs every
//! test in the workspace as well as local development.

pub mod document;
pub mod gateway;
pub mod memory;
pub mod query;

mod error;

pub use document::{CollectionPath, Document, DocumentPath, FieldOp, Patch};
pub use error::{Result, StoreError};
pub use gateway::{
    CancelGuard, DocSnapshot, DocSubscription, DocumentStore, QuerySnapshot, QuerySubscription,
    WriteBatch,
};
pub use memory::MemoryStore;
pub use query::{Direction, Filter, Query};
