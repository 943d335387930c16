use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// An `update` targeted a document that does not exist.
    #[error("Document not found: {0}")]
    NotFound(String),

    /// A document payload failed to (de)serialize.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The watched channel behind a subscription is gone.
    #[error("Subscription closed")]
    SubscriptionClosed,

    /// A backend-specific failure with no finer classification.
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
