use thiserror::Error;

use causerie_shared::ValidationError;

/// Errors surfaced by client operations.
///
/// Mutation helpers additionally emit a toast for the failures a user should
/// see; the typed error is for the caller.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Not signed in")]
    SignedOut,

    #[error("Username already exists")]
    UsernameTaken,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Only the sender can modify a message")]
    NotMessageSender,

    #[error("Only text messages can be edited")]
    NotEditable,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] causerie_store::StoreError),

    #[error("Media error: {0}")]
    Media(#[from] causerie_media::MediaError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
