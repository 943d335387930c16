//! # causerie-shared
//!
//! Domain types for the Causerie messaging client: identifiers, the remote
//! document schemas (camelCase wire names, exactly as stored), validation
//! rules for profile setup, and the tunable constants shared by every crate.
//!
//! This crate is pure data: no I/O, no async.

pub mod constants;
pub mod documents;
pub mod types;
pub mod validation;

pub use documents::{CallDocument, ChatDocument, LastMessage, MessageDocument, UserProfile};
pub use types::{CallId, CallStatus, ChatId, DeliveryStatus, MessageId, MessageKind, RoomId, UserId};
pub use validation::ValidationError;
