//! Boundary to the embedded video-call SDK.
//!
//! Joining hands the whole in-call surface (tracks, layout, controls) over
//! to the SDK; the client only hears from the session again through the
//! leave callback.

use async_trait::async_trait;

use causerie_shared::{RoomId, UserId};

use crate::error::Result;
use crate::token::RoomToken;

/// Invoked exactly once when the local user leaves the room through the
/// SDK's own controls.
pub type LeaveCallback = Box<dyn FnOnce() + Send + 'static>;

#[async_trait]
pub trait CallTransport: Send + Sync {
    /// Join `room` as `uid`, presenting the minted token.
    async fn join(
        &self,
        room: &RoomId,
        token: &RoomToken,
        uid: &UserId,
        display_name: &str,
        on_leave: LeaveCallback,
    ) -> Result<()>;
}
