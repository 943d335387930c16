//! Remote document schemas.
//!
//! Every struct mirrors the wire shape of its collection, camelCase names
//! included, so a snapshot deserializes without any mapping layer.  All
//! fields the store may omit carry `#[serde(default)]`.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::PRESENCE_WINDOW_SECS;
use crate::types::{CallStatus, DeliveryStatus, MessageId, MessageKind, RoomId, UserId};

// ---------------------------------------------------------------------------
// User profile
// ---------------------------------------------------------------------------

/// A user identity row (`users/{uid}`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: UserId,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "photoURL", default)]
    pub photo_url: Option<String>,
    pub phone_number: String,
    /// Immutable after setup; uniqueness is enforced by the reservation row.
    pub username: String,
    pub about: String,
    /// Every prefix of the username, shortest first.
    #[serde(default)]
    pub search_keywords: Vec<String>,
    /// Fallback avatar shown when no photo is set.
    pub emoji: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Best-effort presence heartbeat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Whether the last heartbeat is recent enough to present as online.
    pub fn is_online(&self, now: DateTime<Utc>) -> bool {
        self.last_seen
            .map(|seen| now - seen < Duration::seconds(PRESENCE_WINDOW_SECS))
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Conversation metadata
// ---------------------------------------------------------------------------

/// Denormalized preview of the latest message, kept on the conversation so
/// the list renders without reading the message subcollection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub text: String,
    pub sender_id: UserId,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Placeholder counter, always written as zero.
    pub unread_count: u32,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MessageKind>,
}

/// A 2-party conversation (`chats/{chatId}`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChatDocument {
    /// Always exactly two entries.
    pub participants: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,
    /// Ordering key for the conversation list.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Users who soft-hid this conversation from their own list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub archived_ids: Vec<UserId>,
    /// Per-user cutoff; messages at or before it are hidden for that user.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub cleared_at: HashMap<UserId, DateTime<Utc>>,
    /// Per-user typing flags, cleared by debounce.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub typing: HashMap<UserId, bool>,
}

impl ChatDocument {
    /// The other participant of a 2-party conversation.
    pub fn counterpart(&self, me: &UserId) -> Option<&UserId> {
        self.participants.iter().find(|uid| *uid != me)
    }

    pub fn involves(&self, user: &UserId) -> bool {
        self.participants.contains(user)
    }

    pub fn is_archived_for(&self, user: &UserId) -> bool {
        self.archived_ids.contains(user)
    }

    pub fn cleared_cutoff(&self, user: &UserId) -> Option<DateTime<Utc>> {
        self.cleared_at.get(user).copied()
    }

    pub fn is_typing(&self, user: &UserId) -> bool {
        self.typing.get(user).copied().unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single message row (`chats/{chatId}/messages/{messageId}`).
///
/// Deletion never removes the row: delete-for-everyone clears the content
/// and sets [`MessageDocument::is_deleted`]; delete-for-me only grows
/// [`MessageDocument::deleted_for`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MessageDocument {
    pub sender_id: UserId,
    /// Server-assigned at commit time; pending writes may briefly lack it.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub status: Option<DeliveryStatus>,
    /// Tombstone: content cleared for everyone, row retained.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_deleted: bool,
    /// Users hiding this message locally.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deleted_for: Vec<UserId>,
    /// Emoji -> ids of users who reacted with it.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub reactions: HashMap<String, Vec<UserId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
}

impl MessageDocument {
    /// Rows from the retired encrypted era carry no recognizable payload.
    /// They render as an inert placeholder instead of being dropped.
    pub fn is_legacy(&self) -> bool {
        self.text.as_deref().map_or(true, str::is_empty)
            && self.file_url.is_none()
            && !self.is_deleted
    }

    pub fn is_read(&self) -> bool {
        self.status == Some(DeliveryStatus::Read)
    }

    pub fn has_reacted(&self, emoji: &str, user: &UserId) -> bool {
        self.reactions
            .get(emoji)
            .map(|users| users.contains(user))
            .unwrap_or(false)
    }

    /// Whether this message appears in `user`'s derived sequence. A message
    /// with no timestamp yet is never excluded by the cutoff.
    pub fn visible_to(&self, user: &UserId, cutoff: Option<DateTime<Utc>>) -> bool {
        if let (Some(cut), Some(ts)) = (cutoff, self.timestamp) {
            if ts <= cut {
                return false;
            }
        }
        !self.deleted_for.contains(user)
    }
}

// ---------------------------------------------------------------------------
// Call intent
// ---------------------------------------------------------------------------

/// Ephemeral signaling record (`calls/{callId}`) coordinating one ring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallDocument {
    pub caller_id: UserId,
    pub caller_name: String,
    #[serde(rename = "callerPhotoURL", default)]
    pub caller_photo_url: Option<String>,
    pub receiver_id: UserId,
    pub room_id: RoomId,
    pub status: CallStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}
