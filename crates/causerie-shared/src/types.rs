use serde::{Deserialize, Serialize};

// User identity = opaque id issued by the auth provider
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Truncated form for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ChatId(pub String);

impl ChatId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct CallId(pub String);

impl CallId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Call room identifier, derived deterministically from the two participants
/// so both sides converge on the same room without a negotiation round-trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// The two user ids sorted lexicographically and joined with `_`.
    pub fn for_pair(a: &UserId, b: &UserId) -> Self {
        let mut ids = [a.as_str(), b.as_str()];
        ids.sort_unstable();
        Self(format!("{}_{}", ids[0], ids[1]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message content type, stored on the wire as a lowercase string.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Video,
    Audio,
    Document,
}

impl MessageKind {
    /// Classify an attachment by its MIME prefix. Anything unrecognized is
    /// treated as a document.
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("image/") {
            Self::Image
        } else if mime.starts_with("video/") {
            Self::Video
        } else if mime.starts_with("audio/") {
            Self::Audio
        } else {
            Self::Document
        }
    }

    /// Conversation-list preview line for a message of this kind.
    pub fn preview(self, text: &str) -> String {
        match self {
            Self::Image => "📷 Image".to_string(),
            Self::Video => "🎥 Video".to_string(),
            Self::Audio => "🎤 Voice Message".to_string(),
            Self::Document => "📄 Document".to_string(),
            Self::Text => {
                if text.is_empty() {
                    "Message".to_string()
                } else {
                    text.to_string()
                }
            }
        }
    }
}

/// Delivery status of a message. Only `read` is actively written by this
/// client; `sent` is stamped at creation and `delivered` is reserved for the
/// backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
}

/// Call intent lifecycle. `calling` is the only non-terminal state reachable
/// from the outside; `accepted` can still transition to `ended`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Calling,
    Accepted,
    Rejected,
    Ended,
}

impl CallStatus {
    /// A live intent still coordinates a ringing or in-progress call.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Calling | Self::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_is_order_independent() {
        let a = UserId::new("alice-uid");
        let b = UserId::new("bob-uid");
        assert_eq!(RoomId::for_pair(&a, &b), RoomId::for_pair(&b, &a));
        assert_eq!(RoomId::for_pair(&a, &b).as_str(), "alice-uid_bob-uid");
    }

    #[test]
    fn test_kinds_serialize_lowercase() {
        assert_eq!(serde_json::to_value(MessageKind::Image).unwrap(), "image");
        assert_eq!(serde_json::to_value(DeliveryStatus::Read).unwrap(), "read");
        assert_eq!(serde_json::to_value(CallStatus::Calling).unwrap(), "calling");
        let kind: MessageKind = serde_json::from_value(serde_json::json!("document")).unwrap();
        assert_eq!(kind, MessageKind::Document);
    }

    #[test]
    fn test_mime_classification() {
        assert_eq!(MessageKind::from_mime("image/png"), MessageKind::Image);
        assert_eq!(MessageKind::from_mime("video/mp4"), MessageKind::Video);
        assert_eq!(MessageKind::from_mime("audio/wav"), MessageKind::Audio);
        assert_eq!(MessageKind::from_mime("application/pdf"), MessageKind::Document);
    }

    #[test]
    fn test_previews() {
        assert_eq!(MessageKind::Audio.preview(""), "🎤 Voice Message");
        assert_eq!(MessageKind::Text.preview("hello"), "hello");
        assert_eq!(MessageKind::Text.preview(""), "Message");
    }
}
