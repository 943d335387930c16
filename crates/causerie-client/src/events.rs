//! Outbound UI events.
//!
//! Services never talk to a screen directly; they push [`ClientEvent`]s onto
//! the [`EventBus`] and the embedding shell renders them. The shell reports
//! window state back through [`ViewState`] so services can tell whether the
//! user is actually looking at the app.

use serde::Serialize;
use tokio::sync::mpsc;

use causerie_shared::constants::TOAST_DURATION_MS;
use causerie_shared::ChatId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
    pub duration_ms: u64,
}

impl Toast {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Success,
            message: message.into(),
            duration_ms: TOAST_DURATION_MS,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Error,
            message: message.into(),
            duration_ms: TOAST_DURATION_MS,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Info,
            message: message.into(),
            duration_ms: TOAST_DURATION_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientEvent {
    Toast(Toast),
    #[serde(rename_all = "camelCase")]
    FocusChat { chat_id: ChatId },
}

/// Fan-out channel for [`ClientEvent`]s.
///
/// `emit` never blocks; if the shell stops draining the channel the event is
/// dropped and logged rather than stalling a sync task.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: mpsc::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ClientEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: ClientEvent) {
        if let Err(e) = self.tx.try_send(event) {
            tracing::error!(error = %e, "Failed to emit event");
        }
    }

    pub fn toast_success(&self, message: impl Into<String>) {
        self.emit(ClientEvent::Toast(Toast::success(message)));
    }

    pub fn toast_error(&self, message: impl Into<String>) {
        self.emit(ClientEvent::Toast(Toast::error(message)));
    }

    pub fn toast_info(&self, message: impl Into<String>) {
        self.emit(ClientEvent::Toast(Toast::info(message)));
    }

    pub fn focus_chat(&self, chat_id: ChatId) {
        self.emit(ClientEvent::FocusChat { chat_id });
    }
}

/// Window state reported by the embedding shell.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub focused: bool,
    pub visible: bool,
    pub active_chat: Option<ChatId>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            focused: true,
            visible: true,
            active_chat: None,
        }
    }
}

impl ViewState {
    /// True when the window is both visible and focused.
    pub fn foreground(&self) -> bool {
        self.focused && self.visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toast_constructors() {
        let toast = Toast::success("Profile updated!");
        assert_eq!(toast.kind, ToastKind::Success);
        assert_eq!(toast.message, "Profile updated!");
        assert_eq!(toast.duration_ms, TOAST_DURATION_MS);

        assert_eq!(Toast::error("nope").kind, ToastKind::Error);
        assert_eq!(Toast::info("hey").kind, ToastKind::Info);
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = ClientEvent::Toast(Toast::error("Upload failed."));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "toast");
        assert_eq!(value["kind"], "error");
        assert_eq!(value["message"], "Upload failed.");
        assert_eq!(value["durationMs"], TOAST_DURATION_MS);

        let event = ClientEvent::FocusChat {
            chat_id: ChatId::new("chat-1"),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "focusChat");
        assert_eq!(value["chatId"], "chat-1");
    }

    #[tokio::test]
    async fn test_bus_delivers_events() {
        let (bus, mut rx) = EventBus::new(8);
        bus.toast_success("Chat cleared");
        bus.focus_chat(ChatId::new("chat-9"));

        assert_eq!(
            rx.recv().await,
            Some(ClientEvent::Toast(Toast::success("Chat cleared")))
        );
        assert_eq!(
            rx.recv().await,
            Some(ClientEvent::FocusChat {
                chat_id: ChatId::new("chat-9")
            })
        );
    }

    #[tokio::test]
    async fn test_bus_drops_when_full() {
        let (bus, mut rx) = EventBus::new(1);
        bus.toast_info("first");
        bus.toast_info("second");

        assert_eq!(
            rx.recv().await,
            Some(ClientEvent::Toast(Toast::info("first")))
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_foreground_requires_focus_and_visibility() {
        let mut view = ViewState::default();
        assert!(view.foreground());

        view.focused = false;
        assert!(!view.foreground());

        view.focused = true;
        view.visible = false;
        assert!(!view.foreground());
    }
}
