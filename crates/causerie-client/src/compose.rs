//! Outbound mutations for one conversation: sends, edits, deletes,
//! reactions, typing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, warn};

use causerie_media::{AssetUploader, VoiceCapture};
use causerie_shared::constants::{COLLECTION_CHATS, SUBCOLLECTION_MESSAGES, TYPING_DEBOUNCE_MS};
use causerie_shared::{ChatId, MessageDocument, MessageId, MessageKind, UserId};
use causerie_store::{CollectionPath, DocumentStore, Patch, StoreError};

use crate::error::{ClientError, Result};
use crate::events::EventBus;

/// Write side of one conversation. Cheap to construct; holds no
/// subscriptions, only the pending reply target and the typing debounce
/// generation.
pub struct Composer {
    me: UserId,
    chat_id: ChatId,
    store: Arc<dyn DocumentStore>,
    uploader: Arc<dyn AssetUploader>,
    events: EventBus,
    reply_to: Mutex<Option<MessageId>>,
    typing_gen: Arc<AtomicU64>,
}

impl Composer {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        uploader: Arc<dyn AssetUploader>,
        me: UserId,
        chat_id: ChatId,
        events: EventBus,
    ) -> Self {
        Self {
            me,
            chat_id,
            store,
            uploader,
            events,
            reply_to: Mutex::new(None),
            typing_gen: Arc::new(AtomicU64::new(0)),
        }
    }

    fn chat_path(&self) -> causerie_store::DocumentPath {
        CollectionPath::new(COLLECTION_CHATS).doc(self.chat_id.as_str())
    }

    fn messages_path(&self) -> CollectionPath {
        self.chat_path().subcollection(SUBCOLLECTION_MESSAGES)
    }

    // -----------------------------------------------------------------------
    // Reply state
    // -----------------------------------------------------------------------

    pub fn set_reply(&self, message_id: MessageId) {
        if let Ok(mut guard) = self.reply_to.lock() {
            *guard = Some(message_id);
        }
    }

    pub fn clear_reply(&self) {
        if let Ok(mut guard) = self.reply_to.lock() {
            *guard = None;
        }
    }

    pub fn reply_target(&self) -> Option<MessageId> {
        self.reply_to.lock().ok().and_then(|guard| guard.clone())
    }

    // -----------------------------------------------------------------------
    // Sends
    // -----------------------------------------------------------------------

    /// Send a text message. Whitespace-only input is rejected before any
    /// write happens.
    pub async fn send_text(&self, text: &str) -> Result<MessageId> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        match self
            .send_payload(MessageKind::Text, trimmed, None, None, None)
            .await
        {
            Ok(id) => Ok(id),
            Err(e) => {
                warn!(error = %e, chat = self.chat_id.as_str(), "Send failed");
                self.events.toast_error("Failed to send message.");
                Err(e)
            }
        }
    }

    /// Upload a file and send it as an attachment message. The message text
    /// carries the file name; the list preview shows the kind.
    pub async fn send_attachment(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        mime_type: &str,
    ) -> Result<MessageId> {
        let result = async {
            let asset = self.uploader.upload(bytes, file_name, mime_type).await?;
            self.send_payload(
                MessageKind::from_mime(mime_type),
                file_name,
                Some(asset.secure_url),
                Some(file_name.to_string()),
                Some(mime_type.to_string()),
            )
            .await
        }
        .await;
        match result {
            Ok(id) => Ok(id),
            Err(e) => {
                warn!(error = %e, chat = self.chat_id.as_str(), "Attachment failed");
                self.events.toast_error("Upload failed.");
                Err(e)
            }
        }
    }

    /// Upload a finished voice recording and send it as an audio message.
    pub async fn send_voice(&self, capture: VoiceCapture) -> Result<MessageId> {
        let result = async {
            let asset = self
                .uploader
                .upload(capture.bytes, capture.file_name, capture.mime_type)
                .await?;
            self.send_payload(
                MessageKind::Audio,
                "🎤 Voice Message",
                Some(asset.secure_url),
                Some(capture.file_name.to_string()),
                Some(capture.mime_type.to_string()),
            )
            .await
        }
        .await;
        match result {
            Ok(id) => Ok(id),
            Err(e) => {
                warn!(error = %e, chat = self.chat_id.as_str(), "Voice message failed");
                self.events.toast_error("Voice message failed");
                Err(e)
            }
        }
    }

    /// Create the message row, then refresh the conversation summary. The
    /// pending reply target rides along and is cleared only on success.
    async fn send_payload(
        &self,
        kind: MessageKind,
        text: &str,
        file_url: Option<String>,
        file_name: Option<String>,
        mime_type: Option<String>,
    ) -> Result<MessageId> {
        let reply_to = self.reply_target();

        let message = Patch::new()
            .set("senderId", self.me.as_str())
            .server_timestamp("timestamp")
            .set("type", json!(kind))
            .set("status", "sent")
            .set("text", text)
            .set("fileUrl", opt_value(file_url))
            .set("fileName", opt_value(file_name))
            .set("mimeType", opt_value(mime_type))
            .set(
                "replyToId",
                opt_value(reply_to.as_ref().map(|id| id.as_str().to_string())),
            );
        let id = self.store.create(&self.messages_path(), message).await?;

        let summary = Patch::new()
            .server_timestamp("updatedAt")
            .set(
                "lastMessage",
                json!({
                    "text": kind.preview(text),
                    "senderId": self.me.as_str(),
                    "timestamp": Utc::now(),
                    "unreadCount": 0,
                    "type": kind,
                }),
            )
            .set(format!("typing.{}", self.me.as_str()), false);
        self.store.update(&self.chat_path(), summary).await?;

        self.clear_reply();
        debug!(chat = self.chat_id.as_str(), message = %id, "Message sent");
        Ok(MessageId::new(id))
    }

    // -----------------------------------------------------------------------
    // Edits and deletes
    // -----------------------------------------------------------------------

    /// Replace the text of an own text message and stamp it edited.
    pub async fn edit_text(&self, message_id: &MessageId, new_text: &str) -> Result<()> {
        let trimmed = new_text.trim();
        if trimmed.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        let result = async {
            let message = self.fetch_message(message_id).await?;
            if message.sender_id != self.me {
                return Err(ClientError::NotMessageSender);
            }
            if message.kind != MessageKind::Text {
                return Err(ClientError::NotEditable);
            }
            let path = self.messages_path().doc(message_id.as_str());
            let patch = Patch::new()
                .set("text", trimmed)
                .server_timestamp("editedAt");
            Ok(self.store.update(&path, patch).await?)
        }
        .await;
        if let Err(ClientError::Store(e)) = &result {
            warn!(error = %e, "Edit failed");
            self.events.toast_error("Failed to edit message");
        }
        result
    }

    /// Blank the message for both sides, leaving a tombstone row.
    pub async fn delete_for_everyone(&self, message_id: &MessageId) -> Result<()> {
        let result = async {
            let message = self.fetch_message(message_id).await?;
            if message.sender_id != self.me {
                return Err(ClientError::NotMessageSender);
            }
            let path = self.messages_path().doc(message_id.as_str());
            let patch = Patch::new()
                .set("isDeleted", true)
                .set("text", "")
                .set("fileUrl", Value::Null);
            Ok(self.store.update(&path, patch).await?)
        }
        .await;
        self.finish_delete(result)
    }

    /// Hide the message from the caller only; the row and the other side are
    /// untouched.
    pub async fn delete_for_me(&self, message_id: &MessageId) -> Result<()> {
        let path = self.messages_path().doc(message_id.as_str());
        let result = self
            .store
            .update(
                &path,
                Patch::new().array_union("deletedFor", vec![json!(self.me.as_str())]),
            )
            .await
            .map_err(ClientError::from);
        self.finish_delete(result)
    }

    fn finish_delete(&self, result: Result<()>) -> Result<()> {
        match &result {
            Ok(()) => self.events.toast_success("Message deleted"),
            Err(ClientError::Store(e)) => {
                warn!(error = %e, "Delete failed");
                self.events.toast_error("Failed to delete message");
            }
            Err(_) => {}
        }
        result
    }

    /// Add the caller to the emoji's reactor list, or remove them if already
    /// present.
    pub async fn toggle_reaction(&self, message_id: &MessageId, emoji: &str) -> Result<()> {
        let message = self.fetch_message(message_id).await?;
        let field = format!("reactions.{emoji}");
        let me = vec![json!(self.me.as_str())];
        let patch = if message.has_reacted(emoji, &self.me) {
            Patch::new().array_remove(field, me)
        } else {
            Patch::new().array_union(field, me)
        };
        let path = self.messages_path().doc(message_id.as_str());
        if let Err(e) = self.store.update(&path, patch).await {
            warn!(error = %e, "Reaction toggle failed");
            return Err(e.into());
        }
        Ok(())
    }

    async fn fetch_message(&self, message_id: &MessageId) -> Result<MessageDocument> {
        let path = self.messages_path().doc(message_id.as_str());
        let doc = self
            .store
            .get(&path)
            .await?
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        Ok(doc.decode()?)
    }

    // -----------------------------------------------------------------------
    // Typing
    // -----------------------------------------------------------------------

    /// Flag the caller as typing, and schedule the flag to drop once no
    /// further pulse arrives within the debounce window.
    pub async fn typing_pulse(&self) {
        let generation = self.typing_gen.fetch_add(1, Ordering::SeqCst) + 1;
        let field = format!("typing.{}", self.me.as_str());

        if let Err(e) = self
            .store
            .update(&self.chat_path(), Patch::new().set(field.clone(), true))
            .await
        {
            debug!(error = %e, "Typing flag write failed");
            return;
        }

        let store = Arc::clone(&self.store);
        let typing_gen = Arc::clone(&self.typing_gen);
        let path = self.chat_path();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(TYPING_DEBOUNCE_MS)).await;
            if typing_gen.load(Ordering::SeqCst) != generation {
                // A newer pulse owns the flag now.
                return;
            }
            if let Err(e) = store.update(&path, Patch::new().set(field, false)).await {
                debug!(error = %e, "Typing flag clear failed");
            }
        });
    }
}

fn opt_value(value: Option<String>) -> Value {
    value.map(Value::String).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        drain_toasts, seed_chat, seed_message, FailingStore, FailingUploader, RecordingUploader,
    };
    use causerie_shared::DeliveryStatus;
    use causerie_store::{DocumentStore, MemoryStore};

    fn composer(store: Arc<dyn DocumentStore>) -> (Composer, tokio::sync::mpsc::Receiver<crate::events::ClientEvent>) {
        let (events, rx) = EventBus::new(16);
        let composer = Composer::new(
            store,
            Arc::new(RecordingUploader::new("https://cdn.example/file.bin")),
            UserId::new("me"),
            ChatId::new("c1"),
            events,
        );
        (composer, rx)
    }

    async fn message_doc(store: &MemoryStore, id: &str) -> serde_json::Value {
        store
            .get(
                &CollectionPath::new(COLLECTION_CHATS)
                    .doc("c1")
                    .subcollection(SUBCOLLECTION_MESSAGES)
                    .doc(id),
            )
            .await
            .unwrap()
            .unwrap()
            .data
    }

    async fn chat_doc(store: &MemoryStore) -> serde_json::Value {
        store
            .get(&CollectionPath::new(COLLECTION_CHATS).doc("c1"))
            .await
            .unwrap()
            .unwrap()
            .data
    }

    fn own_text(ts: chrono::DateTime<Utc>, text: &str) -> MessageDocument {
        MessageDocument {
            sender_id: UserId::new("me"),
            timestamp: Some(ts),
            kind: MessageKind::Text,
            text: Some(text.to_string()),
            status: Some(DeliveryStatus::Sent),
            ..Default::default()
        }
    }

    async fn yield_a_bit() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_send_text_payload_and_summary() {
        let store = MemoryStore::new();
        seed_chat(&store, "c1", "me", "u2", Utc::now()).await;
        let (composer, _rx) = composer(Arc::new(store.clone()));

        let id = composer.send_text("  hello there  ").await.unwrap();

        let message = message_doc(&store, id.as_str()).await;
        assert_eq!(message["senderId"], "me");
        assert_eq!(message["type"], "text");
        assert_eq!(message["status"], "sent");
        assert_eq!(message["text"], "hello there");
        assert!(message["fileUrl"].is_null());
        assert!(message["replyToId"].is_null());
        assert!(message["timestamp"].is_string());

        let chat = chat_doc(&store).await;
        assert_eq!(chat["lastMessage"]["text"], "hello there");
        assert_eq!(chat["lastMessage"]["senderId"], "me");
        assert_eq!(chat["lastMessage"]["type"], "text");
        assert_eq!(chat["lastMessage"]["unreadCount"], 0);
        assert!(chat["updatedAt"].is_string());
        assert_eq!(chat["typing"]["me"], false);
    }

    #[tokio::test]
    async fn test_send_rejects_empty_text() {
        let store = MemoryStore::new();
        seed_chat(&store, "c1", "me", "u2", Utc::now()).await;
        let (composer, mut rx) = composer(Arc::new(store.clone()));

        let err = composer.send_text("   ").await.unwrap_err();
        assert!(matches!(err, ClientError::EmptyMessage));

        let messages = store
            .query(&causerie_store::Query::new(
                CollectionPath::new(COLLECTION_CHATS)
                    .doc("c1")
                    .subcollection(SUBCOLLECTION_MESSAGES),
            ))
            .await
            .unwrap();
        assert!(messages.is_empty());
        assert!(drain_toasts(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_reply_survives_failed_send() {
        let inner = MemoryStore::new();
        seed_chat(&inner, "c1", "me", "u2", Utc::now()).await;
        let failing = Arc::new(FailingStore::new(inner.clone()));
        let (composer, mut rx) = composer(failing.clone());

        composer.set_reply(MessageId::new("m0"));
        assert!(composer.send_text("take two").await.is_err());
        assert_eq!(drain_toasts(&mut rx), vec!["Failed to send message."]);
        assert_eq!(composer.reply_target(), Some(MessageId::new("m0")));

        failing.heal();
        let id = composer.send_text("take two").await.unwrap();
        let message = message_doc(&inner, id.as_str()).await;
        assert_eq!(message["replyToId"], "m0");
        assert_eq!(composer.reply_target(), None);
    }

    #[tokio::test]
    async fn test_attachment_flow() {
        let store = MemoryStore::new();
        seed_chat(&store, "c1", "me", "u2", Utc::now()).await;
        let (events, _rx) = EventBus::new(16);
        let uploader = Arc::new(RecordingUploader::new("https://cdn.example/photo.png"));
        let composer = Composer::new(
            Arc::new(store.clone()),
            uploader.clone(),
            UserId::new("me"),
            ChatId::new("c1"),
            events,
        );

        let id = composer
            .send_attachment(vec![9, 9, 9], "photo.png", "image/png")
            .await
            .unwrap();

        let uploads = uploader.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].mime_type, "image/png");
        assert_eq!(uploads[0].bytes, vec![9, 9, 9]);

        let message = message_doc(&store, id.as_str()).await;
        assert_eq!(message["type"], "image");
        assert_eq!(message["text"], "photo.png");
        assert_eq!(message["fileUrl"], "https://cdn.example/photo.png");
        assert_eq!(message["fileName"], "photo.png");
        assert_eq!(message["mimeType"], "image/png");

        let chat = chat_doc(&store).await;
        assert_eq!(chat["lastMessage"]["text"], "📷 Image");
        assert_eq!(chat["lastMessage"]["type"], "image");
    }

    #[tokio::test]
    async fn test_upload_failure_toasts_and_writes_nothing() {
        let store = MemoryStore::new();
        seed_chat(&store, "c1", "me", "u2", Utc::now()).await;
        let (events, mut rx) = EventBus::new(16);
        let composer = Composer::new(
            Arc::new(store.clone()),
            Arc::new(FailingUploader),
            UserId::new("me"),
            ChatId::new("c1"),
            events,
        );

        assert!(composer
            .send_attachment(vec![1], "x.bin", "application/octet-stream")
            .await
            .is_err());
        assert_eq!(drain_toasts(&mut rx), vec!["Upload failed."]);

        let messages = store
            .query(&causerie_store::Query::new(
                CollectionPath::new(COLLECTION_CHATS)
                    .doc("c1")
                    .subcollection(SUBCOLLECTION_MESSAGES),
            ))
            .await
            .unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_voice_flow() {
        let store = MemoryStore::new();
        seed_chat(&store, "c1", "me", "u2", Utc::now()).await;
        let (composer, _rx) = composer(Arc::new(store.clone()));

        let capture = VoiceCapture {
            bytes: vec![0; 64],
            duration_secs: 1.5,
            mime_type: "audio/wav",
            file_name: "voice_message.wav",
        };
        let id = composer.send_voice(capture).await.unwrap();

        let message = message_doc(&store, id.as_str()).await;
        assert_eq!(message["type"], "audio");
        assert_eq!(message["text"], "🎤 Voice Message");
        assert_eq!(message["fileName"], "voice_message.wav");

        let chat = chat_doc(&store).await;
        assert_eq!(chat["lastMessage"]["text"], "🎤 Voice Message");
    }

    #[tokio::test]
    async fn test_edit_guards_and_success() {
        let store = MemoryStore::new();
        let base = Utc::now();
        seed_chat(&store, "c1", "me", "u2", base).await;

        let mut foreign = own_text(base, "hi");
        foreign.sender_id = UserId::new("u2");
        seed_message(&store, "c1", "theirs", &foreign).await;

        let mut image = own_text(base, "pic");
        image.kind = MessageKind::Image;
        seed_message(&store, "c1", "image", &image).await;

        seed_message(&store, "c1", "mine", &own_text(base, "first draft")).await;

        let (composer, mut rx) = composer(Arc::new(store.clone()));

        assert!(matches!(
            composer.edit_text(&MessageId::new("theirs"), "nope").await,
            Err(ClientError::NotMessageSender)
        ));
        assert!(matches!(
            composer.edit_text(&MessageId::new("image"), "nope").await,
            Err(ClientError::NotEditable)
        ));
        assert!(matches!(
            composer.edit_text(&MessageId::new("mine"), "  ").await,
            Err(ClientError::EmptyMessage)
        ));
        // Guard failures stay silent.
        assert!(drain_toasts(&mut rx).is_empty());

        let before = message_doc(&store, "mine").await;
        composer
            .edit_text(&MessageId::new("mine"), "final draft")
            .await
            .unwrap();
        let message = message_doc(&store, "mine").await;
        assert_eq!(message["text"], "final draft");
        assert!(message["editedAt"].is_string());
        // Editing touches nothing besides the body and the edit stamp.
        assert_eq!(message["senderId"], before["senderId"]);
        assert_eq!(message["status"], before["status"]);
        assert_eq!(message["timestamp"], before["timestamp"]);
    }

    #[tokio::test]
    async fn test_delete_for_everyone_leaves_tombstone() {
        let store = MemoryStore::new();
        let base = Utc::now();
        seed_chat(&store, "c1", "me", "u2", base).await;

        let mut mine = own_text(base, "regret");
        mine.file_url = Some("https://cdn.example/old.png".to_string());
        seed_message(&store, "c1", "mine", &mine).await;

        let mut foreign = own_text(base, "hi");
        foreign.sender_id = UserId::new("u2");
        seed_message(&store, "c1", "theirs", &foreign).await;

        let (composer, mut rx) = composer(Arc::new(store.clone()));

        assert!(matches!(
            composer.delete_for_everyone(&MessageId::new("theirs")).await,
            Err(ClientError::NotMessageSender)
        ));

        composer
            .delete_for_everyone(&MessageId::new("mine"))
            .await
            .unwrap();
        let message = message_doc(&store, "mine").await;
        assert_eq!(message["isDeleted"], true);
        assert_eq!(message["text"], "");
        assert!(message["fileUrl"].is_null());
        // The row still exists and still names its sender.
        assert_eq!(message["senderId"], "me");
        assert_eq!(drain_toasts(&mut rx), vec!["Message deleted"]);
    }

    #[tokio::test]
    async fn test_delete_for_me_marks_only_me() {
        let store = MemoryStore::new();
        let base = Utc::now();
        seed_chat(&store, "c1", "me", "u2", base).await;
        let mut foreign = own_text(base, "keep for them");
        foreign.sender_id = UserId::new("u2");
        seed_message(&store, "c1", "theirs", &foreign).await;

        let (composer, mut rx) = composer(Arc::new(store.clone()));
        composer
            .delete_for_me(&MessageId::new("theirs"))
            .await
            .unwrap();

        let message = message_doc(&store, "theirs").await;
        assert_eq!(message["deletedFor"], json!(["me"]));
        assert_eq!(message["text"], "keep for them");
        assert!(message.get("isDeleted").is_none());
        assert_eq!(drain_toasts(&mut rx), vec!["Message deleted"]);
    }

    #[tokio::test]
    async fn test_reaction_toggle() {
        let store = MemoryStore::new();
        let base = Utc::now();
        seed_chat(&store, "c1", "me", "u2", base).await;
        seed_message(&store, "c1", "m1", &own_text(base, "hi")).await;

        let (composer, _rx) = composer(Arc::new(store.clone()));
        let id = MessageId::new("m1");

        composer.toggle_reaction(&id, "👍").await.unwrap();
        let message = message_doc(&store, "m1").await;
        assert_eq!(message["reactions"]["👍"], json!(["me"]));

        composer.toggle_reaction(&id, "👍").await.unwrap();
        let message = message_doc(&store, "m1").await;
        assert_eq!(message["reactions"]["👍"], json!([]));
    }

    #[tokio::test]
    async fn test_typing_debounce() {
        tokio::time::pause();
        let store = MemoryStore::new();
        seed_chat(&store, "c1", "me", "u2", Utc::now()).await;
        let (composer, _rx) = composer(Arc::new(store.clone()));

        composer.typing_pulse().await;
        assert_eq!(chat_doc(&store).await["typing"]["me"], true);

        tokio::time::advance(Duration::from_millis(TYPING_DEBOUNCE_MS + 50)).await;
        yield_a_bit().await;
        assert_eq!(chat_doc(&store).await["typing"]["me"], false);
    }

    #[tokio::test]
    async fn test_typing_pulse_extends_window() {
        tokio::time::pause();
        let store = MemoryStore::new();
        seed_chat(&store, "c1", "me", "u2", Utc::now()).await;
        let (composer, _rx) = composer(Arc::new(store.clone()));

        composer.typing_pulse().await;
        tokio::time::advance(Duration::from_millis(TYPING_DEBOUNCE_MS / 2)).await;
        yield_a_bit().await;
        composer.typing_pulse().await;

        // The first timer expires but its generation is stale.
        tokio::time::advance(Duration::from_millis(TYPING_DEBOUNCE_MS / 2 + 50)).await;
        yield_a_bit().await;
        assert_eq!(chat_doc(&store).await["typing"]["me"], true);

        tokio::time::advance(Duration::from_millis(TYPING_DEBOUNCE_MS)).await;
        yield_a_bit().await;
        assert_eq!(chat_doc(&store).await["typing"]["me"], false);
    }
}
