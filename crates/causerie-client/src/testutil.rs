//! Fixtures and recording fakes shared by the crate's tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use causerie_media::{
    AssetUploader, CallTransport, Cue, CuePlayer, LeaveCallback, MediaError, RoomToken,
    UploadedAsset,
};
use causerie_shared::constants::{
    AVATAR_EMOJIS, COLLECTION_CALLS, COLLECTION_CHATS, COLLECTION_USERS, DEFAULT_ABOUT,
    SUBCOLLECTION_MESSAGES,
};
use causerie_shared::validation::search_keywords;
use causerie_shared::{
    CallDocument, CallId, CallStatus, ChatDocument, ChatId, LastMessage, MessageDocument,
    MessageKind, RoomId, UserId, UserProfile,
};
use causerie_store::{
    CollectionPath, DocSnapshot, DocSubscription, DocumentPath, DocumentStore, MemoryStore, Patch,
    Query, QuerySnapshot, QuerySubscription, StoreError, WriteBatch,
};

use crate::calls::IncomingCall;
use crate::chats::ChatSummary;
use crate::events::ClientEvent;
use crate::notify::{SystemNotification, SystemNotifier};
use crate::session::AuthUser;

type StoreResult<T> = causerie_store::Result<T>;
type MediaResult<T> = causerie_media::Result<T>;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub(crate) fn test_profile(uid: &str, username: &str) -> UserProfile {
    UserProfile {
        uid: UserId::new(uid),
        display_name: username.to_string(),
        email: None,
        photo_url: None,
        phone_number: "123456".to_string(),
        username: username.to_string(),
        about: DEFAULT_ABOUT.to_string(),
        search_keywords: search_keywords(username),
        emoji: AVATAR_EMOJIS[0].to_string(),
        created_at: Some(Utc::now()),
        last_seen: None,
    }
}

pub(crate) fn auth_user(uid: &str) -> AuthUser {
    AuthUser {
        uid: UserId::new(uid),
        display_name: None,
        email: None,
        photo_url: None,
    }
}

/// A conversation-list row whose latest message says "hello" from `sender`
/// at `ts`, with counterpart "ada".
pub(crate) fn summary_with_message(chat_id: &str, sender: &str, ts: DateTime<Utc>) -> ChatSummary {
    ChatSummary {
        id: ChatId::new(chat_id),
        chat: ChatDocument {
            participants: vec![UserId::new("me"), UserId::new("u2")],
            last_message: Some(LastMessage {
                text: "hello".to_string(),
                sender_id: UserId::new(sender),
                timestamp: Some(ts),
                unread_count: 0,
                kind: Some(MessageKind::Text),
            }),
            updated_at: Some(ts),
            ..Default::default()
        },
        counterpart: Some(test_profile("u2", "ada")),
    }
}

/// A ringing call from "ada" without touching any store.
pub(crate) fn test_call(id: &str, caller: &str, receiver: &str) -> IncomingCall {
    IncomingCall {
        id: CallId::new(id),
        call: CallDocument {
            caller_id: UserId::new(caller),
            caller_name: "ada".to_string(),
            caller_photo_url: None,
            receiver_id: UserId::new(receiver),
            room_id: RoomId::for_pair(&UserId::new(caller), &UserId::new(receiver)),
            status: CallStatus::Calling,
            created_at: Some(Utc::now()),
        },
    }
}

// ---------------------------------------------------------------------------
// Seeding
// ---------------------------------------------------------------------------

pub(crate) async fn seed_profile(store: &MemoryStore, profile: &UserProfile) {
    store
        .set(
            &DocumentPath::new(COLLECTION_USERS, profile.uid.as_str()),
            Patch::from_value(serde_json::to_value(profile).unwrap()),
        )
        .await
        .unwrap();
}

pub(crate) async fn seed_chat(
    store: &MemoryStore,
    id: &str,
    a: &str,
    b: &str,
    updated_at: DateTime<Utc>,
) {
    let chat = ChatDocument {
        participants: vec![UserId::new(a), UserId::new(b)],
        updated_at: Some(updated_at),
        ..Default::default()
    };
    store
        .set(
            &CollectionPath::new(COLLECTION_CHATS).doc(id),
            Patch::from_value(serde_json::to_value(&chat).unwrap()),
        )
        .await
        .unwrap();
}

pub(crate) async fn seed_message(
    store: &MemoryStore,
    chat_id: &str,
    message_id: &str,
    message: &MessageDocument,
) {
    store
        .set(
            &CollectionPath::new(COLLECTION_CHATS)
                .doc(chat_id)
                .subcollection(SUBCOLLECTION_MESSAGES)
                .doc(message_id),
            Patch::from_value(serde_json::to_value(message).unwrap()),
        )
        .await
        .unwrap();
}

/// Write a call intent the way a remote caller would and return its id.
pub(crate) async fn seed_call(
    store: &MemoryStore,
    caller: &str,
    receiver: &str,
    status: CallStatus,
) -> CallId {
    let call = CallDocument {
        caller_id: UserId::new(caller),
        caller_name: caller.to_string(),
        caller_photo_url: None,
        receiver_id: UserId::new(receiver),
        room_id: RoomId::for_pair(&UserId::new(caller), &UserId::new(receiver)),
        status,
        created_at: Some(Utc::now()),
    };
    let id = store
        .create(
            &CollectionPath::new(COLLECTION_CALLS),
            Patch::from_value(serde_json::to_value(&call).unwrap()),
        )
        .await
        .unwrap();
    CallId::new(id)
}

// ---------------------------------------------------------------------------
// Event draining
// ---------------------------------------------------------------------------

pub(crate) fn drain_events(rx: &mut mpsc::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// The messages of every toast queued so far, in emit order.
pub(crate) fn drain_toasts(rx: &mut mpsc::Receiver<ClientEvent>) -> Vec<String> {
    drain_events(rx)
        .into_iter()
        .filter_map(|event| match event {
            ClientEvent::Toast(toast) => Some(toast.message),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Failing store
// ---------------------------------------------------------------------------

/// Wraps a [`MemoryStore`] and rejects every write until [`heal`] is called.
/// Reads and subscriptions always pass through.
///
/// [`heal`]: FailingStore::heal
pub(crate) struct FailingStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
}

impl FailingStore {
    pub(crate) fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(true),
        }
    }

    pub(crate) fn heal(&self) {
        self.fail_writes.store(false, Ordering::SeqCst);
    }

    fn gate(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Backend("injected write failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for FailingStore {
    async fn get(&self, path: &DocumentPath) -> StoreResult<DocSnapshot> {
        self.inner.get(path).await
    }

    async fn create(&self, collection: &CollectionPath, patch: Patch) -> StoreResult<String> {
        self.gate()?;
        self.inner.create(collection, patch).await
    }

    async fn set(&self, path: &DocumentPath, patch: Patch) -> StoreResult<()> {
        self.gate()?;
        self.inner.set(path, patch).await
    }

    async fn merge(&self, path: &DocumentPath, patch: Patch) -> StoreResult<()> {
        self.gate()?;
        self.inner.merge(path, patch).await
    }

    async fn update(&self, path: &DocumentPath, patch: Patch) -> StoreResult<()> {
        self.gate()?;
        self.inner.update(path, patch).await
    }

    async fn delete(&self, path: &DocumentPath) -> StoreResult<()> {
        self.gate()?;
        self.inner.delete(path).await
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        self.gate()?;
        self.inner.commit(batch).await
    }

    async fn query(&self, query: &Query) -> StoreResult<QuerySnapshot> {
        self.inner.query(query).await
    }

    async fn subscribe_doc(&self, path: &DocumentPath) -> StoreResult<DocSubscription> {
        self.inner.subscribe_doc(path).await
    }

    async fn subscribe(&self, query: Query) -> StoreResult<QuerySubscription> {
        self.inner.subscribe(query).await
    }
}

// ---------------------------------------------------------------------------
// Media fakes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub(crate) struct UploadRecord {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

/// Records uploads and answers every one with the same canned URL.
pub(crate) struct RecordingUploader {
    url: String,
    uploads: Mutex<Vec<UploadRecord>>,
}

impl RecordingUploader {
    pub(crate) fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn uploads(&self) -> Vec<UploadRecord> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetUploader for RecordingUploader {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        mime_type: &str,
    ) -> MediaResult<UploadedAsset> {
        self.uploads.lock().unwrap().push(UploadRecord {
            bytes,
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
        });
        Ok(UploadedAsset {
            secure_url: self.url.clone(),
            public_id: "test-asset".to_string(),
            resource_type: "auto".to_string(),
            format: None,
            original_filename: None,
        })
    }
}

pub(crate) struct FailingUploader;

#[async_trait]
impl AssetUploader for FailingUploader {
    async fn upload(
        &self,
        _bytes: Vec<u8>,
        _file_name: &str,
        _mime_type: &str,
    ) -> MediaResult<UploadedAsset> {
        Err(MediaError::UploadRejected("injected".to_string()))
    }
}

#[derive(Clone)]
pub(crate) struct JoinRecord {
    pub room: RoomId,
    pub token: RoomToken,
    pub uid: UserId,
    pub display_name: String,
}

/// Accepts every join, remembers it, and keeps the leave callback so a test
/// can simulate the in-call hang-up.
pub(crate) struct FakeTransport {
    joins: Mutex<Vec<JoinRecord>>,
    on_leave: Mutex<Option<LeaveCallback>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self {
            joins: Mutex::new(Vec::new()),
            on_leave: Mutex::new(None),
        }
    }

    pub(crate) fn joins(&self) -> Vec<JoinRecord> {
        self.joins.lock().unwrap().clone()
    }

    /// Invoke the most recent join's leave callback, as the SDK would when
    /// the user hangs up.
    pub(crate) fn fire_leave(&self) {
        if let Some(callback) = self.on_leave.lock().unwrap().take() {
            callback();
        }
    }
}

#[async_trait]
impl CallTransport for FakeTransport {
    async fn join(
        &self,
        room: &RoomId,
        token: &RoomToken,
        uid: &UserId,
        display_name: &str,
        on_leave: LeaveCallback,
    ) -> MediaResult<()> {
        self.joins.lock().unwrap().push(JoinRecord {
            room: room.clone(),
            token: token.clone(),
            uid: uid.clone(),
            display_name: display_name.to_string(),
        });
        *self.on_leave.lock().unwrap() = Some(on_leave);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CueEvent {
    Once(Cue, f32),
    Loop(Cue),
    Stop,
}

pub(crate) struct RecordingCues {
    log: Mutex<Vec<CueEvent>>,
}

impl RecordingCues {
    pub(crate) fn new() -> Self {
        Self {
            log: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn log(&self) -> Vec<CueEvent> {
        self.log.lock().unwrap().clone()
    }
}

impl CuePlayer for RecordingCues {
    fn play_once(&self, cue: Cue, volume: f32) {
        self.log.lock().unwrap().push(CueEvent::Once(cue, volume));
    }

    fn play_looping(&self, cue: Cue) {
        self.log.lock().unwrap().push(CueEvent::Loop(cue));
    }

    fn stop(&self) {
        self.log.lock().unwrap().push(CueEvent::Stop);
    }
}

pub(crate) struct RecordingNotifier {
    permission_requests: AtomicUsize,
    notifications: Mutex<Vec<SystemNotification>>,
}

impl RecordingNotifier {
    pub(crate) fn new() -> Self {
        Self {
            permission_requests: AtomicUsize::new(0),
            notifications: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn permission_requests(&self) -> usize {
        self.permission_requests.load(Ordering::SeqCst)
    }

    pub(crate) fn notifications(&self) -> Vec<SystemNotification> {
        self.notifications.lock().unwrap().clone()
    }
}

impl SystemNotifier for RecordingNotifier {
    fn request_permission(&self) {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
    }

    fn notify(&self, notification: &SystemNotification) {
        self.notifications.lock().unwrap().push(notification.clone());
    }
}
