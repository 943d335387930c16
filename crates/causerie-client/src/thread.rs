//! One open conversation: live messages, counterpart presence, read
//! receipts, per-user clear.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use causerie_shared::constants::{COLLECTION_CHATS, COLLECTION_USERS, SUBCOLLECTION_MESSAGES};
use causerie_shared::{
    ChatDocument, ChatId, MessageDocument, MessageId, UserId, UserProfile,
};
use causerie_store::{
    CollectionPath, Direction, DocSubscription, DocumentPath, DocumentStore, Patch, Query,
    WriteBatch,
};

use crate::error::Result;
use crate::events::EventBus;

/// A message row plus its document id.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadMessage {
    pub id: MessageId,
    pub message: MessageDocument,
}

/// Everything the thread screen renders, derived from three live
/// subscriptions (chat document, message subcollection, counterpart profile).
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadView {
    pub chat_id: ChatId,
    pub chat: Option<ChatDocument>,
    pub counterpart: Option<UserProfile>,
    /// Oldest first, already filtered for the caller (clear cutoff and
    /// delete-for-me applied; tombstones and legacy rows stay).
    pub messages: Vec<ThreadMessage>,
    /// True only while the counterpart both flagged typing and looks online.
    pub counterpart_typing: bool,
}

impl ThreadView {
    fn empty(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            chat: None,
            counterpart: None,
            messages: Vec::new(),
            counterpart_typing: false,
        }
    }
}

/// Live sync for one open conversation.
///
/// While this exists, foreign unread messages are marked read, so callers
/// should only keep it alive while the thread is actually on screen.
pub struct ThreadSync {
    me: UserId,
    chat_id: ChatId,
    store: Arc<dyn DocumentStore>,
    events: EventBus,
    view_tx: Arc<watch::Sender<ThreadView>>,
    task: JoinHandle<()>,
}

impl ThreadSync {
    pub fn spawn(
        store: Arc<dyn DocumentStore>,
        me: UserId,
        chat_id: ChatId,
        events: EventBus,
    ) -> Self {
        let (view_tx, _) = watch::channel(ThreadView::empty(chat_id.clone()));
        let view_tx = Arc::new(view_tx);

        let task = {
            let store = Arc::clone(&store);
            let me = me.clone();
            let chat_id = chat_id.clone();
            let view_tx = Arc::clone(&view_tx);
            tokio::spawn(async move {
                run_sync(store, me, chat_id, view_tx).await;
            })
        };

        Self {
            me,
            chat_id,
            store,
            events,
            view_tx,
            task,
        }
    }

    /// Current view.
    pub fn view(&self) -> ThreadView {
        self.view_tx.borrow().clone()
    }

    /// Subscribe to view updates.
    pub fn watch(&self) -> watch::Receiver<ThreadView> {
        self.view_tx.subscribe()
    }

    /// Hide the history so far for the caller only. Writes a per-user cutoff
    /// on the chat; nothing is deleted and the other side sees everything.
    pub async fn clear(&self) -> Result<()> {
        let path = CollectionPath::new(COLLECTION_CHATS).doc(self.chat_id.as_str());
        let field = format!("clearedAt.{}", self.me.as_str());
        match self
            .store
            .update(&path, Patch::new().server_timestamp(field))
            .await
        {
            Ok(()) => {
                self.events.toast_success("Chat cleared");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, chat = self.chat_id.as_str(), "Clear chat failed");
                Err(e.into())
            }
        }
    }
}

impl Drop for ThreadSync {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_sync(
    store: Arc<dyn DocumentStore>,
    me: UserId,
    chat_id: ChatId,
    view_tx: Arc<watch::Sender<ThreadView>>,
) {
    let chat_path = CollectionPath::new(COLLECTION_CHATS).doc(chat_id.as_str());
    let messages_path = chat_path.subcollection(SUBCOLLECTION_MESSAGES);

    let mut chat_sub = match store.subscribe_doc(&chat_path).await {
        Ok(sub) => sub,
        Err(e) => {
            warn!(error = %e, chat = chat_id.as_str(), "Chat subscription failed");
            return;
        }
    };
    let query = Query::new(messages_path.clone()).order_by("timestamp", Direction::Ascending);
    let mut msg_sub = match store.subscribe(query).await {
        Ok(sub) => sub,
        Err(e) => {
            warn!(error = %e, chat = chat_id.as_str(), "Message subscription failed");
            return;
        }
    };
    let mut counterpart_sub: Option<DocSubscription> = None;

    loop {
        let chat = chat_sub.current().and_then(|doc| {
            match doc.decode::<ChatDocument>() {
                Ok(chat) => Some(chat),
                Err(e) => {
                    warn!(error = %e, "Ignoring malformed chat document");
                    None
                }
            }
        });

        // The counterpart is only known once the chat document arrives.
        if counterpart_sub.is_none() {
            if let Some(uid) = chat.as_ref().and_then(|chat| chat.counterpart(&me)) {
                let path = DocumentPath::new(COLLECTION_USERS, uid.as_str());
                match store.subscribe_doc(&path).await {
                    Ok(sub) => counterpart_sub = Some(sub),
                    Err(e) => {
                        warn!(error = %e, uid = uid.short(), "Counterpart subscription failed");
                    }
                }
            }
        }
        let counterpart = counterpart_sub
            .as_mut()
            .and_then(|sub| sub.current())
            .and_then(|doc| doc.decode::<UserProfile>().ok());

        let mut decoded = Vec::new();
        for doc in msg_sub.current() {
            match doc.decode::<MessageDocument>() {
                Ok(message) => decoded.push(ThreadMessage {
                    id: MessageId::new(doc.id),
                    message,
                }),
                Err(e) => warn!(error = %e, id = doc.id, "Skipping malformed message"),
            }
        }

        mark_read(store.as_ref(), &messages_path, &me, &decoded).await;

        let cutoff = chat.as_ref().and_then(|chat| chat.cleared_cutoff(&me));
        let messages: Vec<ThreadMessage> = decoded
            .into_iter()
            .filter(|entry| entry.message.visible_to(&me, cutoff))
            .collect();

        let counterpart_typing = match (&chat, &counterpart) {
            (Some(chat), Some(profile)) => {
                chat.is_typing(&profile.uid) && profile.is_online(Utc::now())
            }
            _ => false,
        };

        view_tx.send_replace(ThreadView {
            chat_id: chat_id.clone(),
            chat,
            counterpart,
            messages,
            counterpart_typing,
        });

        tokio::select! {
            changed = chat_sub.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = msg_sub.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = async {
                match counterpart_sub.as_mut() {
                    Some(sub) => sub.changed().await,
                    None => std::future::pending().await,
                }
            } => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

/// Flag every foreign unread message as read, in one batch. Re-entrant: the
/// resulting snapshot has nothing left to flag.
async fn mark_read(
    store: &dyn DocumentStore,
    messages_path: &CollectionPath,
    me: &UserId,
    decoded: &[ThreadMessage],
) {
    let mut batch = WriteBatch::new();
    for entry in decoded {
        if entry.message.sender_id != *me && !entry.message.is_read() {
            batch.update(
                messages_path.doc(entry.id.as_str()),
                Patch::new().set("status", "read"),
            );
        }
    }
    if batch.is_empty() {
        return;
    }
    debug!(count = batch.len(), "Marking messages read");
    if let Err(e) = store.commit(batch).await {
        debug!(error = %e, "Read receipt batch failed");
    }
}
