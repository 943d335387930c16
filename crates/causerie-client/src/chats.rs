//! Conversation list: live sync, open-or-create, archive.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use causerie_shared::constants::{
    CHAT_CREATED_PREVIEW, COLLECTION_CHATS, COLLECTION_USERS, SYSTEM_SENDER,
};
use causerie_shared::{ChatDocument, ChatId, UserId, UserProfile};
use causerie_store::{
    CollectionPath, Direction, DocumentPath, DocumentStore, Patch, Query,
};

use crate::error::Result;
use crate::events::EventBus;

/// One row of the conversation list.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSummary {
    pub id: ChatId,
    pub chat: ChatDocument,
    /// The other participant's profile, when it could be read.
    pub counterpart: Option<UserProfile>,
}

/// Live view of the caller's conversations, newest first, with chats the
/// caller archived filtered out.
pub struct ChatList {
    me: UserId,
    store: Arc<dyn DocumentStore>,
    events: EventBus,
    summaries_tx: Arc<watch::Sender<Vec<ChatSummary>>>,
    task: JoinHandle<()>,
}

impl ChatList {
    pub fn spawn(store: Arc<dyn DocumentStore>, me: UserId, events: EventBus) -> Self {
        let (summaries_tx, _) = watch::channel(Vec::new());
        let summaries_tx = Arc::new(summaries_tx);

        let task = {
            let store = Arc::clone(&store);
            let me = me.clone();
            let summaries_tx = Arc::clone(&summaries_tx);
            tokio::spawn(async move {
                let query = Query::new(COLLECTION_CHATS)
                    .where_array_contains("participants", me.as_str())
                    .order_by("updatedAt", Direction::Descending);
                let mut sub = match store.subscribe(query).await {
                    Ok(sub) => sub,
                    Err(e) => {
                        warn!(error = %e, "Chat list subscription failed");
                        return;
                    }
                };

                loop {
                    let mut summaries = Vec::new();
                    for doc in sub.current() {
                        let chat = match doc.decode::<ChatDocument>() {
                            Ok(chat) => chat,
                            Err(e) => {
                                warn!(error = %e, id = doc.id, "Skipping malformed chat");
                                continue;
                            }
                        };
                        if chat.is_archived_for(&me) {
                            continue;
                        }
                        let counterpart = match chat.counterpart(&me) {
                            Some(uid) => counterpart_profile(store.as_ref(), uid).await,
                            None => None,
                        };
                        summaries.push(ChatSummary {
                            id: ChatId::new(doc.id),
                            chat,
                            counterpart,
                        });
                    }
                    summaries_tx.send_replace(summaries);

                    if sub.changed().await.is_err() {
                        break;
                    }
                }
            })
        };

        Self {
            me,
            store,
            events,
            summaries_tx,
            task,
        }
    }

    /// Current rows.
    pub fn summaries(&self) -> Vec<ChatSummary> {
        self.summaries_tx.borrow().clone()
    }

    /// Subscribe to row updates.
    pub fn watch(&self) -> watch::Receiver<Vec<ChatSummary>> {
        self.summaries_tx.subscribe()
    }

    /// Open the conversation with `target`, creating it if none exists yet.
    ///
    /// An existing chat the caller archived is revived by clearing the
    /// archive mark; the full history comes back with it.
    pub async fn open_with(&self, target: &UserProfile) -> Result<ChatId> {
        match self.open_or_create(target).await {
            Ok(id) => Ok(id),
            Err(e) => {
                warn!(error = %e, "Opening chat failed");
                self.events.toast_error("Failed to create chat.");
                Err(e)
            }
        }
    }

    async fn open_or_create(&self, target: &UserProfile) -> Result<ChatId> {
        // Fast path: the live list already has it.
        if let Some(summary) = self
            .summaries_tx
            .borrow()
            .iter()
            .find(|summary| summary.chat.involves(&target.uid))
        {
            return Ok(summary.id.clone());
        }

        // The list excludes archived chats, so check the store directly
        // before creating a duplicate conversation.
        let snapshot = self
            .store
            .query(
                &Query::new(COLLECTION_CHATS)
                    .where_array_contains("participants", self.me.as_str()),
            )
            .await?;
        for doc in snapshot {
            let Ok(chat) = doc.decode::<ChatDocument>() else {
                continue;
            };
            if !chat.involves(&target.uid) {
                continue;
            }
            self.store
                .update(
                    &CollectionPath::new(COLLECTION_CHATS).doc(doc.id.as_str()),
                    Patch::new().array_remove("archivedIds", vec![json!(self.me.as_str())]),
                )
                .await?;
            return Ok(ChatId::new(doc.id));
        }

        let patch = Patch::new()
            .set(
                "participants",
                json!([self.me.as_str(), target.uid.as_str()]),
            )
            .set(
                "lastMessage",
                json!({
                    "text": CHAT_CREATED_PREVIEW,
                    "senderId": SYSTEM_SENDER,
                    "timestamp": Utc::now(),
                    "unreadCount": 0,
                }),
            )
            .server_timestamp("updatedAt");
        let id = self
            .store
            .create(&CollectionPath::new(COLLECTION_CHATS), patch)
            .await?;
        debug!(chat = %id, with = target.uid.short(), "Chat created");
        Ok(ChatId::new(id))
    }

    /// Hide the conversation from the caller's list. The other side keeps it,
    /// and nothing is deleted.
    pub async fn archive(&self, chat_id: &ChatId) -> Result<()> {
        let result = self
            .store
            .update(
                &CollectionPath::new(COLLECTION_CHATS).doc(chat_id.as_str()),
                Patch::new().array_union("archivedIds", vec![json!(self.me.as_str())]),
            )
            .await;
        match result {
            Ok(()) => {
                self.events.toast_success("Chat deleted");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, chat = chat_id.as_str(), "Archive failed");
                self.events.toast_error("Failed to delete chat");
                Err(e.into())
            }
        }
    }
}

impl Drop for ChatList {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn counterpart_profile(store: &dyn DocumentStore, uid: &UserId) -> Option<UserProfile> {
    let path = DocumentPath::new(COLLECTION_USERS, uid.as_str());
    match store.get(&path).await {
        Ok(Some(doc)) => match doc.decode::<UserProfile>() {
            Ok(profile) => Some(profile),
            Err(e) => {
                debug!(error = %e, uid = uid.short(), "Counterpart profile malformed");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            debug!(error = %e, uid = uid.short(), "Counterpart profile read failed");
            None
        }
    }
}
