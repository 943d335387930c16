//! Video call signaling over the `calls` collection, plus the handoff to the
//! call transport.
//!
//! A call is one ephemeral intent document: the caller creates it with status
//! `calling`, the receiver's watcher surfaces it as long as it stays in that
//! state, and accept/decline/hang-up are status transitions. The media path
//! itself belongs entirely to the transport SDK.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use causerie_media::{mint_room_token, CallConfig, CallTransport};
use causerie_shared::constants::{CALL_STARTED_TEXT, COLLECTION_CALLS};
use causerie_shared::{CallDocument, CallId, RoomId, UserId, UserProfile};
use causerie_store::{CollectionPath, DocumentStore, Patch, Query};

use crate::compose::Composer;
use crate::error::Result;
use crate::events::EventBus;

/// A ringing call addressed to the local user.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingCall {
    pub id: CallId,
    pub call: CallDocument,
}

/// Signaling side of video calls for the signed-in user.
pub struct CallBridge {
    me: UserId,
    store: Arc<dyn DocumentStore>,
    transport: Arc<dyn CallTransport>,
    config: CallConfig,
    events: EventBus,
    incoming_tx: Arc<watch::Sender<Option<IncomingCall>>>,
    leave_tx: mpsc::Sender<RoomId>,
    watcher_task: JoinHandle<()>,
    leave_task: JoinHandle<()>,
}

impl CallBridge {
    pub fn spawn(
        store: Arc<dyn DocumentStore>,
        transport: Arc<dyn CallTransport>,
        config: CallConfig,
        me: UserId,
        events: EventBus,
    ) -> Self {
        let (incoming_tx, _) = watch::channel(None);
        let incoming_tx = Arc::new(incoming_tx);

        let watcher_task = {
            let store = Arc::clone(&store);
            let me = me.clone();
            let incoming_tx = Arc::clone(&incoming_tx);
            tokio::spawn(async move {
                watch_incoming(store, me, incoming_tx).await;
            })
        };

        // The transport's leave callback is synchronous; it hands the room
        // over a channel and this task does the async cleanup.
        let (leave_tx, mut leave_rx) = mpsc::channel::<RoomId>(4);
        let leave_task = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                while let Some(room) = leave_rx.recv().await {
                    end_room(store.as_ref(), &room).await;
                }
            })
        };

        Self {
            me,
            store,
            transport,
            config,
            events,
            incoming_tx,
            leave_tx,
            watcher_task,
            leave_task,
        }
    }

    /// Subscribe to the currently ringing incoming call, if any.
    pub fn incoming(&self) -> watch::Receiver<Option<IncomingCall>> {
        self.incoming_tx.subscribe()
    }

    /// Ring `receiver`: write the call intent, drop a call marker into the
    /// open conversation, and join the room as the caller.
    pub async fn start_call(
        &self,
        caller: &UserProfile,
        composer: &Composer,
        receiver: &UserProfile,
    ) -> Result<RoomId> {
        let room = RoomId::for_pair(&caller.uid, &receiver.uid);
        let caller_name = display_name(caller);

        let intent = Patch::new()
            .set("callerId", caller.uid.as_str())
            .set("callerName", caller_name.as_str())
            .set(
                "callerPhotoURL",
                caller.photo_url.clone().unwrap_or_default(),
            )
            .set("receiverId", receiver.uid.as_str())
            .set("roomId", room.as_str())
            .set("status", "calling")
            .server_timestamp("createdAt");

        let result = async {
            self.store
                .create(&CollectionPath::new(COLLECTION_CALLS), intent)
                .await?;

            // The marker message raises its own toast if it fails; a missed
            // marker must not cancel the ring.
            let _ = composer.send_text(CALL_STARTED_TEXT).await;

            self.join_room(&room, &caller.uid, &caller_name).await?;
            Ok(room.clone())
        }
        .await;
        match result {
            Ok(room) => {
                info!(room = room.as_str(), to = receiver.uid.short(), "Call started");
                Ok(room)
            }
            Err(e) => {
                warn!(error = %e, "Starting call failed");
                self.events.toast_error("Failed to start call");
                Err(e)
            }
        }
    }

    /// Answer a ringing call and join its room.
    pub async fn accept(&self, incoming: &IncomingCall, profile: &UserProfile) -> Result<RoomId> {
        let path = CollectionPath::new(COLLECTION_CALLS).doc(incoming.id.as_str());
        if let Err(e) = self
            .store
            .update(&path, Patch::new().set("status", "accepted"))
            .await
        {
            warn!(error = %e, call = incoming.id.as_str(), "Accepting call failed");
            return Err(e.into());
        }

        let room = incoming.call.room_id.clone();
        self.join_room(&room, &self.me, &display_name(profile)).await?;
        info!(room = room.as_str(), "Call accepted");
        Ok(room)
    }

    /// Reject a ringing call. The caller's watcher sees the status change
    /// and stops presenting the ring.
    pub async fn decline(&self, incoming: &IncomingCall) -> Result<()> {
        let path = CollectionPath::new(COLLECTION_CALLS).doc(incoming.id.as_str());
        if let Err(e) = self
            .store
            .update(&path, Patch::new().set("status", "rejected"))
            .await
        {
            warn!(error = %e, call = incoming.id.as_str(), "Declining call failed");
            return Err(e.into());
        }
        info!(call = incoming.id.as_str(), "Call declined");
        Ok(())
    }

    async fn join_room(&self, room: &RoomId, uid: &UserId, display_name: &str) -> Result<()> {
        let token = mint_room_token(&self.config, room, uid);
        let leave_tx = self.leave_tx.clone();
        let leave_room = room.clone();
        let on_leave = Box::new(move || {
            let _ = leave_tx.try_send(leave_room);
        });
        self.transport
            .join(room, &token, uid, display_name, on_leave)
            .await?;
        Ok(())
    }
}

impl Drop for CallBridge {
    fn drop(&mut self) {
        self.watcher_task.abort();
        self.leave_task.abort();
    }
}

fn display_name(profile: &UserProfile) -> String {
    if profile.username.is_empty() {
        "User".to_string()
    } else {
        profile.username.clone()
    }
}

/// Mirror the newest still-ringing call addressed to `me` into the watch
/// channel; `None` as soon as there is none.
async fn watch_incoming(
    store: Arc<dyn DocumentStore>,
    me: UserId,
    incoming_tx: Arc<watch::Sender<Option<IncomingCall>>>,
) {
    let query = Query::new(COLLECTION_CALLS)
        .where_eq("receiverId", me.as_str())
        .where_eq("status", "calling")
        .limit(1);
    let mut sub = match store.subscribe(query).await {
        Ok(sub) => sub,
        Err(e) => {
            warn!(error = %e, "Incoming call subscription failed");
            return;
        }
    };

    loop {
        let incoming = sub.current().into_iter().next().and_then(|doc| {
            match doc.decode::<CallDocument>() {
                Ok(call) => Some(IncomingCall {
                    id: CallId::new(doc.id),
                    call,
                }),
                Err(e) => {
                    warn!(error = %e, id = doc.id, "Skipping malformed call document");
                    None
                }
            }
        });
        incoming_tx.send_replace(incoming);

        if sub.changed().await.is_err() {
            break;
        }
    }
}

/// Mark the live intent for `room` ended, if one is still live.
async fn end_room(store: &dyn DocumentStore, room: &RoomId) {
    let query = Query::new(COLLECTION_CALLS)
        .where_eq("roomId", room.as_str())
        .where_in(
            "status",
            vec!["calling".into(), "accepted".into()],
        )
        .limit(1);
    let snapshot = match store.query(&query).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(error = %e, room = room.as_str(), "Ending call lookup failed");
            return;
        }
    };
    let Some(doc) = snapshot.into_iter().next() else {
        debug!(room = room.as_str(), "No live call to end");
        return;
    };
    let path = CollectionPath::new(COLLECTION_CALLS).doc(doc.id.as_str());
    if let Err(e) = store
        .update(&path, Patch::new().set("status", "ended"))
        .await
    {
        warn!(error = %e, room = room.as_str(), "Ending call failed");
    } else {
        info!(room = room.as_str(), "Call ended");
    }
}
