//! # causerie-client
//!
//! The client core of Causerie: session lifecycle, contact discovery,
//! conversation and thread sync, message mutations, notification dispatch,
//! and video-call signaling, all against the pluggable store and media
//! boundaries.
//!
//! [`Client`] wires the services together for an embedding shell. Each
//! service also stands on its own; the shell only ever holds handles and
//! drains the [`ClientEvent`] channel.

pub mod calls;
pub mod chats;
pub mod compose;
pub mod config;
pub mod events;
pub mod notify;
pub mod profile;
pub mod router;
pub mod session;
pub mod thread;

mod error;

#[cfg(test)]
mod testutil;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use causerie_media::{AssetUploader, CallTransport, CuePlayer};
use causerie_shared::{ChatId, UserId};
use causerie_store::DocumentStore;

pub use calls::{CallBridge, IncomingCall};
pub use chats::{ChatList, ChatSummary};
pub use compose::Composer;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use events::{ClientEvent, EventBus, Toast, ToastKind, ViewState};
pub use notify::{NotificationDispatcher, SystemNotification, SystemNotifier};
pub use profile::ProfileService;
pub use router::Route;
pub use session::{AuthUser, SessionManager, SessionState};
pub use thread::{ThreadMessage, ThreadSync, ThreadView};

/// Events queued beyond this are dropped (and logged) instead of blocking
/// a sync task on a stalled shell.
const EVENT_QUEUE_DEPTH: usize = 64;

/// Install the tracing subscriber for an embedding shell.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("causerie_client=debug,causerie_store=info,causerie_media=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Everything an embedding shell needs, behind one handle.
///
/// The shell constructs the store, uploader and transport for its platform,
/// relays auth callbacks into [`Client::session`], reports window state via
/// [`Client::report_view`], and renders the events coming out of the
/// receiver returned by [`Client::new`]. Services that act on behalf of the
/// signed-in user fail with [`ClientError::SignedOut`] until the session
/// reports one.
pub struct Client {
    config: ClientConfig,
    store: Arc<dyn DocumentStore>,
    uploader: Arc<dyn AssetUploader>,
    transport: Arc<dyn CallTransport>,
    events: EventBus,
    view_tx: watch::Sender<ViewState>,
    session: SessionManager,
}

impl Client {
    pub fn new(
        config: ClientConfig,
        store: Arc<dyn DocumentStore>,
        uploader: Arc<dyn AssetUploader>,
        transport: Arc<dyn CallTransport>,
    ) -> (Self, mpsc::Receiver<ClientEvent>) {
        let (events, events_rx) = EventBus::new(EVENT_QUEUE_DEPTH);
        let (view_tx, view_rx) = watch::channel(ViewState::default());
        let session = SessionManager::new(Arc::clone(&store), view_rx);
        info!(calls_enabled = config.calls_enabled(), "Client core ready");

        let client = Self {
            config,
            store,
            uploader,
            transport,
            events,
            view_tx,
            session,
        };
        (client, events_rx)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Auth callbacks land here; everything else watches its state channel.
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// A clone of the outbound event channel, for services built elsewhere.
    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    /// The shell reports focus, visibility and the open conversation here.
    pub fn report_view(&self, view: ViewState) {
        self.view_tx.send_replace(view);
    }

    /// Profile setup, edits and contact search.
    pub fn profiles(&self) -> ProfileService {
        ProfileService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.uploader),
            self.events.clone(),
        )
    }

    /// Live conversation list for the signed-in user.
    pub fn chat_list(&self) -> Result<ChatList> {
        let me = self.current_uid()?;
        Ok(ChatList::spawn(
            Arc::clone(&self.store),
            me,
            self.events.clone(),
        ))
    }

    /// Open one conversation: its live view plus a composer bound to it.
    pub fn open_thread(&self, chat_id: ChatId) -> Result<(ThreadSync, Composer)> {
        let me = self.current_uid()?;
        let sync = ThreadSync::spawn(
            Arc::clone(&self.store),
            me.clone(),
            chat_id.clone(),
            self.events.clone(),
        );
        let composer = Composer::new(
            Arc::clone(&self.store),
            Arc::clone(&self.uploader),
            me,
            chat_id,
            self.events.clone(),
        );
        Ok((sync, composer))
    }

    /// Call signaling for the signed-in user.
    pub fn call_bridge(&self) -> Result<CallBridge> {
        let me = self.current_uid()?;
        Ok(CallBridge::spawn(
            Arc::clone(&self.store),
            Arc::clone(&self.transport),
            self.config.call(),
            me,
            self.events.clone(),
        ))
    }

    /// Start the notification dispatcher over an existing list and bridge.
    pub fn notifications(
        &self,
        chats: &ChatList,
        calls: &CallBridge,
        notifier: Arc<dyn SystemNotifier>,
        cues: Arc<dyn CuePlayer>,
    ) -> Result<NotificationDispatcher> {
        let me = self.current_uid()?;
        Ok(NotificationDispatcher::spawn(
            me,
            chats.watch(),
            calls.incoming(),
            self.view_tx.subscribe(),
            notifier,
            cues,
            self.events.clone(),
        ))
    }

    fn current_uid(&self) -> Result<UserId> {
        self.session
            .state()
            .uid()
            .cloned()
            .ok_or(ClientError::SignedOut)
    }
}
