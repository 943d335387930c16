//! Session lifecycle: auth identity, live profile, presence heartbeat.
//!
//! The embedding shell owns the actual auth provider. It reports sign-in and
//! sign-out here; everything downstream (profile hydration, presence, routing)
//! keys off the [`SessionState`] watch channel this module publishes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use causerie_shared::constants::{COLLECTION_USERS, HEARTBEAT_INTERVAL_SECS};
use causerie_shared::{UserId, UserProfile};
use causerie_store::{DocumentPath, DocumentStore, Patch};
use serde::{Deserialize, Serialize};

use crate::events::ViewState;

/// Identity as reported by the auth provider, before any profile exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub uid: UserId,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "photoURL", default)]
    pub photo_url: Option<String>,
}

/// What the rest of the client knows about the current session.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    /// Auth provider has not reported yet.
    #[default]
    Loading,
    SignedOut,
    /// Signed in; `profile` stays `None` until first-run setup completes.
    SignedIn {
        user: AuthUser,
        profile: Option<UserProfile>,
    },
}

impl SessionState {
    pub fn user(&self) -> Option<&AuthUser> {
        match self {
            Self::SignedIn { user, .. } => Some(user),
            _ => None,
        }
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        match self {
            Self::SignedIn { profile, .. } => profile.as_ref(),
            _ => None,
        }
    }

    pub fn uid(&self) -> Option<&UserId> {
        self.user().map(|user| &user.uid)
    }
}

/// Drives [`SessionState`] from auth callbacks.
///
/// On sign-in two background tasks start: one mirrors `users/{uid}` into the
/// state channel, one stamps the `lastSeen` presence heartbeat. Both stop on
/// sign-out.
pub struct SessionManager {
    store: Arc<dyn DocumentStore>,
    state_tx: Arc<watch::Sender<SessionState>>,
    view_rx: watch::Receiver<ViewState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn DocumentStore>, view_rx: watch::Receiver<ViewState>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::default());
        Self {
            store,
            state_tx: Arc::new(state_tx),
            view_rx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to state updates.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Auth provider reported a signed-in user.
    pub fn signed_in(&self, user: AuthUser) {
        info!(uid = user.uid.short(), "Signed in");
        let profile_task = self.spawn_profile_task(user.clone());
        let heartbeat_task = self.spawn_heartbeat_task(user.uid.clone());
        self.replace_tasks(vec![profile_task, heartbeat_task]);
    }

    /// Auth provider reported sign-out (or the session expired).
    pub fn signed_out(&self) {
        info!("Signed out");
        self.replace_tasks(Vec::new());
        self.state_tx.send_replace(SessionState::SignedOut);
    }

    fn replace_tasks(&self, new_tasks: Vec<JoinHandle<()>>) {
        let old = match self.tasks.lock() {
            Ok(mut guard) => std::mem::replace(&mut *guard, new_tasks),
            Err(_) => return,
        };
        for task in old {
            task.abort();
        }
    }

    /// Mirror `users/{uid}` into the state channel. A missing document is a
    /// first run: the state is `SignedIn` with no profile, which routes to
    /// profile setup.
    fn spawn_profile_task(&self, user: AuthUser) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let state_tx = Arc::clone(&self.state_tx);
        tokio::spawn(async move {
            let path = DocumentPath::new(COLLECTION_USERS, user.uid.as_str());
            let mut sub = match store.subscribe_doc(&path).await {
                Ok(sub) => sub,
                Err(e) => {
                    warn!(error = %e, uid = user.uid.short(), "Profile subscription failed");
                    return;
                }
            };

            loop {
                let profile = sub.current().and_then(|doc| match doc.decode::<UserProfile>() {
                    Ok(profile) => Some(profile),
                    Err(e) => {
                        warn!(error = %e, "Ignoring malformed profile document");
                        None
                    }
                });

                // Old accounts predate the avatar field; copy the auth
                // provider's photo over once so both render the same face.
                if let Some(profile) = &profile {
                    if profile.photo_url.is_none() {
                        if let Some(url) = user.photo_url.clone() {
                            let store = Arc::clone(&store);
                            let path = path.clone();
                            tokio::spawn(async move {
                                if let Err(e) =
                                    store.update(&path, Patch::new().set("photoURL", url)).await
                                {
                                    debug!(error = %e, "Avatar backfill failed");
                                }
                            });
                        }
                    }
                }

                state_tx.send_replace(SessionState::SignedIn {
                    user: user.clone(),
                    profile,
                });

                if sub.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Stamp `lastSeen` on an interval, plus once whenever the window comes
    /// back to the foreground. Uses `update` so a heartbeat can never create
    /// the profile document before setup ran.
    fn spawn_heartbeat_task(&self, uid: UserId) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let mut view_rx = self.view_rx.clone();
        tokio::spawn(async move {
            let path = DocumentPath::new(COLLECTION_USERS, uid.as_str());
            let mut ticker =
                tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
            let mut foreground = view_rx.borrow().foreground();

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        beat(store.as_ref(), &path).await;
                    }
                    changed = view_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let now_foreground = view_rx.borrow_and_update().foreground();
                        if now_foreground && !foreground {
                            beat(store.as_ref(), &path).await;
                        }
                        foreground = now_foreground;
                    }
                }
            }
        })
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.replace_tasks(Vec::new());
    }
}

async fn beat(store: &dyn DocumentStore, path: &DocumentPath) {
    if let Err(e) = store
        .update(path, Patch::new().server_timestamp("lastSeen"))
        .await
    {
        // Expected before first-run setup; the document does not exist yet.
        debug!(error = %e, "Presence heartbeat skipped");
    }
}
