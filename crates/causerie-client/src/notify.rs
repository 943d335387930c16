//! Notification dispatch: sound cues, info toasts and system notifications
//! for new messages and incoming calls.
//!
//! Nothing here reads the store directly; the dispatcher observes the same
//! watch channels the screens render from and reacts to their transitions.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use causerie_media::{Cue, CuePlayer};
use causerie_shared::constants::MESSAGE_ALERT_VOLUME;
use causerie_shared::{CallId, ChatId, UserId};

use crate::calls::IncomingCall;
use crate::chats::ChatSummary;
use crate::events::{EventBus, ViewState};

/// A request to the platform notification surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemNotification {
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    /// Platform de-duplication key.
    pub tag: String,
    /// Keep the notification on screen until the user acts on it.
    pub require_interaction: bool,
    /// Conversation to focus when the notification is activated.
    pub chat_id: Option<ChatId>,
}

/// Platform notification surface. The embedding shell implements this over
/// whatever the OS offers; tests record the calls.
pub trait SystemNotifier: Send + Sync {
    /// Ask the platform for permission to notify. Called once at startup.
    fn request_permission(&self);

    fn notify(&self, notification: &SystemNotification);
}

/// Watches the conversation list and the incoming-call channel and turns
/// their transitions into cues, toasts and system notifications.
///
/// Message alerts fire only on a summary whose stamp moved past a previously
/// seen one, so the initial snapshot after startup stays silent.
pub struct NotificationDispatcher {
    task: JoinHandle<()>,
}

impl NotificationDispatcher {
    pub fn spawn(
        me: UserId,
        chats_rx: watch::Receiver<Vec<ChatSummary>>,
        incoming_rx: watch::Receiver<Option<IncomingCall>>,
        view_rx: watch::Receiver<ViewState>,
        notifier: Arc<dyn SystemNotifier>,
        cues: Arc<dyn CuePlayer>,
        events: EventBus,
    ) -> Self {
        let task = tokio::spawn(async move {
            run_dispatch(me, chats_rx, incoming_rx, view_rx, notifier, cues, events).await;
        });
        Self { task }
    }
}

impl Drop for NotificationDispatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_dispatch(
    me: UserId,
    mut chats_rx: watch::Receiver<Vec<ChatSummary>>,
    mut incoming_rx: watch::Receiver<Option<IncomingCall>>,
    view_rx: watch::Receiver<ViewState>,
    notifier: Arc<dyn SystemNotifier>,
    cues: Arc<dyn CuePlayer>,
    events: EventBus,
) {
    notifier.request_permission();

    let mut seen_stamps: HashMap<ChatId, DateTime<Utc>> = HashMap::new();
    let mut ringing: Option<CallId> = None;

    loop {
        let summaries = chats_rx.borrow_and_update().clone();
        let view = view_rx.borrow().clone();
        handle_messages(
            &me,
            &summaries,
            &view,
            &mut seen_stamps,
            notifier.as_ref(),
            cues.as_ref(),
            &events,
        );

        let incoming = incoming_rx.borrow_and_update().clone();
        handle_call(
            incoming,
            &view,
            &mut ringing,
            notifier.as_ref(),
            cues.as_ref(),
        );

        tokio::select! {
            changed = chats_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = incoming_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

fn handle_messages(
    me: &UserId,
    summaries: &[ChatSummary],
    view: &ViewState,
    seen_stamps: &mut HashMap<ChatId, DateTime<Utc>>,
    notifier: &dyn SystemNotifier,
    cues: &dyn CuePlayer,
    events: &EventBus,
) {
    for summary in summaries {
        let Some(last) = &summary.chat.last_message else {
            continue;
        };
        let Some(stamp) = last.timestamp else {
            continue;
        };

        let fresh = match seen_stamps.get(&summary.id) {
            Some(seen) => stamp > *seen,
            // First sighting is the baseline, never an alert.
            None => false,
        };
        seen_stamps.insert(summary.id.clone(), stamp);

        if !fresh || last.sender_id == *me {
            continue;
        }
        let viewing =
            view.foreground() && view.active_chat.as_ref() == Some(&summary.id);
        if viewing {
            continue;
        }

        let name = sender_name(summary);
        debug!(chat = summary.id.as_str(), from = %name, "New message alert");
        cues.play_once(Cue::MessageAlert, MESSAGE_ALERT_VOLUME);
        events.toast_info(format!("New message from {name}"));

        if !view.foreground() {
            notifier.notify(&SystemNotification {
                title: format!("New message from {name}"),
                body: last.text.clone(),
                icon: summary
                    .counterpart
                    .as_ref()
                    .and_then(|profile| profile.photo_url.clone()),
                tag: "new-message".to_string(),
                require_interaction: false,
                chat_id: Some(summary.id.clone()),
            });
        }
    }
}

fn handle_call(
    incoming: Option<IncomingCall>,
    view: &ViewState,
    ringing: &mut Option<CallId>,
    notifier: &dyn SystemNotifier,
    cues: &dyn CuePlayer,
) {
    match incoming {
        Some(call) => {
            if ringing.as_ref() == Some(&call.id) {
                return;
            }
            *ringing = Some(call.id.clone());
            debug!(call = call.id.as_str(), "Incoming call, ringing");
            cues.play_looping(Cue::Ringtone);

            if !view.foreground() {
                notifier.notify(&SystemNotification {
                    title: "Incoming Video Call".to_string(),
                    body: format!("{} is calling you...", call.call.caller_name),
                    icon: call.call.caller_photo_url.clone(),
                    tag: "incoming-call".to_string(),
                    require_interaction: true,
                    chat_id: None,
                });
            }
        }
        None => {
            if ringing.take().is_some() {
                debug!("Ring stopped");
                cues.stop();
            }
        }
    }
}

fn sender_name(summary: &ChatSummary) -> String {
    summary
        .counterpart
        .as_ref()
        .map(|profile| profile.username.clone())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "User".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        drain_events, summary_with_message, test_call, CueEvent, RecordingCues, RecordingNotifier,
    };
    use crate::events::{ClientEvent, Toast};
    use chrono::Duration;

    struct Harness {
        chats_tx: watch::Sender<Vec<ChatSummary>>,
        incoming_tx: watch::Sender<Option<IncomingCall>>,
        view_tx: watch::Sender<ViewState>,
        notifier: Arc<RecordingNotifier>,
        cues: Arc<RecordingCues>,
        events_rx: tokio::sync::mpsc::Receiver<ClientEvent>,
        _dispatcher: NotificationDispatcher,
    }

    fn harness() -> Harness {
        let (chats_tx, chats_rx) = watch::channel(Vec::new());
        let (incoming_tx, incoming_rx) = watch::channel(None);
        let (view_tx, view_rx) = watch::channel(ViewState::default());
        let notifier = Arc::new(RecordingNotifier::new());
        let cues = Arc::new(RecordingCues::new());
        let (events, events_rx) = EventBus::new(32);
        let dispatcher = NotificationDispatcher::spawn(
            UserId::new("me"),
            chats_rx,
            incoming_rx,
            view_rx,
            notifier.clone(),
            cues.clone(),
            events,
        );
        Harness {
            chats_tx,
            incoming_tx,
            view_tx,
            notifier,
            cues,
            events_rx,
            _dispatcher: dispatcher,
        }
    }

    async fn yield_a_bit() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_fresh_foreign_message_alerts() {
        let mut h = harness();
        let base = Utc::now();

        h.chats_tx
            .send_replace(vec![summary_with_message("c1", "u2", base)]);
        yield_a_bit().await;
        // Baseline snapshot: silence.
        assert!(h.cues.log().is_empty());

        h.chats_tx.send_replace(vec![summary_with_message(
            "c1",
            "u2",
            base + Duration::seconds(3),
        )]);
        yield_a_bit().await;

        assert_eq!(
            h.cues.log(),
            vec![CueEvent::Once(Cue::MessageAlert, MESSAGE_ALERT_VOLUME)]
        );
        let events = drain_events(&mut h.events_rx);
        assert!(events.contains(&ClientEvent::Toast(Toast::info("New message from ada"))));
        // Foreground: no system notification.
        assert!(h.notifier.notifications().is_empty());
        assert_eq!(h.notifier.permission_requests(), 1);
    }

    #[tokio::test]
    async fn test_own_and_stale_messages_stay_silent() {
        let mut h = harness();
        let base = Utc::now();

        h.chats_tx
            .send_replace(vec![summary_with_message("c1", "u2", base)]);
        yield_a_bit().await;

        // Same stamp again: not fresh.
        h.chats_tx
            .send_replace(vec![summary_with_message("c1", "u2", base)]);
        yield_a_bit().await;

        // Newer stamp but from the local user.
        h.chats_tx.send_replace(vec![summary_with_message(
            "c1",
            "me",
            base + Duration::seconds(5),
        )]);
        yield_a_bit().await;

        assert!(h.cues.log().is_empty());
        assert!(drain_events(&mut h.events_rx).is_empty());
    }

    #[tokio::test]
    async fn test_active_chat_suppresses_alert() {
        let h = harness();
        let base = Utc::now();

        h.view_tx.send_replace(ViewState {
            active_chat: Some(ChatId::new("c1")),
            ..ViewState::default()
        });
        h.chats_tx
            .send_replace(vec![summary_with_message("c1", "u2", base)]);
        yield_a_bit().await;

        h.chats_tx.send_replace(vec![summary_with_message(
            "c1",
            "u2",
            base + Duration::seconds(1),
        )]);
        yield_a_bit().await;
        assert!(h.cues.log().is_empty());

        // A different open chat does not cover this one.
        h.view_tx.send_replace(ViewState {
            active_chat: Some(ChatId::new("other")),
            ..ViewState::default()
        });
        h.chats_tx.send_replace(vec![summary_with_message(
            "c1",
            "u2",
            base + Duration::seconds(2),
        )]);
        yield_a_bit().await;
        assert_eq!(h.cues.log().len(), 1);
    }

    #[tokio::test]
    async fn test_background_message_notifies_system() {
        let h = harness();
        let base = Utc::now();

        h.view_tx.send_replace(ViewState {
            focused: false,
            visible: false,
            active_chat: None,
        });
        h.chats_tx
            .send_replace(vec![summary_with_message("c1", "u2", base)]);
        yield_a_bit().await;
        h.chats_tx.send_replace(vec![summary_with_message(
            "c1",
            "u2",
            base + Duration::seconds(1),
        )]);
        yield_a_bit().await;

        let notifications = h.notifier.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].title, "New message from ada");
        assert_eq!(notifications[0].body, "hello");
        assert_eq!(notifications[0].tag, "new-message");
        assert!(!notifications[0].require_interaction);
        assert_eq!(notifications[0].chat_id, Some(ChatId::new("c1")));
        // The cue and toast still fire alongside.
        assert_eq!(h.cues.log().len(), 1);
    }

    #[tokio::test]
    async fn test_incoming_call_rings_until_cleared() {
        let h = harness();

        h.view_tx.send_replace(ViewState {
            focused: false,
            visible: true,
            active_chat: None,
        });
        let call = test_call("call-1", "caller", "me");
        h.incoming_tx.send_replace(Some(call.clone()));
        yield_a_bit().await;

        assert_eq!(h.cues.log(), vec![CueEvent::Loop(Cue::Ringtone)]);
        let notifications = h.notifier.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].title, "Incoming Video Call");
        assert_eq!(notifications[0].body, "ada is calling you...");
        assert_eq!(notifications[0].tag, "incoming-call");
        assert!(notifications[0].require_interaction);

        // The same ring republished is not restarted.
        h.incoming_tx.send_replace(Some(call));
        yield_a_bit().await;
        assert_eq!(h.cues.log().len(), 1);

        h.incoming_tx.send_replace(None);
        yield_a_bit().await;
        assert_eq!(
            h.cues.log(),
            vec![CueEvent::Loop(Cue::Ringtone), CueEvent::Stop]
        );
    }
}
