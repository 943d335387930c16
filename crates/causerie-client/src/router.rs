//! Screen routing derived from session state.
//!
//! The shell asks for a screen; the session decides whether it may have it.
//! Unauthenticated sessions land on login, authenticated ones without a
//! profile are forced through first-run setup, and a completed profile makes
//! the auth screens unreachable.

use causerie_shared::RoomId;

use crate::session::SessionState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login,
    ProfileSetup,
    Chats,
    Call { room: RoomId },
}

/// Resolve the screen to show for `requested` under `state`.
///
/// `None` means auth has not reported yet; keep the splash up.
pub fn resolve(state: &SessionState, requested: Route) -> Option<Route> {
    match state {
        SessionState::Loading => None,
        SessionState::SignedOut => Some(Route::Login),
        SessionState::SignedIn { profile: None, .. } => Some(Route::ProfileSetup),
        SessionState::SignedIn {
            profile: Some(_), ..
        } => match requested {
            Route::Login | Route::ProfileSetup => Some(Route::Chats),
            other => Some(other),
        },
    }
}
