//! Session context shared by every consumer of the station service.
//!
//! The session is created once and handed to the repository at construction.
//! It holds the bearer credential and broadcasts state changes through a
//! `watch` channel, so a revocation triggered by one request is observed by
//! every subscriber (the map loop, the console prompt, ...).

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

/// Bearer credential issued by the station service at sign-in.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub username: String,
}

impl Credential {
    pub fn new(token: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            username: username.into(),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("username", &self.username)
            .finish()
    }
}

/// Where the operator currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Never signed in, or signed out explicitly.
    SignedOut,
    SignedIn(Credential),
    /// The service rejected the credential; the operator must sign in again.
    Revoked,
}

impl SessionState {
    /// True for states that send the operator back to the sign-in entry point.
    pub fn is_ended(&self) -> bool {
        !matches!(self, SessionState::SignedIn(_))
    }
}

/// Cheaply cloneable handle to the shared session.
#[derive(Clone)]
pub struct Session {
    state: Arc<watch::Sender<SessionState>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::SignedOut);
        Self {
            state: Arc::new(tx),
        }
    }

    /// Store a freshly issued credential.
    pub fn sign_in(&self, credential: Credential) {
        info!(username = %credential.username, "Session started");
        self.state.send_replace(SessionState::SignedIn(credential));
    }

    /// Explicit logout: drop the credential and the display name.
    pub fn sign_out(&self) {
        if self.is_signed_in() {
            info!("Session ended by logout");
        }
        self.state.send_replace(SessionState::SignedOut);
    }

    /// Revoke the session after the service rejected `token`.
    ///
    /// A rejection for a token that is no longer current (e.g. a slow request
    /// from before a re-login) is ignored. Returns whether the state changed.
    pub fn revoke(&self, token: &str) -> bool {
        self.state.send_if_modified(|state| match state {
            SessionState::SignedIn(credential) if credential.token == token => {
                warn!(username = %credential.username, "Credential rejected, session revoked");
                *state = SessionState::Revoked;
                true
            }
            _ => false,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        matches!(*self.state.borrow(), SessionState::SignedIn(_))
    }

    /// Token to attach as `Authorization: Bearer ...`, if any.
    pub fn bearer_token(&self) -> Option<String> {
        match &*self.state.borrow() {
            SessionState::SignedIn(credential) => Some(credential.token.clone()),
            _ => None,
        }
    }

    /// Display name of the signed-in operator.
    pub fn username(&self) -> Option<String> {
        match &*self.state.borrow() {
            SessionState::SignedIn(credential) => Some(credential.username.clone()),
            _ => None,
        }
    }

    /// Observe every state change, including revocations caused by other callers.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Session").field(&*self.state.borrow()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_in_and_out() {
        let session = Session::new();
        assert!(!session.is_signed_in());
        assert_eq!(session.bearer_token(), None);

        session.sign_in(Credential::new("abc", "admin"));
        assert_eq!(session.bearer_token().as_deref(), Some("abc"));
        assert_eq!(session.username().as_deref(), Some("admin"));

        session.sign_out();
        assert_eq!(session.state(), SessionState::SignedOut);
        assert_eq!(session.username(), None);
    }

    #[test]
    fn test_revoke_ignores_stale_token() {
        let session = Session::new();
        session.sign_in(Credential::new("new-token", "admin"));

        assert!(!session.revoke("old-token"));
        assert!(session.is_signed_in());

        assert!(session.revoke("new-token"));
        assert_eq!(session.state(), SessionState::Revoked);
        assert_eq!(session.bearer_token(), None);

        // Second rejection is a no-op
        assert!(!session.revoke("new-token"));
    }

    #[tokio::test]
    async fn test_revocation_is_broadcast_to_clones() {
        let session = Session::new();
        session.sign_in(Credential::new("t", "admin"));

        let mut rx = session.clone().subscribe();
        let other_caller = session.clone();
        other_caller.revoke("t");

        rx.changed().await.unwrap();
        assert!(rx.borrow().is_ended());
    }

    #[test]
    fn test_debug_redacts_token() {
        let text = format!("{:?}", Credential::new("secret-token", "admin"));
        assert!(!text.contains("secret-token"));
        assert!(text.contains("admin"));
    }

    #[test]
    fn test_revocation_wakes_waiting_subscriber() {
        let session = Session::new();
        session.sign_in(Credential::new("t", "admin"));
        let mut rx = session.subscribe();

        let mut changed = tokio_test::task::spawn(rx.changed());
        tokio_test::assert_pending!(changed.poll());

        session.revoke("t");
        assert!(changed.is_woken());
        tokio_test::assert_ready_ok!(changed.poll());
    }
}
