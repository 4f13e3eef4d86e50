use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{ApiError, FieldErrors, Outcome};
use crate::gateway::{Auth, RequestGateway};
use crate::models::{Credentials, LoginResponse, Registration, Session, UserIdentity};
use crate::token_store::TokenStore;

/// Notifications surfaced to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The server rejected the session; stored credentials have been cleared.
    /// Emitted exactly once per expiry episode.
    Expired,
}

struct SessionInner {
    tokens: Arc<TokenStore>,
    /// Teardown-in-progress guard: set by the first 401 of an episode,
    /// reset when `logout` completes or a new session is established.
    expiring: AtomicBool,
    events_tx: flume::Sender<SessionEvent>,
    events_rx: flume::Receiver<SessionEvent>,
}

impl SessionInner {
    fn handle_auth_expired(&self) {
        if self.tokens.get().is_none() {
            // Already logged out; a straggling 401 must not re-notify.
            return;
        }
        if self.expiring.swap(true, Ordering::SeqCst) {
            // Another concurrent 401 already started the teardown.
            return;
        }
        if let Err(err) = self.tokens.clear() {
            tracing::warn!("failed to clear expired session: {err:#}");
        }
        tracing::info!("session expired; stored credentials cleared");
        let _ = self.events_tx.send(SessionEvent::Expired);
    }
}

/// Orchestrates login, registration, logout and OAuth completion, and owns
/// the [`TokenStore`]. Registered as the gateway's auth-expiry listener so a
/// 401 anywhere in the system tears the session down once.
pub struct SessionController {
    gateway: Arc<RequestGateway>,
    inner: Arc<SessionInner>,
}

impl SessionController {
    pub fn new(gateway: Arc<RequestGateway>, tokens: Arc<TokenStore>) -> Self {
        let (events_tx, events_rx) = flume::unbounded();
        let inner = Arc::new(SessionInner {
            tokens,
            expiring: AtomicBool::new(false),
            events_tx,
            events_rx,
        });
        let hook = Arc::clone(&inner);
        gateway.on_auth_expired(move || hook.handle_auth_expired());
        Self { gateway, inner }
    }

    /// Channel carrying session notifications; clone freely.
    pub fn events(&self) -> flume::Receiver<SessionEvent> {
        self.inner.events_rx.clone()
    }

    pub fn session(&self) -> Option<Session> {
        self.inner.tokens.get()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_some()
    }

    pub fn last_username(&self) -> Option<String> {
        self.inner.tokens.last_username()
    }

    /// Authenticates against the API. On success the session is stored and
    /// returned; on any failure the stored state is untouched and the outcome
    /// is passed through for display.
    pub async fn login(&self, credentials: &Credentials) -> Outcome<Session> {
        let mut errors = FieldErrors::default();
        if credentials.username.trim().is_empty() {
            errors.push("username", "username is required");
        }
        if credentials.password.is_empty() {
            errors.push("password", "password is required");
        }
        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }

        let response: LoginResponse = self
            .gateway
            .post("/auth/login", Some(credentials), Auth::Public)
            .await?;
        let session = Session {
            token: response.token,
            identity: response.user,
        };
        self.store_session(&session);
        Ok(session)
    }

    /// Creates an account. Success does not imply login; the server sends a
    /// confirmation email out of band.
    pub async fn register(&self, profile: &Registration) -> Outcome<()> {
        let mut errors = FieldErrors::default();
        if profile.username.trim().is_empty() {
            errors.push("username", "username is required");
        }
        if profile.email.trim().is_empty() {
            errors.push("email", "email is required");
        } else if !is_plausible_email(&profile.email) {
            errors.push("email", "email is invalid");
        }
        if profile.password.is_empty() {
            errors.push("password", "password is required");
        }
        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }

        self.gateway
            .post_empty("/auth/register", Some(profile), Auth::Public)
            .await
    }

    /// Adopts the opaque token produced by the external OAuth flow and
    /// establishes the session exactly as a successful login would.
    pub fn complete_oauth(&self, token: String, identity: UserIdentity) -> Session {
        let session = Session { token, identity };
        self.store_session(&session);
        session
    }

    /// Clears the stored session. Idempotent and infallible; a persistence
    /// hiccup is logged, not surfaced, because the in-memory state is already
    /// gone.
    pub fn logout(&self) {
        if let Err(err) = self.inner.tokens.clear() {
            tracing::warn!("failed to persist logout: {err:#}");
        }
        self.inner.expiring.store(false, Ordering::SeqCst);
        tracing::debug!("logged out");
    }

    fn store_session(&self, session: &Session) {
        if let Err(err) = self.inner.tokens.set(session) {
            tracing::warn!("failed to persist session: {err:#}");
        }
        // A fresh session starts a fresh expiry episode.
        self.inner.expiring.store(false, Ordering::SeqCst);
    }
}

/// Same shape check the registration form applies before submitting:
/// something, an `@`, something, a dot, something.
fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.trim().is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.trim().is_empty() && !tld.trim().is_empty(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape_check_matches_form_rules() {
        assert!(is_plausible_email("ada@example.com"));
        assert!(is_plausible_email("a.b@mail.example.org"));
        assert!(!is_plausible_email("ada"));
        assert!(!is_plausible_email("ada@example"));
        assert!(!is_plausible_email("@example.com"));
        assert!(!is_plausible_email("ada@.com"));
        assert!(!is_plausible_email("ada@example."));
    }
}
