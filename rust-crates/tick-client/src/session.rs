use crate::{
    backend::GameBackend,
    error::{
        SessionError,
        TransportError,
    },
};
use base64::{
    Engine as _,
    engine::general_purpose::URL_SAFE_NO_PAD,
};
use chrono::{
    DateTime,
    Utc,
};
use serde::Deserialize;
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{
            AtomicBool,
            Ordering,
        },
    },
    time::Duration,
};
use tokio::sync::{
    Mutex,
    RwLock,
};
use tracing::{
    debug,
    info,
    warn,
};

#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Bearer credential issued by the gateway. Immutable once built; a refresh
/// produces a new value instead of mutating this one.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
    refresh_token: Option<String>,
    user_id: Option<String>,
    username: Option<String>,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TokenClaims {
    exp: i64,
    #[serde(default)]
    uid: Option<String>,
    #[serde(default)]
    usn: Option<String>,
}

impl Session {
    pub fn new(
        token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token: token.into(),
            refresh_token,
            user_id: None,
            username: None,
            expires_at,
        }
    }

    /// Builds a session from a gateway-issued JWT, reading expiry and user from its claims.
    pub fn from_tokens(
        token: impl Into<String>,
        refresh_token: Option<String>,
    ) -> Result<Self, TransportError> {
        let token = token.into();
        let claims = decode_claims(&token)?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0).ok_or_else(|| {
            TransportError::Token(format!("exp claim {} out of range", claims.exp))
        })?;
        Ok(Self {
            token,
            refresh_token,
            user_id: claims.uid,
            username: claims.usn,
            expires_at,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("expires_at", &self.expires_at)
            .field("refreshable", &self.refresh_token.is_some())
            .finish_non_exhaustive()
    }
}

fn decode_claims(token: &str) -> Result<TokenClaims, TransportError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| TransportError::Token("token is not a JWT".into()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| TransportError::Token(format!("claims are not base64url: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| TransportError::Token(format!("claims are not valid JSON: {e}")))
}

/// Owns the current session and keeps it usable.
///
/// Readers receive an `Arc` snapshot; a refresh swaps in a whole new session,
/// so a concurrent reader sees either the old session or the new one. Refreshes
/// are serialised so callers racing on a stale session share one round trip.
pub struct SessionGuard {
    current: RwLock<Option<Arc<Session>>>,
    channel_open: AtomicBool,
    refresh_lock: Mutex<()>,
    refresh_margin: chrono::Duration,
}

impl SessionGuard {
    pub fn new(refresh_margin: Duration) -> Self {
        Self {
            current: RwLock::new(None),
            channel_open: AtomicBool::new(false),
            refresh_lock: Mutex::new(()),
            refresh_margin: chrono::Duration::from_std(refresh_margin)
                .unwrap_or_else(|_| chrono::Duration::zero()),
        }
    }

    pub async fn authenticate<B: GameBackend>(
        &self,
        backend: &B,
        credentials: &Credentials,
    ) -> Result<Arc<Session>, SessionError> {
        let session = backend
            .authenticate_email(&credentials.email, &credentials.password)
            .await
            .map_err(SessionError::Auth)?;
        let session = Arc::new(session);
        info!(
            email = %credentials.email,
            user_id = ?session.user_id(),
            expires_at = %session.expires_at(),
            "authenticated"
        );

        self.channel_open.store(false, Ordering::SeqCst);
        *self.current.write().await = Some(session.clone());

        backend.open_channel(&session).await.map_err(|err| {
            warn!(?err, "transport channel could not be opened");
            SessionError::Channel(err)
        })?;
        self.channel_open.store(true, Ordering::SeqCst);
        debug!("transport channel open");
        Ok(session)
    }

    pub fn channel_open(&self) -> bool {
        self.channel_open.load(Ordering::SeqCst)
    }

    pub async fn current(&self) -> Option<Arc<Session>> {
        self.current.read().await.clone()
    }

    /// Returns a session that is good for at least the refresh margin, refreshing once if needed.
    ///
    /// A failed refresh drops the session; every later call reports a missing
    /// session until [`SessionGuard::authenticate`] succeeds again.
    pub async fn ensure_valid<B: GameBackend>(
        &self,
        backend: &B,
    ) -> Result<Arc<Session>, SessionError> {
        let session = self.current().await.ok_or(SessionError::Missing)?;
        if !self.is_stale(&session) {
            return Ok(session);
        }

        let _refreshing = self.refresh_lock.lock().await;
        // another caller may have refreshed, or failed and cleared, while we waited
        let session = self.current().await.ok_or(SessionError::Missing)?;
        if !self.is_stale(&session) {
            return Ok(session);
        }

        debug!(expires_at = %session.expires_at(), "session near expiry, refreshing");
        match backend.refresh_session(&session).await {
            Ok(fresh) => {
                let fresh = Arc::new(fresh);
                *self.current.write().await = Some(fresh.clone());
                info!(expires_at = %fresh.expires_at(), "session refreshed");
                Ok(fresh)
            }
            Err(err) => {
                warn!(?err, "session can no longer be refreshed; re-authentication required");
                self.sign_out().await;
                Err(SessionError::Refresh(err))
            }
        }
    }

    pub async fn sign_out(&self) {
        *self.current.write().await = None;
        self.channel_open.store(false, Ordering::SeqCst);
    }

    fn is_stale(&self, session: &Session) -> bool {
        session.is_expired_at(Utc::now() + self.refresh_margin)
    }
}

impl Default for SessionGuard {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}
