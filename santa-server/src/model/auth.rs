//! Session tokens
//!
//! Sessions live only in the memory of the service. Every user has at most one session - signing in
//! again replaces the previous session, and the previous token stops being accepted. Expired
//! sessions are evicted when someone tries to use them, or by [`TokenStore::purge_expired`].

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_graphql::{Context, ErrorExtensions, scalar};
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::users::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Invalid authorization format")]
    InvalidAuthorization,
    #[error("Invalid authorization scheme")]
    InvalidAuthorizationScheme,
}

/// Number of random bytes in a session token
const TOKEN_BYTES: usize = 16;

/// Session lifetime if not configured otherwise
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(5 * 60);

/// Authentication method based on `Authorization` HTTP header
#[derive(Debug, Clone)]
pub enum Authorization {
    /// Session token
    Bearer(SessionToken),
}

impl FromStr for Authorization {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, token) = s.split_once(' ').ok_or(Error::InvalidAuthorization)?;
        let token = token.trim();

        if !scheme.eq_ignore_ascii_case("Bearer") {
            return Err(Error::InvalidAuthorizationScheme);
        }

        if token.is_empty() {
            return Err(Error::InvalidAuthorization);
        }

        Ok(Self::Bearer(SessionToken(token.to_owned())))
    }
}

/// Newtype for session token string
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

scalar!(SessionToken);

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionToken {
    fn from(token: &str) -> Self {
        Self(token.to_owned())
    }
}

impl SessionToken {
    /// Generates a new random token.
    ///
    /// Panics if the OS entropy source fails.
    fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Session data
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// User ID for this session
    pub user_id: UserId,
    /// Session token
    pub token: SessionToken,
    /// Session expiration time
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Session of the request being resolved, or an `UNAUTHENTICATED` error if the request didn't
    /// carry any
    pub fn from_context<'a>(ctx: &Context<'a>) -> async_graphql::Result<&'a Session> {
        ctx.data_opt::<Session>().ok_or_else(|| {
            async_graphql::Error::new("Unauthenticated")
                .extend_with(|_, ext| ext.set("code", "UNAUTHENTICATED"))
        })
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Sessions indexed both by user and by token. Both maps are always updated together.
#[derive(Debug, Default)]
struct Sessions {
    by_user: HashMap<UserId, Session>,
    by_token: HashMap<SessionToken, UserId>,
}

impl Sessions {
    /// Stores the session, returning the replaced session of the same user
    fn insert(&mut self, session: Session) -> Option<Session> {
        self.by_token.insert(session.token.clone(), session.user_id);
        let replaced = self.by_user.insert(session.user_id, session)?;
        self.by_token.remove(&replaced.token);
        Some(replaced)
    }

    fn get(&self, token: &SessionToken) -> Option<&Session> {
        self.by_token
            .get(token)
            .and_then(|user_id| self.by_user.get(user_id))
    }

    fn remove(&mut self, token: &SessionToken) -> Option<Session> {
        let user_id = self.by_token.remove(token)?;
        self.by_user.remove(&user_id)
    }
}

/// In-memory store of active sessions
///
/// Safe to share between request handlers. The lock is never held across an `.await`.
#[derive(Debug)]
pub struct TokenStore {
    sessions: RwLock<Sessions>,
    ttl: TimeDelta,
}

impl TokenStore {
    /// Creates an empty store issuing sessions valid for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(Sessions::default()),
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Issues a new session for the user, replacing the previous one if any
    pub fn issue(&self, user_id: UserId) -> Session {
        self.issue_at(user_id, Utc::now())
    }

    fn issue_at(&self, user_id: UserId, now: DateTime<Utc>) -> Session {
        let session = Session {
            user_id,
            token: SessionToken::generate(),
            expires_at: now
                .checked_add_signed(self.ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };

        let replaced = self.sessions.write().insert(session.clone());
        info!(
            %user_id,
            expires_at = %session.expires_at,
            replaced = replaced.is_some(),
            "Session issued"
        );

        session
    }

    /// Validates the token returning the session it belongs to.
    ///
    /// An expired session is removed from the store, so the next attempt with the same token fails
    /// with [`Error::InvalidToken`].
    pub fn validate(&self, token: &SessionToken) -> Result<Session, Error> {
        self.validate_at(token, Utc::now())
    }

    fn validate_at(&self, token: &SessionToken, now: DateTime<Utc>) -> Result<Session, Error> {
        {
            let sessions = self.sessions.read();
            let session = sessions.get(token).ok_or(Error::InvalidToken)?;
            if !session.is_expired(now) {
                return Ok(session.clone());
            }
        }

        // Tokens are never reused, so if the token is still there it is the same expired session.
        // It might have been evicted or replaced in the meantime, which is fine as well.
        if let Some(session) = self.sessions.write().remove(token) {
            debug!(user_id = %session.user_id, "Expired session evicted");
        }

        Err(Error::TokenExpired)
    }

    /// Removes the session with given token, returning its owner
    pub fn revoke(&self, token: &SessionToken) -> Result<UserId, Error> {
        let session = self
            .sessions
            .write()
            .remove(token)
            .ok_or(Error::InvalidToken)?;

        info!(user_id = %session.user_id, "Session revoked");
        Ok(session.user_id)
    }

    /// Removes all expired sessions, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write();
        let Sessions { by_user, by_token } = &mut *sessions;

        let before = by_user.len();
        by_user.retain(|_, session| !session.is_expired(now));
        by_token.retain(|_, user_id| by_user.contains_key(user_id));

        before - by_user.len()
    }

    /// Number of stored sessions, including expired ones not evicted yet
    pub fn len(&self) -> usize {
        self.sessions.read().by_user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_TTL)
    }
}
