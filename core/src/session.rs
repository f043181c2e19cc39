use crate::error::Result;
use crate::store::StateStore;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

const SESSION_RECORD: &str = "session";

/// How long a login stays valid.
pub const SESSION_TTL_DAYS: i64 = 30;

/// Local proof that someone is logged in, valid until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub subject: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(subject: impl Into<String>, created_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            subject: subject.into(),
            created_at,
            expires_at: created_at + ttl,
        }
    }

    /// A session is live strictly before `expires_at`. Records that break
    /// `expires_at > created_at` are never live.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > self.created_at && self.expires_at > now
    }
}

#[derive(Clone, Debug)]
pub struct SessionStore {
    store: StateStore,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(store: StateStore) -> Self {
        Self::with_ttl(store, Duration::days(SESSION_TTL_DAYS))
    }

    pub fn with_ttl(store: StateStore, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn state(&self) -> &StateStore {
        &self.store
    }

    /// Start a session for `subject`, overwriting whatever was stored before.
    pub fn create(&self, subject: &str) -> Result<Session> {
        let session = Session::new(subject, Utc::now().trunc_subsecs(0), self.ttl);
        self.store.write(SESSION_RECORD, &session)?;
        tracing::info!(subject, expires_at = %session.expires_at, "session created");
        Ok(session)
    }

    /// The live session, if any. An expired record is deleted on the way out.
    pub fn current(&self) -> Result<Option<Session>> {
        let Some(session) = self.store.read::<Session>(SESSION_RECORD)? else {
            return Ok(None);
        };
        if session.is_live_at(Utc::now()) {
            return Ok(Some(session));
        }
        tracing::debug!(subject = %session.subject, expires_at = %session.expires_at, "session expired");
        self.store.remove(SESSION_RECORD)?;
        Ok(None)
    }

    pub fn destroy(&self) -> Result<()> {
        self.store.remove(SESSION_RECORD)?;
        tracing::info!("session destroyed");
        Ok(())
    }
}
