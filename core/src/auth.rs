use crate::error::{Result, SncError};
use crate::selection::SelectionStore;
use crate::session::{Session, SessionStore};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Decides whether a user/token pair may open a session.
pub trait Authenticator: Send + Sync {
    /// The subject recorded in the session on success.
    fn authenticate(&self, user: &str, token: &str) -> Result<String>;
}

/// Accepts any non-empty pair.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAny;

impl Authenticator for AcceptAny {
    fn authenticate(&self, user: &str, _token: &str) -> Result<String> {
        Ok(user.to_string())
    }
}

/// Known users and their tokens, owned by this instance.
#[derive(Debug, Default, Clone)]
pub struct UserDirectory {
    users: Arc<RwLock<HashMap<String, String>>>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, user: impl Into<String>, token: impl Into<String>) -> Self {
        self.insert(user, token);
        self
    }

    pub fn insert(&self, user: impl Into<String>, token: impl Into<String>) {
        self.users.write().insert(user.into(), token.into());
    }

    pub fn remove(&self, user: &str) -> bool {
        self.users.write().remove(user).is_some()
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

impl Authenticator for UserDirectory {
    fn authenticate(&self, user: &str, token: &str) -> Result<String> {
        match self.users.read().get(user) {
            Some(expected) if expected == token => Ok(user.to_string()),
            _ => Err(SncError::InvalidCredentials),
        }
    }
}

/// Login, logout and status on top of the local stores.
#[derive(Clone)]
pub struct Account {
    authenticator: Arc<dyn Authenticator>,
    selections: SelectionStore,
}

impl Account {
    pub fn new(authenticator: Arc<dyn Authenticator>, selections: SelectionStore) -> Self {
        Self {
            authenticator,
            selections,
        }
    }

    fn sessions(&self) -> &SessionStore {
        self.selections.sessions()
    }

    /// A selection survives only when the same subject renews a live
    /// session. After expiry, logout or a change of user it is dropped.
    pub fn login(&self, user: &str, token: &str) -> Result<Session> {
        let (user, token) = (user.trim(), token.trim());
        if user.is_empty() || token.is_empty() {
            return Err(SncError::InvalidCredentials);
        }
        let subject = self.authenticator.authenticate(user, token)?;
        let renewing = self
            .sessions()
            .current()?
            .is_some_and(|previous| previous.subject == subject);
        if !renewing {
            self.selections.clear()?;
        }
        self.sessions().create(&subject)
    }

    /// Ends the session and forgets the selected model.
    pub fn logout(&self) -> Result<()> {
        self.sessions().destroy()?;
        self.selections.clear()
    }

    pub fn status(&self) -> Result<Option<Session>> {
        self.sessions().current()
    }
}
