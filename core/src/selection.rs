use crate::catalog::{ModelCatalog, ModelDescriptor};
use crate::error::{Result, SncError};
use crate::session::SessionStore;
use crate::store::StateStore;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

const SELECTION_RECORD: &str = "selection";

/// The model that completion calls are currently allowed to target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub key: String,
    pub name: String,
    pub endpoint: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub selected_at: DateTime<Utc>,
}

impl Selection {
    fn from_descriptor(model: &ModelDescriptor, selected_at: DateTime<Utc>) -> Self {
        Self {
            key: model.key.to_string(),
            name: model.name.to_string(),
            endpoint: model.endpoint.to_string(),
            selected_at,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SelectionStore {
    store: StateStore,
    sessions: SessionStore,
    catalog: ModelCatalog,
}

impl SelectionStore {
    pub fn new(store: StateStore, sessions: SessionStore, catalog: ModelCatalog) -> Self {
        Self {
            store,
            sessions,
            catalog,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Make `key` the active model, replacing any earlier choice.
    ///
    /// The catalog is checked first so an unknown key never touches the
    /// stored selection.
    pub fn select(&self, key: &str) -> Result<Selection> {
        let model = self.catalog.get(key).ok_or_else(|| SncError::UnknownModel {
            key: key.to_string(),
        })?;
        self.require_session()?;

        let selection = Selection::from_descriptor(model, Utc::now().trunc_subsecs(0));
        self.store.write(SELECTION_RECORD, &selection)?;
        tracing::info!(key = model.key, name = model.name, "model selected");
        Ok(selection)
    }

    pub fn current(&self) -> Result<Option<Selection>> {
        self.require_session()?;
        self.store.read(SELECTION_RECORD)
    }

    pub fn clear(&self) -> Result<()> {
        self.store.remove(SELECTION_RECORD)
    }

    fn require_session(&self) -> Result<()> {
        match self.sessions.current()? {
            Some(_) => Ok(()),
            None => Err(SncError::NotAuthenticated),
        }
    }
}
