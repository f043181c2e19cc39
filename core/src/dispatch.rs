use crate::catalog::{ModelCatalog, ModelDescriptor};
use crate::completion::{ChatMessage, CompletionRequest, CompletionResult, GenerationParams};
use crate::config::{Settings, DEFAULT_NAMESPACE};
use crate::error::{Result, SncError};
use crate::provider::{ProviderClient, ProviderReply};
use crate::selection::SelectionStore;
use crate::session::SessionStore;
use crate::stream::{self, ChunkStream};
use std::fmt;

const NAMESPACE_SEPARATORS: [char; 3] = [':', '/', '-'];
const PROBE_PROMPT: &str = "Hello! Please respond with a brief greeting.";

/// Outcome of a dispatch: one result, or chunks for a streaming request.
pub enum Dispatch {
    Complete(CompletionResult),
    Stream(ChunkStream),
}

impl Dispatch {
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    pub fn into_result(self) -> Option<CompletionResult> {
        match self {
            Self::Complete(result) => Some(result),
            Self::Stream(_) => None,
        }
    }

    pub fn into_stream(self) -> Option<ChunkStream> {
        match self {
            Self::Stream(chunks) => Some(chunks),
            Self::Complete(_) => None,
        }
    }
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete(result) => f.debug_tuple("Complete").field(result).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Entry point for chat completions against the selected model.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    catalog: ModelCatalog,
    selections: SelectionStore,
    provider: ProviderClient,
    namespace: String,
}

impl Dispatcher {
    pub fn new(catalog: ModelCatalog, selections: SelectionStore, provider: ProviderClient) -> Self {
        Self {
            catalog,
            selections,
            provider,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let catalog = ModelCatalog::builtin();
        let state = settings.state_store();
        let selections = SelectionStore::new(state.clone(), SessionStore::new(state), catalog);
        let provider = ProviderClient::from_settings(settings)?;
        Ok(Self::new(catalog, selections, provider).with_namespace(settings.namespace.clone()))
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn selections(&self) -> &SelectionStore {
        &self.selections
    }

    pub fn provider(&self) -> &ProviderClient {
        &self.provider
    }

    /// `snowcell:qwen`, `snowcell/qwen` and `snowcell-qwen` all name `qwen`.
    pub fn bare_key<'a>(&self, model: &'a str) -> &'a str {
        let Some(rest) = model.strip_prefix(self.namespace.as_str()) else {
            return model;
        };
        match rest.strip_prefix(NAMESPACE_SEPARATORS) {
            Some(key) if !key.is_empty() => key,
            _ => model,
        }
    }

    pub async fn dispatch(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        params: GenerationParams,
        stream: bool,
    ) -> Result<Dispatch> {
        let key = self.bare_key(model);
        let request = CompletionRequest::new(key, messages, params, stream)?;

        let selection = self.selections.current()?;
        let selected = match selection {
            Some(selection) if selection.key == key => selection,
            other => {
                return Err(SncError::NotSelected {
                    requested: key.to_string(),
                    selected: other.map(|selection| selection.key),
                })
            }
        };
        let descriptor = self
            .catalog
            .get(&selected.key)
            .ok_or(SncError::UnknownModel { key: selected.key })?;

        self.run(descriptor, &request).await
    }

    /// Send a short greeting to `key`, or to the selected model when `None`.
    pub async fn probe(&self, key: Option<&str>) -> Result<CompletionResult> {
        let key = match key {
            Some(key) => self.bare_key(key).to_string(),
            None => self
                .selections
                .current()?
                .map(|selection| selection.key)
                .ok_or_else(|| SncError::NotSelected {
                    requested: "(selected model)".to_string(),
                    selected: None,
                })?,
        };
        let descriptor = self
            .catalog
            .get(&key)
            .ok_or_else(|| SncError::UnknownModel { key: key.clone() })?;
        let params = GenerationParams {
            temperature: 0.7,
            max_tokens: 100,
        };
        let request =
            CompletionRequest::new(key, vec![ChatMessage::user(PROBE_PROMPT)], params, false)?;
        self.run(descriptor, &request)
            .await?
            .into_result()
            .ok_or_else(|| SncError::transport(None, "provider streamed a non-streaming request"))
    }

    async fn run(
        &self,
        descriptor: &ModelDescriptor,
        request: &CompletionRequest,
    ) -> Result<Dispatch> {
        let reply = self.provider.complete(descriptor, request).await?;
        Ok(match reply {
            ProviderReply::Streaming(upstream) => {
                Dispatch::Stream(stream::passthrough(upstream.lines, upstream.header))
            }
            ProviderReply::Complete(result) if request.stream => {
                Dispatch::Stream(stream::synthesize_result(&result))
            }
            ProviderReply::Complete(result) => Dispatch::Complete(result),
        })
    }
}
