use crate::catalog::ModelDescriptor;
use crate::completion::{
    completion_id, word_count, ChatCompletionPayload, CompletionRequest, CompletionResult, Usage,
};
use crate::config::{RemoteSettings, Settings};
use crate::error::{Result, SncError};
use crate::sse::LineStream;
use crate::stream::{fallback_header, ChunkHeader};
use async_trait::async_trait;
use futures::Stream;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Mock,
    Remote,
}

impl ProviderKind {
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("mock") {
            Some(Self::Mock)
        } else if value.eq_ignore_ascii_case("remote") {
            Some(Self::Remote)
        } else {
            None
        }
    }
}

/// What happens when the remote endpoint cannot be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Answer with a well-formed result that describes the failure.
    #[default]
    Fallback,
    /// Return the transport error.
    Strict,
}

impl FailurePolicy {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            Self::Strict
        } else {
            Self::Fallback
        }
    }
}

pub type LineSource = Pin<Box<dyn Stream<Item = std::result::Result<String, reqwest::Error>> + Send>>;

/// Raw event-stream lines of a natively streamed completion.
pub struct UpstreamLines {
    /// Used for chunks whose frames never carry `id`, `model` or `created`.
    pub header: ChunkHeader,
    pub lines: LineSource,
}

impl fmt::Debug for UpstreamLines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamLines")
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum ProviderReply {
    Complete(CompletionResult),
    Streaming(UpstreamLines),
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Run `request` against `model`.
    ///
    /// `Streaming` is only returned when the request asked for a stream and
    /// the provider can deliver one incrementally.
    async fn complete(
        &self,
        model: &ModelDescriptor,
        request: &CompletionRequest,
    ) -> Result<ProviderReply>;
}

/// The provider chosen by configuration, shared across dispatches.
#[derive(Clone)]
pub struct ProviderClient {
    kind: ProviderKind,
    provider: Arc<dyn CompletionProvider>,
}

impl ProviderClient {
    pub fn new(kind: ProviderKind, provider: Arc<dyn CompletionProvider>) -> Self {
        Self { kind, provider }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        match settings.provider {
            ProviderKind::Mock => Ok(Self::mock()),
            ProviderKind::Remote => {
                let remote = RemoteProvider::new(&settings.remote, settings.failure_policy)?;
                Ok(Self::new(ProviderKind::Remote, Arc::new(remote)))
            }
        }
    }

    pub fn mock() -> Self {
        Self::new(ProviderKind::Mock, Arc::new(MockProvider))
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub async fn complete(
        &self,
        model: &ModelDescriptor,
        request: &CompletionRequest,
    ) -> Result<ProviderReply> {
        self.provider.complete(model, request).await
    }
}

impl fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderClient")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Canned answers, no I/O.
#[derive(Debug, Default)]
pub struct MockProvider;

#[async_trait]
impl CompletionProvider for MockProvider {
    async fn complete(
        &self,
        model: &ModelDescriptor,
        request: &CompletionRequest,
    ) -> Result<ProviderReply> {
        let content = format!(
            "Hello! This is a mock response from {} ({}). The model is working correctly!",
            model.name, model.key
        );
        let usage = Usage::new(request.prompt_words(), word_count(&content));
        Ok(ProviderReply::Complete(CompletionResult::single(
            completion_id(),
            model.name,
            content,
            usage,
        )))
    }
}

/// OpenAI-compatible chat-completion endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteProvider {
    client: Client,
    base_url: Option<Url>,
    timeout: Duration,
    native_streaming: bool,
    policy: FailurePolicy,
}

impl RemoteProvider {
    pub fn new(settings: &RemoteSettings, policy: FailurePolicy) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(settings.timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            timeout: settings.timeout,
            native_streaming: settings.native_streaming,
            policy,
        })
    }

    fn endpoint(&self, model: &ModelDescriptor) -> String {
        match &self.base_url {
            Some(base) => format!(
                "{}/v1/chat/completions",
                base.as_str().trim_end_matches('/')
            ),
            None => model.endpoint.to_string(),
        }
    }

    async fn fetch(
        &self,
        url: &str,
        model: &ModelDescriptor,
        request: &CompletionRequest,
    ) -> Result<CompletionResult> {
        let payload = payload(model, request, false);
        tracing::debug!(url, model = model.name, "posting chat completion");
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SncError::transport(Some(status.as_u16()), body));
        }

        let mut result: CompletionResult = response.json().await?;
        result.usage = result.usage.normalized();
        if result.model.is_empty() {
            result.model = model.name.to_string();
        }
        Ok(result)
    }

    async fn open_stream(
        &self,
        url: &str,
        model: &ModelDescriptor,
        request: &CompletionRequest,
    ) -> Result<UpstreamLines> {
        let payload = payload(model, request, true);
        tracing::debug!(url, model = model.name, "opening chat completion stream");
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SncError::transport(Some(status.as_u16()), body));
        }

        Ok(UpstreamLines {
            header: fallback_header(model.name),
            lines: Box::pin(LineStream::new(Box::pin(response.bytes_stream()))),
        })
    }

    fn recover(
        &self,
        err: SncError,
        model: &ModelDescriptor,
        request: &CompletionRequest,
    ) -> Result<CompletionResult> {
        if !err.is_recoverable() || self.policy == FailurePolicy::Strict {
            return Err(err);
        }
        tracing::warn!(%err, model = model.key, "remote provider failed, answering with fallback");
        Ok(fallback_result(model, request, &err))
    }
}

#[async_trait]
impl CompletionProvider for RemoteProvider {
    async fn complete(
        &self,
        model: &ModelDescriptor,
        request: &CompletionRequest,
    ) -> Result<ProviderReply> {
        let url = self.endpoint(model);
        if request.stream && self.native_streaming {
            return match self.open_stream(&url, model, request).await {
                Ok(lines) => Ok(ProviderReply::Streaming(lines)),
                Err(err) => self
                    .recover(err, model, request)
                    .map(ProviderReply::Complete),
            };
        }
        match self.fetch(&url, model, request).await {
            Ok(result) => Ok(ProviderReply::Complete(result)),
            Err(err) => self
                .recover(err, model, request)
                .map(ProviderReply::Complete),
        }
    }
}

fn payload<'a>(
    model: &'a ModelDescriptor,
    request: &'a CompletionRequest,
    stream: bool,
) -> ChatCompletionPayload<'a> {
    ChatCompletionPayload {
        model: model.name,
        messages: &request.messages,
        temperature: request.params.temperature,
        max_tokens: request.params.max_tokens,
        stream,
    }
}

/// Result returned in place of a transport error.
pub fn fallback_result(
    model: &ModelDescriptor,
    request: &CompletionRequest,
    err: &SncError,
) -> CompletionResult {
    let content = format!(
        "Hello! This is a fallback response from SnowCell model '{}'. (API error: {err})",
        model.key
    );
    let usage = Usage::new(request.prompt_words(), word_count(&content));
    CompletionResult::single(
        format!("chatcmpl-snowcell-fallback-{}", uuid::Uuid::new_v4().simple()),
        model.name,
        content,
        usage,
    )
}
