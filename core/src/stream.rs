//! Turns provider output into one lazy, ordered sequence of [`ResponseChunk`]s.
//!
//! Two sources feed the same contract:
//!
//! - **synthesized**: a fully materialized text is cut into whitespace
//!   delimited tokens, followed by one terminal chunk;
//! - **passthrough**: upstream `data:` frames are mapped one to one, with
//!   `id`, `model` and `created` remembered from the first frame and filled in
//!   on later frames that omit them.

use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{stream, Stream, StreamExt};
use serde::Deserialize;

use crate::completion::{now_epoch, CompletionResult, ResponseChunk, FINISH_STOP};
use crate::error::{Result, SncError};
use crate::sse::{parse_line, SseLine};

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ResponseChunk>> + Send>>;

/// Fields repeated on every chunk of one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: String,
    pub created: i64,
    pub model: String,
}

impl ChunkHeader {
    pub fn new(id: impl Into<String>, created: i64, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created,
            model: model.into(),
        }
    }

    pub fn from_result(result: &CompletionResult) -> Self {
        Self::new(result.id.clone(), result.created, result.model.clone())
    }

    fn chunk(&self, delta: impl Into<String>, finish_reason: Option<String>) -> ResponseChunk {
        ResponseChunk {
            id: self.id.clone(),
            created: self.created,
            model: self.model.clone(),
            delta: delta.into(),
            finish_reason,
        }
    }
}

/// Iterator over the chunks of a synthesized stream.
///
/// Each token keeps the whitespace that follows it (the first token also keeps
/// any leading whitespace), so the deltas concatenate back to the source text
/// byte for byte. The last item is always the terminal chunk.
#[derive(Debug, Clone)]
pub struct SynthesizedChunks {
    header: ChunkHeader,
    text: String,
    offset: usize,
    finish_reason: Option<String>,
}

impl SynthesizedChunks {
    pub fn new(
        header: ChunkHeader,
        text: impl Into<String>,
        finish_reason: impl Into<String>,
    ) -> Self {
        Self {
            header,
            text: text.into(),
            offset: 0,
            finish_reason: Some(finish_reason.into()),
        }
    }

    fn next_token_end(&self) -> usize {
        let rest = &self.text[self.offset..];
        let word_start = rest
            .find(|c: char| !c.is_whitespace())
            .unwrap_or(rest.len());
        let after_word = rest[word_start..]
            .find(char::is_whitespace)
            .map(|i| word_start + i)
            .unwrap_or(rest.len());
        let next_word = rest[after_word..]
            .find(|c: char| !c.is_whitespace())
            .map(|i| after_word + i)
            .unwrap_or(rest.len());
        self.offset + next_word
    }
}

impl Iterator for SynthesizedChunks {
    type Item = ResponseChunk;

    fn next(&mut self) -> Option<ResponseChunk> {
        if self.offset < self.text.len() {
            let end = self.next_token_end();
            let delta = self.text[self.offset..end].to_string();
            self.offset = end;
            return Some(self.header.chunk(delta, None));
        }
        let finish_reason = self.finish_reason.take()?;
        Some(self.header.chunk(String::new(), Some(finish_reason)))
    }
}

/// Stream `text` as token chunks followed by one terminal chunk.
pub fn synthesize(header: ChunkHeader, text: &str, finish_reason: &str) -> ChunkStream {
    let chunks = SynthesizedChunks::new(header, text, finish_reason);
    Box::pin(stream::iter(chunks.map(Ok)))
}

/// Stream the first choice of a finished result.
pub fn synthesize_result(result: &CompletionResult) -> ChunkStream {
    synthesize(
        ChunkHeader::from_result(result),
        result.content(),
        result.finish_reason().unwrap_or(FINISH_STOP),
    )
}

#[derive(Debug, Default, Deserialize)]
struct UpstreamChunk {
    id: Option<String>,
    created: Option<i64>,
    model: Option<String>,
    #[serde(default)]
    choices: Vec<UpstreamChoice>,
}

#[derive(Debug, Default, Deserialize)]
struct UpstreamChoice {
    #[serde(default)]
    delta: UpstreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UpstreamDelta {
    content: Option<String>,
}

fn parse_frame(payload: &str) -> Result<UpstreamChunk> {
    serde_json::from_str(payload).map_err(|err| SncError::MalformedUpstreamFrame(err.to_string()))
}

/// Maps upstream event-stream lines to chunks.
///
/// The line source is dropped as soon as the sentinel, the end of input, or
/// an error is reached, which releases the underlying connection. Dropping the
/// translator early does the same.
pub struct Passthrough<S> {
    lines: Option<S>,
    fallback: ChunkHeader,
    header: Option<ChunkHeader>,
}

impl<S> Passthrough<S> {
    pub fn new(lines: S, fallback: ChunkHeader) -> Self {
        Self {
            lines: Some(lines),
            fallback,
            header: None,
        }
    }

    fn translate(&mut self, frame: UpstreamChunk) -> ResponseChunk {
        let header = self.header.get_or_insert_with(|| ChunkHeader {
            id: frame.id.clone().unwrap_or_else(|| self.fallback.id.clone()),
            created: frame.created.unwrap_or(self.fallback.created),
            model: frame
                .model
                .clone()
                .unwrap_or_else(|| self.fallback.model.clone()),
        });
        let choice = frame.choices.into_iter().next().unwrap_or_default();
        ResponseChunk {
            id: frame.id.unwrap_or_else(|| header.id.clone()),
            created: frame.created.unwrap_or(header.created),
            model: frame.model.unwrap_or_else(|| header.model.clone()),
            delta: choice.delta.content.unwrap_or_default(),
            finish_reason: choice.finish_reason,
        }
    }
}

impl<S, E> Stream for Passthrough<S>
where
    S: Stream<Item = std::result::Result<String, E>> + Unpin,
    E: Display,
{
    type Item = Result<ResponseChunk>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let Some(lines) = self.lines.as_mut() else {
                return Poll::Ready(None);
            };
            let line = match Pin::new(lines).poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => {
                    self.lines = None;
                    return Poll::Ready(None);
                }
                Poll::Ready(Some(Err(err))) => {
                    self.lines = None;
                    return Poll::Ready(Some(Err(SncError::transport(None, err.to_string()))));
                }
                Poll::Ready(Some(Ok(line))) => line,
            };

            match parse_line(&line) {
                SseLine::Other => continue,
                SseLine::Done => {
                    self.lines = None;
                    return Poll::Ready(None);
                }
                SseLine::Data(payload) => match parse_frame(payload) {
                    Ok(frame) => return Poll::Ready(Some(Ok(self.translate(frame)))),
                    Err(err) => {
                        tracing::debug!(%err, payload, "skipping upstream frame");
                        continue;
                    }
                },
            }
        }
    }
}

/// Stream upstream event lines as chunks.
pub fn passthrough<S, E>(lines: S, fallback: ChunkHeader) -> ChunkStream
where
    S: Stream<Item = std::result::Result<String, E>> + Unpin + Send + 'static,
    E: Display + 'static,
{
    Box::pin(Passthrough::new(lines, fallback))
}

/// Drain a chunk stream into the text it carries.
pub async fn accumulate(mut chunks: ChunkStream) -> Result<String> {
    let mut text = String::new();
    while let Some(chunk) = chunks.next().await {
        text.push_str(&chunk?.delta);
    }
    Ok(text)
}

pub(crate) fn fallback_header(model: &str) -> ChunkHeader {
    ChunkHeader::new(crate::completion::completion_id(), now_epoch(), model)
}
