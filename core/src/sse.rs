//! Line framing for `text/event-stream` bodies.
//!
//! Only `data:` lines matter to chat-completion streams; everything else
//! (comments, `event:`, `id:`, blank separators) is classified so callers
//! can skip it.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::Stream;

pub const DATA_PREFIX: &str = "data:";
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine<'a> {
    /// Payload of a `data:` line, prefix and one leading space stripped.
    Data(&'a str),
    /// The end-of-stream sentinel carried in a `data:` line.
    Done,
    /// Blank lines, comments and fields other than `data`.
    Other,
}

pub fn parse_line(line: &str) -> SseLine<'_> {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return SseLine::Other;
    };
    let payload = payload.strip_prefix(' ').unwrap_or(payload);
    if payload.trim() == DONE_SENTINEL {
        SseLine::Done
    } else {
        SseLine::Data(payload)
    }
}

/// Splits a byte stream into text lines, handling `\n` and `\r\n`.
///
/// Bytes are buffered until a newline arrives, so multi-byte characters split
/// across network reads are decoded intact. Each poll reads from the inner
/// stream only when no complete line is buffered.
pub struct LineStream<S> {
    inner: S,
    buffer: BytesMut,
    done: bool,
}

impl<S> LineStream<S> {
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: BytesMut::new(),
            done: false,
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.buffer.iter().position(|byte| *byte == b'\n')?;
        let mut line = self.buffer.split_to(end + 1);
        line.truncate(end);
        if line.last() == Some(&b'\r') {
            line.truncate(end - 1);
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

impl<S, E> Stream for LineStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<String, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(line) = self.take_line() {
                return Poll::Ready(Some(Ok(line)));
            }
            if self.done {
                if self.buffer.is_empty() {
                    return Poll::Ready(None);
                }
                let rest = self.buffer.split();
                return Poll::Ready(Some(Ok(String::from_utf8_lossy(&rest).into_owned())));
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => self.buffer.extend_from_slice(&bytes),
                Poll::Ready(Some(Err(err))) => return Poll::Ready(Some(Err(err))),
                Poll::Ready(None) => self.done = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
