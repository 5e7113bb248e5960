//! Server-sent event decoding shared by every provider adapter.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures_core::Stream;
use futures_util::StreamExt;

use crate::error::LLMError;
use crate::http::HttpBodyStream;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The event's `data:` lines joined with `\n`.
    Data(String),
    /// The OpenAI-style `[DONE]` sentinel.
    Done,
}

/// Line-oriented SSE state, fed raw body bytes.
///
/// Only `data:` fields matter to the vendors handled here; `event:`, `id:` and comment
/// lines are ignored. An event is dispatched on a blank line, or at end of body.
#[derive(Debug, Default)]
struct SseParser {
    buffer: Vec<u8>,
    data: Option<Vec<u8>>,
}

impl SseParser {
    /// Appends `bytes` and returns every payload they complete, in order.
    fn feed(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        // The carried-over tail holds no newline, so only the new bytes need scanning.
        let mut search_from = self.buffer.len();
        self.buffer.extend_from_slice(bytes);
        let buffer = std::mem::take(&mut self.buffer);

        let mut payloads = Vec::new();
        let mut start = 0;
        while let Some(offset) = buffer[search_from..].iter().position(|byte| *byte == b'\n') {
            let end = search_from + offset;
            let line = &buffer[start..end];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            payloads.extend(self.line(line));
            start = end + 1;
            search_from = start;
        }

        self.buffer = buffer;
        self.buffer.drain(..start);
        payloads
    }

    /// Flushes an event the body left unterminated.
    fn finish(&mut self) -> Option<Vec<u8>> {
        let rest = std::mem::take(&mut self.buffer);
        if !rest.is_empty() {
            self.line(&rest);
        }
        self.dispatch()
    }

    fn line(&mut self, line: &[u8]) -> Option<Vec<u8>> {
        if line.is_empty() {
            return self.dispatch();
        }
        if let Some(value) = line.strip_prefix(b"data:") {
            let value = value.strip_prefix(b" ").unwrap_or(value);
            match &mut self.data {
                Some(data) => {
                    data.push(b'\n');
                    data.extend_from_slice(value);
                }
                None => self.data = Some(value.to_vec()),
            }
        }
        None
    }

    fn dispatch(&mut self) -> Option<Vec<u8>> {
        self.data.take().filter(|data| !data.is_empty())
    }
}

/// Turns a chat response body into [`StreamEvent`]s.
///
/// Ends after `[DONE]`, after a transport error, or when the body ends.
pub struct StreamDecoder {
    body: HttpBodyStream,
    parser: SseParser,
    pending: VecDeque<Vec<u8>>,
    provider: &'static str,
    finished: bool,
}

impl StreamDecoder {
    pub fn new(body: HttpBodyStream, provider: &'static str) -> Self {
        Self {
            body,
            parser: SseParser::default(),
            pending: VecDeque::new(),
            provider,
            finished: false,
        }
    }

    fn event(&mut self, payload: Vec<u8>) -> Result<StreamEvent, LLMError> {
        let data = String::from_utf8(payload).map_err(|err| LLMError::Provider {
            provider: self.provider,
            message: format!("invalid UTF-8 in stream chunk: {err}"),
        })?;
        if data.trim() == "[DONE]" {
            self.finished = true;
            self.pending.clear();
            return Ok(StreamEvent::Done);
        }
        Ok(StreamEvent::Data(data))
    }
}

impl Stream for StreamDecoder {
    type Item = Result<StreamEvent, LLMError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(payload) = this.pending.pop_front() {
                return Poll::Ready(Some(this.event(payload)));
            }
            if this.finished {
                return Poll::Ready(None);
            }
            match ready!(this.body.as_mut().poll_next(cx)) {
                Some(Ok(bytes)) => {
                    let payloads = this.parser.feed(&bytes);
                    this.pending.extend(payloads);
                }
                Some(Err(err)) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(err)));
                }
                None => {
                    this.finished = true;
                    let tail = this.parser.finish();
                    this.pending.extend(tail);
                }
            }
        }
    }
}

/// What an adapter wants done with one decoded SSE payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PayloadAction {
    /// Yield a text fragment.
    Emit(String),
    /// Nothing visible in this payload (role headers, pings, usage).
    Skip,
    /// Vendor-specific end-of-stream marker.
    Finish,
}

/// Maps decoded SSE payloads to text fragments through a per-vendor parser.
///
/// The stream ends after the first error, the `[DONE]` marker, or a
/// [`PayloadAction::Finish`]; empty fragments are never yielded. Vendors that always
/// close with a marker call [`TextFragmentStream::require_end_marker`], so a body cut
/// short yields [`LLMError::StreamClosed`] instead of ending cleanly.
pub(crate) struct TextFragmentStream<F> {
    decoder: StreamDecoder,
    parse: F,
    provider: &'static str,
    marker_required: bool,
    marker_seen: bool,
    finished: bool,
}

impl<F> TextFragmentStream<F>
where
    F: FnMut(&str) -> Result<PayloadAction, LLMError> + Send + Unpin,
{
    pub(crate) fn new(body: HttpBodyStream, provider: &'static str, parse: F) -> Self {
        Self {
            decoder: StreamDecoder::new(body, provider),
            parse,
            provider,
            marker_required: false,
            marker_seen: false,
            finished: false,
        }
    }

    pub(crate) fn require_end_marker(mut self) -> Self {
        self.marker_required = true;
        self
    }
}

impl<F> Stream for TextFragmentStream<F>
where
    F: FnMut(&str) -> Result<PayloadAction, LLMError> + Send + Unpin,
{
    type Item = Result<String, LLMError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.finished {
                return Poll::Ready(None);
            }
            let event = match this.decoder.poll_next_unpin(cx) {
                Poll::Ready(event) => event,
                Poll::Pending => return Poll::Pending,
            };
            match event {
                Some(Ok(StreamEvent::Data(data))) => match (this.parse)(&data) {
                    Ok(PayloadAction::Emit(text)) if !text.is_empty() => {
                        return Poll::Ready(Some(Ok(text)));
                    }
                    Ok(PayloadAction::Emit(_)) | Ok(PayloadAction::Skip) => {}
                    Ok(PayloadAction::Finish) => {
                        this.marker_seen = true;
                        this.finished = true;
                    }
                    Err(err) => {
                        this.finished = true;
                        return Poll::Ready(Some(Err(err)));
                    }
                },
                Some(Ok(StreamEvent::Done)) => {
                    this.marker_seen = true;
                    this.finished = true;
                }
                None => {
                    this.finished = true;
                    if this.marker_required && !this.marker_seen {
                        return Poll::Ready(Some(Err(LLMError::StreamClosed {
                            message: format!(
                                "{} response ended before its end-of-stream marker",
                                this.provider
                            ),
                        })));
                    }
                }
                Some(Err(err)) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(err)));
                }
            }
        }
    }
}

/// Drains a body completely, used to read error payloads from failed stream requests.
pub(crate) async fn collect_stream_text(
    mut body: HttpBodyStream,
    provider: &'static str,
) -> Result<String, LLMError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = body.next().await {
        bytes.extend_from_slice(&chunk?);
    }
    String::from_utf8(bytes).map_err(|err| LLMError::Provider {
        provider,
        message: format!("failed to decode stream error body: {err}"),
    })
}
