//! SSE (Server-Sent Events) re-framing.
//!
//! The backend flushes its event stream in arbitrary chunk sizes, so lines
//! routinely split across network reads. This wrapper reassembles complete
//! lines from a carry buffer, rewrites each `data:` frame (injecting a
//! session id when the backend omits one, dropping fields the downstream
//! dialect does not know), and re-emits it with the blank-line terminator
//! strict consumers require. Anything that fails to parse is forwarded
//! untouched; the stream never drops client-visible bytes.

use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

const DATA_PREFIX: &[u8] = b"data: ";
const DONE_LINE: &[u8] = b"data: [DONE]";

/// Per-session counters, shared with whoever wants to observe throughput.
/// Counts never cross sessions; there is no process-global tally here.
#[derive(Debug)]
pub struct StreamStats {
    tokens: AtomicU64,
    started: Instant,
}

impl StreamStats {
    fn new() -> Self {
        Self {
            tokens: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Number of successfully parsed data frames so far.
    pub fn tokens(&self) -> u64 {
        self.tokens.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }
}

/// Wraps a byte-chunk stream and yields re-framed event-stream bytes in the
/// same order, one output chunk per input chunk that completed lines.
pub struct SseReframedStream<S> {
    inner: S,
    carry: BytesMut,
    session_id: String,
    stats: Arc<StreamStats>,
    done: bool,
}

impl<S> SseReframedStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            carry: BytesMut::new(),
            session_id: format!("chatcmpl-{}", Uuid::new_v4()),
            stats: Arc::new(StreamStats::new()),
            done: false,
        }
    }

    /// Handle to this session's counters.
    pub fn stats(&self) -> Arc<StreamStats> {
        Arc::clone(&self.stats)
    }

    /// Drains every complete line out of the carry buffer, leaving any
    /// trailing partial line for the next chunk.
    fn drain_lines(&mut self, out: &mut BytesMut) {
        while let Some(pos) = self.carry.iter().position(|b| *b == b'\n') {
            let line = self.carry.split_to(pos + 1);
            reframe_line(&line[..line.len() - 1], &self.session_id, &self.stats, out);
        }
    }
}

impl<S, E> Stream for SseReframedStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        if this.done {
            return Poll::Ready(None);
        }

        loop {
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    this.carry.extend_from_slice(&chunk);
                    let mut out = BytesMut::new();
                    this.drain_lines(&mut out);
                    if !out.is_empty() {
                        return Poll::Ready(Some(Ok(out.freeze())));
                    }
                    // No complete line yet, keep reading.
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.done = true;
                    info!(
                        tokens = this.stats.tokens(),
                        elapsed_ms = this.stats.elapsed().as_millis() as u64,
                        "event stream completed"
                    );
                    if this.carry.is_empty() {
                        return Poll::Ready(None);
                    }
                    // Backends that omit a final terminator: flush the
                    // remainder verbatim.
                    let remainder = this.carry.split().freeze();
                    return Poll::Ready(Some(Ok(remainder)));
                }
                Poll::Pending => {
                    return Poll::Pending;
                }
            }
        }
    }
}

/// Re-frames one complete line (without its trailing newline) into `out`.
fn reframe_line(line: &[u8], session_id: &str, stats: &StreamStats, out: &mut BytesMut) {
    if line == DONE_LINE {
        // End-of-stream sentinel passes through unmodified.
        out.extend_from_slice(line);
        out.extend_from_slice(b"\n");
        return;
    }

    if let Some(payload) = line.strip_prefix(DATA_PREFIX) {
        if let Ok(Value::Object(mut record)) = serde_json::from_slice::<Value>(payload) {
            if !record.contains_key("id") {
                record.insert("id".to_string(), Value::String(session_id.to_string()));
            }
            strip_unsupported_fields(&mut record);

            out.extend_from_slice(DATA_PREFIX);
            out.extend_from_slice(Value::Object(record).to_string().as_bytes());
            // Strict clients require the blank-line terminator even when the
            // backend skipped it.
            out.extend_from_slice(b"\n\n");
            stats.tokens.fetch_add(1, Ordering::Relaxed);
            return;
        }
        // Unparseable payload: forward the raw line rather than drop it.
    }

    out.extend_from_slice(line);
    out.extend_from_slice(b"\n");
}

/// Drops delta fields the downstream dialect does not recognize.
fn strip_unsupported_fields(record: &mut serde_json::Map<String, Value>) {
    if let Some(choices) = record.get_mut("choices").and_then(Value::as_array_mut) {
        for choice in choices {
            if let Some(delta) = choice.get_mut("delta").and_then(Value::as_object_mut) {
                delta.remove("reasoning_content");
            }
        }
    }
}
