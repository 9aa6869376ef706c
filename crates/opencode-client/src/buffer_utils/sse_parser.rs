use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::pin::Pin;

use super::buffering::CircularLineBuffer;
use crate::error::{ClientError, Result};

/// Largest unterminated line kept while waiting for its newline
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Strategy pattern for decoding the payloads of different SSE endpoints
pub trait SseLineParser: Send {
    type Event: Send + 'static;

    /// Decode one dispatched `data` payload; `None` skips it
    fn parse_data(&self, data: &str) -> Option<Self::Event>;
}

/// Assembles SSE lines into event payloads
///
/// `data` values accumulate (joined with `\n`) until a blank line dispatches
/// them. Comments and the `event`, `id` and `retry` fields are ignored.
#[derive(Debug, Default)]
pub struct SseFrameDecoder {
    data_lines: Vec<String>,
}

impl SseFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (without terminator); returns a payload when one is complete
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            if self.data_lines.is_empty() {
                return None;
            }
            let payload = self.data_lines.join("\n");
            self.data_lines.clear();
            return Some(payload);
        }

        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        if field == "data" {
            self.data_lines.push(value.to_string());
        }
        None
    }
}

/// Generic SSE stream parser using circular buffer
/// Applies strategy pattern for different payload types
///
/// Ends with an `Err(StreamDisconnected)` item if the byte stream fails or a
/// line grows past [`DEFAULT_MAX_LINE_BYTES`]; a clean end of the byte stream
/// simply ends the event stream.
pub fn parse_sse_stream<S, B, E, P>(
    bytes: S,
    parser: P,
) -> Pin<Box<dyn Stream<Item = Result<P::Event>> + Send>>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
    P: SseLineParser + 'static,
{
    parse_sse_stream_with_limit(bytes, parser, DEFAULT_MAX_LINE_BYTES)
}

/// [`parse_sse_stream`] with a custom cap on unterminated line length
pub fn parse_sse_stream_with_limit<S, B, E, P>(
    bytes: S,
    parser: P,
    max_line_bytes: usize,
) -> Pin<Box<dyn Stream<Item = Result<P::Event>> + Send>>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
    P: SseLineParser + 'static,
{
    Box::pin(async_stream::stream! {
        let mut byte_chunks = Box::pin(bytes);
        let mut buffer = CircularLineBuffer::with_capacity(4096);
        let mut frames = SseFrameDecoder::new();

        while let Some(chunk_result) = byte_chunks.next().await {
            match chunk_result {
                Ok(chunk) => {
                    buffer.extend(chunk.as_ref());

                    // Process all complete lines in buffer
                    while let Some(line) = buffer.next_line() {
                        if let Some(payload) = frames.push_line(&line) {
                            if let Some(event) = parser.parse_data(&payload) {
                                yield Ok(event);
                            }
                        }
                    }

                    if buffer.len() > max_line_bytes {
                        yield Err(ClientError::StreamDisconnected(format!(
                            "line exceeds {} bytes without a newline",
                            max_line_bytes
                        )));
                        break;
                    }
                }
                Err(e) => {
                    yield Err(ClientError::StreamDisconnected(format!("Stream error: {}", e)));
                    break;
                }
            }
        }
    })
}
