//! Server-Sent Events (SSE) frame decoding.
//!
//! Frames are separated by a blank line. Inside a frame, `event:` names the
//! event (last one wins) and every `data:` line is trimmed and appended to the
//! payload with no separator. Other lines are ignored.
//!
//! ```text
//! event: token
//! data: Hello
//!
//! event: token
//! data: , world
//!
//! ```
//!
//! The decoder is incremental: bytes may arrive split at any position,
//! including inside a multi-byte character, and a frame is emitted as soon as
//! its terminating blank line has been seen. A trailing frame without that
//! blank line is dropped when the input ends.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use tracing::debug;

use crate::client::ClientError;
use crate::model::{StreamFrame, DEFAULT_EVENT};

const FRAME_DELIMITER: &str = "\n\n";

/// Stateful UTF-8 decoder that carries incomplete sequences across reads.
///
/// Invalid sequences are replaced by U+FFFD.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Incomplete sequence at the end: keep it for the next read.
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
    }
}

/// Incremental event-stream parser.
///
/// Between feeds the parser holds at most one partially received frame.
///
/// # Example
/// ```
/// use plainclause::sse::FrameParser;
///
/// let mut parser = FrameParser::new();
/// assert!(parser.feed(b"event: token\ndata: He").is_empty());
///
/// let frames = parser.feed(b"llo\n\n");
/// assert_eq!(frames.len(), 1);
/// assert_eq!(frames[0].event, "token");
/// assert_eq!(frames[0].data, "Hello");
/// ```
#[derive(Debug, Default)]
pub struct FrameParser {
    decoder: Utf8Decoder,
    buffer: String,
    /// Prefix of `buffer` known not to contain a delimiter.
    scanned: usize,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return every frame completed by them, in order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamFrame> {
        let text = self.decoder.decode(bytes);
        self.feed_str(&text)
    }

    /// Feed already decoded text.
    pub fn feed_str(&mut self, text: &str) -> Vec<StreamFrame> {
        self.buffer.push_str(text);

        let mut frames = Vec::new();
        loop {
            // A delimiter may straddle the end of the previous scan.
            let mut from = self.scanned.saturating_sub(FRAME_DELIMITER.len() - 1);
            while !self.buffer.is_char_boundary(from) {
                from -= 1;
            }

            match self.buffer[from..].find(FRAME_DELIMITER) {
                Some(offset) => {
                    let pos = from + offset;
                    frames.push(parse_frame(&self.buffer[..pos]));
                    self.buffer.drain(..pos + FRAME_DELIMITER.len());
                    self.scanned = 0;
                }
                None => {
                    self.scanned = self.buffer.len();
                    break;
                }
            }
        }
        frames
    }

    /// Text received after the last complete frame.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Signal end of input. An unterminated trailing frame is discarded.
    pub fn finish(&mut self) {
        if !self.buffer.is_empty() || !self.decoder.pending.is_empty() {
            debug!(
                "Discarding {} bytes of unterminated SSE frame",
                self.buffer.len() + self.decoder.pending.len()
            );
        }
        self.buffer.clear();
        self.scanned = 0;
        self.decoder.pending.clear();
    }
}

/// Parse the text of a single frame (without its delimiter).
///
/// # Example
/// ```
/// use plainclause::sse::parse_frame;
///
/// let frame = parse_frame("event: token\ndata: foo\ndata: bar");
/// assert_eq!(frame.event, "token");
/// assert_eq!(frame.data, "foobar");
///
/// assert_eq!(parse_frame("data: x").event, "message");
/// ```
pub fn parse_frame(text: &str) -> StreamFrame {
    let mut event = DEFAULT_EVENT.to_string();
    let mut data = String::new();

    for line in text.split('\n') {
        if let Some(name) = line.strip_prefix("event:") {
            event = name.trim().to_string();
        } else if let Some(payload) = line.strip_prefix("data:") {
            data.push_str(payload.trim());
        }
    }

    StreamFrame { event, data }
}

/// Turn a byte stream into a stream of frames.
///
/// Read errors are forwarded as they occur. The frame stream ends when the
/// byte stream ends.
pub fn frames<S, E>(byte_stream: S) -> impl Stream<Item = Result<StreamFrame, ClientError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<ClientError>,
{
    stream::unfold(
        (Box::pin(byte_stream), FrameParser::new(), VecDeque::new()),
        |(mut byte_stream, mut parser, mut ready)| async move {
            loop {
                if let Some(frame) = ready.pop_front() {
                    return Some((Ok(frame), (byte_stream, parser, ready)));
                }

                match byte_stream.next().await {
                    Some(Ok(chunk)) => ready.extend(parser.feed(&chunk)),
                    Some(Err(e)) => {
                        return Some((Err(e.into()), (byte_stream, parser, ready)));
                    }
                    None => {
                        parser.finish();
                        return None;
                    }
                }
            }
        },
    )
}

/// Extension trait for `reqwest::Response` to read its body as SSE frames.
///
/// # Example
/// ```ignore
/// use plainclause::sse::SseResponseExt;
///
/// let response = client.post(url).send().await?;
/// let mut frames = Box::pin(response.sse_frames());
/// while let Some(frame) = frames.next().await {
///     let frame = frame?;
///     println!("{}: {}", frame.event, frame.data);
/// }
/// ```
pub trait SseResponseExt {
    fn sse_frames(self) -> impl Stream<Item = Result<StreamFrame, ClientError>> + Send;
}

impl SseResponseExt for reqwest::Response {
    fn sse_frames(self) -> impl Stream<Item = Result<StreamFrame, ClientError>> + Send {
        frames(self.bytes_stream())
    }
}
