//! Server-sent-event decoding for the chat completion stream
//!
//! The endpoint writes newline-delimited frames. Only `data: ` frames carry
//! anything: either a JSON object with a `content` string or the `[DONE]`
//! sentinel. Network reads do not line up with frames, so bytes are buffered
//! until a full line is available and only then decoded as UTF-8.

use futures_util::{stream, Stream, StreamExt};
use serde::Deserialize;

use crate::error::{ClientError, ClientResult};

pub const DATA_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";

/// What a single line of the event stream amounts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A non-empty piece of assistant text
    Fragment(String),
    /// End-of-stream sentinel
    Done,
    /// Blank lines, comments, other fields, payloads without content, malformed JSON
    Skip,
}

#[derive(Deserialize)]
struct DataPayload {
    #[serde(default)]
    content: Option<String>,
}

/// Decode one line (without its trailing newline).
pub fn decode_line(line: &str) -> Frame {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        return Frame::Skip;
    };

    if data.trim_end() == DONE_SENTINEL {
        return Frame::Done;
    }

    match serde_json::from_str::<DataPayload>(data) {
        Ok(DataPayload {
            content: Some(content),
        }) if !content.is_empty() => Frame::Fragment(content),
        Ok(_) => Frame::Skip,
        Err(e) => {
            tracing::debug!(error = %e, "skipping malformed event frame");
            Frame::Skip
        }
    }
}

/// Incremental line splitter over raw response bytes
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next complete frame, or `None` when more bytes are needed.
    pub fn next_frame(&mut self) -> Option<Frame> {
        let newline = self.buffer.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=newline).collect();
        Some(Self::decode_bytes(&line[..line.len() - 1]))
    }

    /// Decode whatever is left once the connection reports end of data.
    pub fn finish(&mut self) -> Option<Frame> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        Some(Self::decode_bytes(&line))
    }

    fn decode_bytes(line: &[u8]) -> Frame {
        match std::str::from_utf8(line) {
            Ok(line) => decode_line(line),
            Err(e) => {
                tracing::debug!(error = %e, "skipping non UTF-8 event frame");
                Frame::Skip
            }
        }
    }
}

struct DecodeState<S> {
    body: S,
    decoder: SseDecoder,
    finished: bool,
}

/// Turn a byte stream into a lazy stream of text fragments.
///
/// The stream ends at the `[DONE]` sentinel or at end of data, whichever comes
/// first. A read error is yielded once and then the stream ends. The body is
/// dropped together with the returned stream.
pub fn decode_stream<S, B, E>(body: S) -> impl Stream<Item = ClientResult<String>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Into<ClientError>,
{
    let state = DecodeState {
        body,
        decoder: SseDecoder::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }

        loop {
            while let Some(frame) = state.decoder.next_frame() {
                match frame {
                    Frame::Fragment(text) => return Some((Ok(text), state)),
                    Frame::Done => {
                        tracing::debug!("event stream reached sentinel");
                        return None;
                    }
                    Frame::Skip => {}
                }
            }

            match state.body.next().await {
                Some(Ok(chunk)) => state.decoder.feed(chunk.as_ref()),
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e.into()), state));
                }
                None => {
                    state.finished = true;
                    return match state.decoder.finish() {
                        Some(Frame::Fragment(text)) => Some((Ok(text), state)),
                        _ => None,
                    };
                }
            }
        }
    })
}
