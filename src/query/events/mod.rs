// Server-sent events produced by a streamed query


use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::json;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Payload of the error event sent when a stream ends without a terminal event
pub const UNTERMINATED_STREAM: &str = "Answer stream ended unexpectedly";

/// One event of an answer stream.
///
/// `Display` renders the wire frame, `data: <JSON>\n\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Upstream text that was not already a `data:` line
    Answer(String),
    /// Upstream `data:` line, forwarded untouched
    Upstream(String),
    Error(String),
    Done,
}

impl ServerEvent {
    /// `Done` and `Error` close the stream
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Done)
    }

    #[inline]
    pub fn to_frame(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ServerEvent {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload = match self {
            Self::Upstream(line) => return write!(f, "{}\n\n", line),
            Self::Answer(text) => json!({ "answer": text }),
            Self::Error(message) => json!({ "error": message }),
            Self::Done => json!({ "done": true }),
        };
        let encoded = encode_json(&payload).map_err(|_| fmt::Error)?;
        write!(f, "data: {}\n\n", encoded)
    }
}

/// Serialise with `", "` and `": "` separators and every non-ASCII character
/// escaped as `\uXXXX`, matching the frames existing clients parse
pub(crate) fn encode_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    let mut buffer = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, SpacedAsciiFormatter);
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

struct SpacedAsciiFormatter;

impl Formatter for SpacedAsciiFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        let mut units = [0_u16; 2];
        for c in fragment.chars() {
            if (' '..='~').contains(&c) {
                let mut byte = [0_u8; 4];
                writer.write_all(c.encode_utf8(&mut byte).as_bytes())?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// Finite stream of [`ServerEvent`]s with exactly one terminal event.
///
/// Nothing is yielded after `Done` or `Error`. When the producer goes away
/// without a terminal event, an `Error` event is synthesised.
pub struct EventStream {
    inner: BoxStream<'static, ServerEvent>,
    finished: bool,
}

impl EventStream {
    #[inline]
    pub fn new(inner: BoxStream<'static, ServerEvent>) -> Self {
        Self {
            inner,
            finished: false,
        }
    }

    /// A stream that yields the given events in order
    #[inline]
    pub fn from_events(events: Vec<ServerEvent>) -> Self {
        Self::new(futures::stream::iter(events).boxed())
    }

    /// Drain the stream into wire frames
    #[inline]
    pub async fn into_frames(self) -> Vec<String> {
        self.map(|event| event.to_frame()).collect().await
    }
}

impl fmt::Debug for EventStream {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl Stream for EventStream {
    type Item = ServerEvent;

    #[inline]
    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ServerEvent>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match self.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    self.finished = true;
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(Some(ServerEvent::Error(UNTERMINATED_STREAM.to_string())))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
