//! Frame reader over a subscription response body.

use std::fmt::Display;

use bytes::{Bytes, BytesMut};
use corral_proto::recordio::{FrameError, RecordIoDecoder};
use futures_core::Stream;
use futures_util::StreamExt;
use thiserror::Error;
use tracing::trace;

/// Errors that end a subscription stream.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Yields RecordIO payloads from a chunked byte stream.
///
/// One reader per connection. After an error or the end of the stream it
/// yields nothing further.
pub struct FrameReader<S> {
    body: S,
    buf: BytesMut,
    decoder: RecordIoDecoder,
    done: bool,
}

impl<S, E> FrameReader<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    pub fn new(body: S) -> Self {
        Self {
            body,
            buf: BytesMut::new(),
            decoder: RecordIoDecoder::new(),
            done: false,
        }
    }

    /// Returns the next payload, `Ok(None)` at a clean end of stream.
    pub async fn next_frame(&mut self) -> Result<Option<Bytes>, StreamError> {
        if self.done {
            return Ok(None);
        }

        loop {
            match self.decoder.decode(&mut self.buf) {
                Ok(Some(frame)) => {
                    trace!(len = frame.len(), "Frame decoded");
                    return Ok(Some(frame));
                }
                Ok(None) => {}
                Err(e) => {
                    self.done = true;
                    return Err(e.into());
                }
            }

            match self.body.next().await {
                Some(Ok(chunk)) => self.buf.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    self.done = true;
                    return Err(StreamError::Transport(e.to_string()));
                }
                None => {
                    self.done = true;
                    self.decoder.finish(&self.buf)?;
                    return Ok(None);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn reader(
        chunks: Vec<Result<&'static str, &'static str>>,
    ) -> FrameReader<impl Stream<Item = Result<Bytes, &'static str>> + Unpin> {
        FrameReader::new(stream::iter(
            chunks
                .into_iter()
                .map(|c| c.map(|s| Bytes::from_static(s.as_bytes())))
                .collect::<Vec<_>>(),
        ))
    }

    #[tokio::test]
    async fn test_frames_across_chunk_boundaries() {
        let mut frames = reader(vec![Ok("5{ab"), Ok("c}0"), Ok("2{}")]);

        assert_eq!(frames.next_frame().await.unwrap().unwrap(), &b"{abc}"[..]);
        assert_eq!(frames.next_frame().await.unwrap().unwrap(), &b"{}"[..]);
        assert!(frames.next_frame().await.unwrap().is_none());
        assert!(frames.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let mut frames = reader(vec![Ok("2{}"), Err("connection reset"), Ok("2{}")]);

        assert!(frames.next_frame().await.unwrap().is_some());
        let err = frames.next_frame().await.unwrap_err();
        assert!(matches!(err, StreamError::Transport(ref m) if m == "connection reset"));
        assert!(frames.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_stream_is_an_error() {
        let mut frames = reader(vec![Ok("9{ab")]);
        let err = frames.next_frame().await.unwrap_err();
        assert!(matches!(err, StreamError::Frame(FrameError::Truncated { .. })));
    }

    #[tokio::test]
    async fn test_bad_prefix_is_an_error() {
        let mut frames = reader(vec![Ok("{}")]);
        let err = frames.next_frame().await.unwrap_err();
        assert!(matches!(
            err,
            StreamError::Frame(FrameError::InvalidLength { found: b'{' })
        ));
    }
}
