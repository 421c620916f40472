//! RecordIO framing for the subscription event stream.
//!
//! The response body of a SUBSCRIBE call is a sequence of records. Each record
//! is its payload length as ASCII decimal digits, immediately followed by that
//! many payload bytes. The next record's length follows the payload with no
//! separator:
//!
//! ```text
//! 21{"type":"HEARTBEAT"}0104{"type":"SUBSCRIBED",...}
//! ```
//!
//! The decoder also accepts the `len\n` form written by the resource manager
//! (one line feed between the length and the payload) and CR/LF bytes between
//! records. Decimal lengths never carry leading zeros, so a `0` digit always
//! closes a zero-length record on its own. Zero-length records are consumed
//! and never yielded.
//!
//! Because the length is delimited by the first non-digit byte, a payload
//! must not begin with an ASCII digit or a line feed. Event payloads are JSON
//! objects and always begin with `{`.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

/// Largest record accepted from the stream.
pub const MAX_RECORD_LEN: usize = 64 * 1024 * 1024;

/// Longest decimal length prefix accepted before giving up.
const MAX_LENGTH_DIGITS: usize = 10;

/// Framing errors. Every variant ends the current stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// A byte other than a decimal digit where a length prefix was expected.
    #[error("invalid length prefix: unexpected byte 0x{found:02x}")]
    InvalidLength { found: u8 },

    /// The length prefix exceeds [`MAX_RECORD_LEN`].
    #[error("record length {length} exceeds limit of {} bytes", MAX_RECORD_LEN)]
    TooLarge { length: String },

    /// The stream ended inside a record.
    #[error("stream ended mid-record: expected {expected} bytes, got {available}")]
    Truncated { expected: usize, available: usize },
}

/// Incremental RecordIO decoder.
///
/// Feed bytes into a `BytesMut` and call [`RecordIoDecoder::decode`] until it
/// returns `Ok(None)`; at end of input call [`RecordIoDecoder::finish`].
#[derive(Debug, Default)]
pub struct RecordIoDecoder {
    /// Length of the record whose payload is still being buffered.
    pending: Option<usize>,
}

impl RecordIoDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes the next non-empty record from `buf`.
    ///
    /// Returns `Ok(None)` when `buf` does not yet hold a complete record.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        loop {
            let len = match self.pending {
                Some(len) => len,
                None => match Self::decode_length(buf)? {
                    Some(len) => {
                        self.pending = Some(len);
                        len
                    }
                    None => return Ok(None),
                },
            };

            if buf.len() < len {
                return Ok(None);
            }

            self.pending = None;
            let payload = buf.split_to(len).freeze();
            if payload.is_empty() {
                continue;
            }
            return Ok(Some(payload));
        }
    }

    /// Checks that no partial record is left once the input has ended.
    pub fn finish(&self, buf: &BytesMut) -> Result<(), FrameError> {
        if let Some(expected) = self.pending {
            return Err(FrameError::Truncated {
                expected,
                available: buf.len(),
            });
        }

        let rest = buf.iter().filter(|b| !matches!(b, b'\r' | b'\n')).count();
        if rest > 0 {
            // A length prefix with no payload behind it.
            return Err(FrameError::Truncated {
                expected: std::str::from_utf8(buf)
                    .ok()
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(0),
                available: 0,
            });
        }

        Ok(())
    }

    fn decode_length(buf: &mut BytesMut) -> Result<Option<usize>, FrameError> {
        let separators = buf
            .iter()
            .take_while(|b| matches!(b, b'\r' | b'\n'))
            .count();
        buf.advance(separators);

        let Some(&first) = buf.first() else {
            return Ok(None);
        };

        if first == b'0' {
            buf.advance(1);
            Self::skip_delimiter(buf);
            return Ok(Some(0));
        }

        if !first.is_ascii_digit() {
            return Err(FrameError::InvalidLength { found: first });
        }

        let digits = buf.iter().take_while(|b| b.is_ascii_digit()).count();
        if digits > MAX_LENGTH_DIGITS {
            return Err(FrameError::TooLarge {
                length: String::from_utf8_lossy(&buf[..digits]).into_owned(),
            });
        }

        if digits == buf.len() {
            // The prefix may continue in the next chunk.
            return Ok(None);
        }

        let text = String::from_utf8_lossy(&buf[..digits]).into_owned();
        let len: usize = text
            .parse()
            .map_err(|_| FrameError::TooLarge { length: text.clone() })?;
        if len > MAX_RECORD_LEN {
            return Err(FrameError::TooLarge { length: text });
        }

        buf.advance(digits);
        Self::skip_delimiter(buf);
        Ok(Some(len))
    }

    fn skip_delimiter(buf: &mut BytesMut) {
        if buf.first() == Some(&b'\n') {
            buf.advance(1);
        }
    }
}

/// Encodes one record as `len || payload`.
pub fn encode(payload: &[u8]) -> Bytes {
    let prefix = payload.len().to_string();
    let mut out = BytesMut::with_capacity(prefix.len() + payload.len());
    out.extend_from_slice(prefix.as_bytes());
    out.extend_from_slice(payload);
    out.freeze()
}

/// Decodes a complete in-memory stream.
pub fn decode_all(input: &[u8]) -> Result<Vec<Bytes>, FrameError> {
    let mut decoder = RecordIoDecoder::new();
    let mut buf = BytesMut::from(input);
    let mut records = Vec::new();

    while let Some(record) = decoder.decode(&mut buf)? {
        records.push(record);
    }
    decoder.finish(&buf)?;

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_back_to_back_records() {
        let input = br#"21{"type":"HEARTBEAT"}21{"type":"HEARTBEAT"}"#;
        let records = decode_all(input).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][..], br#"{"type":"HEARTBEAT"}"#.as_slice());
    }

    #[test]
    fn test_newline_after_length() {
        let input = b"5\n{abc}3\n{x}";
        let records = decode_all(input).unwrap();
        assert_eq!(records, vec![Bytes::from_static(b"{abc}"), Bytes::from_static(b"{x}")]);
    }

    #[test]
    fn test_zero_length_records_are_skipped() {
        let input = b"05{abc}003{x}0";
        let records = decode_all(input).unwrap();
        assert_eq!(records, vec![Bytes::from_static(b"{abc}"), Bytes::from_static(b"{x}")]);
    }

    #[test]
    fn test_split_across_chunks() {
        let mut decoder = RecordIoDecoder::new();
        let mut buf = BytesMut::new();

        buf.extend_from_slice(b"1");
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"1{\"a\":");
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"\"bcd\"}3{}}");
        assert_eq!(
            decoder.decode(&mut buf).unwrap(),
            Some(Bytes::from_static(b"{\"a\":\"bcd\"}"))
        );
        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(Bytes::from_static(b"{}}")));
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        decoder.finish(&buf).unwrap();
    }

    #[test]
    fn test_non_numeric_prefix() {
        let err = decode_all(b"x5{abc}").unwrap_err();
        assert_eq!(err, FrameError::InvalidLength { found: b'x' });
    }

    #[test]
    fn test_truncated_payload() {
        let err = decode_all(b"10{abc}").unwrap_err();
        assert_eq!(
            err,
            FrameError::Truncated {
                expected: 10,
                available: 5
            }
        );
    }

    #[test]
    fn test_dangling_length() {
        let err = decode_all(b"5{abc}12").unwrap_err();
        assert!(matches!(err, FrameError::Truncated { expected: 12, .. }));
    }

    #[test]
    fn test_oversized_length() {
        let err = decode_all(b"99999999999{").unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { .. }));
    }

    proptest! {
        #[test]
        fn prop_encoded_sequence_decodes_in_order(
            payloads in proptest::collection::vec("([{a-z][a-z0-9{}:,\" ]{0,40})?", 0..16),
            split in 0usize..64,
        ) {
            let mut stream = Vec::new();
            for payload in &payloads {
                stream.extend_from_slice(&encode(payload.as_bytes()));
            }

            let mut decoder = RecordIoDecoder::new();
            let mut buf = BytesMut::new();
            let mut decoded = Vec::new();
            let split = split.min(stream.len());

            for chunk in [&stream[..split], &stream[split..]] {
                buf.extend_from_slice(chunk);
                while let Some(record) = decoder.decode(&mut buf).unwrap() {
                    decoded.push(String::from_utf8(record.to_vec()).unwrap());
                }
            }
            decoder.finish(&buf).unwrap();

            let expected: Vec<String> = payloads.into_iter().filter(|p| !p.is_empty()).collect();
            prop_assert_eq!(decoded, expected);
        }
    }
}
