//! CRLF line framing for tokio.
//!
//! The decoder accumulates bytes and yields every complete line with the
//! terminator stripped; a trailing partial line is retained across calls.
//! Lines are capped at [`MAX_LINE_LEN`] bytes so a server that never sends
//! a newline cannot grow the buffer without bound.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{self, ProtocolError};

/// Maximum line length in bytes (IRC standard, terminator included).
pub const MAX_LINE_LEN: usize = 512;

/// Line-based codec handling CRLF-terminated messages.
pub struct LineCodec {
    /// Index of next byte to check for a newline.
    next_index: usize,
    /// Maximum line length.
    max_len: usize,
}

impl LineCodec {
    /// Create a codec with the standard 512-byte line limit.
    pub fn new() -> Self {
        Self::with_max_len(MAX_LINE_LEN)
    }

    /// Create a codec with a custom line limit.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<String>> {
        if let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') {
            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if line.len() > self.max_len {
                return Err(ProtocolError::LineTooLong {
                    actual: line.len(),
                    limit: self.max_len,
                });
            }

            let text = std::str::from_utf8(&line).map_err(|e| ProtocolError::InvalidUtf8 {
                byte_pos: e.valid_up_to(),
            })?;
            Ok(Some(text.trim_end_matches(['\r', '\n']).to_owned()))
        } else {
            // No complete line yet; remember where the scan stopped.
            self.next_index = src.len();

            if src.len() > self.max_len {
                return Err(ProtocolError::LineTooLong {
                    actual: src.len(),
                    limit: self.max_len,
                });
            }

            Ok(None)
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> error::Result<()> {
        if line.contains('\r') || line.contains('\n') {
            return Err(ProtocolError::EmbeddedLineBreak);
        }
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}
