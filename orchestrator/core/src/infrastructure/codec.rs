// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Newline-Delimited JSON Codec
//
// One JSON object per line in both directions. A line may arrive split across
// any number of reads; the decoder buffers until the newline. Lines that fail
// to parse are surfaced as `Frame::Malformed` so the channel can log and skip
// them without tearing down the connection. Oversized lines are reported the
// same way; a decode error would end the framed stream.

use bytes::{Buf, BufMut, BytesMut};
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};

/// Upper bound for a single inbound line.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Message(Value),
    Malformed { line: String, error: String },
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct JsonLineCodec {
    max_length: usize,
    // Bytes already scanned for a newline in the current buffer.
    next_index: usize,
    // Set while discarding the remainder of an oversized line.
    discarding: bool,
}

impl JsonLineCodec {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    fn parse_line(raw: &[u8]) -> Option<Frame> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let text = match std::str::from_utf8(raw) {
            Ok(text) => text.trim(),
            Err(e) => {
                return Some(Frame::Malformed {
                    line: String::from_utf8_lossy(raw).into_owned(),
                    error: e.to_string(),
                })
            }
        };
        if text.is_empty() {
            return None;
        }
        Some(match serde_json::from_str::<Value>(text) {
            Ok(value) => Frame::Message(value),
            Err(e) => Frame::Malformed {
                line: text.to_string(),
                error: e.to_string(),
            },
        })
    }
}

impl Default for JsonLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for JsonLineCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        loop {
            let newline = buf[self.next_index..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| self.next_index + offset);

            match newline {
                Some(index) => {
                    let line = buf.split_to(index + 1);
                    self.next_index = 0;
                    if self.discarding {
                        self.discarding = false;
                        continue;
                    }
                    match Self::parse_line(&line[..index]) {
                        Some(frame) => return Ok(Some(frame)),
                        // Blank line
                        None => continue,
                    }
                }
                None if buf.len() > self.max_length => {
                    // Drop what we have and skip to the next newline.
                    let dropped = buf.len();
                    buf.advance(dropped);
                    self.next_index = 0;
                    if !self.discarding {
                        self.discarding = true;
                        return Ok(Some(Frame::Malformed {
                            line: format!("<{} bytes>", dropped),
                            error: format!(
                                "line exceeds maximum length of {} bytes",
                                self.max_length
                            ),
                        }));
                    }
                    return Ok(None);
                }
                None => {
                    self.next_index = buf.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        // Unterminated trailing data at EOF is treated as a final line.
        if buf.is_empty() || self.discarding {
            buf.clear();
            return Ok(None);
        }
        let line = buf.split_to(buf.len());
        self.next_index = 0;
        Ok(Self::parse_line(&line))
    }
}

impl Encoder<Value> for JsonLineCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<(), CodecError> {
        let encoded = serde_json::to_vec(&item)?;
        dst.reserve(encoded.len() + 1);
        dst.put_slice(&encoded);
        dst.put_u8(b'\n');
        Ok(())
    }
}
