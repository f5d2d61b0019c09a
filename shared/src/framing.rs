//! Recovers discrete JSON documents from a byte stream.
//!
//! The wire carries back-to-back JSON objects with no length prefix, so a
//! single read may hold half a message, several messages, or both. The
//! [`Framer`] buffers whatever arrives and hands out one complete document at a
//! time, as the exact bytes the sender wrote.
//!
//! Every message is a JSON object, so anything ahead of the next `{` is
//! discarded, as is any byte that makes an object unparseable. A buffer that stays incomplete past the
//! configured limit is reported as [`FrameError::Oversized`] so the owner can
//! drop the connection instead of growing without bound.

use log::debug;
use serde::de::IgnoredAny;
use thiserror::Error;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("incomplete frame of {len} bytes exceeds limit of {limit} bytes")]
    Oversized { len: usize, limit: usize },
}

#[derive(Debug)]
pub struct Framer {
    buffer: Vec<u8>,
    /// Offset of the first unconsumed byte in `buffer`
    start: usize,
    max_frame_bytes: usize,
    discarded: u64,
}

impl Framer {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            start: 0,
            max_frame_bytes,
            discarded: 0,
        }
    }

    /// Appends freshly received bytes to the pending buffer
    pub fn push(&mut self, bytes: &[u8]) {
        if self.start > 0 {
            self.buffer.drain(..self.start);
            self.start = 0;
        }
        self.buffer.extend_from_slice(bytes);
    }

    /// Extracts the next complete document, if one is buffered.
    ///
    /// Returns `Ok(None)` when the buffer is empty or holds only the beginning
    /// of a document. The partial bytes stay buffered for the next call.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        loop {
            self.skip_whitespace();
            let pending = &self.buffer[self.start..];
            if pending.is_empty() {
                return Ok(None);
            }
            if pending[0] != b'{' {
                let skip = pending
                    .iter()
                    .position(|&b| b == b'{')
                    .unwrap_or(pending.len());
                debug!("Discarding {} bytes before next object", skip);
                self.start += skip;
                self.discarded += skip as u64;
                continue;
            }

            let mut documents =
                serde_json::Deserializer::from_slice(pending).into_iter::<IgnoredAny>();
            match documents.next() {
                Some(Ok(_)) => {
                    let end = documents.byte_offset();
                    let frame = pending[..end].to_vec();
                    self.start += end;
                    return Ok(Some(frame));
                }
                Some(Err(e)) if e.is_eof() => {
                    if pending.len() > self.max_frame_bytes {
                        return Err(FrameError::Oversized {
                            len: pending.len(),
                            limit: self.max_frame_bytes,
                        });
                    }
                    return Ok(None);
                }
                Some(Err(e)) => {
                    debug!("Discarding unparseable byte 0x{:02x}: {}", pending[0], e);
                    self.start += 1;
                    self.discarded += 1;
                }
                None => return Ok(None),
            }
        }
    }

    /// Drains every complete document currently buffered
    pub fn drain_frames(&mut self) -> Result<Vec<Vec<u8>>, FrameError> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Number of buffered bytes not yet handed out
    pub fn buffered(&self) -> usize {
        self.buffer.len() - self.start
    }

    /// Total garbage bytes skipped so far
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }

    fn skip_whitespace(&mut self) {
        while self
            .buffer
            .get(self.start)
            .map_or(false, |b| b.is_ascii_whitespace())
        {
            self.start += 1;
        }
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}
