//! Multipart frame codec used on the intake TCP transport.
//!
//! A frame on the wire is a big-endian `u32` part count followed by each
//! part as a big-endian `u32` length and that many bytes. Publishers send
//! either a single document part, or a topic part followed by the document.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use eavlog_core::error::{EavlogError, Result};

pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;
pub const MAX_PARTS: usize = 16;

const PREFIX: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    parts: Vec<Bytes>,
}

impl RawFrame {
    pub fn document(document: impl Into<Bytes>) -> Self {
        Self {
            parts: vec![document.into()],
        }
    }

    pub fn with_topic(topic: impl Into<Bytes>, document: impl Into<Bytes>) -> Self {
        Self {
            parts: vec![topic.into(), document.into()],
        }
    }

    pub fn from_parts(parts: Vec<Bytes>) -> Self {
        Self { parts }
    }

    pub fn parts(&self) -> &[Bytes] {
        &self.parts
    }

    /// The record document carried by this frame. A leading topic part is
    /// ignored; any other shape is rejected.
    pub fn into_document(mut self) -> Result<Bytes> {
        match self.parts.len() {
            1 | 2 => Ok(self.parts.pop().unwrap_or_default()),
            n => Err(EavlogError::Ingest(format!(
                "frame has {n} parts, expected a document with an optional topic"
            ))),
        }
    }

    pub fn encoded_len(&self) -> usize {
        PREFIX + self.parts.iter().map(|p| PREFIX + p.len()).sum::<usize>()
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_u32(self.parts.len() as u32);
        for part in &self.parts {
            dst.put_u32(part.len() as u32);
            dst.put_slice(part);
        }
    }

    /// Takes one complete frame off the front of `src`.
    ///
    /// Returns `Ok(None)` while the frame is still incomplete. Errors mean the
    /// stream can no longer be trusted to be in sync and should be closed.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>> {
        let Some(total) = peek_frame_len(src)? else {
            return Ok(None);
        };

        let mut frame = src.split_to(total);
        let count = frame.get_u32() as usize;
        let mut parts = Vec::with_capacity(count);
        for _ in 0..count {
            let len = frame.get_u32() as usize;
            parts.push(frame.split_to(len).freeze());
        }
        Ok(Some(Self { parts }))
    }
}

fn peek_frame_len(src: &[u8]) -> Result<Option<usize>> {
    if src.len() < PREFIX {
        return Ok(None);
    }
    let count = read_u32(src, 0);
    if count == 0 || count > MAX_PARTS {
        return Err(EavlogError::Ingest(format!(
            "frame declares {count} parts (limit {MAX_PARTS})"
        )));
    }

    let mut offset = PREFIX;
    for _ in 0..count {
        if src.len() < offset + PREFIX {
            return Ok(None);
        }
        let len = read_u32(src, offset);
        offset += PREFIX + len;
        if offset > MAX_FRAME_SIZE {
            return Err(EavlogError::Ingest(format!(
                "frame exceeds {MAX_FRAME_SIZE} bytes"
            )));
        }
    }

    if src.len() < offset {
        return Ok(None);
    }
    Ok(Some(offset))
}

fn read_u32(src: &[u8], at: usize) -> usize {
    u32::from_be_bytes([src[at], src[at + 1], src[at + 2], src[at + 3]]) as usize
}
