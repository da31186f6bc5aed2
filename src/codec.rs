use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

use crate::model::CodecKind;

/// Leading magic of a checksum frame.
pub const MAGIC: u16 = 0xABCD;

/// Largest payload a frame may carry. A corrupt length field must not turn
/// into an unbounded allocation.
pub const MAX_PAYLOAD: usize = 16 * 1024 * 1024;

const HEADER_LEN: usize = 6;
const TRAILER_LEN: usize = 2;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("bad frame magic 0x{0:04x}")]
    BadMagic(u16),
    #[error("frame length {0} exceeds limit")]
    Oversized(u32),
    #[error("checksum mismatch: got 0x{got:04x}, computed 0x{computed:04x}")]
    ChecksumMismatch { got: u16, computed: u16 },
    #[error("payload is not valid utf-8")]
    InvalidUtf8,
}

/// Framing contract between the load generator and the server under test.
///
/// `decode` consumes at most one frame from `src`. `Ok(None)` means the
/// buffer does not yet hold a complete frame; the caller reads more bytes
/// and retries with the same buffer.
pub trait Codec: Send {
    fn encode(&self, payload: &str, dst: &mut BytesMut);
    fn decode(&self, src: &mut BytesMut) -> Result<Option<String>, FrameError>;
}

pub fn make(kind: CodecKind) -> Box<dyn Codec> {
    match kind {
        CodecKind::Checksum => Box::new(ChecksumCodec),
        CodecKind::Lines => Box::new(LineCodec),
    }
}

/// `[magic u16][length u32][payload][checksum u16]`, all big-endian. The
/// checksum is the wrapping byte-sum of the payload.
pub struct ChecksumCodec;

/// Wrapping byte-sum used by the checksum frame trailer.
pub fn checksum(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |sum, b| sum.wrapping_add(*b as u16))
}

impl Codec for ChecksumCodec {
    fn encode(&self, payload: &str, dst: &mut BytesMut) {
        let bytes = payload.as_bytes();
        dst.reserve(HEADER_LEN + bytes.len() + TRAILER_LEN);
        dst.put_u16(MAGIC);
        dst.put_u32(bytes.len() as u32);
        dst.put_slice(bytes);
        dst.put_u16(checksum(bytes));
    }

    fn decode(&self, src: &mut BytesMut) -> Result<Option<String>, FrameError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let magic = u16::from_be_bytes([src[0], src[1]]);
        if magic != MAGIC {
            return Err(FrameError::BadMagic(magic));
        }
        let length = u32::from_be_bytes([src[2], src[3], src[4], src[5]]);
        if length as usize > MAX_PAYLOAD {
            return Err(FrameError::Oversized(length));
        }
        let total = HEADER_LEN + length as usize + TRAILER_LEN;
        if src.len() < total {
            return Ok(None);
        }
        src.advance(HEADER_LEN);
        let payload = src.split_to(length as usize);
        let got = src.get_u16();
        let computed = checksum(&payload);
        if got != computed {
            return Err(FrameError::ChecksumMismatch { got, computed });
        }
        String::from_utf8(payload.to_vec())
            .map(Some)
            .map_err(|_| FrameError::InvalidUtf8)
    }
}

/// Newline-delimited payloads, for servers that speak plain lines.
pub struct LineCodec;

impl Codec for LineCodec {
    fn encode(&self, payload: &str, dst: &mut BytesMut) {
        dst.reserve(payload.len() + 1);
        dst.put_slice(payload.as_bytes());
        dst.put_u8(b'\n');
    }

    fn decode(&self, src: &mut BytesMut) -> Result<Option<String>, FrameError> {
        let Some(pos) = src.iter().position(|b| *b == b'\n') else {
            return Ok(None);
        };
        let line = src.split_to(pos);
        src.advance(1);
        String::from_utf8(line.to_vec())
            .map(Some)
            .map_err(|_| FrameError::InvalidUtf8)
    }
}
