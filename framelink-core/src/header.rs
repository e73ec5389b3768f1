//! Wire headers shared by both frame channels.
//!
//! ## Wire format
//!
//! **Reliable stream** (repeated per frame):
//! ```text
//! length:   i32  (4)
//! payload:  [u8] (length)
//! ```
//!
//! **Chunk datagram** (one per chunk, no end-of-frame marker):
//! ```text
//! chunk_index:  i32  (4)
//! payload:      [u8] (≤ chunk_size)
//! ```
//!
//! Integer byte order is selected by [`WireEndian`].

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{ProtocolViolation, TransportError};

/// Size of the `i32` that opens every frame and every chunk.
pub const PREFIX_SIZE: usize = 4;

// ── WireEndian ───────────────────────────────────────────────────

/// Byte order of header integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireEndian {
    /// Network byte order.
    #[default]
    Big,
    /// Host order on x86/ARM peers that write raw integers.
    Little,
}

impl WireEndian {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "big" | "network" => Some(Self::Big),
            "little" | "native" => Some(Self::Little),
            _ => None,
        }
    }

    pub fn encode_i32(self, value: i32) -> [u8; PREFIX_SIZE] {
        match self {
            Self::Big => value.to_be_bytes(),
            Self::Little => value.to_le_bytes(),
        }
    }

    pub fn decode_i32(self, bytes: [u8; PREFIX_SIZE]) -> i32 {
        match self {
            Self::Big => i32::from_be_bytes(bytes),
            Self::Little => i32::from_le_bytes(bytes),
        }
    }

    fn put_i32(self, dst: &mut BytesMut, value: i32) {
        match self {
            Self::Big => dst.put_i32(value),
            Self::Little => dst.put_i32_le(value),
        }
    }

    fn get_i32(self, mut src: &[u8]) -> i32 {
        match self {
            Self::Big => src.get_i32(),
            Self::Little => src.get_i32_le(),
        }
    }
}

// ── LengthPrefix ─────────────────────────────────────────────────

/// The 4-byte frame length on the reliable stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthPrefix(pub i32);

impl LengthPrefix {
    /// Prefix for a frame of `len` bytes.
    pub fn for_len(len: usize) -> Result<Self, TransportError> {
        i32::try_from(len)
            .map(Self)
            .map_err(|_| TransportError::PayloadTooLarge {
                size: len,
                max: i32::MAX as usize,
            })
    }

    pub fn encode(self, endian: WireEndian) -> [u8; PREFIX_SIZE] {
        endian.encode_i32(self.0)
    }

    pub fn decode(bytes: [u8; PREFIX_SIZE], endian: WireEndian) -> Self {
        Self(endian.decode_i32(bytes))
    }

    /// Check the prefix against the agreed frame size.
    pub fn validate(self, expected: usize) -> Result<usize, ProtocolViolation> {
        if self.0 < 0 || self.0 as usize != expected {
            return Err(ProtocolViolation::LengthMismatch {
                expected,
                actual: self.0 as i64,
            });
        }
        Ok(expected)
    }
}

// ── ChunkHeader ──────────────────────────────────────────────────

/// Index tag prepended to each chunk datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub chunk_index: i32,
}

impl ChunkHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = PREFIX_SIZE;

    /// Build a complete datagram: header followed by `payload`.
    pub fn encode_datagram(self, payload: &[u8], endian: WireEndian) -> BytesMut {
        let mut buf = BytesMut::with_capacity(Self::SIZE + payload.len());
        endian.put_i32(&mut buf, self.chunk_index);
        buf.put_slice(payload);
        buf
    }

    /// Split a datagram into its header and payload.
    pub fn decode_datagram(
        data: &[u8],
        endian: WireEndian,
    ) -> Result<(Self, &[u8]), ProtocolViolation> {
        if data.len() < Self::SIZE {
            return Err(ProtocolViolation::DatagramTooShort(data.len()));
        }
        let chunk_index = endian.get_i32(&data[..Self::SIZE]);
        Ok((Self { chunk_index }, &data[Self::SIZE..]))
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_prefix_byte_order() {
        let prefix = LengthPrefix(460_800);
        assert_eq!(prefix.encode(WireEndian::Big), [0x00, 0x07, 0x08, 0x00]);
        assert_eq!(prefix.encode(WireEndian::Little), [0x00, 0x08, 0x07, 0x00]);
        assert_eq!(
            LengthPrefix::decode([0x00, 0x08, 0x07, 0x00], WireEndian::Little),
            prefix
        );
    }

    #[test]
    fn length_prefix_validation() {
        assert_eq!(LengthPrefix(100).validate(100), Ok(100));
        assert_eq!(
            LengthPrefix(99).validate(100),
            Err(ProtocolViolation::LengthMismatch {
                expected: 100,
                actual: 99
            })
        );
        assert!(LengthPrefix(-1).validate(100).is_err());
    }

    #[test]
    fn chunk_datagram_layout() {
        let dgram = ChunkHeader { chunk_index: 7 }.encode_datagram(b"abc", WireEndian::Big);
        assert_eq!(&dgram[..], &[0, 0, 0, 7, b'a', b'b', b'c']);

        let (header, payload) = ChunkHeader::decode_datagram(&dgram, WireEndian::Big).unwrap();
        assert_eq!(header.chunk_index, 7);
        assert_eq!(payload, b"abc");
    }

    #[test]
    fn negative_chunk_index_survives_decoding() {
        let dgram = ChunkHeader { chunk_index: -2 }.encode_datagram(&[], WireEndian::Little);
        let (header, payload) = ChunkHeader::decode_datagram(&dgram, WireEndian::Little).unwrap();
        assert_eq!(header.chunk_index, -2);
        assert!(payload.is_empty());
    }

    #[test]
    fn chunk_datagram_too_short() {
        assert_eq!(
            ChunkHeader::decode_datagram(&[1, 2], WireEndian::Big),
            Err(ProtocolViolation::DatagramTooShort(2))
        );
    }
}
