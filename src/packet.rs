//! Wire-format definitions for protocol frames.
//!
//! Every datagram crossing the channel is a [`Frame`] of exactly
//! [`PKT_SIZE`] octets.  This module is responsible for:
//! - Defining the on-wire binary layout (header fields, payload region).
//! - Computing and verifying the CRC-16/CCITT integrity checksum.
//! - Serialising a [`Frame`] into the fixed-size byte buffer the channel
//!   carries, and back.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Layout
//!
//! ```text
//! | 1  | 1  | 1  |  1  |  2  |           122            |
//! |seq |ack |len |flags| chk |         payload          |
//! ```
//!
//! The checksum covers the four header octets before it plus the first
//! `len` payload octets; trailing garbage in the payload region is not
//! covered, and the checksum field itself is excluded.

use std::fmt;

use thiserror::Error;

/// Fixed size of every frame on the wire, in octets.
pub const PKT_SIZE: usize = 128;

/// Header octets preceding the payload region.
pub const HEADER_SIZE: usize = 6;

/// Maximum payload octets one frame can carry.
pub const PAYLOAD_MAX: usize = PKT_SIZE - HEADER_SIZE;

const _: () = assert!(HEADER_SIZE + PAYLOAD_MAX == PKT_SIZE);

/// On-wire values for the `flags` header field.
pub mod flags {
    /// Data frame, or cumulative acknowledgement when `len == 0`.
    pub const ACK: u8 = 0;
    /// Selective negative acknowledgement naming a missing sequence number.
    pub const NAK: u8 = 1;
    /// Bits that must be zero on every valid frame.
    pub const RESERVED: u8 = 0xFE;
}

/// CRC-16/CCITT lookup table (generator x^16 + x^12 + x^5 + 1), built at
/// compile time.
const CRC16_TAB: [u16; 256] = crc16_table();

const fn crc16_table() -> [u16; 256] {
    let mut tab = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
            bit += 1;
        }
        tab[i] = crc;
        i += 1;
    }
    tab
}

/// Table-driven CRC-16: initial register 0x0000, no final XOR.
fn crc16(crc: u16, buf: &[u8]) -> u16 {
    buf.iter().fold(crc, |crc, &b| {
        (crc << 8) ^ CRC16_TAB[(((crc >> 8) ^ b as u16) & 0x00FF) as usize]
    })
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The buffer is not exactly one frame long.
    #[error("datagram is {0} octets, expected exactly {PKT_SIZE}")]
    WrongSize(usize),
}

/// A complete protocol frame: header fields plus the payload region.
///
/// The struct always holds the full [`PAYLOAD_MAX`]-octet payload array;
/// only the first `len` octets are meaningful.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Sender sequence number of this frame.
    pub seq: u8,
    /// Acknowledged sequence number (control frames).
    pub ack: u8,
    /// Payload length in octets, ≤ [`PAYLOAD_MAX`].
    pub len: u8,
    /// Control-frame kind; one of [`flags::ACK`] or [`flags::NAK`].
    pub flags: u8,
    /// CRC-16/CCITT over the other header octets and the declared payload.
    pub checksum: u16,
    /// Opaque application bytes.
    pub payload: [u8; PAYLOAD_MAX],
}

impl Frame {
    /// An all-zero frame (a valid empty ACK apart from its checksum).
    pub fn empty() -> Self {
        Frame {
            seq: 0,
            ack: 0,
            len: 0,
            flags: flags::ACK,
            checksum: 0,
            payload: [0u8; PAYLOAD_MAX],
        }
    }

    /// Build a checksummed data frame carrying `chunk`.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if `chunk` exceeds [`PAYLOAD_MAX`].
    pub fn data(seq: u8, chunk: &[u8]) -> Self {
        debug_assert!(chunk.len() <= PAYLOAD_MAX);
        let mut frame = Frame::empty();
        frame.seq = seq;
        frame.len = chunk.len() as u8;
        frame.payload[..chunk.len()].copy_from_slice(chunk);
        frame.fill_checksum();
        frame
    }

    /// Build a checksummed control frame (`kind` is [`flags::ACK`] or
    /// [`flags::NAK`], `ack` the acknowledged or missing sequence number).
    pub fn control(kind: u8, ack: u8) -> Self {
        let mut frame = Frame::empty();
        frame.ack = ack;
        frame.flags = kind;
        frame.fill_checksum();
        frame
    }

    /// The meaningful prefix of the payload region.
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.len as usize]
    }

    /// Compute the checksum over the current header and payload and store
    /// it in the checksum field.
    ///
    /// Requires `len ≤ 122` and clean wire flags; both are debug-asserted.
    pub fn fill_checksum(&mut self) {
        debug_assert!(self.len as usize <= PAYLOAD_MAX);
        debug_assert_eq!(self.flags & flags::RESERVED, 0);
        self.checksum = self.compute_checksum();
    }

    /// `true` when the frame is structurally valid and its stored checksum
    /// matches a recomputation.  Never mutates the frame.
    pub fn check(&self) -> bool {
        if self.len as usize > PAYLOAD_MAX || self.flags & flags::RESERVED != 0 {
            return false;
        }
        self.compute_checksum() == self.checksum
    }

    fn compute_checksum(&self) -> u16 {
        let header = [self.seq, self.ack, self.len, self.flags];
        let crc = crc16(0, &header);
        crc16(crc, &self.payload[..self.len as usize])
    }

    /// Serialise into the fixed-size on-wire buffer.  The checksum field is
    /// placed little-endian.
    pub fn encode(&self) -> [u8; PKT_SIZE] {
        let mut buf = [0u8; PKT_SIZE];
        buf[0] = self.seq;
        buf[1] = self.ack;
        buf[2] = self.len;
        buf[3] = self.flags;
        buf[4..HEADER_SIZE].copy_from_slice(&self.checksum.to_le_bytes());
        buf[HEADER_SIZE..].copy_from_slice(&self.payload);
        buf
    }

    /// Parse a [`Frame`] from a raw datagram.
    ///
    /// Only the size is validated here; integrity is the caller's business
    /// via [`Frame::check`] (a corrupted frame still decodes).
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() != PKT_SIZE {
            return Err(FrameError::WrongSize(buf.len()));
        }
        let mut payload = [0u8; PAYLOAD_MAX];
        payload.copy_from_slice(&buf[HEADER_SIZE..]);
        Ok(Frame {
            seq: buf[0],
            ack: buf[1],
            len: buf[2],
            flags: buf[3],
            checksum: u16::from_le_bytes([buf[4], buf[5]]),
            payload,
        })
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("seq", &self.seq)
            .field("ack", &self.ack)
            .field("len", &self.len)
            .field("flags", &self.flags)
            .field("checksum", &format_args!("{:#06x}", self.checksum))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_then_check_roundtrip() {
        let frame = Frame::data(7, b"hello, channel");
        assert!(frame.check());
    }

    #[test]
    fn control_frames_are_valid() {
        assert!(Frame::control(flags::ACK, 12).check());
        assert!(Frame::control(flags::NAK, 200).check());
    }

    #[test]
    fn header_bit_flip_is_detected() {
        let mut frame = Frame::data(1, b"payload");
        frame.seq ^= 0x10;
        assert!(!frame.check());

        let mut frame = Frame::data(1, b"payload");
        frame.ack ^= 0x01;
        assert!(!frame.check());
    }

    #[test]
    fn payload_bit_flip_is_detected() {
        let mut frame = Frame::data(1, b"payload");
        frame.payload[3] ^= 0x80;
        assert!(!frame.check());
    }

    #[test]
    fn trailing_garbage_is_not_covered() {
        let mut frame = Frame::data(1, b"short");
        // Bytes past `len` may hold anything without invalidating the frame.
        frame.payload[100] = 0xAB;
        assert!(frame.check());
    }

    #[test]
    fn oversized_len_rejected() {
        let mut frame = Frame::data(1, b"x");
        frame.len = PAYLOAD_MAX as u8 + 1;
        assert!(!frame.check());
    }

    #[test]
    fn reserved_flag_bits_rejected() {
        let mut frame = Frame::data(1, b"x");
        frame.flags = 0x02;
        assert!(!frame.check());
        frame.flags = 0x80;
        assert!(!frame.check());
    }

    #[test]
    fn encode_decode_roundtrip() {
        let frame = Frame::data(99, &[0xDE; PAYLOAD_MAX]);
        let decoded = Frame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded, frame);
        assert!(decoded.check());
    }

    #[test]
    fn decode_wrong_size_returns_error() {
        assert_eq!(Frame::decode(&[]), Err(FrameError::WrongSize(0)));
        assert_eq!(
            Frame::decode(&[0u8; PKT_SIZE - 1]),
            Err(FrameError::WrongSize(PKT_SIZE - 1))
        );
    }

    #[test]
    fn checksum_is_little_endian_on_the_wire() {
        let frame = Frame::data(3, b"abc");
        let bytes = frame.encode();
        assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), frame.checksum);
    }

    #[test]
    fn corrupted_wire_bytes_fail_check_after_decode() {
        let frame = Frame::data(5, b"over the wire");
        let mut bytes = frame.encode();
        bytes[0] ^= 0x01; // seq
        let decoded = Frame::decode(&bytes).unwrap();
        assert!(!decoded.check());
    }

    #[test]
    fn crc_table_matches_reference_vector() {
        // CRC-16/XMODEM of "123456789" is 0x31C3.
        assert_eq!(crc16(0, b"123456789"), 0x31C3);
    }
}
