use aptrust::{Command, TAG_LEN};
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ApStreamError, Result};

/// Largest payload a single frame can carry (16-bit length field).
pub const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize;

/// Plain frame header: payload length, u16 big-endian.
pub const PLAIN_HEADER_LEN: usize = 2;

/// Encrypted frame header: command (1) + ciphertext length (2).
pub const ENCRYPTED_HEADER_LEN: usize = 3;

/// Decrypted application frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(command: Command, payload: impl Into<Bytes>) -> Self {
        Self {
            command,
            payload: payload.into(),
        }
    }
}

// ── Plain frames ─────────────────────────────────────────────────────────
//
// +--------+----------------+
// | len(2) | payload (len)  |
// +--------+----------------+

/// Append one plain frame to `dst`.
///
/// Empty payloads and payloads above [`MAX_FRAME_PAYLOAD`] are rejected, never
/// fragmented.
pub fn encode_plain(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.is_empty() {
        return Err(ApStreamError::EmptyFrame);
    }
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(ApStreamError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_PAYLOAD,
        });
    }
    dst.reserve(PLAIN_HEADER_LEN + payload.len());
    dst.put_u16(payload.len() as u16);
    dst.put_slice(payload);
    Ok(())
}

/// Split one complete plain frame off the front of `src`.
///
/// Returns `Ok(None)` and leaves `src` untouched while the frame is still
/// incomplete.
pub fn decode_plain(src: &mut BytesMut) -> Result<Option<Bytes>> {
    if src.len() < PLAIN_HEADER_LEN {
        return Ok(None);
    }
    let len = u16::from_be_bytes([src[0], src[1]]) as usize;
    if len == 0 {
        return Err(ApStreamError::EmptyFrame);
    }
    if src.len() < PLAIN_HEADER_LEN + len {
        return Ok(None);
    }
    src.advance(PLAIN_HEADER_LEN);
    Ok(Some(src.split_to(len).freeze()))
}

/// Bytes a partially buffered plain frame still needs, for error reporting.
pub(crate) fn plain_expected_len(src: &[u8]) -> usize {
    if src.len() < PLAIN_HEADER_LEN {
        PLAIN_HEADER_LEN
    } else {
        PLAIN_HEADER_LEN + u16::from_be_bytes([src[0], src[1]]) as usize
    }
}

// ── Encrypted frames ─────────────────────────────────────────────────────
//
// +--------+--------+-------------------+----------+
// | cmd(1) | len(2) | ciphertext (len)  | tag (16) |
// +--------+--------+-------------------+----------+

/// An encrypted frame as it travels on the wire, before verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedFrame {
    /// Raw command byte. Only trusted once the tag verifies.
    pub command: u8,
    pub ciphertext: Bytes,
    pub tag: [u8; TAG_LEN],
}

impl SealedFrame {
    pub fn encoded_len(&self) -> usize {
        ENCRYPTED_HEADER_LEN + self.ciphertext.len() + TAG_LEN
    }

    /// Append this frame to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<()> {
        if self.ciphertext.len() > MAX_FRAME_PAYLOAD {
            return Err(ApStreamError::FrameTooLarge {
                size: self.ciphertext.len(),
                max: MAX_FRAME_PAYLOAD,
            });
        }
        dst.reserve(self.encoded_len());
        dst.put_u8(self.command);
        dst.put_u16(self.ciphertext.len() as u16);
        dst.put_slice(&self.ciphertext);
        dst.put_slice(&self.tag);
        Ok(())
    }

    /// Split one complete encrypted frame off the front of `src`, or return
    /// `None` and leave `src` untouched.
    pub fn decode(src: &mut BytesMut) -> Option<Self> {
        if src.len() < ENCRYPTED_HEADER_LEN {
            return None;
        }
        let len = u16::from_be_bytes([src[1], src[2]]) as usize;
        if src.len() < ENCRYPTED_HEADER_LEN + len + TAG_LEN {
            return None;
        }
        let command = src.get_u8();
        src.advance(2);
        let ciphertext = src.split_to(len).freeze();
        let mut tag = [0u8; TAG_LEN];
        src.copy_to_slice(&mut tag);
        Some(Self {
            command,
            ciphertext,
            tag,
        })
    }
}

/// Bytes a partially buffered encrypted frame still needs, for error reporting.
pub(crate) fn sealed_expected_len(src: &[u8]) -> usize {
    if src.len() < ENCRYPTED_HEADER_LEN {
        ENCRYPTED_HEADER_LEN
    } else {
        ENCRYPTED_HEADER_LEN + u16::from_be_bytes([src[1], src[2]]) as usize + TAG_LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_waits_for_full_frame() {
        let mut buf = BytesMut::new();
        encode_plain(b"hello", &mut buf).unwrap();
        let full = buf.clone();

        let mut partial = BytesMut::from(&full[..4]);
        assert_eq!(decode_plain(&mut partial).unwrap(), None);
        assert_eq!(partial.len(), 4);
        assert_eq!(plain_expected_len(&partial), 7);

        assert_eq!(decode_plain(&mut buf).unwrap().unwrap(), &b"hello"[..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn plain_zero_length_is_error() {
        let mut buf = BytesMut::from(&[0u8, 0][..]);
        assert!(matches!(decode_plain(&mut buf), Err(ApStreamError::EmptyFrame)));
    }

    #[test]
    fn sealed_frame_layout() {
        let frame = SealedFrame {
            command: 0x04,
            ciphertext: Bytes::from_static(&[1, 2, 3, 4]),
            tag: [0xee; TAG_LEN],
        };
        let mut buf = BytesMut::new();
        frame.encode_into(&mut buf).unwrap();
        assert_eq!(buf.len(), frame.encoded_len());
        assert_eq!(&buf[..3], &[0x04, 0x00, 0x04]);

        let mut short = BytesMut::from(&buf[..buf.len() - 1]);
        assert_eq!(SealedFrame::decode(&mut short), None);
        assert_eq!(sealed_expected_len(&short), buf.len());

        assert_eq!(SealedFrame::decode(&mut buf), Some(frame));
        assert!(buf.is_empty());
    }
}
