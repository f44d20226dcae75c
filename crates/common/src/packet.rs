// ================
// crates/common/src/packet.rs
// ================
//! Packet framing.
//!
//! A packet is `[u16 id][u8 reserved][u32 body length][body]`. A request or
//! response body is a back-to-back sequence of packets without outer framing.

use crate::codec::{DecodeError, Encode, PacketWriter};

/// Size of the fixed packet header.
pub const HEADER_LEN: usize = 7;

/// A framed packet whose body has not been interpreted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPacket<'a> {
    pub id: u16,
    pub body: &'a [u8],
}

/// Split a packet stream into its packets.
///
/// Decoding stops when no bytes remain. A header that does not fit, or a body
/// shorter than its declared length, fails the whole stream.
pub fn decode_stream(mut data: &[u8]) -> Result<Vec<RawPacket<'_>>, DecodeError> {
    let mut packets = Vec::new();

    while !data.is_empty() {
        if data.len() < HEADER_LEN {
            return Err(DecodeError::UnexpectedEof {
                needed: HEADER_LEN,
                remaining: data.len(),
            });
        }

        let id = u16::from_le_bytes([data[0], data[1]]);
        let declared = u32::from_le_bytes([data[3], data[4], data[5], data[6]]) as usize;
        let rest = &data[HEADER_LEN..];

        if rest.len() < declared {
            return Err(DecodeError::TruncatedPacket {
                id,
                declared,
                remaining: rest.len(),
            });
        }

        packets.push(RawPacket {
            id,
            body: &rest[..declared],
        });
        data = &rest[declared..];
    }

    Ok(packets)
}

/// Frame a body under the given packet id.
pub fn encode_packet(id: impl Into<u16>, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&id.into().to_le_bytes());
    out.push(0);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    out
}

/// Frame a packet whose body is produced by a closure.
pub fn build_packet(id: impl Into<u16>, write: impl FnOnce(&mut PacketWriter)) -> Vec<u8> {
    let mut writer = PacketWriter::new();
    write(&mut writer);
    encode_packet(id, writer.as_slice())
}

/// Frame a packet whose body is a single encodable value.
pub fn encode_value(id: impl Into<u16>, value: &impl Encode) -> Vec<u8> {
    build_packet(id, |w| value.encode(w))
}
