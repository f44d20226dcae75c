// ================
// crates/common/src/codec.rs
// ================
//! Primitive reader/writer for the Bancho wire format.
//!
//! Every integer and float is little-endian. Strings use the osu! encoding:
//! a single `0x00` byte for the empty string, otherwise a `0x0b` marker,
//! a ULEB128 byte length and the UTF-8 bytes.

use thiserror::Error;

/// Marker byte that precedes a length-prefixed string.
pub const STRING_MARKER: u8 = 0x0b;
/// Marker byte for the empty string.
pub const EMPTY_STRING_MARKER: u8 = 0x00;

/// Errors raised while decoding bytes sent by a client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("invalid string marker byte {0:#04x}")]
    InvalidStringMarker(u8),

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("ULEB128 length overflows")]
    UlebOverflow,

    #[error("invalid {kind} value {value}")]
    InvalidValue { kind: &'static str, value: i64 },

    #[error("packet {id} declares {declared} body bytes but only {remaining} remain")]
    TruncatedPacket {
        id: u16,
        declared: usize,
        remaining: usize,
    },
}

/// Types that can be read from a packet body.
pub trait Decode: Sized {
    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, DecodeError>;

    /// Decode a value from the start of a packet body. Trailing bytes are ignored,
    /// the osu! client pads some packets.
    fn from_body(body: &[u8]) -> Result<Self, DecodeError> {
        Self::decode(&mut PacketReader::new(body))
    }
}

/// Types that can be written into a packet body.
pub trait Encode {
    fn encode(&self, writer: &mut PacketWriter);

    fn to_body(&self) -> Vec<u8> {
        let mut writer = PacketWriter::new();
        self.encode(&mut writer);
        writer.into_inner()
    }
}

/// Cursor over a borrowed packet body.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

macro_rules! read_le {
    ($($name:ident => $ty:ty),* $(,)?) => {
        $(
            pub fn $name(&mut self) -> Result<$ty, DecodeError> {
                let bytes = self.read_array::<{ std::mem::size_of::<$ty>() }>()?;
                Ok(<$ty>::from_le_bytes(bytes))
            }
        )*
    };
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::UnexpectedEof {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    read_le! {
        read_u8 => u8,
        read_i8 => i8,
        read_u16 => u16,
        read_i16 => i16,
        read_u32 => u32,
        read_i32 => i32,
        read_u64 => u64,
        read_i64 => i64,
        read_f32 => f32,
        read_f64 => f64,
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_uleb128(&mut self) -> Result<usize, DecodeError> {
        let mut value: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            if shift >= 63 {
                return Err(DecodeError::UlebOverflow);
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        usize::try_from(value).map_err(|_| DecodeError::UlebOverflow)
    }

    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        match self.read_u8()? {
            EMPTY_STRING_MARKER => Ok(String::new()),
            STRING_MARKER => {
                let len = self.read_uleb128()?;
                let bytes = self.read_bytes(len)?;
                String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
            },
            other => Err(DecodeError::InvalidStringMarker(other)),
        }
    }

    /// List of i32 prefixed by an i16 count, used by the presence/stats requests.
    pub fn read_i32_list(&mut self) -> Result<Vec<i32>, DecodeError> {
        let count = self.read_i16()?;
        let count = usize::try_from(count).map_err(|_| DecodeError::InvalidValue {
            kind: "list length",
            value: i64::from(count),
        })?;
        (0..count).map(|_| self.read_i32()).collect()
    }
}

/// Growable packet body buffer.
#[derive(Debug, Clone, Default)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

macro_rules! write_le {
    ($($name:ident => $ty:ty),* $(,)?) => {
        $(
            pub fn $name(&mut self, value: $ty) -> &mut Self {
                self.buf.extend_from_slice(&value.to_le_bytes());
                self
            }
        )*
    };
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    write_le! {
        write_u8 => u8,
        write_i8 => i8,
        write_u16 => u16,
        write_i16 => i16,
        write_u32 => u32,
        write_i32 => i32,
        write_u64 => u64,
        write_i64 => i64,
        write_f32 => f32,
        write_f64 => f64,
    }

    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.write_u8(u8::from(value))
    }

    pub fn write_uleb128(&mut self, mut value: usize) -> &mut Self {
        loop {
            let mut byte = (value & 0x7f) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            self.buf.push(byte);
            if value == 0 {
                break;
            }
        }
        self
    }

    pub fn write_string(&mut self, value: &str) -> &mut Self {
        if value.is_empty() {
            return self.write_u8(EMPTY_STRING_MARKER);
        }
        self.write_u8(STRING_MARKER);
        self.write_uleb128(value.len());
        self.write_bytes(value.as_bytes())
    }

    pub fn write_i32_list(&mut self, values: &[i32]) -> &mut Self {
        // Lists longer than i16::MAX never occur in practice; clamp rather than wrap.
        let count = values.len().min(i16::MAX as usize);
        self.write_i16(count as i16);
        for value in &values[..count] {
            self.write_i32(*value);
        }
        self
    }
}
