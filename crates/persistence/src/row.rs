use crate::error::{PersistenceError, Result};
use byteorder::{ByteOrder, LittleEndian};

/// Encoded size of one [`RowRecord`].
pub const ROW_SIZE: usize = 32;

/// Sentinel for an absent category id.
pub const NO_ID: u32 = u32::MAX;

/// Sentinel for an absent source id.
pub const NO_SOURCE: u16 = u16::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ValueTag {
    Boolean = 0,
    Integer = 1,
    /// `value` is a byte offset into the string heap.
    String = 2,
}

impl ValueTag {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(ValueTag::Boolean),
            1 => Some(ValueTag::Integer),
            2 => Some(ValueTag::String),
            _ => None,
        }
    }
}

/// One stored event.
///
/// Layout (little endian):
/// `[ts i64][signal u32][category u32][source u16][tag u8][pad u8][value i64][pad u32]`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowRecord {
    pub timestamp: i64,
    pub signal: u32,
    pub category: u32,
    pub source: u16,
    pub tag: ValueTag,
    pub value: i64,
}

impl RowRecord {
    pub fn to_bytes(&self) -> [u8; ROW_SIZE] {
        let mut buf = [0u8; ROW_SIZE];
        LittleEndian::write_i64(&mut buf[0..8], self.timestamp);
        LittleEndian::write_u32(&mut buf[8..12], self.signal);
        LittleEndian::write_u32(&mut buf[12..16], self.category);
        LittleEndian::write_u16(&mut buf[16..18], self.source);
        buf[18] = self.tag as u8;
        LittleEndian::write_i64(&mut buf[20..28], self.value);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < ROW_SIZE {
            return Err(PersistenceError::InvalidFormat(format!(
                "row record needs {} bytes, found {}",
                ROW_SIZE,
                buf.len()
            )));
        }
        let tag = ValueTag::from_u8(buf[18])
            .ok_or_else(|| PersistenceError::InvalidFormat(format!("unknown value tag {}", buf[18])))?;
        Ok(Self {
            timestamp: LittleEndian::read_i64(&buf[0..8]),
            signal: LittleEndian::read_u32(&buf[8..12]),
            category: LittleEndian::read_u32(&buf[12..16]),
            source: LittleEndian::read_u16(&buf[16..18]),
            tag,
            value: LittleEndian::read_i64(&buf[20..28]),
        })
    }

    /// Reads only the timestamp of the record starting at `buf[0]`.
    #[inline]
    pub fn timestamp_of(buf: &[u8]) -> i64 {
        LittleEndian::read_i64(&buf[0..8])
    }

    /// Reads only the signal id of the record starting at `buf[0]`.
    #[inline]
    pub fn signal_of(buf: &[u8]) -> u32 {
        LittleEndian::read_u32(&buf[8..12])
    }
}
