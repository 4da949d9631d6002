//! Index Entries
//!
//! An index entry pairs a message timestamp with the byte offset of its data
//! record inside the bag. Each topic's entries are accumulated in memory by
//! the writer and flushed into one trailing index block per topic; readers
//! load them back to answer random-access and range queries.
//!
//! ## On-disk layout
//! Exactly 16 bytes per entry:
//!
//! ```text
//! sec (4 LE) | nsec (4 LE) | pos (8 LE)
//! ```
//!
//! Entry lists are stored in insertion order (the order the writer emitted
//! that topic's messages), which is not necessarily timestamp order.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::time::Time;

/// Size of one serialized entry
pub const INDEX_ENTRY_SIZE: usize = 16;

/// A (timestamp, file offset) pair pointing at one data record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Timestamp the message was recorded with
    pub time: Time,

    /// Byte offset of the record in the bag file
    pub pos: u64,
}

impl IndexEntry {
    pub const fn new(time: Time, pos: u64) -> Self {
        Self { time, pos }
    }

    /// Append the fixed 16-byte representation to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.time.sec);
        buf.put_u32_le(self.time.nsec);
        buf.put_u64_le(self.pos);
    }

    /// Decode one entry from the front of `buf`, advancing it
    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < INDEX_ENTRY_SIZE {
            return Err(Error::Truncated);
        }
        let sec = buf.get_u32_le();
        let nsec = buf.get_u32_le();
        let pos = buf.get_u64_le();
        Ok(Self {
            time: Time::new(sec, nsec),
            pos,
        })
    }
}
