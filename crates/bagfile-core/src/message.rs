//! Message Type Interface
//!
//! The bag never interprets payload bytes itself; it talks to the host
//! messaging type system through this trait. A `Message` implementation
//! supplies the schema identity recorded in definition records (datatype
//! name, fingerprint, IDL text) and the serialize/deserialize operations
//! used by the write path and by typed materialization.
//!
//! ## Fingerprints
//! `md5sum()` returns 32 hex characters. A leading `'*'` is a wildcard:
//! materialization skips the compatibility check for such types.
//!
//! ## Connection headers
//! Messages may carry a transport-level connection header (a string map).
//! On write, a `latching` value other than `"0"` causes the `latching` and
//! `callerid` fields to be recorded alongside the message. On read, the bag
//! hands `deserialize` a header containing `md5sum`, `type` and
//! `message_definition` recovered from the bag.

use std::collections::BTreeMap;

use crate::error::Result;

/// Transport metadata attached to a message: name → value string pairs
pub type ConnectionHeader = BTreeMap<String, String>;

/// A message type the bag can record and replay
pub trait Message: Sized {
    /// Datatype name, e.g. `sensor_msgs/LaserScan`
    fn datatype() -> String;

    /// Schema fingerprint: 32 hex characters, or a leading `'*'` to accept any
    fn md5sum() -> String;

    /// Full IDL definition text (may be empty)
    fn definition() -> String;

    /// Exact number of bytes `serialize` will produce
    fn serialized_length(&self) -> u32;

    /// Write the payload into `buf`, which is exactly `serialized_length()`
    /// bytes long
    fn serialize(&self, buf: &mut [u8]);

    /// Rebuild a message from payload bytes and the connection header the
    /// bag recovered for its topic
    fn deserialize(buf: &[u8], connection: &ConnectionHeader) -> Result<Self>;

    /// Connection header carried by this message instance, if any
    fn connection_header(&self) -> Option<&ConnectionHeader> {
        None
    }
}
