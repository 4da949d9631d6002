//! Lazy Message Handles
//!
//! A `MessageInstance` is what a [`View`] yields: topic metadata plus the
//! file offset of one data record, and nothing else. It is a `Copy` triple
//! of borrows into the owning [`Bag`], so holding millions of them costs
//! nothing; the payload is only touched when the caller materializes it.
//!
//! Materialization comes in two flavors:
//!
//! - [`instantiate`](MessageInstance::instantiate): typed. The caller's
//!   type must carry the same fingerprint the bag recorded for the topic
//!   (or a `*` wildcard); a mismatch yields `Ok(None)` rather than an
//!   error, so probing a heterogeneous bag with several candidate types is
//!   cheap and quiet.
//! - [`raw`](MessageInstance::raw): untyped. The payload bytes plus the
//!   record's own metadata, including the optional `latching`/`callerid`
//!   transport fields.
//!
//! [`View`]: crate::view::View

use bytes::Bytes;

use bagfile_core::error::Result;
use bagfile_core::index::IndexEntry;
use bagfile_core::message::{ConnectionHeader, Message};
use bagfile_core::time::Time;
use bagfile_core::topic::MsgInfo;

use crate::reader::{md5_string, Bag};
use crate::{
    CALLERID_FIELD, LATCHING_FIELD, NSEC_FIELD, SEC_FIELD, TOPIC_FIELD, TYPE_FIELD,
};

/// A lazy handle to one recorded message
#[derive(Clone, Copy)]
pub struct MessageInstance<'a> {
    info: &'a MsgInfo,
    entry: &'a IndexEntry,
    bag: &'a Bag,
}

impl<'a> MessageInstance<'a> {
    pub(crate) fn new(info: &'a MsgInfo, entry: &'a IndexEntry, bag: &'a Bag) -> Self {
        Self { info, entry, bag }
    }

    pub fn topic(&self) -> &str {
        &self.info.topic
    }

    pub fn datatype(&self) -> &str {
        &self.info.datatype
    }

    pub fn md5sum(&self) -> &str {
        &self.info.md5sum
    }

    pub fn def(&self) -> &str {
        &self.info.msg_def
    }

    pub fn time(&self) -> Time {
        self.entry.time
    }

    /// Offset of this message's record in the bag file
    pub fn pos(&self) -> u64 {
        self.entry.pos
    }

    /// Whether `M` matches both the recorded fingerprint and datatype
    pub fn is_type<M: Message>(&self) -> bool {
        M::md5sum() == self.info.md5sum && M::datatype() == self.info.datatype
    }

    /// Materialize the payload as a value of `M`.
    ///
    /// Returns `Ok(None)` when `M`'s fingerprint does not match the one
    /// recorded for this topic; a leading `'*'` in `M::md5sum()` skips the
    /// check entirely.
    pub fn instantiate<M: Message>(&self) -> Result<Option<M>> {
        let want = M::md5sum();
        if !want.starts_with('*') && want != self.info.md5sum {
            return Ok(None);
        }

        self.bag.with_data_record(self.entry.pos, |fields, data| {
            fields.get(TOPIC_FIELD)?;
            let md5 = md5_string(fields)?;
            let datatype = fields.get_str(TYPE_FIELD)?;
            if md5 != self.info.md5sum {
                return Err(bagfile_core::Error::BadFormat(format!(
                    "record fingerprint {} disagrees with topic {}",
                    md5, self.info.md5sum
                )));
            }

            let mut connection = ConnectionHeader::new();
            connection.insert("md5sum".to_string(), md5);
            connection.insert("type".to_string(), datatype);
            connection.insert(
                "message_definition".to_string(),
                self.info.msg_def.clone(),
            );

            M::deserialize(data, &connection).map(Some)
        })
    }

    /// Materialize the payload as raw bytes with the record's own metadata
    pub fn raw(&self) -> Result<RawMessage> {
        self.bag.with_data_record(self.entry.pos, |fields, data| {
            let topic = fields.get_str(TOPIC_FIELD)?;
            let md5sum = md5_string(fields)?;
            let datatype = fields.get_str(TYPE_FIELD)?;
            let sec = fields.get_u32(SEC_FIELD)?;
            let nsec = fields.get_u32(NSEC_FIELD)?;
            let latching = fields
                .get_opt_str(LATCHING_FIELD)
                .map(|v| v != "0")
                .unwrap_or(false);
            let callerid = fields.get_opt_str(CALLERID_FIELD);

            Ok(RawMessage {
                topic,
                datatype,
                md5sum,
                time: Time::new(sec, nsec),
                latching,
                callerid,
                data: Bytes::copy_from_slice(data),
            })
        })
    }
}

impl std::fmt::Debug for MessageInstance<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageInstance")
            .field("topic", &self.info.topic)
            .field("datatype", &self.info.datatype)
            .field("time", &self.entry.time)
            .field("pos", &self.entry.pos)
            .finish()
    }
}

/// One message materialized as bytes, with the metadata its record carried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub topic: String,
    pub datatype: String,
    pub md5sum: String,
    pub time: Time,
    pub latching: bool,
    pub callerid: Option<String>,
    pub data: Bytes,
}
