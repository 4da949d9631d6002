//! Topic Metadata
//!
//! For every recorded topic the bag keeps one `MsgInfo` snapshot: the topic
//! name, the datatype name, the 32-hex-character schema fingerprint, and the
//! full IDL definition text. The writer captures it the first time a topic
//! is written; the reader rebuilds it from the first definition record it
//! finds for the topic. After creation it never changes.

use serde::{Deserialize, Serialize};

/// Schema identity of one recorded topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgInfo {
    /// Topic name, e.g. `/odom`
    pub topic: String,

    /// Datatype name, e.g. `nav_msgs/Odometry`
    pub datatype: String,

    /// 32 hex characters identifying the message schema
    pub md5sum: String,

    /// Full IDL definition text; may be empty for legacy data
    pub msg_def: String,
}

impl MsgInfo {
    pub fn new(
        topic: impl Into<String>,
        datatype: impl Into<String>,
        md5sum: impl Into<String>,
        msg_def: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            datatype: datatype.into(),
            md5sum: md5sum.into(),
            msg_def: msg_def.into(),
        }
    }
}
