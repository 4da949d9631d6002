//! Bagfile Storage Layer
//!
//! This crate implements the bag container: a single seekable file that
//! records streams of timestamped, typed messages on named topics, and
//! replays them filtered by topic and time range.
//!
//! ## Bag File Structure (format version "1.2")
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Version line: "#ROSRECORD V1.2\n"                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │ File-header record (padded to >= FILE_HEADER_LENGTH)        │
//! │ - op = OP_FILE_HEADER                                       │
//! │ - index_pos (8 bytes LE): offset of first index record      │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Definition record (once per topic, before its first data)   │
//! │ - op = OP_MSG_DEF: topic, md5, type, def                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Data record (one per message)                               │
//! │ - op = OP_MSG_DATA: topic, md5, type, sec, nsec             │
//! │ - body: serialized message bytes                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │ ... more definition / data records ...                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Index record (one per topic)                                │
//! │ - op = OP_INDEX_DATA: topic, type, ver, count               │
//! │ - body: count x 16-byte (time, offset) entries              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every record is `hdr_len(4 LE) | header | data_len(4 LE) | data`; the
//! header is a sequence of `name=len(4 LE)+value` fields. All integers are
//! little-endian.
//!
//! The file is written in a single append-only pass. Closing the bag emits
//! the per-topic index blocks and then seeks back once to rewrite the padded
//! file-header record with the real index offset. This is why an unclosed
//! bag (`index_pos = 0`) is unreadable.
//!
//! ## Main Components
//!
//! ### BagWriter
//! Append-only writer: `create`, then `write(topic, time, &msg)` from any
//! number of threads, then `close`. Maintains one in-memory index per topic.
//!
//! ### Bag
//! Read-only view of a finished bag: parses the version line and file
//! header, follows the index pointer, loads all index entries and one schema
//! definition per topic, then serves random-access reads by file offset.
//!
//! ### View
//! A time-ordered merge over any subset of topics and any time interval,
//! yielding lazy [`MessageInstance`] handles that materialize on demand.
//!
//! ## Usage
//!
//! ```ignore
//! use bagfile_storage::{Bag, BagWriter, Query, Time, View};
//!
//! // Record
//! let writer = BagWriter::create("run.bag")?;
//! writer.write("/odom", Time::new(10, 0), &odom_msg)?;
//! writer.write("/scan", Time::new(10, 1), &scan_msg)?;
//! writer.close()?;
//!
//! // Replay one topic over a window
//! let bag = Bag::open("run.bag")?;
//! let mut view = View::new();
//! view.add_query(&bag, &Query::topics(["/scan"]).since(Time::new(10, 0)));
//! for instance in &view {
//!     if let Some(scan) = instance.instantiate::<LaserScan>()? {
//!         process(scan);
//!     }
//! }
//! ```

pub mod config;
pub mod instance;
pub mod reader;
pub mod record;
pub mod scratch;
pub mod view;
pub mod writer;

pub use bagfile_core::{ConnectionHeader, Error, IndexEntry, Message, MsgInfo, Result, Time};
pub use config::BagConfig;
pub use instance::{MessageInstance, RawMessage};
pub use reader::Bag;
pub use view::{Query, View, ViewIter};
pub use writer::{BagWriter, SpaceCheck};

/// Format version recorded in the leading ASCII line
pub const VERSION: &str = "1.2";

/// The exact first line of every bag file
pub const VERSION_LINE: &str = "#ROSRECORD V1.2\n";

/// Minimum total size of the file-header record, so it can be rewritten in
/// place once the index offset is known
pub const FILE_HEADER_LENGTH: u32 = 4096;

/// Version of the trailing index block layout
pub const INDEX_VERSION: u32 = 1;

/// Record opcodes, carried in the single-byte `op` header field
pub const OP_MSG_DEF: u8 = 0x01;
pub const OP_MSG_DATA: u8 = 0x02;
pub const OP_FILE_HEADER: u8 = 0x03;
pub const OP_INDEX_DATA: u8 = 0x04;

/// Header field names
pub const OP_FIELD: &str = "op";
pub const TOPIC_FIELD: &str = "topic";
pub const MD5_FIELD: &str = "md5";
pub const TYPE_FIELD: &str = "type";
pub const DEF_FIELD: &str = "def";
pub const SEC_FIELD: &str = "sec";
pub const NSEC_FIELD: &str = "nsec";
pub const VER_FIELD: &str = "ver";
pub const COUNT_FIELD: &str = "count";
pub const INDEX_POS_FIELD: &str = "index_pos";
pub const LATCHING_FIELD: &str = "latching";
pub const CALLERID_FIELD: &str = "callerid";
