//! Bag Writer
//!
//! `BagWriter` turns a stream of `(topic, time, message)` triples into a
//! valid bag in a single append-only pass:
//!
//! 1. On create: version line, then a placeholder file-header record with
//!    `index_pos = 0`, padded so it can be rewritten in place later.
//! 2. Per message: remember an index entry (timestamp + the offset the next
//!    record will land at), emit a definition record the first time a topic
//!    is seen, then emit the data record.
//! 3. On close: flush one index record per topic, seek back to the
//!    file-header slot, and rewrite it with the real index offset.
//!
//! ## Thread Safety
//!
//! `write` takes `&self`, so producers on different threads can share one
//! writer (typically in an `Arc`). Three coarse locks keep them honest:
//!
//! - the *topic* lock covers first-sight admission only; first writer wins
//!   and snapshots the topic's schema identity;
//! - the *record* lock covers one whole emission (optional definition record
//!   plus data record plus index append), so frames never interleave and the
//!   position counter stays in sync with the file;
//! - the *disk* lock covers the wall-clock rate limiter around the external
//!   disk-space collaborator.
//!
//! ## Disk-space supervision
//!
//! The writer does not decide what "enough disk" means. A [`SpaceCheck`]
//! collaborator is consulted at most once per `disk_check_interval`; when it
//! reports the path unwritable, writing is disabled and subsequent writes
//! discard their message with a rate-limited warning. `set_writing_enabled`
//! offers the same control to external supervisors without a callback.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use bytes::BytesMut;
use tracing::{debug, info, warn};

use bagfile_core::error::{Error, Result};
use bagfile_core::fields::encode_fields;
use bagfile_core::index::IndexEntry;
use bagfile_core::message::Message;
use bagfile_core::time::Time;
use bagfile_core::topic::MsgInfo;

use crate::config::BagConfig;
use crate::record::RecordWriter;
use crate::scratch::Scratch;
use crate::{
    CALLERID_FIELD, COUNT_FIELD, DEF_FIELD, FILE_HEADER_LENGTH, INDEX_POS_FIELD, INDEX_VERSION,
    LATCHING_FIELD, MD5_FIELD, NSEC_FIELD, OP_FIELD, OP_FILE_HEADER, OP_INDEX_DATA, OP_MSG_DATA,
    OP_MSG_DEF, SEC_FIELD, TOPIC_FIELD, TYPE_FIELD, VERSION_LINE, VER_FIELD,
};

/// External disk-space supervisor consulted by the write path
pub trait SpaceCheck: Send {
    /// Whether the filesystem holding `path` can keep absorbing writes
    fn writable(&mut self, path: &Path) -> bool;
}

struct WriteState {
    out: RecordWriter<BufWriter<File>>,
    indexes: BTreeMap<String, Vec<IndexEntry>>,
    scratch: Scratch,
    file_header_pos: u64,
}

struct DiskState {
    check: Option<Box<dyn SpaceCheck>>,
    next_check: Instant,
    next_warn: Instant,
}

/// Append-only writer for one bag file
pub struct BagWriter {
    path: PathBuf,
    config: BagConfig,
    topics: Mutex<BTreeMap<String, MsgInfo>>,
    state: Mutex<WriteState>,
    disk: Mutex<DiskState>,
    writing_enabled: AtomicBool,
    closed: AtomicBool,
}

impl BagWriter {
    /// Create (or truncate) a bag at `path` with default configuration
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_with(path, BagConfig::default(), None)
    }

    /// Create (or truncate) a bag with explicit configuration and an
    /// optional disk-space collaborator
    pub fn create_with(
        path: impl AsRef<Path>,
        config: BagConfig,
        space_check: Option<Box<dyn SpaceCheck>>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        let mut out = RecordWriter::new(BufWriter::new(file));

        out.write_raw(VERSION_LINE.as_bytes())?;
        let file_header_pos = out.pos();
        write_file_header(&mut out, 0)?;

        let now = Instant::now();
        let mut disk = DiskState {
            check: space_check,
            next_check: now + config.disk_check_interval(),
            next_warn: now,
        };
        // Initial check, before any data lands
        let writing_enabled = match disk.check.as_mut() {
            Some(check) => check.writable(&path),
            None => true,
        };

        info!(path = %path.display(), "bag opened for writing");

        Ok(Self {
            path,
            config,
            topics: Mutex::new(BTreeMap::new()),
            state: Mutex::new(WriteState {
                out,
                indexes: BTreeMap::new(),
                scratch: Scratch::new(),
                file_header_pos,
            }),
            disk: Mutex::new(disk),
            writing_enabled: AtomicBool::new(writing_enabled),
            closed: AtomicBool::new(false),
        })
    }

    /// Append one message to the bag
    pub fn write<M: Message>(&self, topic: &str, time: Time, msg: &M) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::NotOpen);
        }
        if !self.writing_enabled.load(Ordering::Acquire) {
            self.warn_discarded();
            return Ok(());
        }

        // Topic admission: first writer snapshots the schema identity
        let (info, needs_def) = {
            let mut topics = self.topics.lock().unwrap();
            match topics.get(topic) {
                Some(info) => (info.clone(), false),
                None => {
                    let info =
                        MsgInfo::new(topic, M::datatype(), M::md5sum(), M::definition());
                    topics.insert(topic.to_string(), info.clone());
                    (info, true)
                }
            }
        };

        self.maybe_check_disk();

        // latching/callerid travel with the message only when its transport
        // header marks it latched
        let (latched, callerid) = match msg.connection_header() {
            Some(header) => (
                header.get("latching").map(|v| v != "0").unwrap_or(false),
                header.get("callerid").cloned().unwrap_or_default(),
            ),
            None => (false, String::new()),
        };

        let mut state = self.state.lock().unwrap();
        let state = &mut *state;

        // The entry must point at the next record to be emitted, so it is
        // appended before any bytes leave the buffer
        state
            .indexes
            .entry(topic.to_string())
            .or_default()
            .push(IndexEntry::new(time, state.out.pos()));

        if needs_def {
            let op = [OP_MSG_DEF];
            state.out.write_record(
                &[
                    (OP_FIELD, &op[..]),
                    (TOPIC_FIELD, topic.as_bytes()),
                    (MD5_FIELD, info.md5sum.as_bytes()),
                    (TYPE_FIELD, info.datatype.as_bytes()),
                    (DEF_FIELD, info.msg_def.as_bytes()),
                ],
                &[],
            )?;
            debug!(topic = %topic, datatype = %info.datatype, "definition record written");
        }

        let len = msg.serialized_length() as usize;
        msg.serialize(state.scratch.grow_to(len));

        let op = [OP_MSG_DATA];
        let sec = time.sec.to_le_bytes();
        let nsec = time.nsec.to_le_bytes();
        let mut fields: Vec<(&str, &[u8])> = vec![
            (OP_FIELD, &op[..]),
            (TOPIC_FIELD, topic.as_bytes()),
            (MD5_FIELD, info.md5sum.as_bytes()),
            (TYPE_FIELD, info.datatype.as_bytes()),
            (SEC_FIELD, &sec[..]),
            (NSEC_FIELD, &nsec[..]),
        ];
        if latched {
            fields.push((LATCHING_FIELD, b"1"));
            fields.push((CALLERID_FIELD, callerid.as_bytes()));
        }

        state.out.write_record(&fields, state.scratch.filled(len))?;
        Ok(())
    }

    /// Flush the trailing index and rewrite the file header in place.
    /// Idempotent; also invoked on drop.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let topics = self.topics.lock().unwrap();
        let mut state = self.state.lock().unwrap();
        let state = &mut *state;

        let result = write_index_and_rewrite_header(state, &topics);
        // Flush runs even when the index write failed; the descriptor is
        // released on drop either way
        let flushed = state.out.flush();

        match (&result, &flushed) {
            (Ok(index_pos), Ok(())) => {
                info!(
                    path = %self.path.display(),
                    topics = topics.len(),
                    index_pos = *index_pos,
                    "bag closed"
                );
            }
            _ => {
                warn!(path = %self.path.display(), "bag close incomplete; file may be unreadable");
            }
        }

        result.map(|_| ())?;
        flushed
    }

    /// External toggle for the disk-space supervisor
    pub fn set_writing_enabled(&self, enabled: bool) {
        self.writing_enabled.store(enabled, Ordering::Release);
    }

    pub fn is_writing_enabled(&self) -> bool {
        self.writing_enabled.load(Ordering::Acquire)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of messages accepted so far, across all topics
    pub fn message_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .indexes
            .values()
            .map(|entries| entries.len())
            .sum()
    }

    fn maybe_check_disk(&self) {
        let mut disk = self.disk.lock().unwrap();
        if disk.check.is_none() {
            return;
        }
        let now = Instant::now();
        if now < disk.next_check {
            return;
        }
        disk.next_check = now + self.config.disk_check_interval();
        let writable = disk.check.as_mut().unwrap().writable(&self.path);
        self.writing_enabled.store(writable, Ordering::Release);
        if !writable {
            warn!(path = %self.path.display(), "disk-space check failed; disabling writes");
        }
    }

    fn warn_discarded(&self) {
        let mut disk = self.disk.lock().unwrap();
        let now = Instant::now();
        if now >= disk.next_warn {
            disk.next_warn = now + self.config.warn_interval();
            warn!("discarding message: writing is disabled (disk-space supervisor)");
        }
    }
}

impl Drop for BagWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = %self.path.display(), error = %e, "failed to close bag cleanly");
        }
    }
}

/// Emit one index record per topic, then rewrite the file header with the
/// offset of the first one. Returns that offset.
fn write_index_and_rewrite_header(
    state: &mut WriteState,
    topics: &BTreeMap<String, MsgInfo>,
) -> Result<u64> {
    let index_pos = state.out.pos();
    let mut body = BytesMut::new();

    for (topic, entries) in &state.indexes {
        let info = topics.get(topic).ok_or_else(|| {
            Error::BadFormat(format!("topic {:?} indexed but never admitted", topic))
        })?;

        body.clear();
        for entry in entries {
            entry.encode(&mut body);
        }

        let op = [OP_INDEX_DATA];
        let ver = INDEX_VERSION.to_le_bytes();
        let count = (entries.len() as u32).to_le_bytes();
        state.out.write_record(
            &[
                (OP_FIELD, &op[..]),
                (TOPIC_FIELD, topic.as_bytes()),
                (TYPE_FIELD, info.datatype.as_bytes()),
                (VER_FIELD, &ver[..]),
                (COUNT_FIELD, &count[..]),
            ],
            &body,
        )?;
    }

    state.out.seek(state.file_header_pos)?;
    write_file_header(&mut state.out, index_pos)?;
    Ok(index_pos)
}

/// Write the file-header record, padded with spaces so its total size is at
/// least `FILE_HEADER_LENGTH` and a later rewrite fits in the same slot
fn write_file_header(out: &mut RecordWriter<BufWriter<File>>, index_pos: u64) -> Result<()> {
    let op = [OP_FILE_HEADER];
    let index_pos_bytes = index_pos.to_le_bytes();

    let mut header = BytesMut::new();
    encode_fields(
        &mut header,
        &[
            (OP_FIELD, &op[..]),
            (INDEX_POS_FIELD, &index_pos_bytes[..]),
        ],
    );
    let hdr_len = header.len() as u32;
    let pad_len = FILE_HEADER_LENGTH.saturating_sub(hdr_len);

    out.write_raw(&hdr_len.to_le_bytes())?;
    out.write_raw(&header)?;
    out.write_raw(&pad_len.to_le_bytes())?;
    out.write_raw(&vec![b' '; pad_len as usize])?;
    Ok(())
}
