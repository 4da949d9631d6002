//! Bag Reader
//!
//! `Bag::open` bootstraps a finished bag entirely from its trailing index:
//!
//! 1. The version line must match the one this library writes; anything else
//!    is rejected outright.
//! 2. The file-header record yields `index_pos`. A zero pointer means the
//!    writer never closed the bag, and there is nothing to bootstrap from.
//! 3. Every record from `index_pos` to EOF must be an index block; their
//!    entries rebuild the per-topic indexes in insertion order.
//! 4. For each indexed topic, the record at its first entry's offset yields
//!    the schema definition (an empty definition text is tolerated: bags
//!    recorded from pre-1.2 playback legitimately lack it).
//!
//! After bootstrap the bag holds exactly the maps a writer held before
//! close, and serves random-access reads by file offset. The read stream
//! and its payload scratch sit behind one mutex: materializing messages
//! from several threads through a shared `&Bag` is serialized, not torn.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::info;

use bagfile_core::error::{Error, Result};
use bagfile_core::fields::FieldMap;
use bagfile_core::index::{IndexEntry, INDEX_ENTRY_SIZE};
use bagfile_core::topic::MsgInfo;

use crate::record::RecordReader;
use crate::scratch::Scratch;
use crate::{
    COUNT_FIELD, DEF_FIELD, INDEX_POS_FIELD, INDEX_VERSION, MD5_FIELD, OP_FIELD, OP_FILE_HEADER,
    OP_INDEX_DATA, OP_MSG_DATA, OP_MSG_DEF, TOPIC_FIELD, TYPE_FIELD, VERSION_LINE, VER_FIELD,
};

#[derive(Debug)]
struct ReadState {
    inp: RecordReader<BufReader<File>>,
    scratch: Scratch,
}

/// A finished bag opened for reading
#[derive(Debug)]
pub struct Bag {
    path: PathBuf,
    index_pos: u64,
    topics: BTreeMap<String, MsgInfo>,
    indexes: BTreeMap<String, Vec<IndexEntry>>,
    state: Mutex<ReadState>,
}

impl Bag {
    /// Open a bag and load its index and topic definitions
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mut inp = RecordReader::new(BufReader::new(file));
        let mut scratch = Scratch::new();

        let line = inp.read_version_line()?;
        if line != VERSION_LINE.trim_end() {
            return Err(Error::UnsupportedVersion(line));
        }

        let index_pos = read_file_header(&mut inp)?;
        let indexes = read_index_blocks(&mut inp, &mut scratch, index_pos)?;

        let mut topics = BTreeMap::new();
        for (topic, entries) in &indexes {
            if let Some(first) = entries.first() {
                topics.insert(topic.clone(), read_definition(&mut inp, first.pos)?);
            }
        }

        let message_count: usize = indexes.values().map(|e| e.len()).sum();
        info!(
            path = %path.display(),
            topics = topics.len(),
            messages = message_count,
            "bag opened"
        );

        Ok(Self {
            path,
            index_pos,
            topics,
            indexes,
            state: Mutex::new(ReadState { inp, scratch }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset of the first trailing index record
    pub fn index_pos(&self) -> u64 {
        self.index_pos
    }

    /// Schema snapshots of all recorded topics, in topic-name order
    pub fn topics(&self) -> impl Iterator<Item = &MsgInfo> {
        self.topics.values()
    }

    pub fn topic_info(&self, topic: &str) -> Option<&MsgInfo> {
        self.topics.get(topic)
    }

    /// One topic's index entries, in the order they were written
    pub fn index(&self, topic: &str) -> Option<&[IndexEntry]> {
        self.indexes.get(topic).map(|v| v.as_slice())
    }

    /// Total number of indexed messages across all topics
    pub fn message_count(&self) -> usize {
        self.indexes.values().map(|e| e.len()).sum()
    }

    /// Seek to `pos`, skip any definition records, and hand the first data
    /// record's header and payload to `f`. Any other opcode at `pos` means
    /// the offset does not belong to this bag's data section.
    pub(crate) fn with_data_record<T>(
        &self,
        pos: u64,
        f: impl FnOnce(&FieldMap, &[u8]) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.state.lock().unwrap();
        let state = &mut *state;
        state.inp.seek(pos)?;

        loop {
            let (fields, data_len) = state
                .inp
                .read_record_header()?
                .ok_or(Error::InvalidPosition(pos))?;
            match fields.get_u8(OP_FIELD)? {
                OP_MSG_DEF => {
                    state.inp.skip_data(data_len)?;
                }
                OP_MSG_DATA => {
                    state.inp.read_data(data_len, &mut state.scratch)?;
                    return f(&fields, state.scratch.filled(data_len as usize));
                }
                _ => return Err(Error::InvalidPosition(pos)),
            }
        }
    }
}

fn read_file_header(inp: &mut RecordReader<BufReader<File>>) -> Result<u64> {
    let (fields, data_len) = inp
        .read_record_header()?
        .ok_or_else(|| Error::BadFormat("missing file-header record".to_string()))?;

    let op = fields.get_u8(OP_FIELD)?;
    if op != OP_FILE_HEADER {
        return Err(Error::BadFormat(format!(
            "expected file-header record, found opcode {:#04x}",
            op
        )));
    }

    let index_pos = fields.get_u64(INDEX_POS_FIELD)?;
    if index_pos == 0 {
        return Err(Error::BadFormat(
            "index pointer is zero; the bag was never closed".to_string(),
        ));
    }

    inp.skip_data(data_len)?;
    Ok(index_pos)
}

fn read_index_blocks(
    inp: &mut RecordReader<BufReader<File>>,
    scratch: &mut Scratch,
    index_pos: u64,
) -> Result<BTreeMap<String, Vec<IndexEntry>>> {
    let mut indexes: BTreeMap<String, Vec<IndexEntry>> = BTreeMap::new();
    inp.seek(index_pos)?;

    while let Some((fields, data_len)) = inp.read_record_header()? {
        let op = fields.get_u8(OP_FIELD)?;
        if op != OP_INDEX_DATA {
            return Err(Error::BadFormat(format!(
                "expected index record, found opcode {:#04x}",
                op
            )));
        }

        let ver = fields.get_u32(VER_FIELD)?;
        if ver != INDEX_VERSION {
            return Err(Error::BadFormat(format!(
                "unsupported index version {}",
                ver
            )));
        }

        let topic = fields.get_str(TOPIC_FIELD)?;
        fields.get(TYPE_FIELD)?;
        let count = fields.get_u32(COUNT_FIELD)? as usize;
        if count * INDEX_ENTRY_SIZE != data_len as usize {
            return Err(Error::BadFormat(format!(
                "index for {:?} declares {} entries but carries {} bytes",
                topic, count, data_len
            )));
        }

        inp.read_data(data_len, scratch)?;
        let mut cursor = scratch.filled(data_len as usize);
        let entries = indexes.entry(topic).or_default();
        entries.reserve(count);
        for _ in 0..count {
            entries.push(IndexEntry::decode(&mut cursor)?);
        }
    }

    Ok(indexes)
}

/// Recover one topic's `MsgInfo` from the records at its first indexed
/// offset: the definition record when present, otherwise the data record's
/// own identity fields with an empty definition.
fn read_definition(inp: &mut RecordReader<BufReader<File>>, pos: u64) -> Result<MsgInfo> {
    inp.seek(pos)?;
    let (fields, _data_len) = inp
        .read_record_header()?
        .ok_or(Error::InvalidPosition(pos))?;

    let op = fields.get_u8(OP_FIELD)?;
    let topic = fields.get_str(TOPIC_FIELD)?;
    let md5 = md5_string(&fields)?;
    let datatype = fields.get_str(TYPE_FIELD)?;

    match op {
        OP_MSG_DEF => {
            // The definition text may be empty (legacy bags)
            let def = String::from_utf8(fields.get(DEF_FIELD)?.to_vec())
                .map_err(|_| Error::BadFormat("definition text is not UTF-8".to_string()))?;
            Ok(MsgInfo::new(topic, datatype, md5, def))
        }
        OP_MSG_DATA => Ok(MsgInfo::new(topic, datatype, md5, "")),
        other => Err(Error::BadFormat(format!(
            "index entry points at opcode {:#04x}, expected definition or data",
            other
        ))),
    }
}

pub(crate) fn md5_string(fields: &FieldMap) -> Result<String> {
    let raw = fields.get_exact(MD5_FIELD, 32)?;
    String::from_utf8(raw.to_vec())
        .map_err(|_| Error::BadFormat("md5 field is not ASCII hex".to_string()))
}
