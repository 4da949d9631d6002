//! Record Framing
//!
//! Every record in a bag is framed as
//!
//! ```text
//! hdr_len (4 LE) | header bytes | data_len (4 LE) | data bytes
//! ```
//!
//! [`RecordWriter`] emits frames sequentially and tracks the write position
//! itself. The shadow counter is what index entries store, so it must agree
//! with the stream at all times. The only non-sequential write a bag ever
//! does is the single seek back to the file-header slot at close.
//!
//! [`RecordReader`] parses frames and leaves the stream positioned at the
//! payload, so callers decide whether to read it or skip it. A clean EOF at
//! a frame boundary reads as `None`; an EOF inside a frame is `Truncated`.

use std::io::{self, Read, Seek, SeekFrom, Write};

use bytes::BytesMut;

use bagfile_core::error::{Error, Result};
use bagfile_core::fields::{decode_fields, encode_fields, FieldMap};

use crate::scratch::Scratch;

/// Longest accepted version line, delimiter included
const MAX_VERSION_LINE: usize = 64;

/// Sequential record emitter with a tracked write position
pub struct RecordWriter<W: Write + Seek> {
    out: W,
    pos: u64,
    header_buf: BytesMut,
}

impl<W: Write + Seek> RecordWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            pos: 0,
            header_buf: BytesMut::new(),
        }
    }

    /// Current write position; the offset the next record will land at
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Write unframed bytes (version line, padding, record bodies)
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.write_all(bytes)?;
        self.pos += bytes.len() as u64;
        Ok(())
    }

    /// Write a frame's header portion: `hdr_len | header | data_len`.
    /// The caller follows up with exactly `data_len` bytes of body.
    pub fn write_header(&mut self, fields: &[(&str, &[u8])], data_len: u32) -> Result<()> {
        self.header_buf.clear();
        encode_fields(&mut self.header_buf, fields);
        let hdr_len = self.header_buf.len() as u32;

        self.out.write_all(&hdr_len.to_le_bytes())?;
        self.out.write_all(&self.header_buf)?;
        self.out.write_all(&data_len.to_le_bytes())?;
        self.pos += 4 + hdr_len as u64 + 4;
        Ok(())
    }

    /// Write one complete record
    pub fn write_record(&mut self, fields: &[(&str, &[u8])], data: &[u8]) -> Result<()> {
        self.write_header(fields, data.len() as u32)?;
        self.write_raw(data)
    }

    pub fn seek(&mut self, pos: u64) -> Result<()> {
        self.out.seek(SeekFrom::Start(pos))?;
        self.pos = pos;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Sequential record parser over a seekable stream
#[derive(Debug)]
pub struct RecordReader<R: Read + Seek> {
    inp: R,
    header_scratch: Scratch,
}

impl<R: Read + Seek> RecordReader<R> {
    pub fn new(inp: R) -> Self {
        Self {
            inp,
            header_scratch: Scratch::new(),
        }
    }

    /// Read the leading ASCII version line, newline excluded
    pub fn read_version_line(&mut self) -> Result<String> {
        let mut line = Vec::with_capacity(MAX_VERSION_LINE);
        let mut byte = [0u8; 1];
        loop {
            self.inp.read_exact(&mut byte).map_err(truncated_at_eof)?;
            if byte[0] == b'\n' {
                break;
            }
            if line.len() >= MAX_VERSION_LINE {
                return Err(Error::BadFormat("version line too long".to_string()));
            }
            line.push(byte[0]);
        }
        String::from_utf8(line)
            .map_err(|_| Error::BadFormat("version line is not ASCII".to_string()))
    }

    /// Read the next frame's header. Returns `None` on a clean EOF at a
    /// frame boundary; leaves the stream positioned at the payload.
    pub fn read_record_header(&mut self) -> Result<Option<(FieldMap, u32)>> {
        let mut len_buf = [0u8; 4];
        match self.inp.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let hdr_len = u32::from_le_bytes(len_buf) as usize;

        let hdr = self.header_scratch.grow_to(hdr_len);
        self.inp.read_exact(hdr).map_err(truncated_at_eof)?;
        let fields = decode_fields(self.header_scratch.filled(hdr_len))?;

        self.inp
            .read_exact(&mut len_buf)
            .map_err(truncated_at_eof)?;
        let data_len = u32::from_le_bytes(len_buf);

        Ok(Some((fields, data_len)))
    }

    /// Read the current frame's payload into `scratch`
    pub fn read_data(&mut self, len: u32, scratch: &mut Scratch) -> Result<()> {
        let buf = scratch.grow_to(len as usize);
        self.inp.read_exact(buf).map_err(truncated_at_eof)?;
        Ok(())
    }

    /// Skip over the current frame's payload
    pub fn skip_data(&mut self, len: u32) -> Result<()> {
        if len > 0 {
            self.inp.seek(SeekFrom::Current(len as i64))?;
        }
        Ok(())
    }

    pub fn seek(&mut self, pos: u64) -> Result<()> {
        self.inp.seek(SeekFrom::Start(pos))?;
        Ok(())
    }
}

/// Mid-frame EOF means the file was cut short, not that iteration is done
fn truncated_at_eof(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::Truncated
    } else {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip_buffer() -> Cursor<Vec<u8>> {
        Cursor::new(Vec::new())
    }

    // ---------------------------------------------------------------
    // Writer position tracking
    // ---------------------------------------------------------------

    #[test]
    fn test_pos_tracks_raw_writes() {
        let mut writer = RecordWriter::new(roundtrip_buffer());
        assert_eq!(writer.pos(), 0);
        writer.write_raw(b"#ROSRECORD V1.2\n").unwrap();
        assert_eq!(writer.pos(), 16);
    }

    #[test]
    fn test_pos_tracks_records() {
        let mut writer = RecordWriter::new(roundtrip_buffer());
        writer
            .write_record(&[("op", &[0x02][..])], b"payload")
            .unwrap();
        // 4 + (2 + 1 + 4 + 1) + 4 + 7
        assert_eq!(writer.pos(), 23);
    }

    #[test]
    fn test_seek_resets_pos() {
        let mut writer = RecordWriter::new(roundtrip_buffer());
        writer.write_raw(&[0u8; 100]).unwrap();
        writer.seek(10).unwrap();
        assert_eq!(writer.pos(), 10);
    }

    // ---------------------------------------------------------------
    // Frame round trips
    // ---------------------------------------------------------------

    #[test]
    fn test_record_roundtrip() {
        let mut writer = RecordWriter::new(roundtrip_buffer());
        let op = [0x02u8];
        writer
            .write_record(
                &[("op", &op[..]), ("topic", b"/a")],
                b"hello",
            )
            .unwrap();

        let mut reader = RecordReader::new(Cursor::new(writer.out.into_inner()));
        let (fields, data_len) = reader.read_record_header().unwrap().unwrap();
        assert_eq!(fields.get_u8("op").unwrap(), 0x02);
        assert_eq!(fields.get_str("topic").unwrap(), "/a");
        assert_eq!(data_len, 5);

        let mut scratch = Scratch::new();
        reader.read_data(data_len, &mut scratch).unwrap();
        assert_eq!(scratch.filled(5), b"hello");
    }

    #[test]
    fn test_multiple_records_sequential() {
        let mut writer = RecordWriter::new(roundtrip_buffer());
        for i in 0u8..5 {
            let op = [i];
            writer
                .write_record(&[("op", &op[..])], &[i; 3])
                .unwrap();
        }

        let mut reader = RecordReader::new(Cursor::new(writer.out.into_inner()));
        let mut scratch = Scratch::new();
        for i in 0u8..5 {
            let (fields, data_len) = reader.read_record_header().unwrap().unwrap();
            assert_eq!(fields.get_u8("op").unwrap(), i);
            reader.read_data(data_len, &mut scratch).unwrap();
            assert_eq!(scratch.filled(3), &[i; 3]);
        }
        assert!(reader.read_record_header().unwrap().is_none());
    }

    #[test]
    fn test_skip_data_lands_on_next_frame() {
        let mut writer = RecordWriter::new(roundtrip_buffer());
        let op1 = [1u8];
        let op2 = [2u8];
        writer.write_record(&[("op", &op1[..])], &[0xAA; 64]).unwrap();
        writer.write_record(&[("op", &op2[..])], b"tail").unwrap();

        let mut reader = RecordReader::new(Cursor::new(writer.out.into_inner()));
        let (_, data_len) = reader.read_record_header().unwrap().unwrap();
        reader.skip_data(data_len).unwrap();
        let (fields, _) = reader.read_record_header().unwrap().unwrap();
        assert_eq!(fields.get_u8("op").unwrap(), 2);
    }

    #[test]
    fn test_empty_body_record() {
        let mut writer = RecordWriter::new(roundtrip_buffer());
        let op = [0x01u8];
        writer.write_record(&[("op", &op[..])], &[]).unwrap();

        let mut reader = RecordReader::new(Cursor::new(writer.out.into_inner()));
        let (_, data_len) = reader.read_record_header().unwrap().unwrap();
        assert_eq!(data_len, 0);
        assert!(reader.read_record_header().unwrap().is_none());
    }

    // ---------------------------------------------------------------
    // Version line
    // ---------------------------------------------------------------

    #[test]
    fn test_version_line_roundtrip() {
        let mut reader = RecordReader::new(Cursor::new(b"#ROSRECORD V1.2\nrest".to_vec()));
        assert_eq!(reader.read_version_line().unwrap(), "#ROSRECORD V1.2");
    }

    #[test]
    fn test_version_line_missing_newline() {
        let mut reader = RecordReader::new(Cursor::new(b"#ROSRECORD".to_vec()));
        assert!(matches!(
            reader.read_version_line().unwrap_err(),
            Error::Truncated
        ));
    }

    #[test]
    fn test_version_line_unbounded_garbage() {
        let mut reader = RecordReader::new(Cursor::new(vec![b'x'; 1000]));
        assert!(matches!(
            reader.read_version_line().unwrap_err(),
            Error::BadFormat(_)
        ));
    }

    // ---------------------------------------------------------------
    // Truncation
    // ---------------------------------------------------------------

    #[test]
    fn test_eof_at_boundary_is_none() {
        let mut reader = RecordReader::new(Cursor::new(Vec::new()));
        assert!(reader.read_record_header().unwrap().is_none());
    }

    #[test]
    fn test_truncated_header_is_error() {
        // hdr_len says 10 bytes, only 3 present
        let mut data = 10u32.to_le_bytes().to_vec();
        data.extend_from_slice(&[b'a', b'=', 0]);
        let mut reader = RecordReader::new(Cursor::new(data));
        assert!(matches!(
            reader.read_record_header().unwrap_err(),
            Error::Truncated
        ));
    }

    #[test]
    fn test_truncated_data_length_is_error() {
        // A full header but no data_len word after it
        let mut writer = RecordWriter::new(roundtrip_buffer());
        let op = [0x02u8];
        writer.write_record(&[("op", &op[..])], b"xy").unwrap();
        let mut data = writer.out.into_inner();
        data.truncate(data.len() - 4); // drop data bytes and 2 of data_len

        let mut reader = RecordReader::new(Cursor::new(data));
        assert!(matches!(
            reader.read_record_header().unwrap_err(),
            Error::Truncated
        ));
    }

    #[test]
    fn test_truncated_payload_is_error() {
        let mut writer = RecordWriter::new(roundtrip_buffer());
        let op = [0x02u8];
        writer.write_record(&[("op", &op[..])], b"payload").unwrap();
        let mut data = writer.out.into_inner();
        data.truncate(data.len() - 3);

        let mut reader = RecordReader::new(Cursor::new(data));
        let (_, data_len) = reader.read_record_header().unwrap().unwrap();
        let mut scratch = Scratch::new();
        assert!(matches!(
            reader.read_data(data_len, &mut scratch).unwrap_err(),
            Error::Truncated
        ));
    }
}
