//! Record Header Codec
//!
//! Every record in a bag carries a header: a concatenation of named fields,
//! each encoded as
//!
//! ```text
//! <name> '=' <value_len: u32 LE> <value bytes>
//! ```
//!
//! Field names are ASCII; values are arbitrary bytes. The codec never
//! interprets values; typed access happens through [`FieldMap`] accessors,
//! which also enforce presence and size the way record parsing requires
//! (e.g. an `md5` field must be exactly 32 bytes).
//!
//! ## Failure kinds
//! - [`Error::Truncated`]: the buffer ends inside a field block
//! - [`Error::BadLength`]: a declared value length exceeds the remaining
//!   buffer, or a typed accessor finds a value of the wrong size

use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Separator between a field name and its length-prefixed value
pub const FIELD_DELIM: u8 = b'=';

/// Append one `name=len+value` block to `buf`
pub fn encode_field(buf: &mut BytesMut, name: &str, value: &[u8]) {
    buf.put_slice(name.as_bytes());
    buf.put_u8(FIELD_DELIM);
    buf.put_u32_le(value.len() as u32);
    buf.put_slice(value);
}

/// Encode an ordered list of fields into a single header buffer
pub fn encode_fields(buf: &mut BytesMut, fields: &[(&str, &[u8])]) {
    for (name, value) in fields {
        encode_field(buf, name, value);
    }
}

/// Parse a complete header buffer into a name → value mapping
pub fn decode_fields(data: &[u8]) -> Result<FieldMap> {
    let mut fields = HashMap::new();
    let mut rest = data;

    while !rest.is_empty() {
        let delim = rest
            .iter()
            .position(|&b| b == FIELD_DELIM)
            .ok_or(Error::Truncated)?;
        let name = std::str::from_utf8(&rest[..delim])
            .map_err(|_| Error::BadFormat("field name is not ASCII".to_string()))?
            .to_string();
        rest = &rest[delim + 1..];

        if rest.len() < 4 {
            return Err(Error::Truncated);
        }
        let value_len = u32::from_le_bytes(rest[..4].try_into().unwrap()) as usize;
        rest = &rest[4..];

        if rest.len() < value_len {
            return Err(Error::BadLength {
                field: name,
                expected: value_len,
                actual: rest.len(),
            });
        }
        fields.insert(name, Bytes::copy_from_slice(&rest[..value_len]));
        rest = &rest[value_len..];
    }

    Ok(FieldMap { fields })
}

/// Decoded record header with typed, size-checked accessors
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    fields: HashMap<String, Bytes>,
}

impl FieldMap {
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// A field that may legitimately be absent (e.g. `latching`)
    pub fn get_opt(&self, name: &str) -> Option<&Bytes> {
        self.fields.get(name)
    }

    /// A required field; missing means the record is malformed
    pub fn get(&self, name: &str) -> Result<&Bytes> {
        self.fields
            .get(name)
            .ok_or_else(|| Error::BadFormat(format!("required field {:?} missing", name)))
    }

    /// A required field with an exact on-disk size
    pub fn get_exact(&self, name: &str, len: usize) -> Result<&Bytes> {
        let value = self.get(name)?;
        if value.len() != len {
            return Err(Error::BadLength {
                field: name.to_string(),
                expected: len,
                actual: value.len(),
            });
        }
        Ok(value)
    }

    pub fn get_str(&self, name: &str) -> Result<String> {
        let value = self.get(name)?;
        String::from_utf8(value.to_vec())
            .map_err(|_| Error::BadFormat(format!("field {:?} is not valid UTF-8", name)))
    }

    pub fn get_opt_str(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .and_then(|v| String::from_utf8(v.to_vec()).ok())
    }

    pub fn get_u8(&self, name: &str) -> Result<u8> {
        let value = self.get_exact(name, 1)?;
        Ok(value[0])
    }

    pub fn get_u32(&self, name: &str) -> Result<u32> {
        let value = self.get_exact(name, 4)?;
        Ok(u32::from_le_bytes(value[..4].try_into().unwrap()))
    }

    pub fn get_u64(&self, name: &str) -> Result<u64> {
        let value = self.get_exact(name, 8)?;
        Ok(u64::from_le_bytes(value[..8].try_into().unwrap()))
    }
}
