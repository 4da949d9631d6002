//! Error Types for Bagfile
//!
//! This module defines all error types that can occur while writing or
//! reading a bag.
//!
//! ## Error Categories
//!
//! ### Lifecycle Errors
//! - `NotOpen`: operation on a writer that has already been closed
//!
//! ### I/O Errors
//! - `Io`: file-system failures, converted automatically via `#[from]`
//!
//! ### Format Errors
//! - `UnsupportedVersion`: the version line is not the one this library writes
//! - `BadFormat`: malformed record (bad opcode, missing field, zero index
//!   pointer, index count/size mismatch, ...)
//! - `Truncated`: a header block ends in the middle of a field
//! - `BadLength`: a field value has the wrong size (e.g. a 31-byte md5)
//!
//! ### Access Errors
//! - `InvalidPosition`: a file offset that does not resolve to a data record
//!
//! Fingerprint mismatches are deliberately *not* errors: materializing a
//! message as the wrong type returns `Ok(None)` instead. A full disk is not
//! an error either; it disables writing and further writes discard.
//!
//! ## Usage
//! All fallible functions return `Result<T>`, aliased to `Result<T, Error>`,
//! so `?` propagates cleanly.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("bag is not open for writing")]
    NotOpen,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported bag version: {0:?}")]
    UnsupportedVersion(String),

    #[error("bad record format: {0}")]
    BadFormat(String),

    #[error("truncated header block")]
    Truncated,

    #[error("field {field} has wrong size: expected {expected} bytes, got {actual}")]
    BadLength {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("offset {0} does not resolve to a data record")]
    InvalidPosition(u64),
}

pub type Result<T> = std::result::Result<T, Error>;
