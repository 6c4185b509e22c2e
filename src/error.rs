//! Conversion error types
//!
//! Every failure in the converter is reported through `ConvertError`; there
//! is no panic-based control flow in the library. Loader-side structural
//! errors can be downgraded to warnings in repair mode, encoder-side
//! validation errors are always fatal.
//!
//! This program is unlicensed and dedicated to the public domain.
//! Developed by Tommy Olsen.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("can't open {path}: {source}")]
    IoOpen { path: String, source: io::Error },

    #[error("can't read {path}: {source}")]
    IoRead { path: String, source: io::Error },

    #[error("can't write to {path}: {source}")]
    IoWrite { path: String, source: io::Error },

    #[error("illegal header size in {path}")]
    MalformedHeader { path: String },

    #[error("CHIP tag not found in {path}")]
    BadChipTag { path: String },

    #[error("data size exceeds chunk length (data:{data:04x} chunk:{chunk:04x}) (use repair mode to force)")]
    ChunkSizeMismatch { data: u32, chunk: u32 },

    #[error("could not read all chip data from {path} (use repair mode to force)")]
    TruncatedStream { path: String },

    #[error("unknown CRT hardware ID: {0}")]
    UnknownHardwareId(i32),

    #[error("illegal file size {size} for {context}")]
    InvalidSize { size: usize, context: String },

    #[error("{0}")]
    UnsupportedConversion(String),

    #[error("too many input files")]
    TooManyInputs,

    #[error("no room to insert {path}")]
    NoRoomForInsertion { path: String },

    #[error("only one size of inserted image is allowed")]
    MixedInsertionSizes,

    #[error("wrong size of {cart} base file {path} ({size})")]
    WrongBaseSize {
        cart: &'static str,
        path: String,
        size: usize,
    },

    #[error("no files to insert")]
    NothingToInsert,
}

impl ConvertError {
    pub(crate) fn open(path: &std::path::Path, source: io::Error) -> Self {
        ConvertError::IoOpen {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn read(path: &std::path::Path, source: io::Error) -> Self {
        ConvertError::IoRead {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn write(path: &std::path::Path, source: io::Error) -> Self {
        ConvertError::IoWrite {
            path: path.display().to_string(),
            source,
        }
    }
}
