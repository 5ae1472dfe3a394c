//! Content store: named-blob (WAD) archives with overlay semantics,
//! namespace groups and a zone-backed lump cache.

pub mod archive;
pub mod cache;
pub mod pk3;
pub mod store;

pub use archive::{ArchiveHandle, FileRecord, RecordKind};
pub use store::{ContentStore, GroupTag, Lump, LumpName};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WadError {
    #[error("File not found: {path}")]
    NotFound { path: String },
    #[error("Archive {path} has no IWAD or PWAD id")]
    BadMagic { path: String },
    #[error("Archive {path} is truncated")]
    Truncated { path: String },
    #[error("No IWAD was located during startup")]
    NoIwad,
    #[error("Bad lump index: {index}")]
    BadLumpIndex { index: usize },
    #[error("Auxiliary archive is not open")]
    AuxiliaryNotOpen,
    #[error("Zip archive {path}: {reason}")]
    Zip { path: String, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type WadResult<T> = Result<T, WadError>;
