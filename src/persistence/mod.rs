//! Save/restore: versioned serialization of the whole world state.

pub mod savegame;

pub use savegame::{read_save, write_save, SaveMetadata};

use thiserror::Error;

use crate::codec::CodecError;

pub type SaveResult<T> = Result<T, SaveError>;

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("Not a savegame (bad magic)")]
    BadMagic,
    #[error("Unsupported savegame version {found}")]
    UnsupportedVersion { found: u8 },
    #[error("Unknown thinker class #{class} in savegame")]
    UnknownThinkerClass { class: u8 },
    #[error("Bad savegame (consistency test failed)")]
    ConsistencyFailure,
    #[error("Savegame truncated: {0}")]
    Codec(#[from] CodecError),
    #[error("Dangling mobj reference: serial {serial}")]
    DanglingReference { serial: u32 },
}
