//! Crate-level error type.
//!
//! Component boundaries return typed errors; the tick loop logs and either
//! ignores the failure, terminates the offending actor, or ends the
//! session. Panics are reserved for zone allocation failure.

use std::error::Error as StdError;
use std::fmt;

use crate::acs::AcsError;
use crate::network::NetError;
use crate::persistence::SaveError;
use crate::wad::WadError;

/// Unified error type for the engine core.
#[derive(Debug)]
pub enum CoreError {
    // Content errors
    Content(WadError),

    // State errors
    UnknownMobjType {
        type_id: i32,
    },
    NoSuchScript {
        number: i32,
    },
    Acs(AcsError),

    // Network errors
    Net(NetError),

    // Persistence errors
    Save(SaveError),

    // Configuration errors
    InvalidConfig {
        field: String,
        reason: String,
    },

    // Generic fallback
    Internal {
        message: String,
    },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::Content(e) => write!(f, "Content error: {}", e),
            CoreError::UnknownMobjType { type_id } => {
                write!(f, "Unknown mobj type: {}", type_id)
            }
            CoreError::NoSuchScript { number } => {
                write!(f, "No such script: #{}", number)
            }
            CoreError::Acs(e) => write!(f, "Script error: {}", e),
            CoreError::Net(e) => write!(f, "Network error: {}", e),
            CoreError::Save(e) => write!(f, "Savegame error: {}", e),
            CoreError::InvalidConfig { field, reason } => {
                write!(f, "Invalid config: {} ({})", field, reason)
            }
            CoreError::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl StdError for CoreError {}

impl From<WadError> for CoreError {
    fn from(e: WadError) -> Self {
        CoreError::Content(e)
    }
}

impl From<AcsError> for CoreError {
    fn from(e: AcsError) -> Self {
        CoreError::Acs(e)
    }
}

impl From<NetError> for CoreError {
    fn from(e: NetError) -> Self {
        CoreError::Net(e)
    }
}

impl From<SaveError> for CoreError {
    fn from(e: SaveError) -> Self {
        CoreError::Save(e)
    }
}

/// Type alias for Results in the engine core.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::UnknownMobjType { type_id: 4242 };
        assert_eq!(err.to_string(), "Unknown mobj type: 4242");
    }
}
