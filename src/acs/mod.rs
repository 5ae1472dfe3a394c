//! Action Code Script: the bytecode interpreter, compiled module and the
//! owning script system.

pub mod interpreter;
pub mod module;
pub mod script;
pub mod system;

pub use interpreter::{AcsStack, AcsThinker};
pub use module::AcsModule;
pub use script::{Script, ScriptState};
pub use system::{AcsEnv, AcsMessage, AcsSystem, SoundEvent};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcsError {
    #[error("Bad ACS module magic")]
    BadMagic,
    #[error("Truncated ACS module")]
    Truncated,
    #[error("Unknown pcode #{op}")]
    UnknownOpcode { op: i32 },
    #[error("Unknown script number {number}")]
    UnknownScript { number: i32 },
}

pub type AcsResult<T> = Result<T, AcsError>;
