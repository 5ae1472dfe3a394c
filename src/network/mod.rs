//! Network session: packet protocol, the authoritative server path and
//! client position reconciliation.

pub mod protocol;
pub mod server;
pub mod smoother;

pub use protocol::{Packet, PacketType, SendTarget};
pub use server::{ServerPlayer, ServerSession};
pub use smoother::Smoother;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("Duplicate client id {id:08x}")]
    DuplicateId { id: u32 },
    #[error("Incompatible game id: {got}")]
    BadGameId { got: String },
    #[error("Malformed {packet:?} packet")]
    Malformed { packet: PacketType },
    #[error("No free player slots")]
    Full,
}

pub type NetResult<T> = Result<T, NetError>;
