//! The game session: configuration, the per-tick orchestrator and the
//! console command surface.

pub mod config;
pub mod console;
pub mod session;

pub use config::GameConfig;
pub use session::GameSession;
