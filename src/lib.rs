//! Ember Engine - classic id Tech 1 style simulation core.
//!
//! The crate owns the coupled runtime under a Doom-family game: the
//! content store (WAD archives with a zone-backed lump cache), the map
//! runtime (thinkers, mobjs, plane movers, particle generators, bias
//! lighting), the ACS bytecode interpreter, the input binding engine,
//! the authoritative network session and the save/restore pipeline.
//! Rendering, audio and definition parsing are the host's business; the
//! host pushes input events and packets in, pulls vis-state and outgoing
//! packets back out, and calls `GameSession::tick` at the sharp tick
//! rate.

// Core engine modules
pub mod codec;
pub mod constants;
pub mod error;
pub mod fixed;
pub mod rng;

// Content pipeline
pub mod wad;
pub mod zone;

// The map runtime
pub mod bias;
pub mod particles;
pub mod world;

// Scripting, input, networking, persistence
pub mod acs;
pub mod input;
pub mod network;
pub mod persistence;

// Session orchestration
pub mod game;

pub use error::{CoreError, CoreResult};
pub use fixed::{Angle, Fixed};
pub use game::{GameConfig, GameSession};

// Frequently used subsystem types, re-exported for hosts.
pub use acs::{AcsModule, AcsSystem};
pub use bias::BiasEngine;
pub use input::{BindingSystem, InputEvent};
pub use network::{Packet, PacketType, ServerSession};
pub use persistence::SaveMetadata;
pub use wad::ContentStore;
pub use world::{Map, Mobj, ThinkerId, World};
pub use zone::{PurgeTag, Zone};
