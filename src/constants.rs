//! Engine-wide constants, grouped by subsystem.

/// Core timing constants.
pub mod tick {
    /// Simulation tick rate (sharp ticks per second).
    pub const TICRATE: u32 = 35;

    /// Seconds per sharp tick.
    pub const TICK_SECONDS: f32 = 1.0 / TICRATE as f32;
}

/// Fixed-point plane-pin sentinels. A mobj or particle whose z equals one
/// of these is glued to the floor/ceiling plane of its subspace.
pub mod sentinel {
    pub const MIN_Z: i32 = i32::MIN;
    pub const MAX_Z: i32 = i32::MAX;
}

/// Mobj physics constants (map units per tick unless noted).
pub mod physics {
    /// Standard sector friction.
    pub const FRICTION_NORMAL: f64 = 0.90625;
    /// Airborne friction for flying mobjs.
    pub const FRICTION_FLY: f64 = 0.91796875;
    /// Low-friction (icy) sectors.
    pub const FRICTION_LOW: f64 = 0.97265625;

    /// Momentum below this is zeroed when there is no movement intent.
    pub const WALKSTOP_THRESHOLD: f64 = 0.062484741210937;
    /// Player walk animation stops below this speed.
    pub const STANDSPEED: f64 = 0.5;
    /// Corpses keep sliding off ledges above this momentum.
    pub const DROPOFFMOMENTUM_THRESHOLD: f64 = 0.25;

    /// World gravity, map units per tick squared.
    pub const GRAVITY: f64 = 1.0;
}

/// Content store constants.
pub mod wad {
    /// Lump indices at or above this refer to the auxiliary directory.
    pub const AUX_BASE: usize = 100_000_000;

    /// Bytes in a WAD header.
    pub const HEADER_SIZE: usize = 12;
    /// Bytes in one directory entry.
    pub const DIRENT_SIZE: usize = 16;
}

/// Light bias engine constants.
pub mod bias {
    /// Hard cap on simultaneous bias sources.
    pub const MAX_BIAS_LIGHTS: usize = 256;
    /// Cached affecting sources per surface.
    pub const MAX_BIAS_AFFECTED: usize = 6;
    /// Tracker capacity in bits; must cover MAX_BIAS_LIGHTS.
    pub const MAX_BIAS_TRACKED: usize = 256;
    /// Default illumination interpolation time in ticks.
    pub const DEFAULT_LIGHT_SPEED: u32 = 130;
}

/// ACS virtual machine limits.
pub mod acs {
    pub const STACK_DEPTH: usize = 32;
    pub const MAX_SCRIPT_ARGS: usize = 10;
    pub const MAX_MAP_VARS: usize = 32;
    pub const MAX_WORLD_VARS: usize = 64;
    /// First 4 entry arguments settable by a start request.
    pub const MAX_START_ARGS: usize = 4;
}

/// Network session constants.
pub mod net {
    /// Player slots, including the server's own console 0.
    pub const MAX_PLAYERS: usize = 16;

    /// Coordinate discrepancy (map units) that forces a position fix.
    pub const WARP_LIMIT: f64 = 300.0;

    /// Server protocol version byte sent in the handshake.
    pub const SV_VERSION: u8 = 24;

    /// Capacity of the packet ingest queue.
    pub const INGEST_QUEUE_DEPTH: usize = 512;
}

/// Input binding constants.
pub mod input {
    /// Number of binding classes, in priority order.
    pub const NUM_BIND_CLASSES: usize = 7;
}

/// Save format constants.
pub mod save {
    /// Current savegame format version.
    pub const FORMAT_VERSION: u8 = 4;
    /// Oldest format version the reader still accepts.
    pub const OLDEST_READABLE_VERSION: u8 = 2;
    /// Legacy (v9 era) format recognized by the translation reader.
    pub const LEGACY_VERSION: u8 = 9;
    /// Byte that terminates map state data.
    pub const CONSISTENCY_MARKER: u8 = 0x1d;
    /// Thinker record terminator class byte.
    pub const TC_END: u8 = 0;
}
