//! Map objects: the moving, interactable entities of the world.

use crate::fixed::{Angle, Fixed};
use crate::world::map::{LineId, SubspaceId};
use crate::world::thinker::ThinkerId;

bitflags::bitflags! {
    /// Behavioral flag bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MobjFlags: u32 {
        const SOLID        = 0x0000_0001;
        const SHOOTABLE    = 0x0000_0002;
        const SHADOW       = 0x0000_0004;
        const NO_CLIP      = 0x0000_0008;
        const COUNT_KILL   = 0x0000_0010;
        const NO_GRAVITY   = 0x0000_0020;
        const MISSILE      = 0x0000_0040;
        const SKULLFLY     = 0x0000_0080;
        const CORPSE       = 0x0000_0100;
        const FALLING      = 0x0000_0200;
        const FLY          = 0x0000_0400;
        /// Close-combat inflictors that must not push the victim away.
        const NO_DMG_THRUST = 0x0000_0800;
        /// Rendered flat against planes; sticks to them when z-motion
        /// stops on a bounce.
        const PLANE_FLAT   = 0x0000_1000;
    }
}

/// Animation state index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateId(pub u16);

impl StateId {
    pub const NONE: StateId = StateId(u16::MAX);
}

/// One frame of a state table assumed preloaded by the host.
#[derive(Debug, Clone)]
pub struct State {
    pub tics: i32,
    pub next: StateId,
    /// Per-state gravity scale applied during the z step.
    pub gravity: Fixed,
}

impl Default for State {
    fn default() -> Self {
        State {
            tics: -1,
            next: StateId::NONE,
            gravity: Fixed::ONE,
        }
    }
}

/// Immutable per-type description.
#[derive(Debug, Clone)]
pub struct MobjInfo {
    pub name: String,
    pub radius: Fixed,
    pub height: Fixed,
    pub mass: i32,
    pub bounce: Fixed,
    pub spawn_health: i32,
    pub spawn_state: StateId,
    pub death_state: StateId,
    pub flags: MobjFlags,
}

impl Default for MobjInfo {
    fn default() -> Self {
        MobjInfo {
            name: String::new(),
            radius: Fixed::from_int(16),
            height: Fixed::from_int(56),
            mass: 100,
            bounce: Fixed::ZERO,
            spawn_health: 1000,
            spawn_state: StateId(0),
            death_state: StateId::NONE,
            flags: MobjFlags::SOLID,
        }
    }
}

/// A live map object. Position and momentum are fixed-point map units.
#[derive(Debug, Clone)]
pub struct Mobj {
    pub pos: [Fixed; 3],
    pub mom: [Fixed; 3],
    pub angle: Angle,
    /// Angle at the last sharp tick, for interpolation.
    pub last_angle: Angle,
    pub type_id: u16,
    pub state: StateId,
    pub tics: i32,
    pub health: i32,
    pub flags: MobjFlags,
    pub radius: Fixed,
    pub height: Fixed,
    /// Plane-collision radius. Zero for walkers; soft objects use half
    /// their radius.
    pub hard_radius: Fixed,
    pub bounce: Fixed,
    pub mass: i32,
    pub floor_z: Fixed,
    pub ceiling_z: Fixed,
    /// Owning player console, if any.
    pub player: Option<u8>,
    pub target: Option<ThinkerId>,
    pub tracer: Option<ThinkerId>,
    pub on_mobj: Option<ThinkerId>,
    pub subspace: Option<SubspaceId>,
    pub contact_line: Option<LineId>,
}

impl Mobj {
    pub fn is_missile(&self) -> bool {
        self.flags
            .intersects(MobjFlags::MISSILE | MobjFlags::SKULLFLY)
    }

    pub fn is_airborne(&self) -> bool {
        self.flags.contains(MobjFlags::FLY)
            && self.pos[2] > self.floor_z
            && self.on_mobj.is_none()
    }

    /// Whether z is pinned to a plane by the flat-stick sentinels.
    pub fn plane_pinned(&self) -> bool {
        self.pos[2].0 == crate::constants::sentinel::MIN_Z
            || self.pos[2].0 == crate::constants::sentinel::MAX_Z
    }
}
