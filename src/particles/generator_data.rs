//! Generator and particle data. Transformations live in
//! generator_operations.rs.

use std::sync::Arc;

use crate::fixed::Fixed;
use crate::world::map::{LineId, SectorId, SubspaceId};
use crate::world::thinker::ThinkerId;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StageFlags: u32 {
        /// Particle dies on any solid touch.
        const DIE_TOUCH        = 0x0001;
        /// Any touch forces a stage advance.
        const STAGE_TOUCH      = 0x0002;
        /// Wall touches force a stage advance.
        const STAGE_WALL_TOUCH = 0x0004;
        /// Floor/ceiling touches force a stage advance.
        const STAGE_FLAT_TOUCH = 0x0008;
        const SPHERE_FORCE     = 0x0010;
        /// Rendered flat against planes; sticks when z-motion stops.
        const PLANE_FLAT       = 0x0020;
        const ZERO_YAW         = 0x0040;
        const ZERO_PITCH       = 0x0080;
        const RANDOM_YAW       = 0x0100;
        const RANDOM_PITCH     = 0x0200;
    }
}

/// One stage of a particle's life, from the immutable definition.
#[derive(Debug, Clone)]
pub struct StageDef {
    /// Ticks in this stage; the end of the last live stage kills.
    pub tics: i32,
    pub tics_variance: f32,
    pub radius: Fixed,
    pub gravity: Fixed,
    /// Per-tick momentum multiplier; one means no drag.
    pub resistance: Fixed,
    pub bounce: Fixed,
    /// Degrees per second of yaw/pitch spin.
    pub spin: [f32; 2],
    pub spin_resistance: [f32; 2],
    pub vector_force: [f32; 3],
    pub flags: StageFlags,
    /// A terminal stage ends the particle when entered.
    pub terminal: bool,
}

impl Default for StageDef {
    fn default() -> Self {
        StageDef {
            tics: 35,
            tics_variance: 0.0,
            radius: Fixed::ONE,
            gravity: Fixed::ZERO,
            resistance: Fixed::ONE,
            bounce: Fixed::ZERO,
            spin: [0.0; 2],
            spin_resistance: [0.0; 2],
            vector_force: [0.0; 3],
            flags: StageFlags::empty(),
            terminal: false,
        }
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GeneratorFlags: u32 {
        /// Launch vector is relative to the source mobj angle.
        const RELATIVE_VECTOR   = 0x0001;
        /// Source momentum is added to the launch vector.
        const RELATIVE_VELOCITY = 0x0002;
        /// Plane generators fill the whole sector volume.
        const SPAWN_SPACE       = 0x0004;
        const SPAWN_FLOOR       = 0x0008;
        const SPAWN_CEILING     = 0x0010;
        /// No trigger; spawns from its own center.
        const UNTRIGGERED       = 0x0020;
        /// Static decoration generator, spawned with the map.
        const STATIC            = 0x0040;
    }
}

/// Which mobjs trigger a type-triggered generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFilter {
    /// Not type-triggered.
    None,
    /// Any mobj type.
    Any,
    One(u16),
    Either(u16, u16),
}

/// Immutable generator definition (from the definition database).
#[derive(Debug, Clone)]
pub struct GeneratorDef {
    pub spawn_rate: f32,
    pub spawn_rate_variance: f32,
    /// Generator lifetime in ticks; negative means unbounded.
    pub max_age: i32,
    /// Spawning stops past this age; negative means never.
    pub spawn_age: i32,
    /// Size of the particle buffer.
    pub particles: usize,
    pub speed: f32,
    pub speed_variance: f32,
    pub vector: [f32; 3],
    pub vector_variance: f32,
    pub spawn_radius: f32,
    pub spawn_radius_min: f32,
    pub alt_start: usize,
    pub alt_start_variance: f32,
    /// Radial sphere-force strength.
    pub force: f32,
    pub force_radius: f32,
    pub force_axis: [f32; 3],
    pub force_origin: [f32; 3],
    /// Ticks simulated silently when the generator spawns.
    pub presim: i32,
    pub stages: Vec<StageDef>,
}

impl Default for GeneratorDef {
    fn default() -> Self {
        GeneratorDef {
            spawn_rate: 1.0,
            spawn_rate_variance: 0.0,
            max_age: -1,
            spawn_age: -1,
            particles: 64,
            speed: 4.0,
            speed_variance: 0.0,
            vector: [0.0, 0.0, 1.0],
            vector_variance: 0.0,
            spawn_radius: 0.0,
            spawn_radius_min: 0.0,
            alt_start: 0,
            alt_start_variance: 0.0,
            force: 0.0,
            force_radius: 0.0,
            force_axis: [0.0; 3],
            force_origin: [0.0; 3],
            presim: 0,
            stages: vec![StageDef::default()],
        }
    }
}

/// One particle. A negative stage marks the slot unused.
#[derive(Debug, Clone)]
pub struct Particle {
    pub stage: i32,
    pub tics: i32,
    pub origin: [Fixed; 3],
    pub mom: [Fixed; 3],
    pub yaw: f32,
    pub pitch: f32,
    pub contact: Option<LineId>,
    pub subspace: Option<SubspaceId>,
}

impl Particle {
    pub fn unused() -> Particle {
        Particle {
            stage: -1,
            tics: 0,
            origin: [Fixed::ZERO; 3],
            mom: [Fixed::ZERO; 3],
            yaw: 0.0,
            pitch: 0.0,
            contact: None,
            subspace: None,
        }
    }

    pub fn in_use(&self) -> bool {
        self.stage >= 0
    }
}

/// A live particle generator.
pub struct Generator {
    pub def: Arc<GeneratorDef>,
    /// Source mobj; cleared (spawning stops) when it dies.
    pub source: Option<ThinkerId>,
    /// Plane generators spawn across a whole sector plane.
    pub plane: Option<(SectorId, bool)>,
    pub type_filter: TypeFilter,
    pub flags: GeneratorFlags,
    pub origin_at_spawn: [Fixed; 3],
    pub spawn_cursor: usize,
    /// Fractional spawn accumulator.
    pub spawn_count: f32,
    pub age: i32,
    pub spawn_rate_multiplier: f32,
    pub particles: Vec<Particle>,
}

impl Generator {
    pub fn new(def: Arc<GeneratorDef>) -> Generator {
        let count = def.particles;
        Generator {
            def,
            source: None,
            plane: None,
            type_filter: TypeFilter::None,
            flags: GeneratorFlags::empty(),
            origin_at_spawn: [Fixed::ZERO; 3],
            spawn_cursor: 0,
            spawn_count: 0.0,
            age: 0,
            spawn_rate_multiplier: 1.0,
            particles: vec![Particle::unused(); count],
        }
    }

    pub fn is_untriggered(&self) -> bool {
        self.flags.contains(GeneratorFlags::UNTRIGGERED)
    }

    pub fn active_particle_count(&self) -> usize {
        self.particles.iter().filter(|p| p.in_use()).count()
    }
}
