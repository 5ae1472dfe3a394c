//! The map runtime: static geometry, map objects, the thinker scheduler,
//! plane movers and sector light effects.

pub mod lights;
pub mod map;
pub mod mobj;
pub mod movers;
pub mod physics;
pub mod player;
pub mod thinker;

pub use map::{Map, MaterialDict, MaterialId, Sector, SectorId, Side, Line, LineId, Subspace, SubspaceId};
pub use mobj::{Mobj, MobjFlags, MobjInfo, State, StateId};
pub use movers::{CeilingMover, DoorMover, FloorMover, PlatMover};
pub use player::{Player, WeaponType};
pub use thinker::{ThinkOutcome, Thinker, ThinkerId, ThinkerKind, Thinkers};

use crate::error::{CoreError, CoreResult};
use crate::fixed::{Angle, Fixed};
use crate::rng::GameRng;

/// Everything the simulation owns about the current map: geometry plus
/// the active thinker population and the immutable type tables.
pub struct World {
    pub map: Map,
    pub thinkers: Thinkers,
    pub mobj_info: Vec<MobjInfo>,
    pub states: Vec<State>,
    /// Ticks the current map has been running.
    pub map_time: u32,
}

impl World {
    pub fn new(map: Map) -> World {
        World {
            map,
            thinkers: Thinkers::new(),
            mobj_info: Vec::new(),
            states: Vec::new(),
            map_time: 0,
        }
    }

    /// Spawn a mobj of a preloaded type at the given position.
    pub fn spawn_mobj(
        &mut self,
        type_id: u16,
        x: Fixed,
        y: Fixed,
        z: Fixed,
        angle: Angle,
    ) -> CoreResult<ThinkerId> {
        let info = self
            .mobj_info
            .get(type_id as usize)
            .ok_or(CoreError::UnknownMobjType {
                type_id: type_id as i32,
            })?
            .clone();

        let subspace = self.map.subspace_at(x, y);
        let (floor_z, ceiling_z) = match subspace.and_then(|s| self.map.subspaces.get(s.0 as usize))
        {
            Some(sub) => {
                let sector = &self.map.sectors[sub.sector.0 as usize];
                (sector.floor_height, sector.ceiling_height)
            }
            None => (Fixed::ZERO, Fixed::from_int(128)),
        };

        let mobj = Mobj {
            pos: [x, y, z],
            mom: [Fixed::ZERO; 3],
            angle,
            last_angle: angle,
            type_id,
            state: info.spawn_state,
            tics: self
                .states
                .get(info.spawn_state.0 as usize)
                .map(|s| s.tics)
                .unwrap_or(-1),
            health: info.spawn_health,
            flags: info.flags,
            radius: info.radius,
            height: info.height,
            hard_radius: Fixed::ZERO,
            bounce: info.bounce,
            mass: info.mass,
            floor_z,
            ceiling_z,
            player: None,
            target: None,
            tracer: None,
            on_mobj: None,
            subspace,
            contact_line: None,
        };

        Ok(self.thinkers.add(ThinkerKind::Mobj(mobj)))
    }

    /// Count live mobjs matching a type (0 matches any).
    pub fn mobj_count(&self, type_id: i32) -> i32 {
        self.thinkers
            .iter_live()
            .filter(|(_, th)| match &th.kind {
                ThinkerKind::Mobj(m) => type_id == 0 || m.type_id as i32 == type_id,
                _ => false,
            })
            .count() as i32
    }

    /// Advance every non-stasis thinker one tick, then sweep removals.
    /// Returns the sector tags whose plane movers finished this tick,
    /// for waking tag-waiting scripts.
    pub fn run_thinkers(&mut self, rng: &mut GameRng, intents: &dyn Fn(u8) -> bool) -> Vec<i16> {
        self.thinkers.begin_tick();
        let mut finished_tags = Vec::new();

        for id in self.thinkers.live_ids() {
            let Some(mut th) = self.thinkers.take(id) else {
                continue;
            };
            if th.in_stasis {
                self.thinkers.put_back(id, th);
                continue;
            }

            let outcome = match &mut th.kind {
                ThinkerKind::Mobj(mobj) => {
                    let intent = mobj.player.map(intents).unwrap_or(false);
                    physics::mobj_think(mobj, &mut self.map, &self.states, rng, intent)
                }
                ThinkerKind::Ceiling(c) => movers::ceiling_think(c, &mut self.map),
                ThinkerKind::Door(d) => movers::door_think(d, &mut self.map),
                ThinkerKind::Floor(f) => movers::floor_think(f, &mut self.map),
                ThinkerKind::Plat(p) => movers::plat_think(p, &mut self.map),
                ThinkerKind::Flash(f) => lights::flash_think(f, &mut self.map, rng),
                ThinkerKind::Strobe(s) => lights::strobe_think(s, &mut self.map),
                ThinkerKind::Glow(g) => lights::glow_think(g, &mut self.map),
                // Generators and script interpreters are advanced by their
                // own subsystems after the world pass.
                ThinkerKind::Generator(_) | ThinkerKind::Acs(_) => ThinkOutcome::Keep,
            };

            match outcome {
                ThinkOutcome::Keep => self.thinkers.put_back(id, th),
                ThinkOutcome::Remove => {
                    match &th.kind {
                        ThinkerKind::Ceiling(c) => finished_tags.push(c.tag),
                        ThinkerKind::Door(d) => finished_tags.push(d.tag),
                        ThinkerKind::Floor(f) => finished_tags.push(f.tag),
                        ThinkerKind::Plat(p) => finished_tags.push(p.tag),
                        _ => {}
                    }
                    self.thinkers.put_back(id, th);
                    self.thinkers.mark_for_removal(id);
                }
            }
        }

        let removed = self.thinkers.sweep();
        self.clear_dead_references(&removed);
        self.map_time += 1;
        finished_tags
    }

    /// Null out mobj back-references and sector mover slots that point at
    /// thinkers removed this tick.
    fn clear_dead_references(&mut self, removed: &[ThinkerId]) {
        if removed.is_empty() {
            return;
        }
        for sector in &mut self.map.sectors {
            if let Some(id) = sector.special_data {
                if removed.contains(&id) {
                    sector.special_data = None;
                }
            }
        }
        for (_, th) in self.thinkers.iter_live_mut() {
            if let ThinkerKind::Mobj(mobj) = &mut th.kind {
                for slot in [&mut mobj.target, &mut mobj.tracer, &mut mobj.on_mobj] {
                    if slot.is_some_and(|id| removed.contains(&id)) {
                        *slot = None;
                    }
                }
            }
        }
    }
}
