//! The thinker arena and per-tick scheduler.
//!
//! Thinkers are stored in a generation-tagged slot arena so that stale
//! ids (a removed target, a saved back-reference) resolve to nothing
//! instead of to whoever reused the slot. Removal is deferred: `think`
//! passes mark, the post-pass sweep unlinks, and freed slots only become
//! reusable at the start of the next tick.

use crate::acs::AcsThinker;
use crate::particles::Generator;
use crate::world::lights::{FlashLight, GlowLight, StrobeLight};
use crate::world::mobj::Mobj;
use crate::world::movers::{CeilingMover, DoorMover, FloorMover, PlatMover};

/// Generation-tagged handle to a thinker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThinkerId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// What a thinker is, with its per-variant payload.
pub enum ThinkerKind {
    Mobj(Mobj),
    Generator(Generator),
    Ceiling(CeilingMover),
    Door(DoorMover),
    Floor(FloorMover),
    Plat(PlatMover),
    Flash(FlashLight),
    Strobe(StrobeLight),
    Glow(GlowLight),
    Acs(AcsThinker),
}

impl ThinkerKind {
    /// Stable class id used by the save format; independent of enum
    /// declaration order.
    pub fn class_id(&self) -> u8 {
        match self {
            ThinkerKind::Mobj(_) => 1,
            ThinkerKind::Ceiling(_) => 2,
            ThinkerKind::Door(_) => 3,
            ThinkerKind::Floor(_) => 4,
            ThinkerKind::Plat(_) => 5,
            ThinkerKind::Flash(_) => 6,
            ThinkerKind::Strobe(_) => 7,
            ThinkerKind::Glow(_) => 8,
            ThinkerKind::Acs(_) => 9,
            ThinkerKind::Generator(_) => 10,
        }
    }
}

/// What `think` wants done with the thinker afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkOutcome {
    Keep,
    Remove,
}

pub struct Thinker {
    pub kind: ThinkerKind,
    /// Skipped by the scheduler but retained.
    pub in_stasis: bool,
    /// Monotonic id used by the save format.
    pub serial: u32,
}

pub struct Thinkers {
    slots: Vec<Option<Thinker>>,
    generations: Vec<u32>,
    free: Vec<u32>,
    /// Slots swept this tick; recycled at the start of the next one so
    /// cross-references stay resolvable for the rest of the tick.
    pending_free: Vec<u32>,
    marked: Vec<ThinkerId>,
    next_serial: u32,
    tick: u64,
}

impl Thinkers {
    pub fn new() -> Thinkers {
        Thinkers {
            slots: Vec::new(),
            generations: Vec::new(),
            free: Vec::new(),
            pending_free: Vec::new(),
            marked: Vec::new(),
            next_serial: 1,
            tick: 0,
        }
    }

    /// Current tick counter.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// All whole ticks are sharp in this scheduler; fractional update
    /// steps never enter the simulation core.
    pub fn is_sharp_tick(&self) -> bool {
        true
    }

    /// Make swept slots reusable and bump the tick counter.
    pub fn begin_tick(&mut self) {
        self.free.append(&mut self.pending_free);
        self.tick += 1;
    }

    pub fn add(&mut self, kind: ThinkerKind) -> ThinkerId {
        let thinker = Thinker {
            kind,
            in_stasis: false,
            serial: self.next_serial,
        };
        self.next_serial += 1;

        match self.free.pop() {
            Some(index) => {
                let slot = index as usize;
                self.generations[slot] = self.generations[slot].wrapping_add(1);
                self.slots[slot] = Some(thinker);
                ThinkerId {
                    index,
                    generation: self.generations[slot],
                }
            }
            None => {
                self.slots.push(Some(thinker));
                self.generations.push(0);
                ThinkerId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        }
    }

    fn is_current(&self, id: ThinkerId) -> bool {
        (id.index as usize) < self.slots.len()
            && self.generations[id.index as usize] == id.generation
    }

    pub fn is_live(&self, id: ThinkerId) -> bool {
        self.is_current(id) && self.slots[id.index as usize].is_some()
    }

    pub fn get(&self, id: ThinkerId) -> Option<&Thinker> {
        if self.is_current(id) {
            self.slots[id.index as usize].as_ref()
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, id: ThinkerId) -> Option<&mut Thinker> {
        if self.is_current(id) {
            self.slots[id.index as usize].as_mut()
        } else {
            None
        }
    }

    /// Temporarily remove a thinker from its slot so it can be advanced
    /// with full `&mut` access to the rest of the world.
    pub fn take(&mut self, id: ThinkerId) -> Option<Thinker> {
        if self.is_current(id) {
            self.slots[id.index as usize].take()
        } else {
            None
        }
    }

    /// Restore a thinker taken with `take`.
    pub fn put_back(&mut self, id: ThinkerId, thinker: Thinker) {
        debug_assert!(self.is_current(id));
        self.slots[id.index as usize] = Some(thinker);
    }

    /// Snapshot of live ids at iteration start. New thinkers added
    /// during the pass run on the next tick.
    pub fn live_ids(&self) -> Vec<ThinkerId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| ThinkerId {
                index: i as u32,
                generation: self.generations[i],
            })
            .collect()
    }

    pub fn iter_live(&self) -> impl Iterator<Item = (ThinkerId, &Thinker)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.as_ref().map(|t| {
                (
                    ThinkerId {
                        index: i as u32,
                        generation: self.generations[i],
                    },
                    t,
                )
            })
        })
    }

    pub fn iter_live_mut(&mut self) -> impl Iterator<Item = (ThinkerId, &mut Thinker)> {
        let generations = &self.generations;
        self.slots.iter_mut().enumerate().filter_map(move |(i, s)| {
            s.as_mut().map(|t| {
                (
                    ThinkerId {
                        index: i as u32,
                        generation: generations[i],
                    },
                    t,
                )
            })
        })
    }

    /// Queue a thinker for removal at the end of the current pass.
    pub fn mark_for_removal(&mut self, id: ThinkerId) {
        if self.is_current(id) && !self.marked.contains(&id) {
            self.marked.push(id);
        }
    }

    pub fn set_stasis(&mut self, id: ThinkerId, in_stasis: bool) {
        if let Some(th) = self.get_mut(id) {
            th.in_stasis = in_stasis;
        }
    }

    /// Unlink everything marked this pass. Returns the removed ids so
    /// the caller can clear dangling cross-references.
    pub fn sweep(&mut self) -> Vec<ThinkerId> {
        let marked = std::mem::take(&mut self.marked);
        let mut removed = Vec::with_capacity(marked.len());
        for id in marked {
            if self.is_live(id) {
                self.slots[id.index as usize] = None;
                self.generations[id.index as usize] =
                    self.generations[id.index as usize].wrapping_add(1);
                self.pending_free.push(id.index);
                removed.push(id);
            }
        }
        removed
    }

    /// Look up a live thinker id by its save serial.
    pub fn find_by_serial(&self, serial: u32) -> Option<ThinkerId> {
        self.iter_live()
            .find(|(_, t)| t.serial == serial)
            .map(|(id, _)| id)
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

impl Default for Thinkers {
    fn default() -> Self {
        Thinkers::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::mobj::Mobj;

    fn dummy_mobj() -> ThinkerKind {
        ThinkerKind::Mobj(Mobj {
            pos: Default::default(),
            mom: Default::default(),
            angle: 0,
            last_angle: 0,
            type_id: 0,
            state: Default::default(),
            tics: -1,
            health: 100,
            flags: Default::default(),
            radius: Default::default(),
            height: Default::default(),
            hard_radius: Default::default(),
            bounce: Default::default(),
            mass: 100,
            floor_z: Default::default(),
            ceiling_z: Default::default(),
            player: None,
            target: None,
            tracer: None,
            on_mobj: None,
            subspace: None,
            contact_line: None,
        })
    }

    #[test]
    fn test_stale_id_resolves_to_none() {
        let mut thinkers = Thinkers::new();
        let id = thinkers.add(dummy_mobj());
        thinkers.mark_for_removal(id);
        thinkers.sweep();
        assert!(thinkers.get(id).is_none());

        thinkers.begin_tick();
        let recycled = thinkers.add(dummy_mobj());
        assert_eq!(id.index, recycled.index);
        assert!(thinkers.get(id).is_none());
        assert!(thinkers.get(recycled).is_some());
    }

    #[test]
    fn test_slot_reuse_waits_one_tick() {
        let mut thinkers = Thinkers::new();
        let id = thinkers.add(dummy_mobj());
        thinkers.mark_for_removal(id);
        thinkers.sweep();

        // Same tick: the slot is not yet reusable.
        let other = thinkers.add(dummy_mobj());
        assert_ne!(other.index, id.index);

        thinkers.begin_tick();
        let reused = thinkers.add(dummy_mobj());
        assert_eq!(reused.index, id.index);
    }

    #[test]
    fn test_serial_lookup() {
        let mut thinkers = Thinkers::new();
        let a = thinkers.add(dummy_mobj());
        let b = thinkers.add(dummy_mobj());
        let serial_b = thinkers.get(b).unwrap().serial;
        assert_eq!(thinkers.find_by_serial(serial_b), Some(b));
        assert_ne!(thinkers.get(a).unwrap().serial, serial_b);
    }

    #[test]
    fn test_take_put_back_round_trip() {
        let mut thinkers = Thinkers::new();
        let id = thinkers.add(dummy_mobj());
        let th = thinkers.take(id).unwrap();
        assert!(thinkers.get(id).is_none());
        thinkers.put_back(id, th);
        assert!(thinkers.get(id).is_some());
    }
}
