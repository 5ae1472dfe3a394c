//! Plane movers: the ceiling, door, floor and platform state machines.
//!
//! Each machine is keyed to one sector, advances its plane one speed
//! step per tick, clamps at the target, and removes itself when done.
//! A sector holds at most one active mover via `special_data`.

use crate::fixed::Fixed;
use crate::world::map::{Map, MaterialId, SectorId};
use crate::world::thinker::{ThinkOutcome, ThinkerId, ThinkerKind, Thinkers};

/// Result of moving a plane one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaneMove {
    Ok,
    ReachedTarget,
}

/// Move a sector plane toward a destination, clamping at it.
fn move_plane(current: &mut Fixed, dest: Fixed, speed: Fixed) -> PlaneMove {
    if *current < dest {
        *current += speed;
        if *current >= dest {
            *current = dest;
            return PlaneMove::ReachedTarget;
        }
    } else if *current > dest {
        *current -= speed;
        if *current <= dest {
            *current = dest;
            return PlaneMove::ReachedTarget;
        }
    } else {
        return PlaneMove::ReachedTarget;
    }
    PlaneMove::Ok
}

// --- Ceiling ---------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeilingKind {
    Lower,
    Raise,
    Crush,
}

#[derive(Debug, Clone)]
pub struct CeilingMover {
    pub sector: SectorId,
    pub kind: CeilingKind,
    pub top_height: Fixed,
    pub bottom_height: Fixed,
    pub speed: Fixed,
    /// 1 up, -1 down.
    pub direction: i32,
    pub crush: bool,
    pub tag: i16,
}

pub fn ceiling_think(ceiling: &mut CeilingMover, map: &mut Map) -> ThinkOutcome {
    let sector = map.sector_mut(ceiling.sector);
    let dest = if ceiling.direction > 0 {
        ceiling.top_height
    } else {
        ceiling.bottom_height
    };

    match move_plane(&mut sector.ceiling_height, dest, ceiling.speed) {
        PlaneMove::Ok => ThinkOutcome::Keep,
        PlaneMove::ReachedTarget => match ceiling.kind {
            CeilingKind::Lower | CeilingKind::Raise => ThinkOutcome::Remove,
            CeilingKind::Crush => {
                // Crushers ping-pong until stopped externally.
                ceiling.direction = -ceiling.direction;
                ThinkOutcome::Keep
            }
        },
    }
}

// --- Door ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorState {
    Opening,
    Waiting,
    Closing,
}

#[derive(Debug, Clone)]
pub struct DoorMover {
    pub sector: SectorId,
    pub top_height: Fixed,
    pub speed: Fixed,
    pub state: DoorState,
    /// Ticks to hold open.
    pub top_wait: i32,
    pub top_countdown: i32,
    pub tag: i16,
}

pub fn door_think(door: &mut DoorMover, map: &mut Map) -> ThinkOutcome {
    let floor = map.sector(door.sector).floor_height;
    let sector = map.sector_mut(door.sector);

    match door.state {
        DoorState::Opening => {
            if move_plane(&mut sector.ceiling_height, door.top_height, door.speed)
                == PlaneMove::ReachedTarget
            {
                door.state = DoorState::Waiting;
                door.top_countdown = door.top_wait;
            }
            ThinkOutcome::Keep
        }
        DoorState::Waiting => {
            door.top_countdown -= 1;
            if door.top_countdown <= 0 {
                door.state = DoorState::Closing;
            }
            ThinkOutcome::Keep
        }
        DoorState::Closing => {
            if move_plane(&mut sector.ceiling_height, floor, door.speed)
                == PlaneMove::ReachedTarget
            {
                ThinkOutcome::Remove
            } else {
                ThinkOutcome::Keep
            }
        }
    }
}

// --- Floor -----------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FloorMover {
    pub sector: SectorId,
    pub dest_height: Fixed,
    pub speed: Fixed,
    pub crush: bool,
    /// Applied to the sector on arrival, for change-type floors.
    pub new_special: Option<i16>,
    pub new_material: Option<MaterialId>,
    pub tag: i16,
}

pub fn floor_think(floor: &mut FloorMover, map: &mut Map) -> ThinkOutcome {
    let sector = map.sector_mut(floor.sector);
    match move_plane(&mut sector.floor_height, floor.dest_height, floor.speed) {
        PlaneMove::Ok => ThinkOutcome::Keep,
        PlaneMove::ReachedTarget => {
            if let Some(special) = floor.new_special {
                sector.special = special;
            }
            if let Some(material) = floor.new_material {
                sector.floor_material = material;
            }
            ThinkOutcome::Remove
        }
    }
}

// --- Plat ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatState {
    Up,
    Down,
    Waiting,
}

#[derive(Debug, Clone)]
pub struct PlatMover {
    pub sector: SectorId,
    pub speed: Fixed,
    pub low: Fixed,
    pub high: Fixed,
    pub wait: i32,
    pub count: i32,
    pub state: PlatState,
    pub old_state: PlatState,
    pub tag: i16,
    /// One-shot plats remove themselves after a full cycle.
    pub one_shot: bool,
}

pub fn plat_think(plat: &mut PlatMover, map: &mut Map) -> ThinkOutcome {
    let sector = map.sector_mut(plat.sector);
    match plat.state {
        PlatState::Down => {
            if move_plane(&mut sector.floor_height, plat.low, plat.speed)
                == PlaneMove::ReachedTarget
            {
                plat.old_state = plat.state;
                plat.state = PlatState::Waiting;
                plat.count = plat.wait;
            }
            ThinkOutcome::Keep
        }
        PlatState::Up => {
            if move_plane(&mut sector.floor_height, plat.high, plat.speed)
                == PlaneMove::ReachedTarget
            {
                if plat.one_shot {
                    return ThinkOutcome::Remove;
                }
                plat.old_state = plat.state;
                plat.state = PlatState::Waiting;
                plat.count = plat.wait;
            }
            ThinkOutcome::Keep
        }
        PlatState::Waiting => {
            plat.count -= 1;
            if plat.count <= 0 {
                plat.state = match plat.old_state {
                    PlatState::Down => PlatState::Up,
                    _ => PlatState::Down,
                };
            }
            ThinkOutcome::Keep
        }
    }
}

// --- Spawning --------------------------------------------------------------

/// Attach a mover to every tagged sector that does not already have one.
/// Returns the ids of the movers actually created.
fn spawn_for_tag<F>(
    map: &mut Map,
    thinkers: &mut Thinkers,
    tag: i16,
    mut build: F,
) -> Vec<ThinkerId>
where
    F: FnMut(&Map, SectorId) -> ThinkerKind,
{
    let mut spawned = Vec::new();
    for sector_id in map.sectors_with_tag(tag) {
        if map.sector(sector_id).special_data.is_some() {
            continue; // One mover per sector.
        }
        let kind = build(map, sector_id);
        let id = thinkers.add(kind);
        map.sector_mut(sector_id).special_data = Some(id);
        spawned.push(id);
    }
    spawned
}

pub fn spawn_door(
    map: &mut Map,
    thinkers: &mut Thinkers,
    tag: i16,
    speed: Fixed,
    top_wait: i32,
) -> Vec<ThinkerId> {
    spawn_for_tag(map, thinkers, tag, |map, sector| {
        let s = map.sector(sector);
        ThinkerKind::Door(DoorMover {
            sector,
            // Doors open to four units below the classic neighbor
            // ceiling; with single-sector activation the sector's own
            // ceiling target works the same way.
            top_height: s.ceiling_height + Fixed::from_int(4),
            speed,
            state: DoorState::Opening,
            top_wait,
            top_countdown: 0,
            tag,
        })
    })
}

/// How a floor mover's destination is derived per sector.
#[derive(Debug, Clone, Copy)]
pub enum FloorDest {
    Absolute(Fixed),
    /// Offset from the sector's current floor height.
    Relative(Fixed),
}

pub fn spawn_floor(
    map: &mut Map,
    thinkers: &mut Thinkers,
    tag: i16,
    dest: FloorDest,
    speed: Fixed,
) -> Vec<ThinkerId> {
    spawn_for_tag(map, thinkers, tag, |map, sector| {
        let dest_height = match dest {
            FloorDest::Absolute(h) => h,
            FloorDest::Relative(delta) => map.sector(sector).floor_height + delta,
        };
        ThinkerKind::Floor(FloorMover {
            sector,
            dest_height,
            speed,
            crush: false,
            new_special: None,
            new_material: None,
            tag,
        })
    })
}

pub fn spawn_ceiling(
    map: &mut Map,
    thinkers: &mut Thinkers,
    tag: i16,
    kind: CeilingKind,
    speed: Fixed,
) -> Vec<ThinkerId> {
    spawn_for_tag(map, thinkers, tag, |map, sector| {
        let s = map.sector(sector);
        let (top, bottom, direction) = match kind {
            CeilingKind::Raise => (s.ceiling_height + Fixed::from_int(32), s.floor_height, 1),
            CeilingKind::Lower | CeilingKind::Crush => (
                s.ceiling_height,
                s.floor_height + Fixed::from_int(8),
                -1,
            ),
        };
        ThinkerKind::Ceiling(CeilingMover {
            sector,
            kind,
            top_height: top,
            bottom_height: bottom,
            speed,
            direction,
            crush: kind == CeilingKind::Crush,
            tag,
        })
    })
}

pub fn spawn_plat(
    map: &mut Map,
    thinkers: &mut Thinkers,
    tag: i16,
    speed: Fixed,
    wait: i32,
) -> Vec<ThinkerId> {
    // A plat in stasis on this tag is re-activated instead of doubled.
    let mut reactivated = false;
    for (id, th) in thinkers.iter_live_mut() {
        if let ThinkerKind::Plat(plat) = &mut th.kind {
            if plat.tag == tag && th.in_stasis {
                th.in_stasis = false;
                reactivated = true;
                log::debug!("[movers::spawn_plat] Reactivated plat {:?}", id);
            }
        }
    }
    if reactivated {
        return Vec::new();
    }

    spawn_for_tag(map, thinkers, tag, |map, sector| {
        let s = map.sector(sector);
        ThinkerKind::Plat(PlatMover {
            sector,
            speed,
            low: s.floor_height - Fixed::from_int(8),
            high: s.floor_height,
            wait,
            count: 0,
            state: PlatState::Down,
            old_state: PlatState::Waiting,
            tag,
            one_shot: false,
        })
    })
}

/// Put all plats with the tag into stasis.
pub fn stop_plat(thinkers: &mut Thinkers, tag: i16) {
    let ids: Vec<ThinkerId> = thinkers
        .iter_live()
        .filter(|(_, th)| matches!(&th.kind, ThinkerKind::Plat(p) if p.tag == tag))
        .map(|(id, _)| id)
        .collect();
    for id in ids {
        thinkers.set_stasis(id, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::map::Sector;

    fn tagged_map(tag: i16) -> Map {
        let mut map = Map::empty("TEST");
        let mut sector = Sector::new(0.0, 128.0);
        sector.tag = tag;
        map.sectors.push(sector);
        map
    }

    #[test]
    fn test_door_full_cycle() {
        let mut map = tagged_map(9);
        let mut thinkers = Thinkers::new();
        let ids = spawn_door(&mut map, &mut thinkers, 9, Fixed::from_int(2), 3);
        assert_eq!(ids.len(), 1);
        assert!(map.sector(SectorId(0)).special_data.is_some());

        let mut th = thinkers.take(ids[0]).unwrap();
        let ThinkerKind::Door(door) = &mut th.kind else {
            panic!("not a door");
        };

        let mut outcome = ThinkOutcome::Keep;
        for _ in 0..200 {
            outcome = door_think(door, &mut map);
            if outcome == ThinkOutcome::Remove {
                break;
            }
        }
        assert_eq!(outcome, ThinkOutcome::Remove);
        // Closed again at floor level.
        assert_eq!(
            map.sector(SectorId(0)).ceiling_height,
            map.sector(SectorId(0)).floor_height
        );
    }

    #[test]
    fn test_second_mover_on_sector_noops() {
        let mut map = tagged_map(4);
        let mut thinkers = Thinkers::new();
        let first = spawn_floor(
            &mut map,
            &mut thinkers,
            4,
            FloorDest::Absolute(Fixed::from_int(32)),
            Fixed::ONE,
        );
        assert_eq!(first.len(), 1);
        let second = spawn_door(&mut map, &mut thinkers, 4, Fixed::ONE, 5);
        assert!(second.is_empty());
    }

    #[test]
    fn test_floor_applies_new_special_on_arrival() {
        let mut map = tagged_map(1);
        let mut thinkers = Thinkers::new();
        let ids = spawn_floor(
            &mut map,
            &mut thinkers,
            1,
            FloorDest::Absolute(Fixed::from_int(16)),
            Fixed::from_int(4),
        );
        let mut th = thinkers.take(ids[0]).unwrap();
        let ThinkerKind::Floor(floor) = &mut th.kind else {
            panic!("not a floor");
        };
        floor.new_special = Some(7);

        let mut outcome = ThinkOutcome::Keep;
        for _ in 0..10 {
            outcome = floor_think(floor, &mut map);
            if outcome == ThinkOutcome::Remove {
                break;
            }
        }
        assert_eq!(outcome, ThinkOutcome::Remove);
        assert_eq!(map.sector(SectorId(0)).floor_height, Fixed::from_int(16));
        assert_eq!(map.sector(SectorId(0)).special, 7);
    }

    #[test]
    fn test_plat_waits_then_returns() {
        let mut map = tagged_map(2);
        let mut thinkers = Thinkers::new();
        let ids = spawn_plat(&mut map, &mut thinkers, 2, Fixed::from_int(2), 4);
        let mut th = thinkers.take(ids[0]).unwrap();
        let ThinkerKind::Plat(plat) = &mut th.kind else {
            panic!("not a plat");
        };

        plat.one_shot = true;

        // Down to low...
        let mut reached_low = false;
        let mut outcome = ThinkOutcome::Keep;
        for _ in 0..40 {
            outcome = plat_think(plat, &mut map);
            if map.sector(SectorId(0)).floor_height == plat.low {
                reached_low = true;
            }
            if outcome == ThinkOutcome::Remove {
                break;
            }
        }
        // ...waited at the bottom, then returned and removed itself.
        assert!(reached_low);
        assert_eq!(outcome, ThinkOutcome::Remove);
        assert_eq!(map.sector(SectorId(0)).floor_height, plat.high);
    }

    #[test]
    fn test_plat_stasis_reactivation() {
        let mut map = tagged_map(5);
        let mut thinkers = Thinkers::new();
        let ids = spawn_plat(&mut map, &mut thinkers, 5, Fixed::ONE, 4);
        stop_plat(&mut thinkers, 5);
        assert!(thinkers.get(ids[0]).unwrap().in_stasis);

        // Spawning again un-pauses rather than doubling up.
        let again = spawn_plat(&mut map, &mut thinkers, 5, Fixed::ONE, 4);
        assert!(again.is_empty());
        assert!(!thinkers.get(ids[0]).unwrap().in_stasis);
    }
}
