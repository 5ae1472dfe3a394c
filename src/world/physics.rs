//! Mobj movement: XY integration with line-cross handling, Z integration
//! with plane clipping, friction, and the damage thrust rules.

use crate::constants::physics::*;
use crate::constants::sentinel;
use crate::fixed::{fine_cosine, fine_sine, Angle, Fixed, ANG180};
use crate::fixed::FRACUNIT;
use crate::rng::GameRng;
use crate::world::map::{LineId, Map};
use crate::world::mobj::{Mobj, MobjFlags, State, StateId};
use crate::world::thinker::ThinkOutcome;

/// Advance one mobj by one tick.
pub fn mobj_think(
    mobj: &mut Mobj,
    map: &Map,
    states: &[State],
    rng: &mut GameRng,
    intent_active: bool,
) -> ThinkOutcome {
    xy_movement(mobj, map);
    xy_move_stopping(mobj, map, intent_active);
    z_movement(mobj, map, states);

    // Animation countdown.
    if mobj.tics > 0 {
        mobj.tics -= 1;
        if mobj.tics == 0 {
            let next = states
                .get(mobj.state.0 as usize)
                .map(|s| s.next)
                .unwrap_or(StateId::NONE);
            if next == StateId::NONE {
                return ThinkOutcome::Remove;
            }
            set_state(mobj, states, next);
        }
    }

    let _ = rng;
    ThinkOutcome::Keep
}

pub fn set_state(mobj: &mut Mobj, states: &[State], state: StateId) {
    mobj.state = state;
    mobj.tics = states.get(state.0 as usize).map(|s| s.tics).unwrap_or(-1);
}

/// XY step: candidate position, line-cross resolution, wall bounce.
fn xy_movement(mobj: &mut Mobj, map: &Map) {
    if mobj.mom[0] == Fixed::ZERO && mobj.mom[1] == Fixed::ZERO {
        return;
    }
    if mobj.flags.contains(MobjFlags::NO_CLIP) {
        mobj.pos[0] += mobj.mom[0];
        mobj.pos[1] += mobj.mom[1];
        return;
    }

    let start = (mobj.pos[0], mobj.pos[1]);
    let target = (start.0 + mobj.mom[0], start.1 + mobj.mom[1]);
    mobj.contact_line = None;
    let mut crossed_two_sided = false;

    let box_min_x = start.0.min(target.0) - mobj.radius;
    let box_min_y = start.1.min(target.1) - mobj.radius;
    let box_max_x = start.0.max(target.0) + mobj.radius;
    let box_max_y = start.1.max(target.1) + mobj.radius;

    for line_id in map.lines_in_box(box_min_x, box_min_y, box_max_x, box_max_y) {
        let line = map.line(line_id);

        // Movement must actually cross the line.
        if line.point_on_side(start.0, start.1) == line.point_on_side(target.0, target.1) {
            continue;
        }

        if line.is_one_sided() {
            wall_bounce(mobj, map, line_id, start, target);
            return;
        }

        // Two-sided: the opening is the intersection of both sectors'
        // vertical extents.
        let front = map.sector(line.front_sector);
        let back = map.sector(line.back_sector.expect("two-sided line"));
        let open_bottom = front.floor_height.max(back.floor_height);
        let open_top = front.ceiling_height.min(back.ceiling_height);

        let fits = mobj.pos[2] >= open_bottom && mobj.pos[2] + mobj.height <= open_top;
        if !fits {
            wall_bounce(mobj, map, line_id, start, target);
            return;
        }

        crossed_two_sided = true;
    }

    mobj.pos[0] = target.0;
    mobj.pos[1] = target.1;

    if crossed_two_sided {
        // Containing subspace may have changed; re-resolve and update
        // the plane heights.
        mobj.subspace = map.subspace_at(mobj.pos[0], mobj.pos[1]);
        if let Some(sub) = mobj.subspace {
            let sector = map.sector(map.subspaces[sub.0 as usize].sector);
            mobj.floor_z = sector.floor_height;
            mobj.ceiling_z = sector.ceiling_height;
        }
    }
}

/// Reflect momentum off a wall line and advance to the contact point.
fn wall_bounce(
    mobj: &mut Mobj,
    map: &Map,
    line_id: LineId,
    start: (Fixed, Fixed),
    target: (Fixed, Fixed),
) {
    let line = map.line(line_id);
    let (dx, dy) = line.direction();

    // Contact point: segment/line intersection, then back off a hair
    // along the incoming direction.
    if let Some(t) = cross_parameter(start, target, line) {
        let eps = Fixed(FRACUNIT / 16);
        let travel_x = (target.0 - start.0).mul(t);
        let travel_y = (target.1 - start.1).mul(t);
        mobj.pos[0] = start.0 + travel_x - sign_scaled(eps, target.0 - start.0);
        mobj.pos[1] = start.1 + travel_y - sign_scaled(eps, target.1 - start.1);
    }

    // Reflect across the wall tangent: keep the parallel component,
    // negate the perpendicular one, scale by bounce.
    let (mx, my) = (mobj.mom[0].to_float(), mobj.mom[1].to_float());
    let (fdx, fdy) = (dx.to_float(), dy.to_float());
    let denom = fdx * fdx + fdy * fdy;
    if denom > 0.0 {
        let dot = (mx * fdx + my * fdy) / denom;
        let px = fdx * dot;
        let py = fdy * dot;
        let bounce = mobj.bounce.to_float();
        mobj.mom[0] = Fixed::from_float((2.0 * px - mx) * bounce);
        mobj.mom[1] = Fixed::from_float((2.0 * py - my) * bounce);
    }

    mobj.contact_line = Some(line_id);
}

/// Parameter t in [0,1] where the segment from `a` to `b` crosses the
/// line, or None when parallel.
fn cross_parameter(a: (Fixed, Fixed), b: (Fixed, Fixed), line: &crate::world::map::Line) -> Option<Fixed> {
    let (dx, dy) = line.direction();
    let (ldx, ldy) = (dx.to_float(), dy.to_float());
    let (sx, sy) = ((b.0 - a.0).to_float(), (b.1 - a.1).to_float());

    let denom = ldx * sy - ldy * sx;
    if denom.abs() < 1e-9 {
        return None;
    }
    let wx = a.0.to_float() - line.v1.0.to_float();
    let wy = a.1.to_float() - line.v1.1.to_float();
    let t = (ldy * wx - ldx * wy) / denom;
    (0.0..=1.0).contains(&t).then(|| Fixed::from_float(t))
}

fn sign_scaled(eps: Fixed, along: Fixed) -> Fixed {
    if along > Fixed::ZERO {
        eps
    } else if along < Fixed::ZERO {
        -eps
    } else {
        Fixed::ZERO
    }
}

/// Friction pass of the XY step.
fn xy_move_stopping(mobj: &mut Mobj, map: &Map, intent_active: bool) {
    if mobj.is_missile() {
        return; // No friction for missiles.
    }
    if mobj.pos[2] > mobj.floor_z && mobj.on_mobj.is_none() && !mobj.flags.contains(MobjFlags::FLY)
    {
        return; // No friction while falling.
    }

    // Sliding corpses: keep moving while halfway off a step.
    if mobj
        .flags
        .intersects(MobjFlags::CORPSE | MobjFlags::FALLING)
        && mobj.player.is_none()
    {
        let threshold = Fixed::from_float(DROPOFFMOMENTUM_THRESHOLD);
        if (mobj.mom[0].abs() > threshold || mobj.mom[1].abs() > threshold)
            && sector_floor_below(mobj, map)
        {
            return;
        }
    }

    let walkstop = Fixed::from_float(WALKSTOP_THRESHOLD);
    let below_walkstop = mobj.mom[0].abs() < walkstop && mobj.mom[1].abs() < walkstop;

    if below_walkstop && !intent_active {
        mobj.mom[0] = Fixed::ZERO;
        mobj.mom[1] = Fixed::ZERO;
    } else {
        let friction = Fixed::from_float(friction_for(mobj, map));
        mobj.mom[0] = mobj.mom[0].mul(friction);
        mobj.mom[1] = mobj.mom[1].mul(friction);
    }
}

/// Does the mobj float above its containing sector's true floor (i.e.
/// it hangs over a ledge)?
fn sector_floor_below(mobj: &Mobj, map: &Map) -> bool {
    match map.sector_at(mobj.pos[0], mobj.pos[1]) {
        Some(id) => map.sector(id).floor_height != mobj.floor_z,
        None => false,
    }
}

/// Friction for the mobj's current situation and sector terrain.
pub fn friction_for(mobj: &Mobj, map: &Map) -> f64 {
    if mobj.is_airborne() {
        return FRICTION_FLY;
    }
    match map.sector_at(mobj.pos[0], mobj.pos[1]) {
        // Special 15 is the low-friction (icy) sector.
        Some(id) if map.sector(id).special == 15 => FRICTION_LOW,
        _ => FRICTION_NORMAL,
    }
}

/// Z step: gravity, plane clipping, bounce, sky sink, plane-flat pin.
fn z_movement(mobj: &mut Mobj, map: &Map, states: &[State]) {
    if mobj.plane_pinned() {
        return;
    }

    if !mobj.flags.contains(MobjFlags::NO_GRAVITY) {
        let gravity_scale = states
            .get(mobj.state.0 as usize)
            .map(|s| s.gravity)
            .unwrap_or(Fixed::ONE);
        mobj.mom[2] -= map.gravity.mul(gravity_scale);
    }

    let mut z = mobj.pos[2] + mobj.mom[2];
    let floor_limit = mobj.floor_z + mobj.hard_radius;
    let ceiling_limit = mobj.ceiling_z - mobj.hard_radius - mobj.height;

    let mut bounced = false;
    let mut hit_floor = false;

    if z > ceiling_limit {
        if ceiling_is_sky(mobj, map) {
            // Lost in the sky.
            mobj.health = 0;
            mobj.pos[2] = z;
            return;
        }
        z = ceiling_limit;
        bounced = true;
    }
    if z < floor_limit {
        if floor_is_sky(mobj, map) {
            mobj.health = 0;
            mobj.pos[2] = z;
            return;
        }
        z = floor_limit;
        bounced = true;
        hit_floor = true;
    }

    if bounced {
        mobj.mom[2] = (-mobj.mom[2]).mul(mobj.bounce);
        if mobj.mom[2] == Fixed::ZERO && mobj.flags.contains(MobjFlags::PLANE_FLAT) {
            // Z-motion ceased against a plane; flat objects stick.
            z = if hit_floor {
                Fixed(sentinel::MIN_Z)
            } else {
                Fixed(sentinel::MAX_Z)
            };
        }
    }

    mobj.pos[2] = z;
}

fn floor_is_sky(mobj: &Mobj, map: &Map) -> bool {
    map.sector_at(mobj.pos[0], mobj.pos[1])
        .map(|id| map.sector(id).floor_sky)
        .unwrap_or(false)
}

fn ceiling_is_sky(mobj: &Mobj, map: &Map) -> bool {
    map.sector_at(mobj.pos[0], mobj.pos[1])
        .map(|id| map.sector(id).ceiling_sky)
        .unwrap_or(false)
}

/// Damage application with the thrust rules: melee inflictors flagged
/// `NO_DMG_THRUST` push nothing; light damage from well above the victim
/// sometimes flips them forward at four times the kick.
pub fn damage_mobj(
    target: &mut Mobj,
    inflictor: Option<&Mobj>,
    damage: i32,
    rng: &mut GameRng,
) {
    if let Some(inflictor) = inflictor {
        let skip_thrust = target.flags.contains(MobjFlags::NO_CLIP)
            || inflictor.flags.contains(MobjFlags::NO_DMG_THRUST);

        if !skip_thrust {
            let mut angle = point_to_angle(
                target.pos[0] - inflictor.pos[0],
                target.pos[1] - inflictor.pos[1],
            );
            let mut thrust =
                Fixed(damage.wrapping_mul(FRACUNIT >> 3).wrapping_mul(100) / target.mass.max(1));

            // Make fall forwards sometimes.
            if damage < 40
                && damage > target.health
                && target.pos[2] - inflictor.pos[2] > Fixed::from_int(64)
                && rng.rand_byte() & 1 != 0
            {
                angle = angle.wrapping_add(ANG180);
                thrust = Fixed(thrust.0.wrapping_mul(4));
            }

            target.mom[0] += thrust.mul(fine_cosine(angle));
            target.mom[1] += thrust.mul(fine_sine(angle));
        }
    }

    target.health -= damage;
    if target.health <= 0 {
        target.flags.insert(MobjFlags::CORPSE);
        target.flags.remove(MobjFlags::SOLID | MobjFlags::SHOOTABLE);
    }
}

fn point_to_angle(dx: Fixed, dy: Fixed) -> Angle {
    let radians = dy.to_float().atan2(dx.to_float());
    let turns = radians / std::f64::consts::TAU;
    let turns = if turns < 0.0 { turns + 1.0 } else { turns };
    (turns * u32::MAX as f64) as Angle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::map::{Line, LineFlags, Map, Sector, SectorId, Side, Subspace};

    fn open_map() -> Map {
        let mut map = Map::empty("TEST");
        map.sectors.push(Sector::new(0.0, 256.0));
        map.subspaces.push(Subspace {
            sector: SectorId(0),
            bounds: (-1024.0, -1024.0, 1024.0, 1024.0),
            has_geometry: true,
        });
        map
    }

    fn wall_along_y(map: &mut Map, x: f64) {
        map.lines.push(Line {
            v1: (Fixed::from_float(x), Fixed::from_int(-1024)),
            v2: (Fixed::from_float(x), Fixed::from_int(1024)),
            front_sector: SectorId(0),
            back_sector: None,
            front_side: Side::default(),
            back_side: None,
            flags: LineFlags::BLOCKING,
            special: 0,
            tag: 0,
            args: [0; 5],
        });
    }

    fn test_mobj() -> Mobj {
        Mobj {
            pos: [Fixed::from_int(100), Fixed::from_int(100), Fixed::ZERO],
            mom: [Fixed::ZERO; 3],
            angle: 0,
            last_angle: 0,
            type_id: 0,
            state: StateId(0),
            tics: -1,
            health: 100,
            flags: MobjFlags::NO_GRAVITY,
            radius: Fixed::ZERO,
            height: Fixed::ZERO,
            hard_radius: Fixed::ZERO,
            bounce: Fixed::ONE,
            mass: 100,
            floor_z: Fixed::ZERO,
            ceiling_z: Fixed::from_int(256),
            player: None,
            target: None,
            tracer: None,
            on_mobj: None,
            subspace: None,
            contact_line: None,
        }
    }

    #[test]
    fn test_zero_momentum_is_idempotent() {
        let map = open_map();
        let mut rng = GameRng::from_seed(1);
        let mut mobj = test_mobj();
        let before = mobj.pos;
        mobj_think(&mut mobj, &map, &[], &mut rng, false);
        assert_eq!(mobj.pos, before);
    }

    #[test]
    fn test_head_on_wall_bounce() {
        // Scenario: mobj at (100,100), mom (8,0), wall at x=105 along Y,
        // bounce 1.0 -> ends just shy of the wall with mom (-8,0).
        let mut map = open_map();
        wall_along_y(&mut map, 105.0);
        let mut rng = GameRng::from_seed(1);
        let mut mobj = test_mobj();
        mobj.flags.insert(MobjFlags::MISSILE); // keep friction out of it
        mobj.mom[0] = Fixed::from_int(8);

        mobj_think(&mut mobj, &map, &[], &mut rng, false);

        assert!(mobj.pos[0] < Fixed::from_int(105));
        assert!(mobj.pos[0] > Fixed::from_int(104));
        assert_eq!(mobj.pos[1], Fixed::from_int(100));
        assert_eq!(mobj.mom[0], Fixed::from_int(-8));
        assert_eq!(mobj.mom[1], Fixed::ZERO);
        assert!(mobj.contact_line.is_some());
    }

    #[test]
    fn test_diagonal_wall_bounce_reflects_across_normal() {
        // 45 degree approach: (8,8) against a wall along Y reflects the
        // X component only, within one fixed-point ULP.
        let mut map = open_map();
        wall_along_y(&mut map, 105.0);
        let mut rng = GameRng::from_seed(1);
        let mut mobj = test_mobj();
        mobj.flags.insert(MobjFlags::MISSILE); // keep friction out of it
        mobj.mom[0] = Fixed::from_int(8);
        mobj.mom[1] = Fixed::from_int(8);

        mobj_think(&mut mobj, &map, &[], &mut rng, false);

        assert!((mobj.mom[0].0 - Fixed::from_int(-8).0).abs() <= 1);
        assert!((mobj.mom[1].0 - Fixed::from_int(8).0).abs() <= 1);
    }

    #[test]
    fn test_plane_clamp_invariant() {
        let map = open_map();
        let mut rng = GameRng::from_seed(1);
        let mut mobj = test_mobj();
        mobj.flags.remove(MobjFlags::NO_GRAVITY);
        mobj.bounce = Fixed::from_float(0.5);
        mobj.pos[2] = Fixed::from_int(64);
        mobj.mom[2] = Fixed::from_int(-100);

        for _ in 0..20 {
            mobj_think(&mut mobj, &map, &[], &mut rng, false);
            if mobj.plane_pinned() {
                break;
            }
            assert!(mobj.pos[2] >= mobj.floor_z + mobj.hard_radius);
            assert!(mobj.pos[2] <= mobj.ceiling_z - mobj.hard_radius);
        }
    }

    #[test]
    fn test_plane_flat_pins_to_floor_sentinel() {
        let map = open_map();
        let mut rng = GameRng::from_seed(1);
        let mut mobj = test_mobj();
        mobj.flags.remove(MobjFlags::NO_GRAVITY);
        mobj.flags.insert(MobjFlags::PLANE_FLAT);
        mobj.bounce = Fixed::ZERO;
        mobj.pos[2] = Fixed::from_int(8);
        mobj.mom[2] = Fixed::from_int(-4);

        for _ in 0..10 {
            mobj_think(&mut mobj, &map, &[], &mut rng, false);
            if mobj.plane_pinned() {
                break;
            }
        }
        assert_eq!(mobj.pos[2].0, sentinel::MIN_Z);
    }

    #[test]
    fn test_walkstop_zeroes_slow_momentum() {
        let map = open_map();
        let mut rng = GameRng::from_seed(1);
        let mut mobj = test_mobj();
        mobj.mom[0] = Fixed::from_float(0.01);
        mobj_think(&mut mobj, &map, &[], &mut rng, false);
        assert_eq!(mobj.mom[0], Fixed::ZERO);
    }

    #[test]
    fn test_friction_decays_momentum() {
        let map = open_map();
        let mut rng = GameRng::from_seed(1);
        let mut mobj = test_mobj();
        mobj.mom[0] = Fixed::from_int(8);
        // No wall in the way; one tick applies friction once.
        mobj_think(&mut mobj, &map, &[], &mut rng, false);
        let expected = Fixed::from_int(8).mul(Fixed::from_float(FRICTION_NORMAL));
        assert!((mobj.mom[0].0 - expected.0).abs() <= 2);
    }

    #[test]
    fn test_no_dmg_thrust_skips_kick() {
        let mut rng = GameRng::from_seed(1);
        let mut target = test_mobj();
        let mut inflictor = test_mobj();
        inflictor.pos[0] = Fixed::from_int(90);
        inflictor.flags.insert(MobjFlags::NO_DMG_THRUST);

        damage_mobj(&mut target, Some(&inflictor), 10, &mut rng);
        assert_eq!(target.mom[0], Fixed::ZERO);
        assert_eq!(target.health, 90);
    }

    #[test]
    fn test_damage_kick_pushes_away() {
        let mut rng = GameRng::from_seed(1);
        let mut target = test_mobj();
        let mut inflictor = test_mobj();
        inflictor.pos[0] = Fixed::from_int(90); // west of target

        damage_mobj(&mut target, Some(&inflictor), 10, &mut rng);
        assert!(target.mom[0] > Fixed::ZERO); // pushed east
    }
}
