//! Generator behavior: spawning, aging and particle movement.

use glam::Vec3;

use crate::constants::sentinel;
use crate::fixed::{Fixed, FRACUNIT};
use crate::rng::GameRng;
use crate::particles::generator_data::{
    Generator, GeneratorFlags, Particle, StageDef, StageFlags, TypeFilter,
};
use crate::world::map::{Map, SectorId};
use crate::world::thinker::{ThinkOutcome, ThinkerKind, Thinkers};

/// Read-only world access a generator needs during its tick.
pub struct GenContext<'a> {
    pub map: &'a Map,
    pub thinkers: &'a Thinkers,
    pub rng: &'a mut GameRng,
    /// Global spawn-rate multiplier (user configurable).
    pub global_rate: f32,
}

/// Snapshot of a source mobj taken before spawning.
#[derive(Debug, Clone, Copy)]
struct SourceInfo {
    origin: [Fixed; 3],
    mom: [Fixed; 3],
    angle: crate::fixed::Angle,
}

fn source_info(thinkers: &Thinkers, id: crate::world::thinker::ThinkerId) -> Option<SourceInfo> {
    match &thinkers.get(id)?.kind {
        ThinkerKind::Mobj(m) => Some(SourceInfo {
            origin: m.pos,
            mom: m.mom,
            angle: m.angle,
        }),
        _ => None,
    }
}

/// Run a freshly spawned generator silently for its presim period.
pub fn presimulate(gen: &mut Generator, ctx: &mut GenContext) {
    for _ in 0..gen.def.presim.max(0) {
        generator_think(gen, ctx);
    }
}

/// Advance the generator one tick.
pub fn generator_think(gen: &mut Generator, ctx: &mut GenContext) -> ThinkOutcome {
    // Source destroyed? Keep running, stop spawning.
    if !gen.is_untriggered() {
        if let Some(src) = gen.source {
            if !ctx.thinkers.is_live(src) {
                gen.source = None;
            }
        }
    }

    gen.age += 1;
    if gen.def.max_age >= 0 && gen.age > gen.def.max_age {
        return ThinkOutcome::Remove;
    }

    let may_spawn = (gen.def.spawn_age < 0 || gen.age <= gen.def.spawn_age)
        && (gen.source.is_some()
            || gen.plane.is_some()
            || !matches!(gen.type_filter, TypeFilter::None)
            || gen.is_untriggered());

    if may_spawn {
        let variance = gen.def.spawn_rate_variance * ctx.rng.rand_float();
        let mut new_parts =
            gen.def.spawn_rate * gen.spawn_rate_multiplier * ctx.global_rate * (1.0 - variance);
        new_parts = new_parts.min(gen.def.particles as f32);
        gen.spawn_count += new_parts;

        while gen.spawn_count >= 1.0 {
            match gen.type_filter {
                TypeFilter::None => {
                    let source = gen.source.and_then(|id| source_info(ctx.thinkers, id));
                    new_particle(gen, ctx, source);
                }
                _ => {
                    // Type-triggered: spawn from every matching mobj.
                    let sources: Vec<SourceInfo> = ctx
                        .thinkers
                        .iter_live()
                        .filter_map(|(_, th)| match &th.kind {
                            ThinkerKind::Mobj(m) if type_matches(gen.type_filter, m.type_id) => {
                                Some(SourceInfo {
                                    origin: m.pos,
                                    mom: m.mom,
                                    angle: m.angle,
                                })
                            }
                            _ => None,
                        })
                        .collect();
                    for src in sources {
                        new_particle(gen, ctx, Some(src));
                    }
                }
            }
            gen.spawn_count -= 1.0;
        }
    }

    // Age and move the live particles.
    let def = gen.def.clone();
    for i in 0..gen.particles.len() {
        if !gen.particles[i].in_use() {
            continue;
        }

        gen.particles[i].tics -= 1;
        if gen.particles[i].tics <= 0 {
            let next = gen.particles[i].stage + 1;
            let ended =
                next as usize >= def.stages.len() || def.stages[next as usize].terminal;
            if ended {
                gen.particles[i].stage = -1;
                continue;
            }
            let st = &def.stages[next as usize];
            gen.particles[i].stage = next;
            gen.particles[i].tics =
                (st.tics as f32 * (1.0 - st.tics_variance * ctx.rng.rand_float())) as i32;
            set_particle_angles(&mut gen.particles[i], st.flags, ctx.rng);
        }

        move_particle(gen, i, ctx);
    }

    ThinkOutcome::Keep
}

fn type_matches(filter: TypeFilter, type_id: u16) -> bool {
    match filter {
        TypeFilter::None => false,
        TypeFilter::Any => true,
        TypeFilter::One(t) => type_id == t,
        TypeFilter::Either(a, b) => type_id == a || type_id == b,
    }
}

fn set_particle_angles(particle: &mut Particle, flags: StageFlags, rng: &mut GameRng) {
    if flags.contains(StageFlags::ZERO_YAW) {
        particle.yaw = 0.0;
    }
    if flags.contains(StageFlags::ZERO_PITCH) {
        particle.pitch = 0.0;
    }
    if flags.contains(StageFlags::RANDOM_YAW) {
        particle.yaw = rng.rand_float() * 65536.0;
    }
    if flags.contains(StageFlags::RANDOM_PITCH) {
        particle.pitch = rng.rand_float() * 65536.0;
    }
}

/// Random offset within a spherical shell, for spawn-radius scatter.
fn uncertain_position(origin: &mut [Fixed; 3], low: f32, high: f32, rng: &mut GameRng) {
    if high <= 0.0 {
        return;
    }
    let dist = low + rng.rand_float() * (high - low).max(0.0);
    let yaw = rng.rand_float() * std::f32::consts::TAU;
    let pitch = (rng.rand_float() - 0.5) * std::f32::consts::PI;
    let (sy, cy) = yaw.sin_cos();
    let (sp, cp) = pitch.sin_cos();
    origin[0] += Fixed::from_float((dist * cy * cp) as f64);
    origin[1] += Fixed::from_float((dist * sy * cp) as f64);
    origin[2] += Fixed::from_float((dist * sp) as f64);
}

/// Spawn one particle at the cursor. Returns the slot used, or None when
/// placement failed (silently dropped, like always).
fn new_particle(gen: &mut Generator, ctx: &mut GenContext, source: Option<SourceInfo>) -> Option<usize> {
    gen.spawn_cursor = (gen.spawn_cursor + 1) % gen.particles.len();
    let index = gen.spawn_cursor;
    let def = gen.def.clone();

    let mut stage = 0usize;
    if ctx.rng.rand_float() < def.alt_start_variance {
        stage = def.alt_start.min(def.stages.len() - 1);
    }

    let mut particle = Particle::unused();
    particle.stage = stage as i32;
    particle.tics = (def.stages[stage].tics as f32
        * (1.0 - def.stages[stage].tics_variance * ctx.rng.rand_float())) as i32;

    // Launch vector with variance, aspect correction and speed scaling.
    let mut mov = [
        def.vector[0] + def.vector_variance * (ctx.rng.rand_float() - ctx.rng.rand_float()),
        def.vector[1] + def.vector_variance * (ctx.rng.rand_float() - ctx.rng.rand_float()),
        def.vector[2] + def.vector_variance * (ctx.rng.rand_float() - ctx.rng.rand_float()),
    ];
    mov[0] *= 1.1;
    mov[1] *= 0.95;
    mov[2] *= 1.1;

    let speed = def.speed * (1.0 - def.speed_variance * ctx.rng.rand_float());
    let len = (mov[0] * mov[0] + mov[1] * mov[1] + mov[2] * mov[2]).sqrt();
    let scale = if len > 0.0 { speed / len } else { 0.0 };
    for (slot, value) in particle.mom.iter_mut().zip(mov.iter()) {
        *slot = Fixed::from_float((value * scale) as f64);
    }

    if let Some(src) = source {
        if gen.flags.contains(GeneratorFlags::RELATIVE_VECTOR) {
            // Rotate the launch vector by the source's angle.
            let radians = crate::fixed::angle_to_radians(src.angle) as f32;
            let (s, c) = radians.sin_cos();
            let mx = particle.mom[0].to_float() as f32;
            let my = particle.mom[1].to_float() as f32;
            particle.mom[0] = Fixed::from_float((mx * c - my * s) as f64);
            particle.mom[1] = Fixed::from_float((mx * s + my * c) as f64);
        }
        if gen.flags.contains(GeneratorFlags::RELATIVE_VELOCITY) {
            particle.mom[0] += src.mom[0];
            particle.mom[1] += src.mom[1];
            particle.mom[2] += src.mom[2];
        }

        particle.origin = src.origin;
        uncertain_position(
            &mut particle.origin,
            def.spawn_radius_min,
            def.spawn_radius,
            ctx.rng,
        );
        particle.origin[2] += gen.origin_at_spawn[2];
    } else if let Some((sector_id, is_floor)) = gen.plane {
        if !place_on_plane(gen, &mut particle, ctx, sector_id, is_floor) {
            gen.particles[index] = Particle::unused();
            return None;
        }
    } else if gen.is_untriggered() {
        particle.origin = gen.origin_at_spawn;
        uncertain_position(
            &mut particle.origin,
            def.spawn_radius_min,
            def.spawn_radius,
            ctx.rng,
        );
    }

    set_particle_angles(&mut particle, def.stages[stage].flags, ctx.rng);

    // A subspace without geometry is no place for a particle.
    particle.subspace = ctx.map.subspace_at(particle.origin[0], particle.origin[1]);
    let ok = particle
        .subspace
        .map(|s| ctx.map.subspaces[s.0 as usize].has_geometry)
        .unwrap_or(false);
    if !ok && gen.plane.is_none() {
        gen.particles[index] = Particle::unused();
        return None;
    }

    gen.particles[index] = particle;
    Some(index)
}

/// Plane spawn placement: a few rejection-sampled subspace candidates,
/// then a few interior retries. Failure drops the particle silently;
/// very concave sectors simply spawn less.
fn place_on_plane(
    gen: &Generator,
    particle: &mut Particle,
    ctx: &mut GenContext,
    sector_id: SectorId,
    is_floor: bool,
) -> bool {
    let radius = gen.def.stages[particle.stage as usize].radius;
    let sector = ctx.map.sector(sector_id);

    // Pick the spawn height.
    particle.origin[2] = if gen.flags.contains(GeneratorFlags::SPAWN_SPACE) {
        let span = sector.ceiling_height - sector.floor_height - radius - radius;
        sector.floor_height
            + radius
            + Fixed::from_float(ctx.rng.rand_float() as f64 * span.to_float().max(0.0))
    } else if gen.flags.contains(GeneratorFlags::SPAWN_FLOOR)
        || (!gen.flags.contains(GeneratorFlags::SPAWN_CEILING) && is_floor)
    {
        sector.floor_height + radius
    } else {
        sector.ceiling_height - radius
    };

    let Some(bounds) = ctx.map.sector_bounds(sector_id) else {
        return false;
    };

    // Up to five candidate subspaces from random points in the sector's
    // bounds.
    let mut subspace = None;
    for _ in 0..5 {
        let x = bounds.0 + ctx.rng.rand_float() * (bounds.2 - bounds.0);
        let y = bounds.1 + ctx.rng.rand_float() * (bounds.3 - bounds.1);
        if let Some(s) = ctx
            .map
            .subspace_at(Fixed::from_float(x as f64), Fixed::from_float(y as f64))
        {
            if ctx.map.subspaces[s.0 as usize].sector == sector_id {
                subspace = Some(s);
                break;
            }
        }
    }
    let Some(subspace) = subspace else {
        return false;
    };

    // Up to ten interior points inside the chosen subspace.
    let sub_bounds = ctx.map.subspaces[subspace.0 as usize].bounds;
    for _ in 0..10 {
        let x = sub_bounds.0 + ctx.rng.rand_float() * (sub_bounds.2 - sub_bounds.0);
        let y = sub_bounds.1 + ctx.rng.rand_float() * (sub_bounds.3 - sub_bounds.1);
        let fx = Fixed::from_float(x as f64);
        let fy = Fixed::from_float(y as f64);
        if ctx.map.subspace_at(fx, fy) == Some(subspace) {
            particle.origin[0] = fx;
            particle.origin[1] = fy;
            particle.subspace = Some(subspace);
            return true;
        }
    }
    false
}

/// Float z of a particle, resolving the plane-pin sentinels.
fn particle_z(particle: &Particle, map: &Map) -> f32 {
    if let Some(sub) = particle.subspace {
        let sector = map.sector(map.subspaces[sub.0 as usize].sector);
        if particle.origin[2].0 == sentinel::MAX_Z {
            return sector.ceiling_height.to_float() as f32 - 2.0;
        }
        if particle.origin[2].0 == sentinel::MIN_Z {
            return sector.floor_height.to_float() as f32 + 2.0;
        }
    }
    particle.origin[2].to_float() as f32
}

/// Particle touched something solid. False means it died.
fn touch_particle(particle: &mut Particle, flags: StageFlags, touched_wall: bool) -> bool {
    if flags.contains(StageFlags::DIE_TOUCH) {
        particle.stage = -1;
        return false;
    }
    if flags.contains(StageFlags::STAGE_TOUCH)
        || (touched_wall && flags.contains(StageFlags::STAGE_WALL_TOUCH))
        || (!touched_wall && flags.contains(StageFlags::STAGE_FLAT_TOUCH))
    {
        // Forced stage advance.
        particle.tics = 0;
    }
    true
}

fn apply_sphere_force(gen: &Generator, particle: &mut Particle, map: &Map, source: Option<SourceInfo>) {
    let def = &gen.def;

    let center = match source {
        Some(src) => Vec3::new(
            src.origin[0].to_float() as f32,
            src.origin[1].to_float() as f32,
            src.origin[2].to_float() as f32 + gen.origin_at_spawn[2].to_float() as f32,
        ),
        None => Vec3::new(
            gen.origin_at_spawn[0].to_float() as f32,
            gen.origin_at_spawn[1].to_float() as f32,
            gen.origin_at_spawn[2].to_float() as f32,
        ),
    };

    let mut delta = Vec3::new(
        particle.origin[0].to_float() as f32,
        particle.origin[1].to_float() as f32,
        particle_z(particle, map),
    ) - center
        - Vec3::from(def.force_origin);

    // Counter the aspect ratio of old times.
    delta.z *= 1.2;

    let dist = delta.length();
    if dist == 0.0 {
        return;
    }

    if def.force != 0.0 {
        // Radial force pushes particles onto the surface of a sphere.
        let radial = (delta / dist) * (dist - def.force_radius) * def.force;
        particle.mom[0] -= Fixed::from_float(radial.x as f64);
        particle.mom[1] -= Fixed::from_float(radial.y as f64);
        particle.mom[2] -= Fixed::from_float(radial.z as f64);
    }

    let axis = Vec3::from(def.force_axis);
    if axis != Vec3::ZERO {
        let cross = axis.cross(delta) / 256.0;
        particle.mom[0] += Fixed::from_float(cross.x as f64);
        particle.mom[1] += Fixed::from_float(cross.y as f64);
        particle.mom[2] += Fixed::from_float(cross.z as f64);
    }
}

fn move_particle(gen: &mut Generator, index: usize, ctx: &mut GenContext) {
    let def = gen.def.clone();
    let stage_idx = gen.particles[index].stage as usize;
    let st: &StageDef = &def.stages[stage_idx];
    let map = ctx.map;

    spin_particle(gen, index, st);
    let source = gen.source.and_then(|id| source_info(ctx.thinkers, id));
    let particle = &mut gen.particles[index];

    // Momentum changes: gravity, constant vector force, sphere force,
    // resistance.
    particle.mom[2] -= map.gravity.mul(st.gravity);

    if st.vector_force != [0.0; 3] {
        for (slot, &f) in particle.mom.iter_mut().zip(st.vector_force.iter()) {
            *slot += Fixed::from_float(f as f64);
        }
    }

    if st.flags.contains(StageFlags::SPHERE_FORCE)
        && (source.is_some() || gen.flags.contains(GeneratorFlags::UNTRIGGERED))
    {
        apply_sphere_force_inline(gen, index, map, source);
    }

    let particle = &mut gen.particles[index];
    if st.resistance != Fixed::ONE {
        for slot in particle.mom.iter_mut() {
            *slot = slot.mul(st.resistance);
        }
    }

    // Plane-flat particles are almost entirely soft against planes.
    let mut hard_radius = Fixed(st.radius.0 / 2);
    if st.flags.contains(StageFlags::PLANE_FLAT) {
        hard_radius = Fixed(FRACUNIT);
    }

    // Z step, skipped while pinned to a plane.
    let mut z = particle.origin[2] + particle.mom[2];
    if particle.origin[2].0 != sentinel::MIN_Z
        && particle.origin[2].0 != sentinel::MAX_Z
        && particle.subspace.is_some()
    {
        let sector = map.sector(map.subspaces[particle.subspace.unwrap().0 as usize].sector);
        let mut bounced = false;
        let mut hit_floor = false;

        if z > sector.ceiling_height - hard_radius {
            if sector.ceiling_sky {
                // Lost in the sky.
                particle.stage = -1;
                return;
            }
            if !touch_particle(particle, st.flags, false) {
                return;
            }
            z = sector.ceiling_height - hard_radius;
            bounced = true;
        }
        if z < sector.floor_height + hard_radius {
            if sector.floor_sky {
                particle.stage = -1;
                return;
            }
            if !touch_particle(particle, st.flags, false) {
                return;
            }
            z = sector.floor_height + hard_radius;
            bounced = true;
            hit_floor = true;
        }

        if bounced {
            particle.mom[2] = (-particle.mom[2]).mul(st.bounce);
            if particle.mom[2] == Fixed::ZERO && st.flags.contains(StageFlags::PLANE_FLAT) {
                z = if hit_floor {
                    Fixed(sentinel::MIN_Z)
                } else {
                    Fixed(sentinel::MAX_Z)
                };
            }
        }
        particle.origin[2] = z;
    }

    // XY step.
    let start = (particle.origin[0], particle.origin[1]);
    let mut x = start.0 + particle.mom[0];
    let mut y = start.1 + particle.mom[1];
    let mut crossed = false;

    if particle.mom[0] == Fixed::ZERO && particle.mom[1] == Fixed::ZERO {
        // Stationary particle resting against a two-sided line while in
        // its opening probably should not be there at all.
        if let Some(contact) = particle.contact {
            let line = map.line(contact);
            if let Some(back) = line.back_sector {
                if particle.mom[2].abs() < Fixed(FRACUNIT / 2) {
                    let front = map.sector(line.front_sector);
                    let back = map.sector(back);
                    let fz = front.floor_height.max(back.floor_height).to_float() as f32;
                    let cz = front.ceiling_height.min(back.ceiling_height).to_float() as f32;
                    let pz = particle_z(particle, map);
                    if pz > fz && pz < cz {
                        particle.stage = -1;
                        return;
                    }
                }
            }
        }
    } else {
        particle.contact = None;

        let box_min_x = start.0.min(x) - st.radius;
        let box_min_y = start.1.min(y) - st.radius;
        let box_max_x = start.0.max(x) + st.radius;
        let box_max_y = start.1.max(y) + st.radius;

        let mut hit = None;
        for line_id in map.lines_in_box(box_min_x, box_min_y, box_max_x, box_max_y) {
            let line = map.line(line_id);
            if line.point_on_side(start.0, start.1) == line.point_on_side(x, y) {
                continue; // Movement does not cross.
            }

            if line.is_one_sided() {
                hit = Some(line_id);
                break;
            }

            let front = map.sector(line.front_sector);
            let back = map.sector(line.back_sector.expect("two-sided"));
            let open_bottom = front.floor_height.max(back.floor_height);
            let open_top = front.ceiling_height.min(back.ceiling_height);
            if z - hard_radius < open_bottom || z + hard_radius > open_top {
                hit = Some(line_id);
                break;
            }

            // Possibly in a new sector afterwards.
            crossed = true;
        }

        if let Some(line_id) = hit {
            if !touch_particle(particle, st.flags, true) {
                return;
            }

            // Reflect momentum across the wall tangent and stay put.
            let line = map.line(line_id);
            let (dx, dy) = line.direction();
            let (fdx, fdy) = (dx.to_float(), dy.to_float());
            let denom = fdx * fdx + fdy * fdy;
            if denom > 0.0 {
                let mx = particle.mom[0].to_float();
                let my = particle.mom[1].to_float();
                let dot = (mx * fdx + my * fdy) / denom;
                let bounce = st.bounce.to_float();
                particle.mom[0] = Fixed::from_float((2.0 * fdx * dot - mx) * bounce);
                particle.mom[1] = Fixed::from_float((2.0 * fdy * dot - my) * bounce);
            }

            x = start.0;
            y = start.1;
            crossed = false;
            particle.contact = Some(line_id);
        }
    }

    particle.origin[0] = x;
    particle.origin[1] = y;

    if crossed {
        particle.subspace = map.subspace_at(x, y);
        let ok = particle
            .subspace
            .map(|s| map.subspaces[s.0 as usize].has_geometry)
            .unwrap_or(false);
        if !ok {
            particle.stage = -1;
        }
    }
}

/// Work around the borrow of the particle slot inside `move_particle`.
fn apply_sphere_force_inline(
    gen: &mut Generator,
    index: usize,
    map: &Map,
    source: Option<SourceInfo>,
) {
    let mut particle = std::mem::replace(&mut gen.particles[index], Particle::unused());
    apply_sphere_force(gen, &mut particle, map, source);
    gen.particles[index] = particle;
}

/// Particles rotate with per-slot sign patterns so a cloud does not spin
/// in lockstep.
fn spin_particle(gen: &mut Generator, index: usize, st: &StageDef) {
    const YAW_SIGNS: [f32; 4] = [1.0, 1.0, -1.0, -1.0];
    const PITCH_SIGNS: [f32; 4] = [1.0, -1.0, 1.0, -1.0];

    let spin_index = index % 4;
    let particle = &mut gen.particles[index];

    if st.spin[0] != 0.0 {
        particle.yaw += 65536.0 * YAW_SIGNS[spin_index] * st.spin[0]
            / (360.0 * crate::constants::tick::TICRATE as f32);
    }
    if st.spin[1] != 0.0 {
        particle.pitch += 65536.0 * PITCH_SIGNS[spin_index] * st.spin[1]
            / (360.0 * crate::constants::tick::TICRATE as f32);
    }

    particle.yaw *= 1.0 - st.spin_resistance[0];
    particle.pitch *= 1.0 - st.spin_resistance[1];
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::particles::generator_data::GeneratorDef;
    use crate::world::map::{Sector, Subspace};

    fn open_map() -> Map {
        let mut map = Map::empty("TEST");
        let mut sector = Sector::new(0.0, 256.0);
        sector.tag = 1;
        map.sectors.push(sector);
        map.subspaces.push(Subspace {
            sector: SectorId(0),
            bounds: (-512.0, -512.0, 512.0, 512.0),
            has_geometry: true,
        });
        map
    }

    fn untriggered_gen(def: GeneratorDef) -> Generator {
        let mut gen = Generator::new(Arc::new(def));
        gen.flags.insert(GeneratorFlags::UNTRIGGERED);
        gen.origin_at_spawn = [Fixed::ZERO, Fixed::ZERO, Fixed::from_int(64)];
        gen
    }

    #[test]
    fn test_generator_expires_at_max_age() {
        let map = open_map();
        let thinkers = Thinkers::new();
        let mut rng = GameRng::from_seed(5);
        let mut ctx = GenContext {
            map: &map,
            thinkers: &thinkers,
            rng: &mut rng,
            global_rate: 1.0,
        };

        let mut gen = untriggered_gen(GeneratorDef {
            max_age: 3,
            spawn_rate: 0.0,
            ..GeneratorDef::default()
        });

        assert_eq!(generator_think(&mut gen, &mut ctx), ThinkOutcome::Keep);
        assert_eq!(generator_think(&mut gen, &mut ctx), ThinkOutcome::Keep);
        assert_eq!(generator_think(&mut gen, &mut ctx), ThinkOutcome::Keep);
        assert_eq!(generator_think(&mut gen, &mut ctx), ThinkOutcome::Remove);
    }

    #[test]
    fn test_spawn_accumulator_fractional_rate() {
        let map = open_map();
        let thinkers = Thinkers::new();
        let mut rng = GameRng::from_seed(5);
        let mut ctx = GenContext {
            map: &map,
            thinkers: &thinkers,
            rng: &mut rng,
            global_rate: 1.0,
        };

        // Half a particle per tick: one spawn every two ticks.
        let mut gen = untriggered_gen(GeneratorDef {
            spawn_rate: 0.5,
            stages: vec![StageDef {
                tics: 1000,
                ..StageDef::default()
            }],
            ..GeneratorDef::default()
        });

        generator_think(&mut gen, &mut ctx);
        assert_eq!(gen.active_particle_count(), 0);
        generator_think(&mut gen, &mut ctx);
        assert_eq!(gen.active_particle_count(), 1);
        generator_think(&mut gen, &mut ctx);
        generator_think(&mut gen, &mut ctx);
        assert_eq!(gen.active_particle_count(), 2);
    }

    #[test]
    fn test_dead_source_stops_spawning() {
        let map = open_map();
        let mut thinkers = Thinkers::new();
        let mut rng = GameRng::from_seed(5);

        // A generator sourced from a mobj that is then removed.
        let mut gen = Generator::new(Arc::new(GeneratorDef {
            spawn_rate: 1.0,
            ..GeneratorDef::default()
        }));
        let mobj = crate::world::mobj::Mobj {
            pos: [Fixed::from_int(10); 3],
            mom: [Fixed::ZERO; 3],
            angle: 0,
            last_angle: 0,
            type_id: 7,
            state: Default::default(),
            tics: -1,
            health: 10,
            flags: Default::default(),
            radius: Fixed::ONE,
            height: Fixed::ONE,
            hard_radius: Fixed::ZERO,
            bounce: Fixed::ZERO,
            mass: 100,
            floor_z: Fixed::ZERO,
            ceiling_z: Fixed::from_int(256),
            player: None,
            target: None,
            tracer: None,
            on_mobj: None,
            subspace: None,
            contact_line: None,
        };
        let id = thinkers.add(ThinkerKind::Mobj(mobj));
        gen.source = Some(id);

        thinkers.mark_for_removal(id);
        thinkers.sweep();

        let mut ctx = GenContext {
            map: &map,
            thinkers: &thinkers,
            rng: &mut rng,
            global_rate: 1.0,
        };
        let outcome = generator_think(&mut gen, &mut ctx);
        // Still alive, source cleared, nothing spawned.
        assert_eq!(outcome, ThinkOutcome::Keep);
        assert!(gen.source.is_none());
        assert_eq!(gen.active_particle_count(), 0);
    }

    #[test]
    fn test_sky_ceiling_swallows_particles() {
        let mut map = open_map();
        map.sectors[0].ceiling_sky = true;

        let thinkers = Thinkers::new();
        let mut rng = GameRng::from_seed(5);
        let mut ctx = GenContext {
            map: &map,
            thinkers: &thinkers,
            rng: &mut rng,
            global_rate: 1.0,
        };

        // Fast upward particles reach the sky and vanish.
        let mut gen = untriggered_gen(GeneratorDef {
            spawn_rate: 1.0,
            speed: 300.0,
            vector: [0.0, 0.0, 1.0],
            stages: vec![StageDef {
                tics: 1000,
                ..StageDef::default()
            }],
            ..GeneratorDef::default()
        });

        for _ in 0..5 {
            generator_think(&mut gen, &mut ctx);
        }
        assert_eq!(gen.active_particle_count(), 0);
    }

    #[test]
    fn test_plane_flat_sticks_to_floor() {
        let map = open_map();
        let thinkers = Thinkers::new();
        let mut rng = GameRng::from_seed(5);
        let mut ctx = GenContext {
            map: &map,
            thinkers: &thinkers,
            rng: &mut rng,
            global_rate: 1.0,
        };

        let mut gen = untriggered_gen(GeneratorDef {
            spawn_rate: 1.0,
            spawn_age: 1, // just one burst
            speed: 0.0,
            stages: vec![StageDef {
                tics: 1000,
                gravity: Fixed::from_float(0.5),
                bounce: Fixed::ZERO,
                flags: StageFlags::PLANE_FLAT,
                ..StageDef::default()
            }],
            ..GeneratorDef::default()
        });

        for _ in 0..64 {
            generator_think(&mut gen, &mut ctx);
        }
        let stuck = gen
            .particles
            .iter()
            .filter(|p| p.in_use())
            .all(|p| p.origin[2].0 == sentinel::MIN_Z);
        assert!(gen.active_particle_count() > 0);
        assert!(stuck);
    }
}
