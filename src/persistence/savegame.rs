//! The savegame format.
//!
//! Header, player records, script variables, thinker records (class
//! byte + payload, mobj references by serial id), map arrays, and the
//! 0x1D consistency marker. Older format versions are accepted by
//! field-appending: the reader knows which fields each version lacks
//! and which flag bits changed meaning.

use rustc_hash::FxHashMap;

use crate::acs::interpreter::AcsThinker;
use crate::acs::script::ScriptState;
use crate::acs::AcsSystem;
use crate::codec::{Reader, Writer};
use crate::constants::acs::{MAX_MAP_VARS, MAX_SCRIPT_ARGS, MAX_WORLD_VARS, STACK_DEPTH};
use crate::constants::net::MAX_PLAYERS;
use crate::constants::save::{
    CONSISTENCY_MARKER, FORMAT_VERSION, OLDEST_READABLE_VERSION, TC_END,
};
use crate::fixed::Fixed;
use crate::persistence::{SaveError, SaveResult};
use crate::world::lights::{FlashLight, GlowLight, StrobeLight};
use crate::world::map::{LineFlags, MaterialId, SectorId};
use crate::world::mobj::{Mobj, MobjFlags, StateId};
use crate::world::movers::{
    CeilingKind, CeilingMover, DoorMover, DoorState, FloorMover, PlatMover, PlatState,
};
use crate::world::player::{Player, WeaponType, NUM_WEAPON_TYPES};
use crate::world::thinker::{ThinkerId, ThinkerKind, Thinkers};
use crate::world::World;

const MAGIC: &[u8; 4] = b"EMBR";
/// Per-mobj record version. 1: thinker padding + legacy flags, no
/// hard radius; 2: legacy flags, no hard radius; 3: current.
const MOBJ_VERSION: u8 = 3;
const ACS_VERSION: u8 = 2;
/// Size of the thinker struct that version-1 records carried inline.
const LEGACY_THINKER_SIZE: usize = 16;

/// Legacy mobj flag bits and their current counterparts. Bits without a
/// counterpart are dropped.
const LEGACY_FLAG_TABLE: &[(u32, MobjFlags)] = &[
    (0x0000_0002, MobjFlags::SOLID),
    (0x0000_0004, MobjFlags::SHOOTABLE),
    (0x0000_0200, MobjFlags::NO_GRAVITY),
    (0x0000_1000, MobjFlags::NO_CLIP),
    (0x0001_0000, MobjFlags::MISSILE),
    (0x0004_0000, MobjFlags::SHADOW),
    (0x0010_0000, MobjFlags::CORPSE),
    (0x0040_0000, MobjFlags::COUNT_KILL),
    (0x0100_0000, MobjFlags::SKULLFLY),
];

fn translate_legacy_flags(raw: u32) -> MobjFlags {
    let mut flags = MobjFlags::empty();
    for &(old, new) in LEGACY_FLAG_TABLE {
        if raw & old != 0 {
            flags.insert(new);
        }
    }
    flags
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveMetadata {
    pub description: String,
    pub version: u8,
    pub skill: u8,
    pub episode: u8,
    pub map: u8,
    pub players_present: Vec<bool>,
    pub map_time: u32,
    pub game_id: String,
}

// --- Writing ---------------------------------------------------------------

pub fn write_save(
    meta: &SaveMetadata,
    world: &World,
    acs: &AcsSystem,
    players: &[Player],
) -> Vec<u8> {
    let mut w = Writer::new();

    // Header.
    w.write_bytes(MAGIC);
    w.write_u8(FORMAT_VERSION);
    w.write_padded(&meta.description, 24);
    w.write_padded(&format!("version {}", FORMAT_VERSION), 16);
    w.write_u8(meta.skill);
    w.write_u8(meta.episode);
    w.write_u8(meta.map);
    for i in 0..MAX_PLAYERS {
        w.write_u8(players.get(i).map(|p| p.in_game as u8).unwrap_or(0));
    }
    // Map time, three bytes big-endian like always.
    w.write_u8(((meta.map_time >> 16) & 0xff) as u8);
    w.write_u8(((meta.map_time >> 8) & 0xff) as u8);
    w.write_u8((meta.map_time & 0xff) as u8);
    w.write_string(&meta.game_id);

    // Player records for present players.
    for player in players.iter().filter(|p| p.in_game) {
        write_player(&mut w, player);
    }

    // Script variables.
    for i in 0..MAX_WORLD_VARS {
        w.write_i32(acs.world_var(i));
    }
    for i in 0..MAX_MAP_VARS {
        w.write_i32(acs.map_var(i));
    }

    // Thinkers.
    for (_, thinker) in world.thinkers.iter_live() {
        match &thinker.kind {
            ThinkerKind::Mobj(mobj) => {
                w.write_u8(thinker.kind.class_id());
                write_mobj(&mut w, thinker.serial, mobj, &world.thinkers);
            }
            ThinkerKind::Ceiling(c) => {
                w.write_u8(thinker.kind.class_id());
                write_ceiling(&mut w, c);
            }
            ThinkerKind::Door(d) => {
                w.write_u8(thinker.kind.class_id());
                write_door(&mut w, d);
            }
            ThinkerKind::Floor(f) => {
                w.write_u8(thinker.kind.class_id());
                write_floor(&mut w, f, world);
            }
            ThinkerKind::Plat(p) => {
                w.write_u8(thinker.kind.class_id());
                write_plat(&mut w, p, thinker.in_stasis);
            }
            ThinkerKind::Flash(f) => {
                w.write_u8(thinker.kind.class_id());
                write_flash(&mut w, f);
            }
            ThinkerKind::Strobe(s) => {
                w.write_u8(thinker.kind.class_id());
                write_strobe(&mut w, s);
            }
            ThinkerKind::Glow(g) => {
                w.write_u8(thinker.kind.class_id());
                write_glow(&mut w, g);
            }
            ThinkerKind::Acs(a) => {
                w.write_u8(thinker.kind.class_id());
                write_acs(&mut w, a, world, acs);
            }
            // Generators are reconstituted from their definitions at
            // map load; they carry no archived state.
            ThinkerKind::Generator(_) => {}
        }
    }
    w.write_u8(TC_END);

    // Map arrays.
    w.write_u32(world.map.sectors.len() as u32);
    for sector in &world.map.sectors {
        w.write_i16(sector.floor_height.to_int() as i16);
        w.write_i16(sector.ceiling_height.to_int() as i16);
        write_material(&mut w, world, sector.floor_material);
        write_material(&mut w, world, sector.ceiling_material);
        w.write_i16((sector.light_level * 255.0) as i16);
        w.write_i16(sector.special);
        w.write_i16(sector.tag);
    }
    w.write_u32(world.map.lines.len() as u32);
    for line in &world.map.lines {
        w.write_u32(line.flags.bits());
        w.write_i16(line.special);
        w.write_i16(line.tag);
        for side in [Some(&line.front_side), line.back_side.as_ref()] {
            match side {
                Some(side) => {
                    w.write_u8(1);
                    w.write_f32(side.offset_x);
                    w.write_f32(side.offset_y);
                    write_material(&mut w, world, side.top_material);
                    write_material(&mut w, world, side.bottom_material);
                    write_material(&mut w, world, side.middle_material);
                }
                None => w.write_u8(0),
            }
        }
    }

    w.write_u8(CONSISTENCY_MARKER);
    w.into_bytes()
}

fn write_material(w: &mut Writer, world: &World, id: MaterialId) {
    w.write_string(world.map.materials.name_of(id).unwrap_or("-"));
}

fn write_player(w: &mut Writer, player: &Player) {
    w.write_string(&player.name);
    for owned in &player.weapons_owned {
        w.write_u8(*owned as u8);
    }
    for ammo in &player.ammo {
        w.write_i32(ammo.owned);
        w.write_i32(ammo.max);
    }
    w.write_u8(player.ready_weapon.0);
    w.write_u8(player.pending_weapon.map(|wt| wt.0).unwrap_or(0xff));
    w.write_f32(player.look_dir);
}

fn serial_of(id: Option<ThinkerId>, thinkers: &Thinkers) -> u32 {
    id.and_then(|id| thinkers.get(id)).map(|t| t.serial).unwrap_or(0)
}

fn write_mobj(w: &mut Writer, serial: u32, mobj: &Mobj, thinkers: &Thinkers) {
    w.write_u8(MOBJ_VERSION);
    w.write_u32(serial);
    for axis in 0..3 {
        w.write_i32(mobj.pos[axis].0);
    }
    for axis in 0..3 {
        w.write_i32(mobj.mom[axis].0);
    }
    w.write_u32(mobj.angle);
    w.write_u32(mobj.last_angle);
    w.write_u16(mobj.type_id);
    w.write_u16(mobj.state.0);
    w.write_i32(mobj.tics);
    w.write_i32(mobj.health);
    w.write_u32(mobj.flags.bits());
    w.write_i32(mobj.radius.0);
    w.write_i32(mobj.height.0);
    w.write_i32(mobj.hard_radius.0);
    w.write_i32(mobj.bounce.0);
    w.write_i32(mobj.mass);
    w.write_i32(mobj.floor_z.0);
    w.write_i32(mobj.ceiling_z.0);
    w.write_u8(mobj.player.unwrap_or(0xff));
    // Back-references by serial; resolved in the fixup pass on load.
    w.write_u32(serial_of(mobj.target, thinkers));
    w.write_u32(serial_of(mobj.tracer, thinkers));
    w.write_u32(serial_of(mobj.on_mobj, thinkers));
}

fn write_ceiling(w: &mut Writer, c: &CeilingMover) {
    w.write_u32(c.sector.0);
    w.write_u8(match c.kind {
        CeilingKind::Lower => 0,
        CeilingKind::Raise => 1,
        CeilingKind::Crush => 2,
    });
    w.write_i32(c.top_height.0);
    w.write_i32(c.bottom_height.0);
    w.write_i32(c.speed.0);
    w.write_i32(c.direction);
    w.write_u8(c.crush as u8);
    w.write_i16(c.tag);
}

fn write_door(w: &mut Writer, d: &DoorMover) {
    w.write_u32(d.sector.0);
    w.write_i32(d.top_height.0);
    w.write_i32(d.speed.0);
    w.write_u8(match d.state {
        DoorState::Opening => 0,
        DoorState::Waiting => 1,
        DoorState::Closing => 2,
    });
    w.write_i32(d.top_wait);
    w.write_i32(d.top_countdown);
    w.write_i16(d.tag);
}

fn write_floor(w: &mut Writer, f: &FloorMover, world: &World) {
    w.write_u32(f.sector.0);
    w.write_i32(f.dest_height.0);
    w.write_i32(f.speed.0);
    w.write_u8(f.crush as u8);
    match f.new_special {
        Some(special) => {
            w.write_u8(1);
            w.write_i16(special);
        }
        None => w.write_u8(0),
    }
    match f.new_material {
        Some(material) => {
            w.write_u8(1);
            write_material(w, world, material);
        }
        None => w.write_u8(0),
    }
    w.write_i16(f.tag);
}

fn plat_state_byte(state: PlatState) -> u8 {
    match state {
        PlatState::Up => 0,
        PlatState::Down => 1,
        PlatState::Waiting => 2,
    }
}

fn plat_state_from(byte: u8) -> PlatState {
    match byte {
        0 => PlatState::Up,
        1 => PlatState::Down,
        _ => PlatState::Waiting,
    }
}

fn write_plat(w: &mut Writer, p: &PlatMover, in_stasis: bool) {
    w.write_u32(p.sector.0);
    w.write_i32(p.speed.0);
    w.write_i32(p.low.0);
    w.write_i32(p.high.0);
    w.write_i32(p.wait);
    w.write_i32(p.count);
    w.write_u8(plat_state_byte(p.state));
    w.write_u8(plat_state_byte(p.old_state));
    w.write_i16(p.tag);
    w.write_u8(p.one_shot as u8);
    w.write_u8(in_stasis as u8);
}

fn write_flash(w: &mut Writer, f: &FlashLight) {
    w.write_u32(f.sector.0);
    w.write_i32(f.count);
    w.write_f32(f.max_light);
    w.write_f32(f.min_light);
    w.write_i32(f.max_time);
    w.write_i32(f.min_time);
}

fn write_strobe(w: &mut Writer, s: &StrobeLight) {
    w.write_u32(s.sector.0);
    w.write_i32(s.count);
    w.write_f32(s.min_light);
    w.write_f32(s.max_light);
    w.write_i32(s.dark_time);
    w.write_i32(s.bright_time);
}

fn write_glow(w: &mut Writer, g: &GlowLight) {
    w.write_u32(g.sector.0);
    w.write_f32(g.min_light);
    w.write_f32(g.max_light);
    w.write_i32(g.direction);
}

fn write_acs(w: &mut Writer, a: &AcsThinker, world: &World, acs: &AcsSystem) {
    w.write_u8(ACS_VERSION);
    w.write_u32(serial_of(a.activator, &world.thinkers));
    w.write_i32(a.line.map(|l| l.0 as i32).unwrap_or(-1));
    w.write_i32(a.side);
    w.write_i32(acs.scripts[a.script_index].number);
    w.write_i32(a.delay_count);
    for value in &a.stack.values {
        w.write_i32(*value);
    }
    w.write_i32(a.stack.height as i32);
    for arg in &a.args {
        w.write_i32(*arg);
    }
    w.write_u32(a.pc as u32);
}

// --- Reading ---------------------------------------------------------------

/// References read from a mobj record, fixed up after all thinkers are
/// in.
struct MobjFixup {
    id: ThinkerId,
    target: u32,
    tracer: u32,
    on_mobj: u32,
}

struct AcsFixup {
    id: ThinkerId,
    activator: u32,
}

/// Restore a saved session into the world. On any error the world is
/// left partially loaded; the caller reverts to its pre-load snapshot.
pub fn read_save(
    bytes: &[u8],
    world: &mut World,
    acs: &mut AcsSystem,
    players: &mut [Player],
) -> SaveResult<SaveMetadata> {
    let mut r = Reader::new(bytes);

    if r.read_bytes(4)? != MAGIC {
        return Err(SaveError::BadMagic);
    }
    let version = r.read_u8()?;
    if !(OLDEST_READABLE_VERSION..=FORMAT_VERSION).contains(&version) {
        return Err(SaveError::UnsupportedVersion { found: version });
    }

    let description = r.read_padded(24)?;
    let _version_tag = r.read_padded(16)?;
    let skill = r.read_u8()?;
    let episode = r.read_u8()?;
    let map = r.read_u8()?;
    let mut players_present = Vec::with_capacity(MAX_PLAYERS);
    for _ in 0..MAX_PLAYERS {
        players_present.push(r.read_u8()? != 0);
    }
    let map_time =
        ((r.read_u8()? as u32) << 16) | ((r.read_u8()? as u32) << 8) | r.read_u8()? as u32;
    let game_id = r.read_string()?;

    let meta = SaveMetadata {
        description,
        version,
        skill,
        episode,
        map,
        players_present: players_present.clone(),
        map_time,
        game_id,
    };

    for (i, present) in players_present.iter().enumerate() {
        if !present {
            continue;
        }
        if let Some(player) = players.get_mut(i) {
            read_player(&mut r, player)?;
            player.in_game = true;
            // Resolved when the player's mobj record is read.
            player.mobj = None;
        }
    }

    for i in 0..MAX_WORLD_VARS {
        let value = r.read_i32()?;
        acs.set_world_var(i, value);
    }
    for i in 0..MAX_MAP_VARS {
        let value = r.read_i32()?;
        acs.set_map_var(i, value);
    }

    // Out with the current thinker population.
    world.thinkers = Thinkers::new();
    for sector in &mut world.map.sectors {
        sector.special_data = None;
    }

    let mut mobj_fixups: Vec<MobjFixup> = Vec::new();
    let mut acs_fixups: Vec<AcsFixup> = Vec::new();
    let mut serial_map: FxHashMap<u32, ThinkerId> = FxHashMap::default();

    loop {
        let class = r.read_u8()?;
        if class == TC_END {
            break;
        }
        match class {
            1 => {
                let (mobj, old_serial, target, tracer, on_mobj) = read_mobj(&mut r, version)?;
                let player_slot = mobj.player;
                let id = world.thinkers.add(ThinkerKind::Mobj(mobj));
                serial_map.insert(old_serial, id);
                mobj_fixups.push(MobjFixup {
                    id,
                    target,
                    tracer,
                    on_mobj,
                });
                if let Some(slot) = player_slot {
                    if let Some(player) = players.get_mut(slot as usize) {
                        player.mobj = Some(id);
                    }
                }
            }
            2 => {
                let c = read_ceiling(&mut r)?;
                let sector = c.sector;
                let id = world.thinkers.add(ThinkerKind::Ceiling(c));
                link_special(world, sector, id);
            }
            3 => {
                let d = read_door(&mut r)?;
                let sector = d.sector;
                let id = world.thinkers.add(ThinkerKind::Door(d));
                link_special(world, sector, id);
            }
            4 => {
                let f = read_floor(&mut r, world)?;
                let sector = f.sector;
                let id = world.thinkers.add(ThinkerKind::Floor(f));
                link_special(world, sector, id);
            }
            5 => {
                let (p, in_stasis) = read_plat(&mut r)?;
                let sector = p.sector;
                let id = world.thinkers.add(ThinkerKind::Plat(p));
                world.thinkers.set_stasis(id, in_stasis);
                link_special(world, sector, id);
            }
            6 => {
                let f = read_flash(&mut r)?;
                world.thinkers.add(ThinkerKind::Flash(f));
            }
            7 => {
                let s = read_strobe(&mut r)?;
                world.thinkers.add(ThinkerKind::Strobe(s));
            }
            8 => {
                let g = read_glow(&mut r)?;
                world.thinkers.add(ThinkerKind::Glow(g));
            }
            9 => {
                let (thinker, activator, number) = read_acs(&mut r)?;
                if let Some(index) = acs.script_index(number) {
                    let mut thinker = thinker;
                    thinker.script_index = index;
                    let id = world.thinkers.add(ThinkerKind::Acs(thinker));
                    acs.scripts[index].state = ScriptState::Running;
                    acs.scripts[index].thinker = Some(id);
                    acs_fixups.push(AcsFixup { id, activator });
                } else {
                    log::warn!("[read_save] Script #{} not in this module; dropped", number);
                }
            }
            other => {
                return Err(SaveError::UnknownThinkerClass { class: other });
            }
        }
    }

    // Map arrays.
    let sector_count = r.read_u32()? as usize;
    for i in 0..sector_count {
        let floor = r.read_i16()?;
        let ceiling = r.read_i16()?;
        let floor_mat = read_material(&mut r, world, version)?;
        let ceiling_mat = read_material(&mut r, world, version)?;
        let light = r.read_i16()?;
        let special = r.read_i16()?;
        let tag = r.read_i16()?;

        if let Some(sector) = world.map.sectors.get_mut(i) {
            sector.floor_height = Fixed::from_int(floor as i32);
            sector.ceiling_height = Fixed::from_int(ceiling as i32);
            sector.floor_material = floor_mat;
            sector.ceiling_material = ceiling_mat;
            sector.light_level = light as f32 / 255.0;
            sector.special = special;
            sector.tag = tag;
        }
    }
    let line_count = r.read_u32()? as usize;
    for i in 0..line_count {
        let flags = r.read_u32()?;
        let special = r.read_i16()?;
        let tag = r.read_i16()?;
        let mut sides = [None, None];
        for slot in &mut sides {
            if r.read_u8()? != 0 {
                let offset_x = r.read_f32()?;
                let offset_y = r.read_f32()?;
                let top = read_material(&mut r, world, version)?;
                let bottom = read_material(&mut r, world, version)?;
                let middle = read_material(&mut r, world, version)?;
                *slot = Some((offset_x, offset_y, top, bottom, middle));
            }
        }

        if let Some(line) = world.map.lines.get_mut(i) {
            line.flags = LineFlags::from_bits_truncate(flags);
            line.special = special;
            line.tag = tag;
            for (k, data) in sides.iter().enumerate() {
                let Some((ox, oy, top, bottom, middle)) = data else {
                    continue;
                };
                let side = if k == 0 {
                    Some(&mut line.front_side)
                } else {
                    line.back_side.as_mut()
                };
                if let Some(side) = side {
                    side.offset_x = *ox;
                    side.offset_y = *oy;
                    side.top_material = *top;
                    side.bottom_material = *bottom;
                    side.middle_material = *middle;
                }
            }
        }
    }

    if r.read_u8()? != CONSISTENCY_MARKER {
        return Err(SaveError::ConsistencyFailure);
    }

    // Fixup pass: serial ids back to live references.
    let resolve = |serial: u32, serial_map: &FxHashMap<u32, ThinkerId>| -> Option<ThinkerId> {
        if serial == 0 {
            return None;
        }
        let id = serial_map.get(&serial).copied();
        if id.is_none() {
            log::warn!("[read_save] Dangling mobj reference: serial {}", serial);
        }
        id
    };

    for fixup in &mobj_fixups {
        let target = resolve(fixup.target, &serial_map);
        let tracer = resolve(fixup.tracer, &serial_map);
        let on_mobj = resolve(fixup.on_mobj, &serial_map);
        if let Some(th) = world.thinkers.get_mut(fixup.id) {
            if let ThinkerKind::Mobj(mobj) = &mut th.kind {
                mobj.target = target;
                mobj.tracer = tracer;
                mobj.on_mobj = on_mobj;
            }
        }
    }
    for fixup in &acs_fixups {
        let activator = resolve(fixup.activator, &serial_map);
        if let Some(th) = world.thinkers.get_mut(fixup.id) {
            if let ThinkerKind::Acs(interp) = &mut th.kind {
                interp.activator = activator;
            }
        }
    }

    world.map_time = map_time;
    log::info!(
        "[read_save] Restored '{}' ({} thinkers)",
        meta.description,
        world.thinkers.live_count()
    );
    Ok(meta)
}

fn link_special(world: &mut World, sector: SectorId, id: ThinkerId) {
    if let Some(sector) = world.map.sectors.get_mut(sector.0 as usize) {
        sector.special_data = Some(id);
    }
}

fn read_material(r: &mut Reader, world: &mut World, version: u8) -> SaveResult<MaterialId> {
    if version < 3 {
        // Sector-number material encoding of the old format.
        let number = r.read_i16()?;
        if number <= 0 {
            return Ok(MaterialId(0));
        }
        return Ok(MaterialId(number as u16));
    }
    let name = r.read_string()?;
    Ok(world.map.materials.intern(&name))
}

fn read_player(r: &mut Reader, player: &mut Player) -> SaveResult<()> {
    player.name = r.read_string()?;
    for owned in &mut player.weapons_owned {
        *owned = r.read_u8()? != 0;
    }
    for ammo in &mut player.ammo {
        ammo.owned = r.read_i32()?;
        ammo.max = r.read_i32()?;
    }
    player.ready_weapon = WeaponType(r.read_u8()?.min(NUM_WEAPON_TYPES as u8 - 1));
    let pending = r.read_u8()?;
    player.pending_weapon = (pending != 0xff).then_some(WeaponType(pending));
    player.look_dir = r.read_f32()?;
    Ok(())
}

#[allow(clippy::type_complexity)]
fn read_mobj(r: &mut Reader, _format: u8) -> SaveResult<(Mobj, u32, u32, u32, u32)> {
    let record_version = r.read_u8()?;

    if record_version < 2 {
        // The oldest records carried the raw thinker struct inline.
        r.skip(LEGACY_THINKER_SIZE)?;
    }

    let serial = r.read_u32()?;
    let mut pos = [Fixed::ZERO; 3];
    for slot in &mut pos {
        *slot = Fixed(r.read_i32()?);
    }
    let mut mom = [Fixed::ZERO; 3];
    for slot in &mut mom {
        *slot = Fixed(r.read_i32()?);
    }
    let angle = r.read_u32()?;
    let last_angle = if record_version >= 3 { r.read_u32()? } else { angle };
    let type_id = r.read_u16()?;
    let state = StateId(r.read_u16()?);
    let tics = r.read_i32()?;
    let health = r.read_i32()?;
    let raw_flags = r.read_u32()?;
    let flags = if record_version < 3 {
        translate_legacy_flags(raw_flags)
    } else {
        MobjFlags::from_bits_truncate(raw_flags)
    };
    let radius = Fixed(r.read_i32()?);
    let height = Fixed(r.read_i32()?);
    let hard_radius = if record_version >= 3 {
        Fixed(r.read_i32()?)
    } else {
        Fixed::ZERO
    };
    let bounce = Fixed(r.read_i32()?);
    let mass = r.read_i32()?;
    let floor_z = Fixed(r.read_i32()?);
    let ceiling_z = Fixed(r.read_i32()?);
    let player_byte = r.read_u8()?;
    let target = r.read_u32()?;
    let tracer = r.read_u32()?;
    let on_mobj = r.read_u32()?;

    let mobj = Mobj {
        pos,
        mom,
        angle,
        last_angle,
        type_id,
        state,
        tics,
        health,
        flags,
        radius,
        height,
        hard_radius,
        bounce,
        mass,
        floor_z,
        ceiling_z,
        player: (player_byte != 0xff).then_some(player_byte),
        target: None,
        tracer: None,
        on_mobj: None,
        subspace: None,
        contact_line: None,
    };
    Ok((mobj, serial, target, tracer, on_mobj))
}

fn read_ceiling(r: &mut Reader) -> SaveResult<CeilingMover> {
    Ok(CeilingMover {
        sector: SectorId(r.read_u32()?),
        kind: match r.read_u8()? {
            0 => CeilingKind::Lower,
            1 => CeilingKind::Raise,
            _ => CeilingKind::Crush,
        },
        top_height: Fixed(r.read_i32()?),
        bottom_height: Fixed(r.read_i32()?),
        speed: Fixed(r.read_i32()?),
        direction: r.read_i32()?,
        crush: r.read_u8()? != 0,
        tag: r.read_i16()?,
    })
}

fn read_door(r: &mut Reader) -> SaveResult<DoorMover> {
    Ok(DoorMover {
        sector: SectorId(r.read_u32()?),
        top_height: Fixed(r.read_i32()?),
        speed: Fixed(r.read_i32()?),
        state: match r.read_u8()? {
            0 => DoorState::Opening,
            1 => DoorState::Waiting,
            _ => DoorState::Closing,
        },
        top_wait: r.read_i32()?,
        top_countdown: r.read_i32()?,
        tag: r.read_i16()?,
    })
}

fn read_floor(r: &mut Reader, world: &mut World) -> SaveResult<FloorMover> {
    let sector = SectorId(r.read_u32()?);
    let dest_height = Fixed(r.read_i32()?);
    let speed = Fixed(r.read_i32()?);
    let crush = r.read_u8()? != 0;
    let new_special = if r.read_u8()? != 0 {
        Some(r.read_i16()?)
    } else {
        None
    };
    let new_material = if r.read_u8()? != 0 {
        Some(read_material(r, world, FORMAT_VERSION)?)
    } else {
        None
    };
    let tag = r.read_i16()?;
    Ok(FloorMover {
        sector,
        dest_height,
        speed,
        crush,
        new_special,
        new_material,
        tag,
    })
}

fn read_plat(r: &mut Reader) -> SaveResult<(PlatMover, bool)> {
    let plat = PlatMover {
        sector: SectorId(r.read_u32()?),
        speed: Fixed(r.read_i32()?),
        low: Fixed(r.read_i32()?),
        high: Fixed(r.read_i32()?),
        wait: r.read_i32()?,
        count: r.read_i32()?,
        state: plat_state_from(r.read_u8()?),
        old_state: plat_state_from(r.read_u8()?),
        tag: r.read_i16()?,
        one_shot: r.read_u8()? != 0,
    };
    let in_stasis = r.read_u8()? != 0;
    Ok((plat, in_stasis))
}

fn read_flash(r: &mut Reader) -> SaveResult<FlashLight> {
    Ok(FlashLight {
        sector: SectorId(r.read_u32()?),
        count: r.read_i32()?,
        max_light: r.read_f32()?,
        min_light: r.read_f32()?,
        max_time: r.read_i32()?,
        min_time: r.read_i32()?,
    })
}

fn read_strobe(r: &mut Reader) -> SaveResult<StrobeLight> {
    Ok(StrobeLight {
        sector: SectorId(r.read_u32()?),
        count: r.read_i32()?,
        min_light: r.read_f32()?,
        max_light: r.read_f32()?,
        dark_time: r.read_i32()?,
        bright_time: r.read_i32()?,
    })
}

fn read_glow(r: &mut Reader) -> SaveResult<GlowLight> {
    Ok(GlowLight {
        sector: SectorId(r.read_u32()?),
        min_light: r.read_f32()?,
        max_light: r.read_f32()?,
        direction: r.read_i32()?,
    })
}

fn read_acs(r: &mut Reader) -> SaveResult<(AcsThinker, u32, i32)> {
    let record_version = r.read_u8()?;
    let activator = r.read_u32()?;
    let line = r.read_i32()?;
    let side = r.read_i32()?;
    let number = r.read_i32()?;
    if record_version < 2 {
        // Obsolete ignored value in the old format.
        r.skip(4)?;
    }
    let delay_count = r.read_i32()?;

    let mut stack = crate::acs::interpreter::AcsStack::default();
    for value in stack.values.iter_mut() {
        *value = r.read_i32()?;
    }
    stack.height = (r.read_i32()?.max(0) as usize).min(STACK_DEPTH);

    let mut args = [0i32; MAX_SCRIPT_ARGS];
    for arg in &mut args {
        *arg = r.read_i32()?;
    }
    let pc = r.read_u32()? as usize;

    let thinker = AcsThinker {
        script_index: 0, // resolved by the caller
        pc,
        delay_count,
        stack,
        args,
        activator: None, // resolved in the fixup pass
        line: (line >= 0).then_some(crate::world::map::LineId(line as u32)),
        side,
    };
    Ok((thinker, activator, number))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::map::{Map, Sector};

    fn meta() -> SaveMetadata {
        SaveMetadata {
            description: "quick save".to_string(),
            version: FORMAT_VERSION,
            skill: 2,
            episode: 1,
            map: 1,
            players_present: vec![false; MAX_PLAYERS],
            map_time: 0x0304_05,
            game_id: "ember-demo".to_string(),
        }
    }

    fn world_with_sector() -> World {
        let mut map = Map::empty("MAP01");
        map.sectors.push(Sector::new(0.0, 128.0));
        let mut world = World::new(map);
        world.mobj_info.push(Default::default());
        world
    }

    #[test]
    fn test_self_referencing_target_round_trip() {
        // Scenario: one mobj whose target is itself; save, load, and the
        // reference must resolve to the same live mobj under a fresh
        // serial.
        let mut world = world_with_sector();
        let id = world
            .spawn_mobj(0, Fixed::from_int(10), Fixed::from_int(10), Fixed::ZERO, 0)
            .unwrap();
        if let Some(th) = world.thinkers.get_mut(id) {
            if let ThinkerKind::Mobj(m) = &mut th.kind {
                m.target = Some(id);
            }
        }
        let old_serial = world.thinkers.get(id).unwrap().serial;

        let acs = AcsSystem::new();
        let mut players = vec![Player::default(); MAX_PLAYERS];
        let bytes = write_save(&meta(), &world, &acs, &players);

        let mut restored = world_with_sector();
        // Burn some serials so the reassigned one differs.
        for _ in 0..5 {
            let burn = restored
                .spawn_mobj(0, Fixed::ZERO, Fixed::ZERO, Fixed::ZERO, 0)
                .unwrap();
            restored.thinkers.mark_for_removal(burn);
        }
        restored.thinkers.sweep();

        let mut acs2 = AcsSystem::new();
        read_save(&bytes, &mut restored, &mut acs2, &mut players).unwrap();

        assert_eq!(restored.thinkers.live_count(), 1);
        let (new_id, th) = restored.thinkers.iter_live().next().unwrap();
        let ThinkerKind::Mobj(m) = &th.kind else {
            panic!("not a mobj");
        };
        assert_eq!(m.target, Some(new_id));
        assert_ne!(th.serial, old_serial);
    }

    #[test]
    fn test_unknown_thinker_class_aborts() {
        let world = world_with_sector();
        let acs = AcsSystem::new();
        let mut players = vec![Player::default(); MAX_PLAYERS];
        let mut bytes = write_save(&meta(), &world, &acs, &players);

        // Find the thinker terminator and corrupt it into a bogus class
        // with no payload behind it.
        let tc_end_at = bytes.len()
            - 1 // consistency marker
            - 4 // line count
            - {
                // one sector record
                2 + 2
                    + (2 + 1) // "-" floor material
                    + (2 + 1) // "-" ceiling material
                    + 2 + 2 + 2
            }
            - 4 // sector count
            - 1; // tc_end itself
        assert_eq!(bytes[tc_end_at], TC_END);
        bytes[tc_end_at] = 200;

        let mut restored = world_with_sector();
        let mut acs2 = AcsSystem::new();
        let result = read_save(&bytes, &mut restored, &mut acs2, &mut players);
        assert!(matches!(
            result,
            Err(SaveError::UnknownThinkerClass { class: 200 })
        ));
    }

    #[test]
    fn test_version_gate() {
        let world = world_with_sector();
        let acs = AcsSystem::new();
        let mut players = vec![Player::default(); MAX_PLAYERS];
        let mut bytes = write_save(&meta(), &world, &acs, &players);
        bytes[4] = 99;

        let mut restored = world_with_sector();
        let mut acs2 = AcsSystem::new();
        assert!(matches!(
            read_save(&bytes, &mut restored, &mut acs2, &mut players),
            Err(SaveError::UnsupportedVersion { found: 99 })
        ));
    }

    #[test]
    fn test_metadata_round_trip() {
        let world = world_with_sector();
        let acs = AcsSystem::new();
        let mut players = vec![Player::default(); MAX_PLAYERS];
        let bytes = write_save(&meta(), &world, &acs, &players);

        let mut restored = world_with_sector();
        let mut acs2 = AcsSystem::new();
        let read = read_save(&bytes, &mut restored, &mut acs2, &mut players).unwrap();
        assert_eq!(read.description, "quick save");
        assert_eq!(read.map_time, 0x0304_05);
        assert_eq!(read.game_id, "ember-demo");
    }

    #[test]
    fn test_world_vars_restored() {
        let world = world_with_sector();
        let mut acs = AcsSystem::new();
        acs.set_world_var(5, 1234);
        acs.set_map_var(2, 77);
        let mut players = vec![Player::default(); MAX_PLAYERS];
        let bytes = write_save(&meta(), &world, &acs, &players);

        let mut restored = world_with_sector();
        let mut acs2 = AcsSystem::new();
        read_save(&bytes, &mut restored, &mut acs2, &mut players).unwrap();
        assert_eq!(acs2.world_var(5), 1234);
        assert_eq!(acs2.map_var(2), 77);
    }

    #[test]
    fn test_plat_and_sector_link_round_trip() {
        let mut world = world_with_sector();
        world.map.sectors[0].tag = 3;
        let ids = crate::world::movers::spawn_plat(
            &mut world.map,
            &mut world.thinkers,
            3,
            Fixed::from_int(2),
            8,
        );
        world.thinkers.set_stasis(ids[0], true);

        let acs = AcsSystem::new();
        let mut players = vec![Player::default(); MAX_PLAYERS];
        let bytes = write_save(&meta(), &world, &acs, &players);

        let mut restored = world_with_sector();
        let mut acs2 = AcsSystem::new();
        read_save(&bytes, &mut restored, &mut acs2, &mut players).unwrap();

        let (id, th) = restored.thinkers.iter_live().next().unwrap();
        assert!(matches!(th.kind, ThinkerKind::Plat(_)));
        assert!(th.in_stasis);
        assert_eq!(restored.map.sectors[0].special_data, Some(id));
    }

    #[test]
    fn test_legacy_flag_translation() {
        // A version-2 style flag word: legacy SOLID|CORPSE bits.
        let flags = translate_legacy_flags(0x0010_0002);
        assert!(flags.contains(MobjFlags::SOLID));
        assert!(flags.contains(MobjFlags::CORPSE));
        assert!(!flags.contains(MobjFlags::SHOOTABLE));
    }
}
