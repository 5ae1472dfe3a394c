//! Console command surface of the core: binding management, debug
//! spawning, view control and session queries.

use crate::fixed::{Angle, Fixed};
use crate::game::session::GameSession;
use crate::input::events::{event_from_text, EventType};

/// Split a command line into words, honoring double quotes.
fn tokenize(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for ch in line.chars() {
        match ch {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Execute one console command against the session. Returns the text
/// output (possibly empty).
pub fn execute(session: &mut GameSession, line: &str) -> String {
    let words = tokenize(line);
    let Some(name) = words.first() else {
        return String::new();
    };
    let args: Vec<&str> = words.iter().skip(1).map(|s| s.as_str()).collect();

    match name.to_ascii_lowercase().as_str() {
        "bind" => cmd_bind(session, &args, false, false),
        "safebind" => cmd_bind(session, &args, true, false),
        "bindr" => cmd_bind(session, &args, false, true),
        "safebindr" => cmd_bind(session, &args, true, true),
        "clearbindings" => {
            session.bindings.clear_all();
            "All bindings cleared.".to_string()
        }
        "delbind" => cmd_delbind(session, &args),
        "listbindings" => session.bindings.write_bindings(),
        "listbindclasses" => {
            let mut out = String::new();
            for class in session.bindings.classes() {
                out.push_str(&format!(
                    "{}: {} is {}\n",
                    class.id,
                    class.name,
                    if class.active { "On" } else { "Off" }
                ));
            }
            out
        }
        "enablebindclass" => cmd_enable_bind_class(session, &args),
        "spawnmobj" => cmd_spawn_mobj(session, &args),
        "makelocal" => cmd_make_local(session, &args),
        "setcamera" => cmd_set_camera(session, &args),
        "setviewmode" => {
            session.view_mode = args
                .first()
                .and_then(|a| a.parse().ok())
                .unwrap_or((session.view_mode + 1) % 3);
            format!("View mode {}.", session.view_mode)
        }
        "setviewlock" => cmd_set_view_lock(session, &args),
        "lockmode" => {
            session.view_lock_full = args.first() == Some(&"1");
            format!(
                "Lock mode {}.",
                if session.view_lock_full { "full" } else { "position" }
            )
        }
        "logout" => {
            if session.server.logout() {
                "Remote user logged out.".to_string()
            } else {
                String::new()
            }
        }
        "cyclespy" => cmd_cycle_spy(session),
        "listmaps" => cmd_list_maps(session),
        other => {
            log::debug!("[console::execute] Unknown command '{}'", other);
            String::new()
        }
    }
}

/// `bind [class] <event> ["command"]`. Without a command, the event is
/// unbound in the class. `safe` refuses to overwrite, `repeat` also
/// binds the key-repeat event.
fn cmd_bind(session: &mut GameSession, args: &[&str], safe: bool, repeat: bool) -> String {
    if args.is_empty() {
        return "Usage: bind (class) (event) (command)".to_string();
    }

    let (class, rest) = match session.bindings.class_by_name(args[0]) {
        Some(class) => (class, &args[1..]),
        None => (0, args),
    };
    let Some(&event_text) = rest.first() else {
        return "Usage: bind (class) (event) (command)".to_string();
    };
    let Some(event) = event_from_text(event_text) else {
        return format!("Bad event: {}", event_text);
    };
    let command = rest.get(1).copied();

    if safe && command.is_some() && session.bindings.is_bound(&event, class) {
        // Safe variants never overwrite an existing binding.
        return String::new();
    }

    session.bindings.bind(event, command, class);
    if repeat && event.ty == EventType::KeyDown {
        let mut rep = event;
        rep.ty = EventType::KeyRepeat;
        session.bindings.bind(rep, command, class);
    }
    String::new()
}

fn cmd_delbind(session: &mut GameSession, args: &[&str]) -> String {
    if args.is_empty() {
        return "Usage: delbind (cmd) ...".to_string();
    }
    for command in args {
        session.bindings.clear_command(command, None);
    }
    String::new()
}

fn cmd_enable_bind_class(session: &mut GameSession, args: &[&str]) -> String {
    let Some(&class_name) = args.first() else {
        let mut out = String::new();
        for class in session.bindings.classes() {
            out.push_str(&format!(
                "{}: {} is {}\n",
                class.id,
                class.name,
                if class.active { "On" } else { "Off" }
            ));
        }
        out.push_str("Usage: enablebindclass (class) (1=On 0=Off, blank to toggle)\n");
        return out;
    };
    let Some(class) = session.bindings.class_by_name(class_name) else {
        return "Not a valid binding class. Enter listbindclasses.".to_string();
    };
    let mode = args.get(1).map(|v| *v != "0");
    session.bindings.set_class_active(class, mode);
    // Dispatch the synthetic releases right away so server-side command
    // state stays paired.
    session.bindings.flush_posted();
    String::new()
}

/// `spawnmobj <type> <x> <y> <z|floor|ceil|random> [angle]`
fn cmd_spawn_mobj(session: &mut GameSession, args: &[&str]) -> String {
    if args.len() < 4 {
        return "Usage: spawnmobj (type) (x) (y) (z|floor|ceil|random) (angle)".to_string();
    }

    let type_id = match args[0].parse::<u16>() {
        Ok(id) => id,
        Err(_) => {
            // Accept a type name from the preloaded table.
            match session
                .world
                .mobj_info
                .iter()
                .position(|info| info.name.eq_ignore_ascii_case(args[0]))
            {
                Some(i) => i as u16,
                None => return format!("Unknown mobj type: {}", args[0]),
            }
        }
    };

    let Ok(x) = args[1].parse::<f64>() else {
        return format!("Bad coordinate: {}", args[1]);
    };
    let Ok(y) = args[2].parse::<f64>() else {
        return format!("Bad coordinate: {}", args[2]);
    };
    let x = Fixed::from_float(x);
    let y = Fixed::from_float(y);

    let (floor, ceiling) = session
        .world
        .map
        .sector_at(x, y)
        .map(|id| {
            let s = session.world.map.sector(id);
            (s.floor_height, s.ceiling_height)
        })
        .unwrap_or((Fixed::ZERO, Fixed::from_int(128)));

    let z = match args[3] {
        "floor" => floor,
        "ceil" => ceiling,
        "random" => {
            let span = (ceiling - floor).to_float();
            floor + Fixed::from_float(session.rng.rand_float() as f64 * span)
        }
        value => match value.parse::<f64>() {
            Ok(v) => Fixed::from_float(v),
            Err(_) => return format!("Bad z: {}", value),
        },
    };

    let angle: Angle = args
        .get(4)
        .and_then(|a| a.parse::<f64>().ok())
        .map(|degrees| ((degrees / 360.0) * u32::MAX as f64) as Angle)
        .unwrap_or(0);

    match session.world.spawn_mobj(type_id, x, y, z, angle) {
        Ok(id) => {
            log::debug!("[console::spawnmobj] Spawned {:?}", id);
            String::new()
        }
        Err(e) => e.to_string(),
    }
}

fn cmd_make_local(session: &mut GameSession, args: &[&str]) -> String {
    let Some(console) = args.first().and_then(|a| a.parse::<usize>().ok()) else {
        return "Usage: makelocal (console)".to_string();
    };
    let Some(plr) = session.server.players.get_mut(console) else {
        return format!("Invalid console: {}", console);
    };
    plr.player.in_game = true;
    plr.player.flags.insert(crate::world::player::PlayerFlags::LOCAL);
    format!("Player {} is now local.", console)
}

fn cmd_set_camera(session: &mut GameSession, args: &[&str]) -> String {
    let Some(console) = args.first().and_then(|a| a.parse::<usize>().ok()) else {
        return "Usage: setcamera (console)".to_string();
    };
    let Some(plr) = session.server.players.get_mut(console) else {
        return format!("Invalid console: {}", console);
    };
    plr.player
        .flags
        .toggle(crate::world::player::PlayerFlags::CAMERA);
    format!(
        "Camera mode {} for player {}.",
        if plr
            .player
            .flags
            .contains(crate::world::player::PlayerFlags::CAMERA)
        {
            "on"
        } else {
            "off"
        },
        console
    )
}

/// `setviewlock <mobj-serial> [player]`: follow a live mobj.
fn cmd_set_view_lock(session: &mut GameSession, args: &[&str]) -> String {
    let Some(serial) = args.first().and_then(|a| a.parse::<u32>().ok()) else {
        session.view_lock = None;
        return "View lock cleared.".to_string();
    };
    if let Some(console) = args.get(1).and_then(|a| a.parse::<u8>().ok()) {
        session.view_console = console;
    }
    match session.world.thinkers.find_by_serial(serial) {
        Some(id) => {
            session.view_lock = Some(id);
            String::new()
        }
        None => format!("No thinker with serial {}.", serial),
    }
}

fn cmd_cycle_spy(session: &mut GameSession) -> String {
    let count = session.server.players.len() as u8;
    for step in 1..=count {
        let candidate = (session.view_console + step) % count;
        if session.server.players[candidate as usize].player.in_game {
            session.view_console = candidate;
            return format!("Now viewing player {}.", candidate);
        }
    }
    "Nobody to spy on.".to_string()
}

/// List map marker lumps (`MAPxx` and `ExMx`) in the content store.
fn cmd_list_maps(session: &mut GameSession) -> String {
    let mut out = String::new();
    for i in 0..session.store.num_lumps() {
        let Some(name) = session.store.lump_name(i) else {
            continue;
        };
        let text = name.as_str();
        let is_mapxx = text.len() == 5
            && text.starts_with("MAP")
            && text[3..].bytes().all(|b| b.is_ascii_digit());
        let is_exmy = text.len() == 4
            && text.starts_with('E')
            && text.as_bytes()[2] == b'M'
            && text.as_bytes()[1].is_ascii_digit()
            && text.as_bytes()[3].is_ascii_digit();
        if is_mapxx || is_exmy {
            out.push_str(text);
            out.push('\n');
        }
    }
    if out.is_empty() {
        out.push_str("No maps loaded.\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::config::GameConfig;
    use crate::world::map::{Map, Sector, SectorId, Subspace};

    fn session() -> GameSession {
        let mut session = GameSession::new(GameConfig::default()).unwrap();
        let mut map = Map::empty("MAP01");
        map.sectors.push(Sector::new(0.0, 128.0));
        map.subspaces.push(Subspace {
            sector: SectorId(0),
            bounds: (-1024.0, -1024.0, 1024.0, 1024.0),
            has_geometry: true,
        });
        session.load_map(map, None);
        session.world.mobj_info.push(crate::world::mobj::MobjInfo {
            name: "IMP".to_string(),
            ..Default::default()
        });
        session
    }

    #[test]
    fn test_tokenize_respects_quotes() {
        assert_eq!(
            tokenize("bind game +K \"+attack now\""),
            vec!["bind", "game", "+K", "+attack now"]
        );
    }

    #[test]
    fn test_bind_and_listbindings() {
        let mut s = session();
        execute(&mut s, "bind game +K \"+attack\"");
        let listing = execute(&mut s, "listbindings");
        assert!(listing.contains("+attack"));
        assert!(listing.contains("game"));
    }

    #[test]
    fn test_spawnmobj_on_floor() {
        let mut s = session();
        assert_eq!(execute(&mut s, "spawnmobj IMP 10 10 floor 90"), "");
        assert_eq!(s.world.mobj_count(0), 1);
    }

    #[test]
    fn test_spawnmobj_unknown_type() {
        let mut s = session();
        let out = execute(&mut s, "spawnmobj NOPE 0 0 floor");
        assert!(out.contains("Unknown mobj type"));
    }

    #[test]
    fn test_enablebindclass_lists_without_args() {
        let mut s = session();
        let out = execute(&mut s, "enablebindclass");
        assert!(out.contains("game is On"));
        assert!(out.contains("map is Off"));

        execute(&mut s, "enablebindclass map 1");
        let out = execute(&mut s, "listbindclasses");
        assert!(out.contains("map is On"));
    }

    #[test]
    fn test_cyclespy_finds_next_player() {
        let mut s = session();
        execute(&mut s, "makelocal 2");
        let out = execute(&mut s, "cyclespy");
        assert!(out.contains("player 2"));
    }
}
