//! The session owns every simulation subsystem and drives the tick in
//! the canonical order: network ingest, thinker advance, particles,
//! scripts, lighting, fix emission.

use crate::acs::{interpreter, AcsEnv, AcsModule, AcsSystem};
use crate::bias::BiasEngine;
use crate::constants::save::FORMAT_VERSION;
use crate::constants::tick::TICK_SECONDS;
use crate::error::CoreResult;
use crate::game::config::GameConfig;
use crate::game::console;
use crate::input::{BindingSystem, InputEvent};
use crate::network::ServerSession;
use crate::particles::{generator_think, GenContext};
use crate::persistence::{read_save, write_save, SaveMetadata};
use crate::rng::GameRng;
use crate::wad::ContentStore;
use crate::world::map::Map;
use crate::world::player::{Player, WeaponInfo, WeaponPrefs, NUM_WEAPON_TYPES};
use crate::world::thinker::{ThinkOutcome, ThinkerId, ThinkerKind};
use crate::world::World;
use crate::zone::{PurgeTag, Zone};

pub struct GameSession {
    pub config: GameConfig,
    pub zone: Zone,
    pub store: ContentStore,
    pub world: World,
    pub acs: AcsSystem,
    pub bias: BiasEngine,
    pub bindings: BindingSystem,
    pub server: ServerSession,
    pub rng: GameRng,
    pub skill: u8,
    pub episode: u8,
    pub map_number: u8,
    pub weapon_info: [WeaponInfo; NUM_WEAPON_TYPES],
    pub weapon_prefs: WeaponPrefs,
    /// Console whose view the local renderer follows.
    pub view_console: u8,
    pub view_mode: i32,
    pub view_lock: Option<ThinkerId>,
    /// Full lock (angles too) vs position only.
    pub view_lock_full: bool,
}

impl GameSession {
    pub fn new(config: GameConfig) -> anyhow::Result<GameSession> {
        config.validate()?;

        let mut bias = BiasEngine::new();
        bias.light_speed = config.bias.light_speed;
        bias.ignore_limit = config.bias.ignore_limit;
        bias.use_sight_check = config.bias.sight_check;

        let mut server = ServerSession::new(&config.net.game_id, &config.net.password);
        server.warp_limit = config.net.warp_limit;

        let weapon_prefs = WeaponPrefs {
            weapon_switch: config.weapon_auto_switch,
            ammo_switch: config.ammo_auto_switch,
            no_switch_while_firing: config.no_weapon_auto_switch_if_firing,
            ..WeaponPrefs::default()
        };

        let rng = GameRng::from_seed(config.rng_seed);

        log::info!("[GameSession::new] Session initialization complete");
        Ok(GameSession {
            config,
            zone: Zone::new(),
            store: ContentStore::new(),
            world: World::new(Map::empty("NONE")),
            acs: AcsSystem::new(),
            bias,
            bindings: BindingSystem::new(),
            server,
            rng,
            skill: 2,
            episode: 1,
            map_number: 1,
            weapon_info: [WeaponInfo::default(); NUM_WEAPON_TYPES],
            weapon_prefs,
            view_console: 0,
            view_mode: 0,
            view_lock: None,
            view_lock_full: false,
        })
    }

    /// Load all configured archives. Fatal when no IWAD turns up in the
    /// file list or the search list.
    pub fn init_content(&mut self) -> CoreResult<()> {
        let mut files: Vec<&str> = self.config.files.iter().map(|s| s.as_str()).collect();
        let search: Vec<&str> = self.config.iwad_search.iter().map(|s| s.as_str()).collect();
        for candidate in search {
            if ContentStore::is_iwad_file(candidate) {
                files.push(candidate);
                break;
            }
        }
        self.store.init(&files)?;
        self.store.end_startup();
        log::info!(
            "[GameSession::init_content] {} lumps, IWAD crc {:08x}",
            self.store.num_lumps(),
            self.store.iwad_crc()
        );
        Ok(())
    }

    /// Install a new map: zone purge, fresh world (type tables carry
    /// over), new script module, deferred script starts.
    pub fn load_map(&mut self, map: Map, module: Option<AcsModule>) {
        self.zone.purge(PurgeTag::Map);

        let map_id = map.id.clone();
        let mobj_info = std::mem::take(&mut self.world.mobj_info);
        let states = std::mem::take(&mut self.world.states);
        self.world = World::new(map);
        self.world.mobj_info = mobj_info;
        self.world.states = states;

        if let Some(module) = module {
            self.acs.set_module(module);
        }
        self.acs.run_deferred(&map_id, &mut self.world.thinkers);
        log::info!("[GameSession::load_map] {} is ready", map_id);
    }

    /// Host-pushed raw input.
    pub fn post_event(&mut self, event: InputEvent) {
        self.bindings.respond(&event);
    }

    /// One whole simulation tick.
    pub fn tick(&mut self, now_ms: u64) {
        // Synthetic releases from class toggles, then queued commands.
        self.bindings.flush_posted();
        self.drain_commands();

        // Network ingest, in receive order.
        self.server.get_packets(&mut self.world, now_ms);

        // Thinker advance; finished movers wake tag-waiting scripts.
        let server = &self.server;
        let finished_tags = self.world.run_thinkers(&mut self.rng, &|console| {
            server
                .players
                .get(console as usize)
                .map(|p| p.player.has_intent())
                .unwrap_or(false)
        });
        for tag in finished_tags {
            self.acs.tag_finished(tag);
        }

        self.run_generator_pass();
        self.run_acs_pass();

        // Script output reaches players as console text.
        for msg in std::mem::take(&mut self.acs.messages) {
            match msg.target {
                Some(console) => self.server.send_text(console, &msg.text),
                None => {
                    let consoles: Vec<u8> = self
                        .server
                        .players
                        .iter()
                        .enumerate()
                        .filter(|(_, p)| p.player.in_game)
                        .map(|(i, _)| i as u8)
                        .collect();
                    for console in consoles {
                        self.server.send_text(console, &msg.text);
                    }
                }
            }
        }

        // Lighting bookkeeping for the coming frame.
        self.bias.advance_time();
        self.bias.begin_frame();

        // Smoothing, sharp-tick angle snapshots and fix emission.
        self.server.ticker(&mut self.world, TICK_SECONDS);

        self.drain_commands();
    }

    /// Execute commands queued by bindings and by the remote console.
    fn drain_commands(&mut self) {
        let mut commands = std::mem::take(&mut self.bindings.executed);
        commands.extend(std::mem::take(&mut self.server.pending_commands));
        for command in commands {
            let output = console::execute(self, &command);
            if !output.is_empty() {
                log::info!("[console] {}", output.trim_end());
            }
        }
    }

    fn run_generator_pass(&mut self) {
        let ids: Vec<ThinkerId> = self
            .world
            .thinkers
            .iter_live()
            .filter(|(_, th)| {
                matches!(th.kind, ThinkerKind::Generator(_)) && !th.in_stasis
            })
            .map(|(id, _)| id)
            .collect();

        for id in ids {
            let Some(mut th) = self.world.thinkers.take(id) else {
                continue;
            };
            let outcome = match &mut th.kind {
                ThinkerKind::Generator(gen) => {
                    let mut ctx = GenContext {
                        map: &self.world.map,
                        thinkers: &self.world.thinkers,
                        rng: &mut self.rng,
                        global_rate: self.config.particle_rate,
                    };
                    generator_think(gen, &mut ctx)
                }
                _ => ThinkOutcome::Keep,
            };
            self.world.thinkers.put_back(id, th);
            if outcome == ThinkOutcome::Remove {
                self.world.thinkers.mark_for_removal(id);
            }
        }
        self.world.thinkers.sweep();
    }

    fn run_acs_pass(&mut self) {
        let ids: Vec<ThinkerId> = self
            .world
            .thinkers
            .iter_live()
            .filter(|(_, th)| matches!(th.kind, ThinkerKind::Acs(_)))
            .map(|(id, _)| id)
            .collect();

        for id in ids {
            self.step_script(id);
        }
        // Scripts woken mid-pass get their step within the same tick.
        loop {
            let woken = self.acs.take_woken();
            if woken.is_empty() {
                break;
            }
            for id in woken {
                self.step_script(id);
            }
        }
        self.world.thinkers.sweep();
    }

    fn step_script(&mut self, id: ThinkerId) {
        let Some(mut th) = self.world.thinkers.take(id) else {
            return;
        };
        let outcome = match &mut th.kind {
            ThinkerKind::Acs(interp) => {
                let players_in_game = self.server.num_players() as i32;
                let is_netgame = self.server.num_connected() > 0;
                let mut env = AcsEnv {
                    map: &mut self.world.map,
                    thinkers: &mut self.world.thinkers,
                    rng: &mut self.rng,
                    players_in_game,
                    is_netgame,
                    deathmatch: false,
                    skill: self.skill as i32,
                    map_time: self.world.map_time,
                };
                interpreter::think(interp, &mut self.acs, &mut env)
            }
            _ => ThinkOutcome::Keep,
        };
        self.world.thinkers.put_back(id, th);
        if outcome == ThinkOutcome::Remove {
            self.world.thinkers.mark_for_removal(id);
        }
    }

    fn players_snapshot(&self) -> Vec<Player> {
        self.server.players.iter().map(|p| p.player.clone()).collect()
    }

    pub fn save_game(&self, description: &str) -> Vec<u8> {
        let meta = SaveMetadata {
            description: description.to_string(),
            version: FORMAT_VERSION,
            skill: self.skill,
            episode: self.episode,
            map: self.map_number,
            players_present: self.server.players.iter().map(|p| p.player.in_game).collect(),
            map_time: self.world.map_time,
            game_id: self.config.net.game_id.clone(),
        };
        write_save(&meta, &self.world, &self.acs, &self.players_snapshot())
    }

    /// Restore a savegame. On failure the pre-load snapshot is read
    /// back, so a bad file never costs the running session.
    pub fn load_game(&mut self, bytes: &[u8]) -> CoreResult<SaveMetadata> {
        let snapshot = self.save_game("pre-load snapshot");
        let mut players = self.players_snapshot();

        match read_save(bytes, &mut self.world, &mut self.acs, &mut players) {
            Ok(meta) => {
                self.apply_players(players);
                self.skill = meta.skill;
                self.episode = meta.episode;
                self.map_number = meta.map;
                Ok(meta)
            }
            Err(err) => {
                log::error!("[GameSession::load_game] {}; reverting", err);
                let mut players = self.players_snapshot();
                if let Err(revert) =
                    read_save(&snapshot, &mut self.world, &mut self.acs, &mut players)
                {
                    // The snapshot came from ourselves; this should be
                    // impossible, and the map must be restarted.
                    log::error!("[GameSession::load_game] Snapshot revert failed: {}", revert);
                } else {
                    self.apply_players(players);
                }
                Err(err.into())
            }
        }
    }

    fn apply_players(&mut self, players: Vec<Player>) {
        for (slot, player) in self.server.players.iter_mut().zip(players) {
            slot.player = player;
        }
    }
}
