//! The script system: owns the compiled module, the script table, the
//! world/map variable scopes and deferred cross-map start requests.

use crate::acs::interpreter::AcsThinker;
use crate::acs::module::AcsModule;
use crate::acs::script::{Script, ScriptState};
use crate::acs::{AcsError, AcsResult};
use crate::constants::acs::{MAX_MAP_VARS, MAX_SCRIPT_ARGS, MAX_START_ARGS, MAX_WORLD_VARS};
use crate::fixed::Fixed;
use crate::rng::GameRng;
use crate::world::map::{LineId, Map};
use crate::world::movers;
use crate::world::thinker::{ThinkerId, ThinkerKind, Thinkers};

/// A message produced by the print builder, for the host to display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcsMessage {
    pub text: String,
    /// Highlighted broadcast (`EndPrintBold`).
    pub bold: bool,
    /// Specific player console, or None for everybody.
    pub target: Option<u8>,
}

/// A sound trigger produced by a script, for the audio host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundEvent {
    pub name: String,
    pub volume: i32,
}

/// A script start requested for another map; runs when that map loads.
#[derive(Debug, Clone)]
pub struct DeferredTask {
    pub map: String,
    pub script: i32,
    pub args: [u8; MAX_START_ARGS],
}

/// Mutable world access granted to executing scripts.
pub struct AcsEnv<'a> {
    pub map: &'a mut Map,
    pub thinkers: &'a mut Thinkers,
    pub rng: &'a mut GameRng,
    pub players_in_game: i32,
    pub is_netgame: bool,
    pub deathmatch: bool,
    pub skill: i32,
    pub map_time: u32,
}

impl AcsEnv<'_> {
    pub fn game_type(&self) -> i32 {
        if !self.is_netgame {
            0
        } else if self.deathmatch {
            2
        } else {
            1
        }
    }

    pub fn mobj_count(&self, type_id: i32) -> i32 {
        self.thinkers
            .iter_live()
            .filter(|(_, th)| match &th.kind {
                ThinkerKind::Mobj(m) => type_id == 0 || m.type_id as i32 == type_id,
                _ => false,
            })
            .count() as i32
    }

    /// The console of the player owning a mobj, if any.
    pub fn player_of(&self, id: Option<ThinkerId>) -> Option<u8> {
        match &self.thinkers.get(id?)?.kind {
            ThinkerKind::Mobj(m) => m.player,
            _ => None,
        }
    }
}

pub struct AcsSystem {
    pub module: AcsModule,
    pub scripts: Vec<Script>,
    map_vars: [i32; MAX_MAP_VARS],
    world_vars: [i32; MAX_WORLD_VARS],
    pub print_buffer: String,
    pub messages: Vec<AcsMessage>,
    pub sounds: Vec<SoundEvent>,
    deferred: Vec<DeferredTask>,
    /// Thinkers of scripts woken this tick; they get a same-tick step.
    woken: Vec<ThinkerId>,
}

impl AcsSystem {
    pub fn new() -> AcsSystem {
        AcsSystem {
            module: AcsModule::default(),
            scripts: Vec::new(),
            map_vars: [0; MAX_MAP_VARS],
            world_vars: [0; MAX_WORLD_VARS],
            print_buffer: String::new(),
            messages: Vec::new(),
            sounds: Vec::new(),
            deferred: Vec::new(),
            woken: Vec::new(),
        }
    }

    /// Install the compiled module of the just-loaded map and rebuild
    /// the script table. Map variables reset; world variables persist.
    pub fn set_module(&mut self, module: AcsModule) {
        self.scripts = module
            .entry_points()
            .iter()
            .enumerate()
            .map(|(i, ep)| Script::new(ep.script_number, i))
            .collect();
        self.module = module;
        self.map_vars = [0; MAX_MAP_VARS];
        log::debug!(
            "[AcsSystem::set_module] {} scripts registered",
            self.scripts.len()
        );
    }

    pub fn map_var(&self, index: usize) -> i32 {
        self.map_vars.get(index).copied().unwrap_or(0)
    }

    pub fn set_map_var(&mut self, index: usize, value: i32) {
        if let Some(slot) = self.map_vars.get_mut(index) {
            *slot = value;
        }
    }

    pub fn world_var(&self, index: usize) -> i32 {
        self.world_vars.get(index).copied().unwrap_or(0)
    }

    pub fn set_world_var(&mut self, index: usize, value: i32) {
        if let Some(slot) = self.world_vars.get_mut(index) {
            *slot = value;
        }
    }

    pub fn script_index(&self, number: i32) -> Option<usize> {
        self.scripts.iter().position(|s| s.number == number)
    }

    /// Start a script. A request for another map is deferred until that
    /// map loads. Returns false when the script is already active.
    pub fn start_script(
        &mut self,
        number: i32,
        args: [u8; MAX_START_ARGS],
        activator: Option<ThinkerId>,
        line: Option<LineId>,
        side: i32,
        target_map: Option<&str>,
        current_map: &str,
        thinkers: &mut Thinkers,
    ) -> AcsResult<bool> {
        if let Some(map) = target_map {
            if !map.eq_ignore_ascii_case(current_map) {
                self.deferred.push(DeferredTask {
                    map: map.to_string(),
                    script: number,
                    args,
                });
                return Ok(true);
            }
        }

        let index = self
            .script_index(number)
            .ok_or(AcsError::UnknownScript { number })?;

        match self.scripts[index].state {
            ScriptState::Suspended => {
                // Resume where it left off.
                self.scripts[index].state = ScriptState::Running;
                Ok(true)
            }
            ScriptState::Inactive => {
                let ep = &self.module.entry_points()[self.scripts[index].entry_point];
                let mut thinker_args = [0i32; MAX_SCRIPT_ARGS];
                for i in 0..ep.arg_count.min(MAX_START_ARGS) {
                    thinker_args[i] = args[i] as i32;
                }

                let id = thinkers.add(ThinkerKind::Acs(AcsThinker {
                    script_index: index,
                    pc: ep.address,
                    delay_count: 0,
                    stack: Default::default(),
                    args: thinker_args,
                    activator,
                    line,
                    side,
                }));
                self.scripts[index].state = ScriptState::Running;
                self.scripts[index].thinker = Some(id);
                Ok(true)
            }
            _ => Ok(false), // Already running or waiting.
        }
    }

    /// Flag a script for termination; its thinker cleans up on its next
    /// think and wakes any waiters.
    pub fn terminate_script(&mut self, number: i32) -> bool {
        if let Some(index) = self.script_index(number) {
            if !matches!(
                self.scripts[index].state,
                ScriptState::Inactive | ScriptState::Terminating
            ) {
                self.scripts[index].state = ScriptState::Terminating;
                return true;
            }
        }
        false
    }

    pub fn suspend_script(&mut self, number: i32) -> bool {
        if let Some(index) = self.script_index(number) {
            if self.scripts[index].is_running() {
                self.scripts[index].state = ScriptState::Suspended;
                return true;
            }
        }
        false
    }

    /// Called by the waiter's interpreter. Returns false (no wait) when
    /// the target script is already inactive, so the waiter continues on
    /// the same tick.
    pub fn wait_for_script(&mut self, waiter_index: usize, number: i32) -> bool {
        let target_active = self
            .script_index(number)
            .map(|i| self.scripts[i].state != ScriptState::Inactive)
            .unwrap_or(false);
        if !target_active {
            return false;
        }
        self.scripts[waiter_index].state = ScriptState::WaitingForScript(number);
        true
    }

    /// A tagged sector's mover finished; wake tag waiters.
    pub fn tag_finished(&mut self, tag: i16) {
        let mut woken = Vec::new();
        for script in &mut self.scripts {
            if script.resume_if_waiting_for_tag(tag) {
                woken.extend(script.thinker);
            }
        }
        self.woken.extend(woken);
    }

    pub fn polyobj_finished(&mut self, po: i16) {
        let mut woken = Vec::new();
        for script in &mut self.scripts {
            if script.resume_if_waiting_for_polyobj(po) {
                woken.extend(script.thinker);
            }
        }
        self.woken.extend(woken);
    }

    /// A script went inactive; wake everything waiting on its number.
    pub fn script_finished(&mut self, number: i32) {
        let mut woken = Vec::new();
        for script in &mut self.scripts {
            if script.resume_if_waiting_for_script(number) {
                woken.extend(script.thinker);
            }
        }
        self.woken.extend(woken);
    }

    /// Thinkers woken since the last call; they deserve a step within
    /// the current tick.
    pub fn take_woken(&mut self) -> Vec<ThinkerId> {
        std::mem::take(&mut self.woken)
    }

    /// Start any tasks deferred for the newly current map.
    pub fn run_deferred(&mut self, current_map: &str, thinkers: &mut Thinkers) {
        let due: Vec<DeferredTask> = {
            let (due, keep): (Vec<_>, Vec<_>) = self
                .deferred
                .drain(..)
                .partition(|t| t.map.eq_ignore_ascii_case(current_map));
            self.deferred = keep;
            due
        };
        for task in due {
            if let Err(e) = self.start_script(
                task.script,
                task.args,
                None,
                None,
                0,
                None,
                current_map,
                thinkers,
            ) {
                log::warn!("[AcsSystem::run_deferred] {}", e);
            }
        }
    }

    pub(crate) fn end_print(&mut self, target: Option<u8>, bold: bool) {
        let text = std::mem::take(&mut self.print_buffer);
        self.messages.push(AcsMessage { text, bold, target });
    }

    pub(crate) fn push_sound(&mut self, name: &str, volume: i32) {
        self.sounds.push(SoundEvent {
            name: name.to_string(),
            volume,
        });
    }
}

impl Default for AcsSystem {
    fn default() -> Self {
        AcsSystem::new()
    }
}

/// Line-special dispatch used by the `LSpec*` opcodes and by walkover /
/// use activation. Unknown specials are logged and ignored.
pub fn execute_line_special(
    special: i32,
    args: [u8; 5],
    line: Option<LineId>,
    side: i32,
    activator: Option<ThinkerId>,
    sys: &mut AcsSystem,
    env: &mut AcsEnv,
) {
    let _ = side;
    let tag = args[0] as i16;
    let speed = Fixed::from_int(args[1] as i32).div(Fixed::from_int(8));

    match special {
        // Door_Close / Door_Open / Door_Raise
        10 | 11 | 12 => {
            movers::spawn_door(env.map, env.thinkers, tag, speed, args[2] as i32);
        }
        // Floor_LowerByValue
        20 => {
            let delta = movers::FloorDest::Relative(-Fixed::from_int(args[2] as i32));
            movers::spawn_floor(env.map, env.thinkers, tag, delta, speed);
        }
        // Floor_RaiseByValue
        23 => {
            let delta = movers::FloorDest::Relative(Fixed::from_int(args[2] as i32));
            movers::spawn_floor(env.map, env.thinkers, tag, delta, speed);
        }
        // Ceiling_LowerByValue / Ceiling_RaiseByValue
        40 | 41 => {
            let kind = if special == 40 {
                movers::CeilingKind::Lower
            } else {
                movers::CeilingKind::Raise
            };
            movers::spawn_ceiling(env.map, env.thinkers, tag, kind, speed);
        }
        // Plat_Stop
        61 => {
            movers::stop_plat(env.thinkers, tag);
        }
        // Plat_DownWaitUpStay
        62 => {
            movers::spawn_plat(env.map, env.thinkers, tag, speed, args[2] as i32);
        }
        // ACS_Execute
        80 => {
            let script = args[0] as i32;
            let start_args = [args[2], args[3], args[4], 0];
            let current = env.map.id.clone();
            if let Err(e) = sys.start_script(
                script,
                start_args,
                activator,
                line,
                0,
                None,
                &current,
                env.thinkers,
            ) {
                log::warn!("[acs::execute_line_special] {}", e);
            }
        }
        // ACS_Suspend
        81 => {
            sys.suspend_script(args[0] as i32);
        }
        // ACS_Terminate
        82 => {
            sys.terminate_script(args[0] as i32);
        }
        _ => {
            log::debug!(
                "[acs::execute_line_special] Unhandled special {} (tag {})",
                special,
                tag
            );
        }
    }
}

/// Walk-over / projectile-cross activation of a line's stored special.
pub fn activate_line(
    line_id: LineId,
    activator: Option<ThinkerId>,
    side: i32,
    sys: &mut AcsSystem,
    env: &mut AcsEnv,
) {
    let line = env.map.line(line_id);
    let special = line.special as i32;
    if special == 0 {
        return;
    }
    let args = line.args;
    execute_line_special(special, args, Some(line_id), side, activator, sys, env);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acs::interpreter;
    use crate::acs::module::EntryPoint;
    use crate::world::thinker::ThinkOutcome;

    /// Assemble pcode from i32 words.
    fn assemble(words: &[i32]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(words.len() * 4);
        for w in words {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        bytes
    }

    struct Fixture {
        sys: AcsSystem,
        map: Map,
        thinkers: Thinkers,
        rng: GameRng,
    }

    impl Fixture {
        fn new(pcode: Vec<u8>, constants: Vec<String>, entry_points: Vec<EntryPoint>) -> Fixture {
            let mut sys = AcsSystem::new();
            sys.set_module(AcsModule::from_parts(pcode, constants, entry_points));
            Fixture {
                sys,
                map: Map::empty("MAP01"),
                thinkers: Thinkers::new(),
                rng: GameRng::from_seed(11),
            }
        }

        fn start(&mut self, number: i32) {
            self.sys
                .start_script(number, [0; 4], None, None, 0, None, "MAP01", &mut self.thinkers)
                .unwrap();
        }

        /// Run one whole ACS tick, including same-tick wakeups.
        fn tick(&mut self) {
            let ids: Vec<ThinkerId> = self
                .thinkers
                .iter_live()
                .filter(|(_, th)| matches!(th.kind, ThinkerKind::Acs(_)))
                .map(|(id, _)| id)
                .collect();

            for id in ids {
                self.step_one(id);
            }
            loop {
                let woken = self.sys.take_woken();
                if woken.is_empty() {
                    break;
                }
                for id in woken {
                    self.step_one(id);
                }
            }
            self.thinkers.sweep();
            self.thinkers.begin_tick();
        }

        fn step_one(&mut self, id: ThinkerId) {
            let Some(mut th) = self.thinkers.take(id) else {
                return;
            };
            let ThinkerKind::Acs(ref mut interp) = th.kind else {
                self.thinkers.put_back(id, th);
                return;
            };
            let mut env = AcsEnv {
                map: &mut self.map,
                thinkers: &mut self.thinkers,
                rng: &mut self.rng,
                players_in_game: 1,
                is_netgame: false,
                deathmatch: false,
                skill: 2,
                map_time: 0,
            };
            let outcome = interpreter::think(interp, &mut self.sys, &mut env);
            self.thinkers.put_back(id, th);
            if outcome == ThinkOutcome::Remove {
                self.thinkers.mark_for_removal(id);
            }
        }

        fn state(&self, number: i32) -> ScriptState {
            let i = self.sys.script_index(number).unwrap();
            self.sys.scripts[i].state
        }
    }

    // Opcode numbers used in hand-written test scripts.
    const TERMINATE: i32 = 1;
    const PUSH: i32 = 3;
    const ASSIGN_MAP: i32 = 26;
    const ASSIGN_WORLD: i32 = 27;
    const DELAY_DIRECT: i32 = 56;
    const SCRIPT_WAIT_DIRECT: i32 = 82;
    const CASE_GOTO: i32 = 84;
    const BEGIN_PRINT: i32 = 85;
    const END_PRINT: i32 = 86;
    const PRINT_STRING: i32 = 87;

    #[test]
    fn test_delay_resumes_exactly_n_ticks_later() {
        // delay 5; terminate
        let pcode = assemble(&[DELAY_DIRECT, 5, TERMINATE]);
        let mut fx = Fixture::new(
            pcode,
            vec![],
            vec![EntryPoint {
                script_number: 1,
                address: 0,
                arg_count: 0,
            }],
        );
        fx.start(1);

        // Tick 0 executes the delay; ticks 1..=4 idle; tick 5 resumes
        // and terminates.
        fx.tick();
        for _ in 0..4 {
            fx.tick();
            assert_eq!(fx.state(1), ScriptState::Running);
        }
        fx.tick();
        assert_eq!(fx.state(1), ScriptState::Inactive);
    }

    #[test]
    fn test_script_wait_and_same_tick_wake() {
        // Scenario: #1 = delay 5; scriptwait 2; print "done"; terminate.
        //           #2 = delay 3; terminate.
        let s1 = assemble(&[
            DELAY_DIRECT,
            5,
            SCRIPT_WAIT_DIRECT,
            2,
            BEGIN_PRINT,
            PUSH,
            0,
            PRINT_STRING,
            END_PRINT,
            TERMINATE,
        ]);
        let s2_offset = s1.len();
        let mut pcode = s1;
        pcode.extend(assemble(&[DELAY_DIRECT, 3, TERMINATE]));

        let mut fx = Fixture::new(
            pcode,
            vec!["done".to_string()],
            vec![
                EntryPoint {
                    script_number: 1,
                    address: 0,
                    arg_count: 0,
                },
                EntryPoint {
                    script_number: 2,
                    address: s2_offset,
                    arg_count: 0,
                },
            ],
        );
        fx.start(1);
        fx.start(2);

        // Tick 0: both execute their delay opcodes.
        fx.tick();
        // Ticks 1..3: #2 terminates on tick 3.
        fx.tick();
        fx.tick();
        assert_eq!(fx.state(2), ScriptState::Running);
        fx.tick();
        assert_eq!(fx.state(2), ScriptState::Inactive);
        assert_eq!(fx.state(1), ScriptState::Running);

        // Tick 5: #1 exits its delay, finds #2 already inactive, prints
        // and terminates on the same tick.
        fx.tick();
        fx.tick();
        assert_eq!(fx.state(1), ScriptState::Inactive);
        assert_eq!(
            fx.sys.messages,
            vec![AcsMessage {
                text: "done".to_string(),
                bold: false,
                target: None,
            }]
        );
    }

    #[test]
    fn test_script_wait_wakes_on_terminate_tick() {
        // #1 waits for #2 immediately; #2 delays then terminates.
        let s1 = assemble(&[SCRIPT_WAIT_DIRECT, 2, TERMINATE]);
        let s2_offset = s1.len();
        let mut pcode = s1;
        pcode.extend(assemble(&[DELAY_DIRECT, 2, TERMINATE]));

        let mut fx = Fixture::new(
            pcode,
            vec![],
            vec![
                EntryPoint {
                    script_number: 1,
                    address: 0,
                    arg_count: 0,
                },
                EntryPoint {
                    script_number: 2,
                    address: s2_offset,
                    arg_count: 0,
                },
            ],
        );
        fx.start(1);
        fx.start(2);

        fx.tick(); // #1 now waiting, #2 delaying
        assert_eq!(fx.state(1), ScriptState::WaitingForScript(2));
        fx.tick();
        assert_eq!(fx.state(1), ScriptState::WaitingForScript(2));

        // The tick #2 goes inactive, #1 resumes and finishes too.
        fx.tick();
        assert_eq!(fx.state(2), ScriptState::Inactive);
        assert_eq!(fx.state(1), ScriptState::Inactive);
    }

    #[test]
    fn test_world_vars_survive_map_change_map_vars_do_not() {
        // push 42; assignworld 3; push 7; assignmap 1; terminate
        let pcode = assemble(&[PUSH, 42, ASSIGN_WORLD, 3, PUSH, 7, ASSIGN_MAP, 1, TERMINATE]);
        let module = AcsModule::from_parts(
            pcode.clone(),
            vec![],
            vec![EntryPoint {
                script_number: 1,
                address: 0,
                arg_count: 0,
            }],
        );
        let mut fx = Fixture::new(
            pcode,
            vec![],
            vec![EntryPoint {
                script_number: 1,
                address: 0,
                arg_count: 0,
            }],
        );
        fx.start(1);
        fx.tick();
        assert_eq!(fx.sys.world_var(3), 42);
        assert_eq!(fx.sys.map_var(1), 7);

        // New map: same module reloaded, map scope resets.
        fx.sys.set_module(module);
        assert_eq!(fx.sys.world_var(3), 42);
        assert_eq!(fx.sys.map_var(1), 0);
    }

    #[test]
    fn test_case_goto_drops_only_on_match() {
        // push 5; casegoto 4 -> (skip); casegoto 5 -> end; terminate
        // On the match the tested value is dropped; on the miss it stays.
        let pcode = assemble(&[
            PUSH, 5, //
            CASE_GOTO, 4, 0, // no match: 5 != 4, stack keeps 5
            CASE_GOTO, 5, 32, // match: jump to 32, drop
            TERMINATE,
        ]);
        // Offset 32 = word index 8: terminate.
        let mut fx = Fixture::new(
            pcode,
            vec![],
            vec![EntryPoint {
                script_number: 1,
                address: 0,
                arg_count: 0,
            }],
        );
        fx.start(1);

        // Inspect the stack after the run: script terminated without a
        // stack error means CaseGoto consumed operands correctly.
        fx.tick();
        assert_eq!(fx.state(1), ScriptState::Inactive);
    }

    #[test]
    fn test_start_script_rejects_double_start() {
        let pcode = assemble(&[DELAY_DIRECT, 10, TERMINATE]);
        let mut fx = Fixture::new(
            pcode,
            vec![],
            vec![EntryPoint {
                script_number: 1,
                address: 0,
                arg_count: 0,
            }],
        );
        fx.start(1);
        let second = fx
            .sys
            .start_script(1, [0; 4], None, None, 0, None, "MAP01", &mut fx.thinkers)
            .unwrap();
        assert!(!second);
    }

    #[test]
    fn test_deferred_start_runs_on_map_load() {
        let pcode = assemble(&[TERMINATE]);
        let mut fx = Fixture::new(
            pcode,
            vec![],
            vec![EntryPoint {
                script_number: 9,
                address: 0,
                arg_count: 0,
            }],
        );

        let started = fx
            .sys
            .start_script(
                9,
                [0; 4],
                None,
                None,
                0,
                Some("MAP02"),
                "MAP01",
                &mut fx.thinkers,
            )
            .unwrap();
        assert!(started);
        assert_eq!(fx.state(9), ScriptState::Inactive); // not yet

        fx.sys.run_deferred("MAP02", &mut fx.thinkers);
        assert_eq!(fx.state(9), ScriptState::Running);
    }

    #[test]
    fn test_activate_line_spawns_mover() {
        use crate::world::map::{Line, LineFlags, Sector, SectorId, Side};

        let pcode = assemble(&[TERMINATE]);
        let mut fx = Fixture::new(
            pcode,
            vec![],
            vec![EntryPoint {
                script_number: 1,
                address: 0,
                arg_count: 0,
            }],
        );

        let mut sector = Sector::new(0.0, 128.0);
        sector.tag = 4;
        fx.map.sectors.push(sector);
        fx.map.lines.push(Line {
            v1: (crate::fixed::Fixed::ZERO, crate::fixed::Fixed::ZERO),
            v2: (crate::fixed::Fixed::from_int(64), crate::fixed::Fixed::ZERO),
            front_sector: SectorId(0),
            back_sector: None,
            front_side: Side::default(),
            back_side: None,
            flags: LineFlags::empty(),
            special: 12, // Door_Raise
            tag: 4,
            args: [4, 16, 35, 0, 0],
        });

        {
            let mut env = AcsEnv {
                map: &mut fx.map,
                thinkers: &mut fx.thinkers,
                rng: &mut fx.rng,
                players_in_game: 1,
                is_netgame: false,
                deathmatch: false,
                skill: 2,
                map_time: 0,
            };
            activate_line(crate::world::map::LineId(0), None, 0, &mut fx.sys, &mut env);
        }

        assert!(fx.map.sectors[0].special_data.is_some());
        assert_eq!(fx.thinkers.live_count(), 1);
    }

    #[test]
    fn test_unknown_script_is_error() {
        let pcode = assemble(&[TERMINATE]);
        let mut fx = Fixture::new(
            pcode,
            vec![],
            vec![EntryPoint {
                script_number: 1,
                address: 0,
                arg_count: 0,
            }],
        );
        assert!(matches!(
            fx.sys
                .start_script(99, [0; 4], None, None, 0, None, "MAP01", &mut fx.thinkers),
            Err(AcsError::UnknownScript { number: 99 })
        ));
    }
}
