//! The ACS stack machine: one thinker per active script.

use crate::constants::acs::{MAX_SCRIPT_ARGS, STACK_DEPTH};
use crate::acs::script::ScriptState;
use crate::acs::system::{execute_line_special, AcsEnv, AcsSystem};
use crate::world::map::LineId;
use crate::world::thinker::{ThinkOutcome, ThinkerId};

/// Everything an opcode may ask the interpreter to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandResult {
    Continue,
    Stop,
    Terminate,
}

/// The pcode set, in wire order. The discriminant is the opcode value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[rustfmt::skip]
pub enum PCode {
    Nop, Terminate, Suspend, PushNumber, LSpec1, LSpec2, LSpec3, LSpec4,
    LSpec5, LSpec1Direct, LSpec2Direct, LSpec3Direct, LSpec4Direct,
    LSpec5Direct, Add, Subtract, Multiply, Divide, Modulus, Eq, Ne, Lt, Gt,
    Le, Ge, AssignScriptVar, AssignMapVar, AssignWorldVar, PushScriptVar,
    PushMapVar, PushWorldVar, AddScriptVar, AddMapVar, AddWorldVar,
    SubScriptVar, SubMapVar, SubWorldVar, MulScriptVar, MulMapVar,
    MulWorldVar, DivScriptVar, DivMapVar, DivWorldVar, ModScriptVar,
    ModMapVar, ModWorldVar, IncScriptVar, IncMapVar, IncWorldVar,
    DecScriptVar, DecMapVar, DecWorldVar, Goto, IfGoto, Drop, Delay,
    DelayDirect, Random, RandomDirect, ThingCount, ThingCountDirect,
    TagWait, TagWaitDirect, PolyWait, PolyWaitDirect, ChangeFloor,
    ChangeFloorDirect, ChangeCeiling, ChangeCeilingDirect, Restart,
    AndLogical, OrLogical, AndBitwise, OrBitwise, EorBitwise,
    NegateLogical, LShift, RShift, UnaryMinus, IfNotGoto, LineSide,
    ScriptWait, ScriptWaitDirect, ClearLineSpecial, CaseGoto, BeginPrint,
    EndPrint, PrintString, PrintNumber, PrintCharacter, PlayerCount,
    GameType, GameSkill, Timer, SectorSound, AmbientSound, SoundSequence,
    SetLineTexture, SetLineBlocking, SetLineSpecial, ThingSound,
    EndPrintBold,
}

#[rustfmt::skip]
const OPCODES: [PCode; 102] = [
    PCode::Nop, PCode::Terminate, PCode::Suspend, PCode::PushNumber,
    PCode::LSpec1, PCode::LSpec2, PCode::LSpec3, PCode::LSpec4,
    PCode::LSpec5, PCode::LSpec1Direct, PCode::LSpec2Direct,
    PCode::LSpec3Direct, PCode::LSpec4Direct, PCode::LSpec5Direct,
    PCode::Add, PCode::Subtract, PCode::Multiply, PCode::Divide,
    PCode::Modulus, PCode::Eq, PCode::Ne, PCode::Lt, PCode::Gt, PCode::Le,
    PCode::Ge, PCode::AssignScriptVar, PCode::AssignMapVar,
    PCode::AssignWorldVar, PCode::PushScriptVar, PCode::PushMapVar,
    PCode::PushWorldVar, PCode::AddScriptVar, PCode::AddMapVar,
    PCode::AddWorldVar, PCode::SubScriptVar, PCode::SubMapVar,
    PCode::SubWorldVar, PCode::MulScriptVar, PCode::MulMapVar,
    PCode::MulWorldVar, PCode::DivScriptVar, PCode::DivMapVar,
    PCode::DivWorldVar, PCode::ModScriptVar, PCode::ModMapVar,
    PCode::ModWorldVar, PCode::IncScriptVar, PCode::IncMapVar,
    PCode::IncWorldVar, PCode::DecScriptVar, PCode::DecMapVar,
    PCode::DecWorldVar, PCode::Goto, PCode::IfGoto, PCode::Drop,
    PCode::Delay, PCode::DelayDirect, PCode::Random, PCode::RandomDirect,
    PCode::ThingCount, PCode::ThingCountDirect, PCode::TagWait,
    PCode::TagWaitDirect, PCode::PolyWait, PCode::PolyWaitDirect,
    PCode::ChangeFloor, PCode::ChangeFloorDirect, PCode::ChangeCeiling,
    PCode::ChangeCeilingDirect, PCode::Restart, PCode::AndLogical,
    PCode::OrLogical, PCode::AndBitwise, PCode::OrBitwise,
    PCode::EorBitwise, PCode::NegateLogical, PCode::LShift, PCode::RShift,
    PCode::UnaryMinus, PCode::IfNotGoto, PCode::LineSide,
    PCode::ScriptWait, PCode::ScriptWaitDirect, PCode::ClearLineSpecial,
    PCode::CaseGoto, PCode::BeginPrint, PCode::EndPrint,
    PCode::PrintString, PCode::PrintNumber, PCode::PrintCharacter,
    PCode::PlayerCount, PCode::GameType, PCode::GameSkill, PCode::Timer,
    PCode::SectorSound, PCode::AmbientSound, PCode::SoundSequence,
    PCode::SetLineTexture, PCode::SetLineBlocking, PCode::SetLineSpecial,
    PCode::ThingSound, PCode::EndPrintBold,
];

impl PCode {
    pub fn from_i32(op: i32) -> Option<PCode> {
        OPCODES.get(usize::try_from(op).ok()?).copied()
    }
}

/// The locals stack. Overflow and underflow are logged and absorbed, not
/// panicked on; legacy saves rely on the interpreter surviving both.
#[derive(Debug, Clone)]
pub struct AcsStack {
    pub values: [i32; STACK_DEPTH],
    pub height: usize,
}

impl Default for AcsStack {
    fn default() -> Self {
        AcsStack {
            values: [0; STACK_DEPTH],
            height: 0,
        }
    }
}

impl AcsStack {
    pub fn push(&mut self, value: i32) {
        if self.height >= STACK_DEPTH {
            log::error!("[AcsStack::push] Overflow");
            return;
        }
        self.values[self.height] = value;
        self.height += 1;
    }

    pub fn pop(&mut self) -> i32 {
        if self.height == 0 {
            log::error!("[AcsStack::pop] Underflow");
            return 0;
        }
        self.height -= 1;
        self.values[self.height]
    }

    pub fn top(&self) -> i32 {
        if self.height == 0 {
            log::error!("[AcsStack::top] Underflow");
            return 0;
        }
        self.values[self.height - 1]
    }

    pub fn drop_top(&mut self) {
        if self.height == 0 {
            log::error!("[AcsStack::drop_top] Underflow");
            return;
        }
        self.height -= 1;
    }
}

/// The running state of one script: thinker payload in the arena.
#[derive(Debug, Clone)]
pub struct AcsThinker {
    /// Index into the system's script table.
    pub script_index: usize,
    /// Byte offset into the module pcode.
    pub pc: usize,
    pub delay_count: i32,
    pub stack: AcsStack,
    pub args: [i32; MAX_SCRIPT_ARGS],
    pub activator: Option<ThinkerId>,
    pub line: Option<LineId>,
    pub side: i32,
}

/// Advance one script thinker by one tick.
pub fn think(
    interp: &mut AcsThinker,
    sys: &mut AcsSystem,
    env: &mut AcsEnv,
) -> ThinkOutcome {
    let script_state = sys.scripts[interp.script_index].state;
    let mut action = if script_state == ScriptState::Terminating {
        CommandResult::Terminate
    } else {
        CommandResult::Continue
    };

    if script_state == ScriptState::Running {
        if interp.delay_count > 0 {
            // One decrement per tick before opcodes resume.
            interp.delay_count -= 1;
            if interp.delay_count > 0 {
                return ThinkOutcome::Keep;
            }
        }

        loop {
            let op = sys.module.read_i32(interp.pc);
            interp.pc += 4;
            let Some(pcode) = PCode::from_i32(op) else {
                log::error!("[acs::think] Unknown pcode #{}, terminating script", op);
                action = CommandResult::Terminate;
                break;
            };
            action = step(pcode, interp, sys, env);
            if action != CommandResult::Continue {
                break;
            }
        }
    }

    if action == CommandResult::Terminate {
        let number = sys.scripts[interp.script_index].number;
        sys.scripts[interp.script_index].state = ScriptState::Inactive;
        sys.scripts[interp.script_index].thinker = None;
        sys.script_finished(number);
        return ThinkOutcome::Remove;
    }

    ThinkOutcome::Keep
}

/// Fetch the next inline operand.
fn operand(interp: &mut AcsThinker, sys: &AcsSystem) -> i32 {
    let value = sys.module.read_i32(interp.pc);
    interp.pc += 4;
    value
}

fn step(
    pcode: PCode,
    interp: &mut AcsThinker,
    sys: &mut AcsSystem,
    env: &mut AcsEnv,
) -> CommandResult {
    use CommandResult::{Continue, Stop, Terminate};

    match pcode {
        PCode::Nop => {}
        PCode::Terminate => return Terminate,
        PCode::Suspend => {
            sys.scripts[interp.script_index].state = ScriptState::Suspended;
            return Stop;
        }
        PCode::PushNumber => {
            let value = operand(interp, sys);
            interp.stack.push(value);
        }

        PCode::LSpec1 | PCode::LSpec2 | PCode::LSpec3 | PCode::LSpec4 | PCode::LSpec5 => {
            let count = match pcode {
                PCode::LSpec1 => 1,
                PCode::LSpec2 => 2,
                PCode::LSpec3 => 3,
                PCode::LSpec4 => 4,
                _ => 5,
            };
            let special = operand(interp, sys);
            let mut args = [0u8; 5];
            for i in (0..count).rev() {
                args[i] = interp.stack.pop() as u8;
            }
            execute_line_special(special, args, interp.line, interp.side, interp.activator, sys, env);
        }
        PCode::LSpec1Direct
        | PCode::LSpec2Direct
        | PCode::LSpec3Direct
        | PCode::LSpec4Direct
        | PCode::LSpec5Direct => {
            let count = match pcode {
                PCode::LSpec1Direct => 1,
                PCode::LSpec2Direct => 2,
                PCode::LSpec3Direct => 3,
                PCode::LSpec4Direct => 4,
                _ => 5,
            };
            let special = operand(interp, sys);
            let mut args = [0u8; 5];
            for slot in args.iter_mut().take(count) {
                *slot = operand(interp, sys) as u8;
            }
            execute_line_special(special, args, interp.line, interp.side, interp.activator, sys, env);
        }

        PCode::Add => {
            let result = interp.stack.pop().wrapping_add(interp.stack.pop());
            interp.stack.push(result);
        }
        PCode::Subtract => {
            let operand2 = interp.stack.pop();
            let result = interp.stack.pop().wrapping_sub(operand2);
            interp.stack.push(result);
        }
        PCode::Multiply => {
            let result = interp.stack.pop().wrapping_mul(interp.stack.pop());
            interp.stack.push(result);
        }
        PCode::Divide => {
            let operand2 = interp.stack.pop();
            let lhs = interp.stack.pop();
            interp.stack.push(if operand2 != 0 { lhs / operand2 } else { 0 });
        }
        PCode::Modulus => {
            let operand2 = interp.stack.pop();
            let lhs = interp.stack.pop();
            interp.stack.push(if operand2 != 0 { lhs % operand2 } else { 0 });
        }

        PCode::Eq => {
            let result = (interp.stack.pop() == interp.stack.pop()) as i32;
            interp.stack.push(result);
        }
        PCode::Ne => {
            let result = (interp.stack.pop() != interp.stack.pop()) as i32;
            interp.stack.push(result);
        }
        PCode::Lt => {
            let operand2 = interp.stack.pop();
            let result = (interp.stack.pop() < operand2) as i32;
            interp.stack.push(result);
        }
        PCode::Gt => {
            let operand2 = interp.stack.pop();
            let result = (interp.stack.pop() > operand2) as i32;
            interp.stack.push(result);
        }
        PCode::Le => {
            let operand2 = interp.stack.pop();
            let result = (interp.stack.pop() <= operand2) as i32;
            interp.stack.push(result);
        }
        PCode::Ge => {
            let operand2 = interp.stack.pop();
            let result = (interp.stack.pop() >= operand2) as i32;
            interp.stack.push(result);
        }

        PCode::AssignScriptVar => {
            let var = operand(interp, sys) as usize;
            let value = interp.stack.pop();
            if let Some(slot) = interp.args.get_mut(var) {
                *slot = value;
            }
        }
        PCode::AssignMapVar => {
            let var = operand(interp, sys) as usize;
            let value = interp.stack.pop();
            sys.set_map_var(var, value);
        }
        PCode::AssignWorldVar => {
            let var = operand(interp, sys) as usize;
            let value = interp.stack.pop();
            sys.set_world_var(var, value);
        }
        PCode::PushScriptVar => {
            let var = operand(interp, sys) as usize;
            interp.stack.push(interp.args.get(var).copied().unwrap_or(0));
        }
        PCode::PushMapVar => {
            let var = operand(interp, sys) as usize;
            interp.stack.push(sys.map_var(var));
        }
        PCode::PushWorldVar => {
            let var = operand(interp, sys) as usize;
            interp.stack.push(sys.world_var(var));
        }
        PCode::AddScriptVar => {
            let var = operand(interp, sys) as usize;
            let value = interp.stack.pop();
            if let Some(slot) = interp.args.get_mut(var) {
                *slot = slot.wrapping_add(value);
            }
        }
        PCode::AddMapVar => {
            let var = operand(interp, sys) as usize;
            let value = interp.stack.pop();
            sys.set_map_var(var, sys.map_var(var).wrapping_add(value));
        }
        PCode::AddWorldVar => {
            let var = operand(interp, sys) as usize;
            let value = interp.stack.pop();
            sys.set_world_var(var, sys.world_var(var).wrapping_add(value));
        }
        PCode::SubScriptVar => {
            let var = operand(interp, sys) as usize;
            let value = interp.stack.pop();
            if let Some(slot) = interp.args.get_mut(var) {
                *slot = slot.wrapping_sub(value);
            }
        }
        PCode::SubMapVar => {
            let var = operand(interp, sys) as usize;
            let value = interp.stack.pop();
            sys.set_map_var(var, sys.map_var(var).wrapping_sub(value));
        }
        PCode::SubWorldVar => {
            let var = operand(interp, sys) as usize;
            let value = interp.stack.pop();
            sys.set_world_var(var, sys.world_var(var).wrapping_sub(value));
        }
        PCode::MulScriptVar => {
            let var = operand(interp, sys) as usize;
            let value = interp.stack.pop();
            if let Some(slot) = interp.args.get_mut(var) {
                *slot = slot.wrapping_mul(value);
            }
        }
        PCode::MulMapVar => {
            let var = operand(interp, sys) as usize;
            let value = interp.stack.pop();
            sys.set_map_var(var, sys.map_var(var).wrapping_mul(value));
        }
        PCode::MulWorldVar => {
            let var = operand(interp, sys) as usize;
            let value = interp.stack.pop();
            sys.set_world_var(var, sys.world_var(var).wrapping_mul(value));
        }
        PCode::DivScriptVar => {
            let var = operand(interp, sys) as usize;
            let value = interp.stack.pop();
            if value != 0 {
                if let Some(slot) = interp.args.get_mut(var) {
                    *slot /= value;
                }
            }
        }
        PCode::DivMapVar => {
            let var = operand(interp, sys) as usize;
            let value = interp.stack.pop();
            if value != 0 {
                sys.set_map_var(var, sys.map_var(var) / value);
            }
        }
        PCode::DivWorldVar => {
            let var = operand(interp, sys) as usize;
            let value = interp.stack.pop();
            if value != 0 {
                sys.set_world_var(var, sys.world_var(var) / value);
            }
        }
        PCode::ModScriptVar => {
            let var = operand(interp, sys) as usize;
            let value = interp.stack.pop();
            if value != 0 {
                if let Some(slot) = interp.args.get_mut(var) {
                    *slot %= value;
                }
            }
        }
        PCode::ModMapVar => {
            let var = operand(interp, sys) as usize;
            let value = interp.stack.pop();
            if value != 0 {
                sys.set_map_var(var, sys.map_var(var) % value);
            }
        }
        PCode::ModWorldVar => {
            let var = operand(interp, sys) as usize;
            let value = interp.stack.pop();
            if value != 0 {
                sys.set_world_var(var, sys.world_var(var) % value);
            }
        }
        PCode::IncScriptVar => {
            let var = operand(interp, sys) as usize;
            if let Some(slot) = interp.args.get_mut(var) {
                *slot = slot.wrapping_add(1);
            }
        }
        PCode::IncMapVar => {
            let var = operand(interp, sys) as usize;
            sys.set_map_var(var, sys.map_var(var).wrapping_add(1));
        }
        PCode::IncWorldVar => {
            let var = operand(interp, sys) as usize;
            sys.set_world_var(var, sys.world_var(var).wrapping_add(1));
        }
        PCode::DecScriptVar => {
            let var = operand(interp, sys) as usize;
            if let Some(slot) = interp.args.get_mut(var) {
                *slot = slot.wrapping_sub(1);
            }
        }
        PCode::DecMapVar => {
            let var = operand(interp, sys) as usize;
            sys.set_map_var(var, sys.map_var(var).wrapping_sub(1));
        }
        PCode::DecWorldVar => {
            let var = operand(interp, sys) as usize;
            sys.set_world_var(var, sys.world_var(var).wrapping_sub(1));
        }

        PCode::Goto => {
            interp.pc = sys.module.read_i32(interp.pc) as usize;
        }
        PCode::IfGoto => {
            if interp.stack.pop() != 0 {
                interp.pc = sys.module.read_i32(interp.pc) as usize;
            } else {
                interp.pc += 4;
            }
        }
        PCode::IfNotGoto => {
            if interp.stack.pop() != 0 {
                interp.pc += 4;
            } else {
                interp.pc = sys.module.read_i32(interp.pc) as usize;
            }
        }
        PCode::CaseGoto => {
            // Nonstandard: the tested value is dropped only on a match.
            if interp.stack.top() == operand(interp, sys) {
                interp.pc = sys.module.read_i32(interp.pc) as usize;
                interp.stack.drop_top();
            } else {
                interp.pc += 4;
            }
        }
        PCode::Drop => {
            interp.stack.drop_top();
        }

        PCode::Delay => {
            interp.delay_count = interp.stack.pop();
            return Stop;
        }
        PCode::DelayDirect => {
            interp.delay_count = operand(interp, sys);
            return Stop;
        }

        PCode::Random => {
            let high = interp.stack.pop();
            let low = interp.stack.pop();
            interp.stack.push(env.rng.rand_range(low, high));
        }
        PCode::RandomDirect => {
            let low = operand(interp, sys);
            let high = operand(interp, sys);
            interp.stack.push(env.rng.rand_range(low, high));
        }

        PCode::ThingCount => {
            let tid = interp.stack.pop();
            let type_id = interp.stack.pop();
            if type_id + tid != 0 {
                interp.stack.push(env.mobj_count(type_id));
            }
        }
        PCode::ThingCountDirect => {
            let type_id = operand(interp, sys);
            let tid = operand(interp, sys);
            if type_id + tid != 0 {
                interp.stack.push(env.mobj_count(type_id));
            }
        }

        PCode::TagWait => {
            let tag = interp.stack.pop() as i16;
            sys.scripts[interp.script_index].state = ScriptState::WaitingForTag(tag);
            return Stop;
        }
        PCode::TagWaitDirect => {
            let tag = operand(interp, sys) as i16;
            sys.scripts[interp.script_index].state = ScriptState::WaitingForTag(tag);
            return Stop;
        }
        PCode::PolyWait => {
            let po = interp.stack.pop() as i16;
            sys.scripts[interp.script_index].state = ScriptState::WaitingForPolyobj(po);
            return Stop;
        }
        PCode::PolyWaitDirect => {
            let po = operand(interp, sys) as i16;
            sys.scripts[interp.script_index].state = ScriptState::WaitingForPolyobj(po);
            return Stop;
        }
        PCode::ScriptWait => {
            let number = interp.stack.pop();
            if !sys.wait_for_script(interp.script_index, number) {
                // Target already inactive; no wait needed.
                return Continue;
            }
            return Stop;
        }
        PCode::ScriptWaitDirect => {
            let number = operand(interp, sys);
            if !sys.wait_for_script(interp.script_index, number) {
                return Continue;
            }
            return Stop;
        }

        PCode::ChangeFloor => {
            let name = sys.module.constant(interp.stack.pop()).to_string();
            let tag = interp.stack.pop() as i16;
            change_plane_material(env, tag, &name, true);
        }
        PCode::ChangeFloorDirect => {
            let tag = operand(interp, sys) as i16;
            let name = sys.module.constant(operand(interp, sys)).to_string();
            change_plane_material(env, tag, &name, true);
        }
        PCode::ChangeCeiling => {
            let name = sys.module.constant(interp.stack.pop()).to_string();
            let tag = interp.stack.pop() as i16;
            change_plane_material(env, tag, &name, false);
        }
        PCode::ChangeCeilingDirect => {
            let tag = operand(interp, sys) as i16;
            let name = sys.module.constant(operand(interp, sys)).to_string();
            change_plane_material(env, tag, &name, false);
        }

        PCode::Restart => {
            let ep = sys.scripts[interp.script_index].entry_point;
            interp.pc = sys.module.entry_points()[ep].address;
        }

        PCode::AndLogical => {
            let b = interp.stack.pop() != 0;
            let a = interp.stack.pop() != 0;
            interp.stack.push((a && b) as i32);
        }
        PCode::OrLogical => {
            let b = interp.stack.pop() != 0;
            let a = interp.stack.pop() != 0;
            interp.stack.push((a || b) as i32);
        }
        PCode::AndBitwise => {
            let result = interp.stack.pop() & interp.stack.pop();
            interp.stack.push(result);
        }
        PCode::OrBitwise => {
            let result = interp.stack.pop() | interp.stack.pop();
            interp.stack.push(result);
        }
        PCode::EorBitwise => {
            let result = interp.stack.pop() ^ interp.stack.pop();
            interp.stack.push(result);
        }
        PCode::NegateLogical => {
            let value = (interp.stack.pop() == 0) as i32;
            interp.stack.push(value);
        }
        PCode::LShift => {
            let operand2 = interp.stack.pop() & 31;
            let value = interp.stack.pop() << operand2;
            interp.stack.push(value);
        }
        PCode::RShift => {
            let operand2 = interp.stack.pop() & 31;
            let value = interp.stack.pop() >> operand2;
            interp.stack.push(value);
        }
        PCode::UnaryMinus => {
            let value = interp.stack.pop().wrapping_neg();
            interp.stack.push(value);
        }

        PCode::LineSide => {
            interp.stack.push(interp.side);
        }
        PCode::ClearLineSpecial => {
            if let Some(line) = interp.line {
                env.map.line_mut(line).special = 0;
            }
        }

        PCode::BeginPrint => {
            sys.print_buffer.clear();
        }
        PCode::EndPrint => {
            let target = env.player_of(interp.activator);
            sys.end_print(target, false);
        }
        PCode::EndPrintBold => {
            sys.end_print(None, true);
        }
        PCode::PrintString => {
            let constant = sys.module.constant(interp.stack.pop()).to_string();
            sys.print_buffer.push_str(&constant);
        }
        PCode::PrintNumber => {
            let value = interp.stack.pop();
            sys.print_buffer.push_str(&value.to_string());
        }
        PCode::PrintCharacter => {
            let ch = (interp.stack.pop() as u8) as char;
            sys.print_buffer.push(ch);
        }

        PCode::PlayerCount => {
            interp.stack.push(env.players_in_game);
        }
        PCode::GameType => {
            interp.stack.push(env.game_type());
        }
        PCode::GameSkill => {
            interp.stack.push(env.skill);
        }
        PCode::Timer => {
            interp.stack.push(env.map_time as i32);
        }

        PCode::SectorSound => {
            let volume = interp.stack.pop();
            let name = sys.module.constant(interp.stack.pop()).to_string();
            sys.push_sound(&name, volume);
        }
        PCode::AmbientSound => {
            let volume = interp.stack.pop();
            let name = sys.module.constant(interp.stack.pop()).to_string();
            sys.push_sound(&name, volume);
        }
        PCode::SoundSequence => {
            let name = sys.module.constant(interp.stack.pop()).to_string();
            sys.push_sound(&name, 127);
        }
        PCode::ThingSound => {
            let volume = interp.stack.pop();
            let name = sys.module.constant(interp.stack.pop()).to_string();
            let _tid = interp.stack.pop();
            sys.push_sound(&name, volume);
        }

        PCode::SetLineTexture => {
            let name = sys.module.constant(interp.stack.pop()).to_string();
            let position = interp.stack.pop();
            let side = interp.stack.pop();
            let line_tag = interp.stack.pop() as i16;
            let material = env.map.materials.intern(&name);

            for line_id in env.map.lines_with_tag(line_tag) {
                let line = env.map.line_mut(line_id);
                let sdef = if side == 0 {
                    Some(&mut line.front_side)
                } else {
                    line.back_side.as_mut()
                };
                if let Some(sdef) = sdef {
                    match position {
                        1 => sdef.middle_material = material,
                        2 => sdef.bottom_material = material,
                        _ => sdef.top_material = material,
                    }
                }
            }
        }
        PCode::SetLineBlocking => {
            let blocking = interp.stack.pop() != 0;
            let line_tag = interp.stack.pop() as i16;
            for line_id in env.map.lines_with_tag(line_tag) {
                env.map
                    .line_mut(line_id)
                    .flags
                    .set(crate::world::map::LineFlags::BLOCKING, blocking);
            }
        }
        PCode::SetLineSpecial => {
            let arg5 = interp.stack.pop() as u8;
            let arg4 = interp.stack.pop() as u8;
            let arg3 = interp.stack.pop() as u8;
            let arg2 = interp.stack.pop() as u8;
            let arg1 = interp.stack.pop() as u8;
            let special = interp.stack.pop() as i16;
            let line_tag = interp.stack.pop() as i16;
            for line_id in env.map.lines_with_tag(line_tag) {
                let line = env.map.line_mut(line_id);
                line.special = special;
                line.args = [arg1, arg2, arg3, arg4, arg5];
            }
        }
    }

    CommandResult::Continue
}

fn change_plane_material(env: &mut AcsEnv, tag: i16, name: &str, floor: bool) {
    let material = env.map.materials.intern(name);
    for sector_id in env.map.sectors_with_tag(tag) {
        let sector = env.map.sector_mut(sector_id);
        if floor {
            sector.floor_material = material;
        } else {
            sector.ceiling_material = material;
        }
    }
}
