//! Per-script bookkeeping: lifecycle state and wait predicates.

use crate::world::thinker::ThinkerId;

/// Lifecycle of one script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptState {
    Inactive,
    Running,
    Suspended,
    WaitingForTag(i16),
    WaitingForPolyobj(i16),
    WaitingForScript(i32),
    /// Will stop at its next opportunity.
    Terminating,
}

impl ScriptState {
    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            ScriptState::WaitingForTag(_)
                | ScriptState::WaitingForPolyobj(_)
                | ScriptState::WaitingForScript(_)
        )
    }
}

/// A script slot in the system's table, one per module entry point.
#[derive(Debug, Clone)]
pub struct Script {
    pub number: i32,
    /// Index into the module's entry point table.
    pub entry_point: usize,
    pub state: ScriptState,
    /// The thinker currently executing this script, when active.
    pub thinker: Option<ThinkerId>,
}

impl Script {
    pub fn new(number: i32, entry_point: usize) -> Script {
        Script {
            number,
            entry_point,
            state: ScriptState::Inactive,
            thinker: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == ScriptState::Running
    }

    /// Wake the script if its wait condition matches the finished tag.
    pub fn resume_if_waiting_for_tag(&mut self, tag: i16) -> bool {
        if self.state == ScriptState::WaitingForTag(tag) {
            self.state = ScriptState::Running;
            return true;
        }
        false
    }

    pub fn resume_if_waiting_for_polyobj(&mut self, po: i16) -> bool {
        if self.state == ScriptState::WaitingForPolyobj(po) {
            self.state = ScriptState::Running;
            return true;
        }
        false
    }

    pub fn resume_if_waiting_for_script(&mut self, number: i32) -> bool {
        if self.state == ScriptState::WaitingForScript(number) {
            self.state = ScriptState::Running;
            return true;
        }
        false
    }
}
