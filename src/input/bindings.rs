//! The binding table, the event responder, and the class-switch release
//! logic.
//!
//! Binding classes are ordered by id; for a plain event the command in
//! the highest active class wins. When a class is toggled while keys are
//! held, synthetic release events are posted with an explicit class so
//! that every command that went "down" gets its paired "up" even though
//! the winning class has changed in between.

use rustc_hash::FxHashSet;

use crate::constants::input::NUM_BIND_CLASSES;
use crate::input::events::{event_from_text, event_to_text, EventType, InputEvent};

#[derive(Debug, Clone)]
pub struct BindClass {
    pub id: usize,
    pub active: bool,
    pub name: &'static str,
}

/// One event pattern with a command slot per class.
#[derive(Debug, Clone)]
pub struct Binding {
    pub event: InputEvent,
    pub commands: [Option<String>; NUM_BIND_CLASSES],
}

impl Binding {
    fn new(event: InputEvent) -> Binding {
        Binding {
            event,
            commands: Default::default(),
        }
    }

    fn is_empty(&self) -> bool {
        self.commands.iter().all(|c| c.is_none())
    }
}

pub struct BindingSystem {
    bindings: Vec<Binding>,
    classes: [BindClass; NUM_BIND_CLASSES],
    held_keys: FxHashSet<i32>,
    held_mouse: i32,
    held_joy: i32,
    /// Commands dispatched by the responder, in order, for the console
    /// layer to execute.
    pub executed: Vec<String>,
    /// Synthetic events queued by class toggles; the host posts these
    /// back through the responder before any new input.
    pub posted: Vec<InputEvent>,
}

impl BindingSystem {
    pub fn new() -> BindingSystem {
        BindingSystem {
            bindings: Vec::new(),
            classes: [
                BindClass { id: 0, active: true, name: "game" },
                BindClass { id: 1, active: false, name: "biaseditor" },
                BindClass { id: 2, active: false, name: "map" },
                BindClass { id: 3, active: false, name: "mapfollowoff" },
                BindClass { id: 4, active: false, name: "class1" },
                BindClass { id: 5, active: false, name: "class2" },
                BindClass { id: 6, active: false, name: "class3" },
            ],
            held_keys: FxHashSet::default(),
            held_mouse: 0,
            held_joy: 0,
            executed: Vec::new(),
            posted: Vec::new(),
        }
    }

    pub fn classes(&self) -> &[BindClass] {
        &self.classes
    }

    pub fn class_by_name(&self, name: &str) -> Option<usize> {
        self.classes
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .or_else(|| {
                // Accept a bare class id too.
                name.parse::<usize>().ok().filter(|&i| i < NUM_BIND_CLASSES)
            })
    }

    pub fn is_class_active(&self, class: usize) -> bool {
        self.classes.get(class).map(|c| c.active).unwrap_or(false)
    }

    fn binding_index(&self, event: &InputEvent) -> Option<usize> {
        self.bindings.iter().position(|b| {
            b.event.ty == event.ty && b.event.datum == event.datum
        })
    }

    /// Bind (or with None, unbind) a command in one class. Binding a
    /// `+command` on a press event also binds the matching `-command`
    /// on the release event, so a down always has its paired up. An
    /// empty binding record is dropped entirely.
    pub fn bind(&mut self, event: InputEvent, command: Option<&str>, class: usize) {
        if class >= NUM_BIND_CLASSES {
            return;
        }
        self.bind_single(event, command, class);

        if let Some(command) = command {
            if event.ty.is_down() {
                if let Some(base) = command.strip_prefix('+') {
                    let mut up = event;
                    up.ty = event.ty.up_counterpart();
                    self.bind_single(up, Some(&format!("-{}", base)), class);
                }
            }
        }
    }

    fn bind_single(&mut self, event: InputEvent, command: Option<&str>, class: usize) {
        match command {
            Some(command) => {
                let index = match self.binding_index(&event) {
                    Some(i) => i,
                    None => {
                        self.bindings.push(Binding::new(event));
                        self.bindings.len() - 1
                    }
                };
                self.bindings[index].commands[class] = Some(command.to_string());
            }
            None => {
                if let Some(index) = self.binding_index(&event) {
                    self.bindings[index].commands[class] = None;
                    if self.bindings[index].is_empty() {
                        self.bindings.remove(index);
                    }
                }
            }
        }
    }

    /// Remove every binding that carries the given command, in one class
    /// or (None) all of them.
    pub fn clear_command(&mut self, command: &str, class: Option<usize>) {
        for binding in &mut self.bindings {
            for (k, slot) in binding.commands.iter_mut().enumerate() {
                let matches =
                    slot.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(command));
                if matches && class.map_or(true, |wanted| wanted == k) {
                    *slot = None;
                }
            }
        }
        self.bindings.retain(|b| !b.is_empty());
    }

    pub fn clear_all(&mut self) {
        self.bindings.clear();
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the exact event already carries a command in the class.
    pub fn is_bound(&self, event: &InputEvent, class: usize) -> bool {
        self.binding_index(event)
            .and_then(|i| self.bindings[i].commands.get(class))
            .map(|c| c.is_some())
            .unwrap_or(false)
    }

    /// Events bound to a command, as text, optionally limited to one
    /// class.
    pub fn bindings_for_command(&self, command: &str, class: Option<usize>) -> Vec<String> {
        let mut names = Vec::new();
        for binding in &self.bindings {
            for (k, slot) in binding.commands.iter().enumerate() {
                if class.is_some_and(|wanted| wanted != k) {
                    continue;
                }
                if slot.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(command)) {
                    if let Some(text) = event_to_text(&binding.event) {
                        names.push(text);
                    }
                }
            }
        }
        names
    }

    /// Track raw press state; feed every host event through here before
    /// dispatch so class toggles know what is currently held.
    fn note_event(&mut self, ev: &InputEvent) {
        match ev.ty {
            EventType::KeyDown => {
                self.held_keys.insert(ev.datum);
            }
            EventType::KeyUp => {
                self.held_keys.remove(&ev.datum);
            }
            EventType::MouseButtonDown => self.held_mouse |= ev.datum,
            EventType::MouseButtonUp => self.held_mouse &= !ev.datum,
            EventType::JoyButtonDown => self.held_joy |= ev.datum,
            EventType::JoyButtonUp => self.held_joy &= !ev.datum,
            _ => {}
        }
    }

    fn is_trigger_held(&self, event: &InputEvent) -> bool {
        match event.ty {
            EventType::KeyDown => self.held_keys.contains(&event.datum),
            EventType::MouseButtonDown => self.held_mouse & event.datum != 0,
            EventType::JoyButtonDown => self.held_joy & event.datum != 0,
            _ => false,
        }
    }

    /// Dispatch an event to the bound commands. For each matching
    /// binding, at most one command runs: the forced class when the
    /// event carries one, else the highest active class with a command.
    pub fn respond(&mut self, ev: &InputEvent) {
        if ev.ty.is_axis() {
            return; // We won't even bother with axis data.
        }
        if ev.use_class.is_none() {
            // Synthetic events are not real input; they must not touch
            // the held-state tracking.
            self.note_event(ev);
        }

        let mut fired: Vec<String> = Vec::new();
        for binding in &self.bindings {
            if !ev.matches(&binding.event) {
                continue;
            }

            match ev.use_class {
                Some(class) => {
                    // Forced dispatch, regardless of class activity.
                    // These events are only posted by the engine itself
                    // during a class switch.
                    if let Some(cmd) = binding.commands.get(class).and_then(|c| c.clone()) {
                        fired.push(cmd);
                    }
                }
                None => {
                    for class in (0..NUM_BIND_CLASSES).rev() {
                        if self.classes[class].active {
                            if let Some(cmd) = &binding.commands[class] {
                                fired.push(cmd.clone());
                                break;
                            }
                        }
                    }
                }
            }
        }
        self.executed.extend(fired);
    }

    /// Enable, disable or (None) toggle a binding class, posting the
    /// synthetic release events that keep held triggers consistent.
    pub fn set_class_active(&mut self, class: usize, mode: Option<bool>) -> bool {
        if class >= NUM_BIND_CLASSES {
            log::warn!("[BindingSystem::set_class_active] No such class {}", class);
            return false;
        }
        let new_state = mode.unwrap_or(!self.classes[class].active);
        self.classes[class].active = new_state;
        log::debug!(
            "[BindingSystem::set_class_active] {} is now {}",
            self.classes[class].name,
            if new_state { "on" } else { "off" }
        );

        // Check for keys held right now whose binding has commands in
        // the toggled class.
        let mut to_post: Vec<InputEvent> = Vec::new();
        for binding in &self.bindings {
            if binding.commands[class].is_none() || !self.is_trigger_held(&binding.event) {
                continue;
            }

            // Count commands in active classes below the toggled one; a
            // command in a higher active class was already the winner,
            // so nothing needs releasing.
            let mut lower_active = 0;
            for k in 0..NUM_BIND_CLASSES {
                if self.classes[k].active && binding.commands[k].is_some() {
                    if k > class {
                        lower_active = 0;
                        break;
                    }
                    lower_active += 1;
                }
            }

            if lower_active > 0 {
                // Release every lower active class's command under its
                // own class, so their downs get paired ups.
                for k in 0..class {
                    if self.classes[k].active && binding.commands[k].is_some() {
                        let mut up = binding.event;
                        up.ty = up.ty.up_counterpart();
                        up.use_class = Some(k);
                        to_post.push(up);
                    }
                }
            }

            // If the command that was live sits in the class just
            // disabled, and nothing higher outranks it, release it too.
            for k in (1..NUM_BIND_CLASSES).rev() {
                if (k > class && self.classes[k].active && binding.commands[k].is_some())
                    || k < class
                {
                    break;
                }
                if !self.classes[k].active && binding.commands[k].is_some() {
                    let mut up = binding.event;
                    up.ty = up.ty.up_counterpart();
                    up.use_class = Some(k);
                    to_post.push(up);
                }
            }
        }

        self.posted.extend(to_post);
        true
    }

    /// Drain and dispatch the synthetic events queued by class toggles.
    pub fn flush_posted(&mut self) {
        let posted = std::mem::take(&mut self.posted);
        for ev in posted {
            self.respond(&ev);
        }
    }

    /// Serialize as `bind <class> <event> "<command>"` lines.
    pub fn write_bindings(&self) -> String {
        let mut out = String::new();
        for binding in &self.bindings {
            for (k, slot) in binding.commands.iter().enumerate() {
                let Some(command) = slot else { continue };
                let Some(event) = event_to_text(&binding.event) else {
                    continue;
                };
                out.push_str(&format!(
                    "bind {} {} \"{}\"\n",
                    self.classes[k].name, event, command
                ));
            }
        }
        out
    }

    /// Parse persisted bindings. Lines without a class name default to
    /// `game`, which keeps old config files loading.
    pub fn parse_bindings(&mut self, text: &str) -> usize {
        let mut count = 0;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some(rest) = line.strip_prefix("bind ") else {
                continue;
            };

            let mut parts = rest.splitn(3, ' ');
            let Some(first) = parts.next() else { continue };

            let (class, event_text, command_part) = match self.class_by_name(first) {
                Some(class) => {
                    let Some(event_text) = parts.next() else { continue };
                    (class, event_text, parts.next().unwrap_or(""))
                }
                None => {
                    // Legacy line: class omitted, defaults to game.
                    let command_part = parts.next().unwrap_or("");
                    let rest_of_line = match parts.next() {
                        Some(more) => format!("{} {}", command_part, more),
                        None => command_part.to_string(),
                    };
                    let Some(event) = event_from_text(first) else { continue };
                    let command = rest_of_line.trim().trim_matches('"');
                    if !command.is_empty() {
                        self.bind(event, Some(command), 0);
                        count += 1;
                    }
                    continue;
                }
            };

            let Some(event) = event_from_text(event_text) else {
                continue;
            };
            let command = command_part.trim().trim_matches('"');
            if !command.is_empty() {
                self.bind(event, Some(command), class);
                count += 1;
            }
        }
        count
    }
}

impl Default for BindingSystem {
    fn default() -> Self {
        BindingSystem::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_event(ty: EventType, ch: char) -> InputEvent {
        InputEvent::new(ty, ch as i32)
    }

    #[test]
    fn test_single_dispatch_per_event() {
        let mut sys = BindingSystem::new();
        sys.bind(key_event(EventType::KeyDown, 'K'), Some("+attack"), 0);

        sys.respond(&key_event(EventType::KeyDown, 'K'));
        assert_eq!(sys.executed, vec!["+attack"]);

        sys.respond(&key_event(EventType::KeyUp, 'K'));
        assert_eq!(sys.executed, vec!["+attack", "-attack"]);
    }

    #[test]
    fn test_highest_active_class_wins() {
        let mut sys = BindingSystem::new();
        sys.bind(key_event(EventType::KeyDown, 'K'), Some("+attack"), 0);
        sys.bind(key_event(EventType::KeyDown, 'K'), Some("+zoom"), 2);
        sys.set_class_active(2, Some(true));
        sys.flush_posted();
        sys.executed.clear();

        sys.respond(&key_event(EventType::KeyDown, 'K'));
        assert_eq!(sys.executed, vec!["+zoom"]);
    }

    #[test]
    fn test_class_preempt_posts_release_in_old_class() {
        // Scenario: game(0) active with +attack on K; map(2) inactive
        // with +zoom on K. Press K, enable map, release K.
        let mut sys = BindingSystem::new();
        sys.bind(key_event(EventType::KeyDown, 'K'), Some("+attack"), 0);
        sys.bind(key_event(EventType::KeyDown, 'K'), Some("+zoom"), 2);

        sys.respond(&key_event(EventType::KeyDown, 'K'));
        assert_eq!(sys.executed, vec!["+attack"]);

        sys.set_class_active(2, Some(true));
        sys.flush_posted();
        // The held key's game command got its release under class game.
        assert_eq!(sys.executed, vec!["+attack", "-attack"]);

        // A fresh press of the (still held) key now belongs to map.
        sys.respond(&key_event(EventType::KeyDown, 'K'));
        assert_eq!(sys.executed, vec!["+attack", "-attack", "+zoom"]);

        sys.respond(&key_event(EventType::KeyUp, 'K'));
        assert_eq!(
            sys.executed,
            vec!["+attack", "-attack", "+zoom", "-zoom"]
        );
    }

    #[test]
    fn test_disable_releases_commands_of_disabled_class() {
        let mut sys = BindingSystem::new();
        sys.bind(key_event(EventType::KeyDown, 'K'), Some("+attack"), 0);
        sys.bind(key_event(EventType::KeyDown, 'K'), Some("+zoom"), 2);
        sys.set_class_active(2, Some(true));

        sys.respond(&key_event(EventType::KeyDown, 'K'));
        sys.executed.clear();

        // Turning map back off must release +zoom in class map.
        sys.set_class_active(2, Some(false));
        sys.flush_posted();
        assert!(sys.executed.contains(&"-zoom".to_string()));
    }

    #[test]
    fn test_no_release_when_higher_class_already_won() {
        // If a higher active class already owned the command, enabling a
        // lower class posts nothing.
        let mut sys = BindingSystem::new();
        sys.bind(key_event(EventType::KeyDown, 'K'), Some("+attack"), 0);
        sys.bind(key_event(EventType::KeyDown, 'K'), Some("+zoom"), 2);
        sys.set_class_active(2, Some(true));
        sys.respond(&key_event(EventType::KeyDown, 'K'));
        sys.executed.clear();

        // Enable biaseditor (1): map (2) still outranks everything with
        // a command here.
        sys.set_class_active(1, Some(true));
        sys.flush_posted();
        assert!(sys.executed.is_empty());
    }

    #[test]
    fn test_serialize_parse_round_trip() {
        let mut sys = BindingSystem::new();
        sys.bind(key_event(EventType::KeyDown, 'K'), Some("+attack"), 0);
        sys.bind(
            InputEvent::new(EventType::MouseButtonDown, 0b10),
            Some("+fire"),
            2,
        );
        sys.bind(event_from_text("+space").unwrap(), Some("jump"), 0);

        // The `+` commands were auto-paired with their releases.
        let text = sys.write_bindings();
        let mut parsed = BindingSystem::new();
        let count = parsed.parse_bindings(&text);
        assert_eq!(count, 5);
        assert_eq!(parsed.write_bindings(), text);
    }

    #[test]
    fn test_parse_classless_lines_default_to_game() {
        let mut sys = BindingSystem::new();
        sys.parse_bindings("bind +K \"+attack\"\n");
        assert_eq!(sys.binding_count(), 1);
        sys.respond(&key_event(EventType::KeyDown, 'K'));
        assert_eq!(sys.executed, vec!["+attack"]);
    }

    #[test]
    fn test_delbind_removes_by_command() {
        let mut sys = BindingSystem::new();
        sys.bind(key_event(EventType::KeyDown, 'K'), Some("+attack"), 0);
        sys.bind(key_event(EventType::KeyDown, 'J'), Some("+attack"), 0);
        sys.bind(key_event(EventType::KeyDown, 'L'), Some("jump"), 0);

        sys.clear_command("+attack", None);
        sys.clear_command("-attack", None);
        assert_eq!(sys.binding_count(), 1);
        assert_eq!(sys.bindings_for_command("jump", None).len(), 1);
    }
}
