//! Input events and their textual representation.
//!
//! The text grammar is what the binding persistence format uses:
//! a `+`/`-`/`*` prefix (down/up/repeat), then `MB<n>`, `MWup`,
//! `MWdown`, `JB<n>`, `POV<dir>`, a named key, or a bare character.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    KeyDown,
    KeyRepeat,
    KeyUp,
    MouseButtonDown,
    MouseButtonUp,
    JoyButtonDown,
    JoyButtonUp,
    PovDown,
    PovUp,
    /// Axis motion; never dispatched through bindings.
    MouseAxis,
    JoyAxis,
}

impl EventType {
    pub fn is_down(&self) -> bool {
        matches!(
            self,
            EventType::KeyDown
                | EventType::MouseButtonDown
                | EventType::JoyButtonDown
                | EventType::PovDown
        )
    }

    /// The paired release type for a press type.
    pub fn up_counterpart(&self) -> EventType {
        match self {
            EventType::KeyDown | EventType::KeyRepeat => EventType::KeyUp,
            EventType::MouseButtonDown => EventType::MouseButtonUp,
            EventType::JoyButtonDown => EventType::JoyButtonUp,
            EventType::PovDown => EventType::PovUp,
            other => *other,
        }
    }

    pub fn is_axis(&self) -> bool {
        matches!(self, EventType::MouseAxis | EventType::JoyAxis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub ty: EventType,
    /// Key code, button mask or POV direction index.
    pub datum: i32,
    /// Dispatch in this specific class regardless of activity. Only set
    /// on synthetic events posted by the binding engine itself.
    pub use_class: Option<usize>,
}

impl InputEvent {
    pub fn new(ty: EventType, datum: i32) -> InputEvent {
        InputEvent {
            ty,
            datum,
            use_class: None,
        }
    }

    /// Binding match rule: keys and POV by equality, buttons by mask
    /// intersection, axes never.
    pub fn matches(&self, bound: &InputEvent) -> bool {
        if self.ty != bound.ty {
            return false;
        }
        match self.ty {
            EventType::KeyDown
            | EventType::KeyRepeat
            | EventType::KeyUp
            | EventType::PovDown
            | EventType::PovUp => self.datum == bound.datum,
            EventType::MouseButtonDown
            | EventType::MouseButtonUp
            | EventType::JoyButtonDown
            | EventType::JoyButtonUp => (self.datum & bound.datum) != 0,
            _ => false,
        }
    }
}

/// Mouse wheel pseudo-buttons.
pub const MWHEEL_UP: i32 = 1 << 12;
pub const MWHEEL_DOWN: i32 = 1 << 13;

/// Named key codes outside the printable range.
pub mod key {
    pub const PAUSE: i32 = 256;
    pub const ESCAPE: i32 = 257;
    pub const RIGHT: i32 = 258;
    pub const LEFT: i32 = 259;
    pub const UP: i32 = 260;
    pub const DOWN: i32 = 261;
    pub const ENTER: i32 = 262;
    pub const TAB: i32 = 263;
    pub const SHIFT: i32 = 264;
    pub const CTRL: i32 = 265;
    pub const ALT: i32 = 266;
    pub const INS: i32 = 267;
    pub const DEL: i32 = 268;
    pub const PGUP: i32 = 269;
    pub const PGDN: i32 = 270;
    pub const HOME: i32 = 271;
    pub const END: i32 = 272;
    pub const BACKSPACE: i32 = 273;
    pub const F1: i32 = 274;
    pub const F2: i32 = 275;
    pub const F3: i32 = 276;
    pub const F4: i32 = 277;
    pub const F5: i32 = 278;
    pub const F6: i32 = 279;
    pub const F7: i32 = 280;
    pub const F8: i32 = 281;
    pub const F9: i32 = 282;
    pub const F10: i32 = 283;
    pub const F11: i32 = 284;
    pub const F12: i32 = 285;
}

/// Key name table. Aliases map to the same code; the first entry for a
/// code is the canonical spelling used when writing.
const KEY_NAMES: &[(i32, &str)] = &[
    (key::PAUSE, "pause"),
    (key::ESCAPE, "escape"),
    (key::ESCAPE, "esc"),
    (key::RIGHT, "right"),
    (key::LEFT, "left"),
    (key::UP, "up"),
    (key::DOWN, "down"),
    (key::ENTER, "enter"),
    (key::TAB, "tab"),
    (key::SHIFT, "shift"),
    (key::CTRL, "ctrl"),
    (key::ALT, "alt"),
    (key::INS, "ins"),
    (key::DEL, "del"),
    (key::PGUP, "pgup"),
    (key::PGDN, "pgdown"),
    (key::PGDN, "pgdn"),
    (key::HOME, "home"),
    (key::END, "end"),
    (key::BACKSPACE, "bkspc"),
    (b' ' as i32, "space"),
    (b';' as i32, "smcln"),
    (b'"' as i32, "quote"),
    (key::F10, "f10"),
    (key::F11, "f11"),
    (key::F12, "f12"),
    (key::F1, "f1"),
    (key::F2, "f2"),
    (key::F3, "f3"),
    (key::F4, "f4"),
    (key::F5, "f5"),
    (key::F6, "f6"),
    (key::F7, "f7"),
    (key::F8, "f8"),
    (key::F9, "f9"),
    (b'`' as i32, "tilde"),
];

const POV_DIR_NAMES: [&str; 8] = ["F", "FR", "R", "BR", "B", "BL", "L", "FL"];

fn short_name_for_key(code: i32) -> Option<&'static str> {
    KEY_NAMES
        .iter()
        .find(|(k, _)| *k == code)
        .map(|(_, name)| *name)
}

fn key_by_short_name(name: &str) -> Option<i32> {
    KEY_NAMES
        .iter()
        .find(|(_, n)| name.eq_ignore_ascii_case(n))
        .map(|(k, _)| *k)
}

fn button_number(mask: i32) -> i32 {
    for i in 0..32 {
        if mask & (1 << i) != 0 {
            return i;
        }
    }
    -1
}

/// Event to text, e.g. `+space`, `-MB2`, `*a`, `+POVfr`.
pub fn event_to_text(ev: &InputEvent) -> Option<String> {
    match ev.ty {
        EventType::KeyDown | EventType::KeyRepeat | EventType::KeyUp => {
            let prefix = match ev.ty {
                EventType::KeyDown => '+',
                EventType::KeyUp => '-',
                _ => '*',
            };
            if let Some(name) = short_name_for_key(ev.datum) {
                Some(format!("{}{}", prefix, name))
            } else if ev.datum > 32 && ev.datum < 128 {
                Some(format!("{}{}", prefix, ev.datum as u8 as char))
            } else {
                None
            }
        }
        EventType::MouseButtonDown | EventType::MouseButtonUp => {
            let prefix = if ev.ty == EventType::MouseButtonDown {
                '+'
            } else {
                '-'
            };
            if ev.datum & (MWHEEL_UP | MWHEEL_DOWN) != 0 {
                Some(format!(
                    "{}MW{}",
                    prefix,
                    if ev.datum & MWHEEL_UP != 0 { "up" } else { "down" }
                ))
            } else {
                Some(format!("{}MB{}", prefix, button_number(ev.datum) + 1))
            }
        }
        EventType::JoyButtonDown | EventType::JoyButtonUp => {
            let prefix = if ev.ty == EventType::JoyButtonDown {
                '+'
            } else {
                '-'
            };
            Some(format!("{}JB{}", prefix, button_number(ev.datum) + 1))
        }
        EventType::PovDown | EventType::PovUp => {
            let prefix = if ev.ty == EventType::PovDown { '+' } else { '-' };
            POV_DIR_NAMES
                .get(ev.datum as usize)
                .map(|dir| format!("{}POV{}", prefix, dir))
        }
        _ => None,
    }
}

/// Text to event; the reverse of `event_to_text`. Down is the default
/// prefix.
pub fn event_from_text(text: &str) -> Option<InputEvent> {
    if text.is_empty() {
        return None;
    }

    let (prefix, begin) = {
        let first = text.chars().next().unwrap();
        if text.len() > 1 && matches!(first, '+' | '-' | '*') {
            (first, &text[1..])
        } else {
            ('+', text)
        }
    };

    let lower = begin.to_ascii_lowercase();
    if let Some(rest) = lower.strip_prefix("mb") {
        let n: i32 = rest.parse().ok()?;
        let ty = if prefix == '+' {
            EventType::MouseButtonDown
        } else {
            EventType::MouseButtonUp
        };
        return Some(InputEvent::new(ty, 1 << (n - 1)));
    }
    if let Some(rest) = lower.strip_prefix("mw") {
        let ty = if prefix == '+' {
            EventType::MouseButtonDown
        } else {
            EventType::MouseButtonUp
        };
        let datum = if rest.eq_ignore_ascii_case("up") {
            MWHEEL_UP
        } else {
            MWHEEL_DOWN
        };
        return Some(InputEvent::new(ty, datum));
    }
    if let Some(rest) = lower.strip_prefix("jb") {
        let n: i32 = rest.parse().ok()?;
        let ty = if prefix == '+' {
            EventType::JoyButtonDown
        } else {
            EventType::JoyButtonUp
        };
        return Some(InputEvent::new(ty, 1 << (n - 1)));
    }
    if let Some(rest) = lower.strip_prefix("pov") {
        let ty = if prefix == '+' {
            EventType::PovDown
        } else {
            EventType::PovUp
        };
        let datum = POV_DIR_NAMES
            .iter()
            .position(|d| d.eq_ignore_ascii_case(rest))
            .map(|i| i as i32)
            .unwrap_or(-1);
        return Some(InputEvent::new(ty, datum));
    }

    let ty = match prefix {
        '+' => EventType::KeyDown,
        '*' => EventType::KeyRepeat,
        _ => EventType::KeyUp,
    };
    let datum = key_by_short_name(begin).unwrap_or_else(|| begin.as_bytes()[0] as i32);
    Some(InputEvent::new(ty, datum))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_round_trip() {
        for text in ["+space", "-enter", "*a", "+K", "+f10"] {
            let ev = event_from_text(text).unwrap();
            let back = event_to_text(&ev).unwrap();
            assert!(back.eq_ignore_ascii_case(text), "{} -> {}", text, back);
        }
    }

    #[test]
    fn test_button_round_trip() {
        let ev = event_from_text("+MB3").unwrap();
        assert_eq!(ev.ty, EventType::MouseButtonDown);
        assert_eq!(ev.datum, 0b100);
        assert_eq!(event_to_text(&ev).unwrap(), "+MB3");

        let ev = event_from_text("-JB1").unwrap();
        assert_eq!(ev.ty, EventType::JoyButtonUp);
        assert_eq!(event_to_text(&ev).unwrap(), "-JB1");

        let ev = event_from_text("+MWup").unwrap();
        assert_eq!(ev.datum, MWHEEL_UP);
        assert_eq!(event_to_text(&ev).unwrap(), "+MWup");
    }

    #[test]
    fn test_pov_round_trip() {
        let ev = event_from_text("+POVfr").unwrap();
        assert_eq!(ev.ty, EventType::PovDown);
        assert_eq!(ev.datum, 1);
        assert_eq!(event_to_text(&ev).unwrap(), "+POVFR");
    }

    #[test]
    fn test_default_prefix_is_down() {
        let ev = event_from_text("space").unwrap();
        assert_eq!(ev.ty, EventType::KeyDown);
    }

    #[test]
    fn test_chord_matching_for_buttons() {
        let bound = InputEvent::new(EventType::MouseButtonDown, 0b0011);
        let pressed = InputEvent::new(EventType::MouseButtonDown, 0b0010);
        assert!(pressed.matches(&bound));
        let other = InputEvent::new(EventType::MouseButtonDown, 0b0100);
        assert!(!other.matches(&bound));
    }

    #[test]
    fn test_axis_events_never_match() {
        let bound = InputEvent::new(EventType::MouseAxis, 1);
        let ev = InputEvent::new(EventType::MouseAxis, 1);
        assert!(!ev.matches(&bound));
    }
}
