//! Input binding engine: classed event-to-command bindings with
//! release-consistent class switching.

pub mod bindings;
pub mod events;

pub use bindings::{BindClass, Binding, BindingSystem};
pub use events::{event_from_text, event_to_text, EventType, InputEvent};
