//! Key interception.
//!
//! Every key press that reaches splitwm (today through the `press` command,
//! which a compositor binding forwards) is matched here against the active
//! mode.  Matching only reads an `Arc` snapshot of the registry and never
//! touches the layout trees, so it is cheap enough to answer an input hook
//! synchronously.

use crate::hotkey::{Hotkey, KeyCode, Modifiers};
use crate::registry::SharedRegistry;
use log::debug;

/// What should happen to the hardware event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDecision {
    /// Swallow the event.
    Suppress,
    /// Let the foreground application see it too.
    PassThrough,
}

/// A key press that matched a binding.
#[derive(Debug, Clone, PartialEq)]
pub struct Interception {
    pub hotkey: Hotkey,
    pub decision: EventDecision,
}

/// Match a key press against the active mode.
///
/// Unbound chords give `None` and always pass through.  A bound chord is
/// suppressed unless its hotkey asks for passthrough.
pub fn intercept_key(
    registry: &SharedRegistry,
    modifiers: Modifiers,
    key: KeyCode,
) -> Option<Interception> {
    let hotkey = registry.match_event(modifiers, key)?;
    let decision = if hotkey.passthrough {
        EventDecision::PassThrough
    } else {
        EventDecision::Suppress
    };
    debug!("{}+{} -> {} ({:?})", modifiers.label(), key, hotkey.action, decision);
    Some(Interception { hotkey, decision })
}
