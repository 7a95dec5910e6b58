//! Hotkeys and the named modes that group them.
//!
//! A [`HotkeyMode`] maps an exact `(modifiers, keycode)` chord to at most one
//! [`Hotkey`].  Matching never falls back to another mode or to a looser
//! modifier set: an event either matches exactly or passes through.
//!
//! Matched hotkeys are handed out as owned values, so callers never have
//! to decide who releases them.

use crate::command::Command;
use bitflags::bitflags;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

bitflags! {
    /// Modifier keys held during a key event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Modifiers: u32 {
        /// The primary modifier (Command on macOS, Super elsewhere).
        const CMD = 1;
        const ALT = 1 << 1;
        const CTRL = 1 << 2;
        const SHIFT = 1 << 3;
    }
}

/// A modifier name that is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown modifier: {0:?}")]
pub struct UnknownModifier(pub String);

impl Modifiers {
    /// Parse a `+`-separated modifier list such as `"cmd+shift"`.
    ///
    /// Common aliases are accepted (`super`, `primary`, `opt`, `control`, …).
    /// An empty string or `"none"` yields no modifiers.
    pub fn parse(s: &str) -> Result<Self, UnknownModifier> {
        let mut mods = Modifiers::empty();
        for part in s.split('+').map(str::trim).filter(|p| !p.is_empty()) {
            mods |= match part.to_lowercase().as_str() {
                "cmd" | "command" | "super" | "meta" | "primary" => Modifiers::CMD,
                "alt" | "opt" | "option" => Modifiers::ALT,
                "ctrl" | "control" => Modifiers::CTRL,
                "shift" => Modifiers::SHIFT,
                "none" => Modifiers::empty(),
                _ => return Err(UnknownModifier(part.to_string())),
            };
        }
        Ok(mods)
    }

    /// Canonical `+`-separated text form, `"none"` when empty.
    pub fn label(&self) -> String {
        if self.is_empty() {
            return "none".to_string();
        }
        let names = [
            (Modifiers::CMD, "cmd"),
            (Modifiers::ALT, "alt"),
            (Modifiers::CTRL, "ctrl"),
            (Modifiers::SHIFT, "shift"),
        ];
        names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect::<Vec<_>>()
            .join("+")
    }
}

impl<'de> Deserialize<'de> for Modifiers {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Modifiers::parse(&s).map_err(DeError::custom)
    }
}

/// Hardware-independent key code as delivered by the input interception
/// layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCode(pub u32);

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for KeyCode {
    type Err = std::num::ParseIntError;

    /// Accepts decimal (`123`) or hexadecimal (`0x7B`) key codes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u32::from_str_radix(hex, 16).map(KeyCode),
            None => s.parse().map(KeyCode),
        }
    }
}

/// Wire format for key codes: accepts a number or a string (decimal or hex).
impl<'de> Deserialize<'de> for KeyCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Visitor;
        struct V;
        impl<'de> Visitor<'de> for V {
            type Value = KeyCode;
            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "key code as integer or string")
            }
            fn visit_u64<E>(self, n: u64) -> Result<KeyCode, E>
            where
                E: DeError,
            {
                u32::try_from(n)
                    .map(KeyCode)
                    .map_err(|_| DeError::custom(format!("key code {} out of range", n)))
            }
            fn visit_str<E>(self, s: &str) -> Result<KeyCode, E>
            where
                E: DeError,
            {
                s.parse()
                    .map_err(|_| DeError::custom(format!("invalid key code: {:?}", s)))
            }
        }
        deserializer.deserialize_any(V)
    }
}

/// The lookup key of a binding inside one mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyChord {
    pub modifiers: Modifiers,
    pub key: KeyCode,
}

/// A key binding and what it does.
#[derive(Debug, Clone, PartialEq)]
pub struct Hotkey {
    pub modifiers: Modifiers,
    pub key: KeyCode,
    pub action: Command,
    /// Whether the hardware event still reaches the foreground application
    /// after the action has been triggered.
    pub passthrough: bool,
}

impl Hotkey {
    pub fn chord(&self) -> KeyChord {
        KeyChord {
            modifiers: self.modifiers,
            key: self.key,
        }
    }
}

/// Name of the mode that always exists and is active after a reload.
pub const DEFAULT_MODE: &str = "default";

/// A named set of bindings; chords are unique within a mode.
#[derive(Debug, Clone, PartialEq)]
pub struct HotkeyMode {
    name: String,
    bindings: HashMap<KeyChord, Hotkey>,
}

impl HotkeyMode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bindings: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a binding, replacing (and returning) any previous binding for the
    /// same chord.
    pub fn bind(&mut self, hotkey: Hotkey) -> Option<Hotkey> {
        self.bindings.insert(hotkey.chord(), hotkey)
    }

    /// Exact lookup of a chord.
    pub fn lookup(&self, modifiers: Modifiers, key: KeyCode) -> Option<&Hotkey> {
        self.bindings.get(&KeyChord { modifiers, key })
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hotkey> {
        self.bindings.values()
    }
}
