//! Commands, notifications and the types shared across splitwm.
//!
//! This module defines the vocabulary every component speaks:
//! [`Command`] describes every action a user can request (from a hotkey or
//! the control channel), [`Notification`] describes every change the window
//! service reports, and [`WindowInfo`] / [`DisplayInfo`] carry what the
//! service knows about windows and displays.
//!
//! Commands have a line-oriented text form (`focus-left`,
//! `resize-ratio 0.6`, `mode resize`, …) which is what the control channel
//! carries and what hotkey actions are written in.

use crate::geometry::{Point, Rect};
use crate::hotkey::{KeyCode, Modifiers};
use crate::settings::SpaceMode;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

//  Identifiers

/// Opaque window identifier assigned by the window service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub u64);

/// Virtual desktop identifier assigned by the window service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpaceId(pub i64);

/// Display identifier assigned by the window service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayId(pub u32);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WindowId {
    type Err = std::num::ParseIntError;

    /// Accepts decimal (`42`) or hexadecimal (`0x2a`) ids.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16).map(WindowId),
            None => s.parse().map(WindowId),
        }
    }
}

impl FromStr for SpaceId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(SpaceId)
    }
}

//  Direction

/// Direction for neighbour navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Left => write!(f, "left"),
            Direction::Right => write!(f, "right"),
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Parse a direction string (case-insensitive; accepts "left", "West", …).
fn parse_direction(s: &str) -> Option<Direction> {
    let normalized: String = s
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(|c| c.to_lowercase())
        .collect();
    match normalized.as_str() {
        "left" | "west" => Some(Direction::Left),
        "right" | "east" => Some(Direction::Right),
        "up" | "north" => Some(Direction::Up),
        "down" | "south" => Some(Direction::Down),
        _ => None,
    }
}

impl<'de> Deserialize<'de> for Direction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_direction(&s).ok_or_else(|| DeError::custom(format!("invalid direction: {:?}", s)))
    }
}

//  Command arguments

/// Traversal order for `focus-next` / `focus-prev`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    Next,
    Prev,
}

/// Clockwise rotation applied to a whole layout tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Quarter,
    Half,
    ThreeQuarter,
}

impl Rotation {
    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Quarter => 90,
            Rotation::Half => 180,
            Rotation::ThreeQuarter => 270,
        }
    }

    fn from_degrees(s: &str) -> Option<Self> {
        match s.trim() {
            "90" => Some(Rotation::Quarter),
            "180" => Some(Rotation::Half),
            "270" => Some(Rotation::ThreeQuarter),
            _ => None,
        }
    }
}

/// Scratchpad sub-commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScratchpadOp {
    /// Hide the focused window in the scratchpad.
    Add,
    /// Take the focused window out of the scratchpad and tile it again.
    Remove,
    /// Show or hide the scratchpad entry at this index.
    Toggle(usize),
    /// Make every scratchpad window visible.
    ShowAll,
}

/// State queries answered with text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    Mode,
    Tree,
    Focused,
    Marked,
    Spaces,
}

//  Command

/// Every action the dispatcher can perform on behalf of a user.
///
/// Commands arrive as text on the control channel or are attached to a
/// [`Hotkey`](crate::hotkey::Hotkey) as its action.  The text form is documented on each variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `focus-<dir>`: focus the neighbouring window.
    Focus(Direction),
    /// `focus-next` / `focus-prev`: walk the tree's leaves in order.
    FocusCycle(Cycle),
    /// `focus-window <id>`
    FocusWindow(WindowId),
    /// `swap-<dir>`: exchange the focused window with its neighbour.
    Swap(Direction),
    /// `swap`: exchange the focused and the marked window.
    SwapMarked,
    /// `mark [<id>]`: mark the given window, or the focused one.
    Mark(Option<WindowId>),
    /// `unmark`
    Unmark,
    /// `insert-marked`: move the marked window next to the focused one.
    InsertMarked,
    /// `resize-ratio <r>`: set the ratio of the focused window's parent split.
    ResizeRatio(f64),
    /// `adjust-ratio <delta>`: change that ratio relative to its value.
    AdjustRatio(f64),
    /// `rotate 90|180|270`
    Rotate(Rotation),
    /// `flip`: swap the children of the focused window's parent split.
    Flip,
    /// `toggle-split`: flip the orientation of the focused window's parent split.
    ToggleSplit,
    /// `toggle-float`
    ToggleFloat,
    /// `space-mode bsp|monocle|float`
    SetSpaceMode(SpaceMode),
    /// `mode <name>`: activate a hotkey mode.
    Mode(String),
    /// `reload-config`
    ReloadConfig,
    /// `refresh [<space>]`: reconcile a space with the window service.
    Refresh(Option<SpaceId>),
    /// `set <option> <value>`
    Set { name: String, value: String },
    /// `scratchpad add|remove|toggle <n>|show-all`
    Scratchpad(ScratchpadOp),
    /// `query mode|tree|focused|marked|spaces`
    Query(Query),
    /// `press <modifiers> <key>`: run a key event through the hotkey matcher.
    Press { modifiers: Modifiers, key: KeyCode },
    /// `exec <shell command>`
    Exec(String),
    /// `quit`
    Quit,
}

/// Error from parsing the text form of a [`Command`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseCommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0:?}")]
    Unknown(String),
    #[error("{0}: missing argument")]
    MissingArgument(String),
    #[error("{command}: unexpected argument {argument:?}")]
    UnexpectedArgument { command: String, argument: String },
    #[error("{command}: invalid argument {argument:?}")]
    InvalidArgument { command: String, argument: String },
}

fn invalid(command: &str, argument: &str) -> ParseCommandError {
    ParseCommandError::InvalidArgument {
        command: command.to_string(),
        argument: argument.to_string(),
    }
}

fn required<'a>(command: &str, rest: &'a str) -> Result<&'a str, ParseCommandError> {
    if rest.is_empty() {
        Err(ParseCommandError::MissingArgument(command.to_string()))
    } else {
        Ok(rest)
    }
}

/// Parse a finite floating point argument.
fn parse_number(command: &str, rest: &str) -> Result<f64, ParseCommandError> {
    let arg = required(command, rest)?;
    match arg.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(invalid(command, arg)),
    }
}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseCommandError::Empty);
        }
        let (head, rest) = match s.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (s, ""),
        };
        let bare = |cmd: Command| {
            if rest.is_empty() {
                Ok(cmd)
            } else {
                Err(ParseCommandError::UnexpectedArgument {
                    command: head.to_string(),
                    argument: rest.to_string(),
                })
            }
        };

        if let Some(dir) = head.strip_prefix("focus-").and_then(parse_direction) {
            return bare(Command::Focus(dir));
        }
        if let Some(dir) = head.strip_prefix("swap-").and_then(parse_direction) {
            return bare(Command::Swap(dir));
        }

        match head {
            "focus-next" => bare(Command::FocusCycle(Cycle::Next)),
            "focus-prev" => bare(Command::FocusCycle(Cycle::Prev)),
            "focus-window" => {
                let arg = required(head, rest)?;
                arg.parse()
                    .map(Command::FocusWindow)
                    .map_err(|_| invalid(head, arg))
            }
            "swap" => bare(Command::SwapMarked),
            "mark" if rest.is_empty() => Ok(Command::Mark(None)),
            "mark" => rest
                .parse()
                .map(|id| Command::Mark(Some(id)))
                .map_err(|_| invalid(head, rest)),
            "unmark" => bare(Command::Unmark),
            "insert-marked" => bare(Command::InsertMarked),
            "resize-ratio" => parse_number(head, rest).map(Command::ResizeRatio),
            "adjust-ratio" => parse_number(head, rest).map(Command::AdjustRatio),
            "rotate" => {
                let arg = required(head, rest)?;
                Rotation::from_degrees(arg)
                    .map(Command::Rotate)
                    .ok_or_else(|| invalid(head, arg))
            }
            "flip" => bare(Command::Flip),
            "toggle-split" => bare(Command::ToggleSplit),
            "toggle-float" => bare(Command::ToggleFloat),
            "space-mode" => {
                let arg = required(head, rest)?;
                arg.parse()
                    .map(Command::SetSpaceMode)
                    .map_err(|_| invalid(head, arg))
            }
            "mode" => required(head, rest).map(|name| Command::Mode(name.to_string())),
            "reload-config" => bare(Command::ReloadConfig),
            "refresh" if rest.is_empty() => Ok(Command::Refresh(None)),
            "refresh" => rest
                .parse()
                .map(|space| Command::Refresh(Some(space)))
                .map_err(|_| invalid(head, rest)),
            "set" => {
                let arg = required(head, rest)?;
                let (name, value) = arg
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| ParseCommandError::MissingArgument(head.to_string()))?;
                Ok(Command::Set {
                    name: name.to_string(),
                    value: value.trim().to_string(),
                })
            }
            "scratchpad" => {
                let arg = required(head, rest)?;
                let (op, index) = match arg.split_once(char::is_whitespace) {
                    Some((op, index)) => (op, index.trim()),
                    None => (arg, ""),
                };
                let op = match (op, index) {
                    ("add", "") => ScratchpadOp::Add,
                    ("remove", "") => ScratchpadOp::Remove,
                    ("show-all", "") => ScratchpadOp::ShowAll,
                    ("toggle", index) => ScratchpadOp::Toggle(
                        required(head, index)?
                            .parse()
                            .map_err(|_| invalid(head, index))?,
                    ),
                    _ => return Err(invalid(head, arg)),
                };
                Ok(Command::Scratchpad(op))
            }
            "query" => {
                let arg = required(head, rest)?;
                let query = match arg {
                    "mode" => Query::Mode,
                    "tree" => Query::Tree,
                    "focused" => Query::Focused,
                    "marked" => Query::Marked,
                    "spaces" => Query::Spaces,
                    _ => return Err(invalid(head, arg)),
                };
                Ok(Command::Query(query))
            }
            "press" => {
                let arg = required(head, rest)?;
                let (mods, key) = match arg.rsplit_once(char::is_whitespace) {
                    Some((mods, key)) => (mods.trim(), key),
                    None => ("", arg),
                };
                let modifiers = Modifiers::parse(mods).map_err(|_| invalid(head, mods))?;
                let key = key.parse().map_err(|_| invalid(head, key))?;
                Ok(Command::Press { modifiers, key })
            }
            "exec" => required(head, rest).map(|cmd| Command::Exec(cmd.to_string())),
            "quit" => bare(Command::Quit),
            _ => Err(ParseCommandError::Unknown(head.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Focus(dir) => write!(f, "focus-{}", dir),
            Command::FocusCycle(Cycle::Next) => write!(f, "focus-next"),
            Command::FocusCycle(Cycle::Prev) => write!(f, "focus-prev"),
            Command::FocusWindow(id) => write!(f, "focus-window {}", id),
            Command::Swap(dir) => write!(f, "swap-{}", dir),
            Command::SwapMarked => write!(f, "swap"),
            Command::Mark(None) => write!(f, "mark"),
            Command::Mark(Some(id)) => write!(f, "mark {}", id),
            Command::Unmark => write!(f, "unmark"),
            Command::InsertMarked => write!(f, "insert-marked"),
            Command::ResizeRatio(r) => write!(f, "resize-ratio {}", r),
            Command::AdjustRatio(d) => write!(f, "adjust-ratio {}", d),
            Command::Rotate(r) => write!(f, "rotate {}", r.degrees()),
            Command::Flip => write!(f, "flip"),
            Command::ToggleSplit => write!(f, "toggle-split"),
            Command::ToggleFloat => write!(f, "toggle-float"),
            Command::SetSpaceMode(mode) => write!(f, "space-mode {}", mode),
            Command::Mode(name) => write!(f, "mode {}", name),
            Command::ReloadConfig => write!(f, "reload-config"),
            Command::Refresh(None) => write!(f, "refresh"),
            Command::Refresh(Some(space)) => write!(f, "refresh {}", space),
            Command::Set { name, value } => write!(f, "set {} {}", name, value),
            Command::Scratchpad(ScratchpadOp::Add) => write!(f, "scratchpad add"),
            Command::Scratchpad(ScratchpadOp::Remove) => write!(f, "scratchpad remove"),
            Command::Scratchpad(ScratchpadOp::Toggle(i)) => write!(f, "scratchpad toggle {}", i),
            Command::Scratchpad(ScratchpadOp::ShowAll) => write!(f, "scratchpad show-all"),
            Command::Query(q) => {
                let what = match q {
                    Query::Mode => "mode",
                    Query::Tree => "tree",
                    Query::Focused => "focused",
                    Query::Marked => "marked",
                    Query::Spaces => "spaces",
                };
                write!(f, "query {}", what)
            }
            Command::Press { modifiers, key } if modifiers.is_empty() => write!(f, "press {}", key),
            Command::Press { modifiers, key } => write!(f, "press {} {}", modifiers.label(), key),
            Command::Exec(cmd) => write!(f, "exec {}", cmd),
            Command::Quit => write!(f, "quit"),
        }
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(DeError::custom)
    }
}

//  Window service data

/// What the window service reports about one window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowInfo {
    pub id: WindowId,
    /// Human-readable title.
    pub title: String,
    /// Owning application name (class on X11/Wayland, bundle name on macOS).
    pub app: String,
    /// Current frame in global coordinates.
    pub frame: Rect,
    /// Space the window lives on.
    pub space: SpaceId,
    /// Whether the service itself considers the window floating (dialogs,
    /// panels, …).  Such windows are never tiled.
    pub floating: bool,
}

/// What the window service reports about one display.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayInfo {
    pub id: DisplayId,
    /// Name the service uses for this display (e.g. `"DP-1"`).
    pub name: String,
    /// Usable content rectangle (excluding bars and docks).
    pub frame: Rect,
    /// Space currently shown on this display.
    pub active_space: SpaceId,
}

/// Find the display in the given direction relative to `current`.
///
/// Compares display centres and returns the closest display whose centre
/// lies in the requested direction.  Returns `None` if there is none or if
/// `current` is not in the list.
pub fn find_display_in_direction(
    displays: &[DisplayInfo],
    current: DisplayId,
    direction: Direction,
) -> Option<&DisplayInfo> {
    let origin = displays.iter().find(|d| d.id == current)?.frame.center();

    displays
        .iter()
        .filter(|d| d.id != current)
        .filter(|d| {
            let c = d.frame.center();
            match direction {
                Direction::Right => c.x > origin.x,
                Direction::Left => c.x < origin.x,
                Direction::Down => c.y > origin.y,
                Direction::Up => c.y < origin.y,
            }
        })
        .min_by(|a, b| {
            let dist = |d: &DisplayInfo| -> f64 {
                let c = d.frame.center();
                let dx = c.x - origin.x;
                let dy = c.y - origin.y;
                dx * dx + dy * dy
            };
            dist(a)
                .partial_cmp(&dist(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

//  Notifications and events

/// A change reported by the window service.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    WindowCreated(WindowInfo),
    WindowDestroyed(WindowId),
    WindowMoved { window: WindowId, frame: Rect },
    /// The window was sent to another space.
    WindowSpaceChanged { window: WindowId, space: SpaceId },
    FocusChanged(Option<WindowId>),
    /// `display` now shows `space`.
    SpaceChanged { display: DisplayId, space: SpaceId },
    SpaceDestroyed(SpaceId),
    /// Displays were added, removed or rearranged.
    DisplayChanged,
}

/// Everything the primary execution context consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Notification(Notification),
    MouseMoved(Point),
}
