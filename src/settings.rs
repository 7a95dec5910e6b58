//! Process-wide tiling settings.
//!
//! [`Settings`] holds the global defaults plus per-space and per-display
//! [`Overrides`] and the [`WindowRule`] list.  Options are addressed by
//! name (`split-ratio`, `gap`, …) through [`Settings::set_option`] so the
//! configuration file and the `set` command share one code path.

use crate::command::{DisplayId, SpaceId, WindowInfo};
use crate::geometry::Padding;
use crate::tree::{clamp_ratio, SplitPolicy};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// How the orientation of a new split is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    /// Compare the leaf's aspect ratio with [`Settings::optimal_ratio`].
    Optimal,
    /// Alternate with tree depth, starting vertical at the root.
    Alternate,
    Vertical,
    Horizontal,
}

/// Layout kind of a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceMode {
    /// Binary space partitioning.
    Bsp,
    /// Single-focus: every tiled window fills the content area.
    Monocle,
    /// Windows are left where they are.
    Float,
}

/// Whether moving the mouse changes focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusMode {
    /// Focus follows the mouse.
    Autoraise,
    Off,
}

/// What happens when focus navigation runs off the edge of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleMode {
    /// Wrap around within the same display.
    Screen,
    /// Continue on the neighbouring display.
    All,
    Off,
}

/// Where a newly observed window goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Tile,
    Float,
}

macro_rules! keyword_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $($ty::$variant => write!(f, $text),)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Ok($ty::$variant),)+
                    other => Err(format!("unknown {}: {:?}", stringify!($ty), other)),
                }
            }
        }
    };
}

keyword_enum!(SplitMode { Optimal => "optimal", Alternate => "alternate", Vertical => "vertical", Horizontal => "horizontal" });
keyword_enum!(SpaceMode { Bsp => "bsp", Monocle => "monocle", Float => "float" });
keyword_enum!(FocusMode { Autoraise => "autoraise", Off => "off" });
keyword_enum!(CycleMode { Screen => "screen", All => "all", Off => "off" });
keyword_enum!(Placement { Tile => "tile", Float => "float" });

/// Settings that can be overridden for one space or one display.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Overrides {
    pub mode: Option<SpaceMode>,
    pub padding: Option<Padding>,
    pub gap: Option<f64>,
    pub split_ratio: Option<f64>,
}

/// Assigns a placement to windows by application name and/or title.
///
/// All given criteria must match (case-insensitive substring).  A rule
/// without any criterion never matches.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WindowRule {
    #[serde(default)]
    pub app: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    pub placement: Placement,
}

impl WindowRule {
    pub fn matches(&self, window: &WindowInfo) -> bool {
        if self.app.is_none() && self.title.is_none() {
            return false;
        }
        let contains = |haystack: &str, needle: &str| {
            haystack.to_lowercase().contains(&needle.to_lowercase())
        };
        if let Some(app) = &self.app {
            if !contains(&window.app, app) {
                return false;
            }
        }
        if let Some(title) = &self.title {
            if !contains(&window.title, title) {
                return false;
            }
        }
        true
    }
}

/// Error from setting an option by name.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OptionError {
    #[error("unknown option: {0:?}")]
    Unknown(String),
    #[error("invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
}

/// Global tiling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub split_ratio: f64,
    pub split_mode: SplitMode,
    pub optimal_ratio: f64,
    pub space_mode: SpaceMode,
    pub focus_mode: FocusMode,
    pub cycle_mode: CycleMode,
    pub padding: Padding,
    pub gap: f64,
    /// Warp the cursor to windows focused by a command.
    pub mouse_follows_focus: bool,
    /// Match key events against hotkey modes at all.
    pub builtin_hotkeys: bool,
    /// Suspend focus-follows-mouse while a floating window has focus.
    pub standby_on_float: bool,
    /// Centre a window on its display when it starts floating.
    pub center_on_float: bool,
    pub space_overrides: HashMap<SpaceId, Overrides>,
    pub display_overrides: HashMap<DisplayId, Overrides>,
    pub rules: Vec<WindowRule>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            split_ratio: 0.5,
            split_mode: SplitMode::Optimal,
            optimal_ratio: 1.618,
            space_mode: SpaceMode::Bsp,
            focus_mode: FocusMode::Autoraise,
            cycle_mode: CycleMode::Screen,
            padding: Padding::default(),
            gap: 0.0,
            mouse_follows_focus: true,
            builtin_hotkeys: true,
            standby_on_float: true,
            center_on_float: true,
            space_overrides: HashMap::new(),
            display_overrides: HashMap::new(),
            rules: Vec::new(),
        }
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool, OptionError> {
    match value.trim().to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(invalid_value(name, value, "expected on or off")),
    }
}

fn parse_f64(name: &str, value: &str) -> Result<f64, OptionError> {
    match value.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(invalid_value(name, value, "expected a number")),
    }
}

/// Parse `"top bottom left right"` or a single value for all edges.
fn parse_padding(name: &str, value: &str) -> Result<Padding, OptionError> {
    let parts = value
        .split_whitespace()
        .map(|p| parse_f64(name, p))
        .collect::<Result<Vec<_>, _>>()?;
    if parts.iter().any(|p| *p < 0.0) {
        return Err(invalid_value(name, value, "padding must not be negative"));
    }
    match parts.as_slice() {
        [all] => Ok(Padding::uniform(*all)),
        [top, bottom, left, right] => Ok(Padding {
            top: *top,
            bottom: *bottom,
            left: *left,
            right: *right,
        }),
        _ => Err(invalid_value(name, value, "expected one or four numbers")),
    }
}

fn parse_keyword<T: FromStr<Err = String>>(name: &str, value: &str) -> Result<T, OptionError> {
    value
        .parse::<T>()
        .map_err(|reason| invalid_value(name, value, &reason))
}

fn invalid_value(name: &str, value: &str, reason: &str) -> OptionError {
    OptionError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

impl Settings {
    /// Set one option by name.  On error the settings are left unchanged.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<(), OptionError> {
        match name {
            "split-ratio" => self.split_ratio = clamp_ratio(parse_f64(name, value)?),
            "split-mode" => self.split_mode = parse_keyword(name, value)?,
            "optimal-ratio" => {
                let ratio = parse_f64(name, value)?;
                if ratio <= 0.0 {
                    return Err(invalid_value(name, value, "must be positive"));
                }
                self.optimal_ratio = ratio;
            }
            "space-mode" => self.space_mode = parse_keyword(name, value)?,
            "focus-mode" => self.focus_mode = parse_keyword(name, value)?,
            "cycle-mode" => self.cycle_mode = parse_keyword(name, value)?,
            "padding" => self.padding = parse_padding(name, value)?,
            "gap" => {
                let gap = parse_f64(name, value)?;
                if gap < 0.0 {
                    return Err(invalid_value(name, value, "must not be negative"));
                }
                self.gap = gap;
            }
            "mouse-follows-focus" => self.mouse_follows_focus = parse_flag(name, value)?,
            "builtin-hotkeys" => self.builtin_hotkeys = parse_flag(name, value)?,
            "standby-on-float" => self.standby_on_float = parse_flag(name, value)?,
            "center-on-float" => self.center_on_float = parse_flag(name, value)?,
            _ => return Err(OptionError::Unknown(name.to_string())),
        }
        Ok(())
    }

    /// First non-empty override for `space` on `display`, most specific first.
    fn resolve<T>(
        &self,
        display: DisplayId,
        space: SpaceId,
        pick: impl Fn(&Overrides) -> Option<T>,
    ) -> Option<T> {
        self.space_overrides
            .get(&space)
            .and_then(&pick)
            .or_else(|| self.display_overrides.get(&display).and_then(&pick))
    }

    pub fn space_mode_for(&self, display: DisplayId, space: SpaceId) -> SpaceMode {
        self.resolve(display, space, |o| o.mode)
            .unwrap_or(self.space_mode)
    }

    pub fn padding_for(&self, display: DisplayId, space: SpaceId) -> Padding {
        self.resolve(display, space, |o| o.padding)
            .unwrap_or(self.padding)
    }

    pub fn gap_for(&self, display: DisplayId, space: SpaceId) -> f64 {
        self.resolve(display, space, |o| o.gap).unwrap_or(self.gap)
    }

    /// Split parameters for new windows on `space`.
    pub fn split_policy(&self, display: DisplayId, space: SpaceId) -> SplitPolicy {
        let ratio = self
            .resolve(display, space, |o| o.split_ratio)
            .map(clamp_ratio)
            .unwrap_or(self.split_ratio);
        SplitPolicy {
            mode: self.split_mode,
            ratio,
            optimal_ratio: self.optimal_ratio,
        }
    }

    /// Placement of the first rule matching `window`, tile by default.
    pub fn placement_for(&self, window: &WindowInfo) -> Placement {
        self.rules
            .iter()
            .find(|r| r.matches(window))
            .map(|r| r.placement)
            .unwrap_or(Placement::Tile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::WindowId;
    use crate::geometry::Rect;

    fn window(app: &str, title: &str) -> WindowInfo {
        WindowInfo {
            id: WindowId(1),
            title: title.into(),
            app: app.into(),
            frame: Rect::default(),
            space: SpaceId(1),
            floating: false,
        }
    }

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.split_ratio, 0.5);
        assert_eq!(s.split_mode, SplitMode::Optimal);
        assert_eq!(s.optimal_ratio, 1.618);
        assert_eq!(s.space_mode, SpaceMode::Bsp);
        assert_eq!(s.focus_mode, FocusMode::Autoraise);
        assert_eq!(s.cycle_mode, CycleMode::Screen);
        assert!(s.builtin_hotkeys);
    }

    #[test]
    fn set_known_options() {
        let mut s = Settings::default();
        s.set_option("split-mode", "alternate").unwrap();
        s.set_option("cycle-mode", "ALL").unwrap();
        s.set_option("gap", "8").unwrap();
        s.set_option("padding", "30 10 5 5").unwrap();
        s.set_option("mouse-follows-focus", "off").unwrap();
        assert_eq!(s.split_mode, SplitMode::Alternate);
        assert_eq!(s.cycle_mode, CycleMode::All);
        assert_eq!(s.gap, 8.0);
        assert_eq!(s.padding.top, 30.0);
        assert_eq!(s.padding.right, 5.0);
        assert!(!s.mouse_follows_focus);
    }

    #[test]
    fn split_ratio_is_clamped() {
        let mut s = Settings::default();
        s.set_option("split-ratio", "1.5").unwrap();
        assert_eq!(s.split_ratio, 0.9);
        s.set_option("split-ratio", "-3").unwrap();
        assert_eq!(s.split_ratio, 0.1);
    }

    #[test]
    fn invalid_values_leave_settings_unchanged() {
        let mut s = Settings::default();
        let before = s.clone();
        assert!(matches!(
            s.set_option("gap", "-1"),
            Err(OptionError::InvalidValue { .. })
        ));
        assert!(s.set_option("split-mode", "diagonal").is_err());
        assert!(s.set_option("padding", "1 2").is_err());
        assert!(s.set_option("optimal-ratio", "0").is_err());
        assert_eq!(
            s.set_option("wobbly-windows", "on"),
            Err(OptionError::Unknown("wobbly-windows".into()))
        );
        assert_eq!(s, before);
    }

    #[test]
    fn keyword_options_report_the_bad_value() {
        let mut s = Settings::default();
        s.set_option("space-mode", "Monocle").unwrap();
        assert_eq!(s.space_mode, SpaceMode::Monocle);
        match s.set_option("cycle-mode", "sideways") {
            Err(OptionError::InvalidValue { name, value, reason }) => {
                assert_eq!(name, "cycle-mode");
                assert_eq!(value, "sideways");
                assert!(reason.contains("CycleMode"), "{}", reason);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(s.cycle_mode, CycleMode::Screen);
    }

    #[test]
    fn overrides_resolve_space_before_display() {
        let mut s = Settings::default();
        s.display_overrides.insert(
            DisplayId(1),
            Overrides {
                mode: Some(SpaceMode::Monocle),
                gap: Some(4.0),
                ..Default::default()
            },
        );
        s.space_overrides.insert(
            SpaceId(2),
            Overrides {
                mode: Some(SpaceMode::Float),
                split_ratio: Some(0.7),
                ..Default::default()
            },
        );
        assert_eq!(s.space_mode_for(DisplayId(1), SpaceId(2)), SpaceMode::Float);
        assert_eq!(s.space_mode_for(DisplayId(1), SpaceId(3)), SpaceMode::Monocle);
        assert_eq!(s.space_mode_for(DisplayId(2), SpaceId(3)), SpaceMode::Bsp);
        assert_eq!(s.gap_for(DisplayId(1), SpaceId(2)), 4.0);
        assert_eq!(s.split_policy(DisplayId(1), SpaceId(2)).ratio, 0.7);
        assert_eq!(s.split_policy(DisplayId(1), SpaceId(3)).ratio, 0.5);
    }

    #[test]
    fn window_rules_match_case_insensitive_substrings() {
        let mut s = Settings::default();
        s.rules.push(WindowRule {
            app: Some("finder".into()),
            title: None,
            placement: Placement::Float,
        });
        s.rules.push(WindowRule {
            app: None,
            title: None,
            placement: Placement::Float,
        });
        assert_eq!(s.placement_for(&window("Finder", "Downloads")), Placement::Float);
        assert_eq!(s.placement_for(&window("Terminal", "zsh")), Placement::Tile);
    }

    #[test]
    fn rule_criteria_are_and_combined() {
        let rule = WindowRule {
            app: Some("Safari".into()),
            title: Some("settings".into()),
            placement: Placement::Float,
        };
        assert!(rule.matches(&window("Safari", "Settings - General")));
        assert!(!rule.matches(&window("Safari", "Start Page")));
    }
}
