//! Configuration directives and the sources that produce them.
//!
//! The configuration is a JSON file holding a list of directives.  Each
//! directive is an externally tagged object, applied in order onto a fresh
//! default [`Registry`].  Loading is all-or-nothing: the first directive
//! that fails aborts the load and nothing is applied.
//!
//! # Example
//!
//! ```json
//! {
//!   "directives": [
//!     {"SetOption": {"name": "split-ratio", "value": 0.6}},
//!     {"SetOption": {"name": "mouse-follows-focus", "value": false}},
//!     {"DefineMode": "resize"},
//!     {"BindHotkey": {"mode": "default", "modifiers": "cmd+alt", "key": 123,
//!                     "action": "focus-left"}},
//!     {"BindHotkey": {"mode": "default", "modifiers": "cmd", "key": "0x0f",
//!                     "action": "mode resize", "passthrough": true}},
//!     {"SetWindowRule": {"app": "Finder", "placement": "float"}},
//!     {"SetSpaceOverride": {"space": 3, "mode": "monocle"}},
//!     {"SetDisplayOverride": {"display": 1, "gap": 12}}
//!   ]
//! }
//! ```

use crate::command::{Command, DisplayId, SpaceId};
use crate::hotkey::{Hotkey, KeyCode, Modifiers, DEFAULT_MODE};
use crate::registry::{Registry, RegistryError};
use crate::settings::{OptionError, Overrides, Settings, WindowRule};
use log::{debug, info};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::{Path, PathBuf};

/// An option value: strings, numbers and booleans are all accepted and
/// handed to the option parser as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionValue(pub String);

impl<'de> Deserialize<'de> for OptionValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct V;
        impl<'de> Visitor<'de> for V {
            type Value = OptionValue;
            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a string, number or boolean")
            }
            fn visit_str<E: de::Error>(self, s: &str) -> Result<OptionValue, E> {
                Ok(OptionValue(s.to_string()))
            }
            fn visit_u64<E: de::Error>(self, n: u64) -> Result<OptionValue, E> {
                Ok(OptionValue(n.to_string()))
            }
            fn visit_i64<E: de::Error>(self, n: i64) -> Result<OptionValue, E> {
                Ok(OptionValue(n.to_string()))
            }
            fn visit_f64<E: de::Error>(self, n: f64) -> Result<OptionValue, E> {
                Ok(OptionValue(n.to_string()))
            }
            fn visit_bool<E: de::Error>(self, b: bool) -> Result<OptionValue, E> {
                Ok(OptionValue(if b { "on" } else { "off" }.to_string()))
            }
        }
        deserializer.deserialize_any(V)
    }
}

fn default_mode_name() -> String {
    DEFAULT_MODE.to_string()
}

/// A hotkey binding as written in the configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Binding {
    #[serde(default = "default_mode_name")]
    pub mode: String,
    #[serde(default = "Modifiers::empty")]
    pub modifiers: Modifiers,
    pub key: KeyCode,
    pub action: Command,
    #[serde(default)]
    pub passthrough: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpaceOverride {
    pub space: SpaceId,
    #[serde(flatten)]
    pub overrides: Overrides,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DisplayOverride {
    pub display: DisplayId,
    #[serde(flatten)]
    pub overrides: Overrides,
}

/// One configuration statement.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum Directive {
    SetOption { name: String, value: OptionValue },
    DefineMode(String),
    BindHotkey(Binding),
    SetWindowRule(WindowRule),
    SetSpaceOverride(SpaceOverride),
    SetDisplayOverride(DisplayOverride),
}

/// The parsed configuration file.  Unknown top-level keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub directives: Vec<Directive>,
}

/// Error from loading, parsing or applying a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {origin}: {source}")]
    Parse {
        origin: String,
        source: serde_json::Error,
    },
    #[error("directive {index}: {source}")]
    Option { index: usize, source: OptionError },
    #[error("directive {index}: {source}")]
    Mode { index: usize, source: RegistryError },
}

impl Config {
    /// Parse a configuration from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            origin: "configuration".to_string(),
            source,
        })
    }

    /// Load configuration from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            origin: path.display().to_string(),
            source,
        })
    }

    /// Apply every directive in order onto a default registry.
    pub fn build_registry(&self) -> Result<Registry, ConfigError> {
        let mut registry = Registry::new(Settings::default());
        for (index, directive) in self.directives.iter().enumerate() {
            apply(&mut registry, directive).map_err(|e| e.at(index))?;
        }
        debug!(
            "configuration built: {} directives, modes {:?}",
            self.directives.len(),
            registry.mode_names()
        );
        Ok(registry)
    }
}

enum DirectiveError {
    Option(OptionError),
    Mode(RegistryError),
}

impl DirectiveError {
    fn at(self, index: usize) -> ConfigError {
        match self {
            DirectiveError::Option(source) => ConfigError::Option { index, source },
            DirectiveError::Mode(source) => ConfigError::Mode { index, source },
        }
    }
}

fn apply(registry: &mut Registry, directive: &Directive) -> Result<(), DirectiveError> {
    match directive {
        Directive::SetOption { name, value } => registry
            .settings
            .set_option(name, &value.0)
            .map_err(DirectiveError::Option),
        Directive::DefineMode(name) => {
            registry.define_mode(name);
            Ok(())
        }
        Directive::BindHotkey(b) => {
            if let Command::Press { .. } = b.action {
                return Err(DirectiveError::Option(OptionError::InvalidValue {
                    name: "action".to_string(),
                    value: b.action.to_string(),
                    reason: "a hotkey cannot press another key".to_string(),
                }));
            }
            let hotkey = Hotkey {
                modifiers: b.modifiers,
                key: b.key,
                action: b.action.clone(),
                passthrough: b.passthrough,
            };
            registry
                .bind(&b.mode, hotkey)
                .map(|_| ())
                .map_err(DirectiveError::Mode)
        }
        Directive::SetWindowRule(rule) => {
            registry.settings.rules.push(rule.clone());
            Ok(())
        }
        Directive::SetSpaceOverride(o) => {
            registry
                .settings
                .space_overrides
                .insert(o.space, o.overrides.clone());
            Ok(())
        }
        Directive::SetDisplayOverride(o) => {
            registry
                .settings
                .display_overrides
                .insert(o.display, o.overrides.clone());
            Ok(())
        }
    }
}

/// Something that can produce a [`Registry`] on demand.
///
/// The dispatcher asks its source again on every `reload-config`.
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> Result<Registry, ConfigError>;

    /// Human-readable origin for log messages.
    fn describe(&self) -> String;
}

/// Reads the configuration from a JSON file each time it is loaded.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for JsonFileSource {
    fn load(&self) -> Result<Registry, ConfigError> {
        let registry = Config::load(&self.path)?.build_registry()?;
        info!("loaded configuration from {}", self.path.display());
        Ok(registry)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// `$XDG_CONFIG_HOME/splitwm`, falling back to `$HOME/.config/splitwm`.
pub fn config_dir() -> Option<PathBuf> {
    let base = match std::env::var_os("XDG_CONFIG_HOME") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(std::env::var_os("HOME")?).join(".config"),
    };
    Some(base.join("splitwm"))
}

/// Default location of the configuration file.
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Direction;
    use crate::settings::{Placement, SpaceMode, SplitMode};

    #[test]
    fn deserialize_full_config() {
        let json = r#"{
            "directives": [
                {"SetOption": {"name": "split-ratio", "value": 0.6}},
                {"SetOption": {"name": "split-mode", "value": "alternate"}},
                {"SetOption": {"name": "mouse-follows-focus", "value": false}},
                {"DefineMode": "resize"},
                {"BindHotkey": {"mode": "default", "modifiers": "cmd+alt", "key": 123,
                                "action": "focus-left"}},
                {"BindHotkey": {"mode": "resize", "key": "0x7b",
                                "action": "adjust-ratio -0.05", "passthrough": true}},
                {"SetWindowRule": {"app": "Finder", "placement": "float"}},
                {"SetSpaceOverride": {"space": 3, "mode": "monocle"}},
                {"SetDisplayOverride": {"display": 1, "gap": 12, "split-ratio": 0.4}}
            ]
        }"#;
        let registry = Config::from_json(json).unwrap().build_registry().unwrap();
        let s = &registry.settings;
        assert_eq!(s.split_ratio, 0.6);
        assert_eq!(s.split_mode, SplitMode::Alternate);
        assert!(!s.mouse_follows_focus);
        assert_eq!(s.rules.len(), 1);
        assert_eq!(s.rules[0].placement, Placement::Float);
        assert_eq!(s.space_overrides[&SpaceId(3)].mode, Some(SpaceMode::Monocle));
        assert_eq!(s.display_overrides[&DisplayId(1)].gap, Some(12.0));
        assert_eq!(s.display_overrides[&DisplayId(1)].split_ratio, Some(0.4));

        let default = registry.mode(DEFAULT_MODE).unwrap();
        let hit = default
            .lookup(Modifiers::CMD | Modifiers::ALT, KeyCode(123))
            .unwrap();
        assert_eq!(hit.action, Command::Focus(Direction::Left));
        assert!(!hit.passthrough);

        let resize = registry.mode("resize").unwrap();
        let hit = resize.lookup(Modifiers::empty(), KeyCode(123)).unwrap();
        assert_eq!(hit.action, Command::AdjustRatio(-0.05));
        assert!(hit.passthrough);
    }

    #[test]
    fn deserialize_empty_uses_defaults() {
        let registry = Config::from_json("{}").unwrap().build_registry().unwrap();
        assert_eq!(registry, Registry::default());
    }

    #[test]
    fn unknown_top_level_keys_ignored() {
        let json = r#"{ "directives": [], "future_section": { "key": 42 } }"#;
        // Unknown keys are ignored.
        let _cfg = Config::from_json(json).unwrap();
    }

    #[test]
    fn binding_into_undefined_mode_aborts() {
        let json = r#"{"directives": [
            {"SetOption": {"name": "gap", "value": 4}},
            {"BindHotkey": {"mode": "resize", "key": 1, "action": "flip"}}
        ]}"#;
        let err = Config::from_json(json).unwrap().build_registry().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Mode {
                index: 1,
                source: RegistryError::ModeNotFound(_)
            }
        ));
    }

    #[test]
    fn unknown_option_aborts() {
        let json = r#"{"directives": [{"SetOption": {"name": "wobble", "value": "on"}}]}"#;
        let err = Config::from_json(json).unwrap().build_registry().unwrap_err();
        assert!(matches!(err, ConfigError::Option { index: 0, .. }));
    }

    #[test]
    fn unparsable_action_is_a_parse_error() {
        let json = r#"{"directives": [{"BindHotkey": {"key": 1, "action": "dance"}}]}"#;
        assert!(matches!(
            Config::from_json(json),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn press_is_not_a_hotkey_action() {
        let json = r#"{"directives": [{"BindHotkey": {"key": 1, "action": "press cmd 2"}}]}"#;
        assert!(Config::from_json(json).unwrap().build_registry().is_err());
    }

    #[test]
    fn json_file_source_reads_from_disk() {
        let path = std::env::temp_dir().join(format!("splitwm-config-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"directives": [{"SetOption": {"name": "cycle-mode", "value": "all"}}]}"#,
        )
        .unwrap();
        let source = JsonFileSource::new(&path);
        let registry = source.load().unwrap();
        assert_eq!(
            registry.settings.cycle_mode,
            crate::settings::CycleMode::All
        );
        let _ = std::fs::remove_file(&path);

        assert!(matches!(source.load(), Err(ConfigError::Read { .. })));
    }
}
