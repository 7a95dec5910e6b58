//! The settings and mode registry.
//!
//! A [`Registry`] is an immutable bundle of [`Settings`] and named
//! [`HotkeyMode`]s.  [`SharedRegistry`] publishes one registry plus the
//! active mode behind a lock that only guards two `Arc` pointers: readers
//! clone the pointers and then work on data nobody can change, so a mode
//! switch or a config reload is observed either entirely or not at all.

use crate::hotkey::{Hotkey, HotkeyMode, KeyCode, Modifiers, DEFAULT_MODE};
use crate::settings::Settings;
use log::info;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("no such mode: {0:?}")]
    ModeNotFound(String),
}

/// Settings plus hotkey modes, as produced by one configuration load.
#[derive(Debug, Clone, PartialEq)]
pub struct Registry {
    pub settings: Settings,
    modes: HashMap<String, Arc<HotkeyMode>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl Registry {
    /// A registry holding `settings` and an empty default mode.
    pub fn new(settings: Settings) -> Self {
        let mut modes = HashMap::new();
        modes.insert(
            DEFAULT_MODE.to_string(),
            Arc::new(HotkeyMode::new(DEFAULT_MODE)),
        );
        Self { settings, modes }
    }

    /// Register an empty mode unless one with that name exists.
    pub fn define_mode(&mut self, name: &str) {
        self.modes
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(HotkeyMode::new(name)));
    }

    /// Bind `hotkey` in `mode`, returning any binding it replaced.
    pub fn bind(&mut self, mode: &str, hotkey: Hotkey) -> Result<Option<Hotkey>, RegistryError> {
        let entry = self
            .modes
            .get_mut(mode)
            .ok_or_else(|| RegistryError::ModeNotFound(mode.to_string()))?;
        Ok(Arc::make_mut(entry).bind(hotkey))
    }

    pub fn mode(&self, name: &str) -> Option<&Arc<HotkeyMode>> {
        self.modes.get(name)
    }

    pub fn mode_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn default_mode(&self) -> Arc<HotkeyMode> {
        match self.modes.get(DEFAULT_MODE) {
            Some(mode) => mode.clone(),
            None => Arc::new(HotkeyMode::new(DEFAULT_MODE)),
        }
    }
}

#[derive(Debug)]
struct Active {
    registry: Arc<Registry>,
    mode: Arc<HotkeyMode>,
}

/// The process-wide registry, shared between the input filter, the
/// dispatcher and the control channel workers.
#[derive(Debug)]
pub struct SharedRegistry {
    active: RwLock<Active>,
}

impl Default for SharedRegistry {
    fn default() -> Self {
        Self::new(Registry::default())
    }
}

impl SharedRegistry {
    /// Publish `registry` with its default mode active.
    pub fn new(registry: Registry) -> Self {
        let mode = registry.default_mode();
        Self {
            active: RwLock::new(Active {
                registry: Arc::new(registry),
                mode,
            }),
        }
    }

    /// The current registry.
    pub fn snapshot(&self) -> Arc<Registry> {
        self.active.read().registry.clone()
    }

    /// The currently active mode.
    pub fn active_mode(&self) -> Arc<HotkeyMode> {
        self.active.read().mode.clone()
    }

    /// Look up an exact chord in the active mode.
    ///
    /// Returns an owned copy of the hotkey so callers never hold on to the
    /// registry.  Returns `None` when the chord is unbound or built-in
    /// hotkeys are disabled.
    pub fn match_event(&self, modifiers: Modifiers, key: KeyCode) -> Option<Hotkey> {
        let (registry, mode) = {
            let active = self.active.read();
            (active.registry.clone(), active.mode.clone())
        };
        if !registry.settings.builtin_hotkeys {
            return None;
        }
        mode.lookup(modifiers, key).cloned()
    }

    /// Activate the mode called `name`.
    pub fn switch_mode(&self, name: &str) -> Result<(), RegistryError> {
        let mut active = self.active.write();
        let mode = active
            .registry
            .mode(name)
            .cloned()
            .ok_or_else(|| RegistryError::ModeNotFound(name.to_string()))?;
        active.mode = mode;
        info!("mode: {}", name);
        Ok(())
    }

    /// Replace the whole registry; the default mode becomes active.
    pub fn replace(&self, registry: Registry) {
        let mode = registry.default_mode();
        let mut active = self.active.write();
        active.registry = Arc::new(registry);
        active.mode = mode;
    }

    /// Change the settings of the current registry.
    ///
    /// The edit runs on a private copy which is then published, so a failed
    /// edit leaves the shared settings untouched.
    pub fn update_settings<E>(
        &self,
        edit: impl FnOnce(&mut Settings) -> Result<(), E>,
    ) -> Result<(), E> {
        let mut active = self.active.write();
        let mut registry = Registry::clone(&active.registry);
        edit(&mut registry.settings)?;
        active.registry = Arc::new(registry);
        Ok(())
    }
}
