//! The command dispatcher.
//!
//! [`Dispatcher`] owns the [`TreeStore`] and is the only way to change it.
//! Notifications from the window service ([`Dispatcher::apply_notification`])
//! and commands from hotkeys or the control channel
//! ([`Dispatcher::execute_command`]) all funnel through here, from whatever
//! thread they arrive on.
//!
//! Every mutation follows the same shape:
//!
//! 1. ask the window service for anything needed up front (no lock held),
//! 2. take the mutation lock, validate, edit the store and describe the
//!    outcome as a list of [`Effect`]s built from copied data,
//! 3. release the lock and apply the effects through the [`WindowService`].
//!
//! So window-service latency never blocks another mutator, and a command
//! whose target vanished between steps 1 and 2 fails as
//! [`ErrorKind::Stale`] instead of corrupting state.

use crate::command::{
    find_display_in_direction, Command, Cycle, Direction, DisplayInfo, Event, Notification,
    Query, ScratchpadOp, SpaceId, WindowId, WindowInfo,
};
use crate::config::{ConfigError, ConfigSource};
use crate::geometry::{Point, Rect};
use crate::hotkey::Hotkey;
use crate::input::{intercept_key, EventDecision};
use crate::reconcile::reconcile;
use crate::registry::{RegistryError, SharedRegistry};
use crate::settings::{CycleMode, FocusMode, OptionError, Placement, Settings, SpaceMode};
use crate::shutdown::ShutdownFlag;
use crate::store::{TreeKey, TreeStore};
use crate::traits::{CommandSink, WindowService};
use crate::tree::{LayoutTree, SplitPolicy, TreeError};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

//  Errors and replies

/// Category of a failed command, reported to control-channel clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// The referenced window or space is not in any tree.
    NotFound,
    /// The target changed or disappeared before the command could apply.
    Stale,
    ModeNotFound,
    ConfigParse,
    InvalidCommand,
    /// The window service rejected a request.
    Service,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not-found",
            ErrorKind::Stale => "stale",
            ErrorKind::ModeNotFound => "mode-not-found",
            ErrorKind::ConfigParse => "config-parse",
            ErrorKind::InvalidCommand => "invalid-command",
            ErrorKind::Service => "service",
        };
        write!(f, "{}", s)
    }
}

/// A command or notification that was rejected.  State is unchanged
/// unless the kind is [`ErrorKind::Service`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct CommandError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CommandError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn stale(what: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Stale, format!("{} is gone", what))
    }

    fn service(e: impl std::error::Error) -> Self {
        Self::new(ErrorKind::Service, e.to_string())
    }
}

impl From<TreeError> for CommandError {
    fn from(e: TreeError) -> Self {
        let kind = match e {
            TreeError::NotFound(_) | TreeError::SpaceNotFound(_) => ErrorKind::NotFound,
            TreeError::AlreadyTiled(_) | TreeError::NoSplit(_) => ErrorKind::InvalidCommand,
        };
        Self::new(kind, e.to_string())
    }
}

impl From<RegistryError> for CommandError {
    fn from(e: RegistryError) -> Self {
        Self::new(ErrorKind::ModeNotFound, e.to_string())
    }
}

impl From<ConfigError> for CommandError {
    fn from(e: ConfigError) -> Self {
        Self::new(ErrorKind::ConfigParse, e.to_string())
    }
}

impl From<OptionError> for CommandError {
    fn from(e: OptionError) -> Self {
        Self::new(ErrorKind::InvalidCommand, e.to_string())
    }
}

impl From<crate::command::ParseCommandError> for CommandError {
    fn from(e: crate::command::ParseCommandError) -> Self {
        Self::new(ErrorKind::InvalidCommand, e.to_string())
    }
}

/// Successful outcome of a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Done,
    /// Text for queries.
    Output(String),
}

//  Effects

/// Geometry for one tree, copied out of the store so it can be applied
/// without the lock.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutJob {
    pub key: TreeKey,
    /// Content rectangle after padding.
    pub area: Rect,
    pub gap: f64,
    pub mode: SpaceMode,
    pub tree: LayoutTree,
}

impl LayoutJob {
    /// Target frame of every tiled window.
    pub fn frames(&self) -> Vec<(WindowId, Rect)> {
        match self.mode {
            SpaceMode::Bsp => self.tree.frames(self.area, self.gap),
            SpaceMode::Monocle => self
                .tree
                .leaves()
                .into_iter()
                .map(|w| (w, self.area))
                .collect(),
            SpaceMode::Float => Vec::new(),
        }
    }
}

/// A request for the window service, produced under the lock and applied
/// after it is released.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Layout(LayoutJob),
    MoveResize(WindowId, Rect),
    Focus(WindowId),
    Warp(Point),
    Hide(WindowId),
    Show(WindowId, SpaceId),
    MoveToSpace(WindowId, SpaceId),
}

/// Apply effects in order.  Every effect is attempted; the first failure is
/// returned.  A layout job is skipped when a later job covers the same tree.
fn apply_effects<W: WindowService>(service: &W, effects: Vec<Effect>) -> Result<(), CommandError> {
    let mut first_error: Option<CommandError> = None;
    for (i, effect) in effects.iter().enumerate() {
        let result = match effect {
            Effect::Layout(job) => {
                let superseded = effects[i + 1..]
                    .iter()
                    .any(|e| matches!(e, Effect::Layout(later) if later.key == job.key));
                if superseded {
                    continue;
                }
                for (window, frame) in job.frames() {
                    if let Err(e) = service.move_resize_window(window, frame) {
                        warn!("move {} failed: {}", window, e);
                        first_error.get_or_insert_with(|| CommandError::service(e));
                    }
                }
                continue;
            }
            Effect::MoveResize(window, frame) => service.move_resize_window(*window, *frame),
            Effect::Focus(window) => service.focus_window(*window),
            Effect::Warp(point) => service.warp_cursor(*point),
            Effect::Hide(window) => service.hide_window(*window),
            Effect::Show(window, space) => service.show_window(*window, *space),
            Effect::MoveToSpace(window, space) => service.move_window_to_space(*window, *space),
        };
        if let Err(e) = result {
            warn!("{:?} failed: {}", effect, e);
            first_error.get_or_insert_with(|| CommandError::service(e));
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

//  Store helpers (run under the lock)

/// Content area, gap and split policy of a tree.
fn content_area(store: &TreeStore, settings: &Settings, key: TreeKey) -> Option<(Rect, f64, SplitPolicy)> {
    let (display, space) = key;
    let frame = store.display(display)?.frame;
    Some((
        frame.inset(&settings.padding_for(display, space)),
        settings.gap_for(display, space),
        settings.split_policy(display, space),
    ))
}

fn layout_job(store: &TreeStore, settings: &Settings, key: TreeKey) -> Option<LayoutJob> {
    let space = store.space(key.1)?;
    let (area, gap, _) = content_area(store, settings, key)?;
    Some(LayoutJob {
        key,
        area,
        gap,
        mode: space.mode,
        tree: store.tree(key).cloned().unwrap_or_default(),
    })
}

/// Layout effect for `key`, only when its space is on screen.
fn layout(store: &TreeStore, settings: &Settings, key: TreeKey) -> Vec<Effect> {
    match store.space(key.1) {
        Some(space) if space.active && space.display == key.0 => layout_job(store, settings, key)
            .map(Effect::Layout)
            .into_iter()
            .collect(),
        _ => Vec::new(),
    }
}

fn relayout_all(store: &TreeStore, settings: &Settings) -> Vec<Effect> {
    store
        .active_spaces()
        .into_iter()
        .flat_map(|key| layout(store, settings, key))
        .collect()
}

fn display_infos(store: &TreeStore) -> Vec<DisplayInfo> {
    store
        .displays()
        .map(|d| DisplayInfo {
            id: d.id,
            name: d.name.clone(),
            frame: d.frame,
            active_space: d.spaces.current,
        })
        .collect()
}

fn no_focus() -> CommandError {
    CommandError::new(ErrorKind::NotFound, "no focused window")
}

/// The focused window and the tree holding it.
fn focused_tiled(store: &TreeStore) -> Result<(WindowId, TreeKey), CommandError> {
    let window = store.focused().ok_or_else(no_focus)?;
    let key = store
        .locate(window)
        .ok_or_else(|| CommandError::new(ErrorKind::NotFound, format!("window {} is not tiled", window)))?;
    Ok((window, key))
}

/// The space commands without an explicit target act on.
fn focused_space(store: &TreeStore) -> Option<TreeKey> {
    store
        .focused()
        .and_then(|w| store.window(w))
        .and_then(|w| store.key_of_space(w.space))
        .or_else(|| store.active_spaces().into_iter().next())
}

/// Where a window currently is, or will be after the pending layout.
fn window_frame(store: &TreeStore, settings: &Settings, window: WindowId) -> Option<Rect> {
    if let Some(key) = store.locate(window) {
        let job = layout_job(store, settings, key)?;
        return job
            .frames()
            .into_iter()
            .find(|(id, _)| *id == window)
            .map(|(_, frame)| frame);
    }
    store.window(window).map(|w| w.frame)
}

fn warp_to(store: &TreeStore, settings: &Settings, window: WindowId) -> Option<Effect> {
    if !settings.mouse_follows_focus {
        return None;
    }
    window_frame(store, settings, window).map(|f| Effect::Warp(f.center()))
}

fn focus_effects(store: &mut TreeStore, settings: &Settings, window: WindowId) -> Vec<Effect> {
    store.set_focused(Some(window));
    let mut effects = vec![Effect::Focus(window)];
    effects.extend(warp_to(store, settings, window));
    effects
}

/// Put a known window into the tree of its space, next to `anchor` if that
/// window is in the same tree.
fn tile_window(
    store: &mut TreeStore,
    settings: &Settings,
    window: WindowId,
    anchor: Option<WindowId>,
) -> Vec<Effect> {
    let space = match store.window(window) {
        Some(w) if !w.floating => w.space,
        _ => return Vec::new(),
    };
    let key = match store.key_of_space(space) {
        Some(key) => key,
        None => return Vec::new(),
    };
    if store.space(space).map(|s| s.mode) == Some(SpaceMode::Float) {
        return Vec::new();
    }
    let (area, gap, policy) = match content_area(store, settings, key) {
        Some(c) => c,
        None => return Vec::new(),
    };
    let anchor = anchor.filter(|a| store.tree(key).is_some_and(|t| t.contains(*a)));
    store.ensure_tree(key);
    match store.insert_window(key, window, anchor, area, gap, &policy) {
        Ok(()) => layout(store, settings, key),
        Err(e) => {
            debug!("not tiling {}: {}", window, e);
            Vec::new()
        }
    }
}

/// Bring the tree of `key` in line with `observed`, the windows the service
/// reports on that space.
fn sync_space(
    store: &mut TreeStore,
    settings: &Settings,
    key: TreeKey,
    observed: &[WindowInfo],
) -> Vec<Effect> {
    let space = key.1;
    let mut effects = Vec::new();

    // The service's float flag only matters for windows seen for the first
    // time; afterwards floating is decided here.
    for info in observed {
        let floating = match store.window(info.id) {
            Some(known) => known.floating,
            None => info.floating || settings.placement_for(info) == Placement::Float,
        };
        store.upsert_window(info, floating);
    }
    let live: HashSet<WindowId> = observed.iter().map(|w| w.id).collect();
    let gone: Vec<WindowId> = store
        .windows_on(space)
        .iter()
        .map(|w| w.id)
        .filter(|id| !live.contains(id) && !store.in_scratchpad(*id))
        .collect();
    for window in gone {
        store.forget_window(window);
    }

    if store.space(space).map(|s| s.mode) == Some(SpaceMode::Float) {
        store.drop_tree(key);
        return effects;
    }
    let (area, gap, policy) = match content_area(store, settings, key) {
        Some(c) => c,
        None => return effects,
    };
    let tileable = store.tileable_on(space);
    for window in &tileable {
        if let Some(other) = store.locate(*window).filter(|k| *k != key) {
            match store.remove_window(*window) {
                Ok(_) => effects.extend(layout(store, settings, other)),
                Err(e) => debug!("cannot move {} out of its old tree: {}", window, e),
            }
        }
    }
    if store.tree(key).is_none() {
        store.create_tree(key, &tileable, area, gap, &policy);
    } else {
        let anchor = store.focused();
        let tree = store.ensure_tree(key);
        reconcile(tree, &tileable, anchor, area, gap, &policy);
    }
    effects.extend(layout(store, settings, key));
    effects
}

//  Dispatcher

/// Serialises every change to layout state.
///
/// Generic over any [`WindowService`] implementation.  Share it between
/// threads behind an [`Arc`].
///
/// # Typical usage
///
/// ```ignore
/// let dispatcher = Dispatcher::new(HyprlandWm::new()?, registry, config, shutdown);
/// dispatcher.bootstrap()?;
/// dispatcher.execute_command("focus-left")?;
/// ```
pub struct Dispatcher<W: WindowService> {
    service: Arc<W>,
    state: Mutex<TreeStore>,
    registry: Arc<SharedRegistry>,
    config: Box<dyn ConfigSource>,
    shutdown: ShutdownFlag,
}

impl<W: WindowService + 'static> Dispatcher<W> {
    pub fn new(
        service: W,
        registry: Arc<SharedRegistry>,
        config: Box<dyn ConfigSource>,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            service: Arc::new(service),
            state: Mutex::new(TreeStore::new()),
            registry,
            config,
            shutdown,
        }
    }

    pub fn service(&self) -> &W {
        &self.service
    }

    pub fn registry(&self) -> &Arc<SharedRegistry> {
        &self.registry
    }

    /// Read the store under the lock.
    pub fn inspect<R>(&self, f: impl FnOnce(&TreeStore) -> R) -> R {
        f(&self.state.lock())
    }

    /// Run `edit` under the lock, then apply its effects.
    fn mutate(
        &self,
        edit: impl FnOnce(&mut TreeStore, &Settings) -> Result<Vec<Effect>, CommandError>,
    ) -> Result<Reply, CommandError> {
        let effects = {
            let mut store = self.state.lock();
            // Taken under the lock so a reload that finished while we waited
            // is already visible.
            let registry = self.registry.snapshot();
            edit(&mut store, &registry.settings)?
        };
        apply_effects(&*self.service, effects)?;
        Ok(Reply::Done)
    }

    /// Build trees for the active space of every display.
    pub fn bootstrap(&self) -> Result<(), CommandError> {
        let displays = self.service.displays().map_err(CommandError::service)?;
        let focused = self.service.focused_window().map_err(CommandError::service)?;
        let mut observed = Vec::with_capacity(displays.len());
        for display in displays {
            let windows = self
                .service
                .query_windows(display.active_space)
                .map_err(CommandError::service)?;
            observed.push((display, windows));
        }
        info!("bootstrapping {} display(s)", observed.len());
        self.mutate(|store, settings| {
            let mut effects = Vec::new();
            for (display, windows) in &observed {
                let mode = settings.space_mode_for(display.id, display.active_space);
                store.attach_display(display, mode);
                effects.extend(sync_space(store, settings, (display.id, display.active_space), windows));
            }
            store.set_focused(focused);
            Ok(effects)
        })
        .map(|_| ())
    }

    //  Notifications

    /// Apply one change reported by the window service.
    pub fn apply_notification(&self, notification: Notification) -> Result<(), CommandError> {
        debug!("notification: {:?}", notification);
        let result = match notification {
            Notification::WindowCreated(info) => self.mutate(|store, settings| {
                if store.window(info.id).is_some() {
                    return Ok(Vec::new());
                }
                let floating = info.floating || settings.placement_for(&info) == Placement::Float;
                store.upsert_window(&info, floating);
                if floating {
                    return Ok(center_floating(store, settings, info.id));
                }
                let anchor = store.focused();
                Ok(tile_window(store, settings, info.id, anchor))
            }),
            Notification::WindowDestroyed(window) => self.mutate(|store, settings| {
                let key = store.locate(window);
                store.forget_window(window);
                Ok(key.map(|k| layout(store, settings, k)).unwrap_or_default())
            }),
            Notification::WindowMoved { window, frame } => self.mutate(|store, _| {
                if let Some(w) = store.window_mut(window) {
                    w.frame = frame;
                }
                Ok(Vec::new())
            }),
            Notification::WindowSpaceChanged { window, space } => {
                self.mutate(|store, settings| {
                    let w = match store.window_mut(window) {
                        Some(w) if w.space != space => w,
                        _ => return Ok(Vec::new()),
                    };
                    w.space = space;
                    let mut effects = Vec::new();
                    if let Ok(old) = store.remove_window(window) {
                        effects.extend(layout(store, settings, old));
                    }
                    effects.extend(tile_window(store, settings, window, None));
                    Ok(effects)
                })
            }
            Notification::FocusChanged(window) => self.mutate(|store, _| {
                store.set_focused(window);
                Ok(Vec::new())
            }),
            Notification::SpaceChanged { display, space } => {
                let windows = self
                    .service
                    .query_windows(space)
                    .map_err(CommandError::service)?;
                self.mutate(|store, settings| {
                    let mode = settings.space_mode_for(display, space);
                    let pair = store
                        .activate_space(display, space, mode)
                        .ok_or_else(|| CommandError::stale(format!("display {}", display)))?;
                    debug!("display {}: {:?} -> {}", display, pair.previous, pair.current);
                    Ok(sync_space(store, settings, (display, space), &windows))
                })
            }
            Notification::SpaceDestroyed(space) => self.mutate(|store, _| {
                store.destroy_space(space);
                Ok(Vec::new())
            }),
            Notification::DisplayChanged => self.refresh_displays(),
        };
        result.map(|_| ())
    }

    /// Re-read the display arrangement and reconcile every active space.
    fn refresh_displays(&self) -> Result<Reply, CommandError> {
        let displays = self.service.displays().map_err(CommandError::service)?;
        let mut observed = Vec::with_capacity(displays.len());
        for display in displays {
            let windows = self
                .service
                .query_windows(display.active_space)
                .map_err(CommandError::service)?;
            observed.push((display, windows));
        }
        self.mutate(|store, settings| {
            let present: HashSet<_> = observed.iter().map(|(d, _)| d.id).collect();
            let gone: Vec<_> = store
                .displays()
                .map(|d| d.id)
                .filter(|id| !present.contains(id))
                .collect();
            for id in gone {
                info!("display {} detached", id);
                store.detach_display(id);
            }
            let mut effects = Vec::new();
            for (display, windows) in &observed {
                let mode = settings.space_mode_for(display.id, display.active_space);
                store.attach_display(display, mode);
                effects.extend(sync_space(store, settings, (display.id, display.active_space), windows));
            }
            Ok(effects)
        })
    }

    /// Reconcile one space's tree with what the window service reports.
    pub fn reconcile_space(&self, space: SpaceId) -> Result<(), CommandError> {
        if self.inspect(|s| s.key_of_space(space)).is_none() {
            return Err(CommandError::stale(format!("space {}", space)));
        }
        let windows = self
            .service
            .query_windows(space)
            .map_err(CommandError::service)?;
        self.mutate(|store, settings| {
            let key = store
                .key_of_space(space)
                .ok_or_else(|| CommandError::stale(format!("space {}", space)))?;
            Ok(sync_space(store, settings, key, &windows))
        })
        .map(|_| ())
    }

    //  Events

    /// Handle one event from the primary loop.  Failures are logged.
    pub fn handle_event(&self, event: Event) {
        let result = match event {
            Event::Notification(n) => self.apply_notification(n),
            Event::MouseMoved(point) => self.mouse_moved(point),
        };
        if let Err(e) = result {
            warn!("{}", e);
        }
    }

    fn run_hotkey(&self, hotkey: Hotkey) -> Result<Reply, CommandError> {
        debug!("hotkey {}+{}: {}", hotkey.modifiers.label(), hotkey.key, hotkey.action);
        if let Command::Press { .. } = hotkey.action {
            return Err(CommandError::new(
                ErrorKind::InvalidCommand,
                "a hotkey cannot press another key",
            ));
        }
        self.execute(hotkey.action)
    }

    /// Focus follows the mouse.
    fn mouse_moved(&self, point: Point) -> Result<(), CommandError> {
        self.mutate(|store, settings| {
            if settings.focus_mode != FocusMode::Autoraise {
                return Ok(Vec::new());
            }
            let focused = store.focused();
            let on_float = focused
                .and_then(|w| store.window(w))
                .is_some_and(|w| w.floating);
            if on_float && settings.standby_on_float {
                return Ok(Vec::new());
            }
            let display = match store.displays().find(|d| d.frame.contains(point)) {
                Some(d) => (d.id, d.spaces.current),
                None => return Ok(Vec::new()),
            };
            let target = layout_job(store, settings, display).and_then(|job| {
                job.frames()
                    .into_iter()
                    .find(|(_, frame)| frame.contains(point))
                    .map(|(id, _)| id)
            });
            match target {
                Some(window) if Some(window) != focused => {
                    store.set_focused(Some(window));
                    Ok(vec![Effect::Focus(window)])
                }
                _ => Ok(Vec::new()),
            }
        })
        .map(|_| ())
    }

    //  Commands

    /// Parse and execute one command line.
    pub fn execute_command(&self, text: &str) -> Result<Reply, CommandError> {
        let command: Command = text.parse()?;
        self.execute(command)
    }

    /// Execute one command.
    pub fn execute(&self, command: Command) -> Result<Reply, CommandError> {
        info!("{}", command);
        match command {
            Command::Focus(dir) => self.mutate(|store, settings| focus_direction(store, settings, dir)),
            Command::FocusCycle(cycle) => {
                self.mutate(|store, settings| focus_cycle(store, settings, cycle))
            }
            Command::FocusWindow(window) => self.mutate(|store, settings| {
                if store.window(window).is_none() {
                    return Err(CommandError::stale(format!("window {}", window)));
                }
                Ok(focus_effects(store, settings, window))
            }),
            Command::Swap(dir) => self.mutate(|store, settings| swap_direction(store, settings, dir)),
            Command::SwapMarked => self.mutate(swap_marked),
            Command::Mark(target) => self.mutate(|store, _| {
                let window = target.or(store.focused()).ok_or_else(no_focus)?;
                store
                    .mark(window)
                    .map_err(|_| CommandError::stale(format!("window {}", window)))?;
                Ok(Vec::new())
            }),
            Command::Unmark => self.mutate(|store, _| {
                store.unmark();
                Ok(Vec::new())
            }),
            Command::InsertMarked => self.mutate(insert_marked),
            Command::ResizeRatio(ratio) => {
                self.mutate(|store, settings| resize(store, settings, |_| ratio))
            }
            Command::AdjustRatio(delta) => {
                self.mutate(|store, settings| resize(store, settings, |r| r + delta))
            }
            Command::Rotate(rotation) => self.mutate(|store, settings| {
                let (_, key) = focused_tiled(store)?;
                if let Some(tree) = store.tree_mut(key) {
                    tree.rotate(rotation);
                }
                Ok(layout(store, settings, key))
            }),
            Command::Flip => self.mutate(|store, settings| {
                edit_parent(store, settings, |tree, path| tree.flip(path))
            }),
            Command::ToggleSplit => self.mutate(|store, settings| {
                edit_parent(store, settings, |tree, path| tree.toggle_orientation(path))
            }),
            Command::ToggleFloat => self.mutate(toggle_float),
            Command::SetSpaceMode(mode) => {
                self.mutate(|store, settings| set_space_mode(store, settings, mode))
            }
            Command::Mode(name) => {
                self.registry.switch_mode(&name)?;
                Ok(Reply::Done)
            }
            Command::ReloadConfig => self.reload_config(),
            Command::Refresh(space) => {
                let space = match space {
                    Some(space) => space,
                    None => self
                        .inspect(focused_space)
                        .map(|(_, space)| space)
                        .ok_or_else(|| CommandError::new(ErrorKind::NotFound, "no active space"))?,
                };
                self.reconcile_space(space)?;
                Ok(Reply::Done)
            }
            Command::Set { name, value } => {
                self.registry
                    .update_settings(|s| s.set_option(&name, &value))?;
                self.mutate(|store, settings| Ok(relayout_all(store, settings)))
            }
            Command::Scratchpad(op) => self.mutate(|store, settings| scratchpad(store, settings, op)),
            Command::Query(query) => Ok(Reply::Output(self.query(query))),
            Command::Press { modifiers, key } => match intercept_key(&self.registry, modifiers, key) {
                Some(hit) => {
                    let reply = self.run_hotkey(hit.hotkey)?;
                    match (hit.decision, reply) {
                        (EventDecision::PassThrough, Reply::Done) => {
                            Ok(Reply::Output("pass-through".to_string()))
                        }
                        (_, reply) => Ok(reply),
                    }
                }
                None => Ok(Reply::Output("no match".to_string())),
            },
            Command::Exec(line) => {
                spawn_shell(&line).map_err(CommandError::service)?;
                Ok(Reply::Done)
            }
            Command::Quit => {
                self.shutdown.request();
                Ok(Reply::Done)
            }
        }
    }

    /// Load a fresh registry and publish it.  On failure nothing changes.
    fn reload_config(&self) -> Result<Reply, CommandError> {
        let registry = self.config.load().map_err(|e| {
            warn!("reload of {} failed: {}", self.config.describe(), e);
            CommandError::from(e)
        })?;
        self.registry.replace(registry);
        info!("configuration reloaded from {}", self.config.describe());
        self.mutate(|store, settings| Ok(relayout_all(store, settings)))
    }

    fn query(&self, query: Query) -> String {
        match query {
            Query::Mode => self.registry.active_mode().name().to_string(),
            Query::Tree => self.inspect(|store| {
                focused_space(store)
                    .and_then(|key| store.tree(key))
                    .map(|tree| tree.to_string())
                    .unwrap_or_else(|| "Empty".to_string())
            }),
            Query::Focused => self.inspect(|store| match store.focused() {
                Some(w) => w.to_string(),
                None => "none".to_string(),
            }),
            Query::Marked => self.inspect(|store| match store.marked() {
                Some(w) => w.to_string(),
                None => "none".to_string(),
            }),
            Query::Spaces => self.inspect(|store| {
                store
                    .displays()
                    .map(|d| {
                        let previous = d
                            .spaces
                            .previous
                            .map(|s| s.to_string())
                            .unwrap_or_else(|| "-".to_string());
                        let known: Vec<String> =
                            d.known_spaces.iter().map(|s| s.to_string()).collect();
                        format!(
                            "{} {}: current {} previous {} spaces [{}]",
                            d.id,
                            d.name,
                            d.spaces.current,
                            previous,
                            known.join(" ")
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }),
        }
    }

    //  Shutdown

    /// Best-effort cleanup before exit: bring every scratchpad window back.
    ///
    /// Never blocks longer than `budget`.  The mutation lock is only waited
    /// for until the deadline, and the window service is driven from a
    /// helper thread that is abandoned if it does not finish in time.
    /// Returns whether cleanup completed.
    pub fn cleanup(&self, budget: Duration) -> bool {
        let deadline = Instant::now() + budget;
        let effects = match self.state.try_lock_for(budget) {
            Some(mut store) => {
                let shown = store.scratchpad_show_all();
                shown
                    .into_iter()
                    .filter_map(|w| store.window(w).map(|info| Effect::Show(w, info.space)))
                    .collect::<Vec<_>>()
            }
            None => {
                warn!("mutation lock still held, skipping cleanup");
                return false;
            }
        };
        if effects.is_empty() {
            return true;
        }

        let service = Arc::clone(&self.service);
        let (done_tx, done_rx) = mpsc::channel();
        std::thread::spawn(move || {
            let result = apply_effects(&*service, effects);
            let _ = done_tx.send(result);
        });
        match done_rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("cleanup: {}", e);
                true
            }
            Err(_) => {
                warn!("cleanup did not finish within {:?}", budget);
                false
            }
        }
    }
}

impl<W: WindowService + 'static> CommandSink for Dispatcher<W> {
    fn execute(&self, text: &str) -> Result<Reply, CommandError> {
        self.execute_command(text)
    }
}

/// Run a shell command detached from splitwm.
fn spawn_shell(line: &str) -> std::io::Result<()> {
    use std::process::{Command as Process, Stdio};
    Process::new("sh")
        .arg("-c")
        .arg(line)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
}

//  Command implementations (run under the lock)

fn focus_direction(
    store: &mut TreeStore,
    settings: &Settings,
    dir: Direction,
) -> Result<Vec<Effect>, CommandError> {
    let (window, key) = focused_tiled(store)?;
    let job = layout_job(store, settings, key).ok_or_else(|| CommandError::stale(format!("space {}", key.1)))?;
    let monocle = job.mode == SpaceMode::Monocle;
    let backwards = matches!(dir, Direction::Left | Direction::Up);

    let neighbour = if monocle {
        if backwards {
            job.tree.prev_leaf(window)
        } else {
            job.tree.next_leaf(window)
        }
    } else {
        job.tree.neighbor(window, dir, job.area, job.gap)
    };
    let target = neighbour.or_else(|| match settings.cycle_mode {
        CycleMode::Screen if monocle && backwards => job.tree.last_leaf(),
        CycleMode::Screen if monocle => job.tree.first_leaf(),
        CycleMode::Screen => job.tree.wrap_target(window, dir, job.area, job.gap),
        CycleMode::All => {
            let origin = window_frame(store, settings, window)?.center();
            closest_on_display_in_direction(store, settings, key, origin, dir)
        }
        CycleMode::Off => None,
    });

    match target.filter(|t| *t != window) {
        Some(target) => Ok(focus_effects(store, settings, target)),
        None => {
            debug!("no window {} of {}", dir, window);
            Ok(Vec::new())
        }
    }
}

/// The tiled window on the neighbouring display closest to `origin`.
fn closest_on_display_in_direction(
    store: &TreeStore,
    settings: &Settings,
    from: TreeKey,
    origin: Point,
    dir: Direction,
) -> Option<WindowId> {
    let displays = display_infos(store);
    let target = find_display_in_direction(&displays, from.0, dir)?;
    let job = layout_job(store, settings, (target.id, target.active_space))?;
    job.frames()
        .into_iter()
        .min_by(|(_, a), (_, b)| {
            let dist = |r: &Rect| {
                let c = r.center();
                (c.x - origin.x).powi(2) + (c.y - origin.y).powi(2)
            };
            dist(a).total_cmp(&dist(b))
        })
        .map(|(id, _)| id)
}

fn focus_cycle(
    store: &mut TreeStore,
    settings: &Settings,
    cycle: Cycle,
) -> Result<Vec<Effect>, CommandError> {
    let (window, key) = focused_tiled(store)?;
    let tree = store.tree(key).cloned().unwrap_or_default();
    let wrap = |tree: &LayoutTree| match cycle {
        Cycle::Next => tree.first_leaf(),
        Cycle::Prev => tree.last_leaf(),
    };
    let next = match cycle {
        Cycle::Next => tree.next_leaf(window),
        Cycle::Prev => tree.prev_leaf(window),
    };
    let target = next.or_else(|| match settings.cycle_mode {
        CycleMode::Screen => wrap(&tree),
        CycleMode::All => {
            let keys = store.active_spaces();
            let index = keys.iter().position(|k| *k == key)?;
            let step = match cycle {
                Cycle::Next => 1,
                Cycle::Prev => keys.len() - 1,
            };
            let other = keys[(index + step) % keys.len()];
            store.tree(other).and_then(wrap)
        }
        CycleMode::Off => None,
    });
    match target.filter(|t| *t != window) {
        Some(target) => Ok(focus_effects(store, settings, target)),
        None => Ok(Vec::new()),
    }
}

fn swap_direction(
    store: &mut TreeStore,
    settings: &Settings,
    dir: Direction,
) -> Result<Vec<Effect>, CommandError> {
    let (window, key) = focused_tiled(store)?;
    let job = layout_job(store, settings, key).ok_or_else(|| CommandError::stale(format!("space {}", key.1)))?;
    let other = if job.mode == SpaceMode::Monocle {
        match dir {
            Direction::Left | Direction::Up => job.tree.prev_leaf(window),
            Direction::Right | Direction::Down => job.tree.next_leaf(window),
        }
    } else {
        job.tree.neighbor(window, dir, job.area, job.gap)
    };
    let other = match other {
        Some(other) => other,
        None => return Ok(Vec::new()),
    };
    if let Some(tree) = store.tree_mut(key) {
        tree.swap(window, other)?;
    }
    let mut effects = layout(store, settings, key);
    effects.extend(warp_to(store, settings, window));
    Ok(effects)
}

fn marked_window(store: &TreeStore) -> Result<WindowId, CommandError> {
    let marked = store
        .marked()
        .ok_or_else(|| CommandError::new(ErrorKind::NotFound, "no marked window"))?;
    if store.window(marked).is_none() {
        return Err(CommandError::stale(format!("window {}", marked)));
    }
    Ok(marked)
}

fn swap_marked(store: &mut TreeStore, settings: &Settings) -> Result<Vec<Effect>, CommandError> {
    let (focused, fkey) = focused_tiled(store)?;
    let marked = marked_window(store)?;
    if marked == focused {
        return Ok(Vec::new());
    }
    let mkey = store.locate(marked).ok_or_else(|| {
        CommandError::new(ErrorKind::InvalidCommand, format!("window {} is not tiled", marked))
    })?;

    let mut effects = Vec::new();
    if fkey == mkey {
        if let Some(tree) = store.tree_mut(fkey) {
            tree.swap(focused, marked)?;
        }
    } else {
        if let Some(tree) = store.tree_mut(fkey) {
            tree.replace(focused, marked)?;
        }
        if let Some(tree) = store.tree_mut(mkey) {
            tree.replace(marked, focused)?;
        }
        for (window, space) in [(marked, fkey.1), (focused, mkey.1)] {
            if let Some(w) = store.window_mut(window) {
                if w.space != space {
                    w.space = space;
                    effects.push(Effect::MoveToSpace(window, space));
                }
            }
        }
        effects.extend(layout(store, settings, mkey));
    }
    effects.extend(layout(store, settings, fkey));
    Ok(effects)
}

fn insert_marked(store: &mut TreeStore, settings: &Settings) -> Result<Vec<Effect>, CommandError> {
    let (focused, fkey) = focused_tiled(store)?;
    let marked = marked_window(store)?;
    if marked == focused {
        return Err(CommandError::new(
            ErrorKind::InvalidCommand,
            "cannot insert a window next to itself",
        ));
    }
    let (area, gap, policy) = content_area(store, settings, fkey)
        .ok_or_else(|| CommandError::stale(format!("display {}", fkey.0)))?;

    let mut effects = Vec::new();
    let old = store.locate(marked);
    if old.is_some() {
        store.remove_window(marked)?;
    }
    if let Err(e) = store.insert_window(fkey, marked, Some(focused), area, gap, &policy) {
        if let Some(old) = old {
            restore_leaf(store, settings, old, marked);
        }
        return Err(e.into());
    }
    if let Some(w) = store.window_mut(marked) {
        w.floating = false;
        if w.space != fkey.1 {
            w.space = fkey.1;
            effects.push(Effect::MoveToSpace(marked, fkey.1));
        }
    }
    store.unmark();
    if let Some(old) = old.filter(|k| *k != fkey) {
        effects.extend(layout(store, settings, old));
    }
    effects.extend(layout(store, settings, fkey));
    Ok(effects)
}

/// Put `window` back into the tree it was taken out of.
fn restore_leaf(store: &mut TreeStore, settings: &Settings, key: TreeKey, window: WindowId) {
    let restored = content_area(store, settings, key)
        .ok_or(TreeError::SpaceNotFound(key.1))
        .and_then(|(area, gap, policy)| store.insert_window(key, window, None, area, gap, &policy));
    if let Err(e) = restored {
        warn!("cannot put {} back: {}", window, e);
    }
}

/// Change the ratio of the focused window's parent split.
fn resize(
    store: &mut TreeStore,
    settings: &Settings,
    ratio: impl FnOnce(f64) -> f64,
) -> Result<Vec<Effect>, CommandError> {
    let (window, key) = focused_tiled(store)?;
    let tree = store
        .tree_mut(key)
        .ok_or_else(|| CommandError::stale(format!("space {}", key.1)))?;
    let path = tree.parent_path(window)?;
    let current = tree.ratio_at(&path).unwrap_or(0.5);
    let applied = tree.resize(&path, ratio(current));
    debug!("ratio {:.2} -> {:?}", current, applied);
    Ok(layout(store, settings, key))
}

/// Edit the focused window's parent split.
fn edit_parent(
    store: &mut TreeStore,
    settings: &Settings,
    edit: impl FnOnce(&mut LayoutTree, &[crate::tree::Branch]) -> bool,
) -> Result<Vec<Effect>, CommandError> {
    let (window, key) = focused_tiled(store)?;
    let tree = store
        .tree_mut(key)
        .ok_or_else(|| CommandError::stale(format!("space {}", key.1)))?;
    let path = tree.parent_path(window)?;
    edit(tree, &path);
    let mut effects = layout(store, settings, key);
    effects.extend(warp_to(store, settings, window));
    Ok(effects)
}

/// Move a floating window to the centre of its display if configured.
fn center_floating(store: &mut TreeStore, settings: &Settings, window: WindowId) -> Vec<Effect> {
    if !settings.center_on_float {
        return Vec::new();
    }
    let (frame, space) = match store.window(window) {
        Some(w) => (w.frame, w.space),
        None => return Vec::new(),
    };
    let area = match store
        .key_of_space(space)
        .and_then(|key| content_area(store, settings, key))
    {
        Some((area, ..)) => area,
        None => return Vec::new(),
    };
    let centred = frame.centered_in(&area);
    if let Some(w) = store.window_mut(window) {
        w.frame = centred;
    }
    vec![Effect::MoveResize(window, centred)]
}

fn toggle_float(store: &mut TreeStore, settings: &Settings) -> Result<Vec<Effect>, CommandError> {
    let window = store.focused().ok_or_else(no_focus)?;
    let floating = store
        .window(window)
        .map(|w| w.floating)
        .ok_or_else(|| CommandError::stale(format!("window {}", window)))?;

    if floating {
        if let Some(w) = store.window_mut(window) {
            w.floating = false;
        }
        return Ok(tile_window(store, settings, window, None));
    }

    let mut effects = Vec::new();
    if let Ok(old) = store.remove_window(window) {
        effects.extend(layout(store, settings, old));
    }
    if let Some(w) = store.window_mut(window) {
        w.floating = true;
    }
    effects.extend(center_floating(store, settings, window));
    Ok(effects)
}

fn set_space_mode(
    store: &mut TreeStore,
    settings: &Settings,
    mode: SpaceMode,
) -> Result<Vec<Effect>, CommandError> {
    let key = focused_space(store).ok_or_else(|| CommandError::new(ErrorKind::NotFound, "no active space"))?;
    store.set_space_mode(key.1, mode)?;
    if mode == SpaceMode::Float {
        store.drop_tree(key);
        return Ok(Vec::new());
    }
    if store.tree(key).is_none() {
        let (area, gap, policy) = content_area(store, settings, key)
            .ok_or_else(|| CommandError::stale(format!("display {}", key.0)))?;
        let windows = store.tileable_on(key.1);
        store.create_tree(key, &windows, area, gap, &policy);
    }
    Ok(layout(store, settings, key))
}

fn scratchpad(
    store: &mut TreeStore,
    settings: &Settings,
    op: ScratchpadOp,
) -> Result<Vec<Effect>, CommandError> {
    match op {
        ScratchpadOp::Add => {
            let window = store.focused().ok_or_else(no_focus)?;
            let old = store.locate(window);
            store
                .scratchpad_add(window)
                .map_err(|_| CommandError::stale(format!("window {}", window)))?;
            store.set_focused(None);
            let mut effects = vec![Effect::Hide(window)];
            if let Some(old) = old {
                effects.extend(layout(store, settings, old));
            }
            Ok(effects)
        }
        ScratchpadOp::Remove => {
            let window = store.focused().ok_or_else(no_focus)?;
            store.scratchpad_remove(window)?;
            Ok(tile_window(store, settings, window, None))
        }
        ScratchpadOp::Toggle(index) => {
            let entry = store.scratchpad_toggle(index).ok_or_else(|| {
                CommandError::new(ErrorKind::NotFound, format!("no scratchpad entry {}", index))
            })?;
            if !entry.visible {
                return Ok(vec![Effect::Hide(entry.window)]);
            }
            let space = focused_space(store)
                .map(|(_, space)| space)
                .or_else(|| store.window(entry.window).map(|w| w.space))
                .ok_or_else(|| CommandError::stale(format!("window {}", entry.window)))?;
            if let Some(w) = store.window_mut(entry.window) {
                w.space = space;
            }
            let mut effects = vec![Effect::Show(entry.window, space)];
            effects.extend(center_floating(store, settings, entry.window));
            effects.extend(focus_effects(store, settings, entry.window));
            Ok(effects)
        }
        ScratchpadOp::ShowAll => {
            let space = focused_space(store).map(|(_, space)| space);
            let mut effects = Vec::new();
            for window in store.scratchpad_show_all() {
                let target = match space.or_else(|| store.window(window).map(|w| w.space)) {
                    Some(space) => space,
                    None => continue,
                };
                if let Some(w) = store.window_mut(window) {
                    w.space = target;
                }
                effects.push(Effect::Show(window, target));
            }
            Ok(effects)
        }
    }
}
