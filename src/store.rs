//! The layout tree store.
//!
//! [`TreeStore`] is the single piece of mutable state the dispatcher guards
//! with its mutation lock.  It knows every display, every space seen so far,
//! every managed window and one [`LayoutTree`] per (display, space) pair.
//! It never talks to the window service.

use crate::command::{DisplayId, DisplayInfo, SpaceId, WindowId, WindowInfo};
use crate::geometry::Rect;
use crate::settings::SpaceMode;
use crate::tree::{LayoutTree, SplitPolicy, TreeError};
use std::collections::{BTreeMap, HashMap};

/// Key of a layout tree.
pub type TreeKey = (DisplayId, SpaceId);

/// The spaces a display showed before and after its last space change.
///
/// Never mutated in place: every change produces a new pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpacePair {
    pub previous: Option<SpaceId>,
    pub current: SpaceId,
}

impl SpacePair {
    pub fn new(current: SpaceId) -> Self {
        Self {
            previous: None,
            current,
        }
    }

    /// The pair after switching to `next`.
    pub fn advance(self, next: SpaceId) -> Self {
        if next == self.current {
            return self;
        }
        Self {
            previous: Some(self.current),
            current: next,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Display {
    pub id: DisplayId,
    pub name: String,
    /// Usable rectangle as reported by the window service, before padding.
    pub frame: Rect,
    pub spaces: SpacePair,
    /// Spaces seen on this display, in the order they were first shown.
    pub known_spaces: Vec<SpaceId>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Space {
    pub id: SpaceId,
    pub display: DisplayId,
    pub mode: SpaceMode,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub id: WindowId,
    pub title: String,
    pub app: String,
    pub frame: Rect,
    pub space: SpaceId,
    /// Floating windows are never part of a tree.
    pub floating: bool,
    /// Observation order, used when a tree is rebuilt.
    seq: u64,
}

/// A window parked in the scratchpad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchpadEntry {
    pub window: WindowId,
    pub visible: bool,
}

#[derive(Debug, Default)]
pub struct TreeStore {
    displays: BTreeMap<DisplayId, Display>,
    spaces: HashMap<SpaceId, Space>,
    trees: HashMap<TreeKey, LayoutTree>,
    windows: HashMap<WindowId, Window>,
    next_seq: u64,
    focused: Option<WindowId>,
    marked: Option<WindowId>,
    scratchpad: Vec<ScratchpadEntry>,
}

impl TreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    //  Displays and spaces

    /// Add a display or refresh what is known about it.  The display's
    /// active space is registered with `mode` if it is new.
    pub fn attach_display(&mut self, info: &DisplayInfo, mode: SpaceMode) {
        let display = self.displays.entry(info.id).or_insert_with(|| Display {
            id: info.id,
            name: info.name.clone(),
            frame: info.frame,
            spaces: SpacePair::new(info.active_space),
            known_spaces: Vec::new(),
        });
        display.name = info.name.clone();
        display.frame = info.frame;
        self.activate_space(info.id, info.active_space, mode);
    }

    /// Forget a display together with its spaces and trees.
    pub fn detach_display(&mut self, id: DisplayId) -> Option<Display> {
        let display = self.displays.remove(&id)?;
        self.trees.retain(|(d, _), _| *d != id);
        self.spaces.retain(|_, s| s.display != id);
        Some(display)
    }

    pub fn display(&self, id: DisplayId) -> Option<&Display> {
        self.displays.get(&id)
    }

    pub fn displays(&self) -> impl Iterator<Item = &Display> {
        self.displays.values()
    }

    /// Make `space` the active space of `display`, returning the new pair.
    ///
    /// The space is registered with `mode` the first time it is seen.
    pub fn activate_space(
        &mut self,
        display: DisplayId,
        space: SpaceId,
        mode: SpaceMode,
    ) -> Option<SpacePair> {
        let entry = self.displays.get_mut(&display)?;
        let pair = entry.spaces.advance(space);
        entry.spaces = pair;
        if !entry.known_spaces.contains(&space) {
            entry.known_spaces.push(space);
        }

        for s in self.spaces.values_mut().filter(|s| s.display == display) {
            s.active = false;
        }
        let s = self.spaces.entry(space).or_insert(Space {
            id: space,
            display,
            mode,
            active: true,
        });
        if s.display != display {
            // The space moved to another display: its old tree is stale.
            let old = (s.display, space);
            s.display = display;
            self.trees.remove(&old);
        }
        s.active = true;
        Some(pair)
    }

    /// Forget a space and its tree.  Windows still on it stay known.
    pub fn destroy_space(&mut self, space: SpaceId) -> Option<Space> {
        let removed = self.spaces.remove(&space)?;
        self.trees.retain(|(_, s), _| *s != space);
        for display in self.displays.values_mut() {
            display.known_spaces.retain(|s| *s != space);
        }
        Some(removed)
    }

    pub fn space(&self, id: SpaceId) -> Option<&Space> {
        self.spaces.get(&id)
    }

    pub fn set_space_mode(&mut self, id: SpaceId, mode: SpaceMode) -> Result<(), TreeError> {
        let space = self.spaces.get_mut(&id).ok_or(TreeError::SpaceNotFound(id))?;
        space.mode = mode;
        Ok(())
    }

    /// Active spaces, one per display, in display order.
    pub fn active_spaces(&self) -> Vec<TreeKey> {
        self.displays
            .values()
            .map(|d| (d.id, d.spaces.current))
            .collect()
    }

    //  Trees

    pub fn tree(&self, key: TreeKey) -> Option<&LayoutTree> {
        self.trees.get(&key)
    }

    pub fn tree_mut(&mut self, key: TreeKey) -> Option<&mut LayoutTree> {
        self.trees.get_mut(&key)
    }

    /// Key of the tree for `space`, if the space is known.
    pub fn key_of_space(&self, space: SpaceId) -> Option<TreeKey> {
        self.spaces.get(&space).map(|s| (s.display, space))
    }

    /// Build a fresh tree for `key` from `windows`, replacing any old one.
    /// Windows already tiled in another tree are left where they are.
    pub fn create_tree(
        &mut self,
        key: TreeKey,
        windows: &[WindowId],
        area: Rect,
        gap: f64,
        policy: &SplitPolicy,
    ) -> &LayoutTree {
        self.trees.remove(&key);
        let free: Vec<WindowId> = windows
            .iter()
            .copied()
            .filter(|w| self.locate(*w).is_none())
            .collect();
        self.trees
            .entry(key)
            .or_insert_with(|| LayoutTree::build(&free, area, gap, policy))
    }

    /// Make sure `key` has a tree, creating an empty one if needed.
    pub fn ensure_tree(&mut self, key: TreeKey) -> &mut LayoutTree {
        self.trees.entry(key).or_default()
    }

    pub fn drop_tree(&mut self, key: TreeKey) -> Option<LayoutTree> {
        self.trees.remove(&key)
    }

    /// The tree holding `window`.
    pub fn locate(&self, window: WindowId) -> Option<TreeKey> {
        self.trees
            .iter()
            .find(|(_, tree)| tree.contains(window))
            .map(|(key, _)| *key)
    }

    /// Insert `window` into the tree for `key`.
    ///
    /// Fails if the window is already tiled anywhere, if the tree does not
    /// exist or if `anchor` is given but not in that tree.
    pub fn insert_window(
        &mut self,
        key: TreeKey,
        window: WindowId,
        anchor: Option<WindowId>,
        area: Rect,
        gap: f64,
        policy: &SplitPolicy,
    ) -> Result<(), TreeError> {
        if self.locate(window).is_some() {
            return Err(TreeError::AlreadyTiled(window));
        }
        let tree = self
            .trees
            .get_mut(&key)
            .ok_or(TreeError::SpaceNotFound(key.1))?;
        tree.insert(window, anchor, area, gap, policy)
    }

    /// Remove `window` from whichever tree holds it.
    pub fn remove_window(&mut self, window: WindowId) -> Result<TreeKey, TreeError> {
        let key = self.locate(window).ok_or(TreeError::NotFound(window))?;
        if let Some(tree) = self.trees.get_mut(&key) {
            tree.remove(window)?;
        }
        Ok(key)
    }

    //  Windows

    /// Record a window, keeping its observation order if already known.
    pub fn upsert_window(&mut self, info: &WindowInfo, floating: bool) -> &Window {
        let seq = match self.windows.get(&info.id) {
            Some(w) => w.seq,
            None => {
                self.next_seq += 1;
                self.next_seq
            }
        };
        self.windows.insert(
            info.id,
            Window {
                id: info.id,
                title: info.title.clone(),
                app: info.app.clone(),
                frame: info.frame,
                space: info.space,
                floating,
                seq,
            },
        );
        &self.windows[&info.id]
    }

    pub fn window(&self, id: WindowId) -> Option<&Window> {
        self.windows.get(&id)
    }

    pub fn window_mut(&mut self, id: WindowId) -> Option<&mut Window> {
        self.windows.get_mut(&id)
    }

    /// Drop every trace of a window: its leaf, the mark, focus and any
    /// scratchpad entry.
    pub fn forget_window(&mut self, id: WindowId) -> Option<Window> {
        let _ = self.remove_window(id);
        if self.marked == Some(id) {
            self.marked = None;
        }
        if self.focused == Some(id) {
            self.focused = None;
        }
        self.scratchpad.retain(|e| e.window != id);
        self.windows.remove(&id)
    }

    /// Known windows on `space` in observation order.
    pub fn windows_on(&self, space: SpaceId) -> Vec<&Window> {
        let mut windows: Vec<&Window> = self
            .windows
            .values()
            .filter(|w| w.space == space)
            .collect();
        windows.sort_by_key(|w| w.seq);
        windows
    }

    /// Windows on `space` that belong in its tree.
    pub fn tileable_on(&self, space: SpaceId) -> Vec<WindowId> {
        self.windows_on(space)
            .into_iter()
            .filter(|w| !w.floating && !self.in_scratchpad(w.id))
            .map(|w| w.id)
            .collect()
    }

    //  Focus and mark

    pub fn focused(&self) -> Option<WindowId> {
        self.focused
    }

    pub fn set_focused(&mut self, window: Option<WindowId>) {
        self.focused = window;
    }

    /// Tree holding the focused window.
    pub fn focused_key(&self) -> Option<TreeKey> {
        self.focused.and_then(|w| self.locate(w))
    }

    pub fn marked(&self) -> Option<WindowId> {
        self.marked
    }

    /// Mark `window`, replacing any previous mark.
    pub fn mark(&mut self, window: WindowId) -> Result<(), TreeError> {
        if !self.windows.contains_key(&window) {
            return Err(TreeError::NotFound(window));
        }
        self.marked = Some(window);
        Ok(())
    }

    pub fn unmark(&mut self) -> Option<WindowId> {
        self.marked.take()
    }

    //  Scratchpad

    pub fn scratchpad(&self) -> &[ScratchpadEntry] {
        &self.scratchpad
    }

    pub fn in_scratchpad(&self, window: WindowId) -> bool {
        self.scratchpad.iter().any(|e| e.window == window)
    }

    /// Move a window into the scratchpad (hidden), taking it out of tiling.
    pub fn scratchpad_add(&mut self, window: WindowId) -> Result<(), TreeError> {
        if !self.windows.contains_key(&window) {
            return Err(TreeError::NotFound(window));
        }
        let _ = self.remove_window(window);
        if !self.in_scratchpad(window) {
            self.scratchpad.push(ScratchpadEntry {
                window,
                visible: false,
            });
        }
        Ok(())
    }

    pub fn scratchpad_remove(&mut self, window: WindowId) -> Result<(), TreeError> {
        let before = self.scratchpad.len();
        self.scratchpad.retain(|e| e.window != window);
        if self.scratchpad.len() == before {
            return Err(TreeError::NotFound(window));
        }
        Ok(())
    }

    /// Flip visibility of the entry at `index`, returning the entry.
    pub fn scratchpad_toggle(&mut self, index: usize) -> Option<ScratchpadEntry> {
        let entry = self.scratchpad.get_mut(index)?;
        entry.visible = !entry.visible;
        Some(*entry)
    }

    /// Mark every entry visible, returning the ones that were hidden.
    pub fn scratchpad_show_all(&mut self) -> Vec<WindowId> {
        let mut shown = Vec::new();
        for entry in self.scratchpad.iter_mut().filter(|e| !e.visible) {
            entry.visible = true;
            shown.push(entry.window);
        }
        shown
    }
}
