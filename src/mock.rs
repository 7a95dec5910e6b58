//! Test doubles shared by the unit tests.

use crate::command::{DisplayId, DisplayInfo, SpaceId, WindowId, WindowInfo};
use crate::geometry::{Point, Rect};
use crate::traits::WindowService;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;

/// Every call a [`MockService`] received that changes something.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    MoveResize(WindowId, Rect),
    Focus(WindowId),
    Warp(Point),
    Hide(WindowId),
    Show(WindowId, SpaceId),
    MoveToSpace(WindowId, SpaceId),
}

#[derive(Debug, Default)]
struct State {
    displays: Vec<DisplayInfo>,
    windows: BTreeMap<SpaceId, Vec<WindowInfo>>,
    focused: Option<WindowId>,
    calls: Vec<Call>,
    failing: bool,
    delay: Option<Duration>,
}

/// A window service that keeps its world in memory and records calls.
#[derive(Debug, Default)]
pub struct MockService {
    state: Mutex<State>,
}

#[derive(Debug, thiserror::Error)]
#[error("mock service failure")]
pub struct MockError;

impl MockService {
    /// One 1920×1080 display (id 1) showing space 1.
    pub fn single_display() -> Self {
        let service = Self::default();
        service.add_display(DisplayInfo {
            id: DisplayId(1),
            name: "DP-1".into(),
            frame: Rect::new(0.0, 0.0, 1920.0, 1080.0),
            active_space: SpaceId(1),
        });
        service
    }

    pub fn add_display(&self, display: DisplayInfo) {
        self.state.lock().displays.push(display);
    }

    pub fn set_active_space(&self, display: DisplayId, space: SpaceId) {
        let mut state = self.state.lock();
        if let Some(d) = state.displays.iter_mut().find(|d| d.id == display) {
            d.active_space = space;
        }
    }

    pub fn add_window(&self, window: WindowInfo) {
        let mut state = self.state.lock();
        state.windows.entry(window.space).or_default().push(window);
    }

    pub fn remove_window(&self, id: WindowId) {
        let mut state = self.state.lock();
        for windows in state.windows.values_mut() {
            windows.retain(|w| w.id != id);
        }
    }

    pub fn set_focused(&self, window: Option<WindowId>) {
        self.state.lock().focused = window;
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    /// Make every mutating call sleep for `delay` first.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Only the move/resize calls, in order.
    pub fn moves(&self) -> Vec<(WindowId, Rect)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::MoveResize(id, frame) => Some((id, frame)),
                _ => None,
            })
            .collect()
    }

    /// The last frame each window was moved to.
    pub fn last_frame(&self, id: WindowId) -> Option<Rect> {
        self.moves()
            .into_iter()
            .rev()
            .find(|(w, _)| *w == id)
            .map(|(_, f)| f)
    }

    fn record(&self, call: Call) -> Result<(), MockError> {
        let delay = self.state.lock().delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let mut state = self.state.lock();
        if state.failing {
            return Err(MockError);
        }
        state.calls.push(call);
        Ok(())
    }
}

/// A tileable test window on `space`.
pub fn window(id: u64, space: i64) -> WindowInfo {
    WindowInfo {
        id: WindowId(id),
        title: format!("window {}", id),
        app: "Terminal".into(),
        frame: Rect::new(10.0, 10.0, 400.0, 300.0),
        space: SpaceId(space),
        floating: false,
    }
}

impl WindowService for MockService {
    type Error = MockError;

    fn displays(&self) -> Result<Vec<DisplayInfo>, MockError> {
        Ok(self.state.lock().displays.clone())
    }

    fn query_windows(&self, space: SpaceId) -> Result<Vec<WindowInfo>, MockError> {
        let state = self.state.lock();
        if state.failing {
            return Err(MockError);
        }
        Ok(state.windows.get(&space).cloned().unwrap_or_default())
    }

    fn focused_window(&self) -> Result<Option<WindowId>, MockError> {
        Ok(self.state.lock().focused)
    }

    fn move_resize_window(&self, window: WindowId, frame: Rect) -> Result<(), MockError> {
        self.record(Call::MoveResize(window, frame))
    }

    fn focus_window(&self, window: WindowId) -> Result<(), MockError> {
        self.record(Call::Focus(window))?;
        self.state.lock().focused = Some(window);
        Ok(())
    }

    fn warp_cursor(&self, point: Point) -> Result<(), MockError> {
        self.record(Call::Warp(point))
    }

    fn hide_window(&self, window: WindowId) -> Result<(), MockError> {
        self.record(Call::Hide(window))
    }

    fn show_window(&self, window: WindowId, space: SpaceId) -> Result<(), MockError> {
        self.record(Call::Show(window, space))
    }

    fn move_window_to_space(&self, window: WindowId, space: SpaceId) -> Result<(), MockError> {
        self.record(Call::MoveToSpace(window, space))?;
        let mut state = self.state.lock();
        let mut moved = None;
        for windows in state.windows.values_mut() {
            if let Some(pos) = windows.iter().position(|w| w.id == window) {
                moved = Some(windows.remove(pos));
            }
        }
        if let Some(mut w) = moved {
            w.space = space;
            state.windows.entry(space).or_default().push(w);
        }
        Ok(())
    }
}
