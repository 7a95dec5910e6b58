//! [`WindowService`] implementation backed by Hyprland IPC.
//!
//! Communicates directly with Hyprland through its Unix socket at
//! `$XDG_RUNTIME_DIR/hypr/$HYPRLAND_INSTANCE_SIGNATURE/.socket.sock`,
//! avoiding any shell command invocation or third-party crate for socket
//! discovery.
//!
//! Hyprland lays out tiled windows itself, so every window splitwm places
//! is switched to floating first and then positioned in exact pixels.
//! Such windows also get the [`PLACED_TAG`] tag.  Hyprland reports them as
//! floating from then on, so for tagged windows that flag is dropped again
//! when clients are read back; the tag outlives a daemon restart.
//! Scratchpad windows are parked on the special workspace
//! [`SCRATCHPAD_WORKSPACE`].

use super::{address, parse_address, socket_path, HyprlandError};
use crate::command::{DisplayId, DisplayInfo, SpaceId, WindowId, WindowInfo};
use crate::geometry::{Point, Rect};
use crate::traits::WindowService;
use log::debug;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const SCRATCHPAD_WORKSPACE: &str = "special:splitwm";

/// Tag put on every window splitwm positions.
pub const PLACED_TAG: &str = "splitwm";

/// Hyprland-backed window service.
///
/// No connection is kept open; each call makes a short-lived request.
/// Clones share the record of placed windows.
#[derive(Debug, Clone)]
pub struct HyprlandWm {
    socket: PathBuf,
    /// Windows this process floated for placement.
    placed: Arc<Mutex<HashSet<WindowId>>>,
}

impl HyprlandWm {
    /// Locate the command socket of the running Hyprland instance.
    pub fn new() -> Result<Self, HyprlandError> {
        Ok(Self::with_socket(socket_path(".socket.sock")?))
    }

    pub fn with_socket(socket: impl AsRef<Path>) -> Self {
        Self {
            socket: socket.as_ref().to_path_buf(),
            placed: Arc::default(),
        }
    }

    /// Send a raw request and return the whole response.
    fn request(&self, command: &str) -> Result<String, HyprlandError> {
        let io = |context: &str, source| HyprlandError::Io {
            context: format!("{} {}", context, self.socket.display()),
            source,
        };
        let mut stream = UnixStream::connect(&self.socket).map_err(|e| io("connect to", e))?;
        stream
            .write_all(command.as_bytes())
            .map_err(|e| io("write to", e))?;
        let mut response = String::new();
        stream
            .read_to_string(&mut response)
            .map_err(|e| io("read from", e))?;
        Ok(response)
    }

    /// Send a JSON data query (`j/<what>`).
    fn query<T: DeserializeOwned>(&self, what: &'static str) -> Result<T, HyprlandError> {
        let json = self.request(&format!("j/{}", what))?;
        serde_json::from_str(&json).map_err(|source| HyprlandError::Json { what, source })
    }

    /// Run dispatchers as one batch; every one of them must answer `ok`.
    fn dispatch(&self, commands: &[String]) -> Result<(), HyprlandError> {
        let batch = commands
            .iter()
            .map(|c| format!("/dispatch {}", c))
            .collect::<Vec<_>>()
            .join(";");
        let request = if commands.len() > 1 {
            format!("[[BATCH]]{}", batch)
        } else {
            batch
        };
        debug!("hyprland: {}", request);
        let response = self.request(&request)?;
        if response.replace("ok", "").trim().is_empty() {
            Ok(())
        } else {
            Err(HyprlandError::Dispatch {
                command: request,
                response,
            })
        }
    }

    /// Current information about one window, if it still exists.
    pub fn client(&self, window: WindowId) -> Result<Option<WindowInfo>, HyprlandError> {
        Ok(self.clients()?.into_iter().find(|w| w.id == window))
    }

    /// Every mapped client.
    fn clients(&self) -> Result<Vec<WindowInfo>, HyprlandError> {
        let clients: Vec<ClientJson> = self.query("clients")?;
        let placed = self.placed.lock();
        Ok(clients
            .into_iter()
            .filter_map(|c| c.into_info(&placed))
            .collect())
    }
}

//  Minimal serde structs for the JSON we care about

#[derive(Debug, Deserialize)]
struct WorkspaceRef {
    id: i64,
}

/// Subset of the JSON object returned by `j/monitors`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MonitorJson {
    id: i64,
    name: String,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    #[serde(default = "unit_scale")]
    scale: f64,
    #[serde(default)]
    transform: u8,
    /// Space taken by bars: left, top, right, bottom.
    #[serde(default)]
    reserved: Vec<f64>,
    active_workspace: WorkspaceRef,
}

fn unit_scale() -> f64 {
    1.0
}

impl MonitorJson {
    fn into_info(self) -> Option<DisplayInfo> {
        let id = u32::try_from(self.id).ok()?;
        let scale = if self.scale > 0.0 { self.scale } else { 1.0 };
        let (mut width, mut height) = (self.width / scale, self.height / scale);
        if self.transform % 2 == 1 {
            std::mem::swap(&mut width, &mut height);
        }
        let reserved = |i: usize| self.reserved.get(i).copied().unwrap_or(0.0);
        let frame = Rect::new(
            self.x + reserved(0),
            self.y + reserved(1),
            (width - reserved(0) - reserved(2)).max(0.0),
            (height - reserved(1) - reserved(3)).max(0.0),
        );
        Some(DisplayInfo {
            id: DisplayId(id),
            name: self.name,
            frame,
            active_space: SpaceId(self.active_workspace.id),
        })
    }
}

/// Subset of the JSON object returned by `j/clients`.
#[derive(Debug, Deserialize)]
struct ClientJson {
    address: String,
    at: [f64; 2],
    size: [f64; 2],
    workspace: WorkspaceRef,
    #[serde(default)]
    floating: bool,
    #[serde(default)]
    class: String,
    #[serde(default)]
    title: String,
    #[serde(default = "mapped")]
    mapped: bool,
    #[serde(default)]
    hidden: bool,
    #[serde(default)]
    tags: Vec<String>,
}

fn mapped() -> bool {
    true
}

impl ClientJson {
    /// Windows in `placed` or carrying [`PLACED_TAG`] are reported as not
    /// floating: their float flag is splitwm's own doing.
    fn into_info(self, placed: &HashSet<WindowId>) -> Option<WindowInfo> {
        if !self.mapped || self.hidden {
            return None;
        }
        let id = parse_address(&self.address)?;
        // Dynamic tags are listed with a trailing `*`.
        let tagged = self
            .tags
            .iter()
            .any(|t| t.trim_end_matches('*') == PLACED_TAG);
        Some(WindowInfo {
            id,
            title: self.title,
            app: self.class,
            frame: Rect::new(self.at[0], self.at[1], self.size[0], self.size[1]),
            space: SpaceId(self.workspace.id),
            floating: self.floating && !tagged && !placed.contains(&id),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ActiveWindowJson {
    #[serde(default)]
    address: String,
}

//  WindowService implementation

impl WindowService for HyprlandWm {
    type Error = HyprlandError;

    fn displays(&self) -> Result<Vec<DisplayInfo>, Self::Error> {
        let monitors: Vec<MonitorJson> = self.query("monitors")?;
        Ok(monitors.into_iter().filter_map(MonitorJson::into_info).collect())
    }

    fn query_windows(&self, space: SpaceId) -> Result<Vec<WindowInfo>, Self::Error> {
        Ok(self
            .clients()?
            .into_iter()
            .filter(|w| w.space == space)
            .collect())
    }

    fn focused_window(&self) -> Result<Option<WindowId>, Self::Error> {
        // Hyprland returns an empty object `{}` when no window is focused.
        let active: ActiveWindowJson = self.query("activewindow")?;
        Ok(parse_address(&active.address))
    }

    fn move_resize_window(&self, window: WindowId, frame: Rect) -> Result<(), Self::Error> {
        let target = address(window);
        self.dispatch(&[
            format!("setfloating {}", target),
            format!("tagwindow +{} {}", PLACED_TAG, target),
            format!(
                "resizewindowpixel exact {} {},{}",
                frame.width.round() as i64,
                frame.height.round() as i64,
                target
            ),
            format!(
                "movewindowpixel exact {} {},{}",
                frame.x.round() as i64,
                frame.y.round() as i64,
                target
            ),
        ])?;
        self.placed.lock().insert(window);
        Ok(())
    }

    fn focus_window(&self, window: WindowId) -> Result<(), Self::Error> {
        self.dispatch(&[format!("focuswindow {}", address(window))])
    }

    fn warp_cursor(&self, point: Point) -> Result<(), Self::Error> {
        self.dispatch(&[format!(
            "movecursor {} {}",
            point.x.round() as i64,
            point.y.round() as i64
        )])
    }

    fn hide_window(&self, window: WindowId) -> Result<(), Self::Error> {
        self.dispatch(&[format!(
            "movetoworkspacesilent {},{}",
            SCRATCHPAD_WORKSPACE,
            address(window)
        )])
    }

    fn show_window(&self, window: WindowId, space: SpaceId) -> Result<(), Self::Error> {
        self.move_window_to_space(window, space)
    }

    fn move_window_to_space(&self, window: WindowId, space: SpaceId) -> Result<(), Self::Error> {
        self.dispatch(&[format!("movetoworkspacesilent {},{}", space, address(window))])
    }
}

//  Tests

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;
    use std::sync::atomic::{AtomicU32, Ordering};

    static TEST_ID: AtomicU32 = AtomicU32::new(0);

    fn tmp_socket_path() -> PathBuf {
        let id = TEST_ID.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("splitwm-hypr-{}-{}.sock", std::process::id(), id))
    }

    const MONITORS: &str = r#"[
        {"id": 0, "name": "DP-1", "x": 0, "y": 0, "width": 2560, "height": 1440,
         "scale": 1.0, "transform": 0, "reserved": [0, 30, 0, 0],
         "activeWorkspace": {"id": 1, "name": "1"}, "focused": true},
        {"id": 1, "name": "HDMI-A-1", "x": 2560, "y": 0, "width": 3840, "height": 2160,
         "scale": 2.0, "transform": 1, "reserved": [0, 0, 0, 0],
         "activeWorkspace": {"id": 4, "name": "4"}, "focused": false}
    ]"#;

    const CLIENTS: &str = r#"[
        {"address": "0x55d1c0a0", "mapped": true, "hidden": false, "at": [10, 40],
         "size": [800, 600], "workspace": {"id": 1, "name": "1"}, "floating": false,
         "class": "kitty", "title": "fish"},
        {"address": "0x55d1c0b0", "mapped": true, "hidden": false, "at": [0, 0],
         "size": [400, 300], "workspace": {"id": 4, "name": "4"}, "floating": true,
         "class": "pavucontrol", "title": "Volume"},
        {"address": "0x55d1c0c0", "mapped": false, "hidden": false, "at": [0, 0],
         "size": [0, 0], "workspace": {"id": 1, "name": "1"}, "floating": false,
         "class": "", "title": ""}
    ]"#;

    /// A fake Hyprland answering canned responses and recording requests.
    fn fake_hyprland(respond: fn(&str) -> String) -> (HyprlandWm, Arc<Mutex<Vec<String>>>) {
        let path = tmp_socket_path();
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).expect("bind");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = requests.clone();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let mut stream = match stream {
                    Ok(s) => s,
                    Err(_) => break,
                };
                let mut buf = [0u8; 4096];
                let n = stream.read(&mut buf).unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                let response = respond(&request);
                log.lock().push(request);
                let _ = stream.write_all(response.as_bytes());
            }
        });
        (HyprlandWm::with_socket(&path), requests)
    }

    fn canned(request: &str) -> String {
        match request {
            "j/monitors" => MONITORS.to_string(),
            "j/clients" => CLIENTS.to_string(),
            "j/activewindow" => "{}".to_string(),
            r if r.starts_with("[[BATCH]]") => "okokok".to_string(),
            _ => "ok".to_string(),
        }
    }

    #[test]
    fn displays_use_logical_usable_area() {
        let (wm, _) = fake_hyprland(canned);
        let displays = wm.displays().unwrap();
        assert_eq!(displays.len(), 2);
        assert_eq!(displays[0].frame, Rect::new(0.0, 30.0, 2560.0, 1410.0));
        assert_eq!(displays[0].active_space, SpaceId(1));
        // Scaled by two and rotated.
        assert_eq!(displays[1].frame, Rect::new(2560.0, 0.0, 1080.0, 1920.0));
        assert_eq!(displays[1].id, DisplayId(1));
    }

    #[test]
    fn windows_are_filtered_by_space_and_mapping() {
        let (wm, _) = fake_hyprland(canned);
        let windows = wm.query_windows(SpaceId(1)).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].id, WindowId(0x55d1c0a0));
        assert_eq!(windows[0].app, "kitty");
        assert_eq!(windows[0].frame, Rect::new(10.0, 40.0, 800.0, 600.0));
        assert!(wm.query_windows(SpaceId(4)).unwrap()[0].floating);
        assert_eq!(wm.focused_window().unwrap(), None);
        assert_eq!(
            wm.client(WindowId(0x55d1c0b0)).unwrap().map(|w| w.title),
            Some("Volume".to_string())
        );
    }

    #[test]
    fn move_resize_is_one_batch() {
        let (wm, requests) = fake_hyprland(canned);
        wm.move_resize_window(WindowId(0xabc), Rect::new(10.4, 20.6, 500.0, 400.0))
            .unwrap();
        wm.focus_window(WindowId(0xabc)).unwrap();
        let requests = requests.lock().clone();
        assert_eq!(
            requests,
            vec![
                "[[BATCH]]/dispatch setfloating address:0xabc;\
                 /dispatch tagwindow +splitwm address:0xabc;\
                 /dispatch resizewindowpixel exact 500 400,address:0xabc;\
                 /dispatch movewindowpixel exact 10 21,address:0xabc"
                    .to_string(),
                "/dispatch focuswindow address:0xabc".to_string(),
            ]
        );
    }

    const PLACED_CLIENTS: &str = r#"[
        {"address": "0x55d1c0a0", "at": [0, 0], "size": [960, 1080],
         "workspace": {"id": 1, "name": "1"}, "floating": true,
         "class": "kitty", "title": "left", "tags": ["splitwm*"]},
        {"address": "0x55d1c0b0", "at": [960, 0], "size": [960, 1080],
         "workspace": {"id": 1, "name": "1"}, "floating": true,
         "class": "kitty", "title": "right", "tags": []},
        {"address": "0x55d1c0c0", "at": [100, 100], "size": [300, 200],
         "workspace": {"id": 1, "name": "1"}, "floating": true,
         "class": "pavucontrol", "title": "Volume", "tags": ["audio"]}
    ]"#;

    fn placed_canned(request: &str) -> String {
        match request {
            "j/clients" => PLACED_CLIENTS.to_string(),
            _ => "ok".to_string(),
        }
    }

    #[test]
    fn placed_windows_do_not_report_as_floating() {
        let (wm, _) = fake_hyprland(placed_canned);
        let floating = |wm: &HyprlandWm| -> Vec<bool> {
            wm.query_windows(SpaceId(1))
                .unwrap()
                .into_iter()
                .map(|w| w.floating)
                .collect()
        };
        // Tagged by an earlier run; the others are genuinely floating.
        assert_eq!(floating(&wm), vec![false, true, true]);

        wm.move_resize_window(WindowId(0x55d1c0b0), Rect::new(960.0, 0.0, 960.0, 1080.0))
            .unwrap();
        assert_eq!(floating(&wm), vec![false, false, true]);
        // Clones see the same record.
        assert_eq!(floating(&wm.clone()), vec![false, false, true]);
    }

    #[test]
    fn failed_placement_is_not_recorded() {
        let (wm, _) = fake_hyprland(|r| match r {
            "j/clients" => PLACED_CLIENTS.to_string(),
            _ => "Invalid dispatcher".to_string(),
        });
        assert!(wm
            .move_resize_window(WindowId(0x55d1c0b0), Rect::new(0.0, 0.0, 10.0, 10.0))
            .is_err());
        assert!(wm.client(WindowId(0x55d1c0b0)).unwrap().unwrap().floating);
    }

    #[test]
    fn rejected_dispatch_is_an_error() {
        let (wm, _) = fake_hyprland(|_| "Invalid dispatcher".to_string());
        let err = wm.hide_window(WindowId(1)).unwrap_err();
        assert!(matches!(err, HyprlandError::Dispatch { .. }));
    }

    #[test]
    fn missing_socket_is_an_io_error() {
        let wm = HyprlandWm::with_socket(tmp_socket_path());
        assert!(matches!(wm.displays(), Err(HyprlandError::Io { .. })));
    }
}
