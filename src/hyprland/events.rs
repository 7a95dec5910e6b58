//! Translates Hyprland's event stream into splitwm [`Notification`]s.
//!
//! Hyprland writes one `EVENT>>DATA\n` line per event to
//! `$XDG_RUNTIME_DIR/hypr/$HYPRLAND_INSTANCE_SIGNATURE/.socket2.sock`.
//!
//! | Event                | Payload                        | Notification           |
//! |----------------------|--------------------------------|------------------------|
//! | `openwindow`         | `addr,workspace,class,title`   | `WindowCreated`        |
//! | `closewindow`        | `addr`                         | `WindowDestroyed`      |
//! | `movewindowv2`       | `addr,workspace id,name`       | `WindowSpaceChanged`   |
//! | `activewindowv2`     | `addr` (empty when none)       | `FocusChanged`         |
//! | `workspacev2`        | `id,name`                      | `SpaceChanged`         |
//! | `destroyworkspacev2` | `id,name`                      | `SpaceDestroyed`       |
//! | `monitoraddedv2`     | `id,name,description`          | `DisplayChanged`       |
//! | `monitorremoved`     | `name`                         | `DisplayChanged`       |
//!
//! `openwindow` and `workspacev2` lack data the dispatcher needs (the
//! window's frame, the display showing the workspace), so those are
//! completed with a query on the command socket.

use super::wm::HyprlandWm;
use super::{parse_address, socket_path, HyprlandError};
use crate::command::{Event, Notification, SpaceId, WindowId, WindowInfo};
use crate::geometry::Rect;
use crate::traits::{EventSource, WindowService};
use log::{debug, error, info, warn};
use std::io::{BufRead, BufReader};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

/// One parsed event line.
#[derive(Debug, Clone, PartialEq)]
pub enum HyprEvent {
    /// Complete as it is.
    Ready(Notification),
    WindowOpened {
        window: WindowId,
        workspace: String,
        app: String,
        title: String,
    },
    WorkspaceActivated(SpaceId),
}

/// Split `EVENT>>DATA`.
fn split_line(line: &str) -> Option<(&str, &str)> {
    let sep = line.find(">>")?;
    Some((&line[..sep], &line[sep + 2..]))
}

fn first_field(data: &str) -> &str {
    data.split(',').next().unwrap_or("")
}

fn space_id(text: &str) -> Option<SpaceId> {
    text.trim().parse().ok()
}

/// Parse one line from the event socket.  Unknown events give `None`.
pub fn parse_event(line: &str) -> Option<HyprEvent> {
    let (event, data) = split_line(line)?;
    let ready = |n: Notification| Some(HyprEvent::Ready(n));
    match event {
        "openwindow" => {
            let mut parts = data.splitn(4, ',');
            let window = parse_address(parts.next()?)?;
            Some(HyprEvent::WindowOpened {
                window,
                workspace: parts.next().unwrap_or("").to_string(),
                app: parts.next().unwrap_or("").to_string(),
                title: parts.next().unwrap_or("").to_string(),
            })
        }
        "closewindow" => ready(Notification::WindowDestroyed(parse_address(data)?)),
        "movewindowv2" => {
            let mut parts = data.splitn(3, ',');
            let window = parse_address(parts.next()?)?;
            let space = space_id(parts.next()?)?;
            ready(Notification::WindowSpaceChanged { window, space })
        }
        "activewindowv2" => ready(Notification::FocusChanged(parse_address(first_field(data)))),
        "workspacev2" => Some(HyprEvent::WorkspaceActivated(space_id(first_field(data))?)),
        "destroyworkspacev2" => ready(Notification::SpaceDestroyed(space_id(first_field(data))?)),
        "monitoraddedv2" | "monitorremoved" => ready(Notification::DisplayChanged),
        _ => None,
    }
}

/// An [`EventSource`] reading Hyprland's event socket.
pub struct HyprlandEventSource {
    socket: PathBuf,
    wm: HyprlandWm,
}

impl HyprlandEventSource {
    /// Locate the event socket of the running Hyprland instance.
    pub fn new(wm: HyprlandWm) -> Result<Self, HyprlandError> {
        Ok(Self::with_socket(socket_path(".socket2.sock")?, wm))
    }

    pub fn with_socket(socket: impl AsRef<Path>, wm: HyprlandWm) -> Self {
        Self {
            socket: socket.as_ref().to_path_buf(),
            wm,
        }
    }

    /// Fill in what an event line leaves out.
    fn resolve(&self, event: HyprEvent) -> Option<Notification> {
        match event {
            HyprEvent::Ready(notification) => Some(notification),
            HyprEvent::WindowOpened {
                window,
                workspace,
                app,
                title,
            } => match self.wm.client(window) {
                Ok(Some(info)) => Some(Notification::WindowCreated(info)),
                Ok(None) => {
                    debug!("window {} vanished before it was queried", window);
                    None
                }
                Err(e) => {
                    warn!("lookup of window {} failed: {}", window, e);
                    // Special workspaces have names, not numbers.
                    let space = space_id(&workspace)?;
                    Some(Notification::WindowCreated(WindowInfo {
                        id: window,
                        title,
                        app,
                        frame: Rect::default(),
                        space,
                        floating: false,
                    }))
                }
            },
            HyprEvent::WorkspaceActivated(space) => {
                let display = self
                    .wm
                    .displays()
                    .ok()
                    .and_then(|ds| ds.into_iter().find(|d| d.active_space == space));
                match display {
                    Some(d) => Some(Notification::SpaceChanged {
                        display: d.id,
                        space,
                    }),
                    None => Some(Notification::DisplayChanged),
                }
            }
        }
    }
}

impl EventSource for HyprlandEventSource {
    type Error = HyprlandError;

    /// Connect to the event socket and forward notifications.
    ///
    /// This method **blocks** until the socket closes or the sink is
    /// dropped.  Run it on a dedicated thread.
    fn run(&mut self, sink: mpsc::Sender<Event>) -> Result<(), Self::Error> {
        let io = |context: &str, source| HyprlandError::Io {
            context: format!("{} {}", context, self.socket.display()),
            source,
        };
        let stream = UnixStream::connect(&self.socket).map_err(|e| io("connect to", e))?;
        info!("event source connected to {}", self.socket.display());

        for line in BufReader::new(stream).lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    error!("socket2 read error: {}", e);
                    return Err(io("read from", e));
                }
            };
            let notification = match parse_event(&line).and_then(|e| self.resolve(e)) {
                Some(n) => n,
                None => continue,
            };
            debug!("hyprland event: {:?}", notification);
            if sink.send(Event::Notification(notification)).is_err() {
                info!("sink closed, shutting down");
                return Ok(());
            }
        }

        warn!("socket2 stream ended");
        Ok(())
    }
}

//  Tests
