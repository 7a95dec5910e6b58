//! Hyprland-specific implementations.
//!
//! This module provides concrete backends for the
//! [`WindowService`](crate::traits::WindowService) and
//! [`EventSource`](crate::traits::EventSource) traits, powered by
//! Hyprland's IPC sockets.
//!
//! Nothing outside this module should reference Hyprland directly.

pub mod events;
pub mod wm;

use crate::command::WindowId;
use std::path::PathBuf;

/// Errors that can occur when talking to Hyprland.
#[derive(Debug, thiserror::Error)]
pub enum HyprlandError {
    #[error("{0} not set")]
    MissingEnv(&'static str),
    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
    #[error("parse {what}: {source}")]
    Json {
        what: &'static str,
        source: serde_json::Error,
    },
    #[error("dispatch {command:?} failed: {response}")]
    Dispatch { command: String, response: String },
}

/// Resolve one of Hyprland's sockets.
///
/// Hyprland ≥ 0.40 stores them at
/// `$XDG_RUNTIME_DIR/hypr/$HYPRLAND_INSTANCE_SIGNATURE/<name>`.
pub(crate) fn socket_path(name: &str) -> Result<PathBuf, HyprlandError> {
    let runtime_dir =
        std::env::var("XDG_RUNTIME_DIR").map_err(|_| HyprlandError::MissingEnv("XDG_RUNTIME_DIR"))?;
    let his = std::env::var("HYPRLAND_INSTANCE_SIGNATURE")
        .map_err(|_| HyprlandError::MissingEnv("HYPRLAND_INSTANCE_SIGNATURE"))?;
    Ok(PathBuf::from(runtime_dir).join("hypr").join(his).join(name))
}

/// Window addresses are hex, with a `0x` prefix in JSON but not in events.
pub(crate) fn parse_address(text: &str) -> Option<WindowId> {
    let hex = text.trim().trim_start_matches("0x");
    if hex.is_empty() {
        return None;
    }
    u64::from_str_radix(hex, 16).ok().map(WindowId)
}

/// Window selector for dispatchers.
pub(crate) fn address(window: WindowId) -> String {
    format!("address:0x{:x}", window.0)
}
