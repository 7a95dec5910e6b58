//! **splitwm** is a binary space partitioning tiler.
//!
//! Every (display, space) pair owns a binary tree whose leaves are windows
//! and whose inner nodes split their rectangle in two.  Opening a window
//! splits a leaf; closing one contracts the tree; commands resize, rotate,
//! flip and swap.  Geometry is derived from the tree and pushed to the
//! compositor.
//!
//! # Architecture
//!
//! The crate is organised around a handful of traits in [`traits`]:
//!
//! * [`traits::WindowService`]: enumerates displays and windows and applies
//!   geometry, so the layout logic is not coupled to any compositor.
//! * [`traits::EventSource`]: delivers notifications (window opened,
//!   space switched, …) to the primary loop.
//! * [`traits::ControlChannel`] and [`traits::CommandSink`]: carry text
//!   commands from scripts to the [`dispatcher`].
//!
//! The [`dispatcher::Dispatcher`] owns the [`store::TreeStore`] behind one
//! mutation lock and is the only code that changes it.  Concrete
//! implementations live in [`hyprland`] (Hyprland IPC) and [`ipc`]
//! (Unix-socket control channel).

pub mod command;
pub mod config;
pub mod dispatcher;
pub mod geometry;
pub mod hotkey;
pub mod hyprland;
pub mod input;
pub mod ipc;
pub mod reconcile;
pub mod registry;
pub mod settings;
pub mod shutdown;
pub mod store;
pub mod traits;
pub mod tree;

#[cfg(test)]
pub(crate) mod mock;
