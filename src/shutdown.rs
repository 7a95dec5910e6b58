//! Two-phase shutdown.
//!
//! The signal handler only sets a flag.  The primary loop notices the flag
//! between events and runs the bounded cleanup itself, outside of any
//! signal context.

use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared "please stop" flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route SIGINT, SIGTERM and SIGHUP into this flag.
    pub fn install_signal_handler(&self) -> Result<(), ctrlc::Error> {
        let flag = self.clone();
        ctrlc::set_handler(move || flag.request())
    }

    pub fn request(&self) {
        if !self.0.swap(true, Ordering::SeqCst) {
            info!("shutdown requested");
        }
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
