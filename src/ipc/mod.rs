//! Control channel over a Unix socket.
//!
//! External tools (scripts, compositor key bindings, `splitwm -m`) connect
//! to the socket and send newline-delimited commands.

pub mod listener;
