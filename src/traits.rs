//! Core traits that decouple splitwm from any specific window service or
//! transport mechanism.
//!
//! Every concrete backend (Hyprland, a Unix-socket listener, a test harness,
//! …) implements one of these traits.  The
//! [`Dispatcher`](crate::dispatcher::Dispatcher) only depends on these
//! abstractions.

use crate::command::{DisplayInfo, Event, SpaceId, WindowId, WindowInfo};
use crate::dispatcher::{CommandError, Reply};
use crate::geometry::{Point, Rect};
use std::sync::{mpsc, Arc};

/// Abstraction over the OS window service: enumerates displays and windows
/// and applies geometry and focus changes.
///
/// The dispatcher calls it from several threads and never while holding
/// its mutation lock, so implementations must be [`Send`] + [`Sync`] and
/// may block on round trips.
pub trait WindowService: Send + Sync {
    /// The error type produced by this service.
    type Error: std::error::Error + Send + 'static;

    /// Every display with its usable rectangle and active space.
    fn displays(&self) -> Result<Vec<DisplayInfo>, Self::Error>;

    /// Windows currently on `space`, in the service's stacking or creation
    /// order.
    fn query_windows(&self, space: SpaceId) -> Result<Vec<WindowInfo>, Self::Error>;

    /// The window that currently has keyboard focus.
    fn focused_window(&self) -> Result<Option<WindowId>, Self::Error>;

    fn move_resize_window(&self, window: WindowId, frame: Rect) -> Result<(), Self::Error>;

    fn focus_window(&self, window: WindowId) -> Result<(), Self::Error>;

    fn warp_cursor(&self, point: Point) -> Result<(), Self::Error>;

    /// Take a window off screen without closing it.
    fn hide_window(&self, window: WindowId) -> Result<(), Self::Error>;

    /// Bring a hidden window back onto `space`.
    fn show_window(&self, window: WindowId, space: SpaceId) -> Result<(), Self::Error>;

    /// Send a window to another space without following it.
    fn move_window_to_space(&self, window: WindowId, space: SpaceId) -> Result<(), Self::Error>;
}

/// A source of [`Event`]s.
///
/// Implementations listen on some transport (the compositor's event socket,
/// an input hook, a test harness, …) and forward what they observe into
/// the provided [`mpsc::Sender`].
///
/// # Contract
///
/// * [`run`](EventSource::run) **blocks** until the source is exhausted, the
///   sink is closed, or an unrecoverable error occurs.
/// * Implementations must be [`Send`] so they can run on a dedicated thread.
pub trait EventSource: Send {
    /// The error type produced by this source.
    type Error: std::error::Error + Send + 'static;

    fn run(&mut self, sink: mpsc::Sender<Event>) -> Result<(), Self::Error>;
}

/// The semantic end of the control channel: execute one command line and
/// report the outcome.
pub trait CommandSink: Send + Sync {
    fn execute(&self, text: &str) -> Result<Reply, CommandError>;
}

/// A transport that accepts command lines and hands each one to a
/// [`CommandSink`].
///
/// Implementations may serve several clients at once; the sink is shared.
pub trait ControlChannel: Send {
    /// The error type produced by this channel.
    type Error: std::error::Error + Send + 'static;

    /// Serve clients until the channel is closed.  Blocks.
    fn run(&mut self, sink: Arc<dyn CommandSink>) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Notification;
    use crate::dispatcher::ErrorKind;
    use crate::mock::MockService;

    #[test]
    fn mock_service_records_moves() {
        let wm = MockService::default();
        wm.move_resize_window(WindowId(1), Rect::new(0.0, 0.0, 10.0, 10.0))
            .unwrap();
        let moves = wm.moves();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0], (WindowId(1), Rect::new(0.0, 0.0, 10.0, 10.0)));
    }

    /// A test double that emits a fixed sequence of events.
    struct MockSource {
        events: Vec<Event>,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("mock error")]
    struct MockError;

    impl EventSource for MockSource {
        type Error = MockError;

        fn run(&mut self, sink: mpsc::Sender<Event>) -> Result<(), MockError> {
            for event in self.events.drain(..) {
                let _ = sink.send(event);
            }
            Ok(())
        }
    }

    #[test]
    fn mock_source_emits_events() {
        let mut src = MockSource {
            events: vec![
                Event::Notification(Notification::WindowDestroyed(WindowId(3))),
                Event::Notification(Notification::DisplayChanged),
            ],
        };
        let (tx, rx) = mpsc::channel();
        src.run(tx).unwrap();
        let events: Vec<Event> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            Event::Notification(Notification::WindowDestroyed(WindowId(3)))
        );
    }

    /// A sink that echoes the command back, or fails on "fail".
    struct EchoSink;

    impl CommandSink for EchoSink {
        fn execute(&self, text: &str) -> Result<Reply, CommandError> {
            if text == "fail" {
                return Err(CommandError::new(ErrorKind::InvalidCommand, "nope"));
            }
            Ok(Reply::Output(text.to_string()))
        }
    }

    #[test]
    fn command_sink_is_object_safe() {
        let sink: Arc<dyn CommandSink> = Arc::new(EchoSink);
        assert_eq!(sink.execute("hi"), Ok(Reply::Output("hi".into())));
        assert_eq!(sink.execute("fail").unwrap_err().kind, ErrorKind::InvalidCommand);
    }
}
