//! Unix-socket [`ControlChannel`] implementation.
//!
//! Binds a Unix stream socket and serves every accepted connection on its
//! own thread, so a slow client never holds up another one.  Each line
//! received is one command in the text grammar; each command gets exactly
//! one reply line.
//!
//! # Wire format
//!
//! ```text
//! > focus-left
//! < {"ok":null}
//! > query mode
//! < {"ok":"default"}
//! > mode nope
//! < {"error":{"kind":"mode-not-found","message":"no such mode: \"nope\""}}
//! ```

use crate::dispatcher::{CommandError, ErrorKind, Reply};
use crate::traits::{CommandSink, ControlChannel};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A [`ControlChannel`] listening on a Unix stream socket.
///
/// The socket is bound by [`bind`](UnixSocketListener::bind) so that a
/// failure can be reported before anything else starts.  The socket file
/// is removed again when the listener is dropped.
pub struct UnixSocketListener {
    listener: UnixListener,
    path: PathBuf,
}

/// Errors produced by the Unix socket listener and client.
#[derive(Debug, thiserror::Error)]
pub enum UnixSocketError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("connection closed without a reply")]
    NoReply,
    #[error("another instance is listening on {}", .0.display())]
    InUse(PathBuf),
}

/// The body of an error reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

/// One reply line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Response {
    Ok(Option<String>),
    Error(ErrorBody),
}

impl From<Result<Reply, CommandError>> for Response {
    fn from(result: Result<Reply, CommandError>) -> Self {
        match result {
            Ok(Reply::Done) => Response::Ok(None),
            Ok(Reply::Output(text)) => Response::Ok(Some(text)),
            Err(e) => Response::Error(ErrorBody {
                kind: e.kind,
                message: e.message,
            }),
        }
    }
}

/// Default socket path: `$XDG_RUNTIME_DIR/splitwm.sock`, or the temp dir.
pub fn default_socket_path() -> PathBuf {
    let dir = std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    dir.join("splitwm.sock")
}

impl UnixSocketListener {
    /// Bind the socket at `path`, replacing a stale socket file.
    ///
    /// Fails with [`UnixSocketError::InUse`] when something still accepts
    /// connections there.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self, UnixSocketError> {
        let path = path.as_ref().to_path_buf();
        if UnixStream::connect(&path).is_ok() {
            return Err(UnixSocketError::InUse(path));
        }
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path)?;
        info!("listening on {}", path.display());
        Ok(Self { listener, path })
    }

    /// The filesystem path of the socket.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UnixSocketListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

impl ControlChannel for UnixSocketListener {
    type Error = UnixSocketError;

    /// Accept connections forever, one worker thread each.
    ///
    /// This method **blocks**.  Run it on a dedicated thread.
    fn run(&mut self, sink: Arc<dyn CommandSink>) -> Result<(), Self::Error> {
        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    let sink = Arc::clone(&sink);
                    std::thread::Builder::new()
                        .name("splitwm-client".into())
                        .spawn(move || {
                            debug!("client connected");
                            if let Err(e) = serve(stream, &*sink) {
                                error!("client error: {}", e);
                            }
                            debug!("client disconnected");
                        })?;
                }
                Err(e) => {
                    error!("accept error: {}", e);
                }
            }
        }
        Ok(())
    }
}

/// Answer every command line on one connection.
fn serve(stream: UnixStream, sink: &dyn CommandSink) -> Result<(), UnixSocketError> {
    let reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    for line in reader.lines() {
        let text = line?;
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        debug!("received {:?}", text);
        let response = Response::from(sink.execute(text));
        serde_json::to_writer(&mut writer, &response)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    Ok(())
}

/// Send one command to a running daemon and wait for its reply.
pub fn send_command(path: impl AsRef<Path>, command: &str) -> Result<Response, UnixSocketError> {
    let mut stream = UnixStream::connect(path.as_ref())?;
    writeln!(stream, "{}", command.trim())?;
    stream.shutdown(std::net::Shutdown::Write)?;
    let mut line = String::new();
    if BufReader::new(stream).read_line(&mut line)? == 0 {
        return Err(UnixSocketError::NoReply);
    }
    Ok(serde_json::from_str(line.trim_end())?)
}

//  Tests

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Monotonic counter to generate unique socket paths per test.
    static TEST_ID: AtomicU32 = AtomicU32::new(0);

    /// Helper: create a unique temporary socket path for each test.
    fn tmp_socket_path() -> PathBuf {
        let id = TEST_ID.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("splitwm-test-{}-{}.sock", std::process::id(), id))
    }

    /// Echoes commands back; `fail` fails, `slow` sleeps first.
    struct EchoSink;

    impl CommandSink for EchoSink {
        fn execute(&self, text: &str) -> Result<Reply, CommandError> {
            match text {
                "fail" => Err(CommandError::new(ErrorKind::Stale, "window 4 is gone")),
                "done" => Ok(Reply::Done),
                "slow" => {
                    std::thread::sleep(Duration::from_millis(400));
                    Ok(Reply::Output("slow".into()))
                }
                other => Ok(Reply::Output(other.to_string())),
            }
        }
    }

    fn start(path: &Path) {
        let mut listener = UnixSocketListener::bind(path).expect("bind");
        std::thread::spawn(move || {
            let _ = listener.run(Arc::new(EchoSink));
        });
    }

    #[test]
    fn replies_are_json_lines() {
        let path = tmp_socket_path();
        start(&path);

        let stream = UnixStream::connect(&path).expect("connect");
        let mut writer = stream.try_clone().unwrap();
        writeln!(writer, "query mode").unwrap();
        writeln!(writer).unwrap();
        writeln!(writer, "done").unwrap();
        writeln!(writer, "fail").unwrap();
        writer.shutdown(std::net::Shutdown::Write).unwrap();

        let lines: Vec<String> = BufReader::new(stream).lines().map(|l| l.unwrap()).collect();
        assert_eq!(
            lines,
            vec![
                r#"{"ok":"query mode"}"#.to_string(),
                r#"{"ok":null}"#.to_string(),
                r#"{"error":{"kind":"stale","message":"window 4 is gone"}}"#.to_string(),
            ]
        );
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn client_helper_round_trip() {
        let path = tmp_socket_path();
        start(&path);
        assert_eq!(
            send_command(&path, "focus-left\n").unwrap(),
            Response::Ok(Some("focus-left".into()))
        );
        assert_eq!(
            send_command(&path, "fail").unwrap(),
            Response::Error(ErrorBody {
                kind: ErrorKind::Stale,
                message: "window 4 is gone".into(),
            })
        );
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn slow_client_does_not_block_others() {
        let path = tmp_socket_path();
        start(&path);
        let slow_path = path.clone();
        let slow = std::thread::spawn(move || send_command(&slow_path, "slow"));
        std::thread::sleep(Duration::from_millis(50));

        let started = std::time::Instant::now();
        assert_eq!(
            send_command(&path, "quick").unwrap(),
            Response::Ok(Some("quick".into()))
        );
        assert!(started.elapsed() < Duration::from_millis(300));
        assert_eq!(slow.join().unwrap().unwrap(), Response::Ok(Some("slow".into())));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn stale_socket_file_is_replaced_and_removed_on_drop() {
        let path = tmp_socket_path();
        std::fs::write(&path, b"leftover").unwrap();
        let listener = UnixSocketListener::bind(&path).expect("bind over stale file");
        assert_eq!(listener.path(), path.as_path());
        drop(listener);
        assert!(!path.exists());
    }

    #[test]
    fn live_socket_is_not_taken_over() {
        let path = tmp_socket_path();
        let first = UnixSocketListener::bind(&path).expect("bind");
        match UnixSocketListener::bind(&path) {
            Err(UnixSocketError::InUse(p)) => assert_eq!(p, path),
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("second bind succeeded"),
        }
        assert!(path.exists());
        drop(first);
    }

    #[test]
    fn dead_socket_is_replaced() {
        let path = tmp_socket_path();
        // A listener that went away without cleaning up.
        drop(UnixListener::bind(&path).expect("bind"));
        assert!(path.exists());
        let listener = UnixSocketListener::bind(&path).expect("bind over dead socket");
        drop(listener);
        assert!(!path.exists());
    }

    #[test]
    fn connecting_without_daemon_fails() {
        let path = tmp_socket_path();
        assert!(matches!(send_command(&path, "quit"), Err(UnixSocketError::Io(_))));
    }
}
