// Desktop implementations of the platform seams
// mpv does the streaming and decoding; we drive it over its JSON IPC socket.
// Notifications go through notify-rust, the wake lock is a held
// systemd-inhibit child, and focus is a formality (no desktop arbiter).

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::process::{Child, Command};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::error::{Result, SessionError};
use crate::platform::{
    AudioSource, FocusArbiter, FocusRequest, Notifier, Platform, PlayerEvent, SourceFactory,
    WakeLock,
};

/// How long we keep retrying the IPC socket after spawning mpv.
const IPC_CONNECT_ATTEMPTS: u32 = 40;
const IPC_CONNECT_INTERVAL: Duration = Duration::from_millis(250);

static SOURCE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Wires up the full desktop platform bundle. Player events from whatever
/// source is currently bound arrive on `events`.
pub fn desktop_platform(events: UnboundedSender<PlayerEvent>) -> Platform {
    Platform {
        sources: Box::new(MpvFactory { events }),
        focus: Box::new(SoloFocus),
        wake_lock: Box::new(InhibitLock { child: None }),
        notifier: Box::new(DesktopNotifier { handle: None }),
    }
}

pub struct MpvFactory {
    events: UnboundedSender<PlayerEvent>,
}

impl SourceFactory for MpvFactory {
    fn create(&mut self) -> Result<Box<dyn AudioSource>> {
        Ok(Box::new(MpvSource::new(self.events.clone())))
    }
}

/// One mpv process per bound stream. Spawned paused so "prepared" (mpv's
/// file-loaded event) and "started" stay distinct, the way the session's
/// Preparing/Playing split expects.
pub struct MpvSource {
    child: Option<Child>,
    ipc_tx: Option<UnboundedSender<String>>,
    events: UnboundedSender<PlayerEvent>,
    socket_path: PathBuf,
    playing: bool,
}

impl MpvSource {
    fn new(events: UnboundedSender<PlayerEvent>) -> Self {
        let seq = SOURCE_SEQ.fetch_add(1, Ordering::Relaxed);
        let socket_path = std::env::temp_dir().join(format!(
            "skywave-mpv-{}-{}.sock",
            std::process::id(),
            seq
        ));
        Self {
            child: None,
            ipc_tx: None,
            events,
            socket_path,
            playing: false,
        }
    }

    fn send_command(&self, command: Value) {
        if let Some(tx) = &self.ipc_tx {
            if let Ok(line) = serde_json::to_string(&json!({ "command": command })) {
                let _ = tx.send(line);
            }
        }
    }

    fn teardown(&mut self) {
        if self.ipc_tx.take().is_some() {
            // Dropping the sender makes the IPC task send quit and exit.
            debug!("mpv ipc channel closed");
        }
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
        }
        let _ = std::fs::remove_file(&self.socket_path);
        self.playing = false;
    }
}

impl AudioSource for MpvSource {
    fn bind(&mut self, uri: &str) -> Result<()> {
        let child = Command::new("mpv")
            .arg("--no-video")
            .arg("--no-terminal")
            .arg("--pause")
            .arg("--volume=100")
            .arg(format!("--input-ipc-server={}", self.socket_path.display()))
            .arg(uri)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| SessionError::Bind(format!("failed to spawn mpv: {err}")))?;
        self.child = Some(child);

        let (ipc_tx, ipc_rx) = mpsc::unbounded_channel();
        self.ipc_tx = Some(ipc_tx);
        tokio::spawn(run_ipc(
            self.socket_path.clone(),
            ipc_rx,
            self.events.clone(),
        ));
        Ok(())
    }

    fn start(&mut self) {
        self.send_command(json!(["set_property", "pause", false]));
        self.playing = true;
    }

    fn pause(&mut self) {
        self.send_command(json!(["set_property", "pause", true]));
        self.playing = false;
    }

    fn stop(&mut self) {
        self.send_command(json!(["set_property", "pause", true]));
        self.playing = false;
    }

    fn reset(&mut self) {
        self.teardown();
    }

    fn set_volume(&mut self, left: f32, right: f32) {
        // mpv takes a single 0-100 level.
        let level = (left.max(right).clamp(0.0, 1.0) * 100.0).round();
        self.send_command(json!(["set_property", "volume", level]));
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}

impl Drop for MpvSource {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Owns the IPC socket: forwards outbound command lines, maps mpv's
/// unsolicited events onto [`PlayerEvent`]s.
async fn run_ipc(
    socket_path: PathBuf,
    mut commands: UnboundedReceiver<String>,
    events: UnboundedSender<PlayerEvent>,
) {
    let stream = match connect_with_retry(&socket_path).await {
        Some(stream) => stream,
        None => {
            warn!(path = %socket_path.display(), "mpv ipc socket never appeared");
            let _ = events.send(PlayerEvent::Error(-1));
            return;
        }
    };
    debug!(path = %socket_path.display(), "mpv ipc connected");

    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_ipc_line(&line, &events),
                Ok(None) | Err(_) => break,
            },
            command = commands.recv() => match command {
                Some(mut line) => {
                    line.push('\n');
                    if write_half.write_all(line.as_bytes()).await.is_err() {
                        break;
                    }
                }
                // Source dropped: ask mpv to exit, then stop servicing.
                None => {
                    let _ = write_half.write_all(b"{\"command\":[\"quit\"]}\n").await;
                    break;
                }
            },
        }
    }
    debug!("mpv ipc task finished");
}

async fn connect_with_retry(path: &Path) -> Option<UnixStream> {
    for _ in 0..IPC_CONNECT_ATTEMPTS {
        if let Ok(stream) = UnixStream::connect(path).await {
            return Some(stream);
        }
        tokio::time::sleep(IPC_CONNECT_INTERVAL).await;
    }
    None
}

fn handle_ipc_line(line: &str, events: &UnboundedSender<PlayerEvent>) {
    let message: Value = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(_) => return,
    };
    match message.get("event").and_then(Value::as_str) {
        Some("file-loaded") => {
            let _ = events.send(PlayerEvent::Ready);
        }
        Some("end-file") => {
            match message.get("reason").and_then(Value::as_str) {
                // Deliberate teardown, not the stream's doing.
                Some("quit") | Some("stop") => {}
                Some("error") => {
                    let _ = events.send(PlayerEvent::Error(-2));
                }
                _ => {
                    let _ = events.send(PlayerEvent::Completed);
                }
            }
        }
        _ => {}
    }
}

/// No system-wide audio-focus arbiter exists on the desktop, so requests
/// always succeed and revocations never arrive. The session still runs the
/// full request/abandon protocol against this, same as it would on a host
/// with a real arbiter.
pub struct SoloFocus;

impl FocusArbiter for SoloFocus {
    fn request(&mut self) -> FocusRequest {
        FocusRequest::Granted
    }

    fn abandon(&mut self) {}
}

/// Holds a systemd-inhibit child for as long as the lock is held. Acquire is
/// idempotent; release with nothing held is a no-op.
pub struct InhibitLock {
    child: Option<Child>,
}

impl WakeLock for InhibitLock {
    fn acquire(&mut self) {
        if self.child.is_some() {
            return;
        }
        let spawned = Command::new("systemd-inhibit")
            .args([
                "--what=sleep:idle",
                "--who=skywave",
                "--why=Streaming radio",
                "sleep",
                "infinity",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(child) => {
                debug!("wake lock acquired");
                self.child = Some(child);
            }
            Err(err) => warn!(%err, "could not acquire wake lock"),
        }
    }

    fn release(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
            debug!("wake lock released");
        }
    }
}

impl Drop for InhibitLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Persistent desktop notification for the running session.
pub struct DesktopNotifier {
    handle: Option<notify_rust::NotificationHandle>,
}

impl Notifier for DesktopNotifier {
    fn show(&mut self, summary: &str, body: &str) {
        if let Some(handle) = self.handle.take() {
            handle.close();
        }
        let shown = notify_rust::Notification::new()
            .appname("skywave")
            .summary(summary)
            .body(body)
            .timeout(notify_rust::Timeout::Never)
            .show();
        match shown {
            Ok(handle) => self.handle = Some(handle),
            Err(err) => warn!(%err, "could not show notification"),
        }
    }

    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.close();
        }
    }
}
