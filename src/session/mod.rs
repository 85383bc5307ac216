// The playback session state machine
// One session per process, one playback resource per session. Commands and
// asynchronous platform callbacks all funnel through the same state-guarded
// entry points; nothing here retries on failure - errors unwind to Idle and
// the next `play` starts fresh.

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::SessionError;
use crate::platform::{AudioSource, FocusChange, FocusRequest, Platform, PlayerEvent};

const FULL_VOLUME: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No playback resource exists. Initial state, and where every stop,
    /// completion, error and permanent focus loss lands.
    Idle,
    /// Resource created and bound, waiting for the async prepare to finish.
    Preparing,
    Playing,
    /// Resource kept alive but suspended; `play` resumes it without a new
    /// bind or focus request.
    Paused,
}

/// The three host-facing commands. Each is a no-op when inapplicable to the
/// current state, and none of them ever brings the hosting process down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Play,
    Pause,
    Stop,
}

/// What the session reports back to whoever is driving it.
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    StateChanged(SessionState),
    Ducked,
    Failed(String),
}

pub struct StreamSession {
    state: SessionState,
    stream_uri: String,
    station_name: String,
    duck_volume: f32,
    source: Option<Box<dyn AudioSource>>,
    platform: Platform,
    wake_lock_held: bool,
    focus_granted: bool,
    event_sender: Option<mpsc::UnboundedSender<SessionUpdate>>,
}

impl StreamSession {
    pub fn new(platform: Platform, stream_uri: String, station_name: String) -> Self {
        Self {
            state: SessionState::Idle,
            stream_uri,
            station_name,
            duck_volume: 0.1,
            source: None,
            platform,
            wake_lock_held: false,
            focus_granted: false,
            event_sender: None,
        }
    }

    /// Attenuated volume used while another app holds transient focus.
    pub fn with_duck_volume(mut self, volume: f32) -> Self {
        self.duck_volume = volume.clamp(0.0, 1.0);
        self
    }

    pub fn set_event_sender(&mut self, sender: mpsc::UnboundedSender<SessionUpdate>) {
        self.event_sender = Some(sender);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn wake_lock_held(&self) -> bool {
        self.wake_lock_held
    }

    pub fn focus_granted(&self) -> bool {
        self.focus_granted
    }

    /// Host command entry point. Whatever the outcome, the host keeps
    /// running - failures are logged and reported, never returned.
    pub fn dispatch(&mut self, command: Command) {
        debug!(?command, state = ?self.state, "dispatching command");
        match command {
            Command::Play => self.play(),
            Command::Pause => self.pause(),
            Command::Stop => self.stop(),
        }
    }

    fn play(&mut self) {
        match self.state {
            SessionState::Playing | SessionState::Preparing => {
                debug!(state = ?self.state, "play ignored, already underway");
            }
            SessionState::Paused => self.resume(),
            SessionState::Idle => self.begin_stream(),
        }
    }

    fn pause(&mut self) {
        if !matches!(self.state, SessionState::Preparing | SessionState::Playing) {
            debug!(state = ?self.state, "pause ignored");
            return;
        }
        if let Some(source) = &mut self.source {
            source.pause();
        }
        self.release_wake_lock();
        self.platform.notifier.cancel();
        self.set_state(SessionState::Paused);
    }

    fn stop(&mut self) {
        if self.state == SessionState::Idle {
            debug!("stop ignored, nothing to stop");
            return;
        }
        // Dropping the source hands the resource back to the platform.
        if let Some(mut source) = self.source.take() {
            if source.is_playing() {
                source.stop();
            }
            source.reset();
        }
        self.release_wake_lock();
        self.platform.notifier.cancel();
        if self.focus_granted {
            self.platform.focus.abandon();
            self.focus_granted = false;
        }
        self.set_state(SessionState::Idle);
    }

    /// Fresh start from Idle: focus first, then the resource. A denied focus
    /// request aborts before anything is created or acquired.
    fn begin_stream(&mut self) {
        if self.platform.focus.request() == FocusRequest::Denied {
            self.report(SessionError::FocusDenied);
            return;
        }
        self.focus_granted = true;
        self.begin_stream_with_focus();
    }

    /// Start of the bind/prepare path once focus is already ours (either just
    /// granted, or handed back via a Gained interrupt).
    fn begin_stream_with_focus(&mut self) {
        let mut source = match self.platform.sources.create() {
            Ok(source) => source,
            Err(err) => {
                self.report(err);
                self.platform.focus.abandon();
                self.focus_granted = false;
                return;
            }
        };
        if let Err(err) = source.bind(&self.stream_uri) {
            self.report(err);
            self.platform.focus.abandon();
            self.focus_granted = false;
            return;
        }
        self.source = Some(source);
        self.acquire_wake_lock();
        self.platform
            .notifier
            .show(&self.station_name, "Connecting to stream...");
        self.set_state(SessionState::Preparing);
    }

    /// Resume path: the suspended resource is restarted as-is. No new bind,
    /// no new focus request.
    fn resume(&mut self) {
        if let Some(source) = &mut self.source {
            source.start();
        }
        self.acquire_wake_lock();
        self.platform
            .notifier
            .show(&self.station_name, "Radio is playing");
        self.set_state(SessionState::Playing);
    }

    /// The bound resource finished preparing. Only meaningful while
    /// Preparing; a late arrival after stop or pause is dropped here rather
    /// than by cancelling the in-flight prepare.
    pub fn on_ready(&mut self) {
        if self.state != SessionState::Preparing {
            debug!(state = ?self.state, "late ready callback ignored");
            return;
        }
        if let Some(source) = &mut self.source {
            source.set_volume(FULL_VOLUME, FULL_VOLUME);
            source.start();
        }
        self.platform
            .notifier
            .show(&self.station_name, "Radio is playing");
        self.set_state(SessionState::Playing);
    }

    /// The stream ended on its own.
    pub fn on_completion(&mut self) {
        if self.source.is_none() {
            return;
        }
        info!("stream completed, tearing session down");
        self.stop();
    }

    /// The resource reported a playback failure. Unwind and report; the
    /// caller decides whether to issue a new `play`.
    pub fn on_error(&mut self, code: i32) {
        if self.source.is_none() {
            return;
        }
        self.report(SessionError::Playback(code));
        self.stop();
    }

    /// External focus interrupt from the host arbiter.
    pub fn on_focus_change(&mut self, change: FocusChange) {
        debug!(?change, state = ?self.state, "focus change");
        match change {
            FocusChange::Gained => {
                self.focus_granted = true;
                match self.state {
                    SessionState::Paused => self.resume(),
                    SessionState::Idle => self.begin_stream_with_focus(),
                    SessionState::Playing | SessionState::Preparing => {}
                }
                // Whatever got us here, we are no longer ducked.
                if let Some(source) = &mut self.source {
                    source.set_volume(FULL_VOLUME, FULL_VOLUME);
                }
            }
            FocusChange::LostPermanently => {
                warn!("audio focus lost permanently, stopping");
                self.focus_granted = false;
                self.stop();
            }
            FocusChange::LostTransient => {
                self.focus_granted = false;
                self.pause();
            }
            FocusChange::LostTransientCanDuck => {
                if self.state == SessionState::Playing {
                    if let Some(source) = &mut self.source {
                        source.set_volume(self.duck_volume, self.duck_volume);
                    }
                    self.emit(SessionUpdate::Ducked);
                }
            }
        }
    }

    /// Tear the whole session down; used when the host itself is going away.
    pub fn shutdown(&mut self) {
        self.stop();
    }

    fn acquire_wake_lock(&mut self) {
        // Idempotent on the platform side too, but don't rely on it.
        if !self.wake_lock_held {
            self.platform.wake_lock.acquire();
            self.wake_lock_held = true;
        }
    }

    fn release_wake_lock(&mut self) {
        if self.wake_lock_held {
            self.platform.wake_lock.release();
            self.wake_lock_held = false;
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            info!(from = ?self.state, to = ?state, "session state change");
            self.state = state;
            self.emit(SessionUpdate::StateChanged(state));
        }
    }

    fn report(&mut self, err: SessionError) {
        error!(%err, "session error");
        self.emit(SessionUpdate::Failed(err.to_string()));
    }

    fn emit(&self, update: SessionUpdate) {
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(update);
        }
    }
}

impl StreamSession {
    /// Convenience for hosts that forward raw player callbacks.
    pub fn on_player_event(&mut self, event: PlayerEvent) {
        match event {
            PlayerEvent::Ready => self.on_ready(),
            PlayerEvent::Completed => self.on_completion(),
            PlayerEvent::Error(code) => self.on_error(code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::platform::{
        AudioSource, FocusArbiter, FocusRequest, Notifier, SourceFactory, WakeLock,
    };
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Probe {
        sources_created: Arc<AtomicUsize>,
        starts: Arc<AtomicUsize>,
        playing: Arc<AtomicBool>,
        volumes: Arc<Mutex<Vec<(f32, f32)>>>,
        focus_requests: Arc<AtomicUsize>,
        focus_abandons: Arc<AtomicUsize>,
        lock_held: Arc<AtomicBool>,
        lock_acquisitions: Arc<AtomicUsize>,
        notification_visible: Arc<AtomicBool>,
    }

    struct FakeSource {
        probe: Probe,
    }

    impl AudioSource for FakeSource {
        fn bind(&mut self, _uri: &str) -> Result<()> {
            Ok(())
        }
        fn start(&mut self) {
            self.probe.starts.fetch_add(1, Ordering::SeqCst);
            self.probe.playing.store(true, Ordering::SeqCst);
        }
        fn pause(&mut self) {
            self.probe.playing.store(false, Ordering::SeqCst);
        }
        fn stop(&mut self) {
            self.probe.playing.store(false, Ordering::SeqCst);
        }
        fn reset(&mut self) {}
        fn set_volume(&mut self, left: f32, right: f32) {
            self.probe.volumes.lock().unwrap().push((left, right));
        }
        fn is_playing(&self) -> bool {
            self.probe.playing.load(Ordering::SeqCst)
        }
    }

    struct FakeFactory {
        probe: Probe,
    }

    impl SourceFactory for FakeFactory {
        fn create(&mut self) -> Result<Box<dyn AudioSource>> {
            self.probe.sources_created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeSource {
                probe: self.probe.clone(),
            }))
        }
    }

    struct FakeFocus {
        probe: Probe,
        grant: bool,
    }

    impl FocusArbiter for FakeFocus {
        fn request(&mut self) -> FocusRequest {
            self.probe.focus_requests.fetch_add(1, Ordering::SeqCst);
            if self.grant {
                FocusRequest::Granted
            } else {
                FocusRequest::Denied
            }
        }
        fn abandon(&mut self) {
            self.probe.focus_abandons.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeLock {
        probe: Probe,
    }

    impl WakeLock for FakeLock {
        fn acquire(&mut self) {
            if !self.probe.lock_held.swap(true, Ordering::SeqCst) {
                self.probe.lock_acquisitions.fetch_add(1, Ordering::SeqCst);
            }
        }
        fn release(&mut self) {
            self.probe.lock_held.store(false, Ordering::SeqCst);
        }
    }

    struct FakeNotifier {
        probe: Probe,
    }

    impl Notifier for FakeNotifier {
        fn show(&mut self, _summary: &str, _body: &str) {
            self.probe.notification_visible.store(true, Ordering::SeqCst);
        }
        fn cancel(&mut self) {
            self.probe.notification_visible.store(false, Ordering::SeqCst);
        }
    }

    fn harness(grant_focus: bool) -> (StreamSession, Probe) {
        let probe = Probe::default();
        let platform = Platform {
            sources: Box::new(FakeFactory {
                probe: probe.clone(),
            }),
            focus: Box::new(FakeFocus {
                probe: probe.clone(),
                grant: grant_focus,
            }),
            wake_lock: Box::new(FakeLock {
                probe: probe.clone(),
            }),
            notifier: Box::new(FakeNotifier {
                probe: probe.clone(),
            }),
        };
        let session = StreamSession::new(
            platform,
            "http://radio.example/stream".to_string(),
            "Test FM".to_string(),
        );
        (session, probe)
    }

    fn assert_invariants(session: &StreamSession) {
        // Resource handle exists iff the session is not Idle.
        assert_eq!(session.has_source(), session.state() != SessionState::Idle);
        // Wake lock held only while preparing or playing.
        let should_hold = matches!(
            session.state(),
            SessionState::Preparing | SessionState::Playing
        );
        assert_eq!(session.wake_lock_held(), should_hold);
    }

    fn playing_session() -> (StreamSession, Probe) {
        let (mut session, probe) = harness(true);
        session.dispatch(Command::Play);
        session.on_ready();
        assert_eq!(session.state(), SessionState::Playing);
        (session, probe)
    }

    #[test]
    fn commands_follow_transition_table() {
        let (mut session, _probe) = harness(true);
        assert_eq!(session.state(), SessionState::Idle);

        // No-ops while Idle.
        session.dispatch(Command::Pause);
        assert_eq!(session.state(), SessionState::Idle);
        session.dispatch(Command::Stop);
        assert_eq!(session.state(), SessionState::Idle);
        assert_invariants(&session);

        session.dispatch(Command::Play);
        assert_eq!(session.state(), SessionState::Preparing);
        assert_invariants(&session);

        // Play while Preparing is a no-op.
        session.dispatch(Command::Play);
        assert_eq!(session.state(), SessionState::Preparing);

        session.on_ready();
        assert_eq!(session.state(), SessionState::Playing);
        assert_invariants(&session);

        // Play while Playing is a no-op.
        session.dispatch(Command::Play);
        assert_eq!(session.state(), SessionState::Playing);

        session.dispatch(Command::Pause);
        assert_eq!(session.state(), SessionState::Paused);
        assert_invariants(&session);

        // Pause while Paused is a no-op.
        session.dispatch(Command::Pause);
        assert_eq!(session.state(), SessionState::Paused);

        session.dispatch(Command::Play);
        assert_eq!(session.state(), SessionState::Playing);
        assert_invariants(&session);

        session.dispatch(Command::Stop);
        assert_eq!(session.state(), SessionState::Idle);
        assert_invariants(&session);
    }

    #[test]
    fn focus_denied_aborts_without_side_effects() {
        let (mut session, probe) = harness(false);
        session.dispatch(Command::Play);

        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.has_source());
        assert!(!session.focus_granted());
        assert_eq!(probe.sources_created.load(Ordering::SeqCst), 0);
        assert!(!probe.lock_held.load(Ordering::SeqCst));
        assert!(!probe.notification_visible.load(Ordering::SeqCst));
    }

    #[test]
    fn granted_play_reaches_playing_via_ready() {
        let (mut session, probe) = harness(true);
        session.dispatch(Command::Play);

        assert_eq!(session.state(), SessionState::Preparing);
        assert!(session.focus_granted());
        assert!(probe.lock_held.load(Ordering::SeqCst));
        assert!(probe.notification_visible.load(Ordering::SeqCst));
        // Not started until the prepare completes.
        assert_eq!(probe.starts.load(Ordering::SeqCst), 0);

        session.on_ready();
        assert_eq!(session.state(), SessionState::Playing);
        assert_eq!(probe.starts.load(Ordering::SeqCst), 1);
        assert_invariants(&session);
    }

    #[test]
    fn late_ready_after_stop_is_ignored() {
        let (mut session, _probe) = harness(true);
        session.dispatch(Command::Play);
        session.dispatch(Command::Stop);
        assert_eq!(session.state(), SessionState::Idle);

        session.on_ready();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.has_source());
    }

    #[test]
    fn late_ready_after_pause_is_ignored() {
        let (mut session, probe) = harness(true);
        session.dispatch(Command::Play);
        session.dispatch(Command::Pause);
        assert_eq!(session.state(), SessionState::Paused);

        session.on_ready();
        assert_eq!(session.state(), SessionState::Paused);
        assert_eq!(probe.starts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn resume_skips_focus_and_resource_creation() {
        let (mut session, probe) = playing_session();
        session.dispatch(Command::Pause);
        session.dispatch(Command::Play);

        assert_eq!(session.state(), SessionState::Playing);
        assert_eq!(probe.focus_requests.load(Ordering::SeqCst), 1);
        assert_eq!(probe.sources_created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_then_play_creates_a_fresh_resource() {
        let (mut session, probe) = playing_session();
        session.dispatch(Command::Stop);
        session.dispatch(Command::Play);

        assert_eq!(session.state(), SessionState::Preparing);
        assert_eq!(probe.sources_created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn duck_changes_volume_but_not_state() {
        let (mut session, probe) = playing_session();
        session.on_focus_change(FocusChange::LostTransientCanDuck);

        assert_eq!(session.state(), SessionState::Playing);
        assert!(session.has_source());
        assert!(session.wake_lock_held());
        let last = *probe.volumes.lock().unwrap().last().unwrap();
        assert!(last.0 < 0.5 && last.1 < 0.5);

        session.on_focus_change(FocusChange::Gained);
        let last = *probe.volumes.lock().unwrap().last().unwrap();
        assert_eq!(last, (1.0, 1.0));
    }

    #[test]
    fn duck_is_a_noop_when_not_playing() {
        let (mut session, probe) = harness(true);
        session.on_focus_change(FocusChange::LostTransientCanDuck);
        assert_eq!(session.state(), SessionState::Idle);
        assert!(probe.volumes.lock().unwrap().is_empty());

        session.dispatch(Command::Play);
        session.on_ready();
        session.dispatch(Command::Pause);
        let volumes_before = probe.volumes.lock().unwrap().len();
        session.on_focus_change(FocusChange::LostTransientCanDuck);
        assert_eq!(session.state(), SessionState::Paused);
        assert_eq!(probe.volumes.lock().unwrap().len(), volumes_before);
    }

    #[test]
    fn transient_loss_pauses_and_gain_resumes() {
        let (mut session, probe) = playing_session();

        session.on_focus_change(FocusChange::LostTransient);
        assert_eq!(session.state(), SessionState::Paused);
        assert!(!probe.lock_held.load(Ordering::SeqCst));
        assert_invariants(&session);

        session.on_focus_change(FocusChange::Gained);
        assert_eq!(session.state(), SessionState::Playing);
        assert!(probe.lock_held.load(Ordering::SeqCst));
        assert_eq!(probe.lock_acquisitions.load(Ordering::SeqCst), 2);
        assert_invariants(&session);
    }

    #[test]
    fn permanent_loss_behaves_like_stop() {
        let (mut session, probe) = playing_session();
        session.on_focus_change(FocusChange::LostPermanently);

        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.has_source());
        assert!(!session.focus_granted());
        assert!(!probe.lock_held.load(Ordering::SeqCst));
        assert!(!probe.notification_visible.load(Ordering::SeqCst));
        // Focus was already gone; nothing to abandon.
        assert_eq!(probe.focus_abandons.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn completion_and_error_unwind_to_idle() {
        let (mut session, _probe) = playing_session();
        session.on_completion();
        assert_eq!(session.state(), SessionState::Idle);
        assert_invariants(&session);

        let (mut session, _probe) = playing_session();
        session.on_error(-1004);
        assert_eq!(session.state(), SessionState::Idle);
        assert_invariants(&session);

        // Late callbacks with no resource are dropped.
        session.on_completion();
        session.on_error(-1004);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn errors_are_reported_on_the_event_channel() {
        let (mut session, _probe) = harness(false);
        let (tx, mut rx) = mpsc::unbounded_channel();
        session.set_event_sender(tx);

        session.dispatch(Command::Play);
        match rx.try_recv() {
            Ok(SessionUpdate::Failed(message)) => {
                assert!(message.contains("focus"), "unexpected message: {message}")
            }
            other => panic!("expected a failure update, got {other:?}"),
        }
    }

    #[test]
    fn stop_abandons_focus() {
        let (mut session, probe) = playing_session();
        session.dispatch(Command::Stop);
        assert_eq!(probe.focus_abandons.load(Ordering::SeqCst), 1);
        assert!(!session.focus_granted());
    }
}
