// Platform seams - everything the session drives but doesn't implement
// The audio output, focus arbitration, wake lock and notification surface all
// belong to the host; the session only talks to these traits.

pub mod desktop;

use crate::error::Result;

/// Events pushed up from a bound playback resource.
///
/// `Ready` fires once the async prepare finishes; `Completed` when the stream
/// ends on its own; `Error` on playback failure. All three may arrive late -
/// the session guards on its own state before acting on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    Ready,
    Completed,
    Error(i32),
}

/// Audio-focus interrupts delivered by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusChange {
    Gained,
    LostPermanently,
    LostTransient,
    LostTransientCanDuck,
}

/// Outcome of a focus request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusRequest {
    Granted,
    Denied,
}

/// The single playback resource. Created lazily by a [`SourceFactory`],
/// exclusively owned by the session, released by dropping it.
///
/// `bind` is asynchronous in effect: it kicks off the prepare and returns;
/// readiness arrives later as [`PlayerEvent::Ready`] on whatever channel the
/// factory wired up.
pub trait AudioSource {
    fn bind(&mut self, uri: &str) -> Result<()>;
    fn start(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn reset(&mut self);
    /// Per-channel volume, 0.0..=1.0.
    fn set_volume(&mut self, left: f32, right: f32);
    fn is_playing(&self) -> bool;
}

/// Creates playback resources on demand. The session never holds more than
/// one live source at a time.
pub trait SourceFactory {
    fn create(&mut self) -> Result<Box<dyn AudioSource>>;
}

/// Host-arbitrated permission to produce audible output. Revocations arrive
/// out-of-band as [`FocusChange`] events.
pub trait FocusArbiter {
    fn request(&mut self) -> FocusRequest;
    fn abandon(&mut self);
}

/// Keeps essential subsystems awake while audio is or may soon be playing.
/// Acquire is idempotent; release when not held is a no-op.
pub trait WakeLock {
    fn acquire(&mut self);
    fn release(&mut self);
}

/// Persistent user-visible indicator for the active session. Fire-and-forget:
/// the session never reads anything back.
pub trait Notifier {
    fn show(&mut self, summary: &str, body: &str);
    fn cancel(&mut self);
}

/// The bundle of host services a session is constructed with.
pub struct Platform {
    pub sources: Box<dyn SourceFactory>,
    pub focus: Box<dyn FocusArbiter>,
    pub wake_lock: Box<dyn WakeLock>,
    pub notifier: Box<dyn Notifier>,
}
