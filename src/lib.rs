// skywave library - one internet radio station, played properly
// The session state machine is the heart; everything platform-shaped sits
// behind the traits in `platform`

pub mod config; // settings: station url, duck volume
pub mod error; // session/fetch error taxonomy
pub mod platform; // host seams: audio source, focus, wake lock, notification
pub mod service; // stdin-driven hosting loop
pub mod session; // the playback state machine
pub mod station; // fire-and-forget station info fetch

// Export the stuff other modules actually use
pub use config::Config;
pub use error::SessionError;
pub use platform::{FocusChange, Platform, PlayerEvent};
pub use session::{Command, SessionState, SessionUpdate, StreamSession};
pub use station::StreamInfo;
