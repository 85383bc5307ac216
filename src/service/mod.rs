// The hosting loop around the session
// Single owner of all mutable state: stdin commands, player callbacks and
// session updates are all funneled through one select loop, so the session
// never sees two mutations at once.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;

use crate::config::Config;
use crate::platform::desktop::desktop_platform;
use crate::platform::PlayerEvent;
use crate::session::{Command, SessionState, SessionUpdate, StreamSession};
use crate::station::StreamInfo;

const POLL_INTERVAL_MS: u64 = 200;

pub struct RadioService {
    config: Config,
    session: StreamSession,
    player_rx: mpsc::UnboundedReceiver<PlayerEvent>,
    update_rx: mpsc::UnboundedReceiver<SessionUpdate>,
    http: reqwest::Client,
    /// In-flight `info` fetch, polled until it completes.
    pending_info: Option<StreamInfo>,
}

impl RadioService {
    pub fn new(config: Config) -> Self {
        let (player_tx, player_rx) = mpsc::unbounded_channel();
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        let mut session = StreamSession::new(
            desktop_platform(player_tx),
            config.station.stream_url.clone(),
            config.station.name.clone(),
        )
        .with_duck_volume(config.audio.duck_volume);
        session.set_event_sender(update_tx);

        Self {
            config,
            session,
            player_rx,
            update_rx,
            http: reqwest::Client::new(),
            pending_info: None,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        println!("skywave - {}", self.config.station.name);
        println!("commands: play, pause, stop, info, status, quit");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut poll = tokio::time::interval(std::time::Duration::from_millis(POLL_INTERVAL_MS));

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = match line? {
                        Some(line) => line,
                        None => break, // stdin closed
                    };
                    if !self.handle_line(line.trim()) {
                        break;
                    }
                }
                Some(event) = self.player_rx.recv() => {
                    self.session.on_player_event(event);
                }
                Some(update) = self.update_rx.recv() => {
                    self.print_update(update);
                }
                _ = poll.tick() => {
                    self.poll_pending_info();
                }
            }
        }

        info!("service loop finished, tearing down session");
        self.session.shutdown();
        Ok(())
    }

    /// Returns false when the loop should exit. Commands themselves never
    /// stop the service, whatever their outcome.
    fn handle_line(&mut self, line: &str) -> bool {
        match line {
            "" => {}
            "play" => self.session.dispatch(Command::Play),
            "pause" => self.session.dispatch(Command::Pause),
            "stop" => self.session.dispatch(Command::Stop),
            "status" => println!("state: {:?}", self.session.state()),
            "info" => self.start_info_fetch(),
            "quit" | "exit" => return false,
            other => println!("unknown command: {other}"),
        }
        true
    }

    fn start_info_fetch(&mut self) {
        if self.pending_info.is_some() {
            println!("info fetch already running");
            return;
        }
        match &self.config.station.info_url {
            Some(url) => {
                println!("fetching station info...");
                self.pending_info = Some(StreamInfo::fetch(&self.http, url));
            }
            None => println!("no info_url configured for this station"),
        }
    }

    fn poll_pending_info(&mut self) {
        let done = match &self.pending_info {
            Some(info) => info.is_complete(),
            None => false,
        };
        if !done {
            return;
        }
        if let Some(info) = self.pending_info.take() {
            if let Some(data) = info.data() {
                println!("{}", data.trim_end());
            } else if let Some(error) = info.error() {
                println!("station info unavailable: {error}");
            }
        }
    }

    fn print_update(&self, update: SessionUpdate) {
        match update {
            SessionUpdate::StateChanged(SessionState::Preparing) => {
                println!("connecting to {}...", self.config.station.stream_url)
            }
            SessionUpdate::StateChanged(state) => println!("state: {state:?}"),
            SessionUpdate::Ducked => println!("volume ducked"),
            SessionUpdate::Failed(message) => println!("error: {message}"),
        }
    }
}
