// Station metadata fetch - fire-and-forget, poll for the outcome
// One fetch per instance; whoever holds the handle checks back later. No
// retry and no timeout of our own, the HTTP client's timeout is the limit.

use std::sync::{Arc, Mutex};

use reqwest::Client;
use tracing::{debug, warn};

/// What a completed fetch produced: the payload, or the transport's error
/// message. Exactly one of these is stored, exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Data(String),
    Error(String),
}

/// A single in-flight (or finished) fetch of the station info text.
///
/// The request is issued at construction; `data()`/`error()` return `None`
/// until it completes. Single-use: fetch again by making a new one.
pub struct StreamInfo {
    outcome: Arc<Mutex<Option<FetchOutcome>>>,
}

impl StreamInfo {
    pub fn fetch(client: &Client, url: &str) -> Self {
        let outcome = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&outcome);
        let client = client.clone();
        let url = url.to_string();

        tokio::spawn(async move {
            let result: Result<String, reqwest::Error> = async {
                client.get(&url).send().await?.error_for_status()?.text().await
            }
            .await;

            let finished = match result {
                Ok(body) => {
                    debug!(bytes = body.len(), "station info fetched");
                    FetchOutcome::Data(body)
                }
                Err(err) => {
                    warn!(%err, "station info fetch failed");
                    FetchOutcome::Error(err.to_string())
                }
            };
            *slot.lock().unwrap() = Some(finished);
        });

        Self { outcome }
    }

    pub fn is_complete(&self) -> bool {
        self.outcome.lock().unwrap().is_some()
    }

    /// The fetched payload, if the fetch succeeded. `None` while in flight
    /// or after a failure.
    pub fn data(&self) -> Option<String> {
        match &*self.outcome.lock().unwrap() {
            Some(FetchOutcome::Data(body)) => Some(body.clone()),
            _ => None,
        }
    }

    /// The transport's error message, if the fetch failed.
    pub fn error(&self) -> Option<String> {
        match &*self.outcome.lock().unwrap() {
            Some(FetchOutcome::Error(message)) => Some(message.clone()),
            _ => None,
        }
    }
}
