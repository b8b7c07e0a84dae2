//! Resilient call path to the native backend.
//!
//! Every backend capability goes through [`BridgeGateway`], which retries a
//! bounded number of times and collapses every failure into one typed
//! [`GatewayError`]. Callers branch on "did I get a usable value", never on
//! why an attempt failed.

use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::GatewayConfig;
use crate::downloader::{DownloadReceipt, RawHit, SearchHit};
use crate::radio::{RadioInfo, Station};
use crate::track::{Playlist, Track};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ScanFolder,
    GetMetadata,
    SelectFolder,
    SelectFile,
    SearchSong,
    DownloadTrack,
    DefaultRadios,
    RadioMetadata,
    ShowInFolder,
}

impl Capability {
    pub fn name(&self) -> &'static str {
        use Capability::*;
        match self {
            ScanFolder => "scan_folder",
            GetMetadata => "get_metadata",
            SelectFolder => "select_folder",
            SelectFile => "select_file",
            SearchSong => "search_song",
            DownloadTrack => "download_track",
            DefaultRadios => "get_default_radios",
            RadioMetadata => "get_radio_metadata",
            ShowInFolder => "show_in_folder",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure of a single call across the bridge.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeFault {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("malformed payload: {0}")]
    Payload(String),
}

/// The backend capability surface as seen from the player.
#[async_trait]
pub trait BridgePort: Send + Sync {
    /// Whether the host has exposed the backend yet.
    fn is_ready(&self) -> bool;
    async fn call(&self, capability: Capability, args: Vec<Value>) -> Result<Value, BridgeFault>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Connection lost")]
    ConnectionLost { capability: Capability },
    /// The backend answered, and the answer reports its own failure.
    #[error("{message}")]
    Rejected {
        capability: Capability,
        message: String,
    },
}

impl GatewayError {
    pub fn capability(&self) -> Capability {
        match self {
            GatewayError::ConnectionLost { capability }
            | GatewayError::Rejected { capability, .. } => *capability,
        }
    }

    /// The `{error, status: "error"}` object handed to the view layer.
    pub fn to_sentinel(&self) -> Value {
        json!({ "error": self.to_string(), "status": "error" })
    }
}

#[derive(Debug)]
enum AttemptFailure {
    Fault(BridgeFault),
    Empty,
    Undecodable(String),
    Rejected(String),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Fault(fault) => write!(f, "{fault}"),
            AttemptFailure::Empty => f.write_str("empty response"),
            AttemptFailure::Undecodable(reason) => write!(f, "undecodable response: {reason}"),
            AttemptFailure::Rejected(message) => write!(f, "rejected: {message}"),
        }
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

/// Message of a reply in which the backend reports its own failure,
/// `{"error": ..}` or `{"status": "error", "message": ..}`.
fn reported_error(value: &Value) -> Option<String> {
    let fields = value.as_object()?;
    if let Some(error) = fields.get("error").and_then(Value::as_str) {
        return Some(error.to_owned());
    }
    if fields.get("status").and_then(Value::as_str) == Some("error") {
        let message = fields.get("message").and_then(Value::as_str);
        return Some(message.unwrap_or("request failed").to_owned());
    }
    None
}

/// Whether an empty reply is a usable answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmptyReply {
    Fails,
    Accepted,
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, AttemptFailure> {
    serde_json::from_value(value).map_err(|err| AttemptFailure::Undecodable(err.to_string()))
}

#[derive(Deserialize)]
struct DownloadReply {
    filename: String,
}

pub struct BridgeGateway<P: BridgePort> {
    port: P,
    config: GatewayConfig,
}

impl<P: BridgePort> BridgeGateway<P> {
    pub fn new(port: P, config: GatewayConfig) -> Self {
        Self { port, config }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    /// Calls `capability`, retrying faults and empty replies. A reply that
    /// reports its own failure ends the call as [`GatewayError::Rejected`].
    pub async fn invoke(&self, capability: Capability, args: Vec<Value>) -> Result<Value, GatewayError> {
        self.invoke_with(capability, args, EmptyReply::Fails, Ok).await
    }

    /// Like [`invoke`](Self::invoke); a reply that does not decode into `T`
    /// is retried like any other failed attempt.
    pub async fn invoke_as<T: DeserializeOwned>(
        &self,
        capability: Capability,
        args: Vec<Value>,
    ) -> Result<T, GatewayError> {
        self.invoke_with(capability, args, EmptyReply::Fails, decode)
            .await
    }

    async fn invoke_with<T, F>(
        &self,
        capability: Capability,
        args: Vec<Value>,
        empty: EmptyReply,
        accept: F,
    ) -> Result<T, GatewayError>
    where
        F: Fn(Value) -> Result<T, AttemptFailure>,
    {
        let max = self.config.max_attempts.max(1);
        for attempt in 1..=max {
            if !self.port.is_ready() {
                debug!(%capability, attempt, max, "bridge not ready, waiting");
                sleep(self.config.ready_delay()).await;
                continue;
            }

            let outcome = match self.port.call(capability, args.clone()).await {
                Ok(value) if empty == EmptyReply::Fails && is_empty(&value) => {
                    Err(AttemptFailure::Empty)
                }
                Ok(value) => match reported_error(&value) {
                    Some(message) => Err(AttemptFailure::Rejected(message)),
                    None => accept(value),
                },
                Err(fault) => Err(AttemptFailure::Fault(fault)),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(AttemptFailure::Rejected(message)) => {
                    debug!(%capability, %message, "backend rejected call");
                    return Err(GatewayError::Rejected {
                        capability,
                        message,
                    });
                }
                Err(failure) => {
                    warn!(%capability, attempt, max, %failure, "retry {attempt}/{max} for {capability}");
                    if attempt < max {
                        sleep(self.config.retry_backoff()).await;
                    }
                }
            }
        }

        warn!(%capability, "giving up after {max} attempts");
        Err(GatewayError::ConnectionLost { capability })
    }

    pub async fn scan_folder(&self) -> Result<Playlist, GatewayError> {
        self.invoke_as::<Vec<Track>>(Capability::ScanFolder, Vec::new())
            .await
            .map(Playlist::new)
    }

    /// Resolves full metadata for `path`. `announce` lets the backend
    /// publish it as the now-playing track.
    pub async fn get_metadata(&self, path: &str, announce: bool) -> Result<Track, GatewayError> {
        self.invoke_as(Capability::GetMetadata, vec![json!(path), json!(announce)])
            .await
    }

    pub async fn select_folder(&self) -> Result<Playlist, GatewayError> {
        self.invoke_as::<Vec<Track>>(Capability::SelectFolder, Vec::new())
            .await
            .map(Playlist::new)
    }

    pub async fn select_file(&self) -> Result<Track, GatewayError> {
        self.invoke_as(Capability::SelectFile, Vec::new()).await
    }

    pub async fn search_song(&self, query: &str) -> Result<Vec<SearchHit>, GatewayError> {
        self.invoke_with(
            Capability::SearchSong,
            vec![json!(query)],
            EmptyReply::Fails,
            |value| {
                let hits: Vec<SearchHit> = decode::<Vec<RawHit>>(value)?
                    .into_iter()
                    .filter_map(RawHit::into_hit)
                    .collect();
                if hits.is_empty() {
                    return Err(AttemptFailure::Empty);
                }
                Ok(hits)
            },
        )
        .await
    }

    pub async fn download_track(
        &self,
        url: &str,
        use_spotify: bool,
    ) -> Result<DownloadReceipt, GatewayError> {
        self.invoke_with(
            Capability::DownloadTrack,
            vec![json!(url), json!(use_spotify)],
            EmptyReply::Fails,
            |value| {
                decode::<DownloadReply>(value).map(|reply| DownloadReceipt {
                    filename: reply.filename,
                })
            },
        )
        .await
    }

    pub async fn default_radios(&self) -> Result<Vec<Station>, GatewayError> {
        self.invoke_as(Capability::DefaultRadios, Vec::new()).await
    }

    pub async fn radio_metadata(&self, url: &str) -> Result<RadioInfo, GatewayError> {
        self.invoke_as(Capability::RadioMetadata, vec![json!(url)])
            .await
    }

    /// Reveals `path` in the platform file manager. The backend answers
    /// with nothing when it is done.
    pub async fn show_in_folder(&self, path: &str) -> Result<(), GatewayError> {
        self.invoke_with(
            Capability::ShowInFolder,
            vec![json!(path)],
            EmptyReply::Accepted,
            |_| Ok(()),
        )
        .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use mockall::{mock, predicate::{always, eq}};
    use tokio::time::{Duration, Instant};

    mock! {
        pub Port {}

        #[async_trait]
        impl BridgePort for Port {
            fn is_ready(&self) -> bool;
            async fn call(&self, capability: Capability, args: Vec<Value>) -> Result<Value, BridgeFault>;
        }
    }

    pub(crate) fn ready_port() -> MockPort {
        let mut port = MockPort::new();
        port.expect_is_ready().return_const(true);
        port
    }

    fn gateway(port: MockPort) -> BridgeGateway<MockPort> {
        BridgeGateway::new(port, GatewayConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn first_non_empty_reply_is_returned() {
        let mut port = ready_port();
        port.expect_call()
            .with(eq(Capability::ScanFolder), eq(Vec::<Value>::new()))
            .times(1)
            .returning(|_, _| Ok(json!([{ "name": "Intro", "path": "/music/intro.mp3" }])));

        let started = Instant::now();
        let playlist = gateway(port).scan_folder().await.expect("scan");
        assert_eq!(playlist.len(), 1);
        assert_eq!(playlist.path_of(0), Some("/music/intro.mp3"));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_yield_connection_lost() {
        let mut port = ready_port();
        port.expect_call()
            .times(3)
            .returning(|_, _| Err(BridgeFault::Transport("pipe closed".into())));

        let started = Instant::now();
        let err = gateway(port)
            .invoke(Capability::GetMetadata, vec![json!("/a.mp3")])
            .await
            .expect_err("should fail");

        assert_eq!(
            err,
            GatewayError::ConnectionLost {
                capability: Capability::GetMetadata
            }
        );
        assert_eq!(
            err.to_sentinel(),
            json!({ "error": "Connection lost", "status": "error" })
        );
        // Backoff only separates attempts.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(500), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(750), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_for_the_bridge_consumes_attempts() {
        let mut port = MockPort::new();
        let mut checks = 0;
        port.expect_is_ready().returning(move || {
            checks += 1;
            checks > 2
        });
        port.expect_call()
            .times(1)
            .returning(|_, _| Ok(json!({ "path": "/b.mp3", "type": "audio" })));

        let started = Instant::now();
        let track = gateway(port)
            .get_metadata("/b.mp3", false)
            .await
            .expect("third attempt succeeds");
        assert_eq!(track.path, "/b.mp3");
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(250), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn bridge_that_never_appears_is_never_called() {
        let mut port = MockPort::new();
        port.expect_is_ready().times(3).return_const(false);
        port.expect_call().never();

        let err = gateway(port).scan_folder().await.unwrap_err();
        assert!(matches!(err, GatewayError::ConnectionLost { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_results_count_as_failures() {
        let mut port = ready_port();
        port.expect_call()
            .with(eq(Capability::SearchSong), eq(vec![json!("nothing matches")]))
            .times(3)
            .returning(|_, _| Ok(json!([])));

        let err = gateway(port).search_song("nothing matches").await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::ConnectionLost {
                capability: Capability::SearchSong
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_replies_are_retried() {
        let mut port = ready_port();
        let mut calls = 0;
        port.expect_call().times(3).returning(move |_, _| {
            calls += 1;
            match calls {
                1 => Ok(json!("Expecting value: line 1 column 1")),
                2 => Err(BridgeFault::Payload("JSON.parse: unexpected end".into())),
                _ => Ok(json!({ "path": "/c.mp4", "type": "video" })),
            }
        });

        let track = gateway(port).select_file().await.expect("recovers");
        assert_eq!(track.path, "/c.mp4");
    }

    #[tokio::test(start_paused = true)]
    async fn backend_reported_errors_are_not_retried() {
        let mut port = ready_port();
        port.expect_call()
            .times(1)
            .returning(|_, _| Ok(json!({ "error": "HTTP Error 429" })));

        let err = gateway(port).search_song("inferno").await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::Rejected {
                capability: Capability::SearchSong,
                message: "HTTP Error 429".into()
            }
        );
        assert_eq!(
            err.to_sentinel(),
            json!({ "error": "HTTP Error 429", "status": "error" })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn download_reply_shapes() {
        let mut port = ready_port();
        port.expect_call()
            .with(
                eq(Capability::DownloadTrack),
                eq(vec![json!("https://youtu.be/x"), json!(true)]),
            )
            .times(1)
            .returning(|_, _| Ok(json!({ "status": "success", "filename": "Fire Song" })));
        let receipt = gateway(port)
            .download_track("https://youtu.be/x", true)
            .await
            .expect("download");
        assert_eq!(receipt.filename, "Fire Song");

        let mut port = ready_port();
        port.expect_call()
            .times(1)
            .returning(|_, _| Ok(json!({ "status": "error", "message": "ffmpeg missing" })));
        let err = gateway(port)
            .download_track("https://youtu.be/x", false)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "ffmpeg missing");
        assert_eq!(err.capability(), Capability::DownloadTrack);
    }

    #[tokio::test(start_paused = true)]
    async fn raw_invoke_surfaces_backend_errors() {
        let mut port = ready_port();
        port.expect_call()
            .times(1)
            .returning(|_, _| Ok(json!({ "status": "error", "message": "disk full" })));

        let err = gateway(port)
            .invoke(Capability::DownloadTrack, vec![json!("https://youtu.be/x"), json!(false)])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::Rejected {
                capability: Capability::DownloadTrack,
                message: "disk full".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn show_in_folder_accepts_an_empty_reply() {
        let mut port = ready_port();
        port.expect_call()
            .with(eq(Capability::ShowInFolder), eq(vec![json!("/music/a.mp3")]))
            .times(1)
            .returning(|_, _| Ok(Value::Null));

        gateway(port)
            .show_in_folder("/music/a.mp3")
            .await
            .expect("revealed");
        assert_eq!(Capability::ShowInFolder.to_string(), "show_in_folder");
    }

    #[tokio::test(start_paused = true)]
    async fn show_in_folder_still_retries_faults() {
        let mut port = ready_port();
        port.expect_call()
            .with(eq(Capability::ShowInFolder), always())
            .times(3)
            .returning(|_, _| Err(BridgeFault::Transport("pipe closed".into())));

        let err = gateway(port).show_in_folder("/music/a.mp3").await.unwrap_err();
        assert!(matches!(err, GatewayError::ConnectionLost { .. }));
    }
}
