use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bridge::{BridgeGateway, BridgePort};
use crate::timefmt::format_time;
use crate::track::Playlist;

/// One online search result offered for download.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    #[serde(default)]
    pub title: Option<String>,
    pub url: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

impl SearchHit {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Unknown Title")
    }

    pub fn duration_label(&self) -> String {
        format_time(self.duration.unwrap_or(0.0))
    }
}

/// A search result as the backend sends it. The page url may be missing.
#[derive(Debug, Deserialize)]
pub(crate) struct RawHit {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

impl RawHit {
    /// `None` for hits that cannot be downloaded.
    pub(crate) fn into_hit(self) -> Option<SearchHit> {
        let url = self.url.filter(|url| !url.trim().is_empty())?;
        Some(SearchHit {
            title: self.title,
            url,
            thumbnail: self.thumbnail,
            duration: self.duration,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadReceipt {
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadStatus {
    Ready,
    Searching,
    SearchFailed,
    SelectVersion,
    Downloading,
    /// Percentage reported by the backend, within `0..=100`.
    Progress(f32),
    Finished(String),
    DownloadFailed,
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadStatus::Ready => Ok(()),
            DownloadStatus::Searching => f.write_str("Searching..."),
            DownloadStatus::SearchFailed => {
                f.write_str("Error: Search failed after multiple attempts.")
            }
            DownloadStatus::SelectVersion => f.write_str("Select a version:"),
            DownloadStatus::Downloading => {
                f.write_str("Downloading and converting... please wait")
            }
            DownloadStatus::Progress(percent) => write!(f, "Downloading... {percent:.0}%"),
            DownloadStatus::Finished(filename) => write!(f, "Download finished: {filename}"),
            DownloadStatus::DownloadFailed => {
                f.write_str("Error: The process failed. Please try a different song.")
            }
        }
    }
}

/// Handle the host feeds backend progress through while a download runs.
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    status: Arc<Mutex<DownloadStatus>>,
}

impl DownloadProgress {
    /// Records a progress percentage. Ignored unless a download is running.
    pub fn report(&self, percent: f32) {
        let percent = if percent.is_nan() { 0.0 } else { percent.clamp(0.0, 100.0) };
        let mut status = self.status.lock();
        match *status {
            DownloadStatus::Downloading | DownloadStatus::Progress(_) => {
                *status = DownloadStatus::Progress(percent);
            }
            ref other => debug!(?other, percent, "progress outside a download ignored"),
        }
    }
}

/// Search, pick a version, download, then rescan the library folder.
pub struct Downloader<P: BridgePort> {
    gateway: Arc<BridgeGateway<P>>,
    results: Vec<SearchHit>,
    selected: Option<SearchHit>,
    status: Arc<Mutex<DownloadStatus>>,
}

impl<P: BridgePort> Downloader<P> {
    pub fn new(gateway: Arc<BridgeGateway<P>>) -> Self {
        Self {
            gateway,
            results: Vec::new(),
            selected: None,
            status: Arc::new(Mutex::new(DownloadStatus::Ready)),
        }
    }

    pub fn status(&self) -> DownloadStatus {
        self.status.lock().clone()
    }

    fn set_status(&self, status: DownloadStatus) {
        *self.status.lock() = status;
    }

    pub fn progress(&self) -> DownloadProgress {
        DownloadProgress {
            status: self.status.clone(),
        }
    }

    pub fn results(&self) -> &[SearchHit] {
        &self.results
    }

    pub fn selected(&self) -> Option<&SearchHit> {
        self.selected.as_ref()
    }

    pub async fn search(&mut self, query: &str) -> &[SearchHit] {
        let query = query.trim();
        if query.is_empty() {
            return &self.results;
        }

        self.set_status(DownloadStatus::Searching);
        self.results.clear();
        self.selected = None;

        match self.gateway.search_song(query).await {
            Ok(hits) => {
                self.results = hits;
                self.set_status(DownloadStatus::SelectVersion);
            }
            Err(err) => {
                warn!(%err, query, "search failed");
                self.set_status(DownloadStatus::SearchFailed);
            }
        }
        &self.results
    }

    pub fn select(&mut self, hit: SearchHit) {
        self.selected = Some(hit);
    }

    /// Downloads the selected hit. On success the folder is rescanned and
    /// the fresh playlist returned; `None` means there is nothing new to
    /// show, and the status says why.
    pub async fn download(&mut self, use_spotify: bool) -> Option<Playlist> {
        let hit = self.selected.take()?;
        self.set_status(DownloadStatus::Downloading);

        let receipt = match self.gateway.download_track(&hit.url, use_spotify).await {
            Ok(receipt) => receipt,
            Err(err) => {
                warn!(%err, url = %hit.url, "download failed");
                self.set_status(DownloadStatus::DownloadFailed);
                return None;
            }
        };

        info!(filename = %receipt.filename, "download finished");
        self.set_status(DownloadStatus::Finished(receipt.filename));
        match self.gateway.scan_folder().await {
            Ok(playlist) => Some(playlist),
            Err(err) => {
                warn!(%err, "rescan after download failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::tests::{MockPort, ready_port};
    use crate::bridge::{BridgeFault, Capability};
    use crate::config::GatewayConfig;
    use mockall::predicate::{always, eq};
    use serde_json::json;
    use tokio::time::{Duration, sleep};

    fn downloader(port: MockPort) -> Downloader<MockPort> {
        Downloader::new(Arc::new(BridgeGateway::new(port, GatewayConfig::default())))
    }

    fn hit() -> SearchHit {
        SearchHit {
            title: Some("Fire Song".into()),
            url: "https://youtu.be/fire".into(),
            thumbnail: None,
            duration: Some(185.0),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn search_lists_versions() {
        let mut port = ready_port();
        port.expect_call()
            .with(eq(Capability::SearchSong), eq(vec![json!("fire song")]))
            .times(1)
            .returning(|_, _| {
                Ok(json!([
                    { "title": "Fire Song", "url": "https://youtu.be/fire", "duration": 185, "thumbnail": "t.jpg" }
                ]))
            });

        let mut downloader = downloader(port);
        let results = downloader.search("  fire song ").await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].duration_label(), "3:05");
        assert_eq!(downloader.status().to_string(), "Select a version:");
    }

    #[tokio::test(start_paused = true)]
    async fn blank_query_is_ignored() {
        let mut port = ready_port();
        port.expect_call().never();
        let mut downloader = downloader(port);
        assert!(downloader.search("   ").await.is_empty());
        assert_eq!(downloader.status(), DownloadStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_search_reports_status() {
        let mut port = ready_port();
        port.expect_call()
            .times(3)
            .returning(|_, _| Err(BridgeFault::Transport("timeout".into())));

        let mut downloader = downloader(port);
        assert!(downloader.search("fire").await.is_empty());
        assert_eq!(
            downloader.status().to_string(),
            "Error: Search failed after multiple attempts."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn download_then_rescan() {
        let mut port = ready_port();
        port.expect_call()
            .with(eq(Capability::DownloadTrack), always())
            .times(1)
            .returning(|_, _| Ok(json!({ "status": "success", "filename": "Fire Song" })));
        port.expect_call()
            .with(eq(Capability::ScanFolder), always())
            .times(1)
            .returning(|_, _| Ok(json!([{ "name": "Fire Song", "path": "/music/Fire Song.mp3" }])));

        let mut downloader = downloader(port);
        downloader.select(hit());
        let playlist = downloader.download(false).await.expect("rescanned playlist");
        assert_eq!(playlist.len(), 1);
        assert_eq!(downloader.status().to_string(), "Download finished: Fire Song");
        assert!(downloader.selected().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_download_is_a_status_not_a_crash() {
        let mut port = ready_port();
        port.expect_call()
            .with(eq(Capability::DownloadTrack), always())
            .times(1)
            .returning(|_, _| Ok(json!({ "status": "error", "message": "private video" })));

        let mut downloader = downloader(port);
        downloader.select(hit());
        assert_eq!(downloader.download(true).await, None);
        assert_eq!(downloader.status(), DownloadStatus::DownloadFailed);
    }

    #[tokio::test]
    async fn download_without_selection_does_nothing() {
        let mut port = ready_port();
        port.expect_call().never();
        let mut downloader = downloader(port);
        assert_eq!(downloader.download(false).await, None);
        assert_eq!(downloader.status(), DownloadStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn hits_without_a_url_are_dropped() {
        let mut port = ready_port();
        port.expect_call()
            .with(eq(Capability::SearchSong), eq(vec![json!("fire")]))
            .times(1)
            .returning(|_, _| {
                Ok(json!([
                    { "title": "Live at nowhere", "url": null, "duration": 60 },
                    { "title": "Fire Song", "url": "https://youtu.be/fire" }
                ]))
            });

        let mut downloader = downloader(port);
        let results = downloader.search("fire").await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://youtu.be/fire");
        assert_eq!(downloader.status(), DownloadStatus::SelectVersion);
    }

    #[test]
    fn progress_is_clamped_and_only_counts_while_downloading() {
        let downloader = downloader(ready_port());
        let progress = downloader.progress();

        progress.report(40.0);
        assert_eq!(downloader.status(), DownloadStatus::Ready);

        downloader.set_status(DownloadStatus::Downloading);
        progress.report(42.4);
        assert_eq!(downloader.status(), DownloadStatus::Progress(42.4));
        assert_eq!(downloader.status().to_string(), "Downloading... 42%");

        progress.report(180.0);
        assert_eq!(downloader.status(), DownloadStatus::Progress(100.0));
        progress.report(-5.0);
        assert_eq!(downloader.status(), DownloadStatus::Progress(0.0));
        progress.report(f32::NAN);
        assert_eq!(downloader.status(), DownloadStatus::Progress(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn progress_arrives_while_download_runs() {
        let mut port = ready_port();
        let mut attempts = 0;
        port.expect_call()
            .with(eq(Capability::DownloadTrack), always())
            .times(2)
            .returning(move |_, _| {
                attempts += 1;
                if attempts == 1 {
                    Err(BridgeFault::Transport("busy".into()))
                } else {
                    Ok(json!({ "status": "success", "filename": "Fire Song" }))
                }
            });
        port.expect_call()
            .with(eq(Capability::ScanFolder), always())
            .times(1)
            .returning(|_, _| Ok(json!([{ "name": "Fire Song", "path": "/music/Fire Song.mp3" }])));

        let mut downloader = downloader(port);
        downloader.select(hit());
        let progress = downloader.progress();
        let watcher = progress.clone();

        let (playlist, seen) = tokio::join!(downloader.download(false), async move {
            sleep(Duration::from_millis(50)).await;
            progress.report(63.0);
            watcher.status.lock().clone()
        });

        assert_eq!(seen, DownloadStatus::Progress(63.0));
        assert!(playlist.is_some());
        assert_eq!(downloader.status().to_string(), "Download finished: Fire Song");
    }
}
