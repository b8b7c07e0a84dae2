//! Playback controller: track transitions, media kind switching, the
//! seek control and live radio.
//!
//! All mutable state sits behind one mutex that is never held across an
//! await, so the "at most one element playing" rule holds even when
//! operations race. Selections carry a token; metadata that arrives for a
//! superseded selection is dropped.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::bridge::{BridgeGateway, BridgePort, GatewayError};
use crate::config::PlayerConfig;
use crate::error::Result;
use crate::media::{MediaDeck, MediaElement, MediaFault};
use crate::radio::Station;
use crate::seek::{ProgressView, SeekTarget, compute_seek};
use crate::session::{IndexPicker, PlaybackSession, PlaybackState, RandomPicker};
use crate::track::{Artwork, MediaKind, Playlist, Track};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlayerError {
    #[error("track {index} is outside the playlist ({len} tracks)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error(transparent)]
    Playback(#[from] MediaFault),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    TrackStarted {
        index: Option<usize>,
        title: String,
        details: String,
        artwork: Artwork,
        total: String,
    },
    StateChanged(PlaybackState),
    Progress(ProgressView),
    /// Short inline message for the user.
    Status(String),
    RadioInfo {
        title: String,
        station: String,
    },
    PlaylistReplaced(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Started { index: Option<usize>, track: Track },
    /// Loop mode replayed the current media from the start.
    Restarted,
    /// A newer selection won while this one was resolving.
    Superseded,
}

/// The live station refresh task. Dropping it stops the task.
struct RadioPoll {
    station: Station,
    handle: JoinHandle<()>,
}

impl Drop for RadioPoll {
    fn drop(&mut self) {
        debug!(station = %self.station.name, "stopping radio metadata poll");
        self.handle.abort();
    }
}

struct PlayerInner<M: MediaElement> {
    session: PlaybackSession,
    deck: MediaDeck<M>,
    playlist: Playlist,
    picker: Box<dyn IndexPicker>,
}

pub struct PlaybackController<P: BridgePort + 'static, M: MediaElement> {
    gateway: Arc<BridgeGateway<P>>,
    config: PlayerConfig,
    inner: Mutex<PlayerInner<M>>,
    radio: Mutex<Option<RadioPoll>>,
    signal: broadcast::Sender<PlayerEvent>,
}

impl<P: BridgePort + 'static, M: MediaElement> PlaybackController<P, M> {
    pub fn new(gateway: Arc<BridgeGateway<P>>, audio: M, video: M, config: PlayerConfig) -> Self {
        let (signal, _) = broadcast::channel(64);
        let mut deck = MediaDeck::new(audio, video);
        deck.set_volume(config.volume);
        Self {
            gateway,
            config,
            inner: Mutex::new(PlayerInner {
                session: PlaybackSession::new(),
                deck,
                playlist: Playlist::default(),
                picker: Box::new(RandomPicker::new()),
            }),
            radio: Mutex::new(None),
            signal,
        }
    }

    pub fn with_picker(self, picker: Box<dyn IndexPicker>) -> Self {
        self.inner.lock().picker = picker;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.signal.subscribe()
    }

    pub fn session(&self) -> PlaybackSession {
        self.inner.lock().session.clone()
    }

    pub fn playlist(&self) -> Playlist {
        self.inner.lock().playlist.clone()
    }

    pub fn with_media<R>(&self, f: impl FnOnce(&MediaDeck<M>) -> R) -> R {
        f(&self.inner.lock().deck)
    }

    pub fn with_media_mut<R>(&self, f: impl FnOnce(&mut MediaDeck<M>) -> R) -> R {
        f(&mut self.inner.lock().deck)
    }

    fn emit(&self, event: PlayerEvent) {
        let _ = self.signal.send(event);
    }

    fn set_state(&self, session: &mut PlaybackSession, state: PlaybackState) {
        if session.state != state {
            session.state = state;
            self.emit(PlayerEvent::StateChanged(state));
        }
    }

    pub fn replace_playlist(&self, playlist: Playlist) {
        let len = playlist.len();
        self.inner.lock().playlist.replace(playlist);
        info!(tracks = len, "playlist replaced");
        self.emit(PlayerEvent::PlaylistReplaced(len));
    }

    /// Resolves `playlist[index]` through the backend and plays it.
    pub async fn select_track(&self, index: usize) -> Result<Selection> {
        let (token, path) = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let len = inner.playlist.len();
            let path = inner
                .playlist
                .path_of(index)
                .map(str::to_owned)
                .ok_or(PlayerError::IndexOutOfRange { index, len })?;
            inner.session.current_index = Some(index);
            let token = inner.session.issue_token();
            self.set_state(&mut inner.session, PlaybackState::Loading);
            (token, path)
        };

        debug!(index, %path, token, "resolving track metadata");
        let resolved = self.gateway.get_metadata(&path, true).await;
        self.complete_selection(token, Some(index), resolved)
    }

    fn complete_selection(
        &self,
        token: u64,
        index: Option<usize>,
        resolved: Result<Track, GatewayError>,
    ) -> Result<Selection> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if !inner.session.is_current(token) {
            debug!(?index, token, "discarding metadata for superseded selection");
            return Ok(Selection::Superseded);
        }

        match resolved {
            Ok(track) => self.start(inner, index, track),
            Err(err) => {
                warn!(%err, ?index, "could not resolve track");
                // Whatever was playing before keeps playing.
                let state = if inner.deck.active().is_paused() {
                    PlaybackState::Paused
                } else {
                    PlaybackState::Playing
                };
                self.set_state(&mut inner.session, state);
                self.emit(PlayerEvent::Status(format!("Error: {err}")));
                Err(err.into())
            }
        }
    }

    fn start(&self, inner: &mut PlayerInner<M>, index: Option<usize>, track: Track) -> Result<Selection> {
        // A live stream keeps polling until something else actually starts.
        self.stop_radio();
        let PlayerInner { session, deck, .. } = inner;
        session.radio = false;
        session.active_kind = track.kind;
        session.progress = ProgressView::for_duration(track.known_duration());

        self.emit(PlayerEvent::TrackStarted {
            index,
            title: track.display_title().to_owned(),
            details: track.details(),
            artwork: track.artwork(&self.config.placeholder_cover),
            total: session.progress.total.clone(),
        });

        let element = deck.activate(track.kind, &track.path);
        match element.play() {
            Ok(()) => {
                info!(?index, title = track.display_title(), kind = ?track.kind, "playback started");
                self.set_state(session, PlaybackState::Playing);
                Ok(Selection::Started { index, track })
            }
            Err(fault) => {
                warn!(%fault, path = %track.path, "playback failed");
                self.set_state(session, PlaybackState::Paused);
                Err(PlayerError::Playback(fault).into())
            }
        }
    }

    /// Plays already resolved metadata, leaving the playlist position alone.
    pub fn play_track(&self, track: Track) -> Result<Selection> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.session.issue_token();
        self.start(inner, None, track)
    }

    /// Lets the user pick a single file and plays it.
    pub async fn open_file(&self) -> Result<Selection> {
        let track = self.gateway.select_file().await?;
        self.play_track(track)
    }

    pub fn toggle_play(&self) -> Result<PlaybackState> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        match inner.session.state {
            PlaybackState::Playing => {
                inner.deck.active_mut().pause();
                self.set_state(&mut inner.session, PlaybackState::Paused);
            }
            PlaybackState::Paused => {
                inner.deck.active_mut().play().map_err(PlayerError::from)?;
                self.set_state(&mut inner.session, PlaybackState::Playing);
            }
            PlaybackState::Idle | PlaybackState::Loading => {}
        }
        Ok(inner.session.state)
    }

    pub async fn play_next(&self) -> Result<Option<Selection>> {
        let next = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let len = inner.playlist.len();
            inner.session.next_index(len, inner.picker.as_mut())
        };
        self.select_optional(next).await
    }

    pub async fn play_prev(&self) -> Result<Option<Selection>> {
        let prev = {
            let inner = self.inner.lock();
            inner.session.prev_index(inner.playlist.len())
        };
        self.select_optional(prev).await
    }

    /// Jumps to a random track other than the current one.
    pub async fn random_song(&self) -> Result<Option<Selection>> {
        let pick = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let len = inner.playlist.len();
            inner.session.random_index(len, inner.picker.as_mut())
        };
        if pick.is_none() {
            debug!("playlist is empty, nothing to pick");
        }
        self.select_optional(pick).await
    }

    async fn select_optional(&self, index: Option<usize>) -> Result<Option<Selection>> {
        match index {
            Some(index) => self.select_track(index).await.map(Some),
            None => Ok(None),
        }
    }

    pub fn toggle_shuffle(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.session.shuffle = !inner.session.shuffle;
        inner.session.shuffle
    }

    pub fn toggle_loop(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.session.looping = !inner.session.looping;
        inner.session.looping
    }

    /// Natural end of `kind`'s media.
    pub async fn handle_ended(&self, kind: MediaKind) -> Result<Option<Selection>> {
        {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            if kind != inner.deck.active_kind() || inner.session.radio {
                return Ok(None);
            }
            if inner.session.looping {
                let element = inner.deck.active_mut();
                element.set_position(0.0);
                element.play().map_err(PlayerError::from)?;
                return Ok(Some(Selection::Restarted));
            }
        }
        self.play_next().await
    }

    /// Pointer down on the seek control.
    pub fn begin_scrub(&self, offset: f64, width: f64) -> Option<SeekTarget> {
        let mut guard = self.inner.lock();
        guard.session.scrubbing = true;
        self.seek(&mut guard, offset, width)
    }

    /// Pointer moved anywhere in the window.
    pub fn scrub_to(&self, offset: f64, width: f64) -> Option<SeekTarget> {
        let mut guard = self.inner.lock();
        if !guard.session.scrubbing {
            return None;
        }
        self.seek(&mut guard, offset, width)
    }

    /// Pointer released anywhere in the window.
    pub fn end_scrub(&self) {
        self.inner.lock().session.scrubbing = false;
    }

    fn seek(&self, inner: &mut PlayerInner<M>, offset: f64, width: f64) -> Option<SeekTarget> {
        if inner.session.radio {
            return None;
        }
        let Some(target) = compute_seek(offset, width, inner.deck.active().duration()) else {
            debug!(offset, width, "seek ignored, media has no usable duration yet");
            return None;
        };

        inner.deck.active_mut().set_position(target.seconds);
        inner.session.progress.apply_seek(target);
        self.emit(PlayerEvent::Progress(inner.session.progress.clone()));
        Some(target)
    }

    /// Periodic position update from `kind`'s element. Ignored while the
    /// user drags the seek control.
    pub fn handle_time_update(&self, kind: MediaKind) -> Option<ProgressView> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.session.scrubbing || inner.session.radio || kind != inner.deck.active_kind() {
            return None;
        }

        let element = inner.deck.active();
        inner
            .session
            .progress
            .apply_tick(element.position(), element.duration());
        let view = inner.session.progress.clone();
        self.emit(PlayerEvent::Progress(view.clone()));
        Some(view)
    }

    pub fn set_volume(&self, volume: f32) {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        self.inner.lock().deck.set_volume(volume);
    }

    /// Tunes into a live stream and keeps its now-playing info fresh.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn play_radio(&self, station: Station) -> Result<()> {
        self.stop_radio();
        {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            inner.session.issue_token();
            inner.session.radio = true;
            inner.session.active_kind = MediaKind::Audio;
            inner.session.progress = ProgressView::live();

            self.emit(PlayerEvent::TrackStarted {
                index: None,
                title: "Connecting...".into(),
                details: station.name.clone(),
                artwork: Artwork::Placeholder(self.config.placeholder_cover.clone()),
                total: inner.session.progress.total.clone(),
            });

            let element = inner.deck.activate(MediaKind::Audio, &station.url);
            if let Err(fault) = element.play() {
                warn!(%fault, station = %station.name, "stream offline");
                self.set_state(&mut inner.session, PlaybackState::Paused);
                self.emit(PlayerEvent::Status("Stream Offline".into()));
                return Err(PlayerError::Playback(fault).into());
            }
            self.set_state(&mut inner.session, PlaybackState::Playing);
        }

        info!(station = %station.name, "radio tuned");
        let handle = tokio::spawn(poll_radio(
            self.gateway.clone(),
            self.signal.clone(),
            station.clone(),
            self.config.radio.poll_interval(),
        ));
        *self.radio.lock() = Some(RadioPoll { station, handle });
        Ok(())
    }

    pub fn stop_radio(&self) {
        self.radio.lock().take();
    }

    pub fn is_radio_polling(&self) -> bool {
        self.radio.lock().is_some()
    }
}

async fn poll_radio<P: BridgePort + 'static>(
    gateway: Arc<BridgeGateway<P>>,
    signal: broadcast::Sender<PlayerEvent>,
    station: Station,
    period: std::time::Duration,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match gateway.radio_metadata(&station.url).await {
            Ok(info) => {
                let _ = signal.send(PlayerEvent::RadioInfo {
                    title: info.song().to_owned(),
                    station: info.station_or(&station.name).to_owned(),
                });
            }
            Err(err) => warn!(%err, station = %station.name, "radio metadata refresh failed"),
        }
    }
}
