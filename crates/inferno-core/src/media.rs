use thiserror::Error;

use crate::track::MediaKind;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("media failed to start: {0}")]
pub struct MediaFault(pub String);

/// One of the two host media surfaces (the audio element or the video
/// element).
pub trait MediaElement: Send {
    fn load(&mut self, source: &str);
    fn play(&mut self) -> Result<(), MediaFault>;
    fn pause(&mut self);
    fn is_paused(&self) -> bool;
    fn set_visible(&mut self, visible: bool);
    /// Current playback position in seconds.
    fn position(&self) -> f64;
    fn set_position(&mut self, secs: f64);
    /// `None` until the element has loaded metadata.
    fn duration(&self) -> Option<f64>;
    fn set_volume(&mut self, volume: f32);
}

/// Owns both media elements and tracks which one is current.
pub struct MediaDeck<M: MediaElement> {
    audio: M,
    video: M,
    active: MediaKind,
}

impl<M: MediaElement> MediaDeck<M> {
    pub fn new(audio: M, video: M) -> Self {
        Self {
            audio,
            video,
            active: MediaKind::Audio,
        }
    }

    pub fn active_kind(&self) -> MediaKind {
        self.active
    }

    pub fn element(&self, kind: MediaKind) -> &M {
        match kind {
            MediaKind::Audio => &self.audio,
            MediaKind::Video => &self.video,
        }
    }

    pub fn element_mut(&mut self, kind: MediaKind) -> &mut M {
        match kind {
            MediaKind::Audio => &mut self.audio,
            MediaKind::Video => &mut self.video,
        }
    }

    pub fn active(&self) -> &M {
        self.element(self.active)
    }

    pub fn active_mut(&mut self) -> &mut M {
        self.element_mut(self.active)
    }

    pub fn pause_all(&mut self) {
        self.audio.pause();
        self.video.pause();
    }

    /// Pauses and hides both elements, then loads `source` into the element
    /// for `kind` and makes it current. Only video is ever shown; audio
    /// leaves the surface to the artwork.
    pub fn activate(&mut self, kind: MediaKind, source: &str) -> &mut M {
        self.pause_all();
        self.audio.set_visible(false);
        self.video.set_visible(false);

        self.active = kind;
        let element = self.element_mut(kind);
        element.load(source);
        element.set_visible(kind == MediaKind::Video);
        element
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.audio.set_volume(volume);
        self.video.set_volume(volume);
    }
}
