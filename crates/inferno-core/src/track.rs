use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Audio,
    Video,
}

/// What the artwork slot shows for the track that is playing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artwork {
    Cover(String),
    Placeholder(String),
    /// The video surface replaces the artwork.
    Video,
}

/// One playable item as reported by the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Track {
    pub path: String,
    #[serde(default, alias = "name")]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: MediaKind,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.trim().is_empty())
}

impl Track {
    pub fn new(path: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            path: path.into(),
            kind,
            ..Self::default()
        }
    }

    pub fn display_title(&self) -> &str {
        non_empty(&self.title)
            .or_else(|| non_empty(&self.filename))
            .unwrap_or("Unknown Title")
    }

    pub fn display_artist(&self) -> &str {
        non_empty(&self.artist).unwrap_or("Unknown Artist")
    }

    pub fn display_album(&self) -> &str {
        non_empty(&self.album).unwrap_or("No Album")
    }

    pub fn details(&self) -> String {
        format!("{} | {}", self.display_artist(), self.display_album())
    }

    pub fn cover(&self) -> Option<&str> {
        non_empty(&self.cover)
    }

    pub fn artwork(&self, placeholder: &str) -> Artwork {
        match (self.kind, self.cover()) {
            (MediaKind::Video, _) => Artwork::Video,
            (MediaKind::Audio, Some(cover)) => Artwork::Cover(cover.to_owned()),
            (MediaKind::Audio, None) => Artwork::Placeholder(placeholder.to_owned()),
        }
    }

    /// Duration in seconds, only when it is a usable positive number.
    pub fn known_duration(&self) -> Option<f64> {
        self.duration.filter(|secs| secs.is_finite() && *secs > 0.0)
    }
}

/// Ordered tracks of the current folder scan, search result or favourite.
///
/// A playlist is only ever swapped out as a whole.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Playlist {
    tracks: Vec<Track>,
}

impl Playlist {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }

    pub fn replace(&mut self, next: Playlist) {
        *self = next;
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn path_of(&self, index: usize) -> Option<&str> {
        self.get(index).map(|track| track.path.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    /// Indices whose title or artist contains `query`, ignoring case.
    pub fn filter(&self, query: &str) -> Vec<usize> {
        let needle = query.trim().to_lowercase();
        self.tracks
            .iter()
            .enumerate()
            .filter(|(_, track)| {
                needle.is_empty()
                    || track.display_title().to_lowercase().contains(&needle)
                    || track.display_artist().to_lowercase().contains(&needle)
            })
            .map(|(index, _)| index)
            .collect()
    }
}

impl From<Vec<Track>> for Playlist {
    fn from(tracks: Vec<Track>) -> Self {
        Self::new(tracks)
    }
}
