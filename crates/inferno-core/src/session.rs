use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::seek::ProgressView;
use crate::track::MediaKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Nothing has been selected since startup.
    Idle,
    Loading,
    Playing,
    Paused,
}

#[cfg_attr(test, mockall::automock)]
pub trait IndexPicker: Send {
    /// Uniform index in `0..len`; `len` is never zero.
    fn pick(&mut self, len: usize) -> usize;
}

pub struct RandomPicker {
    rng: StdRng,
}

impl RandomPicker {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomPicker {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexPicker for RandomPicker {
    fn pick(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }
}

/// Live state of what is playing. Created once and mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSession {
    pub current_index: Option<usize>,
    pub active_kind: MediaKind,
    pub shuffle: bool,
    pub looping: bool,
    pub scrubbing: bool,
    pub state: PlaybackState,
    pub progress: ProgressView,
    pub radio: bool,
    request_token: u64,
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self {
            current_index: None,
            active_kind: MediaKind::Audio,
            shuffle: false,
            looping: false,
            scrubbing: false,
            state: PlaybackState::Idle,
            progress: ProgressView::default(),
            radio: false,
            request_token: 0,
        }
    }
}

impl PlaybackSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index that follows the current one. Shuffle may land on the current
    /// track again.
    pub fn next_index(&self, len: usize, picker: &mut dyn IndexPicker) -> Option<usize> {
        if len == 0 {
            return None;
        }
        if self.shuffle {
            return Some(picker.pick(len));
        }
        Some(match self.current_index {
            Some(current) => (current + 1) % len,
            None => 0,
        })
    }

    /// Always sequential, regardless of shuffle.
    pub fn prev_index(&self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        Some(match self.current_index {
            Some(current) => (current % len + len - 1) % len,
            None => len - 1,
        })
    }

    /// Random pick that avoids the current track whenever there is another.
    pub fn random_index(&self, len: usize, picker: &mut dyn IndexPicker) -> Option<usize> {
        if len == 0 {
            return None;
        }
        loop {
            let candidate = picker.pick(len);
            if len == 1 || Some(candidate) != self.current_index {
                return Some(candidate);
            }
        }
    }

    pub fn issue_token(&mut self) -> u64 {
        self.request_token += 1;
        self.request_token
    }

    pub fn is_current(&self, token: u64) -> bool {
        self.request_token == token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;

    fn at(index: usize) -> PlaybackSession {
        PlaybackSession {
            current_index: Some(index),
            ..PlaybackSession::new()
        }
    }

    #[test]
    fn sequential_next_wraps_to_start() {
        let mut picker = MockIndexPicker::new();
        picker.expect_pick().never();

        assert_eq!(at(2).next_index(5, &mut picker), Some(3));
        assert_eq!(at(4).next_index(5, &mut picker), Some(0));
        assert_eq!(PlaybackSession::new().next_index(5, &mut picker), Some(0));
        assert_eq!(at(0).next_index(0, &mut picker), None);
    }

    #[test]
    fn shuffled_next_may_repeat_current() {
        let mut picker = MockIndexPicker::new();
        picker.expect_pick().times(1).returning(|_| 3);
        let session = PlaybackSession {
            shuffle: true,
            ..at(3)
        };
        assert_eq!(session.next_index(5, &mut picker), Some(3));
    }

    #[test]
    fn prev_wraps_backwards_regardless_of_shuffle() {
        assert_eq!(at(0).prev_index(5), Some(4));
        assert_eq!(at(3).prev_index(5), Some(2));
        let shuffled = PlaybackSession {
            shuffle: true,
            ..at(0)
        };
        assert_eq!(shuffled.prev_index(5), Some(4));
        assert_eq!(PlaybackSession::new().prev_index(5), Some(4));
        assert_eq!(at(0).prev_index(0), None);
    }

    #[test]
    fn random_repicks_until_different() {
        let mut seq = Sequence::new();
        let mut picker = MockIndexPicker::new();
        for value in [2, 2, 1] {
            picker
                .expect_pick()
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |_| value);
        }
        assert_eq!(at(2).random_index(4, &mut picker), Some(1));
    }

    #[test]
    fn random_on_single_track_returns_it() {
        let mut picker = RandomPicker::seeded(7);
        for _ in 0..20 {
            assert_eq!(at(0).random_index(1, &mut picker), Some(0));
        }
        assert_eq!(at(0).random_index(0, &mut picker), None);
    }

    #[test]
    fn seeded_picker_stays_in_range() {
        let mut picker = RandomPicker::seeded(42);
        let session = at(1);
        for _ in 0..100 {
            let index = session.random_index(3, &mut picker).unwrap();
            assert!(index < 3);
            assert_ne!(index, 1);
        }
    }

    #[test]
    fn tokens_supersede_each_other() {
        let mut session = PlaybackSession::new();
        let first = session.issue_token();
        let second = session.issue_token();
        assert!(!session.is_current(first));
        assert!(session.is_current(second));
    }
}
