use crate::timefmt::format_time;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekTarget {
    pub fraction: f64,
    pub seconds: f64,
}

/// Maps a pointer offset on the seek control to a media position.
///
/// Returns `None` while the media has no usable duration or the control has
/// no width; the offset is clamped to the control, so a drag that leaves it
/// pins to either end.
pub fn compute_seek(offset: f64, width: f64, duration: Option<f64>) -> Option<SeekTarget> {
    let duration = duration.filter(|secs| secs.is_finite() && *secs > 0.0)?;
    if !width.is_finite() || width <= 0.0 || offset.is_nan() {
        return None;
    }
    let clamped = offset.clamp(0.0, width);
    let fraction = clamped / width;
    Some(SeekTarget {
        fraction,
        seconds: fraction * duration,
    })
}

/// Fill fraction and time labels of the seek control.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressView {
    pub fill: f64,
    pub current: String,
    pub total: String,
}

impl Default for ProgressView {
    fn default() -> Self {
        Self {
            fill: 0.0,
            current: format_time(0.0),
            total: format_time(0.0),
        }
    }
}

impl ProgressView {
    pub fn for_duration(duration: Option<f64>) -> Self {
        Self {
            total: duration.map(format_time).unwrap_or_else(|| format_time(0.0)),
            ..Self::default()
        }
    }

    pub fn live() -> Self {
        Self {
            fill: 1.0,
            current: format_time(0.0),
            total: "LIVE".into(),
        }
    }

    pub fn apply_seek(&mut self, target: SeekTarget) {
        self.fill = target.fraction;
        self.current = format_time(target.seconds);
    }

    /// Applies a natural position tick. The fill and total only move once
    /// the duration is known.
    pub fn apply_tick(&mut self, position: f64, duration: Option<f64>) {
        let position = if position.is_finite() { position } else { 0.0 };
        self.current = format_time(position);
        if let Some(duration) = duration.filter(|secs| secs.is_finite() && *secs > 0.0) {
            self.fill = (position / duration).clamp(0.0, 1.0);
            self.total = format_time(duration);
        }
    }
}
