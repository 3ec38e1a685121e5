//! Smoothing of the low-rate live position stream into per-frame positions

use crate::animation::interpolation::{Interpolatable, Interpolation};
use crate::core::geo::LatLng;
use std::time::{Duration, Instant};

/// One report from the live position feed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveSample {
    pub lat: f64,
    pub lng: f64,
    pub heading_deg: f64,
    pub ground_track_deg: f64,
}

impl LiveSample {
    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

/// A position fix stamped with its arrival time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub lat: f64,
    pub lng: f64,
    pub heading_deg: f64,
    pub timestamp: Instant,
}

impl PositionSample {
    pub fn new(lat: f64, lng: f64, heading_deg: f64, timestamp: Instant) -> Self {
        Self {
            lat,
            lng,
            heading_deg: Interpolation::normalize_heading(heading_deg),
            timestamp,
        }
    }

    pub fn from_live(live: &LiveSample, timestamp: Instant) -> Self {
        Self::new(live.lat, live.lng, live.heading_deg, timestamp)
    }

    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

/// Blends the two most recent samples so the symbol moves every frame.
///
/// The displayed position trails the feed by one nominal interval: it starts at
/// the previous sample when a new one arrives and reaches it one interval later.
#[derive(Debug, Clone)]
pub struct PositionInterpolator {
    previous: Option<PositionSample>,
    current: Option<PositionSample>,
    interval: Duration,
}

impl PositionInterpolator {
    pub fn new(interval: Duration) -> Self {
        Self {
            previous: None,
            current: None,
            interval,
        }
    }

    pub fn push(&mut self, sample: PositionSample) {
        self.previous = self.current.replace(sample);
    }

    pub fn push_live(&mut self, live: &LiveSample, now: Instant) {
        self.push(PositionSample::from_live(live, now));
    }

    pub fn previous(&self) -> Option<&PositionSample> {
        self.previous.as_ref()
    }

    pub fn current(&self) -> Option<&PositionSample> {
        self.current.as_ref()
    }

    pub fn clear(&mut self) {
        self.previous = None;
        self.current = None;
    }

    /// Blend factor for `now`, in `[0, 1]`
    pub fn progress(&self, now: Instant) -> f64 {
        let Some(current) = self.current else {
            return 1.0;
        };
        if self.interval.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(current.timestamp);
        (elapsed.as_secs_f64() / self.interval.as_secs_f64()).clamp(0.0, 1.0)
    }

    /// Display position and heading at `now`; `None` before the first sample
    pub fn sample_at(&self, now: Instant) -> Option<PositionSample> {
        let current = self.current?;
        let Some(previous) = self.previous else {
            return Some(PositionSample { timestamp: now, ..current });
        };

        let t = self.progress(now);
        let lat = previous.lat.lerp(&current.lat, t);
        // Longitude takes the short way across the antimeridian
        let lng = LatLng::wrap_lng(
            previous.lng + Interpolation::heading_delta(previous.lng, current.lng) * t,
        );
        let heading_deg = Interpolation::heading(previous.heading_deg, current.heading_deg, t);

        Some(PositionSample {
            lat,
            lng,
            heading_deg,
            timestamp: now,
        })
    }
}

impl Default for PositionInterpolator {
    fn default() -> Self {
        Self::new(Duration::from_millis(crate::constants::POSITION_SAMPLE_INTERVAL_MS))
    }
}
