//! Behavioral engagement counters attached to every outgoing answer.
//!
//! Every pointer move increments exactly one of the inside/outside counters
//! (continuous sampling, not enter/leave edges). Counters only grow for the
//! lifetime of a tracker; a new session gets a new tracker.

use serde::Serialize;
use std::time::Instant;

/// Snapshot of the engagement counters as sent on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementMetrics {
    pub mouse_outside_count: u64,
    pub mouse_inside_count: u64,
    pub app_hidden_count: u64,
    pub app_visible_count: u64,
    pub session_duration_ms: u64,
    pub session_duration_seconds: u64,
}

/// The widget's rendered rectangle in document coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }
}

#[derive(Debug, Clone)]
pub struct EngagementTracker {
    started_at: Instant,
    bounds: Option<Bounds>,
    mouse_outside_count: u64,
    mouse_inside_count: u64,
    app_hidden_count: u64,
    app_visible_count: u64,
}

impl Default for EngagementTracker {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

impl EngagementTracker {
    pub fn new(started_at: Instant) -> Self {
        Self {
            started_at,
            bounds: None,
            mouse_outside_count: 0,
            mouse_inside_count: 0,
            app_hidden_count: 0,
            app_visible_count: 0,
        }
    }

    /// Updates the widget rectangle used to classify pointer samples.
    pub fn set_bounds(&mut self, bounds: Bounds) {
        self.bounds = Some(bounds);
    }

    /// Classifies one pointer-move sample. Before the widget has reported its
    /// bounds every sample counts as outside.
    pub fn pointer_moved(&mut self, x: f64, y: f64) {
        let inside = self.bounds.is_some_and(|b| b.contains(x, y));
        self.record_pointer(inside);
    }

    pub fn record_pointer(&mut self, inside: bool) {
        if inside {
            self.mouse_inside_count += 1;
        } else {
            self.mouse_outside_count += 1;
        }
    }

    pub fn visibility_changed(&mut self, visible: bool) {
        if visible {
            self.app_visible_count += 1;
        } else {
            self.app_hidden_count += 1;
        }
    }

    pub fn snapshot(&self) -> EngagementMetrics {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> EngagementMetrics {
        let elapsed = now.saturating_duration_since(self.started_at);
        let session_duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        EngagementMetrics {
            mouse_outside_count: self.mouse_outside_count,
            mouse_inside_count: self.mouse_inside_count,
            app_hidden_count: self.app_hidden_count,
            app_visible_count: self.app_visible_count,
            session_duration_ms,
            session_duration_seconds: session_duration_ms / 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_every_pointer_sample_counts_once() {
        let start = Instant::now();
        let mut tracker = EngagementTracker::new(start);
        tracker.set_bounds(Bounds::new(10.0, 10.0, 100.0, 50.0));

        tracker.pointer_moved(20.0, 20.0);
        tracker.pointer_moved(20.0, 21.0);
        tracker.pointer_moved(500.0, 20.0);

        let metrics = tracker.snapshot_at(start);
        assert_eq!(metrics.mouse_inside_count, 2);
        assert_eq!(metrics.mouse_outside_count, 1);
    }

    #[test]
    fn test_samples_without_bounds_count_outside() {
        let start = Instant::now();
        let mut tracker = EngagementTracker::new(start);
        tracker.pointer_moved(0.0, 0.0);
        assert_eq!(tracker.snapshot_at(start).mouse_outside_count, 1);
    }

    #[test]
    fn test_visibility_and_duration() {
        let start = Instant::now();
        let mut tracker = EngagementTracker::new(start);
        tracker.visibility_changed(false);
        tracker.visibility_changed(true);
        tracker.visibility_changed(false);

        let metrics = tracker.snapshot_at(start + Duration::from_millis(61_250));
        assert_eq!(metrics.app_hidden_count, 2);
        assert_eq!(metrics.app_visible_count, 1);
        assert_eq!(metrics.session_duration_ms, 61_250);
        assert_eq!(metrics.session_duration_seconds, 61);
    }

    #[test]
    fn test_snapshots_are_non_decreasing() {
        let start = Instant::now();
        let mut tracker = EngagementTracker::new(start);
        let before = tracker.snapshot_at(start);
        tracker.record_pointer(true);
        let after = tracker.snapshot_at(start + Duration::from_millis(1));
        assert!(after.mouse_inside_count >= before.mouse_inside_count);
        assert!(after.session_duration_ms >= before.session_duration_ms);
    }
}
