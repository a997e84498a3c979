// noFriction Meetings - Scroll Sync
// Keeps the rewind lanes (transcript, screen activity, ...) on the same time window
//
// A user scroll on one lane is turned into a fraction of its scrollable range and
// mirrored onto every other enabled lane. Mirrored scrolls come back as scroll events;
// the propagation state tells echoes apart from real user input until the next
// animation frame.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type LaneId = u32;

/// Scroll geometry of one lane, in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LaneMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl LaneMetrics {
    pub fn new(scroll_top: f64, scroll_height: f64, client_height: f64) -> Self {
        Self {
            scroll_top,
            scroll_height,
            client_height,
        }
    }

    fn scroll_range(&self) -> f64 {
        self.scroll_height - self.client_height
    }

    /// Fraction of the scrollable range, in [0, 1]; 0 when the lane cannot scroll
    pub fn progress(&self) -> f64 {
        let range = self.scroll_range();
        if range <= 0.0 {
            return 0.0;
        }
        (self.scroll_top / range).clamp(0.0, 1.0)
    }

    fn scroll_top_at(&self, progress: f64) -> f64 {
        progress * self.scroll_range().max(0.0)
    }
}

/// Who, if anyone, is currently driving the other lanes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropagationState {
    #[default]
    Idle,
    Propagating { origin: LaneId },
}

/// A scroll the view must apply to one lane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollUpdate {
    pub lane: LaneId,
    pub scroll_top: f64,
}

#[derive(Debug, Clone)]
struct Lane {
    metrics: LaneMetrics,
    enabled: bool,
}

/// Scroll synchronization across N lanes
#[derive(Debug, Clone)]
pub struct ScrollSync {
    lanes: BTreeMap<LaneId, Lane>,
    sync_enabled: bool,
    state: PropagationState,
}

impl ScrollSync {
    pub fn new() -> Self {
        Self {
            lanes: BTreeMap::new(),
            sync_enabled: true,
            state: PropagationState::Idle,
        }
    }

    pub fn add_lane(&mut self, lane: LaneId, metrics: LaneMetrics) {
        self.lanes.insert(
            lane,
            Lane {
                metrics,
                enabled: true,
            },
        );
    }

    pub fn remove_lane(&mut self, lane: LaneId) {
        self.lanes.remove(&lane);
        if self.state == (PropagationState::Propagating { origin: lane }) {
            self.state = PropagationState::Idle;
        }
    }

    /// Content or viewport size changed (new events arrived, window resized)
    pub fn set_metrics(&mut self, lane: LaneId, metrics: LaneMetrics) {
        if let Some(l) = self.lanes.get_mut(&lane) {
            l.metrics = metrics;
        }
    }

    /// Exclude a single lane from receiving or driving propagation
    pub fn set_lane_enabled(&mut self, lane: LaneId, enabled: bool) {
        if let Some(l) = self.lanes.get_mut(&lane) {
            l.enabled = enabled;
        }
    }

    /// User toggle; progress keeps being tracked while disabled
    pub fn set_enabled(&mut self, enabled: bool) {
        self.sync_enabled = enabled;
        if !enabled {
            self.state = PropagationState::Idle;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sync_enabled
    }

    pub fn state(&self) -> PropagationState {
        self.state
    }

    pub fn progress(&self, lane: LaneId) -> Option<f64> {
        self.lanes.get(&lane).map(|l| l.metrics.progress())
    }

    pub fn metrics(&self, lane: LaneId) -> Option<LaneMetrics> {
        self.lanes.get(&lane).map(|l| l.metrics)
    }

    /// A lane reported a scroll. Returns the scrolls to apply to the other lanes.
    pub fn on_scroll(&mut self, lane: LaneId, metrics: LaneMetrics) -> Vec<ScrollUpdate> {
        let Some(source) = self.lanes.get_mut(&lane) else {
            log::debug!("Scroll from unknown lane {}", lane);
            return Vec::new();
        };
        source.metrics = metrics;

        if !self.sync_enabled || !source.enabled {
            return Vec::new();
        }

        match self.state {
            // Echo of our own mirrored scroll
            PropagationState::Propagating { origin } if origin != lane => return Vec::new(),
            _ => {}
        }

        let progress = metrics.progress();
        let mut updates = Vec::new();
        for (&id, target) in self.lanes.iter_mut() {
            if id == lane || !target.enabled {
                continue;
            }
            let scroll_top = target.metrics.scroll_top_at(progress);
            target.metrics.scroll_top = scroll_top;
            updates.push(ScrollUpdate {
                lane: id,
                scroll_top,
            });
        }

        self.state = PropagationState::Propagating { origin: lane };
        updates
    }

    /// Next animation frame: mirrored scrolls have landed
    pub fn on_animation_frame(&mut self) {
        self.state = PropagationState::Idle;
    }
}

impl Default for ScrollSync {
    fn default() -> Self {
        Self::new()
    }
}
