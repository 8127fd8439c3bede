// src/cycle_tracker.rs

use crate::types::{CastCycleEvent, SparkResult, SparkState};
use tracing::{debug, info};

struct ActiveCycle {
    start_frame: u64,
    peak_progress: f64,
    reached_turn_light: bool,
}

/// Aggregates the per-frame result stream into one `CastCycleEvent` per
/// completed cycle, emitted on the terminal Fade tick.
pub struct CycleTracker {
    source_id: String,
    active: Option<ActiveCycle>,
}

impl CycleTracker {
    pub fn new(source_id: String) -> Self {
        Self {
            source_id,
            active: None,
        }
    }

    pub fn update(&mut self, frame_id: u64, result: &SparkResult) -> Option<CastCycleEvent> {
        if self.active.is_none() && result.state != SparkState::Idle {
            debug!("🎬 Cast cycle started at frame {}", frame_id);
            self.active = Some(ActiveCycle {
                start_frame: frame_id,
                peak_progress: 0.0,
                reached_turn_light: false,
            });
        }

        let active = self.active.as_mut()?;

        match result.state {
            SparkState::Fill => {
                if result.progress > active.peak_progress {
                    active.peak_progress = result.progress;
                }
            }
            SparkState::TurnLight => active.reached_turn_light = true,
            SparkState::Fade => {}
            SparkState::Idle => {
                // The machine fell back to Idle without a terminal fade
                debug!("Cast cycle dropped without terminal fade");
                self.active = None;
                return None;
            }
        }

        if result.is_fade50 {
            let active = self.active.take()?;
            let event = CastCycleEvent::new(
                active.start_frame,
                frame_id,
                active.peak_progress,
                active.reached_turn_light,
                self.source_id.clone(),
            );
            info!(
                "✅ Cast cycle complete [{}]: frames {}..={} ({} frames), peak progress {:.2}, turn light: {}",
                event.source_id,
                event.start_frame,
                event.end_frame,
                event.duration_frames,
                event.peak_progress,
                event.reached_turn_light
            );
            return Some(event);
        }
        None
    }
}
