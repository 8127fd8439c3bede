// src/analysis/state_machine.rs
//
// Four-state cast-bar lifecycle machine driven by the three-frame window.
// The output label always belongs to `curr`; the machine carries the next
// state forward and performs at most one transition per tick.

use crate::analysis::window::{GrayFrame, WindowSlot};
use crate::types::{SparkResult, SparkState};
use tracing::{debug, warn};

/// Anti-jitter epsilon on value-channel energies, ~0.5% of the V range
pub const ENERGY_EPS: f64 = 255.0 * 0.003_14;

/// Brightness snapshot of the first confirmed no-spark frame after Fill
/// ends. Fade terminates once the band decays back to this level.
#[derive(Debug, Clone)]
pub struct NoSparkBaseline {
    pub non_spark_energy: f64,
    pub band_row_start: usize,
    pub band_row_end: usize,
    pub gray: GrayFrame,
}

pub struct CastBarStateMachine {
    state: SparkState,
    /// Highest spark column reached in the current cycle. Monotone outside
    /// Idle, reset to 0 whenever the machine returns to Idle.
    max_spark_x: i32,
    /// `non_spark_energy` of the most recent frame that had a spark
    last_spark_energy: Option<f64>,
    baseline: Option<NoSparkBaseline>,
}

impl CastBarStateMachine {
    pub fn new() -> Self {
        Self {
            state: SparkState::Idle,
            max_spark_x: 0,
            last_spark_energy: None,
            baseline: None,
        }
    }

    pub fn state(&self) -> SparkState {
        self.state
    }

    /// The cached no-spark baseline, if one is held (diagnostics)
    #[allow(dead_code)]
    pub fn baseline(&self) -> Option<&NoSparkBaseline> {
        self.baseline.as_ref()
    }

    /// Classify `curr` from the `(prev, curr, next)` window
    pub fn step(&mut self, prev: &WindowSlot, curr: &WindowSlot, next: &WindowSlot) -> SparkResult {
        // Dropout correction: a spark missing on curr alone, with prev and
        // next both lit, is a single-frame false negative and is bridged
        let spark_on_curr =
            curr.info.spark_raw || (prev.info.spark_raw && next.info.spark_raw);

        if spark_on_curr {
            return self.on_spark(prev, curr);
        }

        match self.state {
            SparkState::Idle => {
                self.reset_cycle();
                SparkResult::no_spark(SparkState::Idle, 0.0)
            }
            SparkState::Fill => self.on_fill_end(curr, next),
            SparkState::TurnLight => self.on_turn_light(prev, curr, next),
            SparkState::Fade => self.on_fade(prev, curr),
        }
    }

    /// Spark present on curr (possibly bridged): the bar is filling
    fn on_spark(&mut self, prev: &WindowSlot, curr: &WindowSlot) -> SparkResult {
        // On a bridged frame the spark geometry carries over from prev
        let (idx, left, right) = if curr.info.spark_raw {
            (
                curr.info.spark_idx_raw,
                curr.info.band_left,
                curr.info.band_right,
            )
        } else {
            (
                prev.info.spark_idx_raw,
                prev.info.band_left,
                prev.info.band_right,
            )
        };

        if idx > self.max_spark_x {
            self.max_spark_x = idx;
        }
        self.last_spark_energy = Some(curr.info.non_spark_energy);
        self.baseline = None;
        self.transition_to(SparkState::Fill);

        SparkResult {
            state: SparkState::Fill,
            progress: self.fill_progress(curr.gray.width),
            is_fade50: false,
            spark_detected: true,
            spark_index: idx,
            band_left: left,
            band_right: right,
        }
    }

    /// Fill with confirmed spark absence: decide TurnLight vs Fade from the
    /// monotonicity of `non_spark_energy` across (last spark, curr, next)
    fn on_fill_end(&mut self, curr: &WindowSlot, next: &WindowSlot) -> SparkResult {
        let Some(last) = self.last_spark_energy else {
            warn!("Fill without a spark snapshot, resetting to {}", SparkState::Idle);
            self.reset_cycle();
            self.transition_to(SparkState::Idle);
            return SparkResult::no_spark(SparkState::Idle, 0.0);
        };

        let curr_n = curr.info.non_spark_energy;
        let next_n = next.info.non_spark_energy;

        if curr_n >= last - ENERGY_EPS && next_n >= curr_n - ENERGY_EPS {
            // Band held its brightness: the flash is coming
            self.cache_baseline(curr);
            self.transition_to(SparkState::TurnLight);
            SparkResult::no_spark(SparkState::TurnLight, 1.0)
        } else if curr_n < last - ENERGY_EPS && next_n < curr_n - ENERGY_EPS {
            // Band is already decaying: no flash this cycle
            self.cache_baseline(curr);
            self.transition_to(SparkState::Fade);
            SparkResult::no_spark(SparkState::Fade, 1.0)
        } else {
            // Mixed signals; stays Fill and resolves on the next tick
            SparkResult::no_spark(SparkState::Fill, self.fill_progress(curr.gray.width))
        }
    }

    /// TurnLight: watch `energy` for the peak of the flash. The left side
    /// tolerates jitter (>= prev - eps) while the right side demands a
    /// strict drop (> next + eps); the asymmetry suppresses false peaks.
    fn on_turn_light(
        &mut self,
        prev: &WindowSlot,
        curr: &WindowSlot,
        next: &WindowSlot,
    ) -> SparkResult {
        let is_peak = curr.info.energy >= prev.info.energy - ENERGY_EPS
            && curr.info.energy > next.info.energy + ENERGY_EPS;
        if is_peak {
            self.transition_to(SparkState::Fade);
        }
        SparkResult::no_spark(SparkState::TurnLight, 1.0)
    }

    /// Fade: decay until `non_spark_energy` reaches the cached baseline
    fn on_fade(&mut self, prev: &WindowSlot, curr: &WindowSlot) -> SparkResult {
        if self.baseline.is_none() {
            // Fade entered without the Fill-end cache; prev is a confirmed
            // no-spark frame, snapshot it as-is
            self.cache_baseline(prev);
        }

        let terminal = match self.baseline.as_ref() {
            Some(b) if curr.info.non_spark_energy <= b.non_spark_energy => {
                debug!(
                    "Fade reached baseline {:.2} (rows {}..={}, {} px snapshot)",
                    b.non_spark_energy,
                    b.band_row_start,
                    b.band_row_end,
                    b.gray.data.len()
                );
                true
            }
            _ => false,
        };

        if terminal {
            let mut result = SparkResult::no_spark(SparkState::Fade, 1.0);
            result.is_fade50 = true;
            self.reset_cycle();
            self.transition_to(SparkState::Idle);
            return result;
        }
        SparkResult::no_spark(SparkState::Fade, 1.0)
    }

    fn cache_baseline(&mut self, slot: &WindowSlot) {
        debug!(
            "No-spark baseline cached: energy={:.2}, rows {}..={}, {}x{} gray",
            slot.info.non_spark_energy,
            slot.info.band_row_start,
            slot.info.band_row_end,
            slot.gray.width,
            slot.gray.height
        );
        self.baseline = Some(NoSparkBaseline {
            non_spark_energy: slot.info.non_spark_energy,
            band_row_start: slot.info.band_row_start,
            band_row_end: slot.info.band_row_end,
            gray: slot.gray.clone(),
        });
    }

    fn transition_to(&mut self, next: SparkState) {
        if next != self.state {
            debug!("State: {} → {}", self.state, next);
            self.state = next;
        }
    }

    fn fill_progress(&self, width: usize) -> f64 {
        let denom = width.saturating_sub(1).max(1) as f64;
        (self.max_spark_x.max(0) as f64 / denom).clamp(0.0, 1.0)
    }

    fn reset_cycle(&mut self) {
        self.max_spark_x = 0;
        self.last_spark_energy = None;
        self.baseline = None;
    }

    pub fn reset(&mut self) {
        self.reset_cycle();
        self.state = SparkState::Idle;
    }
}

impl Default for CastBarStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
