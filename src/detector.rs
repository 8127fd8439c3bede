// src/detector.rs

use crate::analysis::{CastBarStateMachine, FrameWindow, GrayFrame, WindowSlot};
use crate::frame_analyzer::FrameAnalyzer;
use crate::types::{RoiFrame, SparkResult, SparkState};
use tracing::{debug, warn};

/// Per-stream cast-bar classifier: frame analyzer, three-frame window and
/// lifecycle state machine behind a single synchronous entry point. One
/// instance per ROI stream; not reentrant.
pub struct CastBarDetector {
    analyzer: FrameAnalyzer,
    window: FrameWindow,
    fsm: CastBarStateMachine,
}

impl CastBarDetector {
    pub fn new() -> Self {
        Self {
            analyzer: FrameAnalyzer::new(),
            window: FrameWindow::new(),
            fsm: CastBarStateMachine::new(),
        }
    }

    pub fn state(&self) -> SparkState {
        self.fsm.state()
    }

    /// Ingest one ROI frame in capture order. Returns `None` for the first
    /// two frames of a stream (window warmup) and for rejected inputs;
    /// afterwards returns the classification of the previous frame.
    pub fn process_frame(&mut self, frame: &RoiFrame) -> Option<SparkResult> {
        if frame.is_empty() || frame.width < 2 || frame.height < 2 {
            warn!(
                "Rejecting degenerate ROI frame ({}x{})",
                frame.width, frame.height
            );
            return None;
        }
        if frame.data.len() < frame.expected_len() {
            warn!(
                "Rejecting short ROI buffer: {} bytes, expected {}",
                frame.data.len(),
                frame.expected_len()
            );
            return None;
        }

        let info = self.analyzer.analyze(frame);
        debug!(
            "Band rows {}..={} ({} high), spark={} idx={}, energy={:.2}/{:.2}",
            info.band_row_start,
            info.band_row_end,
            info.band_height(),
            info.spark_raw,
            info.spark_idx_raw,
            info.energy,
            info.non_spark_energy
        );

        let slot = WindowSlot {
            info,
            gray: GrayFrame {
                data: self.analyzer.gray().to_vec(),
                width: frame.width,
                height: frame.height,
            },
        };

        if self.window.is_warming_up() {
            debug!("Three-frame window warming up");
        }
        let result = match (self.window.prev(), self.window.curr()) {
            (Some(prev), Some(curr)) => Some(self.fsm.step(prev, curr, &slot)),
            _ => None,
        };
        self.window.advance(slot);
        result
    }

    /// Drop all temporal state; the next frame starts a fresh stream
    pub fn reset(&mut self) {
        self.window.reset();
        self.fsm.reset();
    }
}

impl Default for CastBarDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelFormat;

    const W: usize = 100;
    const H: usize = 12;
    const BAND_START: usize = 4;
    const BAND_END: usize = 8;

    // ------------------------------------------------------------------
    // Synthetic ROI frames
    // ------------------------------------------------------------------

    fn paint(data: &mut [u8], x: usize, y: usize, b: u8, g: u8, r: u8) {
        let idx = (y * W + x) * 3;
        data[idx] = b;
        data[idx + 1] = g;
        data[idx + 2] = r;
    }

    /// Empty bar: dark chrome only
    fn idle_frame() -> Vec<u8> {
        let mut data = vec![0u8; W * H * 3];
        for y in 0..H {
            for x in 0..W {
                paint(&mut data, x, y, 10, 10, 10);
            }
        }
        data
    }

    /// Bar filled behind a 4-column white spark ending at `spark_right`
    fn fill_frame(spark_right: usize) -> Vec<u8> {
        let mut data = idle_frame();
        for y in BAND_START..=BAND_END {
            for x in 0..W {
                if x + 3 >= spark_right && x <= spark_right {
                    paint(&mut data, x, y, 255, 255, 255);
                } else if x < spark_right.saturating_sub(3) {
                    paint(&mut data, x, y, 200, 120, 0);
                } else {
                    paint(&mut data, x, y, 20, 20, 20);
                }
            }
        }
        data
    }

    /// Same fill extent as `fill_frame(spark_right)` but the spark itself
    /// has dropped out for one frame
    fn dropout_frame(spark_right: usize) -> Vec<u8> {
        let mut data = idle_frame();
        for y in BAND_START..=BAND_END {
            for x in 0..W {
                if x < spark_right.saturating_sub(3) {
                    paint(&mut data, x, y, 200, 120, 0);
                } else {
                    paint(&mut data, x, y, 20, 20, 20);
                }
            }
        }
        data
    }

    /// Fully drawn bar glowing uniformly at value `v` (no spark)
    fn flash_frame(v: u8) -> Vec<u8> {
        let mut data = idle_frame();
        let g = (v as f32 * 0.6) as u8;
        for y in BAND_START..=BAND_END {
            for x in 0..W {
                paint(&mut data, x, y, v, g, 0);
            }
        }
        data
    }

    fn run(detector: &mut CastBarDetector, frames: &[Vec<u8>]) -> Vec<Option<SparkResult>> {
        frames
            .iter()
            .map(|data| detector.process_frame(&RoiFrame::new(data, W, H, PixelFormat::Bgr)))
            .collect()
    }

    /// One complete cycle: idle, nine spark steps, flash to a peak, decay
    /// below the cached baseline, idle tail
    fn full_cycle_frames() -> Vec<Vec<u8>> {
        let mut frames = vec![idle_frame()];
        for k in 0..9 {
            frames.push(fill_frame(15 + 10 * k));
        }
        for v in [210u8, 230, 250, 240, 225, 205, 190, 190] {
            frames.push(flash_frame(v));
        }
        frames
    }

    // ------------------------------------------------------------------
    // Scenarios
    // ------------------------------------------------------------------

    #[test]
    fn test_warmup_returns_none_exactly_twice() {
        let mut detector = CastBarDetector::new();
        let outputs = run(&mut detector, &full_cycle_frames());
        assert!(outputs[0].is_none());
        assert!(outputs[1].is_none());
        for (i, out) in outputs.iter().enumerate().skip(2) {
            assert!(out.is_some(), "no output at tick {}", i);
        }
    }

    #[test]
    fn test_full_cycle_state_trajectory() {
        let mut detector = CastBarDetector::new();
        let outputs = run(&mut detector, &full_cycle_frames());
        let states: Vec<SparkState> = outputs.iter().flatten().map(|r| r.state).collect();

        // Output k labels input frame k+1: nine Fill frames, then the
        // flash (TurnLight until the peak is confirmed), then Fade down to
        // the baseline, then Idle
        let expected = [
            SparkState::Fill,
            SparkState::Fill,
            SparkState::Fill,
            SparkState::Fill,
            SparkState::Fill,
            SparkState::Fill,
            SparkState::Fill,
            SparkState::Fill,
            SparkState::Fill,
            SparkState::TurnLight,
            SparkState::TurnLight,
            SparkState::TurnLight,
            SparkState::Fade,
            SparkState::Fade,
            SparkState::Fade,
            SparkState::Idle,
        ];
        assert_eq!(states, expected);
    }

    #[test]
    fn test_full_cycle_progress_and_terminal_fade() {
        let mut detector = CastBarDetector::new();
        let outputs = run(&mut detector, &full_cycle_frames());
        let results: Vec<SparkResult> = outputs.into_iter().flatten().collect();

        // Fill progress is the spark index over W-1, and is non-decreasing
        for (k, result) in results[..9].iter().enumerate() {
            let expected = (15 + 10 * k) as f64 / (W - 1) as f64;
            assert!(result.spark_detected);
            assert_eq!(result.spark_index, (15 + 10 * k) as i32);
            assert!((result.progress - expected).abs() < 1e-9);
        }
        for pair in results[..9].windows(2) {
            assert!(pair[1].progress >= pair[0].progress);
        }

        // Exactly one terminal-fade marker, on the last Fade output,
        // followed by Idle
        let fade50: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_fade50)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(fade50.len(), 1);
        let terminal = fade50[0];
        assert_eq!(results[terminal].state, SparkState::Fade);
        assert_eq!(results[terminal + 1].state, SparkState::Idle);
        assert!((results[terminal].progress - 1.0).abs() < 1e-9);
        assert!((results[terminal + 1].progress - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_transition_ordering_is_cycle_prefix() {
        let mut detector = CastBarDetector::new();
        let outputs = run(&mut detector, &full_cycle_frames());
        let states: Vec<SparkState> = outputs.iter().flatten().map(|r| r.state).collect();

        for pair in states.windows(2) {
            let legal = match pair[0] {
                SparkState::Idle => matches!(pair[1], SparkState::Idle | SparkState::Fill),
                SparkState::Fill => !matches!(pair[1], SparkState::Idle),
                SparkState::TurnLight => {
                    matches!(pair[1], SparkState::TurnLight | SparkState::Fade | SparkState::Fill)
                }
                SparkState::Fade => !matches!(pair[1], SparkState::TurnLight),
            };
            assert!(legal, "illegal transition {:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_single_frame_dropout_does_not_end_fill() {
        let mut frames = full_cycle_frames();
        // Frame 5 (spark at x=55) loses its spark for one frame
        frames[5] = dropout_frame(55);

        let mut detector = CastBarDetector::new();
        let outputs = run(&mut detector, &full_cycle_frames());
        let clean: Vec<SparkState> = outputs.iter().flatten().map(|r| r.state).collect();

        let mut detector = CastBarDetector::new();
        let outputs = run(&mut detector, &frames);
        let dropped: Vec<SparkResult> = outputs.into_iter().flatten().collect();
        let dropped_states: Vec<SparkState> = dropped.iter().map(|r| r.state).collect();

        assert_eq!(dropped_states, clean);

        // The bridged output keeps the previous frame's spark geometry and
        // does not regress progress
        let bridged = &dropped[4];
        assert_eq!(bridged.state, SparkState::Fill);
        assert!(bridged.spark_detected);
        assert_eq!(bridged.spark_index, 45);
        assert!((bridged.progress - 45.0 / 99.0).abs() < 1e-9);
    }

    #[test]
    fn test_back_to_back_cycles_reset_progress() {
        let mut frames = full_cycle_frames();
        // Drop everything after the frame whose fade reaches the baseline,
        // so the next cycle's spark follows the terminal tick directly
        frames.truncate(16);
        frames.push(fill_frame(35));
        frames.push(fill_frame(45));
        frames.push(fill_frame(55));

        let mut detector = CastBarDetector::new();
        let outputs = run(&mut detector, &frames);
        let results: Vec<SparkResult> = outputs.into_iter().flatten().collect();

        let terminal = results
            .iter()
            .position(|r| r.is_fade50)
            .expect("first cycle terminates");

        // The next cycle's first Fill reflects only the new spark
        let next_fill = &results[terminal + 1];
        assert_eq!(next_fill.state, SparkState::Fill);
        assert_eq!(next_fill.spark_index, 35);
        assert!((next_fill.progress - 35.0 / 99.0).abs() < 1e-9);
    }

    #[test]
    fn test_plateau_flash_holds_turn_light() {
        let mut frames = vec![idle_frame()];
        for k in 0..9 {
            frames.push(fill_frame(15 + 10 * k));
        }
        for _ in 0..30 {
            frames.push(flash_frame(220));
        }

        let mut detector = CastBarDetector::new();
        let outputs = run(&mut detector, &frames);
        let states: Vec<SparkState> = outputs.iter().flatten().map(|r| r.state).collect();

        assert_eq!(states[9], SparkState::TurnLight);
        for state in &states[9..] {
            assert_eq!(*state, SparkState::TurnLight);
        }
    }

    #[test]
    fn test_invalid_frames_do_not_advance_window() {
        let frames = full_cycle_frames();
        let mut detector = CastBarDetector::new();

        assert!(detector
            .process_frame(&RoiFrame::new(&frames[0], W, H, PixelFormat::Bgr))
            .is_none());
        assert!(detector
            .process_frame(&RoiFrame::new(&frames[1], W, H, PixelFormat::Bgr))
            .is_none());

        // Empty and undersized inputs are rejected without consuming a tick
        assert!(detector
            .process_frame(&RoiFrame::new(&[], 0, 0, PixelFormat::Bgr))
            .is_none());
        let short = vec![0u8; 10];
        assert!(detector
            .process_frame(&RoiFrame::new(&short, W, H, PixelFormat::Bgr))
            .is_none());

        // The next valid frame classifies frame 1 as usual
        let result = detector
            .process_frame(&RoiFrame::new(&frames[2], W, H, PixelFormat::Bgr))
            .expect("window is full");
        assert_eq!(result.state, SparkState::Fill);
        assert_eq!(result.spark_index, 15);
    }

    #[test]
    fn test_reset_restarts_warmup() {
        let frames = full_cycle_frames();
        let mut detector = CastBarDetector::new();
        run(&mut detector, &frames[..6]);
        assert_eq!(detector.state(), SparkState::Fill);

        detector.reset();
        assert_eq!(detector.state(), SparkState::Idle);
        let outputs = run(&mut detector, &frames[..3]);
        assert!(outputs[0].is_none());
        assert!(outputs[1].is_none());
        assert!(outputs[2].is_some());
    }
}
