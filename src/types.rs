// src/types.rs

use serde::{Deserialize, Serialize};

// ============================================================================
// Cast Bar Lifecycle States
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SparkState {
    /// No bar activity
    Idle,
    /// Bar is partially drawn and growing, spark travels along the band
    Fill,
    /// Bar fully drawn, brightness rising toward the peak flash
    TurnLight,
    /// Brightness decaying back to the no-spark baseline
    Fade,
}

impl SparkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SparkState::Idle => "IDLE",
            SparkState::Fill => "FILL",
            SparkState::TurnLight => "TURN_LIGHT",
            SparkState::Fade => "FADE",
        }
    }

    /// Wire encoding: Idle=0, Fill=1, TurnLight=2, Fade=3
    pub fn as_i32(&self) -> i32 {
        match self {
            SparkState::Idle => 0,
            SparkState::Fill => 1,
            SparkState::TurnLight => 2,
            SparkState::Fade => 3,
        }
    }
}

impl std::fmt::Display for SparkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Per-Frame Analysis Output
// ============================================================================

/// Photometric measurements of one ROI frame. Immutable once computed.
#[derive(Debug, Clone, Copy)]
pub struct FrameInfo {
    /// Inclusive row range of the bright horizontal band within the ROI
    pub band_row_start: usize,
    pub band_row_end: usize,
    /// True iff exactly one spark cluster was detected this frame
    pub spark_raw: bool,
    /// Rightmost column of the spark; -1 if absent
    pub spark_idx_raw: i32,
    /// Inclusive column range of the spark on the band; -1 if absent
    pub band_left: i32,
    pub band_right: i32,
    /// Mean HSV value over band rows, all columns (0..255)
    pub energy: f64,
    /// Mean HSV value over band rows excluding the spark columns;
    /// equals `energy` when no spark was found
    pub non_spark_energy: f64,
}

impl FrameInfo {
    pub fn band_height(&self) -> usize {
        self.band_row_end - self.band_row_start + 1
    }
}

// ============================================================================
// Per-Frame Classification Result
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SparkResult {
    pub state: SparkState,
    /// Highest spark column reached this cycle, normalized by ROI width.
    /// 1.0 in TurnLight/Fade, 0.0 in Idle.
    pub progress: f64,
    /// True only on the terminal Fade tick, when the band brightness has
    /// decayed back to the cached no-spark baseline
    pub is_fade50: bool,
    pub spark_detected: bool,
    /// Rightmost spark column; -1 if none
    pub spark_index: i32,
    pub band_left: i32,
    pub band_right: i32,
}

impl SparkResult {
    pub fn no_spark(state: SparkState, progress: f64) -> Self {
        Self {
            state,
            progress,
            is_fade50: false,
            spark_detected: false,
            spark_index: -1,
            band_left: -1,
            band_right: -1,
        }
    }
}

// ============================================================================
// ROI Image Input
// ============================================================================

/// Pixel layouts accepted by the detector. A closed set: single-channel
/// luma, BGR, or BGRA, all with byte samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Gray,
    Bgr,
    Bgra,
}

impl PixelFormat {
    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Gray => 1,
            PixelFormat::Bgr => 3,
            PixelFormat::Bgra => 4,
        }
    }
}

/// Borrowed view of one ROI frame. The detector never retains a reference
/// into `data` past the call that receives it.
#[derive(Debug, Clone, Copy)]
pub struct RoiFrame<'a> {
    pub data: &'a [u8],
    pub width: usize,
    pub height: usize,
    pub format: PixelFormat,
}

impl<'a> RoiFrame<'a> {
    pub fn new(data: &'a [u8], width: usize, height: usize, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
        }
    }

    pub fn expected_len(&self) -> usize {
        self.width * self.height * self.format.channels()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty() || self.width == 0 || self.height == 0
    }
}

// ============================================================================
// Cast Cycle Event
// ============================================================================

/// One completed Idle -> Fill -> (TurnLight) -> Fade -> Idle trajectory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastCycleEvent {
    /// Unique event identifier (UUID)
    pub event_id: String,
    /// Event timestamp (RFC 3339)
    pub timestamp: String,
    /// Frame id of the first Fill output of the cycle
    pub start_frame: u64,
    /// Frame id of the terminal Fade output (`is_fade50 == true`)
    pub end_frame: u64,
    pub duration_frames: u64,
    /// Highest progress observed during Fill
    pub peak_progress: f64,
    /// Whether the cycle passed through TurnLight before fading
    pub reached_turn_light: bool,
    /// Identifier of the ROI stream
    pub source_id: String,
}

impl CastCycleEvent {
    pub fn new(
        start_frame: u64,
        end_frame: u64,
        peak_progress: f64,
        reached_turn_light: bool,
        source_id: String,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            start_frame,
            end_frame,
            duration_frames: end_frame.saturating_sub(start_frame) + 1,
            peak_progress,
            reached_turn_light,
            source_id,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub input: InputConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Directory of cropped cast-bar ROI frames, processed in lexicographic
    /// filename order
    pub frames_dir: String,
    /// Process every Nth frame (default: 1)
    pub frame_stride: usize,
    /// Identifier attached to emitted events
    pub source_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// JSONL stream of every emitted SparkResult
    pub results_file: String,
    /// One JSON document per completed cast cycle
    pub events_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: InputConfig {
                frames_dir: "frames".to_string(),
                frame_stride: 1,
                source_id: "castbar-roi-0".to_string(),
            },
            output: OutputConfig {
                results_file: "output/results.jsonl".to_string(),
                events_dir: "output/events".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_wire_encoding() {
        assert_eq!(SparkState::Idle.as_i32(), 0);
        assert_eq!(SparkState::Fill.as_i32(), 1);
        assert_eq!(SparkState::TurnLight.as_i32(), 2);
        assert_eq!(SparkState::Fade.as_i32(), 3);
    }

    #[test]
    fn test_roi_frame_expected_len() {
        let data = vec![0u8; 100 * 12 * 3];
        let frame = RoiFrame::new(&data, 100, 12, PixelFormat::Bgr);
        assert_eq!(frame.expected_len(), data.len());
        assert!(!frame.is_empty());

        let empty = RoiFrame::new(&[], 0, 0, PixelFormat::Gray);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_cycle_event_duration() {
        let event = CastCycleEvent::new(10, 25, 0.9, true, "roi".to_string());
        assert_eq!(event.duration_frames, 16);
        assert!(event.reached_turn_light);
    }
}
