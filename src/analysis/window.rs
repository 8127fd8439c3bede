// src/analysis/window.rs

use crate::types::FrameInfo;

/// Owned grayscale plane retained alongside a frame's measurements. The
/// window stores frames by value; nothing borrows from the caller's buffer.
#[derive(Debug, Clone)]
pub struct GrayFrame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

/// One retained frame of the temporal window
#[derive(Debug, Clone)]
pub struct WindowSlot {
    pub info: FrameInfo,
    pub gray: GrayFrame,
}

/// The retained tail of the three-frame window: `prev` and `curr`. The
/// incoming frame acts as the transient `next` during classification and
/// becomes `curr` when the window advances.
pub struct FrameWindow {
    prev: Option<WindowSlot>,
    curr: Option<WindowSlot>,
}

impl FrameWindow {
    pub fn new() -> Self {
        Self {
            prev: None,
            curr: None,
        }
    }

    pub fn prev(&self) -> Option<&WindowSlot> {
        self.prev.as_ref()
    }

    pub fn curr(&self) -> Option<&WindowSlot> {
        self.curr.as_ref()
    }

    /// True until two frames have been ingested; no classification is
    /// emitted during warmup
    pub fn is_warming_up(&self) -> bool {
        self.prev.is_none() || self.curr.is_none()
    }

    /// Rotate the window: `curr` becomes `prev`, the new frame becomes
    /// `curr`. Also performs the warmup bootstrap.
    pub fn advance(&mut self, next: WindowSlot) {
        self.prev = self.curr.take();
        self.curr = Some(next);
    }

    pub fn reset(&mut self) {
        self.prev = None;
        self.curr = None;
    }
}

impl Default for FrameWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(energy: f64) -> WindowSlot {
        WindowSlot {
            info: FrameInfo {
                band_row_start: 4,
                band_row_end: 8,
                spark_raw: false,
                spark_idx_raw: -1,
                band_left: -1,
                band_right: -1,
                energy,
                non_spark_energy: energy,
            },
            gray: GrayFrame {
                data: vec![0u8; 100 * 12],
                width: 100,
                height: 12,
            },
        }
    }

    #[test]
    fn test_warmup_takes_two_frames() {
        let mut window = FrameWindow::new();
        assert!(window.is_warming_up());

        window.advance(slot(1.0));
        assert!(window.is_warming_up());

        window.advance(slot(2.0));
        assert!(!window.is_warming_up());
        assert!((window.prev().unwrap().info.energy - 1.0).abs() < 1e-9);
        assert!((window.curr().unwrap().info.energy - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_advance_rotates() {
        let mut window = FrameWindow::new();
        window.advance(slot(1.0));
        window.advance(slot(2.0));
        window.advance(slot(3.0));
        assert!((window.prev().unwrap().info.energy - 2.0).abs() < 1e-9);
        assert!((window.curr().unwrap().info.energy - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_restarts_warmup() {
        let mut window = FrameWindow::new();
        window.advance(slot(1.0));
        window.advance(slot(2.0));
        window.reset();
        assert!(window.is_warming_up());
        assert!(window.prev().is_none());
        assert!(window.curr().is_none());
    }
}
