// src/frame_analyzer.rs
//
// Per-frame photometry of one cast-bar ROI: band row detection on the HSV
// saturation channel, spark localization on the grayscale plane, and the two
// scalar energies (band brightness, band-minus-spark brightness) that drive
// the state machine.

use crate::types::{FrameInfo, PixelFormat, RoiFrame};

/// Minimum columnwise grayscale jump that counts as a spark edge
pub const JUMP_THRESHOLD: i16 = 18;
/// Fraction of the ROI width masked out on the left (the bar's left cap)
pub const LEFT_SKIP_RATIO: f64 = 0.10;
/// Two strong-jump runs closer than this fraction of the width merge
const MERGE_GAP_RATIO: f64 = 0.02;
/// Band runs shorter than this fall back to the full image rows
const MIN_BAND_RUN: usize = 3;
/// Spark clusters narrower than this after expansion are rejected
const MIN_SPARK_WIDTH: usize = 2;
/// Percentile of the column-mean value channel used for spark expansion
const VALUE_PERCENTILE: f64 = 0.97;

/// Computes a `FrameInfo` from one ROI image. Owns all scratch planes;
/// buffers are resized lazily when the ROI dimensions change.
pub struct FrameAnalyzer {
    width: usize,
    height: usize,
    gray: Vec<u8>,
    sat: Vec<u8>,
    val: Vec<u8>,
    row_mean: Vec<f64>,
    col_mean: Vec<f64>,
    votes: Vec<u32>,
    quantile_scratch: Vec<f64>,
}

impl FrameAnalyzer {
    pub fn new() -> Self {
        Self {
            width: 0,
            height: 0,
            gray: Vec::new(),
            sat: Vec::new(),
            val: Vec::new(),
            row_mean: Vec::new(),
            col_mean: Vec::new(),
            votes: Vec::new(),
            quantile_scratch: Vec::new(),
        }
    }

    /// Grayscale plane of the most recently analyzed frame
    pub fn gray(&self) -> &[u8] {
        &self.gray
    }

    /// Analyze one ROI frame. The caller has already validated dimensions
    /// (width >= 2, height >= 2, data length matching).
    pub fn analyze(&mut self, frame: &RoiFrame) -> FrameInfo {
        self.prepare_channels(frame);

        let (band_row_start, band_row_end) = self.find_band_rows();
        let energy = self.band_energy(band_row_start, band_row_end);

        let spark = self.detect_spark(band_row_start, band_row_end);
        let (spark_raw, spark_idx_raw, band_left, band_right) = match spark {
            Some((left, right)) => (true, right as i32, left as i32, right as i32),
            None => (false, -1, -1, -1),
        };

        let non_spark_energy = if spark_raw {
            self.non_spark_energy(band_row_start, band_row_end, band_left, band_right, energy)
        } else {
            energy
        };

        FrameInfo {
            band_row_start,
            band_row_end,
            spark_raw,
            spark_idx_raw,
            band_left,
            band_right,
            energy,
            non_spark_energy,
        }
    }

    // ========================================================================
    // COLOR PREPARATION
    // ========================================================================

    /// Fill the grayscale, saturation and value planes from the input pixels.
    /// Single-channel input replicates to BGR, which leaves saturation at 0.
    fn prepare_channels(&mut self, frame: &RoiFrame) {
        let n = frame.width * frame.height;
        if frame.width != self.width || frame.height != self.height {
            self.width = frame.width;
            self.height = frame.height;
            self.gray.resize(n, 0);
            self.sat.resize(n, 0);
            self.val.resize(n, 0);
            self.row_mean.resize(frame.height, 0.0);
            self.col_mean.resize(frame.width, 0.0);
            self.votes.resize(frame.width.saturating_sub(1), 0);
            self.quantile_scratch.resize(frame.width, 0.0);
        }

        match frame.format {
            PixelFormat::Gray => {
                for i in 0..n {
                    let y = frame.data[i];
                    self.gray[i] = y;
                    self.val[i] = y;
                    self.sat[i] = 0;
                }
            }
            PixelFormat::Bgr | PixelFormat::Bgra => {
                let ch = frame.format.channels();
                for i in 0..n {
                    let b = frame.data[i * ch];
                    let g = frame.data[i * ch + 1];
                    let r = frame.data[i * ch + 2];

                    let max = b.max(g).max(r);
                    let min = b.min(g).min(r);

                    self.gray[i] =
                        (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).round() as u8;
                    self.val[i] = max;
                    self.sat[i] = if max == 0 {
                        0
                    } else {
                        ((max - min) as f32 * 255.0 / max as f32).round() as u8
                    };
                }
            }
        }
    }

    // ========================================================================
    // BAND ROW DETECTION
    // ========================================================================

    /// The band is the longest contiguous run of rows whose mean saturation
    /// reaches the midpoint between the min and max row means. Runs shorter
    /// than 3 rows fall back to the full image.
    fn find_band_rows(&mut self) -> (usize, usize) {
        let (w, h) = (self.width, self.height);

        for y in 0..h {
            let row = &self.sat[y * w..y * w + w];
            let sum: u32 = row.iter().map(|&s| s as u32).sum();
            self.row_mean[y] = sum as f64 / w as f64;
        }

        let mut lo = f64::MAX;
        let mut hi = f64::MIN;
        for &m in &self.row_mean[..h] {
            lo = lo.min(m);
            hi = hi.max(m);
        }
        let mid = (lo + hi) / 2.0;

        let mut best: Option<(usize, usize)> = None;
        let mut y = 0;
        while y < h {
            if self.row_mean[y] >= mid {
                let start = y;
                while y < h && self.row_mean[y] >= mid {
                    y += 1;
                }
                let run = (start, y - 1);
                if best.map_or(true, |(bs, be)| run.1 - run.0 > be - bs) {
                    best = Some(run);
                }
            } else {
                y += 1;
            }
        }

        match best {
            Some((start, end)) if end - start + 1 >= MIN_BAND_RUN => (start, end),
            _ => (0, h - 1),
        }
    }

    /// Mean of the value channel over the band rows, all columns
    fn band_energy(&self, row_start: usize, row_end: usize) -> f64 {
        let w = self.width;
        let mut sum = 0u64;
        for y in row_start..=row_end {
            let row = &self.val[y * w..y * w + w];
            sum += row.iter().map(|&v| v as u64).sum::<u64>();
        }
        let count = (row_end - row_start + 1) * w;
        sum as f64 / count as f64
    }

    // ========================================================================
    // SPARK DETECTION
    // ========================================================================

    /// Locate the single bright spark cluster on the band. Returns the
    /// inclusive column range `(left, right)`, or `None` when zero or
    /// multiple clusters are present or the expanded cluster is too narrow.
    fn detect_spark(&mut self, row_start: usize, row_end: usize) -> Option<(usize, usize)> {
        let w = self.width;
        if w < 2 {
            return None;
        }
        let jump_cols = w - 1;
        let left_skip = (((w as f64) * LEFT_SKIP_RATIO).floor() as usize).max(1);
        let band_height = row_end - row_start + 1;
        let vote_min = (band_height / 2 + 1) as u32;

        // Columnwise first-difference votes over band rows. Columns left of
        // the skip margin never vote: the bar's left cap is not a spark.
        for v in self.votes.iter_mut() {
            *v = 0;
        }
        for y in row_start..=row_end {
            let row = &self.gray[y * w..y * w + w];
            for x in left_skip..jump_cols {
                let jump = row[x + 1] as i16 - row[x] as i16;
                if jump >= JUMP_THRESHOLD {
                    self.votes[x] += 1;
                }
            }
        }

        // Group strong-jump columns into runs, then merge runs separated by
        // at most merge_gap non-strong columns
        let merge_gap = (((w as f64) * MERGE_GAP_RATIO).round() as usize).max(2);
        let mut clusters: Vec<(usize, usize)> = Vec::new();
        let mut x = left_skip;
        while x < jump_cols {
            if self.votes[x] >= vote_min {
                let start = x;
                while x < jump_cols && self.votes[x] >= vote_min {
                    x += 1;
                }
                let run = (start, x - 1);
                let merged = match clusters.last_mut() {
                    Some(last) if run.0 - last.1 - 1 <= merge_gap => {
                        last.1 = run.1;
                        true
                    }
                    _ => false,
                };
                if !merged {
                    clusters.push(run);
                }
            } else {
                x += 1;
            }
        }

        if clusters.len() != 1 {
            return None;
        }
        let seed = (clusters[0].1 + 1).min(w - 1);
        if seed < left_skip {
            return None;
        }

        // Expand around the seed over the column-mean value channel, against
        // its 97th percentile
        let band_count = band_height as f64;
        for cx in 0..w {
            let mut sum = 0u32;
            for y in row_start..=row_end {
                sum += self.val[y * w + cx] as u32;
            }
            self.col_mean[cx] = sum as f64 / band_count;
        }

        self.quantile_scratch[..w].copy_from_slice(&self.col_mean[..w]);
        self.quantile_scratch[..w]
            .sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let q_idx = ((w - 1) as f64 * VALUE_PERCENTILE).round() as usize;
        let q97 = self.quantile_scratch[q_idx];

        let mut left = seed;
        let mut right = seed;
        while left > left_skip && self.col_mean[left - 1] >= q97 {
            left -= 1;
        }
        while right + 1 < w && self.col_mean[right + 1] >= q97 {
            right += 1;
        }

        if right - left + 1 < MIN_SPARK_WIDTH {
            return None;
        }
        Some((left, right))
    }

    /// Pixel mean of the band value channel over the columns outside
    /// `[left..=right]`. Falls back to the full band energy when the spark
    /// spans every column.
    fn non_spark_energy(
        &self,
        row_start: usize,
        row_end: usize,
        left: i32,
        right: i32,
        energy: f64,
    ) -> f64 {
        let w = self.width;
        let mut sum = 0u64;
        let mut count = 0u64;
        for y in row_start..=row_end {
            let row = &self.val[y * w..y * w + w];
            for (x, &v) in row.iter().enumerate() {
                let x = x as i32;
                if x < left || x > right {
                    sum += v as u64;
                    count += 1;
                }
            }
        }
        if count == 0 {
            energy
        } else {
            sum as f64 / count as f64
        }
    }
}

impl Default for FrameAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
