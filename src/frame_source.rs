// src/frame_source.rs

use crate::types::{PixelFormat, RoiFrame};
use anyhow::{Context, Result};
use image::DynamicImage;
use std::path::PathBuf;
use tracing::{info, warn};
use walkdir::WalkDir;

/// One decoded ROI crop. Grayscale and RGBA sources keep their channel
/// count (as luma / BGRA); everything else lands as BGR.
pub struct LoadedFrame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub format: PixelFormat,
    pub path: PathBuf,
}

impl LoadedFrame {
    pub fn as_roi(&self) -> RoiFrame<'_> {
        RoiFrame::new(&self.data, self.width, self.height, self.format)
    }
}

/// Reads cast-bar ROI crops from a directory in lexicographic filename
/// order, honoring a sampling stride. Decode failures skip the file.
pub struct FrameSource {
    files: Vec<PathBuf>,
    cursor: usize,
    stride: usize,
}

impl FrameSource {
    pub fn open(dir: &str, stride: usize) -> Result<Self> {
        let extensions = ["png", "jpg", "jpeg", "PNG", "JPG", "JPEG"];
        let mut files = Vec::new();

        for entry in WalkDir::new(dir).min_depth(1).max_depth(2) {
            let entry = entry.with_context(|| format!("scanning {}", dir))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) {
                if extensions.contains(&ext) {
                    files.push(entry.path().to_path_buf());
                }
            }
        }
        files.sort();

        info!("Found {} frame files in {}", files.len(), dir);
        Ok(Self {
            files,
            cursor: 0,
            stride: stride.max(1),
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn next_frame(&mut self) -> Option<LoadedFrame> {
        while self.cursor < self.files.len() {
            let path = self.files[self.cursor].clone();
            self.cursor += self.stride;

            match image::open(&path) {
                Ok(img) => {
                    let (width, height) = (img.width() as usize, img.height() as usize);
                    let (data, format) = match img {
                        DynamicImage::ImageLuma8(buf) => (buf.into_raw(), PixelFormat::Gray),
                        DynamicImage::ImageRgba8(buf) => {
                            let mut data = buf.into_raw();
                            for px in data.chunks_exact_mut(4) {
                                px.swap(0, 2);
                            }
                            (data, PixelFormat::Bgra)
                        }
                        other => {
                            let mut data = other.to_rgb8().into_raw();
                            for px in data.chunks_exact_mut(3) {
                                px.swap(0, 2);
                            }
                            (data, PixelFormat::Bgr)
                        }
                    };
                    return Some(LoadedFrame {
                        data,
                        width,
                        height,
                        format,
                        path,
                    });
                }
                Err(e) => {
                    warn!("Skipping undecodable frame {}: {}", path.display(), e);
                }
            }
        }
        None
    }
}
