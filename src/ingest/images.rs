//! Image-sequence source: every image file in a local directory, in name order.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use super::{FrameSource, SourceConfig, SourceStats};
use crate::frame::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub struct ImageSequenceSource {
    config: SourceConfig,
    files: Vec<PathBuf>,
    cursor: usize,
    frames_captured: u64,
    last_error: bool,
}

impl ImageSequenceSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        let dir = PathBuf::from(&config.url);
        if !dir.is_dir() {
            return Err(anyhow!("{} is not a directory", dir.display()));
        }
        Ok(Self {
            config,
            files: Vec::new(),
            cursor: 0,
            frames_captured: 0,
            last_error: false,
        })
    }
}

impl FrameSource for ImageSequenceSource {
    fn connect(&mut self) -> Result<()> {
        let dir = PathBuf::from(&self.config.url);
        let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)
            .with_context(|| format!("failed to list {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        log::info!(
            "ImageSequenceSource: {} image(s) in {}",
            files.len(),
            dir.display()
        );
        self.files = files;
        self.cursor = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(limit) = self.config.frame_limit {
            if self.frames_captured >= limit {
                return Ok(None);
            }
        }
        let Some(path) = self.files.get(self.cursor).cloned() else {
            return Ok(None);
        };
        self.cursor += 1;
        let image = match image::open(&path) {
            Ok(image) => image.to_rgb8(),
            Err(e) => {
                self.last_error = true;
                return Err(anyhow!("failed to decode {}: {}", path.display(), e));
            }
        };
        self.last_error = false;
        let (width, height) = image.dimensions();
        let frame = Frame::new(image.into_raw(), width, height, self.frames_captured)?;
        self.frames_captured += 1;
        Ok(Some(frame))
    }

    fn is_healthy(&self) -> bool {
        !self.last_error
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames_captured,
            url: self.config.url.clone(),
        }
    }
}
