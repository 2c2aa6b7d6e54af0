use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{Detection, DetectionResult};
use crate::frame::Frame;

/// Replays a fixed list of per-frame detections, cycling when exhausted.
///
/// Script files are JSON arrays of frames, each frame an array of
/// `{"x1":..,"y1":..,"x2":..,"y2":..,"class_id":..,"confidence":..}`.
pub struct ScriptedBackend {
    frames: Vec<Vec<Detection>>,
    cursor: usize,
}

impl ScriptedBackend {
    pub fn new(frames: Vec<Vec<Detection>>) -> Self {
        Self { frames, cursor: 0 }
    }

    /// The same detections on every frame.
    pub fn repeating(detections: Vec<Detection>) -> Self {
        Self::new(vec![detections])
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read detection script {}: {}", path.display(), e))?;
        let frames: Vec<Vec<Detection>> = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid detection script {}: {}", path.display(), e))?;
        Ok(Self::new(frames))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<DetectionResult> {
        let start = Instant::now();
        if self.frames.is_empty() {
            return Ok(DetectionResult::default());
        }
        let detections = self.frames[self.cursor % self.frames.len()].clone();
        self.cursor += 1;
        Ok(DetectionResult {
            detections,
            inference_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }
}
