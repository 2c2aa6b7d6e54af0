//! Pose landmarks and depth lookup for the depth overlay.
//!
//! Pose and depth models are external collaborators behind
//! [`PoseDepthBackend`]. This module only turns their output into
//! in-bounds pixel lookups: normalized landmarks are scaled to the frame,
//! truncated toward zero, and clamped to `[0, w-1] x [0, h-1]` before the
//! depth map is sampled.

use anyhow::{anyhow, Result};

use crate::frame::Frame;

/// Landmark in normalized image coordinates (`0..=1` inside the frame).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Dense relative depth, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct DepthMap {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl DepthMap {
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if values.len() != expected {
            return Err(anyhow!(
                "depth map {}x{} needs {} values, received {}",
                width,
                height,
                expected,
                values.len()
            ));
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn at(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.values
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Nearest-neighbour resample to `width` x `height`.
    pub fn resized(&self, width: u32, height: u32) -> DepthMap {
        if width == self.width && height == self.height {
            return self.clone();
        }
        if self.values.is_empty() {
            return DepthMap {
                width,
                height,
                values: vec![0.0; width as usize * height as usize],
            };
        }
        let mut values = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            let sy = (u64::from(y) * u64::from(self.height) / u64::from(height)) as u32;
            for x in 0..width {
                let sx = (u64::from(x) * u64::from(self.width) / u64::from(width)) as u32;
                values.push(self.values[sy as usize * self.width as usize + sx as usize]);
            }
        }
        DepthMap {
            width,
            height,
            values,
        }
    }
}

/// Scale a normalized landmark to pixels and clamp it into the frame.
pub fn landmark_to_pixel(landmark: Landmark, width: u32, height: u32) -> (u32, u32) {
    let x = (landmark.x * width as f32) as i64;
    let y = (landmark.y * height as f32) as i64;
    let max_x = i64::from(width.saturating_sub(1));
    let max_y = i64::from(height.saturating_sub(1));
    (x.clamp(0, max_x) as u32, y.clamp(0, max_y) as u32)
}

/// Depth sampled under one landmark.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LandmarkDepth {
    pub pixel: (u32, u32),
    pub depth: f32,
}

/// Sample depth under every landmark of a `width` x `height` frame.
///
/// The depth map is resampled to the frame size first when the model ran at
/// a different resolution. An empty frame yields no samples.
pub fn sample_landmark_depths(
    landmarks: &[Landmark],
    depth: &DepthMap,
    width: u32,
    height: u32,
) -> Vec<LandmarkDepth> {
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let depth = depth.resized(width, height);
    landmarks
        .iter()
        .filter_map(|landmark| {
            let pixel = landmark_to_pixel(*landmark, width, height);
            depth
                .at(pixel.0, pixel.1)
                .map(|depth| LandmarkDepth { pixel, depth })
        })
        .collect()
}

#[derive(Clone, Debug)]
pub struct PoseDepthResult {
    pub landmarks: Vec<Landmark>,
    pub depth: DepthMap,
}

pub trait PoseDepthBackend {
    fn name(&self) -> &'static str;

    fn estimate(&mut self, frame: &Frame) -> Result<PoseDepthResult>;
}

/// Returns the same landmarks and depth map for every frame.
pub struct StaticPoseDepth {
    result: PoseDepthResult,
}

impl StaticPoseDepth {
    pub fn new(landmarks: Vec<Landmark>, depth: DepthMap) -> Self {
        Self {
            result: PoseDepthResult { landmarks, depth },
        }
    }
}

impl PoseDepthBackend for StaticPoseDepth {
    fn name(&self) -> &'static str {
        "static"
    }

    fn estimate(&mut self, _frame: &Frame) -> Result<PoseDepthResult> {
        Ok(self.result.clone())
    }
}
