//! Captured frames.
//!
//! A `Frame` is one RGB8 image plus its capture index and local capture time.
//! Frames are processed one at a time and dropped after rendering.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};

pub struct Frame {
    /// Packed RGB8, row-major.
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Zero-based position in the stream.
    pub index: u64,
    pub captured_at: DateTime<Local>,
}

impl Frame {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            index,
            captured_at: Local::now(),
        })
    }

    /// All-black frame, for tests and detectors that ignore pixels.
    pub fn blank(width: u32, height: u32, index: u64) -> Self {
        Self {
            pixels: vec![0u8; width as usize * height as usize * 3],
            width,
            height,
            index,
            captured_at: Local::now(),
        }
    }

    pub fn with_captured_at(mut self, captured_at: DateTime<Local>) -> Self {
        self.captured_at = captured_at;
        self
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}
