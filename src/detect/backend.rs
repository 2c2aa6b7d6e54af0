use anyhow::Result;

use crate::detect::result::DetectionResult;
use crate::frame::Frame;

/// Object detector seam.
///
/// Backends receive each frame read-only and return boxes in frame pixel
/// coordinates, in their own output order. Confidence filtering is the
/// backend's business; the measurement pipeline accepts what it is given.
pub trait DetectorBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
