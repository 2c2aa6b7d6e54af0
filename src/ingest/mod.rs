//! Frame sources.
//!
//! - `stub://...` URLs produce synthetic frames (tests, demos)
//! - local directories of images (feature: ingest-images)
//!
//! Every source yields `Ok(None)` once the stream is exhausted; the frame loop
//! treats that as a clean end of the session.

#[cfg(feature = "ingest-images")]
pub mod images;
pub mod synthetic;

use anyhow::{anyhow, Result};

use crate::frame::Frame;

#[cfg(feature = "ingest-images")]
pub use images::ImageSequenceSource;
pub use synthetic::SyntheticSource;

/// Configuration shared by all sources.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// `stub://<name>` or a local directory path.
    pub url: String,
    /// Frame width for synthetic frames.
    pub width: u32,
    /// Frame height for synthetic frames.
    pub height: u32,
    /// Target frame rate; the frame loop paces itself to this rate.
    pub target_fps: u32,
    /// Stop after this many frames.
    pub frame_limit: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "stub://synthetic".to_string(),
            width: 640,
            height: 480,
            target_fps: 10,
            frame_limit: None,
        }
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub url: String,
}

pub trait FrameSource {
    /// Open the underlying stream.
    fn connect(&mut self) -> Result<()>;

    /// Block until the next frame is available. `None` ends the stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Open the source named by `config.url`.
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    if config.url.trim().is_empty() {
        return Err(anyhow!("frame source url must not be empty"));
    }
    if config.url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(config.clone())));
    }
    if config.url.contains("://") {
        return Err(anyhow!(
            "unsupported frame source {} (only stub:// and local paths)",
            config.url
        ));
    }
    #[cfg(feature = "ingest-images")]
    {
        Ok(Box::new(ImageSequenceSource::new(config.clone())?))
    }
    #[cfg(not(feature = "ingest-images"))]
    {
        Err(anyhow!(
            "reading frames from {} requires the ingest-images feature",
            config.url
        ))
    }
}
