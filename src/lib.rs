//! Ground-plane distance monitor.
//!
//! Turns a single uncalibrated camera view into a metric measurement tool:
//! an operator clicks at least four ground points and types their world
//! coordinates, the kernel solves a pixel-to-ground homography, and from then
//! on every detected person is projected onto the ground plane so pairwise
//! separations can be checked against a distance threshold.
//!
//! # Pipeline
//!
//! ```text
//! capture -> (Calibrating: collect clicks) | (Measuring: detect -> adapt -> map -> measure -> log)
//!         -> overlay -> display
//! ```
//!
//! # Module Structure
//!
//! - `calibration`: correspondence store and the `CalibrationSession` state machine
//! - `homography`: planar DLT solver and the pixel-to-world coordinate mapper
//! - `detect`: detector backends and the ground-contact adapter
//! - `distance`: pairwise distance engine and threshold classification
//! - `log`: append-only violation audit log
//! - `pose`: landmark clamping and depth lookup for the depth overlay
//! - `ingest`: frame sources
//! - `monitor`: the frame loop controller
//! - `overlay`, `operator`: render model and operator input seams

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub mod calibration;
pub mod config;
pub mod detect;
pub mod distance;
pub mod frame;
pub mod homography;
pub mod ingest;
pub mod log;
pub mod monitor;
pub mod operator;
pub mod overlay;
pub mod pose;

pub use calibration::{
    CalibrationSession, Correspondence, CorrespondenceStore, Mode, SessionEvent,
    MIN_CORRESPONDENCES,
};
pub use config::MonitorConfig;
pub use detect::{
    ground_contact_points, BackendRegistry, BoundingBox, Detection, DetectionResult,
    DetectorBackend, GroundContact, ScriptedBackend, SyntheticCrowdBackend, PERSON_CLASS_ID,
};
pub use distance::{DistanceEngine, PairDistance, DEFAULT_DISTANCE_THRESHOLD};
pub use frame::Frame;
pub use homography::{map_to_world, HomographyMatrix, HomographySolver};
pub use ingest::{FrameSource, SourceConfig, SyntheticSource};
pub use crate::log::{
    FileViolationLog, InMemoryViolationLog, LogSummary, ViolationRecord, ViolationSink,
};
pub use monitor::{FrameReport, Monitor, MonitorStats};
pub use operator::{OperatorInput, Reply, ScriptedOperator, StdinOperator};
pub use overlay::{
    DisplayAction, FrameDisplay, LogDisplay, Overlay, OverlayItem, RecordingDisplay,
};
pub use pose::{
    DepthMap, Landmark, LandmarkDepth, PoseDepthBackend, PoseDepthResult, StaticPoseDepth,
};

// -------------------- Geometry --------------------

/// Image-space coordinate in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Ground-plane coordinate in meters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldPoint {
    pub x: f64,
    pub y: f64,
}

impl WorldPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Euclidean (L2) distance on the ground plane.
    pub fn distance_to(&self, other: &WorldPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

// -------------------- Errors --------------------

/// Failures of the calibration and measurement pipeline.
///
/// Each variant has its own recovery policy in the frame loop: bad operator
/// input is re-prompted, calibration failures restart the session, projection
/// failures drop a single detection for one frame, and persistence failures
/// are reported while the frame keeps rendering.
#[derive(Debug, Error)]
pub enum MeasureError {
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("need at least {required} point correspondences, got {found}")]
    InsufficientPoints { required: usize, found: usize },

    #[error("degenerate calibration: {reason}")]
    DegenerateConfiguration { reason: String },

    #[error("pixel ({x:.1}, {y:.1}) projects to infinity")]
    DegenerateProjection { x: f64, y: f64 },

    #[error("failed to append to violation log {}: {source}", path.display())]
    PersistenceError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MeasureError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        MeasureError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub(crate) fn degenerate(reason: impl Into<String>) -> Self {
        MeasureError::DegenerateConfiguration {
            reason: reason.into(),
        }
    }

    /// True for failures that invalidate the calibration session.
    pub fn is_fatal_calibration(&self) -> bool {
        matches!(
            self,
            MeasureError::InsufficientPoints { .. } | MeasureError::DegenerateConfiguration { .. }
        )
    }
}
