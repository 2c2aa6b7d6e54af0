//! Calibration: collecting pixel/world correspondences and latching the homography.
//!
//! - `store`: ordered, append-only correspondence set
//! - `session`: the Calibrating -> Measuring state machine that owns the store

mod session;
mod store;

pub use session::{CalibrationSession, Mode, PendingCorrespondence, SessionEvent};
pub use store::{Correspondence, CorrespondenceStore, MIN_CORRESPONDENCES};
