//! Object detection: backend seam, built-in backends, and the ground-contact adapter.

mod adapter;
mod backend;
pub mod backends;
mod registry;
mod result;
pub mod yolo;

pub use adapter::{ground_contact_points, GroundContact};
pub use backend::DetectorBackend;
pub use backends::{ScriptedBackend, SyntheticCrowdBackend};
pub use registry::BackendRegistry;
pub use result::{BoundingBox, Detection, DetectionResult, PERSON_CLASS_ID};
