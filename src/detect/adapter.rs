//! Detection adapter: raw detector output to ground-contact pixels.

use crate::detect::result::Detection;
use crate::PixelPoint;

/// A retained detection and the pixel where it touches the ground.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroundContact {
    pub pixel: PixelPoint,
    pub detection: Detection,
}

/// Keep detections of `target_class` and anchor each at its bottom-center.
///
/// The bottom edge, not the box center, is used because only the feet lie on
/// the ground plane; a center anchor would shift with the person's height.
/// Output order follows detector order. Confidence is not filtered here.
pub fn ground_contact_points(detections: &[Detection], target_class: u32) -> Vec<GroundContact> {
    detections
        .iter()
        .filter(|d| d.class_id == target_class)
        .map(|d| GroundContact {
            pixel: d.bbox.bottom_center(),
            detection: *d,
        })
        .collect()
}
