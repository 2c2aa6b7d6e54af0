use serde::{Deserialize, Serialize};

use crate::PixelPoint;

/// COCO class id of "person", the only class the distance pipeline measures.
pub const PERSON_CLASS_ID: u32 = 0;

/// Axis-aligned box in pixel coordinates, `(x1, y1)` top-left, `(x2, y2)` bottom-right.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn is_finite(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Horizontal midpoint of the bottom edge: where the object meets the ground.
    pub fn bottom_center(&self) -> PixelPoint {
        PixelPoint::new(
            (f64::from(self.x1) + f64::from(self.x2)) / 2.0,
            f64::from(self.y2),
        )
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// One detector output: box, class id, confidence.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(flatten)]
    pub bbox: BoundingBox,
    pub class_id: u32,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

impl Detection {
    pub fn new(bbox: BoundingBox, class_id: u32, confidence: f32) -> Self {
        Self {
            bbox,
            class_id,
            confidence,
        }
    }

    pub fn person(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::new(BoundingBox::new(x1, y1, x2, y2), PERSON_CLASS_ID, 1.0)
    }
}

/// Result of running detection on a frame.
#[derive(Clone, Debug, Default)]
pub struct DetectionResult {
    /// Detections in detector output order.
    pub detections: Vec<Detection>,
    /// Wall time spent in the backend.
    pub inference_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bottom_center_is_ground_contact() {
        let b = BoundingBox::new(100.0, 50.0, 140.0, 250.0);
        assert_eq!(b.bottom_center(), PixelPoint::new(120.0, 250.0));
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.iou(&a), 1.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn non_finite_edges_are_detected() {
        assert!(BoundingBox::new(0.0, 0.0, 10.0, 10.0).is_finite());
        assert!(!BoundingBox::new(f32::INFINITY, 250.0, 220.0, 500.0).is_finite());
        assert!(!BoundingBox::new(80.0, f32::NEG_INFINITY, 120.0, 500.0).is_finite());
        assert!(!BoundingBox::new(0.0, 0.0, 10.0, f32::NAN).is_finite());
    }

    #[test]
    fn detections_parse_from_flat_json() {
        let d: Detection =
            serde_json::from_str(r#"{"x1":1,"y1":2,"x2":3,"y2":4,"class_id":0}"#).unwrap();
        assert_eq!(d.bbox, BoundingBox::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(d.class_id, PERSON_CLASS_ID);
        assert_eq!(d.confidence, 1.0);
    }
}
