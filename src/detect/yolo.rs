//! YOLOv8 detection-head decoding.
//!
//! The detection head emits a `[1, 4 + nc, anchors]` tensor: per anchor a
//! center-size box `(cx, cy, w, h)` in input pixels followed by one score per
//! class. Decoding keeps the best class per anchor, drops low scores, and
//! runs class-aware greedy non-maximum suppression.
//!
//! Frames of any size are letterboxed into the model input: scaled by one
//! ratio that keeps the aspect, placed at the top-left, and padded. Decoded
//! boxes are divided by the same ratio to land back on the frame.

use anyhow::{anyhow, Result};
use std::cmp::Ordering;

use crate::detect::result::{BoundingBox, Detection};

const BOX_CHANNELS: usize = 4;

#[derive(Clone, Copy, Debug)]
pub struct DecodeOptions {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// Boxes are clamped to `[0, width] x [0, height]`.
    pub width: f32,
    pub height: f32,
}

/// Placement of a frame inside the model input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    /// Model pixels per frame pixel.
    pub ratio: f32,
    /// Size of the scaled frame inside the model input.
    pub width: u32,
    pub height: u32,
}

/// Fit a `frame` of `(width, height)` into a `model` input, keeping the aspect.
pub fn letterbox(frame: (u32, u32), model: (u32, u32)) -> Result<Letterbox> {
    if frame.0 == 0 || frame.1 == 0 || model.0 == 0 || model.1 == 0 {
        return Err(anyhow!(
            "cannot fit a {}x{} frame into a {}x{} model input",
            frame.0,
            frame.1,
            model.0,
            model.1
        ));
    }
    let (w0, h0) = (frame.0 as f32, frame.1 as f32);
    let ratio = (model.0 as f32 / w0).min(model.1 as f32 / h0);
    Ok(Letterbox {
        ratio,
        width: ((w0 * ratio).round() as u32).clamp(1, model.0),
        height: ((h0 * ratio).round() as u32).clamp(1, model.1),
    })
}

/// Map boxes from model input pixels back onto a `frame_width` x `frame_height` frame.
pub fn scale_detections(
    detections: &mut [Detection],
    letterbox: &Letterbox,
    frame_width: f32,
    frame_height: f32,
) {
    let r = letterbox.ratio;
    for d in detections {
        let b = d.bbox;
        d.bbox = BoundingBox::new(
            (b.x1 / r).clamp(0.0, frame_width),
            (b.y1 / r).clamp(0.0, frame_height),
            (b.x2 / r).clamp(0.0, frame_width),
            (b.y2 / r).clamp(0.0, frame_height),
        );
    }
}

/// Decode a channel-major YOLOv8 output buffer.
pub fn decode_predictions(
    output: &[f32],
    channels: usize,
    anchors: usize,
    opts: &DecodeOptions,
) -> Result<Vec<Detection>> {
    if channels <= BOX_CHANNELS {
        return Err(anyhow!(
            "expected more than {} output channels, got {}",
            BOX_CHANNELS,
            channels
        ));
    }
    if output.len() != channels * anchors {
        return Err(anyhow!(
            "output has {} values, expected {}x{}",
            output.len(),
            channels,
            anchors
        ));
    }

    let at = |c: usize, a: usize| output[c * anchors + a];
    let mut candidates = Vec::new();
    for a in 0..anchors {
        let (class_id, score) = (BOX_CHANNELS..channels)
            .map(|c| (c - BOX_CHANNELS, at(c, a)))
            .fold((0usize, f32::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            });
        if !score.is_finite() || score < opts.confidence_threshold {
            continue;
        }
        let (cx, cy, w, h) = (at(0, a), at(1, a), at(2, a), at(3, a));
        if ![cx, cy, w, h].iter().all(|v| v.is_finite()) {
            continue;
        }
        let bbox = BoundingBox::new(
            (cx - w / 2.0).clamp(0.0, opts.width),
            (cy - h / 2.0).clamp(0.0, opts.height),
            (cx + w / 2.0).clamp(0.0, opts.width),
            (cy + h / 2.0).clamp(0.0, opts.height),
        );
        candidates.push(Detection::new(bbox, class_id as u32, score));
    }

    non_max_suppression(&mut candidates, opts.iou_threshold);
    Ok(candidates)
}

/// Greedy NMS within each class; survivors are ordered by descending confidence.
pub fn non_max_suppression(detections: &mut Vec<Detection>, iou_threshold: f32) {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut kept = 0;
    for index in 0..detections.len() {
        let candidate = detections[index];
        let suppressed = detections[..kept].iter().any(|prev| {
            prev.class_id == candidate.class_id && prev.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            detections.swap(kept, index);
            kept += 1;
        }
    }
    detections.truncate(kept);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> DecodeOptions {
        DecodeOptions {
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            width: 640.0,
            height: 640.0,
        }
    }

    /// Build a channel-major buffer for two classes from per-anchor rows.
    fn buffer(rows: &[[f32; 6]]) -> Vec<f32> {
        let anchors = rows.len();
        let mut out = vec![0.0; 6 * anchors];
        for (a, row) in rows.iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                out[c * anchors + a] = *v;
            }
        }
        out
    }

    #[test]
    fn decodes_best_class_and_drops_low_scores() {
        let data = buffer(&[
            [100.0, 100.0, 20.0, 40.0, 0.9, 0.1],
            [300.0, 300.0, 20.0, 40.0, 0.1, 0.05],
            [500.0, 200.0, 40.0, 40.0, 0.2, 0.7],
        ]);
        let dets = decode_predictions(&data, 6, 3, &opts()).unwrap();
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].class_id, 0);
        assert_eq!(dets[0].bbox, BoundingBox::new(90.0, 80.0, 110.0, 120.0));
        assert_eq!(dets[1].class_id, 1);
    }

    #[test]
    fn overlapping_boxes_of_same_class_are_suppressed() {
        let data = buffer(&[
            [100.0, 100.0, 40.0, 80.0, 0.8, 0.0],
            [102.0, 101.0, 40.0, 80.0, 0.9, 0.0],
            [400.0, 100.0, 40.0, 80.0, 0.6, 0.0],
        ]);
        let dets = decode_predictions(&data, 6, 3, &opts()).unwrap();
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].confidence, 0.9);
        assert_eq!(dets[1].confidence, 0.6);
    }

    #[test]
    fn non_finite_boxes_are_dropped() {
        let data = buffer(&[
            [f32::NAN, 100.0, 20.0, 40.0, 0.9, 0.0],
            [100.0, f32::INFINITY, 20.0, 40.0, 0.9, 0.0],
            [300.0, 300.0, 20.0, 40.0, 0.8, 0.0],
        ]);
        let dets = decode_predictions(&data, 6, 3, &opts()).unwrap();
        assert_eq!(dets.len(), 1);
        assert!(dets[0].bbox.is_finite());
        assert_eq!(dets[0].bbox, BoundingBox::new(290.0, 280.0, 310.0, 320.0));
    }

    #[test]
    fn landscape_frame_is_letterboxed_and_boxes_scaled_back() {
        let lb = letterbox((1280, 960), (640, 640)).unwrap();
        assert_eq!(lb.ratio, 0.5);
        assert_eq!((lb.width, lb.height), (640, 480));

        let mut dets = vec![
            Detection::person(100.0, 50.0, 140.0, 250.0),
            Detection::person(600.0, 400.0, 640.0, 480.0),
        ];
        scale_detections(&mut dets, &lb, 1280.0, 960.0);
        assert_eq!(dets[0].bbox, BoundingBox::new(200.0, 100.0, 280.0, 500.0));
        assert_eq!(dets[1].bbox, BoundingBox::new(1200.0, 800.0, 1280.0, 960.0));
    }

    #[test]
    fn frame_matching_model_is_unscaled() {
        let lb = letterbox((640, 480), (640, 480)).unwrap();
        assert_eq!(lb.ratio, 1.0);
        let mut dets = vec![Detection::person(10.0, 20.0, 30.0, 470.0)];
        scale_detections(&mut dets, &lb, 640.0, 480.0);
        assert_eq!(dets[0].bbox, BoundingBox::new(10.0, 20.0, 30.0, 470.0));
    }

    #[test]
    fn portrait_padding_is_clamped_to_frame() {
        let lb = letterbox((480, 640), (640, 640)).unwrap();
        assert_eq!((lb.width, lb.height), (480, 640));
        let mut dets = vec![Detection::person(400.0, 0.0, 620.0, 640.0)];
        scale_detections(&mut dets, &lb, 480.0, 640.0);
        assert_eq!(dets[0].bbox, BoundingBox::new(400.0, 0.0, 480.0, 640.0));
    }

    #[test]
    fn empty_frame_cannot_be_letterboxed() {
        assert!(letterbox((0, 480), (640, 640)).is_err());
        assert!(letterbox((640, 480), (640, 0)).is_err());
    }

    #[test]
    fn rejects_mismatched_shape() {
        assert!(decode_predictions(&[0.0; 10], 6, 3, &opts()).is_err());
        assert!(decode_predictions(&[0.0; 12], 4, 3, &opts()).is_err());
    }
}
