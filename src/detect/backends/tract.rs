#![cfg(feature = "backend-tract")]

use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::DetectionResult;
use crate::detect::yolo::{
    decode_predictions, letterbox, scale_detections, DecodeOptions, Letterbox,
};
use crate::frame::Frame;

const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

/// Grey fill for the letterbox padding.
const PAD_VALUE: f32 = 144.0 / 255.0;

/// YOLOv8 ONNX detector running on tract.
///
/// Loads a local model whose input is `[1, 3, height, width]` RGB in `0..1`
/// and whose output is the `[1, 4 + nc, anchors]` detection head. Frames of
/// other sizes are letterboxed into the input and boxes are mapped back.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            confidence_threshold: 0.25,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<(Tensor, Letterbox)> {
        let placement = letterbox((frame.width, frame.height), (self.width, self.height))?;
        let rgb = image::RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
            .ok_or_else(|| {
                anyhow!(
                    "frame buffer does not hold {}x{} RGB",
                    frame.width,
                    frame.height
                )
            })?;
        let scaled = if placement.width == frame.width && placement.height == frame.height {
            rgb
        } else {
            image::imageops::resize(&rgb, placement.width, placement.height, FilterType::Triangle)
        };
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, self.width as usize),
            |(_, channel, y, x)| {
                let (x, y) = (x as u32, y as u32);
                if x < placement.width && y < placement.height {
                    scaled.get_pixel(x, y).0[channel] as f32 / 255.0
                } else {
                    PAD_VALUE
                }
            },
        );
        Ok((input.into_tensor(), placement))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult> {
        let start = Instant::now();
        let (input, placement) = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!("unexpected detection head shape {:?}", shape));
        }
        let data: Vec<f32> = view.iter().copied().collect();
        let mut detections = decode_predictions(
            &data,
            shape[1],
            shape[2],
            &DecodeOptions {
                confidence_threshold: self.confidence_threshold,
                iou_threshold: self.iou_threshold,
                width: placement.width as f32,
                height: placement.height as f32,
            },
        )?;
        scale_detections(
            &mut detections,
            &placement,
            frame.width as f32,
            frame.height as f32,
        );
        Ok(DetectionResult {
            detections,
            inference_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }
}
