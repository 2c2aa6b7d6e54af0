use std::time::Instant;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{Detection, DetectionResult};
use crate::frame::Frame;

/// Largest per-frame step of a simulated walker, in pixels.
const MAX_STEP_PX: f32 = 6.0;

#[derive(Clone, Copy, Debug)]
struct Walker {
    /// Ground-contact pixel.
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
}

/// Simulated people wandering across the frame, for demos without a model.
///
/// Box height grows with the y coordinate to mimic perspective; the RNG is
/// seeded so runs are reproducible.
pub struct SyntheticCrowdBackend {
    walkers: Vec<Walker>,
    rng: StdRng,
    initialized_for: Option<(u32, u32)>,
    people: usize,
}

impl SyntheticCrowdBackend {
    pub fn new(people: usize, seed: u64) -> Self {
        Self {
            walkers: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            initialized_for: None,
            people,
        }
    }

    fn spawn(&mut self, width: f32, height: f32) {
        self.walkers = (0..self.people)
            .map(|_| Walker {
                x: self.rng.gen_range(0.1 * width..0.9 * width),
                y: self.rng.gen_range(0.4 * height..0.95 * height),
                vx: self.rng.gen_range(-MAX_STEP_PX..MAX_STEP_PX),
                vy: self.rng.gen_range(-MAX_STEP_PX..MAX_STEP_PX) / 2.0,
            })
            .collect();
    }

    fn step(&mut self, width: f32, height: f32) {
        for w in &mut self.walkers {
            w.vx = (w.vx + self.rng.gen_range(-1.0..1.0)).clamp(-MAX_STEP_PX, MAX_STEP_PX);
            w.vy = (w.vy + self.rng.gen_range(-0.5..0.5)).clamp(-MAX_STEP_PX, MAX_STEP_PX);
            w.x += w.vx;
            w.y += w.vy;
            if w.x < 0.05 * width || w.x > 0.95 * width {
                w.vx = -w.vx;
                w.x = w.x.clamp(0.05 * width, 0.95 * width);
            }
            if w.y < 0.35 * height || w.y > 0.98 * height {
                w.vy = -w.vy;
                w.y = w.y.clamp(0.35 * height, 0.98 * height);
            }
        }
    }
}

impl DetectorBackend for SyntheticCrowdBackend {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult> {
        let start = Instant::now();
        if frame.width == 0 || frame.height == 0 {
            return Ok(DetectionResult::default());
        }
        let (width, height) = (frame.width as f32, frame.height as f32);
        if self.initialized_for != Some((frame.width, frame.height)) {
            self.spawn(width, height);
            self.initialized_for = Some((frame.width, frame.height));
        } else {
            self.step(width, height);
        }

        let detections = self
            .walkers
            .iter()
            .map(|w| {
                let box_h = 0.15 * height + 0.35 * height * (w.y / height);
                let box_w = box_h * 0.4;
                let y1 = (w.y - box_h).max(0.0);
                Detection::person(w.x - box_w / 2.0, y1, w.x + box_w / 2.0, w.y)
            })
            .collect();

        Ok(DetectionResult {
            detections,
            inference_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::PERSON_CLASS_ID;

    #[test]
    fn emits_one_person_per_walker_inside_frame() {
        let mut backend = SyntheticCrowdBackend::new(5, 7);
        let frame = Frame::blank(640, 480, 0);
        for _ in 0..20 {
            let result = backend.detect(&frame).unwrap();
            assert_eq!(result.detections.len(), 5);
            for d in &result.detections {
                assert_eq!(d.class_id, PERSON_CLASS_ID);
                assert!(d.bbox.y2 <= 480.0 && d.bbox.y1 >= 0.0);
                assert!(d.bbox.x1 < d.bbox.x2);
            }
        }
    }

    #[test]
    fn same_seed_is_reproducible() {
        let frame = Frame::blank(320, 240, 0);
        let mut a = SyntheticCrowdBackend::new(3, 42);
        let mut b = SyntheticCrowdBackend::new(3, 42);
        for _ in 0..5 {
            assert_eq!(
                a.detect(&frame).unwrap().detections,
                b.detect(&frame).unwrap().detections
            );
        }
    }
}
