//! Frame loop controller.
//!
//! One frame is processed completely before the next is acquired:
//!
//! ```text
//! Calibrating: poll click -> ask for world coordinate -> store (solve when ready)
//! Measuring:   detect -> ground contacts -> map -> pairwise distances -> log violations
//! ```
//!
//! Each frame produces an [`Overlay`] for the display. The mode is decided at
//! the start of a frame; a frame that completes calibration is still rendered
//! as a calibration frame and measuring starts with the next one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::calibration::{CalibrationSession, Mode, SessionEvent};
use crate::config::MonitorConfig;
use crate::detect::{ground_contact_points, BackendRegistry, DetectorBackend, GroundContact};
use crate::distance::{DistanceEngine, PairDistance};
use crate::frame::Frame;
use crate::homography::HomographySolver;
use crate::ingest::FrameSource;
use crate::log::{FileViolationLog, ViolationRecord, ViolationSink};
use crate::operator::{OperatorInput, Reply};
use crate::overlay::{
    calibration_banner, Color, DisplayAction, FrameDisplay, Overlay, OverlayItem, ALERT_BANNER,
    PERSON_LABEL,
};
use crate::pose::{sample_landmark_depths, PoseDepthBackend};
use crate::{MeasureError, WorldPoint, PERSON_CLASS_ID};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Labels are drawn this many pixels above their anchor.
const LABEL_OFFSET: i32 = 10;

/// Pixel anchor for a label drawn above `(x, y)`. Saturates at the `i32` range.
fn label_anchor(x: f64, y: f64) -> (i32, i32) {
    (x as i32, (y as i32).saturating_sub(LABEL_OFFSET))
}

/// Running totals over a monitoring session.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MonitorStats {
    pub frames: u64,
    pub calibration_frames: u64,
    pub measuring_frames: u64,
    pub detections: u64,
    pub pairs: u64,
    pub violations: u64,
    pub persistence_failures: u64,
    pub skipped_projections: u64,
    /// Detections dropped because their box was not finite.
    pub skipped_detections: u64,
    pub calibration_restarts: u64,
}

/// What happened in one frame.
#[derive(Clone, Debug)]
pub struct FrameReport {
    pub frame_index: u64,
    /// Mode the frame was processed in.
    pub mode: Mode,
    /// True on the frame whose click completed calibration.
    pub calibrated: bool,
    pub overlay: Overlay,
    /// Ground positions of the mapped people, in detector order.
    pub world_points: Vec<WorldPoint>,
    pub pairs: Vec<PairDistance>,
    pub violations: usize,
    pub persistence_failures: usize,
    pub skipped_projections: usize,
    pub skipped_detections: usize,
    /// The operator asked to stop during this frame.
    pub quit_requested: bool,
}

impl FrameReport {
    fn new(frame_index: u64, mode: Mode) -> Self {
        Self {
            frame_index,
            mode,
            calibrated: false,
            overlay: Overlay::new(frame_index),
            world_points: Vec::new(),
            pairs: Vec::new(),
            violations: 0,
            persistence_failures: 0,
            skipped_projections: 0,
            skipped_detections: 0,
            quit_requested: false,
        }
    }

    pub fn has_alert(&self) -> bool {
        self.violations > 0
    }
}

/// Owns the calibration session and the measurement pipeline.
pub struct Monitor {
    session: CalibrationSession,
    detector: Box<dyn DetectorBackend>,
    pose_depth: Option<Box<dyn PoseDepthBackend>>,
    engine: DistanceEngine,
    sink: Box<dyn ViolationSink>,
    person_class: u32,
    frame_interval: Option<Duration>,
    stats: MonitorStats,
}

impl Monitor {
    pub fn new(
        session: CalibrationSession,
        detector: Box<dyn DetectorBackend>,
        engine: DistanceEngine,
        sink: Box<dyn ViolationSink>,
    ) -> Self {
        Self {
            session,
            detector,
            pose_depth: None,
            engine,
            sink,
            person_class: PERSON_CLASS_ID,
            frame_interval: None,
            stats: MonitorStats::default(),
        }
    }

    /// Build the whole pipeline from configuration.
    ///
    /// Preloaded calibration points are applied here, so a config with enough
    /// points starts directly in `Measuring`.
    pub fn from_config(config: &MonitorConfig, registry: &BackendRegistry) -> Result<Self> {
        let solver = HomographySolver::new()
            .with_max_condition_number(config.calibration.max_condition_number);
        let mut session =
            CalibrationSession::new(config.calibration.min_points)?.with_solver(solver);
        if !config.calibration.points.is_empty() {
            session
                .preload(&config.calibration.points)
                .context("preloaded calibration points are unusable")?;
        }
        let detector = registry
            .create(&config.detector.name, &config.detector)
            .with_context(|| format!("failed to create detector {}", config.detector.name))?;
        let engine = DistanceEngine::new(config.distance_threshold)?;
        let sink = FileViolationLog::new(&config.log_path);

        let mut monitor = Self::new(session, detector, engine, Box::new(sink))
            .with_person_class(config.person_class_id);
        if config.source.target_fps > 0 {
            monitor.frame_interval = Some(Duration::from_secs_f64(
                1.0 / f64::from(config.source.target_fps),
            ));
        }
        Ok(monitor)
    }

    pub fn with_person_class(mut self, class_id: u32) -> Self {
        self.person_class = class_id;
        self
    }

    pub fn with_pose_depth(mut self, backend: Box<dyn PoseDepthBackend>) -> Self {
        self.pose_depth = Some(backend);
        self
    }

    /// Sleep so frames are processed no faster than one per `interval`.
    pub fn with_frame_interval(mut self, interval: Option<Duration>) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn session(&self) -> &CalibrationSession {
        &self.session
    }

    pub fn mode(&self) -> Mode {
        self.session.mode()
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    /// Process one frame in the current mode.
    pub fn process_frame(
        &mut self,
        frame: &Frame,
        input: &mut dyn OperatorInput,
    ) -> Result<FrameReport> {
        let mut report = FrameReport::new(frame.index, self.session.mode());
        self.stats.frames += 1;
        match report.mode {
            Mode::Calibrating => {
                self.stats.calibration_frames += 1;
                self.calibrate(input, &mut report)?;
            }
            Mode::Measuring => {
                self.stats.measuring_frames += 1;
                self.measure(frame, &mut report)?;
            }
        }
        self.attach_depth(frame, &mut report);

        log::debug!(
            "frame {} ({:?}): {} people, {} pairs, {} violations, {} skipped",
            frame.index,
            report.mode,
            report.world_points.len(),
            report.pairs.len(),
            report.violations,
            report.skipped_projections + report.skipped_detections
        );
        Ok(report)
    }

    /// Drive the loop until the source ends, the display or operator quits, or
    /// `quit` is set.
    ///
    /// Frame acquisition failures end the session cleanly, like end of stream.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        input: &mut dyn OperatorInput,
        display: &mut dyn FrameDisplay,
        quit: &AtomicBool,
    ) -> Result<MonitorStats> {
        source.connect()?;
        let mut last_health_log = Instant::now();

        loop {
            if quit.load(Ordering::SeqCst) {
                log::info!("quit requested; stopping");
                break;
            }
            let started = Instant::now();
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log::info!("frame source ended");
                    break;
                }
                Err(e) => {
                    log::warn!("frame acquisition failed, stopping: {e:#}");
                    break;
                }
            };

            let report = self.process_frame(&frame, input)?;
            if report.quit_requested {
                log::info!("operator requested quit");
                break;
            }
            if display.show(&frame, &report.overlay)? == DisplayAction::Quit {
                log::info!("display requested quit");
                break;
            }

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                let source_stats = source.stats();
                log::info!(
                    "source health={} frames={} url={} mode={:?} violations={}",
                    source.is_healthy(),
                    source_stats.frames_captured,
                    source_stats.url,
                    self.session.mode(),
                    self.stats.violations
                );
                last_health_log = Instant::now();
            }

            if let Some(interval) = self.frame_interval {
                if let Some(remaining) = interval.checked_sub(started.elapsed()) {
                    std::thread::sleep(remaining);
                }
            }
        }

        log::info!(
            "session finished: {} frames, {} violations, {} log write failures",
            self.stats.frames,
            self.stats.violations,
            self.stats.persistence_failures
        );
        Ok(self.stats.clone())
    }

    fn calibrate(&mut self, input: &mut dyn OperatorInput, report: &mut FrameReport) -> Result<()> {
        if self.session.pending().is_none() {
            match input.poll_click()? {
                Reply::Value(pixel) => {
                    if let Err(e) = self.session.on_pixel_clicked(pixel) {
                        log::warn!("click ignored: {e}");
                    }
                }
                Reply::Idle => {}
                Reply::Quit => report.quit_requested = true,
            }
        }
        if !report.quit_requested {
            self.complete_click(input, report)?;
        }

        let overlay = &mut report.overlay;
        overlay.push(OverlayItem::Banner {
            text: calibration_banner(self.session.required_points()),
            line: 0,
            color: Color::Yellow,
        });
        for pixel in self.session.store().pixel_points() {
            overlay.push(OverlayItem::Marker {
                point: pixel,
                color: Color::Green,
            });
        }
        Ok(())
    }

    /// Ask for the world coordinate of the pending click until the store accepts it.
    ///
    /// The click stays pending when the operator has no answer yet or quits.
    fn complete_click(
        &mut self,
        input: &mut dyn OperatorInput,
        report: &mut FrameReport,
    ) -> Result<()> {
        while let Some(pixel) = self.session.pending() {
            let world = match input.world_coordinate(pixel)? {
                Reply::Value(world) => world,
                Reply::Idle => break,
                Reply::Quit => {
                    report.quit_requested = true;
                    break;
                }
            };
            match self.session.supply_world(world) {
                Ok(SessionEvent::PointAdded { count, required }) => {
                    log::info!("{} more point(s) needed", required - count);
                }
                Ok(SessionEvent::Calibrated { .. }) => {
                    report.calibrated = true;
                }
                Err(MeasureError::InvalidInput { reason }) => {
                    log::warn!("rejected world coordinate: {reason}; enter it again");
                }
                Err(e) if e.is_fatal_calibration() => {
                    log::error!("calibration failed: {e}; collect the points again");
                    self.session.restart();
                    self.stats.calibration_restarts += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn measure(&mut self, frame: &Frame, report: &mut FrameReport) -> Result<()> {
        let homography = *self.session.solve()?;
        let result = self.detector.detect(frame)?;
        let contacts = ground_contact_points(&result.detections, self.person_class);
        self.stats.detections += contacts.len() as u64;

        let mut mapped: Vec<GroundContact> = Vec::with_capacity(contacts.len());
        for contact in &contacts {
            let bbox = contact.detection.bbox;
            if !bbox.is_finite() {
                log::warn!(
                    "frame {}: detection with non-finite box {:?}; skipped",
                    frame.index,
                    bbox
                );
                report.skipped_detections += 1;
                continue;
            }
            report.overlay.push(OverlayItem::Box {
                bbox,
                color: Color::Green,
            });
            let (x, y) = label_anchor(f64::from(bbox.x1), f64::from(bbox.y1));
            report.overlay.push(OverlayItem::Label {
                text: PERSON_LABEL.to_string(),
                x,
                y,
                color: Color::Green,
            });
            match homography.map(contact.pixel) {
                Ok(world) => {
                    mapped.push(*contact);
                    report.world_points.push(world);
                }
                Err(MeasureError::DegenerateProjection { x, y }) => {
                    log::warn!(
                        "frame {}: ground contact ({x:.1}, {y:.1}) projects to infinity; skipped",
                        frame.index
                    );
                    report.skipped_projections += 1;
                }
                Err(MeasureError::InvalidInput { reason }) => {
                    log::warn!("frame {}: ground contact skipped: {reason}", frame.index);
                    report.skipped_detections += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.stats.skipped_projections += report.skipped_projections as u64;
        self.stats.skipped_detections += report.skipped_detections as u64;

        report.pairs = self.engine.measure(&report.world_points);
        self.stats.pairs += report.pairs.len() as u64;

        for pair in &report.pairs {
            let a = &mapped[pair.i].detection.bbox;
            let b = &mapped[pair.j].detection.bbox;
            report.overlay.push(OverlayItem::Label {
                text: format!("{:.2} meters", pair.distance),
                x: ((a.x1 + b.x1) / 2.0) as i32,
                y: ((a.y1 + b.y1) / 2.0) as i32,
                color: Color::Red,
            });
            if !pair.violating {
                continue;
            }
            report.violations += 1;
            let record = ViolationRecord::new(pair.distance, frame.captured_at)
                .with_pair(report.world_points[pair.i], report.world_points[pair.j]);
            match self.sink.record(&record) {
                Ok(()) => {}
                Err(e @ MeasureError::PersistenceError { .. }) => {
                    log::warn!("violation not persisted: {e}");
                    report.persistence_failures += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.stats.violations += report.violations as u64;
        self.stats.persistence_failures += report.persistence_failures as u64;

        if report.has_alert() {
            report.overlay.push(OverlayItem::Banner {
                text: ALERT_BANNER.to_string(),
                line: 1,
                color: Color::Red,
            });
        }
        Ok(())
    }

    fn attach_depth(&mut self, frame: &Frame, report: &mut FrameReport) {
        let Some(backend) = self.pose_depth.as_mut() else {
            return;
        };
        let estimate = match backend.estimate(frame) {
            Ok(estimate) => estimate,
            Err(e) => {
                log::warn!("frame {}: {} pose/depth failed: {e:#}", frame.index, backend.name());
                return;
            }
        };
        for sample in
            sample_landmark_depths(&estimate.landmarks, &estimate.depth, frame.width, frame.height)
        {
            let (x, y) = sample.pixel;
            report.overlay.push(OverlayItem::Marker {
                point: crate::PixelPoint::new(f64::from(x), f64::from(y)),
                color: Color::Green,
            });
            let (label_x, label_y) = label_anchor(f64::from(x), f64::from(y));
            report.overlay.push(OverlayItem::Label {
                text: format!("Depth: {:.2}", sample.depth),
                x: label_x,
                y: label_y,
                color: Color::White,
            });
        }
    }
}
