//! Per-frame render model and display sinks.
//!
//! The frame loop describes what to draw as an [`Overlay`]; a
//! [`FrameDisplay`] decides how to present it and reports whether the
//! operator asked to quit.

use anyhow::Result;
use serde::Serialize;

use crate::detect::BoundingBox;
use crate::frame::Frame;
use crate::PixelPoint;

pub const ALERT_BANNER: &str = "ALERT: Distance Violation";
pub const PERSON_LABEL: &str = "Person";

/// Banner shown while correspondences are being collected.
pub fn calibration_banner(required_points: usize) -> String {
    format!("Calibration Mode: Click {required_points} points and enter real-world coordinates")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Color {
    Yellow,
    Green,
    Red,
    White,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum OverlayItem {
    /// Full-width text; `line` 0 is the top row.
    Banner { text: String, line: u32, color: Color },
    Box { bbox: BoundingBox, color: Color },
    /// Text anchored at its bottom-left pixel.
    Label {
        text: String,
        x: i32,
        y: i32,
        color: Color,
    },
    Marker { point: PixelPoint, color: Color },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Overlay {
    pub frame_index: u64,
    pub items: Vec<OverlayItem>,
}

impl Overlay {
    pub fn new(frame_index: u64) -> Self {
        Self {
            frame_index,
            items: Vec::new(),
        }
    }

    pub fn push(&mut self, item: OverlayItem) {
        self.items.push(item);
    }

    pub fn banners(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|item| match item {
            OverlayItem::Banner { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|item| match item {
            OverlayItem::Label { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn has_alert(&self) -> bool {
        self.banners().any(|text| text == ALERT_BANNER)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayAction {
    Continue,
    Quit,
}

/// Presents one annotated frame at a time.
pub trait FrameDisplay {
    fn show(&mut self, frame: &Frame, overlay: &Overlay) -> Result<DisplayAction>;
}

/// Headless display: reports alert transitions through the log facade.
#[derive(Debug, Default)]
pub struct LogDisplay {
    alerting: bool,
    frames_shown: u64,
}

impl LogDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }
}

impl FrameDisplay for LogDisplay {
    fn show(&mut self, frame: &Frame, overlay: &Overlay) -> Result<DisplayAction> {
        self.frames_shown += 1;
        let alert = overlay.has_alert();
        if alert && !self.alerting {
            log::warn!("frame {}: {}", frame.index, ALERT_BANNER);
        } else if !alert && self.alerting {
            log::info!("frame {}: distance alert cleared", frame.index);
        }
        self.alerting = alert;
        log::trace!(
            "frame {}: {} overlay items [{}]",
            frame.index,
            overlay.items.len(),
            overlay.labels().collect::<Vec<_>>().join(", ")
        );
        Ok(DisplayAction::Continue)
    }
}

/// Keeps every overlay; optionally asks to quit after a number of frames.
#[derive(Debug, Default)]
pub struct RecordingDisplay {
    pub overlays: Vec<Overlay>,
    quit_after: Option<usize>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quit_after(frames: usize) -> Self {
        Self {
            overlays: Vec::new(),
            quit_after: Some(frames),
        }
    }
}

impl FrameDisplay for RecordingDisplay {
    fn show(&mut self, _frame: &Frame, overlay: &Overlay) -> Result<DisplayAction> {
        self.overlays.push(overlay.clone());
        match self.quit_after {
            Some(limit) if self.overlays.len() >= limit => Ok(DisplayAction::Quit),
            _ => Ok(DisplayAction::Continue),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibration_banner_names_point_count() {
        assert_eq!(
            calibration_banner(4),
            "Calibration Mode: Click 4 points and enter real-world coordinates"
        );
    }

    #[test]
    fn alert_is_detected_from_banners() {
        let mut overlay = Overlay::new(3);
        assert!(!overlay.has_alert());
        overlay.push(OverlayItem::Label {
            text: ALERT_BANNER.to_string(),
            x: 0,
            y: 0,
            color: Color::Red,
        });
        assert!(!overlay.has_alert());
        overlay.push(OverlayItem::Banner {
            text: ALERT_BANNER.to_string(),
            line: 1,
            color: Color::Red,
        });
        assert!(overlay.has_alert());
    }

    #[test]
    fn recording_display_quits_after_limit() {
        let mut display = RecordingDisplay::quit_after(2);
        let frame = Frame::blank(4, 4, 0);
        let overlay = Overlay::new(0);
        assert_eq!(display.show(&frame, &overlay).unwrap(), DisplayAction::Continue);
        assert_eq!(display.show(&frame, &overlay).unwrap(), DisplayAction::Quit);
        assert_eq!(display.overlays.len(), 2);
    }
}
