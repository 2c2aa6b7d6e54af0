use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::calibration::{Correspondence, MIN_CORRESPONDENCES};
use crate::distance::DEFAULT_DISTANCE_THRESHOLD;
use crate::homography::DEFAULT_MAX_CONDITION_NUMBER;
use crate::ingest::SourceConfig;
use crate::{PixelPoint, WorldPoint, PERSON_CLASS_ID};

const DEFAULT_LOG_PATH: &str = "distance_violations.log";
const DEFAULT_SOURCE_URL: &str = "stub://synthetic";
const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_DETECTOR: &str = "synthetic";
const DEFAULT_DETECTOR_PEOPLE: usize = 4;
const DEFAULT_DETECTOR_SEED: u64 = 7;
const DEFAULT_DETECTOR_INPUT: u32 = 640;
const DEFAULT_DETECTOR_CONFIDENCE: f32 = 0.25;

pub const CONFIG_ENV: &str = "GROUND_MONITOR_CONFIG";

#[derive(Debug, Deserialize, Default)]
struct MonitorConfigFile {
    distance_threshold: Option<f64>,
    log_path: Option<PathBuf>,
    person_class_id: Option<u32>,
    calibration: Option<CalibrationConfigFile>,
    source: Option<SourceConfigFile>,
    detector: Option<DetectorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CalibrationConfigFile {
    min_points: Option<usize>,
    max_condition_number: Option<f64>,
    points: Option<Vec<PointPairFile>>,
}

/// `{"pixel": [x, y], "world": [X, Y]}`
#[derive(Debug, Deserialize)]
struct PointPairFile {
    pixel: [f64; 2],
    world: [f64; 2],
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    frame_limit: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    name: Option<String>,
    people: Option<usize>,
    seed: Option<u64>,
    script_path: Option<PathBuf>,
    model_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    confidence: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Pairs strictly closer than this many meters are violations.
    pub distance_threshold: f64,
    pub log_path: PathBuf,
    pub person_class_id: u32,
    pub calibration: CalibrationSettings,
    pub source: SourceConfig,
    pub detector: DetectorSettings,
}

#[derive(Debug, Clone)]
pub struct CalibrationSettings {
    /// Correspondences collected before solving. At least four.
    pub min_points: usize,
    pub max_condition_number: f64,
    /// Preloaded correspondences; when enough are given the interactive
    /// calibration is skipped.
    pub points: Vec<Correspondence>,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            min_points: MIN_CORRESPONDENCES,
            max_condition_number: DEFAULT_MAX_CONDITION_NUMBER,
            points: Vec::new(),
        }
    }
}

/// Settings handed to detector factories.
#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub name: String,
    /// Walkers simulated by the synthetic backend.
    pub people: usize,
    pub seed: u64,
    pub script_path: Option<PathBuf>,
    pub model_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub confidence: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_DETECTOR.to_string(),
            people: DEFAULT_DETECTOR_PEOPLE,
            seed: DEFAULT_DETECTOR_SEED,
            script_path: None,
            model_path: None,
            input_width: DEFAULT_DETECTOR_INPUT,
            input_height: DEFAULT_DETECTOR_INPUT,
            confidence: DEFAULT_DETECTOR_CONFIDENCE,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            person_class_id: PERSON_CLASS_ID,
            calibration: CalibrationSettings::default(),
            source: SourceConfig::default(),
            detector: DetectorSettings::default(),
        }
    }
}

impl MonitorConfig {
    /// Defaults, then the file named by `GROUND_MONITOR_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Result<Self> {
        let calibration_file = file.calibration.unwrap_or_default();
        let points = calibration_file
            .points
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(idx, pair)| {
                Correspondence::new(
                    PixelPoint::new(pair.pixel[0], pair.pixel[1]),
                    WorldPoint::new(pair.world[0], pair.world[1]),
                )
                .with_context(|| format!("calibration.points[{idx}]"))
            })
            .collect::<Result<Vec<_>>>()?;
        let calibration = CalibrationSettings {
            min_points: calibration_file.min_points.unwrap_or(MIN_CORRESPONDENCES),
            max_condition_number: calibration_file
                .max_condition_number
                .unwrap_or(DEFAULT_MAX_CONDITION_NUMBER),
            points,
        };

        let source = file.source.unwrap_or_default();
        let source = SourceConfig {
            url: source.url.unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            target_fps: source.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
            width: source.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: source.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
            frame_limit: source.frame_limit,
        };

        let detector = file.detector.unwrap_or_default();
        let defaults = DetectorSettings::default();
        let detector = DetectorSettings {
            name: detector.name.unwrap_or(defaults.name),
            people: detector.people.unwrap_or(defaults.people),
            seed: detector.seed.unwrap_or(defaults.seed),
            script_path: detector.script_path,
            model_path: detector.model_path,
            input_width: detector.input_width.unwrap_or(defaults.input_width),
            input_height: detector.input_height.unwrap_or(defaults.input_height),
            confidence: detector.confidence.unwrap_or(defaults.confidence),
        };

        Ok(Self {
            distance_threshold: file
                .distance_threshold
                .unwrap_or(DEFAULT_DISTANCE_THRESHOLD),
            log_path: file
                .log_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH)),
            person_class_id: file.person_class_id.unwrap_or(PERSON_CLASS_ID),
            calibration,
            source,
            detector,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(threshold) = std::env::var("GROUND_MONITOR_DISTANCE_THRESHOLD") {
            self.distance_threshold = threshold.trim().parse().map_err(|_| {
                anyhow!("GROUND_MONITOR_DISTANCE_THRESHOLD must be a number of meters")
            })?;
        }
        if let Ok(path) = std::env::var("GROUND_MONITOR_LOG_PATH") {
            if !path.trim().is_empty() {
                self.log_path = PathBuf::from(path);
            }
        }
        if let Ok(url) = std::env::var("GROUND_MONITOR_SOURCE") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(name) = std::env::var("GROUND_MONITOR_DETECTOR") {
            if !name.trim().is_empty() {
                self.detector.name = name.trim().to_string();
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.distance_threshold.is_finite() || self.distance_threshold <= 0.0 {
            return Err(anyhow!(
                "distance_threshold must be a positive number of meters, got {}",
                self.distance_threshold
            ));
        }
        if self.calibration.min_points < MIN_CORRESPONDENCES {
            return Err(anyhow!(
                "calibration.min_points must be at least {}, got {}",
                MIN_CORRESPONDENCES,
                self.calibration.min_points
            ));
        }
        let cond = self.calibration.max_condition_number;
        if !cond.is_finite() || cond <= 1.0 {
            return Err(anyhow!(
                "calibration.max_condition_number must be finite and greater than 1, got {}",
                cond
            ));
        }
        if self.log_path.as_os_str().is_empty() {
            return Err(anyhow!("log_path must not be empty"));
        }
        if self.source.target_fps == 0 {
            return Err(anyhow!("source.target_fps must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.detector.confidence) {
            return Err(anyhow!(
                "detector.confidence must be within [0, 1], got {}",
                self.detector.confidence
            ));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<MonitorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
