//! Persisted settings for the bino-cam viewer and CLI.
//! Stored in the platform-specific config directory via `directories::ProjectDirs`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::calibration::{SessionConfig, DEFAULT_SAMPLE_THRESHOLD};
use crate::capture::DEFAULT_CANVAS;
use crate::depth::{BridgeConfig, ProcessEngine, DEFAULT_ENGINE_ARGS, DEFAULT_ENGINE_PROGRAM, DEFAULT_QUEUE_CAP};
use crate::detection::{DetectorConfig, SubPixCriteria, DEFAULT_DETECTION_TOLERANCE, DEFAULT_FPS};
use crate::geometry::{CalibrationPattern, Resolution, Side};

/// Prefix of environment variables that override stored settings.
pub const ENV_PREFIX: &str = "BINO_CAM_";

/// Settings errors.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Cannot determine config directory")]
    NoConfigDir,
    #[error("Failed to access settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Invalid value {value:?} for {key}")]
    InvalidOverride { key: String, value: String },
}

/// Application settings that can be saved and loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Per-camera canvas width
    pub canvas_width: u32,
    /// Per-camera canvas height
    pub canvas_height: u32,
    /// Camera frame rate
    pub fps: f64,
    /// Frame intervals a corner search may take
    pub detection_tolerance: f64,
    /// Detections collected before solving
    pub sample_threshold: usize,
    /// Inner corners per chessboard row
    pub pattern_cols: u32,
    /// Inner corners per chessboard column
    pub pattern_rows: u32,
    /// Sub-pixel search half window
    pub subpix_half_window: u32,
    /// Sub-pixel iteration limit
    pub subpix_max_iterations: u32,
    /// Sub-pixel convergence distance
    pub subpix_epsilon: f64,
    /// Anaglyph right-frame shift in pixels
    pub anaglyph_offset: u32,
    /// Unread depth results above which requests are skipped
    pub depth_queue_cap: usize,
    /// Depth engine executable
    pub engine_program: String,
    /// Depth engine arguments
    pub engine_args: Vec<String>,
    /// Depth map shows near points bright
    pub hot_near: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        let criteria = SubPixCriteria::default();
        let pattern = CalibrationPattern::default();
        Self {
            canvas_width: DEFAULT_CANVAS.width,
            canvas_height: DEFAULT_CANVAS.height,
            fps: DEFAULT_FPS,
            detection_tolerance: DEFAULT_DETECTION_TOLERANCE,
            sample_threshold: DEFAULT_SAMPLE_THRESHOLD,
            pattern_cols: pattern.cols,
            pattern_rows: pattern.rows,
            subpix_half_window: criteria.half_window,
            subpix_max_iterations: criteria.max_iterations,
            subpix_epsilon: criteria.epsilon,
            anaglyph_offset: 0,
            depth_queue_cap: DEFAULT_QUEUE_CAP,
            engine_program: DEFAULT_ENGINE_PROGRAM.to_string(),
            engine_args: DEFAULT_ENGINE_ARGS.iter().map(|s| s.to_string()).collect(),
            hot_near: true,
        }
    }
}

impl AppSettings {
    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "bino-cam", "bino-cam")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the settings file path.
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("settings.json"))
    }

    /// Load settings from the config file, falling back to defaults.
    pub fn load() -> Self {
        Self::settings_path()
            .and_then(|path| fs::read_to_string(&path).ok())
            .map(|content| Self::from_json(&content))
            .unwrap_or_default()
    }

    /// Parse stored settings. Unreadable content yields defaults; fields
    /// that are zero or empty are back-filled.
    pub fn from_json(content: &str) -> Self {
        let defaults = Self::default();
        let mut loaded: Self = match serde_json::from_str(content) {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!("Ignoring unreadable settings file: {}", e);
                return defaults;
            }
        };

        if loaded.canvas_width == 0 || loaded.canvas_height == 0 {
            loaded.canvas_width = defaults.canvas_width;
            loaded.canvas_height = defaults.canvas_height;
        }
        if !loaded.fps.is_finite() || loaded.fps <= 0.0 {
            loaded.fps = defaults.fps;
        }
        if !loaded.detection_tolerance.is_finite() {
            loaded.detection_tolerance = defaults.detection_tolerance;
        }
        if !loaded.subpix_epsilon.is_finite() {
            loaded.subpix_epsilon = defaults.subpix_epsilon;
        }
        if loaded.sample_threshold == 0 {
            loaded.sample_threshold = defaults.sample_threshold;
        }
        if loaded.pattern_cols == 0 || loaded.pattern_rows == 0 {
            loaded.pattern_cols = defaults.pattern_cols;
            loaded.pattern_rows = defaults.pattern_rows;
        }
        if loaded.depth_queue_cap == 0 {
            loaded.depth_queue_cap = defaults.depth_queue_cap;
        }
        if loaded.engine_program.is_empty() {
            loaded.engine_program = defaults.engine_program;
            loaded.engine_args = defaults.engine_args;
        }

        loaded
    }

    /// Save settings to the config file.
    pub fn save(&self) -> Result<PathBuf, SettingsError> {
        let dir = Self::config_dir().ok_or(SettingsError::NoConfigDir)?;

        // Create config directory if it doesn't exist
        fs::create_dir_all(&dir)?;

        let path = dir.join("settings.json");
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)?;

        Ok(path)
    }

    /// Override fields from `BINO_CAM_*` environment variables.
    pub fn apply_env_overrides(&mut self) -> Result<(), SettingsError> {
        self.apply_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    /// Override fields from a key lookup (`CANVAS_WIDTH`, `FPS`, ...).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_parsed(&lookup, "CANVAS_WIDTH", &mut self.canvas_width)?;
        override_parsed(&lookup, "CANVAS_HEIGHT", &mut self.canvas_height)?;
        override_finite(&lookup, "FPS", &mut self.fps)?;
        override_finite(&lookup, "DETECTION_TOLERANCE", &mut self.detection_tolerance)?;
        override_finite(&lookup, "SUBPIX_EPSILON", &mut self.subpix_epsilon)?;
        override_parsed(&lookup, "SAMPLE_THRESHOLD", &mut self.sample_threshold)?;
        override_parsed(&lookup, "PATTERN_COLS", &mut self.pattern_cols)?;
        override_parsed(&lookup, "PATTERN_ROWS", &mut self.pattern_rows)?;
        override_parsed(&lookup, "SUBPIX_HALF_WINDOW", &mut self.subpix_half_window)?;
        override_parsed(&lookup, "SUBPIX_MAX_ITERATIONS", &mut self.subpix_max_iterations)?;
        override_parsed(&lookup, "ANAGLYPH_OFFSET", &mut self.anaglyph_offset)?;
        override_parsed(&lookup, "DEPTH_QUEUE_CAP", &mut self.depth_queue_cap)?;
        override_parsed(&lookup, "HOT_NEAR", &mut self.hot_near)?;
        if let Some(program) = lookup("ENGINE_PROGRAM") {
            self.engine_program = program;
        }
        if let Some(args) = lookup("ENGINE_ARGS") {
            self.engine_args = args.split_whitespace().map(str::to_string).collect();
        }
        Ok(())
    }

    pub fn canvas(&self) -> Resolution {
        Resolution::new(self.canvas_width, self.canvas_height)
    }

    pub fn pattern(&self) -> CalibrationPattern {
        CalibrationPattern::new(self.pattern_cols, self.pattern_rows)
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig::default()
            .with_tolerance(self.detection_tolerance)
            .with_fps(self.fps)
            .with_criteria(SubPixCriteria {
                half_window: self.subpix_half_window,
                max_iterations: self.subpix_max_iterations,
                epsilon: self.subpix_epsilon,
            })
    }

    pub fn session_config(&self, side: Side) -> SessionConfig {
        SessionConfig::new(side)
            .with_pattern(self.pattern())
            .with_sample_threshold(self.sample_threshold)
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            queue_cap: self.depth_queue_cap,
        }
    }

    pub fn depth_engine(&self) -> ProcessEngine {
        ProcessEngine::new(self.engine_program.clone(), self.engine_args.clone())
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, field: &mut T) -> Result<(), SettingsError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(key) {
        *field = value
            .trim()
            .parse()
            .map_err(|_| SettingsError::InvalidOverride {
                key: format!("{}{}", ENV_PREFIX, key),
                value: value.clone(),
            })?;
    }
    Ok(())
}

/// Like [`override_parsed`] but rejects NaN and infinities.
fn override_finite<F>(lookup: &F, key: &str, field: &mut f64) -> Result<(), SettingsError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut value = *field;
    override_parsed(lookup, key, &mut value)?;
    if !value.is_finite() {
        return Err(SettingsError::InvalidOverride {
            key: format!("{}{}", ENV_PREFIX, key),
            value: lookup(key).unwrap_or_default(),
        });
    }
    *field = value;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = AppSettings::default();
        assert_eq!(settings.canvas(), Resolution::new(640, 720));
        assert_eq!(settings.pattern(), CalibrationPattern::new(9, 6));
        assert_eq!(settings.sample_threshold, 10);
        assert_eq!(settings.engine_program, "roslaunch");
        assert_eq!(settings.engine_args, vec!["bino_cam", "matcher_nodes.launch"]);
        let deadline = settings.detector_config().deadline();
        assert!((deadline.as_secs_f64() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_from_json_backfills_missing_and_zero_fields() {
        let settings = AppSettings::from_json(r#"{"fps": 60.0, "canvas_width": 0, "hot_near": false}"#);
        assert_eq!(settings.fps, 60.0);
        assert!(!settings.hot_near);
        assert_eq!(settings.canvas(), Resolution::new(640, 720));
        assert_eq!(settings.depth_queue_cap, 10);

        assert_eq!(AppSettings::from_json("not json"), AppSettings::default());
    }

    #[test]
    fn test_overrides() {
        let mut settings = AppSettings::default();
        settings
            .apply_overrides(lookup(&[
                ("CANVAS_WIDTH", "1280"),
                ("HOT_NEAR", "false"),
                ("ENGINE_ARGS", "pkg  nodes.launch extra"),
            ]))
            .unwrap();
        assert_eq!(settings.canvas_width, 1280);
        assert!(!settings.hot_near);
        assert_eq!(settings.engine_args, vec!["pkg", "nodes.launch", "extra"]);
    }

    #[test]
    fn test_invalid_override_names_variable() {
        let mut settings = AppSettings::default();
        let err = settings
            .apply_overrides(lookup(&[("FPS", "fast")]))
            .unwrap_err();
        assert!(err.to_string().contains("BINO_CAM_FPS"));
        assert_eq!(settings.fps, 30.0);
    }

    #[test]
    fn test_non_finite_overrides_are_rejected() {
        for (key, value) in [("DETECTION_TOLERANCE", "inf"), ("FPS", "NaN"), ("SUBPIX_EPSILON", "-inf")] {
            let mut settings = AppSettings::default();
            let err = settings.apply_overrides(lookup(&[(key, value)])).unwrap_err();
            assert!(matches!(err, SettingsError::InvalidOverride { .. }));
            assert_eq!(settings, AppSettings::default());
        }

        let settings = AppSettings::default();
        assert!(settings.detector_config().deadline() > std::time::Duration::ZERO);
    }
}
