//! Effect and engine configuration.
//!
//! `EffectConfiguration` is the user-facing part: how many dots, how big,
//! which color, and when the effect should run. It is owned by the host
//! application and handed to the core read-only.
//!
//! `MotionCuesConfig` bundles it with the detector and simulator tunables so
//! a whole engine can be described by one JSON document. Every field has a
//! default, so a partial document only overrides what it names.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::particles::FieldConfig;
use crate::signal::DEFAULT_HISTORY_CAPACITY;
use crate::types::Rgba;
use crate::vehicle_detection::{VehicleDetectorConfig, VibrationClassifier};

/// Upper bound on the number of dots a configuration may ask for.
pub const MAX_DOT_COUNT: u32 = 500;

/// Default dot color, opaque blue.
pub const DEFAULT_DOT_COLOR: Rgba = Rgba::from_argb(0xFF00_00FF);

/// Default number of dots.
pub const DEFAULT_DOT_COUNT: u32 = 10;

/// Dot size presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DotSizeClass {
    #[default]
    Small,
    Medium,
    Large,
}

impl DotSizeClass {
    /// Dot radius in rendering-resolution-independent units.
    pub fn radius(&self) -> f32 {
        match self {
            DotSizeClass::Small => 4.0,
            DotSizeClass::Medium => 8.0,
            DotSizeClass::Large => 12.0,
        }
    }

    /// Map a stored 1/2/3 size level; unknown levels fall back to medium.
    pub fn from_level(level: u8) -> Self {
        match level {
            1 => DotSizeClass::Small,
            2 => DotSizeClass::Medium,
            3 => DotSizeClass::Large,
            _ => DotSizeClass::Medium,
        }
    }
}

/// When the effect should be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationMode {
    /// Never.
    Off,
    /// Always.
    On,
    /// Whenever the detector says the device is in a vehicle.
    #[default]
    Auto,
}

/// User-facing effect settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EffectConfiguration {
    pub dot_color: Rgba,
    pub dot_count: u32,
    pub dot_size: DotSizeClass,
    pub activation_mode: ActivationMode,
}

impl Default for EffectConfiguration {
    fn default() -> Self {
        Self {
            dot_color: DEFAULT_DOT_COLOR,
            dot_count: DEFAULT_DOT_COUNT,
            dot_size: DotSizeClass::Small,
            activation_mode: ActivationMode::Auto,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MotionCuesConfig {
    /// Samples kept per sensor stream.
    pub history_capacity: usize,
    pub detector: VehicleDetectorConfig,
    pub classifier: VibrationClassifier,
    pub field: FieldConfig,
    pub effect: EffectConfiguration,
}

impl Default for MotionCuesConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            detector: VehicleDetectorConfig::default(),
            classifier: VibrationClassifier::default(),
            field: FieldConfig::default(),
            effect: EffectConfiguration::default(),
        }
    }
}

impl MotionCuesConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: MotionCuesConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn to_json_pretty(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every tunable against the range the engine can work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.history_capacity == 0 {
            return Err(ConfigError::invalid("historyCapacity", "must be at least 1"));
        }

        let c = &self.classifier;
        if !c.min_std_dev.is_finite() || !c.max_std_dev.is_finite() || c.min_std_dev < 0.0 {
            return Err(ConfigError::invalid(
                "classifier",
                "band limits must be finite and non-negative",
            ));
        }
        if c.min_std_dev > c.max_std_dev {
            return Err(ConfigError::invalid(
                "classifier",
                format!("minStdDev {} exceeds maxStdDev {}", c.min_std_dev, c.max_std_dev),
            ));
        }

        let d = &self.detector;
        if !(d.speed_threshold_kmh.is_finite() && d.speed_threshold_kmh >= 0.0) {
            return Err(ConfigError::invalid(
                "detector.speedThresholdKmh",
                "must be finite and non-negative",
            ));
        }
        if !(d.continuous_movement_kmh.is_finite() && d.continuous_movement_kmh >= 0.0) {
            return Err(ConfigError::invalid(
                "detector.continuousMovementKmh",
                "must be finite and non-negative",
            ));
        }

        let f = &self.field;
        if !f.sensitivity.is_finite() {
            return Err(ConfigError::invalid("field.sensitivity", "must be finite"));
        }
        if !(f.damping > 0.0 && f.damping <= 1.0) {
            return Err(ConfigError::invalid("field.damping", "must be in (0, 1]"));
        }
        if !(f.max_speed > 0.0 && f.max_speed.is_finite()) {
            return Err(ConfigError::invalid("field.maxSpeed", "must be positive"));
        }
        if !(0.0..=1.0).contains(&f.restitution) {
            return Err(ConfigError::invalid("field.restitution", "must be in [0, 1]"));
        }
        if !(f.jitter >= 0.0 && f.jitter.is_finite()) {
            return Err(ConfigError::invalid("field.jitter", "must be non-negative"));
        }
        if !(f.initial_speed >= 0.0 && f.initial_speed.is_finite()) {
            return Err(ConfigError::invalid("field.initialSpeed", "must be non-negative"));
        }

        if self.effect.dot_count > MAX_DOT_COUNT {
            return Err(ConfigError::invalid(
                "effect.dotCount",
                format!("{} exceeds the maximum of {MAX_DOT_COUNT}", self.effect.dot_count),
            ));
        }

        Ok(())
    }
}
