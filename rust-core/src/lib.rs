//! Motion Cues Engine Library
//!
//! Detects when the device is riding in a vehicle and drives a field of
//! on-screen dots that move with the vehicle's acceleration, giving the eyes
//! a visual cue that matches what the inner ear feels.
//!
//! # Design Philosophy
//!
//! - **Inputs as parameters**: the detector and the simulator receive sensor
//!   data, time and canvas size explicitly; nothing reads platform state.
//! - **Hysteresis over reactivity**: the vehicle state needs 5 s of evidence
//!   to turn on and 10 s of silence to turn off.
//! - **Absorb bad data locally**: non-finite readings are dropped and broken
//!   dots are respawned; a single bad sample never stops the effect.
//! - **Bounded work**: fixed-size sample windows and O(dots) per frame.
//!
//! # Layout
//!
//! - [`vehicle_detection`] + [`signal`]: the debounced in-vehicle judgment
//! - [`pipeline`] + [`source`]: thread-safe ingestion of sensor events
//! - [`particles`] + [`animation`]: the dot simulation and its frame loop
//! - [`activation`]: combines the detector with the user's on/off choice
//! - [`config`] + [`error`]: JSON configuration
//!
//! # Example
//!
//! ```
//! use motion_cues::{LocationFix, MotionCuesConfig, DetectionPipeline};
//!
//! let pipeline = DetectionPipeline::new(&MotionCuesConfig::default());
//! for second in 0..=5u64 {
//!     pipeline.push_accelerometer([0.0, 0.0, 9.8]);
//!     pipeline.on_location_fix(LocationFix::new(second * 1_000, 15.0));
//! }
//! assert!(pipeline.in_vehicle());
//! ```

pub mod activation;
pub mod animation;
pub mod config;
pub mod error;
pub mod particles;
pub mod pipeline;
pub mod signal;
pub mod source;
pub mod types;
pub mod vehicle_detection;



// Re-export commonly used types
pub use activation::{follow_detector, resolve_effect_active, ActivationHandle, EffectSwitch};
pub use animation::{CueAnimator, FRAME_INTERVAL};
pub use config::{ActivationMode, DotSizeClass, EffectConfiguration, MotionCuesConfig};
pub use error::{ConfigError, ConfigResult};
pub use particles::{Dot, FieldConfig, ParticleField};
pub use pipeline::DetectionPipeline;
pub use signal::SampleBuffer;
pub use source::{DetectionController, MotionSource, PushSource, ScriptedSource, SensorHandle};
pub use types::{CanvasBounds, DotRenderState, LocationFix, Rgba, SensorEvent, SensorKind, Vec3};
pub use vehicle_detection::{
    MotionSignals, MotionSnapshot, VehicleDetector, VehicleDetectorConfig, VehicleState,
    VibrationClassifier,
};
