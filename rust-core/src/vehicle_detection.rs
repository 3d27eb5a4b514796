//! Vehicle motion detection.
//!
//! Decides whether the device is currently travelling inside a vehicle.
//! The decision fuses two very different inputs:
//! - Location-derived ground speed (coarse, arrives every few seconds)
//! - Accelerometer magnitude spread (fine, arrives at sensor rate)
//!
//! The raw judgment is noisy: a car stops at a light, the road goes smooth
//! for a while. The detector therefore runs the raw judgment through an
//! asymmetric hysteresis pair. A positive judgment has to hold for the
//! confirm duration before the state flips on, and once on it only flips
//! off after the release timeout has elapsed with no positive judgment.
//!
//! All timing uses absolute elapsed milliseconds supplied by the caller,
//! never a call counter, so evaluation cadence can be arbitrary.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::signal::SampleBuffer;

/// m/s → km/h.
const MPS_TO_KMH: f64 = 3.6;

/// Standard-deviation band that marks "typical vehicle vibration".
///
/// Below the band the device is still; above it the signal is dominated by
/// shocks, impacts or a saturated sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VibrationClassifier {
    /// Lowest accepted standard deviation (m/s²), inclusive.
    pub min_std_dev: f64,
    /// Highest accepted standard deviation (m/s²), inclusive.
    pub max_std_dev: f64,
}

impl Default for VibrationClassifier {
    fn default() -> Self {
        Self {
            min_std_dev: 0.5,
            max_std_dev: 5.0,
        }
    }
}

impl VibrationClassifier {
    /// Create a classifier for the inclusive band `[min_std_dev, max_std_dev]`.
    pub fn new(min_std_dev: f64, max_std_dev: f64) -> Self {
        assert!(
            min_std_dev <= max_std_dev,
            "vibration band is inverted: {min_std_dev} > {max_std_dev}"
        );
        Self {
            min_std_dev,
            max_std_dev,
        }
    }

    /// True when the magnitude history looks like vehicle vibration.
    ///
    /// An empty history carries no evidence and is never a match.
    pub fn classify(&self, history: &SampleBuffer) -> bool {
        match history.std_dev() {
            Some(std_dev) => (self.min_std_dev..=self.max_std_dev).contains(&std_dev),
            None => false,
        }
    }
}

/// Thresholds and timers for the vehicle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VehicleDetectorConfig {
    /// Speed at or above which the device counts as travelling (km/h).
    pub speed_threshold_kmh: f64,
    /// Speed above which the device counts as continuously moving (km/h).
    pub continuous_movement_kmh: f64,
    /// How long a positive judgment must hold before confirming (ms).
    pub confirm_duration_ms: u64,
    /// How long after the last positive judgment before releasing (ms).
    pub release_timeout_ms: u64,
}

impl Default for VehicleDetectorConfig {
    fn default() -> Self {
        Self {
            speed_threshold_kmh: 8.0,
            continuous_movement_kmh: 0.5,
            confirm_duration_ms: 5_000,
            release_timeout_ms: 10_000,
        }
    }
}

/// Speed and accelerometer evidence for one evaluation.
///
/// Built fresh for every evaluation; it only borrows the history.
#[derive(Debug, Clone, Copy)]
pub struct MotionSnapshot<'a> {
    pub speed_mps: f64,
    pub accel_history: &'a SampleBuffer,
}

impl<'a> MotionSnapshot<'a> {
    pub fn new(speed_mps: f64, accel_history: &'a SampleBuffer) -> Self {
        Self {
            speed_mps,
            accel_history,
        }
    }
}

/// The three raw signals computed from a snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSignals {
    pub speed_kmh: f64,
    pub is_speeding: bool,
    pub has_vibration_pattern: bool,
    pub is_continuous_movement: bool,
}

impl MotionSignals {
    /// Raw, undebounced "in a vehicle" judgment.
    ///
    /// Speed is mandatory; vibration and continuous movement are
    /// interchangeable supporting evidence.
    pub fn is_positive(&self) -> bool {
        self.is_speeding && (self.has_vibration_pattern || self.is_continuous_movement)
    }
}

/// Hysteresis state of the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VehicleState {
    /// Not in a vehicle, no confirmation timer running.
    Idle,
    /// Positive judgment seen, confirmation timer running.
    Candidate,
    /// In a vehicle.
    Confirmed,
}

/// Debounced vehicle detector.
#[derive(Debug, Clone)]
pub struct VehicleDetector {
    config: VehicleDetectorConfig,
    classifier: VibrationClassifier,

    in_vehicle: bool,
    detection_started_at_ms: Option<u64>,
    last_positive_at_ms: Option<u64>,
}

impl VehicleDetector {
    pub fn new(config: VehicleDetectorConfig, classifier: VibrationClassifier) -> Self {
        Self {
            config,
            classifier,
            in_vehicle: false,
            detection_started_at_ms: None,
            last_positive_at_ms: None,
        }
    }

    /// Create with default thresholds and classifier band.
    pub fn default_detector() -> Self {
        Self::new(VehicleDetectorConfig::default(), VibrationClassifier::default())
    }

    /// Compute the raw signals for a snapshot without touching state.
    pub fn signals(&self, snapshot: &MotionSnapshot<'_>) -> MotionSignals {
        let speed_kmh = snapshot.speed_mps * MPS_TO_KMH;
        MotionSignals {
            speed_kmh,
            is_speeding: speed_kmh >= self.config.speed_threshold_kmh,
            has_vibration_pattern: self.classifier.classify(snapshot.accel_history),
            is_continuous_movement: speed_kmh > self.config.continuous_movement_kmh,
        }
    }

    /// Feed one snapshot taken at `now_ms` and return the debounced state.
    pub fn evaluate(&mut self, snapshot: &MotionSnapshot<'_>, now_ms: u64) -> bool {
        let signals = self.signals(snapshot);
        debug!(
            "vehicle signals at {now_ms}ms: speed={:.1}km/h speeding={} vibration={} moving={}",
            signals.speed_kmh,
            signals.is_speeding,
            signals.has_vibration_pattern,
            signals.is_continuous_movement
        );

        let was_in_vehicle = self.in_vehicle;
        if signals.is_positive() {
            self.on_positive(now_ms);
        } else {
            self.on_negative(now_ms);
        }

        if was_in_vehicle != self.in_vehicle {
            info!(
                "vehicle state changed at {now_ms}ms: in_vehicle={}",
                self.in_vehicle
            );
        }
        self.in_vehicle
    }

    fn on_positive(&mut self, now_ms: u64) {
        let started = *self.detection_started_at_ms.get_or_insert(now_ms);
        if now_ms.saturating_sub(started) >= self.config.confirm_duration_ms {
            self.in_vehicle = true;
            self.last_positive_at_ms = Some(now_ms);
        }
    }

    fn on_negative(&mut self, now_ms: u64) {
        // No positive on record counts as an infinitely old one.
        let released = match self.last_positive_at_ms {
            Some(last) => now_ms.saturating_sub(last) > self.config.release_timeout_ms,
            None => true,
        };
        if released {
            self.detection_started_at_ms = None;
            self.in_vehicle = false;
        }
    }

    /// Current debounced output.
    pub fn in_vehicle(&self) -> bool {
        self.in_vehicle
    }

    pub fn state(&self) -> VehicleState {
        if self.in_vehicle {
            VehicleState::Confirmed
        } else if self.detection_started_at_ms.is_some() {
            VehicleState::Candidate
        } else {
            VehicleState::Idle
        }
    }

    /// When the running confirmation timer started, if any.
    pub fn detection_started_at_ms(&self) -> Option<u64> {
        self.detection_started_at_ms
    }

    /// When a confirmed positive judgment last held, if ever.
    pub fn last_positive_at_ms(&self) -> Option<u64> {
        self.last_positive_at_ms
    }

    pub fn config(&self) -> &VehicleDetectorConfig {
        &self.config
    }

    pub fn classifier(&self) -> &VibrationClassifier {
        &self.classifier
    }

    /// Return to `Idle` and forget all timers.
    pub fn reset(&mut self) {
        self.in_vehicle = false;
        self.detection_started_at_ms = None;
        self.last_positive_at_ms = None;
    }
}

impl Default for VehicleDetector {
    fn default() -> Self {
        Self::default_detector()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// 30 km/h in m/s.
    const DRIVING_MPS: f64 = 30.0 / 3.6;

    fn buffer_of(values: &[f32]) -> SampleBuffer {
        let mut buffer = SampleBuffer::new(values.len().max(1));
        buffer.extend(values.iter().copied());
        buffer
    }

    /// Alternating samples around `center` with population std dev `spread`.
    fn alternating(center: f32, spread: f32, count: usize) -> SampleBuffer {
        let values: Vec<f32> = (0..count)
            .map(|i| if i % 2 == 0 { center - spread } else { center + spread })
            .collect();
        buffer_of(&values)
    }

    fn still_history() -> SampleBuffer {
        buffer_of(&[9.81; 30])
    }

    // ------------------------------------------------------------------------
    // Classifier
    // ------------------------------------------------------------------------

    #[test]
    fn test_empty_history_is_not_vibration() {
        let classifier = VibrationClassifier::default();
        assert!(!classifier.classify(&SampleBuffer::new(30)));
    }

    #[test]
    fn test_constant_history_is_not_vibration() {
        let classifier = VibrationClassifier::default();
        assert!(!classifier.classify(&still_history()));
    }

    #[test]
    fn test_band_is_inclusive() {
        let classifier = VibrationClassifier::default();

        let at_min = alternating(10.0, 0.5, 30);
        assert_eq!(at_min.std_dev(), Some(0.5));
        assert!(classifier.classify(&at_min));

        let at_max = alternating(10.0, 5.0, 30);
        assert_eq!(at_max.std_dev(), Some(5.0));
        assert!(classifier.classify(&at_max));
    }

    #[test]
    fn test_outside_band_rejected() {
        let classifier = VibrationClassifier::default();
        assert!(!classifier.classify(&alternating(10.0, 0.49, 30)));
        assert!(!classifier.classify(&alternating(10.0, 5.01, 30)));
    }

    #[test]
    fn test_typical_vibration_accepted() {
        let classifier = VibrationClassifier::default();
        assert!(classifier.classify(&alternating(9.81, 1.5, 30)));
    }

    #[test]
    #[should_panic(expected = "inverted")]
    fn test_inverted_band_is_a_contract_violation() {
        let _ = VibrationClassifier::new(5.0, 0.5);
    }

    // ------------------------------------------------------------------------
    // Signals
    // ------------------------------------------------------------------------

    #[test]
    fn test_signal_combination() {
        let detector = VehicleDetector::default_detector();
        let still = still_history();
        let vibrating = alternating(9.81, 1.0, 30);

        // Speed alone is enough: anything at 8 km/h is also above 0.5 km/h.
        let s = detector.signals(&MotionSnapshot::new(DRIVING_MPS, &still));
        assert!(s.is_speeding && s.is_continuous_movement && !s.has_vibration_pattern);
        assert!(s.is_positive());

        // Vibration without speed is never enough.
        let s = detector.signals(&MotionSnapshot::new(0.0, &vibrating));
        assert!(s.has_vibration_pattern && !s.is_speeding);
        assert!(!s.is_positive());
    }

    #[test]
    fn test_speed_threshold_is_inclusive() {
        let detector = VehicleDetector::default_detector();
        let still = still_history();

        let s = detector.signals(&MotionSnapshot::new(8.0 / 3.6, &still));
        assert!((s.speed_kmh - 8.0).abs() < 1e-9);

        let s = detector.signals(&MotionSnapshot::new(9.0 / 3.6, &still));
        assert!(s.is_speeding);

        let s = detector.signals(&MotionSnapshot::new(7.9 / 3.6, &still));
        assert!(!s.is_speeding);
        assert!(s.is_continuous_movement);
    }

    // ------------------------------------------------------------------------
    // State machine
    // ------------------------------------------------------------------------

    #[test]
    fn test_starts_idle() {
        let detector = VehicleDetector::default_detector();
        assert!(!detector.in_vehicle());
        assert_eq!(detector.state(), VehicleState::Idle);
    }

    #[test]
    fn test_first_negative_settles_idle() {
        let mut detector = VehicleDetector::default_detector();
        let still = still_history();
        assert!(!detector.evaluate(&MotionSnapshot::new(0.0, &still), 0));
        assert_eq!(detector.state(), VehicleState::Idle);
        assert_eq!(detector.last_positive_at_ms(), None);
    }

    #[test]
    fn test_confirm_requires_full_duration() {
        let mut detector = VehicleDetector::default_detector();
        let history = alternating(9.81, 1.0, 30);
        let snapshot = MotionSnapshot::new(DRIVING_MPS, &history);

        assert!(!detector.evaluate(&snapshot, 1_000));
        assert_eq!(detector.state(), VehicleState::Candidate);
        assert!(!detector.evaluate(&snapshot, 3_000));
        assert!(!detector.evaluate(&snapshot, 5_999));
        assert_eq!(detector.state(), VehicleState::Candidate);

        assert!(detector.evaluate(&snapshot, 6_000));
        assert_eq!(detector.state(), VehicleState::Confirmed);
        assert_eq!(detector.last_positive_at_ms(), Some(6_000));
    }

    #[test]
    fn test_release_requires_full_timeout() {
        let mut detector = VehicleDetector::default_detector();
        let history = alternating(9.81, 1.0, 30);
        let driving = MotionSnapshot::new(DRIVING_MPS, &history);
        let still = still_history();
        let stopped = MotionSnapshot::new(0.0, &still);

        detector.evaluate(&driving, 0);
        assert!(detector.evaluate(&driving, 5_000));

        // Stopped at a light: the grace period holds the state.
        assert!(detector.evaluate(&stopped, 9_000));
        assert!(detector.evaluate(&stopped, 14_999));
        assert!(detector.evaluate(&stopped, 15_000));
        assert_eq!(detector.state(), VehicleState::Confirmed);

        assert!(!detector.evaluate(&stopped, 15_001));
        assert_eq!(detector.state(), VehicleState::Idle);
        assert_eq!(detector.detection_started_at_ms(), None);
    }

    #[test]
    fn test_positive_during_grace_refreshes_release_timer() {
        let mut detector = VehicleDetector::default_detector();
        let history = alternating(9.81, 1.0, 30);
        let driving = MotionSnapshot::new(DRIVING_MPS, &history);
        let still = still_history();
        let stopped = MotionSnapshot::new(0.0, &still);

        detector.evaluate(&driving, 0);
        detector.evaluate(&driving, 5_000);
        detector.evaluate(&stopped, 10_000);
        assert!(detector.evaluate(&driving, 12_000));
        assert_eq!(detector.last_positive_at_ms(), Some(12_000));

        // 11s after the first stop but only 10s after the refresh.
        assert!(detector.evaluate(&stopped, 22_000));
        assert!(!detector.evaluate(&stopped, 22_001));
    }

    #[test]
    fn test_repeated_positives_keep_start_timer() {
        let mut detector = VehicleDetector::default_detector();
        let history = alternating(9.81, 1.0, 30);
        let snapshot = MotionSnapshot::new(DRIVING_MPS, &history);

        detector.evaluate(&snapshot, 100);
        for t in (600..=20_100).step_by(500) {
            detector.evaluate(&snapshot, t);
            assert_eq!(detector.detection_started_at_ms(), Some(100));
        }
        assert!(detector.in_vehicle());
        assert_eq!(detector.last_positive_at_ms(), Some(20_100));
    }

    #[test]
    fn test_candidate_drops_on_first_negative() {
        let mut detector = VehicleDetector::default_detector();
        let history = alternating(9.81, 1.0, 30);
        let driving = MotionSnapshot::new(DRIVING_MPS, &history);
        let still = still_history();

        detector.evaluate(&driving, 0);
        detector.evaluate(&driving, 4_000);
        assert_eq!(detector.state(), VehicleState::Candidate);

        // Never confirmed, so there is no grace period to hold on to.
        detector.evaluate(&MotionSnapshot::new(0.0, &still), 4_500);
        assert_eq!(detector.state(), VehicleState::Idle);

        // The timer restarts from scratch.
        detector.evaluate(&driving, 5_000);
        assert!(!detector.evaluate(&driving, 9_999));
        assert!(detector.evaluate(&driving, 10_000));
    }

    #[test]
    fn test_irregular_call_spacing() {
        let mut detector = VehicleDetector::default_detector();
        let history = still_history();
        let driving = MotionSnapshot::new(DRIVING_MPS, &history);

        // Two fixes far apart confirm just as well as many close ones.
        detector.evaluate(&driving, 0);
        assert!(detector.evaluate(&driving, 60_000));
    }

    #[test]
    fn test_clock_going_backwards_does_not_confirm() {
        let mut detector = VehicleDetector::default_detector();
        let history = still_history();
        let driving = MotionSnapshot::new(DRIVING_MPS, &history);

        detector.evaluate(&driving, 10_000);
        assert!(!detector.evaluate(&driving, 2_000));
        assert_eq!(detector.detection_started_at_ms(), Some(10_000));
    }

    #[test]
    fn test_reset() {
        let mut detector = VehicleDetector::default_detector();
        let history = still_history();
        let driving = MotionSnapshot::new(DRIVING_MPS, &history);
        detector.evaluate(&driving, 0);
        detector.evaluate(&driving, 5_000);
        assert!(detector.in_vehicle());

        detector.reset();
        assert_eq!(detector.state(), VehicleState::Idle);
        assert_eq!(detector.last_positive_at_ms(), None);
    }
}
