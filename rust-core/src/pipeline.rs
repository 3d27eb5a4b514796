//! Shared detection pipeline.
//!
//! Sensor events and location fixes come from two independent producers that
//! may run on different threads. Both read-modify-write the same state (the
//! magnitude windows and the vehicle detector), so everything sits behind a
//! single mutex and every entry point holds it only for a few arithmetic
//! operations.
//!
//! # Data flow
//!
//! 1. Accelerometer / gyroscope vectors → magnitude windows, latest vector
//! 2. Location fix → snapshot of speed + accelerometer window → detector
//! 3. Detector output → `watch` channel (`in_vehicle` change notifications)
//! 4. Latest accelerometer vector → `watch` channel (feeds the cue animator)
//!
//! Consumers subscribe; nothing polls the lock from the render loop.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use tokio::sync::watch;

use crate::config::MotionCuesConfig;
use crate::signal::SampleBuffer;
use crate::types::{LocationFix, SensorEvent, SensorKind, Vec3};
use crate::vehicle_detection::{MotionSnapshot, VehicleDetector, VehicleState};

/// Mutable state guarded by the pipeline lock.
#[derive(Debug)]
struct PipelineCore {
    accel_history: SampleBuffer,
    gyro_history: SampleBuffer,
    latest_accel: Vec3,
    latest_gyro: Vec3,
    accel_reported: bool,
    gyro_reported: bool,
    latest_fix: Option<LocationFix>,
    detector: VehicleDetector,
}

/// Cloneable handle to the shared detector state.
#[derive(Clone)]
pub struct DetectionPipeline {
    core: Arc<Mutex<PipelineCore>>,
    in_vehicle_tx: Arc<watch::Sender<bool>>,
    acceleration_tx: Arc<watch::Sender<Vec3>>,
}

impl DetectionPipeline {
    /// Build a pipeline from validated configuration.
    pub fn new(config: &MotionCuesConfig) -> Self {
        let core = PipelineCore {
            accel_history: SampleBuffer::new(config.history_capacity),
            gyro_history: SampleBuffer::new(config.history_capacity),
            latest_accel: [0.0; 3],
            latest_gyro: [0.0; 3],
            accel_reported: false,
            gyro_reported: false,
            latest_fix: None,
            detector: VehicleDetector::new(config.detector, config.classifier),
        };
        let (in_vehicle_tx, _) = watch::channel(false);
        let (acceleration_tx, _) = watch::channel([0.0; 3]);

        Self {
            core: Arc::new(Mutex::new(core)),
            in_vehicle_tx: Arc::new(in_vehicle_tx),
            acceleration_tx: Arc::new(acceleration_tx),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PipelineCore> {
        // Every critical section leaves the core consistent, so a panic in
        // another holder does not invalidate it.
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Route one event to the matching entry point.
    pub fn handle_event(&self, event: SensorEvent) {
        match event {
            SensorEvent::Accelerometer(v) => self.push_accelerometer(v),
            SensorEvent::Gyroscope(v) => self.push_gyroscope(v),
            SensorEvent::Location(fix) => {
                self.on_location_fix(fix);
            }
        }
    }

    /// Record an accelerometer vector (m/s²).
    pub fn push_accelerometer(&self, v: Vec3) {
        let mut core = self.lock();
        if core.accel_history.push_vector(v).is_none() {
            warn!("dropping non-finite accelerometer sample {v:?}");
            return;
        }
        if !core.accel_reported {
            core.accel_reported = true;
            info!("accelerometer reporting");
        }
        core.latest_accel = v;
        self.acceleration_tx.send_replace(v);
    }

    /// Record a gyroscope vector (rad/s).
    pub fn push_gyroscope(&self, v: Vec3) {
        let mut core = self.lock();
        if core.gyro_history.push_vector(v).is_none() {
            warn!("dropping non-finite gyroscope sample {v:?}");
            return;
        }
        if !core.gyro_reported {
            core.gyro_reported = true;
            info!("gyroscope reporting");
        }
        core.latest_gyro = v;
    }

    /// Evaluate the detector against a new location fix.
    ///
    /// Returns the debounced `in_vehicle` state after the evaluation.
    pub fn on_location_fix(&self, fix: LocationFix) -> bool {
        let mut core = self.lock();
        let speed_mps = if fix.speed_mps.is_finite() {
            fix.speed_mps
        } else {
            warn!("location fix at {}ms has no usable speed", fix.timestamp_ms);
            0.0
        };
        core.latest_fix = Some(LocationFix::new(fix.timestamp_ms, speed_mps));

        let core = &mut *core;
        let snapshot = MotionSnapshot::new(speed_mps as f64, &core.accel_history);
        let in_vehicle = core.detector.evaluate(&snapshot, fix.timestamp_ms);

        self.publish(in_vehicle);
        in_vehicle
    }

    fn publish(&self, in_vehicle: bool) {
        let changed = self.in_vehicle_tx.send_if_modified(|current| {
            if *current == in_vehicle {
                false
            } else {
                *current = in_vehicle;
                true
            }
        });
        if changed {
            debug!("published in_vehicle={in_vehicle}");
        }
    }

    /// Subscribe to `in_vehicle` changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.in_vehicle_tx.subscribe()
    }

    /// Subscribe to the latest accelerometer vector.
    pub fn acceleration_feed(&self) -> watch::Receiver<Vec3> {
        self.acceleration_tx.subscribe()
    }

    pub fn in_vehicle(&self) -> bool {
        self.lock().detector.in_vehicle()
    }

    pub fn vehicle_state(&self) -> VehicleState {
        self.lock().detector.state()
    }

    /// Latest accelerometer vector; zero until a sensor has reported.
    pub fn latest_acceleration(&self) -> Vec3 {
        self.lock().latest_accel
    }

    /// Latest gyroscope vector; zero until a sensor has reported.
    pub fn latest_gyroscope(&self) -> Vec3 {
        self.lock().latest_gyro
    }

    /// Whether a sensor has delivered a finite sample since creation or the
    /// last reset. A zero latest vector alone cannot tell a device at rest
    /// from one without the sensor.
    pub fn has_reported(&self, kind: SensorKind) -> bool {
        let core = self.lock();
        match kind {
            SensorKind::Accelerometer => core.accel_reported,
            SensorKind::Gyroscope => core.gyro_reported,
        }
    }

    pub fn latest_fix(&self) -> Option<LocationFix> {
        self.lock().latest_fix
    }

    /// Number of magnitudes currently held for a sensor.
    pub fn history_len(&self, kind: SensorKind) -> usize {
        let core = self.lock();
        match kind {
            SensorKind::Accelerometer => core.accel_history.len(),
            SensorKind::Gyroscope => core.gyro_history.len(),
        }
    }

    /// Standard deviation of a sensor's magnitude window, if it has samples.
    pub fn history_std_dev(&self, kind: SensorKind) -> Option<f64> {
        let core = self.lock();
        match kind {
            SensorKind::Accelerometer => core.accel_history.std_dev(),
            SensorKind::Gyroscope => core.gyro_history.std_dev(),
        }
    }

    /// Forget all samples and timers and publish `in_vehicle = false`.
    pub fn reset(&self) {
        let mut core = self.lock();
        core.accel_history.clear();
        core.gyro_history.clear();
        core.latest_accel = [0.0; 3];
        core.latest_gyro = [0.0; 3];
        core.accel_reported = false;
        core.gyro_reported = false;
        core.latest_fix = None;
        core.detector.reset();
        self.acceleration_tx.send_replace([0.0; 3]);
        self.publish(false);
    }
}
