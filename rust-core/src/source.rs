//! Motion sources and the detection task.
//!
//! Platform sensor listeners are replaced by a message-passing boundary: a
//! [`MotionSource`] pushes typed [`SensorEvent`]s into an mpsc channel, and a
//! single detection task drains that channel into the shared
//! [`DetectionPipeline`]. The core never touches a platform sensor API.
//!
//! [`DetectionController`] owns that task. Starting it twice or stopping it
//! twice is harmless; hosts tend to call both from lifecycle callbacks that
//! fire more often than expected.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::pipeline::DetectionPipeline;
use crate::types::SensorEvent;

/// Capacity of the event channel between a source and the detection task.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Something that can deliver sensor events.
pub trait MotionSource: Send {
    /// Start delivering events into `sink`.
    ///
    /// Called once per controller start; a source may be started again after
    /// [`MotionSource::stop`].
    fn start(&mut self, sink: mpsc::Sender<SensorEvent>) -> Result<()>;

    /// Stop delivering events. Must be safe to call when already stopped.
    fn stop(&mut self);
}

// ============================================================================
// PUSH SOURCE
// ============================================================================

/// Source fed by the host from platform callbacks.
///
/// The host keeps a [`SensorHandle`] and pushes events into it from whatever
/// thread its sensor and location callbacks run on. While the source is
/// stopped, pushed events are dropped.
#[derive(Default)]
pub struct PushSource {
    sink: Arc<Mutex<Option<mpsc::Sender<SensorEvent>>>>,
}

/// Cloneable, thread-safe entry point into a [`PushSource`].
#[derive(Clone)]
pub struct SensorHandle {
    sink: Arc<Mutex<Option<mpsc::Sender<SensorEvent>>>>,
}

impl PushSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> SensorHandle {
        SensorHandle {
            sink: Arc::clone(&self.sink),
        }
    }
}

impl MotionSource for PushSource {
    fn start(&mut self, sink: mpsc::Sender<SensorEvent>) -> Result<()> {
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

impl SensorHandle {
    /// Push an event without blocking.
    ///
    /// Returns `false` when the event was dropped because detection is
    /// stopped or the channel is full. Sensor callbacks must never block.
    pub fn push(&self, event: SensorEvent) -> bool {
        let guard = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(sink) => sink.try_send(event).is_ok(),
            None => false,
        }
    }
}

// ============================================================================
// SCRIPTED SOURCE
// ============================================================================

/// Replays a fixed list of events, each after a delay from the previous one.
///
/// Used for demos and tests; location fixes carry their own timestamps, so
/// the replay speed does not change what the detector sees.
pub struct ScriptedSource {
    script: Arc<Vec<(Duration, SensorEvent)>>,
    task: Option<JoinHandle<()>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<(Duration, SensorEvent)>) -> Self {
        Self {
            script: Arc::new(script),
            task: None,
        }
    }

    pub fn len(&self) -> usize {
        self.script.len()
    }

    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }
}

impl MotionSource for ScriptedSource {
    fn start(&mut self, sink: mpsc::Sender<SensorEvent>) -> Result<()> {
        self.stop();
        let script = Arc::clone(&self.script);
        self.task = Some(tokio::spawn(async move {
            for (delay, event) in script.iter() {
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
                if sink.send(*event).await.is_err() {
                    break;
                }
            }
            debug!("scripted source finished");
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ============================================================================
// DETECTION TASK
// ============================================================================

/// Drain `events` into `pipeline` until cancelled or the source hangs up.
pub async fn detection_loop(
    mut events: mpsc::Receiver<SensorEvent>,
    pipeline: DetectionPipeline,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                info!("detection loop shutting down");
                break;
            }
            event = events.recv() => match event {
                Some(event) => pipeline.handle_event(event),
                None => {
                    info!("motion source closed, detection loop exiting");
                    break;
                }
            }
        }
    }
}

/// Owns the source and the detection task.
pub struct DetectionController {
    pipeline: DetectionPipeline,
    source: Box<dyn MotionSource>,
    channel_capacity: usize,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl DetectionController {
    pub fn new(pipeline: DetectionPipeline, source: Box<dyn MotionSource>) -> Self {
        Self {
            pipeline,
            source,
            channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            handle: None,
            cancel_token: None,
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn pipeline(&self) -> &DetectionPipeline {
        &self.pipeline
    }

    /// True while the detection task is alive. The task also ends on its
    /// own when the source hangs up.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Start detection. A no-op when already running.
    pub fn start(&mut self) -> Result<()> {
        if let Some(handle) = &self.handle {
            if !handle.is_finished() {
                debug!("detection already running");
                return Ok(());
            }
            debug!("detection loop exited on its own, restarting");
            self.handle = None;
            self.cancel_token = None;
            self.source.stop();
        }

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        self.source
            .start(tx)
            .context("failed to start motion source")?;

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(detection_loop(
            rx,
            self.pipeline.clone(),
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        info!("vehicle detection started");
        Ok(())
    }

    /// Stop detection and release the vehicle state. A no-op when stopped.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        self.source.stop();
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        let joined = handle.await;
        // Nothing is detecting any more, so nothing may claim we are driving.
        self.pipeline.reset();
        info!("vehicle detection stopped");

        joined.context("detection loop task failed to join")
    }
}

impl Drop for DetectionController {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            warn!("detection controller dropped while running");
            token.cancel();
        }
        self.source.stop();
    }
}
