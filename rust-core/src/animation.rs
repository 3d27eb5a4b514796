//! Frame loop for the motion cue dots.
//!
//! The animator owns a [`ParticleField`] inside a tokio task. It ticks every
//! [`FRAME_INTERVAL`] only while the effect-active watch says `true`; the rest
//! of the time it sleeps on that watch and costs nothing.
//!
//! Inputs are `watch` channels so the latest value always wins:
//! - effect active flag (from the activation policy)
//! - latest accelerometer vector (from the detection pipeline)
//! - effect configuration and canvas bounds (from the host)
//!
//! Each tick publishes a fresh `Vec<DotRenderState>`. When the effect goes
//! inactive the loop publishes an empty frame and drops its dots, so the next
//! activation starts from a clean respawn.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info};
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::EffectConfiguration;
use crate::particles::{FieldConfig, ParticleField};
use crate::types::{CanvasBounds, DotRenderState, Vec3};

/// Nominal frame period (~60 Hz).
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

const FRAME_MS: u32 = 16;

/// Receivers and publishers the frame loop works with.
struct FrameChannels {
    active: watch::Receiver<bool>,
    acceleration: watch::Receiver<Vec3>,
    effect: watch::Receiver<EffectConfiguration>,
    canvas: watch::Receiver<CanvasBounds>,
    frames: Arc<watch::Sender<Vec<DotRenderState>>>,
    frames_rendered: Arc<AtomicU64>,
}

/// Drives the particle field while the effect is active.
pub struct CueAnimator {
    field_config: FieldConfig,
    effect_tx: watch::Sender<EffectConfiguration>,
    canvas_tx: watch::Sender<CanvasBounds>,
    frames_tx: Arc<watch::Sender<Vec<DotRenderState>>>,
    frames_rendered: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl CueAnimator {
    pub fn new(field_config: FieldConfig, effect: EffectConfiguration) -> Self {
        let (effect_tx, _) = watch::channel(effect);
        let (canvas_tx, _) = watch::channel(CanvasBounds::default());
        let (frames_tx, _) = watch::channel(Vec::new());

        Self {
            field_config,
            effect_tx,
            canvas_tx,
            frames_tx: Arc::new(frames_tx),
            frames_rendered: Arc::new(AtomicU64::new(0)),
            handle: None,
            cancel_token: None,
        }
    }

    /// True while the frame loop is alive. The loop also ends on its own
    /// when the effect-active channel closes.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Spawn the frame loop. A no-op when already running.
    pub fn start(&mut self, active: watch::Receiver<bool>, acceleration: watch::Receiver<Vec3>) {
        let field = ParticleField::new(self.field_config, &self.effect_tx.borrow());
        self.start_with_field(field, active, acceleration);
    }

    /// Like [`CueAnimator::start`], with a caller-built field.
    pub fn start_with_field<R>(
        &mut self,
        field: ParticleField<R>,
        active: watch::Receiver<bool>,
        acceleration: watch::Receiver<Vec3>,
    ) where
        R: Rng + Send + 'static,
    {
        if let Some(handle) = &self.handle {
            if !handle.is_finished() {
                debug!("cue animator already running");
                return;
            }
            debug!("cue animation loop exited on its own, restarting");
            self.handle = None;
            self.cancel_token = None;
        }

        let channels = FrameChannels {
            active,
            acceleration,
            effect: self.effect_tx.subscribe(),
            canvas: self.canvas_tx.subscribe(),
            frames: Arc::clone(&self.frames_tx),
            frames_rendered: Arc::clone(&self.frames_rendered),
        };
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(animation_loop(field, channels, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        info!("cue animator started");
    }

    /// Replace the effect configuration; picked up on the next frame.
    pub fn set_effect(&self, effect: EffectConfiguration) {
        self.effect_tx.send_replace(effect);
    }

    /// Report a new canvas size; picked up on the next frame.
    pub fn set_canvas(&self, bounds: CanvasBounds) {
        self.canvas_tx.send_replace(bounds);
    }

    pub fn effect(&self) -> EffectConfiguration {
        *self.effect_tx.borrow()
    }

    /// Subscribe to rendered frames.
    pub fn frames(&self) -> watch::Receiver<Vec<DotRenderState>> {
        self.frames_tx.subscribe()
    }

    /// Number of ticks that have published a frame since creation.
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    /// Stop the frame loop. A no-op when stopped.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("cue animation task failed to join")?;
            info!("cue animator stopped");
        }
        Ok(())
    }
}

impl Drop for CueAnimator {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }
}

async fn animation_loop<R: Rng>(
    mut field: ParticleField<R>,
    mut ch: FrameChannels,
    cancel_token: CancellationToken,
) {
    loop {
        // Idle until the effect turns on.
        while !*ch.active.borrow_and_update() {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => return,
                changed = ch.active.changed() => {
                    if changed.is_err() {
                        debug!("effect-active channel closed while idle");
                        return;
                    }
                }
            }
        }

        info!("motion cues on");
        let mut ticker = tokio::time::interval(FRAME_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let keep_going = loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => break false,
                changed = ch.active.changed() => {
                    if changed.is_err() {
                        break false;
                    }
                    if !*ch.active.borrow_and_update() {
                        break true;
                    }
                }
                _ = ticker.tick() => render_frame(&mut field, &mut ch),
            }
        };

        field.reset();
        ch.frames.send_replace(Vec::new());
        info!("motion cues off");

        if !keep_going {
            return;
        }
    }
}

fn render_frame<R: Rng>(field: &mut ParticleField<R>, ch: &mut FrameChannels) {
    if ch.effect.has_changed().unwrap_or(false) {
        let effect = *ch.effect.borrow_and_update();
        field.configure(&effect);
    }
    let acceleration = *ch.acceleration.borrow();
    let bounds = *ch.canvas.borrow();

    field.step(FRAME_MS, acceleration, bounds);
    ch.frames.send_replace(field.render_states());
    ch.frames_rendered.fetch_add(1, Ordering::Relaxed);
}
