//! Motion cue particle field.
//!
//! A handful of dots drift over the screen and get pushed around by the live
//! device acceleration, so the eyes see the motion the inner ear feels. This
//! is a perceptual cue, not a physics engine: integration is a unit-step
//! Euler update per frame and every constant is tuned by eye.
//!
//! Per tick, each dot independently:
//! 1. adds the scaled external acceleration to its velocity
//! 2. damps its velocity
//! 3. clamps its speed
//! 4. moves by its velocity
//! 5. bounces inelastically off the canvas edges
//! 6. picks up a tiny random perturbation so the field never freezes
//!
//! Dots never interact with each other. A dot that goes numerically bad is
//! respawned on its own; the rest of the tick carries on.

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::EffectConfiguration;
use crate::types::{CanvasBounds, DotRenderState, Rgba, Vec3};

/// Tunables for the dot integration.
///
/// The defaults were tuned by eye; changing them changes how the cue feels,
/// not whether it is correct.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldConfig {
    /// Factor applied to the external acceleration before it is added to
    /// each dot's velocity.
    pub sensitivity: f32,
    /// Per-tick velocity multiplier, in (0, 1].
    pub damping: f32,
    /// Speed cap in units per tick.
    pub max_speed: f32,
    /// Fraction of the normal velocity kept after hitting an edge.
    pub restitution: f32,
    /// Half-width of the uniform random velocity perturbation per axis.
    pub jitter: f32,
    /// Half-width of the uniform random initial velocity per axis.
    pub initial_speed: f32,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            sensitivity: 0.1,
            damping: 0.95,
            max_speed: 8.0,
            restitution: 0.8,
            jitter: 0.025,
            initial_speed: 1.0,
        }
    }
}

/// One animated dot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dot {
    pub id: u32,
    pub position: (f32, f32),
    pub radius: f32,
    pub color: Rgba,
    pub velocity: (f32, f32),
    /// Acceleration applied on the most recent tick.
    pub acceleration: (f32, f32),
}

impl Dot {
    /// Current speed, units per tick.
    pub fn speed(&self) -> f32 {
        self.velocity.0.hypot(self.velocity.1)
    }

    fn is_finite(&self) -> bool {
        self.position.0.is_finite()
            && self.position.1.is_finite()
            && self.velocity.0.is_finite()
            && self.velocity.1.is_finite()
    }

    pub fn render_state(&self) -> DotRenderState {
        DotRenderState {
            position: self.position,
            radius: self.radius,
            color: self.color,
        }
    }
}

/// The dot collection plus the canvas it was spawned for.
pub struct ParticleField<R = StdRng> {
    config: FieldConfig,

    // Requested appearance
    dot_count: usize,
    radius: f32,
    color: Rgba,

    dots: Vec<Dot>,
    bounds: Option<CanvasBounds>,
    rng: R,
}

impl ParticleField<StdRng> {
    /// Create a field seeded from OS entropy.
    pub fn new(config: FieldConfig, effect: &EffectConfiguration) -> Self {
        Self::with_rng(config, effect, StdRng::from_entropy())
    }
}

impl<R: Rng> ParticleField<R> {
    /// Create a field with a caller-supplied random source.
    pub fn with_rng(config: FieldConfig, effect: &EffectConfiguration, rng: R) -> Self {
        Self {
            config,
            dot_count: effect.dot_count as usize,
            radius: effect.dot_size.radius(),
            color: effect.dot_color,
            dots: Vec::new(),
            bounds: None,
            rng,
        }
    }

    /// Apply a new effect configuration.
    ///
    /// A new dot count takes effect as a full respawn on the next step.
    /// Color and size changes restyle the existing dots in place.
    pub fn configure(&mut self, effect: &EffectConfiguration) {
        self.dot_count = effect.dot_count as usize;
        self.radius = effect.dot_size.radius();
        self.color = effect.dot_color;
        for dot in &mut self.dots {
            dot.radius = self.radius;
            dot.color = self.color;
        }
    }

    /// Advance the field by one frame and return the dots.
    ///
    /// `dt_ms` only gates the step: integration is fixed-step per frame, so a
    /// zero interval leaves the field untouched. A canvas that has not been
    /// measured yet (non-positive size) is skipped as well.
    pub fn step(&mut self, dt_ms: u32, external_acceleration: Vec3, bounds: CanvasBounds) -> &[Dot] {
        if dt_ms == 0 || !bounds.is_drawable() {
            return &self.dots;
        }

        if self.bounds != Some(bounds) || self.dots.len() != self.dot_count {
            self.respawn(bounds);
        }

        let accel = self.scaled_acceleration(external_acceleration);
        let mut faulted = 0usize;
        for i in 0..self.dots.len() {
            let mut dot = self.dots[i];
            integrate(&mut dot, accel, bounds, &self.config, &mut self.rng);
            if !dot.is_finite() {
                dot = spawn_dot(dot.id, bounds, self.radius, self.color, 0.0, &mut self.rng);
                faulted += 1;
            }
            self.dots[i] = dot;
        }
        if faulted > 0 {
            warn!("respawned {faulted} dot(s) after a numerical fault");
        }

        &self.dots
    }

    fn scaled_acceleration(&self, external: Vec3) -> (f32, f32) {
        let (x, y) = (external[0], external[1]);
        if !x.is_finite() || !y.is_finite() {
            // Treated like a missing sensor: no push this frame.
            warn!("ignoring non-finite external acceleration ({x}, {y})");
            return (0.0, 0.0);
        }
        (x * self.config.sensitivity, y * self.config.sensitivity)
    }

    fn respawn(&mut self, bounds: CanvasBounds) {
        debug!(
            "respawning {} dots for {}x{} canvas",
            self.dot_count, bounds.width, bounds.height
        );
        let (radius, color, initial_speed) = (self.radius, self.color, self.config.initial_speed);
        let rng = &mut self.rng;
        self.dots = (0..self.dot_count)
            .map(|i| spawn_dot(i as u32, bounds, radius, color, initial_speed, rng))
            .collect();
        self.bounds = Some(bounds);
    }

    /// Drop every dot; the next step respawns from scratch.
    pub fn reset(&mut self) {
        self.dots.clear();
        self.bounds = None;
    }

    pub fn dots(&self) -> &[Dot] {
        &self.dots
    }

    /// Snapshot of what the renderer should draw.
    pub fn render_states(&self) -> Vec<DotRenderState> {
        self.dots.iter().map(Dot::render_state).collect()
    }

    /// Canvas the current dots were spawned for.
    pub fn bounds(&self) -> Option<CanvasBounds> {
        self.bounds
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }
}

/// One fixed-step update of a single dot.
fn integrate<R: Rng>(
    dot: &mut Dot,
    accel: (f32, f32),
    bounds: CanvasBounds,
    config: &FieldConfig,
    rng: &mut R,
) {
    dot.acceleration = accel;
    dot.velocity.0 += accel.0;
    dot.velocity.1 += accel.1;

    dot.velocity.0 *= config.damping;
    dot.velocity.1 *= config.damping;

    if dot.speed() > config.max_speed {
        // Normalize by the larger component first; the direction has to
        // survive velocities whose magnitude does not fit in an f32.
        let largest = dot.velocity.0.abs().max(dot.velocity.1.abs());
        let (ux, uy) = (dot.velocity.0 / largest, dot.velocity.1 / largest);
        let scale = config.max_speed / ux.hypot(uy);
        dot.velocity = (ux * scale, uy * scale);
    }

    dot.position.0 += dot.velocity.0;
    dot.position.1 += dot.velocity.1;

    bounce(
        &mut dot.position.0,
        &mut dot.velocity.0,
        dot.radius,
        bounds.width,
        config.restitution,
    );
    bounce(
        &mut dot.position.1,
        &mut dot.velocity.1,
        dot.radius,
        bounds.height,
        config.restitution,
    );

    if config.jitter > 0.0 {
        dot.velocity.0 += symmetric(rng, config.jitter);
        dot.velocity.1 += symmetric(rng, config.jitter);
    }
}

/// Clamp one axis to `[radius, extent - radius]`, reflecting the velocity.
fn bounce(position: &mut f32, velocity: &mut f32, radius: f32, extent: f32, restitution: f32) {
    if *position - radius < 0.0 {
        *position = radius;
        *velocity = -*velocity * restitution;
    } else if *position + radius > extent {
        *position = extent - radius;
        *velocity = -*velocity * restitution;
    }
}

fn spawn_dot<R: Rng>(
    id: u32,
    bounds: CanvasBounds,
    radius: f32,
    color: Rgba,
    initial_speed: f32,
    rng: &mut R,
) -> Dot {
    let velocity = if initial_speed > 0.0 {
        (symmetric(rng, initial_speed), symmetric(rng, initial_speed))
    } else {
        (0.0, 0.0)
    };
    Dot {
        id,
        position: (
            spawn_coordinate(rng, bounds.width, radius),
            spawn_coordinate(rng, bounds.height, radius),
        ),
        radius,
        color,
        velocity,
        acceleration: (0.0, 0.0),
    }
}

/// Uniform coordinate that keeps the whole dot on the canvas when it fits.
///
/// Scales a unit sample instead of using `gen_range`, whose float sampler
/// panics when the span overflows (any finite canvas is drawable).
fn spawn_coordinate<R: Rng>(rng: &mut R, extent: f32, radius: f32) -> f32 {
    if extent > 2.0 * radius {
        radius + rng.gen::<f32>() * (extent - 2.0 * radius)
    } else {
        rng.gen::<f32>() * extent
    }
}

/// Uniform sample in `[-half_width, half_width)`, safe for any finite width.
fn symmetric<R: Rng>(rng: &mut R, half_width: f32) -> f32 {
    (rng.gen::<f32>() * 2.0 - 1.0) * half_width
}

// ============================================================================
// TESTS
// ============================================================================
