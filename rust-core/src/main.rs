//! Motion Cues demo
//!
//! Replays a synthetic car ride (pull away, cruise, stop) through the full
//! engine: scripted sensor source → detection pipeline → activation policy →
//! cue animator. Location timestamps are simulated, so twenty-odd seconds of
//! driving replay in about a second of wall time.
//!
//! Usage: `motion-cues [config.json]`. Set `RUST_LOG=debug` for per-fix
//! detector signals.

use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use motion_cues::{
    follow_detector, ActivationHandle, CanvasBounds, CueAnimator, DetectionController,
    DetectionPipeline, LocationFix, MotionCuesConfig, ScriptedSource, SensorEvent,
    SensorKind,
};

const SAMPLES_PER_SECOND: usize = 10;
const SAMPLE_DELAY: Duration = Duration::from_millis(5);
const DRIVE_SECONDS: u64 = 12;
const PARKED_SECONDS: u64 = 12;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => MotionCuesConfig::load(&path)
            .with_context(|| format!("failed to load configuration from {path}"))?,
        None => MotionCuesConfig::default(),
    };
    info!(
        "Motion Cues v{} ({} dots, mode {:?})",
        env!("CARGO_PKG_VERSION"),
        config.effect.dot_count,
        config.effect.activation_mode
    );

    let pipeline = DetectionPipeline::new(&config);
    let activation = ActivationHandle::new(config.effect.activation_mode);

    let bridge_token = CancellationToken::new();
    let bridge = tokio::spawn(follow_detector(
        activation.clone(),
        pipeline.subscribe(),
        bridge_token.clone(),
    ));

    let mut animator = CueAnimator::new(config.field, config.effect);
    animator.set_canvas(CanvasBounds::new(400.0, 300.0));
    animator.start(activation.subscribe(), pipeline.acceleration_feed());

    let script = synthetic_ride();
    let replay_time = SAMPLE_DELAY * script.len() as u32;
    let mut detection =
        DetectionController::new(pipeline.clone(), Box::new(ScriptedSource::new(script)));
    detection.start()?;

    let mut report = tokio::time::interval(Duration::from_millis(200));
    let deadline = tokio::time::sleep(replay_time + Duration::from_millis(300));
    tokio::pin!(deadline);
    let frames = animator.frames();

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = report.tick() => {
                let fix = pipeline.latest_fix();
                let frame = frames.borrow();
                info!(
                    "t={:>5}ms state={:?} effect={} frames={} dots={}{}",
                    fix.map_or(0, |f| f.timestamp_ms),
                    pipeline.vehicle_state(),
                    activation.is_active(),
                    animator.frames_rendered(),
                    frame.len(),
                    frame
                        .first()
                        .map(|d| format!(" first=({:.1}, {:.1})", d.position.0, d.position.1))
                        .unwrap_or_default(),
                );
            }
        }
    }

    if !pipeline.has_reported(SensorKind::Accelerometer) {
        warn!("no accelerometer samples arrived; the cues had nothing to follow");
    }

    detection.stop().await?;
    animator.stop().await?;
    bridge_token.cancel();
    bridge.await.context("activation bridge failed to join")?;

    info!("rendered {} frames in total", animator.frames_rendered());
    Ok(())
}

/// Accelerometer samples with road vibration and a gentle lateral sway while
/// moving, a flat 1 g while parked, and one location fix per simulated second.
fn synthetic_ride() -> Vec<(Duration, SensorEvent)> {
    let mut script = Vec::new();
    for second in 0..DRIVE_SECONDS + PARKED_SECONDS {
        let driving = second < DRIVE_SECONDS;
        for i in 0..SAMPLES_PER_SECOND {
            let sample = if driving {
                let bump = if i % 2 == 0 { -1.2 } else { 1.2 };
                let sway = if (second / 3) % 2 == 0 { 1.5 } else { -1.5 };
                [sway, 0.3, 9.8 + bump]
            } else {
                [0.0, 0.0, 9.8]
            };
            script.push((SAMPLE_DELAY, SensorEvent::Accelerometer(sample)));
        }
        let speed_mps = if driving { 13.9 } else { 0.0 };
        script.push((
            Duration::ZERO,
            SensorEvent::Location(LocationFix::new(second * 1_000, speed_mps)),
        ));
    }
    script
}
