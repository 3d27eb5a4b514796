/// Basic usage example: feed a ride into the detector, step the dots
use motion_cues::{
    resolve_effect_active, ActivationMode, CanvasBounds, DetectionPipeline, DotSizeClass,
    EffectConfiguration, LocationFix, MotionCuesConfig, ParticleField,
};

fn main() {
    println!("=== Motion Cues: Basic Example ===\n");

    let config = MotionCuesConfig::default();
    let pipeline = DetectionPipeline::new(&config);

    // Simulated ride: (fix timestamp ms, speed m/s, road vibration amplitude)
    let ride = vec![
        // Pulling away
        (0, 3.0, 0.8),
        (3_500, 9.0, 1.0),
        (7_200, 14.0, 1.2),
        // Cruising
        (11_000, 16.0, 1.1),
        (15_100, 15.5, 1.0),
        // Parked, engine off
        (19_000, 0.0, 0.0),
        (23_500, 0.0, 0.0),
        (27_800, 0.0, 0.0),
    ];

    println!("Processing {} location fixes...\n", ride.len());

    let effect = EffectConfiguration {
        dot_count: 6,
        dot_size: DotSizeClass::Medium,
        ..EffectConfiguration::default()
    };
    let mut field = ParticleField::new(config.field, &effect);
    let canvas = CanvasBounds::new(400.0, 300.0);

    for (timestamp, speed_mps, amplitude) in ride {
        for i in 0..30 {
            let bump = if i % 2 == 0 { -amplitude } else { amplitude };
            pipeline.push_accelerometer([0.4, 0.0, 9.81 + bump]);
        }

        let in_vehicle = pipeline.on_location_fix(LocationFix::new(timestamp, speed_mps));
        let active = resolve_effect_active(ActivationMode::Auto, in_vehicle, false);

        println!(
            "t={:>6}ms speed={:>5.1}km/h state={:?} effect={}",
            timestamp,
            speed_mps * 3.6,
            pipeline.vehicle_state(),
            if active { "on" } else { "off" }
        );

        if active {
            // One second of frames while the effect is on.
            for _ in 0..60 {
                field.step(16, pipeline.latest_acceleration(), canvas);
            }
            print_dots(&field);
        } else {
            field.reset();
        }
    }

    println!("\n=== Summary ===");
    println!("Final state: {:?}", pipeline.vehicle_state());
}

fn print_dots(field: &ParticleField) {
    for dot in field.dots() {
        println!(
            "    dot {} at ({:>5.1}, {:>5.1}) speed {:.2}",
            dot.id,
            dot.position.0,
            dot.position.1,
            dot.speed()
        );
    }
}
