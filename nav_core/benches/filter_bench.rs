use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::{UnitQuaternion, Vector3};
use nav_core::{
    AngularRateSample, BeaconMap, BeaconRow, Detection, DetectionBatch, EstimatorChoice,
    FilterConfig, FilterContext, ParticleConfig,
};

fn grid_beacons() -> BeaconMap {
    let rows = (0..12).map(|i| {
        let x = (i % 4) as f64;
        let y = ((i / 4) % 3) as f64;
        BeaconRow::new(i, x, y, if i % 2 == 0 { 0.0 } else { 1.5 })
    });
    BeaconMap::load(rows).expect("valid grid")
}

fn make_batch(beacons: &BeaconMap, truth: Vector3<f64>, n: usize, t: f64) -> DetectionBatch {
    let detections = beacons
        .iter()
        .take(n)
        .map(|b| Detection {
            beacon_id: b.id,
            range: (truth - b.position).norm(),
            orientation: UnitQuaternion::identity(),
        })
        .collect();
    DetectionBatch {
        timestamp: t,
        detections,
    }
}

fn run_cycles(ctx: &mut FilterContext, beacons: &BeaconMap, n: usize) {
    let truth = Vector3::new(1.4, 0.9, 0.7);
    for k in 0..10 {
        let t = k as f64 * 0.1;
        for j in 0..5 {
            ctx.on_angular_rate(&AngularRateSample {
                timestamp: t + j as f64 * 0.02,
                rate: Vector3::new(0.0, 0.0, 0.05),
            });
        }
        black_box(ctx.on_detections(&make_batch(beacons, truth, n, t)));
    }
}

fn bench_filters(c: &mut Criterion) {
    let beacons = grid_beacons();
    let mut group = c.benchmark_group("filter");

    for n in [3, 6, 12] {
        group.bench_function(format!("ekf_{n}_beacons"), |b| {
            b.iter(|| {
                let mut ctx = FilterContext::new(FilterConfig::default(), beacons.clone()).unwrap();
                run_cycles(&mut ctx, &beacons, n);
            });
        });
    }

    for particles in [500, 2000] {
        let config = FilterConfig {
            estimator: EstimatorChoice::Particle,
            particle: ParticleConfig {
                num_particles: particles,
                ..Default::default()
            },
            ..Default::default()
        };
        group.bench_function(format!("particle_{particles}"), |b| {
            b.iter(|| {
                let mut ctx = FilterContext::new(config.clone(), beacons.clone()).unwrap();
                run_cycles(&mut ctx, &beacons, 6);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_filters);
criterion_main!(benches);
