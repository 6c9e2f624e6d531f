// benches/bench_move_vehicles.rs
use criterion::{
    black_box, criterion_group, criterion_main, AxisScale, Criterion, PlotConfiguration,
};
use crossing_sim::config::{SimulationConfig, WeatherMode};
use crossing_sim::simulation_engine::simulation::Simulation;
use crossing_sim::simulation_engine::weather::WeatherKind;
use std::time::Duration;

const TICK: Duration = Duration::from_millis(33);

/// A simulation that has already filled its lanes for a few seconds.
fn warmed_up(lanes_per_direction: usize, capacity: usize) -> (Simulation, Duration) {
    let config = SimulationConfig {
        horizontal_lanes: lanes_per_direction,
        vertical_lanes_first: lanes_per_direction,
        vertical_lanes_second: lanes_per_direction,
        lane_capacity: capacity,
        weather: WeatherMode::Fixed(WeatherKind::Sunny),
        seed: Some(7),
        ..SimulationConfig::default()
    };
    let simulation = Simulation::new(config).expect("valid bench config");
    let mut now = Duration::ZERO;
    for _ in 0..150 {
        now += TICK;
        simulation.motion_tick(now);
    }
    (simulation, now)
}

fn bench_motion_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("motion_tick");

    group.sample_size(100);
    group.measurement_time(Duration::from_secs(5));
    group.warm_up_time(Duration::from_secs(2));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Linear));

    for &(lanes, capacity) in [(1, 5), (2, 10), (4, 20)].iter() {
        group.bench_function(format!("lanes_{}_capacity_{}", lanes, capacity), |b| {
            let (simulation, mut now) = warmed_up(lanes, capacity);
            b.iter(|| {
                now += TICK;
                black_box(simulation.motion_tick(now));
            });
        });
    }
    group.finish();
}

fn bench_weather_change(c: &mut Criterion) {
    let mut group = c.benchmark_group("weather_change");
    group.sample_size(50);

    group.bench_function("retarget_all_vehicles", |b| {
        let (simulation, now) = warmed_up(4, 20);
        let mut kind = WeatherKind::Sunny;
        b.iter(|| {
            kind = kind.next();
            simulation.change_weather(kind, now);
        });
    });
    group.finish();
}

criterion_group!(benches, bench_motion_tick, bench_weather_change);
criterion_main!(benches);
