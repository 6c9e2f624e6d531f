use rand::rngs::SmallRng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};

use crate::config::{ConfigError, LightAlgorithm, SimulationConfig, WeatherMode};
use crate::control_system::traffic_light_controller::TrafficLightController;
use crate::shared_data::{lock_or_recover, run_guarded, EventSink, SimEvent, SimulationReport};
use crate::simulation_engine::clock::SimClock;
use crate::simulation_engine::intersections::SharedIntersection;
use crate::simulation_engine::lanes::SharedLane;
use crate::simulation_engine::layout::{create_intersections, create_lanes, rng_for};
use crate::simulation_engine::vehicles::VehicleId;
use crate::simulation_engine::weather::{SharedWeather, WeatherKind};

/// What one motion tick did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickSummary {
    pub created: Vec<VehicleId>,
    pub exited: Vec<VehicleId>,
    /// The adaptive policy asked the light task for a switch.
    pub lights_requested: bool,
}

/// Owns the lanes, crossings and weather of one run and the three schedules
/// that drive them.
pub struct Simulation {
    config: SimulationConfig,
    intersections: Vec<SharedIntersection>,
    lanes: Vec<SharedLane>,
    weather: SharedWeather,
    light_trigger: Arc<Notify>,
    events: EventSink,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let intersections = create_intersections(&config);
        let lanes = create_lanes(&config, &intersections);
        let weather = SharedWeather::new(config.initial_weather());
        log::info!(
            "simulation set up: {} lane(s), {} crossing(s), {:?} lights, {:?} weather",
            lanes.len(),
            intersections.len(),
            config.light_algorithm,
            config.weather
        );
        Ok(Self {
            config,
            intersections,
            lanes,
            weather,
            light_trigger: Arc::new(Notify::new()),
            events: EventSink::disconnected(),
        })
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn lanes(&self) -> &[SharedLane] {
        &self.lanes
    }

    pub fn intersections(&self) -> &[SharedIntersection] {
        &self.intersections
    }

    pub fn weather(&self) -> &SharedWeather {
        &self.weather
    }

    /// Raised by the motion tick when the adaptive policy wants a switch.
    pub fn light_trigger(&self) -> Arc<Notify> {
        Arc::clone(&self.light_trigger)
    }

    /// Moves every lane once, then offers every lane a new vehicle.
    pub fn motion_tick(&self, now: Duration) -> TickSummary {
        let weather = self.weather.current();
        let adaptive = self.config.light_algorithm == LightAlgorithm::Adaptive;
        let mut summary = TickSummary::default();
        let mut congested = false;

        for lane in &self.lanes {
            let (id, exited, above) = {
                let mut lane = lock_or_recover(lane);
                let exited = lane.move_vehicles(&weather, now);
                (lane.id(), exited, lane.is_above_threshold())
            };
            congested |= adaptive && above;
            if !exited.is_empty() {
                self.events.emit(SimEvent::VehiclesExited {
                    lane: id,
                    vehicles: exited.clone(),
                    at: now,
                });
                summary.exited.extend(exited);
            }
        }

        for lane in &self.lanes {
            let created = lock_or_recover(lane).add_vehicle(&weather, now);
            if let Some(handle) = created {
                let vehicle = lock_or_recover(&handle);
                self.events.emit(SimEvent::VehicleCreated {
                    vehicle: vehicle.id(),
                    position: vehicle.position(),
                    size: vehicle.size(),
                    at: now,
                });
                summary.created.push(vehicle.id());
            }
        }

        if congested {
            for lane in &self.lanes {
                lock_or_recover(lane).reset_counter();
            }
            self.light_trigger.notify_one();
            summary.lights_requested = true;
            log::info!("congestion threshold passed at {:?}, requesting a light switch", now);
        }
        summary
    }

    /// Installs a new weather and retargets every vehicle already on the road.
    pub fn change_weather(&self, kind: WeatherKind, now: Duration) {
        let previous = self.weather.replace(kind);
        let active = self.weather.current();
        for lane in &self.lanes {
            lock_or_recover(lane).change_vehicle_speeds(&active, now);
        }
        log::info!("weather changed from {} to {} at {:?}", previous.kind, kind, now);
        self.events.emit(SimEvent::WeatherChanged { weather: kind, at: now });
    }

    async fn run_motion(self: Arc<Self>, clock: SimClock) {
        let period = self.config.tick_period();
        let mut ticker = interval_at(clock.started_at() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        for _ in 0..self.config.total_ticks() {
            ticker.tick().await;
            let now = clock.now();
            run_guarded("motion", || self.motion_tick(now));
        }
        log::debug!("motion countdown finished at {:?}", clock.now());
    }

    async fn run_weather(
        self: Arc<Self>,
        clock: SimClock,
        period: Duration,
        mut rng: SmallRng,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let end = self.config.duration();
        let mut current = self.weather.current().kind;
        let mut ticker = interval_at(clock.started_at() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    let now = clock.now();
                    if now >= end {
                        break;
                    }
                    current = match self.config.weather {
                        WeatherMode::RoundRobin => current.next(),
                        WeatherMode::Random => WeatherKind::random(&mut rng),
                        WeatherMode::Fixed(kind) => kind,
                    };
                    run_guarded("weather", || self.change_weather(current, now));
                }
            }
        }
        log::debug!("weather task stopped");
    }

    /// Runs the whole simulation and returns its final report.
    ///
    /// The motion countdown decides when the run ends; the light and weather
    /// schedules are then told to stop and are joined before the report is built.
    pub async fn run(self) -> SimulationReport {
        let sim = Arc::new(self);
        let clock = SimClock::start();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = sim.config.clone();
        log::info!("simulation started for {:?}", config.duration());

        let controller = TrafficLightController::new(
            sim.intersections.clone(),
            config.amber(),
            clock,
            sim.events.clone(),
        );
        let mut schedules: Vec<(&str, JoinHandle<()>)> = Vec::new();
        let lights = match config.light_algorithm {
            LightAlgorithm::FixedTime => tokio::spawn(controller.run_fixed_time(
                config.fixed_first_switch(),
                config.fixed_switch_period(),
                config.duration(),
                shutdown_rx.clone(),
            )),
            LightAlgorithm::Adaptive => {
                tokio::spawn(controller.run_adaptive(sim.light_trigger(), shutdown_rx.clone()))
            }
        };
        schedules.push(("lights", lights));
        if let Some(period) = config.weather_period() {
            let rng = rng_for(config.seed, sim.lanes.len() as u64);
            let weather = tokio::spawn(Arc::clone(&sim).run_weather(
                clock,
                period,
                rng,
                shutdown_rx.clone(),
            ));
            schedules.push(("weather", weather));
        }

        let motion = tokio::spawn(Arc::clone(&sim).run_motion(clock));
        if let Err(err) = motion.await {
            log::warn!("motion task ended abnormally: {err}");
        }
        let _ = shutdown_tx.send(true);
        for (name, handle) in schedules {
            if let Err(err) = handle.await {
                log::warn!("{name} task ended abnormally: {err}");
            }
        }

        let elapsed = clock.now();
        let report = sim.build_report(elapsed);
        sim.events.emit(SimEvent::Finished { at: elapsed });
        log::info!(
            "simulation finished after {:?}: {} vehicle(s) exited, {} collision(s)",
            elapsed,
            report.total_exited(),
            report.total_collisions()
        );
        report
    }

    /// Snapshot of everything the run has produced so far.
    pub fn build_report(&self, elapsed: Duration) -> SimulationReport {
        let mut lanes = Vec::with_capacity(self.lanes.len());
        let mut exited_by_weather: BTreeMap<WeatherKind, u64> = BTreeMap::new();
        let mut collisions_by_weather: BTreeMap<WeatherKind, u64> = BTreeMap::new();
        let mut speed_results = Vec::new();
        for lane in &self.lanes {
            let lane = lock_or_recover(lane);
            for (weather, count) in lane.exited_by_weather() {
                *exited_by_weather.entry(*weather).or_insert(0) += count;
            }
            for (weather, count) in lane.collisions_by_weather() {
                *collisions_by_weather.entry(*weather).or_insert(0) += count;
            }
            speed_results.extend_from_slice(lane.speed_results());
            lanes.push(lane.report());
        }
        let light_switches = self
            .intersections
            .iter()
            .map(|i| lock_or_recover(i).switch_count())
            .collect();
        SimulationReport {
            elapsed_secs: elapsed.as_secs_f64(),
            lanes,
            exited_by_weather,
            collisions_by_weather,
            light_switches,
            speed_results,
        }
    }
}
