use clap::{Parser, ValueEnum};
use crossing_sim::config::{LightAlgorithm, SimulationConfig, SpeedTrapConfig, WeatherMode};
use crossing_sim::monitoring::report_export::{
    export_report_json, export_speed_results, export_weather_summary,
};
use crossing_sim::shared_data::{EventSink, SimEvent};
use crossing_sim::simulation_engine::simulation::Simulation;
use crossing_sim::simulation_engine::weather::WeatherKind;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AlgorithmArg {
    FixedTime,
    Adaptive,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WeatherArg {
    Random,
    RoundRobin,
    Sunny,
    Rainy,
    Snowy,
    Glaze,
    Foggy,
}

impl From<WeatherArg> for WeatherMode {
    fn from(arg: WeatherArg) -> Self {
        match arg {
            WeatherArg::Random => WeatherMode::Random,
            WeatherArg::RoundRobin => WeatherMode::RoundRobin,
            WeatherArg::Sunny => WeatherMode::Fixed(WeatherKind::Sunny),
            WeatherArg::Rainy => WeatherMode::Fixed(WeatherKind::Rainy),
            WeatherArg::Snowy => WeatherMode::Fixed(WeatherKind::Snowy),
            WeatherArg::Glaze => WeatherMode::Fixed(WeatherKind::Glaze),
            WeatherArg::Foggy => WeatherMode::Fixed(WeatherKind::Foggy),
        }
    }
}

#[derive(Parser)]
#[command(name = "simulation_main")]
#[command(about = "Two signal-controlled crossings under changing weather")]
struct Cli {
    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Horizontal lanes per direction
    #[arg(long)]
    horizontal: Option<usize>,

    /// Vertical lanes per direction at the left crossing
    #[arg(long)]
    vertical_first: Option<usize>,

    /// Vertical lanes per direction at the right crossing
    #[arg(long)]
    vertical_second: Option<usize>,

    /// Maximum vehicles per lane
    #[arg(long)]
    capacity: Option<usize>,

    /// Run length in seconds
    #[arg(long)]
    duration: Option<f64>,

    #[arg(long, value_enum)]
    algorithm: Option<AlgorithmArg>,

    #[arg(long, value_enum)]
    weather: Option<WeatherArg>,

    /// Speed trap start and end on the horizontal lanes, e.g. `--speed-trap 300 700`
    #[arg(long, num_args = 2, value_names = ["X_START", "X_END"])]
    speed_trap: Option<Vec<f64>>,

    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Where to write per-vehicle speed results
    #[arg(long, default_value = "speed_results.csv")]
    speeds_csv: PathBuf,

    /// Where to write per-weather totals
    #[arg(long, default_value = "weather_summary.csv")]
    weather_csv: PathBuf,

    /// Optional full report as JSON
    #[arg(long)]
    report_json: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> Result<(SimulationConfig, Outputs), crossing_sim::config::ConfigError> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::from_json_file(path)?,
            None => SimulationConfig::default(),
        };
        if let Some(v) = self.horizontal {
            config.horizontal_lanes = v;
        }
        if let Some(v) = self.vertical_first {
            config.vertical_lanes_first = v;
        }
        if let Some(v) = self.vertical_second {
            config.vertical_lanes_second = v;
        }
        if let Some(v) = self.capacity {
            config.lane_capacity = v;
        }
        if let Some(v) = self.duration {
            config.duration_secs = v;
        }
        if let Some(algorithm) = self.algorithm {
            config.light_algorithm = match algorithm {
                AlgorithmArg::FixedTime => LightAlgorithm::FixedTime,
                AlgorithmArg::Adaptive => LightAlgorithm::Adaptive,
            };
        }
        if let Some(weather) = self.weather {
            config.weather = weather.into();
        }
        if let Some(trap) = &self.speed_trap {
            config.speed_trap = Some(SpeedTrapConfig {
                x_start: trap[0],
                x_end: trap[1],
            });
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.validate()?;
        let outputs = Outputs {
            speeds_csv: self.speeds_csv,
            weather_csv: self.weather_csv,
            report_json: self.report_json,
        };
        Ok((config, outputs))
    }
}

struct Outputs {
    speeds_csv: PathBuf,
    weather_csv: PathBuf,
    report_json: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let (config, outputs) = match Cli::parse().into_config() {
        Ok(parsed) => parsed,
        Err(e) => {
            log::error!("invalid configuration: {}", e);
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let simulation = match Simulation::new(config) {
        Ok(simulation) => simulation.with_events(EventSink::new(tx)),
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Stand-in for a renderer: trace what a presentation layer would receive.
    let watcher = tokio::spawn(async move {
        let mut created = 0u64;
        while let Some(event) = rx.recv().await {
            match event {
                SimEvent::VehicleCreated { .. } => created += 1,
                SimEvent::VehiclesExited { lane, vehicles, .. } => {
                    log::trace!("{} vehicle(s) left {}", vehicles.len(), lane);
                }
                SimEvent::LightsChanged {
                    intersection,
                    phase,
                    at,
                } => log::debug!("{} -> {:?} at {:?}", intersection, phase, at),
                SimEvent::WeatherChanged { weather, at } => {
                    log::debug!("weather now {} at {:?}", weather, at)
                }
                SimEvent::Finished { .. } => break,
            }
        }
        created
    });

    let report = simulation.run().await;
    let created = watcher.await.unwrap_or_default();

    let mut failed = false;
    if let Err(e) = export_speed_results(&outputs.speeds_csv, &report) {
        log::error!("could not write {}: {}", outputs.speeds_csv.display(), e);
        failed = true;
    }
    if let Err(e) = export_weather_summary(&outputs.weather_csv, &report) {
        log::error!("could not write {}: {}", outputs.weather_csv.display(), e);
        failed = true;
    }
    if let Some(path) = &outputs.report_json {
        if let Err(e) = export_report_json(path, &report) {
            log::error!("could not write {}: {}", path.display(), e);
            failed = true;
        }
    }

    println!(
        "Ran {:.1}s: {} vehicle(s) created, {} exited, {} collision(s), light switches {:?}",
        report.elapsed_secs,
        created,
        report.total_exited(),
        report.total_collisions(),
        report.light_switches
    );
    for (weather, count) in &report.exited_by_weather {
        println!("  {:<6} {:>6} exited", weather, count);
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
