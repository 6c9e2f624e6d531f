use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::global_variables::{
    DEFAULT_AMBER_SECS, DEFAULT_FIXED_FIRST_SWITCH_SECS, DEFAULT_FIXED_SWITCH_PERIOD_SECS,
    DEFAULT_LIGHT_SWITCH_THRESHOLD, DEFAULT_LOOKAHEAD_EXTRA_STEPS,
    DEFAULT_RANDOM_WEATHER_PERIOD_SECS, DEFAULT_TICK_HZ, MAX_LANES_PER_DIRECTION, TERRAIN_WIDTH,
};
use crate::simulation_engine::weather::WeatherKind;

/// How the lights decide when to switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightAlgorithm {
    /// First switch after a fixed delay, then at a constant period.
    #[default]
    FixedTime,
    /// Switch whenever some lane has piled up too many failed moves.
    Adaptive,
}

/// Which weather the run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "condition", rename_all = "snake_case")]
pub enum WeatherMode {
    /// One condition for the whole run.
    Fixed(WeatherKind),
    /// A uniformly drawn condition at every weather period.
    #[default]
    Random,
    /// Every condition in turn, each for an equal share of the run.
    RoundRobin,
}

/// Speed trap on the horizontal lanes, as an x-range on the terrain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedTrapConfig {
    pub x_start: f64,
    pub x_end: f64,
}

/// Errors raised when a run configuration cannot be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be between 1 and {max} (got {value})")]
    LaneCount {
        field: &'static str,
        max: usize,
        value: usize,
    },
    #[error("lane_capacity must be at least 1")]
    ZeroCapacity,
    #[error("{field} must be a positive, finite number (got {value})")]
    NotPositive { field: &'static str, value: f64 },
    #[error("{field} must be a finite number no lower than zero (got {value})")]
    Negative { field: &'static str, value: f64 },
    #[error("speed trap {x_start}..{x_end} must be increasing and lie within 0..{width}")]
    SpeedTrap { x_start: f64, x_end: f64, width: f64 },
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything needed to set up and run one simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Horizontal lanes per direction; they run through both crossings.
    pub horizontal_lanes: usize,
    /// Vertical lanes per direction at the left crossing.
    pub vertical_lanes_first: usize,
    /// Vertical lanes per direction at the right crossing.
    pub vertical_lanes_second: usize,
    pub lane_capacity: usize,
    pub duration_secs: f64,
    pub light_algorithm: LightAlgorithm,
    pub weather: WeatherMode,
    pub speed_trap: Option<SpeedTrapConfig>,
    /// Seeds every random source of the run when set.
    pub seed: Option<u64>,
    pub tick_hz: f64,
    pub light_switch_threshold: u32,
    pub lookahead_extra_steps: usize,
    pub fixed_first_switch_secs: f64,
    pub fixed_switch_period_secs: f64,
    pub amber_secs: f64,
    pub random_weather_period_secs: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            horizontal_lanes: 2,
            vertical_lanes_first: 2,
            vertical_lanes_second: 2,
            lane_capacity: 10,
            duration_secs: 60.0,
            light_algorithm: LightAlgorithm::default(),
            weather: WeatherMode::default(),
            speed_trap: None,
            seed: None,
            tick_hz: DEFAULT_TICK_HZ,
            light_switch_threshold: DEFAULT_LIGHT_SWITCH_THRESHOLD,
            lookahead_extra_steps: DEFAULT_LOOKAHEAD_EXTRA_STEPS,
            fixed_first_switch_secs: DEFAULT_FIXED_FIRST_SWITCH_SECS,
            fixed_switch_period_secs: DEFAULT_FIXED_SWITCH_PERIOD_SECS,
            amber_secs: DEFAULT_AMBER_SECS,
            random_weather_period_secs: DEFAULT_RANDOM_WEATHER_PERIOD_SECS,
        }
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

impl SimulationConfig {
    /// Loads a JSON config; missing fields take their defaults. The result is validated.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: SimulationConfig =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("horizontal_lanes", self.horizontal_lanes),
            ("vertical_lanes_first", self.vertical_lanes_first),
            ("vertical_lanes_second", self.vertical_lanes_second),
        ] {
            if value == 0 || value > MAX_LANES_PER_DIRECTION {
                return Err(ConfigError::LaneCount {
                    field,
                    max: MAX_LANES_PER_DIRECTION,
                    value,
                });
            }
        }
        if self.lane_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        positive("duration_secs", self.duration_secs)?;
        positive("tick_hz", self.tick_hz)?;
        positive("fixed_first_switch_secs", self.fixed_first_switch_secs)?;
        positive("fixed_switch_period_secs", self.fixed_switch_period_secs)?;
        positive("random_weather_period_secs", self.random_weather_period_secs)?;
        if !(self.amber_secs.is_finite() && self.amber_secs >= 0.0) {
            return Err(ConfigError::Negative {
                field: "amber_secs",
                value: self.amber_secs,
            });
        }
        if let Some(trap) = self.speed_trap {
            let inside = |x: f64| x.is_finite() && (0.0..=TERRAIN_WIDTH).contains(&x);
            if !(inside(trap.x_start) && inside(trap.x_end) && trap.x_start < trap.x_end) {
                return Err(ConfigError::SpeedTrap {
                    x_start: trap.x_start,
                    x_end: trap.x_end,
                    width: TERRAIN_WIDTH,
                });
            }
        }
        Ok(())
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_hz)
    }

    /// Number of motion ticks that make up the run.
    pub fn total_ticks(&self) -> u64 {
        (self.duration_secs * self.tick_hz).round().max(1.0) as u64
    }

    pub fn amber(&self) -> Duration {
        Duration::from_secs_f64(self.amber_secs)
    }

    pub fn fixed_first_switch(&self) -> Duration {
        Duration::from_secs_f64(self.fixed_first_switch_secs)
    }

    pub fn fixed_switch_period(&self) -> Duration {
        Duration::from_secs_f64(self.fixed_switch_period_secs)
    }

    /// Condition in force when the run starts.
    pub fn initial_weather(&self) -> WeatherKind {
        match self.weather {
            WeatherMode::Fixed(kind) => kind,
            WeatherMode::Random | WeatherMode::RoundRobin => WeatherKind::ALL[0],
        }
    }

    /// How often the weather changes; `None` when it is fixed.
    pub fn weather_period(&self) -> Option<Duration> {
        match self.weather {
            WeatherMode::Fixed(_) => None,
            WeatherMode::Random => Some(Duration::from_secs_f64(self.random_weather_period_secs)),
            WeatherMode::RoundRobin => Some(self.duration() / WeatherKind::count() as u32),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SimulationConfig::default();
        config.validate().unwrap();
        assert_eq!(config.total_ticks(), 1_800);
        assert_eq!(config.light_switch_threshold, 200);
        assert_eq!(config.fixed_first_switch(), Duration::from_secs(3));
        assert_eq!(config.fixed_switch_period(), Duration::from_secs(6));
        assert_eq!(config.weather_period(), Some(Duration::from_secs(18)));
    }

    #[test]
    fn round_robin_splits_the_run_evenly() {
        let config = SimulationConfig {
            duration_secs: 100.0,
            weather: WeatherMode::RoundRobin,
            ..SimulationConfig::default()
        };
        assert_eq!(config.weather_period(), Some(Duration::from_secs(20)));
        assert_eq!(config.initial_weather(), WeatherKind::Sunny);
    }

    #[test]
    fn fixed_weather_has_no_period() {
        let config = SimulationConfig {
            weather: WeatherMode::Fixed(WeatherKind::Foggy),
            ..SimulationConfig::default()
        };
        assert_eq!(config.weather_period(), None);
        assert_eq!(config.initial_weather(), WeatherKind::Foggy);
    }

    #[test]
    fn rejects_bad_lane_counts_and_capacity() {
        let too_many = SimulationConfig {
            vertical_lanes_second: 5,
            ..SimulationConfig::default()
        };
        assert!(matches!(
            too_many.validate(),
            Err(ConfigError::LaneCount {
                field: "vertical_lanes_second",
                value: 5,
                ..
            })
        ));
        let none = SimulationConfig {
            horizontal_lanes: 0,
            ..SimulationConfig::default()
        };
        assert!(matches!(none.validate(), Err(ConfigError::LaneCount { .. })));
        let empty = SimulationConfig {
            lane_capacity: 0,
            ..SimulationConfig::default()
        };
        assert!(matches!(empty.validate(), Err(ConfigError::ZeroCapacity)));
    }

    #[test]
    fn rejects_bad_timings() {
        let no_time = SimulationConfig {
            duration_secs: 0.0,
            ..SimulationConfig::default()
        };
        let err = no_time.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "duration_secs must be a positive, finite number (got 0)"
        );
        let nan_tick = SimulationConfig {
            tick_hz: f64::NAN,
            ..SimulationConfig::default()
        };
        assert!(matches!(
            nan_tick.validate(),
            Err(ConfigError::NotPositive { field: "tick_hz", .. })
        ));
        let negative_amber = SimulationConfig {
            amber_secs: -1.0,
            ..SimulationConfig::default()
        };
        assert!(matches!(negative_amber.validate(), Err(ConfigError::Negative { .. })));
    }

    #[test]
    fn rejects_reversed_speed_trap() {
        let config = SimulationConfig {
            speed_trap: Some(SpeedTrapConfig {
                x_start: 700.0,
                x_end: 300.0,
            }),
            ..SimulationConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::SpeedTrap { .. })));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: SimulationConfig = serde_json::from_str(
            r#"{
                "lane_capacity": 3,
                "light_algorithm": "adaptive",
                "weather": { "mode": "fixed", "condition": "snowy" },
                "speed_trap": { "x_start": 300.0, "x_end": 700.0 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.lane_capacity, 3);
        assert_eq!(config.light_algorithm, LightAlgorithm::Adaptive);
        assert_eq!(config.weather, WeatherMode::Fixed(WeatherKind::Snowy));
        assert_eq!(config.horizontal_lanes, 2);
        config.validate().unwrap();

        let round_robin: SimulationConfig =
            serde_json::from_str(r#"{ "weather": { "mode": "round_robin" } }"#).unwrap();
        assert_eq!(round_robin.weather, WeatherMode::RoundRobin);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let path = std::env::temp_dir().join("crossing_sim_no_such_config.json");
        let err = SimulationConfig::from_json_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn config_file_round_trips_through_disk() {
        let path = std::env::temp_dir()
            .join(format!("crossing_sim_config_{}.json", std::process::id()));
        let config = SimulationConfig {
            seed: Some(9),
            weather: WeatherMode::RoundRobin,
            ..SimulationConfig::default()
        };
        fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
        let loaded = SimulationConfig::from_json_file(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }
}
