use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::shared_data::{read_or_recover, write_or_recover};

/// Speed distribution and braking parameters of one weather condition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherCondition {
    pub slower_min_speed: u32,
    pub slower_speed_range: u32,
    pub faster_min_speed: u32,
    pub faster_speed_range: u32,
    /// A new vehicle is "faster" with probability 1 / this value.
    pub faster_probability_denominator: u32,
    /// Multiplier on the lane width giving the gap a vehicle keeps to the one ahead.
    pub braking_distance_factor: f64,
}

impl WeatherCondition {
    /// Draws a max speed: the faster band with probability `1/denominator`,
    /// the slower band otherwise.
    pub fn sample_max_speed<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let (min, range) = if rng.random_ratio(1, self.faster_probability_denominator.max(1)) {
            (self.faster_min_speed, self.faster_speed_range)
        } else {
            (self.slower_min_speed, self.slower_speed_range)
        };
        rng.random_range(min..min + range.max(1)) as f64
    }

    /// Lowest speed `sample_max_speed` can return.
    pub fn min_speed(&self) -> f64 {
        self.slower_min_speed.min(self.faster_min_speed) as f64
    }

    /// Highest speed `sample_max_speed` can return.
    pub fn max_speed(&self) -> f64 {
        let slower = self.slower_min_speed + self.slower_speed_range.max(1) - 1;
        let faster = self.faster_min_speed + self.faster_speed_range.max(1) - 1;
        slower.max(faster) as f64
    }
}

/// The named weather conditions, in round-robin order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherKind {
    Sunny,
    Rainy,
    Snowy,
    Glaze,
    Foggy,
}

impl WeatherKind {
    pub const ALL: [WeatherKind; 5] = [
        WeatherKind::Sunny,
        WeatherKind::Rainy,
        WeatherKind::Snowy,
        WeatherKind::Glaze,
        WeatherKind::Foggy,
    ];

    pub fn condition(self) -> WeatherCondition {
        let (slower_min, slower_range, faster_min, faster_range, braking, denominator) =
            match self {
                WeatherKind::Sunny => (20, 30, 40, 60, 3.0, 6),
                WeatherKind::Rainy => (10, 20, 40, 40, 2.0, 8),
                WeatherKind::Snowy => (10, 20, 20, 30, 1.4, 10),
                WeatherKind::Glaze => (10, 10, 20, 20, 1.3, 30),
                WeatherKind::Foggy => (10, 20, 30, 30, 1.4, 10),
            };
        WeatherCondition {
            slower_min_speed: slower_min,
            slower_speed_range: slower_range,
            faster_min_speed: faster_min,
            faster_speed_range: faster_range,
            faster_probability_denominator: denominator,
            braking_distance_factor: braking,
        }
    }

    /// Next condition in round-robin order, wrapping back to the first.
    pub fn next(self) -> WeatherKind {
        let idx = Self::ALL.iter().position(|k| *k == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> WeatherKind {
        Self::ALL[rng.random_range(0..Self::ALL.len())]
    }

    pub fn count() -> usize {
        Self::ALL.len()
    }
}

impl fmt::Display for WeatherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WeatherKind::Sunny => "sunny",
            WeatherKind::Rainy => "rainy",
            WeatherKind::Snowy => "snowy",
            WeatherKind::Glaze => "glaze",
            WeatherKind::Foggy => "foggy",
        };
        f.pad(name)
    }
}

/// The condition currently in force. Replaced as a whole, never field by field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveWeather {
    pub kind: WeatherKind,
    pub condition: WeatherCondition,
}

impl ActiveWeather {
    pub fn new(kind: WeatherKind) -> Self {
        Self {
            kind,
            condition: kind.condition(),
        }
    }
}

/// Process-wide handle on the active weather.
#[derive(Debug, Clone)]
pub struct SharedWeather(Arc<RwLock<ActiveWeather>>);

impl SharedWeather {
    pub fn new(kind: WeatherKind) -> Self {
        Self(Arc::new(RwLock::new(ActiveWeather::new(kind))))
    }

    pub fn current(&self) -> ActiveWeather {
        *read_or_recover(&self.0)
    }

    /// Swaps in `kind` and returns the condition it replaced.
    pub fn replace(&self, kind: WeatherKind) -> ActiveWeather {
        let mut guard = write_or_recover(&self.0);
        std::mem::replace(&mut *guard, ActiveWeather::new(kind))
    }
}
