use crate::simulation_engine::geometry::Point;
use crate::simulation_engine::intersections::{IntersectionId, LightPhase};
use crate::simulation_engine::lanes::LaneId;
use crate::simulation_engine::vehicles::VehicleId;
use crate::simulation_engine::weather::WeatherKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Locks `mutex`, taking the data back out of a poisoned lock.
///
/// Every critical section is a single read or update, so the data behind a
/// poisoned lock is still consistent.
pub fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("recovering poisoned lock");
        poisoned.into_inner()
    })
}

pub fn read_or_recover<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn write_or_recover<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runs one iteration of a periodic task. A panic is logged and swallowed so
/// the schedule keeps going.
pub fn run_guarded<T>(task: &str, body: impl FnOnce() -> T) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(value) => Some(value),
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::warn!("{task} task iteration failed: {reason}");
            None
        }
    }
}

/// Average speed of a vehicle over one stretch of constant weather.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherSegment {
    pub weather: WeatherKind,
    pub speed: f64,
}

/// Statistics snapshot taken when a vehicle leaves its lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedResult {
    pub vehicle: VehicleId,
    /// Average speed over the whole journey, km/h.
    pub average_speed: f64,
    /// Point-to-point speed over the lane's speed trap; `None` when not applicable.
    pub speed_trap_speed: Option<f64>,
    /// One entry per weather stretch, in journey order.
    pub weather_segments: Vec<WeatherSegment>,
    pub collided: bool,
    pub collision_weather: Option<WeatherKind>,
    /// Weather in force when the vehicle left.
    pub exit_weather: WeatherKind,
}

impl SpeedResult {
    /// All segment speeds recorded under `weather`.
    pub fn speeds_in(&self, weather: WeatherKind) -> Vec<f64> {
        self.weather_segments
            .iter()
            .filter(|s| s.weather == weather)
            .map(|s| s.speed)
            .collect()
    }
}

/// Per-lane totals at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneReport {
    pub lane: LaneId,
    pub exited: u64,
    pub exited_by_weather: BTreeMap<WeatherKind, u64>,
    /// Vehicles still travelling when the run stopped.
    pub in_flight: usize,
}

/// Everything a run produced, handed to the export side when it ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub elapsed_secs: f64,
    pub lanes: Vec<LaneReport>,
    pub exited_by_weather: BTreeMap<WeatherKind, u64>,
    pub collisions_by_weather: BTreeMap<WeatherKind, u64>,
    /// Completed light half-cycles per intersection, in layout order.
    pub light_switches: Vec<u64>,
    pub speed_results: Vec<SpeedResult>,
}

impl SimulationReport {
    pub fn total_exited(&self) -> u64 {
        self.lanes.iter().map(|l| l.exited).sum()
    }

    pub fn total_collisions(&self) -> u64 {
        self.collisions_by_weather.values().sum()
    }
}

/// Notifications for whatever sits outside the engine (a renderer, a logger, a test).
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    VehicleCreated {
        vehicle: VehicleId,
        position: Point,
        size: f64,
        at: Duration,
    },
    VehiclesExited {
        lane: LaneId,
        vehicles: Vec<VehicleId>,
        at: Duration,
    },
    LightsChanged {
        intersection: IntersectionId,
        phase: LightPhase,
        at: Duration,
    },
    WeatherChanged {
        weather: WeatherKind,
        at: Duration,
    },
    Finished {
        at: Duration,
    },
}

/// Optional event outlet. Sending never blocks and a dropped receiver is ignored.
#[derive(Debug, Clone, Default)]
pub struct EventSink(Option<UnboundedSender<SimEvent>>);

impl EventSink {
    pub fn new(sender: UnboundedSender<SimEvent>) -> Self {
        Self(Some(sender))
    }

    pub fn disconnected() -> Self {
        Self(None)
    }

    pub fn emit(&self, event: SimEvent) {
        if let Some(tx) = &self.0 {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guarded_body_returns_its_value() {
        assert_eq!(run_guarded("test", || 7), Some(7));
    }

    #[test]
    fn guarded_panic_is_swallowed() {
        let result: Option<()> = run_guarded("test", || panic!("boom"));
        assert_eq!(result, None);
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let mutex = std::sync::Arc::new(Mutex::new(1));
        let poisoner = std::sync::Arc::clone(&mutex);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison");
        })
        .join();
        assert!(mutex.is_poisoned());
        *lock_or_recover(&mutex) += 1;
        assert_eq!(*lock_or_recover(&mutex), 2);
    }
}
