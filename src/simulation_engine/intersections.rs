use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::shared_data::lock_or_recover;
use crate::simulation_engine::geometry::{Direction, Footprint, Point};
use crate::simulation_engine::vehicles::SharedVehicle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IntersectionId(pub usize);

impl fmt::Display for IntersectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "crossing-{}", self.0)
    }
}

/// Two-phase light with an amber transition in between. During either amber
/// phase both directions see red.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightPhase {
    HorizontalGreen,
    /// Leaving horizontal green, heading for vertical green.
    HorizontalAmber,
    VerticalGreen,
    /// Leaving vertical green, heading for horizontal green.
    VerticalAmber,
}

impl LightPhase {
    pub fn is_amber(self) -> bool {
        matches!(self, LightPhase::HorizontalAmber | LightPhase::VerticalAmber)
    }
}

/// Represents a signal-controlled crossing of the horizontal lane group with
/// one vertical lane group.
#[derive(Debug)]
pub struct Intersection {
    pub id: IntersectionId,
    pub footprint: Footprint,
    /// Vertical lanes per direction running through this crossing.
    pub vertical_lane_count: usize,
    phase: LightPhase,
    occupants: Vec<SharedVehicle>,
    switch_count: u64,
}

pub type SharedIntersection = Arc<Mutex<Intersection>>;

impl Intersection {
    /// Creates a crossing that starts with the horizontal direction green.
    pub fn new(id: IntersectionId, footprint: Footprint, vertical_lane_count: usize) -> Self {
        Self {
            id,
            footprint,
            vertical_lane_count,
            phase: LightPhase::HorizontalGreen,
            occupants: Vec::new(),
            switch_count: 0,
        }
    }

    pub fn phase(&self) -> LightPhase {
        self.phase
    }

    pub fn is_horizontal_green(&self) -> bool {
        self.phase == LightPhase::HorizontalGreen
    }

    pub fn is_vertical_green(&self) -> bool {
        self.phase == LightPhase::VerticalGreen
    }

    /// Green for vehicles travelling in `direction`.
    pub fn is_green_for(&self, direction: Direction) -> bool {
        if direction.is_horizontal() {
            self.is_horizontal_green()
        } else {
            self.is_vertical_green()
        }
    }

    /// Completed half-cycles since the run started.
    pub fn switch_count(&self) -> u64 {
        self.switch_count
    }

    /// Enters the amber phase. `None` when a transition is already running.
    pub fn begin_change(&mut self) -> Option<LightPhase> {
        let next = match self.phase {
            LightPhase::HorizontalGreen => LightPhase::HorizontalAmber,
            LightPhase::VerticalGreen => LightPhase::VerticalAmber,
            LightPhase::HorizontalAmber | LightPhase::VerticalAmber => return None,
        };
        self.phase = next;
        Some(next)
    }

    /// Leaves amber for the opposite green. `None` when not in amber.
    pub fn complete_change(&mut self) -> Option<LightPhase> {
        let next = match self.phase {
            LightPhase::HorizontalAmber => LightPhase::VerticalGreen,
            LightPhase::VerticalAmber => LightPhase::HorizontalGreen,
            LightPhase::HorizontalGreen | LightPhase::VerticalGreen => return None,
        };
        self.phase = next;
        self.switch_count += 1;
        Some(next)
    }

    pub fn is_vehicle_on_crossing(&self, position: Point, vehicle_size: f64) -> bool {
        self.footprint.overlaps_square(position, vehicle_size)
    }

    pub fn add_if_absent(&mut self, vehicle: &SharedVehicle) {
        if !self.contains(vehicle) {
            self.occupants.push(Arc::clone(vehicle));
        }
    }

    pub fn remove_if_present(&mut self, vehicle: &SharedVehicle) {
        self.occupants.retain(|v| !Arc::ptr_eq(v, vehicle));
    }

    pub fn contains(&self, vehicle: &SharedVehicle) -> bool {
        self.occupants.iter().any(|v| Arc::ptr_eq(v, vehicle))
    }

    /// Handles on the vehicles inside the footprint. The caller locks them
    /// after this intersection's lock has been released.
    pub fn occupants(&self) -> Vec<SharedVehicle> {
        self.occupants.clone()
    }

    pub fn occupant_count(&self) -> usize {
        self.occupants.len()
    }
}

/// Runs one half-cycle on a single crossing: amber for `amber`, then the
/// opposite green. `on_phase` sees each phase as it is entered. Returns false
/// when a transition was already in flight.
pub async fn change_lights(
    intersection: &SharedIntersection,
    amber: Duration,
    mut on_phase: impl FnMut(IntersectionId, LightPhase),
) -> bool {
    let (id, amber_phase) = {
        let mut crossing = lock_or_recover(intersection);
        match crossing.begin_change() {
            Some(phase) => (crossing.id, phase),
            None => return false,
        }
    };
    on_phase(id, amber_phase);
    tokio::time::sleep(amber).await;
    let green = lock_or_recover(intersection).complete_change();
    match green {
        Some(phase) => {
            on_phase(id, phase);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation_engine::lanes::LaneId;
    use crate::simulation_engine::vehicles::{Vehicle, VehicleId};
    use crate::simulation_engine::weather::WeatherKind;

    fn crossing() -> Intersection {
        Intersection::new(IntersectionId(0), Footprint::new(207.0, 293.0, 257.0, 343.0), 2)
    }

    fn shared_vehicle(seq: u64) -> SharedVehicle {
        let lane = LaneId {
            direction: Direction::Right,
            number: 0,
        };
        Arc::new(Mutex::new(Vehicle::new(
            VehicleId { lane, seq },
            Direction::Right,
            Point::new(0.0, 260.0),
            20.0,
            40.0,
            WeatherKind::Sunny,
            None,
            Duration::ZERO,
        )))
    }

    #[test]
    fn half_cycle_walks_through_amber() {
        let mut c = crossing();
        assert!(c.is_horizontal_green());
        assert_eq!(c.begin_change(), Some(LightPhase::HorizontalAmber));
        assert!(!c.is_horizontal_green() && !c.is_vertical_green());
        assert_eq!(c.begin_change(), None);
        assert_eq!(c.complete_change(), Some(LightPhase::VerticalGreen));
        assert_eq!(c.complete_change(), None);
        assert!(c.is_vertical_green());
        assert!(c.is_green_for(Direction::Up));
        assert!(!c.is_green_for(Direction::Left));
        assert_eq!(c.switch_count(), 1);
    }

    #[test]
    fn both_greens_never_hold_together() {
        let mut c = crossing();
        for _ in 0..8 {
            assert!(!(c.is_horizontal_green() && c.is_vertical_green()));
            c.begin_change();
            assert!(!(c.is_horizontal_green() && c.is_vertical_green()));
            c.complete_change();
        }
        assert!(c.is_horizontal_green());
        assert_eq!(c.switch_count(), 8);
    }

    #[test]
    fn crossing_predicate_uses_footprint() {
        let c = crossing();
        assert!(c.is_vehicle_on_crossing(Point::new(190.0, 260.0), 20.0));
        assert!(!c.is_vehicle_on_crossing(Point::new(180.0, 260.0), 20.0));
        assert!(!c.is_vehicle_on_crossing(Point::new(250.0, 350.0), 20.0));
    }

    #[test]
    fn occupancy_is_a_set() {
        let mut c = crossing();
        let a = shared_vehicle(1);
        let b = shared_vehicle(2);
        c.add_if_absent(&a);
        c.add_if_absent(&a);
        c.add_if_absent(&b);
        assert_eq!(c.occupant_count(), 2);
        c.remove_if_present(&a);
        c.remove_if_present(&a);
        assert_eq!(c.occupant_count(), 1);
        assert!(c.contains(&b));
    }

    #[tokio::test(start_paused = true)]
    async fn change_lights_holds_amber_for_exactly_one_second() {
        let shared: SharedIntersection = Arc::new(Mutex::new(crossing()));
        let started = tokio::time::Instant::now();
        let task = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                let mut seen = Vec::new();
                let done =
                    change_lights(&shared, Duration::from_secs(1), |_, p| seen.push(p)).await;
                (done, seen)
            })
        };
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(lock_or_recover(&shared).phase(), LightPhase::HorizontalAmber);
        assert!(!change_lights(&shared, Duration::from_secs(1), |_, _| {}).await);

        let (done, seen) = task.await.unwrap();
        assert!(done);
        assert_eq!(seen, vec![LightPhase::HorizontalAmber, LightPhase::VerticalGreen]);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_millis(1_010));
        assert!(lock_or_recover(&shared).is_vertical_green());
    }
}
