use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::global_variables::COAST_STEPS;
use crate::shared_data::{lock_or_recover, LaneReport, SpeedResult};
use crate::simulation_engine::geometry::{squares_touch, Direction, Footprint, Point};
use crate::simulation_engine::intersections::SharedIntersection;
use crate::simulation_engine::vehicles::{SharedVehicle, SpeedTrap, Vehicle, VehicleId};
use crate::simulation_engine::weather::{ActiveWeather, WeatherKind};

/// A lane is identified by its direction and its number within that direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LaneId {
    pub direction: Direction,
    pub number: usize,
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.direction, self.number)
    }
}

/// Per-lane tunables taken from the run configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneSettings {
    pub capacity: usize,
    /// Side of a vehicle's square footprint; also the lane width.
    pub vehicle_size: f64,
    pub light_switch_threshold: u32,
    /// Lookahead depth on top of the crossing's vertical lane count.
    pub lookahead_extra_steps: usize,
}

/// Represents a single-direction lane and the vehicles travelling on it.
#[derive(Debug)]
pub struct Lane {
    id: LaneId,
    settings: LaneSettings,
    /// Where new vehicles are placed (top-left corner).
    entry: Point,
    /// Travel-axis coordinate of the lane end.
    exit: f64,
    speed_trap: Option<SpeedTrap>,
    vehicles: Vec<SharedVehicle>,
    /// Crossings this lane runs through, with their (fixed) footprints.
    intersections: Vec<(Footprint, SharedIntersection)>,
    failed_progress: u32,
    exited: u64,
    exited_by_weather: BTreeMap<WeatherKind, u64>,
    collisions_by_weather: BTreeMap<WeatherKind, u64>,
    speed_results: Vec<SpeedResult>,
    rng: SmallRng,
    next_seq: u64,
}

pub type SharedLane = Arc<Mutex<Lane>>;

impl Lane {
    pub fn new(id: LaneId, settings: LaneSettings, entry: Point, exit: f64, rng: SmallRng) -> Self {
        Self {
            id,
            settings,
            entry,
            exit,
            speed_trap: None,
            vehicles: Vec::new(),
            intersections: Vec::new(),
            failed_progress: 0,
            exited: 0,
            exited_by_weather: BTreeMap::new(),
            collisions_by_weather: BTreeMap::new(),
            speed_results: Vec::new(),
            rng,
            next_seq: 0,
        }
    }

    pub fn with_speed_trap(mut self, trap: SpeedTrap) -> Self {
        self.speed_trap = Some(trap);
        self
    }

    pub fn add_intersection(&mut self, intersection: SharedIntersection) {
        let footprint = lock_or_recover(&intersection).footprint;
        self.intersections.push((footprint, intersection));
    }

    pub fn id(&self) -> LaneId {
        self.id
    }

    pub fn direction(&self) -> Direction {
        self.id.direction
    }

    pub fn entry(&self) -> Point {
        self.entry
    }

    pub fn exit(&self) -> f64 {
        self.exit
    }

    pub fn speed_trap(&self) -> Option<SpeedTrap> {
        self.speed_trap
    }

    pub fn capacity(&self) -> usize {
        self.settings.capacity
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn vehicles(&self) -> &[SharedVehicle] {
        &self.vehicles
    }

    pub fn intersection_count(&self) -> usize {
        self.intersections.len()
    }

    pub fn exited_count(&self) -> u64 {
        self.exited
    }

    pub fn exited_by_weather(&self) -> &BTreeMap<WeatherKind, u64> {
        &self.exited_by_weather
    }

    pub fn collisions_by_weather(&self) -> &BTreeMap<WeatherKind, u64> {
        &self.collisions_by_weather
    }

    pub fn speed_results(&self) -> &[SpeedResult] {
        &self.speed_results
    }

    pub fn failed_progress(&self) -> u32 {
        self.failed_progress
    }

    pub fn is_above_threshold(&self) -> bool {
        self.failed_progress > self.settings.light_switch_threshold
    }

    pub fn reset_counter(&mut self) {
        self.failed_progress = 0;
    }

    /// Tries to place a new vehicle at the lane entry.
    ///
    /// A full lane counts as a failed attempt. A vehicle that would start too
    /// close to one already on the lane is dropped without being counted.
    pub fn add_vehicle(&mut self, weather: &ActiveWeather, now: Duration) -> Option<SharedVehicle> {
        if self.vehicles.len() >= self.settings.capacity {
            self.failed_progress += 1;
            return None;
        }
        let max_speed = weather.condition.sample_max_speed(&mut self.rng);
        let id = VehicleId {
            lane: self.id,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        let vehicle = Vehicle::new(
            id,
            self.id.direction,
            self.entry,
            self.settings.vehicle_size,
            max_speed,
            weather.kind,
            self.speed_trap,
            now,
        );

        let gap = self.settings.vehicle_size * weather.condition.braking_distance_factor;
        let start = vehicle.progress();
        let blocked = self.vehicles.iter().any(|other| {
            let ahead = self.id.direction.progress(lock_or_recover(other).position());
            ahead >= start && start + self.settings.vehicle_size >= ahead - gap
        });
        if blocked {
            log::debug!("{}: entry blocked, vehicle {} dropped", self.id, id);
            return None;
        }

        log::debug!("{}: vehicle {} enters at {} max speed", self.id, id, max_speed);
        let handle = Arc::new(Mutex::new(vehicle));
        self.vehicles.push(Arc::clone(&handle));
        Some(handle)
    }

    /// Advances every vehicle one step, refreshes crossing occupancy, flags
    /// collisions and retires vehicles that left the lane. Returns the ids of
    /// the retired vehicles.
    pub fn move_vehicles(&mut self, weather: &ActiveWeather, now: Duration) -> Vec<VehicleId> {
        let vehicles = self.vehicles.clone();
        for handle in &vehicles {
            let go = self.can_go(handle, weather);
            let (position, size) = {
                let mut vehicle = lock_or_recover(handle);
                if go {
                    vehicle.accelerate(now);
                } else {
                    vehicle.brake(now);
                }
                (vehicle.position(), vehicle.size())
            };
            for (_, crossing) in &self.intersections {
                let mut crossing = lock_or_recover(crossing);
                if crossing.is_vehicle_on_crossing(position, size) {
                    crossing.add_if_absent(handle);
                } else {
                    crossing.remove_if_present(handle);
                }
            }
        }
        self.mark_collisions(weather.kind);
        self.remove_exited(weather.kind, now)
    }

    /// Decides whether `handle` may accelerate this tick.
    pub fn can_go(&mut self, handle: &SharedVehicle, weather: &ActiveWeather) -> bool {
        let me = lock_or_recover(handle).clone();
        if self.blocked_ahead(handle, &me, weather.condition.braking_distance_factor) {
            return false;
        }

        let Some((footprint, crossing)) = self.next_intersection(&me) else {
            return true;
        };
        let direction = self.id.direction;
        let (green, occupants, vertical_lanes) = {
            let crossing = lock_or_recover(&crossing);
            (
                crossing.is_green_for(direction),
                crossing.occupants(),
                crossing.vertical_lane_count,
            )
        };
        let stop_line = direction.sign() * footprint.near_edge(direction);
        let has_distance = me.progress() < stop_line - COAST_STEPS * me.max_speed().abs();

        if green {
            if has_distance {
                return true;
            }
            let steps = vertical_lanes + self.settings.lookahead_extra_steps;
            if !self.lookahead_collides(handle, &me, &occupants, steps) {
                return true;
            }
        } else {
            self.failed_progress += 1;
        }
        has_distance
    }

    /// A same-lane vehicle ahead would be inside the braking gap after one
    /// more accelerating move.
    fn blocked_ahead(&self, handle: &SharedVehicle, me: &Vehicle, braking_factor: f64) -> bool {
        let size = self.settings.vehicle_size;
        let mine = me.progress();
        let reach = me.next_progress() + size;
        self.vehicles
            .iter()
            .filter(|other| !Arc::ptr_eq(other, handle))
            .any(|other| {
                let ahead = self.id.direction.progress(lock_or_recover(other).position());
                ahead > mine && reach >= ahead - size * braking_factor
            })
    }

    /// Nearest crossing whose near edge is still ahead of the vehicle's front.
    fn next_intersection(&self, me: &Vehicle) -> Option<(Footprint, SharedIntersection)> {
        let direction = self.id.direction;
        let front = me.progress() + self.settings.vehicle_size;
        self.intersections
            .iter()
            .map(|(footprint, crossing)| {
                let near = direction.sign() * footprint.near_edge(direction);
                (near, footprint, crossing)
            })
            .filter(|(near, _, _)| *near > front)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, footprint, crossing)| (*footprint, Arc::clone(crossing)))
    }

    /// Steps a copy of the vehicle through the crossing and checks it against
    /// everything already inside.
    fn lookahead_collides(
        &self,
        handle: &SharedVehicle,
        me: &Vehicle,
        occupants: &[SharedVehicle],
        steps: usize,
    ) -> bool {
        let size = self.settings.vehicle_size;
        let others: Vec<Point> = occupants
            .iter()
            .filter(|other| !Arc::ptr_eq(other, handle))
            .map(|other| lock_or_recover(other).position())
            .collect();
        me.projected_positions(steps)
            .into_iter()
            .any(|probe| others.iter().any(|other| squares_touch(probe, *other, size)))
    }

    fn mark_collisions(&mut self, weather: WeatherKind) {
        let size = self.settings.vehicle_size;
        let horizontal = self.id.direction.is_horizontal();
        let positions: Vec<Point> = self
            .vehicles
            .iter()
            .map(|v| lock_or_recover(v).position())
            .collect();

        let mut hit = vec![false; self.vehicles.len()];
        for i in 0..positions.len() {
            for j in (i + 1)..positions.len() {
                if squares_touch(positions[i], positions[j], size) {
                    hit[i] = true;
                    hit[j] = true;
                }
            }
        }

        for (idx, handle) in self.vehicles.iter().enumerate() {
            if hit[idx] {
                continue;
            }
            for (_, crossing) in &self.intersections {
                let occupants = {
                    let crossing = lock_or_recover(crossing);
                    if !crossing.contains(handle) {
                        continue;
                    }
                    crossing.occupants()
                };
                hit[idx] = occupants
                    .iter()
                    .filter(|other| !Arc::ptr_eq(other, handle))
                    .map(|other| {
                        let other = lock_or_recover(other);
                        (other.direction().is_horizontal(), other.position())
                    })
                    .any(|(other_horizontal, other_position)| {
                        other_horizontal != horizontal
                            && squares_touch(positions[idx], other_position, size)
                    });
                if hit[idx] {
                    break;
                }
            }
        }

        for (idx, handle) in self.vehicles.iter().enumerate() {
            if !hit[idx] {
                continue;
            }
            let mut vehicle = lock_or_recover(handle);
            if !vehicle.has_collided() {
                vehicle.mark_collision(weather);
                *self.collisions_by_weather.entry(weather).or_insert(0) += 1;
                log::debug!(
                    "{}: vehicle {} collided in {} weather",
                    self.id,
                    vehicle.id(),
                    weather
                );
            }
        }
    }

    fn has_left(&self, position: Point, size: f64) -> bool {
        let axis = self.id.direction.axis(position);
        if self.id.direction.is_forward() {
            axis >= self.exit
        } else {
            axis + size <= self.exit
        }
    }

    fn remove_exited(&mut self, weather: WeatherKind, now: Duration) -> Vec<VehicleId> {
        let mut removed = Vec::new();
        let mut staying = Vec::with_capacity(self.vehicles.len());
        for handle in std::mem::take(&mut self.vehicles) {
            let result = {
                let mut vehicle = lock_or_recover(&handle);
                if !self.has_left(vehicle.position(), vehicle.size()) {
                    None
                } else {
                    vehicle.finalize(now);
                    Some(vehicle.speed_result(weather))
                }
            };
            match result {
                Some(result) => {
                    for (_, crossing) in &self.intersections {
                        lock_or_recover(crossing).remove_if_present(&handle);
                    }
                    removed.push(result.vehicle);
                    self.speed_results.push(result);
                }
                None => staying.push(handle),
            }
        }
        self.vehicles = staying;

        if !removed.is_empty() {
            self.exited += removed.len() as u64;
            *self.exited_by_weather.entry(weather).or_insert(0) += removed.len() as u64;
            log::debug!("{}: {} vehicle(s) left the lane", self.id, removed.len());
        }
        removed
    }

    /// Hands a fresh max speed from `weather` to every vehicle on the lane.
    pub fn change_vehicle_speeds(&mut self, weather: &ActiveWeather, now: Duration) {
        for handle in &self.vehicles {
            let max_speed = weather.condition.sample_max_speed(&mut self.rng);
            lock_or_recover(handle).change_max_speed(max_speed, weather.kind, now);
        }
    }

    pub fn report(&self) -> LaneReport {
        LaneReport {
            lane: self.id,
            exited: self.exited,
            exited_by_weather: self.exited_by_weather.clone(),
            in_flight: self.vehicles.len(),
        }
    }

    #[cfg(test)]
    pub(crate) fn push_vehicle(&mut self, vehicle: Vehicle) -> SharedVehicle {
        let handle = Arc::new(Mutex::new(vehicle));
        self.vehicles.push(Arc::clone(&handle));
        handle
    }
}
