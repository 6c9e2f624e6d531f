use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::global_variables::{
    ACCELERATION_DIVISOR, BRAKE_MULTIPLIER, DISTANCE_UNITS_PER_SEGMENT, INITIAL_SPEED_DIVISOR,
    KM_PER_SEGMENT, MILLIS_PER_SIMULATED_HOUR,
};
use crate::shared_data::{SpeedResult, WeatherSegment};
use crate::simulation_engine::geometry::{Direction, Point};
use crate::simulation_engine::lanes::LaneId;
use crate::simulation_engine::weather::WeatherKind;

/// Opaque vehicle handle: the lane that created it plus a per-lane sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VehicleId {
    pub lane: LaneId,
    pub seq: u64,
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.lane, self.seq)
    }
}

/// Vehicles are shared between their lane and the intersections they occupy.
pub type SharedVehicle = Arc<Mutex<Vehicle>>;

/// Two-point measurement window, as travel-axis coordinates. `start` is the
/// boundary met first in the direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedTrap {
    pub start: f64,
    pub end: f64,
}

/// Converts a distance in terrain units covered in `elapsed` simulated time to km/h.
/// `None` when no time has passed.
pub fn measured_speed(distance_units: f64, elapsed: Duration) -> Option<f64> {
    let hours = elapsed.as_secs_f64() * 1000.0 / MILLIS_PER_SIMULATED_HOUR;
    if hours <= 0.0 {
        return None;
    }
    let km = distance_units.abs() / DISTANCE_UNITS_PER_SEGMENT * KM_PER_SEGMENT;
    Some(km / hours)
}

/// Represents a vehicle travelling along a single lane.
#[derive(Debug, Clone)]
pub struct Vehicle {
    id: VehicleId,
    direction: Direction,
    /// Top-left corner of the vehicle's square footprint.
    position: Point,
    size: f64,
    current_speed: f64,
    max_speed: f64,
    acceleration: f64,
    entry_time: Duration,
    exit_time: Option<Duration>,
    begin_position: Point,
    end_position: Option<Point>,
    speed_trap: Option<SpeedTrap>,
    trap_started: Option<Duration>,
    trap_ended: Option<Duration>,
    weather: WeatherKind,
    segment_started: Duration,
    segment_start_position: Point,
    weather_segments: Vec<WeatherSegment>,
    collision_weather: Option<WeatherKind>,
}

impl Vehicle {
    pub fn new(
        id: VehicleId,
        direction: Direction,
        position: Point,
        size: f64,
        max_speed: f64,
        weather: WeatherKind,
        speed_trap: Option<SpeedTrap>,
        now: Duration,
    ) -> Self {
        let max_speed = max_speed.max(0.0);
        Self {
            id,
            direction,
            position,
            size,
            current_speed: max_speed / INITIAL_SPEED_DIVISOR,
            max_speed,
            acceleration: max_speed / ACCELERATION_DIVISOR,
            entry_time: now,
            exit_time: None,
            begin_position: position,
            end_position: None,
            speed_trap,
            trap_started: None,
            trap_ended: None,
            weather,
            segment_started: now,
            segment_start_position: position,
            weather_segments: Vec::new(),
            collision_weather: None,
        }
    }

    pub fn id(&self) -> VehicleId {
        self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn current_speed(&self) -> f64 {
        self.current_speed
    }

    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    pub fn acceleration(&self) -> f64 {
        self.acceleration
    }

    pub fn weather(&self) -> WeatherKind {
        self.weather
    }

    pub fn entry_time(&self) -> Duration {
        self.entry_time
    }

    pub fn exit_time(&self) -> Option<Duration> {
        self.exit_time
    }

    pub fn weather_segments(&self) -> &[WeatherSegment] {
        &self.weather_segments
    }

    pub fn trap_times(&self) -> (Option<Duration>, Option<Duration>) {
        (self.trap_started, self.trap_ended)
    }

    /// Velocity vector; the component across the travel axis is always zero.
    pub fn velocity(&self) -> (f64, f64) {
        let (ux, uy) = self.direction.unit();
        (ux * self.current_speed, uy * self.current_speed)
    }

    /// Travel-axis coordinate where "ahead" is always greater.
    pub fn progress(&self) -> f64 {
        self.direction.progress(self.position)
    }

    pub fn has_collided(&self) -> bool {
        self.collision_weather.is_some()
    }

    pub fn collision_weather(&self) -> Option<WeatherKind> {
        self.collision_weather
    }

    /// Flags the first collision only; later ones keep its weather.
    pub fn mark_collision(&mut self, weather: WeatherKind) {
        if self.collision_weather.is_none() {
            self.collision_weather = Some(weather);
        }
    }

    pub fn accelerate(&mut self, now: Duration) {
        self.step(self.acceleration, now);
    }

    pub fn brake(&mut self, now: Duration) {
        self.step(-self.acceleration * BRAKE_MULTIPLIER, now);
    }

    fn step(&mut self, delta: f64, now: Duration) {
        self.current_speed = (self.current_speed + delta).clamp(0.0, self.max_speed);
        let (vx, vy) = self.velocity();
        self.position.x += vx;
        self.position.y += vy;
        self.mark_speed_trap(now);
    }

    fn mark_speed_trap(&mut self, now: Duration) {
        let Some(trap) = self.speed_trap else {
            return;
        };
        if self.trap_ended.is_some() {
            return;
        }
        let sign = self.direction.sign();
        let progress = self.progress();
        if self.trap_started.is_none() && progress > sign * trap.start {
            self.trap_started = Some(now);
        }
        if progress > sign * trap.end {
            self.trap_ended = Some(now);
        }
    }

    /// Closes the running weather segment at `now`. Zero-length segments are dropped.
    fn close_segment(&mut self, now: Duration) {
        let distance =
            self.direction.axis(self.position) - self.direction.axis(self.segment_start_position);
        let elapsed = now.saturating_sub(self.segment_started);
        if let Some(speed) = measured_speed(distance, elapsed) {
            self.weather_segments.push(WeatherSegment {
                weather: self.weather,
                speed,
            });
        }
        self.segment_started = now;
        self.segment_start_position = self.position;
    }

    /// Applies a new weather mid-journey: records the segment driven under the
    /// old weather, then installs the new target speed.
    pub fn change_max_speed(
        &mut self,
        new_max_speed: f64,
        new_weather: WeatherKind,
        now: Duration,
    ) {
        self.close_segment(now);
        self.max_speed = new_max_speed.max(0.0);
        self.acceleration = self.max_speed / ACCELERATION_DIVISOR;
        self.current_speed = self.current_speed.min(self.max_speed);
        self.weather = new_weather;
    }

    /// Top-left positions the vehicle would reach over its next `steps`
    /// accelerating moves. The vehicle itself is left untouched.
    pub fn projected_positions(&self, steps: usize) -> Vec<Point> {
        let mut probe = self.clone();
        probe.speed_trap = None;
        (0..steps)
            .map(|_| {
                probe.step(probe.acceleration, self.entry_time);
                probe.position
            })
            .collect()
    }

    /// Travel-axis progress after one more accelerating move.
    pub fn next_progress(&self) -> f64 {
        self.progress() + (self.current_speed + self.acceleration).min(self.max_speed)
    }

    /// Called once when the vehicle leaves its lane.
    pub fn finalize(&mut self, now: Duration) {
        self.close_segment(now);
        self.exit_time = Some(now);
        self.end_position = Some(self.position);
    }

    /// Journey average in km/h; 0 until the vehicle has been finalized.
    pub fn average_speed(&self) -> f64 {
        let (Some(exit), Some(end)) = (self.exit_time, self.end_position) else {
            return 0.0;
        };
        let distance = self.direction.axis(end) - self.direction.axis(self.begin_position);
        measured_speed(distance, exit.saturating_sub(self.entry_time)).unwrap_or(0.0)
    }

    /// Speed over the trap window, or `None` when there is no trap or the
    /// window was not completed.
    pub fn speed_trap_speed(&self) -> Option<f64> {
        let trap = self.speed_trap?;
        let (start, end) = (self.trap_started?, self.trap_ended?);
        measured_speed(trap.end - trap.start, end.saturating_sub(start))
    }

    pub fn speed_result(&self, exit_weather: WeatherKind) -> SpeedResult {
        SpeedResult {
            vehicle: self.id,
            average_speed: self.average_speed(),
            speed_trap_speed: self.speed_trap_speed(),
            weather_segments: self.weather_segments.clone(),
            collided: self.has_collided(),
            collision_weather: self.collision_weather,
            exit_weather,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lane_id(direction: Direction) -> LaneId {
        LaneId {
            direction,
            number: 0,
        }
    }

    fn vehicle(direction: Direction, position: Point, max_speed: f64) -> Vehicle {
        Vehicle::new(
            VehicleId {
                lane: lane_id(direction),
                seq: 0,
            },
            direction,
            position,
            20.0,
            max_speed,
            WeatherKind::Sunny,
            None,
            Duration::ZERO,
        )
    }

    #[test]
    fn starts_at_quarter_speed_with_tenth_acceleration() {
        let v = vehicle(Direction::Right, Point::new(0.0, 3.0), 40.0);
        assert_eq!(v.current_speed(), 10.0);
        assert_eq!(v.acceleration(), 4.0);
    }

    #[test]
    fn accelerate_moves_along_travel_axis_and_clamps() {
        let mut v = vehicle(Direction::Left, Point::new(500.0, 3.0), 40.0);
        v.accelerate(Duration::ZERO);
        assert_eq!(v.current_speed(), 14.0);
        assert_eq!(v.position(), Point::new(486.0, 3.0));
        for _ in 0..20 {
            v.accelerate(Duration::ZERO);
        }
        assert_eq!(v.current_speed(), 40.0);
        assert_eq!(v.position().y, 3.0);
        let (vx, vy) = v.velocity();
        assert_eq!((vx, vy), (-40.0, 0.0));
    }

    #[test]
    fn brake_never_reverses() {
        let mut v = vehicle(Direction::Down, Point::new(3.0, 100.0), 40.0);
        v.brake(Duration::ZERO);
        assert_eq!(v.current_speed(), 0.0);
        assert_eq!(v.position(), Point::new(3.0, 100.0));
        v.brake(Duration::ZERO);
        assert_eq!(v.position(), Point::new(3.0, 100.0));
    }

    #[test]
    fn measured_speed_uses_unit_convention() {
        // 25 units in 0.5 s is 4 km in one hour.
        assert_eq!(measured_speed(25.0, Duration::from_millis(500)), Some(4.0));
        // 50 units is 8 km, 0.25 s is half an hour.
        assert_eq!(measured_speed(-50.0, Duration::from_millis(250)), Some(16.0));
        assert_eq!(measured_speed(10.0, Duration::ZERO), None);
    }

    #[test]
    fn single_weather_journey_has_one_segment_equal_to_average() {
        let mut v = vehicle(Direction::Right, Point::new(0.0, 3.0), 40.0);
        for i in 1..=30 {
            v.accelerate(Duration::from_millis(33 * i));
        }
        v.finalize(Duration::from_millis(990));
        assert_eq!(v.weather_segments().len(), 1);
        assert_eq!(v.weather_segments()[0].weather, WeatherKind::Sunny);
        assert_eq!(v.weather_segments()[0].speed, v.average_speed());
        assert!(v.average_speed() > 0.0);
    }

    #[test]
    fn weather_change_closes_a_segment_and_retargets_speed() {
        let mut v = vehicle(Direction::Right, Point::new(0.0, 3.0), 80.0);
        for _ in 0..10 {
            v.accelerate(Duration::from_millis(100));
        }
        assert_eq!(v.current_speed(), 80.0);
        v.change_max_speed(30.0, WeatherKind::Glaze, Duration::from_secs(1));
        assert_eq!(v.max_speed(), 30.0);
        assert_eq!(v.current_speed(), 30.0);
        assert_eq!(v.acceleration(), 3.0);
        assert_eq!(v.weather(), WeatherKind::Glaze);
        assert_eq!(v.weather_segments().len(), 1);
        assert_eq!(v.weather_segments()[0].weather, WeatherKind::Sunny);

        v.accelerate(Duration::from_secs(1));
        v.finalize(Duration::from_secs(2));
        let segments = v.weather_segments();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].weather, WeatherKind::Glaze);
        assert_eq!(segments[1].speed, measured_speed(30.0, Duration::from_secs(1)).unwrap());
    }

    #[test]
    fn speed_trap_records_first_crossings_only() {
        let mut v = Vehicle::new(
            VehicleId {
                lane: lane_id(Direction::Left),
                seq: 1,
            },
            Direction::Left,
            Point::new(600.0, 3.0),
            20.0,
            20.0,
            WeatherKind::Sunny,
            Some(SpeedTrap {
                start: 500.0,
                end: 300.0,
            }),
            Duration::ZERO,
        );
        let mut t = Duration::ZERO;
        while v.position().x > 200.0 {
            t += Duration::from_millis(100);
            v.accelerate(t);
        }
        let (started, ended) = v.trap_times();
        let (started, ended) = (started.unwrap(), ended.unwrap());
        assert!(started < ended);
        v.finalize(t);
        let trap_speed = v.speed_trap_speed().unwrap();
        assert_eq!(trap_speed, measured_speed(200.0, ended - started).unwrap());
    }

    #[test]
    fn no_trap_means_not_applicable() {
        let mut v = vehicle(Direction::Up, Point::new(3.0, 600.0), 30.0);
        v.accelerate(Duration::from_millis(33));
        v.finalize(Duration::from_millis(66));
        assert_eq!(v.speed_trap_speed(), None);
        assert!(!v.speed_result(WeatherKind::Sunny).collided);
    }

    #[test]
    fn projection_does_not_move_the_vehicle() {
        let v = vehicle(Direction::Up, Point::new(3.0, 600.0), 40.0);
        let path = v.projected_positions(3);
        assert_eq!(
            path,
            vec![
                Point::new(3.0, 586.0),
                Point::new(3.0, 568.0),
                Point::new(3.0, 546.0)
            ]
        );
        assert_eq!(v.position(), Point::new(3.0, 600.0));
        assert_eq!(v.next_progress(), -586.0);
    }

    #[test]
    fn collision_keeps_first_weather() {
        let mut v = vehicle(Direction::Right, Point::new(0.0, 3.0), 30.0);
        v.mark_collision(WeatherKind::Rainy);
        v.mark_collision(WeatherKind::Foggy);
        assert_eq!(v.collision_weather(), Some(WeatherKind::Rainy));
        let result = v.speed_result(WeatherKind::Foggy);
        assert!(result.collided);
        assert_eq!(result.collision_weather, Some(WeatherKind::Rainy));
    }
}
