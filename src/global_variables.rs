// Terrain geometry (distance units)
pub const TERRAIN_WIDTH: f64 = 1000.0;
pub const TERRAIN_HEIGHT: f64 = 600.0;
pub const LANE_WIDTH: f64 = 20.0;
/// Vehicles sit this far inside the lane's top/left edge.
pub const LANE_INSET: f64 = 3.0;
/// Lanes run this far past the terrain edge so vehicles leave the view before they exit.
pub const LANE_OVERHANG: f64 = 20.0;
/// Gap between the two opposite-direction halves of a lane group.
pub const GROUP_SEPARATION: f64 = 6.0;
pub const MAX_LANES_PER_DIRECTION: usize = 4;

// Speed unit convention: 25 distance units = 4 km, 0.5 simulated seconds = 1 hour.
pub const DISTANCE_UNITS_PER_SEGMENT: f64 = 25.0;
pub const KM_PER_SEGMENT: f64 = 4.0;
pub const MILLIS_PER_SIMULATED_HOUR: f64 = 500.0;

// Kinematics
pub const INITIAL_SPEED_DIVISOR: f64 = 4.0;
pub const ACCELERATION_DIVISOR: f64 = 10.0;
pub const BRAKE_MULTIPLIER: f64 = 5.0;
/// A vehicle farther than this many max-speed steps from a red light keeps coasting.
pub const COAST_STEPS: f64 = 3.0;

// Scheduling defaults (seconds)
pub const DEFAULT_TICK_HZ: f64 = 30.0;
pub const DEFAULT_FIXED_FIRST_SWITCH_SECS: f64 = 3.0;
pub const DEFAULT_FIXED_SWITCH_PERIOD_SECS: f64 = 6.0;
pub const DEFAULT_AMBER_SECS: f64 = 1.0;
pub const DEFAULT_RANDOM_WEATHER_PERIOD_SECS: f64 = 18.0;

// Adaptive light switching
pub const DEFAULT_LIGHT_SWITCH_THRESHOLD: u32 = 200;
pub const DEFAULT_LOOKAHEAD_EXTRA_STEPS: usize = 1;
