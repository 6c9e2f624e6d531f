use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::sync::{Arc, Mutex};

use crate::config::SimulationConfig;
use crate::global_variables::{
    GROUP_SEPARATION, LANE_INSET, LANE_OVERHANG, LANE_WIDTH, TERRAIN_HEIGHT, TERRAIN_WIDTH,
};
use crate::shared_data::lock_or_recover;
use crate::simulation_engine::geometry::{Direction, Footprint, Point};
use crate::simulation_engine::intersections::{Intersection, IntersectionId, SharedIntersection};
use crate::simulation_engine::lanes::{Lane, LaneId, LaneSettings, SharedLane};
use crate::simulation_engine::vehicles::SpeedTrap;

/// Random source for one consumer of a run. Seeded runs give every consumer
/// its own reproducible stream.
pub fn rng_for(seed: Option<u64>, stream: u64) -> SmallRng {
    match seed {
        Some(seed) => SmallRng::seed_from_u64(seed.wrapping_add(stream)),
        None => SmallRng::from_os_rng(),
    }
}

/// Centre lines of the two vertical lane groups.
fn vertical_centres() -> [f64; 2] {
    [TERRAIN_WIDTH / 4.0, TERRAIN_WIDTH * 3.0 / 4.0]
}

/// Top edge of the first horizontal lane.
fn horizontal_group_start(lanes_per_direction: usize) -> f64 {
    TERRAIN_HEIGHT / 2.0 - lanes_per_direction as f64 * LANE_WIDTH - LANE_INSET
}

/// Left edge of the first lane in a vertical group.
fn vertical_group_start(centre: f64, lanes_per_direction: usize) -> f64 {
    centre - lanes_per_direction as f64 * LANE_WIDTH - LANE_INSET
}

/// Offset of lane `index` from its group start; the second half of a group
/// sits after a small separation.
fn lane_offset(index: usize, lanes_per_direction: usize) -> f64 {
    let separation = if index >= lanes_per_direction {
        GROUP_SEPARATION
    } else {
        0.0
    };
    index as f64 * LANE_WIDTH + separation
}

/// Creates the two crossings: the horizontal group against each vertical group.
/// Both start with horizontal green.
pub fn create_intersections(config: &SimulationConfig) -> Vec<SharedIntersection> {
    let h = config.horizontal_lanes as f64;
    let y1 = TERRAIN_HEIGHT / 2.0 - h * LANE_WIDTH - LANE_INSET;
    let y2 = TERRAIN_HEIGHT / 2.0 + h * LANE_WIDTH + LANE_INSET;
    vertical_centres()
        .into_iter()
        .zip([config.vertical_lanes_first, config.vertical_lanes_second])
        .enumerate()
        .map(|(idx, (centre, vertical))| {
            let v = vertical as f64;
            let footprint = Footprint::new(
                centre - v * LANE_WIDTH - LANE_INSET,
                centre + v * LANE_WIDTH + LANE_INSET,
                y1,
                y2,
            );
            Arc::new(Mutex::new(Intersection::new(IntersectionId(idx), footprint, vertical)))
        })
        .collect()
}

/// Creates every lane and wires it to the crossings it runs through.
///
/// Order: horizontal right, horizontal left, then for each vertical group its
/// down lanes followed by its up lanes.
pub fn create_lanes(
    config: &SimulationConfig,
    intersections: &[SharedIntersection],
) -> Vec<SharedLane> {
    let settings = LaneSettings {
        capacity: config.lane_capacity,
        vehicle_size: LANE_WIDTH,
        light_switch_threshold: config.light_switch_threshold,
        lookahead_extra_steps: config.lookahead_extra_steps,
    };
    let horizontal_length = TERRAIN_WIDTH + LANE_OVERHANG;
    let vertical_length = TERRAIN_HEIGHT + LANE_OVERHANG;
    let mut lanes: Vec<Lane> = Vec::new();

    let h = config.horizontal_lanes;
    let top = horizontal_group_start(h);
    for index in 0..2 * h {
        let direction = if index < h {
            Direction::Right
        } else {
            Direction::Left
        };
        let y = top + lane_offset(index, h) + LANE_INSET;
        let (entry, exit) = match direction {
            Direction::Right => (Point::new(0.0, y), horizontal_length),
            _ => (Point::new(horizontal_length, y), 0.0),
        };
        let id = LaneId {
            direction,
            number: index % h,
        };
        let rng = rng_for(config.seed, lanes.len() as u64);
        let mut lane = Lane::new(id, settings, entry, exit, rng);
        if let Some(trap) = config.speed_trap {
            lane = lane.with_speed_trap(match direction {
                Direction::Right => SpeedTrap {
                    start: trap.x_start,
                    end: trap.x_end,
                },
                _ => SpeedTrap {
                    start: trap.x_end,
                    end: trap.x_start,
                },
            });
        }
        for crossing in intersections {
            lane.add_intersection(Arc::clone(crossing));
        }
        lanes.push(lane);
    }

    let mut numbered = 0;
    for crossing in intersections {
        let (centre_x, v) = {
            let c = lock_or_recover(crossing);
            ((c.footprint.x1 + c.footprint.x2) / 2.0, c.vertical_lane_count)
        };
        let left = vertical_group_start(centre_x, v);
        for index in 0..2 * v {
            let direction = if index < v { Direction::Down } else { Direction::Up };
            let x = left + lane_offset(index, v) + LANE_INSET;
            let (entry, exit) = match direction {
                Direction::Down => (Point::new(x, 0.0), vertical_length),
                _ => (Point::new(x, vertical_length), 0.0),
            };
            let id = LaneId {
                direction,
                number: numbered + index % v,
            };
            let rng = rng_for(config.seed, lanes.len() as u64);
            let mut lane = Lane::new(id, settings, entry, exit, rng);
            lane.add_intersection(Arc::clone(crossing));
            lanes.push(lane);
        }
        numbered += v;
    }

    lanes
        .into_iter()
        .map(|lane| Arc::new(Mutex::new(lane)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpeedTrapConfig;
    use std::collections::HashSet;

    fn config() -> SimulationConfig {
        SimulationConfig {
            horizontal_lanes: 2,
            vertical_lanes_first: 1,
            vertical_lanes_second: 3,
            speed_trap: Some(SpeedTrapConfig {
                x_start: 300.0,
                x_end: 700.0,
            }),
            seed: Some(1),
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn crossings_follow_lane_counts() {
        let crossings = create_intersections(&config());
        assert_eq!(crossings.len(), 2);
        let first = lock_or_recover(&crossings[0]);
        assert_eq!(first.footprint, Footprint::new(227.0, 273.0, 257.0, 343.0));
        assert_eq!(first.vertical_lane_count, 1);
        assert!(first.is_horizontal_green());
        let second = lock_or_recover(&crossings[1]);
        assert_eq!(second.footprint, Footprint::new(687.0, 813.0, 257.0, 343.0));
        assert_eq!(second.vertical_lane_count, 3);
    }

    #[test]
    fn lanes_are_wired_to_their_crossings() {
        let config = config();
        let crossings = create_intersections(&config);
        let lanes = create_lanes(&config, &crossings);
        assert_eq!(lanes.len(), 2 * 2 + 2 * 1 + 2 * 3);

        let ids: HashSet<LaneId> = lanes.iter().map(|l| lock_or_recover(l).id()).collect();
        assert_eq!(ids.len(), lanes.len());

        for lane in &lanes {
            let lane = lock_or_recover(lane);
            let expected = if lane.direction().is_horizontal() { 2 } else { 1 };
            assert_eq!(lane.intersection_count(), expected, "{}", lane.id());
            assert_eq!(lane.speed_trap().is_some(), lane.direction().is_horizontal());
        }
    }

    #[test]
    fn entries_sit_inside_their_crossing_band() {
        let config = config();
        let crossings = create_intersections(&config);
        let lanes = create_lanes(&config, &crossings);
        let first = lock_or_recover(&crossings[0]).footprint;
        let second = lock_or_recover(&crossings[1]).footprint;
        for lane in &lanes {
            let lane = lock_or_recover(lane);
            let entry = lane.entry();
            match lane.direction() {
                Direction::Right | Direction::Left => {
                    assert!(entry.y > first.y1 && entry.y + LANE_WIDTH <= first.y2 + LANE_INSET);
                }
                Direction::Down | Direction::Up => {
                    let band = if entry.x < TERRAIN_WIDTH / 2.0 { first } else { second };
                    assert!(
                        entry.x > band.x1 && entry.x + LANE_WIDTH <= band.x2 + LANE_INSET,
                        "{}",
                        lane.id()
                    );
                }
            }
        }
    }

    #[test]
    fn left_lanes_measure_the_trap_from_the_right() {
        let config = config();
        let crossings = create_intersections(&config);
        let lanes = create_lanes(&config, &crossings);
        let left = lanes
            .iter()
            .map(|l| lock_or_recover(l))
            .find(|l| l.direction() == Direction::Left)
            .map(|l| (l.speed_trap(), l.entry(), l.exit()))
            .unwrap();
        assert_eq!(
            left.0,
            Some(SpeedTrap {
                start: 700.0,
                end: 300.0
            })
        );
        assert_eq!(left.1.x, TERRAIN_WIDTH + LANE_OVERHANG);
        assert_eq!(left.2, 0.0);
    }
}
