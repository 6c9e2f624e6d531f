use serde::{Deserialize, Serialize};
use std::fmt;

/// A point on the terrain, in distance units. `y` grows downwards.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Travel direction of a lane. Right and Down run towards growing coordinates
/// ("forward"), Left and Up towards shrinking ones ("backward").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Right,
    Down,
    Left,
    Up,
}

impl Direction {
    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::Right | Direction::Left)
    }

    pub fn is_forward(self) -> bool {
        matches!(self, Direction::Right | Direction::Down)
    }

    /// +1.0 for forward lanes, -1.0 for backward lanes.
    pub fn sign(self) -> f64 {
        if self.is_forward() {
            1.0
        } else {
            -1.0
        }
    }

    /// Unit vector of travel.
    pub fn unit(self) -> (f64, f64) {
        match self {
            Direction::Right => (1.0, 0.0),
            Direction::Left => (-1.0, 0.0),
            Direction::Down => (0.0, 1.0),
            Direction::Up => (0.0, -1.0),
        }
    }

    /// Coordinate of `p` along the travel axis.
    pub fn axis(self, p: Point) -> f64 {
        if self.is_horizontal() {
            p.x
        } else {
            p.y
        }
    }

    /// Travel-axis coordinate mapped so that "ahead" always means "greater".
    pub fn progress(self, p: Point) -> f64 {
        self.sign() * self.axis(p)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Right => "right",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Up => "up",
        };
        f.write_str(name)
    }
}

/// Axis-aligned rectangle given by its edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    pub x1: f64,
    pub x2: f64,
    pub y1: f64,
    pub y2: f64,
}

impl Footprint {
    pub fn new(x1: f64, x2: f64, y1: f64, y2: f64) -> Self {
        Self { x1, x2, y1, y2 }
    }

    /// Edge a vehicle travelling in `direction` meets first, as a travel-axis coordinate.
    pub fn near_edge(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Right => self.x1,
            Direction::Left => self.x2,
            Direction::Down => self.y1,
            Direction::Up => self.y2,
        }
    }

    /// Does a square of side `size` anchored at `top_left` overlap this rectangle?
    pub fn overlaps_square(&self, top_left: Point, size: f64) -> bool {
        top_left.x <= self.x2
            && top_left.x + size >= self.x1
            && top_left.y <= self.y2
            && top_left.y + size >= self.y1
    }
}

/// Inclusive overlap of two squares of side `size`.
pub fn squares_touch(a: Point, b: Point, size: f64) -> bool {
    let x_touch = (a.x >= b.x && a.x <= b.x + size) || (b.x >= a.x && b.x <= a.x + size);
    let y_touch = (a.y >= b.y && a.y <= b.y + size) || (b.y >= a.y && b.y <= a.y + size);
    x_touch && y_touch
}
