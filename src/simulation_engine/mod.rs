pub mod clock;
pub mod geometry;
pub mod intersections;
pub mod lanes;
pub mod layout;
pub mod simulation;
pub mod vehicles;
pub mod weather;
