//! Numerical primitives for adaptive sequential testing.

pub mod math;

pub use math::normal::*;
pub use math::quadrature::{expect_below, normal_grid, Extrapolate, SimpsonGrid, Tabulated, GRID_SPAN};
pub use math::roots::{bisect, BisectionConfig, Root, RootError};
pub use math::stable::*;
