pub mod interpolation;
pub mod position;

pub use interpolation::{Interpolatable, Interpolation};
pub use position::{LiveSample, PositionInterpolator, PositionSample};
