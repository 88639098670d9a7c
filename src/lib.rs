pub mod config;
pub mod logging;
pub mod monitors;
pub mod point;
pub mod sink;
pub mod supervisor;
pub mod util;

pub use point::{PointError, TimeSeriesPoint, round1};
