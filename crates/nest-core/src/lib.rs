pub mod error;
pub mod geometry;

pub use error::Error;
pub use geometry::{Bounds, Point2D, Polygon};
