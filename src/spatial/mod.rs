//! Spatial indexes over a controller's points, for hit-testing.
mod kdtree;
pub use kdtree::KdTree;
mod map;
pub use map::{BlendFactor, POINT_TOLERANCE, SpatialMap, Tween, tweened_points};
mod registry;
pub use registry::SpatialMapRegistry;
