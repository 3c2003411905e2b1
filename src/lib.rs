//! Interactive editing of point correspondences between a Source and a Target space.
//!
//! A [TransformController] owns one capability-typed [model::TransformModel]
//! and exposes a uniform editing protocol over it,
//! cross-substituting edits into whichever space the model can actually edit.
//! [spatial::SpatialMap]s index the correspondences for hit-testing
//! and rebuild lazily when the controller reports a change.
mod error;
pub use error::{EditError, EditResult};
mod index;
pub use index::{IntoPointIndex, PointIndex};
mod points;
pub use points::{
    Bounds, Correspondence, FlipAxis, Point, Space, correspondence, point_in, source_of,
    swap_yx, swap_yx_columns, target_of,
};
mod matrix;
pub use matrix::Matrix;
mod traits;
pub use traits::{MapPoints, Transformation};
pub mod transforms;
pub use transforms::Affine;

pub mod event;
pub mod model;
pub use model::{ModelRef, TransformModel, share};
pub mod models;

mod controller;
pub use controller::{ControllerConfig, ModelBinding, ModelReplaced, TransformController};
pub mod spatial;

use smallvec::SmallVec;

pub const COORD_SIZE: usize = 6;

/// A short vector type alias for coordinates,
/// which stays on the stack for the dimensionalities used here.
type ShortVec<T> = SmallVec<[T; COORD_SIZE]>;
