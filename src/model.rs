//! The transform model contract.
//!
//! A model maps Source points to Target points and back.
//! Everything else it can do is an optional capability:
//! each capability is its own trait, and [TransformModel] exposes one accessor per capability
//! which returns `None` unless the variant implements it.
//! Callers decide behaviour by matching on those accessors.
use std::sync::{Arc, RwLock};

use ordered_float::OrderedFloat;

use crate::{
    Bounds, Correspondence, EditResult, FlipAxis, Point, PointIndex, Space, event::Event,
    points::{distance_squared, point_in, source_of, target_of},
};

/// Notification raised by a model whenever its points may have moved.
pub type ChangeEvent = Event<()>;

/// Shared handle onto a model; identity is the allocation.
pub type ModelRef = Arc<RwLock<dyn TransformModel>>;

pub fn share<M: TransformModel + 'static>(model: M) -> ModelRef {
    Arc::new(RwLock::new(model))
}

/// Whether two handles refer to the same model instance.
pub fn same_model(a: &ModelRef, b: &ModelRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nearest {
    pub index: usize,
    pub distance: f64,
}

pub trait TransformModel: std::fmt::Debug + Send + Sync {
    /// Name of the variant, e.g. `"mesh"`.
    /// Consumers compare kinds to detect that a replacement model behaves differently.
    fn kind(&self) -> &'static str;

    /// Map Source points into Target space.
    fn transform(&self, points: &[Point]) -> Vec<Point>;

    /// Map Target points into Source space.
    fn inverse_transform(&self, points: &[Point]) -> Vec<Point>;

    fn change_event(&self) -> Option<&ChangeEvent> {
        None
    }

    fn as_control_points(&self) -> Option<&dyn ControlPoints> {
        None
    }

    fn as_control_points_mut(&mut self) -> Option<&mut dyn ControlPoints> {
        None
    }

    fn as_discrete_bounds(&self) -> Option<&dyn DiscreteBounds> {
        None
    }

    fn as_add_remove_mut(&mut self) -> Option<&mut dyn AddRemovePoints> {
        None
    }

    fn as_source_editable_mut(&mut self) -> Option<&mut dyn SourceEditable> {
        None
    }

    fn as_target_editable_mut(&mut self) -> Option<&mut dyn TargetEditable> {
        None
    }

    fn as_source_rotatable_mut(&mut self) -> Option<&mut dyn SourceRotatable> {
        None
    }

    fn as_target_rotatable_mut(&mut self) -> Option<&mut dyn TargetRotatable> {
        None
    }

    fn as_source_triangulation(&self) -> Option<&dyn SourceTriangulated> {
        None
    }

    fn as_target_triangulation(&self) -> Option<&dyn TargetTriangulated> {
        None
    }
}

/// Enumerable correspondences.
///
/// Source and Target counts are always equal.
pub trait ControlPoints {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn points(&self) -> Vec<Correspondence>;

    fn source_points(&self) -> Vec<Point> {
        self.points().iter().map(source_of).collect()
    }

    fn target_points(&self) -> Vec<Point> {
        self.points().iter().map(target_of).collect()
    }

    fn points_in(&self, space: Space) -> Vec<Point> {
        match space {
            Space::Source => self.source_points(),
            Space::Target => self.target_points(),
        }
    }

    /// Replace every correspondence at once.
    fn set_points(&mut self, points: &[Correspondence]) -> EditResult<()>;

    /// Closest point to `pt` in `space`.
    ///
    /// `Ok(None)` means there are no points; `Err` means the query itself failed.
    fn nearest(&self, pt: Point, space: Space) -> EditResult<Option<Nearest>> {
        Ok(self
            .points()
            .iter()
            .enumerate()
            .map(|(index, c)| (index, distance_squared(&point_in(c, space), &pt)))
            .min_by_key(|(_, d)| OrderedFloat(*d))
            .map(|(index, d)| Nearest {
                index,
                distance: d.sqrt(),
            }))
    }

    fn points_in_rect(&self, bounds: &Bounds, space: Space) -> Vec<usize> {
        self.points()
            .iter()
            .enumerate()
            .filter(|(_, c)| bounds.contains(&point_in(c, space)))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Hook for eagerly rebuilding expensive internal structures,
    /// e.g. a triangulation, which would otherwise be rebuilt lazily.
    fn update_internal_structures(&self) {}
}

pub trait DiscreteBounds {
    fn source_bounds(&self) -> Option<Bounds>;

    fn target_bounds(&self) -> Option<Bounds>;
}

pub trait AddRemovePoints {
    /// Fewest points the model can hold.
    fn min_points(&self) -> usize;

    /// Returns the index of the new correspondence.
    fn add_point(&mut self, point: Correspondence) -> EditResult<usize>;

    /// Remove all given indices or none of them.
    ///
    /// Fails with [crate::EditError::ValidationViolation]
    /// if fewer than [AddRemovePoints::min_points] would remain.
    fn remove_points(&mut self, index: &PointIndex) -> EditResult<()>;
}

pub trait SourceEditable {
    fn translate_source(&mut self, offset: Point);

    /// `points` has one entry per index.
    fn update_source_points(&mut self, index: &PointIndex, points: &[Point]) -> EditResult<()>;

    /// Mirror Source points about the center of their bounding box.
    fn flip_source(&mut self, axis: FlipAxis);
}

pub trait TargetEditable {
    fn translate_target(&mut self, offset: Point);

    /// `points` has one entry per index.
    fn update_target_points(&mut self, index: &PointIndex, points: &[Point]) -> EditResult<()>;
}

pub trait SourceRotatable {
    /// Rotate Source points by `angle` radians about `center`,
    /// defaulting to a center of the model's choosing.
    fn rotate_source(&mut self, angle: f64, center: Option<Point>);
}

pub trait TargetRotatable {
    /// Rotate Target points by `angle` radians about `center`,
    /// defaulting to a center of the model's choosing.
    fn rotate_target(&mut self, angle: f64, center: Option<Point>);
}

/// Triangle index buffers refer to correspondence indices.
pub trait SourceTriangulated {
    fn source_triangles(&self) -> Vec<[usize; 3]>;
}

pub trait TargetTriangulated {
    fn target_triangles(&self) -> Vec<[usize; 3]>;
}
