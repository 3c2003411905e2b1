//! Piecewise-affine transform over a triangulated point set.
use std::sync::{Arc, RwLock};

use ordered_float::OrderedFloat;

use crate::{
    Affine, Bounds, Correspondence, EditError, EditResult, FlipAxis, MapPoints, Point,
    PointIndex, Space,
    model::{
        AddRemovePoints, ChangeEvent, ControlPoints, DiscreteBounds, SourceEditable,
        SourceRotatable, SourceTriangulated, TargetEditable, TargetRotatable, TargetTriangulated,
        TransformModel,
    },
    points::{
        centroid, correspondence, distance_squared, point_in, source_of, sub, target_of,
    },
    transforms::Rotation,
};

/// Triangulation needs at least this many correspondences.
pub const MIN_MESH_POINTS: usize = 3;

/// Barycentric slack so that points on a shared edge land in a triangle.
const EDGE_TOLERANCE: f64 = 1e-9;

/// Correspondences joined into a Delaunay mesh in each space.
///
/// A Source point is mapped through the affine map of the Source-space triangle containing it;
/// Target points are mapped back through the Target-space triangulation.
/// Points outside the hull use the triangle whose centroid is nearest.
#[derive(Debug)]
pub struct MeshModel {
    points: Vec<Correspondence>,
    changed: ChangeEvent,
    mesh: RwLock<Option<Arc<Mesh>>>,
}

#[derive(Debug)]
struct Mesh {
    forward: Piecewise,
    inverse: Piecewise,
}

/// One triangulation, with the affine map for each triangle.
#[derive(Debug)]
struct Piecewise {
    triangles: Vec<[usize; 3]>,
    vertices: Vec<Point>,
    maps: Vec<Option<Affine>>,
    centroids: Vec<Point>,
    /// Used when no triangle has a map, e.g. for collinear points.
    fallback: Affine,
}

impl MeshModel {
    pub fn try_new(points: Vec<Correspondence>) -> EditResult<Self> {
        validate(&points)?;
        Ok(Self {
            points,
            changed: ChangeEvent::default(),
            mesh: RwLock::new(None),
        })
    }

    /// Build from Source points and the Target points they map to.
    pub fn try_from_pairs(source: &[Point], target: &[Point]) -> EditResult<Self> {
        if source.len() != target.len() {
            return Err(EditError::InvalidArgument(format!(
                "{} source points but {} target points",
                source.len(),
                target.len()
            )));
        }
        Self::try_new(
            source
                .iter()
                .zip(target.iter())
                .map(|(s, t)| correspondence(*s, *t))
                .collect(),
        )
    }

    fn mesh(&self) -> Arc<Mesh> {
        if let Some(m) = self.mesh.read().expect("should not be poisoned").as_ref() {
            return m.clone();
        }
        let mut guard = self.mesh.write().expect("should not be poisoned");
        guard
            .get_or_insert_with(|| {
                log::debug!("Triangulating mesh of {} points", self.points.len());
                Arc::new(Mesh::build(&self.points))
            })
            .clone()
    }

    /// Drop the cached mesh and notify subscribers.
    fn touched(&mut self) {
        *self.mesh.get_mut().expect("should not be poisoned") = None;
        self.changed.fire(());
    }

    fn check_indices(&self, index: &PointIndex, n_points: usize) -> EditResult<()> {
        if index.len() != n_points {
            return Err(EditError::InvalidArgument(format!(
                "{} indices but {} points",
                index.len(),
                n_points
            )));
        }
        if index.max() >= self.points.len() {
            return Err(EditError::InvalidIndex(format!(
                "index {} out of range for {} points",
                index.max(),
                self.points.len()
            )));
        }
        Ok(())
    }

    fn map_space(&mut self, space: Space, f: impl Fn(Point) -> Point) {
        let offset = match space {
            Space::Source => 0,
            Space::Target => 2,
        };
        for c in self.points.iter_mut() {
            let moved = f([c[offset], c[offset + 1]]);
            c[offset] = moved[0];
            c[offset + 1] = moved[1];
        }
        self.touched();
    }

    fn rotate(&mut self, space: Space, angle: f64, center: Option<Point>) {
        let pts: Vec<Point> = self.points.iter().map(|c| point_in(c, space)).collect();
        let Some(center) = center.or_else(|| centroid(&pts)) else {
            return;
        };
        let rotation = Rotation::from_angle(angle, center);
        self.map_space(space, |p| rotation.map_point(p));
    }

    fn update(&mut self, space: Space, index: &PointIndex, points: &[Point]) -> EditResult<()> {
        self.check_indices(index, points.len())?;
        let offset = match space {
            Space::Source => 0,
            Space::Target => 2,
        };
        for (idx, p) in index.iter().zip(points.iter()) {
            self.points[idx][offset] = p[0];
            self.points[idx][offset + 1] = p[1];
        }
        self.touched();
        Ok(())
    }
}

fn validate(points: &[Correspondence]) -> EditResult<()> {
    if points.len() < MIN_MESH_POINTS {
        return Err(EditError::ValidationViolation(format!(
            "mesh needs at least {MIN_MESH_POINTS} points, got {}",
            points.len()
        )));
    }
    if points.iter().flatten().any(|v| !v.is_finite()) {
        return Err(EditError::InvalidArgument(
            "mesh points must be finite".into(),
        ));
    }
    Ok(())
}

impl Mesh {
    fn build(points: &[Correspondence]) -> Self {
        let source: Vec<Point> = points.iter().map(source_of).collect();
        let target: Vec<Point> = points.iter().map(target_of).collect();
        Self {
            forward: Piecewise::build(&source, &target),
            inverse: Piecewise::build(&target, &source),
        }
    }
}

impl Piecewise {
    fn build(from: &[Point], to: &[Point]) -> Self {
        let triangles = triangulate(from);
        let maps = triangles
            .iter()
            .map(|tri| {
                let f = tri.map(|i| from[i]);
                let t = tri.map(|i| to[i]);
                match Affine::try_from_triangles(f, t) {
                    Ok(a) => Some(a),
                    Err(e) => {
                        log::debug!("Skipping triangle {tri:?}: {e}");
                        None
                    }
                }
            })
            .collect();
        let centroids = triangles
            .iter()
            .map(|tri| centroid(&tri.map(|i| from[i])).unwrap_or([f64::NAN; 2]))
            .collect();
        let mean_offset = match (centroid(to), centroid(from)) {
            (Some(t), Some(f)) => sub(t, f),
            _ => [0.0, 0.0],
        };
        Self {
            triangles,
            vertices: from.to_vec(),
            maps,
            centroids,
            fallback: Affine::translation_2d(mean_offset),
        }
    }

    fn containing(&self, p: &Point) -> Option<&Affine> {
        self.triangles
            .iter()
            .zip(self.maps.iter())
            .filter_map(|(tri, map)| map.as_ref().map(|m| (tri, m)))
            .find(|(tri, _)| contains(&tri.map(|i| self.vertices[i]), p))
            .map(|(_, m)| m)
    }

    fn closest(&self, p: &Point) -> Option<&Affine> {
        self.centroids
            .iter()
            .zip(self.maps.iter())
            .filter_map(|(c, map)| map.as_ref().map(|m| (c, m)))
            .min_by_key(|(c, _)| OrderedFloat(distance_squared(c, p)))
            .map(|(_, m)| m)
    }

    fn map(&self, points: &[Point]) -> Vec<Point> {
        points
            .iter()
            .map(|p| {
                let map = self
                    .containing(p)
                    .or_else(|| self.closest(p))
                    .unwrap_or(&self.fallback);
                map.map_point(*p)
            })
            .collect()
    }
}

fn triangulate(points: &[Point]) -> Vec<[usize; 3]> {
    let pts: Vec<delaunator::Point> = points
        .iter()
        .map(|p| delaunator::Point { x: p[1], y: p[0] })
        .collect();
    delaunator::triangulate(&pts)
        .triangles
        .chunks_exact(3)
        .map(|t| [t[0], t[1], t[2]])
        .collect()
}

fn contains(tri: &[Point; 3], p: &Point) -> bool {
    let [a, b, c] = tri;
    let det = (b[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (b[1] - a[1]);
    if det == 0.0 {
        return false;
    }
    let l1 = ((p[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (p[1] - a[1])) / det;
    let l2 = ((b[0] - a[0]) * (p[1] - a[1]) - (p[0] - a[0]) * (b[1] - a[1])) / det;
    l1 >= -EDGE_TOLERANCE && l2 >= -EDGE_TOLERANCE && l1 + l2 <= 1.0 + EDGE_TOLERANCE
}

impl TransformModel for MeshModel {
    fn kind(&self) -> &'static str {
        "mesh"
    }

    fn transform(&self, points: &[Point]) -> Vec<Point> {
        self.mesh().forward.map(points)
    }

    fn inverse_transform(&self, points: &[Point]) -> Vec<Point> {
        self.mesh().inverse.map(points)
    }

    fn change_event(&self) -> Option<&ChangeEvent> {
        Some(&self.changed)
    }

    fn as_control_points(&self) -> Option<&dyn ControlPoints> {
        Some(self)
    }

    fn as_control_points_mut(&mut self) -> Option<&mut dyn ControlPoints> {
        Some(self)
    }

    fn as_discrete_bounds(&self) -> Option<&dyn DiscreteBounds> {
        Some(self)
    }

    fn as_add_remove_mut(&mut self) -> Option<&mut dyn AddRemovePoints> {
        Some(self)
    }

    fn as_source_editable_mut(&mut self) -> Option<&mut dyn SourceEditable> {
        Some(self)
    }

    fn as_target_editable_mut(&mut self) -> Option<&mut dyn TargetEditable> {
        Some(self)
    }

    fn as_source_rotatable_mut(&mut self) -> Option<&mut dyn SourceRotatable> {
        Some(self)
    }

    fn as_target_rotatable_mut(&mut self) -> Option<&mut dyn TargetRotatable> {
        Some(self)
    }

    fn as_source_triangulation(&self) -> Option<&dyn SourceTriangulated> {
        Some(self)
    }

    fn as_target_triangulation(&self) -> Option<&dyn TargetTriangulated> {
        Some(self)
    }
}

impl ControlPoints for MeshModel {
    fn len(&self) -> usize {
        self.points.len()
    }

    fn points(&self) -> Vec<Correspondence> {
        self.points.clone()
    }

    fn set_points(&mut self, points: &[Correspondence]) -> EditResult<()> {
        validate(points)?;
        self.points = points.to_vec();
        self.touched();
        Ok(())
    }

    fn update_internal_structures(&self) {
        self.mesh();
    }
}

impl DiscreteBounds for MeshModel {
    fn source_bounds(&self) -> Option<Bounds> {
        Bounds::enclosing(&self.source_points())
    }

    fn target_bounds(&self) -> Option<Bounds> {
        Bounds::enclosing(&self.target_points())
    }
}

impl AddRemovePoints for MeshModel {
    fn min_points(&self) -> usize {
        MIN_MESH_POINTS
    }

    fn add_point(&mut self, point: Correspondence) -> EditResult<usize> {
        if point.iter().any(|v| !v.is_finite()) {
            return Err(EditError::InvalidArgument(
                "mesh points must be finite".into(),
            ));
        }
        self.points.push(point);
        self.touched();
        Ok(self.points.len() - 1)
    }

    fn remove_points(&mut self, index: &PointIndex) -> EditResult<()> {
        if index.max() >= self.points.len() {
            return Err(EditError::InvalidIndex(format!(
                "index {} out of range for {} points",
                index.max(),
                self.points.len()
            )));
        }
        let mut doomed: Vec<usize> = index.iter().collect();
        doomed.sort_unstable();
        doomed.dedup();
        let remaining = self.points.len() - doomed.len();
        if remaining < MIN_MESH_POINTS {
            return Err(EditError::ValidationViolation(format!(
                "removing {} points would leave {remaining}, mesh needs {MIN_MESH_POINTS}",
                doomed.len()
            )));
        }
        for idx in doomed.into_iter().rev() {
            self.points.remove(idx);
        }
        self.touched();
        Ok(())
    }
}

impl SourceEditable for MeshModel {
    fn translate_source(&mut self, offset: Point) {
        self.map_space(Space::Source, |p| [p[0] + offset[0], p[1] + offset[1]]);
    }

    fn update_source_points(&mut self, index: &PointIndex, points: &[Point]) -> EditResult<()> {
        self.update(Space::Source, index, points)
    }

    fn flip_source(&mut self, axis: FlipAxis) {
        let Some(center) = Bounds::enclosing(&self.source_points()).map(|b| b.center()) else {
            return;
        };
        self.map_space(Space::Source, |p| match axis {
            FlipAxis::Horizontal => [p[0], 2.0 * center[1] - p[1]],
            FlipAxis::Vertical => [2.0 * center[0] - p[0], p[1]],
        });
    }
}

impl TargetEditable for MeshModel {
    fn translate_target(&mut self, offset: Point) {
        self.map_space(Space::Target, |p| [p[0] + offset[0], p[1] + offset[1]]);
    }

    fn update_target_points(&mut self, index: &PointIndex, points: &[Point]) -> EditResult<()> {
        self.update(Space::Target, index, points)
    }
}

impl SourceRotatable for MeshModel {
    fn rotate_source(&mut self, angle: f64, center: Option<Point>) {
        self.rotate(Space::Source, angle, center);
    }
}

impl TargetRotatable for MeshModel {
    fn rotate_target(&mut self, angle: f64, center: Option<Point>) {
        self.rotate(Space::Target, angle, center);
    }
}

impl SourceTriangulated for MeshModel {
    fn source_triangles(&self) -> Vec<[usize; 3]> {
        self.mesh().forward.triangles.clone()
    }
}

impl TargetTriangulated for MeshModel {
    fn target_triangles(&self) -> Vec<[usize; 3]> {
        self.mesh().inverse.triangles.clone()
    }
}
