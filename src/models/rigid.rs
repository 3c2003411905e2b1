use crate::{
    EditError, EditResult, MapPoints, Point,
    model::{ChangeEvent, SourceRotatable, TargetRotatable, TransformModel},
    points::{add, sub},
    transforms::Rotation,
};

/// Rotation about a Source-space center, followed by a translation.
///
/// Has no control points; only the rotation capabilities are editable.
#[derive(Debug)]
pub struct RigidModel {
    angle: f64,
    translation: Point,
    center: Point,
    changed: ChangeEvent,
}

impl RigidModel {
    pub fn try_new(angle: f64, translation: Point, center: Point) -> EditResult<Self> {
        if !angle.is_finite() || translation.iter().chain(center.iter()).any(|v| !v.is_finite())
        {
            return Err(EditError::InvalidArgument(
                "rigid parameters must be finite".into(),
            ));
        }
        Ok(Self {
            angle,
            translation,
            center,
            changed: ChangeEvent::default(),
        })
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn translation(&self) -> Point {
        self.translation
    }

    pub fn center(&self) -> Point {
        self.center
    }

    fn forward_one(&self, p: Point) -> Point {
        add(
            Rotation::from_angle(self.angle, self.center).map_point(p),
            self.translation,
        )
    }
}

impl TransformModel for RigidModel {
    fn kind(&self) -> &'static str {
        "rigid"
    }

    fn transform(&self, points: &[Point]) -> Vec<Point> {
        let rotation = Rotation::from_angle(self.angle, self.center);
        rotation
            .map_points(points)
            .into_iter()
            .map(|p| add(p, self.translation))
            .collect()
    }

    fn inverse_transform(&self, points: &[Point]) -> Vec<Point> {
        let rotation = Rotation::from_angle(self.angle, self.center).inverse();
        let shifted: Vec<Point> = points.iter().map(|p| sub(*p, self.translation)).collect();
        rotation.map_points(&shifted)
    }

    fn change_event(&self) -> Option<&ChangeEvent> {
        Some(&self.changed)
    }

    fn as_source_rotatable_mut(&mut self) -> Option<&mut dyn SourceRotatable> {
        Some(self)
    }

    fn as_target_rotatable_mut(&mut self) -> Option<&mut dyn TargetRotatable> {
        Some(self)
    }
}

impl SourceRotatable for RigidModel {
    /// Rotate Source content by `angle` about `center` while keeping its Target image fixed,
    /// i.e. compose the inverse rotation before the existing mapping.
    fn rotate_source(&mut self, angle: f64, center: Option<Point>) {
        let pivot = center.unwrap_or(self.center);
        let new_angle = self.angle - angle;
        // T'(u) = R(a)(R(-da)(u - p) + p - c) + c + t, rewritten about c
        let pivot_shift =
            Rotation::from_angle(new_angle, [0.0, 0.0]).map_point(sub(self.center, pivot));
        let old_shift =
            Rotation::from_angle(self.angle, [0.0, 0.0]).map_point(sub(pivot, self.center));
        self.translation = add(add(pivot_shift, old_shift), self.translation);
        self.angle = new_angle;
        self.changed.fire(());
    }
}

impl TargetRotatable for RigidModel {
    fn rotate_target(&mut self, angle: f64, center: Option<Point>) {
        let pivot = center.unwrap_or_else(|| self.forward_one(self.center));
        // T'(s) = R(da)(T(s) - q) + q
        let moved =
            Rotation::from_angle(angle, pivot).map_point(add(self.center, self.translation));
        self.translation = sub(moved, self.center);
        self.angle += angle;
        self.changed.fire(());
    }
}
