use crate::{Point, Transformation, matrix::Matrix};

/// Rotation about an arbitrary center.
#[derive(Debug, Clone)]
pub struct Rotation {
    matrix: Matrix,
    center: Point,
}

impl Rotation {
    /// Rotate by `angle` radians about `center`, from +X towards +Y.
    pub fn from_angle(angle: f64, center: Point) -> Self {
        Self {
            matrix: Matrix::rotation_yx(angle),
            center,
        }
    }

    /// The opposite rotation about the same center.
    pub fn inverse(&self) -> Self {
        Self {
            matrix: self.matrix.transpose(),
            center: self.center,
        }
    }
}

impl Transformation for Rotation {
    fn transform_into(&self, pt: &[f64], buf: &mut [f64]) {
        let offset = [pt[0] - self.center[0], pt[1] - self.center[1]];
        self.matrix.matmul_into(&offset, buf);
        buf[0] += self.center[0];
        buf[1] += self.center[1];
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;

    use approx::assert_abs_diff_eq;

    use super::Rotation;
    use crate::MapPoints;
    use crate::tests::{check_inverse_transform, check_transform_bulk};

    fn make_transform() -> Rotation {
        Rotation::from_angle(0.7, [10.0, -5.0])
    }

    #[test]
    fn test_bulk() {
        check_transform_bulk(make_transform());
    }

    #[test]
    fn test_inverse() {
        let rot = make_transform();
        check_inverse_transform(&rot, &rot.inverse());
    }

    #[test]
    fn quarter_turn_takes_x_to_y() {
        let rot = Rotation::from_angle(FRAC_PI_2, [0.0, 0.0]);
        let out = rot.map_point([0.0, 1.0]);
        assert_abs_diff_eq!(out.as_slice(), [1.0, 0.0].as_slice(), epsilon = 1e-12);
    }

    #[test]
    fn inverse_is_negated_angle() {
        let inv = Rotation::from_angle(0.4, [3.0, 1.0]).inverse();
        let neg = Rotation::from_angle(-0.4, [3.0, 1.0]);
        let p = [7.0, -2.0];
        assert_abs_diff_eq!(
            inv.map_point(p).as_slice(),
            neg.map_point(p).as_slice(),
            epsilon = 1e-12
        );
    }
}
