use smallvec::ToSmallVec;

use crate::{Point, ShortVec, Transformation, matrix::Matrix};

#[derive(Debug, Clone)]
pub struct Affine {
    /// For a transform from N to M dimensions,
    /// this has M rows and N columns
    unaugmented: Matrix,
    translation: ShortVec<f64>,
}

impl Affine {
    pub fn try_new(unaugmented: Matrix, translation: &[f64]) -> Result<Self, String> {
        if unaugmented.nrows() != translation.len() {
            return Err(
                "Affine: dimension mismatch between unaugmented matrix and translation vector"
                    .to_string(),
            );
        }
        Ok(Self {
            unaugmented,
            translation: translation.to_smallvec(),
        })
    }

    /// Pure translation of a 2D point.
    pub fn translation_2d(offset: Point) -> Self {
        Self {
            unaugmented: Matrix::identity(2),
            translation: smallvec::smallvec![offset[0], offset[1]],
        }
    }

    /// The affine map taking each vertex of the `from` triangle onto the matching `to` vertex.
    ///
    /// Fails if `from` is degenerate (collinear).
    pub fn try_from_triangles(from: [Point; 3], to: [Point; 3]) -> Result<Self, String> {
        let edges = |tri: &[Point; 3]| {
            #[rustfmt::skip]
            let data = vec![
                tri[1][0] - tri[0][0], tri[2][0] - tri[0][0],
                tri[1][1] - tri[0][1], tri[2][1] - tri[0][1],
            ];
            Matrix::try_new(data, 2)
        };
        let from_edges = edges(&from)?.inverse()?;
        let unaugmented = edges(&to)?.compose(&from_edges)?;
        let mut origin = [f64::NAN; 2];
        unaugmented.matmul_into(&from[0], &mut origin);
        let translation = [to[0][0] - origin[0], to[0][1] - origin[1]];
        Self::try_new(unaugmented, &translation)
    }
}

impl Transformation for Affine {
    fn transform_into(&self, pt: &[f64], buf: &mut [f64]) {
        self.unaugmented.matmul_into(pt, buf);
        for (o, t) in buf.iter_mut().zip(self.translation.iter()) {
            *o += t;
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::Affine;
    use crate::{MapPoints, Matrix, tests::check_transform_bulk};

    fn make_transform() -> Affine {
        #[rustfmt::skip]
        let arr = vec![
            1.5, 0.2,
            -0.3, 0.9,
        ];
        Affine::try_new(Matrix::try_new(arr, 2).unwrap(), &[20.0, -3.0]).unwrap()
    }

    #[test]
    fn test_bulk() {
        check_transform_bulk(make_transform());
    }

    #[test]
    fn maps_triangle_vertices() {
        let from = [[0.0, 0.0], [0.0, 10.0], [10.0, 0.0]];
        let to = [[5.0, 5.0], [7.0, 20.0], [16.0, 4.0]];
        let aff = Affine::try_from_triangles(from, to).unwrap();
        for (f, t) in from.iter().zip(to.iter()) {
            assert_abs_diff_eq!(
                aff.map_point(*f).as_slice(),
                t.as_slice(),
                epsilon = 1e-10
            );
        }
    }

    #[test]
    fn degenerate_triangle_fails() {
        let from = [[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]];
        assert!(Affine::try_from_triangles(from, from).is_err());
    }

    #[test]
    fn translation_only() {
        let aff = Affine::translation_2d([1.0, -2.0]);
        assert_eq!(aff.map_point([3.0, 3.0]), [4.0, 1.0]);
    }
}
