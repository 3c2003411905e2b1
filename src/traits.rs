use crate::Point;

/// Core spatial transformation interface.
///
/// Implementations may not perform any bounds checks on the input,
/// as these transformations generally happen in hot loops.
/// Therefore, they may panic if coordinates or output buffers of incorrect length are given.
pub trait Transformation: std::fmt::Debug + Send + Sync {
    /// Transform a single point from the input space to the output space.
    /// Writes to a pre-allocated output buffer.
    fn transform_into(&self, pt: &[f64], buf: &mut [f64]);

    /// Transform multiple points from the input space into the output space.
    /// Writes to pre-allocated output buffers.
    ///
    /// The trait default implementation simply calls [Transformation::transform_into] in turn;
    /// specific transforms may override it.
    fn bulk_transform_into(&self, pts: &[&[f64]], bufs: &mut [&mut [f64]]) {
        for (pt, buf) in pts.iter().zip(bufs.iter_mut()) {
            self.transform_into(pt, buf);
        }
    }
}

/// Allocating convenience wrapper for 2D [Transformation]s over `[y, x]` points.
pub trait MapPoints {
    fn map_point(&self, pt: Point) -> Point;

    fn map_points(&self, pts: &[Point]) -> Vec<Point>;
}

impl<T: Transformation + ?Sized> MapPoints for T {
    fn map_point(&self, pt: Point) -> Point {
        let mut out = [f64::NAN; 2];
        self.transform_into(&pt, &mut out);
        out
    }

    fn map_points(&self, pts: &[Point]) -> Vec<Point> {
        let refs: Vec<&[f64]> = pts.iter().map(|p| p.as_slice()).collect();
        let mut out = vec![[f64::NAN; 2]; pts.len()];
        let mut out_refs: Vec<&mut [f64]> = out.iter_mut().map(|b| b.as_mut_slice()).collect();
        self.bulk_transform_into(&refs, &mut out_refs);
        out
    }
}
