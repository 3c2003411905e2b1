//! Point conventions shared by models, controller and spatial maps.
//!
//! All coordinates are stored Y-then-X, matching image row/column order.

/// A 2D coordinate as `[y, x]`.
pub type Point = [f64; 2];

/// One Source/Target pair as `[source_y, source_x, target_y, target_x]`.
pub type Correspondence = [f64; 4];

/// Which side of the correspondence a coordinate lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Space {
    /// The warped space, mapped _from_.
    Source,
    /// The fixed space, mapped _to_.
    Target,
}

impl Space {
    pub fn other(self) -> Self {
        match self {
            Self::Source => Self::Target,
            Self::Target => Self::Source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipAxis {
    /// Mirror left-right, i.e. negate X about the center.
    Horizontal,
    /// Mirror top-bottom, i.e. negate Y about the center.
    Vertical,
}

/// Axis-aligned bounding box; inclusive on all edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
}

impl Bounds {
    pub fn new(a: Point, b: Point) -> Self {
        Self {
            min: [a[0].min(b[0]), a[1].min(b[1])],
            max: [a[0].max(b[0]), a[1].max(b[1])],
        }
    }

    /// Smallest box containing all points; `None` for no points.
    pub fn enclosing(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut out = Self {
            min: *first,
            max: *first,
        };
        for p in points.iter().skip(1) {
            for d in 0..2 {
                out.min[d] = out.min[d].min(p[d]);
                out.max[d] = out.max[d].max(p[d]);
            }
        }
        Some(out)
    }

    pub fn contains(&self, p: &Point) -> bool {
        (0..2).all(|d| p[d] >= self.min[d] && p[d] <= self.max[d])
    }

    pub fn center(&self) -> Point {
        [
            (self.min[0] + self.max[0]) / 2.0,
            (self.min[1] + self.max[1]) / 2.0,
        ]
    }
}

pub fn source_of(c: &Correspondence) -> Point {
    [c[0], c[1]]
}

pub fn target_of(c: &Correspondence) -> Point {
    [c[2], c[3]]
}

pub fn point_in(c: &Correspondence, space: Space) -> Point {
    match space {
        Space::Source => source_of(c),
        Space::Target => target_of(c),
    }
}

pub fn correspondence(source: Point, target: Point) -> Correspondence {
    [source[0], source[1], target[0], target[1]]
}

pub(crate) fn add(a: Point, b: Point) -> Point {
    [a[0] + b[0], a[1] + b[1]]
}

pub(crate) fn sub(a: Point, b: Point) -> Point {
    [a[0] - b[0], a[1] - b[1]]
}

pub(crate) fn distance_squared(a: &Point, b: &Point) -> f64 {
    let dy = a[0] - b[0];
    let dx = a[1] - b[1];
    dy * dy + dx * dx
}

pub(crate) fn centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (sy, sx) = points
        .iter()
        .fold((0.0, 0.0), |(sy, sx), p| (sy + p[0], sx + p[1]));
    Some([sy / n, sx / n])
}

/// Swap each `[y, x]` into `[x, y]` for renderers which want X first.
pub fn swap_yx(points: &[Point]) -> Vec<[f64; 2]> {
    points.iter().map(|p| [p[1], p[0]]).collect()
}

/// Swap both coordinate pairs of each correspondence,
/// giving `[source_x, source_y, target_x, target_y]`.
pub fn swap_yx_columns(points: &[Correspondence]) -> Vec<[f64; 4]> {
    points.iter().map(|c| [c[1], c[0], c[3], c[2]]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swaps_columns_pairwise() {
        let pts = [[1.0, 2.0, 3.0, 4.0], [5.0, 6.0, 7.0, 8.0]];
        assert_eq!(
            swap_yx_columns(&pts),
            vec![[2.0, 1.0, 4.0, 3.0], [6.0, 5.0, 8.0, 7.0]]
        );
        assert_eq!(swap_yx(&[[1.0, 2.0]]), vec![[2.0, 1.0]]);
    }

    #[test]
    fn enclosing_bounds() {
        assert!(Bounds::enclosing(&[]).is_none());
        let b = Bounds::enclosing(&[[0.0, 5.0], [-2.0, 1.0], [3.0, 2.0]]).unwrap();
        assert_eq!(b.min, [-2.0, 1.0]);
        assert_eq!(b.max, [3.0, 5.0]);
        assert!(b.contains(&[0.0, 1.0]));
        assert!(!b.contains(&[0.0, 0.5]));
        assert_eq!(b.center(), [0.5, 3.0]);
    }

    #[test]
    fn splits_correspondence() {
        let c = correspondence([1.0, 2.0], [3.0, 4.0]);
        assert_eq!(point_in(&c, Space::Source), [1.0, 2.0]);
        assert_eq!(point_in(&c, Space::Target), [3.0, 4.0]);
        assert_eq!(Space::Source.other(), Space::Target);
    }
}
