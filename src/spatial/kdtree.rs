use ordered_float::OrderedFloat;

use crate::{Point, points::distance_squared};

/// Balanced 2D k-d tree over `[y, x]` points.
///
/// Built once per point set and replaced wholesale when the points change;
/// there is no incremental insertion or removal.
#[derive(Debug, Clone)]
pub struct KdTree {
    nodes: Vec<KdNode>,
    points: Vec<Point>,
}

#[derive(Debug, Clone)]
struct KdNode {
    point_idx: usize,
    left: Option<usize>,
    right: Option<usize>,
    /// 0 = y, 1 = x
    split_dim: usize,
}

impl KdTree {
    /// Median-split construction. An empty point set gives an empty tree.
    pub fn build(points: &[Point]) -> Self {
        let mut indices: Vec<usize> = (0..points.len()).collect();
        let mut nodes = Vec::with_capacity(points.len());
        Self::build_recursive(points, &mut indices, 0, &mut nodes);
        Self {
            nodes,
            points: points.to_vec(),
        }
    }

    fn build_recursive(
        points: &[Point],
        indices: &mut [usize],
        depth: usize,
        nodes: &mut Vec<KdNode>,
    ) -> Option<usize> {
        if indices.is_empty() {
            return None;
        }
        let split_dim = depth % 2;
        let median = indices.len() / 2;
        indices.select_nth_unstable_by_key(median, |&i| OrderedFloat(points[i][split_dim]));
        let point_idx = indices[median];

        let node_idx = nodes.len();
        nodes.push(KdNode {
            point_idx,
            left: None,
            right: None,
            split_dim,
        });

        let (left_indices, right_part) = indices.split_at_mut(median);
        let left = Self::build_recursive(points, left_indices, depth + 1, nodes);
        let right = Self::build_recursive(points, &mut right_part[1..], depth + 1, nodes);
        nodes[node_idx].left = left;
        nodes[node_idx].right = right;
        Some(node_idx)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Indices of every point at most `radius` from `query`, unordered.
    pub fn within(&self, query: Point, radius: f64) -> Vec<usize> {
        let mut found = Vec::new();
        if !self.nodes.is_empty() && radius >= 0.0 {
            self.within_recursive(0, &query, radius * radius, &mut found);
        }
        found
    }

    fn within_recursive(
        &self,
        node_idx: usize,
        query: &Point,
        radius_sq: f64,
        found: &mut Vec<usize>,
    ) {
        let node = &self.nodes[node_idx];
        let point = &self.points[node.point_idx];
        if distance_squared(query, point) <= radius_sq {
            found.push(node.point_idx);
        }

        let diff = query[node.split_dim] - point[node.split_dim];
        let diff_sq = diff * diff;
        if let Some(left) = node.left {
            if diff <= 0.0 || diff_sq <= radius_sq {
                self.within_recursive(left, query, radius_sq, found);
            }
        }
        if let Some(right) = node.right {
            if diff >= 0.0 || diff_sq <= radius_sq {
                self.within_recursive(right, query, radius_sq, found);
            }
        }
    }

    /// Closest point to `query` as `(index, squared distance)`.
    pub fn nearest(&self, query: Point) -> Option<(usize, f64)> {
        if self.nodes.is_empty() {
            return None;
        }
        let mut best = (usize::MAX, f64::INFINITY);
        self.nearest_recursive(0, &query, &mut best);
        Some(best)
    }

    fn nearest_recursive(&self, node_idx: usize, query: &Point, best: &mut (usize, f64)) {
        let node = &self.nodes[node_idx];
        let point = &self.points[node.point_idx];
        let dist_sq = distance_squared(query, point);
        if dist_sq < best.1 || (dist_sq == best.1 && node.point_idx < best.0) {
            *best = (node.point_idx, dist_sq);
        }

        let diff = query[node.split_dim] - point[node.split_dim];
        let (first, second) = if diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };
        if let Some(first) = first {
            self.nearest_recursive(first, query, best);
        }
        // the far side can only help if the splitting line is closer than the best so far
        if let Some(second) = second {
            if diff * diff <= best.1 {
                self.nearest_recursive(second, query, best);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::random_points;

    fn brute_within(points: &[Point], query: Point, radius: f64) -> Vec<usize> {
        points
            .iter()
            .enumerate()
            .filter(|(_, p)| distance_squared(p, &query) <= radius * radius)
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn empty_tree() {
        let tree = KdTree::build(&[]);
        assert!(tree.is_empty());
        assert!(tree.within([0.0, 0.0], 10.0).is_empty());
        assert!(tree.nearest([0.0, 0.0]).is_none());
    }

    #[test]
    fn within_matches_brute_force() {
        let points = random_points(500, 100.0);
        let tree = KdTree::build(&points);
        assert_eq!(tree.len(), 500);
        for query in random_points(20, 120.0) {
            for radius in [0.5, 5.0, 25.0] {
                let mut found = tree.within(query, radius);
                found.sort_unstable();
                assert_eq!(found, brute_within(&points, query, radius));
            }
        }
    }

    #[test]
    fn within_is_inclusive() {
        let tree = KdTree::build(&[[0.0, 0.0], [0.0, 3.0], [4.0, 0.0]]);
        let mut found = tree.within([0.0, 0.0], 4.0);
        found.sort_unstable();
        assert_eq!(found, vec![0, 1, 2]);
    }

    #[test]
    fn negative_radius_finds_nothing() {
        let tree = KdTree::build(&[[0.0, 0.0]]);
        assert!(tree.within([0.0, 0.0], -1.0).is_empty());
    }

    #[test]
    fn nearest_matches_brute_force() {
        let points = random_points(300, 50.0);
        let tree = KdTree::build(&points);
        for query in [[0.0, 0.0], [25.0, 25.0], [60.0, -10.0]] {
            let (idx, dist_sq) = tree.nearest(query).unwrap();
            let best = points
                .iter()
                .map(|p| distance_squared(p, &query))
                .fold(f64::INFINITY, f64::min);
            assert_eq!(dist_sq, best);
            assert_eq!(distance_squared(&points[idx], &query), best);
        }
    }

    #[test]
    fn duplicate_points() {
        let tree = KdTree::build(&[[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]]);
        assert_eq!(tree.within([1.0, 1.0], 0.0).len(), 3);
        assert_eq!(tree.nearest([1.0, 1.0]), Some((0, 0.0)));
    }
}
