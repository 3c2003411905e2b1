use std::{
    collections::BTreeSet,
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use ordered_float::OrderedFloat;

use super::KdTree;
use crate::{
    EditError, EditResult, Point, Space, TransformController, event::ListenerId, model::Nearest,
};

/// Absolute tolerance below which two indexed coordinates count as unchanged.
pub const POINT_TOLERANCE: f64 = 1e-9;

/// Which point set a [SpatialMap] indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tween {
    Source,
    Target,
    /// Each correspondence interpolated from its Source (0) to its Target (1) position.
    ///
    /// Only [Tween::blend] constructs this variant.
    Blend(BlendFactor),
}

/// An interpolation factor strictly between 0 and 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlendFactor(OrderedFloat<f64>);

impl BlendFactor {
    pub fn get(self) -> f64 {
        self.0.0
    }
}

impl Tween {
    /// Fails unless `0 <= factor <= 1`.
    /// The end points become [Tween::Source] and [Tween::Target].
    pub fn blend(factor: f64) -> EditResult<Self> {
        if !(0.0..=1.0).contains(&factor) {
            return Err(EditError::InvalidArgument(format!(
                "blend factor {factor} outside [0, 1]"
            )));
        }
        Ok(if factor == 0.0 {
            Self::Source
        } else if factor == 1.0 {
            Self::Target
        } else {
            Self::Blend(BlendFactor(OrderedFloat(factor)))
        })
    }

    pub fn factor(&self) -> f64 {
        match self {
            Self::Source => 0.0,
            Self::Target => 1.0,
            Self::Blend(f) => f.get(),
        }
    }
}

impl From<Space> for Tween {
    fn from(value: Space) -> Self {
        match value {
            Space::Source => Self::Source,
            Space::Target => Self::Target,
        }
    }
}

/// The points a [SpatialMap] for `tween` would index.
pub fn tweened_points(controller: &TransformController, tween: Tween) -> Vec<Point> {
    match tween {
        Tween::Source => controller.source_points(),
        Tween::Target => controller.target_points(),
        Tween::Blend(f) => {
            let f = f.get();
            controller
                .points()
                .iter()
                .map(|c| [c[0] + f * (c[2] - c[0]), c[1] + f * (c[3] - c[1])])
                .collect()
        }
    }
}

fn unchanged(old: &[Point], new: &[Point]) -> bool {
    old.len() == new.len()
        && old.iter().zip(new.iter()).all(|(a, b)| {
            (a[0] - b[0]).abs() <= POINT_TOLERANCE && (a[1] - b[1]).abs() <= POINT_TOLERANCE
        })
}

/// Lazily rebuilt k-d tree over one controller's points in one [Tween].
///
/// A "changed" notification only marks the map stale;
/// the points are re-read on the next query and the tree rebuilt if they differ.
/// The tree is swapped in whole, so a reader sees either the old or the new one.
#[derive(Debug)]
pub struct SpatialMap {
    controller: Arc<TransformController>,
    tween: Tween,
    stale: Arc<AtomicBool>,
    subscription: ListenerId,
    tree: RwLock<Arc<KdTree>>,
    rebuilds: AtomicUsize,
}

impl SpatialMap {
    /// Index the controller's current points.
    ///
    /// Prefer [super::SpatialMapRegistry::get_or_create] to share maps between consumers.
    pub fn new(controller: Arc<TransformController>, tween: Tween) -> Self {
        let stale = Arc::new(AtomicBool::new(false));
        let flag = stale.clone();
        let subscription = controller
            .changed()
            .subscribe(move |_| flag.store(true, Ordering::SeqCst));
        let points = tweened_points(&controller, tween);
        log::debug!(
            "indexing {} points for controller {} ({tween:?})",
            points.len(),
            controller.id()
        );
        Self {
            tree: RwLock::new(Arc::new(KdTree::build(&points))),
            controller,
            tween,
            stale,
            subscription,
            rebuilds: AtomicUsize::new(1),
        }
    }

    pub fn controller(&self) -> &Arc<TransformController> {
        &self.controller
    }

    pub fn tween(&self) -> Tween {
        self.tween
    }

    /// Number of times the tree has been built, including at construction.
    pub fn rebuild_count(&self) -> usize {
        self.rebuilds.load(Ordering::SeqCst)
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    /// The current tree, rebuilt first if the indexed points have moved.
    fn tree(&self) -> Arc<KdTree> {
        if self.stale.swap(false, Ordering::SeqCst) {
            let points = tweened_points(&self.controller, self.tween);
            let mut tree = self.tree.write().expect("should not be poisoned");
            if !unchanged(tree.points(), &points) {
                log::debug!(
                    "rebuilding index of {} points for controller {} ({:?})",
                    points.len(),
                    self.controller.id(),
                    self.tween
                );
                *tree = Arc::new(KdTree::build(&points));
                self.rebuilds.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.tree.read().expect("should not be poisoned").clone()
    }

    /// The indexed points, in correspondence order.
    pub fn points(&self) -> Vec<Point> {
        self.tree().points().to_vec()
    }

    /// Indices of points within `max_distance` of any of `queries`.
    pub fn find_nearest_within(&self, queries: &[Point], max_distance: f64) -> BTreeSet<usize> {
        let tree = self.tree();
        queries
            .iter()
            .flat_map(|q| tree.within(*q, max_distance))
            .collect()
    }

    pub fn nearest(&self, point: Point) -> Option<Nearest> {
        self.tree()
            .nearest(point)
            .map(|(index, dist_sq)| Nearest {
                index,
                distance: dist_sq.sqrt(),
            })
    }
}

impl Drop for SpatialMap {
    fn drop(&mut self) {
        self.controller.changed().unsubscribe(self.subscription);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ControllerConfig, correspondence,
        model::share,
        tests::{Caps, StubModel, init_logger, random_points},
    };

    fn controller(points: &[Point]) -> Arc<TransformController> {
        init_logger();
        let shifted: Vec<_> = points
            .iter()
            .map(|p| correspondence(*p, [p[0] + 10.0, p[1] + 20.0]))
            .collect();
        let model = share(StubModel::new(shifted, Caps::all()));
        Arc::new(TransformController::new(model, ControllerConfig::default()).unwrap())
    }

    #[test]
    fn blend_validation() {
        assert_eq!(Tween::blend(0.0).unwrap(), Tween::Source);
        assert_eq!(Tween::blend(1.0).unwrap(), Tween::Target);
        assert_eq!(Tween::blend(0.25).unwrap().factor(), 0.25);
        assert!(Tween::blend(-0.1).is_err());
        assert!(Tween::blend(1.5).is_err());
        assert!(Tween::blend(f64::NAN).is_err());
    }

    #[test]
    fn blend_end_points_share_keys() {
        assert_eq!(Tween::blend(-0.0).unwrap(), Tween::Source);
        let Tween::Blend(f) = Tween::blend(0.75).unwrap() else {
            panic!("interior factor should be a blend");
        };
        assert_eq!(f.get(), 0.75);
        assert_ne!(Tween::blend(0.75).unwrap(), Tween::Target);
    }

    #[test]
    fn tweening() {
        let c = controller(&[[0.0, 0.0], [2.0, 4.0]]);
        assert_eq!(tweened_points(&c, Tween::Source), vec![[0.0, 0.0], [2.0, 4.0]]);
        assert_eq!(tweened_points(&c, Tween::Target), vec![[10.0, 20.0], [12.0, 24.0]]);
        assert_eq!(
            tweened_points(&c, Tween::blend(0.5).unwrap()),
            vec![[5.0, 10.0], [7.0, 14.0]]
        );
    }

    #[test]
    fn built_once_when_nothing_moves() {
        let c = controller(&random_points(50, 100.0));
        let map = SpatialMap::new(c.clone(), Tween::Source);
        for _ in 0..5 {
            c.changed().fire(());
            map.find_nearest_within(&[[50.0, 50.0]], 10.0);
        }
        assert_eq!(map.rebuild_count(), 1);
    }

    #[test]
    fn rebuilt_when_points_move() {
        let c = controller(&random_points(50, 100.0));
        let map = SpatialMap::new(c.clone(), Tween::Target);
        c.translate_source([1.0, 1.0]).unwrap();
        map.points();
        // target points did not move
        assert_eq!(map.rebuild_count(), 1);

        c.translate_target([1.0, 1.0]).unwrap();
        assert!(map.is_stale());
        assert_eq!(map.rebuild_count(), 1);
        assert_eq!(map.points(), c.target_points());
        assert_eq!(map.rebuild_count(), 2);
        assert!(!map.is_stale());
    }

    #[test]
    fn rebuilt_when_count_changes() {
        let c = controller(&random_points(10, 100.0));
        let map = SpatialMap::new(c.clone(), Tween::Source);
        let idx = c.try_add_point([200.0, 200.0], Space::Source).unwrap();
        let found = map.find_nearest_within(&[[200.0, 200.0]], 0.5);
        assert_eq!(found, BTreeSet::from([idx]));
        assert_eq!(map.rebuild_count(), 2);
    }

    #[test]
    fn within_is_exact() {
        let pts = random_points(200, 100.0);
        let c = controller(&pts);
        let map = SpatialMap::new(c, Tween::Source);
        let queries = [[20.0, 20.0], [80.0, 30.0]];
        let r = 12.0;
        let found = map.find_nearest_within(&queries, r);
        for (i, p) in pts.iter().enumerate() {
            let near = queries.iter().any(|q| {
                ((p[0] - q[0]).powi(2) + (p[1] - q[1]).powi(2)).sqrt() <= r
            });
            assert_eq!(found.contains(&i), near, "point {i}");
        }
    }

    #[test]
    fn nearest() {
        let c = controller(&[[0.0, 0.0], [5.0, 5.0]]);
        let map = SpatialMap::new(c, Tween::Target);
        let n = map.nearest([14.0, 24.0]).unwrap();
        assert_eq!(n.index, 1);
        assert!((n.distance - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn unsubscribes_on_drop() {
        let c = controller(&random_points(5, 10.0));
        let before = c.changed().listener_count();
        let map = SpatialMap::new(c.clone(), Tween::Source);
        assert_eq!(c.changed().listener_count(), before + 1);
        drop(map);
        assert_eq!(c.changed().listener_count(), before);
    }
}
