//! The transform controller: one owned model, one editing protocol.
use std::{
    collections::BTreeSet,
    sync::{
        Arc, Mutex, RwLock, Weak,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
};

use crate::{
    Bounds, Correspondence, EditError, EditResult, FlipAxis, IntoPointIndex, Point, PointIndex,
    Space,
    event::{Dispatcher, Event, Immediate, ListenerId},
    model::{ModelRef, Nearest, TransformModel, same_model},
    points::{add, point_in, sub},
};

static NEXT_CONTROLLER_ID: AtomicU64 = AtomicU64::new(0);

/// Settings fixed when a [TransformController] is constructed.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Whether the forward (Source to Target) mapping is the default view.
    pub default_to_forward: bool,
    /// How the controller's own events are delivered.
    pub dispatcher: Arc<dyn Dispatcher>,
    /// Above this many points the model's internal structures are rebuilt
    /// before "changed" is dispatched.
    pub rebuild_threshold: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            default_to_forward: true,
            dispatcher: Arc::new(Immediate),
            rebuild_threshold: 25,
        }
    }
}

impl ControllerConfig {
    pub fn with_default_to_forward(mut self, default_to_forward: bool) -> Self {
        self.default_to_forward = default_to_forward;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_rebuild_threshold(mut self, rebuild_threshold: usize) -> Self {
        self.rebuild_threshold = rebuild_threshold;
        self
    }
}

/// Payload of the "model replaced" event.
#[derive(Debug, Clone)]
pub struct ModelReplaced {
    pub old: ModelRef,
    pub new: ModelRef,
}

impl ModelReplaced {
    pub fn is_same_model(&self) -> bool {
        same_model(&self.old, &self.new)
    }

    /// Whether the replacement is a different kind of model.
    pub fn changes_kind(&self) -> bool {
        let old = self.old.read().expect("should not be poisoned").kind();
        let new = self.new.read().expect("should not be poisoned").kind();
        old != new
    }

    /// Whether an operation bound to `binding` must be abandoned.
    pub fn cancels(&self, binding: &ModelBinding) -> bool {
        !self.is_same_model() && binding.refers_to(&self.old)
    }
}

/// What an interactive operation assumed about the model when it started.
#[derive(Debug, Clone)]
pub struct ModelBinding {
    model: Weak<RwLock<dyn TransformModel>>,
    kind: &'static str,
    num_points: usize,
}

impl ModelBinding {
    pub fn capture(controller: &TransformController) -> Self {
        let model = controller.model();
        Self {
            model: Arc::downgrade(&model),
            kind: controller.kind(),
            num_points: controller.num_points(),
        }
    }

    fn refers_to(&self, model: &ModelRef) -> bool {
        std::ptr::addr_eq(self.model.as_ptr(), Arc::as_ptr(model))
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn num_points(&self) -> usize {
        self.num_points
    }

    /// False once the controller's model, its kind, or its point count has changed.
    pub fn is_valid_for(&self, controller: &TransformController) -> bool {
        self.refers_to(&controller.model())
            && self.kind == controller.kind()
            && self.num_points == controller.num_points()
    }
}

/// Coalesces model notifications raised while the controller is mid-edit.
///
/// Notifications from edits made outside the controller are relayed as they arrive,
/// while the editor may still hold the model's write lock,
/// so they skip [crate::model::ControlPoints::update_internal_structures];
/// a lazily caching model rebuilds on its next query instead.
#[derive(Debug, Default)]
struct Relay {
    editing: AtomicUsize,
    pending: AtomicBool,
}

#[derive(Debug)]
struct Binding {
    model: ModelRef,
    subscription: ListenerId,
}

/// Owns one [TransformModel] and exposes the point-editing protocol over it.
///
/// Edits hold the model's write lock only while mutating.
/// Notifications the model raises during a controller edit
/// are folded into one "changed" delivery after the lock is released,
/// so listeners may read the controller from inside a callback.
#[derive(Debug)]
pub struct TransformController {
    id: u64,
    config: ControllerConfig,
    binding: RwLock<Binding>,
    relay: Arc<Relay>,
    changed: Event<()>,
    replaced: Event<ModelReplaced>,
    selection: Mutex<BTreeSet<usize>>,
    show_warped: AtomicBool,
}

impl TransformController {
    /// Fails with [EditError::ContractViolation] if the model has no change notification.
    pub fn new(model: ModelRef, config: ControllerConfig) -> EditResult<Self> {
        let relay = Arc::new(Relay::default());
        let changed = Event::new(config.dispatcher.clone());
        let replaced = Event::new(config.dispatcher.clone());
        let subscription = attach(&model, &relay, &changed)?;
        let id = NEXT_CONTROLLER_ID.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "controller {id} created with {} model",
            model.read().expect("should not be poisoned").kind()
        );
        Ok(Self {
            id,
            show_warped: AtomicBool::new(config.default_to_forward),
            config,
            binding: RwLock::new(Binding {
                model,
                subscription,
            }),
            relay,
            changed,
            replaced,
            selection: Mutex::new(BTreeSet::new()),
        })
    }

    /// Process-wide, strictly increasing in construction order.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Fires whenever a point may have moved.
    pub fn changed(&self) -> &Event<()> {
        &self.changed
    }

    /// Fires with the old and new model whenever the model is swapped, before "changed".
    pub fn model_replaced(&self) -> &Event<ModelReplaced> {
        &self.replaced
    }

    pub fn model(&self) -> ModelRef {
        self.binding
            .read()
            .expect("should not be poisoned")
            .model
            .clone()
    }

    /// Install a new model.
    ///
    /// Replacing the model with itself does nothing.
    /// On [EditError::ContractViolation] the old model stays installed.
    pub fn set_model(&self, model: ModelRef) -> EditResult<()> {
        let old = {
            let mut binding = self.binding.write().expect("should not be poisoned");
            if same_model(&binding.model, &model) {
                return Ok(());
            }
            if model
                .read()
                .expect("should not be poisoned")
                .change_event()
                .is_none()
            {
                return Err(no_change_event(&model));
            }
            detach(&binding);
            let old = std::mem::replace(&mut binding.model, model.clone());
            binding.subscription = attach(&model, &self.relay, &self.changed)?;
            old
        };
        self.clear_selection();
        log::debug!(
            "controller {} replaced {} model with {} model",
            self.id,
            old.read().expect("should not be poisoned").kind(),
            model.read().expect("should not be poisoned").kind(),
        );
        self.replaced.fire(ModelReplaced { old, new: model });
        self.notify_changed();
        Ok(())
    }

    pub fn kind(&self) -> &'static str {
        self.read(|m| m.kind())
    }

    fn read<R>(&self, f: impl FnOnce(&dyn TransformModel) -> R) -> R {
        let model = self.model();
        let guard = model.read().expect("should not be poisoned");
        f(&*guard)
    }

    /// Run a mutation under the model's write lock,
    /// then deliver a single "changed" if the model reported one
    /// (or unconditionally on success, with `always_notify`).
    fn edit<R>(
        &self,
        always_notify: bool,
        f: impl FnOnce(&mut dyn TransformModel) -> EditResult<R>,
    ) -> EditResult<R> {
        let model = self.model();
        self.relay.editing.fetch_add(1, Ordering::SeqCst);
        let result = {
            let mut guard = model.write().expect("should not be poisoned");
            f(&mut *guard)
        };
        self.relay.editing.fetch_sub(1, Ordering::SeqCst);
        let reported = self.relay.pending.swap(false, Ordering::SeqCst);
        if reported || (always_notify && result.is_ok()) {
            self.notify_changed();
        }
        result
    }

    fn notify_changed(&self) {
        let model = self.model();
        {
            let guard = model.read().expect("should not be poisoned");
            if let Some(cp) = guard.as_control_points() {
                if cp.len() > self.config.rebuild_threshold {
                    cp.update_internal_structures();
                }
            }
        }
        self.changed.fire(());
    }

    pub fn transform(&self, points: &[Point]) -> Vec<Point> {
        self.read(|m| m.transform(points))
    }

    pub fn inverse_transform(&self, points: &[Point]) -> Vec<Point> {
        self.read(|m| m.inverse_transform(points))
    }

    /// Zero if the model has no control points.
    pub fn num_points(&self) -> usize {
        self.read(|m| m.as_control_points().map_or(0, |cp| cp.len()))
    }

    pub fn points(&self) -> Vec<Correspondence> {
        self.read(|m| m.as_control_points().map(|cp| cp.points()).unwrap_or_default())
    }

    pub fn source_points(&self) -> Vec<Point> {
        self.points_in(Space::Source)
    }

    pub fn target_points(&self) -> Vec<Point> {
        self.points_in(Space::Target)
    }

    pub fn points_in(&self, space: Space) -> Vec<Point> {
        self.read(|m| {
            m.as_control_points()
                .map(|cp| cp.points_in(space))
                .unwrap_or_default()
        })
    }

    /// Target-space triangles, if the model triangulates that space.
    pub fn fixed_triangles(&self) -> Option<Vec<[usize; 3]>> {
        self.read(|m| m.as_target_triangulation().map(|t| t.target_triangles()))
    }

    /// Source-space triangles, if the model triangulates that space.
    pub fn warped_triangles(&self) -> Option<Vec<[usize; 3]>> {
        self.read(|m| m.as_source_triangulation().map(|t| t.source_triangles()))
    }

    /// `(source, target)` bounds, if the model has discrete bounds.
    pub fn bounds(&self) -> Option<(Bounds, Bounds)> {
        self.read(|m| {
            let b = m.as_discrete_bounds()?;
            Some((b.source_bounds()?, b.target_bounds()?))
        })
    }

    pub fn points_in_rect(&self, bounds: &Bounds, space: Space) -> Vec<usize> {
        self.read(|m| {
            m.as_control_points()
                .map(|cp| cp.points_in_rect(bounds, space))
                .unwrap_or_default()
        })
    }

    /// Replace every correspondence.
    pub fn set_points(&self, points: &[Correspondence]) -> EditResult<()> {
        self.edit(false, |m| {
            m.as_control_points_mut()
                .ok_or_else(|| EditError::unsupported("model has no control points"))?
                .set_points(points)
        })
    }

    /// Replace every correspondence with those of another model.
    pub fn set_points_from(&self, other: &ModelRef) -> EditResult<()> {
        let points = other
            .read()
            .expect("should not be poisoned")
            .as_control_points()
            .map(|cp| cp.points())
            .ok_or_else(|| {
                EditError::InvalidArgument("source of points has no control points".into())
            })?;
        self.set_points(&points)
    }

    pub fn translate_source(&self, offset: Point) -> EditResult<()> {
        self.edit(false, |m| {
            m.as_source_editable_mut()
                .ok_or_else(|| EditError::unsupported("model cannot edit source points"))?
                .translate_source(offset);
            Ok(())
        })
    }

    pub fn translate_target(&self, offset: Point) -> EditResult<()> {
        self.edit(false, |m| {
            m.as_target_editable_mut()
                .ok_or_else(|| EditError::unsupported("model cannot edit target points"))?
                .translate_target(offset);
            Ok(())
        })
    }

    /// Rotate the view of the Source content by `angle` radians.
    ///
    /// Rotates Target points by `-angle` if the model can,
    /// otherwise Source points by `angle`.
    pub fn rotate(&self, angle: f64, center: Option<Point>) -> EditResult<()> {
        self.edit(true, |m| {
            if let Some(r) = m.as_target_rotatable_mut() {
                r.rotate_target(-angle, center);
                return Ok(());
            }
            if let Some(r) = m.as_source_rotatable_mut() {
                r.rotate_source(angle, center);
                return Ok(());
            }
            Err(EditError::unsupported("model cannot rotate points"))
        })
    }

    pub fn flip_warped(&self, axis: FlipAxis) -> EditResult<()> {
        self.edit(false, |m| {
            m.as_source_editable_mut()
                .ok_or_else(|| EditError::unsupported("model cannot edit source points"))?
                .flip_source(axis);
            Ok(())
        })
    }

    /// Add a correspondence at `point` in `space`, mapping it into the other space.
    ///
    /// Returns the new index, or `None` if the model could not add it.
    pub fn try_add_point(&self, point: Point, space: Space) -> Option<usize> {
        let added = self.edit(false, |m| {
            if m.as_add_remove_mut().is_none() {
                return Err(EditError::unsupported("model cannot add points"));
            }
            let corr = match space {
                Space::Source => {
                    let target = m.transform(&[point])[0];
                    crate::correspondence(point, target)
                }
                Space::Target => {
                    let source = m.inverse_transform(&[point])[0];
                    crate::correspondence(source, point)
                }
            };
            m.as_add_remove_mut()
                .ok_or_else(|| EditError::unsupported("model cannot add points"))?
                .add_point(corr)
        });
        match added {
            Ok(idx) => Some(idx),
            Err(e) => {
                log::debug!("controller {}: point not added: {e}", self.id);
                None
            }
        }
    }

    /// Delete the point nearest `point` in `space` if it lies within `max_distance`.
    pub fn try_delete_point(&self, point: Point, space: Space, max_distance: f64) -> bool {
        let Some(found) = self.find_within(point, space, max_distance) else {
            return false;
        };
        match self.try_delete_points(found.index) {
            Ok(deleted) => deleted,
            Err(e) => {
                log::debug!("controller {}: point not deleted: {e}", self.id);
                false
            }
        }
    }

    /// Remove all of `index` or none of them.
    ///
    /// Returns `Ok(false)` when removal would leave the model with too few points.
    pub fn try_delete_points(&self, index: impl IntoPointIndex) -> EditResult<bool> {
        let index = index.into_point_index()?;
        let removed = self.edit(false, |m| {
            m.as_add_remove_mut()
                .ok_or_else(|| EditError::unsupported("model cannot remove points"))?
                .remove_points(&index)
        });
        match removed {
            Ok(()) => {
                self.clear_selection();
                Ok(true)
            }
            Err(EditError::ValidationViolation(msg)) => {
                log::info!("controller {}: points not removed: {msg}", self.id);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Move the point nearest `point` by `delta`, if one lies within `max_distance`.
    ///
    /// Returns the index moved.
    pub fn try_drag(
        &self,
        point: Point,
        delta: Point,
        space: Space,
        max_distance: f64,
    ) -> Option<usize> {
        let found = self.find_within(point, space, max_distance)?;
        match self.move_points(found.index, delta, space) {
            Ok(()) => Some(found.index),
            Err(e) => {
                log::debug!("controller {}: point not dragged: {e}", self.id);
                None
            }
        }
    }

    fn find_within(&self, point: Point, space: Space, max_distance: f64) -> Option<Nearest> {
        let query = self.read(|m| m.as_control_points().map(|cp| cp.nearest(point, space)));
        match query {
            None => {
                log::debug!("controller {}: model has no control points", self.id);
                None
            }
            Some(Err(e)) => {
                log::warn!("controller {}: nearest point query failed: {e}", self.id);
                None
            }
            Some(Ok(None)) => {
                log::debug!("controller {}: no points to pick from", self.id);
                None
            }
            Some(Ok(Some(n))) if n.distance <= max_distance => Some(n),
            Some(Ok(Some(n))) => {
                log::debug!(
                    "controller {}: nearest point {} is {} away, beyond {max_distance}",
                    self.id,
                    n.index,
                    n.distance
                );
                None
            }
        }
    }

    /// The points at `index` in `space`, or `None` if any index is out of range.
    pub fn get_points(&self, index: impl IntoPointIndex, space: Space) -> Option<Vec<Point>> {
        let index = index.into_point_index().ok()?;
        self.read(|m| {
            let cp = m.as_control_points()?;
            let count = cp.source_points().len().max(cp.target_points().len());
            if index.max() >= count {
                return None;
            }
            let all = cp.points();
            Some(index.iter().map(|i| point_in(&all[i], space)).collect())
        })
    }

    /// Put the point at `index` at `point` in `space`.
    ///
    /// If the model cannot edit `space` directly,
    /// the point is mapped into the other space and edited there.
    pub fn set_point(&self, index: usize, point: Point, space: Space) -> EditResult<()> {
        let index = PointIndex::from(index);
        self.edit(false, |m| {
            match space {
                Space::Source => {
                    if let Some(e) = m.as_source_editable_mut() {
                        return e.update_source_points(&index, &[point]);
                    }
                    let target = m.transform(&[point])[0];
                    m.as_target_editable_mut()
                        .ok_or_else(|| EditError::unsupported("model cannot edit points"))?
                        .update_target_points(&index, &[target])
                }
                Space::Target => {
                    if let Some(e) = m.as_target_editable_mut() {
                        return e.update_target_points(&index, &[point]);
                    }
                    let source = m.inverse_transform(&[point])[0];
                    m.as_source_editable_mut()
                        .ok_or_else(|| EditError::unsupported("model cannot edit points"))?
                        .update_source_points(&index, &[source])
                }
            }
        })
    }

    /// Move the points at `index` by `delta` in `space`.
    ///
    /// If the model cannot edit `space` directly,
    /// the delta is carried into the other space by a finite difference
    /// of the mapping at the point's current position:
    /// the forward transform for a Source delta, the inverse for a Target delta.
    /// That path moves one point at a time:
    /// several indices fail with [EditError::NotImplemented].
    pub fn move_points(
        &self,
        index: impl IntoPointIndex,
        delta: Point,
        space: Space,
    ) -> EditResult<()> {
        let index = index.into_point_index()?;
        self.edit(false, |m| {
            let all = m
                .as_control_points()
                .ok_or_else(|| EditError::unsupported("model has no control points"))?
                .points();
            if index.max() >= all.len() {
                return Err(EditError::InvalidIndex(format!(
                    "index {} out of range for {} points",
                    index.max(),
                    all.len()
                )));
            }
            let moved = |space: Space| -> Vec<Point> {
                index
                    .iter()
                    .map(|i| add(point_in(&all[i], space), delta))
                    .collect()
            };

            let direct = match space {
                Space::Source => m
                    .as_source_editable_mut()
                    .map(|e| e.update_source_points(&index, &moved(space))),
                Space::Target => m
                    .as_target_editable_mut()
                    .map(|e| e.update_target_points(&index, &moved(space))),
            };
            if let Some(result) = direct {
                return result;
            }

            let other_editable = match space.other() {
                Space::Source => m.as_source_editable_mut().is_some(),
                Space::Target => m.as_target_editable_mut().is_some(),
            };
            if !other_editable {
                return Err(EditError::unsupported("model cannot edit points"));
            }
            let Some(i) = index.single() else {
                return Err(EditError::NotImplemented(
                    "moving several points through the other space".into(),
                ));
            };
            let old = point_in(&all[i], space);
            let other = point_in(&all[i], space.other());
            match space {
                Space::Source => {
                    let mapped = m.transform(&[old, sub(old, delta)]);
                    let target = add(other, sub(mapped[0], mapped[1]));
                    m.as_target_editable_mut()
                        .ok_or_else(|| EditError::unsupported("model cannot edit points"))?
                        .update_target_points(&index, &[target])
                }
                Space::Target => {
                    let mapped = m.inverse_transform(&[old, sub(old, delta)]);
                    let source = add(other, sub(mapped[0], mapped[1]));
                    m.as_source_editable_mut()
                        .ok_or_else(|| EditError::unsupported("model cannot edit points"))?
                        .update_source_points(&index, &[source])
                }
            }
        })
    }

    /// The model's nearest point to `point` in `space`, if there is one.
    pub fn nearest_point(&self, point: Point, space: Space) -> Option<Nearest> {
        let query = self.read(|m| m.as_control_points().map(|cp| cp.nearest(point, space)))?;
        query.unwrap_or_else(|e| {
            log::warn!("controller {}: nearest point query failed: {e}", self.id);
            None
        })
    }

    pub fn select(&self, index: usize) {
        self.selection
            .lock()
            .expect("should not be poisoned")
            .insert(index);
    }

    pub fn deselect(&self, index: usize) {
        self.selection
            .lock()
            .expect("should not be poisoned")
            .remove(&index);
    }

    /// Returns whether the index is now selected.
    pub fn toggle_selected(&self, index: usize) -> bool {
        let mut selection = self.selection.lock().expect("should not be poisoned");
        if selection.remove(&index) {
            false
        } else {
            selection.insert(index);
            true
        }
    }

    pub fn clear_selection(&self) {
        self.selection
            .lock()
            .expect("should not be poisoned")
            .clear();
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selection
            .lock()
            .expect("should not be poisoned")
            .contains(&index)
    }

    /// Selected indices in ascending order.
    pub fn selected(&self) -> Vec<usize> {
        self.selection
            .lock()
            .expect("should not be poisoned")
            .iter()
            .copied()
            .collect()
    }

    /// Always false unless the controller defaults to the forward transform.
    pub fn show_warped(&self) -> bool {
        self.config.default_to_forward && self.show_warped.load(Ordering::SeqCst)
    }

    /// Flip between the warped and unwarped view; returns the new [Self::show_warped].
    pub fn next_view_mode(&self) -> bool {
        if self.config.default_to_forward {
            self.show_warped.fetch_xor(true, Ordering::SeqCst);
        }
        self.show_warped()
    }
}

impl Drop for TransformController {
    fn drop(&mut self) {
        if let Ok(binding) = self.binding.read() {
            detach(&binding);
        }
    }
}

fn no_change_event(model: &ModelRef) -> EditError {
    EditError::ContractViolation(format!(
        "{} model does not notify changes",
        model.read().expect("should not be poisoned").kind()
    ))
}

/// Relay the model's notifications onto `changed`.
fn attach(model: &ModelRef, relay: &Arc<Relay>, changed: &Event<()>) -> EditResult<ListenerId> {
    let event = model
        .read()
        .expect("should not be poisoned")
        .change_event()
        .cloned();
    let Some(event) = event else {
        return Err(no_change_event(model));
    };
    let relay = relay.clone();
    let changed = changed.clone();
    Ok(event.subscribe(move |_| {
        if relay.editing.load(Ordering::SeqCst) > 0 {
            relay.pending.store(true, Ordering::SeqCst);
        } else {
            changed.fire(());
        }
    }))
}

fn detach(binding: &Binding) {
    let guard = binding.model.read().expect("should not be poisoned");
    if let Some(event) = guard.change_event() {
        event.unsubscribe(binding.subscription);
    }
}
