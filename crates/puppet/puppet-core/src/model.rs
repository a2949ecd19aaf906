//! `InternalModel`: owns one native model and runs the per-frame parameter pipeline.
//!
//! Frame order (each stage sees the writes of the ones before it):
//! - frame base: load the committed snapshot, or restore it on a repeated timestamp
//! - motions, expressions, eye blink (only when no motion wrote this frame)
//! - commit (`save_parameters`)
//! - breath, lip sync, physics, pose
//! - focus, last, so nothing overrides the gaze
//! - native solve
//!
//! Everything after the commit is recomputed from the committed values each frame, so
//! additive overlays do not accumulate.

use glam::{Affine2, Vec2};
use indexmap::IndexMap;

use crate::breath::Breath;
use crate::config::Config;
use crate::error::ModelError;
use crate::events::ModelEvent;
use crate::expression::{ExpressionData, ExpressionKey, ExpressionManager};
use crate::eye_blink::EyeBlink;
use crate::focus::FocusController;
use crate::ids::PlaybackHandle;
use crate::layout::{to_mvp, ModelLayout};
use crate::manifest::{HitAreaDefinition, ModelManifest};
use crate::motion::{FinishCallback, MotionData, MotionManager, MotionPriority};
use crate::native::{CoreModel, NativeModel, PhysicsEvaluator, PoseEvaluator, Renderer};

const EYE_BLINK_RNG_SALT: u64 = 0x626c_696e;

/// Parsed payloads and optional evaluators handed to [`InternalModel::new`].
#[derive(Default)]
pub struct ModelComponents {
    /// Motion payloads by group, positions matching the manifest definitions.
    pub motions: IndexMap<String, Vec<MotionData>>,
    /// Expression payloads, positions matching the manifest expressions.
    pub expressions: Vec<ExpressionData>,
    pub physics: Option<Box<dyn PhysicsEvaluator>>,
    pub pose: Option<Box<dyn PoseEvaluator>>,
}

/// A hit area with its drawable resolved. `drawable` is `None` when the id is unknown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HitArea {
    pub id: String,
    pub name: String,
    pub drawable: Option<usize>,
}

/// Axis-aligned bounds in canvas pixels.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Bounds {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl Bounds {
    /// Corners in order: top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [Vec2; 4] {
        [
            Vec2::new(self.left, self.top),
            Vec2::new(self.right, self.top),
            Vec2::new(self.right, self.bottom),
            Vec2::new(self.left, self.bottom),
        ]
    }
}

#[derive(Copy, Clone, Debug, Default)]
struct StandardIndices {
    angle_x: Option<usize>,
    angle_y: Option<usize>,
    angle_z: Option<usize>,
    eye_ball_x: Option<usize>,
    eye_ball_y: Option<usize>,
    body_angle_x: Option<usize>,
}

/// Parameter and part values of the model at one point in the frame.
#[derive(Clone, Debug)]
struct Snapshot {
    parameters: Vec<f32>,
    parts: Vec<f32>,
}

impl Snapshot {
    fn capture(model: &dyn CoreModel) -> Self {
        Self {
            parameters: (0..model.parameter_count())
                .map(|i| model.parameter_value(i))
                .collect(),
            parts: (0..model.part_count()).map(|i| model.part_opacity(i)).collect(),
        }
    }

    fn restore(&self, model: &mut dyn CoreModel) {
        for (i, v) in self.parameters.iter().enumerate() {
            model.set_parameter_value(i, *v);
        }
        for (i, v) in self.parts.iter().enumerate() {
            model.set_part_opacity(i, *v);
        }
    }
}

/// Values every evaluation of one timestamp starts from.
#[derive(Clone, Debug)]
struct FrameBase {
    now_ms: f64,
    snapshot: Snapshot,
}

pub struct InternalModel {
    // evaluators are declared before `native` so they drop first
    physics: Option<Box<dyn PhysicsEvaluator>>,
    pose: Option<Box<dyn PoseEvaluator>>,
    native: Option<NativeModel>,

    manifest: ModelManifest,
    config: Config,

    motions: MotionManager,
    expressions: ExpressionManager,
    focus: FocusController,
    eye_blink: Option<EyeBlink>,
    breath: Breath,
    lip_sync: Vec<usize>,
    lip_sync_value: Option<f32>,
    standard: StandardIndices,

    hit_areas: Vec<HitArea>,
    layout: ModelLayout,
    drawing: Affine2,

    frame_base: Option<FrameBase>,
    // motion output of the last frame; expressions and blink layer on it, never into it
    motion_base: Option<Snapshot>,
    events: Vec<ModelEvent>,
}

impl InternalModel {
    pub fn new(
        native: NativeModel,
        manifest: ModelManifest,
        config: Config,
        components: ModelComponents,
    ) -> Result<Self, ModelError> {
        manifest.validate()?;

        let model = native.model();
        let ids = manifest.format.standard_parameter_ids();
        let standard = StandardIndices {
            angle_x: model.parameter_index(&ids.angle_x),
            angle_y: model.parameter_index(&ids.angle_y),
            angle_z: model.parameter_index(&ids.angle_z),
            eye_ball_x: model.parameter_index(&ids.eye_ball_x),
            eye_ball_y: model.parameter_index(&ids.eye_ball_y),
            body_angle_x: model.parameter_index(&ids.body_angle_x),
        };
        if standard.eye_ball_x.is_none() || standard.angle_x.is_none() {
            log::warn!(
                "model {:?}: {} or {} missing, focus disabled",
                manifest.name,
                ids.eye_ball_x,
                ids.angle_x
            );
        }

        let eye_blink = if manifest.parameter_groups.eye_blink.is_empty() {
            None
        } else {
            EyeBlink::new(
                &manifest.parameter_groups.eye_blink,
                model,
                config.rng(EYE_BLINK_RNG_SALT),
            )
        };
        let breath = Breath::new(Breath::standard_parameters(&ids), model);
        let lip_sync = manifest
            .parameter_groups
            .lip_sync
            .iter()
            .filter_map(|id| model.parameter_index(id))
            .collect();

        let hit_areas = resolve_hit_areas(&manifest.hit_areas, model);

        let canvas = model.canvas_info();
        let layout = ModelLayout::new(
            &manifest.layout,
            canvas.width,
            canvas.height,
            canvas.pixels_per_unit,
        );
        let drawing = layout.local * layout.centering;

        let motions = MotionManager::new(&manifest, components.motions, &config);
        let expressions = ExpressionManager::new(&manifest, components.expressions, &config);
        let focus = FocusController::new(config.focus_time_constant_ms);

        log::debug!(
            "model {:?} ready: {} parameters, {} motion groups, {} expressions",
            manifest.name,
            model.parameter_count(),
            manifest.motion_groups.len(),
            expressions.len()
        );

        Ok(Self {
            physics: components.physics,
            pose: components.pose,
            native: Some(native),
            manifest,
            config,
            motions,
            expressions,
            focus,
            eye_blink,
            breath,
            lip_sync,
            lip_sync_value: None,
            standard,
            hit_areas,
            layout,
            drawing,
            frame_base: None,
            motion_base: None,
            events: Vec::new(),
        })
    }

    pub fn manifest(&self) -> &ModelManifest {
        &self.manifest
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> &ModelLayout {
        &self.layout
    }

    pub fn hit_areas(&self) -> &[HitArea] {
        &self.hit_areas
    }

    pub fn is_destroyed(&self) -> bool {
        self.native.is_none()
    }

    pub fn core_model(&self) -> Option<&dyn CoreModel> {
        self.native.as_ref().map(|n| n.model())
    }

    pub fn core_model_mut(&mut self) -> Option<&mut dyn CoreModel> {
        self.native.as_mut().map(|n| n.model_mut())
    }

    pub fn motion_manager(&self) -> &MotionManager {
        &self.motions
    }

    pub fn expression_manager(&self) -> &ExpressionManager {
        &self.expressions
    }

    pub fn focus_controller(&self) -> &FocusController {
        &self.focus
    }

    // ----- playback conveniences -----

    pub fn motion(
        &mut self,
        group: &str,
        index: usize,
        priority: MotionPriority,
    ) -> Option<PlaybackHandle> {
        if self.is_destroyed() {
            return None;
        }
        self.motions
            .start_motion(group, index, priority, &mut self.expressions)
    }

    pub fn motion_with(
        &mut self,
        group: &str,
        index: usize,
        priority: MotionPriority,
        on_finish: FinishCallback,
    ) -> Option<PlaybackHandle> {
        if self.is_destroyed() {
            return None;
        }
        self.motions
            .start_motion_with(group, index, priority, &mut self.expressions, Some(on_finish))
    }

    pub fn random_motion(&mut self, group: &str, priority: MotionPriority) -> Option<PlaybackHandle> {
        if self.is_destroyed() {
            return None;
        }
        self.motions
            .start_random_motion(group, priority, &mut self.expressions)
    }

    pub fn stop_motions(&mut self) {
        self.motions.stop_all_motions();
    }

    pub fn expression(&mut self, key: impl Into<ExpressionKey>) -> Option<PlaybackHandle> {
        if self.is_destroyed() {
            return None;
        }
        self.expressions.set_expression(key)
    }

    pub fn random_expression(&mut self) -> Option<PlaybackHandle> {
        if self.is_destroyed() {
            return None;
        }
        self.expressions.set_random_expression()
    }

    pub fn reset_expression(&mut self) {
        self.expressions.reset_expression();
    }

    pub fn focus(&mut self, x: f32, y: f32, instant: bool) {
        self.focus.focus(x, y, instant);
    }

    /// Mouth openness added onto the lip-sync parameters each frame; `None` disables it.
    pub fn set_lip_sync_value(&mut self, value: Option<f32>) {
        self.lip_sync_value = value;
    }

    // ----- frame -----

    /// Run one frame. `dt_ms` is the host frame delta, `now_ms` the host clock.
    ///
    /// Calling again with the same `now_ms` reproduces the same parameters: the frame
    /// restarts from the same base and integrators see a zero delta.
    pub fn update(&mut self, dt_ms: f32, now_ms: f64) -> Result<(), ModelError> {
        let native = self.native.as_mut().ok_or(ModelError::Destroyed)?;
        let model = native.model_mut();

        let dt_ms = match self.frame_base.as_ref().filter(|b| b.now_ms == now_ms) {
            Some(base) => {
                base.snapshot.restore(model);
                0.0
            }
            None => {
                model.load_parameters();
                if let Some(motion_base) = &self.motion_base {
                    motion_base.restore(model);
                }
                self.frame_base = Some(FrameBase {
                    now_ms,
                    snapshot: Snapshot::capture(model),
                });
                dt_ms.max(0.0)
            }
        };
        let now = now_ms / 1000.0;
        let dt_secs = dt_ms / 1000.0;

        self.focus.update(dt_ms);

        let motion_updated = self.motions.update(model, now, &mut self.expressions);
        self.motion_base = Some(Snapshot::capture(model));
        self.expressions.update(model, now);
        if !motion_updated {
            if let Some(blink) = self.eye_blink.as_mut() {
                blink.update_parameters(model, now);
            }
        }

        model.save_parameters();

        self.breath.update_parameters(model, now);
        if let Some(value) = self.lip_sync_value {
            for &i in &self.lip_sync {
                model.add_parameter_value(i, value, self.config.lip_sync_weight);
            }
        }
        if let Some(physics) = self.physics.as_mut() {
            physics.evaluate(model, dt_secs);
        }
        if let Some(pose) = self.pose.as_mut() {
            pose.update_parameters(model, dt_secs);
        }
        apply_focus(&self.standard, &self.focus, model);

        model.update();

        self.collect_events();
        Ok(())
    }

    /// Drain events emitted since the last call.
    pub fn take_events(&mut self) -> Vec<ModelEvent> {
        self.collect_events();
        std::mem::take(&mut self.events)
    }

    fn collect_events(&mut self) {
        self.events.extend(self.motions.take_events());
        self.events.extend(self.expressions.take_events());
    }

    /// Release the native model and evaluators. Terminal; later calls are no-ops.
    pub fn destroy(&mut self) {
        if self.native.is_none() {
            return;
        }
        self.motions.stop_all_motions();
        self.collect_events();

        self.physics = None;
        self.pose = None;
        self.native = None;
        self.frame_base = None;
        self.motion_base = None;

        log::debug!("model {:?} destroyed", self.manifest.name);
        self.events.push(ModelEvent::Destroyed);
    }

    // ----- transform and drawing -----

    /// Compose `world * local * centering` into the drawing matrix.
    pub fn update_transform(&mut self, world: Affine2) {
        self.drawing = world * self.layout.local * self.layout.centering;
    }

    pub fn drawing_matrix(&self) -> Affine2 {
        self.drawing
    }

    pub fn draw(&self, renderer: &mut dyn Renderer) -> Result<(), ModelError> {
        let native = self.native.as_ref().ok_or(ModelError::Destroyed)?;
        renderer.draw_model(native.model(), &to_mvp(&self.drawing));
        Ok(())
    }

    // ----- geometry -----

    /// Vertices of drawable `index` in canvas pixels. Empty for an unknown index.
    pub fn drawable_vertices(&self, index: usize) -> Result<Vec<f32>, ModelError> {
        let native = self.native.as_ref().ok_or(ModelError::Destroyed)?;
        let model = native.model();
        let ppu = self.layout.pixels_per_unit;
        let half_w = self.layout.original_width / 2.0;
        let half_h = self.layout.original_height / 2.0;

        let mut out = model.drawable_vertices(index).to_vec();
        for pair in out.chunks_exact_mut(2) {
            pair[0] = pair[0] * ppu + half_w;
            pair[1] = -pair[1] * ppu + half_h;
        }
        Ok(out)
    }

    /// Bounds of drawable `index` in canvas pixels; `None` when it has no vertices.
    pub fn drawable_bounds(&self, index: usize) -> Result<Option<Bounds>, ModelError> {
        let vertices = self.drawable_vertices(index)?;
        let mut points = vertices.chunks_exact(2);
        let Some(first) = points.next() else {
            return Ok(None);
        };
        let mut b = Bounds {
            left: first[0],
            right: first[0],
            top: first[1],
            bottom: first[1],
        };
        for p in points {
            b.left = b.left.min(p[0]);
            b.right = b.right.max(p[0]);
            b.top = b.top.min(p[1]);
            b.bottom = b.bottom.max(p[1]);
        }
        Ok(Some(b))
    }

    /// Bounds quad of the named hit area, mapped through `transform`.
    pub fn hit_area_polygon(
        &self,
        name: &str,
        transform: &Affine2,
    ) -> Result<Option<[Vec2; 4]>, ModelError> {
        let Some(drawable) = self
            .hit_areas
            .iter()
            .find(|h| h.name == name)
            .and_then(|h| h.drawable)
        else {
            return Ok(None);
        };
        Ok(self
            .drawable_bounds(drawable)?
            .map(|b| b.corners().map(|c| transform.transform_point2(c))))
    }

    /// Names of all hit areas containing the model-local point `(x, y)`.
    pub fn hit_test(&self, x: f32, y: f32) -> Vec<String> {
        let point = Vec2::new(x, y);
        self.hit_areas
            .iter()
            .filter(|h| self.contains(&h.name, point))
            .map(|h| h.name.clone())
            .collect()
    }

    pub fn is_hit(&self, name: &str, x: f32, y: f32) -> bool {
        self.contains(name, Vec2::new(x, y))
    }

    fn contains(&self, name: &str, point: Vec2) -> bool {
        match self.hit_area_polygon(name, &self.layout.local) {
            Ok(Some(polygon)) => point_in_polygon(point, &polygon),
            _ => false,
        }
    }
}

impl std::fmt::Debug for InternalModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternalModel")
            .field("name", &self.manifest.name)
            .field("native", &self.native)
            .field("motions", &self.motions)
            .field("expressions", &self.expressions)
            .finish()
    }
}

fn resolve_hit_areas(defs: &[HitAreaDefinition], model: &dyn CoreModel) -> Vec<HitArea> {
    defs.iter()
        .map(|def| {
            let drawable = model.drawable_index(&def.id);
            if drawable.is_none() {
                log::warn!("hit area {:?}: drawable {:?} not found", def.name, def.id);
            }
            HitArea {
                id: def.id.clone(),
                name: def.name.clone(),
                drawable,
            }
        })
        .collect()
}

fn apply_focus(ids: &StandardIndices, focus: &FocusController, model: &mut dyn CoreModel) {
    let (Some(eye_x), Some(angle_x)) = (ids.eye_ball_x, ids.angle_x) else {
        return;
    };
    let (x, y) = (focus.x(), focus.y());
    model.set_parameter_value(eye_x, x);
    model.set_parameter_value(angle_x, x * 30.0);
    if let Some(i) = ids.eye_ball_y {
        model.set_parameter_value(i, y);
    }
    if let Some(i) = ids.angle_y {
        model.set_parameter_value(i, y * 30.0);
    }
    if let Some(i) = ids.angle_z {
        model.set_parameter_value(i, x * y * -30.0);
    }
    if let Some(i) = ids.body_angle_x {
        model.set_parameter_value(i, x * 10.0);
    }
}

/// Even-odd ray cast. Points on an edge count as inside.
fn point_in_polygon(p: Vec2, polygon: &[Vec2]) -> bool {
    let n = polygon.len();
    if (0..n).any(|i| on_segment(p, polygon[i], polygon[(i + 1) % n])) {
        return true;
    }
    let mut inside = false;
    let n = polygon.len();
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let (a, b) = (polygon[i], polygon[j]);
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn on_segment(p: Vec2, a: Vec2, b: Vec2) -> bool {
    let (ab, ap) = (b - a, p - a);
    if ab.length_squared() == 0.0 {
        return ap.length_squared() == 0.0;
    }
    let tolerance = f32::EPSILON * 16.0 * ab.length_squared().max(1.0);
    if ab.perp_dot(ap).abs() > tolerance {
        return false;
    }
    let t = ap.dot(ab);
    t >= 0.0 && t <= ab.length_squared()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_in_square() {
        let square = [
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(0.0, 2.0),
        ];
        assert!(point_in_polygon(Vec2::new(1.0, 1.0), &square));
        assert!(!point_in_polygon(Vec2::new(3.0, 1.0), &square));
        assert!(!point_in_polygon(Vec2::new(1.0, -0.5), &square));
    }

    #[test]
    fn polygon_edges_and_corners_are_inclusive() {
        let square = Bounds {
            left: 150.0,
            right: 250.0,
            top: 50.0,
            bottom: 150.0,
        }
        .corners();
        for p in [
            Vec2::new(150.0, 100.0),
            Vec2::new(250.0, 100.0),
            Vec2::new(200.0, 50.0),
            Vec2::new(200.0, 150.0),
            Vec2::new(150.0, 50.0),
            Vec2::new(250.0, 150.0),
        ] {
            assert!(point_in_polygon(p, &square), "{p} should hit");
        }
        assert!(!point_in_polygon(Vec2::new(250.5, 100.0), &square));
        assert!(!point_in_polygon(Vec2::new(200.0, 49.5), &square));
    }

    #[test]
    fn degenerate_polygon_only_contains_its_point() {
        let point = [Vec2::new(1.0, 1.0); 4];
        assert!(point_in_polygon(Vec2::new(1.0, 1.0), &point));
        assert!(!point_in_polygon(Vec2::new(2.0, 1.0), &point));
    }

    #[test]
    fn bounds_corners_are_clockwise_from_top_left() {
        let b = Bounds {
            left: 1.0,
            right: 3.0,
            top: 2.0,
            bottom: 5.0,
        };
        assert_eq!(b.corners()[0], Vec2::new(1.0, 2.0));
        assert_eq!(b.corners()[2], Vec2::new(3.0, 5.0));
    }
}
