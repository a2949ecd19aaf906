//! Capability traits for the native engine objects a model is built from.
//!
//! Native objects release their resources in `Drop`. Ownership of the parsed model
//! container moves into [`NativeModel`] through [`NativeModel::adopt`], which makes the
//! model its only releaser.

use glam::Mat4;

use crate::error::NativeError;

/// Canvas size and scale defined by the core model file.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CanvasInfo {
    pub width: f32,
    pub height: f32,
    pub pixels_per_unit: f32,
}

/// Parameter store and drawable geometry of one animatable model instance.
///
/// Indices are stable for the lifetime of the instance. Writes outside the parameter's
/// range are clamped by the implementation.
pub trait CoreModel: Send {
    fn parameter_count(&self) -> usize;
    fn parameter_index(&self, id: &str) -> Option<usize>;
    fn parameter_value(&self, index: usize) -> f32;
    fn set_parameter_value(&mut self, index: usize, value: f32);

    fn part_count(&self) -> usize;
    fn part_index(&self, id: &str) -> Option<usize>;
    fn part_opacity(&self, index: usize) -> f32;
    fn set_part_opacity(&mut self, index: usize, value: f32);

    /// Commit the current parameter values as the snapshot the next frame starts from.
    fn save_parameters(&mut self);
    /// Restore the last committed snapshot.
    fn load_parameters(&mut self);

    /// Forward-solve the deformation from the current parameters.
    fn update(&mut self);

    fn canvas_info(&self) -> CanvasInfo;
    fn drawable_ids(&self) -> &[String];
    /// Vertex positions in model units, interleaved `x, y`.
    fn drawable_vertices(&self, index: usize) -> &[f32];

    fn drawable_index(&self, id: &str) -> Option<usize> {
        self.drawable_ids().iter().position(|d| d == id)
    }

    /// Blend toward `value` by `weight`.
    fn blend_parameter_value(&mut self, index: usize, value: f32, weight: f32) {
        let next = if weight >= 1.0 {
            value
        } else {
            let current = self.parameter_value(index);
            current * (1.0 - weight) + value * weight
        };
        self.set_parameter_value(index, next);
    }

    fn add_parameter_value(&mut self, index: usize, value: f32, weight: f32) {
        let current = self.parameter_value(index);
        self.set_parameter_value(index, current + value * weight);
    }

    fn multiply_parameter_value(&mut self, index: usize, value: f32, weight: f32) {
        let current = self.parameter_value(index);
        self.set_parameter_value(index, current * (1.0 + (value - 1.0) * weight));
    }
}

/// Parsed core model container. Models created from it must not outlive it.
pub trait Moc: Send {
    fn create_model(&self) -> Result<Box<dyn CoreModel>, NativeError>;
}

/// Opaque physics capability (e.g. swinging hair).
pub trait PhysicsEvaluator: Send {
    fn evaluate(&mut self, model: &mut dyn CoreModel, dt_secs: f32);
}

/// Opaque pose capability resolving mutually exclusive part visibility.
pub trait PoseEvaluator: Send {
    fn update_parameters(&mut self, model: &mut dyn CoreModel, dt_secs: f32);
}

/// Draw trigger implemented by the rendering backend.
pub trait Renderer {
    fn draw_model(&mut self, model: &dyn CoreModel, mvp: &Mat4);
}

/// Sole owner of a model instance and the container it was created from.
///
/// Field order is the release order: the model goes first, then its container.
pub struct NativeModel {
    model: Box<dyn CoreModel>,
    moc: Option<Box<dyn Moc>>,
}

impl NativeModel {
    /// Take ownership of both the container and the model created from it.
    pub fn adopt(moc: Box<dyn Moc>, model: Box<dyn CoreModel>) -> Self {
        Self {
            model,
            moc: Some(moc),
        }
    }

    /// Wrap a model that owns its own backing data.
    pub fn standalone(model: Box<dyn CoreModel>) -> Self {
        Self { model, moc: None }
    }

    pub fn model(&self) -> &dyn CoreModel {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> &mut dyn CoreModel {
        self.model.as_mut()
    }

    pub fn has_moc(&self) -> bool {
        self.moc.is_some()
    }
}

impl std::fmt::Debug for NativeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeModel")
            .field("parameters", &self.model.parameter_count())
            .field("has_moc", &self.moc.is_some())
            .finish()
    }
}
