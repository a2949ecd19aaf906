//! Pure-Rust [`CoreModel`] backed by plain vectors.
//!
//! Useful for hosts whose engine exposes raw parameter arrays and for tests. Drawable
//! vertices are static: `update` only counts solves.

use serde::{Deserialize, Serialize};

use crate::error::NativeError;
use crate::native::{CanvasInfo, CoreModel};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub id: String,
    #[serde(default = "default_min")]
    pub min: f32,
    #[serde(default = "default_max")]
    pub max: f32,
    #[serde(default)]
    pub default: f32,
}

fn default_min() -> f32 {
    -1.0
}

fn default_max() -> f32 {
    1.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DrawableSpec {
    pub id: String,
    pub vertices: Vec<f32>,
}

/// Serialized description of a store: the shape a test or embedding host ships.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreSpec {
    pub canvas: CanvasSpec,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    #[serde(default)]
    pub parts: Vec<String>,
    #[serde(default)]
    pub drawables: Vec<DrawableSpec>,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanvasSpec {
    pub width: f32,
    pub height: f32,
    #[serde(default = "default_ppu")]
    pub pixels_per_unit: f32,
}

fn default_ppu() -> f32 {
    1.0
}

#[derive(Clone, Debug)]
pub struct ParameterStore {
    canvas: CanvasInfo,
    parameters: Vec<ParameterSpec>,
    values: Vec<f32>,
    saved: Vec<f32>,
    part_ids: Vec<String>,
    part_opacities: Vec<f32>,
    drawable_ids: Vec<String>,
    drawable_vertices: Vec<Vec<f32>>,
    solves: u64,
}

impl ParameterStore {
    pub fn new(canvas: CanvasInfo) -> Self {
        Self {
            canvas,
            parameters: Vec::new(),
            values: Vec::new(),
            saved: Vec::new(),
            part_ids: Vec::new(),
            part_opacities: Vec::new(),
            drawable_ids: Vec::new(),
            drawable_vertices: Vec::new(),
            solves: 0,
        }
    }

    pub fn from_spec(spec: StoreSpec) -> Self {
        let mut store = Self::new(CanvasInfo {
            width: spec.canvas.width,
            height: spec.canvas.height,
            pixels_per_unit: spec.canvas.pixels_per_unit,
        });
        for p in spec.parameters {
            store = store.with_parameter(&p.id, p.min, p.max, p.default);
        }
        for part in spec.parts {
            store = store.with_part(&part);
        }
        for d in spec.drawables {
            store = store.with_drawable(&d.id, d.vertices);
        }
        store
    }

    pub fn from_json(s: &str) -> Result<Self, NativeError> {
        let spec: StoreSpec =
            serde_json::from_str(s).map_err(|e| NativeError::new(format!("store spec: {e}")))?;
        Ok(Self::from_spec(spec))
    }

    pub fn with_parameter(mut self, id: &str, min: f32, max: f32, default: f32) -> Self {
        let default = default.clamp(min, max);
        self.parameters.push(ParameterSpec {
            id: id.to_string(),
            min,
            max,
            default,
        });
        self.values.push(default);
        self.saved.push(default);
        self
    }

    pub fn with_part(mut self, id: &str) -> Self {
        self.part_ids.push(id.to_string());
        self.part_opacities.push(1.0);
        self
    }

    pub fn with_drawable(mut self, id: &str, vertices: Vec<f32>) -> Self {
        self.drawable_ids.push(id.to_string());
        self.drawable_vertices.push(vertices);
        self
    }

    /// Number of `update` calls so far.
    pub fn solves(&self) -> u64 {
        self.solves
    }

    /// Convenience lookup by id; `None` for unknown ids.
    pub fn value_of(&self, id: &str) -> Option<f32> {
        self.parameter_index(id).map(|i| self.values[i])
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

impl CoreModel for ParameterStore {
    fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    fn parameter_index(&self, id: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p.id == id)
    }

    fn parameter_value(&self, index: usize) -> f32 {
        self.values.get(index).copied().unwrap_or(0.0)
    }

    fn set_parameter_value(&mut self, index: usize, value: f32) {
        if let Some(spec) = self.parameters.get(index) {
            self.values[index] = value.clamp(spec.min, spec.max);
        }
    }

    fn part_count(&self) -> usize {
        self.part_ids.len()
    }

    fn part_index(&self, id: &str) -> Option<usize> {
        self.part_ids.iter().position(|p| p == id)
    }

    fn part_opacity(&self, index: usize) -> f32 {
        self.part_opacities.get(index).copied().unwrap_or(0.0)
    }

    fn set_part_opacity(&mut self, index: usize, value: f32) {
        if let Some(o) = self.part_opacities.get_mut(index) {
            *o = value.clamp(0.0, 1.0);
        }
    }

    fn save_parameters(&mut self) {
        self.saved.clone_from(&self.values);
    }

    fn load_parameters(&mut self) {
        self.values.clone_from(&self.saved);
    }

    fn update(&mut self) {
        self.solves += 1;
    }

    fn canvas_info(&self) -> CanvasInfo {
        self.canvas
    }

    fn drawable_ids(&self) -> &[String] {
        &self.drawable_ids
    }

    fn drawable_vertices(&self, index: usize) -> &[f32] {
        self.drawable_vertices
            .get(index)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}
