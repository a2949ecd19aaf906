//! Model layout: local transform from manifest layout keys, and the centering transform
//! that maps model units to canvas pixels.

use glam::{Affine2, Mat4, Vec2, Vec4};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Size of the logical model space the layout keys are expressed in.
pub const LOGICAL_WIDTH: f32 = 2.0;
pub const LOGICAL_HEIGHT: f32 = 2.0;

/// Normalized layout keys. All optional; absent keys fall back to the logical size and a
/// zero offset.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutSpec {
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub center_x: Option<f32>,
    pub center_y: Option<f32>,
    pub left: Option<f32>,
    pub right: Option<f32>,
    pub top: Option<f32>,
    pub bottom: Option<f32>,
}

impl LayoutSpec {
    /// Build from snake_case keys; unknown keys are ignored.
    pub fn from_map(map: &IndexMap<String, f32>) -> Self {
        let get = |k: &str| map.get(k).copied();
        Self {
            width: get("width"),
            height: get("height"),
            x: get("x"),
            y: get("y"),
            center_x: get("center_x"),
            center_y: get("center_y"),
            left: get("left"),
            right: get("right"),
            top: get("top"),
            bottom: get("bottom"),
        }
    }
}

/// Resolved transforms and sizes of one model.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelLayout {
    pub original_width: f32,
    pub original_height: f32,
    pub width: f32,
    pub height: f32,
    pub pixels_per_unit: f32,
    /// Layout scale and offset, applied after centering.
    pub local: Affine2,
    /// Model units to canvas pixels, origin moved to the canvas center.
    pub centering: Affine2,
}

impl ModelLayout {
    pub fn new(spec: &LayoutSpec, original_width: f32, original_height: f32, ppu: f32) -> Self {
        let lw = spec.width.unwrap_or(LOGICAL_WIDTH);
        let lh = spec.height.unwrap_or(LOGICAL_HEIGHT);
        let scale = Vec2::new(lw / LOGICAL_WIDTH, lh / LOGICAL_HEIGHT);

        let width = original_width * scale.x;
        let height = original_height * scale.y;

        let offset_x = spec
            .x
            .map(|x| x - lw / 2.0)
            .or(spec.center_x)
            .or(spec.left.map(|l| l - lw / 2.0))
            .or(spec.right.map(|r| r + lw / 2.0))
            .unwrap_or(0.0);
        let offset_y = spec
            .y
            .map(|y| y - lh / 2.0)
            .or(spec.center_y)
            .or(spec.top.map(|t| t - lh / 2.0))
            .or(spec.bottom.map(|b| b + lh / 2.0))
            .unwrap_or(0.0);

        let local = Affine2::from_translation(Vec2::new(width * offset_x, -height * offset_y))
            * Affine2::from_scale(scale);
        let centering =
            Affine2::from_translation(Vec2::new(original_width / 2.0, original_height / 2.0))
                * Affine2::from_scale(Vec2::splat(ppu));

        Self {
            original_width,
            original_height,
            width,
            height,
            pixels_per_unit: ppu,
            local,
            centering,
        }
    }
}

/// Expand a 2D affine into the 4x4 matrix renderers expect, with Y inverted.
pub fn to_mvp(m: &Affine2) -> Mat4 {
    let x = m.matrix2.x_axis;
    let y = m.matrix2.y_axis;
    let t = m.translation;
    Mat4::from_cols(
        Vec4::new(x.x, x.y, 0.0, 0.0),
        Vec4::new(-y.x, -y.y, 0.0, 0.0),
        Vec4::Z,
        Vec4::new(t.x, t.y, 0.0, 1.0),
    )
}
