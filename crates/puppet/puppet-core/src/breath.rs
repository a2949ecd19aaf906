//! Sinusoidal idle sway ("breathing").

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::manifest::StandardParameterIds;
use crate::native::CoreModel;

/// One swaying parameter: `offset + peak * sin(2π t / cycle)`, added at `weight`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BreathParameter {
    pub id: String,
    pub offset: f32,
    pub peak: f32,
    pub cycle_secs: f32,
    pub weight: f32,
}

impl BreathParameter {
    pub fn new(id: impl Into<String>, offset: f32, peak: f32, cycle_secs: f32, weight: f32) -> Self {
        Self {
            id: id.into(),
            offset,
            peak,
            cycle_secs,
            weight,
        }
    }

    pub fn value_at(&self, now_secs: f64) -> f32 {
        if self.cycle_secs <= 0.0 {
            return self.offset;
        }
        let phase = TAU * now_secs / self.cycle_secs as f64;
        self.offset + self.peak * phase.sin() as f32
    }
}

#[derive(Clone, Debug)]
pub struct Breath {
    entries: Vec<(usize, BreathParameter)>,
}

impl Breath {
    /// Resolve `parameters` against `model`; unknown ids are skipped.
    pub fn new(parameters: Vec<BreathParameter>, model: &dyn CoreModel) -> Self {
        let entries = parameters
            .into_iter()
            .filter_map(|p| model.parameter_index(&p.id).map(|i| (i, p)))
            .collect();
        Self { entries }
    }

    /// The standard head/body/breath sway.
    pub fn standard_parameters(ids: &StandardParameterIds) -> Vec<BreathParameter> {
        vec![
            BreathParameter::new(ids.angle_x.clone(), 0.0, 15.0, 6.5345, 0.5),
            BreathParameter::new(ids.angle_y.clone(), 0.0, 8.0, 3.5345, 0.5),
            BreathParameter::new(ids.angle_z.clone(), 0.0, 10.0, 5.5345, 0.5),
            BreathParameter::new(ids.body_angle_x.clone(), 0.0, 4.0, 15.5345, 0.5),
            BreathParameter::new(ids.breath.clone(), 0.0, 0.5, 3.2345, 0.5),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn update_parameters(&self, model: &mut dyn CoreModel, now_secs: f64) {
        for (index, p) in &self.entries {
            model.add_parameter_value(*index, p.value_at(now_secs), p.weight);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestFormat;
    use crate::native::CanvasInfo;
    use crate::store::ParameterStore;

    #[test]
    fn resolves_only_known_ids() {
        let s = ParameterStore::new(CanvasInfo {
            width: 1.0,
            height: 1.0,
            pixels_per_unit: 1.0,
        })
        .with_parameter("ParamAngleX", -30.0, 30.0, 0.0)
        .with_parameter("ParamBreath", 0.0, 1.0, 0.0);
        let ids = ManifestFormat::Modern.standard_parameter_ids();
        let b = Breath::new(Breath::standard_parameters(&ids), &s);
        assert_eq!(b.entries.len(), 2);
    }

    #[test]
    fn adds_weighted_sine() {
        let mut s = ParameterStore::new(CanvasInfo {
            width: 1.0,
            height: 1.0,
            pixels_per_unit: 1.0,
        })
        .with_parameter("X", -30.0, 30.0, 1.0);
        let b = Breath::new(vec![BreathParameter::new("X", 0.0, 10.0, 4.0, 0.5)], &s);
        // quarter cycle: sin = 1
        b.update_parameters(&mut s, 1.0);
        assert!((s.value_of("X").unwrap() - 6.0).abs() < 1e-4);
    }
}
