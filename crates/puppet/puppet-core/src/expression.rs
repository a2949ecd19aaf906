//! Expressions: parameter offsets layered on top of motions, cross-faded on change.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::PayloadError;
use crate::events::ModelEvent;
use crate::ids::PlaybackHandle;
use crate::manifest::ModelManifest;
use crate::motion::queue::{AnimationQueue, PlaybackFrame, Playable};
use crate::native::CoreModel;

const KIND: &str = "expression";
const RNG_SALT: u64 = 0x6578_7072;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpressionBlend {
    #[default]
    Add,
    Multiply,
    Overwrite,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExpressionParameter {
    pub id: String,
    pub value: f32,
    #[serde(default)]
    pub blend: ExpressionBlend,
}

/// Parsed expression payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExpressionData {
    #[serde(default, rename = "FadeInTime")]
    pub fade_in_secs: Option<f32>,
    #[serde(default, rename = "FadeOutTime")]
    pub fade_out_secs: Option<f32>,
    #[serde(default)]
    pub parameters: Vec<ExpressionParameter>,
}

impl ExpressionData {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, PayloadError> {
        let mut data: ExpressionData = serde_json::from_slice(bytes)
            .map_err(|e| PayloadError::malformed(KIND, e.to_string()))?;
        data.fade_in_secs = data.fade_in_secs.filter(|v| *v >= 0.0);
        data.fade_out_secs = data.fade_out_secs.filter(|v| *v >= 0.0);
        Ok(data)
    }
}

/// An expression ready for playback, with fades resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct Expression {
    pub name: String,
    pub data: ExpressionData,
    fade_in_secs: f32,
    fade_out_secs: f32,
}

impl Expression {
    pub fn new(
        name: impl Into<String>,
        data: ExpressionData,
        definition_fades: (Option<f32>, Option<f32>),
        default_fade_secs: f32,
    ) -> Self {
        let fade_in_secs = definition_fades
            .0
            .or(data.fade_in_secs)
            .unwrap_or(default_fade_secs);
        let fade_out_secs = definition_fades
            .1
            .or(data.fade_out_secs)
            .unwrap_or(default_fade_secs);
        Self {
            name: name.into(),
            data,
            fade_in_secs,
            fade_out_secs,
        }
    }
}

impl Playable for Expression {
    fn fade_in_secs(&self) -> f32 {
        self.fade_in_secs
    }

    fn fade_out_secs(&self) -> f32 {
        self.fade_out_secs
    }

    fn duration_secs(&self) -> Option<f64> {
        None
    }

    fn apply(&self, target: &mut dyn CoreModel, frame: &PlaybackFrame) {
        for p in &self.data.parameters {
            let Some(i) = target.parameter_index(&p.id) else {
                continue;
            };
            match p.blend {
                ExpressionBlend::Add => target.add_parameter_value(i, p.value, frame.weight),
                ExpressionBlend::Multiply => {
                    target.multiply_parameter_value(i, p.value, frame.weight)
                }
                ExpressionBlend::Overwrite => {
                    target.blend_parameter_value(i, p.value, frame.weight)
                }
            }
        }
    }
}

/// Lookup key for [`ExpressionManager::set_expression`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExpressionKey {
    Index(usize),
    Name(String),
}

impl From<usize> for ExpressionKey {
    fn from(i: usize) -> Self {
        ExpressionKey::Index(i)
    }
}

impl From<&str> for ExpressionKey {
    fn from(name: &str) -> Self {
        ExpressionKey::Name(name.to_string())
    }
}

/// Holds at most one current expression and cross-fades between them.
pub struct ExpressionManager {
    expressions: Vec<Arc<Expression>>,
    default_expression: Arc<Expression>,
    queue: AnimationQueue<Expression>,
    current: Option<usize>,
    // the default expression is playing over `current`
    reset: bool,
    rng: StdRng,
    events: Vec<ModelEvent>,
}

impl ExpressionManager {
    /// Pair payloads with the manifest's expression list by position.
    pub fn new(manifest: &ModelManifest, data: Vec<ExpressionData>, config: &Config) -> Self {
        let default_secs = config.expression_fading_duration_ms / 1000.0;
        let expressions = manifest
            .expressions
            .iter()
            .zip(data)
            .map(|(def, d)| {
                Arc::new(Expression::new(
                    def.name.clone(),
                    d,
                    (def.fade_in_secs, def.fade_out_secs),
                    default_secs,
                ))
            })
            .collect();
        Self::from_expressions(expressions, config)
    }

    /// Manager with no expressions; only the empty default can play.
    pub fn empty(config: &Config) -> Self {
        Self::from_expressions(Vec::new(), config)
    }

    fn from_expressions(expressions: Vec<Arc<Expression>>, config: &Config) -> Self {
        let default_secs = config.expression_fading_duration_ms / 1000.0;
        Self {
            expressions,
            default_expression: Arc::new(Expression::new(
                "",
                ExpressionData::default(),
                (None, None),
                default_secs,
            )),
            queue: AnimationQueue::new(),
            current: None,
            reset: false,
            rng: config.rng(RNG_SALT),
            events: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.expressions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.expressions.iter().position(|e| e.name == name)
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn is_finished(&self) -> bool {
        self.queue.is_finished()
    }

    /// Fade to the expression at `key`. `None` if unknown, or already current and not reset.
    pub fn set_expression(&mut self, key: impl Into<ExpressionKey>) -> Option<PlaybackHandle> {
        let key = key.into();
        let index = match &key {
            ExpressionKey::Index(i) if *i < self.expressions.len() => *i,
            ExpressionKey::Name(name) => match self.index_of(name) {
                Some(i) => i,
                None => {
                    log::debug!("expression {name:?} not found");
                    return None;
                }
            },
            ExpressionKey::Index(i) => {
                log::debug!("expression index {i} out of range");
                return None;
            }
        };
        if self.current == Some(index) && !self.reset {
            return None;
        }
        self.current = Some(index);
        self.reset = false;
        let handle = self.queue.start(self.expressions[index].clone(), None);
        self.events.push(ModelEvent::ExpressionSet { index });
        Some(handle)
    }

    /// Pick any expression other than the current one.
    pub fn set_random_expression(&mut self) -> Option<PlaybackHandle> {
        let candidates: Vec<usize> = (0..self.expressions.len())
            .filter(|i| Some(*i) != self.current)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let pick = candidates[self.rng.gen_range(0..candidates.len())];
        self.set_expression(pick)
    }

    /// Fade to the empty default expression. The current expression is remembered.
    pub fn reset_expression(&mut self) {
        self.reset = true;
        self.queue.start(self.default_expression.clone(), None);
    }

    /// Fade back in the current expression, if any.
    pub fn restore_expression(&mut self) {
        if let Some(i) = self.current {
            self.reset = false;
            self.queue.start(self.expressions[i].clone(), None);
        }
    }

    pub fn update(&mut self, model: &mut dyn CoreModel, now_secs: f64) -> bool {
        if self.queue.is_finished() {
            return false;
        }
        let updated = self.queue.update(model, now_secs);
        self.queue.drain_events();
        updated
    }

    pub fn take_events(&mut self) -> Vec<ModelEvent> {
        std::mem::take(&mut self.events)
    }
}

impl std::fmt::Debug for ExpressionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionManager")
            .field("expressions", &self.expressions.len())
            .field("current", &self.current)
            .field("queue", &self.queue)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::CanvasInfo;
    use crate::store::ParameterStore;
    use serde_json::json;

    fn manifest() -> ModelManifest {
        ModelManifest::parse(
            &json!({
                "FileReferences": {
                    "Moc": "m.moc3",
                    "Textures": ["t.png"],
                    "Expressions": [
                        {"Name": "smile", "File": "smile.exp3.json"},
                        {"Name": "angry", "File": "angry.exp3.json"}
                    ]
                }
            }),
            "m.model3.json",
        )
        .unwrap()
    }

    fn payload(s: &str) -> ExpressionData {
        ExpressionData::from_slice(s.as_bytes()).unwrap()
    }

    fn manager() -> ExpressionManager {
        let config = Config {
            random_seed: Some(3),
            ..Config::default()
        };
        ExpressionManager::new(
            &manifest(),
            vec![
                payload(
                    r#"{"Type":"Live2D Expression","FadeInTime":0,"Parameters":[
                        {"Id":"A","Value":2,"Blend":"Add"},
                        {"Id":"M","Value":3,"Blend":"Multiply"},
                        {"Id":"O","Value":5,"Blend":"Overwrite"}]}"#,
                ),
                payload(r#"{"Parameters":[{"Id":"A","Value":-1}]}"#),
            ],
            &config,
        )
    }

    fn store() -> ParameterStore {
        ParameterStore::new(CanvasInfo {
            width: 1.0,
            height: 1.0,
            pixels_per_unit: 1.0,
        })
        .with_parameter("A", -10.0, 10.0, 1.0)
        .with_parameter("M", -10.0, 10.0, 2.0)
        .with_parameter("O", -10.0, 10.0, 1.0)
    }

    #[test]
    fn blend_modes_apply_at_full_weight() {
        let mut m = manager();
        let mut s = store();
        assert!(m.set_expression("smile").is_some());
        assert!(m.update(&mut s, 0.0));
        assert_eq!(s.value_of("A"), Some(3.0));
        assert_eq!(s.value_of("M"), Some(6.0));
        assert_eq!(s.value_of("O"), Some(5.0));
    }

    #[test]
    fn rejects_unknown_and_current() {
        let mut m = manager();
        assert!(m.set_expression("missing").is_none());
        assert!(m.set_expression(7usize).is_none());
        assert!(m.set_expression(1usize).is_some());
        assert!(m.set_expression("angry").is_none());
        assert_eq!(m.take_events(), vec![ModelEvent::ExpressionSet { index: 1 }]);
    }

    #[test]
    fn random_never_picks_current() {
        let mut m = manager();
        m.set_expression(0usize);
        for _ in 0..8 {
            m.set_random_expression();
            let cur = m.current().unwrap();
            m.set_random_expression();
            assert_ne!(m.current(), Some(cur));
        }
    }

    #[test]
    fn reset_keeps_current_for_restore() {
        let mut m = manager();
        let mut s = store();
        m.set_expression(0usize);
        m.update(&mut s, 0.0);
        m.reset_expression();
        assert_eq!(m.current(), Some(0));
        m.update(&mut s, 1.0);
        m.restore_expression();
        assert!(!m.is_finished());
    }

    #[test]
    fn current_can_be_reapplied_after_reset() {
        let mut m = manager();
        let mut s = store();
        assert!(m.set_expression("smile").is_some());
        m.update(&mut s, 0.0);
        m.reset_expression();
        m.update(&mut s, 1.0);

        assert!(m.set_expression("smile").is_some());
        assert!(m.set_expression("smile").is_none());
        assert_eq!(
            m.take_events(),
            vec![
                ModelEvent::ExpressionSet { index: 0 },
                ModelEvent::ExpressionSet { index: 0 },
            ]
        );

        m.reset_expression();
        m.restore_expression();
        assert!(m.set_expression("smile").is_none());
    }

    #[test]
    fn empty_manager_does_not_update() {
        let config = Config::default();
        let mut m = ExpressionManager::empty(&config);
        let mut s = store();
        assert!(!m.update(&mut s, 0.0));
        assert!(m.set_random_expression().is_none());
    }
}
