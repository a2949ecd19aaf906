//! Motion playback by `(group, index)` with priority gating and idle fallback.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::events::ModelEvent;
use crate::expression::ExpressionManager;
use crate::ids::PlaybackHandle;
use crate::manifest::ModelManifest;
use crate::motion::data::{Motion, MotionData};
use crate::motion::queue::{AnimationQueue, FinishCallback, QueueEvent};
use crate::native::CoreModel;

const RNG_SALT: u64 = 0x6d6f_7469;

/// Start-request priority. Ordered: `None < Idle < Normal < Force`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MotionPriority {
    /// Not playing; never accepted as a request.
    #[default]
    None,
    Idle,
    Normal,
    Force,
}

pub struct MotionManager {
    groups: IndexMap<String, Vec<Arc<Motion>>>,
    idle_group: String,
    queue: AnimationQueue<Motion>,
    /// Labels for handles still known to the queue, consumed when they finish.
    labels: HashMap<PlaybackHandle, (String, usize)>,
    current: Option<(String, usize)>,
    current_priority: MotionPriority,
    overriding_expression: bool,
    sound: bool,
    preserve_expression: bool,
    rng: StdRng,
    events: Vec<ModelEvent>,
}

impl MotionManager {
    /// Build playable motions from parsed payloads. Fades are resolved here, once.
    pub fn new(
        manifest: &ModelManifest,
        motions: IndexMap<String, Vec<MotionData>>,
        config: &Config,
    ) -> Self {
        let idle_group = manifest.idle_group().to_string();
        let groups = motions
            .into_iter()
            .map(|(group, data)| {
                let default_ms = if group == idle_group {
                    config.idle_motion_fading_duration_ms
                } else {
                    config.motion_fading_duration_ms
                };
                let resolved = data
                    .into_iter()
                    .enumerate()
                    .map(|(i, d)| {
                        let def = manifest.motion_definition(&group, i);
                        Arc::new(Motion::new(d, def, &group, i, default_ms / 1000.0))
                    })
                    .collect();
                (group, resolved)
            })
            .collect();

        Self {
            groups,
            idle_group,
            queue: AnimationQueue::new(),
            labels: HashMap::new(),
            current: None,
            current_priority: MotionPriority::None,
            overriding_expression: false,
            sound: config.sound,
            preserve_expression: config.preserve_expression_on_motion,
            rng: config.rng(RNG_SALT),
            events: Vec::new(),
        }
    }

    pub fn idle_group(&self) -> &str {
        &self.idle_group
    }

    pub fn group_len(&self, group: &str) -> usize {
        self.groups.get(group).map_or(0, Vec::len)
    }

    pub fn motion(&self, group: &str, index: usize) -> Option<&Motion> {
        self.groups
            .get(group)
            .and_then(|g| g.get(index))
            .map(|m| m.as_ref())
    }

    pub fn is_finished(&self) -> bool {
        self.queue.is_finished()
    }

    pub fn current(&self) -> Option<(&str, usize)> {
        self.current.as_ref().map(|(g, i)| (g.as_str(), *i))
    }

    pub fn current_priority(&self) -> MotionPriority {
        self.current_priority
    }

    pub fn start_motion(
        &mut self,
        group: &str,
        index: usize,
        priority: MotionPriority,
        expressions: &mut ExpressionManager,
    ) -> Option<PlaybackHandle> {
        self.start_motion_with(group, index, priority, expressions, None)
    }

    /// Like [`Self::start_motion`], with a callback fired once when this playback ends.
    pub fn start_motion_with(
        &mut self,
        group: &str,
        index: usize,
        priority: MotionPriority,
        expressions: &mut ExpressionManager,
        on_finish: Option<FinishCallback>,
    ) -> Option<PlaybackHandle> {
        let Some(motion) = self.groups.get(group).and_then(|g| g.get(index)).cloned() else {
            log::debug!("motion {group}[{index}] not found");
            return None;
        };
        if let Err(reason) = self.admit(group, index, priority) {
            log::debug!("motion {group}[{index}] at {priority:?} rejected: {reason}");
            return None;
        }

        self.queue.stop_all();
        self.collect_queue_events();

        let handle = self.queue.start(motion.clone(), on_finish);
        self.labels.insert(handle, (group.to_string(), index));
        self.current = Some((group.to_string(), index));
        self.current_priority = priority;

        if !self.preserve_expression && group != self.idle_group {
            expressions.reset_expression();
            self.overriding_expression = true;
        }

        self.events.push(ModelEvent::MotionStarted {
            group: group.to_string(),
            index,
            sound: motion.sound.clone().filter(|_| self.sound),
        });
        Some(handle)
    }

    fn admit(&self, group: &str, index: usize, priority: MotionPriority) -> Result<(), &'static str> {
        let playing = !self.queue.is_finished();
        match priority {
            MotionPriority::None => Err("priority None is never accepted"),
            _ if playing
                && self
                    .current
                    .as_ref()
                    .map_or(false, |(g, i)| g == group && *i == index) =>
            {
                Err("already playing")
            }
            MotionPriority::Force => Ok(()),
            MotionPriority::Idle if playing => Err("a motion is playing"),
            MotionPriority::Idle => Ok(()),
            MotionPriority::Normal if playing && priority <= self.current_priority => {
                Err("current motion has equal or higher priority")
            }
            MotionPriority::Normal => Ok(()),
        }
    }

    /// Start a random motion from `group`. `None` when the group is empty or the request
    /// is rejected.
    pub fn start_random_motion(
        &mut self,
        group: &str,
        priority: MotionPriority,
        expressions: &mut ExpressionManager,
    ) -> Option<PlaybackHandle> {
        let len = self.group_len(group);
        if len == 0 {
            log::debug!("motion group {group:?} is empty");
            return None;
        }
        let index = self.rng.gen_range(0..len);
        self.start_motion(group, index, priority, expressions)
    }

    pub fn stop_all_motions(&mut self) {
        self.queue.stop_all();
        self.collect_queue_events();
    }

    /// Retire, fall back to idle when nothing is left, then apply. Returns whether any
    /// motion wrote parameters.
    pub fn update(
        &mut self,
        model: &mut dyn CoreModel,
        now_secs: f64,
        expressions: &mut ExpressionManager,
    ) -> bool {
        self.queue.advance(now_secs);
        self.collect_queue_events();

        if self.queue.is_finished() {
            self.current = None;
            self.current_priority = MotionPriority::None;
            if self.overriding_expression {
                expressions.restore_expression();
                self.overriding_expression = false;
            }
            let idle = self.idle_group.clone();
            if self.group_len(&idle) > 0 {
                self.start_random_motion(&idle, MotionPriority::Idle, expressions);
                self.queue.advance(now_secs);
            }
        }

        let updated = self.queue.apply(model, now_secs);
        self.collect_queue_events();
        updated
    }

    pub fn take_events(&mut self) -> Vec<ModelEvent> {
        std::mem::take(&mut self.events)
    }

    fn collect_queue_events(&mut self) {
        for event in self.queue.drain_events() {
            match event {
                QueueEvent::Finished { handle } => {
                    if let Some((group, index)) = self.labels.remove(&handle) {
                        self.events.push(ModelEvent::MotionFinished { group, index });
                    }
                }
                QueueEvent::UserData { value, .. } => {
                    self.events.push(ModelEvent::MotionUserData { value });
                }
            }
        }
    }
}

impl std::fmt::Debug for MotionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionManager")
            .field("groups", &self.groups.keys().collect::<Vec<_>>())
            .field("current", &self.current)
            .field("current_priority", &self.current_priority)
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
                    "Motions": {
                        "Idle": [{"File": "idle.motion3.json"}],
                        "Tap": [{"File": "a.motion3.json", "Sound": "a.wav"}, {"File": "b.motion3.json", "FadeInTime": 0.1}]
                    }
                }
            }),
            "m.model3.json",
        )
        .unwrap()
    }

    fn data(duration: f64) -> MotionData {
        MotionData::from_json(&json!({
            "Meta": {"Duration": duration, "Loop": false},
            "Curves": [{"Target": "Parameter", "Id": "P", "Segments": [0, 1, 0, duration, 1]}]
        }))
        .unwrap()
    }

    fn manager(config: &Config) -> MotionManager {
        let mut motions = IndexMap::new();
        motions.insert("Idle".to_string(), vec![data(1.0)]);
        motions.insert("Tap".to_string(), vec![data(1.0), data(1.0)]);
        MotionManager::new(&manifest(), motions, config)
    }

    fn store() -> ParameterStore {
        ParameterStore::new(CanvasInfo {
            width: 1.0,
            height: 1.0,
            pixels_per_unit: 1.0,
        })
        .with_parameter("P", 0.0, 1.0, 0.0)
    }

    fn seeded() -> Config {
        Config {
            random_seed: Some(7),
            ..Config::default()
        }
    }

    #[test]
    fn fades_resolve_per_tier() {
        let m = manager(&seeded());
        assert_eq!(crate::Playable::fade_in_secs(m.motion("Idle", 0).unwrap()), 2.0);
        assert_eq!(crate::Playable::fade_in_secs(m.motion("Tap", 0).unwrap()), 0.5);
        assert_eq!(crate::Playable::fade_in_secs(m.motion("Tap", 1).unwrap()), 0.1);
    }

    #[test]
    fn priority_gating() {
        let config = seeded();
        let mut m = manager(&config);
        let mut ex = ExpressionManager::empty(&config);
        let mut s = store();

        assert!(m.start_motion("Tap", 0, MotionPriority::None, &mut ex).is_none());
        assert!(m.start_motion("Tap", 0, MotionPriority::Normal, &mut ex).is_some());
        m.update(&mut s, 0.0, &mut ex);
        // same motion
        assert!(m.start_motion("Tap", 0, MotionPriority::Force, &mut ex).is_none());
        // idle never interrupts
        assert!(m.start_motion("Idle", 0, MotionPriority::Idle, &mut ex).is_none());
        // normal does not beat normal
        assert!(m.start_motion("Tap", 1, MotionPriority::Normal, &mut ex).is_none());
        assert!(m.start_motion("Tap", 1, MotionPriority::Force, &mut ex).is_some());
        assert_eq!(m.current(), Some(("Tap", 1)));
        assert_eq!(m.current_priority(), MotionPriority::Force);
        assert!(m.start_motion("Nope", 0, MotionPriority::Force, &mut ex).is_none());
        assert!(m.start_motion("Tap", 9, MotionPriority::Force, &mut ex).is_none());
    }

    #[test]
    fn forced_interruption_fires_callback_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let config = seeded();
        let mut m = manager(&config);
        let mut ex = ExpressionManager::empty(&config);
        let mut s = store();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();

        m.start_motion_with(
            "Tap",
            0,
            MotionPriority::Normal,
            &mut ex,
            Some(Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );
        m.update(&mut s, 0.0, &mut ex);
        assert!(m.start_motion("Tap", 1, MotionPriority::Force, &mut ex).is_some());
        m.update(&mut s, 0.1, &mut ex);
        m.update(&mut s, 0.7, &mut ex);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        m.update(&mut s, 5.0, &mut ex);
        m.stop_all_motions();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn finished_motion_falls_back_to_idle() {
        let config = seeded();
        let mut m = manager(&config);
        let mut ex = ExpressionManager::empty(&config);
        let mut s = store();

        m.start_motion("Tap", 0, MotionPriority::Normal, &mut ex);
        assert!(m.update(&mut s, 0.0, &mut ex));
        assert!(m.update(&mut s, 1.5, &mut ex));
        assert_eq!(m.current(), Some(("Idle", 0)));
        assert_eq!(m.current_priority(), MotionPriority::Idle);

        let events = m.take_events();
        assert_eq!(
            events,
            vec![
                ModelEvent::MotionStarted {
                    group: "Tap".into(),
                    index: 0,
                    sound: Some("a.wav".into())
                },
                ModelEvent::MotionFinished {
                    group: "Tap".into(),
                    index: 0
                },
                ModelEvent::MotionStarted {
                    group: "Idle".into(),
                    index: 0,
                    sound: None
                },
            ]
        );
    }

    #[test]
    fn sound_flag_suppresses_sound() {
        let config = Config {
            sound: false,
            ..seeded()
        };
        let mut m = manager(&config);
        let mut ex = ExpressionManager::empty(&config);
        m.start_motion("Tap", 0, MotionPriority::Normal, &mut ex);
        assert!(matches!(
            m.take_events().as_slice(),
            [ModelEvent::MotionStarted { sound: None, .. }]
        ));
    }
}
