//! Automatic eye blinking.
//!
//! State machine driven by the caller's clock. Transitions are evaluated against `now`
//! only, so evaluating the same timestamp twice writes the same value.

use rand::rngs::StdRng;
use rand::Rng;

use crate::native::CoreModel;

const CLOSING_SECS: f64 = 0.1;
const CLOSED_SECS: f64 = 0.05;
const OPENING_SECS: f64 = 0.15;
const DEFAULT_INTERVAL_SECS: f64 = 4.0;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum BlinkState {
    First,
    Interval { next_blink: f64 },
    Closing { since: f64 },
    Closed { since: f64 },
    Opening { since: f64 },
}

pub struct EyeBlink {
    indices: Vec<usize>,
    state: BlinkState,
    interval_secs: f64,
    rng: StdRng,
}

impl EyeBlink {
    /// Resolve `ids` against `model`; unknown ids are dropped. `None` when nothing resolves.
    pub fn new(ids: &[String], model: &dyn CoreModel, rng: StdRng) -> Option<Self> {
        let indices: Vec<usize> = ids
            .iter()
            .filter_map(|id| {
                let index = model.parameter_index(id);
                if index.is_none() {
                    log::warn!("eye blink parameter {id:?} not found on model");
                }
                index
            })
            .collect();
        if indices.is_empty() {
            return None;
        }
        Some(Self {
            indices,
            state: BlinkState::First,
            interval_secs: DEFAULT_INTERVAL_SECS,
            rng,
        })
    }

    pub fn set_interval(&mut self, secs: f64) {
        self.interval_secs = secs.max(0.0);
    }

    pub fn state(&self) -> BlinkState {
        self.state
    }

    fn next_blink(&mut self, now: f64) -> f64 {
        let r: f64 = self.rng.gen();
        now + r * (2.0 * self.interval_secs - 1.0).max(0.0)
    }

    /// Advance to `now_secs` and write the eye openness to every blink parameter.
    pub fn update_parameters(&mut self, model: &mut dyn CoreModel, now_secs: f64) {
        let now = now_secs;
        let value = match self.state {
            BlinkState::First => {
                let next_blink = self.next_blink(now);
                self.state = BlinkState::Interval { next_blink };
                1.0
            }
            BlinkState::Interval { next_blink } => {
                if next_blink < now {
                    self.state = BlinkState::Closing { since: now };
                }
                1.0
            }
            BlinkState::Closing { since } => {
                let t = (now - since) / CLOSING_SECS;
                if t >= 1.0 {
                    self.state = BlinkState::Closed { since: now };
                    0.0
                } else {
                    1.0 - t.max(0.0)
                }
            }
            BlinkState::Closed { since } => {
                if (now - since) / CLOSED_SECS >= 1.0 {
                    self.state = BlinkState::Opening { since: now };
                }
                0.0
            }
            BlinkState::Opening { since } => {
                let t = (now - since) / OPENING_SECS;
                if t >= 1.0 {
                    let next_blink = self.next_blink(now);
                    self.state = BlinkState::Interval { next_blink };
                    1.0
                } else {
                    t.max(0.0)
                }
            }
        };
        for &i in &self.indices {
            model.set_parameter_value(i, value as f32);
        }
    }
}

impl std::fmt::Debug for EyeBlink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EyeBlink")
            .field("indices", &self.indices)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::CanvasInfo;
    use crate::store::ParameterStore;
    use rand::SeedableRng;

    fn store() -> ParameterStore {
        ParameterStore::new(CanvasInfo {
            width: 1.0,
            height: 1.0,
            pixels_per_unit: 1.0,
        })
        .with_parameter("ParamEyeLOpen", 0.0, 1.0, 1.0)
        .with_parameter("ParamEyeROpen", 0.0, 1.0, 1.0)
    }

    fn ids() -> Vec<String> {
        vec!["ParamEyeLOpen".into(), "ParamEyeROpen".into(), "Missing".into()]
    }

    #[test]
    fn unresolved_ids_yield_none() {
        let s = store();
        let none = vec!["Nope".to_string()];
        assert!(EyeBlink::new(&none, &s, StdRng::seed_from_u64(1)).is_none());
    }

    #[test]
    fn blinks_within_the_interval_window() {
        let mut s = store();
        let mut blink = EyeBlink::new(&ids(), &s, StdRng::seed_from_u64(1)).unwrap();
        let mut closed_at = None;
        let mut t = 0.0;
        while t < 10.0 {
            blink.update_parameters(&mut s, t);
            if s.value_of("ParamEyeLOpen") == Some(0.0) && closed_at.is_none() {
                closed_at = Some(t);
            }
            assert_eq!(s.value_of("ParamEyeLOpen"), s.value_of("ParamEyeROpen"));
            t += 1.0 / 60.0;
        }
        // first blink is scheduled within 2 * interval - 1 seconds
        assert!(closed_at.map_or(false, |c| c < 7.5));
    }

    #[test]
    fn same_timestamp_writes_same_value() {
        let mut s = store();
        let mut blink = EyeBlink::new(&ids(), &s, StdRng::seed_from_u64(9)).unwrap();
        let mut t = 0.0;
        while t < 10.0 {
            blink.update_parameters(&mut s, t);
            let first = s.value_of("ParamEyeLOpen");
            blink.update_parameters(&mut s, t);
            assert_eq!(s.value_of("ParamEyeLOpen"), first, "at t={t}");
            t += 1.0 / 30.0;
        }
    }
}
