//! Motion payloads: parsing and curve evaluation.
//!
//! Curves store a flat segment list: the first point, then per segment a type tag followed
//! by its points. Types: 0 linear (1 point), 1 bezier (3 points), 2 stepped (1 point),
//! 3 inverse stepped (1 point). Times are seconds.

use serde::Deserialize;

use crate::error::PayloadError;
use crate::manifest::MotionDefinition;
use crate::motion::queue::{fade_weight, PlaybackFrame, Playable};
use crate::native::CoreModel;

const KIND: &str = "motion";

/// Most loop cycles a single `events_between` call reports per event.
pub const MAX_EVENT_CYCLES: usize = 16;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CurvePoint {
    pub time: f64,
    pub value: f32,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Segment {
    Linear { end: CurvePoint },
    Bezier { c1: CurvePoint, c2: CurvePoint, end: CurvePoint },
    Stepped { end: CurvePoint },
    InverseStepped { end: CurvePoint },
}

impl Segment {
    fn end(&self) -> CurvePoint {
        match *self {
            Segment::Linear { end }
            | Segment::Bezier { end, .. }
            | Segment::Stepped { end }
            | Segment::InverseStepped { end } => end,
        }
    }

    fn evaluate(&self, start: CurvePoint, time: f64) -> f32 {
        let end = self.end();
        let span = end.time - start.time;
        let k = if span > 0.0 {
            ((time - start.time) / span).clamp(0.0, 1.0) as f32
        } else {
            1.0
        };
        match *self {
            Segment::Linear { .. } => lerp(start.value, end.value, k),
            Segment::Stepped { .. } => start.value,
            Segment::InverseStepped { .. } => end.value,
            Segment::Bezier { c1, c2, .. } => {
                // de Casteljau on values at normalized time
                let p01 = lerp(start.value, c1.value, k);
                let p12 = lerp(c1.value, c2.value, k);
                let p23 = lerp(c2.value, end.value, k);
                let p012 = lerp(p01, p12, k);
                let p123 = lerp(p12, p23, k);
                lerp(p012, p123, k)
            }
        }
    }
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CurveTarget {
    Parameter,
    PartOpacity,
    /// Model-level curves (eye blink / lip sync opacity); not applied.
    Model,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MotionCurve {
    pub target: CurveTarget,
    pub id: String,
    pub fade_in_secs: Option<f32>,
    pub fade_out_secs: Option<f32>,
    pub first: CurvePoint,
    pub segments: Vec<Segment>,
}

impl MotionCurve {
    /// Value at `time`, holding the first and last points outside the curve's range.
    pub fn evaluate(&self, time: f64) -> f32 {
        if time <= self.first.time {
            return self.first.value;
        }
        let mut start = self.first;
        for seg in &self.segments {
            let end = seg.end();
            if time <= end.time {
                return seg.evaluate(start, time);
            }
            start = end;
        }
        start.value
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UserDataEvent {
    pub time: f64,
    pub value: String,
}

/// Parsed motion payload.
#[derive(Clone, Debug, PartialEq)]
pub struct MotionData {
    pub duration_secs: f64,
    pub looped: bool,
    pub fade_in_secs: Option<f32>,
    pub fade_out_secs: Option<f32>,
    pub curves: Vec<MotionCurve>,
    pub user_data: Vec<UserDataEvent>,
}

impl MotionData {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, PayloadError> {
        let raw: RawMotion = serde_json::from_slice(bytes)
            .map_err(|e| PayloadError::malformed(KIND, e.to_string()))?;
        raw.into_data()
    }

    pub fn from_json(json: &serde_json::Value) -> Result<Self, PayloadError> {
        let raw = RawMotion::deserialize(json)
            .map_err(|e| PayloadError::malformed(KIND, e.to_string()))?;
        raw.into_data()
    }

    /// Events in `(from, to]` of playback time; looping motions repeat their events
    /// every cycle. A span covering more than [`MAX_EVENT_CYCLES`] cycles reports only
    /// the most recent ones.
    pub fn events_between(&self, from: f64, to: f64) -> Vec<String> {
        let mut hits: Vec<(f64, &str)> = Vec::new();
        let period = self.duration_secs;
        for ev in &self.user_data {
            if self.looped && period > 0.0 {
                let first = if ev.time > from {
                    0.0
                } else {
                    ((from - ev.time) / period).floor() + 1.0
                };
                let last = ((to - ev.time) / period).floor();
                if last < first {
                    continue;
                }
                let skipped = last - first + 1.0 - MAX_EVENT_CYCLES as f64;
                if skipped > 0.0 {
                    log::debug!("user data {:?}: skipped {skipped} cycles", ev.value);
                }
                let first = first.max(last - (MAX_EVENT_CYCLES as f64 - 1.0));
                // first..=last spans at most MAX_EVENT_CYCLES
                let cycles = (last - first) as usize + 1;
                for k in (0..cycles).map(|i| first + i as f64) {
                    let t = ev.time + k * period;
                    if t > from && t <= to {
                        hits.push((t, &ev.value));
                    }
                }
            } else if ev.time > from && ev.time <= to {
                hits.push((ev.time, &ev.value));
            }
        }
        hits.sort_by(|a, b| a.0.total_cmp(&b.0));
        hits.into_iter().map(|(_, v)| v.to_string()).collect()
    }
}

/// A motion ready for playback, with its fades resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct Motion {
    pub data: MotionData,
    pub group: String,
    pub index: usize,
    pub sound: Option<String>,
    fade_in_secs: f32,
    fade_out_secs: f32,
}

impl Motion {
    /// Resolve fades: explicit definition value, then payload, then `default_fade_secs`.
    pub fn new(
        data: MotionData,
        definition: Option<&MotionDefinition>,
        group: &str,
        index: usize,
        default_fade_secs: f32,
    ) -> Self {
        let fade_in_secs = definition
            .and_then(|d| d.fade_in_secs)
            .or(data.fade_in_secs)
            .unwrap_or(default_fade_secs);
        let fade_out_secs = definition
            .and_then(|d| d.fade_out_secs)
            .or(data.fade_out_secs)
            .unwrap_or(default_fade_secs);
        Self {
            sound: definition.and_then(|d| d.sound.clone()),
            data,
            group: group.to_string(),
            index,
            fade_in_secs,
            fade_out_secs,
        }
    }

    fn local_time(&self, elapsed: f64) -> f64 {
        let d = self.data.duration_secs;
        if d <= 0.0 {
            0.0
        } else if self.data.looped {
            elapsed % d
        } else {
            elapsed.min(d)
        }
    }
}

impl Playable for Motion {
    fn fade_in_secs(&self) -> f32 {
        self.fade_in_secs
    }

    fn fade_out_secs(&self) -> f32 {
        self.fade_out_secs
    }

    fn duration_secs(&self) -> Option<f64> {
        if self.data.looped {
            None
        } else {
            Some(self.data.duration_secs.max(0.0))
        }
    }

    fn apply(&self, target: &mut dyn CoreModel, frame: &PlaybackFrame) {
        let t = self.local_time(frame.elapsed);
        for curve in &self.data.curves {
            match curve.target {
                CurveTarget::Model => {}
                CurveTarget::PartOpacity => {
                    if let Some(i) = target.part_index(&curve.id) {
                        target.set_part_opacity(i, curve.evaluate(t));
                    }
                }
                CurveTarget::Parameter => {
                    let Some(i) = target.parameter_index(&curve.id) else {
                        continue;
                    };
                    let fade_in = match curve.fade_in_secs {
                        Some(secs) => fade_weight(secs, frame.elapsed),
                        None => frame.fade_in_weight,
                    };
                    let fade_out = match (curve.fade_out_secs, frame.until_end) {
                        (Some(secs), Some(remaining)) => fade_weight(secs, remaining),
                        (Some(_), None) => 1.0,
                        (None, _) => frame.fade_out_weight,
                    };
                    let source = target.parameter_value(i);
                    let value = curve.evaluate(t);
                    target.set_parameter_value(i, source + (value - source) * fade_in * fade_out);
                }
            }
        }
    }

    fn fired_events(&self, from: f64, to: f64) -> Vec<String> {
        self.data.events_between(from, to)
    }
}

// ----- JSON schema (serde) -----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawMotion {
    meta: RawMeta,
    #[serde(default)]
    curves: Vec<RawCurve>,
    #[serde(default)]
    user_data: Vec<RawUserData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawMeta {
    duration: f64,
    #[serde(default)]
    r#loop: bool,
    #[serde(default)]
    fade_in_time: Option<f32>,
    #[serde(default)]
    fade_out_time: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawCurve {
    target: String,
    id: String,
    #[serde(default)]
    fade_in_time: Option<f32>,
    #[serde(default)]
    fade_out_time: Option<f32>,
    segments: Vec<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawUserData {
    time: f64,
    value: String,
}

fn non_negative(v: Option<f32>) -> Option<f32> {
    v.filter(|v| *v >= 0.0)
}

impl RawMotion {
    fn into_data(self) -> Result<MotionData, PayloadError> {
        if !self.meta.duration.is_finite() {
            return Err(PayloadError::malformed(KIND, "duration is not finite"));
        }
        let curves = self
            .curves
            .into_iter()
            .map(RawCurve::into_curve)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MotionData {
            duration_secs: self.meta.duration,
            looped: self.meta.r#loop,
            fade_in_secs: non_negative(self.meta.fade_in_time),
            fade_out_secs: non_negative(self.meta.fade_out_time),
            curves,
            user_data: self
                .user_data
                .into_iter()
                .map(|u| UserDataEvent {
                    time: u.time,
                    value: u.value,
                })
                .collect(),
        })
    }
}

impl RawCurve {
    fn into_curve(self) -> Result<MotionCurve, PayloadError> {
        let target = match self.target.as_str() {
            "Parameter" => CurveTarget::Parameter,
            "PartOpacity" => CurveTarget::PartOpacity,
            "Model" => CurveTarget::Model,
            other => {
                return Err(PayloadError::malformed(
                    KIND,
                    format!("curve {}: unknown target {other:?}", self.id),
                ))
            }
        };

        let s = &self.segments;
        if s.len() < 2 {
            return Err(PayloadError::malformed(
                KIND,
                format!("curve {}: missing first point", self.id),
            ));
        }
        let point = |i: usize| CurvePoint {
            time: s[i],
            value: s[i + 1] as f32,
        };
        let first = point(0);
        let mut segments = Vec::new();
        let mut i = 2;
        while i < s.len() {
            let tag = s[i];
            let needed = if tag == 1.0 { 6 } else { 2 };
            if i + needed >= s.len() {
                return Err(PayloadError::malformed(
                    KIND,
                    format!("curve {}: truncated segment at {i}", self.id),
                ));
            }
            let seg = match tag as i64 {
                0 => Segment::Linear { end: point(i + 1) },
                1 => Segment::Bezier {
                    c1: point(i + 1),
                    c2: point(i + 3),
                    end: point(i + 5),
                },
                2 => Segment::Stepped { end: point(i + 1) },
                3 => Segment::InverseStepped { end: point(i + 1) },
                _ => {
                    return Err(PayloadError::malformed(
                        KIND,
                        format!("curve {}: unknown segment type {tag}", self.id),
                    ))
                }
            };
            segments.push(seg);
            i += 1 + needed;
        }

        Ok(MotionCurve {
            target,
            id: self.id,
            fade_in_secs: non_negative(self.fade_in_time),
            fade_out_secs: non_negative(self.fade_out_time),
            first,
            segments,
        })
    }
}
