//! Smoothed gaze target.

/// Tracks a target in [-1, 1]² and eases the current gaze toward it.
///
/// Smoothing is exponential in elapsed time, so the result does not depend on how the
/// same interval is split into frames.
#[derive(Clone, Debug, PartialEq)]
pub struct FocusController {
    target_x: f32,
    target_y: f32,
    x: f32,
    y: f32,
    time_constant_ms: f32,
}

impl FocusController {
    pub fn new(time_constant_ms: f32) -> Self {
        Self {
            target_x: 0.0,
            target_y: 0.0,
            x: 0.0,
            y: 0.0,
            time_constant_ms: time_constant_ms.max(0.0),
        }
    }

    /// Set the target, clamped per axis. `instant` skips smoothing.
    pub fn focus(&mut self, x: f32, y: f32, instant: bool) {
        self.target_x = clamp_unit(x);
        self.target_y = clamp_unit(y);
        if instant {
            self.x = self.target_x;
            self.y = self.target_y;
        }
    }

    pub fn update(&mut self, dt_ms: f32) {
        if dt_ms <= 0.0 {
            return;
        }
        let alpha = if self.time_constant_ms <= 0.0 {
            1.0
        } else {
            1.0 - (-dt_ms / self.time_constant_ms).exp()
        };
        self.x += (self.target_x - self.x) * alpha;
        self.y += (self.target_y - self.y) * alpha;
    }

    #[inline]
    pub fn x(&self) -> f32 {
        self.x
    }

    #[inline]
    pub fn y(&self) -> f32 {
        self.y
    }

    pub fn target(&self) -> (f32, f32) {
        (self.target_x, self.target_y)
    }
}

impl Default for FocusController {
    fn default() -> Self {
        Self::new(100.0)
    }
}

#[inline]
fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_is_clamped() {
        let mut f = FocusController::default();
        f.focus(3.0, -7.0, true);
        assert_eq!((f.x(), f.y()), (1.0, -1.0));
    }

    #[test]
    fn converges_monotonically_without_overshoot() {
        let mut f = FocusController::new(100.0);
        f.focus(1.0, 0.5, false);
        let mut prev = 0.0;
        for _ in 0..200 {
            f.update(16.0);
            assert!(f.x() >= prev && f.x() <= 1.0);
            prev = f.x();
        }
        assert!((f.x() - 1.0).abs() < 1e-3);
        assert!((f.y() - 0.5).abs() < 1e-3);
    }

    #[test]
    fn split_frames_match_one_large_step() {
        let mut a = FocusController::new(100.0);
        let mut b = FocusController::new(100.0);
        a.focus(1.0, 0.0, false);
        b.focus(1.0, 0.0, false);
        a.update(32.0);
        b.update(16.0);
        b.update(16.0);
        assert!((a.x() - b.x()).abs() < 1e-5);
    }

    #[test]
    fn zero_dt_is_a_no_op() {
        let mut f = FocusController::default();
        f.focus(1.0, 1.0, false);
        f.update(0.0);
        assert_eq!((f.x(), f.y()), (0.0, 0.0));
    }
}
