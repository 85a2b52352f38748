use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::config::{require_factor, require_non_negative, ConfigurationError, RuntimeConfig};

const REFERENCE_FRAME_SECONDS: f32 = 1.0 / 60.0;
const SNAP_EPSILON: f32 = 1e-4;

/// Fraction of the remaining distance covered in `dt` for a per-frame factor
/// tuned at 60 fps.
pub(crate) fn damping_alpha(smoothing: f32, dt: Duration) -> f32 {
    if dt.is_zero() {
        return 0.0;
    }
    let frames = dt.as_secs_f32() / REFERENCE_FRAME_SECONDS;
    (1.0 - (1.0 - smoothing).powf(frames)).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ScrollSnapshot {
    pub current: f32,
    pub target: f32,
    pub delta: f32,
}

#[derive(Debug, Clone)]
pub struct ScrollSequencer {
    current: f32,
    target: f32,
    last_delta: f32,
    sensitivity: f32,
    smoothing: f32,
    disabled: bool,
}

impl ScrollSequencer {
    pub fn new(sensitivity: f32, smoothing: f32) -> Result<Self, ConfigurationError> {
        Ok(Self {
            current: 0.0,
            target: 0.0,
            last_delta: 0.0,
            sensitivity: require_non_negative("scroll_sensitivity", sensitivity)?,
            smoothing: require_factor("scroll_smoothing", smoothing)?,
            disabled: false,
        })
    }

    pub fn from_config(config: &RuntimeConfig) -> Result<Self, ConfigurationError> {
        Self::new(config.scroll_sensitivity, config.scroll_smoothing)
    }

    /// Accumulates a raw wheel delta into the target. Returns whether it was applied.
    pub fn apply_delta(&mut self, delta: f32) -> bool {
        if self.disabled || !delta.is_finite() {
            return false;
        }
        self.target += delta * self.sensitivity;
        true
    }

    /// Moves the target programmatically; `current` keeps easing towards it.
    pub fn scroll_to(&mut self, target: f32) {
        if !target.is_finite() {
            debug!(target, "scroll_to_ignored_non_finite");
            return;
        }
        self.target = target;
    }

    /// Places both `current` and `target` at `value` with no easing.
    pub fn jump_to(&mut self, value: f32) {
        if !value.is_finite() {
            return;
        }
        self.current = value;
        self.target = value;
        self.last_delta = 0.0;
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn step(&mut self, dt: Duration) -> ScrollSnapshot {
        let previous = self.current;
        let alpha = damping_alpha(self.smoothing, dt);
        self.current += (self.target - self.current) * alpha;
        if (self.target - self.current).abs() < SNAP_EPSILON {
            self.current = self.target;
        }
        self.last_delta = self.current - previous;
        self.snapshot()
    }

    pub fn snapshot(&self) -> ScrollSnapshot {
        ScrollSnapshot {
            current: self.current,
            target: self.target,
            delta: self.last_delta,
        }
    }
}
