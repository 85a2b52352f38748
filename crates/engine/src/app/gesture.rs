use std::time::Duration;

pub const HOLD_PROGRESS_MAX: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Easing {
    Linear,
    #[default]
    QuadInOut,
}

impl Easing {
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::QuadInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    let inv = -2.0 * t + 2.0;
                    1.0 - inv * inv / 2.0
                }
            }
        }
    }
}

/// Eased interpolation between two values driven purely by elapsed time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ramp {
    from: f32,
    to: f32,
    duration: Duration,
    elapsed: Duration,
    easing: Easing,
}

impl Ramp {
    pub fn new(from: f32, to: f32, duration: Duration, easing: Easing) -> Self {
        Self {
            from,
            to,
            duration,
            elapsed: Duration::ZERO,
            easing,
        }
    }

    /// Advances the ramp and returns the part of `dt` that was not consumed.
    pub fn advance(&mut self, dt: Duration) -> Duration {
        let available = self.duration.saturating_sub(self.elapsed);
        let used = dt.min(available);
        self.elapsed += used;
        dt - used
    }

    pub fn value(&self) -> f32 {
        if self.duration.is_zero() || self.elapsed >= self.duration {
            return self.to;
        }
        let t = self.elapsed.as_secs_f32() / self.duration.as_secs_f32();
        self.from + (self.to - self.from) * self.easing.apply(t)
    }

    pub fn is_finished(&self) -> bool {
        self.elapsed >= self.duration
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoldPhase {
    Idle,
    Pressing { node: String },
    Releasing { completed: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum HoldEvent {
    Progress(f32),
    Completed { node: String },
    Cancelled { node: String },
    Settled,
}

#[derive(Debug, Clone)]
pub struct HoldGesture {
    phase: HoldPhase,
    ramp: Option<Ramp>,
    progress: f32,
    release_duration: Duration,
    easing: Easing,
}

impl HoldGesture {
    pub fn new(release_duration: Duration) -> Self {
        Self {
            phase: HoldPhase::Idle,
            ramp: None,
            progress: 0.0,
            release_duration,
            easing: Easing::default(),
        }
    }

    pub fn phase(&self) -> &HoldPhase {
        &self.phase
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn held_node(&self) -> Option<&str> {
        match &self.phase {
            HoldPhase::Pressing { node } => Some(node.as_str()),
            _ => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.phase == HoldPhase::Idle
    }

    /// Starts pressing `node`. Ignored while any progress remains, including
    /// the ramp-down after a previous hold.
    pub fn press(&mut self, node: &str, duration: Duration) -> bool {
        if self.progress > 0.0 || !self.is_idle() {
            return false;
        }
        self.phase = HoldPhase::Pressing {
            node: node.to_string(),
        };
        self.ramp = Some(Ramp::new(0.0, HOLD_PROGRESS_MAX, duration, self.easing));
        true
    }

    pub fn release(&mut self) -> Option<HoldEvent> {
        let HoldPhase::Pressing { node } = &self.phase else {
            return None;
        };
        let event = HoldEvent::Cancelled { node: node.clone() };
        self.begin_release(false);
        Some(event)
    }

    /// Drops any in-flight hold without a callback or ramp-down.
    pub fn reset(&mut self) {
        self.phase = HoldPhase::Idle;
        self.ramp = None;
        self.progress = 0.0;
    }

    pub fn advance(&mut self, dt: Duration, events: &mut Vec<HoldEvent>) {
        let mut remaining = dt;
        loop {
            let Some(ramp) = self.ramp.as_mut() else {
                return;
            };
            remaining = ramp.advance(remaining);
            let value = ramp.value();
            let finished = ramp.is_finished();
            self.set_progress(value, events);

            match &self.phase {
                HoldPhase::Idle => {
                    self.ramp = None;
                    return;
                }
                HoldPhase::Pressing { node } => {
                    if !finished {
                        return;
                    }
                    events.push(HoldEvent::Completed { node: node.clone() });
                    self.begin_release(true);
                    if self.is_idle() {
                        events.push(HoldEvent::Settled);
                        return;
                    }
                }
                HoldPhase::Releasing { .. } => {
                    if finished {
                        self.reset();
                        events.push(HoldEvent::Settled);
                    }
                    return;
                }
            }

            if remaining.is_zero() {
                return;
            }
        }
    }

    fn set_progress(&mut self, value: f32, events: &mut Vec<HoldEvent>) {
        if value != self.progress {
            self.progress = value;
            events.push(HoldEvent::Progress(value));
        }
    }

    fn begin_release(&mut self, completed: bool) {
        let duration = self
            .release_duration
            .mul_f32((self.progress / HOLD_PROGRESS_MAX).clamp(0.0, 1.0));
        if duration.is_zero() {
            self.reset();
            return;
        }
        self.phase = HoldPhase::Releasing { completed };
        self.ramp = Some(Ramp::new(self.progress, 0.0, duration, self.easing));
    }
}
