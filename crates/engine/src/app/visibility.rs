use crate::config::{require_finite, ConfigurationError};

/// Closed scroll-progress interval in which a node is shown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityWindow {
    start: f32,
    end: f32,
}

impl VisibilityWindow {
    pub fn new(start: f32, end: f32) -> Result<Self, ConfigurationError> {
        let start = require_finite("visibility_start", start)?;
        let end = require_finite("visibility_end", end)?;
        if start > end {
            return Err(ConfigurationError::InvertedVisibilityWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> f32 {
        self.start
    }

    pub fn end(&self) -> f32 {
        self.end
    }

    pub fn contains(&self, progress: f32) -> bool {
        self.start <= progress && progress <= self.end
    }

    /// Position of `progress` inside the window, clamped to `[0, 1]`.
    pub fn interpolation(&self, progress: f32) -> f32 {
        let span = self.end - self.start;
        if span <= 0.0 {
            return if progress >= self.end { 1.0 } else { 0.0 };
        }
        ((progress - self.start) / span).clamp(0.0, 1.0)
    }
}

pub fn is_visible(window: Option<&VisibilityWindow>, progress: f32) -> bool {
    window.map_or(true, |window| window.contains(progress))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityChange {
    Shown,
    Hidden,
}

impl VisibilityChange {
    pub fn is_visible(self) -> bool {
        self == Self::Shown
    }
}

/// Edge-triggered visibility state. The first observation is always reported.
#[derive(Debug, Clone, Default)]
pub struct VisibilityTracker {
    window: Option<VisibilityWindow>,
    last: Option<bool>,
}

impl VisibilityTracker {
    pub fn new(window: Option<VisibilityWindow>) -> Self {
        Self { window, last: None }
    }

    pub fn window(&self) -> Option<&VisibilityWindow> {
        self.window.as_ref()
    }

    pub fn observe(&mut self, progress: f32) -> Option<VisibilityChange> {
        let visible = is_visible(self.window.as_ref(), progress);
        if self.last == Some(visible) {
            return None;
        }
        self.last = Some(visible);
        Some(if visible {
            VisibilityChange::Shown
        } else {
            VisibilityChange::Hidden
        })
    }

    pub fn is_visible(&self) -> bool {
        self.last.unwrap_or(true)
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
