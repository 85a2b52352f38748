use std::collections::VecDeque;

use glam::Vec2;
use serde::Deserialize;

/// Pointer positions are normalized device coordinates in `[-1, 1]`, +y up.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    PointerDown { x: f32, y: f32 },
    PointerUp,
    PointerMove { x: f32, y: f32 },
    Scroll { delta: f32 },
}

impl InputEvent {
    pub fn cursor(&self) -> Option<Vec2> {
        match *self {
            Self::PointerDown { x, y } | Self::PointerMove { x, y } => Some(Vec2::new(x, y)),
            Self::PointerUp | Self::Scroll { .. } => None,
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::PointerDown { .. } => "pointer_down",
            Self::PointerUp => "pointer_up",
            Self::PointerMove { .. } => "pointer_move",
            Self::Scroll { .. } => "scroll",
        }
    }
}

/// FIFO of events waiting for the next frame.
#[derive(Debug, Default)]
pub struct InputQueue {
    pending: VecDeque<InputEvent>,
    total_received: u64,
}

impl InputQueue {
    pub fn push(&mut self, event: InputEvent) {
        self.total_received = self.total_received.saturating_add(1);
        self.pending.push_back(event);
    }

    pub fn pop(&mut self) -> Option<InputEvent> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn total_received(&self) -> u64 {
        self.total_received
    }
}
