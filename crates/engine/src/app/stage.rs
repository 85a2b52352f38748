use std::time::Duration;

use tracing::{debug, info, warn};

use super::audio::{AudioBackend, AudioLifecycleManager};
use super::component::SceneSignal;
use super::input::{InputEvent, InputQueue};
use super::metrics::HoldProgressHandle;
use super::scene::{RuntimeServices, SceneController, SceneError};
use super::scroll::{ScrollSequencer, ScrollSnapshot};
use crate::config::{ConfigurationError, RuntimeConfig};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct FrameReport {
    pub input_events: usize,
    pub signals: Vec<SceneSignal>,
}

/// Process-wide owner of scroll, audio and hold-progress state plus the
/// single active scene.
pub struct Stage {
    config: RuntimeConfig,
    scroll: ScrollSequencer,
    audio: AudioLifecycleManager,
    hold_progress: HoldProgressHandle,
    input: InputQueue,
    active: Option<SceneController>,
}

macro_rules! services {
    ($stage:expr) => {
        RuntimeServices {
            config: &$stage.config,
            scroll: &mut $stage.scroll,
            audio: &mut $stage.audio,
            hold_progress: &$stage.hold_progress,
        }
    };
}

impl Stage {
    pub fn new(
        config: RuntimeConfig,
        backend: Box<dyn AudioBackend>,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self {
            scroll: ScrollSequencer::from_config(&config)?,
            config,
            audio: AudioLifecycleManager::new(backend),
            hold_progress: HoldProgressHandle::default(),
            input: InputQueue::default(),
            active: None,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn active(&self) -> Option<&SceneController> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut SceneController> {
        self.active.as_mut()
    }

    pub fn audio(&self) -> &AudioLifecycleManager {
        &self.audio
    }

    pub fn scroll(&self) -> ScrollSnapshot {
        self.scroll.snapshot()
    }

    /// Shared reader for overlays that draw the hold ring.
    pub fn hold_progress(&self) -> HoldProgressHandle {
        self.hold_progress.clone()
    }

    pub fn pending_input(&self) -> usize {
        self.input.len()
    }

    /// Disposes the current scene, then mounts `next`. On failure the partial
    /// scene is disposed and the stage is left without an active scene.
    pub fn enter(&mut self, mut next: SceneController) -> Result<(), SceneError> {
        if let Some(mut previous) = self.active.take() {
            info!(from = previous.name(), to = next.name(), "scene_switch");
            previous.dispose(&mut services!(self));
        }
        match next.init(&mut services!(self)) {
            Ok(()) => {
                self.active = Some(next);
                Ok(())
            }
            Err(err) => {
                warn!(scene = next.name(), error = %err, "scene_enter_failed");
                next.dispose(&mut services!(self));
                Err(err)
            }
        }
    }

    pub fn push_input(&mut self, event: InputEvent) {
        self.input.push(event);
    }

    /// Applies queued input one event at a time, steps the sequencer, updates
    /// the active scene and returns what it signalled.
    pub fn frame(&mut self, dt: Duration) -> Result<FrameReport, SceneError> {
        let mut report = FrameReport::default();
        while let Some(event) = self.input.pop() {
            report.input_events += 1;
            let Some(scene) = self.active.as_mut() else {
                debug!(event = event.label(), "input_dropped_without_scene");
                continue;
            };
            match scene.handle_input(event, &mut services!(self)) {
                Ok(()) | Err(SceneError::StaleReference { .. }) => {}
                Err(err) => return Err(err),
            }
        }

        self.scroll.step(dt);
        if let Some(scene) = self.active.as_mut() {
            match scene.update(dt, &mut services!(self)) {
                Ok(()) | Err(SceneError::StaleReference { .. }) => {}
                Err(err) => return Err(err),
            }
            report.signals = scene.drain_signals();
        }
        Ok(report)
    }

    pub fn scroll_to(&mut self, target: f32) {
        self.scroll.scroll_to(target);
    }

    pub fn set_scroll_disabled(&mut self, disabled: bool) {
        self.scroll.set_disabled(disabled);
    }

    pub fn remove_persistent_audio(&mut self, name: &str) -> bool {
        let removed = self.audio.release_persistent(name);
        if removed {
            debug!(name, "persistent_audio_removed");
        }
        removed
    }

    pub fn shutdown(&mut self) {
        if let Some(mut scene) = self.active.take() {
            scene.dispose(&mut services!(self));
        }
        let released = self.audio.release_all();
        info!(released_audio = released, "stage_shutdown");
    }
}
