use std::f32::consts::FRAC_PI_2;

use glam::Vec3;
use tracing::debug;

use super::component::{Component, ComponentError, NodeContext};
use crate::config::{require_finite, ConfigurationError};

const SETTLE_STEP_SECONDS: f32 = 1.0 / 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrubMode {
    #[default]
    Loop,
    Clamp,
}

/// Maps scroll progress onto a clip's local time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineScrubber {
    span: f32,
    mode: ScrubMode,
    drives_observer: bool,
}

impl TimelineScrubber {
    pub fn new(span: f32, mode: ScrubMode, drives_observer: bool) -> Result<Self, ConfigurationError> {
        let span = require_finite("timeline_span", span)?;
        if span <= 0.0 {
            return Err(ConfigurationError::NonPositiveTimelineSpan { value: span });
        }
        Ok(Self {
            span,
            mode,
            drives_observer,
        })
    }

    pub fn span(&self) -> f32 {
        self.span
    }

    pub fn mode(&self) -> ScrubMode {
        self.mode
    }

    pub fn drives_observer(&self) -> bool {
        self.drives_observer
    }

    pub fn local_time(&self, progress: f32, clip_duration: f32) -> f32 {
        if clip_duration <= 0.0 {
            return 0.0;
        }
        let raw = progress * clip_duration / self.span;
        match self.mode {
            ScrubMode::Loop => raw.rem_euclid(clip_duration),
            ScrubMode::Clamp => raw.clamp(0.0, clip_duration),
        }
    }
}

/// Behaviour that scrubs its item's clip with scroll progress and can carry
/// the observer along with the clip's first child.
#[derive(Debug, Clone)]
pub struct ScrubbedTimeline {
    scrubber: TimelineScrubber,
    last_progress: Option<f32>,
}

impl ScrubbedTimeline {
    pub fn new(scrubber: TimelineScrubber) -> Self {
        Self {
            scrubber,
            last_progress: None,
        }
    }

    fn apply(&mut self, progress: f32, ctx: &mut NodeContext<'_>) -> Result<(), ComponentError> {
        let item = ctx.require_item()?;
        let Some(duration) = ctx.graph.clip_duration(item) else {
            debug!(node = ctx.node, "timeline_without_clip");
            self.last_progress = Some(progress);
            return Ok(());
        };
        let time = self.scrubber.local_time(progress, duration);
        ctx.graph.seek_animation(item, time);
        if self.scrubber.mode() == ScrubMode::Loop {
            ctx.graph.advance_animation(item, SETTLE_STEP_SECONDS);
        }
        self.last_progress = Some(progress);

        if !self.scrubber.drives_observer() {
            return Ok(());
        }
        let Some(anchor) = ctx.graph.children(item).first().copied() else {
            return Ok(());
        };
        let Some(position) = ctx.graph.world_position(anchor) else {
            return Ok(());
        };
        let rotation = ctx
            .graph
            .find_object(anchor)
            .map(|object| object.transform.rotation)
            .unwrap_or(Vec3::ZERO);
        ctx.observer.set_pose(position, observer_rotation(rotation));
        Ok(())
    }
}

/// Rig children are authored Z-up; the observer looks down -Z with Y up.
fn observer_rotation(rig: Vec3) -> Vec3 {
    Vec3::new(rig.x - FRAC_PI_2, -rig.z, rig.y)
}

impl Component for ScrubbedTimeline {
    fn after_init(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), ComponentError> {
        self.apply(ctx.scroll.current, ctx)
    }

    fn update(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), ComponentError> {
        let progress = ctx.scroll.current;
        if self.last_progress == Some(progress) {
            return Ok(());
        }
        self.apply(progress, ctx)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::app::component::{HookEnv, SceneSignal};
    use crate::app::rendering::{
        AnimationClip, Keyframe, ObjectDesc, Observer, SceneGraph, Transform,
    };
    use crate::app::scroll::ScrollSnapshot;
    use crate::config::DEFAULT_TIMELINE_SPAN;

    #[test]
    fn loop_mode_wraps_past_clip_end() {
        let scrubber = TimelineScrubber::new(DEFAULT_TIMELINE_SPAN, ScrubMode::Loop, false)
            .expect("scrubber");
        let t = scrubber.local_time(50.0, 12.0);
        assert!((t - 6.0).abs() < 1e-4);
    }

    #[test]
    fn clamp_mode_holds_last_frame() {
        let scrubber = TimelineScrubber::new(DEFAULT_TIMELINE_SPAN, ScrubMode::Clamp, false)
            .expect("scrubber");
        assert_eq!(scrubber.local_time(50.0, 12.0), 12.0);
        assert_eq!(scrubber.local_time(-10.0, 12.0), 0.0);
    }

    #[test]
    fn span_must_be_positive() {
        assert!(TimelineScrubber::new(0.0, ScrubMode::Loop, false).is_err());
        assert!(TimelineScrubber::new(f32::NAN, ScrubMode::Loop, false).is_err());
    }

    #[test]
    fn scrubbing_moves_rig_child_and_observer() {
        let clip = AnimationClip::new(
            "descent",
            10.0,
            vec![
                Keyframe {
                    time: 0.0,
                    transform: Transform::from_position(Vec3::new(0.0, 0.0, 20.0)),
                },
                Keyframe {
                    time: 10.0,
                    transform: Transform {
                        position: Vec3::new(0.0, 0.0, 0.0),
                        rotation: Vec3::new(FRAC_PI_2, 0.0, 0.0),
                        scale: Vec3::ONE,
                    },
                },
            ],
        );
        let mut graph = SceneGraph::default();
        let rig = graph.spawn(ObjectDesc {
            clip: Some(clip),
            ..ObjectDesc::group("rig")
        });
        let eye = graph.spawn(ObjectDesc::group("eye"));
        graph.set_parent(eye, Some(rig));
        let mut observer = Observer::default();
        let mut signals: Vec<SceneSignal> = Vec::new();

        let scrubber = TimelineScrubber::new(100.0, ScrubMode::Clamp, true).expect("scrubber");
        let mut timeline = ScrubbedTimeline::new(scrubber);
        let mut env = HookEnv {
            scene: "icefall",
            graph: &mut graph,
            observer: &mut observer,
            scroll: ScrollSnapshot {
                current: 100.0,
                target: 100.0,
                delta: 0.0,
            },
            dt: Duration::ZERO,
            signals: &mut signals,
        };
        let mut ctx = env.node_context("rig", Some(rig));
        timeline.update(&mut ctx).expect("update");
        drop(env);

        assert!(observer.position().length() < 1e-4);
        assert!(observer.rotation().x.abs() < 1e-4);
    }

    #[test]
    fn unchanged_progress_skips_reapplying() {
        let mut graph = SceneGraph::default();
        let rig = graph.spawn(ObjectDesc::group("rig"));
        let mut observer = Observer::default();
        let mut signals: Vec<SceneSignal> = Vec::new();
        let scrubber = TimelineScrubber::new(100.0, ScrubMode::Loop, false).expect("scrubber");
        let mut timeline = ScrubbedTimeline::new(scrubber);

        let mut env = HookEnv {
            scene: "icefall",
            graph: &mut graph,
            observer: &mut observer,
            scroll: ScrollSnapshot::default(),
            dt: Duration::ZERO,
            signals: &mut signals,
        };
        let mut ctx = env.node_context("rig", Some(rig));
        timeline.after_init(&mut ctx).expect("after init");
        assert_eq!(timeline.last_progress, Some(0.0));
        timeline.update(&mut ctx).expect("update");
        assert_eq!(timeline.last_progress, Some(0.0));
    }
}
