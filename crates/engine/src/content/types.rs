use std::time::Duration;

use glam::Vec3;

use crate::app::{
    AnimationClip, Capabilities, DistanceScale, ObjectKind, ScrubMode, Transform,
};

use super::compiler::SourceLocation;

/// Child object baked into a template; instantiated under the template root.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateChildDef {
    pub name: String,
    pub kind: ObjectKind,
    pub bounds_radius: Option<f32>,
    pub transform: Transform,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDef {
    pub id: String,
    pub kind: ObjectKind,
    pub bounds_radius: Option<f32>,
    pub transform: Transform,
    pub children: Vec<TemplateChildDef>,
    pub clip: Option<AnimationClip>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioDef {
    pub name: String,
    pub source: String,
    pub looping: bool,
    pub autoplay: bool,
    pub persistent: bool,
    pub volume: f32,
    pub ref_distance: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Parallax {
    Off,
    /// Use the runtime's configured strength.
    Configured,
    Strength(f32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraDef {
    pub position: Vec3,
    pub look_at: Option<Vec3>,
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub parallax: Parallax,
}

impl Default for CameraDef {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            look_at: None,
            fov_y_degrees: 45.0,
            aspect: 16.0 / 9.0,
            parallax: Parallax::Off,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineDef {
    /// Falls back to the runtime's configured span.
    pub span: Option<f32>,
    pub mode: ScrubMode,
    pub drives_observer: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeDef {
    pub name: String,
    pub content: Option<String>,
    pub transform: Option<Transform>,
    pub visibility: Option<(f32, f32)>,
    pub hold: Option<Duration>,
    pub capabilities: Capabilities,
    pub click_signal: Option<String>,
    pub hold_signal: Option<String>,
    pub payload: Option<String>,
    pub distance_scale: Option<DistanceScale>,
    pub timeline: Option<TimelineDef>,
    pub audios: Vec<AudioDef>,
    pub children: Vec<NodeDef>,
    pub location: Option<SourceLocation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneDef {
    pub name: String,
    pub camera: CameraDef,
    pub entry_scroll: Option<f32>,
    pub scroll_lock: Option<Duration>,
    pub audios: Vec<AudioDef>,
    pub nodes: Vec<NodeDef>,
}
