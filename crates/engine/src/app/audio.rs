use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use glam::Vec3;
use thiserror::Error;
use tracing::{debug, warn};

use super::rendering::{ObjectId, SceneGraph};
use crate::config::{require_finite, ConfigurationError};

#[derive(Debug, Clone, PartialEq)]
pub struct AudioDescriptor {
    source: String,
    looping: bool,
    autoplay: bool,
    persist: bool,
    volume: f32,
    ref_distance: Option<f32>,
}

impl AudioDescriptor {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            looping: false,
            autoplay: false,
            persist: false,
            volume: 1.0,
            ref_distance: None,
        }
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn autoplay(mut self, autoplay: bool) -> Self {
        self.autoplay = autoplay;
        self
    }

    pub fn persistent(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Result<Self, ConfigurationError> {
        let volume = require_finite("audio_volume", volume)?;
        if !(0.0..=1.0).contains(&volume) {
            return Err(ConfigurationError::VolumeOutOfRange { value: volume });
        }
        self.volume = volume;
        Ok(self)
    }

    pub fn with_ref_distance(mut self, distance: f32) -> Result<Self, ConfigurationError> {
        let distance = require_finite("audio_ref_distance", distance)?;
        if distance <= 0.0 {
            return Err(ConfigurationError::NonPositiveRefDistance { value: distance });
        }
        self.ref_distance = Some(distance);
        Ok(self)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn is_autoplay(&self) -> bool {
        self.autoplay
    }

    pub fn is_persistent(&self) -> bool {
        self.persist
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn ref_distance(&self) -> Option<f32> {
        self.ref_distance
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AudioOwner {
    Scene(String),
    Node { scene: String, node: String },
}

impl AudioOwner {
    pub fn scene(&self) -> &str {
        match self {
            Self::Scene(scene) | Self::Node { scene, .. } => scene,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoundOptions {
    pub spatial: bool,
    pub looping: bool,
    pub volume: f32,
    pub ref_distance: Option<f32>,
}

pub trait SoundHandle {
    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn set_volume(&mut self, volume: f32);
    fn set_loop(&mut self, looping: bool);
    fn set_position(&mut self, _position: Vec3) {}
    fn is_playing(&self) -> bool;
}

pub trait AudioBackend {
    fn create_handle(
        &mut self,
        source: &str,
        options: SoundOptions,
    ) -> Result<Box<dyn SoundHandle>, AudioError>;
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio source '{0}' is not available")]
    UnknownSource(String),
    #[error("audio backend failure: {0}")]
    Backend(String),
}

struct LiveSound {
    name: String,
    owner: AudioOwner,
    persist: bool,
    anchor: Option<ObjectId>,
    handle: Box<dyn SoundHandle>,
}

impl LiveSound {
    fn release(mut self) {
        self.handle.stop();
        debug!(name = %self.name, owner = ?self.owner, "audio_released");
    }
}

/// Owns every live sound handle and ties each one to a scene or node lifetime.
pub struct AudioLifecycleManager {
    backend: Box<dyn AudioBackend>,
    live: Vec<LiveSound>,
}

impl fmt::Debug for AudioLifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioLifecycleManager")
            .field("live", &self.live_names())
            .finish_non_exhaustive()
    }
}

impl AudioLifecycleManager {
    pub fn new(backend: Box<dyn AudioBackend>) -> Self {
        Self {
            backend,
            live: Vec::new(),
        }
    }

    /// Creates and registers a handle. Returns `Ok(false)` when `name` is
    /// already live; the existing handle is left untouched.
    pub fn attach(
        &mut self,
        name: &str,
        descriptor: &AudioDescriptor,
        owner: AudioOwner,
        anchor: Option<ObjectId>,
    ) -> Result<bool, AudioError> {
        if self.is_live(name) {
            return Ok(false);
        }
        let options = SoundOptions {
            spatial: anchor.is_some(),
            looping: descriptor.is_looping(),
            volume: descriptor.volume(),
            ref_distance: descriptor.ref_distance(),
        };
        let mut handle = self.backend.create_handle(descriptor.source(), options)?;
        handle.set_loop(descriptor.is_looping());
        handle.set_volume(descriptor.volume());
        if descriptor.is_autoplay() {
            handle.play();
        }
        debug!(name, source = descriptor.source(), owner = ?owner, "audio_attached");
        self.live.push(LiveSound {
            name: name.to_string(),
            owner,
            persist: descriptor.is_persistent(),
            anchor,
            handle,
        });
        Ok(true)
    }

    /// Stops and releases `name`. Missing names are ignored.
    pub fn detach(&mut self, name: &str) -> bool {
        let Some(index) = self.live.iter().position(|sound| sound.name == name) else {
            return false;
        };
        self.live.remove(index).release();
        true
    }

    pub fn release_node(&mut self, scene: &str, node: &str) -> usize {
        self.release_where(|sound| {
            matches!(&sound.owner, AudioOwner::Node { scene: s, node: n } if s == scene && n == node)
        })
    }

    /// Releases every non-persistent handle owned by `scene` or its nodes.
    pub fn release_scene(&mut self, scene: &str) -> usize {
        self.release_where(|sound| !sound.persist && sound.owner.scene() == scene)
    }

    pub fn release_persistent(&mut self, name: &str) -> bool {
        let Some(index) = self
            .live
            .iter()
            .position(|sound| sound.name == name && sound.persist)
        else {
            return false;
        };
        self.live.remove(index).release();
        true
    }

    pub fn release_all(&mut self) -> usize {
        self.release_where(|_| true)
    }

    pub fn play(&mut self, name: &str) -> bool {
        self.with_handle(name, |handle| handle.play())
    }

    pub fn pause(&mut self, name: &str) -> bool {
        self.with_handle(name, |handle| handle.pause())
    }

    pub fn is_live(&self, name: &str) -> bool {
        self.live.iter().any(|sound| sound.name == name)
    }

    pub fn is_playing(&self, name: &str) -> bool {
        self.live
            .iter()
            .any(|sound| sound.name == name && sound.handle.is_playing())
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn live_names(&self) -> Vec<&str> {
        self.live.iter().map(|sound| sound.name.as_str()).collect()
    }

    /// Pushes anchor world positions to spatial handles. Sounds whose anchor
    /// left the graph keep their last position.
    pub fn sync_spatial(&mut self, graph: &SceneGraph) {
        for sound in &mut self.live {
            let Some(anchor) = sound.anchor else {
                continue;
            };
            match graph.world_position(anchor) {
                Some(position) => sound.handle.set_position(position),
                None => warn!(name = %sound.name, "audio_anchor_missing"),
            }
        }
    }

    fn with_handle(&mut self, name: &str, apply: impl FnOnce(&mut dyn SoundHandle)) -> bool {
        match self.live.iter_mut().find(|sound| sound.name == name) {
            Some(sound) => {
                apply(sound.handle.as_mut());
                true
            }
            None => false,
        }
    }

    fn release_where(&mut self, predicate: impl Fn(&LiveSound) -> bool) -> usize {
        let (released, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.live).into_iter().partition(predicate);
        self.live = kept;
        let count = released.len();
        for sound in released {
            sound.release();
        }
        count
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AudioEventKind {
    Created { spatial: bool },
    Played,
    Paused,
    Stopped,
    Moved(Vec3),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioEvent {
    pub source: String,
    pub kind: AudioEventKind,
}

/// Shared record of every call a headless handle receives.
#[derive(Debug, Clone, Default)]
pub struct AudioLedger {
    events: Arc<Mutex<Vec<AudioEvent>>>,
}

impl AudioLedger {
    fn record(&self, source: &str, kind: AudioEventKind) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(AudioEvent {
                source: source.to_string(),
                kind,
            });
    }

    pub fn events(&self) -> Vec<AudioEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, source: &str, kind: &AudioEventKind) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|event| event.source == source && event.kind == *kind)
            .count()
    }
}

/// Backend that produces silent handles and records what happens to them.
/// With a source allow-list, unknown sources fail to load.
#[derive(Debug, Clone, Default)]
pub struct HeadlessAudioBackend {
    known_sources: Option<HashSet<String>>,
    ledger: AudioLedger,
}

impl HeadlessAudioBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_known_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_sources = Some(sources.into_iter().map(Into::into).collect());
        self
    }

    pub fn ledger(&self) -> AudioLedger {
        self.ledger.clone()
    }
}

impl AudioBackend for HeadlessAudioBackend {
    fn create_handle(
        &mut self,
        source: &str,
        options: SoundOptions,
    ) -> Result<Box<dyn SoundHandle>, AudioError> {
        if let Some(known) = &self.known_sources {
            if !known.contains(source) {
                return Err(AudioError::UnknownSource(source.to_string()));
            }
        }
        self.ledger.record(
            source,
            AudioEventKind::Created {
                spatial: options.spatial,
            },
        );
        Ok(Box::new(HeadlessSound {
            source: source.to_string(),
            playing: false,
            looping: options.looping,
            volume: options.volume,
            ledger: self.ledger.clone(),
        }))
    }
}

#[derive(Debug)]
struct HeadlessSound {
    source: String,
    playing: bool,
    looping: bool,
    volume: f32,
    ledger: AudioLedger,
}

impl SoundHandle for HeadlessSound {
    fn play(&mut self) {
        self.playing = true;
        self.ledger.record(&self.source, AudioEventKind::Played);
    }

    fn pause(&mut self) {
        self.playing = false;
        self.ledger.record(&self.source, AudioEventKind::Paused);
    }

    fn stop(&mut self) {
        self.playing = false;
        self.ledger.record(&self.source, AudioEventKind::Stopped);
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    fn set_loop(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn set_position(&mut self, position: Vec3) {
        self.ledger.record(&self.source, AudioEventKind::Moved(position));
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::rendering::{ObjectDesc, Transform};

    fn manager() -> (AudioLifecycleManager, AudioLedger) {
        let backend = HeadlessAudioBackend::new();
        let ledger = backend.ledger();
        (AudioLifecycleManager::new(Box::new(backend)), ledger)
    }

    fn scene_owner() -> AudioOwner {
        AudioOwner::Scene("basecamp".to_string())
    }

    #[test]
    fn descriptor_validation_rejects_bad_values() {
        assert!(AudioDescriptor::new("wind.ogg").with_volume(1.5).is_err());
        assert!(AudioDescriptor::new("wind.ogg").with_volume(f32::NAN).is_err());
        assert!(AudioDescriptor::new("wind.ogg")
            .with_ref_distance(0.0)
            .is_err());
        let descriptor = AudioDescriptor::new("wind.ogg")
            .with_volume(0.4)
            .expect("volume")
            .with_ref_distance(5.0)
            .expect("distance");
        assert_eq!(descriptor.volume(), 0.4);
        assert_eq!(descriptor.ref_distance(), Some(5.0));
    }

    #[test]
    fn attach_and_detach_twice_leaves_nothing_live() {
        let (mut audio, ledger) = manager();
        let descriptor = AudioDescriptor::new("wind.ogg").autoplay(true);

        assert!(audio
            .attach("wind", &descriptor, scene_owner(), None)
            .expect("attach"));
        assert!(!audio
            .attach("wind", &descriptor, scene_owner(), None)
            .expect("attach again"));
        assert!(audio.detach("wind"));
        assert!(!audio.detach("wind"));

        assert_eq!(audio.live_count(), 0);
        assert_eq!(
            ledger.count("wind.ogg", &AudioEventKind::Created { spatial: false }),
            1
        );
        assert_eq!(ledger.count("wind.ogg", &AudioEventKind::Stopped), 1);
    }

    #[test]
    fn scene_release_keeps_persistent_handles() {
        let (mut audio, ledger) = manager();
        let persistent = AudioDescriptor::new("theme.ogg")
            .persistent(true)
            .autoplay(true);
        let transient = AudioDescriptor::new("wind.ogg").autoplay(true);
        audio
            .attach("theme", &persistent, scene_owner(), None)
            .expect("theme");
        audio
            .attach("wind", &transient, scene_owner(), None)
            .expect("wind");

        assert_eq!(audio.release_scene("basecamp"), 1);
        assert_eq!(audio.live_names(), vec!["theme"]);
        assert!(audio.is_playing("theme"));
        assert_eq!(ledger.count("wind.ogg", &AudioEventKind::Stopped), 1);
        assert_eq!(ledger.count("theme.ogg", &AudioEventKind::Stopped), 0);

        assert!(audio.release_persistent("theme"));
        assert_eq!(audio.live_count(), 0);
    }

    #[test]
    fn release_node_includes_persistent_node_audio() {
        let (mut audio, _ledger) = manager();
        let owner = AudioOwner::Node {
            scene: "basecamp".to_string(),
            node: "tent".to_string(),
        };
        let descriptor = AudioDescriptor::new("radio.ogg").persistent(true);
        audio
            .attach("radio", &descriptor, owner, Some(ObjectId(1)))
            .expect("radio");
        audio
            .attach("wind", &AudioDescriptor::new("wind.ogg"), scene_owner(), None)
            .expect("wind");

        assert_eq!(audio.release_node("basecamp", "tent"), 1);
        assert_eq!(audio.live_names(), vec!["wind"]);
    }

    #[test]
    fn unknown_source_fails_without_registering() {
        let backend = HeadlessAudioBackend::new().with_known_sources(["wind.ogg"]);
        let mut audio = AudioLifecycleManager::new(Box::new(backend));
        let result = audio.attach(
            "missing",
            &AudioDescriptor::new("missing.ogg"),
            scene_owner(),
            None,
        );
        assert!(matches!(result, Err(AudioError::UnknownSource(_))));
        assert!(!audio.is_live("missing"));
    }

    #[test]
    fn spatial_sounds_follow_their_anchor() {
        let (mut audio, ledger) = manager();
        let mut graph = SceneGraph::default();
        let anchor = graph.spawn(
            ObjectDesc::mesh("tent", 1.0)
                .with_transform(Transform::from_position(Vec3::new(1.0, 2.0, 3.0))),
        );
        let owner = AudioOwner::Node {
            scene: "basecamp".to_string(),
            node: "tent".to_string(),
        };
        audio
            .attach(
                "radio",
                &AudioDescriptor::new("radio.ogg"),
                owner,
                Some(anchor),
            )
            .expect("radio");

        audio.sync_spatial(&graph);
        assert_eq!(
            ledger.count(
                "radio.ogg",
                &AudioEventKind::Moved(Vec3::new(1.0, 2.0, 3.0))
            ),
            1
        );
        assert_eq!(
            ledger.count("radio.ogg", &AudioEventKind::Created { spatial: true }),
            1
        );
    }

    #[test]
    fn play_and_pause_reach_live_handles_only() {
        let (mut audio, _ledger) = manager();
        audio
            .attach("wind", &AudioDescriptor::new("wind.ogg"), scene_owner(), None)
            .expect("wind");
        assert!(!audio.is_playing("wind"));
        assert!(audio.play("wind"));
        assert!(audio.is_playing("wind"));
        assert!(audio.pause("wind"));
        assert!(!audio.is_playing("wind"));
        assert!(!audio.play("ghost"));
    }
}
