use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::app::{
    AudioDescriptor, ComponentNode, ComponentTree, DeclaredComponent, DeclaredSceneHooks,
    ObjectDesc, ObjectId, Observer, RenderableProvider, SceneController, SceneError, SceneGraph,
    ScrubbedTimeline, TimelineScrubber,
};
use crate::config::RuntimeConfig;

use super::types::{AudioDef, NodeDef, Parallax, SceneDef, TemplateDef};

/// Compiled templates keyed by id. Acts as the renderable provider for every
/// scene built from the same database.
#[derive(Debug, Default, Clone)]
pub struct ContentLibrary {
    templates: BTreeMap<String, TemplateDef>,
}

impl ContentLibrary {
    pub(crate) fn from_templates(templates: Vec<TemplateDef>) -> Self {
        Self {
            templates: templates
                .into_iter()
                .map(|template| (template.id.clone(), template))
                .collect(),
        }
    }

    pub fn template(&self, id: &str) -> Option<&TemplateDef> {
        self.templates.get(id)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl RenderableProvider for ContentLibrary {
    fn instantiate(&self, content: &str, graph: &mut SceneGraph) -> Option<ObjectId> {
        let template = self.templates.get(content)?;
        let root = graph.spawn(ObjectDesc {
            name: template.id.clone(),
            kind: template.kind,
            transform: template.transform,
            bounds_radius: template.bounds_radius,
            clip: template.clip.clone(),
        });
        for child in &template.children {
            let id = graph.spawn(ObjectDesc {
                name: child.name.clone(),
                kind: child.kind,
                transform: child.transform,
                bounds_radius: child.bounds_radius,
                clip: None,
            });
            graph.set_parent(id, Some(root));
        }
        Some(root)
    }
}

#[derive(Debug, Default, Clone)]
pub struct ContentDatabase {
    library: Arc<ContentLibrary>,
    scenes: Vec<SceneDef>,
}

impl ContentDatabase {
    pub(crate) fn new(templates: Vec<TemplateDef>, scenes: Vec<SceneDef>) -> Self {
        Self {
            library: Arc::new(ContentLibrary::from_templates(templates)),
            scenes,
        }
    }

    pub fn library(&self) -> &Arc<ContentLibrary> {
        &self.library
    }

    pub fn scene(&self, name: &str) -> Option<&SceneDef> {
        self.scenes.iter().find(|scene| scene.name == name)
    }

    pub fn scenes(&self) -> &[SceneDef] {
        &self.scenes
    }

    pub fn scene_names(&self) -> impl Iterator<Item = &str> {
        self.scenes.iter().map(|scene| scene.name.as_str())
    }

    pub fn build_scene(
        &self,
        name: &str,
        config: &RuntimeConfig,
    ) -> Option<Result<SceneController, SceneError>> {
        self.scene(name)
            .map(|scene| scene.build(Arc::clone(&self.library), config))
    }
}

impl SceneDef {
    /// Builds an unmounted controller. Node content is resolved through
    /// `library` when the controller is initialised.
    pub fn build(
        &self,
        library: Arc<ContentLibrary>,
        config: &RuntimeConfig,
    ) -> Result<SceneController, SceneError> {
        let mut tree = ComponentTree::new();
        for node in &self.nodes {
            tree.attach(build_node(node, config)?)?;
        }

        let mut observer = Observer::new(
            self.camera.position,
            self.camera.fov_y_degrees,
            self.camera.aspect,
        )
        .with_damping(config.observer_damping);
        if let Some(target) = self.camera.look_at {
            observer.look_at(target);
        }

        let mut hooks = DeclaredSceneHooks::new();
        match self.camera.parallax {
            Parallax::Off => {}
            Parallax::Configured => hooks = hooks.with_parallax(config.parallax_strength),
            Parallax::Strength(strength) => hooks = hooks.with_parallax(strength),
        }
        if let Some(target) = self.entry_scroll {
            hooks = hooks.with_entry_scroll(target);
        }
        if let Some(lock) = self.scroll_lock {
            hooks = hooks.with_scroll_lock(lock);
        }

        let mut controller = SceneController::new(self.name.clone(), tree, Box::new(library))
            .with_observer(observer)
            .with_hooks(Box::new(hooks));
        for audio in &self.audios {
            controller = controller.with_audio(audio.name.clone(), audio_descriptor(audio)?)?;
        }
        debug!(
            scene = %self.name,
            nodes = self.nodes.len(),
            audios = self.audios.len(),
            "scene_built"
        );
        Ok(controller)
    }
}

fn build_node(def: &NodeDef, config: &RuntimeConfig) -> Result<ComponentNode, SceneError> {
    let mut node = match def.timeline {
        Some(timeline) => {
            let scrubber = TimelineScrubber::new(
                timeline.span.unwrap_or(config.timeline_span),
                timeline.mode,
                timeline.drives_observer,
            )
            .map_err(|err| err.for_node(&def.name))?;
            ComponentNode::with_behavior(def.name.clone(), ScrubbedTimeline::new(scrubber))
        }
        None => {
            let mut behavior = DeclaredComponent::new();
            if let Some(signal) = &def.click_signal {
                behavior = behavior.with_click_signal(signal.clone());
            }
            if let Some(signal) = &def.hold_signal {
                behavior = behavior.with_hold_signal(signal.clone());
            }
            if let Some(payload) = &def.payload {
                behavior = behavior.with_payload(payload.clone());
            }
            if let Some(scale) = def.distance_scale {
                behavior = behavior.with_distance_scale(scale);
            }
            ComponentNode::with_behavior(def.name.clone(), behavior)
        }
    };

    node = node.with_capabilities(def.capabilities);
    if let Some(content) = &def.content {
        node = node.with_content(content.clone());
    }
    if let Some(transform) = def.transform {
        node = node.with_transform(transform);
    }
    if let Some((start, end)) = def.visibility {
        node = node.with_visibility(start, end)?;
    }
    if let Some(hold) = def.hold {
        node = node.with_hold_duration(hold)?;
    }
    for audio in &def.audios {
        node = node.with_audio(audio.name.clone(), audio_descriptor(audio)?)?;
    }
    for child in &def.children {
        node = node.with_child(build_node(child, config)?)?;
    }
    Ok(node)
}

fn audio_descriptor(def: &AudioDef) -> Result<AudioDescriptor, SceneError> {
    let mut descriptor = AudioDescriptor::new(def.source.clone())
        .looping(def.looping)
        .autoplay(def.autoplay)
        .persistent(def.persistent)
        .with_volume(def.volume)?;
    if let Some(distance) = def.ref_distance {
        descriptor = descriptor.with_ref_distance(distance)?;
    }
    Ok(descriptor)
}
