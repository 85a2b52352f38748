use std::fmt;
use std::time::Duration;

use glam::Vec2;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::audio::{AudioDescriptor, AudioLifecycleManager, AudioOwner};
use super::component::{ComponentError, HookEnv, SceneSignal, SignalKind};
use super::gesture::{HoldEvent, HoldGesture, HoldPhase};
use super::input::InputEvent;
use super::metrics::{HoldProgress, HoldProgressHandle};
use super::pick::PickIndex;
use super::rendering::{
    BoundsRayCaster, ObjectDesc, ObjectId, Observer, Ray, RayIntersector, RenderableProvider,
    SceneGraph,
};
use super::scroll::{ScrollSequencer, ScrollSnapshot};
use super::tree::{
    Capabilities, ComponentNode, ComponentTree, FlatEntry, FlatTree, Gesture, LifecycleHook,
    NodePhase, TreeError,
};
use crate::config::{ConfigurationError, RuntimeConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenePhase {
    Constructing,
    Mounted,
    Disposing,
    Disposed,
}

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("scene '{scene}' was not mounted: {source}")]
    MountAborted {
        scene: String,
        #[source]
        source: TreeError,
    },
    #[error("scene '{scene}' cannot {operation} while {phase:?}")]
    InvalidPhase {
        scene: String,
        operation: &'static str,
        phase: ScenePhase,
    },
    #[error("scene '{scene}' ignored {operation} after disposal began")]
    StaleReference {
        scene: String,
        operation: &'static str,
    },
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("node '{node}' could not resolve renderable '{content}'")]
    MissingRenderable { node: String, content: String },
    #[error("node '{node}' failed during {hook:?}: {source}")]
    Component {
        node: String,
        hook: LifecycleHook,
        #[source]
        source: ComponentError,
    },
}

/// Process-wide state a scene borrows for the duration of one call.
pub struct RuntimeServices<'a> {
    pub config: &'a RuntimeConfig,
    pub scroll: &'a mut ScrollSequencer,
    pub audio: &'a mut AudioLifecycleManager,
    pub hold_progress: &'a HoldProgressHandle,
}

pub struct SceneContext<'a> {
    pub scene: &'a str,
    pub graph: &'a mut SceneGraph,
    pub observer: &'a mut Observer,
    pub scroll: &'a mut ScrollSequencer,
    pub config: &'a RuntimeConfig,
    pub dt: Duration,
    signals: &'a mut Vec<SceneSignal>,
}

impl SceneContext<'_> {
    pub fn emit(&mut self, name: impl Into<String>, payload: Option<String>) {
        self.signals.push(SceneSignal {
            scene: self.scene.to_string(),
            node: None,
            kind: SignalKind::Custom {
                name: name.into(),
                payload,
            },
        });
    }
}

/// Scene-wide behaviour that is not tied to a single node.
pub trait SceneHooks {
    fn on_init(&mut self, _ctx: &mut SceneContext<'_>) {}
    fn on_update(&mut self, _ctx: &mut SceneContext<'_>) {}
    fn on_pointer_move(&mut self, _cursor_ndc: Vec2, _ctx: &mut SceneContext<'_>) {}
    fn on_scroll(&mut self, _delta: f32, _ctx: &mut SceneContext<'_>) {}
    fn on_dispose(&mut self, _ctx: &mut SceneContext<'_>) {}
}

/// Data-driven scene behaviour: camera parallax and an entry scroll that can
/// lock the wheel for a while.
#[derive(Debug, Clone, Default)]
pub struct DeclaredSceneHooks {
    parallax_strength: Option<f32>,
    entry_scroll: Option<f32>,
    scroll_lock: Option<Duration>,
    lock_elapsed: Duration,
}

impl DeclaredSceneHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parallax(mut self, strength: f32) -> Self {
        self.parallax_strength = Some(strength);
        self
    }

    pub fn with_entry_scroll(mut self, target: f32) -> Self {
        self.entry_scroll = Some(target);
        self
    }

    pub fn with_scroll_lock(mut self, duration: Duration) -> Self {
        self.scroll_lock = Some(duration);
        self
    }
}

impl SceneHooks for DeclaredSceneHooks {
    fn on_init(&mut self, ctx: &mut SceneContext<'_>) {
        if let Some(target) = self.entry_scroll {
            ctx.scroll.scroll_to(target);
        }
        if self.scroll_lock.is_some() {
            self.lock_elapsed = Duration::ZERO;
            ctx.scroll.set_disabled(true);
        }
    }

    fn on_update(&mut self, ctx: &mut SceneContext<'_>) {
        let Some(lock) = self.scroll_lock else {
            return;
        };
        if !ctx.scroll.is_disabled() {
            return;
        }
        self.lock_elapsed += ctx.dt;
        if self.lock_elapsed >= lock {
            ctx.scroll.set_disabled(false);
            debug!(scene = ctx.scene, "scroll_unlocked");
        }
    }

    fn on_pointer_move(&mut self, cursor_ndc: Vec2, ctx: &mut SceneContext<'_>) {
        if let Some(strength) = self.parallax_strength {
            ctx.observer.aim_parallax(cursor_ndc, strength);
        }
    }

    fn on_dispose(&mut self, ctx: &mut SceneContext<'_>) {
        if self.scroll_lock.is_some() {
            ctx.scroll.set_disabled(false);
        }
    }
}

/// Everything node and scene hooks may touch.
struct Surface {
    name: String,
    graph: SceneGraph,
    observer: Observer,
    signals: Vec<SceneSignal>,
}

impl Surface {
    fn hook_env(&mut self, scroll: ScrollSnapshot, dt: Duration) -> HookEnv<'_> {
        HookEnv {
            scene: &self.name,
            graph: &mut self.graph,
            observer: &mut self.observer,
            scroll,
            dt,
            signals: &mut self.signals,
        }
    }

    fn scene_context<'s>(
        &'s mut self,
        scroll: &'s mut ScrollSequencer,
        config: &'s RuntimeConfig,
        dt: Duration,
    ) -> SceneContext<'s> {
        SceneContext {
            scene: &self.name,
            graph: &mut self.graph,
            observer: &mut self.observer,
            scroll,
            config,
            dt,
            signals: &mut self.signals,
        }
    }
}

fn log_hook_failures(scene: &str, hook: LifecycleHook, failures: Vec<(String, ComponentError)>) {
    for (node, source) in failures {
        let error = NodeError::Component { node, hook, source };
        warn!(scene, error = %error, "node_hook_failed");
    }
}

/// Owns one scene's component tree, renderables and gesture state from mount
/// to disposal.
pub struct SceneController {
    surface: Surface,
    phase: ScenePhase,
    tree: ComponentTree,
    flat: FlatTree,
    root: Option<ObjectId>,
    hooks: Box<dyn SceneHooks>,
    provider: Box<dyn RenderableProvider>,
    intersector: Box<dyn RayIntersector>,
    pick_index: PickIndex,
    hold: HoldGesture,
    hovered: Option<String>,
    audios: Vec<(String, AudioDescriptor)>,
    subscribed: bool,
}

impl fmt::Debug for SceneController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneController")
            .field("name", &self.surface.name)
            .field("phase", &self.phase)
            .field("nodes", &self.flat.len())
            .field("hovered", &self.hovered)
            .field("hold", self.hold.phase())
            .finish_non_exhaustive()
    }
}

impl SceneController {
    pub fn new(
        name: impl Into<String>,
        tree: ComponentTree,
        provider: Box<dyn RenderableProvider>,
    ) -> Self {
        Self {
            surface: Surface {
                name: name.into(),
                graph: SceneGraph::default(),
                observer: Observer::default(),
                signals: Vec::new(),
            },
            phase: ScenePhase::Constructing,
            tree,
            flat: FlatTree::default(),
            root: None,
            hooks: Box::new(DeclaredSceneHooks::default()),
            provider,
            intersector: Box::new(BoundsRayCaster),
            pick_index: PickIndex::new(),
            hold: HoldGesture::new(crate::config::DEFAULT_HOLD_RELEASE_DURATION),
            hovered: None,
            audios: Vec::new(),
            subscribed: false,
        }
    }

    pub fn with_hooks(mut self, hooks: Box<dyn SceneHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_intersector(mut self, intersector: Box<dyn RayIntersector>) -> Self {
        self.intersector = intersector;
        self
    }

    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.surface.observer = observer;
        self
    }

    pub fn with_audio(
        mut self,
        name: impl Into<String>,
        descriptor: AudioDescriptor,
    ) -> Result<Self, TreeError> {
        let name = name.into();
        if self.audios.iter().any(|(existing, _)| *existing == name) {
            return Err(TreeError::DuplicateAudio {
                node: self.surface.name.clone(),
                name,
            });
        }
        self.audios.push((name, descriptor));
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.surface.name
    }

    pub fn phase(&self) -> ScenePhase {
        self.phase
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.surface.graph
    }

    pub fn observer(&self) -> &Observer {
        &self.surface.observer
    }

    pub fn tree(&self) -> &ComponentTree {
        &self.tree
    }

    /// Structural edits are only allowed before `init`.
    pub fn tree_mut(&mut self) -> Option<&mut ComponentTree> {
        (self.phase == ScenePhase::Constructing).then_some(&mut self.tree)
    }

    pub fn flat(&self) -> &FlatTree {
        &self.flat
    }

    pub fn hovered(&self) -> Option<&str> {
        self.hovered.as_deref()
    }

    pub fn hold_phase(&self) -> &HoldPhase {
        self.hold.phase()
    }

    pub fn hold_progress(&self) -> f32 {
        self.hold.progress()
    }

    pub fn node(&self, name: &str) -> Option<&ComponentNode> {
        let entry = self.flat.get(name)?;
        self.tree.node(&entry.path)
    }

    /// Effective visibility of the node's renderable, `None` when it has none.
    pub fn is_node_visible(&self, name: &str) -> Option<bool> {
        let item = self.node(name)?.item()?;
        Some(self.surface.graph.is_effectively_visible(item))
    }

    pub fn drain_signals(&mut self) -> Vec<SceneSignal> {
        std::mem::take(&mut self.surface.signals)
    }

    pub fn init(&mut self, services: &mut RuntimeServices<'_>) -> Result<(), SceneError> {
        if self.phase != ScenePhase::Constructing {
            return Err(SceneError::InvalidPhase {
                scene: self.surface.name.clone(),
                operation: "init",
                phase: self.phase,
            });
        }
        self.flat = self
            .tree
            .flatten()
            .map_err(|source| SceneError::MountAborted {
                scene: self.surface.name.clone(),
                source,
            })?;
        self.hold = HoldGesture::new(services.config.hold_release_duration);
        let root = self
            .surface
            .graph
            .spawn(ObjectDesc::group(self.surface.name.clone()));
        self.root = Some(root);

        let scroll = services.scroll.snapshot();
        let mut degraded = 0usize;
        for entry in self.flat.entries() {
            let Some(node) = self.tree.node_mut(&entry.path) else {
                continue;
            };
            let item = node
                .content()
                .and_then(|content| self.provider.instantiate(content, &mut self.surface.graph));
            if !node.mount(&mut self.surface.graph, item) {
                degraded += 1;
                let error = NodeError::MissingRenderable {
                    node: entry.name.clone(),
                    content: node.content().unwrap_or_default().to_string(),
                };
                warn!(scene = %self.surface.name, error = %error, "node_degraded");
                continue;
            }
            if let (Some(change), Some(item)) = (node.observe_visibility(scroll.current), node.item())
            {
                self.surface.graph.set_visible(item, change.is_visible());
            }
            let result = {
                let mut env = self.surface.hook_env(scroll, Duration::ZERO);
                node.run_hook(LifecycleHook::Init, &mut env)
            };
            if let Err(source) = result {
                degraded += 1;
                let error = NodeError::Component {
                    node: entry.name.clone(),
                    hook: LifecycleHook::Init,
                    source,
                };
                warn!(scene = %self.surface.name, error = %error, "node_degraded");
                node.degrade(&mut self.surface.graph);
            }
        }

        let failures = {
            let mut env = self.surface.hook_env(scroll, Duration::ZERO);
            self.tree
                .for_each(&self.flat, LifecycleHook::AfterInit, &mut env)
        };
        log_hook_failures(&self.surface.name, LifecycleHook::AfterInit, failures);

        self.tree.compose_renderable(&mut self.surface.graph, root);
        self.attach_audio(services.audio);
        {
            let mut ctx =
                self.surface
                    .scene_context(services.scroll, services.config, Duration::ZERO);
            self.hooks.on_init(&mut ctx);
        }

        self.pick_index.invalidate();
        self.subscribed = true;
        self.phase = ScenePhase::Mounted;
        info!(
            scene = %self.surface.name,
            node_count = self.flat.len(),
            degraded,
            object_count = self.surface.graph.object_count(),
            "scene_mounted"
        );
        Ok(())
    }

    fn attach_audio(&mut self, audio: &mut AudioLifecycleManager) {
        let scene = &self.surface.name;
        for entry in self.flat.entries() {
            let Some(node) = self.tree.node(&entry.path) else {
                continue;
            };
            if node.phase() != NodePhase::Mounted {
                continue;
            }
            for (name, descriptor) in node.audios() {
                let owner = AudioOwner::Node {
                    scene: scene.clone(),
                    node: entry.name.clone(),
                };
                if let Err(error) = audio.attach(name, descriptor, owner, node.item()) {
                    warn!(scene = %scene, node = %entry.name, audio = %name, error = %error, "audio_attach_failed");
                }
            }
        }
        for (name, descriptor) in &self.audios {
            let owner = AudioOwner::Scene(scene.clone());
            if let Err(error) = audio.attach(name, descriptor, owner, None) {
                warn!(scene = %scene, audio = %name, error = %error, "audio_attach_failed");
            }
        }
    }

    pub fn update(
        &mut self,
        dt: Duration,
        services: &mut RuntimeServices<'_>,
    ) -> Result<(), SceneError> {
        self.ensure_mounted("update")?;
        let scroll = services.scroll.snapshot();

        let mut events = Vec::new();
        self.hold.advance(dt, &mut events);
        self.apply_hold_events(events, scroll, services.hold_progress);

        for entry in self.flat.entries() {
            let Some(node) = self.tree.node_mut(&entry.path) else {
                continue;
            };
            if node.phase() != NodePhase::Mounted {
                continue;
            }
            let Some(change) = node.observe_visibility(scroll.current) else {
                continue;
            };
            let visible = change.is_visible();
            if let Some(item) = node.item() {
                self.surface.graph.set_visible(item, visible);
            }
            debug!(scene = %self.surface.name, node = %entry.name, visible, "node_visibility_changed");
            let mut env = self.surface.hook_env(scroll, dt);
            node.notify_visibility(visible, &mut env);
        }

        let failures = {
            let mut env = self.surface.hook_env(scroll, dt);
            self.tree.for_each(&self.flat, LifecycleHook::Update, &mut env)
        };
        log_hook_failures(&self.surface.name, LifecycleHook::Update, failures);

        {
            let mut ctx = self
                .surface
                .scene_context(services.scroll, services.config, dt);
            self.hooks.on_update(&mut ctx);
        }
        self.surface.observer.update(dt);
        services.audio.sync_spatial(&self.surface.graph);
        Ok(())
    }

    pub fn handle_input(
        &mut self,
        event: InputEvent,
        services: &mut RuntimeServices<'_>,
    ) -> Result<(), SceneError> {
        self.ensure_mounted(event.label())?;
        let scroll = services.scroll.snapshot();

        match event {
            InputEvent::PointerDown { x, y } => {
                let ray = self.surface.observer.ray_through(Vec2::new(x, y));
                if let Some(name) = self.pick(&ray, Capabilities::CLICK) {
                    debug!(scene = %self.surface.name, node = %name, "click_dispatched");
                    self.dispatch(&name, Gesture::Click, scroll);
                }
                if let Some(name) = self.pick(&ray, Capabilities::HOLD) {
                    let duration = self.hold_duration_for(&name, services.config);
                    if self.hold.press(&name, duration) {
                        debug!(
                            scene = %self.surface.name,
                            node = %name,
                            duration_ms = duration.as_millis() as u64,
                            "hold_started"
                        );
                        services.hold_progress.publish(HoldProgress {
                            value: self.hold.progress(),
                            pressing: true,
                        });
                    }
                }
            }
            InputEvent::PointerUp => self.cancel_hold(services.hold_progress),
            InputEvent::PointerMove { x, y } => {
                let cursor = Vec2::new(x, y);
                let ray = self.surface.observer.ray_through(cursor);
                let hovered = self.pick(&ray, Capabilities::HOVER);
                if hovered != self.hovered {
                    if let Some(previous) = self.hovered.take() {
                        self.dispatch(&previous, Gesture::HoverLeave, scroll);
                    }
                    if let Some(next) = &hovered {
                        self.dispatch(next, Gesture::HoverEnter, scroll);
                    }
                    self.hovered = hovered;
                }

                if let Some(held) = self.hold.held_node().map(str::to_string) {
                    let target = self.pick(&ray, Capabilities::HOLD);
                    if target.as_deref() != Some(held.as_str()) {
                        self.cancel_hold(services.hold_progress);
                    }
                }

                let mut ctx =
                    self.surface
                        .scene_context(services.scroll, services.config, Duration::ZERO);
                self.hooks.on_pointer_move(cursor, &mut ctx);
            }
            InputEvent::Scroll { delta } => {
                services.scroll.apply_delta(delta);
                {
                    let mut ctx =
                        self.surface
                            .scene_context(services.scroll, services.config, Duration::ZERO);
                    self.hooks.on_scroll(delta, &mut ctx);
                }
                let scroll = services.scroll.snapshot();
                for entry in self.flat.entries() {
                    let Some(node) = self.tree.node_mut(&entry.path) else {
                        continue;
                    };
                    let mut env = self.surface.hook_env(scroll, Duration::ZERO);
                    node.notify_scroll(delta, &mut env);
                }
            }
        }
        Ok(())
    }

    /// Disposes and removes the named node and its subtree from a mounted scene.
    pub fn remove_node(
        &mut self,
        name: &str,
        services: &mut RuntimeServices<'_>,
    ) -> Result<Option<ComponentNode>, SceneError> {
        self.ensure_mounted("remove_node")?;
        let Some(target) = self.flat.get(name).cloned() else {
            return Ok(None);
        };
        let doomed: Vec<FlatEntry> = self
            .flat
            .entries()
            .iter()
            .filter(|entry| entry.path.starts_with(&target.path))
            .cloned()
            .collect();
        let is_doomed = |candidate: &str| doomed.iter().any(|entry| entry.name == candidate);

        if self.hovered.as_deref().is_some_and(is_doomed) {
            self.hovered = None;
        }
        if self.hold.held_node().is_some_and(is_doomed) {
            self.hold.reset();
            services.hold_progress.publish(HoldProgress::default());
        }

        let scroll = services.scroll.snapshot();
        for entry in doomed.iter().rev() {
            self.dispose_node(entry, scroll, services.audio);
        }
        let removed = self.tree.detach_at(&target.path);
        self.flat = self.tree.flatten()?;
        self.pick_index.invalidate();
        info!(scene = %self.surface.name, node = %name, released = doomed.len(), "node_removed");
        Ok(removed)
    }

    /// Releases everything the scene acquired. Safe on a partially mounted
    /// scene and a no-op once disposal has begun.
    pub fn dispose(&mut self, services: &mut RuntimeServices<'_>) {
        if matches!(self.phase, ScenePhase::Disposing | ScenePhase::Disposed) {
            return;
        }
        let was_mounted = self.phase == ScenePhase::Mounted;
        self.phase = ScenePhase::Disposing;
        self.subscribed = false;

        if !self.hold.is_idle() || self.hold.progress() > 0.0 {
            self.hold.reset();
            services.hold_progress.publish(HoldProgress::default());
        }
        self.hovered = None;

        if was_mounted {
            let mut ctx =
                self.surface
                    .scene_context(services.scroll, services.config, Duration::ZERO);
            self.hooks.on_dispose(&mut ctx);
        }

        let scroll = services.scroll.snapshot();
        let entries: Vec<FlatEntry> = self.flat.entries().to_vec();
        for entry in entries.iter().rev() {
            self.dispose_node(entry, scroll, services.audio);
        }

        let released_audio = services.audio.release_scene(&self.surface.name);
        if let Some(root) = self.root.take() {
            self.surface.graph.remove_subtree(root);
        }
        self.pick_index.invalidate();
        self.phase = ScenePhase::Disposed;
        info!(
            scene = %self.surface.name,
            node_count = entries.len(),
            released_audio,
            "scene_disposed"
        );
    }

    fn dispose_node(
        &mut self,
        entry: &FlatEntry,
        scroll: ScrollSnapshot,
        audio: &mut AudioLifecycleManager,
    ) {
        let Some(node) = self.tree.node_mut(&entry.path) else {
            return;
        };
        let result = {
            let mut env = self.surface.hook_env(scroll, Duration::ZERO);
            node.run_hook(LifecycleHook::Dispose, &mut env)
        };
        if let Err(source) = result {
            let error = NodeError::Component {
                node: entry.name.clone(),
                hook: LifecycleHook::Dispose,
                source,
            };
            warn!(scene = %self.surface.name, error = %error, "node_hook_failed");
        }
        audio.release_node(&self.surface.name, &entry.name);
        node.release(&mut self.surface.graph);
    }

    fn ensure_mounted(&self, operation: &'static str) -> Result<(), SceneError> {
        match self.phase {
            ScenePhase::Mounted => Ok(()),
            ScenePhase::Constructing => Err(SceneError::InvalidPhase {
                scene: self.surface.name.clone(),
                operation,
                phase: self.phase,
            }),
            ScenePhase::Disposing | ScenePhase::Disposed => {
                debug!(scene = %self.surface.name, operation, "stale_operation_ignored");
                Err(SceneError::StaleReference {
                    scene: self.surface.name.clone(),
                    operation,
                })
            }
        }
    }

    fn pick(&mut self, ray: &Ray, required: Capabilities) -> Option<String> {
        self.pick_index.query(
            ray,
            required,
            &self.tree,
            &self.flat,
            &self.surface.graph,
            self.intersector.as_ref(),
        )
    }

    fn dispatch(&mut self, name: &str, gesture: Gesture, scroll: ScrollSnapshot) {
        let Some(entry) = self.flat.get(name) else {
            debug!(scene = %self.surface.name, node = name, ?gesture, "stale_dispatch_ignored");
            return;
        };
        let Some(node) = self.tree.node_mut(&entry.path) else {
            return;
        };
        let mut env = self.surface.hook_env(scroll, Duration::ZERO);
        node.dispatch(gesture, &mut env);
    }

    fn hold_duration_for(&self, name: &str, config: &RuntimeConfig) -> Duration {
        self.node(name)
            .and_then(ComponentNode::hold_duration)
            .unwrap_or(config.default_hold_duration)
    }

    fn cancel_hold(&mut self, progress: &HoldProgressHandle) {
        if let Some(HoldEvent::Cancelled { node }) = self.hold.release() {
            debug!(scene = %self.surface.name, node = %node, progress = self.hold.progress(), "hold_cancelled");
            progress.publish(HoldProgress {
                value: self.hold.progress(),
                pressing: false,
            });
        }
    }

    fn apply_hold_events(
        &mut self,
        events: Vec<HoldEvent>,
        scroll: ScrollSnapshot,
        progress: &HoldProgressHandle,
    ) {
        for event in events {
            match event {
                HoldEvent::Progress(value) => progress.publish(HoldProgress {
                    value,
                    pressing: self.hold.held_node().is_some(),
                }),
                HoldEvent::Completed { node } => {
                    info!(scene = %self.surface.name, node = %node, "hold_completed");
                    self.dispatch(&node, Gesture::Hold, scroll);
                }
                HoldEvent::Cancelled { node } => {
                    debug!(scene = %self.surface.name, node = %node, "hold_cancelled");
                }
                HoldEvent::Settled => progress.publish(HoldProgress::default()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use glam::Vec3;

    use super::*;
    use crate::app::audio::{AudioEventKind, AudioLedger, HeadlessAudioBackend};
    use crate::app::component::{Component, DeclaredComponent, NodeContext};
    use crate::app::rendering::Transform;

    /// Spawns a radius-1 mesh for any content id except "missing".
    struct MeshProvider;

    impl RenderableProvider for MeshProvider {
        fn instantiate(&self, content: &str, graph: &mut SceneGraph) -> Option<ObjectId> {
            (content != "missing").then(|| graph.spawn(ObjectDesc::mesh(content, 1.0)))
        }
    }

    struct Services {
        config: RuntimeConfig,
        scroll: ScrollSequencer,
        audio: AudioLifecycleManager,
        hold: HoldProgressHandle,
        ledger: AudioLedger,
    }

    impl Services {
        fn new() -> Self {
            let backend = HeadlessAudioBackend::new();
            let ledger = backend.ledger();
            let config = RuntimeConfig::default();
            Self {
                scroll: ScrollSequencer::from_config(&config).expect("scroll"),
                config,
                audio: AudioLifecycleManager::new(Box::new(backend)),
                hold: HoldProgressHandle::default(),
                ledger,
            }
        }

        fn borrow(&mut self) -> RuntimeServices<'_> {
            RuntimeServices {
                config: &self.config,
                scroll: &mut self.scroll,
                audio: &mut self.audio,
                hold_progress: &self.hold,
            }
        }
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn at_depth(z: f32) -> Transform {
        Transform::from_position(Vec3::new(0.0, 0.0, z))
    }

    fn controller(tree: ComponentTree) -> SceneController {
        SceneController::new("basecamp", tree, Box::new(MeshProvider))
            .with_observer(Observer::new(Vec3::new(0.0, 0.0, 10.0), 45.0, 1.0))
    }

    fn mounted(tree: ComponentTree, services: &mut Services) -> SceneController {
        let mut scene = controller(tree);
        scene.init(&mut services.borrow()).expect("init");
        scene
    }

    fn single(node: ComponentNode) -> ComponentTree {
        let mut tree = ComponentTree::new();
        tree.attach(node).expect("attach");
        tree
    }

    fn kinds(signals: &[SceneSignal]) -> Vec<SignalKind> {
        signals.iter().map(|signal| signal.kind.clone()).collect()
    }

    fn hold_node(hold_ms: u64) -> ComponentNode {
        ComponentNode::with_behavior("summit", DeclaredComponent::new())
            .with_content("flag")
            .with_capabilities(Capabilities::HOLD)
            .with_hold_duration(ms(hold_ms))
            .expect("hold")
    }

    #[test]
    fn init_mounts_composes_and_subscribes() {
        let mut services = Services::new();
        let mut tree = ComponentTree::new();
        tree.attach(
            ComponentNode::new("camp")
                .with_content("camp")
                .with_child(ComponentNode::new("tent").with_content("tent"))
                .expect("tent"),
        )
        .expect("camp");
        let scene = mounted(tree, &mut services);

        assert_eq!(scene.phase(), ScenePhase::Mounted);
        assert!(scene.is_subscribed());
        assert_eq!(scene.flat().len(), 2);
        // root + camp group + two meshes
        assert_eq!(scene.graph().object_count(), 4);
        assert_eq!(scene.is_node_visible("tent"), Some(true));
    }

    #[test]
    fn scroll_windows_follow_progress() {
        let mut services = Services::new();
        let mut tree = ComponentTree::new();
        tree.attach(
            ComponentNode::new("x")
                .with_content("x")
                .with_visibility(70.0, 100.0)
                .expect("x"),
        )
        .expect("x");
        tree.attach(
            ComponentNode::new("y")
                .with_content("y")
                .with_visibility(0.0, 50.0)
                .expect("y"),
        )
        .expect("y");
        let mut scene = mounted(tree, &mut services);
        assert_eq!(scene.is_node_visible("x"), Some(false));
        assert_eq!(scene.is_node_visible("y"), Some(true));

        services.scroll.jump_to(75.0);
        scene.update(ms(16), &mut services.borrow()).expect("update");
        assert_eq!(scene.is_node_visible("x"), Some(true));
        assert_eq!(scene.is_node_visible("y"), Some(false));
    }

    #[test]
    fn missing_renderable_degrades_only_that_node() {
        let mut services = Services::new();
        let mut tree = ComponentTree::new();
        tree.attach(
            ComponentNode::new("ghost")
                .with_content("missing")
                .with_capabilities(Capabilities::CLICK),
        )
        .expect("ghost");
        tree.attach(ComponentNode::new("tent").with_content("tent"))
            .expect("tent");
        let mut scene = mounted(tree, &mut services);

        assert_eq!(
            scene.node("ghost").map(ComponentNode::phase),
            Some(NodePhase::Degraded)
        );
        assert_eq!(
            scene.node("tent").map(ComponentNode::phase),
            Some(NodePhase::Mounted)
        );
        scene
            .handle_input(InputEvent::PointerDown { x: 0.0, y: 0.0 }, &mut services.borrow())
            .expect("input");
        assert!(scene.drain_signals().is_empty());
    }

    #[test]
    fn name_collision_aborts_mount_and_dispose_stays_safe() {
        let mut services = Services::new();
        let mut tree = ComponentTree::new();
        tree.attach(
            ComponentNode::new("a")
                .with_child(ComponentNode::new("dup"))
                .expect("a/dup"),
        )
        .expect("a");
        tree.attach(
            ComponentNode::new("b")
                .with_child(ComponentNode::new("dup"))
                .expect("b/dup"),
        )
        .expect("b");
        let mut scene = controller(tree);

        let err = scene.init(&mut services.borrow()).expect_err("collision");
        assert!(matches!(
            err,
            SceneError::MountAborted {
                source: TreeError::NameCollision { .. },
                ..
            }
        ));
        assert_eq!(scene.graph().object_count(), 0);

        scene.dispose(&mut services.borrow());
        assert_eq!(scene.phase(), ScenePhase::Disposed);
    }

    #[test]
    fn click_reaches_picked_node() {
        let mut services = Services::new();
        let tree = single(
            ComponentNode::with_behavior(
                "tent",
                DeclaredComponent::new().with_click_signal("modal"),
            )
            .with_content("tent")
            .with_capabilities(Capabilities::CLICK),
        );
        let mut scene = mounted(tree, &mut services);

        scene
            .handle_input(InputEvent::PointerDown { x: 0.0, y: 0.0 }, &mut services.borrow())
            .expect("down");
        let signals = scene.drain_signals();
        assert_eq!(
            kinds(&signals),
            vec![
                SignalKind::Clicked,
                SignalKind::Custom {
                    name: "modal".to_string(),
                    payload: None
                }
            ]
        );
        assert_eq!(signals[0].node.as_deref(), Some("tent"));
    }

    #[test]
    fn inner_node_receives_click_over_outer_node() {
        let mut services = Services::new();
        let tree = single(
            ComponentNode::with_behavior("outer", DeclaredComponent::new())
                .with_content("outer")
                .with_transform(at_depth(-5.0))
                .with_capabilities(Capabilities::CLICK)
                .with_child(
                    ComponentNode::with_behavior("inner", DeclaredComponent::new())
                        .with_content("inner")
                        .with_capabilities(Capabilities::CLICK),
                )
                .expect("inner"),
        );
        let mut scene = mounted(tree, &mut services);

        scene
            .handle_input(InputEvent::PointerDown { x: 0.0, y: 0.0 }, &mut services.borrow())
            .expect("down");
        let signals = scene.drain_signals();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].node.as_deref(), Some("inner"));
    }

    #[test]
    fn full_hold_confirms_once_and_resets_progress() {
        let mut services = Services::new();
        let mut scene = mounted(single(hold_node(2000)), &mut services);

        scene
            .handle_input(InputEvent::PointerDown { x: 0.0, y: 0.0 }, &mut services.borrow())
            .expect("down");
        for _ in 0..20 {
            scene.update(ms(100), &mut services.borrow()).expect("update");
        }
        assert_eq!(services.hold.snapshot().value, 100.0);
        for _ in 0..10 {
            scene.update(ms(100), &mut services.borrow()).expect("update");
        }

        let confirmations = scene
            .drain_signals()
            .into_iter()
            .filter(|signal| signal.kind == SignalKind::HoldConfirmed)
            .count();
        assert_eq!(confirmations, 1);
        assert_eq!(scene.hold_progress(), 0.0);
        assert_eq!(services.hold.snapshot().value, 0.0);
        assert_eq!(scene.hold_phase(), &HoldPhase::Idle);
    }

    #[test]
    fn early_release_cancels_hold() {
        let mut services = Services::new();
        let mut scene = mounted(single(hold_node(2000)), &mut services);

        scene
            .handle_input(InputEvent::PointerDown { x: 0.0, y: 0.0 }, &mut services.borrow())
            .expect("down");
        for _ in 0..10 {
            scene.update(ms(100), &mut services.borrow()).expect("update");
        }
        scene
            .handle_input(InputEvent::PointerUp, &mut services.borrow())
            .expect("up");
        assert!(services.hold.snapshot().value > 0.0);
        for _ in 0..20 {
            scene.update(ms(100), &mut services.borrow()).expect("update");
        }

        assert!(!kinds(&scene.drain_signals()).contains(&SignalKind::HoldConfirmed));
        assert_eq!(scene.hold_progress(), 0.0);
        assert_eq!(services.hold.snapshot().value, 0.0);
    }

    #[test]
    fn moving_off_hold_target_cancels() {
        let mut services = Services::new();
        let mut scene = mounted(single(hold_node(1000)), &mut services);

        scene
            .handle_input(InputEvent::PointerDown { x: 0.0, y: 0.0 }, &mut services.borrow())
            .expect("down");
        scene.update(ms(500), &mut services.borrow()).expect("update");
        scene
            .handle_input(
                InputEvent::PointerMove { x: 0.9, y: 0.9 },
                &mut services.borrow(),
            )
            .expect("move");
        assert!(matches!(
            scene.hold_phase(),
            HoldPhase::Releasing { completed: false }
        ));
        for _ in 0..30 {
            scene.update(ms(100), &mut services.borrow()).expect("update");
        }
        assert!(!kinds(&scene.drain_signals()).contains(&SignalKind::HoldConfirmed));
    }

    #[test]
    fn hover_enters_and_leaves() {
        let mut services = Services::new();
        let tree = single(
            ComponentNode::with_behavior("tent", DeclaredComponent::new())
                .with_content("tent")
                .with_capabilities(Capabilities::HOVER),
        );
        let mut scene = mounted(tree, &mut services);

        scene
            .handle_input(InputEvent::PointerMove { x: 0.0, y: 0.0 }, &mut services.borrow())
            .expect("move on");
        assert_eq!(scene.hovered(), Some("tent"));
        scene
            .handle_input(InputEvent::PointerMove { x: 0.0, y: 0.0 }, &mut services.borrow())
            .expect("move again");
        scene
            .handle_input(
                InputEvent::PointerMove { x: 0.9, y: 0.9 },
                &mut services.borrow(),
            )
            .expect("move off");
        assert_eq!(scene.hovered(), None);
        assert_eq!(
            kinds(&scene.drain_signals()),
            vec![SignalKind::HoverEntered, SignalKind::HoverLeft]
        );
    }

    #[test]
    fn hidden_node_is_not_clickable() {
        let mut services = Services::new();
        let tree = single(
            ComponentNode::with_behavior("tent", DeclaredComponent::new())
                .with_content("tent")
                .with_capabilities(Capabilities::CLICK)
                .with_visibility(50.0, 100.0)
                .expect("window"),
        );
        let mut scene = mounted(tree, &mut services);
        scene
            .handle_input(InputEvent::PointerDown { x: 0.0, y: 0.0 }, &mut services.borrow())
            .expect("down");
        assert!(scene.drain_signals().is_empty());
    }

    #[test]
    fn dispose_releases_scene_state_and_keeps_persistent_audio() {
        let mut services = Services::new();
        let tree = single(
            ComponentNode::new("tent")
                .with_content("tent")
                .with_audio(
                    "radio",
                    AudioDescriptor::new("radio.ogg").persistent(true).autoplay(true),
                )
                .expect("radio"),
        );
        let mut scene = controller(tree)
            .with_audio(
                "theme",
                AudioDescriptor::new("theme.ogg").persistent(true).autoplay(true),
            )
            .expect("theme")
            .with_audio("wind", AudioDescriptor::new("wind.ogg").autoplay(true))
            .expect("wind");
        scene.init(&mut services.borrow()).expect("init");
        assert_eq!(services.audio.live_count(), 3);
        assert_eq!(
            services
                .ledger
                .count("radio.ogg", &AudioEventKind::Created { spatial: true }),
            1
        );

        scene.dispose(&mut services.borrow());
        assert_eq!(scene.phase(), ScenePhase::Disposed);
        assert!(!scene.is_subscribed());
        assert_eq!(services.audio.live_names(), vec!["theme"]);
        assert_eq!(services.ledger.count("wind.ogg", &AudioEventKind::Stopped), 1);
        assert_eq!(services.ledger.count("radio.ogg", &AudioEventKind::Stopped), 1);
        assert_eq!(scene.graph().object_count(), 0);

        scene.dispose(&mut services.borrow());
        assert_eq!(services.ledger.count("wind.ogg", &AudioEventKind::Stopped), 1);
        assert!(matches!(
            scene.update(ms(16), &mut services.borrow()),
            Err(SceneError::StaleReference { .. })
        ));
        assert!(matches!(
            scene.handle_input(InputEvent::PointerUp, &mut services.borrow()),
            Err(SceneError::StaleReference { .. })
        ));
    }

    #[test]
    fn dispose_mid_hold_skips_callback() {
        let mut services = Services::new();
        let mut scene = mounted(single(hold_node(1000)), &mut services);
        scene
            .handle_input(InputEvent::PointerDown { x: 0.0, y: 0.0 }, &mut services.borrow())
            .expect("down");
        scene.update(ms(600), &mut services.borrow()).expect("update");
        scene.drain_signals();

        scene.dispose(&mut services.borrow());
        assert_eq!(scene.hold_phase(), &HoldPhase::Idle);
        assert_eq!(services.hold.snapshot(), HoldProgress::default());
        assert!(scene.drain_signals().is_empty());
    }

    #[test]
    fn update_before_init_is_rejected() {
        let mut services = Services::new();
        let mut scene = controller(ComponentTree::new());
        assert!(matches!(
            scene.update(ms(16), &mut services.borrow()),
            Err(SceneError::InvalidPhase { .. })
        ));
        assert!(scene.tree_mut().is_some());
        scene.init(&mut services.borrow()).expect("init");
        assert!(scene.tree_mut().is_none());
        assert!(matches!(
            scene.init(&mut services.borrow()),
            Err(SceneError::InvalidPhase { .. })
        ));
    }

    #[test]
    fn remove_node_releases_subtree() {
        let mut services = Services::new();
        let mut tree = ComponentTree::new();
        tree.attach(
            ComponentNode::new("camp")
                .with_content("camp")
                .with_child(
                    ComponentNode::new("tent")
                        .with_content("tent")
                        .with_audio("radio", AudioDescriptor::new("radio.ogg"))
                        .expect("radio"),
                )
                .expect("tent"),
        )
        .expect("camp");
        tree.attach(ComponentNode::new("rock").with_content("rock"))
            .expect("rock");
        let mut scene = mounted(tree, &mut services);
        let before = scene.graph().object_count();

        let removed = scene
            .remove_node("camp", &mut services.borrow())
            .expect("remove")
            .expect("camp node");
        assert_eq!(removed.name(), "camp");
        assert_eq!(scene.flat().names().collect::<Vec<_>>(), vec!["rock"]);
        assert!(!services.audio.is_live("radio"));
        assert_eq!(scene.graph().object_count(), before - 3);
        assert!(scene
            .remove_node("camp", &mut services.borrow())
            .expect("second remove")
            .is_none());
    }

    struct Recorder {
        log: Rc<RefCell<Vec<String>>>,
        fail: bool,
    }

    impl Component for Recorder {
        fn update(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), ComponentError> {
            self.log.borrow_mut().push(format!("update:{}", ctx.node));
            if self.fail {
                return Err(ComponentError::Failed("broken".to_string()));
            }
            Ok(())
        }

        fn on_scroll(&mut self, delta: f32, ctx: &mut NodeContext<'_>) {
            self.log
                .borrow_mut()
                .push(format!("scroll:{}:{delta}", ctx.node));
        }

        fn dispose(&mut self, ctx: &mut NodeContext<'_>) {
            self.log.borrow_mut().push(format!("dispose:{}", ctx.node));
        }
    }

    #[test]
    fn failing_update_does_not_stop_the_frame() {
        let mut services = Services::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tree = ComponentTree::new();
        tree.attach(ComponentNode::with_behavior(
            "broken",
            Recorder {
                log: Rc::clone(&log),
                fail: true,
            },
        ))
        .expect("broken");
        tree.attach(ComponentNode::with_behavior(
            "healthy",
            Recorder {
                log: Rc::clone(&log),
                fail: false,
            },
        ))
        .expect("healthy");
        let mut scene = mounted(tree, &mut services);

        scene.update(ms(16), &mut services.borrow()).expect("update");
        assert_eq!(*log.borrow(), vec!["update:broken", "update:healthy"]);
    }

    #[test]
    fn scroll_input_moves_target_and_notifies_nodes() {
        let mut services = Services::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let tree = single(ComponentNode::with_behavior(
            "rig",
            Recorder {
                log: Rc::clone(&log),
                fail: false,
            },
        ));
        let mut scene = mounted(tree, &mut services);

        scene
            .handle_input(InputEvent::Scroll { delta: 200.0 }, &mut services.borrow())
            .expect("scroll");
        assert!((services.scroll.target() - 1.0).abs() < 1e-6);
        assert_eq!(*log.borrow(), vec!["scroll:rig:200"]);
    }

    #[test]
    fn dispose_runs_node_hooks_in_reverse_order() {
        let mut services = Services::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let recorder = |log: &Rc<RefCell<Vec<String>>>| Recorder {
            log: Rc::clone(log),
            fail: false,
        };
        let tree = single(
            ComponentNode::with_behavior("parent", recorder(&log))
                .with_child(ComponentNode::with_behavior("child", recorder(&log)))
                .expect("child"),
        );
        let mut scene = mounted(tree, &mut services);
        scene.dispose(&mut services.borrow());
        assert_eq!(*log.borrow(), vec!["dispose:child", "dispose:parent"]);
    }

    #[test]
    fn declared_hooks_lock_scroll_until_elapsed() {
        let mut services = Services::new();
        let mut scene = controller(ComponentTree::new()).with_hooks(Box::new(
            DeclaredSceneHooks::new()
                .with_entry_scroll(5.0)
                .with_scroll_lock(ms(300)),
        ));
        scene.init(&mut services.borrow()).expect("init");
        assert_eq!(services.scroll.target(), 5.0);
        assert!(services.scroll.is_disabled());

        scene.update(ms(200), &mut services.borrow()).expect("update");
        assert!(services.scroll.is_disabled());
        scene.update(ms(200), &mut services.borrow()).expect("update");
        assert!(!services.scroll.is_disabled());
    }

    #[test]
    fn parallax_hooks_tilt_observer_on_pointer_move() {
        let mut services = Services::new();
        let mut scene = controller(ComponentTree::new())
            .with_hooks(Box::new(DeclaredSceneHooks::new().with_parallax(0.5)));
        scene.init(&mut services.borrow()).expect("init");

        scene
            .handle_input(InputEvent::PointerMove { x: 1.0, y: 0.0 }, &mut services.borrow())
            .expect("move");
        scene.update(ms(1000), &mut services.borrow()).expect("update");
        assert!(scene.observer().rotation().y < 0.0);
    }
}
