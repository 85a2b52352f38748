use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use bitflags::bitflags;
use thiserror::Error;

use super::audio::AudioDescriptor;
use super::component::{Component, ComponentError, HookEnv, Inert};
use super::rendering::{ObjectDesc, ObjectId, SceneGraph, Transform};
use super::visibility::{VisibilityChange, VisibilityTracker, VisibilityWindow};
use crate::config::ConfigurationError;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u8 {
        const CLICK = 1;
        const HOVER = 1 << 1;
        const HOLD = 1 << 2;
    }
}

impl Capabilities {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "click" => Some(Self::CLICK),
            "hover" => Some(Self::HOVER),
            "hold" => Some(Self::HOLD),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePhase {
    Declared,
    Mounted,
    Degraded,
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleHook {
    Init,
    AfterInit,
    Update,
    Dispose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Click,
    HoverEnter,
    HoverLeave,
    Hold,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("'{parent}' already has a child named '{name}'")]
    DuplicateName { parent: String, name: String },
    #[error("node name '{name}' appears at both '{first}' and '{second}'")]
    NameCollision {
        name: String,
        first: String,
        second: String,
    },
    #[error("node '{node}' already declares audio '{name}'")]
    DuplicateAudio { node: String, name: String },
}

pub type NodePath = Vec<usize>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatEntry {
    pub name: String,
    pub path: NodePath,
    pub depth: usize,
}

/// Pre-order view of a component tree keyed by node name.
#[derive(Debug, Clone, Default)]
pub struct FlatTree {
    entries: Vec<FlatEntry>,
    by_name: HashMap<String, usize>,
}

impl FlatTree {
    pub fn entries(&self) -> &[FlatEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&FlatEntry> {
        self.by_name.get(name).map(|index| &self.entries[*index])
    }

    /// Registration order of `name`; later nodes win pick ties.
    pub fn order_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }
}

pub struct ComponentNode {
    name: String,
    content: Option<String>,
    transform: Option<Transform>,
    item: Option<ObjectId>,
    group: Option<ObjectId>,
    children: Vec<ComponentNode>,
    audios: Vec<(String, AudioDescriptor)>,
    visibility: VisibilityTracker,
    hold_duration: Option<Duration>,
    capabilities: Capabilities,
    disabled: Capabilities,
    phase: NodePhase,
    behavior: Box<dyn Component>,
}

impl fmt::Debug for ComponentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentNode")
            .field("name", &self.name)
            .field("content", &self.content)
            .field("item", &self.item)
            .field("phase", &self.phase)
            .field("capabilities", &self.capabilities)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

impl ComponentNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_behavior(name, Inert)
    }

    pub fn with_behavior(name: impl Into<String>, behavior: impl Component + 'static) -> Self {
        Self::from_boxed(name, Box::new(behavior))
    }

    pub fn from_boxed(name: impl Into<String>, behavior: Box<dyn Component>) -> Self {
        Self {
            name: name.into(),
            content: None,
            transform: None,
            item: None,
            group: None,
            children: Vec::new(),
            audios: Vec::new(),
            visibility: VisibilityTracker::default(),
            hold_duration: None,
            capabilities: Capabilities::empty(),
            disabled: Capabilities::empty(),
            phase: NodePhase::Declared,
            behavior,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_visibility(mut self, start: f32, end: f32) -> Result<Self, ConfigurationError> {
        let window = VisibilityWindow::new(start, end).map_err(|err| err.for_node(&self.name))?;
        self.visibility = VisibilityTracker::new(Some(window));
        Ok(self)
    }

    pub fn with_hold_duration(mut self, duration: Duration) -> Result<Self, ConfigurationError> {
        if duration.is_zero() {
            return Err(ConfigurationError::NonPositiveHoldDuration.for_node(&self.name));
        }
        self.hold_duration = Some(duration);
        Ok(self)
    }

    pub fn with_audio(
        mut self,
        name: impl Into<String>,
        descriptor: AudioDescriptor,
    ) -> Result<Self, TreeError> {
        let name = name.into();
        if self.audios.iter().any(|(existing, _)| *existing == name) {
            return Err(TreeError::DuplicateAudio {
                node: self.name.clone(),
                name,
            });
        }
        self.audios.push((name, descriptor));
        Ok(self)
    }

    pub fn with_child(mut self, child: ComponentNode) -> Result<Self, TreeError> {
        self.attach(child)?;
        Ok(self)
    }

    pub fn attach(&mut self, child: ComponentNode) -> Result<(), TreeError> {
        attach_unique(&self.name, &mut self.children, child)
    }

    pub fn detach(&mut self, name: &str) -> Option<ComponentNode> {
        detach_named(&mut self.children, name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn item(&self) -> Option<ObjectId> {
        self.item
    }

    pub fn children(&self) -> &[ComponentNode] {
        &self.children
    }

    pub fn audios(&self) -> &[(String, AudioDescriptor)] {
        &self.audios
    }

    pub fn phase(&self) -> NodePhase {
        self.phase
    }

    pub fn hold_duration(&self) -> Option<Duration> {
        self.hold_duration
    }

    pub fn visibility_window(&self) -> Option<&VisibilityWindow> {
        self.visibility.window()
    }

    pub fn is_visible(&self) -> bool {
        self.visibility.is_visible()
    }

    /// Declared capabilities minus the disabled ones.
    pub fn active_capabilities(&self) -> Capabilities {
        self.capabilities.difference(self.disabled)
    }

    pub fn set_disabled(&mut self, disabled: Capabilities) {
        self.disabled = disabled;
    }

    /// Group when the node has children, otherwise its own item.
    pub fn composed_root(&self) -> Option<ObjectId> {
        self.group.or(self.mounted_item())
    }

    fn mounted_item(&self) -> Option<ObjectId> {
        if self.phase == NodePhase::Mounted {
            self.item
        } else {
            None
        }
    }

    /// Resolves the node's renderable. Returns false when the content id
    /// cannot be instantiated; the node is then degraded.
    pub(crate) fn mount(&mut self, graph: &mut SceneGraph, item: Option<ObjectId>) -> bool {
        let item = match (item, self.content.is_some()) {
            (Some(item), _) => item,
            (None, true) => {
                self.phase = NodePhase::Degraded;
                return false;
            }
            (None, false) => graph.spawn(ObjectDesc::group(self.name.clone())),
        };
        if let Some(transform) = self.transform {
            graph.set_transform(item, transform);
        }
        if let Some(object) = graph.find_object_mut(item) {
            object.name = self.name.clone();
        }
        self.item = Some(item);
        self.phase = NodePhase::Mounted;
        true
    }

    pub(crate) fn degrade(&mut self, graph: &mut SceneGraph) {
        if let Some(item) = self.item.take() {
            graph.remove_subtree(item);
        }
        self.phase = NodePhase::Degraded;
    }

    pub(crate) fn observe_visibility(&mut self, progress: f32) -> Option<VisibilityChange> {
        self.visibility.observe(progress)
    }

    pub(crate) fn run_hook(
        &mut self,
        hook: LifecycleHook,
        env: &mut HookEnv<'_>,
    ) -> Result<(), ComponentError> {
        if self.phase != NodePhase::Mounted {
            return Ok(());
        }
        let mut ctx = env.node_context(&self.name, self.item);
        match hook {
            LifecycleHook::Init => self.behavior.init(&mut ctx),
            LifecycleHook::AfterInit => self.behavior.after_init(&mut ctx),
            LifecycleHook::Update => self.behavior.update(&mut ctx),
            LifecycleHook::Dispose => {
                self.behavior.dispose(&mut ctx);
                Ok(())
            }
        }
    }

    pub(crate) fn dispatch(&mut self, gesture: Gesture, env: &mut HookEnv<'_>) {
        if self.phase != NodePhase::Mounted {
            return;
        }
        let mut ctx = env.node_context(&self.name, self.item);
        match gesture {
            Gesture::Click => self.behavior.on_click(&mut ctx),
            Gesture::HoverEnter => self.behavior.on_hover_enter(&mut ctx),
            Gesture::HoverLeave => self.behavior.on_hover_leave(&mut ctx),
            Gesture::Hold => self.behavior.on_hold(&mut ctx),
        }
    }

    pub(crate) fn notify_scroll(&mut self, delta: f32, env: &mut HookEnv<'_>) {
        if self.phase != NodePhase::Mounted {
            return;
        }
        let mut ctx = env.node_context(&self.name, self.item);
        self.behavior.on_scroll(delta, &mut ctx);
    }

    pub(crate) fn notify_visibility(&mut self, visible: bool, env: &mut HookEnv<'_>) {
        if self.phase != NodePhase::Mounted {
            return;
        }
        let mut ctx = env.node_context(&self.name, self.item);
        self.behavior.on_visibility_change(visible, &mut ctx);
    }

    /// Builds (or re-uses) this node's renderable hierarchy.
    fn compose(&mut self, graph: &mut SceneGraph) -> Option<ObjectId> {
        if self.children.is_empty() {
            return self.mounted_item();
        }
        let group = match self.group.filter(|group| graph.contains(*group)) {
            Some(group) => group,
            None => {
                let group = graph.spawn(ObjectDesc::group(format!("{}#group", self.name)));
                self.group = Some(group);
                group
            }
        };
        if let Some(item) = self.mounted_item() {
            graph.set_parent(item, Some(group));
        }
        for child in &mut self.children {
            if let Some(composed) = child.compose(graph) {
                graph.set_parent(composed, Some(group));
            }
        }
        Some(group)
    }

    /// Drops the node's renderables. Children must be released first.
    pub(crate) fn release(&mut self, graph: &mut SceneGraph) {
        if let Some(item) = self.item.take() {
            graph.remove_subtree(item);
        }
        if let Some(group) = self.group.take() {
            graph.remove_subtree(group);
        }
        self.phase = NodePhase::Disposed;
    }
}

fn attach_unique(
    parent: &str,
    siblings: &mut Vec<ComponentNode>,
    child: ComponentNode,
) -> Result<(), TreeError> {
    if siblings.iter().any(|existing| existing.name == child.name) {
        return Err(TreeError::DuplicateName {
            parent: parent.to_string(),
            name: child.name,
        });
    }
    siblings.push(child);
    Ok(())
}

fn detach_named(siblings: &mut Vec<ComponentNode>, name: &str) -> Option<ComponentNode> {
    let index = siblings.iter().position(|node| node.name == name)?;
    Some(siblings.remove(index))
}

pub const TREE_ROOT_NAME: &str = "<root>";

/// Ordered top-level nodes of one scene.
#[derive(Debug, Default)]
pub struct ComponentTree {
    children: Vec<ComponentNode>,
}

impl ComponentTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, node: ComponentNode) -> Result<(), TreeError> {
        attach_unique(TREE_ROOT_NAME, &mut self.children, node)
    }

    pub fn detach(&mut self, name: &str) -> Option<ComponentNode> {
        detach_named(&mut self.children, name)
    }

    pub fn children(&self) -> &[ComponentNode] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Removes the node at `path` from whichever parent holds it.
    pub fn detach_at(&mut self, path: &[usize]) -> Option<ComponentNode> {
        let (last, parents) = path.split_last()?;
        let siblings = if parents.is_empty() {
            &mut self.children
        } else {
            &mut self.node_mut(parents)?.children
        };
        (*last < siblings.len()).then(|| siblings.remove(*last))
    }

    pub fn node(&self, path: &[usize]) -> Option<&ComponentNode> {
        let (first, rest) = path.split_first()?;
        let mut node = self.children.get(*first)?;
        for index in rest {
            node = node.children.get(*index)?;
        }
        Some(node)
    }

    pub fn node_mut(&mut self, path: &[usize]) -> Option<&mut ComponentNode> {
        let (first, rest) = path.split_first()?;
        let mut node = self.children.get_mut(*first)?;
        for index in rest {
            node = node.children.get_mut(*index)?;
        }
        Some(node)
    }

    pub fn flatten(&self) -> Result<FlatTree, TreeError> {
        let mut flat = FlatTree::default();
        let mut labels: Vec<String> = Vec::new();
        let mut path = Vec::new();
        let mut trail = Vec::new();
        for (index, node) in self.children.iter().enumerate() {
            path.push(index);
            flatten_into(node, &mut path, &mut trail, &mut labels, &mut flat)?;
            path.pop();
        }
        Ok(flat)
    }

    /// Mounts every top-level composed renderable under `root`. Calling it
    /// again without structural changes leaves the graph untouched.
    pub fn compose_renderable(&mut self, graph: &mut SceneGraph, root: ObjectId) {
        for node in &mut self.children {
            if let Some(composed) = node.compose(graph) {
                graph.set_parent(composed, Some(root));
            }
        }
    }

    /// Runs `hook` on every flattened node in order and collects failures
    /// instead of stopping at the first one.
    pub fn for_each(
        &mut self,
        flat: &FlatTree,
        hook: LifecycleHook,
        env: &mut HookEnv<'_>,
    ) -> Vec<(String, ComponentError)> {
        let mut failures = Vec::new();
        for entry in flat.entries() {
            let Some(node) = self.node_mut(&entry.path) else {
                continue;
            };
            if let Err(error) = node.run_hook(hook, env) {
                failures.push((entry.name.clone(), error));
            }
        }
        failures
    }
}

fn flatten_into(
    node: &ComponentNode,
    path: &mut NodePath,
    trail: &mut Vec<String>,
    labels: &mut Vec<String>,
    flat: &mut FlatTree,
) -> Result<(), TreeError> {
    trail.push(node.name.clone());
    let label = trail.join("/");
    if let Some(existing) = flat.by_name.get(&node.name) {
        return Err(TreeError::NameCollision {
            name: node.name.clone(),
            first: labels[*existing].clone(),
            second: label,
        });
    }
    flat.by_name.insert(node.name.clone(), flat.entries.len());
    flat.entries.push(FlatEntry {
        name: node.name.clone(),
        path: path.clone(),
        depth: path.len() - 1,
    });
    labels.push(label);

    for (index, child) in node.children.iter().enumerate() {
        path.push(index);
        flatten_into(child, path, trail, labels, flat)?;
        path.pop();
    }
    trail.pop();
    Ok(())
}
