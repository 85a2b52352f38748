use std::collections::HashMap;

use glam::{Mat4, Vec3};

use super::transform::Transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

#[derive(Debug, Default)]
pub struct ObjectIdAllocator {
    next: u64,
}

impl ObjectIdAllocator {
    pub fn allocate(&mut self) -> ObjectId {
        let id = ObjectId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Group,
    Mesh,
    Sprite,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keyframe {
    pub time: f32,
    pub transform: Transform,
}

/// Keyframed transform track. It animates the first child of the object that
/// owns it, or the object itself when it has no children.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    keyframes: Vec<Keyframe>,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, duration: f32, mut keyframes: Vec<Keyframe>) -> Self {
        keyframes.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self {
            name: name.into(),
            duration: duration.max(0.0),
            keyframes,
        }
    }

    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    pub fn sample(&self, time: f32) -> Option<Transform> {
        let first = self.keyframes.first()?;
        let last = self.keyframes.last()?;
        if time <= first.time {
            return Some(first.transform);
        }
        if time >= last.time {
            return Some(last.transform);
        }
        let next_index = self.keyframes.iter().position(|key| key.time > time)?;
        let before = &self.keyframes[next_index - 1];
        let after = &self.keyframes[next_index];
        let span = after.time - before.time;
        let t = if span > 0.0 {
            (time - before.time) / span
        } else {
            1.0
        };
        Some(before.transform.lerp(&after.transform, t))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationPlayer {
    clip: AnimationClip,
    time: f32,
}

impl AnimationPlayer {
    pub fn new(clip: AnimationClip) -> Self {
        Self { clip, time: 0.0 }
    }

    pub fn clip(&self) -> &AnimationClip {
        &self.clip
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    fn seek(&mut self, time: f32) {
        self.time = time.clamp(0.0, self.clip.duration);
    }

    fn advance(&mut self, dt_seconds: f32) {
        let duration = self.clip.duration;
        if duration <= 0.0 {
            self.time = 0.0;
            return;
        }
        let next = self.time + dt_seconds.max(0.0);
        self.time = if next > duration {
            next.rem_euclid(duration)
        } else {
            next
        };
    }
}

#[derive(Debug, Clone)]
pub struct ObjectDesc {
    pub name: String,
    pub kind: ObjectKind,
    pub transform: Transform,
    pub bounds_radius: Option<f32>,
    pub clip: Option<AnimationClip>,
}

impl ObjectDesc {
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ObjectKind::Group,
            transform: Transform::default(),
            bounds_radius: None,
            clip: None,
        }
    }

    pub fn mesh(name: impl Into<String>, bounds_radius: f32) -> Self {
        Self {
            name: name.into(),
            kind: ObjectKind::Mesh,
            transform: Transform::default(),
            bounds_radius: Some(bounds_radius),
            clip: None,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }
}

#[derive(Debug, Clone)]
pub struct SceneObject {
    pub id: ObjectId,
    pub name: String,
    pub kind: ObjectKind,
    pub transform: Transform,
    pub visible: bool,
    pub bounds_radius: Option<f32>,
    parent: Option<ObjectId>,
    children: Vec<ObjectId>,
    animation: Option<AnimationPlayer>,
}

impl SceneObject {
    pub fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    pub fn children(&self) -> &[ObjectId] {
        &self.children
    }

    pub fn animation(&self) -> Option<&AnimationPlayer> {
        self.animation.as_ref()
    }
}

/// Headless renderable hierarchy. `generation` changes whenever the
/// parent/child structure does.
#[derive(Debug, Default)]
pub struct SceneGraph {
    allocator: ObjectIdAllocator,
    objects: HashMap<ObjectId, SceneObject>,
    generation: u64,
}

impl SceneGraph {
    pub fn spawn(&mut self, desc: ObjectDesc) -> ObjectId {
        let id = self.allocator.allocate();
        self.objects.insert(
            id,
            SceneObject {
                id,
                name: desc.name,
                kind: desc.kind,
                transform: desc.transform,
                visible: true,
                bounds_radius: desc.bounds_radius,
                parent: None,
                children: Vec::new(),
                animation: desc.clip.map(AnimationPlayer::new),
            },
        );
        self.bump_generation();
        id
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn find_object(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(&id)
    }

    pub fn find_object_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.objects.get_mut(&id)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn parent(&self, id: ObjectId) -> Option<ObjectId> {
        self.objects.get(&id).and_then(|object| object.parent)
    }

    pub fn children(&self, id: ObjectId) -> &[ObjectId] {
        self.objects
            .get(&id)
            .map(|object| object.children.as_slice())
            .unwrap_or(&[])
    }

    /// Re-parents `child`. Rejects unknown ids and cycles; re-parenting to the
    /// current parent keeps the child's position among its siblings.
    pub fn set_parent(&mut self, child: ObjectId, parent: Option<ObjectId>) -> bool {
        if !self.contains(child) {
            return false;
        }
        if let Some(parent) = parent {
            if !self.contains(parent) || self.is_ancestor_or_self(child, parent) {
                return false;
            }
        }
        let current = self.parent(child);
        if current == parent {
            return true;
        }
        if let Some(old) = current.and_then(|old| self.objects.get_mut(&old)) {
            old.children.retain(|id| *id != child);
        }
        if let Some(new) = parent.and_then(|new| self.objects.get_mut(&new)) {
            new.children.push(child);
        }
        if let Some(object) = self.objects.get_mut(&child) {
            object.parent = parent;
        }
        self.bump_generation();
        true
    }

    /// Pre-order ids of `root` and everything below it.
    pub fn descendants(&self, root: ObjectId) -> Vec<ObjectId> {
        let mut out = Vec::new();
        if !self.contains(root) {
            return out;
        }
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            for child in self.children(id).iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    /// Spawns a deep copy of `source` and its subtree, detached from any parent.
    pub fn clone_subtree(&mut self, source: ObjectId) -> Option<ObjectId> {
        let original = self.objects.get(&source)?.clone();
        let id = self.spawn(ObjectDesc {
            name: original.name,
            kind: original.kind,
            transform: original.transform,
            bounds_radius: original.bounds_radius,
            clip: original.animation.map(|player| player.clip),
        });
        if let Some(object) = self.objects.get_mut(&id) {
            object.visible = original.visible;
        }
        for child in original.children {
            if let Some(copy) = self.clone_subtree(child) {
                self.set_parent(copy, Some(id));
            }
        }
        Some(id)
    }

    /// Removes `root` and its subtree. Returns how many objects were removed.
    pub fn remove_subtree(&mut self, root: ObjectId) -> usize {
        if !self.contains(root) {
            return 0;
        }
        self.set_parent(root, None);
        let doomed = self.descendants(root);
        for id in &doomed {
            self.objects.remove(id);
        }
        self.bump_generation();
        doomed.len()
    }

    /// Returns whether the flag changed.
    pub fn set_visible(&mut self, id: ObjectId, visible: bool) -> bool {
        match self.objects.get_mut(&id) {
            Some(object) if object.visible != visible => {
                object.visible = visible;
                true
            }
            _ => false,
        }
    }

    /// Visible when the object and every ancestor are visible.
    pub fn is_effectively_visible(&self, id: ObjectId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            match self.objects.get(&current) {
                Some(object) if object.visible => cursor = object.parent,
                _ => return false,
            }
        }
        true
    }

    pub fn set_transform(&mut self, id: ObjectId, transform: Transform) -> bool {
        match self.objects.get_mut(&id) {
            Some(object) => {
                object.transform = transform;
                true
            }
            None => false,
        }
    }

    pub fn world_matrix(&self, id: ObjectId) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(object) = self.objects.get(&current) else {
                break;
            };
            matrix = object.transform.matrix() * matrix;
            cursor = object.parent;
        }
        matrix
    }

    pub fn world_position(&self, id: ObjectId) -> Option<Vec3> {
        self.contains(id)
            .then(|| self.world_matrix(id).transform_point3(Vec3::ZERO))
    }

    pub fn clip_duration(&self, id: ObjectId) -> Option<f32> {
        self.objects
            .get(&id)
            .and_then(|object| object.animation.as_ref())
            .map(|player| player.clip.duration)
    }

    pub fn seek_animation(&mut self, id: ObjectId, time: f32) -> bool {
        let Some(player) = self.player_mut(id) else {
            return false;
        };
        player.seek(time);
        self.apply_animation(id)
    }

    pub fn advance_animation(&mut self, id: ObjectId, dt_seconds: f32) -> bool {
        let Some(player) = self.player_mut(id) else {
            return false;
        };
        player.advance(dt_seconds);
        self.apply_animation(id)
    }

    fn player_mut(&mut self, id: ObjectId) -> Option<&mut AnimationPlayer> {
        self.objects
            .get_mut(&id)
            .and_then(|object| object.animation.as_mut())
    }

    fn apply_animation(&mut self, id: ObjectId) -> bool {
        let Some(object) = self.objects.get(&id) else {
            return false;
        };
        let Some(pose) = object
            .animation
            .as_ref()
            .and_then(|player| player.clip.sample(player.time))
        else {
            return false;
        };
        let target = object.children.first().copied().unwrap_or(id);
        self.set_transform(target, pose)
    }

    fn is_ancestor_or_self(&self, candidate: ObjectId, of: ObjectId) -> bool {
        let mut cursor = Some(of);
        while let Some(current) = cursor {
            if current == candidate {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    fn bump_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}
