mod graph;
mod observer;
mod raycast;
mod transform;

use std::sync::Arc;

pub use graph::{
    AnimationClip, AnimationPlayer, Keyframe, ObjectDesc, ObjectId, ObjectIdAllocator, ObjectKind,
    SceneGraph, SceneObject,
};
pub use observer::Observer;
pub use raycast::{BoundsRayCaster, Ray, RayHit, RayIntersector};
pub use transform::{screen_to_ndc, Transform, Viewport};

/// Instantiates renderables by content id. Every call yields a fresh,
/// unparented copy.
pub trait RenderableProvider {
    fn instantiate(&self, content: &str, graph: &mut SceneGraph) -> Option<ObjectId>;
}

impl<P: RenderableProvider + ?Sized> RenderableProvider for Arc<P> {
    fn instantiate(&self, content: &str, graph: &mut SceneGraph) -> Option<ObjectId> {
        (**self).instantiate(content, graph)
    }
}

impl<P: RenderableProvider + ?Sized> RenderableProvider for Box<P> {
    fn instantiate(&self, content: &str, graph: &mut SceneGraph) -> Option<ObjectId> {
        (**self).instantiate(content, graph)
    }
}
