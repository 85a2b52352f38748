use std::time::Duration;

use glam::Vec3;
use serde::Serialize;
use thiserror::Error;

use super::rendering::{ObjectId, Observer, SceneGraph};
use super::scroll::ScrollSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalKind {
    Clicked,
    HoverEntered,
    HoverLeft,
    HoldConfirmed,
    Custom {
        name: String,
        payload: Option<String>,
    },
}

/// Outward notification raised by a node behaviour, drained by the caller each frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneSignal {
    pub scene: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(flatten)]
    pub kind: SignalKind,
}

#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("renderable {0:?} is no longer in the scene graph")]
    MissingObject(ObjectId),
    #[error("{0}")]
    Failed(String),
}

/// Shared per-dispatch state handed to node behaviours.
pub struct HookEnv<'a> {
    pub scene: &'a str,
    pub graph: &'a mut SceneGraph,
    pub observer: &'a mut Observer,
    pub scroll: ScrollSnapshot,
    pub dt: Duration,
    pub signals: &'a mut Vec<SceneSignal>,
}

impl<'a> HookEnv<'a> {
    pub fn node_context<'b>(&'b mut self, node: &'b str, item: Option<ObjectId>) -> NodeContext<'b> {
        NodeContext {
            scene: self.scene,
            node,
            item,
            graph: &mut *self.graph,
            observer: &mut *self.observer,
            scroll: self.scroll,
            dt: self.dt,
            signals: &mut *self.signals,
        }
    }
}

pub struct NodeContext<'a> {
    pub scene: &'a str,
    pub node: &'a str,
    pub item: Option<ObjectId>,
    pub graph: &'a mut SceneGraph,
    pub observer: &'a mut Observer,
    pub scroll: ScrollSnapshot,
    pub dt: Duration,
    signals: &'a mut Vec<SceneSignal>,
}

impl NodeContext<'_> {
    pub fn emit(&mut self, kind: SignalKind) {
        self.signals.push(SceneSignal {
            scene: self.scene.to_string(),
            node: Some(self.node.to_string()),
            kind,
        });
    }

    pub fn item_visible(&self) -> bool {
        self.item
            .is_some_and(|item| self.graph.is_effectively_visible(item))
    }

    pub fn require_item(&self) -> Result<ObjectId, ComponentError> {
        match self.item {
            Some(item) if self.graph.contains(item) => Ok(item),
            Some(item) => Err(ComponentError::MissingObject(item)),
            None => Err(ComponentError::Failed(format!(
                "node '{}' has no renderable",
                self.node
            ))),
        }
    }
}

/// Behaviour attached to a component node. Every hook defaults to a no-op.
pub trait Component {
    fn init(&mut self, _ctx: &mut NodeContext<'_>) -> Result<(), ComponentError> {
        Ok(())
    }
    fn after_init(&mut self, _ctx: &mut NodeContext<'_>) -> Result<(), ComponentError> {
        Ok(())
    }
    fn update(&mut self, _ctx: &mut NodeContext<'_>) -> Result<(), ComponentError> {
        Ok(())
    }
    fn dispose(&mut self, _ctx: &mut NodeContext<'_>) {}
    fn on_click(&mut self, _ctx: &mut NodeContext<'_>) {}
    fn on_hover_enter(&mut self, _ctx: &mut NodeContext<'_>) {}
    fn on_hover_leave(&mut self, _ctx: &mut NodeContext<'_>) {}
    fn on_hold(&mut self, _ctx: &mut NodeContext<'_>) {}
    fn on_scroll(&mut self, _delta: f32, _ctx: &mut NodeContext<'_>) {}
    fn on_visibility_change(&mut self, _visible: bool, _ctx: &mut NodeContext<'_>) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Inert;

impl Component for Inert {}

/// Data-driven behaviour: turns gestures into signals and optionally keeps a
/// sprite readable at distance.
#[derive(Debug, Clone, Default)]
pub struct DeclaredComponent {
    click_signal: Option<String>,
    hold_signal: Option<String>,
    payload: Option<String>,
    distance_scale: Option<DistanceScale>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceScale {
    pub reference_distance: f32,
    pub min: f32,
    pub max: f32,
    pub base: Vec3,
}

impl DistanceScale {
    pub fn factor(&self, distance: f32) -> f32 {
        if self.reference_distance <= 0.0 {
            return self.max;
        }
        (distance / self.reference_distance).clamp(self.min, self.max)
    }
}

impl DeclaredComponent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_click_signal(mut self, name: impl Into<String>) -> Self {
        self.click_signal = Some(name.into());
        self
    }

    pub fn with_hold_signal(mut self, name: impl Into<String>) -> Self {
        self.hold_signal = Some(name.into());
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_distance_scale(mut self, scale: DistanceScale) -> Self {
        self.distance_scale = Some(scale);
        self
    }

    fn emit_custom(&self, name: &Option<String>, ctx: &mut NodeContext<'_>) {
        if let Some(name) = name {
            ctx.emit(SignalKind::Custom {
                name: name.clone(),
                payload: self.payload.clone(),
            });
        }
    }
}

impl Component for DeclaredComponent {
    fn update(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), ComponentError> {
        let Some(scale) = self.distance_scale else {
            return Ok(());
        };
        let item = ctx.require_item()?;
        let target = if ctx.item_visible() {
            let distance = ctx
                .graph
                .world_position(item)
                .map(|position| position.distance(ctx.observer.position()))
                .unwrap_or(scale.reference_distance);
            scale.base * scale.factor(distance)
        } else {
            Vec3::ZERO
        };
        if let Some(object) = ctx.graph.find_object_mut(item) {
            object.transform.scale = target;
        }
        Ok(())
    }

    fn on_click(&mut self, ctx: &mut NodeContext<'_>) {
        if !ctx.item_visible() {
            return;
        }
        ctx.emit(SignalKind::Clicked);
        self.emit_custom(&self.click_signal, ctx);
    }

    fn on_hover_enter(&mut self, ctx: &mut NodeContext<'_>) {
        ctx.emit(SignalKind::HoverEntered);
    }

    fn on_hover_leave(&mut self, ctx: &mut NodeContext<'_>) {
        ctx.emit(SignalKind::HoverLeft);
    }

    fn on_hold(&mut self, ctx: &mut NodeContext<'_>) {
        ctx.emit(SignalKind::HoldConfirmed);
        self.emit_custom(&self.hold_signal, ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::rendering::{ObjectDesc, Transform};

    struct Fixture {
        graph: SceneGraph,
        observer: Observer,
        signals: Vec<SceneSignal>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                graph: SceneGraph::default(),
                observer: Observer::default(),
                signals: Vec::new(),
            }
        }

        fn env(&mut self) -> HookEnv<'_> {
            HookEnv {
                scene: "basecamp",
                graph: &mut self.graph,
                observer: &mut self.observer,
                scroll: ScrollSnapshot::default(),
                dt: Duration::ZERO,
                signals: &mut self.signals,
            }
        }
    }

    #[test]
    fn click_on_visible_item_emits_clicked_and_custom() {
        let mut fixture = Fixture::new();
        let item = fixture.graph.spawn(ObjectDesc::mesh("tent", 1.0));
        let mut component = DeclaredComponent::new()
            .with_click_signal("modal")
            .with_payload("tent_1953");

        {
            let mut env = fixture.env();
            let mut ctx = env.node_context("tent", Some(item));
            component.on_click(&mut ctx);
        }

        let kinds: Vec<_> = fixture.signals.iter().map(|s| s.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                SignalKind::Clicked,
                SignalKind::Custom {
                    name: "modal".to_string(),
                    payload: Some("tent_1953".to_string()),
                },
            ]
        );
        assert_eq!(fixture.signals[0].scene, "basecamp");
        assert_eq!(fixture.signals[0].node.as_deref(), Some("tent"));
    }

    #[test]
    fn click_on_hidden_item_is_ignored() {
        let mut fixture = Fixture::new();
        let item = fixture.graph.spawn(ObjectDesc::mesh("tent", 1.0));
        fixture.graph.set_visible(item, false);
        let mut component = DeclaredComponent::new().with_click_signal("modal");

        let mut env = fixture.env();
        let mut ctx = env.node_context("tent", Some(item));
        component.on_click(&mut ctx);
        drop(env);

        assert!(fixture.signals.is_empty());
    }

    #[test]
    fn distance_scale_shrinks_close_sprites_and_hides_invisible_ones() {
        let mut fixture = Fixture::new();
        let item = fixture.graph.spawn(
            ObjectDesc::mesh("marker", 1.0)
                .with_transform(Transform::from_position(Vec3::new(0.0, 0.0, -10.0))),
        );
        let mut component = DeclaredComponent::new().with_distance_scale(DistanceScale {
            reference_distance: 40.0,
            min: 0.35,
            max: 1.0,
            base: Vec3::splat(2.0),
        });

        {
            let mut env = fixture.env();
            let mut ctx = env.node_context("marker", Some(item));
            component.update(&mut ctx).expect("update");
        }
        let scale = fixture.graph.find_object(item).expect("item").transform.scale;
        assert!((scale.x - 0.7).abs() < 1e-5);

        fixture.graph.set_visible(item, false);
        {
            let mut env = fixture.env();
            let mut ctx = env.node_context("marker", Some(item));
            component.update(&mut ctx).expect("update");
        }
        let scale = fixture.graph.find_object(item).expect("item").transform.scale;
        assert_eq!(scale, Vec3::ZERO);
    }

    #[test]
    fn update_without_item_reports_error() {
        let mut fixture = Fixture::new();
        let mut component = DeclaredComponent::new().with_distance_scale(DistanceScale {
            reference_distance: 1.0,
            min: 0.0,
            max: 1.0,
            base: Vec3::ONE,
        });
        let mut env = fixture.env();
        let mut ctx = env.node_context("ghost", Some(ObjectId(42)));
        assert!(matches!(
            component.update(&mut ctx),
            Err(ComponentError::MissingObject(ObjectId(42)))
        ));
    }
}
