mod audio;
mod component;
mod gesture;
mod input;
mod loop_runner;
mod metrics;
mod pick;
mod rendering;
mod scene;
mod scroll;
mod stage;
mod timeline;
mod tree;
mod visibility;

pub use audio::{
    AudioBackend, AudioDescriptor, AudioError, AudioEvent, AudioEventKind, AudioLedger,
    AudioLifecycleManager, AudioOwner, HeadlessAudioBackend, SoundHandle, SoundOptions,
};
pub use component::{
    Component, ComponentError, DeclaredComponent, DistanceScale, HookEnv, Inert, NodeContext,
    SceneSignal, SignalKind,
};
pub use gesture::{Easing, HoldEvent, HoldGesture, HoldPhase, Ramp, HOLD_PROGRESS_MAX};
pub use input::{InputEvent, InputQueue};
pub use loop_runner::{
    run_session, run_session_with_metrics, AppError, InputScript, LoopConfig, SessionObserver,
    SessionReport, TimedInput, FRAME_INTERVAL_ENV_VAR,
};
pub use metrics::{
    HoldProgress, HoldProgressHandle, LoopMetricsSnapshot, MetricsHandle, SnapshotHandle,
};
pub use pick::PickIndex;
pub use rendering::{
    screen_to_ndc, AnimationClip, AnimationPlayer, BoundsRayCaster, Keyframe, ObjectDesc,
    ObjectId, ObjectIdAllocator, ObjectKind, Observer, Ray, RayHit, RayIntersector,
    RenderableProvider, SceneGraph, SceneObject, Transform, Viewport,
};
pub use scene::{
    DeclaredSceneHooks, NodeError, RuntimeServices, SceneContext, SceneController, SceneError,
    SceneHooks, ScenePhase,
};
pub use scroll::{ScrollSequencer, ScrollSnapshot};
pub use stage::{FrameReport, Stage};
pub use timeline::{ScrubMode, ScrubbedTimeline, TimelineScrubber};
pub use tree::{
    Capabilities, ComponentNode, ComponentTree, FlatEntry, FlatTree, Gesture, LifecycleHook,
    NodePhase, TreeError,
};
pub use visibility::{VisibilityChange, VisibilityTracker, VisibilityWindow};
