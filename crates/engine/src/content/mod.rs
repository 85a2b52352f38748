mod compiler;
mod database;
mod discovery;
mod pipeline;
mod types;

pub use compiler::{compile_content, ContentCompileError, ContentErrorCode, SourceLocation};
pub use database::{ContentDatabase, ContentLibrary};
pub use pipeline::{load_content, ContentPipelineError};
pub use types::{
    AudioDef, CameraDef, NodeDef, Parallax, SceneDef, TemplateChildDef, TemplateDef, TimelineDef,
};
