use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::AppPaths;

use super::compiler::{compile_content, ContentCompileError};
use super::database::ContentDatabase;

#[derive(Debug, Error)]
pub enum ContentPipelineError {
    #[error(transparent)]
    Compile(#[from] ContentCompileError),
    #[error("no scenes were declared under {dir}")]
    NoScenes { dir: PathBuf },
}

/// Compiles the project's content directory. A database without scenes is
/// rejected since nothing could be entered.
pub fn load_content(app_paths: &AppPaths) -> Result<ContentDatabase, ContentPipelineError> {
    let database = match compile_content(&app_paths.content_dir) {
        Ok(database) => database,
        Err(err) => {
            warn!(
                code = ?err.code,
                file = %err.file_path.display(),
                line = err.location.map(|loc| loc.line),
                column = err.location.map(|loc| loc.column),
                "content_compile_failed"
            );
            return Err(err.into());
        }
    };
    if database.scenes().is_empty() {
        return Err(ContentPipelineError::NoScenes {
            dir: app_paths.content_dir.clone(),
        });
    }
    info!(
        content_dir = %app_paths.content_dir.display(),
        templates = database.library().len(),
        scenes = database.scenes().len(),
        "content_loaded"
    );
    Ok(database)
}
