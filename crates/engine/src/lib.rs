use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod app;
pub mod config;
pub mod content;

pub use app::{
    run_session, run_session_with_metrics, AppError, AudioBackend, AudioDescriptor,
    Capabilities, ComponentNode, ComponentTree, DeclaredComponent, FrameReport,
    HeadlessAudioBackend, HoldProgress, HoldProgressHandle, InputEvent, InputScript, LoopConfig,
    LoopMetricsSnapshot, MetricsHandle, SceneController, SceneError, SceneSignal,
    SessionObserver, SessionReport, SignalKind, Stage, TimedInput, FRAME_INTERVAL_ENV_VAR,
};
pub use config::{ConfigurationError, RuntimeConfig};
pub use content::{
    compile_content, load_content, ContentCompileError, ContentDatabase, ContentErrorCode,
    ContentLibrary, ContentPipelineError, SceneDef, SourceLocation,
};

pub const ROOT_ENV_VAR: &str = "ASCENT_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub content_dir: PathBuf,
    pub sessions_dir: PathBuf,
}

impl AppPaths {
    pub fn from_root(root: PathBuf) -> Self {
        let assets = root.join("assets");
        Self {
            content_dir: assets.join("content"),
            sessions_dir: assets.join("sessions"),
            root,
        }
    }

    /// Resolves a session script name against `sessions_dir`. Paths with a
    /// separator or extension are taken as given.
    pub fn session_path(&self, name: &str) -> PathBuf {
        let candidate = Path::new(name);
        if candidate.components().count() > 1 || candidate.extension().is_some() {
            candidate.to_path_buf()
        } else {
            self.sessions_dir.join(format!("{name}.json"))
        }
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error(
        "ASCENT_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and assets/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and assets/.\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/ascent\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
    #[error("failed to read session script {path}: {source}")]
    ReadSession {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid session script {path} at {field}: {message}")]
    InvalidSession {
        path: PathBuf,
        field: String,
        message: String,
    },
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    resolve_root().map(AppPaths::from_root)
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let normalized = normalize_path(&PathBuf::from(value));
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            exe_dir
                .ancestors()
                .find(|candidate| is_repo_marker(candidate))
                .map(normalize_path)
                .ok_or_else(|| StartupError::RootNotFound {
                    start_dir: normalize_path(&exe_dir),
                    env_var: ROOT_ENV_VAR,
                })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn is_repo_marker(path: &Path) -> bool {
    path.join("Cargo.toml").is_file() && path.join("assets").is_dir()
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn repo_marker_requires_cargo_toml_and_assets() {
        let temp = TempDir::new().expect("temp");
        assert!(!is_repo_marker(temp.path()));
        fs::write(temp.path().join("Cargo.toml"), "[workspace]").expect("write");
        assert!(!is_repo_marker(temp.path()));
        fs::create_dir(temp.path().join("assets")).expect("mkdir");
        assert!(is_repo_marker(temp.path()));
    }

    #[test]
    fn session_path_resolves_bare_names_under_sessions_dir() {
        let paths = AppPaths::from_root(PathBuf::from("/srv/ascent"));
        assert_eq!(
            paths.session_path("tour"),
            PathBuf::from("/srv/ascent/assets/sessions/tour.json")
        );
        assert_eq!(
            paths.session_path("custom/run.json"),
            PathBuf::from("custom/run.json")
        );
    }
}
