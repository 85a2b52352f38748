use std::env;

use ascent_engine::{
    load_content, resolve_app_paths, AppError, AppPaths, ContentDatabase, InputScript,
    LoopConfig, RuntimeConfig,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::script::load_session;

const ENTRY_SCENE_ENV_VAR: &str = "ASCENT_ENTRY_SCENE";
const DEFAULT_SESSION: &str = "tour";

pub(crate) struct AppWiring {
    pub(crate) loop_config: LoopConfig,
    pub(crate) runtime: RuntimeConfig,
    pub(crate) content: ContentDatabase,
    pub(crate) entry_scene: String,
    pub(crate) script: InputScript,
}

/// Usage: `ascent [session]`. The session is a name under
/// `assets/sessions/` or a path to a JSON script.
pub(crate) fn build_app() -> Result<AppWiring, AppError> {
    init_tracing();
    info!("=== Ascent Startup ===");

    let paths = resolve_app_paths()?;
    let content = load_content(&paths)?;
    let session = env::args().nth(1).unwrap_or_else(|| DEFAULT_SESSION.to_string());
    let script = load_session(&paths.session_path(&session))?;
    let entry_scene = resolve_entry_scene(&content, env::var(ENTRY_SCENE_ENV_VAR).ok());
    log_paths(&paths, &session, &entry_scene);

    Ok(AppWiring {
        loop_config: LoopConfig::default(),
        runtime: RuntimeConfig::from_env(),
        content,
        entry_scene,
        script,
    })
}

/// Falls back to the first declared scene when the override is unset or
/// names nothing.
fn resolve_entry_scene(content: &ContentDatabase, requested: Option<String>) -> String {
    let first = content.scene_names().next().unwrap_or_default().to_string();
    match requested.map(|raw| raw.trim().to_string()) {
        Some(name) if content.scene(&name).is_some() => name,
        Some(name) if !name.is_empty() => {
            tracing::warn!(requested = %name, fallback = %first, "entry_scene_unknown");
            first
        }
        _ => first,
    }
}

fn log_paths(paths: &AppPaths, session: &str, entry_scene: &str) {
    info!(
        root = %paths.root.display(),
        content_dir = %paths.content_dir.display(),
        session,
        entry_scene,
        "app_paths_resolved"
    );
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
