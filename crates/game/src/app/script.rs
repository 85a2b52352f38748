use std::fs;
use std::path::Path;

use ascent_engine::{InputScript, StartupError};
use tracing::info;

pub(crate) fn load_session(path: &Path) -> Result<InputScript, StartupError> {
    let raw = fs::read_to_string(path).map_err(|source| StartupError::ReadSession {
        path: path.to_path_buf(),
        source,
    })?;
    let script = parse_session(path, &raw)?;
    info!(
        path = %path.display(),
        events = script.events.len(),
        duration_ms = script.duration_ms,
        "session_loaded"
    );
    Ok(script)
}

fn parse_session(path: &Path, raw: &str) -> Result<InputScript, StartupError> {
    let deserializer = &mut serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize(deserializer).map_err(|err| StartupError::InvalidSession {
        path: path.to_path_buf(),
        field: err.path().to_string(),
        message: err.inner().to_string(),
    })
}
