use std::process::ExitCode;

use ascent_engine::{run_session, AppError, HeadlessAudioBackend, SessionReport, Stage};
use tracing::{error, info};

use super::bootstrap::AppWiring;
use super::navigation::Navigator;

pub(crate) fn run(app: AppWiring) -> ExitCode {
    match run_inner(&app) {
        Ok(report) => match report.to_pretty_json() {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                error!(error = %err, "report_serialize_failed");
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            error!(error = %err, "session_failed");
            ExitCode::FAILURE
        }
    }
}

fn run_inner(app: &AppWiring) -> Result<SessionReport, AppError> {
    let mut stage = Stage::new(app.runtime.clone(), Box::new(HeadlessAudioBackend::new()))?;
    let mut navigator = Navigator::new(&app.content, app.runtime.clone());
    navigator.enter(&mut stage, &app.entry_scene)?;

    let result = run_session(&app.loop_config, &mut stage, &app.script, &mut navigator);
    stage.shutdown();
    let report = result?;
    info!(
        frames = report.frames,
        signals = report.signals.len(),
        scenes_visited = navigator.visited().len(),
        "session_complete"
    );
    Ok(report)
}
