use ascent_engine::{
    ContentDatabase, RuntimeConfig, SceneError, SceneSignal, SessionObserver, SignalKind, Stage,
};
use tracing::{info, warn};

const SCENE_PREFIX: &str = "scene:";
const RELEASE_AUDIO_PREFIX: &str = "release_audio:";

/// Reacts to custom signals: `scene:<name>` enters another scene and
/// `release_audio:<name>` drops a persistent sound.
pub(crate) struct Navigator<'a> {
    content: &'a ContentDatabase,
    config: RuntimeConfig,
    visited: Vec<String>,
}

impl<'a> Navigator<'a> {
    pub(crate) fn new(content: &'a ContentDatabase, config: RuntimeConfig) -> Self {
        Self {
            content,
            config,
            visited: Vec::new(),
        }
    }

    pub(crate) fn enter(&mut self, stage: &mut Stage, name: &str) -> Result<(), SceneError> {
        let Some(built) = self.content.build_scene(name, &self.config) else {
            warn!(scene = name, "scene_unknown");
            return Ok(());
        };
        stage.enter(built?)?;
        self.visited.push(name.to_string());
        info!(scene = name, visits = self.visited.len(), "scene_entered");
        Ok(())
    }

    pub(crate) fn visited(&self) -> &[String] {
        &self.visited
    }
}

impl SessionObserver for Navigator<'_> {
    fn on_signals(&mut self, stage: &mut Stage, signals: &[SceneSignal]) -> Result<(), SceneError> {
        for signal in signals {
            let SignalKind::Custom { name, .. } = &signal.kind else {
                continue;
            };
            if let Some(target) = name.strip_prefix(SCENE_PREFIX) {
                self.enter(stage, target)?;
                // Later signals came from the scene that was just disposed.
                break;
            }
            if let Some(audio) = name.strip_prefix(RELEASE_AUDIO_PREFIX) {
                stage.remove_persistent_audio(audio);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use ascent_engine::{compile_content, HeadlessAudioBackend};
    use tempfile::TempDir;

    use super::*;

    fn content() -> (TempDir, ContentDatabase) {
        let temp = TempDir::new().expect("temp");
        fs::write(
            temp.path().join("scenes.xml"),
            r#"<Content>
                <Template id="marker"/>
                <Scene name="basecamp">
                    <Audio name="theme" src="theme.ogg" persist="true" autoplay="true"/>
                    <Node name="trail" content="marker"/>
                </Scene>
                <Scene name="icefall"><Node name="serac" content="marker"/></Scene>
            </Content>"#,
        )
        .expect("write");
        let db = compile_content(temp.path()).expect("compile");
        (temp, db)
    }

    fn custom(name: &str) -> SceneSignal {
        SceneSignal {
            scene: "basecamp".to_string(),
            node: Some("trail".to_string()),
            kind: SignalKind::Custom {
                name: name.to_string(),
                payload: None,
            },
        }
    }

    fn stage() -> Stage {
        Stage::new(
            RuntimeConfig::default(),
            Box::new(HeadlessAudioBackend::new()),
        )
        .expect("stage")
    }

    #[test]
    fn scene_signal_switches_scene_and_keeps_persistent_audio() {
        let (_temp, db) = content();
        let mut stage = stage();
        let mut navigator = Navigator::new(&db, RuntimeConfig::default());
        navigator.enter(&mut stage, "basecamp").expect("enter");

        navigator
            .on_signals(&mut stage, &[custom("scene:icefall")])
            .expect("switch");
        assert_eq!(stage.active().map(|scene| scene.name()), Some("icefall"));
        assert_eq!(stage.audio().live_names(), vec!["theme"]);
        assert_eq!(navigator.visited(), ["basecamp", "icefall"]);

        navigator
            .on_signals(&mut stage, &[custom("release_audio:theme")])
            .expect("release");
        assert_eq!(stage.audio().live_count(), 0);
    }

    #[test]
    fn unknown_targets_and_other_signals_are_ignored() {
        let (_temp, db) = content();
        let mut stage = stage();
        let mut navigator = Navigator::new(&db, RuntimeConfig::default());
        navigator.enter(&mut stage, "basecamp").expect("enter");

        let clicked = SceneSignal {
            kind: SignalKind::Clicked,
            ..custom("unused")
        };
        navigator
            .on_signals(
                &mut stage,
                &[clicked, custom("open_modal"), custom("scene:summit")],
            )
            .expect("ignored");
        assert_eq!(stage.active().map(|scene| scene.name()), Some("basecamp"));
        assert_eq!(navigator.visited(), ["basecamp"]);
    }
}
