use std::env;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ConfigurationError;
use crate::{ContentPipelineError, StartupError};

use super::component::SceneSignal;
use super::input::InputEvent;
use super::metrics::{LoopMetricsSnapshot, MetricsAccumulator, MetricsHandle};
use super::scene::SceneError;
use super::scroll::ScrollSnapshot;
use super::stage::Stage;

pub const FRAME_INTERVAL_ENV_VAR: &str = "ASCENT_FRAME_MS";

const DEFAULT_SETTLE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub target_tps: u32,
    /// Host frame length the session is replayed at.
    pub frame_interval: Duration,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
    /// Sleep out the remainder of each host frame instead of replaying as
    /// fast as possible.
    pub pace_real_time: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 60,
            frame_interval: Duration::from_micros(16_667),
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            pace_real_time: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("failed to load content: {0}")]
    ContentPipeline(#[from] ContentPipelineError),
    #[error("invalid runtime configuration: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("scene runtime failed: {0}")]
    Scene(#[from] SceneError),
}

/// One scripted input, delivered on the first tick at or after `at_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TimedInput {
    pub at_ms: u64,
    #[serde(flatten)]
    pub event: InputEvent,
}

impl TimedInput {
    pub fn at(&self) -> Duration {
        Duration::from_millis(self.at_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputScript {
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub events: Vec<TimedInput>,
}

impl InputScript {
    /// Simulated time the session runs for. Without an explicit duration the
    /// session ends one second after the last event.
    pub fn end(&self) -> Duration {
        match self.duration_ms {
            Some(ms) => Duration::from_millis(ms),
            None => self
                .events
                .iter()
                .map(TimedInput::at)
                .max()
                .unwrap_or_default()
                .saturating_add(DEFAULT_SETTLE),
        }
    }

    fn ordered(&self) -> Vec<TimedInput> {
        let mut events = self.events.clone();
        events.sort_by_key(|event| event.at_ms);
        events
    }
}

/// Receives each tick's signals while the stage can still be mutated, e.g.
/// to switch scenes.
pub trait SessionObserver {
    fn on_signals(&mut self, stage: &mut Stage, signals: &[SceneSignal])
        -> Result<(), SceneError>;
}

impl<F> SessionObserver for F
where
    F: FnMut(&mut Stage, &[SceneSignal]) -> Result<(), SceneError>,
{
    fn on_signals(
        &mut self,
        stage: &mut Stage,
        signals: &[SceneSignal],
    ) -> Result<(), SceneError> {
        self(stage, signals)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionReport {
    pub frames: u64,
    pub ticks: u64,
    pub input_events: u64,
    pub dropped_backlog_ms: u64,
    pub final_scene: Option<String>,
    pub final_scroll: ScrollSnapshot,
    pub metrics: LoopMetricsSnapshot,
    pub signals: Vec<SceneSignal>,
}

impl SessionReport {
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

pub fn run_session(
    config: &LoopConfig,
    stage: &mut Stage,
    script: &InputScript,
    observer: &mut dyn SessionObserver,
) -> Result<SessionReport, AppError> {
    let metrics_handle = MetricsHandle::default();
    run_session_with_metrics(config, stage, script, observer, &metrics_handle)
}

/// Replays `script` against `stage` with a fixed simulation step. Host
/// frames are simulated; `pace_real_time` only adds sleeping.
pub fn run_session_with_metrics(
    config: &LoopConfig,
    stage: &mut Stage,
    script: &InputScript,
    observer: &mut dyn SessionObserver,
    metrics_handle: &MetricsHandle,
) -> Result<SessionReport, AppError> {
    let target_tps = config.target_tps.max(1);
    let fixed_dt = Duration::from_secs_f64(1.0 / target_tps as f64);
    let max_frame_delta =
        normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    let frame_interval = normalize_non_zero_duration(
        resolve_frame_interval(config.frame_interval),
        fixed_dt,
    );

    let events = script.ordered();
    let end = script.end();
    info!(
        target_tps,
        frame_interval_ms = frame_interval.as_secs_f64() * 1000.0,
        max_ticks_per_frame,
        scripted_events = events.len(),
        end_ms = end.as_millis() as u64,
        pace_real_time = config.pace_real_time,
        "session_start"
    );

    let base = Instant::now();
    let mut metrics = MetricsAccumulator::starting_at(base, metrics_log_interval);
    let mut report = SessionReport::default();
    let mut host_time = Duration::ZERO;
    let mut sim_time = Duration::ZERO;
    let mut accumulator = Duration::ZERO;
    let mut next_event = 0usize;

    while sim_time < end {
        let frame_start = Instant::now();
        let frame_dt = clamp_frame_delta(frame_interval, max_frame_delta);
        host_time = host_time.saturating_add(frame_interval);
        accumulator = accumulator.saturating_add(frame_dt);

        let plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
        accumulator = plan.remaining_accumulator;
        if !plan.dropped_backlog.is_zero() {
            let dropped_ms = plan.dropped_backlog.as_millis() as u64;
            report.dropped_backlog_ms = report.dropped_backlog_ms.saturating_add(dropped_ms);
            warn!(dropped_ms, "sim_backlog_dropped");
        }

        for _ in 0..plan.ticks_to_run {
            sim_time = sim_time.saturating_add(fixed_dt);
            while let Some(input) = events.get(next_event) {
                if input.at() > sim_time {
                    break;
                }
                stage.push_input(input.event);
                next_event += 1;
            }

            let frame = stage.frame(fixed_dt)?;
            metrics.record_tick();
            metrics.record_input(frame.input_events);
            report.ticks = report.ticks.saturating_add(1);
            report.input_events = report
                .input_events
                .saturating_add(frame.input_events as u64);

            if !frame.signals.is_empty() {
                for signal in &frame.signals {
                    debug!(scene = %signal.scene, node = ?signal.node, kind = ?signal.kind, "signal");
                }
                observer.on_signals(stage, &frame.signals)?;
                report.signals.extend(frame.signals);
            }
        }

        metrics.record_frame(frame_dt);
        report.frames = report.frames.saturating_add(1);
        if let Some(snapshot) = metrics.maybe_snapshot(base + host_time) {
            metrics_handle.publish(snapshot);
            report.metrics = snapshot;
            info!(
                fps = snapshot.fps,
                tps = snapshot.tps,
                frame_time_ms = snapshot.frame_time_ms,
                input_events = snapshot.input_events,
                "loop_metrics"
            );
        }

        if config.pace_real_time {
            let sleep = compute_pacing_sleep(frame_start.elapsed(), frame_interval);
            if !sleep.is_zero() {
                thread::sleep(sleep);
            }
        }
    }

    report.final_scene = stage.active().map(|scene| scene.name().to_string());
    report.final_scroll = stage.scroll();
    info!(
        frames = report.frames,
        ticks = report.ticks,
        input_events = report.input_events,
        signals = report.signals.len(),
        "session_finished"
    );
    Ok(report)
}

struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    let dropped_backlog = if accumulator >= fixed_dt {
        std::mem::take(&mut accumulator)
    } else {
        Duration::ZERO
    };
    StepPlan {
        ticks_to_run,
        remaining_accumulator: accumulator,
        dropped_backlog,
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn compute_pacing_sleep(elapsed: Duration, frame_interval: Duration) -> Duration {
    frame_interval.saturating_sub(elapsed)
}

fn resolve_frame_interval(configured: Duration) -> Duration {
    match env::var(FRAME_INTERVAL_ENV_VAR) {
        Ok(value) => parse_frame_interval(&value).unwrap_or_else(|| {
            warn!(
                env_var = FRAME_INTERVAL_ENV_VAR,
                value = value.as_str(),
                "invalid frame interval env var value; falling back to config"
            );
            configured
        }),
        Err(env::VarError::NotPresent) => configured,
        Err(err) => {
            warn!(
                env_var = FRAME_INTERVAL_ENV_VAR,
                error = %err,
                "unable to read frame interval env var; falling back to config"
            );
            configured
        }
    }
}

fn parse_frame_interval(value: &str) -> Option<Duration> {
    let ms = value.trim().parse::<f64>().ok()?;
    (ms.is_finite() && ms > 0.0).then(|| Duration::from_secs_f64(ms / 1000.0))
}
