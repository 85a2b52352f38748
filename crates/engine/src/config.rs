use std::env;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

pub const SCROLL_SENSITIVITY_ENV_VAR: &str = "ASCENT_SCROLL_SENSITIVITY";
pub const SCROLL_SMOOTHING_ENV_VAR: &str = "ASCENT_SCROLL_SMOOTHING";

pub const DEFAULT_SCROLL_SENSITIVITY: f32 = 0.005;
pub const DEFAULT_SCROLL_SMOOTHING: f32 = 0.1;
pub const DEFAULT_HOLD_DURATION: Duration = Duration::from_millis(1000);
pub const DEFAULT_HOLD_RELEASE_DURATION: Duration = Duration::from_millis(1000);
pub const DEFAULT_OBSERVER_DAMPING: f32 = 0.1;
pub const DEFAULT_PARALLAX_STRENGTH: f32 = 0.0025;
pub const DEFAULT_TIMELINE_SPAN: f32 = 100.0 / 3.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("hold duration must be greater than zero")]
    NonPositiveHoldDuration,
    #[error("visibility window start {start} is after end {end}")]
    InvertedVisibilityWindow { start: f32, end: f32 },
    #[error("{field} must be finite, got {value}")]
    NonFinite { field: &'static str, value: f32 },
    #[error("{field} must be in (0, 1], got {value}")]
    FactorOutOfRange { field: &'static str, value: f32 },
    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: f32 },
    #[error("audio volume {value} is outside 0..=1")]
    VolumeOutOfRange { value: f32 },
    #[error("audio reference distance must be positive, got {value}")]
    NonPositiveRefDistance { value: f32 },
    #[error("timeline span must be positive, got {value}")]
    NonPositiveTimelineSpan { value: f32 },
    #[error("node '{node}' is misconfigured: {reason}")]
    InvalidNode {
        node: String,
        #[source]
        reason: Box<ConfigurationError>,
    },
}

impl ConfigurationError {
    pub fn for_node(self, node: impl Into<String>) -> Self {
        Self::InvalidNode {
            node: node.into(),
            reason: Box::new(self),
        }
    }
}

pub(crate) fn require_finite(field: &'static str, value: f32) -> Result<f32, ConfigurationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigurationError::NonFinite { field, value })
    }
}

pub(crate) fn require_factor(field: &'static str, value: f32) -> Result<f32, ConfigurationError> {
    let value = require_finite(field, value)?;
    if value > 0.0 && value <= 1.0 {
        Ok(value)
    } else {
        Err(ConfigurationError::FactorOutOfRange { field, value })
    }
}

pub(crate) fn require_non_negative(
    field: &'static str,
    value: f32,
) -> Result<f32, ConfigurationError> {
    let value = require_finite(field, value)?;
    if value < 0.0 {
        Err(ConfigurationError::Negative { field, value })
    } else {
        Ok(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub scroll_sensitivity: f32,
    pub scroll_smoothing: f32,
    pub default_hold_duration: Duration,
    pub hold_release_duration: Duration,
    pub observer_damping: f32,
    pub parallax_strength: f32,
    pub timeline_span: f32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            scroll_sensitivity: DEFAULT_SCROLL_SENSITIVITY,
            scroll_smoothing: DEFAULT_SCROLL_SMOOTHING,
            default_hold_duration: DEFAULT_HOLD_DURATION,
            hold_release_duration: DEFAULT_HOLD_RELEASE_DURATION,
            observer_damping: DEFAULT_OBSERVER_DAMPING,
            parallax_strength: DEFAULT_PARALLAX_STRENGTH,
            timeline_span: DEFAULT_TIMELINE_SPAN,
        }
    }
}

impl RuntimeConfig {
    /// Defaults with the scroll tuning overridable from the environment.
    /// Unparseable or out-of-range values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.scroll_sensitivity = resolve_env_f32(
            SCROLL_SENSITIVITY_ENV_VAR,
            config.scroll_sensitivity,
            |value| require_non_negative("scroll_sensitivity", value),
        );
        config.scroll_smoothing = resolve_env_f32(
            SCROLL_SMOOTHING_ENV_VAR,
            config.scroll_smoothing,
            |value| require_factor("scroll_smoothing", value),
        );
        config
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        require_non_negative("scroll_sensitivity", self.scroll_sensitivity)?;
        require_factor("scroll_smoothing", self.scroll_smoothing)?;
        require_factor("observer_damping", self.observer_damping)?;
        require_finite("parallax_strength", self.parallax_strength)?;
        if self.default_hold_duration.is_zero() {
            return Err(ConfigurationError::NonPositiveHoldDuration);
        }
        let span = require_finite("timeline_span", self.timeline_span)?;
        if span <= 0.0 {
            return Err(ConfigurationError::NonPositiveTimelineSpan { value: span });
        }
        Ok(())
    }
}

fn resolve_env_f32(
    var: &'static str,
    default: f32,
    check: impl Fn(f32) -> Result<f32, ConfigurationError>,
) -> f32 {
    match env::var(var) {
        Ok(raw) => parse_override(var, &raw, default, check),
        Err(env::VarError::NotPresent) => default,
        Err(env::VarError::NotUnicode(_)) => {
            warn!(var, default, "config_env_not_unicode");
            default
        }
    }
}

fn parse_override(
    var: &'static str,
    raw: &str,
    default: f32,
    check: impl Fn(f32) -> Result<f32, ConfigurationError>,
) -> f32 {
    match raw.trim().parse::<f32>() {
        Ok(parsed) => match check(parsed) {
            Ok(value) => value,
            Err(error) => {
                warn!(var, value = raw, error = %error, default, "config_env_out_of_range");
                default
            }
        },
        Err(_) => {
            warn!(var, value = raw, default, "config_env_parse_failed");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        RuntimeConfig::default()
            .validate()
            .expect("defaults should validate");
    }

    #[test]
    fn zero_hold_duration_is_rejected() {
        let config = RuntimeConfig {
            default_hold_duration: Duration::ZERO,
            ..RuntimeConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::NonPositiveHoldDuration)
        );
    }

    #[test]
    fn smoothing_outside_unit_interval_is_rejected() {
        let config = RuntimeConfig {
            scroll_smoothing: 1.5,
            ..RuntimeConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::FactorOutOfRange {
                field: "scroll_smoothing",
                ..
            })
        ));
    }

    #[test]
    fn override_parse_falls_back_on_garbage() {
        let value = parse_override("TEST_VAR", "fast", 0.1, |v| require_factor("test", v));
        assert_eq!(value, 0.1);
    }

    #[test]
    fn override_parse_falls_back_on_out_of_range() {
        let value = parse_override("TEST_VAR", "0", 0.1, |v| require_factor("test", v));
        assert_eq!(value, 0.1);
    }

    #[test]
    fn override_parse_accepts_trimmed_value() {
        let value = parse_override("TEST_VAR", " 0.25 ", 0.1, |v| require_factor("test", v));
        assert_eq!(value, 0.25);
    }

    #[test]
    fn node_errors_keep_their_reason() {
        let error = ConfigurationError::NonPositiveHoldDuration.for_node("tent");
        assert_eq!(
            error.to_string(),
            "node 'tent' is misconfigured: hold duration must be greater than zero"
        );
    }
}
