//! Planner configuration.
//!
//! Safety margins in the generated schedule (the inter-trigger latch delay,
//! the extra-top-slice threshold) are tunable configuration rather than
//! hard-coded constants. Settings are resolved through figment in three
//! layers: built-in defaults, an optional TOML file, and `SIM_SEQ_`-prefixed
//! environment variables, with later layers overriding earlier ones.
//!
//! Parse failures are distinguished from semantic validation failures: a
//! value that parses but is logically invalid (a non-finite threshold, say)
//! is caught by [`PlannerSettings::validate`].

use std::path::Path;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{SeqResult, SequencerError};
use crate::time::Time;

/// Tunable scheduling margins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerSettings {
    /// Fixed wait inserted after each per-step exposure so pattern-generator
    /// hardware can latch before the next digital trigger.
    pub inter_trigger_delay: Time,
    /// Imaging volume heights above this threshold (stage units) get one
    /// extra Z slice so the top of the volume is captured.
    pub extra_slice_threshold: f64,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            // Matches the margin observed on deployed systems.
            inter_trigger_delay: Time::from_millis(5),
            extra_slice_threshold: 1e-6,
        }
    }
}

impl PlannerSettings {
    /// Resolves settings from defaults, an optional TOML file, and
    /// environment overrides.
    pub fn new(config_path: Option<&Path>) -> SeqResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(PlannerSettings::default()));
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        let settings: PlannerSettings = figment
            .merge(Env::prefixed("SIM_SEQ_"))
            .extract()
            .map_err(|err| SequencerError::Configuration(format!("settings: {err}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Semantic validation of values that parsed successfully.
    pub fn validate(&self) -> SeqResult<()> {
        if !self.extra_slice_threshold.is_finite() || self.extra_slice_threshold < 0.0 {
            return Err(SequencerError::Configuration(format!(
                "extra_slice_threshold must be finite and non-negative, got {}",
                self.extra_slice_threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = PlannerSettings::new(None).unwrap();
        assert_eq!(settings.inter_trigger_delay, Time::from_millis(5));
        assert_eq!(settings.extra_slice_threshold, 1e-6);
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, "inter_trigger_delay = \"2.5\"").unwrap();
        file.flush().unwrap();

        let settings = PlannerSettings::new(Some(file.path())).unwrap();
        assert_eq!(settings.inter_trigger_delay, Time::from_micros(2_500));
        // Untouched keys keep their defaults.
        assert_eq!(settings.extra_slice_threshold, 1e-6);
    }

    #[test]
    fn test_validation_rejects_bad_threshold() {
        let settings = PlannerSettings {
            inter_trigger_delay: Time::ZERO,
            extra_slice_threshold: -1.0,
        };
        assert!(matches!(
            settings.validate(),
            Err(SequencerError::Configuration(_))
        ));
    }
}
