/// Runtime configuration for the booking system.
///
/// Loaded once at startup from an optional `turnos.toml` file and
/// `TURNOS_*` environment variables, then handed to the [`crate::Agenda`]
/// constructor.

use chrono::NaiveTime;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::AgendaError;

pub const DEFAULT_CONFIG_FILE: &str = "turnos";
pub const ENV_PREFIX: &str = "TURNOS";

/// Upper bound on the cancellation lookback window (about a century).
pub const MAX_LOOKBACK_DAYS: i64 = 36_600;

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "turnos=info"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgendaConfig {
    /// Opening time, `HH:MM`.
    pub business_start: String,
    /// Last bookable slot start, `HH:MM` (inclusive).
    pub business_end: String,
    pub slot_minutes: u32,
    /// Cancellations inside the lookback window that disable a persona.
    pub max_cancellations: u32,
    pub lookback_days: i64,
    pub max_age_years: u32,
    pub database_path: String,
}

impl Default for AgendaConfig {
    fn default() -> Self {
        AgendaConfig {
            business_start: "09:00".to_string(),
            business_end: "17:00".to_string(),
            slot_minutes: 30,
            max_cancellations: 5,
            lookback_days: 180,
            max_age_years: 120,
            database_path: "turnos.db".to_string(),
        }
    }
}

impl AgendaConfig {
    /// Load `turnos.toml` (if present) overlaid with `TURNOS_*` variables.
    pub fn load() -> Result<Self, AgendaError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    pub fn load_from(file: &str) -> Result<Self, AgendaError> {
        let settings = Config::builder()
            .add_source(File::with_name(file).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AgendaError> {
        let opening = self.opening()?;
        let closing = self.closing()?;
        if opening >= closing {
            return Err(AgendaError::Config(format!(
                "business_start {} must be before business_end {}",
                self.business_start, self.business_end
            )));
        }
        if self.slot_minutes == 0 {
            return Err(AgendaError::Config(
                "slot_minutes must be positive".to_string(),
            ));
        }
        if i64::from(self.slot_minutes) > (closing - opening).num_minutes() {
            return Err(AgendaError::Config(
                "slot_minutes is longer than the business day".to_string(),
            ));
        }
        if self.max_cancellations == 0 {
            return Err(AgendaError::Config(
                "max_cancellations must be at least 1".to_string(),
            ));
        }
        if !(0..=MAX_LOOKBACK_DAYS).contains(&self.lookback_days) {
            return Err(AgendaError::Config(format!(
                "lookback_days must be between 0 and {MAX_LOOKBACK_DAYS}, got {}",
                self.lookback_days
            )));
        }
        if self.max_age_years == 0 {
            return Err(AgendaError::Config(
                "max_age_years must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn opening(&self) -> Result<NaiveTime, AgendaError> {
        parse_hours("business_start", &self.business_start)
    }

    pub fn closing(&self) -> Result<NaiveTime, AgendaError> {
        parse_hours("business_end", &self.business_end)
    }
}

fn parse_hours(field: &str, value: &str) -> Result<NaiveTime, AgendaError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| AgendaError::Config(format!("{field} must be HH:MM, got '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_business_rules() {
        let config = AgendaConfig::default();
        assert_eq!(config.slot_minutes, 30);
        assert_eq!(config.max_cancellations, 5);
        assert_eq!(config.lookback_days, 180);
        assert_eq!(config.max_age_years, 120);
        assert!(config.validate().is_ok());
        assert_eq!(config.opening().unwrap(), NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(config.closing().unwrap(), NaiveTime::from_hms_opt(17, 0, 0).unwrap());
    }

    #[test]
    fn lookback_days_is_bounded() {
        for lookback_days in [-1, MAX_LOOKBACK_DAYS + 1, 5_000_000_000] {
            let config = AgendaConfig {
                lookback_days,
                ..AgendaConfig::default()
            };
            assert!(matches!(config.validate(), Err(AgendaError::Config(_))));
        }
        let config = AgendaConfig {
            lookback_days: MAX_LOOKBACK_DAYS,
            ..AgendaConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_inverted_hours() {
        let config = AgendaConfig {
            business_start: "18:00".to_string(),
            ..AgendaConfig::default()
        };
        assert!(matches!(config.validate(), Err(AgendaError::Config(_))));
    }

    #[test]
    fn rejects_malformed_hours() {
        let config = AgendaConfig {
            business_end: "5pm".to_string(),
            ..AgendaConfig::default()
        };
        assert!(matches!(config.validate(), Err(AgendaError::Config(_))));
    }

    #[test]
    fn rejects_zero_slot_minutes() {
        let config = AgendaConfig {
            slot_minutes: 0,
            ..AgendaConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agenda.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "slot_minutes = 15").unwrap();
        writeln!(file, "business_end = \"12:00\"").unwrap();

        let stem = dir.path().join("agenda");
        let config = AgendaConfig::load_from(stem.to_str().unwrap()).unwrap();
        assert_eq!(config.slot_minutes, 15);
        assert_eq!(config.business_end, "12:00");
        assert_eq!(config.business_start, "09:00");
    }
}
