/// Entry point wiring configuration, storage and the clock together.
///
/// Build one [`Agenda`] at startup and reach the two components through
/// [`Agenda::personas`] and [`Agenda::turnos`].

use chrono::{Local, NaiveDate};
use std::path::Path;

use crate::calendar::SlotGrid;
use crate::config::AgendaConfig;
use crate::db::Database;
use crate::error::AgendaError;
use crate::registry::PersonRegistry;
use crate::scheduler::AppointmentEngine;

/// Source of "today" for every date rule.
pub trait Clock {
    fn today(&self) -> NaiveDate;
}

/// Local calendar date of the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Always the same date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

pub struct Agenda {
    db: Database,
    config: AgendaConfig,
    grid: SlotGrid,
    clock: Box<dyn Clock>,
}

impl Agenda {
    pub fn new(db: Database, config: AgendaConfig) -> Result<Self, AgendaError> {
        Self::with_clock(db, config, SystemClock)
    }

    pub fn with_clock(
        db: Database,
        config: AgendaConfig,
        clock: impl Clock + 'static,
    ) -> Result<Self, AgendaError> {
        config.validate()?;
        let grid = SlotGrid::from_config(&config)?;
        Ok(Agenda {
            db,
            config,
            grid,
            clock: Box::new(clock),
        })
    }

    /// Open the database file named in `config`.
    pub fn open(config: AgendaConfig) -> Result<Self, AgendaError> {
        let db = Database::open(Path::new(&config.database_path))?;
        Self::new(db, config)
    }

    pub fn personas(&mut self) -> PersonRegistry<'_> {
        let today = self.clock.today();
        PersonRegistry::new(&mut self.db, &self.config, today)
    }

    pub fn turnos(&mut self) -> AppointmentEngine<'_> {
        let today = self.clock.today();
        AppointmentEngine::new(&mut self.db, &self.config, &self.grid, today)
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn config(&self) -> &AgendaConfig {
        &self.config
    }

    pub fn grid(&self) -> &SlotGrid {
        &self.grid
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl std::fmt::Display for Agenda {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Agenda({}, today={})", self.grid, self.today())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_is_rejected() {
        let config = AgendaConfig {
            slot_minutes: 0,
            ..AgendaConfig::default()
        };
        let result = Agenda::new(Database::open_in_memory().unwrap(), config);
        assert!(matches!(result, Err(AgendaError::Config(_))));
    }

    #[test]
    fn fixed_clock_drives_today() {
        let day = NaiveDate::from_ymd_opt(2031, 7, 1).unwrap();
        let agenda = Agenda::with_clock(
            Database::open_in_memory().unwrap(),
            AgendaConfig::default(),
            FixedClock(day),
        )
        .unwrap();
        assert_eq!(agenda.today(), day);
        assert_eq!(agenda.to_string(), "Agenda(SlotGrid(09:00-17:00, every 30 min), today=2031-07-01)");
    }
}
