/// Daily slot grid for the booking calendar.
///
/// A single implicit resource works fixed business hours; the day is cut
/// into slots of equal length, each labelled by its start time.

use chrono::{Duration, NaiveTime, Timelike};
use std::collections::HashSet;

use crate::config::AgendaConfig;
use crate::error::AgendaError;
use crate::models::HORA_FORMAT;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotGrid {
    opening: NaiveTime,
    closing: NaiveTime,
    slot_minutes: u32,
}

impl SlotGrid {
    pub fn new(opening: NaiveTime, closing: NaiveTime, slot_minutes: u32) -> Result<Self, AgendaError> {
        if slot_minutes == 0 {
            return Err(AgendaError::Config("Slot duration must be positive".to_string()));
        }
        if closing < opening {
            return Err(AgendaError::Config(
                "Business hours must end after they start".to_string(),
            ));
        }
        Ok(SlotGrid {
            opening,
            closing,
            slot_minutes,
        })
    }

    pub fn from_config(config: &AgendaConfig) -> Result<Self, AgendaError> {
        Self::new(config.opening()?, config.closing()?, config.slot_minutes)
    }

    /// Every slot start from opening to closing inclusive, ascending.
    pub fn slots(&self) -> Vec<NaiveTime> {
        let step = Duration::minutes(i64::from(self.slot_minutes));
        let mut slots = Vec::new();
        let mut current = self.opening;

        while current <= self.closing {
            slots.push(current);
            let (next, wrapped) = current.overflowing_add_signed(step);
            // Stepping past midnight would restart the day.
            if wrapped != 0 {
                break;
            }
            current = next;
        }

        slots
    }

    pub fn labels(&self) -> Vec<String> {
        self.slots()
            .iter()
            .map(|slot| slot.format(HORA_FORMAT).to_string())
            .collect()
    }

    /// Within business hours and aligned to the granularity.
    pub fn contains(&self, hora: NaiveTime) -> bool {
        if hora < self.opening || hora > self.closing || hora.nanosecond() != 0 || hora.second() != 0 {
            return false;
        }
        let offset = (hora - self.opening).num_minutes();
        offset % i64::from(self.slot_minutes) == 0
    }

    /// The grid minus `occupied`, keeping grid order.
    pub fn available(&self, occupied: &HashSet<NaiveTime>) -> Vec<NaiveTime> {
        self.slots()
            .into_iter()
            .filter(|slot| !occupied.contains(slot))
            .collect()
    }
}

impl std::fmt::Display for SlotGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SlotGrid({}-{}, every {} min)",
            self.opening.format(HORA_FORMAT),
            self.closing.format(HORA_FORMAT),
            self.slot_minutes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn default_grid() -> SlotGrid {
        SlotGrid::from_config(&AgendaConfig::default()).unwrap()
    }

    #[test]
    fn default_grid_is_nine_to_five_every_half_hour() {
        let labels = default_grid().labels();
        assert_eq!(labels.len(), 17);
        assert_eq!(labels.first().unwrap(), "09:00");
        assert_eq!(labels[1], "09:30");
        assert_eq!(labels.last().unwrap(), "17:00");
    }

    #[test]
    fn closing_off_grid_is_not_included() {
        let grid = SlotGrid::new(t(9, 0), t(10, 15), 30).unwrap();
        assert_eq!(grid.labels(), vec!["09:00", "09:30", "10:00"]);
    }

    #[test]
    fn grid_near_midnight_stops() {
        let grid = SlotGrid::new(t(23, 0), t(23, 59), 30).unwrap();
        assert_eq!(grid.labels(), vec!["23:00", "23:30"]);
    }

    #[test]
    fn contains_checks_hours_and_alignment() {
        let grid = default_grid();
        assert!(grid.contains(t(9, 0)));
        assert!(grid.contains(t(17, 0)));
        assert!(!grid.contains(t(8, 30)));
        assert!(!grid.contains(t(17, 30)));
        assert!(!grid.contains(t(10, 15)));
    }

    #[test]
    fn available_is_plain_difference() {
        let grid = default_grid();
        let occupied: HashSet<NaiveTime> = [t(10, 0), t(10, 30)].into_iter().collect();
        let available = grid.available(&occupied);

        assert_eq!(available.len(), 15);
        assert!(!available.contains(&t(10, 0)));
        assert!(!available.contains(&t(10, 30)));
        assert!(available.contains(&t(9, 30)));
        assert!(available.contains(&t(11, 0)));
        assert!(available.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn zero_minutes_rejected() {
        assert!(SlotGrid::new(t(9, 0), t(17, 0), 0).is_err());
    }
}
