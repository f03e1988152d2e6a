/// Appointment engine: booking, the turno state machine and the
/// cancellation policy.
///
/// Booking is two steps. The persona checks and the cancellation policy
/// run and commit first, so a policy-triggered disable survives even
/// though the booking is refused. The slot check and insert then run in a
/// second transaction, backed by the unique index on live
/// `(fecha, hora)` pairs.

use chrono::{NaiveDate, NaiveTime};
use rusqlite::Connection;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::calendar::SlotGrid;
use crate::config::AgendaConfig;
use crate::db::{turnos, Database};
use crate::error::AgendaError;
use crate::models::{Estado, NuevoTurno, SlotList, Turno, TurnoPatch, HORA_FORMAT};
use crate::registry::{load_persona, recent_cancellations, toggle_habilitado};
use crate::validation::{guard_modifiable, parse_date_strict, parse_time_strict, reject_past_date};

pub struct AppointmentEngine<'a> {
    db: &'a mut Database,
    config: &'a AgendaConfig,
    grid: &'a SlotGrid,
    today: NaiveDate,
}

impl<'a> AppointmentEngine<'a> {
    pub fn new(
        db: &'a mut Database,
        config: &'a AgendaConfig,
        grid: &'a SlotGrid,
        today: NaiveDate,
    ) -> Self {
        AppointmentEngine {
            db,
            config,
            grid,
            today,
        }
    }

    /// Book a slot for a persona.
    pub fn create(&mut self, data: NuevoTurno) -> Result<Turno, AgendaError> {
        let fecha = parse_date_strict(&data.fecha)?;
        let hora = parse_time_strict(&data.hora)?;
        let estado = data.estado.unwrap_or_default();
        if !estado.is_initial() {
            return Err(AgendaError::InvalidTransition {
                from: Estado::Pendiente.to_string(),
                to: estado.to_string(),
            });
        }

        let config = self.config;
        let today = self.today;
        let persona_id = data.persona_id;

        let triggered = self.db.transaction(|conn| {
            let persona = load_persona(conn, &persona_id)?;
            if !persona.habilitado {
                return Err(AgendaError::PersonaDisabled(persona.id));
            }
            apply_cancellation_policy(conn, config, &persona_id, today)
        })?;
        if triggered {
            return Err(AgendaError::PolicyViolation(format!(
                "persona has {} or more cancelled turnos in the last {} days and is now disabled",
                config.max_cancellations, config.lookback_days
            )));
        }

        reject_past_date(fecha, today)?;

        let grid = self.grid;
        let turno = self.db.transaction(|conn| {
            let available = open_slots(conn, grid, fecha, None)?;
            if !available.contains(&hora) {
                return Err(slot_unavailable(fecha, hora));
            }
            let turno = Turno::new(persona_id.clone(), fecha, hora, estado);
            turnos::insert_turno(conn, &turno)?;
            Ok(turno)
        })?;

        info!(turno_id = %turno.id, persona_id = %turno.persona_id, fecha = %turno.fecha, hora = %turno.hora_label(), "Turno booked");
        Ok(turno)
    }

    pub fn list(&mut self) -> Result<Vec<Turno>, AgendaError> {
        self.db.transaction(turnos::list_turnos)
    }

    pub fn list_for_persona(&mut self, persona_id: &str) -> Result<Vec<Turno>, AgendaError> {
        self.db.transaction(|conn| {
            load_persona(conn, persona_id)?;
            turnos::list_turnos_for_persona(conn, persona_id)
        })
    }

    pub fn get(&mut self, id: &str) -> Result<Turno, AgendaError> {
        self.db.transaction(|conn| load_turno(conn, id))
    }

    /// Edit date, time or state of a turno that is still modifiable.
    pub fn update(&mut self, id: &str, patch: TurnoPatch) -> Result<Turno, AgendaError> {
        let today = self.today;
        let grid = self.grid;

        let turno = self.db.transaction(|conn| {
            let mut turno = load_turno(conn, id)?;
            guard_modifiable(&turno)?;
            if patch.is_empty() {
                return Ok(turno);
            }

            let fecha = match patch.fecha.as_deref() {
                Some(raw) => {
                    let fecha = parse_date_strict(raw)?;
                    reject_past_date(fecha, today)?;
                    fecha
                }
                None => turno.fecha,
            };
            let hora = match patch.hora.as_deref() {
                Some(raw) => parse_time_strict(raw)?,
                None => turno.hora,
            };

            if let Some(next) = patch.estado {
                if next != turno.estado {
                    check_transition(turno.estado, next)?;
                    if next == Estado::Cancelado {
                        check_cancellable(&turno, today)?;
                    }
                    turno.estado = next;
                }
            }

            if (fecha, hora) != (turno.fecha, turno.hora) {
                if !grid.contains(hora) {
                    return Err(slot_unavailable(fecha, hora));
                }
                // A cancelled turno holds no slot, so only live ones compete.
                if turno.estado != Estado::Cancelado
                    && !open_slots(conn, grid, fecha, Some(id))?.contains(&hora)
                {
                    return Err(slot_unavailable(fecha, hora));
                }
            }
            turno.fecha = fecha;
            turno.hora = hora;

            turnos::update_turno(conn, &turno)?;
            Ok(turno)
        })?;

        info!(turno_id = %turno.id, estado = %turno.estado, "Turno updated");
        Ok(turno)
    }

    /// Hard delete, whatever the state.
    pub fn delete(&mut self, id: &str) -> Result<(), AgendaError> {
        self.db.transaction(|conn| {
            load_turno(conn, id)?;
            turnos::delete_turno(conn, id)?;
            Ok(())
        })?;
        info!(turno_id = %id, "Turno deleted");
        Ok(())
    }

    /// `pendiente` -> `confirmado`.
    pub fn confirm(&mut self, id: &str) -> Result<Turno, AgendaError> {
        self.transition(id, Estado::Confirmado)
    }

    /// `confirmado` -> `asistido`.
    pub fn mark_attended(&mut self, id: &str) -> Result<Turno, AgendaError> {
        self.transition(id, Estado::Asistido)
    }

    /// Any non-terminal state -> `cancelado`. Turnos dated before today
    /// cannot be cancelled.
    pub fn cancel(&mut self, id: &str) -> Result<Turno, AgendaError> {
        let today = self.today;
        let turno = self.db.transaction(|conn| {
            let mut turno = load_turno(conn, id)?;
            check_cancellable(&turno, today)?;

            turno.estado = Estado::Cancelado;
            turnos::update_turno(conn, &turno)?;
            Ok(turno)
        })?;
        info!(turno_id = %turno.id, persona_id = %turno.persona_id, "Turno cancelled");
        Ok(turno)
    }

    /// Open slots for a `YYYY-MM-DD` date.
    pub fn available_slots(&mut self, fecha: &str) -> Result<SlotList, AgendaError> {
        let fecha = parse_date_strict(fecha)?;
        let horas = self.available_on(fecha)?;
        Ok(SlotList {
            fecha,
            horarios: horas
                .iter()
                .map(|h| h.format(HORA_FORMAT).to_string())
                .collect(),
        })
    }

    pub fn available_on(&mut self, fecha: NaiveDate) -> Result<Vec<NaiveTime>, AgendaError> {
        reject_past_date(fecha, self.today)?;
        let grid = self.grid;
        self.db.transaction(|conn| open_slots(conn, grid, fecha, None))
    }

    /// Run the cancellation policy for one persona. Returns true when this
    /// call disabled the persona.
    pub fn apply_cancellation_policy(&mut self, persona_id: &str) -> Result<bool, AgendaError> {
        let config = self.config;
        let today = self.today;
        self.db
            .transaction(|conn| apply_cancellation_policy(conn, config, persona_id, today))
    }

    fn transition(&mut self, id: &str, next: Estado) -> Result<Turno, AgendaError> {
        let turno = self.db.transaction(|conn| {
            let mut turno = load_turno(conn, id)?;
            check_transition(turno.estado, next)?;
            turno.estado = next;
            turnos::update_turno(conn, &turno)?;
            Ok(turno)
        })?;
        info!(turno_id = %turno.id, estado = %turno.estado, "Turno state changed");
        Ok(turno)
    }
}

fn load_turno(conn: &Connection, id: &str) -> Result<Turno, AgendaError> {
    turnos::get_turno(conn, id)?.ok_or_else(|| AgendaError::turno_not_found(id))
}

/// Rules shared by `cancel` and an `update` that sets `cancelado`.
fn check_cancellable(turno: &Turno, today: NaiveDate) -> Result<(), AgendaError> {
    if turno.estado == Estado::Cancelado {
        return Err(AgendaError::AlreadyCancelled);
    }
    guard_modifiable(turno)?;
    reject_past_date(turno.fecha, today)
}

fn check_transition(from: Estado, to: Estado) -> Result<(), AgendaError> {
    if !from.can_transition_to(to) {
        return Err(AgendaError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    Ok(())
}

fn slot_unavailable(fecha: NaiveDate, hora: NaiveTime) -> AgendaError {
    AgendaError::SlotUnavailable {
        fecha,
        hora: hora.format(HORA_FORMAT).to_string(),
    }
}

/// Grid slots of `fecha` not held by a live turno (other than `exclude_id`).
fn open_slots(
    conn: &Connection,
    grid: &SlotGrid,
    fecha: NaiveDate,
    exclude_id: Option<&str>,
) -> Result<Vec<NaiveTime>, AgendaError> {
    let occupied: HashSet<NaiveTime> = turnos::occupied_horas(conn, fecha, exclude_id)?
        .into_iter()
        .collect();
    let available = grid.available(&occupied);
    debug!(%fecha, occupied = occupied.len(), available = available.len(), "Computed open slots");
    Ok(available)
}

/// Disable an enabled persona whose recent cancellations reach the
/// threshold. An already disabled persona is left alone.
fn apply_cancellation_policy(
    conn: &Connection,
    config: &AgendaConfig,
    persona_id: &str,
    today: NaiveDate,
) -> Result<bool, AgendaError> {
    let cancelled = recent_cancellations(conn, config, persona_id, today)?;
    if cancelled < config.max_cancellations as usize {
        return Ok(false);
    }

    let persona = load_persona(conn, persona_id)?;
    if !persona.habilitado {
        return Ok(false);
    }

    toggle_habilitado(conn, persona_id)?;
    warn!(persona_id = %persona_id, cancelled, "Cancellation policy disabled persona");
    Ok(true)
}
