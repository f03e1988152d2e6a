//! Person registry: create, read, update and delete personas.
//!
//! Enforces email/dni/telefono uniqueness, the immutability of `dni` and
//! `fecha_nacimiento`, and the guard on manually disabling a persona.

use chrono::{Days, NaiveDate};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::config::AgendaConfig;
use crate::db::{personas, turnos, Database};
use crate::error::AgendaError;
use crate::models::{NuevaPersona, Persona, PersonaPatch, PersonaView};
use crate::validation::{
    compute_age, normalize_email, parse_date_strict, require_text, validate_birth_date,
};

pub struct PersonRegistry<'a> {
    db: &'a mut Database,
    config: &'a AgendaConfig,
    today: NaiveDate,
}

impl<'a> PersonRegistry<'a> {
    pub fn new(db: &'a mut Database, config: &'a AgendaConfig, today: NaiveDate) -> Self {
        PersonRegistry { db, config, today }
    }

    /// Register a new persona. It starts enabled.
    pub fn create(&mut self, data: NuevaPersona) -> Result<PersonaView, AgendaError> {
        let nombre = require_text("nombre", &data.nombre)?;
        let dni = require_text("dni", &data.dni)?;
        let telefono = require_text("telefono", &data.telefono)?;
        let email = normalize_email(&data.email)?;
        let today = self.today;
        let max_age = self.config.max_age_years;

        let persona = self.db.transaction(|conn| {
            let existing = personas::find_conflicting_persona(
                conn,
                Some(&email),
                Some(&dni),
                Some(&telefono),
                None,
            )?;
            if existing.is_some() {
                return Err(AgendaError::DuplicatePersona);
            }

            let fecha_nacimiento = parse_date_strict(&data.fecha_nacimiento)?;
            validate_birth_date(fecha_nacimiento, today, max_age)?;

            let persona = Persona::new(nombre, email, dni, telefono, fecha_nacimiento);
            personas::insert_persona(conn, &persona)?;
            Ok(persona)
        })?;

        info!(persona_id = %persona.id, "Persona created");
        Ok(self.view(persona))
    }

    pub fn list(&mut self) -> Result<Vec<PersonaView>, AgendaError> {
        let all = self.db.transaction(personas::list_personas)?;
        Ok(all.into_iter().map(|p| self.view(p)).collect())
    }

    pub fn get(&mut self, id: &str) -> Result<PersonaView, AgendaError> {
        let persona = self.db.transaction(|conn| load_persona(conn, id))?;
        Ok(self.view(persona))
    }

    pub fn update(&mut self, id: &str, patch: PersonaPatch) -> Result<PersonaView, AgendaError> {
        let config = self.config;
        let today = self.today;

        let persona = self.db.transaction(|conn| {
            let mut persona = load_persona(conn, id)?;

            if patch.dni.is_some() {
                return Err(AgendaError::ImmutableField("dni"));
            }
            if patch.fecha_nacimiento.is_some() {
                return Err(AgendaError::ImmutableField("fecha_nacimiento"));
            }

            let email = patch.email.as_deref().map(normalize_email).transpose()?;
            let telefono = patch
                .telefono
                .as_deref()
                .map(|t| require_text("telefono", t))
                .transpose()?;

            if email.is_some() || telefono.is_some() {
                let clash = personas::find_conflicting_persona(
                    conn,
                    email.as_deref(),
                    None,
                    telefono.as_deref(),
                    Some(id),
                )?;
                if clash.is_some() {
                    return Err(AgendaError::DuplicatePersona);
                }
            }

            if let Some(nombre) = patch.nombre.as_deref() {
                persona.nombre = require_text("nombre", nombre)?;
            }
            if let Some(email) = email {
                persona.email = email;
            }
            if let Some(telefono) = telefono {
                persona.telefono = telefono;
            }

            if let Some(habilitado) = patch.habilitado {
                if !habilitado {
                    let cancelled = recent_cancellations(conn, config, &persona.id, today)?;
                    if cancelled < config.max_cancellations as usize {
                        warn!(persona_id = %persona.id, cancelled, "Manual disable refused");
                        return Err(AgendaError::PolicyViolation(format!(
                            "cannot disable: fewer than {} cancelled turnos in the last {} days",
                            config.max_cancellations, config.lookback_days
                        )));
                    }
                }
                persona.habilitado = habilitado;
            }

            personas::update_persona(conn, &persona)?;
            Ok(persona)
        })?;

        info!(persona_id = %persona.id, "Persona updated");
        Ok(self.view(persona))
    }

    /// Flip `habilitado` without the manual-disable guard. This is the
    /// path the cancellation policy itself uses.
    pub fn toggle_enabled(&mut self, id: &str) -> Result<PersonaView, AgendaError> {
        let persona = self.db.transaction(|conn| toggle_habilitado(conn, id))?;
        Ok(self.view(persona))
    }

    /// Delete a persona that holds no turnos. Personas with turnos are
    /// refused with the number of dependents instead of cascading.
    pub fn delete(&mut self, id: &str) -> Result<(), AgendaError> {
        self.db.transaction(|conn| {
            load_persona(conn, id)?;
            let dependents = turnos::count_for_persona(conn, id)?;
            if dependents > 0 {
                warn!(persona_id = %id, dependents, "Delete refused, persona has turnos");
                return Err(AgendaError::HasDependents(dependents));
            }
            personas::delete_persona(conn, id)?;
            Ok(())
        })?;
        info!(persona_id = %id, "Persona deleted");
        Ok(())
    }

    fn view(&self, persona: Persona) -> PersonaView {
        let edad = compute_age(persona.fecha_nacimiento, self.today);
        persona.with_age(edad)
    }
}

pub(crate) fn load_persona(conn: &Connection, id: &str) -> Result<Persona, AgendaError> {
    personas::get_persona(conn, id)?.ok_or_else(|| AgendaError::persona_not_found(id))
}

pub(crate) fn toggle_habilitado(conn: &Connection, id: &str) -> Result<Persona, AgendaError> {
    let mut persona = load_persona(conn, id)?;
    persona.habilitado = !persona.habilitado;
    personas::set_habilitado(conn, id, persona.habilitado)?;
    info!(persona_id = %id, habilitado = persona.habilitado, "Persona enabled flag toggled");
    Ok(persona)
}

/// Cancelled turnos dated inside the configured lookback window.
pub(crate) fn recent_cancellations(
    conn: &Connection,
    config: &AgendaConfig,
    persona_id: &str,
    today: NaiveDate,
) -> Result<usize, AgendaError> {
    let since = u64::try_from(config.lookback_days)
        .ok()
        .and_then(|days| today.checked_sub_days(Days::new(days)))
        .unwrap_or(NaiveDate::MIN);
    turnos::count_cancelled_since(conn, persona_id, since)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agenda::{Agenda, FixedClock};
    use crate::error::ErrorKind;
    use crate::models::{Estado, Turno};
    use chrono::{Duration, NaiveTime};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn agenda() -> Agenda {
        Agenda::with_clock(
            Database::open_in_memory().unwrap(),
            AgendaConfig::default(),
            FixedClock(date(2024, 6, 15)),
        )
        .unwrap()
    }

    fn nueva(email: &str, dni: &str, telefono: &str) -> NuevaPersona {
        NuevaPersona {
            nombre: "Ana Perez".to_string(),
            email: email.to_string(),
            dni: dni.to_string(),
            telefono: telefono.to_string(),
            fecha_nacimiento: "2000-06-15".to_string(),
        }
    }

    fn insert_cancelled(agenda: &mut Agenda, persona_id: &str, days_ago: i64, n: usize) {
        let today = agenda.today();
        let conn = agenda.database().connection();
        for i in 0..n {
            let turno = Turno::new(
                persona_id.to_string(),
                today - Duration::days(days_ago),
                NaiveTime::from_hms_opt(9, 0, 0).unwrap() + Duration::minutes(30 * i as i64),
                Estado::Cancelado,
            );
            turnos::insert_turno(conn, &turno).unwrap();
        }
    }

    #[test]
    fn create_normalizes_and_derives_age() {
        let mut agenda = agenda();
        let view = agenda
            .personas()
            .create(nueva("Ana@Example.com", "30111222", "1155550000"))
            .unwrap();
        assert_eq!(view.persona.email, "ana@example.com");
        assert_eq!(view.edad, 24);
        assert!(view.persona.habilitado);
    }

    #[test]
    fn create_rejects_each_duplicate_key() {
        let mut agenda = agenda();
        agenda
            .personas()
            .create(nueva("ana@example.com", "1", "100"))
            .unwrap();

        for data in [
            nueva("ANA@example.com", "2", "200"),
            nueva("b@example.com", "1", "300"),
            nueva("c@example.com", "3", "100"),
        ] {
            let err = agenda.personas().create(data).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::DuplicatePersona);
        }
    }

    #[test]
    fn create_validates_birth_date() {
        let mut agenda = agenda();
        let mut data = nueva("a@example.com", "1", "100");
        data.fecha_nacimiento = "15/06/2000".to_string();
        assert_eq!(
            agenda.personas().create(data.clone()).unwrap_err().kind(),
            ErrorKind::InvalidFormat
        );

        data.fecha_nacimiento = "2024-06-16".to_string();
        assert_eq!(
            agenda.personas().create(data.clone()).unwrap_err().kind(),
            ErrorKind::FutureBirthDate
        );

        data.fecha_nacimiento = "1900-01-01".to_string();
        assert_eq!(
            agenda.personas().create(data).unwrap_err().kind(),
            ErrorKind::BirthDateTooOld
        );
    }

    #[test]
    fn get_missing_is_not_found() {
        let mut agenda = agenda();
        assert_eq!(
            agenda.personas().get("nope").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn update_rejects_immutable_fields() {
        let mut agenda = agenda();
        let id = agenda
            .personas()
            .create(nueva("a@example.com", "1", "100"))
            .unwrap()
            .persona
            .id;

        let patch = PersonaPatch {
            dni: Some("999".to_string()),
            ..PersonaPatch::default()
        };
        assert_eq!(
            agenda.personas().update(&id, patch).unwrap_err().kind(),
            ErrorKind::ImmutableField
        );

        let patch = PersonaPatch {
            fecha_nacimiento: Some("1999-01-01".to_string()),
            ..PersonaPatch::default()
        };
        assert_eq!(
            agenda.personas().update(&id, patch).unwrap_err().kind(),
            ErrorKind::ImmutableField
        );
    }

    #[test]
    fn update_checks_uniqueness_against_others_only() {
        let mut agenda = agenda();
        let a = agenda
            .personas()
            .create(nueva("a@example.com", "1", "100"))
            .unwrap()
            .persona
            .id;
        agenda
            .personas()
            .create(nueva("b@example.com", "2", "200"))
            .unwrap();

        let same_email = PersonaPatch {
            email: Some("A@EXAMPLE.COM".to_string()),
            nombre: Some("Ana Maria".to_string()),
            ..PersonaPatch::default()
        };
        let view = agenda.personas().update(&a, same_email).unwrap();
        assert_eq!(view.persona.nombre, "Ana Maria");

        let taken_phone = PersonaPatch {
            telefono: Some("200".to_string()),
            ..PersonaPatch::default()
        };
        assert_eq!(
            agenda.personas().update(&a, taken_phone).unwrap_err().kind(),
            ErrorKind::DuplicatePersona
        );
    }

    #[test]
    fn manual_disable_needs_enough_cancellations() {
        let mut agenda = agenda();
        let id = agenda
            .personas()
            .create(nueva("a@example.com", "1", "100"))
            .unwrap()
            .persona
            .id;
        let disable = PersonaPatch {
            habilitado: Some(false),
            ..PersonaPatch::default()
        };

        insert_cancelled(&mut agenda, &id, 10, 4);
        assert_eq!(
            agenda.personas().update(&id, disable.clone()).unwrap_err().kind(),
            ErrorKind::PolicyViolation
        );

        // Outside the 180 day window: does not count.
        insert_cancelled(&mut agenda, &id, 181, 1);
        assert!(agenda.personas().update(&id, disable.clone()).is_err());

        insert_cancelled(&mut agenda, &id, 180, 1);
        let view = agenda.personas().update(&id, disable).unwrap();
        assert!(!view.persona.habilitado);
    }

    #[test]
    fn re_enabling_is_always_allowed() {
        let mut agenda = agenda();
        let id = agenda
            .personas()
            .create(nueva("a@example.com", "1", "100"))
            .unwrap()
            .persona
            .id;
        agenda.personas().toggle_enabled(&id).unwrap();
        let view = agenda
            .personas()
            .update(
                &id,
                PersonaPatch {
                    habilitado: Some(true),
                    ..PersonaPatch::default()
                },
            )
            .unwrap();
        assert!(view.persona.habilitado);
    }

    #[test]
    fn toggle_flips_unconditionally() {
        let mut agenda = agenda();
        let id = agenda
            .personas()
            .create(nueva("a@example.com", "1", "100"))
            .unwrap()
            .persona
            .id;
        assert!(!agenda.personas().toggle_enabled(&id).unwrap().persona.habilitado);
        assert!(agenda.personas().toggle_enabled(&id).unwrap().persona.habilitado);
    }

    #[test]
    fn delete_is_blocked_by_turnos() {
        let mut agenda = agenda();
        let id = agenda
            .personas()
            .create(nueva("a@example.com", "1", "100"))
            .unwrap()
            .persona
            .id;
        insert_cancelled(&mut agenda, &id, 1, 2);

        match agenda.personas().delete(&id) {
            Err(AgendaError::HasDependents(count)) => assert_eq!(count, 2),
            other => panic!("unexpected {other:?}"),
        }
        assert!(agenda.personas().get(&id).is_ok());
    }

    #[test]
    fn delete_without_turnos() {
        let mut agenda = agenda();
        let id = agenda
            .personas()
            .create(nueva("a@example.com", "1", "100"))
            .unwrap()
            .persona
            .id;
        agenda.personas().delete(&id).unwrap();
        assert_eq!(
            agenda.personas().delete(&id).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn lookback_window_saturates_instead_of_overflowing() {
        let mut agenda = agenda();
        let id = agenda.personas().create(nueva("a@b.com", "1", "555")).unwrap().persona.id;
        insert_cancelled(&mut agenda, &id, 30, 2);

        let huge = AgendaConfig {
            lookback_days: 5_000_000_000,
            ..AgendaConfig::default()
        };
        let today = agenda.today();
        let conn = agenda.database().connection();
        assert_eq!(recent_cancellations(conn, &huge, &id, today).unwrap(), 2);

        let widest = AgendaConfig {
            lookback_days: crate::config::MAX_LOOKBACK_DAYS,
            ..AgendaConfig::default()
        };
        assert_eq!(recent_cancellations(conn, &widest, &id, today).unwrap(), 2);
    }
}
