use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{date_from_sql, date_to_sql, is_unique_violation, time_from_sql, time_to_sql};
use crate::error::AgendaError;
use crate::models::{Estado, Turno};

const TURNO_COLUMNS: &str = "id, persona_id, fecha, hora, estado";

fn turno_from_row(row: &Row<'_>) -> rusqlite::Result<Turno> {
    let fecha: String = row.get(2)?;
    let hora: String = row.get(3)?;
    let estado: String = row.get(4)?;
    Ok(Turno {
        id: row.get(0)?,
        persona_id: row.get(1)?,
        fecha: date_from_sql(2, &fecha)?,
        hora: time_from_sql(3, &hora)?,
        estado: Estado::from_str(&estado)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?,
    })
}

fn map_write_error(err: rusqlite::Error, turno: &Turno) -> AgendaError {
    if is_unique_violation(&err) {
        AgendaError::SlotUnavailable {
            fecha: turno.fecha,
            hora: turno.hora_label(),
        }
    } else {
        err.into()
    }
}

pub fn insert_turno(conn: &Connection, turno: &Turno) -> Result<(), AgendaError> {
    conn.execute(
        "INSERT INTO turnos (id, persona_id, fecha, hora, estado)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            turno.id,
            turno.persona_id,
            date_to_sql(turno.fecha),
            time_to_sql(turno.hora),
            turno.estado.as_str(),
        ],
    )
    .map_err(|e| map_write_error(e, turno))?;
    Ok(())
}

pub fn get_turno(conn: &Connection, id: &str) -> Result<Option<Turno>, AgendaError> {
    let turno = conn
        .query_row(
            &format!("SELECT {TURNO_COLUMNS} FROM turnos WHERE id = ?1"),
            params![id],
            turno_from_row,
        )
        .optional()?;
    Ok(turno)
}

/// All turnos by date, then time.
pub fn list_turnos(conn: &Connection) -> Result<Vec<Turno>, AgendaError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TURNO_COLUMNS} FROM turnos ORDER BY fecha, hora, rowid"
    ))?;
    let rows = stmt.query_map([], turno_from_row)?;
    rows.map(|r| r.map_err(AgendaError::from)).collect()
}

pub fn list_turnos_for_persona(
    conn: &Connection,
    persona_id: &str,
) -> Result<Vec<Turno>, AgendaError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TURNO_COLUMNS} FROM turnos WHERE persona_id = ?1 ORDER BY fecha, hora, rowid"
    ))?;
    let rows = stmt.query_map(params![persona_id], turno_from_row)?;
    rows.map(|r| r.map_err(AgendaError::from)).collect()
}

pub fn update_turno(conn: &Connection, turno: &Turno) -> Result<(), AgendaError> {
    conn.execute(
        "UPDATE turnos SET fecha = ?2, hora = ?3, estado = ?4 WHERE id = ?1",
        params![
            turno.id,
            date_to_sql(turno.fecha),
            time_to_sql(turno.hora),
            turno.estado.as_str(),
        ],
    )
    .map_err(|e| map_write_error(e, turno))?;
    Ok(())
}

pub fn delete_turno(conn: &Connection, id: &str) -> Result<usize, AgendaError> {
    let deleted = conn.execute("DELETE FROM turnos WHERE id = ?1", params![id])?;
    Ok(deleted)
}

/// Times held on `fecha` by turnos that are not cancelled.
pub fn occupied_horas(
    conn: &Connection,
    fecha: NaiveDate,
    exclude_id: Option<&str>,
) -> Result<Vec<NaiveTime>, AgendaError> {
    let mut stmt = conn.prepare(
        "SELECT hora FROM turnos
         WHERE fecha = ?1 AND estado != ?2 AND (?3 IS NULL OR id != ?3)
         ORDER BY hora",
    )?;
    let rows = stmt.query_map(
        params![date_to_sql(fecha), Estado::Cancelado.as_str(), exclude_id],
        |row| {
            let hora: String = row.get(0)?;
            time_from_sql(0, &hora)
        },
    )?;
    rows.map(|r| r.map_err(AgendaError::from)).collect()
}

/// Cancelled turnos of `persona_id` dated on or after `since`.
pub fn count_cancelled_since(
    conn: &Connection,
    persona_id: &str,
    since: NaiveDate,
) -> Result<usize, AgendaError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM turnos WHERE persona_id = ?1 AND estado = ?2 AND fecha >= ?3",
        params![persona_id, Estado::Cancelado.as_str(), date_to_sql(since)],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

pub fn count_for_persona(conn: &Connection, persona_id: &str) -> Result<usize, AgendaError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM turnos WHERE persona_id = ?1",
        params![persona_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}
