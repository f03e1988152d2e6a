use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{date_from_sql, date_to_sql, is_unique_violation};
use crate::error::AgendaError;
use crate::models::Persona;

const PERSONA_COLUMNS: &str = "id, nombre, email, dni, telefono, fecha_nacimiento, habilitado";

fn persona_from_row(row: &Row<'_>) -> rusqlite::Result<Persona> {
    let fecha_nacimiento: String = row.get(5)?;
    Ok(Persona {
        id: row.get(0)?,
        nombre: row.get(1)?,
        email: row.get(2)?,
        dni: row.get(3)?,
        telefono: row.get(4)?,
        fecha_nacimiento: date_from_sql(5, &fecha_nacimiento)?,
        habilitado: row.get::<_, i32>(6)? != 0,
    })
}

fn map_write_error(err: rusqlite::Error) -> AgendaError {
    if is_unique_violation(&err) {
        AgendaError::DuplicatePersona
    } else {
        err.into()
    }
}

pub fn insert_persona(conn: &Connection, persona: &Persona) -> Result<(), AgendaError> {
    conn.execute(
        "INSERT INTO personas (id, nombre, email, dni, telefono, fecha_nacimiento, habilitado)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            persona.id,
            persona.nombre,
            persona.email,
            persona.dni,
            persona.telefono,
            date_to_sql(persona.fecha_nacimiento),
            persona.habilitado as i32,
        ],
    )
    .map_err(map_write_error)?;
    Ok(())
}

pub fn get_persona(conn: &Connection, id: &str) -> Result<Option<Persona>, AgendaError> {
    let persona = conn
        .query_row(
            &format!("SELECT {PERSONA_COLUMNS} FROM personas WHERE id = ?1"),
            params![id],
            persona_from_row,
        )
        .optional()?;
    Ok(persona)
}

/// All personas in creation order.
pub fn list_personas(conn: &Connection) -> Result<Vec<Persona>, AgendaError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PERSONA_COLUMNS} FROM personas ORDER BY rowid"
    ))?;
    let rows = stmt.query_map([], persona_from_row)?;
    rows.map(|r| r.map_err(AgendaError::from)).collect()
}

/// Writes the mutable fields; `dni` and `fecha_nacimiento` are never updated.
pub fn update_persona(conn: &Connection, persona: &Persona) -> Result<(), AgendaError> {
    conn.execute(
        "UPDATE personas SET nombre = ?2, email = ?3, telefono = ?4, habilitado = ?5
         WHERE id = ?1",
        params![
            persona.id,
            persona.nombre,
            persona.email,
            persona.telefono,
            persona.habilitado as i32,
        ],
    )
    .map_err(map_write_error)?;
    Ok(())
}

pub fn set_habilitado(conn: &Connection, id: &str, habilitado: bool) -> Result<usize, AgendaError> {
    let changed = conn.execute(
        "UPDATE personas SET habilitado = ?2 WHERE id = ?1",
        params![id, habilitado as i32],
    )?;
    Ok(changed)
}

pub fn delete_persona(conn: &Connection, id: &str) -> Result<usize, AgendaError> {
    let deleted = conn.execute("DELETE FROM personas WHERE id = ?1", params![id])?;
    Ok(deleted)
}

/// First persona (other than `exclude_id`) sharing any of the given
/// email, dni or telefono values. `None` values never match.
pub fn find_conflicting_persona(
    conn: &Connection,
    email: Option<&str>,
    dni: Option<&str>,
    telefono: Option<&str>,
    exclude_id: Option<&str>,
) -> Result<Option<Persona>, AgendaError> {
    let persona = conn
        .query_row(
            &format!(
                "SELECT {PERSONA_COLUMNS} FROM personas
                 WHERE (email = ?1 OR dni = ?2 OR telefono = ?3)
                   AND (?4 IS NULL OR id != ?4)
                 LIMIT 1"
            ),
            params![email, dni, telefono, exclude_id],
            persona_from_row,
        )
        .optional()?;
    Ok(persona)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use chrono::NaiveDate;

    fn persona(email: &str, dni: &str, telefono: &str) -> Persona {
        Persona::new(
            "Ana".to_string(),
            email.to_string(),
            dni.to_string(),
            telefono.to_string(),
            NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
        )
    }

    #[test]
    fn insert_and_get() {
        let conn = open_memory_database().unwrap();
        let p = persona("ana@example.com", "1", "100");
        insert_persona(&conn, &p).unwrap();
        assert_eq!(get_persona(&conn, &p.id).unwrap(), Some(p));
        assert_eq!(get_persona(&conn, "missing").unwrap(), None);
    }

    #[test]
    fn unique_columns_map_to_duplicate() {
        let conn = open_memory_database().unwrap();
        insert_persona(&conn, &persona("ana@example.com", "1", "100")).unwrap();
        let err = insert_persona(&conn, &persona("other@example.com", "1", "200")).unwrap_err();
        assert!(matches!(err, AgendaError::DuplicatePersona));
    }

    #[test]
    fn conflict_lookup_excludes_self() {
        let conn = open_memory_database().unwrap();
        let p = persona("ana@example.com", "1", "100");
        insert_persona(&conn, &p).unwrap();

        let hit = find_conflicting_persona(&conn, None, None, Some("100"), None).unwrap();
        assert_eq!(hit.map(|x| x.id), Some(p.id.clone()));

        let miss =
            find_conflicting_persona(&conn, Some("ana@example.com"), None, None, Some(&p.id)).unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn list_keeps_creation_order() {
        let conn = open_memory_database().unwrap();
        let a = persona("a@example.com", "1", "100");
        let b = persona("b@example.com", "2", "200");
        insert_persona(&conn, &a).unwrap();
        insert_persona(&conn, &b).unwrap();
        let ids: Vec<String> = list_personas(&conn).unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[test]
    fn set_habilitado_flips_flag() {
        let conn = open_memory_database().unwrap();
        let p = persona("ana@example.com", "1", "100");
        insert_persona(&conn, &p).unwrap();
        assert_eq!(set_habilitado(&conn, &p.id, false).unwrap(), 1);
        assert!(!get_persona(&conn, &p.id).unwrap().unwrap().habilitado);
    }
}
