pub mod personas;
pub mod sqlite;
pub mod turnos;

pub use sqlite::*;

use std::path::Path;

use chrono::{NaiveDate, NaiveTime};
use rusqlite::types::Type;
use rusqlite::Connection;

use crate::error::AgendaError;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

/// Persistence gateway. Owns the connection; every logical operation runs
/// inside [`Database::transaction`].
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, AgendaError> {
        Ok(Database {
            conn: open_database(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self, AgendaError> {
        Ok(Database {
            conn: open_memory_database()?,
        })
    }

    /// Run `work` in a transaction: commit on `Ok`, roll back otherwise.
    pub fn transaction<T, F>(&mut self, work: F) -> Result<T, AgendaError>
    where
        F: FnOnce(&Connection) -> Result<T, AgendaError>,
    {
        let tx = self.conn.transaction()?;
        let value = work(&*tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Direct access for read-only inspection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

pub(crate) fn date_to_sql(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn time_to_sql(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

pub(crate) fn date_from_sql(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn time_from_sql(idx: usize, raw: &str) -> rusqlite::Result<NaiveTime> {
    NaiveTime::parse_from_str(raw, TIME_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_work_rolls_back() {
        let mut db = Database::open_in_memory().unwrap();
        let result: Result<(), AgendaError> = db.transaction(|conn| {
            conn.execute(
                "INSERT INTO personas (id, nombre, email, dni, telefono, fecha_nacimiento)
                 VALUES ('p1', 'Ana', 'ana@example.com', '1', '2', '1990-01-01')",
                [],
            )?;
            Err(AgendaError::DuplicatePersona)
        });
        assert!(result.is_err());

        let count: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM personas", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn stored_dates_round_trip() {
        let date = NaiveDate::from_ymd_opt(2030, 2, 3).unwrap();
        assert_eq!(date_to_sql(date), "2030-02-03");
        assert_eq!(date_from_sql(0, "2030-02-03").unwrap(), date);
        assert!(time_from_sql(0, "nine").is_err());
    }
}
