//! Stateless checks shared by the person registry and the appointment engine.
//!
//! Nothing here reads the clock: every date rule takes `today` from the
//! caller so the same inputs always give the same answer.

use chrono::{Datelike, Months, NaiveDate, NaiveTime};

use crate::error::{AgendaError, EmailReason};
use crate::models::Turno;

const MAX_EMAIL_LEN: usize = 254;
const MAX_LOCAL_PART_LEN: usize = 64;
const LOCAL_PART_SPECIALS: &str = "!#$%&'*+-/=?^_`{|}~.";

/// Parse a date written exactly as `YYYY-MM-DD`.
pub fn parse_date_strict(value: &str) -> Result<NaiveDate, AgendaError> {
    let bytes = value.as_bytes();
    let shape_ok = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !shape_ok {
        return Err(date_format_error(value));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| date_format_error(value))
}

fn date_format_error(value: &str) -> AgendaError {
    AgendaError::InvalidFormat(format!("expected YYYY-MM-DD, got '{value}'"))
}

/// Parse a slot time, `HH:MM`. A trailing `:00` seconds field is tolerated.
pub fn parse_time_strict(value: &str) -> Result<NaiveTime, AgendaError> {
    let trimmed = match value.len() {
        5 => value,
        8 if value.ends_with(":00") => &value[..5],
        _ => return Err(time_format_error(value)),
    };
    let bytes = trimmed.as_bytes();
    let shape_ok = bytes[2] == b':'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 2 || b.is_ascii_digit());
    if !shape_ok {
        return Err(time_format_error(value));
    }
    NaiveTime::parse_from_str(trimmed, "%H:%M").map_err(|_| time_format_error(value))
}

fn time_format_error(value: &str) -> AgendaError {
    AgendaError::InvalidFormat(format!("expected HH:MM, got '{value}'"))
}

pub fn reject_past_date(date: NaiveDate, today: NaiveDate) -> Result<(), AgendaError> {
    if date < today {
        return Err(AgendaError::PastDate(date));
    }
    Ok(())
}

/// Birth date must not be in the future nor older than `max_age_years`.
pub fn validate_birth_date(
    birth: NaiveDate,
    today: NaiveDate,
    max_age_years: u32,
) -> Result<(), AgendaError> {
    if birth > today {
        return Err(AgendaError::FutureBirthDate);
    }
    // Feb 29 clamps to Feb 28 when the limit year is not a leap year.
    let oldest = today
        .checked_sub_months(Months::new(max_age_years.saturating_mul(12)))
        .unwrap_or(NaiveDate::MIN);
    if birth < oldest {
        return Err(AgendaError::BirthDateTooOld(max_age_years));
    }
    Ok(())
}

/// Whole years between `birth` and `today`.
pub fn compute_age(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age
}

/// Check email syntax and return the canonical lowercase form.
pub fn normalize_email(value: &str) -> Result<String, AgendaError> {
    let email = value.trim();
    if email.is_empty() {
        return Err(AgendaError::InvalidEmail(EmailReason::Empty));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(AgendaError::InvalidEmail(EmailReason::TooLong));
    }

    let (local, domain) = match email.split_once('@') {
        Some(parts) => parts,
        None => return Err(AgendaError::InvalidEmail(EmailReason::MissingAt)),
    };
    if domain.contains('@') {
        return Err(AgendaError::InvalidEmail(EmailReason::MultipleAt));
    }
    if local.is_empty() {
        return Err(AgendaError::InvalidEmail(EmailReason::EmptyLocalPart));
    }
    if domain.is_empty() {
        return Err(AgendaError::InvalidEmail(EmailReason::EmptyDomain));
    }
    if local.len() > MAX_LOCAL_PART_LEN {
        return Err(AgendaError::InvalidEmail(EmailReason::TooLong));
    }
    if !is_valid_local_part(local) {
        return Err(AgendaError::InvalidEmail(EmailReason::InvalidLocalPart));
    }
    if !is_valid_domain(domain) {
        return Err(AgendaError::InvalidEmail(EmailReason::InvalidDomain));
    }

    Ok(format!("{}@{}", local, domain).to_lowercase())
}

fn is_valid_local_part(local: &str) -> bool {
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }
    local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || LOCAL_PART_SPECIALS.contains(c))
}

fn is_valid_domain(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    let labels_ok = labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    let tld = labels[labels.len() - 1];
    labels_ok && tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic())
}

/// Trimmed value of a required free-text field.
pub fn require_text(field: &str, value: &str) -> Result<String, AgendaError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AgendaError::InvalidFormat(format!("{field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

/// Refuse edits on a turno that already reached a terminal state.
pub fn guard_modifiable(turno: &Turno) -> Result<(), AgendaError> {
    if !turno.estado.is_modifiable() {
        return Err(AgendaError::TurnoNotModifiable(turno.estado.to_string()));
    }
    Ok(())
}
