/// Failure taxonomy for the booking system.
///
/// Every operation returns `Result<T, AgendaError>`. Callers branch on
/// [`AgendaError::kind`] (a stable code) or [`AgendaError::category`]
/// (not-found / validation / conflict) instead of parsing messages.

use serde::Serialize;
use thiserror::Error;

/// Why an email address was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailReason {
    Empty,
    MissingAt,
    MultipleAt,
    EmptyLocalPart,
    EmptyDomain,
    InvalidLocalPart,
    InvalidDomain,
    TooLong,
}

impl std::fmt::Display for EmailReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            EmailReason::Empty => "the email cannot be empty",
            EmailReason::MissingAt => "the email must contain an @ sign",
            EmailReason::MultipleAt => "the email must contain a single @ sign",
            EmailReason::EmptyLocalPart => "there must be something before the @ sign",
            EmailReason::EmptyDomain => "there must be something after the @ sign",
            EmailReason::InvalidLocalPart => "the part before the @ sign is not valid",
            EmailReason::InvalidDomain => "the email domain is not valid",
            EmailReason::TooLong => "the email is too long",
        };
        f.write_str(text)
    }
}

#[derive(Error, Debug)]
pub enum AgendaError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Invalid email: {0}")]
    InvalidEmail(EmailReason),

    #[error("A persona with this email, DNI or phone already exists")]
    DuplicatePersona,

    #[error("Field '{0}' cannot be modified")]
    ImmutableField(&'static str),

    #[error("Birth date cannot be in the future")]
    FutureBirthDate,

    #[error("Birth date cannot be more than {0} years ago")]
    BirthDateTooOld(u32),

    #[error("Dates before today are not allowed: {0}")]
    PastDate(chrono::NaiveDate),

    #[error("Slot {hora} on {fecha} is not available")]
    SlotUnavailable { fecha: chrono::NaiveDate, hora: String },

    #[error("Persona {0} is disabled")]
    PersonaDisabled(String),

    #[error("Cancellation policy: {0}")]
    PolicyViolation(String),

    #[error("Cannot move a turno from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Turno is already cancelled")]
    AlreadyCancelled,

    #[error("A turno in state {0} cannot be modified")]
    TurnoNotModifiable(String),

    #[error("Persona has {0} turno(s) and cannot be deleted")]
    HasDependents(usize),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("SQLite error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Stable machine-readable code for each failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    InvalidFormat,
    InvalidEmail,
    DuplicatePersona,
    ImmutableField,
    FutureBirthDate,
    BirthDateTooOld,
    PastDate,
    SlotUnavailable,
    PersonaDisabled,
    PolicyViolation,
    InvalidTransition,
    AlreadyCancelled,
    TurnoNotModifiable,
    HasDependents,
    Config,
    Database,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InvalidFormat => "INVALID_FORMAT",
            ErrorKind::InvalidEmail => "INVALID_EMAIL",
            ErrorKind::DuplicatePersona => "DUPLICATE_PERSONA",
            ErrorKind::ImmutableField => "IMMUTABLE_FIELD",
            ErrorKind::FutureBirthDate => "FUTURE_BIRTH_DATE",
            ErrorKind::BirthDateTooOld => "BIRTH_DATE_TOO_OLD",
            ErrorKind::PastDate => "PAST_DATE",
            ErrorKind::SlotUnavailable => "SLOT_UNAVAILABLE",
            ErrorKind::PersonaDisabled => "PERSONA_DISABLED",
            ErrorKind::PolicyViolation => "POLICY_VIOLATION",
            ErrorKind::InvalidTransition => "INVALID_TRANSITION",
            ErrorKind::AlreadyCancelled => "ALREADY_CANCELLED",
            ErrorKind::TurnoNotModifiable => "TURNO_NOT_MODIFIABLE",
            ErrorKind::HasDependents => "HAS_DEPENDENTS",
            ErrorKind::Config => "CONFIG",
            ErrorKind::Database => "DATABASE",
        }
    }
}

/// Coarse status bucket a transport layer maps to its own codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    NotFound,
    Validation,
    Conflict,
    Internal,
}

impl AgendaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgendaError::NotFound { .. } => ErrorKind::NotFound,
            AgendaError::InvalidFormat(_) => ErrorKind::InvalidFormat,
            AgendaError::InvalidEmail(_) => ErrorKind::InvalidEmail,
            AgendaError::DuplicatePersona => ErrorKind::DuplicatePersona,
            AgendaError::ImmutableField(_) => ErrorKind::ImmutableField,
            AgendaError::FutureBirthDate => ErrorKind::FutureBirthDate,
            AgendaError::BirthDateTooOld(_) => ErrorKind::BirthDateTooOld,
            AgendaError::PastDate(_) => ErrorKind::PastDate,
            AgendaError::SlotUnavailable { .. } => ErrorKind::SlotUnavailable,
            AgendaError::PersonaDisabled(_) => ErrorKind::PersonaDisabled,
            AgendaError::PolicyViolation(_) => ErrorKind::PolicyViolation,
            AgendaError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            AgendaError::AlreadyCancelled => ErrorKind::AlreadyCancelled,
            AgendaError::TurnoNotModifiable(_) => ErrorKind::TurnoNotModifiable,
            AgendaError::HasDependents(_) => ErrorKind::HasDependents,
            AgendaError::Config(_) => ErrorKind::Config,
            AgendaError::Database(_) => ErrorKind::Database,
        }
    }

    pub fn category(&self) -> StatusCategory {
        match self.kind() {
            ErrorKind::NotFound => StatusCategory::NotFound,
            ErrorKind::InvalidFormat
            | ErrorKind::InvalidEmail
            | ErrorKind::ImmutableField
            | ErrorKind::FutureBirthDate
            | ErrorKind::BirthDateTooOld
            | ErrorKind::PastDate => StatusCategory::Validation,
            ErrorKind::DuplicatePersona
            | ErrorKind::SlotUnavailable
            | ErrorKind::PersonaDisabled
            | ErrorKind::PolicyViolation
            | ErrorKind::InvalidTransition
            | ErrorKind::AlreadyCancelled
            | ErrorKind::TurnoNotModifiable
            | ErrorKind::HasDependents => StatusCategory::Conflict,
            ErrorKind::Config | ErrorKind::Database => StatusCategory::Internal,
        }
    }

    pub(crate) fn persona_not_found(id: &str) -> Self {
        AgendaError::NotFound {
            entity: "Persona",
            id: id.to_string(),
        }
    }

    pub(crate) fn turno_not_found(id: &str) -> Self {
        AgendaError::NotFound {
            entity: "Turno",
            id: id.to_string(),
        }
    }
}

impl From<config::ConfigError> for AgendaError {
    fn from(err: config::ConfigError) -> Self {
        AgendaError::Config(err.to_string())
    }
}
