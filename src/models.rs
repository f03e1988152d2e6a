/// Data models for the booking system.
///
/// This module defines the records the rest of the crate works with:
/// - Estado: closed set of appointment states and their transition table
/// - Persona / PersonaView: a registrant, stored and as returned to callers
/// - Turno: an appointment occupying one slot on one date
/// - NuevaPersona, PersonaPatch, NuevoTurno, TurnoPatch: typed payloads

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AgendaError;

/// Appointment state.
///
/// `Pendiente` is the initial state. `Cancelado` and `Asistido` are
/// terminal: a turno in either state is no longer modifiable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Estado {
    #[default]
    Pendiente,
    Confirmado,
    Cancelado,
    Asistido,
}

impl Estado {
    pub fn as_str(&self) -> &'static str {
        match self {
            Estado::Pendiente => "pendiente",
            Estado::Confirmado => "confirmado",
            Estado::Cancelado => "cancelado",
            Estado::Asistido => "asistido",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Estado::Cancelado | Estado::Asistido)
    }

    pub fn is_modifiable(&self) -> bool {
        !self.is_terminal()
    }

    /// The one place that decides which state changes are legal.
    pub fn can_transition_to(&self, next: Estado) -> bool {
        matches!(
            (self, next),
            (Estado::Pendiente, Estado::Confirmado)
                | (Estado::Confirmado, Estado::Asistido)
                | (Estado::Pendiente, Estado::Cancelado)
                | (Estado::Confirmado, Estado::Cancelado)
        )
    }

    /// States a turno may be booked in.
    pub fn is_initial(&self) -> bool {
        matches!(self, Estado::Pendiente | Estado::Confirmado)
    }
}

impl FromStr for Estado {
    type Err = AgendaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "pendiente" => Ok(Estado::Pendiente),
            "confirmado" => Ok(Estado::Confirmado),
            "cancelado" => Ok(Estado::Cancelado),
            "asistido" => Ok(Estado::Asistido),
            _ => Err(AgendaError::InvalidFormat(format!(
                "Invalid estado: '{}'. Must be one of: pendiente, confirmado, cancelado, asistido",
                value
            ))),
        }
    }
}

impl std::fmt::Display for Estado {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registrant as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub nombre: String,
    pub email: String,
    pub dni: String,
    pub telefono: String,
    pub fecha_nacimiento: NaiveDate,
    pub habilitado: bool,
}

impl Persona {
    pub fn new(
        nombre: String,
        email: String,
        dni: String,
        telefono: String,
        fecha_nacimiento: NaiveDate,
    ) -> Self {
        Persona {
            id: Uuid::new_v4().to_string(),
            nombre,
            email,
            dni,
            telefono,
            fecha_nacimiento,
            habilitado: true,
        }
    }

    pub fn with_age(self, edad: i32) -> PersonaView {
        PersonaView { persona: self, edad }
    }
}

/// A persona plus its age, derived at read time and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonaView {
    #[serde(flatten)]
    pub persona: Persona,
    pub edad: i32,
}

/// Create payload. `fecha_nacimiento` stays a raw string so the strict
/// `YYYY-MM-DD` check runs on exactly what the caller sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NuevaPersona {
    pub nombre: String,
    pub email: String,
    pub dni: String,
    pub telefono: String,
    pub fecha_nacimiento: String,
}

/// Partial update. Absent fields are left untouched; `dni` and
/// `fecha_nacimiento` exist only so an attempt to change them is rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaPatch {
    pub nombre: Option<String>,
    pub email: Option<String>,
    pub telefono: Option<String>,
    pub habilitado: Option<bool>,
    pub dni: Option<String>,
    pub fecha_nacimiento: Option<String>,
}

/// An appointment occupying one slot on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turno {
    pub id: String,
    pub persona_id: String,
    pub fecha: NaiveDate,
    #[serde(with = "hora_format")]
    pub hora: NaiveTime,
    pub estado: Estado,
}

impl Turno {
    pub fn new(persona_id: String, fecha: NaiveDate, hora: NaiveTime, estado: Estado) -> Self {
        Turno {
            id: Uuid::new_v4().to_string(),
            persona_id,
            fecha,
            hora,
            estado,
        }
    }

    /// Slot label, `HH:MM`.
    pub fn hora_label(&self) -> String {
        self.hora.format(HORA_FORMAT).to_string()
    }
}

/// Booking payload with raw date and time strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NuevoTurno {
    pub persona_id: String,
    pub fecha: String,
    pub hora: String,
    #[serde(default)]
    pub estado: Option<Estado>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnoPatch {
    pub fecha: Option<String>,
    pub hora: Option<String>,
    pub estado: Option<Estado>,
}

impl TurnoPatch {
    pub fn is_empty(&self) -> bool {
        self.fecha.is_none() && self.hora.is_none() && self.estado.is_none()
    }
}

/// Open slots for one date, ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotList {
    pub fecha: NaiveDate,
    pub horarios: Vec<String>,
}

pub const HORA_FORMAT: &str = "%H:%M";

mod hora_format {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hora: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hora.format(super::HORA_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, super::HORA_FORMAT).map_err(serde::de::Error::custom)
    }
}
