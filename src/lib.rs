//! Appointment booking for a single daily calendar.
//!
//! Two records: personas (registrants) and turnos (appointments). The
//! crate computes open slots, enforces the turno state machine and
//! disables personas that cancel too often.

pub mod agenda;
pub mod calendar;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod registry;
pub mod scheduler;
pub mod validation;

pub use agenda::{Agenda, Clock, FixedClock, SystemClock};
pub use calendar::SlotGrid;
pub use config::AgendaConfig;
pub use db::Database;
pub use error::{AgendaError, EmailReason, ErrorKind, StatusCategory};
pub use models::{
    Estado, NuevaPersona, NuevoTurno, Persona, PersonaPatch, PersonaView, SlotList, Turno,
    TurnoPatch,
};
pub use registry::PersonRegistry;
pub use scheduler::AppointmentEngine;
