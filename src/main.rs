/// Command-line interface for the booking system.
///
/// This module provides an interactive menu for registering personas,
/// booking turnos, moving them through their states and viewing the open
/// slots of a day.

use std::io::{self, Write};

use tracing_subscriber::EnvFilter;
use turnos::{
    config, Agenda, AgendaConfig, AgendaError, Estado, NuevaPersona, NuevoTurno, PersonaPatch,
    PersonaView, Turno, TurnoPatch,
};

struct AgendaCLI {
    agenda: Agenda,
    running: bool,
}

impl AgendaCLI {
    fn new(agenda: Agenda) -> Self {
        AgendaCLI {
            agenda,
            running: true,
        }
    }

    fn print_header(&self) {
        println!("\n{}", "=".repeat(60));
        println!("       APPOINTMENT BOOKING SYSTEM");
        println!("{}", "=".repeat(60));
        println!("{}", self.agenda);
    }

    fn print_menu(&self) {
        println!("\n--- Main Menu ---");
        println!(" 1. Register persona");
        println!(" 2. List personas");
        println!(" 3. Show persona");
        println!(" 4. Update persona");
        println!(" 5. Delete persona");
        println!(" 6. Book turno");
        println!(" 7. List turnos");
        println!(" 8. Update turno");
        println!(" 9. Confirm turno");
        println!("10. Cancel turno");
        println!("11. Mark turno attended");
        println!("12. Delete turno");
        println!("13. View available slots");
        println!(" 0. Exit");
        println!("{}", "-".repeat(20));
    }

    fn get_input(&self, prompt: &str, default: Option<&str>) -> String {
        if let Some(def) = default {
            print!("{} [{}]: ", prompt, def);
        } else {
            print!("{}: ", prompt);
        }
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            return default.unwrap_or("").to_string();
        }
        let input = input.trim();

        if input.is_empty() {
            default.unwrap_or("").to_string()
        } else {
            input.to_string()
        }
    }

    /// Like `get_input`, but an empty answer means "leave unchanged".
    fn get_optional(&self, prompt: &str) -> Option<String> {
        let value = self.get_input(&format!("{} (blank to keep)", prompt), None);
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    fn get_int_input(&self, prompt: &str, default: Option<i32>) -> i32 {
        loop {
            let default_str = default.map(|d| d.to_string());
            let input = self.get_input(prompt, default_str.as_deref());

            if let Ok(value) = input.parse::<i32>() {
                return value;
            }
            println!("Please enter a valid number");
        }
    }

    fn report(&self, err: AgendaError) {
        println!("\n[{}] {}", err.kind().code(), err);
    }

    fn print_persona(&self, view: &PersonaView) {
        let p = &view.persona;
        println!(
            "  {} | {} <{}> | DNI {} | tel {} | born {} ({} years) | {}",
            &p.id[..8],
            p.nombre,
            p.email,
            p.dni,
            p.telefono,
            p.fecha_nacimiento.format("%Y-%m-%d"),
            view.edad,
            if p.habilitado { "enabled" } else { "DISABLED" }
        );
    }

    fn print_turno(&self, turno: &Turno) {
        println!(
            "  {} | {} {} | {:10} | persona {}",
            &turno.id[..8],
            turno.fecha.format("%Y-%m-%d"),
            turno.hora_label(),
            turno.estado.as_str(),
            &turno.persona_id[..8.min(turno.persona_id.len())]
        );
    }

    /// Accepts a full id or a unique prefix of one.
    fn resolve_persona_id(&mut self, prefix: &str) -> String {
        let matches: Vec<String> = match self.agenda.personas().list() {
            Ok(all) => all
                .into_iter()
                .map(|v| v.persona.id)
                .filter(|id| id.starts_with(prefix))
                .collect(),
            Err(_) => Vec::new(),
        };
        if matches.len() == 1 {
            matches[0].clone()
        } else {
            prefix.to_string()
        }
    }

    fn resolve_turno_id(&mut self, prefix: &str) -> String {
        let matches: Vec<String> = match self.agenda.turnos().list() {
            Ok(all) => all
                .into_iter()
                .map(|t| t.id)
                .filter(|id| id.starts_with(prefix))
                .collect(),
            Err(_) => Vec::new(),
        };
        if matches.len() == 1 {
            matches[0].clone()
        } else {
            prefix.to_string()
        }
    }

    fn register_persona(&mut self) {
        println!("\n--- Register Persona ---");

        let data = NuevaPersona {
            nombre: self.get_input("Name", None),
            email: self.get_input("Email", None),
            dni: self.get_input("DNI", None),
            telefono: self.get_input("Phone", None),
            fecha_nacimiento: self.get_input("Birth date (YYYY-MM-DD)", None),
        };

        let result = self.agenda.personas().create(data);
        match result {
            Ok(view) => {
                println!("\nPersona registered:");
                self.print_persona(&view);
            }
            Err(e) => self.report(e),
        }
    }

    fn list_personas(&mut self) {
        let result = self.agenda.personas().list();
        match result {
            Ok(all) if all.is_empty() => println!("\nNo personas registered"),
            Ok(all) => {
                println!("\n--- Personas ({}) ---", all.len());
                for view in &all {
                    self.print_persona(view);
                }
            }
            Err(e) => self.report(e),
        }
    }

    fn show_persona(&mut self) {
        let prefix = self.get_input("Persona id", None);
        let id = self.resolve_persona_id(&prefix);
        let result = self.agenda.personas().get(&id);
        match result {
            Ok(view) => {
                self.print_persona(&view);
                let turnos = self.agenda.turnos().list_for_persona(&id);
                if let Ok(turnos) = turnos {
                    println!("  Turnos: {}", turnos.len());
                    for turno in &turnos {
                        self.print_turno(turno);
                    }
                }
            }
            Err(e) => self.report(e),
        }
    }

    fn update_persona(&mut self) {
        println!("\n--- Update Persona ---");
        let prefix = self.get_input("Persona id", None);
        let id = self.resolve_persona_id(&prefix);

        let habilitado = match self.get_optional("Enabled (y/n)").as_deref() {
            Some("y") | Some("Y") => Some(true),
            Some("n") | Some("N") => Some(false),
            _ => None,
        };
        let patch = PersonaPatch {
            nombre: self.get_optional("Name"),
            email: self.get_optional("Email"),
            telefono: self.get_optional("Phone"),
            habilitado,
            ..PersonaPatch::default()
        };

        let result = self.agenda.personas().update(&id, patch);
        match result {
            Ok(view) => {
                println!("\nPersona updated:");
                self.print_persona(&view);
            }
            Err(e) => self.report(e),
        }
    }

    fn delete_persona(&mut self) {
        let prefix = self.get_input("Persona id", None);
        let id = self.resolve_persona_id(&prefix);
        let result = self.agenda.personas().delete(&id);
        match result {
            Ok(()) => println!("\nPersona deleted"),
            Err(e) => self.report(e),
        }
    }

    fn book_turno(&mut self) {
        println!("\n--- Book Turno ---");
        let tomorrow = (self.agenda.today() + chrono::Duration::days(1)).to_string();

        let prefix = self.get_input("Persona id", None);
        let persona_id = self.resolve_persona_id(&prefix);
        let fecha = self.get_input("Date (YYYY-MM-DD)", Some(&tomorrow));

        let open = self.agenda.turnos().available_slots(&fecha);
        if let Ok(slots) = open {
            println!("Open slots: {}", slots.horarios.join(", "));
        }
        let hora = self.get_input("Time (HH:MM)", None);

        let data = NuevoTurno {
            persona_id,
            fecha,
            hora,
            estado: None,
        };
        let result = self.agenda.turnos().create(data);
        match result {
            Ok(turno) => {
                println!("\nTurno booked:");
                self.print_turno(&turno);
            }
            Err(e) => self.report(e),
        }
    }

    fn list_turnos(&mut self) {
        let result = self.agenda.turnos().list();
        match result {
            Ok(all) if all.is_empty() => println!("\nNo turnos booked"),
            Ok(all) => {
                println!("\n--- Turnos ({}) ---", all.len());
                let mut current_date = None;
                for turno in &all {
                    if Some(turno.fecha) != current_date {
                        current_date = Some(turno.fecha);
                        println!("\n{}:", turno.fecha.format("%A, %Y-%m-%d"));
                    }
                    self.print_turno(turno);
                }
            }
            Err(e) => self.report(e),
        }
    }

    fn update_turno(&mut self) {
        println!("\n--- Update Turno ---");
        let prefix = self.get_input("Turno id", None);
        let id = self.resolve_turno_id(&prefix);

        let estado = match self.get_optional("State (pendiente/confirmado/cancelado/asistido)") {
            Some(raw) => match raw.parse::<Estado>() {
                Ok(estado) => Some(estado),
                Err(e) => return self.report(e),
            },
            None => None,
        };
        let patch = TurnoPatch {
            fecha: self.get_optional("Date (YYYY-MM-DD)"),
            hora: self.get_optional("Time (HH:MM)"),
            estado,
        };

        let result = self.agenda.turnos().update(&id, patch);
        match result {
            Ok(turno) => {
                println!("\nTurno updated:");
                self.print_turno(&turno);
            }
            Err(e) => self.report(e),
        }
    }

    fn change_turno(&mut self, action: &str) {
        let prefix = self.get_input("Turno id", None);
        let id = self.resolve_turno_id(&prefix);
        let result = match action {
            "confirm" => self.agenda.turnos().confirm(&id),
            "cancel" => self.agenda.turnos().cancel(&id),
            _ => self.agenda.turnos().mark_attended(&id),
        };
        match result {
            Ok(turno) => self.print_turno(&turno),
            Err(e) => self.report(e),
        }
    }

    fn delete_turno(&mut self) {
        let prefix = self.get_input("Turno id", None);
        let id = self.resolve_turno_id(&prefix);
        let result = self.agenda.turnos().delete(&id);
        match result {
            Ok(()) => println!("\nTurno deleted"),
            Err(e) => self.report(e),
        }
    }

    fn view_available_slots(&mut self) {
        let today = self.agenda.today().to_string();
        let fecha = self.get_input("Date (YYYY-MM-DD)", Some(&today));

        let result = self.agenda.turnos().available_slots(&fecha);
        match result {
            Ok(slots) if slots.horarios.is_empty() => {
                println!("\nNo available slots on {}", slots.fecha)
            }
            Ok(slots) => {
                println!(
                    "\n--- Available Slots {} ({} total) ---",
                    slots.fecha.format("%A, %Y-%m-%d"),
                    slots.horarios.len()
                );
                for row in slots.horarios.chunks(6) {
                    println!("  {}", row.join("  "));
                }
            }
            Err(e) => self.report(e),
        }
    }

    fn run(&mut self) {
        self.print_header();

        while self.running {
            self.print_menu();

            let choice = self.get_int_input("Enter choice", Some(13));

            match choice {
                1 => self.register_persona(),
                2 => self.list_personas(),
                3 => self.show_persona(),
                4 => self.update_persona(),
                5 => self.delete_persona(),
                6 => self.book_turno(),
                7 => self.list_turnos(),
                8 => self.update_turno(),
                9 => self.change_turno("confirm"),
                10 => self.change_turno("cancel"),
                11 => self.change_turno("attend"),
                12 => self.delete_turno(),
                13 => self.view_available_slots(),
                0 => {
                    self.running = false;
                    println!("\nGoodbye!");
                }
                _ => println!("Invalid choice"),
            }
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    let agenda = AgendaConfig::load().and_then(|config| {
        tracing::info!(database = %config.database_path, "Opening agenda");
        Agenda::open(config)
    });

    match agenda {
        Ok(agenda) => AgendaCLI::new(agenda).run(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to start");
            eprintln!("[{}] {}", e.kind().code(), e);
            std::process::exit(1);
        }
    }
}
