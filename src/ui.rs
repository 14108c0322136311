//! Terminal front for the dashboard.
//!
//! Renders current state and forwards input to the record manager; every
//! behavioral decision lives in the manager. The only contracts honored
//! here are widget-level ones: required fields re-prompt, the date of
//! birth must not be in the future, and a delete sends nothing unless the
//! user confirms.

use std::io::Write as _;

use chrono::{Local, NaiveDate};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::backend::PatientBackend;
use crate::manager::RecordManager;
use crate::models::{PatientFields, PatientStatus};
use crate::state::DashboardState;

type InputLines = Lines<BufReader<Stdin>>;

/// Read-eval-print loop. Returns when stdin closes or on `quit`.
pub async fn run<B: PatientBackend>(manager: &RecordManager<B>) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    manager.bootstrap().await;
    render(&manager.snapshot());

    loop {
        prompt("> ")?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            continue;
        };

        match command {
            "help" => print_help(),
            "quit" | "exit" => break,
            "signup" | "login" => {
                let (Some(email), Some(password)) = (parts.next(), parts.next()) else {
                    println!("usage: {command} <email> <password>");
                    continue;
                };
                if command == "signup" {
                    manager.sign_up(email, password).await;
                } else {
                    manager.log_in(email, password).await;
                }
                render(&manager.snapshot());
            }
            "logout" => {
                manager.log_out();
                render(&manager.snapshot());
            }
            "list" | "refresh" => {
                manager.refresh().await;
                render(&manager.snapshot());
            }
            "add" => {
                if manager.provider().is_none() {
                    println!("Sign in first.");
                    continue;
                }
                let Some(fields) = prompt_fields(&mut lines, &PatientFields::default()).await?
                else {
                    break;
                };
                manager.set_draft_fields(fields);
                manager.submit().await;
                render(&manager.snapshot());
            }
            "edit" => {
                if manager.provider().is_none() {
                    println!("Sign in first.");
                    continue;
                }
                let Some(id) = parse_id(parts.next(), command) else {
                    continue;
                };
                manager.begin_edit(id);
                let draft = manager.draft();
                if !draft.is_edit() {
                    println!("No patient with id {id}.");
                    continue;
                }
                let Some(fields) = prompt_fields(&mut lines, draft.fields()).await? else {
                    break;
                };
                manager.set_draft_fields(fields);
                manager.submit().await;
                render(&manager.snapshot());
            }
            "delete" => {
                if manager.provider().is_none() {
                    println!("Sign in first.");
                    continue;
                }
                let Some(id) = parse_id(parts.next(), command) else {
                    continue;
                };
                prompt(&format!("Delete patient {id}? [y/N] "))?;
                let Some(answer) = lines.next_line().await? else {
                    break;
                };
                if is_confirmed(&answer) {
                    manager.delete(id).await;
                    render(&manager.snapshot());
                } else {
                    println!("Not deleted.");
                }
            }
            other => println!("Unknown command `{other}` — try `help`."),
        }
    }

    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  signup <email> <password>   create a provider account and sign in");
    println!("  login <email> <password>    sign in");
    println!("  logout                      sign out and forget the stored session");
    println!("  list                        refresh and show the patient list");
    println!("  add                         add a patient (prompts for each field)");
    println!("  edit <id>                   edit a listed patient");
    println!("  delete <id>                 delete a listed patient (asks first)");
    println!("  quit                        exit");
}

fn render(state: &DashboardState) {
    if let Some(error) = &state.error {
        println!("!! {error}");
    }

    let Some(provider) = state.provider else {
        println!("Signed out — `signup <email> <password>` or `login <email> <password>` to begin.");
        return;
    };

    println!("Provider {provider} — {} patient(s)", state.patients.len());
    if !state.patients.is_empty() {
        println!(
            "{:>5}  {:<24} {:<12} {:<11} {}",
            "ID", "NAME", "DOB", "STATUS", "ADDRESS"
        );
        for patient in &state.patients {
            println!(
                "{:>5}  {:<24} {:<12} {:<11} {}",
                patient.id,
                patient.full_name(),
                patient.dob.to_string(),
                patient.status.to_string(),
                patient.address
            );
        }
    }

    if let Some(target) = state.draft.target() {
        println!("(editing patient {target})");
    }
}

fn prompt(text: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{text}")?;
    stdout.flush()
}

fn parse_id(arg: Option<&str>, command: &str) -> Option<i64> {
    match arg.and_then(|a| a.parse().ok()) {
        Some(id) => Some(id),
        None => {
            println!("usage: {command} <id>");
            None
        }
    }
}

/// Walk the form fields once, pre-filled from `current`. Empty input keeps
/// the shown value; required fields re-prompt while blank. `None` means
/// stdin closed mid-form.
async fn prompt_fields(
    lines: &mut InputLines,
    current: &PatientFields,
) -> std::io::Result<Option<PatientFields>> {
    let mut fields = current.clone();

    let Some(first) = ask_required(lines, "First name", &fields.first_name).await? else {
        return Ok(None);
    };
    fields.first_name = first;

    let Some(middle) = ask_optional(lines, "Middle name", fields.middle_name.as_deref()).await?
    else {
        return Ok(None);
    };
    fields.middle_name = middle;

    let Some(last) = ask_required(lines, "Last name", &fields.last_name).await? else {
        return Ok(None);
    };
    fields.last_name = last;

    let Some(dob) = ask_dob(lines, fields.dob).await? else {
        return Ok(None);
    };
    fields.dob = Some(dob);

    let Some(status) = ask_status(lines, fields.status).await? else {
        return Ok(None);
    };
    fields.status = status;

    let Some(address) = ask_required(lines, "Address", &fields.address).await? else {
        return Ok(None);
    };
    fields.address = address;

    Ok(Some(fields))
}

async fn ask(lines: &mut InputLines, label: &str) -> std::io::Result<Option<String>> {
    prompt(&format!("{label}: "))?;
    lines.next_line().await
}

fn with_current(label: &str, current: &str) -> String {
    if current.is_empty() {
        label.to_string()
    } else {
        format!("{label} [{current}]")
    }
}

async fn ask_required(
    lines: &mut InputLines,
    label: &str,
    current: &str,
) -> std::io::Result<Option<String>> {
    loop {
        let Some(answer) = ask(lines, &with_current(label, current)).await? else {
            return Ok(None);
        };
        let answer = answer.trim();
        if !answer.is_empty() {
            return Ok(Some(answer.to_string()));
        }
        if !current.is_empty() {
            return Ok(Some(current.to_string()));
        }
        println!("{label} is required.");
    }
}

/// Optional field: empty keeps the shown value, `-` clears it.
async fn ask_optional(
    lines: &mut InputLines,
    label: &str,
    current: Option<&str>,
) -> std::io::Result<Option<Option<String>>> {
    let Some(answer) = ask(lines, &with_current(label, current.unwrap_or(""))).await? else {
        return Ok(None);
    };
    let answer = answer.trim();
    Ok(Some(match answer {
        "" => current.map(str::to_string),
        "-" => None,
        other => Some(other.to_string()),
    }))
}

async fn ask_dob(
    lines: &mut InputLines,
    current: Option<NaiveDate>,
) -> std::io::Result<Option<NaiveDate>> {
    let shown = current.map(|d| d.to_string()).unwrap_or_default();
    loop {
        let Some(answer) = ask(lines, &with_current("Date of birth (YYYY-MM-DD)", &shown)).await?
        else {
            return Ok(None);
        };
        let answer = answer.trim();
        if answer.is_empty() {
            if let Some(current) = current {
                return Ok(Some(current));
            }
            println!("Date of birth is required.");
            continue;
        }
        match parse_dob(answer, Local::now().date_naive()) {
            Ok(date) => return Ok(Some(date)),
            Err(message) => println!("{message}"),
        }
    }
}

async fn ask_status(
    lines: &mut InputLines,
    current: PatientStatus,
) -> std::io::Result<Option<PatientStatus>> {
    let options = PatientStatus::ALL.map(PatientStatus::as_str).join("/");
    loop {
        let label = format!("Status ({options}) [{current}]");
        let Some(answer) = ask(lines, &label).await? else {
            return Ok(None);
        };
        let answer = answer.trim();
        if answer.is_empty() {
            return Ok(Some(current));
        }
        match PatientStatus::parse(answer) {
            Some(status) => return Ok(Some(status)),
            None => println!("Status must be one of: {options}."),
        }
    }
}

/// Parse a date of birth. The widget caps the value at today; anything
/// later never leaves the form.
fn parse_dob(input: &str, today: NaiveDate) -> Result<NaiveDate, String> {
    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|_| "Enter the date as YYYY-MM-DD.".to_string())?;
    if date > today {
        return Err("Date of birth cannot be in the future.".to_string());
    }
    Ok(date)
}

/// Only an explicit yes confirms a delete.
fn is_confirmed(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
