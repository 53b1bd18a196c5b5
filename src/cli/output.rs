use std::io::IsTerminal;

use colored::Colorize;

use crate::types::Athlete;

pub fn warning_label(is_tty: bool) -> String {
    if is_tty {
        "WARNING".yellow().bold().to_string()
    } else {
        "WARNING".to_string()
    }
}

/// Print a per-item warning to stderr; the batch carries on.
pub fn print_warning(msg: &str) {
    eprintln!("{}: {msg}", warning_label(std::io::stderr().is_terminal()));
}

pub fn authorized_line(athlete: &Athlete) -> String {
    format!(
        "Authorized to access account of {} {} (id {}).",
        athlete.firstname.as_deref().unwrap_or_default(),
        athlete.lastname.as_deref().unwrap_or_default(),
        athlete.id
    )
}

/// Progress line after an activity went up, e.g.
/// `  https://www.strava.com/activities/9 (duplicate)`.
pub fn uploaded_line(uri: &str, duplicate: bool) -> String {
    let suffix = if duplicate { " (duplicate)" } else { "" };
    format!("  {uri}{suffix}")
}
