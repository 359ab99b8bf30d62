use console::style;

use shift_core::{MigrationState, MigrationStatus};

use super::MigrateAction;

pub fn print_header(action: MigrateAction, dry_run: bool) {
    let title = match action {
        MigrateAction::Status => "Migration Status",
        MigrateAction::Up(_) | MigrateAction::Down(_) => "Migrations",
    };

    println!();
    print!("  {} {}", style("shift").bold().cyan(), style(title).bold());
    if dry_run && action != MigrateAction::Status {
        print!(" {}", style("(dry run)").yellow());
    }
    println!();
    println!();
}

pub fn print_status(statuses: &[MigrationStatus]) {
    for line in status_lines(statuses) {
        println!("{}", line);
    }
    println!();
}

pub fn print_steps(verb: &str, names: &[String], dry_run: bool) {
    if names.is_empty() {
        println!("  {} Nothing to do", style("ℹ").blue());
        println!();
        return;
    }

    for name in names {
        println!("  {} {}: {}", style("✓").green(), verb, style(name).cyan());
    }
    println!();

    if dry_run {
        println!(
            "  {} {} migration(s) ran and were rolled back",
            style("ℹ").blue(),
            names.len()
        );
    } else {
        println!(
            "  {} {} {} migration(s)",
            style("✓").green(),
            verb,
            names.len()
        );
    }
    println!();
}

/// Render a name/status table followed by a summary line.
fn status_lines(statuses: &[MigrationStatus]) -> Vec<String> {
    if statuses.is_empty() {
        return vec![format!("  {} No migrations registered", style("ℹ").blue())];
    }

    let width = statuses
        .iter()
        .map(|s| s.name.len())
        .chain(std::iter::once("Migration".len()))
        .max()
        .unwrap_or_default();

    let mut lines = vec![format!(
        "    {}  {}  {}",
        style(format!("{:<width$}", "Migration")).dim(),
        style(format!("{:<7}", "Status")).dim(),
        style("Applied at").dim()
    )];

    for status in statuses {
        let name = format!("{:<width$}", status.name);
        let state = format!("{:<7}", status.state.to_string());
        let line = match status.state {
            MigrationState::Applied => format!(
                "  {} {}  {}  {}",
                style("✓").green(),
                style(name).cyan(),
                style(state).green(),
                status
                    .applied_at
                    .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default()
            ),
            MigrationState::Pending => format!(
                "  {} {}  {}",
                style("○").yellow(),
                style(name).yellow(),
                style(state).yellow()
            ),
        };
        lines.push(line.trim_end().to_string());
    }

    let applied = statuses.iter().filter(|s| s.is_applied()).count();
    lines.push(String::new());
    lines.push(format!(
        "  {} {} applied, {} pending",
        style("ℹ").blue(),
        applied,
        statuses.len() - applied
    ));

    lines
}
