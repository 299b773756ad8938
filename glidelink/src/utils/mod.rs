use colored::{ColoredString, Colorize};
use glidelink_core::DeclarationPhase;

pub fn print_error(message: &str) {
    eprintln!("{label} {message}", label = "Error:".red().bold());
}

pub fn print_success(message: &str) {
    println!("{mark} {message}", mark = "✓".green().bold());
}

pub fn print_warning(message: &str) {
    eprintln!("{mark} {message}", mark = "⚠".yellow().bold());
}

pub fn print_info(message: &str) {
    eprintln!("{mark} {message}", mark = "ℹ".blue().bold());
}

pub fn phase_label(phase: DeclarationPhase) -> ColoredString {
    let text = phase.to_string();
    match phase {
        DeclarationPhase::Ended => text.green(),
        DeclarationPhase::Failed => text.red(),
        DeclarationPhase::Begun | DeclarationPhase::Adding => text.yellow(),
        DeclarationPhase::Idle => text.normal(),
    }
}
