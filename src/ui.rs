use colored::{ColoredString, Colorize};
use converge::{ConsolidatedErrors, NodeState};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a step indicator
pub fn step(num: usize, total: usize, msg: &str) {
    println!("{} {}", format!("[{}/{}]", num, total).blue().bold(), msg);
}

/// Status symbol for a finished resource
pub fn state_symbol(state: &NodeState) -> ColoredString {
    match state {
        NodeState::Succeeded => "✓".green(),
        NodeState::Failed(err) if err.is_inherited() => "↷".yellow(),
        NodeState::Failed(_) => "✗".red(),
        NodeState::Pending | NodeState::Running => "•".dimmed(),
    }
}

/// Print every failed resource, own failures before inherited ones
pub fn consolidated_errors(errors: &ConsolidatedErrors) {
    error(&format!(
        "errors were encountered with {} resource(s):",
        errors.len()
    ));
    let (inherited, own): (Vec<_>, Vec<_>) = errors.iter().partition(|(_, e)| e.is_inherited());
    for (name, err) in own.into_iter().chain(inherited) {
        eprintln!("    {} {}: {}", "•".red(), name.bold(), err);
    }
}

/// One line per wave, e.g. `wave 2: api, worker`
pub fn wave_lines(waves: &[Vec<&str>]) -> Vec<String> {
    waves
        .iter()
        .enumerate()
        .map(|(i, names)| format!("wave {}: {}", i + 1, names.join(", ")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wave_lines() {
        let waves = vec![vec!["db"], vec!["api", "worker"]];
        assert_eq!(
            wave_lines(&waves),
            vec!["wave 1: db".to_string(), "wave 2: api, worker".to_string()]
        );
        assert!(wave_lines(&[]).is_empty());
    }
}
