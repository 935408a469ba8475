// Output formatting

use colored::Colorize;
use serde::Serialize;

/// Print `value` as JSON on stdout
pub fn print_json<T: Serialize>(value: &T, compact: bool) -> anyhow::Result<()> {
    let text = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{text}");
    Ok(())
}

/// Print an error with its cause chain on stderr
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "error:".red().bold(), err);
    for cause in err.chain().skip(1) {
        eprintln!("  {} {}", "caused by:".yellow(), cause);
    }
}
