use std::io::{self, BufRead, Write};

use console::{style, Term};
use tpuff_schema::{Confirm, ConfirmPrompt};

/// Print `message` and read one line from stdin, trimmed. EOF reads as an
/// empty answer.
pub fn ask(message: &str) -> io::Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{message} ")?;
    stdout.flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().to_string())
}

/// `y` or `yes`, any case
pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Confirmation for schema writes: an arrow-key prompt on a terminal, a
/// plain `[y/N]` line otherwise (pipes, tests)
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &ConfirmPrompt) -> bool {
        let message = prompt.message();
        if Term::stdout().is_term() && Term::stderr().is_term() {
            return dialoguer::Confirm::new()
                .with_prompt(message)
                .default(false)
                .interact()
                .unwrap_or(false);
        }
        match ask(&format!("{} {}", style(message).bold(), style("[y/N]").dim())) {
            Ok(answer) => is_yes(&answer),
            Err(err) => {
                log::warn!("Could not read confirmation: {err}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yes_answers() {
        for answer in ["y", "Y", "yes", " YES "] {
            assert!(is_yes(answer), "{answer}");
        }
        for answer in ["", "n", "no", "yolo", "yess"] {
            assert!(!is_yes(answer), "{answer}");
        }
    }
}
