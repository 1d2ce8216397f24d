//! Interactive prompts and process replacement.
//!
//! The installer runs from a live ISO console: confirmation prompts are
//! plain stdin/stdout yes/no questions, and the terminal flow ends by
//! replacing this process with either a login shell or `systemctl reboot`.
//! Non-interactive input (EOF on stdin) always resolves to the prompt's
//! default so the installer stays unattended-safe.

use anyhow::{Context, Result};
use nix::unistd::{execvp, geteuid};
use std::ffi::CString;
use std::io::{self, BufRead, Write};

/// Ask a yes/no question on stdin/stdout.
///
/// Empty input or EOF returns `default_yes`. Anything starting with 'y' or
/// 'Y' is yes; everything else is no.
pub fn ask_yes_no(prompt: &str, default_yes: bool) -> bool {
    let suffix = if default_yes { "[Y/n]" } else { "[y/N]" };
    print!("{} {} ", prompt, suffix);
    let _ = io::stdout().flush();

    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(0) | Err(_) => parse_answer(None, default_yes), // EOF or read error
        Ok(_) => parse_answer(Some(&answer), default_yes),
    }
}

/// Interpret a raw answer line. `None` models EOF / non-interactive input.
fn parse_answer(input: Option<&str>, default_yes: bool) -> bool {
    match input.map(str::trim) {
        None | Some("") => default_yes,
        Some(answer) => answer.to_ascii_lowercase().starts_with('y'),
    }
}

/// Returns true if the process runs with effective UID 0.
pub fn is_root() -> bool {
    geteuid().is_root()
}

/// Re-execute the installer through sudo when not running as root.
///
/// On success this never returns (the process image is replaced). Returns
/// an error only if the exec itself fails.
pub fn ensure_root() -> Result<()> {
    if is_root() {
        return Ok(());
    }

    println!("This installer needs root. Re-executing with sudo...");
    let mut argv = vec!["sudo".to_string()];
    argv.extend(std::env::args());
    exec("sudo", &argv)
}

/// Replace the process with an interactive login shell.
pub fn drop_to_shell() -> Result<()> {
    println!("Dropping to an interactive shell. Type 'exit' to return.");
    exec("bash", &["bash".to_string(), "-l".to_string()])
}

/// Replace the process with `systemctl reboot`.
pub fn reboot() -> Result<()> {
    exec(
        "systemctl",
        &["systemctl".to_string(), "reboot".to_string()],
    )
}

fn exec(program: &str, argv: &[String]) -> Result<()> {
    let prog = CString::new(program).context("program name contains a NUL byte")?;
    let args: Vec<CString> = argv
        .iter()
        .map(|a| CString::new(a.as_str()))
        .collect::<std::result::Result<_, _>>()
        .context("argument contains a NUL byte")?;

    // execvp only returns on failure
    let err = execvp(&prog, &args)
        .err()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown error".to_string());
    anyhow::bail!("Failed to exec {}: {}", program, err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer_eof_returns_default() {
        assert!(parse_answer(None, true));
        assert!(!parse_answer(None, false));
    }

    #[test]
    fn test_parse_answer_empty_returns_default() {
        assert!(parse_answer(Some(""), true));
        assert!(parse_answer(Some("   \n"), true));
        assert!(!parse_answer(Some("\n"), false));
    }

    #[test]
    fn test_parse_answer_yes_variants() {
        assert!(parse_answer(Some("y\n"), false));
        assert!(parse_answer(Some("Y"), false));
        assert!(parse_answer(Some("yes"), false));
        assert!(parse_answer(Some("Yeah"), false));
    }

    #[test]
    fn test_parse_answer_anything_else_is_no() {
        assert!(!parse_answer(Some("n\n"), true));
        assert!(!parse_answer(Some("no"), true));
        assert!(!parse_answer(Some("maybe"), true));
    }

    #[test]
    fn test_exec_failure_reports_program() {
        let err = exec(
            "definitely-not-a-real-binary-xyz",
            &["definitely-not-a-real-binary-xyz".to_string()],
        )
        .expect_err("exec of missing binary must fail");
        assert!(err.to_string().contains("definitely-not-a-real-binary-xyz"));
    }
}
