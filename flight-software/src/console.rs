//! Operator console prompts.
//!
//! Pre-flight state transitions are gated by exact-match keyboard input so
//! that nothing advances on a stray keypress.

use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};

/// Print `prompt` and block until the operator types exactly `expected`.
pub fn prompt_exact(prompt: &str, expected: &str) -> Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    print!("{prompt}");
    io::stdout().flush().ok();
    loop {
        let line = lines
            .next()
            .context("operator console closed")?
            .context("failed to read operator input")?;
        if line.trim() == expected {
            return Ok(());
        }
        print!("Wrong input! Type [{expected}]: ");
        io::stdout().flush().ok();
    }
}

/// Print `prompt` and block until the operator types one of `options`;
/// returns the index of the chosen option.
pub fn prompt_choice(prompt: &str, options: &[&str]) -> Result<usize> {
    if options.is_empty() {
        bail!("prompt_choice needs at least one option");
    }
    let rendered = options.join("] or [");
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    print!("{prompt}");
    io::stdout().flush().ok();
    loop {
        let line = lines
            .next()
            .context("operator console closed")?
            .context("failed to read operator input")?;
        let answer = line.trim();
        if let Some(index) = options.iter().position(|&o| o == answer) {
            return Ok(index);
        }
        print!("Wrong input! Type [{rendered}]: ");
        io::stdout().flush().ok();
    }
}
