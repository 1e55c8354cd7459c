//! Shell completion scripts for the `partyq` binary.

use std::io::{self, Write};
use std::path::Path;

use clap::CommandFactory;
use clap_complete::{generate, Shell};

use crate::cli::{Cli, CompletionShell};
use crate::error::CliError;

const BIN_NAME: &str = "partyq";

/// Print the script, or write it to `output` and print the path.
pub fn run_completions(shell: CompletionShell, output: Option<&Path>) -> Result<(), CliError> {
    let script = render_completions(shell);
    let Some(path) = output else {
        io::stdout().lock().write_all(&script)?;
        return Ok(());
    };

    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, &script)?;
    tracing::debug!(?shell, path = %path.display(), "Wrote completion script");
    println!("{}", path.display());
    Ok(())
}

pub fn render_completions(shell: CompletionShell) -> Vec<u8> {
    let mut script = Vec::new();
    generate(Shell::from(shell), &mut Cli::command(), BIN_NAME, &mut script);
    script
}
