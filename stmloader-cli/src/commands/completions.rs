//! Shell completion generation.

use clap::CommandFactory;
use clap_complete::{Shell, generate};

/// Write completions for the given shell to stdout.
pub(crate) fn cmd_completions(shell: Shell) {
    let mut cmd = crate::Cli::command();
    generate(shell, &mut cmd, "stmloader", &mut std::io::stdout());
}
