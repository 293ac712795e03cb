//! cli::commands::completion
//!
//! Print a shell completion script for `gitprovider` on stdout.
//!
//! ```bash
//! gitprovider completion zsh > ~/.zfunc/_gitprovider
//! ```

use std::io::Write;

use anyhow::Result;
use clap::CommandFactory;
use clap_complete::{generate, shells};

use crate::cli::args::{Cli, Shell};

/// Run `completion`.
pub fn completion(shell: Shell) -> Result<()> {
    let mut out = std::io::stdout().lock();
    write_completion(shell, &mut out);
    out.flush()?;
    Ok(())
}

fn write_completion(shell: Shell, out: &mut dyn Write) {
    let mut cmd = Cli::command();
    let bin = cmd.get_name().to_string();
    match shell {
        Shell::Bash => generate(shells::Bash, &mut cmd, bin, out),
        Shell::Zsh => generate(shells::Zsh, &mut cmd, bin, out),
        Shell::Fish => generate(shells::Fish, &mut cmd, bin, out),
        Shell::PowerShell => generate(shells::PowerShell, &mut cmd, bin, out),
    }
}
