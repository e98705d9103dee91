//! CLI interface using clap.
//!
//! Provides command-line arguments and the interactive directory prompt.

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use colored::Colorize;

/// UGREEN LED installer for TrueNAS SCALE.
///
/// Downloads the prebuilt `led-ugreen` kernel module matching the running
/// TrueNAS release, keeps it in a persistent dataset directory, and installs
/// the LED monitoring services. Re-run after every TrueNAS update.
#[derive(Parser, Debug)]
#[command(name = "ugreen-leds-installer")]
#[command(author, about, long_about = None, disable_version_flag = true)]
pub struct Cli {
    /// Override the detected TrueNAS version (e.g. 24.10.2).
    #[arg(short = 'v', long = "version", value_name = "VERSION")]
    pub os_version: Option<String>,

    /// Persistent directory holding the module, config and scripts.
    #[arg(long, value_name = "PATH")]
    pub persist_dir: Option<PathBuf>,

    /// Use the current working directory as the persistent directory.
    #[arg(long)]
    pub use_current_dir: bool,

    /// Pool mount path; the persistent directory is created inside it.
    #[arg(long, value_name = "PATH")]
    pub pool_path: Option<PathBuf>,

    /// Log intended actions without changing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Never prompt; accept defaults.
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Re-download the module and re-clone the repository.
    /// With --uninstall, also delete the persistent directory.
    #[arg(long)]
    pub force: bool,

    /// Remove services, module and installed files.
    #[arg(long, conflicts_with_all = ["status", "register_init"])]
    pub uninstall: bool,

    /// Show the current installation state and exit.
    #[arg(long, conflicts_with = "register_init")]
    pub status: bool,

    /// Register the persistent installer as a TrueNAS post-init command.
    #[arg(long)]
    pub register_init: bool,

    /// Installer configuration file.
    #[arg(long, env = "UGREEN_INSTALLER_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Whether the operator may be asked questions.
    #[must_use]
    pub fn interactive(&self) -> bool {
        !self.yes && io::stdin().is_terminal()
    }
}

/// Ask for the persistent directory. An empty answer accepts `default`.
#[must_use]
pub fn prompt_for_directory(default: &Path) -> Option<PathBuf> {
    println!("{}", "No persistent directory found.".yellow().bold());
    println!(
        "The module, configuration and helper scripts must live on a pool dataset \
         (under /mnt) to survive TrueNAS updates."
    );
    print!(
        "{} [{}]: ",
        "Persistent directory".green(),
        default.display().to_string().cyan()
    );
    if io::stdout().flush().is_err() {
        return None;
    }

    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => {
            let answer = answer.trim();
            (!answer.is_empty()).then(|| PathBuf::from(answer))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read answer, using default");
            None
        }
    }
}
