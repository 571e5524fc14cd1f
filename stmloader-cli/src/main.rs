//! stmloader CLI - flash, erase and launch firmware through a custom
//! STM32 serial bootloader.
//!
//! ## Features
//!
//! - Flash raw `.bin` images or `.elf` files (converted via objcopy)
//! - Erase the user application and hand control to it
//! - Interactive serial port selection with USB auto-detection
//! - Shell completion generation
//! - Environment variable support

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::error;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod config;
mod serial;

use config::Config;

/// stmloader - flash firmware through a custom STM32 serial bootloader.
///
/// Environment variables:
///   STMLOADER_PORT              - Default serial port
///   STMLOADER_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "stmloader")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "STMLOADER_PORT")]
    pub(crate) port: Option<String>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "STMLOADER_NON_INTERACTIVE")]
    pub(crate) non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Flash a firmware image (.bin, or .elf converted with objcopy).
    Flash {
        /// Path to the firmware file.
        firmware: PathBuf,

        /// Erase the user application before downloading.
        #[arg(long)]
        erase: bool,

        /// Jump to the application after a successful download.
        #[arg(long)]
        execute: bool,
    },

    /// Erase the user application.
    Erase,

    /// Jump to the user application.
    Execute,

    /// List available serial ports.
    ListPorts {
        /// Output the port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: clap_complete::Shell,
    },
}

/// CLI error classes mapped to exit codes.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Usage or setup problem (exit code 2).
    #[error("{0}")]
    Usage(String),

    /// Cancelled by the user (exit code 130).
    #[error("{0}")]
    Cancelled(String),
}

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)) {
        log::debug!("Could not install Ctrl-C handler: {e}");
    }
    stmloader::set_interrupt_checker(was_interrupted);

    if let Err(err) = run(&cli) {
        error!("{err:#}");
        let code = match err.downcast_ref::<CliError>() {
            Some(CliError::Usage(_)) => 2,
            Some(CliError::Cancelled(_)) => 130,
            None => 1,
        };
        std::process::exit(code);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = Config::load();

    match &cli.command {
        Commands::Flash {
            firmware,
            erase,
            execute,
        } => commands::flash::cmd_flash(cli, &mut config, firmware, *erase, *execute),
        Commands::Erase => commands::flash::cmd_erase(cli, &mut config),
        Commands::Execute => commands::flash::cmd_execute(cli, &mut config),
        Commands::ListPorts { json } => commands::ports::cmd_list_ports(*json),
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        }
    }
}

/// Resolve the serial port for protocol commands.
pub(crate) fn get_port(cli: &Cli, config: &mut Config) -> Result<String> {
    let options = serial::SerialOptions {
        port: cli.port.clone(),
        non_interactive: cli.non_interactive,
    };
    serial::select_serial_port(&options, config)
}
