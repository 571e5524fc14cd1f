//! Flash, erase and execute command implementations.

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

use crate::config::Config;
use crate::{Cli, CliError, get_port, was_interrupted};

use stmloader::Flasher;

fn ensure_not_interrupted() -> Result<()> {
    if was_interrupted() {
        Err(CliError::Cancelled("interrupted".to_string()).into())
    } else {
        Ok(())
    }
}

fn open_flasher(cli: &Cli, config: &mut Config) -> Result<Flasher<stmloader::NativePort>> {
    let port = get_port(cli, config)?;
    if !cli.quiet {
        eprintln!(
            "{} Using port {} at 115200 baud",
            style("*").cyan(),
            style(&port).bold()
        );
    }
    let flasher = Flasher::open(&port).with_context(|| format!("opening port {port}"))?;
    Ok(flasher)
}

/// Flash command implementation.
pub(crate) fn cmd_flash(
    cli: &Cli,
    config: &mut Config,
    firmware: &Path,
    erase: bool,
    execute: bool,
) -> Result<()> {
    if !cli.quiet {
        eprintln!(
            "{} Loading firmware {}",
            style("*").cyan(),
            firmware.display()
        );
    }

    // Load (and possibly convert) the image before touching any port.
    let data = stmloader::image::load(firmware)
        .with_context(|| format!("loading firmware {}", firmware.display()))?;
    if !cli.quiet {
        eprintln!(
            "{} Firmware image: {} bytes",
            style("*").cyan(),
            data.len()
        );
    }

    let mut flasher = open_flasher(cli, config)?;
    ensure_not_interrupted()?;

    if erase {
        if !cli.quiet {
            eprintln!("{} Erasing user application", style("*").yellow());
        }
        flasher.erase_app().context("erasing user application")?;
        ensure_not_interrupted()?;
    }

    let pb = if cli.quiet || !console::colors_enabled_stderr() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(0);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} packets")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb
    };

    flasher
        .download_firmware(&data, |sent, total| {
            pb.set_length(total as u64);
            pb.set_position(sent as u64);
        })
        .context("downloading firmware")?;
    pb.finish_and_clear();

    if !cli.quiet {
        eprintln!("{} Firmware successfully flashed", style("ok").green().bold());
    }

    if execute {
        ensure_not_interrupted()?;
        flasher.execute().context("starting user application")?;
        if !cli.quiet {
            eprintln!("{} User application started", style("ok").green().bold());
        }
    }

    Ok(())
}

/// Erase command implementation.
pub(crate) fn cmd_erase(cli: &Cli, config: &mut Config) -> Result<()> {
    let mut flasher = open_flasher(cli, config)?;
    ensure_not_interrupted()?;

    flasher.erase_app().context("erasing user application")?;
    if !cli.quiet {
        eprintln!("{} User application erased", style("ok").green().bold());
    }
    Ok(())
}

/// Execute command implementation.
pub(crate) fn cmd_execute(cli: &Cli, config: &mut Config) -> Result<()> {
    let mut flasher = open_flasher(cli, config)?;
    ensure_not_interrupted()?;

    flasher.execute().context("starting user application")?;
    if !cli.quiet {
        eprintln!("{} User application started", style("ok").green().bold());
    }
    Ok(())
}
