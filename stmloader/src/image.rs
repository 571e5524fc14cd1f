//! Firmware image loading.
//!
//! The bootloader consumes raw binary images. ELF build artifacts are
//! converted with the external `objcopy` from the ARM GNU toolchain, the
//! same way the IDE-side tooling produces its `.bin` files; the
//! toolchain stays outside this crate's protocol logic.

use crate::error::{Error, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::process;

/// The external ELF-to-binary converter, expected on PATH.
const OBJCOPY: &str = "arm-none-eabi-objcopy";

/// Load a firmware image, converting ELF input to raw binary first.
///
/// Files with an `.elf` extension (case-insensitive) are run through
/// [`convert_elf`]; anything else is read as-is.
pub fn load(path: &Path) -> Result<Vec<u8>> {
    let bin_path = if is_elf(path) {
        convert_elf(path)?
    } else {
        path.to_path_buf()
    };

    let data = std::fs::read(&bin_path)?;
    debug!("Loaded {} bytes from {}", data.len(), bin_path.display());
    Ok(data)
}

/// Convert an ELF image to raw binary with the external `objcopy`.
///
/// The converted file lands next to the input with a `.bin` extension
/// and its path is returned.
pub fn convert_elf(path: &Path) -> Result<PathBuf> {
    let out = path.with_extension("bin");
    info!(
        "Converting {} to raw binary {}",
        path.display(),
        out.display()
    );

    let status = process::Command::new(OBJCOPY)
        .arg("-O")
        .arg("binary")
        .arg(path)
        .arg(&out)
        .status()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Toolchain(format!(
                    "{OBJCOPY} not found; install the ARM GNU toolchain"
                ))
            } else {
                Error::Io(e)
            }
        })?;

    if !status.success() {
        return Err(Error::Toolchain(format!("{OBJCOPY} exited with {status}")));
    }

    Ok(out)
}

fn is_elf(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("elf"))
}
