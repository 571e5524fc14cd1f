//! Serial port selection.
//!
//! Resolution order: explicit `--port` flag (or environment variable),
//! then the remembered port from the config file, then USB detection.
//! With several plausible candidates an interactive picker is shown;
//! in non-interactive mode anything short of a single unambiguous
//! candidate is an error.

use anyhow::Result;
use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Select};
use log::{debug, info};

use crate::CliError;
use crate::config::Config;
use stmloader::{DetectedPort, UsbDevice, detect_ports};

/// Port selection inputs.
pub(crate) struct SerialOptions {
    /// Explicitly requested port, if any.
    pub(crate) port: Option<String>,
    /// Fail instead of prompting.
    pub(crate) non_interactive: bool,
}

/// Resolve the serial port to use for this invocation.
pub(crate) fn select_serial_port(options: &SerialOptions, config: &mut Config) -> Result<String> {
    if let Some(port) = &options.port {
        debug!("Using explicitly requested port {port}");
        return Ok(port.clone());
    }

    let ports = detect_ports();

    if let Some(saved) = &config.port {
        if ports.iter().any(|p| &p.name == saved) {
            info!("Using remembered port {saved}");
            return Ok(saved.clone());
        }
        debug!("Remembered port {saved} is not present, ignoring");
    }

    if ports.is_empty() {
        return Err(CliError::Usage("no serial ports found".to_string()).into());
    }

    // A lone bootloader VCP needs no prompt in either mode.
    let bootloaders: Vec<&DetectedPort> = ports
        .iter()
        .filter(|p| p.device == UsbDevice::Bootloader)
        .collect();
    if let [port] = bootloaders.as_slice() {
        info!("Auto-selected bootloader VCP {}", port.name);
        return Ok(port.name.clone());
    }

    if options.non_interactive {
        return match ports.as_slice() {
            [port] => Ok(port.name.clone()),
            _ => Err(CliError::Usage(format!(
                "{} serial ports found, specify one with --port",
                ports.len()
            ))
            .into()),
        };
    }

    if let [port] = ports.as_slice() {
        eprintln!(
            "{} Using the only serial port: {} ({})",
            style("*").cyan(),
            style(&port.name).bold(),
            port.device.name()
        );
        return Ok(port.name.clone());
    }

    if !console::user_attended_stderr() {
        return Err(CliError::Usage(format!(
            "{} serial ports found and no terminal to prompt on, specify one with --port",
            ports.len()
        ))
        .into());
    }

    let selected = prompt_for_port(&ports)?;

    if Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Remember {selected} for future runs?"))
        .default(false)
        .interact()?
    {
        config.port = Some(selected.clone());
        config.save();
    }

    Ok(selected)
}

fn prompt_for_port(ports: &[DetectedPort]) -> Result<String> {
    let items: Vec<String> = ports.iter().map(format_port).collect();

    let choice = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select a serial port")
        .items(&items)
        .default(default_index(ports))
        .interact_opt()?;

    match choice {
        Some(index) => Ok(ports[index].name.clone()),
        None => Err(CliError::Cancelled("port selection cancelled".to_string()).into()),
    }
}

/// Pre-select the most plausible candidate in the picker.
fn default_index(ports: &[DetectedPort]) -> usize {
    ports
        .iter()
        .position(|p| p.device == UsbDevice::Bootloader)
        .or_else(|| ports.iter().position(|p| p.device.is_known()))
        .unwrap_or(0)
}

fn format_port(port: &DetectedPort) -> String {
    let mut label = format!("{} - {}", port.name, port.device.name());
    if let Some(product) = &port.product {
        label.push_str(&format!(" ({product})"));
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str, device: UsbDevice) -> DetectedPort {
        DetectedPort {
            name: name.to_string(),
            device,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial: None,
        }
    }

    #[test]
    fn test_default_index_prefers_bootloader() {
        let ports = vec![
            port("/dev/ttyUSB0", UsbDevice::Ch340),
            port("/dev/ttyACM0", UsbDevice::Bootloader),
        ];
        assert_eq!(default_index(&ports), 1);
    }

    #[test]
    fn test_default_index_falls_back_to_known_bridge() {
        let ports = vec![
            port("/dev/ttyS0", UsbDevice::Unknown),
            port("/dev/ttyUSB0", UsbDevice::Cp210x),
        ];
        assert_eq!(default_index(&ports), 1);
    }

    #[test]
    fn test_default_index_unknown_only() {
        let ports = vec![port("/dev/ttyS0", UsbDevice::Unknown)];
        assert_eq!(default_index(&ports), 0);
    }

    #[test]
    fn test_explicit_port_wins() {
        let options = SerialOptions {
            port: Some("/dev/ttyACM9".to_string()),
            non_interactive: true,
        };
        let mut config = Config {
            port: Some("/dev/ttyACM0".to_string()),
        };
        let selected = select_serial_port(&options, &mut config).unwrap();
        assert_eq!(selected, "/dev/ttyACM9");
    }

    #[test]
    fn test_format_port_includes_product() {
        let mut p = port("/dev/ttyACM0", UsbDevice::Bootloader);
        p.product = Some("STM32 Bootloader".to_string());
        let label = format_port(&p);
        assert!(label.contains("/dev/ttyACM0"));
        assert!(label.contains("STM32 Bootloader"));
    }
}
