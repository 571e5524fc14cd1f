//! Serial port listing.

use anyhow::Result;
use console::style;
use serde::Serialize;

use stmloader::detect_ports;

#[derive(Serialize)]
struct PortEntry {
    name: String,
    device: String,
    vid: Option<u16>,
    pid: Option<u16>,
}

/// List available serial ports, as text or JSON.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let ports = detect_ports();

    if json {
        let entries: Vec<PortEntry> = ports
            .iter()
            .map(|p| PortEntry {
                name: p.name.clone(),
                device: p.device.name().to_string(),
                vid: p.vid,
                pid: p.pid,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if ports.is_empty() {
        eprintln!("{} No serial ports found", style("!").yellow());
        return Ok(());
    }

    println!("Available serial ports:");
    for p in &ports {
        let label = if p.device.is_known() {
            style(p.device.name()).green().to_string()
        } else {
            style(p.device.name()).dim().to_string()
        };
        match (p.vid, p.pid) {
            (Some(vid), Some(pid)) => {
                println!("  {:<20} {label} (vid {vid:#06x}, pid {pid:#06x})", p.name);
            }
            _ => println!("  {:<20} {label}", p.name),
        }
    }
    Ok(())
}
