//! Scan command for listing attached USB devices.

use std::io::Write;

use anyhow::{Context, Result};
use zb_watch::{LsusbEnumerator, PhoneMatcher, ScannedDevice, scan_devices};

use crate::Config;

pub fn run<W: Write>(writer: &mut W, config: &Config, json: bool) -> Result<()> {
    let enumerator = LsusbEnumerator::new(config.watcher.command_timeout());
    let matcher = PhoneMatcher::new(&config.watcher.phone_patterns)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let devices = runtime
        .block_on(scan_devices(&enumerator, &matcher))
        .context("failed to enumerate USB devices")?;

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&devices)?)?;
    } else {
        write!(writer, "{}", format_devices(&devices))?;
    }
    Ok(())
}

/// One line per device, phones marked with `*`.
pub fn format_devices(devices: &[ScannedDevice]) -> String {
    if devices.is_empty() {
        return "No USB devices found.\n".to_string();
    }

    let mut output = String::new();
    for scanned in devices {
        let marker = if scanned.is_phone { "*" } else { " " };
        let name = if scanned.device.name.is_empty() {
            "(unnamed)"
        } else {
            &scanned.device.name
        };
        output.push_str(&format!("{marker} {:<20}  {name}\n", scanned.id));
    }
    let phones = devices.iter().filter(|d| d.is_phone).count();
    output.push_str(&format!("\n{phones} phone(s) detected\n"));
    output
}
