//! Manual connect and disconnect recording.

use std::io::Write;

use anyhow::Result;

use crate::Config;
use crate::commands::{now, open_database};

/// Appends one event stamped with the current local time.
pub fn run<W: Write>(
    writer: &mut W,
    config: &Config,
    connected: bool,
    device_name: Option<&str>,
) -> Result<()> {
    let mut db = open_database(config)?;
    let record = db.append_event(now(), connected, device_name.unwrap_or_default())?;
    tracing::info!(seq = record.seq, connected, "event recorded");

    let kind = if connected { "connect" } else { "disconnect" };
    writeln!(writer, "Recorded {kind} at {}", record.timestamp)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_appends_in_order() {
        let temp = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: temp.path().join("nested"),
            ..Config::default()
        };

        let mut output = Vec::new();
        run(&mut output, &config, true, Some("Pixel 7")).unwrap();
        run(&mut output, &config, false, None).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert!(output.starts_with("Recorded connect at "));
        assert!(output.contains("Recorded disconnect at "));

        let events = open_database(&config).unwrap().list_events().unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].connected);
        assert_eq!(events[0].device_name, "Pixel 7");
        assert!(!events[1].connected);
        assert_eq!(events[1].device_name, "");
    }
}
