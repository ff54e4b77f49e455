//! Import command for ingesting a legacy CSV event log.
//!
//! The legacy log is a CSV file with a `timestamp,isConnected` header and an
//! optional third `deviceName` column. Connection flags were written as
//! `True`/`False`; any casing is accepted. Any field may be double-quoted.
//! Timestamps are imported verbatim so minute-precision rows keep their
//! original text.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use zb_core::{DeviceEvent, parse_connected_flag};

use crate::Config;
use crate::commands::open_database;

pub fn run<W: Write>(writer: &mut W, config: &Config, path: &Path) -> Result<usize> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let events = parse_events(BufReader::new(file))?;

    let mut db = open_database(config)?;
    let inserted = db.append_events(&events)?;
    writeln!(writer, "Imported {inserted} events from {}", path.display())?;
    Ok(inserted)
}

fn parse_events<R: BufRead>(reader: R) -> Result<Vec<DeviceEvent>> {
    let mut events = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || (idx == 0 && is_header(trimmed)) {
            continue;
        }

        // Timestamps and flags never contain commas, so only the name may.
        let mut fields = trimmed.splitn(3, ',');
        let timestamp = fields.next().map(unquote).unwrap_or_default();
        let flag = fields.next().map(unquote).unwrap_or_default();
        let device_name = fields.next().map(unquote).unwrap_or_default();

        let Some(connected) = parse_connected_flag(&flag) else {
            tracing::warn!(line = idx + 1, %flag, "skipping row with invalid connection flag");
            continue;
        };

        events.push(DeviceEvent {
            timestamp,
            connected,
            device_name,
        });
    }
    Ok(events)
}

fn is_header(line: &str) -> bool {
    line.split(',')
        .next()
        .is_some_and(|first| unquote(first).eq_ignore_ascii_case("timestamp"))
}

/// Strips CSV quoting from a field.
fn unquote(field: &str) -> String {
    let field = field.trim();
    field
        .strip_prefix('"')
        .and_then(|f| f.strip_suffix('"'))
        .map_or_else(|| field.to_string(), |inner| inner.replace("\"\"", "\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    use zb_core::reconstruct_sessions;

    fn parse(input: &str) -> Vec<DeviceEvent> {
        parse_events(input.as_bytes()).unwrap()
    }

    #[test]
    fn parse_events_accepts_legacy_two_column_log() {
        let events = parse(
            "timestamp,isConnected\n\
             2025-01-15 09:00,True\n\
             2025-01-15 09:45,False\n",
        );

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].timestamp, "2025-01-15 09:00");
        assert!(events[0].connected);
        assert!(!events[1].connected);
        assert_eq!(events[1].device_name, "");
    }

    #[test]
    fn parse_events_reads_device_name_column() {
        let events = parse(
            "timestamp,isConnected,deviceName\n\
             2025-01-15 09:00:05,true,\"Apple, Inc. iPhone\"\n\
             2025-01-15 09:10:00,FALSE,Pixel 7\n",
        );

        assert_eq!(events[0].device_name, "Apple, Inc. iPhone");
        assert_eq!(events[1].device_name, "Pixel 7");
        assert!(!events[1].connected);
    }

    #[test]
    fn parse_events_unquotes_every_column() {
        let events = parse(
            "\"timestamp\",\"isConnected\",\"deviceName\"\n\
             \"2025-01-15 09:00\",\"True\",\"Apple, Inc. iPhone\"\n\
             \"2025-01-15 09:30:00\",\"False\",Pixel 7\n",
        );

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].timestamp, "2025-01-15 09:00");
        assert!(events[0].connected);
        assert_eq!(events[0].device_name, "Apple, Inc. iPhone");
        assert_eq!(events[1].timestamp, "2025-01-15 09:30:00");
        assert!(!events[1].connected);
    }

    #[test]
    fn parse_events_skips_invalid_flags_and_blank_lines() {
        let events = parse(
            "timestamp,isConnected\n\
             \n\
             2025-01-15 09:00,maybe\n\
             2025-01-15 09:05,1\n\
             2025-01-15 09:10,True\n",
        );

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp, "2025-01-15 09:10");
    }

    #[test]
    fn parse_events_without_header() {
        let events = parse("2025-01-15 09:00,True\n");
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn import_appends_and_reconstructs() {
        let temp = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: temp.path().to_path_buf(),
            ..Config::default()
        };
        let csv = temp.path().join("device_events.csv");
        std::fs::write(
            &csv,
            "timestamp,isConnected\n\
             2025-01-15 09:00,True\n\
             not a time,False\n\
             2025-01-15 09:30,False\n",
        )
        .unwrap();

        let mut output = Vec::new();
        let inserted = run(&mut output, &config, &csv).unwrap();
        assert_eq!(inserted, 3);
        assert!(String::from_utf8(output).unwrap().starts_with("Imported 3 events"));

        let events = open_database(&config).unwrap().list_events().unwrap();
        let now = zb_core::parse_timestamp("2025-01-15 12:00").unwrap();
        let sessions = reconstruct_sessions(&events, now);
        assert_eq!(sessions.len(), 1);
        assert!((sessions[0].duration_seconds - 1800.0).abs() < f64::EPSILON);
    }

    #[test]
    fn import_missing_file_fails() {
        let temp = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: temp.path().to_path_buf(),
            ..Config::default()
        };

        let err = run(&mut Vec::new(), &config, &temp.path().join("missing.csv")).unwrap_err();
        assert!(err.to_string().contains("failed to open"));
    }
}
