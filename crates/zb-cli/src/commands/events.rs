//! Events command for dumping the raw log.

use std::io::Write;

use anyhow::Result;

use crate::Config;
use crate::commands::open_database;

/// Writes every logged event as one JSON object per line, in append order.
pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let db = open_database(config)?;
    for event in db.list_events()? {
        writeln!(writer, "{}", serde_json::to_string(&event)?)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::NaiveDate;
    use insta::assert_snapshot;

    #[test]
    fn events_command_outputs_jsonl() {
        let temp = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: temp.path().to_path_buf(),
            ..Config::default()
        };
        let at = |h, m| {
            NaiveDate::from_ymd_opt(2025, 1, 15)
                .and_then(|d| d.and_hms_opt(h, m, 0))
                .unwrap()
        };
        let mut db = open_database(&config).unwrap();
        db.append_event(at(9, 0), true, "Pixel 7").unwrap();
        db.append_event(at(9, 30), false, "").unwrap();

        let mut output = Vec::new();
        run(&mut output, &config).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r#"
        {"seq":1,"timestamp":"2025-01-15 09:00:00","connected":true,"deviceName":"Pixel 7"}
        {"seq":2,"timestamp":"2025-01-15 09:30:00","connected":false,"deviceName":""}
        "#);
    }
}
