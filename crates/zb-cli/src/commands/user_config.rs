//! User settings commands.

use std::io::Write;

use anyhow::{Context, Result};

use crate::Config;
use crate::commands::settings_store;

/// Prints the user settings as JSON.
pub fn show<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let user_config = settings_store(config)
        .load()
        .context("failed to load user settings")?;
    writeln!(writer, "{}", serde_json::to_string_pretty(&user_config)?)?;
    Ok(())
}

/// Validates and stores a new daily target.
pub fn set_target<W: Write>(writer: &mut W, config: &Config, minutes: i64) -> Result<()> {
    let user_config = settings_store(config).set_daily_target(minutes)?;
    writeln!(
        writer,
        "Daily target set to {} minutes",
        user_config.daily_target.minutes()
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(temp: &tempfile::TempDir) -> Config {
        Config {
            data_dir: temp.path().to_path_buf(),
            ..Config::default()
        }
    }

    #[test]
    fn set_target_then_show() {
        let temp = tempfile::tempdir().unwrap();
        let config = temp_config(&temp);

        let mut output = Vec::new();
        set_target(&mut output, &config, 90).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Daily target set to 90 minutes\n"
        );

        let mut output = Vec::new();
        show(&mut output, &config).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(json["dailyTarget"], 90);
        assert_eq!(json["settings"]["zenHours"], "20:00-22:00");
    }

    #[test]
    fn set_target_out_of_range_fails() {
        let temp = tempfile::tempdir().unwrap();
        let config = temp_config(&temp);

        let err = set_target(&mut Vec::new(), &config, 481).unwrap_err();
        assert!(err.to_string().contains("between 30 and 480"), "{err}");
    }
}
