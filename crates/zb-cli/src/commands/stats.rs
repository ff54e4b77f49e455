//! Stats command for showing zen time and points.
//!
//! Prints today's progress toward the daily target, the last seven days, and
//! all-time totals, or the raw snapshot with `--json`.

use std::io::Write;

use anyhow::{Context, Result};
use zb_core::{StatsSnapshot, compute_stats};

use crate::Config;
use crate::commands::{now, open_database, settings_store};

pub fn run<W: Write>(writer: &mut W, config: &Config, json: bool) -> Result<()> {
    let db = open_database(config)?;
    let target = settings_store(config)
        .daily_target()
        .context("failed to read user settings")?;
    let events = db.list_events()?;
    let snapshot = compute_stats(&events, target, now());

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&snapshot)?)?;
    } else {
        write!(writer, "{}", format_report(&snapshot))?;
    }
    Ok(())
}

/// Formats seconds as "Xh Ym" if at least an hour, "Xm" otherwise.
pub fn format_duration(seconds: u64) -> String {
    let total_minutes = seconds / 60;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours >= 1 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Generates a 10-character progress bar.
/// Values <5% of max get a single block for visibility.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn progress_bar(value: u64, max: u64) -> String {
    if max == 0 {
        return "░░░░░░░░░░".to_string();
    }

    let ratio = value as f64 / max as f64;
    let filled = if ratio < 0.05 && value > 0 {
        1
    } else {
        // Over-target days show a full bar.
        (ratio * 10.0).round().min(10.0) as usize
    };

    let empty = 10 - filled;
    format!("{}{}", "█".repeat(filled), "░".repeat(empty))
}

/// Formats the human-readable report.
pub fn format_report(snapshot: &StatsSnapshot) -> String {
    let target_minutes = u64::from(snapshot.daily_target);
    let mut lines = Vec::new();

    if snapshot.is_zen_mode {
        lines.push("ZENBOX: zen mode (phone connected)".to_string());
    } else {
        lines.push("ZENBOX: phone not connected".to_string());
    }

    let percent = snapshot.today_zen_minutes * 100 / target_minutes.max(1);
    lines.extend([
        String::new(),
        "TODAY".to_string(),
        "─────".to_string(),
        format!(
            "Zen time: {} of {}  {}  {percent}%",
            format_duration(snapshot.today_zen_minutes * 60),
            format_duration(target_minutes * 60),
            progress_bar(snapshot.today_zen_minutes, target_minutes),
        ),
        format!(
            "Points:   {} today, {} all time",
            snapshot.today_points, snapshot.zen_points
        ),
    ]);

    lines.extend([
        String::new(),
        "LAST 7 DAYS".to_string(),
        "───────────".to_string(),
    ]);
    for day in &snapshot.weekly_data {
        let duration = format_duration(day.zen_minutes * 60);
        let bar = progress_bar(day.zen_minutes, u64::from(day.target));
        lines.push(format!(
            "{} {}  {duration:>7}  {bar}",
            day.day_label,
            day.date.format("%Y-%m-%d")
        ));
    }

    lines.extend([
        String::new(),
        "SUMMARY".to_string(),
        "───────".to_string(),
    ]);
    let active = snapshot.sessions.iter().filter(|s| s.active).count();
    if active > 0 {
        lines.push(format!(
            "Sessions:   {} ({active} active)",
            snapshot.sessions.len()
        ));
    } else {
        lines.push(format!("Sessions:   {}", snapshot.sessions.len()));
    }
    lines.push(format!(
        "Total time: {}",
        format_duration(snapshot.zen_points)
    ));

    let mut output = lines.join("\n");
    output.push('\n');
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{NaiveDate, NaiveDateTime};
    use insta::assert_snapshot;
    use zb_core::{DailyTarget, Session, aggregate};

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, day)
            .and_then(|d| d.and_hms_opt(h, m, 0))
            .unwrap()
    }

    #[test]
    fn test_format_duration_hours_and_minutes() {
        assert_eq!(format_duration(9_000), "2h 30m");
        assert_eq!(format_duration(3_600), "1h 0m");
    }

    #[test]
    fn test_format_duration_minutes_only() {
        assert_eq!(format_duration(2_700), "45m");
        assert_eq!(format_duration(0), "0m");
    }

    #[test]
    fn test_format_duration_floors_seconds() {
        assert_eq!(format_duration(2_759), "45m");
    }

    #[test]
    fn test_progress_bar_partial() {
        assert_eq!(progress_bar(60, 120), "█████░░░░░");
        assert_eq!(progress_bar(96, 120), "████████░░");
    }

    #[test]
    fn test_progress_bar_minimum() {
        assert_eq!(progress_bar(1, 120), "█░░░░░░░░░");
    }

    #[test]
    fn test_progress_bar_over_target_is_full() {
        assert_eq!(progress_bar(300, 120), "██████████");
    }

    #[test]
    fn test_progress_bar_zero() {
        assert_eq!(progress_bar(0, 120), "░░░░░░░░░░");
        assert_eq!(progress_bar(0, 0), "░░░░░░░░░░");
    }

    #[test]
    fn test_report_with_active_session() {
        let sessions = vec![
            Session::closed(at(18, 9, 0), at(18, 10, 0)),
            Session::closed(at(19, 9, 0), at(19, 9, 45)),
            Session::open(at(19, 11, 0), at(19, 11, 30)),
        ];
        let target = DailyTarget::new(120).unwrap();
        let snapshot = aggregate(sessions, target, at(19, 11, 30));

        let output = format_report(&snapshot);
        assert_snapshot!(output, @r"
        ZENBOX: zen mode (phone connected)

        TODAY
        ─────
        Zen time: 1h 15m of 2h 0m  ██████░░░░  62%
        Points:   4500 today, 8100 all time

        LAST 7 DAYS
        ───────────
        Mon 2025-01-13       0m  ░░░░░░░░░░
        Tue 2025-01-14       0m  ░░░░░░░░░░
        Wed 2025-01-15       0m  ░░░░░░░░░░
        Thu 2025-01-16       0m  ░░░░░░░░░░
        Fri 2025-01-17       0m  ░░░░░░░░░░
        Sat 2025-01-18    1h 0m  █████░░░░░
        Sun 2025-01-19   1h 15m  ██████░░░░

        SUMMARY
        ───────
        Sessions:   3 (1 active)
        Total time: 2h 15m
        ");
    }

    #[test]
    fn test_report_empty_log() {
        let snapshot = StatsSnapshot::zeroed(DailyTarget::default(), at(15, 8, 0));

        let output = format_report(&snapshot);
        assert!(output.starts_with("ZENBOX: phone not connected\n"));
        assert!(output.contains("Zen time: 0m of 2h 0m  ░░░░░░░░░░  0%"));
        assert!(output.contains("Sessions:   0\n"));
    }

    #[test]
    fn test_run_json_on_fresh_data_dir() {
        let temp = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: temp.path().to_path_buf(),
            ..Config::default()
        };

        let mut output = Vec::new();
        run(&mut output, &config, true).unwrap();

        let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(json["dailyTarget"], 120);
        assert_eq!(json["weeklyData"].as_array().unwrap().len(), 7);
        assert_eq!(json["isZenMode"], false);
        assert!(temp.path().join("user_config.json").exists());
    }
}
