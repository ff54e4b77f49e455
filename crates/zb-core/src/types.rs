//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The daily target was outside the accepted range.
    #[error("daily target must be between {min} and {max} minutes, got {value}")]
    DailyTargetOutOfRange { value: i64, min: u32, max: u32 },
}

/// Minutes of connected time the user aims for each day.
///
/// Always within \[30, 480\]. Deserialization rejects values outside the range,
/// so a `DailyTarget` read from storage is valid by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct DailyTarget(u32);

impl DailyTarget {
    /// Smallest accepted target (30 minutes).
    pub const MIN_MINUTES: u32 = 30;

    /// Largest accepted target (8 hours).
    pub const MAX_MINUTES: u32 = 480;

    /// Target used when nothing has been configured (2 hours).
    pub const DEFAULT: Self = Self(120);

    /// Creates a target after range validation.
    pub fn new(minutes: i64) -> Result<Self, ValidationError> {
        if minutes < i64::from(Self::MIN_MINUTES) || minutes > i64::from(Self::MAX_MINUTES) {
            return Err(ValidationError::DailyTargetOutOfRange {
                value: minutes,
                min: Self::MIN_MINUTES,
                max: Self::MAX_MINUTES,
            });
        }
        // In range, so the conversion cannot fail.
        Ok(Self(u32::try_from(minutes).unwrap_or(Self::DEFAULT.0)))
    }

    /// Creates a target, clamping to \[30, 480\].
    #[must_use]
    pub fn clamped(minutes: i64) -> Self {
        let clamped = minutes.clamp(i64::from(Self::MIN_MINUTES), i64::from(Self::MAX_MINUTES));
        Self(u32::try_from(clamped).unwrap_or(Self::DEFAULT.0))
    }

    /// Returns the target in minutes.
    #[must_use]
    pub const fn minutes(self) -> u32 {
        self.0
    }
}

impl Default for DailyTarget {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<i64> for DailyTarget {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DailyTarget> for u32 {
    fn from(target: DailyTarget) -> Self {
        target.0
    }
}

impl fmt::Display for DailyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_target_accepts_range_bounds() {
        assert_eq!(DailyTarget::new(30).unwrap().minutes(), 30);
        assert_eq!(DailyTarget::new(480).unwrap().minutes(), 480);
        assert_eq!(DailyTarget::new(120).unwrap().minutes(), 120);
    }

    #[test]
    fn daily_target_rejects_out_of_range() {
        let err = DailyTarget::new(29).unwrap_err();
        assert_eq!(
            err.to_string(),
            "daily target must be between 30 and 480 minutes, got 29"
        );
        assert!(DailyTarget::new(481).is_err());
        assert!(DailyTarget::new(-1).is_err());
    }

    #[test]
    fn daily_target_clamped() {
        assert_eq!(DailyTarget::clamped(5).minutes(), 30);
        assert_eq!(DailyTarget::clamped(10_000).minutes(), 480);
        assert_eq!(DailyTarget::clamped(100).minutes(), 100);
    }

    #[test]
    fn daily_target_serde_validates() {
        let target: DailyTarget = serde_json::from_str("90").unwrap();
        assert_eq!(target.minutes(), 90);
        assert_eq!(serde_json::to_string(&target).unwrap(), "90");

        let result: Result<DailyTarget, _> = serde_json::from_str("481");
        assert!(result.is_err());
    }

    #[test]
    fn daily_target_default_is_two_hours() {
        assert_eq!(DailyTarget::default().minutes(), 120);
        assert_eq!(DailyTarget::default().to_string(), "120m");
    }
}
