//! USB device enumeration and phone classification.

use std::io;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tokio::process::Command;

use crate::WatchError;

static LSUSB_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Bus (\d{3}) Device (\d{3}): ID ([0-9a-fA-F]{4}):([0-9a-fA-F]{4})\s*(.*)$")
        .unwrap()
});

/// Name fragments that mark a device as a phone.
pub const DEFAULT_PHONE_PATTERNS: &[&str] = &[
    "iphone",
    "ipad",
    "apple",
    "samsung",
    "galaxy",
    "pixel",
    "nexus",
    "google",
    "android",
    "xiaomi",
    "huawei",
    "oneplus",
    "motorola",
    "oppo",
    "vivo",
    "realme",
    "sony",
    "lg electronics",
    "htc",
    "nokia",
    "mtp",
    "adb",
];

/// USB vendor ids of phone manufacturers.
const PHONE_VENDOR_IDS: &[&str] = &[
    "05ac", // Apple
    "18d1", // Google
    "04e8", // Samsung
    "2717", // Xiaomi
    "12d1", // Huawei
    "2a70", // OnePlus
    "22b8", // Motorola
    "0fce", // Sony
    "1004", // LG
    "0bb4", // HTC
];

/// A device as reported by `lsusb`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsbDevice {
    pub bus: String,
    pub device: String,
    /// Lowercase hex vendor id.
    pub vendor_id: String,
    /// Lowercase hex product id.
    pub product_id: String,
    /// Manufacturer and product description; may be empty.
    pub name: String,
}

impl UsbDevice {
    /// Identifier that tells apart devices sharing a display name.
    pub fn id(&self) -> String {
        format!(
            "{}-{}-{}:{}",
            self.bus, self.device, self.vendor_id, self.product_id
        )
    }
}

/// Parses `lsusb` output, skipping lines that don't describe a device.
pub fn parse_lsusb(output: &str) -> Vec<UsbDevice> {
    output
        .lines()
        .filter_map(|line| {
            let caps = LSUSB_LINE_RE.captures(line.trim())?;
            Some(UsbDevice {
                bus: caps[1].to_string(),
                device: caps[2].to_string(),
                vendor_id: caps[3].to_ascii_lowercase(),
                product_id: caps[4].to_ascii_lowercase(),
                name: caps[5].trim().to_string(),
            })
        })
        .collect()
}

/// Decides whether a device is a phone.
#[derive(Debug, Clone)]
pub struct PhoneMatcher {
    names: Regex,
}

impl PhoneMatcher {
    /// Builds a matcher from case-insensitive name fragments.
    ///
    /// Fragments are matched literally. With no fragments only the vendor id
    /// table applies.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, WatchError> {
        let alternation = patterns
            .iter()
            .map(|p| p.as_ref().trim())
            .filter(|p| !p.is_empty())
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join("|");
        // An empty alternation would match every name.
        let source = if alternation.is_empty() {
            r"[^\s\S]".to_string()
        } else {
            alternation
        };
        let names = RegexBuilder::new(&source).case_insensitive(true).build()?;
        Ok(Self { names })
    }

    /// Builds a matcher from [`DEFAULT_PHONE_PATTERNS`].
    pub fn with_defaults() -> Result<Self, WatchError> {
        Self::new(DEFAULT_PHONE_PATTERNS)
    }

    pub fn is_phone(&self, device: &UsbDevice) -> bool {
        PHONE_VENDOR_IDS.contains(&device.vendor_id.as_str()) || self.names.is_match(&device.name)
    }
}

/// Source of the currently attached devices.
#[async_trait]
pub trait DeviceEnumerator: Send + Sync {
    async fn enumerate(&self) -> Result<Vec<UsbDevice>, WatchError>;
}

/// Enumerates devices by running `lsusb`.
///
/// The child is killed if it outlives the timeout.
#[derive(Debug, Clone)]
pub struct LsusbEnumerator {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl LsusbEnumerator {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(timeout: Duration) -> Self {
        Self::with_command("lsusb", Vec::<String>::new(), timeout)
    }

    /// Runs `program` instead of `lsusb`; its stdout must use the `lsusb` format.
    pub fn with_command(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            timeout,
        }
    }
}

impl Default for LsusbEnumerator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl DeviceEnumerator for LsusbEnumerator {
    async fn enumerate(&self) -> Result<Vec<UsbDevice>, WatchError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => {
                return Err(WatchError::CommandMissing {
                    program: self.program.clone(),
                });
            }
            Ok(Err(source)) => {
                return Err(WatchError::Io {
                    program: self.program.clone(),
                    source,
                });
            }
            Err(_) => {
                return Err(WatchError::Timeout {
                    program: self.program.clone(),
                    timeout: self.timeout,
                });
            }
        };

        if !output.status.success() {
            return Err(WatchError::CommandFailed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(parse_lsusb(&String::from_utf8_lossy(&output.stdout)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Bus 002 Device 001: ID 1d6b:0003 Linux Foundation 3.0 root hub
Bus 001 Device 007: ID 18d1:4EE7 Google Inc. Nexus/Pixel Device (MTP)
Bus 001 Device 003: ID 046d:c52b Logitech, Inc. Unifying Receiver
Bus 001 Device 009: ID abcd:1234
not a device line
";

    fn device(vendor_id: &str, name: &str) -> UsbDevice {
        UsbDevice {
            bus: "001".to_string(),
            device: "002".to_string(),
            vendor_id: vendor_id.to_string(),
            product_id: "0001".to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_parse_lsusb_lines() {
        let devices = parse_lsusb(SAMPLE);

        assert_eq!(devices.len(), 4);
        assert_eq!(
            devices[1],
            UsbDevice {
                bus: "001".to_string(),
                device: "007".to_string(),
                vendor_id: "18d1".to_string(),
                product_id: "4ee7".to_string(),
                name: "Google Inc. Nexus/Pixel Device (MTP)".to_string(),
            }
        );
        assert_eq!(devices[3].name, "");
    }

    #[test]
    fn test_parse_lsusb_empty_output() {
        assert!(parse_lsusb("").is_empty());
    }

    #[test]
    fn test_id_distinguishes_same_name() {
        let devices = parse_lsusb(
            "Bus 001 Device 004: ID 05ac:12a8 Apple, Inc. iPhone\n\
             Bus 001 Device 005: ID 05ac:12a8 Apple, Inc. iPhone\n",
        );

        assert_eq!(devices[0].name, devices[1].name);
        assert_eq!(devices[0].id(), "001-004-05ac:12a8");
        assert_ne!(devices[0].id(), devices[1].id());
    }

    #[test]
    fn test_default_matcher_classifies() {
        let matcher = PhoneMatcher::with_defaults().unwrap();
        let devices = parse_lsusb(SAMPLE);

        let phones: Vec<_> = devices.iter().map(|d| matcher.is_phone(d)).collect();
        assert_eq!(phones, [false, true, false, false]);
    }

    #[test]
    fn test_matcher_is_case_insensitive() {
        let matcher = PhoneMatcher::with_defaults().unwrap();
        assert!(matcher.is_phone(&device("ffff", "SAMSUNG Electronics Co., Ltd Galaxy")));
        assert!(matcher.is_phone(&device("ffff", "LG Electronics, Inc. Phone")));
        assert!(!matcher.is_phone(&device("ffff", "Generic Keyboard")));
    }

    #[test]
    fn test_vendor_table_matches_without_name() {
        let matcher = PhoneMatcher::new::<&str>(&[]).unwrap();
        assert!(matcher.is_phone(&device("2717", "")));
        assert!(!matcher.is_phone(&device("ffff", "Pixel")));
    }

    #[test]
    fn test_custom_patterns_are_literal() {
        let matcher = PhoneMatcher::new(&["fairphone", "a.b"]).unwrap();
        assert!(matcher.is_phone(&device("ffff", "Fairphone 5")));
        assert!(matcher.is_phone(&device("ffff", "a.b device")));
        assert!(!matcher.is_phone(&device("ffff", "axb device")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_enumerator_parses_command_output() {
        let enumerator = LsusbEnumerator::with_command(
            "echo",
            ["Bus 001 Device 007: ID 18d1:4ee7 Google Inc. Pixel"],
            Duration::from_secs(5),
        );

        let devices = enumerator.enumerate().await.unwrap();

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].vendor_id, "18d1");
    }

    #[tokio::test]
    async fn test_enumerator_missing_command() {
        let enumerator = LsusbEnumerator::with_command(
            "zenbox-no-such-enumerator",
            Vec::<String>::new(),
            Duration::from_secs(5),
        );

        let err = enumerator.enumerate().await.unwrap_err();
        assert!(matches!(err, WatchError::CommandMissing { .. }), "{err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_enumerator_nonzero_exit() {
        let enumerator =
            LsusbEnumerator::with_command("false", Vec::<String>::new(), Duration::from_secs(5));

        let err = enumerator.enumerate().await.unwrap_err();
        assert!(matches!(err, WatchError::CommandFailed { .. }), "{err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_enumerator_timeout() {
        let enumerator =
            LsusbEnumerator::with_command("sleep", ["5"], Duration::from_millis(100));

        let started = std::time::Instant::now();
        let err = enumerator.enumerate().await.unwrap_err();

        assert!(matches!(err, WatchError::Timeout { .. }), "{err}");
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
