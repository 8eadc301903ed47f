//! The persisted `key = value` settings file: read at startup, merged with
//! CLI overrides, and otherwise forward-compatible with keys this build
//! doesn't recognize yet.

use std::fs;
use std::path::Path;

use log::warn;

use crate::devices::cpu::CpuVariant;
use crate::error::ConfigError;

/// Mirrors the recognized persisted key set. Every field is optional: a key
/// absent from the file (or the whole file itself) just leaves the
/// corresponding field `None`, letting the caller fall back to a built-in
/// default or a CLI flag.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Settings {
    pub auto_start: Option<bool>,
    pub emulator_type: Option<CpuVariant>,
    pub open_at_start: Option<bool>,
    pub show_drive_indicators: Option<bool>,
    pub disk1: Option<String>,
    pub disk2: Option<String>,
    pub video: Option<String>,
    pub speed: Option<String>,
    pub sym_tables: Option<String>,
}

impl Settings {
    /// Parses a settings file, logging a warning (not an error) for every
    /// malformed or unrecognized line so the rest of the file still takes
    /// effect.
    pub fn load(path: &Path) -> Result<Settings, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::UnreadableSettings(path.to_path_buf(), e))?;
        Ok(Settings::parse(&text))
    }

    fn parse(text: &str) -> Settings {
        let mut settings = Settings::default();
        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                warn!("settings line {}: {:?} has no '=', skipping", lineno + 1, raw_line);
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            settings.apply(key, value, lineno + 1);
        }
        settings
    }

    fn apply(&mut self, key: &str, value: &str, lineno: usize) {
        match key {
            "auto_start" => self.auto_start = Some(parse_bool(value)),
            "emulator_type" => match value {
                "6502" | "ii" | "ii_plus" => self.emulator_type = Some(CpuVariant::Nmos6502),
                "65c02" | "iie" | "enhanced" => self.emulator_type = Some(CpuVariant::Cmos65C02),
                _ => warn!("settings line {}: unrecognized emulator_type {:?}", lineno, value),
            },
            "open_at_start" => self.open_at_start = Some(parse_bool(value)),
            "show_drive_indicators" => self.show_drive_indicators = Some(parse_bool(value)),
            "disk1" => self.disk1 = Some(value.to_string()),
            "disk2" => self.disk2 = Some(value.to_string()),
            "video" => self.video = Some(value.to_string()),
            "speed" => self.speed = Some(value.to_string()),
            "sym_tables" => self.sym_tables = Some(value.to_string()),
            _ => warn!("settings line {}: unrecognized key {:?}, ignoring", lineno, key),
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_line_is_skipped_not_fatal() {
        let settings = Settings::parse("auto_start = true\nthis line has no equals\ndisk1 = /tmp/a.dsk\n");
        assert_eq!(settings.auto_start, Some(true));
        assert_eq!(settings.disk1.as_deref(), Some("/tmp/a.dsk"));
    }

    #[test]
    fn unrecognized_key_is_ignored_not_fatal() {
        let settings = Settings::parse("favorite_color = blue\nspeed = fast\n");
        assert_eq!(settings.speed.as_deref(), Some("fast"));
    }

    #[test]
    fn emulator_type_maps_to_cpu_variant() {
        let settings = Settings::parse("emulator_type = 65c02\n");
        assert_eq!(settings.emulator_type, Some(CpuVariant::Cmos65C02));
    }
}
