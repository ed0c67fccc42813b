//! Power tuning configuration record
//!
//! A flat value type shared by the panel, the CLI and the backend. Every user
//! action produces a whole new `Configuration` through [`Configuration::with`];
//! nothing here performs I/O.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{limits, ryzenadj};

/// Complete tuning state pushed to the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub apply_cpu_offset: bool,
    pub cpu_offset: i32,
    pub apply_gpu_offset: bool,
    pub gpu_offset: i32,
    #[serde(default)]
    pub apply_power_limit: bool,
    #[serde(default = "default_power_limit")]
    pub power_limit_mw: u32,
    #[serde(default)]
    pub show_debug: bool,
}

fn default_power_limit() -> u32 {
    limits::POWER_LIMIT_DEFAULT_MW
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            apply_cpu_offset: true,
            cpu_offset: 0,
            apply_gpu_offset: false,
            gpu_offset: 0,
            apply_power_limit: false,
            power_limit_mw: limits::POWER_LIMIT_DEFAULT_MW,
            show_debug: false,
        }
    }
}

/// A single user edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigChange {
    SetCpuOffset(i32),
    SetGpuOffset(i32),
    ApplyCpuOffset(bool),
    ApplyGpuOffset(bool),
    SetPowerLimit(u32),
    ApplyPowerLimit(bool),
    ShowDebug(bool),
}

/// Hardware-relevant fields, in the order they are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    ApplyCpuOffset,
    CpuOffset,
    ApplyGpuOffset,
    GpuOffset,
    ApplyPowerLimit,
    PowerLimit,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::ApplyCpuOffset,
        Field::CpuOffset,
        Field::ApplyGpuOffset,
        Field::GpuOffset,
        Field::ApplyPowerLimit,
        Field::PowerLimit,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("CPU offset {0} outside {min}..={max}", min = limits::OFFSET_MIN, max = limits::OFFSET_MAX)]
    CpuOffsetOutOfRange(i32),
    #[error("GPU offset {0} outside {min}..={max}", min = limits::OFFSET_MIN, max = limits::OFFSET_MAX)]
    GpuOffsetOutOfRange(i32),
    #[error(
        "power limit {0} mW outside {min}..={max} mW",
        min = limits::POWER_LIMIT_MIN_MW,
        max = limits::POWER_LIMIT_MAX_MW
    )]
    PowerLimitOutOfRange(u32),
}

impl Configuration {
    /// Return a new configuration with `change` applied
    pub fn with(&self, change: ConfigChange) -> Self {
        let mut next = self.clone();
        match change {
            ConfigChange::SetCpuOffset(v) => next.cpu_offset = v,
            ConfigChange::SetGpuOffset(v) => next.gpu_offset = v,
            ConfigChange::ApplyCpuOffset(v) => next.apply_cpu_offset = v,
            ConfigChange::ApplyGpuOffset(v) => next.apply_gpu_offset = v,
            ConfigChange::SetPowerLimit(v) => next.power_limit_mw = v,
            ConfigChange::ApplyPowerLimit(v) => next.apply_power_limit = v,
            ConfigChange::ShowDebug(v) => next.show_debug = v,
        }
        next
    }

    /// Check every value against the accepted hardware ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        let offsets = limits::OFFSET_MIN..=limits::OFFSET_MAX;
        if !offsets.contains(&self.cpu_offset) {
            return Err(ConfigError::CpuOffsetOutOfRange(self.cpu_offset));
        }
        if !offsets.contains(&self.gpu_offset) {
            return Err(ConfigError::GpuOffsetOutOfRange(self.gpu_offset));
        }
        if !(limits::POWER_LIMIT_MIN_MW..=limits::POWER_LIMIT_MAX_MW).contains(&self.power_limit_mw) {
            return Err(ConfigError::PowerLimitOutOfRange(self.power_limit_mw));
        }
        Ok(())
    }

    /// Clamp positive offsets to zero so the backend never overvolts
    pub fn sanitized(mut self) -> Self {
        self.cpu_offset = self.cpu_offset.min(limits::OFFSET_MAX);
        self.gpu_offset = self.gpu_offset.min(limits::OFFSET_MAX);
        self
    }

    pub fn cpu_value(&self) -> String {
        register_value(self.cpu_offset)
    }

    pub fn gpu_value(&self) -> String {
        register_value(self.gpu_offset)
    }

    /// Hardware-relevant fields that differ from `old` (`show_debug` never counts)
    pub fn differences(&self, old: &Configuration) -> Vec<Field> {
        Field::ALL
            .into_iter()
            .filter(|field| match field {
                Field::ApplyCpuOffset => self.apply_cpu_offset != old.apply_cpu_offset,
                Field::CpuOffset => self.cpu_offset != old.cpu_offset,
                Field::ApplyGpuOffset => self.apply_gpu_offset != old.apply_gpu_offset,
                Field::GpuOffset => self.gpu_offset != old.gpu_offset,
                Field::ApplyPowerLimit => self.apply_power_limit != old.apply_power_limit,
                Field::PowerLimit => self.power_limit_mw != old.power_limit_mw,
            })
            .collect()
    }
}

/// Curve optimiser register value for an offset, as ryzenadj expects it
pub fn register_value(offset: i32) -> String {
    format!("{:#x}", ryzenadj::BASE_VALUE + i64::from(offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration() {
        let config = Configuration::default();
        assert!(config.apply_cpu_offset);
        assert!(!config.apply_gpu_offset);
        assert!(!config.apply_power_limit);
        assert_eq!(config.cpu_offset, 0);
        assert_eq!(config.gpu_offset, 0);
        assert_eq!(config.power_limit_mw, 15_000);
        assert!(!config.show_debug);
    }

    #[test]
    fn test_with_leaves_original_untouched() {
        let original = Configuration::default();
        let next = original.with(ConfigChange::SetCpuOffset(-12));

        assert_eq!(original.cpu_offset, 0);
        assert_eq!(next.cpu_offset, -12);
        assert_eq!(next.gpu_offset, original.gpu_offset);
    }

    #[test]
    fn test_with_each_change() {
        let config = Configuration::default()
            .with(ConfigChange::SetGpuOffset(-7))
            .with(ConfigChange::ApplyGpuOffset(true))
            .with(ConfigChange::ApplyCpuOffset(false))
            .with(ConfigChange::SetPowerLimit(12_000))
            .with(ConfigChange::ApplyPowerLimit(true))
            .with(ConfigChange::ShowDebug(true));

        assert_eq!(config.gpu_offset, -7);
        assert!(config.apply_gpu_offset);
        assert!(!config.apply_cpu_offset);
        assert_eq!(config.power_limit_mw, 12_000);
        assert!(config.apply_power_limit);
        assert!(config.show_debug);
    }

    #[test]
    fn test_register_values() {
        let config = Configuration::default()
            .with(ConfigChange::SetCpuOffset(-10))
            .with(ConfigChange::SetGpuOffset(-5));
        assert_eq!(config.cpu_value(), "0xffff6");
        assert_eq!(config.gpu_value(), "0xffffb");
        assert_eq!(register_value(0), "0x100000");
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let base = Configuration::default();
        assert!(base.validate().is_ok());

        assert_eq!(
            base.with(ConfigChange::SetCpuOffset(5)).validate(),
            Err(ConfigError::CpuOffsetOutOfRange(5))
        );
        assert_eq!(
            base.with(ConfigChange::SetGpuOffset(-31)).validate(),
            Err(ConfigError::GpuOffsetOutOfRange(-31))
        );
        assert_eq!(
            base.with(ConfigChange::SetPowerLimit(100)).validate(),
            Err(ConfigError::PowerLimitOutOfRange(100))
        );
    }

    #[test]
    fn test_validate_error_message() {
        let err = Configuration::default()
            .with(ConfigChange::SetCpuOffset(3))
            .validate()
            .unwrap_err();
        assert_eq!(err.to_string(), "CPU offset 3 outside -30..=0");
    }

    #[test]
    fn test_sanitized_clamps_positive_offsets() {
        let config = Configuration::default()
            .with(ConfigChange::SetCpuOffset(4))
            .with(ConfigChange::SetGpuOffset(-3))
            .sanitized();
        assert_eq!(config.cpu_offset, 0);
        assert_eq!(config.gpu_offset, -3);
    }

    #[test]
    fn test_differences_ignore_show_debug() {
        let old = Configuration::default();
        let new = old.with(ConfigChange::ShowDebug(true));
        assert!(new.differences(&old).is_empty());
    }

    #[test]
    fn test_differences_in_field_order() {
        let old = Configuration::default();
        let new = old
            .with(ConfigChange::SetPowerLimit(9_000))
            .with(ConfigChange::SetCpuOffset(-4));
        assert_eq!(new.differences(&old), vec![Field::CpuOffset, Field::PowerLimit]);
    }

    #[test]
    fn test_deserialize_older_record_uses_defaults() {
        let json = r#"{"apply_cpu_offset":true,"cpu_offset":-8,"apply_gpu_offset":false,"gpu_offset":0}"#;
        let config: Configuration = serde_json::from_str(json).unwrap();
        assert_eq!(config.cpu_offset, -8);
        assert_eq!(config.power_limit_mw, 15_000);
        assert!(!config.apply_power_limit);
        assert!(!config.show_debug);
    }
}
