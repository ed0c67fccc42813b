//! ryzenadj flag generation and process execution

use std::future::Future;
use std::io;
use std::path::Path;
use tokio::process::Command;

use crate::config::{Configuration, Field};
use crate::constants::{limits, ryzenadj};

/// Captured result of running an external program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, -1 if the process was killed by a signal
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Runs external programs; swapped out in tests
pub trait CommandRunner: Send + Sync + 'static {
    fn run(
        &self,
        program: &Path,
        args: &[String],
    ) -> impl Future<Output = io::Result<CommandOutput>> + Send;
}

/// Spawns real processes via tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(
        &self,
        program: &Path,
        args: &[String],
    ) -> impl Future<Output = io::Result<CommandOutput>> + Send {
        let mut cmd = Command::new(program);
        cmd.args(args);
        async move {
            let output = cmd.output().await?;
            Ok(CommandOutput {
                status: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}

/// Ordered flag set; setting a flag twice keeps its first position
#[derive(Debug, Default)]
struct FlagSet(Vec<(&'static str, String)>);

impl FlagSet {
    fn set(&mut self, flag: &'static str, value: String) {
        match self.0.iter_mut().find(|(f, _)| *f == flag) {
            Some(entry) => entry.1 = value,
            None => self.0.push((flag, value)),
        }
    }

    fn set_power_limit(&mut self, milliwatts: u32) {
        for flag in [
            ryzenadj::FLAG_STAPM_LIMIT,
            ryzenadj::FLAG_FAST_LIMIT,
            ryzenadj::FLAG_SLOW_LIMIT,
        ] {
            self.set(flag, milliwatts.to_string());
        }
    }

    fn into_args(self) -> Vec<String> {
        self.0
            .into_iter()
            .map(|(flag, value)| format!("{flag}={value}"))
            .collect()
    }
}

/// Flags that apply every enabled setting of `config`
pub fn full_flags(config: &Configuration) -> Vec<String> {
    let mut flags = FlagSet::default();
    if config.apply_cpu_offset {
        flags.set(ryzenadj::FLAG_CPU_OFFSET, config.cpu_value());
    }
    if config.apply_gpu_offset {
        flags.set(ryzenadj::FLAG_GPU_OFFSET, config.gpu_value());
    }
    if config.apply_power_limit {
        flags.set_power_limit(config.power_limit_mw);
    }
    flags.into_args()
}

/// Flags needed to move from the active configuration to `new`, given their differences
///
/// A value that changed while its apply toggle is off produces nothing; switching a
/// toggle off restores the neutral value.
pub fn delta_flags(new: &Configuration, differences: &[Field]) -> Vec<String> {
    let changed = |field: Field| differences.contains(&field);
    let neutral = crate::config::configuration::register_value(0);
    let mut flags = FlagSet::default();

    if changed(Field::CpuOffset) || changed(Field::ApplyCpuOffset) {
        if new.apply_cpu_offset {
            flags.set(ryzenadj::FLAG_CPU_OFFSET, new.cpu_value());
        } else if changed(Field::ApplyCpuOffset) {
            flags.set(ryzenadj::FLAG_CPU_OFFSET, neutral.clone());
        }
    }

    if changed(Field::GpuOffset) || changed(Field::ApplyGpuOffset) {
        if new.apply_gpu_offset {
            flags.set(ryzenadj::FLAG_GPU_OFFSET, new.gpu_value());
        } else if changed(Field::ApplyGpuOffset) {
            flags.set(ryzenadj::FLAG_GPU_OFFSET, neutral);
        }
    }

    if changed(Field::PowerLimit) || changed(Field::ApplyPowerLimit) {
        if new.apply_power_limit {
            flags.set_power_limit(new.power_limit_mw);
        } else if changed(Field::ApplyPowerLimit) {
            flags.set_power_limit(limits::POWER_LIMIT_DEFAULT_MW);
        }
    }

    flags.into_args()
}
