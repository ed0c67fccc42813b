//! One-shot commands talking to the backend daemon

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use std::path::Path;
use tracing::info;

use crate::config::{ConfigChange, Configuration, Settings};
use crate::ipc::SocketBridge;
use crate::reconciler::{OperationResult, Reconciler};

#[derive(Args, Debug, Default)]
pub struct SetArgs {
    /// CPU curve optimiser offset (-30..=0)
    #[arg(long, allow_negative_numbers = true)]
    pub cpu_offset: Option<i32>,

    /// GPU curve optimiser offset (-30..=0)
    #[arg(long, allow_negative_numbers = true)]
    pub gpu_offset: Option<i32>,

    /// APU power limit in milliwatts
    #[arg(long)]
    pub power_limit: Option<u32>,

    /// Enable or disable the CPU offset
    #[arg(long)]
    pub apply_cpu: Option<bool>,

    /// Enable or disable the GPU offset
    #[arg(long)]
    pub apply_gpu: Option<bool>,

    /// Enable or disable the power limit
    #[arg(long)]
    pub apply_power_limit: Option<bool>,

    /// Print the ryzenadj command and output
    #[arg(long, short)]
    pub verbose: bool,
}

impl SetArgs {
    pub fn changes(&self) -> Vec<ConfigChange> {
        [
            self.apply_cpu.map(ConfigChange::ApplyCpuOffset),
            self.cpu_offset.map(ConfigChange::SetCpuOffset),
            self.apply_gpu.map(ConfigChange::ApplyGpuOffset),
            self.gpu_offset.map(ConfigChange::SetGpuOffset),
            self.apply_power_limit.map(ConfigChange::ApplyPowerLimit),
            self.power_limit.map(ConfigChange::SetPowerLimit),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

fn connect(settings: &Settings) -> Reconciler<SocketBridge> {
    Reconciler::new(
        SocketBridge::new(settings.socket_path()),
        settings.response_ordering,
    )
}

async fn loaded(reconciler: &Reconciler<SocketBridge>) -> Result<Configuration> {
    reconciler
        .initialize()
        .await
        .ok_or_else(|| anyhow!("Could not read the active configuration from the backend"))
}

pub async fn status(settings: &Settings) -> Result<()> {
    let config = loaded(&connect(settings)).await?;
    let json = serde_json::json!({
        "configuration": config,
        "cpu_value": config.cpu_value(),
        "gpu_value": config.gpu_value(),
    });
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

pub async fn set(settings: &Settings, args: &SetArgs) -> Result<()> {
    let changes = args.changes();
    if changes.is_empty() {
        bail!("Nothing to set; pass at least one option (see --help)");
    }

    let reconciler = connect(settings);
    let current = loaded(&reconciler).await?;
    let next = changes.iter().fold(current, |config, change| config.with(*change));
    info!(?next, "Applying configuration from command line");
    report(reconciler.apply(next).await, args.verbose)
}

pub async fn reset(settings: &Settings, verbose: bool) -> Result<()> {
    let reconciler = connect(settings);
    loaded(&reconciler).await?;
    report(reconciler.reset().await, verbose)
}

/// Meant for suspend hooks (e.g. systemd-sleep); waits until the backend acknowledged
pub async fn resume(settings: &Settings) -> Result<()> {
    connect(settings)
        .notify_resume()
        .await
        .context("Resume notification task failed")
}

pub async fn ping(settings: &Settings) -> Result<()> {
    SocketBridge::new(settings.socket_path()).ping().await?;
    println!("backend is running");
    Ok(())
}

pub async fn stop(settings: &Settings) -> Result<()> {
    SocketBridge::new(settings.socket_path()).shutdown().await?;
    println!("backend is shutting down");
    Ok(())
}

pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    Settings::default().save(path)?;
    println!("wrote default settings to {}", path.display());
    Ok(())
}

fn report(result: OperationResult, verbose: bool) -> Result<()> {
    match result {
        OperationResult::Success {
            applied,
            executed,
            diagnostics,
            ..
        } => {
            println!("{}", serde_json::to_string_pretty(&applied)?);
            if !executed {
                println!("ryzenadj not executed (nothing changed)");
            }
            if let (true, Some(invocation)) = (verbose, diagnostics) {
                println!("cmd: {}", invocation.command);
                println!("stdout: {}", invocation.stdout.trim_end());
                println!("stderr: {}", invocation.stderr.trim_end());
            }
            Ok(())
        }
        OperationResult::Failure { message } => Err(anyhow!(message)),
    }
}
