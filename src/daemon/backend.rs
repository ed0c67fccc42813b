//! Backend state: the authoritative active configuration and the ryzenadj runs
//! that change it.

use anyhow::{bail, Context, Result};
use chrono::Local;
use std::path::PathBuf;
use tracing::{error, info, warn};

use super::ryzenadj::{self, CommandRunner};
use crate::config::{Configuration, StateStore};
use crate::ipc::{Invocation, UpdateReport};

pub struct Backend<R> {
    runner: R,
    ryzenadj_path: PathBuf,
    store: Option<StateStore>,
    active: Configuration,
    first_update: bool,
}

impl<R: CommandRunner> Backend<R> {
    pub fn new(runner: R, ryzenadj_path: PathBuf, store: Option<StateStore>, initial: Configuration) -> Self {
        let active = checked(initial).unwrap_or_else(|e| {
            warn!(error = ?e, "Initial configuration out of range, using defaults");
            Configuration::default()
        });
        Self {
            runner,
            ryzenadj_path,
            store,
            active,
            first_update: true,
        }
    }

    pub fn active(&self) -> &Configuration {
        &self.active
    }

    /// Active configuration plus whether this is the first query since start
    pub fn active_state(&mut self) -> (bool, Configuration) {
        let first = std::mem::replace(&mut self.first_update, false);
        (first, self.active.clone())
    }

    /// Apply every enabled setting of `config`, regardless of what is active
    pub async fn apply_full(&mut self, config: Configuration) -> Result<Invocation> {
        let config = checked(config)?;
        let flags = ryzenadj::full_flags(&config);
        let invocation = self.exec(flags).await?;
        if invocation.succeeded() {
            self.commit(config);
        } else {
            warn!(returncode = invocation.returncode, stderr = %invocation.stderr.trim(), "Full apply failed");
        }
        Ok(invocation)
    }

    /// Re-apply the active configuration (after resume from suspend)
    pub async fn reapply(&mut self) -> Result<Invocation> {
        info!("Reapplying active configuration");
        self.apply_full(self.active().clone()).await
    }

    /// Move to `new`, running ryzenadj only for what changed
    ///
    /// Out-of-range values are refused before anything runs. A non-zero ryzenadj
    /// exit leaves the active configuration untouched and is reported as an
    /// error carrying the exit status and stderr.
    pub async fn update(&mut self, new: Configuration) -> Result<UpdateReport> {
        let new = checked(new)?;
        let differences = new.differences(&self.active);
        let flags = ryzenadj::delta_flags(&new, &differences);
        info!(?differences, ?flags, "Configuration update requested");

        // show_debug is display-only and always accepted
        self.active.show_debug = new.show_debug;

        if flags.is_empty() {
            // Nothing to run, but the toggle or values behind disabled flags still persist
            self.commit(new);
            return Ok(self.report(false, None));
        }

        let invocation = self.exec(flags).await?;
        if !invocation.succeeded() {
            let stderr = invocation.stderr.trim();
            if stderr.is_empty() {
                bail!("ryzenadj exited with status {}", invocation.returncode);
            }
            bail!("ryzenadj exited with status {}: {stderr}", invocation.returncode);
        }

        self.commit(new);
        Ok(self.report(true, Some(invocation)))
    }

    fn commit(&mut self, config: Configuration) {
        self.active = config;
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&self.active) {
                error!(error = ?e, path = %store.path().display(), "Failed to persist configuration");
            }
        }
    }

    fn report(&self, executed: bool, invocation: Option<Invocation>) -> UpdateReport {
        UpdateReport {
            applied: self.active.clone(),
            cpu_value: self.active.cpu_value(),
            gpu_value: self.active.gpu_value(),
            executed,
            invocation,
        }
    }

    async fn exec(&self, flags: Vec<String>) -> Result<Invocation> {
        let command = std::iter::once(self.ryzenadj_path.display().to_string())
            .chain(flags.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        info!(cmd = %command, "Running ryzenadj");

        let output = self
            .runner
            .run(&self.ryzenadj_path, &flags)
            .await
            .with_context(|| format!("Failed to run {}", self.ryzenadj_path.display()))?;
        info!(returncode = output.status, stdout = %output.stdout.trim(), "ryzenadj finished");

        Ok(Invocation {
            command,
            returncode: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
            timestamp: Local::now(),
        })
    }
}

/// Clamp positive offsets, then refuse anything outside the hardware ranges
fn checked(config: Configuration) -> Result<Configuration> {
    let config = config.sanitized();
    config.validate().context("Rejected configuration")?;
    Ok(config)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ConfigChange;
    use crate::daemon::ryzenadj::CommandOutput;
    use std::future::Future;
    use std::io;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    /// Records every invocation and answers with a fixed exit status
    #[derive(Clone, Default)]
    pub(crate) struct FakeRunner {
        pub calls: Arc<Mutex<Vec<Vec<String>>>>,
        pub status: Arc<Mutex<i32>>,
    }

    impl FakeRunner {
        pub fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }

        pub fn fail_with(&self, status: i32) {
            *self.status.lock().unwrap() = status;
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(
            &self,
            _program: &Path,
            args: &[String],
        ) -> impl Future<Output = io::Result<CommandOutput>> + Send {
            self.calls.lock().unwrap().push(args.to_vec());
            let status = *self.status.lock().unwrap();
            async move {
                Ok(CommandOutput {
                    status,
                    stdout: "Successfully set coall to 0xffff6\n".to_string(),
                    stderr: if status == 0 { String::new() } else { "device busy\n".to_string() },
                })
            }
        }
    }

    fn backend(runner: &FakeRunner, store: Option<StateStore>) -> Backend<FakeRunner> {
        Backend::new(
            runner.clone(),
            PathBuf::from("/usr/bin/ryzenadj"),
            store,
            Configuration::default(),
        )
    }

    #[test]
    fn test_first_update_flag_flips_once() {
        let mut backend = backend(&FakeRunner::default(), None);
        assert!(backend.active_state().0);
        assert!(!backend.active_state().0);
        assert!(!backend.active_state().0);
    }

    #[test]
    fn test_new_sanitizes_initial_configuration() {
        let initial = Configuration::default().with(ConfigChange::SetCpuOffset(7));
        let backend = Backend::new(FakeRunner::default(), PathBuf::from("ryzenadj"), None, initial);
        assert_eq!(backend.active().cpu_offset, 0);
    }

    #[tokio::test]
    async fn test_update_runs_delta_and_commits() {
        let runner = FakeRunner::default();
        let mut backend = backend(&runner, None);
        let new = Configuration::default().with(ConfigChange::SetCpuOffset(-10));

        let report = backend.update(new.clone()).await.unwrap();

        assert!(report.executed);
        assert_eq!(report.applied, new);
        assert_eq!(report.cpu_value, "0xffff6");
        let invocation = report.invocation.unwrap();
        assert_eq!(invocation.command, "/usr/bin/ryzenadj --set-coall=0xffff6");
        assert_eq!(invocation.returncode, 0);
        assert_eq!(runner.calls(), vec![vec!["--set-coall=0xffff6".to_string()]]);
        assert_eq!(backend.active(), &new);
    }

    #[tokio::test]
    async fn test_update_without_changes_does_not_run() {
        let runner = FakeRunner::default();
        let mut backend = backend(&runner, None);

        let report = backend
            .update(Configuration::default().with(ConfigChange::ShowDebug(true)))
            .await
            .unwrap();

        assert!(!report.executed);
        assert!(report.invocation.is_none());
        assert!(report.applied.show_debug);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_of_disabled_value_commits_without_running() {
        let runner = FakeRunner::default();
        let mut backend = backend(&runner, None);
        let new = Configuration::default().with(ConfigChange::SetGpuOffset(-4));

        let report = backend.update(new.clone()).await.unwrap();

        assert!(!report.executed);
        assert_eq!(backend.active(), &new);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_run_keeps_active_configuration() {
        let runner = FakeRunner::default();
        runner.fail_with(1);
        let mut backend = backend(&runner, None);

        let err = backend
            .update(Configuration::default().with(ConfigChange::SetCpuOffset(-5)))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "ryzenadj exited with status 1: device busy");
        assert_eq!(backend.active(), &Configuration::default());
    }

    #[tokio::test]
    async fn test_positive_offsets_never_reach_ryzenadj() {
        let runner = FakeRunner::default();
        let mut backend = backend(&runner, None);
        backend
            .update(Configuration::default().with(ConfigChange::SetCpuOffset(-2)))
            .await
            .unwrap();

        let report = backend
            .update(Configuration::default().with(ConfigChange::SetCpuOffset(12)))
            .await
            .unwrap();

        assert_eq!(report.applied.cpu_offset, 0);
        assert_eq!(runner.calls()[1], vec!["--set-coall=0x100000".to_string()]);
    }

    #[tokio::test]
    async fn test_reapply_runs_full_flags() {
        let runner = FakeRunner::default();
        let mut backend = backend(&runner, None);
        backend
            .update(
                Configuration::default()
                    .with(ConfigChange::ApplyGpuOffset(true))
                    .with(ConfigChange::SetGpuOffset(-6)),
            )
            .await
            .unwrap();

        backend.reapply().await.unwrap();

        assert_eq!(
            runner.calls().last().unwrap(),
            &vec!["--set-coall=0x100000".to_string(), "--set-cogfx=0xffffa".to_string()]
        );
    }

    #[tokio::test]
    async fn test_successful_update_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let runner = FakeRunner::default();
        let mut backend = backend(&runner, Some(store.clone()));
        let new = Configuration::default().with(ConfigChange::SetCpuOffset(-11));

        backend.update(new.clone()).await.unwrap();

        assert_eq!(store.load().unwrap(), Some(new));
    }

    #[tokio::test]
    async fn test_failed_update_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let runner = FakeRunner::default();
        runner.fail_with(2);
        let mut backend = backend(&runner, Some(store.clone()));

        let _ = backend
            .update(Configuration::default().with(ConfigChange::SetCpuOffset(-11)))
            .await;

        assert_eq!(store.load().unwrap(), None);
    }

    fn out_of_range() -> Configuration {
        Configuration {
            cpu_offset: -2_000_000,
            apply_power_limit: true,
            power_limit_mw: 4_000_000_000,
            ..Configuration::default()
        }
    }

    #[tokio::test]
    async fn test_update_refuses_out_of_range_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let runner = FakeRunner::default();
        let mut backend = backend(&runner, Some(store.clone()));

        let err = backend.update(out_of_range()).await.unwrap_err();

        assert_eq!(
            format!("{err:#}"),
            "Rejected configuration: CPU offset -2000000 outside -30..=0"
        );
        assert!(runner.calls().is_empty());
        assert_eq!(backend.active(), &Configuration::default());
        assert_eq!(store.load().unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_refuses_power_limit_out_of_range() {
        let runner = FakeRunner::default();
        let mut backend = backend(&runner, None);
        let new = Configuration::default()
            .with(ConfigChange::ApplyPowerLimit(true))
            .with(ConfigChange::SetPowerLimit(40_000));

        assert!(backend.update(new).await.is_err());
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_apply_full_refuses_out_of_range_values() {
        let runner = FakeRunner::default();
        let mut backend = backend(&runner, None);

        assert!(backend.apply_full(out_of_range()).await.is_err());
        assert!(runner.calls().is_empty());
        assert_eq!(backend.active(), &Configuration::default());
    }

    #[test]
    fn test_new_falls_back_to_defaults_when_out_of_range() {
        let backend = Backend::new(FakeRunner::default(), PathBuf::from("ryzenadj"), None, out_of_range());
        assert_eq!(backend.active(), &Configuration::default());
    }

    #[tokio::test]
    async fn test_show_debug_only_update_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let runner = FakeRunner::default();
        let mut backend = backend(&runner, Some(store.clone()));

        backend
            .update(Configuration::default().with(ConfigChange::ShowDebug(true)))
            .await
            .unwrap();

        assert!(runner.calls().is_empty());
        assert_eq!(
            store.load().unwrap(),
            Some(Configuration::default().with(ConfigChange::ShowDebug(true)))
        );
    }
}
