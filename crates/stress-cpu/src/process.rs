//! Supervision of the CPU load process

use crate::config::CpuLoadConfig;
use crate::{CpuLoadError, Result};

use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// A running instance of the CPU load executable
pub struct CpuLoadProcess {
    config: CpuLoadConfig,
    child: Option<Child>,
    exit_status: Option<ExitStatus>,
    started: Instant,
    duration_seconds: u64,
    threads: u32,
}

impl CpuLoadProcess {
    /// Start `executable <duration_seconds> <threads>`.
    ///
    /// `threads` is clamped to the host's available parallelism.
    pub fn spawn(config: CpuLoadConfig, duration_seconds: u64, threads: u32) -> Result<Self> {
        config.validate().map_err(CpuLoadError::InvalidArgument)?;
        if duration_seconds == 0 {
            return Err(CpuLoadError::InvalidArgument(
                "duration must be greater than zero".to_string(),
            ));
        }

        let max_threads = std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1);
        let threads = threads.clamp(1, max_threads.max(1));

        // A path with a directory component must exist; bare names go through PATH
        if config.executable.components().count() > 1 && !config.executable.is_file() {
            return Err(CpuLoadError::ExecutableMissing(
                config.executable.display().to_string(),
            ));
        }

        info!(
            "Starting CPU load: {} {} {}",
            config.executable.display(),
            duration_seconds,
            threads
        );

        let child = Command::new(&config.executable)
            .arg(duration_seconds.to_string())
            .arg(threads.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    CpuLoadError::ExecutableMissing(config.executable.display().to_string())
                }
                _ => CpuLoadError::Spawn(e.to_string()),
            })?;

        debug!("CPU load running as pid {}", child.id());

        Ok(Self {
            config,
            child: Some(child),
            exit_status: None,
            started: Instant::now(),
            duration_seconds,
            threads,
        })
    }

    /// Check if the process is still running
    pub fn is_running(&mut self) -> bool {
        self.poll();
        self.child.is_some()
    }

    /// Exit status once the process has exited
    pub fn exit_status(&mut self) -> Option<ExitStatus> {
        self.poll();
        self.exit_status
    }

    /// Wait for the process to exit on its own
    pub async fn wait(&mut self) -> Result<Option<ExitStatus>> {
        while self.is_running() {
            tokio::time::sleep(self.config.poll_interval).await;
        }
        Ok(self.exit_status)
    }

    /// Stop the process: SIGTERM first, then a kill after the grace period.
    pub async fn terminate(&mut self) -> Result<Option<ExitStatus>> {
        let Some(mut child) = self.child.take() else {
            return Ok(self.exit_status);
        };

        info!("Stopping CPU load process {}", child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(child.id() as i32);
            if let Err(e) = signal::kill(pid, Signal::SIGTERM) {
                warn!("Failed to send SIGTERM: {}", e);
            } else {
                debug!("Sent SIGTERM to CPU load process");
            }
        }

        let poll_interval = self.config.poll_interval;
        let graceful = timeout(self.config.grace_period, async {
            loop {
                match child.try_wait() {
                    Ok(Some(status)) => return Ok(status),
                    Ok(None) => tokio::time::sleep(poll_interval).await,
                    Err(e) => return Err(e),
                }
            }
        })
        .await;

        let status = match graceful {
            Ok(Ok(status)) => {
                info!("CPU load stopped gracefully");
                status
            }
            Ok(Err(e)) => {
                error!("Error waiting for CPU load process: {}", e);
                force_kill(&mut child)?
            }
            Err(_) => {
                warn!("CPU load ignored SIGTERM for {:?}, killing", self.config.grace_period);
                force_kill(&mut child)?
            }
        };

        self.exit_status = Some(status);
        Ok(self.exit_status)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn duration_seconds(&self) -> u64 {
        self.duration_seconds
    }

    /// Thread count passed to the executable after clamping
    pub fn threads(&self) -> u32 {
        self.threads
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    pub fn config(&self) -> &CpuLoadConfig {
        &self.config
    }

    fn poll(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("CPU load exited with {}", status);
                self.exit_status = Some(status);
                self.child = None;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Unable to query CPU load process: {}", e);
                self.child = None;
            }
        }
    }
}

fn force_kill(child: &mut Child) -> Result<ExitStatus> {
    if let Err(e) = child.kill() {
        // Already exited between the last poll and now
        debug!("Kill failed: {}", e);
    }
    Ok(child.wait()?)
}

impl Drop for CpuLoadProcess {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            warn!("CPU load process dropped while running, killing it");
            if let Err(e) = child.kill() {
                error!("Failed to kill CPU load process: {}", e);
            }
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_duration_is_rejected() {
        let result = CpuLoadProcess::spawn(CpuLoadConfig::new("true"), 0, 1);
        assert!(matches!(result, Err(CpuLoadError::InvalidArgument(_))));
    }

    #[test]
    fn test_missing_executable() {
        let result = CpuLoadProcess::spawn(CpuLoadConfig::new("./definitely/not/here/cpu_stress"), 5, 1);
        assert!(matches!(result, Err(CpuLoadError::ExecutableMissing(_))));

        let result = CpuLoadProcess::spawn(CpuLoadConfig::new("stresslab-no-such-cpu-load"), 5, 1);
        assert!(matches!(result, Err(CpuLoadError::ExecutableMissing(_))));
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::path::PathBuf;

        fn script(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
            let path = dir.path().join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn config(path: PathBuf) -> CpuLoadConfig {
            CpuLoadConfig::new(path)
                .with_grace_period(Duration::from_millis(300))
                .with_poll_interval(Duration::from_millis(10))
        }

        #[tokio::test]
        async fn test_arguments_and_natural_exit() {
            let dir = tempfile::tempdir().unwrap();
            let args_file = dir.path().join("args");
            let body = format!("echo \"$1 $2\" > {}", args_file.display());
            let mut load = CpuLoadProcess::spawn(config(script(&dir, "load.sh", &body)), 7, 0).unwrap();

            assert_eq!(load.threads(), 1);
            let status = load.wait().await.unwrap().unwrap();
            assert!(status.success());
            assert!(!load.is_running());
            assert_eq!(std::fs::read_to_string(&args_file).unwrap().trim(), "7 1");
        }

        #[tokio::test]
        async fn test_threads_clamped_to_host() {
            let dir = tempfile::tempdir().unwrap();
            let mut load = CpuLoadProcess::spawn(config(script(&dir, "load.sh", "exit 0")), 1, u32::MAX).unwrap();
            let max = std::thread::available_parallelism().unwrap().get() as u32;
            assert_eq!(load.threads(), max);
            load.wait().await.unwrap();
        }

        #[tokio::test]
        async fn test_graceful_terminate() {
            let dir = tempfile::tempdir().unwrap();
            let mut load = CpuLoadProcess::spawn(config(script(&dir, "load.sh", "exec sleep \"$1\"")), 30, 1).unwrap();
            assert!(load.is_running());

            let started = Instant::now();
            let status = load.terminate().await.unwrap().unwrap();
            assert!(!status.success());
            assert!(started.elapsed() < Duration::from_millis(300));
            assert!(!load.is_running());

            // Second terminate is a no-op
            assert_eq!(load.terminate().await.unwrap(), Some(status));
        }

        #[tokio::test]
        async fn test_forced_kill_after_grace_period() {
            let dir = tempfile::tempdir().unwrap();
            let body = "trap '' TERM\nwhile :; do sleep 1; done";
            let mut load = CpuLoadProcess::spawn(config(script(&dir, "stubborn.sh", body)), 30, 1).unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;

            let started = Instant::now();
            let status = load.terminate().await.unwrap().unwrap();
            assert!(!status.success());
            assert!(started.elapsed() >= Duration::from_millis(300));
            assert_eq!(load.exit_status(), Some(status));
        }
    }
}
