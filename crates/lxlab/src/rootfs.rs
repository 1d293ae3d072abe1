//! Root filesystem bootstrap.

use std::path::Path;
use std::sync::Arc;

use lxlab_common::{CommandExecutor, CommandSpec, LabError, LabPaths, LabResult};

use crate::config::BootstrapOptions;

/// apt configuration fed on stdin when IPv4 is forced.
const APT_FORCE_IPV4: &str = "Acquire::ForceIPv4 \"true\";\n";

/// How a bootstrap run ended.
#[derive(Debug)]
pub enum BootstrapOutcome {
    /// The rootfs was created.
    Built {
        /// Attempts used, including the successful one.
        attempts: u32,
        /// Cleanup cycles performed between attempts.
        cleanups: u32,
    },
    /// Every attempt failed, or a failure could not be retried.
    Failed {
        /// Attempts made.
        attempts: u32,
        /// Error of the last attempt.
        last_error: LabError,
    },
}

impl BootstrapOutcome {
    /// Convert into a result, aggregating a failure into one error.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::RootfsExhausted`] for a failed outcome.
    pub fn into_result(self) -> LabResult<BootstrapReport> {
        match self {
            Self::Built { attempts, cleanups } => Ok(BootstrapReport { attempts, cleanups }),
            Self::Failed {
                attempts,
                last_error,
            } => Err(LabError::RootfsExhausted {
                attempts,
                last_error: Box::new(last_error),
            }),
        }
    }
}

/// Summary of a successful bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Attempts used.
    pub attempts: u32,
    /// Cleanup cycles performed.
    pub cleanups: u32,
}

/// Builds a minimal distribution rootfs with `debootstrap`.
pub struct RootfsBuilder {
    executor: Arc<dyn CommandExecutor>,
    paths: LabPaths,
    options: BootstrapOptions,
}

impl RootfsBuilder {
    /// Create a builder.
    pub fn new(executor: Arc<dyn CommandExecutor>, paths: LabPaths, options: BootstrapOptions) -> Self {
        Self {
            executor,
            paths,
            options,
        }
    }

    /// Bootstrap the rootfs of `name` from `mirror`, retrying up to
    /// `max_attempts` times in total.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::RootfsExhausted`] naming the attempt count once
    /// no attempt succeeded.
    pub async fn create_rootfs(
        &self,
        name: &str,
        mirror: &str,
        max_attempts: u32,
    ) -> LabResult<BootstrapReport> {
        let report = self.bootstrap(name, mirror, max_attempts).await.into_result()?;
        tracing::info!(
            container = name,
            attempts = report.attempts,
            "Successfully created rootfs"
        );
        Ok(report)
    }

    /// Bootstrap using the configured mirror and attempt count.
    ///
    /// # Errors
    ///
    /// See [`create_rootfs`](Self::create_rootfs).
    pub async fn create_default_rootfs(&self, name: &str) -> LabResult<BootstrapReport> {
        self.create_rootfs(name, &self.options.mirror, self.options.max_attempts)
            .await
    }

    /// Run the bounded attempt loop.
    pub async fn bootstrap(&self, name: &str, mirror: &str, max_attempts: u32) -> BootstrapOutcome {
        let rootfs = self.paths.container_rootfs(name);
        let max_attempts = max_attempts.max(1);
        let ip_mode = if self.options.force_ipv4 {
            "IPv4"
        } else {
            "IPv4/IPv6"
        };

        let mut cleanups = 0;
        let mut attempt = 1;
        loop {
            tracing::info!(
                container = name,
                attempt,
                max_attempts,
                ip_mode,
                "Creating {} rootfs",
                self.options.suite
            );

            match self
                .executor
                .run(&self.debootstrap_command(&rootfs, mirror))
                .await
            {
                Ok(_) => return BootstrapOutcome::Built { attempts: attempt, cleanups },
                Err(e) if attempt < max_attempts && is_retryable(&e) => {
                    tracing::warn!(container = name, attempt, error = %e, "Bootstrap attempt failed, retrying");
                    self.cleanup(&rootfs).await;
                    cleanups += 1;
                    attempt += 1;
                }
                Err(e) => {
                    return BootstrapOutcome::Failed {
                        attempts: attempt,
                        last_error: e,
                    };
                }
            }
        }
    }

    fn debootstrap_command(&self, rootfs: &Path, mirror: &str) -> CommandSpec {
        let cmd = CommandSpec::new("debootstrap")
            .arg(format!("--arch={}", self.options.arch))
            .arg("--verbose")
            .arg(&self.options.suite)
            .path(rootfs)
            .arg(mirror)
            .privileged()
            .streaming();

        if self.options.force_ipv4 {
            cmd.env("WGET_OPTIONS", "--inet4-only")
                .env("APT_CONFIG", "/dev/stdin")
                .stdin(APT_FORCE_IPV4)
        } else {
            cmd
        }
    }

    /// Remove a partial rootfs and recreate the empty directory.
    ///
    /// Failures are logged; the next attempt runs regardless.
    async fn cleanup(&self, rootfs: &Path) {
        let remove = CommandSpec::new("rm")
            .arg("-rf")
            .path(rootfs)
            .privileged()
            .unchecked();
        match self.executor.run(&remove).await {
            Ok(output) if !output.success => {
                tracing::warn!(rootfs = %rootfs.display(), stderr = %output.stderr.trim(), "Failed to remove partial rootfs");
            }
            Err(e) => {
                tracing::warn!(rootfs = %rootfs.display(), error = %e, "Failed to remove partial rootfs");
            }
            Ok(_) => {}
        }

        let recreate = CommandSpec::new("mkdir")
            .arg("-p")
            .path(rootfs)
            .privileged()
            .unchecked();
        match self.executor.run(&recreate).await {
            Ok(output) if output.success => {
                tracing::debug!(rootfs = %rootfs.display(), "Recreated empty rootfs directory");
            }
            Ok(output) => {
                tracing::warn!(rootfs = %rootfs.display(), stderr = %output.stderr.trim(), "Failed to recreate rootfs directory");
            }
            Err(e) => {
                tracing::warn!(rootfs = %rootfs.display(), error = %e, "Failed to recreate rootfs directory");
            }
        }
    }
}

/// Tool failures are retried; a missing `debootstrap` binary is not.
const fn is_retryable(err: &LabError) -> bool {
    matches!(err, LabError::CommandFailed { .. })
}
