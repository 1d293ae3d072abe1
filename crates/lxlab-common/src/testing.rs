//! Test doubles for [`CommandExecutor`].

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::LabResult;
use crate::exec::{CommandExecutor, CommandOutput, CommandSpec};

#[derive(Debug)]
struct FailureRule {
    needle: String,
    /// Failures left; `None` fails forever.
    remaining: Option<usize>,
}

/// Executor that records every command and fails on request.
///
/// Commands succeed unless their command line contains the needle of a
/// failure rule with failures left.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<CommandSpec>>,
    rules: Mutex<Vec<FailureRule>>,
}

impl RecordingExecutor {
    /// Create an executor on which every command succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `times` commands whose command line contains `needle`.
    #[must_use]
    pub fn fail_times(self, needle: &str, times: usize) -> Self {
        self.push_rule(needle, Some(times));
        self
    }

    /// Fail every command whose command line contains `needle`.
    #[must_use]
    pub fn fail_always(self, needle: &str) -> Self {
        self.push_rule(needle, None);
        self
    }

    fn push_rule(&self, needle: &str, remaining: Option<usize>) {
        self.rules
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(FailureRule {
                needle: needle.to_string(),
                remaining,
            });
    }

    /// Every command run so far.
    #[must_use]
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Command lines of every command run so far.
    #[must_use]
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::command_line).collect()
    }

    /// Number of commands whose command line contains `needle`.
    #[must_use]
    pub fn count_matching(&self, needle: &str) -> usize {
        self.command_lines()
            .iter()
            .filter(|line| line.contains(needle))
            .count()
    }

    /// Position of the first command containing `needle`.
    #[must_use]
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.command_lines()
            .iter()
            .position(|line| line.contains(needle))
    }

    /// Contents last written to `path` through `tee`.
    #[must_use]
    pub fn written_file(&self, path: &Path) -> Option<String> {
        let target = path.to_string_lossy();
        self.calls()
            .into_iter()
            .rev()
            .find(|spec| spec.program == "tee" && spec.args.iter().any(|a| *a == target))
            .and_then(|spec| spec.stdin)
    }

    fn should_fail(&self, line: &str) -> bool {
        let mut rules = self
            .rules
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for rule in rules.iter_mut() {
            if !line.contains(&rule.needle) {
                continue;
            }
            match rule.remaining.as_mut() {
                None => return true,
                Some(0) => {}
                Some(n) => {
                    *n -= 1;
                    return true;
                }
            }
        }
        false
    }
}

#[async_trait]
impl CommandExecutor for RecordingExecutor {
    async fn run(&self, spec: &CommandSpec) -> LabResult<CommandOutput> {
        let line = spec.command_line();
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(spec.clone());

        if self.should_fail(&line) {
            CommandOutput {
                success: false,
                code: Some(1),
                stdout: String::new(),
                stderr: format!("simulated failure: {line}"),
            }
            .checked(spec)
        } else {
            Ok(CommandOutput::ok())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fails_requested_number_of_times() {
        let exec = RecordingExecutor::new().fail_times("debootstrap", 2);
        let spec = CommandSpec::new("debootstrap").arg("jammy");

        assert!(exec.run(&spec).await.is_err());
        assert!(exec.run(&spec).await.is_err());
        assert!(exec.run(&spec).await.is_ok());
        assert_eq!(exec.count_matching("debootstrap"), 3);
    }

    #[tokio::test]
    async fn unchecked_failures_are_reported_not_raised() {
        let exec = RecordingExecutor::new().fail_always("undefine");
        let output = exec
            .run(&CommandSpec::new("virsh").arg("undefine").unchecked())
            .await
            .unwrap();
        assert!(!output.success);
    }

    #[tokio::test]
    async fn remembers_written_files() {
        let exec = RecordingExecutor::new();
        let path = Path::new("/rootfs/etc/frr/daemons");
        crate::exec::write_file(&exec, path, "zebra=yes\n", 0o644)
            .await
            .unwrap();
        assert_eq!(exec.written_file(path).as_deref(), Some("zebra=yes\n"));
        assert_eq!(exec.count_matching("chmod 644"), 1);
    }
}
