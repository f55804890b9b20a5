use crate::domain::model::CommandSpec;
use crate::domain::ports::CommandRunner;
use crate::utils::error::{AllocError, Result};
use std::process::Command;

/// Runs commands on the host and waits for each to finish.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, command: &CommandSpec) -> Result<()> {
        tracing::info!("▶️ {}", command);

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        if let Some(dir) = &command.current_dir {
            cmd.current_dir(dir);
        }

        let output = cmd.output().map_err(|e| AllocError::StepFailed {
            step: command.description.clone(),
            detail: format!("could not start '{}': {}", command.program, e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!("❌ {} exited with {}", command.description, output.status);
            return Err(AllocError::StepFailed {
                step: command.description.clone(),
                detail: format!("{}: {}", output.status, stderr.trim()),
            });
        }

        tracing::debug!(
            "{} finished: {}",
            command.description,
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }
}

/// Logs every command instead of running it.
#[derive(Debug, Clone, Default)]
pub struct DryRunRunner;

impl CommandRunner for DryRunRunner {
    fn run(&self, command: &CommandSpec) -> Result<()> {
        match &command.current_dir {
            Some(dir) => tracing::info!("[dry-run] (in {}) {}", dir.display(), command),
            None => tracing::info!("[dry-run] {}", command),
        }
        Ok(())
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_successful_command() {
        let runner = SystemCommandRunner;
        assert!(runner.run(&CommandSpec::new("noop", "true")).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_zero_exit_is_step_failure() {
        let runner = SystemCommandRunner;
        let err = runner
            .run(&CommandSpec::new("always fails", "false"))
            .unwrap_err();
        match err {
            AllocError::StepFailed { step, .. } => assert_eq!(step, "always fails"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_missing_program_is_step_failure() {
        let runner = SystemCommandRunner;
        let err = runner
            .run(&CommandSpec::new("ghost", "cloud-alloc-no-such-program"))
            .unwrap_err();
        assert!(matches!(err, AllocError::StepFailed { .. }));
    }

    #[test]
    fn test_dry_run_never_fails() {
        let runner = DryRunRunner;
        let cmd = CommandSpec::new("install", "pip3").arg("install").current_dir("/tmp");
        assert!(runner.run(&cmd).is_ok());
        assert!(runner.is_dry_run());
        assert!(!SystemCommandRunner.is_dry_run());
    }
}
