//! Host provisioning for the user and provider nodes.
//!
//! Every step is blocking and the first failure aborts the run. Nothing is
//! retried or rolled back.

use crate::config::deploy::BootstrapConfig;
use crate::domain::model::Role;
use crate::domain::ports::CommandRunner;
use crate::utils::error::{AllocError, Result};
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

pub const MANIFEST_FILE: &str = "requirements.txt";

/// 固定內容，與 role / identifier 無關
pub const REQUIREMENTS_MANIFEST: &str = "flask\nboto3\nrequests\nnumpy\n";

/// What the operator has to type to start the node on this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchInstructions {
    pub working_dir: PathBuf,
    pub env: Vec<(String, String)>,
    pub command: String,
}

impl LaunchInstructions {
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![format!("cd {}", self.working_dir.display())];
        lines.extend(
            self.env
                .iter()
                .map(|(key, value)| format!("export {}={}", key, value)),
        );
        lines.push(self.command.clone());
        lines
    }
}

impl fmt::Display for LaunchInstructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lines().join("\n"))
    }
}

pub struct Bootstrapper<R: CommandRunner> {
    config: BootstrapConfig,
    runner: R,
}

impl<R: CommandRunner> Bootstrapper<R> {
    pub fn new(config: BootstrapConfig, runner: R) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    /// Provisions the host for `role`. Returns `None` for an unrecognized
    /// role: the common steps still run but there is nothing to launch.
    pub fn run(&self, role: &Role, identifier: Option<&str>) -> Result<Option<LaunchInstructions>> {
        // user 角色需要識別碼，先檢查再動主機
        let identifier = identifier.map(str::trim).filter(|id| !id.is_empty());
        if *role == Role::User && identifier.is_none() {
            return Err(AllocError::MissingConfigError {
                field: "identifier (required for the user role)".to_string(),
            });
        }

        check_target_dir(&self.config.target_dir)?;

        tracing::info!("🚀 Bootstrapping host as '{}'", role);

        for command in &self.config.setup_commands {
            self.runner.run(command)?;
        }

        self.recreate_target_dir()?;
        self.write_manifest()?;

        let mut install = self.config.install_command.clone();
        if install.current_dir.is_none() {
            install.current_dir = Some(self.config.target_dir.clone());
        }
        self.runner.run(&install)?;

        let instructions = self.instructions(role, identifier);
        match &instructions {
            Some(_) => tracing::info!("✅ Host ready for the {} node", role),
            None => tracing::warn!(
                "⚠️ Unrecognized role '{}': setup done, no launch instructions",
                role
            ),
        }
        Ok(instructions)
    }

    /// Launch instructions for `role`, without touching the host.
    pub fn instructions(&self, role: &Role, identifier: Option<&str>) -> Option<LaunchInstructions> {
        let launcher = &self.config.launcher;
        match role {
            Role::User => Some(LaunchInstructions {
                working_dir: self.config.target_dir.clone(),
                env: vec![
                    (
                        "USER_ID".to_string(),
                        identifier.unwrap_or_default().to_string(),
                    ),
                    ("PORT".to_string(), self.config.user_port.to_string()),
                ],
                command: format!("{} serve-user", launcher),
            }),
            Role::Provider => Some(LaunchInstructions {
                working_dir: self.config.target_dir.clone(),
                env: vec![("PORT".to_string(), self.config.provider_port.to_string())],
                command: format!("{} serve-provider", launcher),
            }),
            Role::Unrecognized(_) => None,
        }
    }

    fn recreate_target_dir(&self) -> Result<()> {
        let dir = &self.config.target_dir;
        if self.runner.is_dry_run() {
            tracing::info!("[dry-run] recreate {}", dir.display());
            return Ok(());
        }
        let step = |e: std::io::Error| AllocError::StepFailed {
            step: "recreate target directory".to_string(),
            detail: format!("{}: {}", dir.display(), e),
        };

        if dir.exists() {
            tracing::debug!("Removing {}", dir.display());
            fs::remove_dir_all(dir).map_err(step)?;
        }
        fs::create_dir_all(dir).map_err(step)?;
        tracing::info!("📁 Recreated {}", dir.display());
        Ok(())
    }

    fn write_manifest(&self) -> Result<()> {
        let path = manifest_path(&self.config.target_dir);
        if self.runner.is_dry_run() {
            tracing::info!("[dry-run] write {}", path.display());
            return Ok(());
        }
        fs::write(&path, REQUIREMENTS_MANIFEST).map_err(|e| AllocError::StepFailed {
            step: "write dependency manifest".to_string(),
            detail: format!("{}: {}", path.display(), e),
        })?;
        tracing::info!("📝 Wrote {}", path.display());
        Ok(())
    }
}

/// The target directory is wiped on every run, so it must not be the
/// filesystem root, the current directory or one of its ancestors.
pub fn check_target_dir(dir: &Path) -> Result<()> {
    let refuse = |reason: &str| -> Result<()> {
        Err(AllocError::InvalidConfigValueError {
            field: "bootstrap.target_dir".to_string(),
            value: dir.display().to_string(),
            reason: reason.to_string(),
        })
    };

    if dir.parent().is_none() {
        return refuse("Refusing to wipe the filesystem root");
    }
    if dir.components().all(|c| matches!(c, Component::CurDir)) {
        return refuse("Refusing to wipe the current directory");
    }
    let cwd = std::env::current_dir().and_then(|d| d.canonicalize());
    if let (Ok(target), Ok(cwd)) = (dir.canonicalize(), cwd) {
        if cwd.starts_with(&target) {
            return refuse("Refusing to wipe the current directory or one of its parents");
        }
    }
    Ok(())
}

pub fn manifest_path(target_dir: &Path) -> PathBuf {
    target_dir.join(MANIFEST_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::runner::DryRunRunner;
    use crate::domain::model::CommandSpec;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct MockRunner {
        calls: Arc<Mutex<Vec<CommandSpec>>>,
    }

    impl CommandRunner for MockRunner {
        fn run(&self, command: &CommandSpec) -> Result<()> {
            self.calls.lock().unwrap().push(command.clone());
            Ok(())
        }
    }

    fn config_in(temp: &TempDir) -> BootstrapConfig {
        BootstrapConfig {
            target_dir: temp.path().join("CloudResourceAllocation"),
            ..BootstrapConfig::default()
        }
    }

    #[test]
    fn test_user_instructions() {
        let temp = TempDir::new().unwrap();
        let runner = MockRunner::default();
        let bootstrapper = Bootstrapper::new(config_in(&temp), runner.clone());

        let instructions = bootstrapper
            .run(&Role::User, Some("S2"))
            .unwrap()
            .unwrap();
        let lines = instructions.lines();
        assert!(lines.contains(&"export USER_ID=S2".to_string()));
        assert!(lines.contains(&"export PORT=5000".to_string()));
        assert_eq!(lines.last().unwrap(), "cloud-alloc serve-user");

        // 2 個 setup + 1 個 install
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[2].current_dir.as_deref(),
            Some(temp.path().join("CloudResourceAllocation").as_path())
        );
    }

    #[test]
    fn test_provider_instructions() {
        let temp = TempDir::new().unwrap();
        let bootstrapper = Bootstrapper::new(config_in(&temp), MockRunner::default());
        let instructions = bootstrapper.run(&Role::Provider, None).unwrap().unwrap();
        assert_eq!(instructions.env, vec![("PORT".to_string(), "5001".to_string())]);
        assert_eq!(instructions.command, "cloud-alloc serve-provider");
    }

    #[test]
    fn test_user_role_requires_identifier_before_any_step() {
        let temp = TempDir::new().unwrap();
        let runner = MockRunner::default();
        let bootstrapper = Bootstrapper::new(config_in(&temp), runner.clone());

        let err = bootstrapper.run(&Role::User, Some("  ")).unwrap_err();
        assert!(matches!(err, AllocError::MissingConfigError { .. }));
        assert!(runner.calls.lock().unwrap().is_empty());
        assert!(!temp.path().join("CloudResourceAllocation").exists());
    }

    #[test]
    fn test_manifest_does_not_depend_on_role() {
        let temp = TempDir::new().unwrap();
        let bootstrapper = Bootstrapper::new(config_in(&temp), MockRunner::default());
        let manifest = manifest_path(&bootstrapper.config().target_dir);

        bootstrapper.run(&Role::User, Some("S1")).unwrap();
        let first = fs::read_to_string(&manifest).unwrap();
        bootstrapper.run(&Role::Provider, Some("ignored")).unwrap();
        let second = fs::read_to_string(&manifest).unwrap();

        assert_eq!(first, REQUIREMENTS_MANIFEST);
        assert_eq!(first, second);
    }

    #[test]
    fn test_dry_run_leaves_target_dir_untouched() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);
        fs::create_dir_all(&config.target_dir).unwrap();
        let existing = config.target_dir.join("operator_data.txt");
        fs::write(&existing, "keep me").unwrap();

        let bootstrapper = Bootstrapper::new(config.clone(), DryRunRunner);
        let instructions = bootstrapper.run(&Role::Provider, None).unwrap();

        assert!(instructions.is_some());
        assert_eq!(fs::read_to_string(&existing).unwrap(), "keep me");
        assert!(!manifest_path(&config.target_dir).exists());
    }

    #[test]
    fn test_dry_run_does_not_create_missing_target_dir() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);
        Bootstrapper::new(config.clone(), DryRunRunner)
            .run(&Role::User, Some("S1"))
            .unwrap();
        assert!(!config.target_dir.exists());
    }

    #[test]
    fn test_unsafe_target_dirs_are_refused_before_any_step() {
        let cwd = std::env::current_dir().unwrap();
        let parent = cwd.parent().unwrap_or(&cwd).to_path_buf();

        for target in [PathBuf::from("/"), PathBuf::from("."), PathBuf::from("./."), cwd, parent] {
            let runner = MockRunner::default();
            let config = BootstrapConfig {
                target_dir: target.clone(),
                ..BootstrapConfig::default()
            };
            let err = Bootstrapper::new(config, runner.clone())
                .run(&Role::Provider, None)
                .unwrap_err();
            assert!(
                matches!(err, AllocError::InvalidConfigValueError { .. }),
                "{} was accepted",
                target.display()
            );
            assert!(runner.calls.lock().unwrap().is_empty());
        }
    }

    #[test]
    fn test_check_target_dir_accepts_fresh_subdirectory() {
        let temp = TempDir::new().unwrap();
        assert!(check_target_dir(&temp.path().join("CloudResourceAllocation")).is_ok());
        assert!(check_target_dir(Path::new("build/node")).is_ok());
    }
}
