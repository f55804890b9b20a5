#[cfg(feature = "cli")]
pub mod cli;
pub mod deploy;
pub mod game;
pub mod lambda;

#[cfg(feature = "cli")]
pub use cli::{CliConfig, Command};
pub use deploy::DeployConfig;
pub use game::GameConfig;

use regex::{Captures, Regex};
use std::sync::OnceLock;

/// 替換環境變數 (例如 ${RESOURCE_MANAGER_URL})，未設定的變數保留原樣
pub fn substitute_env_vars(content: &str) -> String {
    static ENV_VAR: OnceLock<Regex> = OnceLock::new();
    let re = ENV_VAR.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex is valid")
    });

    re.replace_all(content, |caps: &Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_env_vars() {
        std::env::set_var("CLOUD_ALLOC_TEST_REGION", "eu-west-1");
        let out = substitute_env_vars("region = \"${CLOUD_ALLOC_TEST_REGION}\"");
        assert_eq!(out, "region = \"eu-west-1\"");
    }

    #[test]
    fn test_unset_env_vars_are_kept() {
        let out = substitute_env_vars("url = \"${CLOUD_ALLOC_SURELY_UNSET_VAR}\"");
        assert_eq!(out, "url = \"${CLOUD_ALLOC_SURELY_UNSET_VAR}\"");
    }
}
