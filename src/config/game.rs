use crate::config::substitute_env_vars;
use crate::domain::model::{Constraints, WeightPair};
use crate::utils::error::{AllocError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_non_negative, validate_positive_number, Validate,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Parameters of the allocation game shared by every node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    /// 最後兩位學號 D，用來推導權重
    #[serde(default = "default_weight_seed")]
    pub weight_seed: u32,
    pub resource_prices: Vec<f64>,
    /// t̂_ij：使用者 i 的一個子任務在資源 j 上的執行時間
    pub execution_times: Vec<Vec<f64>>,
    pub users: Vec<UserTask>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTask {
    pub id: String,
    pub subtasks: usize,
    pub deadline: f64,
    pub budget: f64,
}

fn default_weight_seed() -> u32 {
    88
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            weight_seed: default_weight_seed(),
            resource_prices: vec![1.0, 1.2, 1.5, 1.8, 2.0],
            execution_times: vec![
                vec![5.0, 4.2, 3.6, 3.0, 2.8],
                vec![6.0, 5.0, 4.0, 3.5, 3.0],
                vec![4.0, 3.5, 3.2, 2.8, 2.4],
            ],
            users: vec![
                UserTask::new("S1", 2, 500.0, 20.0),
                UserTask::new("S2", 3, 300.0, 30.0),
                UserTask::new("S3", 4, 800.0, 30.0),
            ],
        }
    }
}

impl UserTask {
    pub fn new(id: &str, subtasks: usize, deadline: f64, budget: f64) -> Self {
        Self {
            id: id.to_string(),
            subtasks,
            deadline,
            budget,
        }
    }

    pub fn constraints(&self) -> Constraints {
        Constraints {
            deadline: self.deadline,
            budget: self.budget,
        }
    }
}

impl GameConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(AllocError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = substitute_env_vars(content);
        let config: Self =
            toml::from_str(&processed).map_err(|e| AllocError::ConfigValidationError {
                field: "toml_parsing".to_string(),
                message: format!("TOML parsing error: {}", e),
            })?;
        config.validate_config()?;
        Ok(config)
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_positive_number("users", self.users.len(), 1)?;
        validate_positive_number("resource_prices", self.resource_prices.len(), 1)?;

        for (j, price) in self.resource_prices.iter().enumerate() {
            validate_non_negative(&format!("resource_prices[{}]", j), *price)?;
        }

        if self.execution_times.len() != self.users.len() {
            return Err(AllocError::ConfigValidationError {
                field: "execution_times".to_string(),
                message: format!(
                    "Expected one row per user ({}), got {}",
                    self.users.len(),
                    self.execution_times.len()
                ),
            });
        }

        let mut seen = HashSet::new();
        for (i, (user, row)) in self.users.iter().zip(&self.execution_times).enumerate() {
            validate_non_empty_string(&format!("users[{}].id", i), &user.id)?;
            if !seen.insert(user.id.as_str()) {
                return Err(AllocError::InvalidConfigValueError {
                    field: format!("users[{}].id", i),
                    value: user.id.clone(),
                    reason: "Duplicate user id".to_string(),
                });
            }
            if row.len() != self.resource_prices.len() {
                return Err(AllocError::ConfigValidationError {
                    field: format!("execution_times[{}]", i),
                    message: format!(
                        "Expected {} entries (one per resource), got {}",
                        self.resource_prices.len(),
                        row.len()
                    ),
                });
            }
            for (j, t) in row.iter().enumerate() {
                validate_non_negative(&format!("execution_times[{}][{}]", i, j), *t)?;
            }
            validate_positive_number(&format!("users[{}].subtasks", i), user.subtasks, 1)?;
            if user.subtasks > self.resource_prices.len() {
                return Err(AllocError::InvalidConfigValueError {
                    field: format!("users[{}].subtasks", i),
                    value: user.subtasks.to_string(),
                    reason: format!(
                        "Cannot allocate more subtasks than resources ({})",
                        self.resource_prices.len()
                    ),
                });
            }
            validate_non_negative(&format!("users[{}].deadline", i), user.deadline)?;
            validate_non_negative(&format!("users[{}].budget", i), user.budget)?;
        }

        Ok(())
    }

    pub fn num_resources(&self) -> usize {
        self.resource_prices.len()
    }

    pub fn user_ids(&self) -> Vec<String> {
        self.users.iter().map(|u| u.id.clone()).collect()
    }

    pub fn user_index(&self, user_id: &str) -> Result<usize> {
        self.users
            .iter()
            .position(|u| u.id == user_id)
            .ok_or_else(|| AllocError::InvalidConfigValueError {
                field: "user_id".to_string(),
                value: user_id.to_string(),
                reason: format!("Unknown user. Known users: {}", self.user_ids().join(", ")),
            })
    }

    pub fn user(&self, user_id: &str) -> Result<&UserTask> {
        Ok(&self.users[self.user_index(user_id)?])
    }

    pub fn execution_times_for(&self, user_id: &str) -> Result<&[f64]> {
        Ok(&self.execution_times[self.user_index(user_id)?])
    }

    /// wt_i = ((D + i) mod 100) / 100, we_i = 1 - wt_i
    pub fn weights_for(&self, user_id: &str) -> Result<WeightPair> {
        let index = self.user_index(user_id)? as u32;
        let time = ((self.weight_seed + index) % 100) as f64 / 100.0;
        Ok(WeightPair {
            time,
            expense: 1.0 - time,
        })
    }

    /// 人類可讀的配置摘要 (show-config 子命令)
    pub fn describe(&self) -> String {
        let mut lines = vec![
            "=== Cloud Resource Allocation Configuration ===".to_string(),
            format!("Weight seed (D): {}", self.weight_seed),
            format!("Resource prices: {:?}", self.resource_prices),
            "Execution time matrix:".to_string(),
        ];
        for (user, row) in self.users.iter().zip(&self.execution_times) {
            lines.push(format!("  {}: {:?}", user.id, row));
        }
        lines.push("Users (subtasks, weights, constraints):".to_string());
        for user in &self.users {
            // user 一定存在於自己的列表中
            let weights = self.weights_for(&user.id).unwrap_or(WeightPair {
                time: 0.0,
                expense: 0.0,
            });
            lines.push(format!(
                "  {}: k={}, wt={:.2}, we={:.2}, T<={}s, M<={}€",
                user.id, user.subtasks, weights.time, weights.expense, user.deadline, user.budget
            ));
        }
        lines.join("\n")
    }
}

impl Validate for GameConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
