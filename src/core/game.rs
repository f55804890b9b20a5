use crate::config::GameConfig;
use crate::core::calculations::format_allocation_vector;
use crate::core::optimizer::UserOptimizer;
use crate::core::resource_manager::ResourceManager;
use crate::domain::model::{AllocationResults, AllocationVector, MultiplexInfo};
use crate::utils::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStepSummary {
    pub user_id: String,
    pub allocation: AllocationVector,
    pub expected_utility: f64,
    pub actual_utility: f64,
    pub utility_loss: f64,
    pub max_time: f64,
    pub total_expense: f64,
    pub deadline_met: bool,
    pub budget_met: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub step: u32,
    pub users: Vec<UserStepSummary>,
    pub multiplexing: BTreeMap<String, MultiplexInfo>,
    pub total_expected_utility: f64,
    pub total_actual_utility: f64,
    pub total_utility_loss: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameReport {
    pub step1: StepReport,
    pub updated_execution_times: BTreeMap<String, Vec<f64>>,
    pub step2: StepReport,
    /// step 2 actual - step 1 actual, per user
    pub improvement: BTreeMap<String, f64>,
    pub total_improvement: f64,
}

/// Plays both steps of the game in-process, without any network or cloud
/// service in between.
pub struct GameSimulation {
    manager: ResourceManager,
    optimizers: Vec<UserOptimizer>,
}

impl GameSimulation {
    pub fn new(config: &GameConfig) -> Result<Self> {
        let optimizers = config
            .users
            .iter()
            .map(|u| UserOptimizer::new(config, &u.id))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            manager: ResourceManager::new(config),
            optimizers,
        })
    }

    pub fn run(&mut self) -> Result<GameReport> {
        tracing::info!("🎲 Step 1: independent optimization");
        let mut allocations = BTreeMap::new();
        for optimizer in &mut self.optimizers {
            let (allocation, _) = optimizer.optimize(None)?;
            allocations.insert(optimizer.user_id().to_string(), allocation);
        }
        let results1 = self.manager.process_allocations(&allocations)?;
        let step1 = self.summarize(1, &results1)?;

        tracing::info!("🎲 Step 2: strategy update with updated execution times");
        let updated = self.manager.step2_execution_times(&results1.time_matrix);
        let mut updated_execution_times = BTreeMap::new();
        let mut allocations = BTreeMap::new();
        for (optimizer, row) in self.optimizers.iter_mut().zip(&updated) {
            let (allocation, _) = optimizer.optimize(Some(row.as_slice()))?;
            allocations.insert(optimizer.user_id().to_string(), allocation);
            updated_execution_times.insert(optimizer.user_id().to_string(), row.clone());
        }
        // 實際時間仍以原始 t̂ 計算，更新後的時間只用於使用者最佳化
        let results2 = self.manager.process_allocations(&allocations)?;
        let step2 = self.summarize(2, &results2)?;

        let improvement: BTreeMap<String, f64> = step1
            .users
            .iter()
            .zip(&step2.users)
            .map(|(s1, s2)| (s1.user_id.clone(), s2.actual_utility - s1.actual_utility))
            .collect();
        let total_improvement = step2.total_actual_utility - step1.total_actual_utility;

        Ok(GameReport {
            step1,
            updated_execution_times,
            step2,
            improvement,
            total_improvement,
        })
    }

    fn summarize(&self, step: u32, results: &AllocationResults) -> Result<StepReport> {
        let multiplexing = self.manager.check_multiplexing(&results.allocation_matrix);
        let mut users = Vec::with_capacity(self.optimizers.len());

        for (optimizer, allocation) in self.optimizers.iter().zip(&results.allocation_matrix) {
            let result = &results.user_results[optimizer.user_id()];
            let actual = optimizer
                .actual_utility_from_matrices(&result.time_vector, &result.expense_vector)?;
            let expected = optimizer.optimal_utility();
            users.push(UserStepSummary {
                user_id: optimizer.user_id().to_string(),
                allocation: allocation.clone(),
                expected_utility: expected,
                actual_utility: actual,
                utility_loss: expected - actual,
                max_time: result.max_time,
                total_expense: result.total_expense,
                deadline_met: result.max_time <= optimizer.constraints().deadline,
                budget_met: result.total_expense <= optimizer.constraints().budget,
            });
        }

        let total_expected_utility: f64 = users.iter().map(|u| u.expected_utility).sum();
        let total_actual_utility: f64 = users.iter().map(|u| u.actual_utility).sum();
        let total_utility_loss: f64 = users.iter().map(|u| u.utility_loss).sum();

        Ok(StepReport {
            step,
            users,
            multiplexing,
            total_expected_utility,
            total_actual_utility,
            total_utility_loss,
        })
    }
}

impl StepReport {
    pub fn render(&self) -> String {
        let mut lines = vec![
            format!("STEP {} RESULTS", self.step),
            format!(
                "{:<6} {:<25} {:<12} {:<12} {:<10} {}",
                "User", "Allocation Vector", "Expected U", "Actual U", "Loss", "Constraints"
            ),
            "-".repeat(85),
        ];
        for u in &self.users {
            lines.push(format!(
                "{:<6} {:<25} {:<12.4} {:<12.4} {:<10.4} T {} ({:.2}) M {} ({:.2})",
                u.user_id,
                format_allocation_vector(&u.allocation),
                u.expected_utility,
                u.actual_utility,
                u.utility_loss,
                if u.deadline_met { "✓" } else { "✗" },
                u.max_time,
                if u.budget_met { "✓" } else { "✗" },
                u.total_expense
            ));
        }
        lines.push("-".repeat(85));
        lines.push(format!(
            "Total Expected Utility: {:.4}",
            self.total_expected_utility
        ));
        lines.push(format!("Total Actual Utility:   {:.4}", self.total_actual_utility));
        lines.push(format!("Total Utility Loss:     {:.4}", self.total_utility_loss));
        if self.multiplexing.is_empty() {
            lines.push("No resource multiplexing".to_string());
        } else {
            for (resource, info) in &self.multiplexing {
                lines.push(format!(
                    "{}: {} users ({})",
                    resource,
                    info.count,
                    info.users.join(", ")
                ));
            }
        }
        lines.join("\n")
    }
}

impl GameReport {
    pub fn render(&self) -> String {
        let mut lines = vec![self.step1.render(), String::new(), self.step2.render()];
        lines.push(String::new());
        lines.push("COMPARISON: STEP 1 vs STEP 2".to_string());
        lines.push(format!(
            "{:<6} {:<18} {:<18} {}",
            "User", "Step 1 Actual U", "Step 2 Actual U", "Improvement"
        ));
        for (s1, s2) in self.step1.users.iter().zip(&self.step2.users) {
            lines.push(format!(
                "{:<6} {:<18.4} {:<18.4} {:+.4}",
                s1.user_id,
                s1.actual_utility,
                s2.actual_utility,
                s2.actual_utility - s1.actual_utility
            ));
        }
        lines.push(format!(
            "{:<6} {:<18.4} {:<18.4} {:+.4}",
            "Total",
            self.step1.total_actual_utility,
            self.step2.total_actual_utility,
            self.total_improvement
        ));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_game_with_default_config() {
        let mut game = GameSimulation::new(&GameConfig::default()).unwrap();
        let report = game.run().unwrap();

        let step1: Vec<_> = report.step1.users.iter().map(|u| u.allocation.clone()).collect();
        assert_eq!(
            step1,
            vec![vec![0, 0, 0, 1, 1], vec![0, 0, 1, 1, 1], vec![0, 1, 1, 1, 1]]
        );
        assert!((report.step1.users[0].actual_utility - 1.0 / 9.24).abs() < 1e-9);
        assert!(report.step1.users.iter().all(|u| u.utility_loss >= 0.0));

        let step2: Vec<_> = report.step2.users.iter().map(|u| u.allocation.clone()).collect();
        assert_eq!(
            step2,
            vec![vec![1, 1, 0, 0, 0], vec![1, 1, 1, 0, 0], vec![1, 1, 1, 1, 0]]
        );
        assert!((report.updated_execution_times["S1"][1] - 5.366666666666667).abs() < 1e-9);

        let s1_gain = report.improvement["S1"];
        let expected = report.step2.users[0].actual_utility - report.step1.users[0].actual_utility;
        assert!((s1_gain - expected).abs() < 1e-12);
    }

    #[test]
    fn test_render_mentions_every_user() {
        let mut game = GameSimulation::new(&GameConfig::default()).unwrap();
        let rendered = game.run().unwrap().render();
        for user in ["S1", "S2", "S3"] {
            assert!(rendered.contains(user));
        }
        assert!(rendered.contains("COMPARISON"));
    }
}
