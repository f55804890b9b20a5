use crate::config::GameConfig;
use crate::core::calculations::{
    actual_execution_matrix, actual_expense_matrix, format_matrix, max_value,
    multiplexing_factors, step2_execution_times, total,
};
use crate::domain::model::{AllocationResults, AllocationVector, Matrix, MultiplexInfo, UserResult};
use crate::utils::error::{AllocError, Result};
use std::collections::BTreeMap;

/// Provider-side view: turns every user's allocation into actual
/// (multiplexed) execution times and expenses.
#[derive(Debug, Clone)]
pub struct ResourceManager {
    base_execution_times: Matrix,
    resource_prices: Vec<f64>,
    user_ids: Vec<String>,
}

impl ResourceManager {
    pub fn new(config: &GameConfig) -> Self {
        tracing::debug!(
            "Resource manager managing {} users and {} resources",
            config.users.len(),
            config.num_resources()
        );
        Self {
            base_execution_times: config.execution_times.clone(),
            resource_prices: config.resource_prices.clone(),
            user_ids: config.user_ids(),
        }
    }

    pub fn user_ids(&self) -> &[String] {
        &self.user_ids
    }

    pub fn base_execution_times(&self) -> &Matrix {
        &self.base_execution_times
    }

    /// Users without an entry in `allocations`, in configured order.
    pub fn missing_users(&self, allocations: &BTreeMap<String, AllocationVector>) -> Vec<String> {
        self.user_ids
            .iter()
            .filter(|id| !allocations.contains_key(*id))
            .cloned()
            .collect()
    }

    pub fn process_allocations(
        &self,
        allocations: &BTreeMap<String, AllocationVector>,
    ) -> Result<AllocationResults> {
        let missing = self.missing_users(allocations);
        if !missing.is_empty() {
            return Err(AllocError::AllocationError {
                message: format!("Missing allocations for: {}", missing.join(", ")),
            });
        }
        if allocations.len() != self.user_ids.len() {
            let unknown: Vec<&str> = allocations
                .keys()
                .filter(|id| !self.user_ids.contains(*id))
                .map(String::as_str)
                .collect();
            return Err(AllocError::AllocationError {
                message: format!("Unknown users in allocations: {}", unknown.join(", ")),
            });
        }

        let num_resources = self.resource_prices.len();
        let mut allocation_matrix = Vec::with_capacity(self.user_ids.len());
        for user_id in &self.user_ids {
            let vector = &allocations[user_id];
            if vector.len() != num_resources {
                return Err(AllocError::AllocationError {
                    message: format!(
                        "Allocation for {} has {} entries, expected {}",
                        user_id,
                        vector.len(),
                        num_resources
                    ),
                });
            }
            if vector.iter().any(|&a| a > 1) {
                return Err(AllocError::AllocationError {
                    message: format!("Allocation for {} must only contain 0 or 1", user_id),
                });
            }
            allocation_matrix.push(vector.clone());
        }

        let time_matrix = actual_execution_matrix(&allocation_matrix, &self.base_execution_times);
        let expense_matrix = actual_expense_matrix(
            &allocation_matrix,
            &self.base_execution_times,
            &self.resource_prices,
        );

        tracing::debug!(
            "\n{}\n{}",
            format_matrix(&time_matrix, "Actual Execution Time Matrix (tij)", &self.user_ids, 2),
            format_matrix(&expense_matrix, "Expense Matrix (eij)", &self.user_ids, 2)
        );

        let mut user_results = BTreeMap::new();
        for (i, user_id) in self.user_ids.iter().enumerate() {
            let result = UserResult {
                time_vector: time_matrix[i].clone(),
                expense_vector: expense_matrix[i].clone(),
                max_time: max_value(&time_matrix[i]),
                total_expense: total(&expense_matrix[i]),
            };
            tracing::info!(
                "{}: max time {:.2}s, total expense {:.2}€",
                user_id,
                result.max_time,
                result.total_expense
            );
            user_results.insert(user_id.clone(), result);
        }

        Ok(AllocationResults {
            allocation_matrix,
            time_matrix,
            expense_matrix,
            user_results,
        })
    }

    /// Resources (`R1`, `R2`, ...) shared by more than one user.
    pub fn check_multiplexing(
        &self,
        allocation_matrix: &[AllocationVector],
    ) -> BTreeMap<String, MultiplexInfo> {
        let mut multiplexed = BTreeMap::new();

        for (j, &count) in multiplexing_factors(allocation_matrix).iter().enumerate() {
            if count <= 1 {
                continue;
            }
            let users = allocation_matrix
                .iter()
                .zip(&self.user_ids)
                .filter(|(row, _)| row[j] == 1)
                .map(|(_, id)| id.clone())
                .collect::<Vec<_>>();
            tracing::info!("R{}: {} users ({})", j + 1, count, users.join(", "));
            multiplexed.insert(format!("R{}", j + 1), MultiplexInfo { count, users });
        }

        if multiplexed.is_empty() {
            tracing::info!("No resource multiplexing");
        }
        multiplexed
    }

    pub fn step2_execution_times(&self, step1_time_matrix: &Matrix) -> Matrix {
        let updated = step2_execution_times(step1_time_matrix, &self.base_execution_times);
        tracing::debug!(
            "\n{}",
            format_matrix(&updated, "New Base Execution Times", &self.user_ids, 2)
        );
        updated
    }
}
