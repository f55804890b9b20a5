use crate::config::GameConfig;
use crate::core::calculations::{
    actual_utility, check_constraints, format_allocation_vector, generate_valid_allocations,
    utility,
};
use crate::domain::model::{AllocationVector, Constraints, OptimizationSummary, WeightPair};
use crate::utils::error::{AllocError, Result};

/// Brute-force optimizer for a single user's task.
#[derive(Debug, Clone)]
pub struct UserOptimizer {
    user_id: String,
    num_subtasks: usize,
    num_resources: usize,
    execution_times: Vec<f64>,
    resource_prices: Vec<f64>,
    weights: WeightPair,
    constraints: Constraints,
    optimal_allocation: Option<AllocationVector>,
    optimal_utility: f64,
}

impl UserOptimizer {
    pub fn new(config: &GameConfig, user_id: &str) -> Result<Self> {
        let task = config.user(user_id)?;
        let optimizer = Self {
            user_id: user_id.to_string(),
            num_subtasks: task.subtasks,
            num_resources: config.num_resources(),
            execution_times: config.execution_times_for(user_id)?.to_vec(),
            resource_prices: config.resource_prices.clone(),
            weights: config.weights_for(user_id)?,
            constraints: task.constraints(),
            optimal_allocation: None,
            optimal_utility: 0.0,
        };

        tracing::debug!(
            "Initialized optimizer for {}: k={}, wt={:.2}, we={:.2}, T<={}, M<={}",
            optimizer.user_id,
            optimizer.num_subtasks,
            optimizer.weights.time,
            optimizer.weights.expense,
            optimizer.constraints.deadline,
            optimizer.constraints.budget
        );
        Ok(optimizer)
    }

    /// Picks the feasible allocation with the highest expected utility.
    ///
    /// `custom_execution_times` replaces the user's base row (step 2). When no
    /// allocation meets the deadline and budget, the first enumerated one is
    /// used anyway.
    pub fn optimize(
        &mut self,
        custom_execution_times: Option<&[f64]>,
    ) -> Result<(AllocationVector, f64)> {
        let exec_times = match custom_execution_times {
            // 空列表視同未提供
            None | Some([]) => self.execution_times.clone(),
            Some(times) if times.len() != self.num_resources => {
                return Err(AllocError::AllocationError {
                    message: format!(
                        "Expected {} execution times, got {}",
                        self.num_resources,
                        times.len()
                    ),
                });
            }
            Some(times) => times.to_vec(),
        };

        let all_allocations = generate_valid_allocations(self.num_subtasks, self.num_resources)?;
        tracing::debug!(
            "Evaluating {} possible allocations for {}",
            all_allocations.len(),
            self.user_id
        );

        let mut best: Option<(usize, f64)> = None;
        let mut feasible_count = 0;

        for (index, allocation) in all_allocations.iter().enumerate() {
            if !check_constraints(
                allocation,
                &exec_times,
                &self.resource_prices,
                self.constraints.deadline,
                self.constraints.budget,
            ) {
                continue;
            }
            feasible_count += 1;

            let u = utility(
                allocation,
                &exec_times,
                &self.resource_prices,
                self.weights.time,
                self.weights.expense,
            );
            // 嚴格大於：同分時保留先列舉到的
            if best.map_or(u > 0.0, |(_, best_u)| u > best_u) {
                best = Some((index, u));
            }
        }

        let (index, best_utility) = match best {
            Some(found) => found,
            None => {
                tracing::warn!(
                    "⚠️ No feasible allocation found for {}, falling back to the first candidate",
                    self.user_id
                );
                let first = &all_allocations[0];
                let u = utility(
                    first,
                    &exec_times,
                    &self.resource_prices,
                    self.weights.time,
                    self.weights.expense,
                );
                (0, u)
            }
        };

        let allocation = all_allocations[index].clone();
        tracing::info!(
            "{}: {} → expected utility {:.4} ({}/{} feasible)",
            self.user_id,
            format_allocation_vector(&allocation),
            best_utility,
            feasible_count,
            all_allocations.len()
        );

        self.optimal_allocation = Some(allocation.clone());
        self.optimal_utility = best_utility;
        Ok((allocation, best_utility))
    }

    /// Utility of the current optimal allocation under the provider's actual
    /// (multiplexed) time and expense vectors.
    pub fn actual_utility_from_matrices(
        &self,
        time_vector: &[f64],
        expense_vector: &[f64],
    ) -> Result<f64> {
        if self.optimal_allocation.is_none() {
            return Err(AllocError::StateError {
                message: format!("{} has not optimized yet", self.user_id),
            });
        }

        let actual = actual_utility(
            time_vector,
            expense_vector,
            self.weights.time,
            self.weights.expense,
        );
        tracing::info!(
            "{}: actual utility {:.4}, loss {:.4}",
            self.user_id,
            actual,
            self.optimal_utility - actual
        );
        Ok(actual)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn optimal_allocation(&self) -> Option<&AllocationVector> {
        self.optimal_allocation.as_ref()
    }

    pub fn optimal_utility(&self) -> f64 {
        self.optimal_utility
    }

    pub fn weights(&self) -> &WeightPair {
        &self.weights
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn results(&self) -> OptimizationSummary {
        OptimizationSummary {
            user_id: self.user_id.clone(),
            allocation_vector: self.optimal_allocation.clone(),
            expected_utility: self.optimal_utility,
            num_subtasks: self.num_subtasks,
            weights: self.weights.clone(),
            constraints: self.constraints.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_step1_optimum_for_default_users() {
        let config = GameConfig::default();

        let mut s1 = UserOptimizer::new(&config, "S1").unwrap();
        let (allocation, u) = s1.optimize(None).unwrap();
        assert_eq!(allocation, vec![0, 0, 0, 1, 1]);
        assert!(approx(u, 1.0 / 3.96));

        let mut s2 = UserOptimizer::new(&config, "S2").unwrap();
        let (allocation, u) = s2.optimize(None).unwrap();
        assert_eq!(allocation, vec![0, 0, 1, 1, 1]);
        // 0.89 * 4.0 + 0.11 * 18.3
        assert!((u - 0.179436).abs() < 1e-6);

        let mut s3 = UserOptimizer::new(&config, "S3").unwrap();
        let (allocation, _) = s3.optimize(None).unwrap();
        assert_eq!(allocation, vec![0, 1, 1, 1, 1]);
    }

    #[test]
    fn test_custom_execution_times_change_the_choice() {
        let config = GameConfig::default();
        let mut s1 = UserOptimizer::new(&config, "S1").unwrap();
        let updated = [5.0, 5.366666666666667, 8.4, 12.299999999999999, 11.0];
        let (allocation, _) = s1.optimize(Some(&updated[..])).unwrap();
        assert_eq!(allocation, vec![1, 1, 0, 0, 0]);
    }

    #[test]
    fn test_empty_custom_execution_times_use_base_row() {
        let config = GameConfig::default();
        let mut s1 = UserOptimizer::new(&config, "S1").unwrap();
        let (allocation, u) = s1.optimize(Some(&[][..])).unwrap();
        assert_eq!(allocation, vec![0, 0, 0, 1, 1]);
        assert!(approx(u, 1.0 / 3.96));
    }

    #[test]
    fn test_custom_execution_times_must_match_resources() {
        let config = GameConfig::default();
        let mut s1 = UserOptimizer::new(&config, "S1").unwrap();
        assert!(s1.optimize(Some(&[1.0, 2.0][..])).is_err());
    }

    #[test]
    fn test_infeasible_falls_back_to_first_allocation() {
        let mut config = GameConfig::default();
        config.users[0].budget = 0.1;
        let mut s1 = UserOptimizer::new(&config, "S1").unwrap();
        let (allocation, u) = s1.optimize(None).unwrap();
        assert_eq!(allocation, vec![1, 1, 0, 0, 0]);
        assert!(u > 0.0);
    }

    #[test]
    fn test_actual_utility_requires_optimization() {
        let config = GameConfig::default();
        let mut s1 = UserOptimizer::new(&config, "S1").unwrap();
        assert!(s1
            .actual_utility_from_matrices(&[0.0, 0.0, 0.0, 9.0, 8.4], &[0.0, 0.0, 0.0, 5.4, 5.6])
            .is_err());

        s1.optimize(None).unwrap();
        let actual = s1
            .actual_utility_from_matrices(&[0.0, 0.0, 0.0, 9.0, 8.4], &[0.0, 0.0, 0.0, 5.4, 5.6])
            .unwrap();
        // 0.88 * 9.0 + 0.12 * 11.0 = 9.24
        assert!(approx(actual, 1.0 / 9.24));
    }

    #[test]
    fn test_results_summary() {
        let config = GameConfig::default();
        let mut s2 = UserOptimizer::new(&config, "S2").unwrap();
        s2.optimize(None).unwrap();
        let summary = s2.results();
        assert_eq!(summary.user_id, "S2");
        assert_eq!(summary.num_subtasks, 3);
        assert_eq!(summary.constraints.deadline, 300.0);
        assert!(summary.allocation_vector.is_some());
    }
}
