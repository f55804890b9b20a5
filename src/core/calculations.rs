//! Allocation enumeration, utility and multiplexing arithmetic.
//!
//! Vectors are indexed by resource `j`, matrices by `(user i, resource j)`.

use crate::domain::model::{AllocationVector, Matrix};
use crate::utils::error::{AllocError, Result};

/// Every allocation of `num_subtasks` subtasks onto distinct resources: 0/1
/// vectors of length `num_resources` with exactly `num_subtasks` ones.
///
/// Vectors come out in lexicographic order of the chosen resource indices,
/// so `(1, 1, 0, ...)` is always first.
pub fn generate_valid_allocations(
    num_subtasks: usize,
    num_resources: usize,
) -> Result<Vec<AllocationVector>> {
    if num_subtasks > num_resources {
        return Err(AllocError::AllocationError {
            message: format!(
                "Cannot allocate {} subtasks onto {} resources",
                num_subtasks, num_resources
            ),
        });
    }

    let mut allocations = Vec::new();
    let mut chosen: Vec<usize> = (0..num_subtasks).collect();

    loop {
        let mut allocation = vec![0u8; num_resources];
        for &j in &chosen {
            allocation[j] = 1;
        }
        allocations.push(allocation);

        // 找最右邊還能往後移的位置
        let Some(pos) = (0..num_subtasks)
            .rev()
            .find(|&i| chosen[i] < num_resources - num_subtasks + i)
        else {
            break;
        };
        chosen[pos] += 1;
        for i in pos + 1..num_subtasks {
            chosen[i] = chosen[i - 1] + 1;
        }
    }

    Ok(allocations)
}

pub fn execution_time_vector(allocation: &[u8], execution_times: &[f64]) -> Vec<f64> {
    allocation
        .iter()
        .zip(execution_times)
        .map(|(&a, &t)| if a == 1 { t } else { 0.0 })
        .collect()
}

/// e_j = a_j * t̂_j * p_j
pub fn expense_vector(allocation: &[u8], execution_times: &[f64], prices: &[f64]) -> Vec<f64> {
    allocation
        .iter()
        .zip(execution_times)
        .zip(prices)
        .map(|((&a, &t), &p)| f64::from(a) * t * p)
        .collect()
}

pub fn max_value(values: &[f64]) -> f64 {
    values.iter().copied().fold(0.0, f64::max)
}

pub fn total(values: &[f64]) -> f64 {
    values.iter().sum()
}

fn inverse_cost(max_time: f64, total_expense: f64, weight_time: f64, weight_expense: f64) -> f64 {
    let denominator = weight_time * max_time + weight_expense * total_expense;
    if denominator == 0.0 {
        0.0
    } else {
        1.0 / denominator
    }
}

/// u(a) = 1 / (wt * max_j t_j + we * Σ_j e_j)
pub fn utility(
    allocation: &[u8],
    execution_times: &[f64],
    prices: &[f64],
    weight_time: f64,
    weight_expense: f64,
) -> f64 {
    let times = execution_time_vector(allocation, execution_times);
    let expenses = expense_vector(allocation, execution_times, prices);
    inverse_cost(max_value(&times), total(&expenses), weight_time, weight_expense)
}

pub fn check_constraints(
    allocation: &[u8],
    execution_times: &[f64],
    prices: &[f64],
    deadline: f64,
    budget: f64,
) -> bool {
    let times = execution_time_vector(allocation, execution_times);
    let expenses = expense_vector(allocation, execution_times, prices);
    max_value(&times) <= deadline && total(&expenses) <= budget
}

/// Users sharing resource j each see t_ij = (Σ_k a_kj) * t̂_ij.
pub fn actual_execution_matrix(allocations: &[AllocationVector], base_times: &Matrix) -> Matrix {
    let factors = multiplexing_factors(allocations);

    allocations
        .iter()
        .zip(base_times)
        .map(|(row, base)| {
            row.iter()
                .zip(base)
                .zip(&factors)
                .map(|((&a, &t), &factor)| {
                    if a == 1 {
                        f64::from(factor) * t
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect()
}

/// e_ij = a_ij * t̂_ij * p_j (multiplexing does not change the bill)
pub fn actual_expense_matrix(
    allocations: &[AllocationVector],
    base_times: &Matrix,
    prices: &[f64],
) -> Matrix {
    allocations
        .iter()
        .zip(base_times)
        .map(|(row, base)| expense_vector(row, base, prices))
        .collect()
}

/// Number of users assigned to each resource.
pub fn multiplexing_factors(allocations: &[AllocationVector]) -> Vec<u32> {
    let width = allocations.first().map_or(0, Vec::len);
    (0..width)
        .map(|j| {
            allocations
                .iter()
                .map(|row| u32::from(row.get(j).copied().unwrap_or(0)))
                .sum()
        })
        .collect()
}

pub fn actual_utility(
    time_vector: &[f64],
    expense_vector: &[f64],
    weight_time: f64,
    weight_expense: f64,
) -> f64 {
    inverse_cost(
        max_value(time_vector),
        total(expense_vector),
        weight_time,
        weight_expense,
    )
}

/// t'_ij = t̂_ij + (Σ_k t_kj) / n
pub fn step2_execution_times(step1_times: &Matrix, base_times: &Matrix) -> Matrix {
    let n = step1_times.len();
    if n == 0 {
        return Vec::new();
    }
    let width = step1_times[0].len();
    let averages: Vec<f64> = (0..width)
        .map(|j| step1_times.iter().map(|row| row[j]).sum::<f64>() / n as f64)
        .collect();

    base_times
        .iter()
        .map(|row| row.iter().zip(&averages).map(|(t, avg)| t + avg).collect())
        .collect()
}

pub fn format_allocation_vector(allocation: &[u8]) -> String {
    let parts: Vec<String> = allocation.iter().map(|a| a.to_string()).collect();
    format!("({})", parts.join(", "))
}

pub fn format_matrix(matrix: &Matrix, name: &str, labels: &[String], precision: usize) -> String {
    let mut lines = vec![format!("{}:", name)];
    for (i, row) in matrix.iter().enumerate() {
        let cells: Vec<String> = row.iter().map(|v| format!("{:.*}", precision, v)).collect();
        let label = labels
            .get(i)
            .cloned()
            .unwrap_or_else(|| format!("Task {}", i + 1));
        lines.push(format!("  {}: [{}]", label, cells.join(", ")));
    }
    lines.join("\n")
}
