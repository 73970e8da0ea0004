//! Per-column standardization statistics over the assembled table.

use serde::Serialize;
use tracing::info;

use crate::pipeline::assemble::Transaction;

/// Mean, median, and population standard deviation of one output column,
/// computed over training and holdout rows together.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStats {
    pub column: &'static str,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

fn population_std(values: &[f64], mean: f64) -> f64 {
    let variance = values
        .iter()
        .map(|v| {
            let d = v - mean;
            d * d
        })
        .sum::<f64>()
        / values.len() as f64;
    variance.sqrt()
}

/// One statistics record per real-valued column; no column-specific
/// special-casing. An empty table yields no records.
pub fn column_statistics(transactions: &[Transaction]) -> Vec<ColumnStats> {
    let Some(first) = transactions.first() else {
        return Vec::new();
    };
    let stats: Vec<ColumnStats> = first
        .numeric_columns()
        .iter()
        .enumerate()
        .map(|(i, &(column, _))| {
            let mut values: Vec<f64> = transactions
                .iter()
                .map(|t| t.numeric_columns()[i].1)
                .collect();
            let mean = mean(&values);
            let std_dev = population_std(&values, mean);
            let median = median(&mut values);
            ColumnStats {
                column,
                mean,
                median,
                std_dev,
            }
        })
        .collect();
    info!(columns = stats.len(), "standardization statistics computed");
    stats
}
