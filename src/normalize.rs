//! Low-count feature filtering and log1p transform.
//!
//! The pre-normalization matrix is always stored in the `raw` slot first.
//! Calling [`normalize`] twice applies the log transform twice; guarding
//! against that is the caller's job.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::matrix::ExpressionMatrix;

/// Features whose total across samples is below this are dropped.
pub const MIN_TOTAL_COUNT: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizeOptions {
    pub filter_low_count: bool,
    pub log_transform: bool,
    pub min_total_count: f64,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            filter_low_count: true,
            log_transform: true,
            min_total_count: MIN_TOTAL_COUNT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NormalizeSummary {
    pub features_before: usize,
    pub features_after: usize,
    pub log_transformed: bool,
}

pub fn normalize(matrix: &mut ExpressionMatrix, options: NormalizeOptions) -> NormalizeSummary {
    matrix.snapshot_raw();
    let features_before = matrix.n_vars();

    if options.filter_low_count {
        // NaN totals compare false and are dropped along with low counts.
        let keep: Vec<bool> = matrix
            .x()
            .column_iter()
            .map(|column| column.sum() >= options.min_total_count)
            .collect();
        matrix.retain_features(&keep);
    }

    if options.log_transform {
        matrix.map_values(f64::ln_1p);
    }

    let summary = NormalizeSummary {
        features_before,
        features_after: matrix.n_vars(),
        log_transformed: options.log_transform,
    };
    info!(
        before = summary.features_before,
        after = summary.features_after,
        log1p = summary.log_transformed,
        "normalized expression matrix"
    );
    summary
}
