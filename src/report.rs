//! Plot-ready data for expression distributions and volcano plots.
//! Nothing here renders; callers feed these points to whatever plots.

use serde::Serialize;

use crate::matrix::ExpressionMatrix;
use crate::top_table::TopTable;

pub const DEFAULT_LFC_THRESHOLD: f64 = 1.0;
pub const DEFAULT_ALPHA: f64 = 0.05;
/// Cap for `-log10(p)` so that `p == 0` still plots.
pub const MAX_NEG_LOG10: f64 = 300.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolcanoPoint {
    pub probe_id: String,
    pub gene_name: String,
    pub log_fc: f64,
    pub neg_log10_adj_p: f64,
    pub significant: bool,
}

/// Equal-width histogram over every finite value of `X`. The last bin is
/// closed on the right.
pub fn expression_histogram(matrix: &ExpressionMatrix, bins: usize) -> Vec<HistogramBin> {
    let values: Vec<f64> = matrix
        .x()
        .iter()
        .copied()
        .filter(|value| value.is_finite())
        .collect();
    if bins == 0 || values.is_empty() {
        return Vec::new();
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min == max {
        return vec![HistogramBin {
            lower: min,
            upper: max,
            count: values.len(),
        }];
    }

    let width = (max - min) / bins as f64;
    let mut counts = vec![0usize; bins];
    for value in values {
        let idx = (((value - min) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(idx, count)| HistogramBin {
            lower: min + width * idx as f64,
            upper: if idx + 1 == bins {
                max
            } else {
                min + width * (idx + 1) as f64
            },
            count,
        })
        .collect()
}

pub fn volcano_points(table: &TopTable, lfc_threshold: f64, alpha: f64) -> Vec<VolcanoPoint> {
    table
        .rows
        .iter()
        .map(|row| {
            let neg_log10_adj_p = if row.adj_p_value.is_nan() {
                0.0
            } else {
                (-row.adj_p_value.log10()).min(MAX_NEG_LOG10)
            };
            VolcanoPoint {
                probe_id: row.probe_id.clone(),
                gene_name: row.gene_name.clone(),
                log_fc: row.log_fc,
                neg_log10_adj_p,
                significant: row.log_fc.abs() >= lfc_threshold && row.adj_p_value < alpha,
            }
        })
        .collect()
}
