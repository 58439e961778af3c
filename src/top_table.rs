//! Ranked per-feature results for one coefficient.

use std::cmp::Ordering;

use serde::Serialize;

use crate::ebayes::EbayesFit;
use crate::error::AssistantError;

pub const DEFAULT_TOP_N: usize = 300;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopTableRow {
    pub probe_id: String,
    pub gene_name: String,
    pub log_fc: f64,
    pub ave_expr: f64,
    pub t: f64,
    pub p_value: f64,
    pub adj_p_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopTable {
    pub coefficient: String,
    pub rows: Vec<TopTableRow>,
}

impl TopTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn n_significant(&self, alpha: f64) -> usize {
        self.rows
            .iter()
            .filter(|row| row.adj_p_value < alpha)
            .count()
    }
}

/// Builds the table for `coefficient`, BH-adjusting over all features and
/// keeping the `n` most significant.
pub fn top_table(fit: &EbayesFit, coefficient: &str, n: usize) -> Result<TopTable, AssistantError> {
    let coef = fit
        .model
        .coefficient_index(coefficient)
        .ok_or_else(|| AssistantError::ContrastNotFound {
            name: coefficient.to_string(),
            available: fit.coefficient_names().join(", "),
        })?;

    let p_values: Vec<f64> = fit.p_value.column(coef).iter().copied().collect();
    let adjusted = adjust_bh(&p_values);

    let mut order: Vec<usize> = (0..fit.n_features()).collect();
    order.sort_by(|&a, &b| {
        cmp_nan_last(adjusted[a], adjusted[b])
            .then_with(|| cmp_nan_last(p_values[a], p_values[b]))
            .then_with(|| a.cmp(&b))
    });

    let model = &fit.model;
    let rows = order
        .into_iter()
        .take(n)
        .map(|feature| TopTableRow {
            probe_id: model.probe_ids[feature].clone(),
            gene_name: model.gene_names[feature].clone(),
            log_fc: model.coefficients[(feature, coef)],
            ave_expr: model.amean[feature],
            t: fit.t[(feature, coef)],
            p_value: p_values[feature],
            adj_p_value: adjusted[feature],
        })
        .collect();

    Ok(TopTable {
        coefficient: coefficient.to_string(),
        rows,
    })
}

/// Benjamini-Hochberg adjustment. Non-finite p-values are left out of the
/// test count and stay NaN.
pub fn adjust_bh(p_values: &[f64]) -> Vec<f64> {
    let mut indices: Vec<usize> = (0..p_values.len())
        .filter(|&i| p_values[i].is_finite())
        .collect();
    let mut adjusted = vec![f64::NAN; p_values.len()];
    let m = indices.len();
    if m == 0 {
        return adjusted;
    }
    indices.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]).then(a.cmp(&b)));

    let mut running = 1.0f64;
    for rank in (0..m).rev() {
        let idx = indices[rank];
        let value = p_values[idx] * m as f64 / (rank + 1) as f64;
        running = running.min(value).min(1.0);
        adjusted[idx] = running;
    }
    adjusted
}

fn cmp_nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.total_cmp(&b),
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn bh_matches_reference_values() {
        // p.adjust(c(0.01, 0.04, 0.03, 0.005), "BH")
        let adjusted = adjust_bh(&[0.01, 0.04, 0.03, 0.005]);
        assert_relative_eq!(adjusted[0], 0.02, epsilon = 1e-12);
        assert_relative_eq!(adjusted[1], 0.04, epsilon = 1e-12);
        assert_relative_eq!(adjusted[2], 0.04, epsilon = 1e-12);
        assert_relative_eq!(adjusted[3], 0.02, epsilon = 1e-12);
    }

    #[test]
    fn bh_skips_missing_p_values() {
        let adjusted = adjust_bh(&[0.02, f64::NAN, 0.04]);
        assert!(adjusted[1].is_nan());
        assert_relative_eq!(adjusted[0], 0.04, epsilon = 1e-12);
        assert_relative_eq!(adjusted[2], 0.04, epsilon = 1e-12);
    }

    #[test]
    fn bh_is_monotone_in_p() {
        let p = [0.5, 0.001, 0.2, 0.03, 0.9, 0.04];
        let adjusted = adjust_bh(&p);
        for i in 0..p.len() {
            for j in 0..p.len() {
                if p[i] < p[j] {
                    assert!(adjusted[i] <= adjusted[j]);
                }
            }
        }
    }
}
