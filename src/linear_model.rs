//! Per-feature ordinary least squares against a shared design matrix.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::design::DesignMatrix;
use crate::error::AssistantError;
use crate::matrix::ExpressionMatrix;

/// Unmoderated fit for every feature of the matrix.
///
/// Rows of `coefficients` and `stdev_unscaled` follow the feature axis of
/// the matrix the fit came from.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearModelFit {
    pub coefficient_names: Vec<String>,
    pub probe_ids: Vec<String>,
    pub gene_names: Vec<String>,
    pub coefficients: DMatrix<f64>,
    /// `sqrt(diag((X'X)^-1))`, the standard error for unit residual variance.
    pub stdev_unscaled: DMatrix<f64>,
    pub sigma: Vec<f64>,
    pub df_residual: Vec<f64>,
    /// Mean of the finite values of each feature.
    pub amean: Vec<f64>,
}

impl LinearModelFit {
    pub fn n_features(&self) -> usize {
        self.probe_ids.len()
    }

    pub fn coefficient_index(&self, name: &str) -> Option<usize> {
        self.coefficient_names.iter().position(|n| n == name)
    }
}

struct FeatureFit {
    coefficients: Vec<f64>,
    stdev_unscaled: Vec<f64>,
    sigma: f64,
    df_residual: f64,
}

pub fn lm_fit(
    matrix: &ExpressionMatrix,
    design: &DesignMatrix,
) -> Result<LinearModelFit, AssistantError> {
    if design.n_samples() != matrix.n_obs() {
        return Err(AssistantError::DimensionMismatch {
            context: "design rows vs samples",
            expected: matrix.n_obs(),
            actual: design.n_samples(),
        });
    }

    let x = design.matrix();
    let n_coef = design.n_coefficients();
    let xtx_inv = (x.transpose() * x).try_inverse().ok_or_else(|| {
        AssistantError::Numerical("design matrix is singular (X'X not invertible)".to_string())
    })?;

    let n_features = matrix.n_vars();
    let mut coefficients = DMatrix::from_element(n_features, n_coef, f64::NAN);
    let mut stdev_unscaled = DMatrix::from_element(n_features, n_coef, f64::NAN);
    let mut sigma = Vec::with_capacity(n_features);
    let mut df_residual = Vec::with_capacity(n_features);
    let mut amean = Vec::with_capacity(n_features);

    for feature in 0..n_features {
        let y = matrix.feature_values(feature);
        amean.push(finite_mean(&y));

        let fit = if y.iter().all(|value| value.is_finite()) {
            Some(fit_feature(x, &xtx_inv, &y))
        } else {
            fit_finite_subset(x, &y)
        };

        match fit {
            Some(fit) => {
                for coef in 0..n_coef {
                    coefficients[(feature, coef)] = fit.coefficients[coef];
                    stdev_unscaled[(feature, coef)] = fit.stdev_unscaled[coef];
                }
                sigma.push(fit.sigma);
                df_residual.push(fit.df_residual);
            }
            None => {
                sigma.push(f64::NAN);
                df_residual.push(0.0);
            }
        }
    }

    debug!(
        features = n_features,
        coefficients = n_coef,
        "fitted per-feature linear models"
    );

    Ok(LinearModelFit {
        coefficient_names: design.coefficient_names().to_vec(),
        probe_ids: matrix.var().probe_ids.clone(),
        gene_names: matrix.var().gene_names.clone(),
        coefficients,
        stdev_unscaled,
        sigma,
        df_residual,
        amean,
    })
}

fn fit_feature(x: &DMatrix<f64>, xtx_inv: &DMatrix<f64>, y: &[f64]) -> FeatureFit {
    let y = DVector::from_column_slice(y);
    let beta = xtx_inv * (x.transpose() * &y);
    let residuals = &y - x * &beta;
    let df = x.nrows().saturating_sub(x.ncols());
    let sigma = if df > 0 {
        (residuals.norm_squared() / df as f64).sqrt()
    } else {
        f64::NAN
    };
    FeatureFit {
        coefficients: beta.iter().copied().collect(),
        stdev_unscaled: (0..x.ncols()).map(|j| xtx_inv[(j, j)].sqrt()).collect(),
        sigma,
        df_residual: df as f64,
    }
}

/// Refits on the samples where the feature is finite.
fn fit_finite_subset(x: &DMatrix<f64>, y: &[f64]) -> Option<FeatureFit> {
    let rows: Vec<usize> = (0..y.len()).filter(|&i| y[i].is_finite()).collect();
    if rows.len() < x.ncols() {
        return None;
    }
    let x_sub = x.select_rows(rows.iter());
    let y_sub: Vec<f64> = rows.iter().map(|&i| y[i]).collect();
    let xtx_inv = (x_sub.transpose() * &x_sub).try_inverse()?;
    Some(fit_feature(&x_sub, &xtx_inv, &y_sub))
}

fn finite_mean(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|value| value.is_finite())
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::formula::Formula;
    use crate::matrix::{Features, Observations};

    fn matrix() -> ExpressionMatrix {
        // Two features over six samples, DMSO/I3C alternating.
        let x = DMatrix::from_row_slice(
            6,
            2,
            &[
                1.0, 1.0, //
                1.2, 3.0, //
                0.9, 1.2, //
                1.1, 2.8, //
                1.0, 0.9, //
                1.1, 3.1,
            ],
        );
        let obs = Observations::new((1..=6).map(|i| format!("s{i}")).collect())
            .with_column(
                "group",
                ["DMSO", "I3C", "DMSO", "I3C", "DMSO", "I3C"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            )
            .unwrap();
        let var = Features::new(vec!["p1".into(), "p2".into()], vec!["A".into(), "B".into()])
            .unwrap();
        ExpressionMatrix::new(x, obs, var).unwrap()
    }

    #[test]
    fn group_means_are_coefficients_without_intercept() {
        let m = matrix();
        let design =
            DesignMatrix::from_formula(m.obs(), &Formula::parse("~ 0 + group").unwrap()).unwrap();
        let fit = lm_fit(&m, &design).unwrap();

        assert_relative_eq!(fit.coefficients[(1, 0)], (1.0 + 1.2 + 0.9) / 3.0, epsilon = 1e-12);
        assert_relative_eq!(fit.coefficients[(1, 1)], (3.0 + 2.8 + 3.1) / 3.0, epsilon = 1e-12);
        assert_relative_eq!(fit.stdev_unscaled[(0, 0)], (1.0f64 / 3.0).sqrt(), epsilon = 1e-12);
        assert_eq!(fit.df_residual, vec![4.0, 4.0]);
    }

    #[test]
    fn missing_values_shrink_residual_df() {
        let mut m = matrix();
        m.map_values(|v| if v == 1.2 { f64::NAN } else { v });
        let design =
            DesignMatrix::from_formula(m.obs(), &Formula::parse("~ 0 + group").unwrap()).unwrap();
        let fit = lm_fit(&m, &design).unwrap();

        assert_eq!(fit.df_residual[0], 3.0);
        assert_eq!(fit.df_residual[1], 3.0);
        assert_relative_eq!(fit.coefficients[(1, 0)], (1.0 + 0.9) / 2.0, epsilon = 1e-12);
    }
}
