//! Empirical-Bayes moderation of per-feature variances (limma `eBayes`).
//!
//! Residual variances are modelled as scaled chi-square draws around a
//! common prior `s0^2` with `d0` prior degrees of freedom. The prior is fitted
//! by matching the first two moments of `log(s2)`, and each feature's
//! variance is then shrunk towards it before computing moderated t
//! statistics.

use statrs::distribution::{ContinuousCDF, StudentsT};
use statrs::function::gamma::digamma;
use tracing::{debug, warn};

use crate::error::AssistantError;
use crate::linear_model::LinearModelFit;

/// Hyperparameters of the scaled inverse chi-square prior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariancePrior {
    pub df_prior: f64,
    pub s2_prior: f64,
}

/// A linear model fit after variance shrinkage.
#[derive(Debug, Clone, PartialEq)]
pub struct EbayesFit {
    pub model: LinearModelFit,
    pub prior: VariancePrior,
    pub s2_post: Vec<f64>,
    pub df_total: Vec<f64>,
    /// Moderated t statistics, features x coefficients.
    pub t: nalgebra::DMatrix<f64>,
    /// Two-sided p-values, features x coefficients.
    pub p_value: nalgebra::DMatrix<f64>,
}

impl EbayesFit {
    pub fn coefficient_names(&self) -> &[String] {
        &self.model.coefficient_names
    }

    pub fn n_features(&self) -> usize {
        self.model.n_features()
    }
}

pub fn ebayes(model: LinearModelFit) -> Result<EbayesFit, AssistantError> {
    let s2: Vec<f64> = model.sigma.iter().map(|sigma| sigma * sigma).collect();
    let df_pooled: f64 = model
        .df_residual
        .iter()
        .filter(|df| df.is_finite())
        .sum();
    if df_pooled <= 0.0 {
        return Err(AssistantError::Numerical(
            "no residual degrees of freedom in linear model fits".to_string(),
        ));
    }

    let prior = fit_f_dist(&s2, &model.df_residual);
    let s2_post = squeeze_var(&s2, &model.df_residual, prior);
    debug!(
        df_prior = prior.df_prior,
        s2_prior = prior.s2_prior,
        "estimated variance prior"
    );

    let n_features = model.n_features();
    let n_coef = model.coefficient_names.len();
    let mut t = nalgebra::DMatrix::from_element(n_features, n_coef, f64::NAN);
    let mut p_value = nalgebra::DMatrix::from_element(n_features, n_coef, f64::NAN);
    let mut df_total = Vec::with_capacity(n_features);

    for feature in 0..n_features {
        let df = (model.df_residual[feature] + prior.df_prior).min(df_pooled);
        df_total.push(df);
        let dist = StudentsT::new(0.0, 1.0, df).ok();
        for coef in 0..n_coef {
            let se = model.stdev_unscaled[(feature, coef)] * s2_post[feature].sqrt();
            let stat = model.coefficients[(feature, coef)] / se;
            t[(feature, coef)] = stat;
            if let Some(dist) = &dist {
                if stat.is_finite() {
                    p_value[(feature, coef)] = 2.0 * dist.cdf(-stat.abs());
                }
            }
        }
    }

    Ok(EbayesFit {
        model,
        prior,
        s2_post,
        df_total,
        t,
        p_value,
    })
}

/// Posterior variances: `(df * s2 + d0 * s0^2) / (df + d0)`.
pub fn squeeze_var(s2: &[f64], df: &[f64], prior: VariancePrior) -> Vec<f64> {
    s2.iter()
        .zip(df)
        .map(|(&var, &d)| {
            if prior.df_prior.is_infinite() {
                return prior.s2_prior;
            }
            if !var.is_finite() || d <= 0.0 {
                return prior.s2_prior;
            }
            if prior.df_prior == 0.0 {
                return var;
            }
            (d * var + prior.df_prior * prior.s2_prior) / (d + prior.df_prior)
        })
        .collect()
}

/// Moment estimation of the prior from sample variances and their df.
pub fn fit_f_dist(s2: &[f64], df: &[f64]) -> VariancePrior {
    let usable: Vec<(f64, f64)> = s2
        .iter()
        .zip(df)
        .filter(|(var, d)| var.is_finite() && d.is_finite() && **d > 1e-15)
        .map(|(&var, &d)| (var.max(0.0), d))
        .collect();

    if usable.len() < 2 {
        warn!(
            features = usable.len(),
            "too few features to estimate a variance prior; variances are not moderated"
        );
        let s2_prior = usable.first().map(|(var, _)| *var).unwrap_or(f64::NAN);
        return VariancePrior {
            df_prior: 0.0,
            s2_prior,
        };
    }

    let mut median = median(usable.iter().map(|(var, _)| *var).collect());
    if median == 0.0 {
        warn!("more than half of residual variances are exactly zero");
        median = 1.0;
    }
    let floor = 1e-5 * median;

    let e: Vec<f64> = usable
        .iter()
        .map(|&(var, d)| var.max(floor).ln() - digamma(d / 2.0) + (d / 2.0).ln())
        .collect();
    let n = e.len() as f64;
    let e_mean = e.iter().sum::<f64>() / n;
    let mean_trigamma = usable.iter().map(|&(_, d)| trigamma(d / 2.0)).sum::<f64>() / n;
    let e_var = e.iter().map(|v| (v - e_mean).powi(2)).sum::<f64>() / (n - 1.0) - mean_trigamma;

    if e_var > 0.0 {
        let df_prior = 2.0 * trigamma_inverse(e_var);
        let s2_prior = (e_mean + digamma(df_prior / 2.0) - (df_prior / 2.0).ln()).exp();
        VariancePrior { df_prior, s2_prior }
    } else {
        VariancePrior {
            df_prior: f64::INFINITY,
            s2_prior: e_mean.exp(),
        }
    }
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Trigamma function: recurrence up to x >= 10, then the asymptotic series.
pub fn trigamma(x: f64) -> f64 {
    if x <= 0.0 && x == x.floor() {
        return f64::NAN;
    }
    if x < 0.0 {
        // Reflection: psi1(1 - x) + psi1(x) = pi^2 / sin^2(pi x)
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).powi(2) - trigamma(1.0 - x);
    }
    let mut z = x;
    let mut acc = 0.0;
    while z < 10.0 {
        acc += 1.0 / (z * z);
        z += 1.0;
    }
    let inv = 1.0 / z;
    let inv2 = inv * inv;
    acc + inv
        + inv2 / 2.0
        + inv * inv2
            * (1.0 / 6.0 - inv2 * (1.0 / 30.0 - inv2 * (1.0 / 42.0 - inv2 / 30.0)))
}

/// Second derivative of digamma, same scheme as [`trigamma`].
pub fn tetragamma(x: f64) -> f64 {
    let mut z = x;
    let mut acc = 0.0;
    while z < 10.0 {
        acc -= 2.0 / (z * z * z);
        z += 1.0;
    }
    let inv = 1.0 / z;
    let inv2 = inv * inv;
    acc - inv2
        - inv * inv2
        - inv2 * inv2 / 2.0
        + inv2 * inv2 * inv2 * (1.0 / 6.0 - inv2 * (1.0 / 6.0 - inv2 * 3.0 / 10.0))
}

/// Solves `trigamma(y) = x` for `y > 0` by Newton iteration.
pub fn trigamma_inverse(x: f64) -> f64 {
    if !x.is_finite() || x <= 0.0 {
        return f64::NAN;
    }
    if x > 1e7 {
        return 1.0 / x.sqrt();
    }
    if x < 1e-6 {
        return 1.0 / x;
    }
    let mut y = 0.5 + 1.0 / x;
    for _ in 0..50 {
        let tri = trigamma(y);
        let dif = tri * (1.0 - tri / x) / tetragamma(y);
        y += dif;
        if (dif / y).abs() < 1e-8 {
            break;
        }
    }
    y
}
