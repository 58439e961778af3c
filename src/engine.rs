//! Formula -> design -> per-feature fit -> eBayes -> top table.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::design::DesignMatrix;
use crate::ebayes::{EbayesFit, ebayes};
use crate::error::AssistantError;
use crate::formula::Formula;
use crate::linear_model::lm_fit;
use crate::matrix::ExpressionMatrix;
use crate::top_table::{DEFAULT_TOP_N, TopTable, top_table};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    pub formula: String,
    pub coefficient: String,
    pub top_n: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            formula: "~ 0 + group".to_string(),
            coefficient: "group[DMSO]".to_string(),
            top_n: DEFAULT_TOP_N,
        }
    }
}

/// Everything one fit produces; replaced wholesale by the next fit.
#[derive(Debug, Clone, PartialEq)]
pub struct DifferentialExpression {
    pub formula: Formula,
    pub design: DesignMatrix,
    pub fit: EbayesFit,
    pub top_table: TopTable,
}

pub fn fit_differential_expression(
    matrix: &ExpressionMatrix,
    options: &FitOptions,
) -> Result<DifferentialExpression, AssistantError> {
    if matrix.n_vars() == 0 {
        return Err(AssistantError::NoFeatures);
    }
    let formula = Formula::parse(&options.formula)?;
    let design = DesignMatrix::from_formula(matrix.obs(), &formula)?;
    if design.coefficient_index(&options.coefficient).is_none() {
        return Err(AssistantError::ContrastNotFound {
            name: options.coefficient.clone(),
            available: design.coefficient_names().join(", "),
        });
    }

    let model = lm_fit(matrix, &design)?;
    let fit = ebayes(model)?;
    let top_table = top_table(&fit, &options.coefficient, options.top_n)?;
    info!(
        formula = %formula,
        coefficient = %options.coefficient,
        df_prior = fit.prior.df_prior,
        rows = top_table.len(),
        significant = top_table.n_significant(0.05),
        "fitted moderated linear model"
    );

    Ok(DifferentialExpression {
        formula,
        design,
        fit,
        top_table,
    })
}
