//! Design matrix construction from observation metadata and a formula.
//!
//! Every observation column is treated as categorical. Column names follow
//! patsy: `Intercept`, `group[DMSO]` for full-rank coding when the model has
//! no intercept, `group[T.I3C]` for treatment coding against the first
//! (sorted) level, and `a[T.x]:b[T.y]` for interactions. An interaction
//! without its main effects is only accepted as the first term of a
//! no-intercept model, where it yields cell means `a[x]:b[y]`.

use nalgebra::DMatrix;

use crate::error::AssistantError;
use crate::formula::{Formula, Term};
use crate::matrix::Observations;

#[derive(Debug, Clone, PartialEq)]
pub struct DesignMatrix {
    matrix: DMatrix<f64>,
    coefficient_names: Vec<String>,
    sample_ids: Vec<String>,
}

impl DesignMatrix {
    pub fn from_formula(obs: &Observations, formula: &Formula) -> Result<Self, AssistantError> {
        for var in formula.variables() {
            if obs.column(var).is_none() {
                let available: Vec<&str> = obs.column_names().collect();
                return Err(AssistantError::Formula(format!(
                    "unknown column '{var}' (available: {})",
                    available.join(", ")
                )));
            }
        }

        let n_samples = obs.len();
        let mut names: Vec<String> = Vec::new();
        let mut columns: Vec<Vec<f64>> = Vec::new();

        if formula.intercept {
            names.push("Intercept".to_string());
            columns.push(vec![1.0; n_samples]);
        }

        // Without an intercept the first categorical main effect absorbs it.
        let mut full_rank_used = formula.intercept;
        for term in &formula.terms {
            match term {
                Term::Main(var) => {
                    let full = !full_rank_used;
                    full_rank_used = true;
                    for (name, column) in indicator_columns(obs, var, full)? {
                        names.push(name);
                        columns.push(column);
                    }
                }
                Term::Interaction(left, right) => {
                    let has_left = formula.terms.contains(&Term::Main(left.clone()));
                    let has_right = formula.terms.contains(&Term::Main(right.clone()));
                    // Cell-means coding when the interaction stands in for
                    // both of its margins and the intercept.
                    let full = match (has_left, has_right) {
                        (true, true) => false,
                        (false, false) if !full_rank_used => {
                            full_rank_used = true;
                            true
                        }
                        _ => {
                            return Err(AssistantError::Formula(format!(
                                "interaction '{left}:{right}' needs both main effects, \
                                 or must be the first term of a model without intercept"
                            )));
                        }
                    };
                    let lhs = indicator_columns(obs, left, full)?;
                    let rhs = indicator_columns(obs, right, full)?;
                    // The first factor varies fastest, as in patsy.
                    for (right_name, right_col) in &rhs {
                        for (left_name, left_col) in &lhs {
                            names.push(format!("{left_name}:{right_name}"));
                            columns.push(
                                left_col
                                    .iter()
                                    .zip(right_col)
                                    .map(|(a, b)| a * b)
                                    .collect(),
                            );
                        }
                    }
                }
            }
        }

        let matrix = DMatrix::from_fn(n_samples, columns.len(), |row, col| columns[col][row]);
        Ok(Self {
            matrix,
            coefficient_names: names,
            sample_ids: obs.sample_ids().to_vec(),
        })
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn coefficient_names(&self) -> &[String] {
        &self.coefficient_names
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn n_samples(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn n_coefficients(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn coefficient_index(&self, name: &str) -> Option<usize> {
        self.coefficient_names.iter().position(|n| n == name)
    }
}

fn indicator_columns(
    obs: &Observations,
    var: &str,
    full_rank: bool,
) -> Result<Vec<(String, Vec<f64>)>, AssistantError> {
    let values = obs
        .column(var)
        .ok_or_else(|| AssistantError::Formula(format!("unknown column '{var}'")))?;
    let levels = obs.levels(var).unwrap_or_default();
    let skip = usize::from(!full_rank);
    Ok(levels
        .iter()
        .skip(skip)
        .map(|level| {
            let name = if full_rank {
                format!("{var}[{level}]")
            } else {
                format!("{var}[T.{level}]")
            };
            let column = values
                .iter()
                .map(|value| if value == level { 1.0 } else { 0.0 })
                .collect();
            (name, column)
        })
        .collect())
}
