//! The annotated expression matrix: samples x features with co-indexed
//! observation and feature metadata.

use std::fmt;

use nalgebra::DMatrix;

use crate::error::AssistantError;

#[derive(Debug, Clone, PartialEq)]
pub struct Observations {
    sample_ids: Vec<String>,
    columns: Vec<(String, Vec<String>)>,
}

impl Observations {
    pub fn new(sample_ids: Vec<String>) -> Self {
        Self {
            sample_ids,
            columns: Vec::new(),
        }
    }

    pub fn with_column(
        mut self,
        name: impl Into<String>,
        values: Vec<String>,
    ) -> Result<Self, AssistantError> {
        if values.len() != self.sample_ids.len() {
            return Err(AssistantError::DimensionMismatch {
                context: "observation column",
                expected: self.sample_ids.len(),
                actual: values.len(),
            });
        }
        let name = name.into();
        match self.columns.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = values,
            None => self.columns.push((name, values)),
        }
        Ok(self)
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn len(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_ids.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&[String]> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, values)| values.as_slice())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn levels(&self, name: &str) -> Option<Vec<String>> {
        let mut levels = self.column(name)?.to_vec();
        levels.sort();
        levels.dedup();
        Some(levels)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Features {
    pub probe_ids: Vec<String>,
    pub gene_names: Vec<String>,
}

impl Features {
    pub fn new(probe_ids: Vec<String>, gene_names: Vec<String>) -> Result<Self, AssistantError> {
        if probe_ids.len() != gene_names.len() {
            return Err(AssistantError::DimensionMismatch {
                context: "feature metadata",
                expected: probe_ids.len(),
                actual: gene_names.len(),
            });
        }
        Ok(Self {
            probe_ids,
            gene_names,
        })
    }

    pub fn len(&self) -> usize {
        self.probe_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probe_ids.is_empty()
    }

    fn retain(&mut self, keep: &[bool]) {
        let mut flags = keep.iter();
        self.probe_ids.retain(|_| *flags.next().unwrap_or(&false));
        let mut flags = keep.iter();
        self.gene_names.retain(|_| *flags.next().unwrap_or(&false));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawSnapshot {
    pub x: DMatrix<f64>,
    pub var: Features,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionMatrix {
    x: DMatrix<f64>,
    obs: Observations,
    var: Features,
    raw: Option<RawSnapshot>,
}

impl ExpressionMatrix {
    pub fn new(x: DMatrix<f64>, obs: Observations, var: Features) -> Result<Self, AssistantError> {
        if x.nrows() != obs.len() {
            return Err(AssistantError::DimensionMismatch {
                context: "matrix rows vs observations",
                expected: x.nrows(),
                actual: obs.len(),
            });
        }
        if x.ncols() != var.len() {
            return Err(AssistantError::DimensionMismatch {
                context: "matrix columns vs features",
                expected: x.ncols(),
                actual: var.len(),
            });
        }
        Ok(Self {
            x,
            obs,
            var,
            raw: None,
        })
    }

    pub fn x(&self) -> &DMatrix<f64> {
        &self.x
    }

    pub fn obs(&self) -> &Observations {
        &self.obs
    }

    pub fn var(&self) -> &Features {
        &self.var
    }

    pub fn raw(&self) -> Option<&RawSnapshot> {
        self.raw.as_ref()
    }

    pub fn n_obs(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_vars(&self) -> usize {
        self.x.ncols()
    }

    pub fn feature_values(&self, feature: usize) -> Vec<f64> {
        self.x.column(feature).iter().copied().collect()
    }

    pub(crate) fn snapshot_raw(&mut self) {
        self.raw = Some(RawSnapshot {
            x: self.x.clone(),
            var: self.var.clone(),
        });
    }

    /// Drops feature columns where `keep` is false, from `X` and `var` alike.
    pub(crate) fn retain_features(&mut self, keep: &[bool]) {
        let kept: Vec<usize> = keep
            .iter()
            .enumerate()
            .filter_map(|(idx, flag)| flag.then_some(idx))
            .collect();
        if kept.len() == self.n_vars() {
            return;
        }
        self.x = self.x.select_columns(kept.iter());
        self.var.retain(keep);
    }

    pub(crate) fn map_values(&mut self, f: impl Fn(f64) -> f64) {
        self.x.apply(|value| *value = f(*value));
    }
}

impl fmt::Display for ExpressionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ExpressionMatrix with n_obs x n_vars = {} x {}",
            self.n_obs(),
            self.n_vars()
        )?;
        let obs_names: Vec<String> = self.obs.column_names().map(|n| format!("'{n}'")).collect();
        writeln!(f, "    obs: {}", obs_names.join(", "))?;
        write!(f, "    var: 'gene_name', 'probe_id'")?;
        if self.raw.is_some() {
            write!(f, "\n    raw: stored")?;
        }
        for (row, sample) in self.obs.sample_ids().iter().enumerate() {
            write!(f, "\n{sample}")?;
            for (_, values) in &self.obs.columns {
                write!(f, "\t{}", values[row])?;
            }
        }
        Ok(())
    }
}
