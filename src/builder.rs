//! Selects in-scope samples from a raw series and assembles the annotated
//! expression matrix.

use nalgebra::DMatrix;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::RawDataset;
use crate::error::AssistantError;
use crate::matrix::{ExpressionMatrix, Features, Observations};

pub const FALLBACK_BATCH: &str = "other";
pub const UNCLASSIFIED_GROUP: &str = "unclassified";

/// How samples that contain neither group tag are labelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupLabeling {
    /// Anything without the primary tag gets the secondary label.
    #[default]
    Binary,
    /// Samples with neither tag are labelled `unclassified`.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyOptions {
    pub group_field: String,
    pub exclude_field: String,
    pub group_pattern: String,
    pub exclude_value: String,
    pub primary_label: String,
    pub secondary_label: String,
    pub batch_markers: Vec<String>,
    pub labeling: GroupLabeling,
    pub id_column: String,
    pub gene_column: String,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            group_field: "source_name_ch1".to_string(),
            exclude_field: "source_name_ch2".to_string(),
            group_pattern: "I3C|DMSO".to_string(),
            exclude_value: "M_MidR3_Ind".to_string(),
            primary_label: "I3C".to_string(),
            secondary_label: "DMSO".to_string(),
            batch_markers: vec![
                "MidR1".to_string(),
                "MidR2".to_string(),
                "MidR3".to_string(),
            ],
            labeling: GroupLabeling::Binary,
            id_column: "ID".to_string(),
            gene_column: "INTERNAL_GENE".to_string(),
        }
    }
}

impl AssemblyOptions {
    pub fn group_label(&self, source: &str) -> String {
        if source.contains(&self.primary_label) {
            return self.primary_label.clone();
        }
        match self.labeling {
            GroupLabeling::Binary => self.secondary_label.clone(),
            GroupLabeling::Strict if source.contains(&self.secondary_label) => {
                self.secondary_label.clone()
            }
            GroupLabeling::Strict => UNCLASSIFIED_GROUP.to_string(),
        }
    }

    pub fn batch_label(&self, source: &str) -> String {
        self.batch_markers
            .iter()
            .find(|marker| source.contains(marker.as_str()))
            .cloned()
            .unwrap_or_else(|| FALLBACK_BATCH.to_string())
    }
}

pub fn assemble(
    raw: &RawDataset,
    options: &AssemblyOptions,
) -> Result<ExpressionMatrix, AssistantError> {
    let pattern = RegexBuilder::new(&options.group_pattern)
        .case_insensitive(true)
        .build()
        .map_err(|err| AssistantError::InvalidPattern {
            pattern: options.group_pattern.clone(),
            message: err.to_string(),
        })?;

    let pheno = &raw.phenotype;
    if !pheno.has_column(&options.group_field) {
        return Err(AssistantError::MissingColumn {
            table: "phenotype table",
            column: options.group_field.clone(),
        });
    }

    let mut selected: Vec<(String, usize, String)> = Vec::new();
    for (row, sample_id) in pheno.sample_ids().iter().enumerate() {
        let Some(source) = pheno.field(row, &options.group_field) else {
            continue;
        };
        if !pattern.is_match(source) {
            continue;
        }
        if pheno.field(row, &options.exclude_field) == Some(options.exclude_value.as_str()) {
            continue;
        }
        let column = raw.expression.sample_index(sample_id).ok_or_else(|| {
            AssistantError::MissingColumn {
                table: "expression table",
                column: sample_id.clone(),
            }
        })?;
        selected.push((sample_id.clone(), column, source.to_string()));
    }

    if selected.is_empty() {
        return Err(AssistantError::EmptySelection {
            pattern: options.group_pattern.clone(),
            exclude: options.exclude_value.clone(),
        });
    }

    let probe_ids = raw.expression.feature_ids().to_vec();
    let genes = raw
        .platform_table
        .lookup(&options.id_column, &options.gene_column)?;
    let gene_names = probe_ids
        .iter()
        .map(|probe| {
            genes
                .get(probe.as_str())
                .map(|gene| gene.to_string())
                .ok_or_else(|| AssistantError::UnknownProbe(probe.clone()))
        })
        .collect::<Result<Vec<_>, AssistantError>>()?;

    let values = raw.expression.values();
    let x = DMatrix::from_fn(selected.len(), probe_ids.len(), |row, feature| {
        values[(feature, selected[row].1)]
    });

    let sample_ids = selected.iter().map(|(id, _, _)| id.clone()).collect();
    let batches = selected
        .iter()
        .map(|(_, _, source)| options.batch_label(source))
        .collect();
    let groups = selected
        .iter()
        .map(|(_, _, source)| options.group_label(source))
        .collect();
    let obs = Observations::new(sample_ids)
        .with_column("batch", batches)?
        .with_column("group", groups)?;
    let var = Features::new(probe_ids, gene_names)?;

    info!(
        samples = selected.len(),
        features = var.len(),
        pattern = %options.group_pattern,
        "assembled expression matrix"
    );
    ExpressionMatrix::new(x, obs, var)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_labeling_collapses_to_secondary() {
        let options = AssemblyOptions::default();
        assert_eq!(options.group_label("liver I3C MidR1"), "I3C");
        assert_eq!(options.group_label("liver DMSO"), "DMSO");
        assert_eq!(options.group_label("liver vehicle"), "DMSO");
    }

    #[test]
    fn strict_labeling_surfaces_unclassified() {
        let options = AssemblyOptions {
            labeling: GroupLabeling::Strict,
            ..AssemblyOptions::default()
        };
        assert_eq!(options.group_label("liver DMSO"), "DMSO");
        assert_eq!(options.group_label("liver vehicle"), UNCLASSIFIED_GROUP);
    }

    #[test]
    fn batch_markers_are_checked_in_order() {
        let options = AssemblyOptions::default();
        assert_eq!(options.batch_label("I3C MidR2"), "MidR2");
        assert_eq!(options.batch_label("I3C MidR1 MidR3"), "MidR1");
        assert_eq!(options.batch_label("I3C late"), FALLBACK_BATCH);
    }
}
