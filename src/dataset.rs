use std::collections::HashMap;

use nalgebra::DMatrix;
use tracing::debug;

use crate::domain::{GeoPlatformAccession, GeoSeriesAccession};
use crate::error::AssistantError;
use crate::soft::{SoftDocument, SoftEntity};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhenotypeTable {
    sample_ids: Vec<String>,
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl PhenotypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_sample<I, K, V>(&mut self, sample_id: impl Into<String>, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut row = vec![None; self.columns.len()];
        for (key, value) in fields {
            let key = key.into();
            let idx = match self.column_index(&key) {
                Some(idx) => idx,
                None => {
                    self.columns.push(key);
                    for existing in &mut self.rows {
                        existing.push(None);
                    }
                    row.push(None);
                    self.columns.len() - 1
                }
            };
            row[idx] = Some(value.into());
        }
        self.sample_ids.push(sample_id.into());
        self.rows.push(row);
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    pub fn field(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }

    fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|name| name == column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionTable {
    feature_ids: Vec<String>,
    sample_ids: Vec<String>,
    values: DMatrix<f64>,
}

impl ExpressionTable {
    pub fn new(
        feature_ids: Vec<String>,
        sample_ids: Vec<String>,
        values: DMatrix<f64>,
    ) -> Result<Self, AssistantError> {
        if values.nrows() != feature_ids.len() {
            return Err(AssistantError::DimensionMismatch {
                context: "expression table rows",
                expected: feature_ids.len(),
                actual: values.nrows(),
            });
        }
        if values.ncols() != sample_ids.len() {
            return Err(AssistantError::DimensionMismatch {
                context: "expression table columns",
                expected: sample_ids.len(),
                actual: values.ncols(),
            });
        }
        Ok(Self {
            feature_ids,
            sample_ids,
            values,
        })
    }

    pub fn feature_ids(&self) -> &[String] {
        &self.feature_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    pub fn sample_index(&self, sample_id: &str) -> Option<usize> {
        self.sample_ids.iter().position(|id| id == sample_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlatformTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl PlatformTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    // First occurrence of a duplicated key wins.
    pub fn lookup(
        &self,
        key_column: &str,
        value_column: &str,
    ) -> Result<HashMap<&str, &str>, AssistantError> {
        let key_idx = self.column_index(key_column)?;
        let value_idx = self.column_index(value_column)?;
        let mut map = HashMap::with_capacity(self.rows.len());
        for row in &self.rows {
            let Some(key) = row.get(key_idx) else {
                continue;
            };
            let value = row.get(value_idx).map(String::as_str).unwrap_or("");
            map.entry(key.as_str()).or_insert(value);
        }
        Ok(map)
    }

    fn column_index(&self, column: &str) -> Result<usize, AssistantError> {
        self.columns
            .iter()
            .position(|name| name == column)
            .ok_or_else(|| AssistantError::MissingColumn {
                table: "platform table",
                column: column.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawDataset {
    pub series: GeoSeriesAccession,
    pub platform: GeoPlatformAccession,
    pub phenotype: PhenotypeTable,
    pub expression: ExpressionTable,
    pub platform_table: PlatformTable,
}

impl RawDataset {
    pub fn from_soft(
        series: GeoSeriesAccession,
        document: &SoftDocument,
        platform: Option<&GeoPlatformAccession>,
    ) -> Result<Self, AssistantError> {
        let platform_entity = match platform {
            Some(wanted) => document
                .platforms()
                .find(|entity| entity.accession.eq_ignore_ascii_case(wanted.as_str())),
            None => first_platform(document),
        }
        .ok_or_else(|| AssistantError::PlatformNotFound {
            series: series.to_string(),
            platform: platform
                .map(ToString::to_string)
                .unwrap_or_else(|| "<first listed>".to_string()),
        })?;
        let platform_acc: GeoPlatformAccession = platform_entity.accession.parse()?;

        let platform_table = platform_entity
            .table
            .as_ref()
            .map(|table| PlatformTable::new(table.columns.clone(), table.rows.clone()))
            .unwrap_or_default();

        let samples: Vec<&SoftEntity> = document
            .samples()
            .filter(|sample| {
                sample
                    .attribute("platform_id")
                    .map(|id| id.eq_ignore_ascii_case(platform_acc.as_str()))
                    .unwrap_or(true)
            })
            .collect();

        let mut phenotype = PhenotypeTable::new();
        for sample in &samples {
            phenotype.push_sample(sample.accession.clone(), phenotype_fields(sample));
        }

        let expression = pivot_values(&samples)?;
        debug!(
            series = %series,
            platform = %platform_acc,
            samples = expression.sample_ids().len(),
            features = expression.feature_ids().len(),
            "built raw dataset"
        );

        Ok(Self {
            series,
            platform: platform_acc,
            phenotype,
            expression,
            platform_table,
        })
    }
}

fn first_platform(document: &SoftDocument) -> Option<&SoftEntity> {
    let listed = document
        .series()
        .and_then(|series| series.attribute("platform_id"));
    match listed {
        Some(id) => document
            .platforms()
            .find(|entity| entity.accession.eq_ignore_ascii_case(id)),
        None => document.platforms().next(),
    }
}

/// Flattens sample attributes the way GEOparse names phenotype columns.
fn phenotype_fields(sample: &SoftEntity) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = Vec::new();
    let mut characteristic_counts: HashMap<&str, usize> = HashMap::new();

    for (key, value) in &sample.attributes {
        if key.starts_with("characteristics_") {
            let count = characteristic_counts.entry(key.as_str()).or_insert(0);
            let (tag, tag_value) = match value.split_once(':') {
                Some((tag, rest)) => (tag.trim().to_string(), rest.trim().to_string()),
                None => (String::new(), value.clone()),
            };
            fields.push((format!("{key}.{count}.{tag}"), tag_value));
            *count += 1;
            continue;
        }
        match fields.iter_mut().find(|(name, _)| name == key) {
            Some((_, existing)) => {
                existing.push_str("; ");
                existing.push_str(value);
            }
            None => fields.push((key.clone(), value.clone())),
        }
    }
    fields
}

fn pivot_values(samples: &[&SoftEntity]) -> Result<ExpressionTable, AssistantError> {
    let mut feature_ids: Vec<String> = Vec::new();
    let mut feature_index: HashMap<String, usize> = HashMap::new();
    let mut columns: Vec<HashMap<usize, f64>> = Vec::with_capacity(samples.len());

    for sample in samples {
        let mut column = HashMap::new();
        if let Some(table) = &sample.table {
            let id_idx = table
                .column_index("ID_REF")
                .ok_or_else(|| AssistantError::MissingColumn {
                    table: "sample table",
                    column: "ID_REF".to_string(),
                })?;
            let value_idx = table
                .column_index("VALUE")
                .ok_or_else(|| AssistantError::MissingColumn {
                    table: "sample table",
                    column: "VALUE".to_string(),
                })?;
            for row in &table.rows {
                let Some(id) = row.get(id_idx) else {
                    continue;
                };
                let idx = match feature_index.get(id) {
                    Some(idx) => *idx,
                    None => {
                        feature_ids.push(id.clone());
                        feature_index.insert(id.clone(), feature_ids.len() - 1);
                        feature_ids.len() - 1
                    }
                };
                let value = row
                    .get(value_idx)
                    .and_then(|cell| cell.parse::<f64>().ok())
                    .unwrap_or(f64::NAN);
                column.insert(idx, value);
            }
        }
        columns.push(column);
    }

    let values = DMatrix::from_fn(feature_ids.len(), samples.len(), |row, col| {
        columns[col].get(&row).copied().unwrap_or(f64::NAN)
    });
    let sample_ids = samples
        .iter()
        .map(|sample| sample.accession.clone())
        .collect();
    ExpressionTable::new(feature_ids, sample_ids, values)
}
