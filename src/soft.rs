//! Parser for GEO SOFT family files.
//!
//! A family file is a sequence of entities (`^SERIES`, `^PLATFORM`,
//! `^SAMPLE`, ...). Each entity carries `!Key = value` attributes, `#COLUMN
//! = description` column docs and optionally one tab-separated data table
//! enclosed by `!<kind>_table_begin` / `!<kind>_table_end`.

use crate::error::AssistantError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Database,
    Series,
    Platform,
    Sample,
    Other,
}

impl EntityKind {
    fn from_marker(marker: &str) -> Self {
        match marker.to_ascii_uppercase().as_str() {
            "DATABASE" => EntityKind::Database,
            "SERIES" => EntityKind::Series,
            "PLATFORM" => EntityKind::Platform,
            "SAMPLE" => EntityKind::Sample,
            _ => EntityKind::Other,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SoftTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SoftTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoftEntity {
    pub kind: EntityKind,
    pub accession: String,
    /// Attributes in file order; keys keep their `!Kind_` prefix stripped.
    pub attributes: Vec<(String, String)>,
    pub table: Option<SoftTable>,
}

impl SoftEntity {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn attribute_values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.attributes
            .iter()
            .filter(move |(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SoftDocument {
    pub entities: Vec<SoftEntity>,
}

impl SoftDocument {
    pub fn series(&self) -> Option<&SoftEntity> {
        self.entities
            .iter()
            .find(|entity| entity.kind == EntityKind::Series)
    }

    pub fn platforms(&self) -> impl Iterator<Item = &SoftEntity> {
        self.of_kind(EntityKind::Platform)
    }

    pub fn samples(&self) -> impl Iterator<Item = &SoftEntity> {
        self.of_kind(EntityKind::Sample)
    }

    fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &SoftEntity> {
        self.entities
            .iter()
            .filter(move |entity| entity.kind == kind)
    }
}

pub fn parse_soft(text: &str) -> Result<SoftDocument, AssistantError> {
    let mut entities: Vec<SoftEntity> = Vec::new();
    let mut table: Option<SoftTable> = None;

    for (index, raw_line) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw_line.trim_end_matches('\r');

        if let Some(current) = table.as_mut() {
            if is_table_end(line) {
                let finished = table.take().unwrap_or_default();
                let entity = entities.last_mut().ok_or_else(|| AssistantError::SoftParse {
                    line: line_no,
                    message: "table outside of an entity".to_string(),
                })?;
                entity.table = Some(finished);
                continue;
            }
            let cells = line.split('\t').map(|cell| cell.trim().to_string());
            if current.columns.is_empty() {
                current.columns = cells.collect();
            } else {
                current.rows.push(cells.collect());
            }
            continue;
        }

        if line.trim().is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix('^') {
            let (marker, accession) = split_assignment(rest);
            entities.push(SoftEntity {
                kind: EntityKind::from_marker(marker),
                accession: accession.to_string(),
                attributes: Vec::new(),
                table: None,
            });
            continue;
        }

        if is_table_begin(line) {
            if entities.is_empty() {
                return Err(AssistantError::SoftParse {
                    line: line_no,
                    message: "table outside of an entity".to_string(),
                });
            }
            table = Some(SoftTable::default());
            continue;
        }

        if let Some(rest) = line.strip_prefix('!') {
            let Some(entity) = entities.last_mut() else {
                return Err(AssistantError::SoftParse {
                    line: line_no,
                    message: "attribute before the first entity".to_string(),
                });
            };
            let (key, value) = split_assignment(rest);
            let key = strip_kind_prefix(key);
            entity.attributes.push((key.to_string(), value.to_string()));
            continue;
        }

        // `#COLUMN = description` lines only document table columns.
        if line.starts_with('#') {
            continue;
        }

        return Err(AssistantError::SoftParse {
            line: line_no,
            message: format!("unexpected line '{}'", truncate(line, 40)),
        });
    }

    if table.is_some() {
        return Err(AssistantError::SoftParse {
            line: text.lines().count(),
            message: "unterminated data table".to_string(),
        });
    }

    Ok(SoftDocument { entities })
}

fn split_assignment(rest: &str) -> (&str, &str) {
    match rest.split_once('=') {
        Some((key, value)) => (key.trim(), value.trim()),
        None => (rest.trim(), ""),
    }
}

fn strip_kind_prefix(key: &str) -> &str {
    match key.split_once('_') {
        Some((kind, rest))
            if matches!(
                kind,
                "Sample" | "Series" | "Platform" | "Database" | "Dataset"
            ) =>
        {
            rest
        }
        _ => key,
    }
}

fn is_table_begin(line: &str) -> bool {
    let lower = line.trim().to_ascii_lowercase();
    lower.starts_with('!') && lower.ends_with("_table_begin")
}

fn is_table_end(line: &str) -> bool {
    let lower = line.trim().to_ascii_lowercase();
    lower.starts_with('!') && lower.ends_with("_table_end")
}

fn truncate(line: &str, max: usize) -> &str {
    match line.char_indices().nth(max) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_entities_attributes_and_tables() {
        let text = "^SERIES = GSE1\n!Series_platform_id = GPL9\n^SAMPLE = GSM1\n!Sample_source_name_ch1 = DMSO\n#ID_REF = \n!sample_table_begin\nID_REF\tVALUE\np1\t1.5\n!sample_table_end\n";
        let doc = parse_soft(text).unwrap();

        assert_eq!(doc.entities.len(), 2);
        assert_eq!(doc.series().unwrap().attribute("platform_id"), Some("GPL9"));
        let sample = doc.samples().next().unwrap();
        assert_eq!(sample.accession, "GSM1");
        assert_eq!(sample.attribute("source_name_ch1"), Some("DMSO"));
        let table = sample.table.as_ref().unwrap();
        assert_eq!(table.columns, vec!["ID_REF", "VALUE"]);
        assert_eq!(table.rows, vec![vec!["p1".to_string(), "1.5".to_string()]]);
    }

    #[test]
    fn rejects_unterminated_table() {
        let text = "^SAMPLE = GSM1\n!sample_table_begin\nID_REF\tVALUE\n";
        assert!(parse_soft(text).is_err());
    }

    #[test]
    fn rejects_attribute_before_entity() {
        assert!(parse_soft("!Series_title = x\n").is_err());
    }
}
