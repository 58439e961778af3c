use assert_matches::assert_matches;

use microarray_assistant::dataset::RawDataset;
use microarray_assistant::domain::{GeoPlatformAccession, GeoSeriesAccession};
use microarray_assistant::error::AssistantError;
use microarray_assistant::soft::{EntityKind, parse_soft};

const FAMILY: &str = include_str!("fixtures/GSE90001_family.soft");

fn series() -> GeoSeriesAccession {
    "GSE90001".parse().unwrap()
}

#[test]
fn parse_family_file_entities() {
    let doc = parse_soft(FAMILY).unwrap();
    assert_eq!(doc.entities[0].kind, EntityKind::Database);
    assert_eq!(doc.series().unwrap().accession, "GSE90001");
    assert_eq!(
        doc.series()
            .unwrap()
            .attribute_values("sample_id")
            .count(),
        6
    );
    assert_eq!(doc.platforms().count(), 1);
    assert_eq!(doc.samples().count(), 6);

    let platform = doc.platforms().next().unwrap();
    let table = platform.table.as_ref().unwrap();
    assert_eq!(table.column_index("INTERNAL_GENE"), Some(1));
    assert_eq!(table.rows.len(), 4);
}

#[test]
fn raw_dataset_from_family_file() {
    let doc = parse_soft(FAMILY).unwrap();
    let raw = RawDataset::from_soft(series(), &doc, None).unwrap();

    assert_eq!(raw.platform.as_str(), "GPL90001");
    assert_eq!(raw.phenotype.n_samples(), 6);
    assert_eq!(raw.phenotype.field(0, "source_name_ch1"), Some("MidR1_I3C_rep1"));
    assert_eq!(raw.phenotype.field(3, "source_name_ch2"), Some("M_MidR2_Ind"));
    assert_eq!(
        raw.phenotype.field(0, "characteristics_ch1.0.treatment"),
        Some("I3C")
    );
    assert_eq!(raw.phenotype.field(0, "characteristics_ch1.1.time"), Some("24h"));

    assert_eq!(raw.expression.feature_ids(), ["1001", "1002", "1003"]);
    assert_eq!(raw.expression.sample_ids()[5], "GSM900006");
    assert_eq!(raw.expression.values()[(0, 1)], 8.4);
    assert_eq!(raw.platform_table.n_rows(), 4);

    let genes = raw.platform_table.lookup("ID", "INTERNAL_GENE").unwrap();
    assert_eq!(genes.get("1003"), Some(&"AHRR"));
}

#[test]
fn explicit_platform_must_exist() {
    let doc = parse_soft(FAMILY).unwrap();
    let missing: GeoPlatformAccession = "GPL1".parse().unwrap();
    let err = RawDataset::from_soft(series(), &doc, Some(&missing)).unwrap_err();
    assert_matches!(err, AssistantError::PlatformNotFound { .. });
}

#[test]
fn unparseable_values_become_nan() {
    let text = "^SERIES = GSE1\n!Series_platform_id = GPL1\n^PLATFORM = GPL1\n!platform_table_begin\nID\tINTERNAL_GENE\np1\tG1\np2\tG2\n!platform_table_end\n^SAMPLE = GSM1\n!Sample_platform_id = GPL1\n!sample_table_begin\nID_REF\tVALUE\np1\tnull\np2\t2.5\n!sample_table_end\n^SAMPLE = GSM2\n!Sample_platform_id = GPL1\n!sample_table_begin\nID_REF\tVALUE\np2\t3.0\n!sample_table_end\n";
    let doc = parse_soft(text).unwrap();
    let raw = RawDataset::from_soft("GSE1".parse().unwrap(), &doc, None).unwrap();
    let values = raw.expression.values();
    assert!(values[(0, 0)].is_nan());
    assert!(values[(0, 1)].is_nan());
    assert_eq!(values[(1, 1)], 3.0);
}

#[test]
fn stray_line_is_a_parse_error() {
    let err = parse_soft("^SERIES = GSE1\nnot soft at all\n").unwrap_err();
    assert_matches!(err, AssistantError::SoftParse { line: 2, .. });
}
