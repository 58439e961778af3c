use std::io::Write;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::write::GzEncoder;

use microarray_assistant::domain::{DatasetRequest, GeoSeriesAccession};
use microarray_assistant::error::AssistantError;
use microarray_assistant::geo::{DatasetSource, GeoClient, GeoDatasetSource, decode_gzip_text};
use microarray_assistant::store::Store;

const FAMILY: &str = include_str!("fixtures/GSE90001_family.soft");

#[derive(Default)]
struct MockGeo {
    calls: Mutex<usize>,
}

impl GeoClient for MockGeo {
    fn fetch_soft_text(&self, accession: &GeoSeriesAccession) -> Result<String, AssistantError> {
        *self.calls.lock().unwrap() += 1;
        if accession.as_str() == "GSE90001" {
            Ok(FAMILY.to_string())
        } else {
            Err(AssistantError::GeoStatus {
                status: 404,
                message: "not found".to_string(),
            })
        }
    }
}

fn request(series: &str) -> DatasetRequest {
    DatasetRequest::new(series.parse().unwrap())
}

#[test]
fn fetch_prefers_cache_over_download() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("cache")).unwrap();
    let store = Store::new_with_root(root);
    let source = GeoDatasetSource::with_store(MockGeo::default(), store.clone());

    let first = source.fetch(&request("GSE90001")).unwrap();
    let second = source.fetch(&request("GSE90001")).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.phenotype.n_samples(), 6);
    assert_eq!(*source_calls(&source), 1);
    assert!(
        store
            .soft_path(&"GSE90001".parse().unwrap())
            .as_std_path()
            .exists()
    );
}

#[test]
fn fetch_without_store_always_downloads() {
    let source = GeoDatasetSource::new(MockGeo::default());
    source.fetch(&request("GSE90001")).unwrap();
    source.fetch(&request("GSE90001")).unwrap();
    assert_eq!(*source_calls(&source), 2);
}

#[test]
fn download_errors_surface() {
    let source = GeoDatasetSource::new(MockGeo::default());
    let err = source.fetch(&request("GSE1")).unwrap_err();
    assert_matches!(err, AssistantError::GeoStatus { status: 404, .. });
}

#[test]
fn gzip_payload_is_decoded() {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(FAMILY.as_bytes()).unwrap();
    let bytes = encoder.finish().unwrap();
    assert_eq!(decode_gzip_text(&bytes).unwrap(), FAMILY);
    assert!(decode_gzip_text(b"plain text").is_err());
}

fn source_calls(source: &GeoDatasetSource<MockGeo>) -> std::sync::MutexGuard<'_, usize> {
    source.client().calls.lock().unwrap()
}
