use assert_matches::assert_matches;

use microarray_assistant::domain::{
    DatasetRequest, GeoPlatformAccession, GeoSeriesAccession, SessionState,
};
use microarray_assistant::error::AssistantError;

#[test]
fn parse_series_accession_valid() {
    let acc: GeoSeriesAccession = "GSE102902".parse().unwrap();
    assert_eq!(acc.as_str(), "GSE102902");
    assert_eq!(acc.to_string(), "GSE102902");
}

#[test]
fn parse_series_accession_invalid() {
    for bad in ["", "GSE", "GSE12a", "GPL570", "102902"] {
        let err = bad.parse::<GeoSeriesAccession>().unwrap_err();
        assert_matches!(err, AssistantError::InvalidSeriesAccession(_));
    }
}

#[test]
fn parse_platform_accession_valid() {
    let acc: GeoPlatformAccession = "gpl570".parse().unwrap();
    assert_eq!(acc.as_str(), "GPL570");
}

#[test]
fn request_defaults_to_first_platform() {
    let series: GeoSeriesAccession = "GSE1".parse().unwrap();
    let request = DatasetRequest::new(series.clone());
    assert!(request.platform.is_none());

    let platform: GeoPlatformAccession = "GPL2".parse().unwrap();
    let request = DatasetRequest::new(series).with_platform(platform.clone());
    assert_eq!(request.platform, Some(platform));
}

#[test]
fn session_state_display() {
    assert_eq!(SessionState::Empty.to_string(), "empty");
    assert_eq!(SessionState::Fitted.to_string(), "fitted");
}
