use std::io::Read;
use std::time::Duration;

use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::info;

use crate::dataset::RawDataset;
use crate::domain::{DatasetRequest, GeoSeriesAccession};
use crate::error::AssistantError;
use crate::soft::parse_soft;
use crate::store::Store;

pub trait GeoClient: Send + Sync {
    fn fetch_soft_text(&self, accession: &GeoSeriesAccession) -> Result<String, AssistantError>;
}

pub trait DatasetSource {
    fn fetch(&self, request: &DatasetRequest) -> Result<RawDataset, AssistantError>;
}

#[derive(Clone)]
pub struct GeoHttpClient {
    client: Client,
}

impl GeoHttpClient {
    pub fn new() -> Result<Self, AssistantError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("microarray-assistant/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| AssistantError::GeoHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| AssistantError::GeoHttp(err.to_string()))?;
        Ok(Self { client })
    }

    fn soft_url(accession: &GeoSeriesAccession) -> String {
        let prefix = geo_series_prefix(accession);
        format!(
            "https://ftp.ncbi.nlm.nih.gov/geo/series/{prefix}/{acc}/soft/{acc}_family.soft.gz",
            acc = accession.as_str()
        )
    }
}

impl GeoClient for GeoHttpClient {
    fn fetch_soft_text(&self, accession: &GeoSeriesAccession) -> Result<String, AssistantError> {
        let url = Self::soft_url(accession);
        info!(%url, "downloading GEO family SOFT file");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| AssistantError::GeoHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "GEO request failed".to_string());
            return Err(AssistantError::GeoStatus { status, message });
        }
        let bytes = response
            .bytes()
            .map_err(|err| AssistantError::GeoHttp(err.to_string()))?;
        decode_gzip_text(bytes.as_ref())
    }
}

pub fn decode_gzip_text(bytes: &[u8]) -> Result<String, AssistantError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut text = String::new();
    decoder
        .read_to_string(&mut text)
        .map_err(|err| AssistantError::GeoHttp(err.to_string()))?;
    Ok(text)
}

pub struct GeoDatasetSource<C: GeoClient> {
    client: C,
    store: Option<Store>,
}

impl<C: GeoClient> GeoDatasetSource<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            store: None,
        }
    }

    pub fn with_store(client: C, store: Store) -> Self {
        Self {
            client,
            store: Some(store),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn soft_text(&self, series: &GeoSeriesAccession) -> Result<String, AssistantError> {
        if let Some(store) = &self.store {
            if let Some(text) = store.read_soft(series)? {
                info!(series = %series, "using cached SOFT file");
                return Ok(text);
            }
        }
        let text = self.client.fetch_soft_text(series)?;
        if let Some(store) = &self.store {
            store.write_soft(series, &text)?;
        }
        Ok(text)
    }
}

impl<C: GeoClient> DatasetSource for GeoDatasetSource<C> {
    fn fetch(&self, request: &DatasetRequest) -> Result<RawDataset, AssistantError> {
        let text = self.soft_text(&request.series)?;
        let document = parse_soft(&text)?;
        RawDataset::from_soft(request.series.clone(), &document, request.platform.as_ref())
    }
}

pub fn geo_series_prefix(accession: &GeoSeriesAccession) -> String {
    let digits = accession.as_str().trim_start_matches("GSE");
    if digits.len() <= 3 {
        return "GSEnnn".to_string();
    }
    let head = &digits[..digits.len() - 3];
    format!("GSE{}nnn", head)
}
