use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AssistantError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeoSeriesAccession(String);

impl GeoSeriesAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GeoSeriesAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GeoSeriesAccession {
    type Err = AssistantError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        if !has_numeric_suffix(&normalized, "GSE") {
            return Err(AssistantError::InvalidSeriesAccession(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeoPlatformAccession(String);

impl GeoPlatformAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GeoPlatformAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GeoPlatformAccession {
    type Err = AssistantError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        if !has_numeric_suffix(&normalized, "GPL") {
            return Err(AssistantError::InvalidPlatformAccession(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

fn has_numeric_suffix(value: &str, prefix: &str) -> bool {
    value
        .strip_prefix(prefix)
        .map(|rest| !rest.is_empty() && rest.chars().all(|ch| ch.is_ascii_digit()))
        .unwrap_or(false)
}

/// What to fetch from the dataset source. Without a platform the first
/// platform listed by the series is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRequest {
    pub series: GeoSeriesAccession,
    pub platform: Option<GeoPlatformAccession>,
}

impl DatasetRequest {
    pub fn new(series: GeoSeriesAccession) -> Self {
        Self {
            series,
            platform: None,
        }
    }

    pub fn with_platform(mut self, platform: GeoPlatformAccession) -> Self {
        self.platform = Some(platform);
        self
    }
}

/// Lifecycle of an analysis session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Empty,
    Loaded,
    Assembled,
    Normalized,
    Fitted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Empty => write!(f, "empty"),
            SessionState::Loaded => write!(f, "loaded"),
            SessionState::Assembled => write!(f, "assembled"),
            SessionState::Normalized => write!(f, "normalized"),
            SessionState::Fitted => write!(f, "fitted"),
        }
    }
}
