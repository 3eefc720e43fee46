use std::path::PathBuf;

use thiserror::Error;

use crate::RenderRequest;

/// Rejection reasons for the page-number field.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PageInputError {
    #[error("`{text}` is not a page number")]
    NotANumber { text: String },
    #[error("page {value} is outside 1..={total}")]
    OutOfRange { value: f64, total: u32 },
    #[error("page {value} is before the first page")]
    BelowFirstPage { value: f64 },
    #[error("page count is not known yet")]
    BoundUnknown,
}

#[derive(Debug, Error)]
#[error("failed to load document {locator}")]
pub struct LoadError {
    pub locator: String,
    #[source]
    pub source: anyhow::Error,
}

impl LoadError {
    pub fn new(locator: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self {
            locator: locator.into(),
            source: source.into(),
        }
    }
}

#[derive(Debug, Error)]
#[error("failed to render page {} at {}%", request.page, (request.scale * 100.0).round())]
pub struct RenderError {
    pub request: RenderRequest,
    #[source]
    pub source: anyhow::Error,
}

impl RenderError {
    pub fn new(request: RenderRequest, source: impl Into<anyhow::Error>) -> Self {
        Self {
            request,
            source: source.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("unsupported zoom level {percent}% (expected one of 50, 75, 100, 150, 200)")]
    UnsupportedScale { percent: u32 },
}
