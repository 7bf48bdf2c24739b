pub mod fixture;
pub mod stackpath;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::endpoint::RecordType;
use crate::zone::Zone;

/// A single-value record as the provider stores it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderRecord {
    pub id: String,
    /// Zone-relative name; empty or `@` for the apex.
    #[serde(default)]
    pub name: String,
    /// Left as the provider spells it: the zone may hold types this crate
    /// does not manage.
    #[serde(rename = "type")]
    pub record_type: String,
    #[serde(default)]
    pub ttl: u32,
    #[serde(default)]
    pub data: String,
}

impl ProviderRecord {
    /// The record type, if it is one this crate manages.
    pub fn supported_type(&self) -> Option<RecordType> {
        self.record_type.parse().ok()
    }
}

/// Body of a record create call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub ttl: u32,
    pub data: String,
}

/// Calls into the DNS provider.
///
/// The reconciliation engine only needs these four operations. Pagination
/// and authentication are the implementation's business.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait DnsApi: Send + Sync {
    async fn list_zones(&self) -> Result<Vec<Zone>, ApiError>;
    async fn list_records(&self, zone_id: &str) -> Result<Vec<ProviderRecord>, ApiError>;
    async fn create_record(
        &self,
        zone_id: &str,
        record: &NewRecord,
    ) -> Result<ProviderRecord, ApiError>;
    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<(), ApiError>;
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("bad base url")]
    BadBaseUrl,
    #[error(transparent)]
    UrlParse(#[from] url::ParseError),
    #[error("zone {0} not found")]
    ZoneNotFound(String),
    #[error("record {record_id} not found in zone {zone_id}")]
    RecordNotFound { zone_id: String, record_id: String },
}
