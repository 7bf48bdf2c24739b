use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{ApiError, DnsApi, NewRecord, ProviderRecord};
use crate::zone::Zone;

pub const DEFAULT_API_URL: &str = "https://gateway.stackpath.com/";

const PAGE_SIZE: u32 = 100;
// Refresh a little before the gateway would reject the token.
const TOKEN_LEEWAY: Duration = Duration::from_secs(30);
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug)]
struct Token {
    access_token: String,
    expires_at: Instant,
}

impl Token {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_LEEWAY < self.expires_at
    }
}

/// StackPath DNS API client scoped to one stack.
#[derive(Debug)]
pub struct StackPathApi {
    base_url: Url,
    stack_id: String,
    credentials: Credentials,
    client: Client,
    token: Mutex<Token>,
}

impl StackPathApi {
    /// Builds the client and fetches the first access token, so bad
    /// credentials fail here rather than on the first reconciliation.
    pub async fn new(
        url: &str,
        stack_id: String,
        credentials: Credentials,
        timeout: Option<Duration>,
    ) -> Result<Self, ApiError> {
        let base_url = Url::parse(url)?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::BadBaseUrl);
        }

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        let token = fetch_token(&client, &base_url, &credentials).await?;
        info!("successfully authenticated with StackPath");

        Ok(Self {
            base_url,
            stack_id,
            credentials,
            client,
            token: Mutex::new(token),
        })
    }

    async fn bearer(&self) -> Result<String, ApiError> {
        let mut token = self.token.lock().await;
        if !token.is_fresh() {
            debug!("access token expired, requesting a new one");
            *token = fetch_token(&self.client, &self.base_url, &self.credentials).await?;
        }
        Ok(token.access_token.clone())
    }

    fn zones_url(&self) -> Result<Url, ApiError> {
        Ok(self
            .base_url
            .join(&format!("dns/v1/stacks/{}/zones", self.stack_id))?)
    }

    fn records_url(&self, zone_id: &str) -> Result<Url, ApiError> {
        Ok(self
            .base_url
            .join(&format!("dns/v1/stacks/{}/zones/{}/records", self.stack_id, zone_id))?)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.bearer_auth(self.bearer().await?).send().await?;
        check_status(response).await
    }

    /// Walks cursor pagination until the gateway reports no further page.
    async fn paginate<P, T, F>(&self, url: Url, mut take: F) -> Result<Vec<T>, ApiError>
    where
        P: DeserializeOwned,
        F: FnMut(P) -> (Vec<T>, Option<PageInfo>),
    {
        let mut items = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(url.clone())
                .query(&[("page_request.first", PAGE_SIZE.to_string())]);
            if let Some(cursor) = &after {
                request = request.query(&[("page_request.after", cursor)]);
            }

            let page: P = self.send(request).await?.json().await?;
            let (mut page_items, info) = take(page);
            items.append(&mut page_items);

            match info {
                Some(PageInfo {
                    has_next_page: true,
                    end_cursor: Some(cursor),
                }) if after.as_ref() != Some(&cursor) => after = Some(cursor),
                _ => break,
            }
        }

        Ok(items)
    }
}

#[async_trait::async_trait]
impl DnsApi for StackPathApi {
    #[tracing::instrument(skip(self))]
    async fn list_zones(&self) -> Result<Vec<Zone>, ApiError> {
        let zones = self
            .paginate(self.zones_url()?, |page: ZonesPage| (page.zones, page.page_info))
            .await?;
        debug!("got {} zones from StackPath", zones.len());

        Ok(zones
            .into_iter()
            .map(|z| Zone::new(z.id, z.domain))
            .collect())
    }

    #[tracing::instrument(skip(self))]
    async fn list_records(&self, zone_id: &str) -> Result<Vec<ProviderRecord>, ApiError> {
        let records = self
            .paginate(self.records_url(zone_id)?, |page: RecordsPage| {
                (page.records, page.page_info)
            })
            .await?;
        debug!("got {} records from StackPath", records.len());

        Ok(records)
    }

    #[tracing::instrument(skip(self))]
    async fn create_record(
        &self,
        zone_id: &str,
        record: &NewRecord,
    ) -> Result<ProviderRecord, ApiError> {
        let request = self.client.post(self.records_url(zone_id)?).json(record);
        let created: CreatedRecord = self.send(request).await?.json().await?;

        Ok(created.record)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<(), ApiError> {
        let url = self.base_url.join(&format!(
            "dns/v1/stacks/{}/zones/{}/records/{}",
            self.stack_id, zone_id, record_id
        ))?;
        self.send(self.client.delete(url)).await?;

        Ok(())
    }
}

async fn fetch_token(
    client: &Client,
    base_url: &Url,
    credentials: &Credentials,
) -> Result<Token, ApiError> {
    let url = base_url.join("identity/v1/oauth2/token")?;
    let response = client
        .post(url)
        .json(&TokenRequest {
            grant_type: "client_credentials",
            client_id: &credentials.client_id,
            client_secret: &credentials.client_secret,
        })
        .send()
        .await?;

    let response = match check_status(response).await {
        Ok(response) => response,
        Err(ApiError::Status { status, body }) => {
            return Err(ApiError::Auth(format!("{status}: {body}")))
        }
        Err(e) => return Err(e),
    };

    let token: TokenResponse = response.json().await?;
    // Capped so an absurd expires_in cannot overflow the Instant.
    let lifetime = Duration::from_secs(token.expires_in).min(MAX_TOKEN_LIFETIME);
    Ok(Token {
        access_token: token.access_token,
        expires_at: Instant::now() + lifetime,
    })
}

/// Turns non-success responses into [`ApiError::Status`], keeping the body
/// for diagnostics.
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!(%status, %body, "StackPath request failed");
    Err(ApiError::Status { status, body })
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expiry")]
    expires_in: u64,
}

fn default_expiry() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ZonesPage {
    #[serde(default)]
    zones: Vec<StackPathZone>,
    page_info: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
struct StackPathZone {
    id: String,
    domain: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordsPage {
    #[serde(default)]
    records: Vec<ProviderRecord>,
    page_info: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
struct CreatedRecord {
    record: ProviderRecord,
}
