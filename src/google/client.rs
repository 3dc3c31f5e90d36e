use serde_json::Value;

use crate::errors::UpstreamFailure;

pub const SEARCH_CONSOLE_BASE_URL: &str = "https://www.googleapis.com/webmasters/v3";
pub const ANALYTICS_DATA_BASE_URL: &str = "https://analyticsdata.googleapis.com/v1beta";

/// Base URLs of the Google APIs the connector re-exposes.
#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    pub search_console: String,
    pub analytics_data: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            search_console: SEARCH_CONSOLE_BASE_URL.to_string(),
            analytics_data: ANALYTICS_DATA_BASE_URL.to_string(),
        }
    }
}

/// Ready-to-use credential for one website, handed out by the resolver.
#[derive(Clone)]
pub struct AuthenticatedClient {
    website_id: String,
    access_token: String,
    refresh_token: String,
    expiry_date: i64,
    scopes: Vec<String>,
    endpoints: GoogleEndpoints,
    http: reqwest::Client,
}

// Tokens stay out of Debug output.
impl std::fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("website_id", &self.website_id)
            .field("expiry_date", &self.expiry_date)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

impl AuthenticatedClient {
    pub(crate) fn new(
        website_id: &str,
        tokens: crate::models::TokenSet,
        scopes: Vec<String>,
        endpoints: GoogleEndpoints,
        http: reqwest::Client,
    ) -> Self {
        Self {
            website_id: website_id.to_string(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expiry_date: tokens.expiry_date,
            scopes,
            endpoints,
            http,
        }
    }

    pub fn website_id(&self) -> &str {
        &self.website_id
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn expiry_date(&self) -> i64 {
        self.expiry_date
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub async fn get_json(&self, url: &str) -> Result<Value, UpstreamFailure> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        read_json(resp).await
    }

    pub async fn post_json(&self, url: &str, body: &Value) -> Result<Value, UpstreamFailure> {
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;
        read_json(resp).await
    }

    /// Search Console properties visible to the connected account.
    pub async fn list_sites(&self) -> Result<Value, UpstreamFailure> {
        self.get_json(&format!("{}/sites", self.endpoints.search_console))
            .await
    }

    pub async fn query_search_analytics(
        &self,
        site_url: &str,
        request: &Value,
    ) -> Result<Value, UpstreamFailure> {
        let url = format!(
            "{}/sites/{}/searchAnalytics/query",
            self.endpoints.search_console,
            urlencoding::encode(site_url)
        );
        self.post_json(&url, request).await
    }

    /// Analytics Data API `runReport`. Accepts `123456` or `properties/123456`.
    pub async fn run_report(
        &self,
        property_id: &str,
        request: &Value,
    ) -> Result<Value, UpstreamFailure> {
        let property = property_id.trim_start_matches("properties/");
        let url = format!(
            "{}/properties/{}:runReport",
            self.endpoints.analytics_data, property
        );
        self.post_json(&url, request).await
    }
}

/// Non-2xx responses become `UpstreamFailure::Http` carrying Google's error message.
async fn read_json(resp: reqwest::Response) -> Result<Value, UpstreamFailure> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json::<Value>().await?);
    }

    let body = resp.text().await.unwrap_or_default();
    Err(UpstreamFailure::Http {
        status: status.as_u16(),
        detail: extract_error_message(&body),
    })
}

/// Google error bodies look like `{"error": {"code": 403, "message": "..."}}`.
fn extract_error_message(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    parsed
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(String::from)
}
