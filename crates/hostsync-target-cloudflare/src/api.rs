// Cloudflare API v4 plumbing shared by the DNS and tunnel targets
//
// Every response comes wrapped in the same envelope:
//
// ```json
// { "success": true, "errors": [], "result": ..., "result_info": { ... } }
// ```

use hostsync_core::{Error, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Standard Cloudflare response envelope
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
    pub result: Option<T>,
    pub result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Paging information of list responses
#[derive(Debug, Deserialize)]
pub struct ResultInfo {
    #[serde(default)]
    pub total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct TokenStatus {
    status: String,
}

impl<T> ApiResponse<T> {
    /// All API errors joined as `message (code)`
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return "unknown error".to_string();
        }
        self.errors
            .iter()
            .map(|e| format!("{} ({})", e.message, e.code))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Build the HTTP client every Cloudflare target uses
pub fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(DEFAULT_HTTP_TIMEOUT)
        .build()
        .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))
}

/// Map a transport failure to a core error
pub fn request_error(e: reqwest::Error) -> Error {
    Error::http(format!("Cloudflare request failed: {}", e))
}

/// Decode a response, mapping HTTP and API failures to core errors
///
/// `target` names the calling target in the errors it returns.
pub async fn decode<T: DeserializeOwned>(
    response: reqwest::Response,
    target: &str,
    context: &str,
) -> Result<ApiResponse<T>> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        return Err(status_error(target, status.as_u16(), context, &error_text));
    }

    let body: ApiResponse<T> = response.json().await.map_err(|e| {
        Error::target(target, format!("{}: failed to parse response: {}", context, e))
    })?;

    if !body.success {
        return Err(Error::target(target, format!("{}: {}", context, body.error_summary())));
    }

    Ok(body)
}

/// Map a non-success HTTP status to a core error
pub fn status_error(target: &str, status: u16, context: &str, body: &str) -> Error {
    match status {
        401 | 403 => Error::auth(format!(
            "{}: invalid Cloudflare API token or insufficient permissions (status {})",
            context, status
        )),
        404 => Error::not_found(format!("{}: {}", context, body)),
        429 => Error::rate_limited(format!("{}: Cloudflare rate limit exceeded", context)),
        500..=599 => Error::target(
            target,
            format!("{}: Cloudflare server error (transient): {} - {}", context, status, body),
        ),
        _ => Error::target(target, format!("{}: {} - {}", context, status, body)),
    }
}

/// Check that `api_token` is active
///
/// # Errors
///
/// Returns an authentication error for inactive tokens.
pub async fn verify_token(
    client: &reqwest::Client,
    base_url: &str,
    api_token: &str,
    target: &str,
) -> Result<()> {
    let response = client
        .get(format!("{}/user/tokens/verify", base_url))
        .bearer_auth(api_token)
        .send()
        .await
        .map_err(request_error)?;

    let body: ApiResponse<TokenStatus> = decode(response, target, "Verify token").await?;

    match body.result {
        Some(token) if token.status == "active" => Ok(()),
        Some(token) => Err(Error::auth(format!(
            "Cloudflare API token is not active (status: {})",
            token.status
        ))),
        None => Err(Error::auth("Cloudflare token verification returned no result")),
    }
}
