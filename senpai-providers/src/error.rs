//! Shared upstream error types
//!
//! Common error enum and response helpers used by every upstream client.
//!
//! The `Display` form of each variant carries the machine-readable prefix that
//! upstream error bodies use (`RATE_LIMIT: …`, `HTTP_<code>: …`, `GRAPHQL: …`,
//! `NOT_FOUND: …`). Strings are parsed into the tagged variant as soon as they
//! cross the client boundary, so nothing downstream has to match on text.

use thiserror::Error;

/// Maximum response body size for upstream HTTP calls (16 MB).
/// Prevents OOM from malicious or misconfigured upstream servers.
pub const MAX_RESPONSE_SIZE: usize = 16 * 1024 * 1024;

/// Upper bound on how much of an error body is kept in the error message.
const ERROR_BODY_PREVIEW: usize = 512;

/// Common error type for all upstream HTTP clients.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("RATE_LIMIT: {0}")]
    RateLimited(String),

    #[error("HTTP_{status}: {message}")]
    Http { status: u16, message: String },

    #[error("GRAPHQL: {0}")]
    GraphQl(String),

    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Response too large ({size} bytes, max {MAX_RESPONSE_SIZE})")]
    ResponseTooLarge { size: u64 },

    /// An upstream message that carried no recognised prefix.
    #[error("{0}")]
    Other(String),
}

impl UpstreamError {
    /// Classify a non-success HTTP status together with its body.
    ///
    /// 429, or any body mentioning "too many requests", is a rate-limit signal.
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = preview(body);
        if status == 429 || is_too_many_requests(body) {
            return Self::RateLimited(message);
        }
        if status == 404 {
            return Self::NotFound(message);
        }
        Self::Http { status, message }
    }

    /// Parse a prefixed error string (as found in upstream error bodies)
    /// into its tagged variant.
    #[must_use]
    pub fn from_wire(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(rest) = raw.strip_prefix("RATE_LIMIT:") {
            return Self::RateLimited(rest.trim().to_string());
        }
        if let Some(rest) = raw.strip_prefix("GRAPHQL:") {
            return Self::GraphQl(rest.trim().to_string());
        }
        if let Some(rest) = raw.strip_prefix("NOT_FOUND:") {
            return Self::NotFound(rest.trim().to_string());
        }
        if let Some(rest) = raw.strip_prefix("HTTP_") {
            if let Some((code, message)) = rest.split_once(':') {
                if let Ok(status) = code.trim().parse::<u16>() {
                    return Self::Http {
                        status,
                        message: message.trim().to_string(),
                    };
                }
            }
        }
        if is_too_many_requests(raw) {
            return Self::RateLimited(raw.to_string());
        }
        if raw.to_lowercase().contains("not found") {
            return Self::NotFound(raw.to_string());
        }
        Self::Other(raw.to_string())
    }

    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Short label used for metrics and structured log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited(_) => "rate_limited",
            Self::Http { .. } => "http",
            Self::GraphQl(_) => "graphql",
            Self::NotFound(_) => "not_found",
            Self::Malformed(_) => "malformed",
            Self::Network(_) => "network",
            Self::ResponseTooLarge { .. } => "too_large",
            Self::Other(_) => "other",
        }
    }
}

fn is_too_many_requests(body: &str) -> bool {
    body.to_lowercase().contains("too many requests")
}

fn preview(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= ERROR_BODY_PREVIEW {
        return trimmed.to_string();
    }
    let mut end = ERROR_BODY_PREVIEW;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &trimmed[..end])
}

/// Read a response body with size limit and deserialize as JSON.
///
/// Checks `Content-Length` hint first (if available), then enforces the
/// limit on the actual body bytes before deserializing.
pub async fn json_with_limit<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, UpstreamError> {
    if let Some(cl) = response.content_length() {
        if cl as usize > MAX_RESPONSE_SIZE {
            return Err(UpstreamError::ResponseTooLarge { size: cl });
        }
    }
    let bytes = response.bytes().await?;
    if bytes.len() > MAX_RESPONSE_SIZE {
        return Err(UpstreamError::ResponseTooLarge { size: bytes.len() as u64 });
    }
    serde_json::from_slice(&bytes).map_err(Into::into)
}

/// Check HTTP response status before processing body.
///
/// On failure the (truncated) body is folded into the classified error so
/// provider-specific "too many requests" bodies are recognised.
pub async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    let status = resp.status();
    if status.is_client_error() || status.is_server_error() {
        let url = resp.url().to_string();
        let body = resp.text().await.unwrap_or_default();
        let body = if body.trim().is_empty() { url } else { body };
        return Err(UpstreamError::from_status(status.as_u16(), &body));
    }
    Ok(resp)
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), &err.to_string());
        }
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for UpstreamError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        assert_eq!(
            UpstreamError::RateLimited("slow down".to_string()).to_string(),
            "RATE_LIMIT: slow down"
        );
        assert_eq!(
            UpstreamError::Http { status: 502, message: "bad gateway".to_string() }.to_string(),
            "HTTP_502: bad gateway"
        );
        assert_eq!(
            UpstreamError::GraphQl("field missing".to_string()).to_string(),
            "GRAPHQL: field missing"
        );
        assert_eq!(
            UpstreamError::NotFound("no anime".to_string()).to_string(),
            "NOT_FOUND: no anime"
        );
    }

    #[test]
    fn test_from_status_classification() {
        assert!(UpstreamError::from_status(429, "").is_rate_limited());
        assert!(UpstreamError::from_status(503, "Too Many Requests, try later").is_rate_limited());
        assert!(UpstreamError::from_status(404, "gone").is_not_found());
        assert_eq!(
            UpstreamError::from_status(500, "boom"),
            UpstreamError::Http { status: 500, message: "boom".to_string() }
        );
    }

    #[test]
    fn test_from_wire_parses_every_prefix() {
        assert_eq!(
            UpstreamError::from_wire("RATE_LIMIT: wait a bit"),
            UpstreamError::RateLimited("wait a bit".to_string())
        );
        assert_eq!(
            UpstreamError::from_wire("HTTP_503: upstream down"),
            UpstreamError::Http { status: 503, message: "upstream down".to_string() }
        );
        assert_eq!(
            UpstreamError::from_wire("GRAPHQL: Invalid id"),
            UpstreamError::GraphQl("Invalid id".to_string())
        );
        assert_eq!(
            UpstreamError::from_wire("NOT_FOUND: anime 21"),
            UpstreamError::NotFound("anime 21".to_string())
        );
    }

    #[test]
    fn test_from_wire_round_trips_display() {
        let original = UpstreamError::Http { status: 418, message: "teapot".to_string() };
        assert_eq!(UpstreamError::from_wire(&original.to_string()), original);
    }

    #[test]
    fn test_from_wire_unprefixed_messages() {
        assert!(UpstreamError::from_wire("Too many requests").is_rate_limited());
        assert!(UpstreamError::from_wire("Anime not found").is_not_found());
        assert_eq!(
            UpstreamError::from_wire("something odd"),
            UpstreamError::Other("something odd".to_string())
        );
        // A malformed HTTP prefix is not an HTTP error
        assert!(matches!(UpstreamError::from_wire("HTTP_abc: x"), UpstreamError::Other(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: UpstreamError = json_err.into();
        assert!(matches!(err, UpstreamError::Malformed(_)));
    }

    #[test]
    fn test_preview_truncates_long_bodies() {
        let body = "x".repeat(2_000);
        let err = UpstreamError::from_status(500, &body);
        let UpstreamError::Http { message, .. } = err else {
            panic!("expected http error");
        };
        assert!(message.len() < 600);
        assert!(message.ends_with('…'));
    }

    #[test]
    fn test_max_response_size() {
        assert_eq!(MAX_RESPONSE_SIZE, 16 * 1024 * 1024);
    }
}
