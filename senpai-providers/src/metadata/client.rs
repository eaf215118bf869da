//! AniList GraphQL client

use std::time::Duration;

use serde_json::json;

use super::types::{GraphQlError, GraphQlResponse, MediaData, MediaIdentity};
use crate::api_client::{ApiClient, RequestSpec};
use crate::error::{check_response, json_with_limit, UpstreamError};

/// Logical host name used for rate limiting and metrics.
pub const ANILIST_HOST: &str = "anilist";

pub const DEFAULT_METADATA_URL: &str = "https://graphql.anilist.co";

const MEDIA_IDENTITY_QUERY: &str = r"
query ($id: Int) {
  Media(id: $id, type: ANIME) {
    id
    idMal
    title { romaji english }
    episodes
  }
}";

/// AniList GraphQL client
#[derive(Debug, Clone)]
pub struct MetadataClient {
    api: ApiClient,
    endpoint: String,
    ttl: Duration,
}

impl MetadataClient {
    #[must_use]
    pub fn new(api: ApiClient, endpoint: impl Into<String>, ttl: Duration) -> Self {
        Self {
            api,
            endpoint: endpoint.into(),
            ttl,
        }
    }

    /// Look up the identity fields for an AniList id.
    pub async fn media_identity(&self, anilist_id: u64) -> Result<MediaIdentity, UpstreamError> {
        let variables = json!({ "id": anilist_id });
        let body = json!({ "query": MEDIA_IDENTITY_QUERY, "variables": variables });
        let endpoint = self.endpoint.clone();

        let spec = RequestSpec::new(ANILIST_HOST, "anilist.media_identity", variables).cached(self.ttl);

        self.api
            .request(spec, |http| async move {
                let resp = http
                    .post(endpoint)
                    .header(reqwest::header::ACCEPT, "application/json")
                    .json(&body)
                    .send()
                    .await?;

                // AniList reports GraphQL errors with a non-2xx status and a
                // JSON body; prefer the structured errors when present.
                if !resp.status().is_success() {
                    let status = resp.status().as_u16();
                    let text = resp.text().await.unwrap_or_default();
                    if let Ok(parsed) = serde_json::from_str::<GraphQlResponse<MediaData>>(&text) {
                        if let Some(err) = parsed.errors.first() {
                            return Err(classify_graphql_error(err, Some(status)));
                        }
                    }
                    return Err(UpstreamError::from_status(status, &text));
                }

                let resp = check_response(resp).await?;
                let parsed: GraphQlResponse<MediaData> = json_with_limit(resp).await?;
                if let Some(err) = parsed.errors.first() {
                    return Err(classify_graphql_error(err, None));
                }
                parsed
                    .data
                    .and_then(|d| d.media)
                    .ok_or_else(|| UpstreamError::NotFound(format!("no media for AniList id {anilist_id}")))
            })
            .await
    }
}

fn classify_graphql_error(err: &GraphQlError, http_status: Option<u16>) -> UpstreamError {
    let message = if err.message.trim().is_empty() {
        "unknown GraphQL error".to_string()
    } else {
        err.message.trim().to_string()
    };
    match err.status.or(http_status) {
        Some(404) => UpstreamError::NotFound(message),
        Some(429) => UpstreamError::RateLimited(message),
        _ if message.to_lowercase().contains("too many requests") => UpstreamError::RateLimited(message),
        _ => UpstreamError::GraphQl(message),
    }
}
