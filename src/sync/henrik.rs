//! HenrikDev Valorant API client.
//!
//! All API specifics (paths, query names, envelope) live here so endpoint
//! changes are easy to fix.

use async_trait::async_trait;
use tracing::{debug, info};
use url::Url;

use super::payload::{MatchHistoryResponse, MatchPayload};
use super::source::MatchSource;
use crate::fetch::{FetchError, Fetcher};
use crate::models::Region;

/// Public API base.
pub const DEFAULT_API_BASE: &str = "https://api.henrikdev.xyz";

/// Largest page the match-history endpoint serves.
pub const MAX_PAGE_SIZE: usize = 10;

/// Match-history client.
pub struct HenrikClient {
    fetcher: Fetcher,
    api_base: String,
}

impl HenrikClient {
    pub fn new(fetcher: Fetcher, api_base: impl Into<String>) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Self { fetcher, api_base }
    }

    /// `{base}/valorant/v3/matches/{region}/{name}/{tag}?size=..&mode=..`
    pub fn history_url(
        &self,
        region: Region,
        name: &str,
        tag: &str,
        page_size: usize,
        mode: &str,
    ) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| FetchError::InvalidUrl(format!("Bad API base: {}", e)))?;

        url.path_segments_mut()
            .map_err(|_| FetchError::InvalidUrl(format!("API base cannot be a base: {}", self.api_base)))?
            .pop_if_empty()
            .extend(["valorant", "v3", "matches", region.as_str(), name, tag]);

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("size", &page_size.clamp(1, MAX_PAGE_SIZE).to_string());
            if !mode.is_empty() {
                query.append_pair("mode", mode);
            }
        }

        Ok(url)
    }
}

#[async_trait]
impl MatchSource for HenrikClient {
    fn name(&self) -> &'static str {
        "henrikdev"
    }

    async fn fetch(
        &self,
        region: Region,
        name: &str,
        tag: &str,
        page_size: usize,
        mode: &str,
    ) -> Result<Vec<MatchPayload>, FetchError> {
        let url = self.history_url(region, name, tag, page_size, mode)?;
        debug!(
            "Match history request for {}#{} in {} (timeout {:?})",
            name,
            tag,
            region,
            self.fetcher.timeout()
        );

        let response: MatchHistoryResponse = self.fetcher.get_json(&url).await?;

        if let Some(status) = response.status.filter(|s| *s >= 400) {
            return Err(FetchError::HttpStatus {
                status,
                message: "error status in response envelope".to_string(),
            });
        }

        info!(
            "{}: {} matches for {}#{} in {}",
            self.name(),
            response.data.len(),
            name,
            tag,
            region
        );
        Ok(response.data)
    }
}
