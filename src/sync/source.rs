//! The upstream match source seam.

use async_trait::async_trait;

use super::payload::MatchPayload;
use crate::fetch::FetchError;
use crate::models::Region;

/// A provider of recent match history for a player.
#[async_trait]
pub trait MatchSource: Send + Sync {
    /// Source name for logging.
    fn name(&self) -> &'static str;

    /// Fetch up to `page_size` of the player's most recent matches, newest first.
    async fn fetch(
        &self,
        region: Region,
        name: &str,
        tag: &str,
        page_size: usize,
        mode: &str,
    ) -> Result<Vec<MatchPayload>, FetchError>;
}
