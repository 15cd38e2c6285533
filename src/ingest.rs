//! Offline ingestion of saved match-history documents.
//!
//! A saved upstream response is served through the same sync engine as live
//! data, so the projection, dedup and cursor rules are identical.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::fetch::FetchError;
use crate::models::{PlayerIdentity, Region};
use crate::storage::MatchStore;
use crate::sync::payload::{MatchHistoryResponse, MatchPayload};
use crate::sync::source::MatchSource;
use crate::sync::{SyncEngine, SyncError, SyncOutcome, SyncSettings};

/// Errors that can occur while ingesting a fixture.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to read fixture: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse fixture: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Match source backed by one saved match-history response.
///
/// Serves its matches for a single region and nothing elsewhere.
pub struct FixtureSource {
    region: Region,
    matches: Vec<MatchPayload>,
}

impl FixtureSource {
    pub fn new(region: Region, matches: Vec<MatchPayload>) -> Self {
        Self { region, matches }
    }

    /// Parse a saved `{ "status": .., "data": [..] }` document.
    pub fn from_json(region: Region, json: &str) -> Result<Self, IngestError> {
        let response: MatchHistoryResponse = serde_json::from_str(json)?;
        Ok(Self::new(region, response.data))
    }

    pub fn from_file(region: Region, path: &Path) -> Result<Self, IngestError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(region, &contents)
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

#[async_trait]
impl MatchSource for FixtureSource {
    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn fetch(
        &self,
        region: Region,
        _name: &str,
        _tag: &str,
        page_size: usize,
        _mode: &str,
    ) -> Result<Vec<MatchPayload>, FetchError> {
        if region != self.region {
            debug!("Fixture holds {} data, not {}", self.region, region);
            return Ok(Vec::new());
        }
        Ok(self.matches.iter().take(page_size).cloned().collect())
    }
}

/// Run a saved response for `identity` through the sync engine.
///
/// The whole document is treated as one page, so it may hold more matches
/// than the live API serves at once.
pub async fn ingest_fixture(
    path: &Path,
    identity: &mut PlayerIdentity,
    region: Region,
    store: Arc<MatchStore>,
    settings: &SyncSettings,
) -> Result<SyncOutcome, IngestError> {
    info!("Ingesting fixture {:?} for {}", path, identity.riot_id());

    let source = FixtureSource::from_file(region, path)?;
    let settings = SyncSettings {
        page_size: source.len().max(1),
        regions: vec![region],
        ..settings.clone()
    };

    identity.region = Some(region);
    let engine = SyncEngine::new(Arc::new(source), store, settings);
    let outcome = engine.sync(identity).await?;

    info!(
        "Fixture ingest for {}: {} inserted, {} shells",
        identity, outcome.inserted, outcome.shells
    );
    Ok(outcome)
}
