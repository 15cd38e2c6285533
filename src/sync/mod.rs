//! Incremental match synchronization.
//!
//! One sync pass for a player:
//! 1. Resolve the region by probing candidates in order, if unknown
//! 2. Read the player's cursor (absent on first sync)
//! 3. Fetch the newest page of matches
//! 4. Walk newest-first, stopping at the cursor's match
//! 5. Project each new match and write its record and stats
//! 6. Move the cursor to the newest observed match
//!
//! The walk assumes upstream pages are newest-first without gaps. A match
//! that appears below the cursor's match later is never picked up.

pub mod convert;
pub mod henrik;
pub mod payload;
pub mod source;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::context::ActivePlayerContext;
use crate::fetch::FetchError;
use crate::models::{PlayerIdentity, Region};
use crate::storage::{MatchStore, StorageError};

use self::convert::{project, started_at};
use self::payload::MatchPayload;
use self::source::MatchSource;

/// Errors that can occur during sync.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Could not find {identity} in any region (tried {tried})")]
    RegionUnresolved { identity: String, tried: String },

    #[error("Upstream error: {0}")]
    Upstream(#[from] FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("No active player in this session")]
    NoActivePlayer,
}

impl SyncError {
    /// Whether the same call may succeed later without user input.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Upstream(e) => e.is_transient(),
            SyncError::Storage(_) => true,
            SyncError::RegionUnresolved { .. } | SyncError::NoActivePlayer => false,
        }
    }
}

/// Settings for sync passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Matches per history page
    pub page_size: usize,

    /// Matches per region probe
    pub probe_page_size: usize,

    /// Upstream queue filter (e.g. "competitive")
    pub mode: String,

    /// Region probe order
    pub regions: Vec<Region>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: henrik::MAX_PAGE_SIZE,
            probe_page_size: 1,
            mode: "competitive".to_string(),
            regions: Region::PROBE_ORDER.to_vec(),
        }
    }
}

/// Result of a sync pass.
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    /// Region the pass ran against
    pub resolved_region: Region,

    /// Whether the region was discovered during this pass
    pub region_probed: bool,

    /// Matches returned by upstream
    pub observed: usize,

    /// New match records written
    pub inserted: usize,

    /// Stats rows written or refreshed
    pub stats_upserted: usize,

    /// Matches stored without stats (player missing from roster)
    pub shells: usize,

    /// Whether the walk stopped at the cursor's match
    pub stopped_at_known: bool,

    /// Cursor match id after the pass
    pub cursor_match_id: Option<String>,

    #[serde(skip)]
    pub duration: Duration,
}

/// Incremental sync engine.
pub struct SyncEngine {
    source: Arc<dyn MatchSource>,
    store: Arc<MatchStore>,
    settings: SyncSettings,
}

impl SyncEngine {
    pub fn new(source: Arc<dyn MatchSource>, store: Arc<MatchStore>, settings: SyncSettings) -> Self {
        Self {
            source,
            store,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<MatchStore> {
        &self.store
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Sync the session's active player, writing a resolved region back.
    pub async fn sync_active(&self, ctx: &mut ActivePlayerContext) -> Result<SyncOutcome, SyncError> {
        let session = ctx.session_id();
        let identity = ctx.active_mut().ok_or(SyncError::NoActivePlayer)?;
        debug!(session = %session, "Syncing active player {}", identity);
        self.sync(identity).await
    }

    /// Run one sync pass for `identity`.
    ///
    /// When the identity has no region, the region found by probing is
    /// stored on it before any match is fetched.
    pub async fn sync(&self, identity: &mut PlayerIdentity) -> Result<SyncOutcome, SyncError> {
        let start = Instant::now();

        let (region, region_probed, probe_page) = match identity.region {
            Some(region) => (region, false, None),
            None => {
                let (region, page) = self.resolve_region(identity).await?;
                identity.region = Some(region);
                (region, true, Some(page))
            }
        };

        let cursor = self.store.cursor(identity).await?;
        let known_id = cursor.as_ref().map(|c| c.last_match_id.clone());
        if known_id.is_none() {
            info!("First sync for {}", identity);
        }

        let page = match probe_page {
            Some(page) if self.settings.probe_page_size >= self.settings.page_size => page,
            _ => {
                self.source
                    .fetch(
                        region,
                        &identity.name,
                        &identity.tag,
                        self.settings.page_size,
                        &self.settings.mode,
                    )
                    .await?
            }
        };

        let mut outcome = SyncOutcome {
            resolved_region: region,
            region_probed,
            observed: page.len(),
            inserted: 0,
            stats_upserted: 0,
            shells: 0,
            stopped_at_known: false,
            cursor_match_id: known_id.clone(),
            duration: Duration::ZERO,
        };

        let mut writes = self.store.begin_writes().await?;
        for payload in &page {
            if known_id.as_deref() == Some(payload.match_id()) {
                debug!("Reached known match {}, stopping", payload.match_id());
                outcome.stopped_at_known = true;
                break;
            }

            let projection = project(payload, region, &identity.name, &identity.tag);

            if writes.insert_record_if_absent(&projection.record)? {
                outcome.inserted += 1;
            }

            match projection.stats {
                Some(stats) => {
                    writes.upsert_stats(&stats)?;
                    outcome.stats_upserted += 1;
                }
                None => {
                    warn!(
                        "{} not found in roster of match {}, stored without stats",
                        identity.riot_id(),
                        payload.match_id()
                    );
                    outcome.shells += 1;
                }
            }
        }
        writes.finish()?;

        if let Some(newest) = page.first() {
            if known_id.as_deref() != Some(newest.match_id()) {
                let cursor = self
                    .store
                    .advance_cursor(identity, newest.match_id(), started_at(newest))
                    .await?;
                outcome.cursor_match_id = Some(cursor.last_match_id);
            }
        }

        outcome.duration = start.elapsed();
        info!(
            "Sync for {} completed: {} observed, {} inserted, {} shells in {:?}",
            identity, outcome.observed, outcome.inserted, outcome.shells, outcome.duration
        );

        Ok(outcome)
    }

    /// Probe candidate regions in order until one returns matches.
    async fn resolve_region(
        &self,
        identity: &PlayerIdentity,
    ) -> Result<(Region, Vec<MatchPayload>), SyncError> {
        for &region in &self.settings.regions {
            debug!("Probing {} for {}", region, identity.riot_id());

            match self
                .source
                .fetch(
                    region,
                    &identity.name,
                    &identity.tag,
                    self.settings.probe_page_size,
                    &self.settings.mode,
                )
                .await
            {
                Ok(page) if !page.is_empty() => {
                    info!("Resolved {} to region {}", identity.riot_id(), region);
                    return Ok((region, page));
                }
                Ok(_) => debug!("No matches for {} in {}", identity.riot_id(), region),
                Err(e) => warn!("Probe of {} for {} failed: {}", region, identity.riot_id(), e),
            }
        }

        let tried = self
            .settings
            .regions
            .iter()
            .map(Region::as_str)
            .collect::<Vec<_>>()
            .join(", ");

        Err(SyncError::RegionUnresolved {
            identity: identity.riot_id(),
            tried,
        })
    }
}
