//! Stored match projections and the per-player sync cursor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PlayerIdentity, Region};

/// One row per unique match and tracked player.
///
/// Stat fields are `None` when the player could not be found in the
/// match roster; the row still records that the match exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: String,
    pub region: Region,
    pub name: String,
    pub tag: String,

    /// Upstream match start, not ingestion time
    pub started_at: Option<DateTime<Utc>>,

    pub mode: Option<String>,
    pub map: Option<String>,
    pub kills: Option<u32>,
    pub deaths: Option<u32>,
    pub assists: Option<u32>,
}

impl MatchRecord {
    /// Row key: match id plus the owning player's partition.
    pub fn key(&self) -> (String, String) {
        row_key(&self.match_id, self.region, &self.name, &self.tag)
    }

    /// Whether this row belongs to `identity`.
    ///
    /// Region is only compared when the identity carries one.
    pub fn belongs_to(&self, identity: &PlayerIdentity) -> bool {
        identity.matches(&self.name, &self.tag)
            && identity.region.map_or(true, |r| r == self.region)
    }

    pub fn has_stats(&self) -> bool {
        self.kills.is_some() && self.deaths.is_some()
    }
}

/// Richer per-match statistics for the tracked player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerMatchStats {
    pub match_id: String,

    /// Owning player's partition key (`region/name/tag`)
    pub player_key: String,

    pub character: Option<String>,
    pub rank: Option<String>,
    pub team: Option<String>,
    pub won: Option<bool>,
    pub score: Option<u32>,

    pub headshots: u32,
    pub bodyshots: u32,
    pub legshots: u32,

    pub credits_spent: Option<u32>,
    pub average_spent: Option<f64>,
    pub loadout_value: Option<u32>,
    pub average_loadout: Option<f64>,

    pub damage_made: Option<u32>,
    pub damage_received: Option<u32>,
}

impl PlayerMatchStats {
    pub fn key(&self) -> (String, String) {
        (self.match_id.clone(), self.player_key.clone())
    }
}

/// Bookmark of the newest fully ingested match for one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// Partition key (`region/name/tag`)
    pub player_key: String,

    /// Display identity the cursor was written for
    pub name: String,
    pub tag: String,
    pub region: Region,

    pub last_match_id: String,
    pub last_started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl SyncCursor {
    pub fn identity(&self) -> PlayerIdentity {
        PlayerIdentity {
            region: Some(self.region),
            name: self.name.clone(),
            tag: self.tag.clone(),
        }
    }
}

/// Build the composite row key for a match owned by a player.
pub fn row_key(match_id: &str, region: Region, name: &str, tag: &str) -> (String, String) {
    (
        match_id.to_string(),
        format!("{}/{}/{}", region, name.to_lowercase(), tag.to_lowercase()),
    )
}
