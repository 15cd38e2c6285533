//! Project upstream match payloads onto stored rows.
//!
//! The projection is fixed: match metadata plus the tracked player's
//! combat, shot placement, economy and damage figures. Nothing else from
//! the payload is kept.

use chrono::{DateTime, Utc};

use super::payload::{MatchPayload, RosterPlayer};
use crate::models::{row_key, MatchRecord, PlayerMatchStats, Region};

/// Rows produced from one match for one player.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub record: MatchRecord,

    /// `None` when the player is missing from the roster
    pub stats: Option<PlayerMatchStats>,
}

/// Convert an upstream start time (unix seconds) to a timestamp.
pub fn started_at(payload: &MatchPayload) -> Option<DateTime<Utc>> {
    payload
        .metadata
        .game_start
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
}

/// Find the tracked player in the roster.
///
/// Name and tag compare with full Unicode case folding, the same way
/// storage keys are lowercased.
pub fn find_player<'a>(payload: &'a MatchPayload, name: &str, tag: &str) -> Option<&'a RosterPlayer> {
    let name = name.trim().to_lowercase();
    let tag = tag.trim().to_lowercase();
    payload
        .all_players()
        .iter()
        .find(|p| p.name.trim().to_lowercase() == name && p.tag.trim().to_lowercase() == tag)
}

/// Project a match for the player identified by `region`, `name`, `tag`.
///
/// A player missing from the roster still yields a record, with empty
/// stat fields.
pub fn project(payload: &MatchPayload, region: Region, name: &str, tag: &str) -> Projection {
    let player = find_player(payload, name, tag);
    let stats_block = player.and_then(|p| p.stats.as_ref());

    let record = MatchRecord {
        match_id: payload.match_id().to_string(),
        region,
        name: name.to_string(),
        tag: tag.to_string(),
        started_at: started_at(payload),
        mode: payload.metadata.mode.clone(),
        map: payload.metadata.map.clone(),
        kills: stats_block.and_then(|s| s.kills),
        deaths: stats_block.and_then(|s| s.deaths),
        assists: stats_block.and_then(|s| s.assists),
    };

    let stats = player.map(|p| {
        let (_, player_key) = row_key(payload.match_id(), region, name, tag);
        let economy = p.economy.as_ref();
        let spent = economy.and_then(|e| e.spent.as_ref());
        let loadout = economy.and_then(|e| e.loadout_value.as_ref());

        PlayerMatchStats {
            match_id: payload.match_id().to_string(),
            player_key,
            character: p.character.clone(),
            rank: p.currenttier_patched.clone(),
            team: p.team.clone(),
            won: p.team.as_deref().and_then(|t| payload.team_won(t)),
            score: stats_block.and_then(|s| s.score),
            headshots: stats_block.and_then(|s| s.headshots).unwrap_or(0),
            bodyshots: stats_block.and_then(|s| s.bodyshots).unwrap_or(0),
            legshots: stats_block.and_then(|s| s.legshots).unwrap_or(0),
            credits_spent: spent.and_then(|s| s.overall),
            average_spent: spent.and_then(|s| s.average),
            loadout_value: loadout.and_then(|l| l.overall),
            average_loadout: loadout.and_then(|l| l.average),
            damage_made: p.damage_made,
            damage_received: p.damage_received,
        }
    });

    Projection { record, stats }
}
