//! Upstream match-history response types.
//!
//! Only the fields we project are declared. Serde skips everything else
//! (round timelines, kill feeds, ability casts, ...) while parsing, so the
//! bulk of each match document never outlives the response buffer.

use serde::{Deserialize, Deserializer};

// ── Lenient scalar deserializers ────────────────────────────────────────────

/// Deserialize a value that may be a number or a string containing a number.
fn deserialize_string_or_number_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(val.and_then(|v| match v {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .and_then(|x| u32::try_from(x).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

fn deserialize_string_or_number_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(val.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

fn deserialize_string_or_number_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(val.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

// ── Response envelope ───────────────────────────────────────────────────────

/// `GET /valorant/v3/matches/{region}/{name}/{tag}` body.
#[derive(Debug, Deserialize)]
pub struct MatchHistoryResponse {
    #[serde(default)]
    pub status: Option<u16>,

    /// Matches, newest first
    #[serde(default)]
    pub data: Vec<MatchPayload>,
}

/// One upstream match, reduced to the parts we read.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchPayload {
    pub metadata: MatchMetadata,

    #[serde(default)]
    pub players: Option<Roster>,

    #[serde(default)]
    pub teams: Option<Teams>,
}

impl MatchPayload {
    pub fn match_id(&self) -> &str {
        &self.metadata.matchid
    }

    /// Every player in the match, across both teams.
    pub fn all_players(&self) -> &[RosterPlayer] {
        self.players
            .as_ref()
            .map(|p| p.all_players.as_slice())
            .unwrap_or(&[])
    }

    /// Whether the given team (e.g. `"Red"`) won, if reported.
    pub fn team_won(&self, team: &str) -> Option<bool> {
        let teams = self.teams.as_ref()?;
        let side = if team.eq_ignore_ascii_case("red") {
            teams.red.as_ref()
        } else if team.eq_ignore_ascii_case("blue") {
            teams.blue.as_ref()
        } else {
            None
        }?;
        side.has_won
    }
}

/// Match-level metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchMetadata {
    pub matchid: String,

    #[serde(default)]
    pub map: Option<String>,

    #[serde(default)]
    pub mode: Option<String>,

    /// Unix seconds
    #[serde(default, deserialize_with = "deserialize_string_or_number_i64")]
    pub game_start: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Roster {
    #[serde(default)]
    pub all_players: Vec<RosterPlayer>,
}

/// A player entry in a match roster.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RosterPlayer {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub tag: String,

    #[serde(default)]
    pub team: Option<String>,

    #[serde(default)]
    pub character: Option<String>,

    #[serde(default)]
    pub currenttier_patched: Option<String>,

    #[serde(default)]
    pub stats: Option<PlayerStatsBlock>,

    #[serde(default)]
    pub economy: Option<EconomyBlock>,

    #[serde(default, deserialize_with = "deserialize_string_or_number_u32")]
    pub damage_made: Option<u32>,

    #[serde(default, deserialize_with = "deserialize_string_or_number_u32")]
    pub damage_received: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayerStatsBlock {
    #[serde(default, deserialize_with = "deserialize_string_or_number_u32")]
    pub score: Option<u32>,

    #[serde(default, deserialize_with = "deserialize_string_or_number_u32")]
    pub kills: Option<u32>,

    #[serde(default, deserialize_with = "deserialize_string_or_number_u32")]
    pub deaths: Option<u32>,

    #[serde(default, deserialize_with = "deserialize_string_or_number_u32")]
    pub assists: Option<u32>,

    #[serde(default, deserialize_with = "deserialize_string_or_number_u32")]
    pub headshots: Option<u32>,

    #[serde(default, deserialize_with = "deserialize_string_or_number_u32")]
    pub bodyshots: Option<u32>,

    #[serde(default, deserialize_with = "deserialize_string_or_number_u32")]
    pub legshots: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EconomyBlock {
    #[serde(default)]
    pub spent: Option<OverallAverage>,

    #[serde(default)]
    pub loadout_value: Option<OverallAverage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OverallAverage {
    #[serde(default, deserialize_with = "deserialize_string_or_number_u32")]
    pub overall: Option<u32>,

    #[serde(default, deserialize_with = "deserialize_string_or_number_f64")]
    pub average: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Teams {
    #[serde(default)]
    pub red: Option<TeamResult>,

    #[serde(default)]
    pub blue: Option<TeamResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeamResult {
    #[serde(default)]
    pub has_won: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "status": 200,
        "data": [{
            "metadata": {
                "map": "Ascent",
                "game_start": 1700000000,
                "mode": "Competitive",
                "matchid": "abc-123",
                "region": "na",
                "rounds_played": 24
            },
            "players": {
                "all_players": [{
                    "name": "Ollie",
                    "tag": "Chaos",
                    "team": "Red",
                    "character": "Jett",
                    "currenttier_patched": "Gold 2",
                    "stats": {"score": 5200, "kills": 21, "deaths": "15", "assists": 4,
                              "bodyshots": 60, "headshots": 18, "legshots": 2},
                    "economy": {"spent": {"overall": 78000, "average": 3250.5},
                                "loadout_value": {"overall": 90000, "average": 3750}},
                    "damage_made": 3400,
                    "damage_received": 2900.0,
                    "ability_casts": {"c_cast": 10}
                }],
                "red": [], "blue": []
            },
            "teams": {"red": {"has_won": true, "rounds_won": 13}, "blue": {"has_won": false}},
            "rounds": [{"winning_team": "Red", "player_stats": [{"damage_events": []}]}],
            "kills": [{"kill_time_in_round": 1000}]
        }]
    }"#;

    #[test]
    fn test_deserialize_history_ignores_heavy_fields() {
        let resp: MatchHistoryResponse = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(resp.status, Some(200));
        assert_eq!(resp.data.len(), 1);

        let m = &resp.data[0];
        assert_eq!(m.match_id(), "abc-123");
        assert_eq!(m.metadata.map.as_deref(), Some("Ascent"));
        assert_eq!(m.metadata.game_start, Some(1_700_000_000));

        let p = &m.all_players()[0];
        let stats = p.stats.as_ref().unwrap();
        assert_eq!(stats.kills, Some(21));
        assert_eq!(stats.deaths, Some(15));
        assert_eq!(p.damage_received, Some(2900));

        let spent = p.economy.as_ref().unwrap().spent.as_ref().unwrap();
        assert_eq!(spent.overall, Some(78000));
        assert_eq!(spent.average, Some(3250.5));
    }

    #[test]
    fn test_team_won() {
        let resp: MatchHistoryResponse = serde_json::from_str(SAMPLE).unwrap();
        let m = &resp.data[0];
        assert_eq!(m.team_won("Red"), Some(true));
        assert_eq!(m.team_won("blue"), Some(false));
        assert_eq!(m.team_won("Neutral"), None);
    }

    #[test]
    fn test_missing_roster_is_empty() {
        let m: MatchPayload =
            serde_json::from_str(r#"{"metadata": {"matchid": "x"}}"#).unwrap();
        assert!(m.all_players().is_empty());
        assert!(m.metadata.game_start.is_none());
    }

    #[test]
    fn test_empty_data() {
        let resp: MatchHistoryResponse = serde_json::from_str(r#"{"status": 200}"#).unwrap();
        assert!(resp.data.is_empty());
    }
}
