//! Statistics calculation engine.
//!
//! Computes derived metrics from stored match data for one player:
//! - Kill/death ratio over a window of recent matches
//! - Per-match averages (combat, damage, economy)
//! - Headshot rate, win rate and most played character
//!
//! Everything here is a read over the match store. Nothing is fetched.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::models::{
    Aggregate, Averages, Kdr, KdrReport, MatchRecord, PlayerIdentity, PlayerMatchStats, Summary,
    Window,
};
use crate::storage::{MatchStore, StorageError};

/// Round to 2 decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Calculate KDR from window totals.
///
/// Zero deaths is `Infinite` when there were kills and `0` when there were none.
pub fn calculate_kdr(kills: u32, deaths: u32) -> Kdr {
    match (kills, deaths) {
        (0, 0) => Kdr::Ratio(0.0),
        (_, 0) => Kdr::Infinite,
        (k, d) => Kdr::Ratio(round2(k as f64 / d as f64)),
    }
}

/// Headshot percentage of all hits, 0 when no hits were recorded.
pub fn calculate_headshot_rate(headshots: u32, bodyshots: u32, legshots: u32) -> f64 {
    let total = headshots as u64 + bodyshots as u64 + legshots as u64;
    if total == 0 {
        0.0
    } else {
        round2(headshots as f64 / total as f64 * 100.0)
    }
}

/// Pick the most recent `last_n` records, optionally on one map.
///
/// Records without a start time sort after all dated ones.
pub fn select_window(mut records: Vec<MatchRecord>, window: &Window) -> Vec<MatchRecord> {
    if let Some(map) = window.map.as_deref() {
        let map = map.trim().to_lowercase();
        records.retain(|r| r.map.as_deref().is_some_and(|m| m.to_lowercase() == map));
    }

    records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    records.truncate(window.last_n);
    records
}

fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| round2(sum / count as f64))
}

fn most_common<'a, I>(values: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .max_by(|(a, ca), (b, cb)| ca.cmp(cb).then_with(|| b.cmp(a)))
        .map(|(value, _)| value.to_string())
}

/// Build `Averages` from the stat-bearing records of a window and their stats rows.
fn averages(records: &[&MatchRecord], stats: &[&PlayerMatchStats]) -> Averages {
    let kills: u32 = records.iter().filter_map(|r| r.kills).sum();
    let deaths: u32 = records.iter().filter_map(|r| r.deaths).sum();

    let headshots = stats.iter().map(|s| s.headshots).sum();
    let bodyshots = stats.iter().map(|s| s.bodyshots).sum();
    let legshots = stats.iter().map(|s| s.legshots).sum();

    Averages {
        kills: mean(records.iter().filter_map(|r| r.kills).map(f64::from)).unwrap_or(0.0),
        deaths: mean(records.iter().filter_map(|r| r.deaths).map(f64::from)).unwrap_or(0.0),
        assists: mean(records.iter().filter_map(|r| r.assists).map(f64::from)).unwrap_or(0.0),
        kdr: calculate_kdr(kills, deaths),
        headshot_rate: calculate_headshot_rate(headshots, bodyshots, legshots),
        score: mean(stats.iter().filter_map(|s| s.score).map(f64::from)),
        damage_made: mean(stats.iter().filter_map(|s| s.damage_made).map(f64::from)),
        damage_received: mean(stats.iter().filter_map(|s| s.damage_received).map(f64::from)),
        credits_spent: mean(stats.iter().filter_map(|s| s.credits_spent).map(f64::from)),
        loadout_value: mean(stats.iter().filter_map(|s| s.loadout_value).map(f64::from)),
    }
}

/// Answers metric questions for a player from stored matches.
pub struct AnalyticsAggregator {
    store: Arc<MatchStore>,
}

impl AnalyticsAggregator {
    pub fn new(store: Arc<MatchStore>) -> Self {
        Self { store }
    }

    /// The records a window selects for `identity`, newest first.
    ///
    /// Includes matches stored without stats.
    pub async fn recent_matches(
        &self,
        identity: &PlayerIdentity,
        window: &Window,
    ) -> Result<Vec<MatchRecord>, StorageError> {
        let records = self.store.records_for(identity).await?;
        let selected = select_window(records, window);
        debug!("Selected {} matches for {}", selected.len(), identity);
        Ok(selected)
    }

    /// Average KDR over the window, summing kills and deaths first.
    pub async fn average_kdr(
        &self,
        identity: &PlayerIdentity,
        window: &Window,
    ) -> Result<Aggregate<KdrReport>, StorageError> {
        let selected = self.recent_matches(identity, window).await?;
        let counted: Vec<&MatchRecord> = selected.iter().filter(|r| r.has_stats()).collect();

        if counted.is_empty() {
            return Ok(Aggregate::NoData);
        }

        let kills = counted.iter().filter_map(|r| r.kills).sum();
        let deaths = counted.iter().filter_map(|r| r.deaths).sum();

        Ok(Aggregate::Data(KdrReport {
            matches_considered: counted.len(),
            kills,
            deaths,
            kdr: calculate_kdr(kills, deaths),
        }))
    }

    /// Per-match averages and rates over the window.
    pub async fn summarize(
        &self,
        identity: &PlayerIdentity,
        window: &Window,
    ) -> Result<Aggregate<Summary>, StorageError> {
        let selected = self.recent_matches(identity, window).await?;
        let counted: Vec<&MatchRecord> = selected.iter().filter(|r| r.has_stats()).collect();

        if counted.is_empty() {
            return Ok(Aggregate::NoData);
        }

        let by_key = self.store.stats_for(&selected).await?;
        let stats: Vec<&PlayerMatchStats> = counted
            .iter()
            .filter_map(|r| by_key.get(&r.key()))
            .collect();

        let outcomes: Vec<bool> = stats.iter().filter_map(|s| s.won).collect();
        let win_rate = (!outcomes.is_empty()).then(|| {
            let wins = outcomes.iter().filter(|&&won| won).count();
            round2(wins as f64 / outcomes.len() as f64)
        });

        Ok(Aggregate::Data(Summary {
            matches_considered: counted.len(),
            averages: averages(&counted, &stats),
            win_rate,
            most_played_character: most_common(stats.iter().filter_map(|s| s.character.as_deref())),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ActivePlayerContext;
    use crate::models::Region;
    use crate::storage::StorageConfig;
    use crate::sync::convert::project;
    use crate::sync::source::mock::payload;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn aggregator(temp_dir: &TempDir) -> (AnalyticsAggregator, Arc<MatchStore>) {
        let store = Arc::new(MatchStore::new(StorageConfig::new(
            temp_dir.path().to_path_buf(),
        )));
        (AnalyticsAggregator::new(store.clone()), store)
    }

    fn player(id: &str) -> PlayerIdentity {
        PlayerIdentity::parse(id).unwrap().with_region(Region::Na)
    }

    async fn seed(
        store: &MatchStore,
        id: &PlayerIdentity,
        match_id: &str,
        hour: i64,
        map: &str,
        kda: (u32, u32, u32),
    ) {
        let p = payload(
            match_id,
            1_700_000_000 + hour * 3600,
            map,
            &[(id.name.as_str(), id.tag.as_str(), kda.0, kda.1, kda.2)],
        );
        let proj = project(&p, Region::Na, &id.name, &id.tag);
        store.insert_record_if_absent(&proj.record).await.unwrap();
        if let Some(stats) = proj.stats {
            store.upsert_stats(&stats).await.unwrap();
        }
    }

    #[test]
    fn test_calculate_kdr() {
        assert_eq!(calculate_kdr(10, 0), Kdr::Infinite);
        assert_eq!(calculate_kdr(0, 0), Kdr::Ratio(0.0));
        assert_eq!(calculate_kdr(0, 7), Kdr::Ratio(0.0));
        assert_eq!(calculate_kdr(25, 10), Kdr::Ratio(2.5));
        assert_eq!(calculate_kdr(7, 3), Kdr::Ratio(2.33));
        assert_eq!(calculate_kdr(2, 3), Kdr::Ratio(0.67));
    }

    #[test]
    fn test_calculate_headshot_rate() {
        assert_eq!(calculate_headshot_rate(0, 0, 0), 0.0);
        assert_eq!(calculate_headshot_rate(10, 30, 0), 25.0);
        assert!((calculate_headshot_rate(1, 1, 1) - 33.33).abs() < 0.01);
    }

    #[test]
    fn test_most_common_breaks_ties_alphabetically() {
        assert_eq!(most_common(["Sova", "Jett", "Sova"]), Some("Sova".to_string()));
        assert_eq!(most_common(["Sova", "Jett"]), Some("Jett".to_string()));
        assert_eq!(most_common(std::iter::empty::<&str>()), None);
    }

    #[test]
    fn test_select_window_orders_and_filters() {
        let mk = |id: &str, hour: Option<i64>, map: &str| MatchRecord {
            match_id: id.to_string(),
            region: Region::Na,
            name: "ollie".to_string(),
            tag: "chaos".to_string(),
            started_at: hour.and_then(|h| chrono::DateTime::<chrono::Utc>::from_timestamp(h * 3600, 0)),
            mode: None,
            map: Some(map.to_string()),
            kills: Some(1),
            deaths: Some(1),
            assists: Some(0),
        };

        let records = vec![
            mk("undated", None, "Bind"),
            mk("old", Some(1), "Bind"),
            mk("new", Some(3), "Ascent"),
            mk("mid", Some(2), "bind"),
        ];

        let ids = |rs: Vec<MatchRecord>| rs.into_iter().map(|r| r.match_id).collect::<Vec<_>>();

        assert_eq!(
            ids(select_window(records.clone(), &Window::last(10))),
            vec!["new", "mid", "old", "undated"]
        );
        assert_eq!(
            ids(select_window(records.clone(), &Window::last(2))),
            vec!["new", "mid"]
        );
        assert_eq!(
            ids(select_window(records, &Window::last(10).on_map("BIND"))),
            vec!["mid", "old", "undated"]
        );
    }

    #[tokio::test]
    async fn test_average_kdr_no_data() {
        let temp_dir = TempDir::new().unwrap();
        let (agg, _) = aggregator(&temp_dir);

        let result = agg.average_kdr(&player("ollie#chaos"), &Window::default()).await.unwrap();
        assert!(result.is_no_data());

        let summary = agg.summarize(&player("ollie#chaos"), &Window::default()).await.unwrap();
        assert!(summary.is_no_data());
    }

    #[tokio::test]
    async fn test_average_kdr_sums_window() {
        let temp_dir = TempDir::new().unwrap();
        let (agg, store) = aggregator(&temp_dir);
        let id = player("ollie#chaos");

        seed(&store, &id, "m1", 1, "Bind", (30, 10, 2)).await;
        seed(&store, &id, "m2", 2, "Ascent", (10, 20, 4)).await;
        seed(&store, &id, "m3", 3, "Bind", (5, 5, 1)).await;

        let all = agg.average_kdr(&id, &Window::default()).await.unwrap();
        let report = all.data().unwrap();
        assert_eq!(report.matches_considered, 3);
        assert_eq!(report.kills, 45);
        assert_eq!(report.deaths, 35);
        assert_eq!(report.kdr, Kdr::Ratio(1.29));

        let bind = agg
            .average_kdr(&id, &Window::last(10).on_map("bind"))
            .await
            .unwrap();
        assert_eq!(bind.data().unwrap().kdr, Kdr::Ratio(2.33));

        let last_one = agg.average_kdr(&id, &Window::last(1)).await.unwrap();
        assert_eq!(last_one.data().unwrap().kdr, Kdr::Ratio(1.0));

        let haven = agg
            .average_kdr(&id, &Window::last(10).on_map("Haven"))
            .await
            .unwrap();
        assert!(haven.is_no_data());
    }

    #[tokio::test]
    async fn test_average_kdr_no_deaths() {
        let temp_dir = TempDir::new().unwrap();
        let (agg, store) = aggregator(&temp_dir);
        let id = player("ollie#chaos");

        seed(&store, &id, "m1", 1, "Bind", (10, 0, 0)).await;
        let result = agg.average_kdr(&id, &Window::default()).await.unwrap();
        assert_eq!(result.data().unwrap().kdr, Kdr::Infinite);
    }

    #[tokio::test]
    async fn test_zero_kills_zero_deaths_is_zero_not_no_data() {
        let temp_dir = TempDir::new().unwrap();
        let (agg, store) = aggregator(&temp_dir);
        let id = player("ollie#chaos");

        seed(&store, &id, "m1", 1, "Bind", (0, 0, 0)).await;
        let result = agg.average_kdr(&id, &Window::default()).await.unwrap();
        assert_eq!(result.data().unwrap().kdr, Kdr::Ratio(0.0));
    }

    #[tokio::test]
    async fn test_shells_take_slots_but_add_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let (agg, store) = aggregator(&temp_dir);
        let id = player("ollie#chaos");

        seed(&store, &id, "m1", 1, "Bind", (20, 10, 0)).await;

        // Newest match stored without stats
        let p = payload("m2", 1_700_000_000 + 2 * 3600, "Bind", &[("x", "y", 1, 1, 1)]);
        let shell = project(&p, Region::Na, "ollie", "chaos");
        store.insert_record_if_absent(&shell.record).await.unwrap();

        assert_eq!(agg.recent_matches(&id, &Window::default()).await.unwrap().len(), 2);
        assert!(agg.average_kdr(&id, &Window::last(1)).await.unwrap().is_no_data());

        let both = agg.average_kdr(&id, &Window::last(2)).await.unwrap();
        assert_eq!(both.data().unwrap().matches_considered, 1);
        assert_eq!(both.data().unwrap().kdr, Kdr::Ratio(2.0));
    }

    #[tokio::test]
    async fn test_summarize() {
        let temp_dir = TempDir::new().unwrap();
        let (agg, store) = aggregator(&temp_dir);
        let id = player("ollie#chaos");

        seed(&store, &id, "m1", 1, "Bind", (20, 10, 4)).await;
        seed(&store, &id, "m2", 2, "Bind", (10, 10, 2)).await;

        let summary = agg.summarize(&id, &Window::default()).await.unwrap();
        let summary = summary.data().unwrap();

        assert_eq!(summary.matches_considered, 2);
        assert_eq!(summary.averages.kills, 15.0);
        assert_eq!(summary.averages.deaths, 10.0);
        assert_eq!(summary.averages.assists, 3.0);
        assert_eq!(summary.averages.kdr, Kdr::Ratio(1.5));
        assert_eq!(summary.averages.headshot_rate, 25.0);
        assert_eq!(summary.averages.score, Some(3750.0));
        assert_eq!(summary.averages.damage_made, Some(2250.0));
        assert_eq!(summary.averages.credits_spent, Some(60000.0));
        assert_eq!(summary.win_rate, Some(1.0));
        assert_eq!(summary.most_played_character.as_deref(), Some("Jett"));
    }

    #[tokio::test]
    async fn test_no_cross_player_bleed() {
        let temp_dir = TempDir::new().unwrap();
        let (agg, store) = aggregator(&temp_dir);
        let a = player("ollie#chaos");
        let b = player("zed#nine");

        seed(&store, &a, "m1", 1, "Bind", (30, 10, 0)).await;
        seed(&store, &a, "m2", 2, "Bind", (30, 10, 0)).await;
        seed(&store, &b, "m3", 3, "Bind", (5, 10, 0)).await;

        let mut ctx = ActivePlayerContext::new();
        ctx.set_active(a.clone());
        ctx.set_active(b.clone());

        let active = ctx.active().unwrap();
        let report = agg.average_kdr(active, &Window::default()).await.unwrap();
        let report = report.data().unwrap();
        assert_eq!(report.matches_considered, 1);
        assert_eq!(report.kdr, Kdr::Ratio(0.5));

        ctx.set_active(a);
        let active = ctx.active().unwrap();
        let matches = agg.recent_matches(active, &Window::default()).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().all(|m| m.name == "ollie"));
    }
}
