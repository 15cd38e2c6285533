//! Match record, player stats and sync cursor collections.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use super::{Collection, JsonlReader, JsonlWriter, StorageConfig, StorageError};
use crate::models::{MatchRecord, PlayerIdentity, PlayerMatchStats, SyncCursor};

/// Store for everything a sync writes.
///
/// Mutations run under the store's lock, so concurrent syncs sharing a store
/// never duplicate a row. Every new row is its own append; there is no
/// transaction across rows.
pub struct MatchStore {
    config: StorageConfig,
    write_lock: Mutex<()>,
}

impl MatchStore {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            write_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    fn reader<T: serde::de::DeserializeOwned>(&self, collection: Collection) -> JsonlReader<T> {
        JsonlReader::new(self.config.collection_path(collection))
    }

    fn writer<T: serde::Serialize>(&self, collection: Collection) -> JsonlWriter<T> {
        JsonlWriter::new(self.config.collection_path(collection))
    }

    /// Start a write session holding the store lock until it is finished
    /// or dropped.
    ///
    /// Stored keys are read once per session instead of once per row.
    pub async fn begin_writes(&self) -> Result<WriteSession<'_>, StorageError> {
        let guard = self.write_lock.lock().await;

        let record_keys = self
            .reader::<MatchRecord>(Collection::MatchRecords)
            .read_all()?
            .iter()
            .map(MatchRecord::key)
            .collect();

        Ok(WriteSession {
            store: self,
            _guard: guard,
            record_keys,
            stats: None,
        })
    }

    // ── Match records ───────────────────────────────────────────────────────

    /// Insert a match record unless one with the same key exists.
    ///
    /// Returns whether a row was written.
    pub async fn insert_record_if_absent(&self, record: &MatchRecord) -> Result<bool, StorageError> {
        let mut session = self.begin_writes().await?;
        let inserted = session.insert_record_if_absent(record)?;
        session.finish()?;
        Ok(inserted)
    }

    /// All records belonging to `identity`, in storage order.
    pub async fn records_for(&self, identity: &PlayerIdentity) -> Result<Vec<MatchRecord>, StorageError> {
        self.reader(Collection::MatchRecords)
            .read_where(|r: &MatchRecord| r.belongs_to(identity))
    }

    // ── Player stats ────────────────────────────────────────────────────────

    /// Insert or replace the stats row for a match and player.
    pub async fn upsert_stats(&self, stats: &PlayerMatchStats) -> Result<(), StorageError> {
        let mut session = self.begin_writes().await?;
        session.upsert_stats(stats)?;
        session.finish()
    }

    /// Stats rows for the given records, keyed by `(match_id, player_key)`.
    pub async fn stats_for(
        &self,
        records: &[MatchRecord],
    ) -> Result<HashMap<(String, String), PlayerMatchStats>, StorageError> {
        let wanted: Vec<(String, String)> = records.iter().map(MatchRecord::key).collect();
        let rows: Vec<PlayerMatchStats> = self
            .reader(Collection::PlayerMatchStats)
            .read_where(|s: &PlayerMatchStats| wanted.contains(&s.key()))?;

        Ok(rows.into_iter().map(|s| (s.key(), s)).collect())
    }

    // ── Sync cursors ────────────────────────────────────────────────────────

    /// The cursor for a resolved identity; `None` means never synced.
    pub async fn cursor(&self, identity: &PlayerIdentity) -> Result<Option<SyncCursor>, StorageError> {
        let key = partition_key(identity)?;
        let cursors: Vec<SyncCursor> = self
            .reader(Collection::SyncCursors)
            .read_where(|c: &SyncCursor| c.player_key == key)?;
        Ok(cursors.into_iter().last())
    }

    /// Point the identity's cursor at its newest observed match.
    pub async fn advance_cursor(
        &self,
        identity: &PlayerIdentity,
        last_match_id: &str,
        last_started_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<SyncCursor, StorageError> {
        let key = partition_key(identity)?;
        let region = identity
            .region
            .ok_or_else(|| StorageError::UnresolvedIdentity(identity.riot_id()))?;

        let cursor = SyncCursor {
            player_key: key.clone(),
            name: identity.name.clone(),
            tag: identity.tag.clone(),
            region,
            last_match_id: last_match_id.to_string(),
            last_started_at,
            updated_at: Utc::now(),
        };

        let _guard = self.write_lock.lock().await;
        let (mut cursors, rejected): (Vec<SyncCursor>, _) =
            self.reader(Collection::SyncCursors).read_all_with_rejects()?;
        cursors.retain(|c| c.player_key != key);
        cursors.push(cursor.clone());
        self.writer(Collection::SyncCursors).write_all(&cursors, &rejected)?;

        info!("Cursor for {} now at {}", key, last_match_id);
        Ok(cursor)
    }

    /// Drop the identity's cursor so the next sync starts fresh.
    ///
    /// Stored matches are kept. Returns whether a cursor existed.
    pub async fn reset_cursor(&self, identity: &PlayerIdentity) -> Result<bool, StorageError> {
        let key = partition_key(identity)?;

        let _guard = self.write_lock.lock().await;
        let (mut cursors, rejected): (Vec<SyncCursor>, _) =
            self.reader(Collection::SyncCursors).read_all_with_rejects()?;
        let before = cursors.len();
        cursors.retain(|c| c.player_key != key);
        if cursors.len() == before {
            return Ok(false);
        }

        self.writer(Collection::SyncCursors).write_all(&cursors, &rejected)?;
        info!("Cursor for {} reset", key);
        Ok(true)
    }

    /// Every player that has been synced at least once.
    pub async fn list_players(&self) -> Result<Vec<SyncCursor>, StorageError> {
        let mut cursors: Vec<SyncCursor> = self.reader(Collection::SyncCursors).read_all()?;
        cursors.sort_by(|a, b| a.player_key.cmp(&b.player_key));
        Ok(cursors)
    }
}

/// Stats rows loaded by a session, indexed by key.
struct LoadedStats {
    rows: Vec<PlayerMatchStats>,
    index: HashMap<(String, String), usize>,
    rejected: Vec<String>,
    dirty: bool,
}

/// Batched writes made under one hold of the store lock.
///
/// New rows are appended as they arrive, so an error part way through
/// leaves every earlier row stored. Replaced stats rows are rewritten once
/// by [`WriteSession::finish`].
pub struct WriteSession<'a> {
    store: &'a MatchStore,
    _guard: MutexGuard<'a, ()>,
    record_keys: HashSet<(String, String)>,
    stats: Option<LoadedStats>,
}

impl WriteSession<'_> {
    /// Append a match record unless its key is already stored.
    pub fn insert_record_if_absent(&mut self, record: &MatchRecord) -> Result<bool, StorageError> {
        let key = record.key();
        if self.record_keys.contains(&key) {
            debug!("Match {} already stored for {}", key.0, key.1);
            return Ok(false);
        }

        self.store.writer(Collection::MatchRecords).append(record)?;
        self.record_keys.insert(key);
        Ok(true)
    }

    /// Insert or replace the stats row for a match and player.
    pub fn upsert_stats(&mut self, stats: &PlayerMatchStats) -> Result<(), StorageError> {
        let store = self.store;
        let loaded = self.loaded_stats()?;
        let key = stats.key();

        match loaded.index.get(&key) {
            Some(&idx) if loaded.rows[idx] == *stats => {}
            Some(&idx) => {
                loaded.rows[idx] = stats.clone();
                loaded.dirty = true;
            }
            None => {
                store.writer(Collection::PlayerMatchStats).append(stats)?;
                loaded.index.insert(key, loaded.rows.len());
                loaded.rows.push(stats.clone());
            }
        }
        Ok(())
    }

    /// Rewrite replaced stats rows, then release the lock.
    pub fn finish(self) -> Result<(), StorageError> {
        if let Some(loaded) = &self.stats {
            if loaded.dirty {
                self.store
                    .writer(Collection::PlayerMatchStats)
                    .write_all(&loaded.rows, &loaded.rejected)?;
            }
        }
        Ok(())
    }

    // Loaded on first use; a pass that only writes shells never reads stats.
    fn loaded_stats(&mut self) -> Result<&mut LoadedStats, StorageError> {
        let loaded = match self.stats.take() {
            Some(loaded) => loaded,
            None => {
                let (rows, rejected): (Vec<PlayerMatchStats>, _) = self
                    .store
                    .reader(Collection::PlayerMatchStats)
                    .read_all_with_rejects()?;
                let index = rows.iter().enumerate().map(|(i, s)| (s.key(), i)).collect();
                LoadedStats {
                    rows,
                    index,
                    rejected,
                    dirty: false,
                }
            }
        };
        Ok(self.stats.insert(loaded))
    }
}

fn partition_key(identity: &PlayerIdentity) -> Result<String, StorageError> {
    identity
        .partition_key()
        .ok_or_else(|| StorageError::UnresolvedIdentity(identity.riot_id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Region;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn store(temp_dir: &TempDir) -> MatchStore {
        MatchStore::new(StorageConfig::new(temp_dir.path().to_path_buf()))
    }

    fn ollie() -> PlayerIdentity {
        PlayerIdentity::parse("ollie#chaos").unwrap().with_region(Region::Na)
    }

    fn record(match_id: &str, name: &str) -> MatchRecord {
        MatchRecord {
            match_id: match_id.to_string(),
            region: Region::Na,
            name: name.to_string(),
            tag: "chaos".to_string(),
            started_at: None,
            mode: None,
            map: Some("Ascent".to_string()),
            kills: Some(10),
            deaths: Some(5),
            assists: Some(2),
        }
    }

    fn stats(match_id: &str, score: u32) -> PlayerMatchStats {
        PlayerMatchStats {
            match_id: match_id.to_string(),
            player_key: "na/ollie/chaos".to_string(),
            score: Some(score),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_insert_if_absent() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        assert!(store.insert_record_if_absent(&record("m1", "ollie")).await.unwrap());
        assert!(!store.insert_record_if_absent(&record("m1", "OLLIE")).await.unwrap());
        assert!(store.insert_record_if_absent(&record("m1", "zed")).await.unwrap());

        assert_eq!(store.records_for(&ollie()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_do_not_duplicate() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(store(&temp_dir));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.insert_record_if_absent(&record("m1", "ollie")).await.unwrap()
                })
            })
            .collect();

        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                inserted += 1;
            }
        }

        assert_eq!(inserted, 1);
        assert_eq!(store.records_for(&ollie()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_stats_replaces() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        store.upsert_stats(&stats("m1", 100)).await.unwrap();
        store.upsert_stats(&stats("m2", 200)).await.unwrap();
        store.upsert_stats(&stats("m1", 300)).await.unwrap();
        store.upsert_stats(&stats("m1", 300)).await.unwrap();

        let records = vec![record("m1", "ollie"), record("m2", "ollie")];
        let found = store.stats_for(&records).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[&records[0].key()].score, Some(300));
        assert_eq!(found[&records[1].key()].score, Some(200));
    }

    #[tokio::test]
    async fn test_write_session_dedups_against_stored_and_batched_rows() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        store.insert_record_if_absent(&record("m1", "ollie")).await.unwrap();
        store.upsert_stats(&stats("m1", 100)).await.unwrap();

        let mut session = store.begin_writes().await.unwrap();
        assert!(!session.insert_record_if_absent(&record("m1", "ollie")).unwrap());
        assert!(session.insert_record_if_absent(&record("m2", "ollie")).unwrap());
        assert!(!session.insert_record_if_absent(&record("m2", "Ollie")).unwrap());
        session.upsert_stats(&stats("m1", 150)).unwrap();
        session.upsert_stats(&stats("m2", 200)).unwrap();
        session.upsert_stats(&stats("m2", 250)).unwrap();
        session.finish().unwrap();

        let records = store.records_for(&ollie()).await.unwrap();
        assert_eq!(records.len(), 2);
        let found = store.stats_for(&records).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[&records[0].key()].score, Some(150));
        assert_eq!(found[&records[1].key()].score, Some(250));
    }

    #[tokio::test]
    async fn test_rewrites_keep_unparseable_rows() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let stats_path = store.config().collection_path(Collection::PlayerMatchStats);
        let cursor_path = store.config().collection_path(Collection::SyncCursors);

        store.upsert_stats(&stats("m1", 100)).await.unwrap();
        store.advance_cursor(&ollie(), "m1", None).await.unwrap();
        for path in [&stats_path, &cursor_path] {
            let mut contents = std::fs::read_to_string(path).unwrap();
            contents.push_str("{\"hand-edited\": tru\n");
            std::fs::write(path, contents).unwrap();
        }

        store.upsert_stats(&stats("m1", 300)).await.unwrap();
        store.advance_cursor(&ollie(), "m2", None).await.unwrap();

        for path in [&stats_path, &cursor_path] {
            let contents = std::fs::read_to_string(path).unwrap();
            assert!(contents.contains("hand-edited"), "{:?} lost a line", path);
        }
        let found = store.stats_for(&[record("m1", "ollie")]).await.unwrap();
        assert_eq!(found.values().next().unwrap().score, Some(300));
        assert_eq!(store.cursor(&ollie()).await.unwrap().unwrap().last_match_id, "m2");
    }

    #[tokio::test]
    async fn test_cursor_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let id = ollie();

        assert!(store.cursor(&id).await.unwrap().is_none());

        store.advance_cursor(&id, "m5", None).await.unwrap();
        store.advance_cursor(&id, "m8", None).await.unwrap();
        let cursor = store.cursor(&id).await.unwrap().unwrap();
        assert_eq!(cursor.last_match_id, "m8");
        assert_eq!(cursor.identity(), id);
        assert_eq!(store.list_players().await.unwrap().len(), 1);

        assert!(store.reset_cursor(&id).await.unwrap());
        assert!(!store.reset_cursor(&id).await.unwrap());
        assert!(store.cursor(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cursor_requires_region() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let unresolved = PlayerIdentity::parse("ollie#chaos").unwrap();

        assert!(matches!(
            store.cursor(&unresolved).await,
            Err(StorageError::UnresolvedIdentity(_))
        ));
    }

    #[tokio::test]
    async fn test_cursors_partitioned_by_region() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let na = ollie();
        let eu = PlayerIdentity::parse("ollie#chaos").unwrap().with_region(Region::Eu);
        store.advance_cursor(&na, "m1", None).await.unwrap();
        store.advance_cursor(&eu, "e1", None).await.unwrap();

        assert_eq!(store.cursor(&na).await.unwrap().unwrap().last_match_id, "m1");
        assert_eq!(store.cursor(&eu).await.unwrap().unwrap().last_match_id, "e1");
    }
}
