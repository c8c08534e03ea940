//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `matches` - Match records (key: match_id)
//! - `ledger` - Append-only entry log (key: match_id || innings || seq)
//! - `nonces` - Idempotency index (key: match_id || nonce)
//! - `snapshots` - Cached innings snapshots (key: match_id || innings)
//!
//! Integer key parts are big-endian so a forward scan from a prefix yields
//! entries in insertion order.

use crate::{
    error::{Error, Result},
    ledger::StagedEntry,
    projector::InningsSnapshot,
    types::{IdempotencyKey, LedgerEntry, Match, MatchId},
    Config,
};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode,
    Options, WriteBatch, WriteOptions, DB,
};
use std::sync::Arc;

/// Column family names
const CF_MATCHES: &str = "matches";
const CF_LEDGER: &str = "ledger";
const CF_NONCES: &str = "nonces";
const CF_SNAPSHOTS: &str = "snapshots";

/// Everything one accepted command writes, applied in a single batch
#[derive(Debug)]
pub struct Commit<'a> {
    /// Updated match record
    pub record: &'a Match,
    /// New ledger entries
    pub entries: &'a [StagedEntry],
    /// Updated snapshot of the innings the entries belong to
    pub snapshot: Option<&'a InningsSnapshot>,
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
    sync_writes: bool,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Append-mostly workload
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_MATCHES, Self::cf_options_matches()),
            ColumnFamilyDescriptor::new(CF_LEDGER, Self::cf_options_ledger()),
            ColumnFamilyDescriptor::new(CF_NONCES, Self::cf_options_nonces()),
            ColumnFamilyDescriptor::new(CF_SNAPSHOTS, Self::cf_options_snapshots()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB with 4 column families");

        Ok(Self {
            db: Arc::new(db),
            sync_writes: config.rocksdb.sync_writes,
        })
    }

    // Column family options

    fn cf_options_matches() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_ledger() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_nonces() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_options_snapshots() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Match records

    /// Store a newly scheduled match
    pub fn put_match(&self, record: &Match) -> Result<()> {
        let cf = self.cf_handle(CF_MATCHES)?;
        let value = bincode::serialize(record)?;
        self.db
            .put_cf_opt(&cf, Self::match_key(record.id), value, &self.write_options())?;
        Ok(())
    }

    /// Get match record by ID
    pub fn get_match(&self, match_id: MatchId) -> Result<Match> {
        let cf = self.cf_handle(CF_MATCHES)?;
        let value = self
            .db
            .get_cf(&cf, Self::match_key(match_id))?
            .ok_or_else(|| Error::NotFound(format!("match {}", match_id)))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Whether a match record exists
    pub fn match_exists(&self, match_id: MatchId) -> Result<bool> {
        let cf = self.cf_handle(CF_MATCHES)?;
        Ok(self.db.get_pinned_cf(&cf, Self::match_key(match_id))?.is_some())
    }

    // Ledger

    /// Apply one accepted command atomically
    pub fn commit(&self, commit: &Commit<'_>) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_matches = self.cf_handle(CF_MATCHES)?;
        batch.put_cf(
            &cf_matches,
            Self::match_key(commit.record.id),
            bincode::serialize(commit.record)?,
        );

        let cf_ledger = self.cf_handle(CF_LEDGER)?;
        let cf_nonces = self.cf_handle(CF_NONCES)?;
        for staged in commit.entries {
            let entry = &staged.entry;
            batch.put_cf(
                &cf_ledger,
                Self::entry_key(entry.match_id, entry.innings, entry.seq),
                bincode::serialize(entry)?,
            );
            if let Some(key) = &staged.key {
                batch.put_cf(
                    &cf_nonces,
                    Self::nonce_key(entry.match_id, key),
                    bincode::serialize(key)?,
                );
            }
        }

        if let Some(snapshot) = commit.snapshot {
            let cf_snapshots = self.cf_handle(CF_SNAPSHOTS)?;
            batch.put_cf(
                &cf_snapshots,
                Self::snapshot_key(snapshot.innings.match_id, snapshot.innings.number),
                bincode::serialize(snapshot)?,
            );
        }

        self.db.write_opt(batch, &self.write_options())?;
        Ok(())
    }

    /// All entries of one innings in insertion order
    pub fn read_entries(&self, match_id: MatchId, innings: u8) -> Result<Vec<LedgerEntry>> {
        let cf = self.cf_handle(CF_LEDGER)?;
        let prefix = Self::innings_prefix(match_id, innings);

        let mut entries = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            entries.push(bincode::deserialize(&value)?);
        }
        Ok(entries)
    }

    /// Idempotency keys claimed by a match
    pub fn read_nonces(&self, match_id: MatchId) -> Result<Vec<IdempotencyKey>> {
        let cf = self.cf_handle(CF_NONCES)?;
        let prefix = Self::match_key(match_id);

        let mut keys = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            keys.push(bincode::deserialize(&value)?);
        }
        Ok(keys)
    }

    /// Cached snapshot of an innings
    pub fn get_snapshot(&self, match_id: MatchId, innings: u8) -> Result<Option<InningsSnapshot>> {
        let cf = self.cf_handle(CF_SNAPSHOTS)?;
        match self.db.get_cf(&cf, Self::snapshot_key(match_id, innings))? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    // Key helpers

    fn match_key(match_id: MatchId) -> [u8; 8] {
        match_id.get().to_be_bytes()
    }

    fn innings_prefix(match_id: MatchId, innings: u8) -> Vec<u8> {
        let mut key = Self::match_key(match_id).to_vec();
        key.push(innings);
        key
    }

    fn entry_key(match_id: MatchId, innings: u8, seq: u64) -> Vec<u8> {
        let mut key = Self::innings_prefix(match_id, innings);
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }

    fn nonce_key(match_id: MatchId, key: &IdempotencyKey) -> Vec<u8> {
        let mut bytes = Self::match_key(match_id).to_vec();
        bytes.extend_from_slice(key.nonce.as_bytes());
        bytes
    }

    fn snapshot_key(match_id: MatchId, innings: u8) -> Vec<u8> {
        Self::innings_prefix(match_id, innings)
    }

    fn write_options(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.sync_writes);
        opts
    }

    // Statistics

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        let cf_matches = self.cf_handle(CF_MATCHES)?;
        let cf_ledger = self.cf_handle(CF_LEDGER)?;

        let mut total_matches = 0u64;
        for item in self.db.iterator_cf(&cf_matches, IteratorMode::Start) {
            item?;
            total_matches += 1;
        }

        // Approximate, fast
        let total_entries = self
            .db
            .property_int_value_cf(&cf_ledger, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);

        Ok(StorageStats {
            total_matches,
            total_entries,
        })
    }

    /// Flush memtables (graceful shutdown)
    pub fn close(&self) -> Result<()> {
        self.db.flush()?;
        tracing::info!("RocksDB flushed");
        Ok(())
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Match records
    pub total_matches: u64,
    /// Ledger entries (estimate)
    pub total_entries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projector::Projector;
    use crate::types::{
        EntryKind, InningsId, InningsStatus, Innings, MatchFormat, PlayerEntry, PlayerId, TeamId,
        TeamSheet,
    };
    use chrono::Utc;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn test_config() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (config, temp_dir)
    }

    fn test_match(id: u64) -> Match {
        let home = TeamSheet::new(1, "Home", vec![PlayerEntry::new(1, "A"), PlayerEntry::new(2, "B")]);
        let away = TeamSheet::new(2, "Away", vec![PlayerEntry::new(3, "C"), PlayerEntry::new(4, "D")]);
        Match::new(MatchId::new(id), MatchFormat::default(), home, away)
    }

    fn staged(match_id: u64, innings: u8, seq: u64) -> StagedEntry {
        let entry = LedgerEntry {
            seq,
            match_id: MatchId::new(match_id),
            innings,
            nonce: Uuid::new_v4(),
            recorded_at: Utc::now(),
            kind: EntryKind::BowlerIn { bowler: PlayerId::new(3) },
        };
        let key = IdempotencyKey {
            innings: entry.innings_id(),
            over: 0,
            ball: 0,
            nonce: entry.nonce,
        };
        StagedEntry { entry, key: Some(key) }
    }

    #[test]
    fn test_storage_open() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        let stats = storage.get_stats().unwrap();
        assert_eq!(stats.total_matches, 0);
    }

    #[test]
    fn test_match_not_found() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        let err = storage.get_match(MatchId::new(9)).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(!storage.match_exists(MatchId::new(9)).unwrap());
    }

    #[test]
    fn test_commit_and_scan_in_order() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        let record = test_match(5);
        storage.put_match(&record).unwrap();

        // Neighbouring innings and matches must not leak into the scan
        let entries: Vec<StagedEntry> = (1..=300).map(|seq| staged(5, 1, seq)).collect();
        let neighbours = [staged(5, 2, 301), staged(6, 1, 1)];
        storage
            .commit(&Commit { record: &record, entries: &entries, snapshot: None })
            .unwrap();
        storage
            .commit(&Commit { record: &record, entries: &neighbours, snapshot: None })
            .unwrap();

        let read = storage.read_entries(MatchId::new(5), 1).unwrap();
        assert_eq!(read.len(), 300);
        assert!(read.windows(2).all(|w| w[0].seq < w[1].seq));
        assert_eq!(storage.read_entries(MatchId::new(5), 2).unwrap().len(), 1);
        assert_eq!(storage.read_nonces(MatchId::new(5)).unwrap().len(), 301);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        let record = test_match(3);
        let innings = Innings {
            id: InningsId::new(MatchId::new(3), 1),
            batting_team: TeamId::new(1),
            bowling_team: TeamId::new(2),
            status: InningsStatus::InProgress,
            closed_by: None,
        };
        let snapshot = Projector::empty(&innings, &record.format);
        storage
            .commit(&Commit { record: &record, entries: &[], snapshot: Some(&snapshot) })
            .unwrap();

        assert_eq!(storage.get_snapshot(MatchId::new(3), 1).unwrap(), Some(snapshot));
        assert_eq!(storage.get_snapshot(MatchId::new(3), 2).unwrap(), None);
        assert_eq!(storage.get_match(MatchId::new(3)).unwrap().id, MatchId::new(3));
    }
}
