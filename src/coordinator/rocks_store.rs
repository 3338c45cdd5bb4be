use std::path::Path;
use std::sync::Arc;

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, WriteOptions, DB,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::errors::{Result, TmError};
use crate::participant::ParticipantId;
use crate::storage::{LogName, LogSnapshot, LogStore};
use crate::{TxnStatus, Xid};

const COUNTER_KEY: &[u8] = b"next_xid";

/// `LogStore` backed by RocksDB, one column family per logical log.
///
/// Status and enlistment entries are keyed by the big-endian xid so that
/// writes for different transactions never touch the same key. Every write is
/// issued with `sync` enabled.
pub struct RocksLogStore {
    db: DB,
}

impl RocksLogStore {
    /// Opens (or creates) the log store rooted at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = LogName::ALL
            .iter()
            .map(|log| ColumnFamilyDescriptor::new(log.as_str(), Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, descriptors).map_err(|e| {
            TmError::Storage(format!(
                "Failed to open log store at {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(Self { db })
    }

    fn column(&self, log: LogName) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(log.as_str())
            .ok_or_else(|| TmError::Storage(format!("Missing column family {}", log.as_str())))
    }

    fn sync_writes() -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(true);
        opts
    }

    fn put<V: Serialize + ?Sized>(&self, log: LogName, key: &[u8], value: &V) -> Result<()> {
        let bytes = encode(value)?;
        let cf = self.column(log)?;
        self.db
            .put_cf_opt(&cf, key, bytes, &Self::sync_writes())
            .map_err(|e| TmError::Storage(format!("Failed to write {}: {}", log.as_str(), e)))
    }

    fn scan<V: DeserializeOwned>(&self, log: LogName) -> Result<Vec<(Xid, V)>> {
        let cf = self.column(log)?;
        let mut entries = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, value) = item
                .map_err(|e| TmError::Storage(format!("Failed to read {}: {}", log.as_str(), e)))?;
            entries.push((decode_xid(&key)?, decode(&value)?));
        }
        Ok(entries)
    }
}

impl LogStore for RocksLogStore {
    fn write_counter(&self, next_xid: Xid) -> Result<()> {
        self.put(LogName::TransactionCounter, COUNTER_KEY, &next_xid)
    }

    fn write_status(&self, xid: Xid, status: TxnStatus) -> Result<()> {
        self.put(LogName::Statuses, &xid.to_be_bytes(), &status)
    }

    fn write_enlistments(&self, xid: Xid, participants: &[ParticipantId]) -> Result<()> {
        self.put(LogName::Enlistments, &xid.to_be_bytes(), participants)
    }

    fn remove_transaction(&self, xid: Xid) -> Result<()> {
        let enlistments = self.column(LogName::Enlistments)?;
        let statuses = self.column(LogName::Statuses)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&enlistments, xid.to_be_bytes());
        batch.delete_cf(&statuses, xid.to_be_bytes());

        self.db
            .write_opt(batch, &Self::sync_writes())
            .map_err(|e| TmError::Storage(format!("Failed to remove transaction {}: {}", xid, e)))
    }

    fn load(&self) -> Result<LogSnapshot> {
        let counter = self.column(LogName::TransactionCounter)?;
        let next_xid = self
            .db
            .get_cf(&counter, COUNTER_KEY)
            .map_err(|e| TmError::Storage(format!("Failed to read counter: {}", e)))?
            .map(|bytes| decode::<Xid>(&bytes))
            .transpose()?;

        Ok(LogSnapshot {
            next_xid,
            statuses: self.scan(LogName::Statuses)?.into_iter().collect(),
            enlistments: self.scan(LogName::Enlistments)?.into_iter().collect(),
        })
    }
}

fn encode<V: Serialize + ?Sized>(value: &V) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| TmError::Serialization(e.to_string()))
}

fn decode<V: DeserializeOwned>(bytes: &[u8]) -> Result<V> {
    bincode::deserialize(bytes).map_err(|e| TmError::Serialization(e.to_string()))
}

fn decode_xid(key: &[u8]) -> Result<Xid> {
    let raw: [u8; 8] = key
        .try_into()
        .map_err(|_| TmError::Serialization(format!("Malformed xid key of {} bytes", key.len())))?;
    Ok(Xid::from_be_bytes(raw))
}
