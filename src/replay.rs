//! At-most-once processing of SAML message ids, backed by redb.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use crate::{Result, SamlError};

/// message id -> unix seconds at which it was processed. Rows are never
/// updated; pruning old ids is an external retention concern.
const PROCESSED_MESSAGE_IDS: TableDefinition<&str, u64> =
    TableDefinition::new("processed_message_ids");

/// Durable record of every SAML message id this SP has accepted.
pub struct MessageIdStore {
    db: Database,
}

impl MessageIdStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::create(path).map_err(redb::Error::from)?;
        let write_txn = db.begin_write().map_err(redb::Error::from)?;
        {
            let _ = write_txn
                .open_table(PROCESSED_MESSAGE_IDS)
                .map_err(redb::Error::from)?;
        }
        write_txn.commit().map_err(redb::Error::from)?;
        Ok(Self { db })
    }

    /// The first caller for a message id records it durably and wins; every
    /// later caller gets [`SamlError::Replay`].
    ///
    /// The existence check and the insert share one write transaction, and
    /// redb serializes write transactions on a database, so two concurrent
    /// callbacks carrying the same id can never both succeed.
    pub fn check_and_record(&self, message_id: &str) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(redb::Error::from)?;
        {
            let mut table = write_txn
                .open_table(PROCESSED_MESSAGE_IDS)
                .map_err(redb::Error::from)?;
            if table
                .get(message_id)
                .map_err(redb::Error::from)?
                .is_some()
            {
                return Err(SamlError::Replay);
            }
            let processed_at = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or(0);
            table
                .insert(message_id, processed_at)
                .map_err(redb::Error::from)?;
        }
        write_txn.commit().map_err(redb::Error::from)?;
        debug!(message_id = %message_id, "recorded SAML message id");
        Ok(())
    }
}
