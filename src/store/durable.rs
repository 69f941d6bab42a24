//! ACID-durable element store backed by redb.
//!
//! One table per element kind, keyed by element id. A flush is applied as a
//! single write transaction so a crash never leaves half a flush on disk.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::StoreError;
use crate::store::StoreResult;

const VERTEX_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("vertices");
const EDGE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("edges");
const DEFINITION_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("definitions");

/// Which element table an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Vertices,
    Edges,
    Definitions,
}

impl Table {
    fn definition(self) -> TableDefinition<'static, &'static str, &'static [u8]> {
        match self {
            Table::Vertices => VERTEX_TABLE,
            Table::Edges => EDGE_TABLE,
            Table::Definitions => DEFINITION_TABLE,
        }
    }
}

/// A single upsert (`Some`) or removal (`None`) inside a flush.
#[derive(Debug, Clone)]
pub struct WriteOp {
    pub table: Table,
    pub key: String,
    pub value: Option<Vec<u8>>,
}

/// ACID-durable store using redb.
///
/// All writes go through transactions. Reads use MVCC snapshots.
pub struct DurableStore {
    db: Arc<Database>,
}

impl DurableStore {
    /// Open or create a durable store in the given directory.
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| StoreError::Io { source: e })?;
        let db_path = data_dir.join("ontograph.redb");
        let db = Database::create(&db_path).map_err(|e| StoreError::Redb {
            message: format!("failed to open redb at {}: {e}", db_path.display()),
        })?;

        // Create the tables up front so read transactions never see them missing.
        let txn = db.begin_write().map_err(|e| StoreError::Redb {
            message: format!("begin_write failed: {e}"),
        })?;
        for table in [Table::Vertices, Table::Edges, Table::Definitions] {
            txn.open_table(table.definition())
                .map_err(|e| StoreError::Redb {
                    message: format!("open_table failed: {e}"),
                })?;
        }
        txn.commit().map_err(|e| StoreError::Redb {
            message: format!("commit failed: {e}"),
        })?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Apply every operation in one transaction.
    pub fn apply(&self, ops: &[WriteOp]) -> StoreResult<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write().map_err(|e| StoreError::Redb {
            message: format!("begin_write failed: {e}"),
        })?;
        for table in [Table::Vertices, Table::Edges, Table::Definitions] {
            let mut handle = txn
                .open_table(table.definition())
                .map_err(|e| StoreError::Redb {
                    message: format!("open_table failed: {e}"),
                })?;
            for op in ops.iter().filter(|op| op.table == table) {
                match &op.value {
                    Some(value) => {
                        handle
                            .insert(op.key.as_str(), value.as_slice())
                            .map_err(|e| StoreError::Redb {
                                message: format!("insert failed: {e}"),
                            })?;
                    }
                    None => {
                        handle.remove(op.key.as_str()).map_err(|e| StoreError::Redb {
                            message: format!("remove failed: {e}"),
                        })?;
                    }
                }
            }
        }
        txn.commit().map_err(|e| StoreError::Redb {
            message: format!("commit failed: {e}"),
        })?;
        Ok(())
    }

    /// Every `(key, value)` pair in a table, in key order.
    pub fn scan(&self, table: Table) -> StoreResult<Vec<(String, Vec<u8>)>> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Redb {
            message: format!("begin_read failed: {e}"),
        })?;
        let handle = txn
            .open_table(table.definition())
            .map_err(|e| StoreError::Redb {
                message: format!("open_table failed: {e}"),
            })?;
        let iter = handle.iter().map_err(|e| StoreError::Redb {
            message: format!("iter failed: {e}"),
        })?;
        let mut out = Vec::new();
        for entry in iter {
            let (key, value) = entry.map_err(|e| StoreError::Redb {
                message: format!("scan failed: {e}"),
            })?;
            out.push((key.value().to_string(), value.value().to_vec()));
        }
        Ok(out)
    }
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore").finish()
    }
}
