use super::helper::{cf_handle, encode_json, get_json, height_key, open_db, store_error, sync_write_options};
use super::types::{BlockUndo, UtxoDelta};
use crate::constants::{DB_DIR, UNDO_DB_NAME};
use crate::error::IndexResult;
use rust_rocksdb::DB;
use std::path::Path;
use std::sync::Arc;

pub const BLOCK_UNDO_CF: &str = "block_undo";
pub const MEMPOOL_UNDO_CF: &str = "mempool_undo";

/// Reversal data keyed by block height or mempool txid. Every write is synced
/// before the state store is touched.
pub struct UndoLog {
    db: DB,
}

impl UndoLog {
    pub fn new(data_dir: &Path) -> IndexResult<Self> {
        let file = data_dir.join(DB_DIR).join(UNDO_DB_NAME);
        let db = open_db(&file, &[BLOCK_UNDO_CF, MEMPOOL_UNDO_CF])?;

        Ok(Self { db })
    }

    fn put(&self, cf: &str, key: &[u8], value: Vec<u8>, what: &str) -> IndexResult<()> {
        let handle = cf_handle(&self.db, cf)?;
        self.db
            .put_cf_opt(handle, key, value, &sync_write_options())
            .map_err(|e| store_error(format!("Failed to put {}: {}", what, e)))
    }

    pub fn put_block_undo(&self, height: u32, undo: &BlockUndo) -> IndexResult<()> {
        let value = encode_json("block undo", undo)?;
        self.put(BLOCK_UNDO_CF, &height_key(height), value, "block undo")
    }

    pub fn get_block_undo(&self, height: u32) -> IndexResult<Option<BlockUndo>> {
        get_json(&self.db, BLOCK_UNDO_CF, &height_key(height), "block undo")
    }

    pub fn put_mempool_undo(&self, txid: &str, delta: &UtxoDelta) -> IndexResult<()> {
        let value = encode_json("mempool undo", delta)?;
        self.put(MEMPOOL_UNDO_CF, txid.as_bytes(), value, "mempool undo")
    }

    pub fn get_mempool_undo(&self, txid: &str) -> IndexResult<Option<UtxoDelta>> {
        get_json(&self.db, MEMPOOL_UNDO_CF, txid.as_bytes(), "mempool undo")
    }

    pub fn delete_mempool_undo(&self, txid: &str) -> IndexResult<()> {
        let handle = cf_handle(&self.db, MEMPOOL_UNDO_CF)?;
        self.db
            .delete_cf_opt(handle, txid.as_bytes(), &sync_write_options())
            .map_err(|e| store_error(format!("Failed to delete mempool undo {}: {}", txid, e)))
    }
}

pub type UndoLogRef = Arc<UndoLog>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::AssetHolding;

    #[test]
    fn test_undo_entries() {
        let temp_dir = std::env::temp_dir().join("cc_indexer_undo_test");
        let _ = std::fs::remove_dir_all(&temp_dir);
        std::fs::create_dir_all(&temp_dir).unwrap();
        let undo_log = UndoLog::new(&temp_dir).unwrap();

        assert!(undo_log.get_block_undo(7).unwrap().is_none());

        let mut delta = UtxoDelta::default();
        delta.used.insert(
            "aa:1".to_string(),
            AssetHolding {
                assets: vec![],
                block_height: 6,
            },
        );
        let undo = BlockUndo::new(delta.clone(), vec!["bb".to_string()]);
        undo_log.put_block_undo(7, &undo).unwrap();
        assert_eq!(undo_log.get_block_undo(7).unwrap(), Some(undo));

        undo_log.put_mempool_undo("cc", &delta).unwrap();
        assert_eq!(undo_log.get_mempool_undo("cc").unwrap(), Some(delta));
        undo_log.delete_mempool_undo("cc").unwrap();
        assert!(undo_log.get_mempool_undo("cc").unwrap().is_none());
    }
}
