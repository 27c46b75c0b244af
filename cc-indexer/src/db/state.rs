use super::helper::{
    cf_handle, decode_json, encode_json, get_json, height_key, open_db, store_error,
    sync_write_options,
};
use super::types::{AssetHolding, BlockUndo, ChainHead, HoldingMap, MempoolBookkeeping, UtxoDelta};
use crate::constants::{DB_DIR, STATE_DB_NAME};
use crate::error::IndexResult;
use rust_rocksdb::{DB, IteratorMode, WriteBatch};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// Column family names
pub const META_CF: &str = "meta";
pub const BLOCKS_CF: &str = "blocks";
pub const ASSETS_CF: &str = "assets";
// Holdings consumed by a confirmed or mempool spend, kept for history reads
pub const SPENT_CF: &str = "spent";

// Meta key names
pub const META_KEY_CHAIN_HEAD: &str = "chain_head";
pub const META_KEY_MEMPOOL: &str = "mempool";
pub const META_KEY_IMPORTED_ADDRESSES: &str = "imported_addresses";

/// Primary store: chain head, block hashes by height, asset holdings by
/// output reference, spent holdings and the mempool/import bookkeeping.
pub struct StateStore {
    file: PathBuf,
    db: DB,
}

impl StateStore {
    pub fn new(data_dir: &Path) -> IndexResult<Self> {
        let file = Self::get_db_dir(data_dir).join(STATE_DB_NAME);
        let db = open_db(&file, &[META_CF, BLOCKS_CF, ASSETS_CF, SPENT_CF])?;

        Ok(Self { file, db })
    }

    pub fn get_db_dir(data_dir: &Path) -> PathBuf {
        data_dir.join(DB_DIR)
    }

    pub fn flush(&self) -> IndexResult<()> {
        self.db.flush().map_err(|e| {
            store_error(format!(
                "Failed to flush RocksDB at {}: {}",
                self.file.display(),
                e
            ))
        })
    }

    pub fn get_chain_head(&self) -> IndexResult<Option<ChainHead>> {
        get_json(&self.db, META_CF, META_KEY_CHAIN_HEAD.as_bytes(), "chain head")
    }

    pub fn get_block_hash(&self, height: u32) -> IndexResult<Option<String>> {
        let cf = cf_handle(&self.db, BLOCKS_CF)?;
        match self.db.get_cf(cf, height_key(height)) {
            Ok(Some(value)) => String::from_utf8(value)
                .map(Some)
                .map_err(|e| store_error(format!("Invalid block hash at {}: {}", height, e))),
            Ok(None) => Ok(None),
            Err(e) => Err(store_error(format!(
                "Failed to get block hash at {}: {}",
                height, e
            ))),
        }
    }

    pub fn get_asset_holding(&self, output_ref: &str) -> IndexResult<Option<AssetHolding>> {
        get_json(&self.db, ASSETS_CF, output_ref.as_bytes(), "asset holding")
    }

    /// Holding an output carried before it was spent.
    pub fn get_spent_holding(&self, output_ref: &str) -> IndexResult<Option<AssetHolding>> {
        get_json(&self.db, SPENT_CF, output_ref.as_bytes(), "spent holding")
    }

    pub fn get_mempool_bookkeeping(&self) -> IndexResult<MempoolBookkeeping> {
        let ret = get_json(&self.db, META_CF, META_KEY_MEMPOOL.as_bytes(), "mempool bookkeeping")?;
        Ok(ret.unwrap_or_default())
    }

    pub fn put_mempool_bookkeeping(&self, bookkeeping: &MempoolBookkeeping) -> IndexResult<()> {
        let mut batch = WriteBatch::default();
        self.stage_bookkeeping(&mut batch, bookkeeping)?;
        self.write(batch, "mempool bookkeeping")
    }

    pub fn get_imported_addresses(&self) -> IndexResult<BTreeSet<String>> {
        let ret = get_json(
            &self.db,
            META_CF,
            META_KEY_IMPORTED_ADDRESSES.as_bytes(),
            "imported addresses",
        )?;
        Ok(ret.unwrap_or_default())
    }

    pub fn add_imported_addresses(&self, addresses: &[String]) -> IndexResult<()> {
        let mut imported = self.get_imported_addresses()?;
        imported.extend(addresses.iter().cloned());

        let cf = cf_handle(&self.db, META_CF)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(
            cf,
            META_KEY_IMPORTED_ADDRESSES,
            encode_json("imported addresses", &imported)?,
        );
        self.write(batch, "imported addresses")
    }

    /// Commit a block: new holdings, consumed holdings, the block hash and the
    /// chain head in one synced batch.
    pub fn apply_block(&self, head: &ChainHead, delta: &UtxoDelta) -> IndexResult<()> {
        let mut batch = WriteBatch::default();

        // Outputs created and spent in the same block are in both partitions,
        // the delete has to come last
        self.stage_puts(&mut batch, &delta.unused)?;
        self.stage_deletes(&mut batch, &delta.used)?;
        self.stage_spent(&mut batch, &delta.used)?;

        let blocks_cf = cf_handle(&self.db, BLOCKS_CF)?;
        if let Some(hash) = &head.hash {
            batch.put_cf(blocks_cf, height_key(head.height), hash.as_bytes());
        }
        self.stage_head(&mut batch, Some(head))?;

        self.write(batch, &format!("block {}", head.height))
    }

    /// Undo the block at `height` and move the head to `height - 1`.
    pub fn revert_block(&self, height: u32, undo: &BlockUndo) -> IndexResult<Option<ChainHead>> {
        let mut batch = WriteBatch::default();

        self.stage_puts(&mut batch, &undo.used)?;
        self.stage_deletes(&mut batch, &undo.unused)?;
        self.stage_unspent(&mut batch, &undo.used)?;

        let blocks_cf = cf_handle(&self.db, BLOCKS_CF)?;
        batch.delete_cf(blocks_cf, height_key(height));

        let head = match height.checked_sub(1) {
            Some(prev) => Some(ChainHead {
                height: prev,
                hash: self.get_block_hash(prev)?,
                timestamp: None,
            }),
            None => None,
        };
        self.stage_head(&mut batch, head.as_ref())?;

        self.write(batch, &format!("revert of block {}", height))?;
        Ok(head)
    }

    pub fn apply_mempool_tx(
        &self,
        delta: &UtxoDelta,
        bookkeeping: &MempoolBookkeeping,
    ) -> IndexResult<()> {
        let mut batch = WriteBatch::default();
        self.stage_puts(&mut batch, &delta.unused)?;
        self.stage_deletes(&mut batch, &delta.used)?;
        self.stage_spent(&mut batch, &delta.used)?;
        self.stage_bookkeeping(&mut batch, bookkeeping)?;

        self.write(batch, "mempool transaction")
    }

    pub fn revert_mempool_tx(
        &self,
        delta: &UtxoDelta,
        bookkeeping: &MempoolBookkeeping,
    ) -> IndexResult<()> {
        let mut batch = WriteBatch::default();
        self.stage_puts(&mut batch, &delta.used)?;
        self.stage_deletes(&mut batch, &delta.unused)?;
        self.stage_unspent(&mut batch, &delta.used)?;
        self.stage_bookkeeping(&mut batch, bookkeeping)?;

        self.write(batch, "mempool transaction revert")
    }

    /// Full scan of the asset map.
    pub fn all_asset_holdings(&self) -> IndexResult<HoldingMap> {
        let cf = cf_handle(&self.db, ASSETS_CF)?;
        let mut ret = HoldingMap::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) =
                item.map_err(|e| store_error(format!("Failed to iterate assets: {}", e)))?;
            let key = String::from_utf8_lossy(&key).to_string();
            ret.insert(key, decode_json("asset holding", &value)?);
        }

        Ok(ret)
    }

    fn stage_puts(&self, batch: &mut WriteBatch, holdings: &HoldingMap) -> IndexResult<()> {
        let cf = cf_handle(&self.db, ASSETS_CF)?;
        for (key, holding) in holdings {
            batch.put_cf(cf, key.as_bytes(), encode_json("asset holding", holding)?);
        }
        Ok(())
    }

    fn stage_deletes(&self, batch: &mut WriteBatch, holdings: &HoldingMap) -> IndexResult<()> {
        let cf = cf_handle(&self.db, ASSETS_CF)?;
        for key in holdings.keys() {
            batch.delete_cf(cf, key.as_bytes());
        }
        Ok(())
    }

    fn stage_spent(&self, batch: &mut WriteBatch, holdings: &HoldingMap) -> IndexResult<()> {
        let cf = cf_handle(&self.db, SPENT_CF)?;
        for (key, holding) in holdings {
            batch.put_cf(cf, key.as_bytes(), encode_json("spent holding", holding)?);
        }
        Ok(())
    }

    fn stage_unspent(&self, batch: &mut WriteBatch, holdings: &HoldingMap) -> IndexResult<()> {
        let cf = cf_handle(&self.db, SPENT_CF)?;
        for key in holdings.keys() {
            batch.delete_cf(cf, key.as_bytes());
        }
        Ok(())
    }

    fn stage_head(&self, batch: &mut WriteBatch, head: Option<&ChainHead>) -> IndexResult<()> {
        let cf = cf_handle(&self.db, META_CF)?;
        match head {
            Some(head) => batch.put_cf(cf, META_KEY_CHAIN_HEAD, encode_json("chain head", head)?),
            None => batch.delete_cf(cf, META_KEY_CHAIN_HEAD),
        }
        Ok(())
    }

    fn stage_bookkeeping(
        &self,
        batch: &mut WriteBatch,
        bookkeeping: &MempoolBookkeeping,
    ) -> IndexResult<()> {
        let cf = cf_handle(&self.db, META_CF)?;
        batch.put_cf(
            cf,
            META_KEY_MEMPOOL,
            encode_json("mempool bookkeeping", bookkeeping)?,
        );
        Ok(())
    }

    fn write(&self, batch: WriteBatch, what: &str) -> IndexResult<()> {
        self.db
            .write_opt(&batch, &sync_write_options())
            .map_err(|e| store_error(format!("Failed to write {} to DB: {}", what, e)))
    }
}

pub type StateStoreRef = Arc<StateStore>;
