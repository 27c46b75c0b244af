use crate::error::{IndexError, IndexResult};
use rust_rocksdb::{self as rocksdb, ColumnFamily, ColumnFamilyDescriptor, DB, Options, WriteOptions};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

pub fn store_error(msg: String) -> IndexError {
    error!("{}", msg);
    IndexError::StoreWriteFailure(msg)
}

pub fn open_db(file: &Path, cfs: &[&str]) -> IndexResult<DB> {
    if let Some(parent) = file.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                store_error(format!(
                    "Could not create database directory at {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    info!("Opening RocksDB at {}", file.display());

    let mut options = Options::default();
    options.create_if_missing(true);
    options.create_missing_column_families(true);

    let cf_descriptors = cfs
        .iter()
        .map(|name| {
            let mut cf_options = Options::default();
            cf_options.set_level_compaction_dynamic_level_bytes(true);
            cf_options.set_compaction_style(rocksdb::DBCompactionStyle::Level);
            ColumnFamilyDescriptor::new(*name, cf_options)
        })
        .collect::<Vec<_>>();

    DB::open_cf_descriptors(&options, file, cf_descriptors).map_err(|e| {
        store_error(format!("Failed to open RocksDB at {}: {}", file.display(), e))
    })
}

pub fn cf_handle<'a>(db: &'a DB, name: &str) -> IndexResult<&'a ColumnFamily> {
    db.cf_handle(name)
        .ok_or_else(|| store_error(format!("Column family {} not found", name)))
}

pub fn sync_write_options() -> WriteOptions {
    let mut write_options = WriteOptions::default();
    write_options.set_sync(true);
    write_options
}

// Heights are stored big-endian so iteration follows chain order
pub fn height_key(height: u32) -> [u8; 4] {
    height.to_be_bytes()
}

pub fn encode_json<T: Serialize>(what: &str, value: &T) -> IndexResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| store_error(format!("Failed to encode {}: {}", what, e)))
}

pub fn decode_json<T: DeserializeOwned>(what: &str, value: &[u8]) -> IndexResult<T> {
    serde_json::from_slice(value)
        .map_err(|e| store_error(format!("Failed to decode {}: {}", what, e)))
}

pub fn get_json<T: DeserializeOwned>(
    db: &DB,
    cf: &str,
    key: &[u8],
    what: &str,
) -> IndexResult<Option<T>> {
    let handle = cf_handle(db, cf)?;
    match db.get_cf(handle, key) {
        Ok(Some(value)) => decode_json(what, &value).map(Some),
        Ok(None) => Ok(None),
        Err(e) => Err(store_error(format!("Failed to get {}: {}", what, e))),
    }
}
