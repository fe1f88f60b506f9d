use std::path::Path;

use bytes::Bytes;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};

use crate::data::log_record::{decode_record_pos, RecordPos};
use crate::errors::Result;
use crate::option::IteratorOptions;

use super::{IndexIterator, Indexer, SnapshotIterator};

pub const BPTREE_INDEX_FILE_NAME: &str = "bptree-index";

const INDEX_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("ember-kv-index");

/// Persistent B+ tree index. The tree lives in its own single file inside
/// the data directory and survives process death, so the engine skips log
/// replay when this variant is selected. Every operation opens a read or
/// write transaction internally; a failure inside the index store is not
/// recoverable by the engine, hence the panics.
pub struct BPlusTree {
  tree: Database,
}

impl BPlusTree {
  pub fn new(dir_path: &Path) -> Self {
    let db = Database::create(dir_path.join(BPTREE_INDEX_FILE_NAME))
      .expect("failed to open bptree index");
    let txn = db
      .begin_write()
      .expect("failed to begin transaction in bptree index");
    txn
      .open_table(INDEX_TABLE)
      .expect("failed to create table in bptree index");
    txn
      .commit()
      .expect("failed to commit transaction in bptree index");
    Self { tree: db }
  }

  fn materialize(&self) -> Vec<(Vec<u8>, RecordPos)> {
    let txn = self
      .tree
      .begin_read()
      .expect("failed to begin transaction in bptree index");
    let table = txn
      .open_table(INDEX_TABLE)
      .expect("failed to open table in bptree index");
    let mut items = Vec::with_capacity(table.len().unwrap_or(0) as usize);
    for entry in table.iter().expect("failed to iterate bptree index") {
      let (key, value) = entry.expect("failed to read entry in bptree index");
      items.push((key.value().to_vec(), decode_record_pos(value.value())));
    }
    items
  }
}

impl Indexer for BPlusTree {
  fn put(&self, key: Vec<u8>, pos: RecordPos) -> Option<RecordPos> {
    let txn = self
      .tree
      .begin_write()
      .expect("failed to begin transaction in bptree index");
    let prev = {
      let mut table = txn
        .open_table(INDEX_TABLE)
        .expect("failed to open table in bptree index");
      let enc = pos.encode();
      table
        .insert(key.as_slice(), enc.as_slice())
        .expect("failed to put key in bptree index")
        .map(|guard| decode_record_pos(guard.value()))
    };
    txn
      .commit()
      .expect("failed to commit transaction in bptree index");
    prev
  }

  fn get(&self, key: Vec<u8>) -> Option<RecordPos> {
    let txn = self
      .tree
      .begin_read()
      .expect("failed to begin transaction in bptree index");
    let table = txn
      .open_table(INDEX_TABLE)
      .expect("failed to open table in bptree index");
    table
      .get(key.as_slice())
      .expect("failed to get key from bptree index")
      .map(|guard| decode_record_pos(guard.value()))
  }

  fn delete(&self, key: Vec<u8>) -> Option<RecordPos> {
    let txn = self
      .tree
      .begin_write()
      .expect("failed to begin transaction in bptree index");
    let prev = {
      let mut table = txn
        .open_table(INDEX_TABLE)
        .expect("failed to open table in bptree index");
      table
        .remove(key.as_slice())
        .expect("failed to delete key from bptree index")
        .map(|guard| decode_record_pos(guard.value()))
    };
    txn
      .commit()
      .expect("failed to commit transaction in bptree index");
    prev
  }

  fn size(&self) -> usize {
    let txn = self
      .tree
      .begin_read()
      .expect("failed to begin transaction in bptree index");
    let table = txn
      .open_table(INDEX_TABLE)
      .expect("failed to open table in bptree index");
    table.len().expect("failed to read bptree index size") as usize
  }

  fn list_keys(&self) -> Result<Vec<Bytes>> {
    Ok(
      self
        .materialize()
        .into_iter()
        .map(|(key, _)| Bytes::from(key))
        .collect(),
    )
  }

  fn iterator(&self, options: IteratorOptions) -> Box<dyn IndexIterator> {
    // the read transaction is scoped to the snapshot build; the snapshot
    // itself keeps the cursor stable afterwards
    Box::new(SnapshotIterator::new(self.materialize(), options))
  }

  fn close(&self) -> Result<()> {
    Ok(())
  }
}
