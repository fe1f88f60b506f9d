use std::sync::Arc;

use bytes::Bytes;
use crossbeam_skiplist::SkipMap;

use crate::data::log_record::RecordPos;
use crate::errors::Result;
use crate::option::IteratorOptions;

use super::{IndexIterator, Indexer, SnapshotIterator};

/// Lock-free concurrent skip list index. The map itself needs no external
/// locking; `put` reads the previous entry first, which is exact under the
/// engine's serialised write path.
pub struct SkipList {
  tree: Arc<SkipMap<Vec<u8>, RecordPos>>,
}

impl SkipList {
  pub fn new() -> Self {
    Self {
      tree: Arc::new(SkipMap::new()),
    }
  }
}

impl Default for SkipList {
  fn default() -> Self {
    Self::new()
  }
}

impl Indexer for SkipList {
  fn put(&self, key: Vec<u8>, pos: RecordPos) -> Option<RecordPos> {
    let prev = self.tree.get(&key).map(|entry| *entry.value());
    self.tree.insert(key, pos);
    prev
  }

  fn get(&self, key: Vec<u8>) -> Option<RecordPos> {
    self.tree.get(&key).map(|entry| *entry.value())
  }

  fn delete(&self, key: Vec<u8>) -> Option<RecordPos> {
    self.tree.remove(&key).map(|entry| *entry.value())
  }

  fn size(&self) -> usize {
    self.tree.len()
  }

  fn list_keys(&self) -> Result<Vec<Bytes>> {
    Ok(
      self
        .tree
        .iter()
        .map(|entry| Bytes::copy_from_slice(entry.key()))
        .collect(),
    )
  }

  fn iterator(&self, options: IteratorOptions) -> Box<dyn IndexIterator> {
    let items = self
      .tree
      .iter()
      .map(|entry| (entry.key().clone(), *entry.value()))
      .collect();
    Box::new(SnapshotIterator::new(items, options))
  }

  fn close(&self) -> Result<()> {
    Ok(())
  }
}
