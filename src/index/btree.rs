use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::data::log_record::RecordPos;
use crate::errors::Result;
use crate::option::IteratorOptions;

use super::{IndexIterator, Indexer, SnapshotIterator};

/// Balanced-tree index over a std `BTreeMap`, keys compared as raw bytes.
pub struct BTree {
  tree: Arc<RwLock<BTreeMap<Vec<u8>, RecordPos>>>,
}

impl BTree {
  pub fn new() -> Self {
    Self {
      tree: Arc::new(RwLock::new(BTreeMap::new())),
    }
  }
}

impl Default for BTree {
  fn default() -> Self {
    Self::new()
  }
}

impl Indexer for BTree {
  fn put(&self, key: Vec<u8>, pos: RecordPos) -> Option<RecordPos> {
    self.tree.write().insert(key, pos)
  }

  fn get(&self, key: Vec<u8>) -> Option<RecordPos> {
    self.tree.read().get(&key).copied()
  }

  fn delete(&self, key: Vec<u8>) -> Option<RecordPos> {
    self.tree.write().remove(&key)
  }

  fn size(&self) -> usize {
    self.tree.read().len()
  }

  fn list_keys(&self) -> Result<Vec<Bytes>> {
    let tree = self.tree.read();
    Ok(tree.keys().map(|k| Bytes::copy_from_slice(k)).collect())
  }

  fn iterator(&self, options: IteratorOptions) -> Box<dyn IndexIterator> {
    let tree = self.tree.read();
    let items = tree.iter().map(|(k, v)| (k.clone(), *v)).collect();
    Box::new(SnapshotIterator::new(items, options))
  }

  fn close(&self) -> Result<()> {
    Ok(())
  }
}
