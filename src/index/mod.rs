pub mod art;
pub mod bptree;
pub mod btree;
pub mod skiplist;

use std::path::Path;

use bytes::Bytes;

use crate::data::log_record::RecordPos;
use crate::errors::Result;
use crate::option::{IndexType, IteratorOptions};

/// Ordered in-memory map from user key to on-disk record position.
///
/// Implementations carry their own interior locking, so every method is safe
/// to call from any thread. `put` and `delete` hand back the previous
/// position when there was one; the engine feeds those into its
/// reclaimable-byte accounting without a second lookup.
pub trait Indexer: Sync + Send {
  fn put(&self, key: Vec<u8>, pos: RecordPos) -> Option<RecordPos>;

  fn get(&self, key: Vec<u8>) -> Option<RecordPos>;

  fn delete(&self, key: Vec<u8>) -> Option<RecordPos>;

  fn size(&self) -> usize;

  fn list_keys(&self) -> Result<Vec<Bytes>>;

  fn iterator(&self, options: IteratorOptions) -> Box<dyn IndexIterator>;

  /// Flushes whatever the implementation keeps on disk. Remaining resources
  /// ride on `Drop`.
  fn close(&self) -> Result<()>;
}

pub fn new_indexer(index_type: IndexType, dir_path: &Path) -> Box<dyn Indexer> {
  match index_type {
    IndexType::BTree => Box::new(btree::BTree::new()),
    IndexType::Art => Box::new(art::AdaptiveRadixTree::new()),
    IndexType::SkipList => Box::new(skiplist::SkipList::new()),
    IndexType::BPlusTree => Box::new(bptree::BPlusTree::new(dir_path)),
  }
}

/// Cursor over an index snapshot.
///
/// `rewind` returns to the first element of the traversal direction, `seek`
/// positions at the first key >= the target (<= when reversed), and `next`
/// yields elements until the snapshot is exhausted, skipping keys that do
/// not carry the configured prefix.
pub trait IndexIterator: Sync + Send {
  fn rewind(&mut self);

  fn seek(&mut self, key: Vec<u8>);

  fn next(&mut self) -> Option<(&Vec<u8>, &RecordPos)>;
}

/// Shared cursor logic for the in-memory indexes: they all materialise a
/// sorted `(key, position)` snapshot at construction and walk it by index.
pub(crate) struct SnapshotIterator {
  items: Vec<(Vec<u8>, RecordPos)>,
  curr_index: usize,
  options: IteratorOptions,
}

impl SnapshotIterator {
  /// `items` must be sorted in ascending key order; the constructor flips it
  /// for reverse traversal.
  pub(crate) fn new(mut items: Vec<(Vec<u8>, RecordPos)>, options: IteratorOptions) -> Self {
    if options.reverse {
      items.reverse();
    }
    SnapshotIterator {
      items,
      curr_index: 0,
      options,
    }
  }
}

impl IndexIterator for SnapshotIterator {
  fn rewind(&mut self) {
    self.curr_index = 0;
  }

  fn seek(&mut self, key: Vec<u8>) {
    self.curr_index = self
      .items
      .binary_search_by(|(item_key, _)| {
        if self.options.reverse {
          item_key.cmp(&key).reverse()
        } else {
          item_key.cmp(&key)
        }
      })
      .unwrap_or_else(|insert_at| insert_at);
  }

  fn next(&mut self) -> Option<(&Vec<u8>, &RecordPos)> {
    while self.curr_index < self.items.len() {
      let idx = self.curr_index;
      self.curr_index += 1;
      let item = &self.items[idx];
      if self.options.prefix.is_empty() || item.0.starts_with(&self.options.prefix) {
        return Some((&item.0, &item.1));
      }
    }
    None
  }
}
