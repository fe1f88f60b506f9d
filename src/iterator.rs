use bytes::Bytes;
use log::error;
use parking_lot::RwLock;

use crate::db::Engine;
use crate::errors::Errors;
use crate::index::IndexIterator;
use crate::option::IteratorOptions;

/// Ordered traversal over the live keys of an engine.
///
/// The cursor walks a snapshot of the index taken at construction; values
/// are resolved lazily through the engine read path on each step. Sealed
/// files are immutable and merge swaps only happen at open, so positions in
/// the snapshot stay readable while the iterator lives.
pub struct Iterator<'a> {
  index_iter: RwLock<Box<dyn IndexIterator>>,
  engine: &'a Engine,
}

impl Engine {
  pub fn iter(&self, options: IteratorOptions) -> Iterator<'_> {
    Iterator {
      index_iter: RwLock::new(self.index.iterator(options)),
      engine: self,
    }
  }
}

impl Iterator<'_> {
  /// Returns to the first key of the traversal direction.
  pub fn rewind(&self) {
    self.index_iter.write().rewind();
  }

  /// Positions at the first key >= `key`, or <= `key` when reversed.
  pub fn seek(&self, key: Vec<u8>) {
    self.index_iter.write().seek(key);
  }

  /// Yields the next matching pair, or `None` once the snapshot is
  /// exhausted. Keys whose record was deleted after the snapshot was taken
  /// are skipped.
  pub fn next(&self) -> Option<(Bytes, Bytes)> {
    let mut index_iter = self.index_iter.write();
    while let Some((key, pos)) = index_iter.next() {
      match self.engine.get_value_by_position(*pos) {
        Ok(value) => return Some((Bytes::copy_from_slice(key), value)),
        // raced with a concurrent delete, move on
        Err(Errors::KeyNotFound) => continue,
        Err(e) => {
          error!("failed to resolve value during iteration: {}", e);
          return None;
        }
      }
    }
    None
  }
}
