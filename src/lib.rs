//! Ember-KV: an embedded, persistent key/value storage engine built on the
//! Bitcask model.
//!
//! Every write is appended to an on-disk log; an in-memory index maps each
//! live key to the exact position of its most recent record, so a read is
//! one index lookup plus one positioned read. On top of the raw KV the
//! engine offers atomic multi-key batches, ordered iteration with prefix
//! filtering, and background compaction that rewrites only the live records
//! and leaves a hint file behind to accelerate the next open.
//!
//! # Features
//!
//! * Point reads with a single disk access, writes with a single append
//! * Crash-safe write batches committed through a terminator record
//! * Pluggable ordered index: balanced tree, adaptive radix tree,
//!   skip list, or a persistent B+ tree that skips log replay on open
//! * Space reclamation through merge, with a hint file for fast restarts
//! * Optional memory-mapped reads to speed up startup
//!
//! # Basic Usage
//!
//! ```
//! use bytes::Bytes;
//! use ember_kv::{db::Engine, option::Options};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let mut opts = Options::default();
//! opts.dir_path = dir.path().to_path_buf();
//! let engine = Engine::open(opts).expect("failed to open ember-kv engine");
//!
//! let key = Bytes::from("hello");
//! let value = Bytes::from("world");
//! engine.put(key.clone(), value.clone()).expect("failed to put");
//!
//! let retrieved = engine.get(key.clone()).expect("failed to get");
//! assert_eq!(retrieved, value);
//!
//! engine.delete(key).expect("failed to delete");
//! ```

mod data;

mod fio;
mod index;
mod iterator;

pub mod batch;
pub mod db;
#[cfg(test)]
mod db_test;
pub mod errors;
pub mod merge;
pub mod option;
pub mod util;
