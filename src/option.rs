use lazy_static::lazy_static;
use std::path::PathBuf;

lazy_static! {
  pub static ref DEFAULT_DIR_PATH: PathBuf = std::env::temp_dir().join("ember-kv");
}

/// Configuration for opening an [`Engine`](crate::db::Engine) instance.
#[derive(Debug, Clone)]
pub struct Options {
  /// Directory holding the data files, lock file and merge artefacts.
  pub dir_path: PathBuf,

  /// Rotation threshold of a single data file, in bytes.
  pub data_file_size: u64,

  /// Fsync the active file after every write.
  pub sync_writes: bool,

  /// Fsync once this many bytes have accumulated since the last sync.
  /// 0 disables the threshold.
  pub bytes_per_sync: usize,

  pub index_type: IndexType,

  /// Replay data files through a read-only memory map at startup.
  pub mmap_at_startup: bool,

  /// Minimum fraction of reclaimable bytes before a merge is allowed.
  pub data_file_merge_ratio: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
  /// Balanced tree kept in memory, rebuilt from the log on open.
  BTree,

  /// Adaptive radix tree kept in memory, rebuilt from the log on open.
  Art,

  /// Concurrent skip list kept in memory, rebuilt from the log on open.
  SkipList,

  /// Persistent B+ tree living in its own file; skips log replay on open.
  BPlusTree,
}

impl Default for Options {
  fn default() -> Self {
    Self {
      dir_path: DEFAULT_DIR_PATH.clone(),
      data_file_size: 256 * 1024 * 1024, // 256MB
      sync_writes: false,
      bytes_per_sync: 0,
      index_type: IndexType::BTree,
      mmap_at_startup: true,
      data_file_merge_ratio: 0.6,
    }
  }
}

#[derive(Debug, Clone)]
pub struct IteratorOptions {
  /// Only keys starting with this prefix are yielded. Empty matches all.
  pub prefix: Vec<u8>,
  pub reverse: bool,
}

#[allow(clippy::derivable_impls)]
impl Default for IteratorOptions {
  fn default() -> Self {
    Self {
      prefix: Default::default(),
      reverse: false,
    }
  }
}

#[derive(Debug, Clone)]
pub struct WriteBatchOptions {
  /// Maximum number of staged records a single commit may carry.
  pub max_batch_num: usize,

  /// Fsync the active file once the terminator record is written.
  pub sync_writes: bool,
}

impl Default for WriteBatchOptions {
  fn default() -> Self {
    Self {
      max_batch_num: 10000,
      sync_writes: true,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IOType {
  /// Buffered file IO, used for all writes and ordinary reads.
  Standard,

  /// Read-only memory map, only used to speed up startup replay.
  MemoryMap,
}
