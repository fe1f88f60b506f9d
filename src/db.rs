use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use log::error;
use parking_lot::{Mutex, RwLock};

use crate::batch::{log_record_key_with_seq, parse_log_record_key, NON_TXN_SEQ_NO};
use crate::data::data_file::{
  DataFile, DATA_FILE_NAME_SUFFIX, MERGE_FINISHED_FILE_NAME, SEQ_NO_FILE_NAME,
};
use crate::data::log_record::{LogRecord, LogRecordType, RecordPos, TransactionRecord};
use crate::errors::{Errors, Result};
use crate::index::{new_indexer, Indexer};
use crate::merge::{get_non_merge_file_id, load_merge_files};
use crate::option::{IOType, IndexType, Options};
use crate::util;

pub const FILE_LOCK_NAME: &str = "flock";
const SEQ_NO_KEY: &[u8] = b"seq.no";
const INITIAL_FILE_ID: u32 = 0;

/// Point-in-time counters of an engine instance.
#[derive(Debug)]
pub struct Stat {
  pub key_num: usize,
  pub data_file_num: usize,
  /// Bytes of overwritten and deleted records a merge could drop.
  pub reclaimable_size: u64,
  /// Total bytes of the data directory.
  pub disk_size: u64,
}

/// A Bitcask storage engine instance: an append-only log plus an in-memory
/// index mapping each live key to its most recent record on disk.
pub struct Engine {
  pub(crate) options: Arc<Options>,
  pub(crate) active_data_file: Arc<RwLock<DataFile>>,
  pub(crate) old_data_files: Arc<RwLock<HashMap<u32, DataFile>>>,
  pub(crate) index: Box<dyn Indexer>,
  /// File ids discovered at open, ascending. Only meaningful while the
  /// index is being rebuilt.
  file_ids: Vec<u32>,
  /// Serialises the append+index critical sections: put, delete, batch
  /// commit and the rotation step of merge.
  pub(crate) write_lock: Mutex<()>,
  pub(crate) merging_lock: Mutex<()>,
  /// Monotonic batch sequence counter; the largest value seen so far.
  pub(crate) seq_no: Arc<AtomicU64>,
  pub(crate) seq_file_exists: bool,
  pub(crate) is_initial: bool,
  lock_file: File,
  bytes_write: Arc<AtomicUsize>,
  pub(crate) reclaim_size: Arc<AtomicU64>,
  is_closed: AtomicBool,
}

impl Engine {
  /// Opens (or creates) the engine over `options.dir_path`.
  ///
  /// Acquires the directory lock, applies any pending merge swap, loads the
  /// data files and rebuilds the index, from the hint file plus log replay
  /// for the in-memory index types, or from its own file for the persistent
  /// one.
  pub fn open(options: Options) -> Result<Self> {
    check_options(&options)?;

    let dir_path = options.dir_path.clone();
    let mut is_initial = false;
    if !dir_path.is_dir() {
      is_initial = true;
      if let Err(e) = fs::create_dir_all(&dir_path) {
        error!("failed to create the database directory: {}", e);
        return Err(Errors::FailedToCreateDatabaseDir);
      }
    } else if dir_is_empty(&dir_path)? {
      is_initial = true;
    }

    let lock_file = acquire_dir_lock(&dir_path)?;

    load_merge_files(&dir_path)?;

    let index = new_indexer(options.index_type, &dir_path);

    let io_type = if options.mmap_at_startup {
      IOType::MemoryMap
    } else {
      IOType::Standard
    };
    let (file_ids, mut data_files) = load_data_files(&dir_path, io_type)?;
    let active_file = match data_files.pop() {
      Some(file) => file,
      None => DataFile::new(&dir_path, INITIAL_FILE_ID, IOType::Standard)?,
    };
    let mut old_files = HashMap::new();
    for file in data_files {
      old_files.insert(file.get_file_id(), file);
    }

    let mut engine = Engine {
      options: Arc::new(options),
      active_data_file: Arc::new(RwLock::new(active_file)),
      old_data_files: Arc::new(RwLock::new(old_files)),
      index,
      file_ids,
      write_lock: Mutex::new(()),
      merging_lock: Mutex::new(()),
      seq_no: Arc::new(AtomicU64::new(NON_TXN_SEQ_NO)),
      seq_file_exists: false,
      is_initial,
      lock_file,
      bytes_write: Arc::new(AtomicUsize::new(0)),
      reclaim_size: Arc::new(AtomicU64::new(0)),
      is_closed: AtomicBool::new(false),
    };

    if engine.options.index_type != IndexType::BPlusTree {
      engine.load_index_from_hint_file()?;
      engine.load_index_from_data_files()?;
    } else {
      // the persistent index already holds every position, only the batch
      // counter and the append offset need restoring
      engine.load_seq_no()?;
      let active_file = engine.active_data_file.read();
      active_file.set_write_off(active_file.file_size());
    }

    if engine.options.mmap_at_startup {
      engine.reset_io_type()?;
    }

    Ok(engine)
  }

  /// Flushes state and releases the directory lock. Safe to call more than
  /// once; `Drop` calls it as well.
  pub fn close(&self) -> Result<()> {
    if self.is_closed.swap(true, Ordering::SeqCst) {
      return Ok(());
    }

    // rewrite the batch counter from scratch so the next open reads a
    // single fresh record
    let seq_no_path = self.options.dir_path.join(SEQ_NO_FILE_NAME);
    if seq_no_path.is_file() {
      let _ = fs::remove_file(&seq_no_path);
    }
    let seq_no_file = DataFile::new_seq_no_file(&self.options.dir_path)?;
    let record = LogRecord {
      key: SEQ_NO_KEY.to_vec(),
      value: self.seq_no.load(Ordering::SeqCst).to_string().into_bytes(),
      rec_type: LogRecordType::Normal,
    };
    seq_no_file.write(&record.encode())?;
    seq_no_file.sync()?;

    self.index.close()?;
    self.active_data_file.read().sync()?;
    util::file::unlock_file(&self.lock_file);
    Ok(())
  }

  /// Fsyncs the active data file.
  pub fn sync(&self) -> Result<()> {
    self.active_data_file.read().sync()
  }

  pub fn stat(&self) -> Result<Stat> {
    let old_files = self.old_data_files.read();
    Ok(Stat {
      key_num: self.index.size(),
      data_file_num: old_files.len() + 1,
      reclaimable_size: self.reclaim_size.load(Ordering::SeqCst),
      disk_size: util::file::dir_disk_size(&self.options.dir_path),
    })
  }

  /// Copies the data directory to `dir`, leaving the lock file behind.
  /// Writers are held off for the duration of the copy.
  pub fn backup(&self, dir: impl AsRef<Path>) -> Result<()> {
    let _guard = self.write_lock.lock();
    if let Err(e) = util::file::copy_dir(&self.options.dir_path, dir.as_ref(), &[FILE_LOCK_NAME]) {
      error!("failed to back up the database directory: {}", e);
      return Err(Errors::FailedToCopyDirectory);
    }
    Ok(())
  }

  /// Stores `value` under `key`, overwriting any previous value.
  pub fn put(&self, key: Bytes, value: Bytes) -> Result<()> {
    if key.is_empty() {
      return Err(Errors::KeyIsEmpty);
    }

    let record = LogRecord {
      key: log_record_key_with_seq(&key, NON_TXN_SEQ_NO),
      value: value.to_vec(),
      rec_type: LogRecordType::Normal,
    };

    let _guard = self.write_lock.lock();
    let pos = self.append_log_record(&record)?;
    if let Some(old_pos) = self.index.put(key.to_vec(), pos) {
      self
        .reclaim_size
        .fetch_add(old_pos.size as u64, Ordering::SeqCst);
    }
    Ok(())
  }

  /// Removes `key`. Removing an absent key succeeds without writing.
  pub fn delete(&self, key: Bytes) -> Result<()> {
    if key.is_empty() {
      return Err(Errors::KeyIsEmpty);
    }

    let _guard = self.write_lock.lock();
    if self.index.get(key.to_vec()).is_none() {
      return Ok(());
    }

    let record = LogRecord {
      key: log_record_key_with_seq(&key, NON_TXN_SEQ_NO),
      value: Vec::new(),
      rec_type: LogRecordType::Deleted,
    };
    let pos = self.append_log_record(&record)?;
    // the tombstone itself is dead weight from the moment it is written
    self
      .reclaim_size
      .fetch_add(pos.size as u64, Ordering::SeqCst);

    match self.index.delete(key.to_vec()) {
      Some(old_pos) => {
        self
          .reclaim_size
          .fetch_add(old_pos.size as u64, Ordering::SeqCst);
        Ok(())
      }
      None => Err(Errors::IndexUpdateFailed),
    }
  }

  pub fn get(&self, key: Bytes) -> Result<Bytes> {
    if key.is_empty() {
      return Err(Errors::KeyIsEmpty);
    }
    match self.index.get(key.to_vec()) {
      Some(pos) => self.get_value_by_position(pos),
      None => Err(Errors::KeyNotFound),
    }
  }

  /// All live keys in ascending order.
  pub fn list_keys(&self) -> Result<Vec<Bytes>> {
    self.index.list_keys()
  }

  /// Calls `f` for every live pair in ascending key order until it returns
  /// false.
  pub fn fold<F>(&self, f: F) -> Result<()>
  where
    F: Fn(Bytes, Bytes) -> bool,
  {
    let mut index_iter = self.index.iterator(Default::default());
    while let Some((key, pos)) = index_iter.next() {
      let value = self.get_value_by_position(*pos)?;
      if !f(Bytes::copy_from_slice(key), value) {
        break;
      }
    }
    Ok(())
  }

  pub(crate) fn get_value_by_position(&self, pos: RecordPos) -> Result<Bytes> {
    let active_file = self.active_data_file.read();
    let read_record = if active_file.get_file_id() == pos.file_id {
      active_file.read_record(pos.offset)?
    } else {
      let old_files = self.old_data_files.read();
      match old_files.get(&pos.file_id) {
        Some(data_file) => data_file.read_record(pos.offset)?,
        None => return Err(Errors::DataFileNotFound),
      }
    };
    // a concurrent delete can leave the snapshot pointing at a tombstone
    if read_record.record.rec_type == LogRecordType::Deleted {
      return Err(Errors::KeyNotFound);
    }
    Ok(Bytes::from(read_record.record.value))
  }

  /// Appends an encoded record to the active file, rotating it first when
  /// the write would cross the size threshold. Returns where the record
  /// landed.
  pub(crate) fn append_log_record(&self, record: &LogRecord) -> Result<RecordPos> {
    let dir_path = &self.options.dir_path;
    let enc_record = record.encode();
    let record_len = enc_record.len() as u64;

    let mut active_file = self.active_data_file.write();
    if active_file.get_write_off() + record_len > self.options.data_file_size {
      active_file.sync()?;

      let current_fid = active_file.get_file_id();
      let mut old_files = self.old_data_files.write();
      let old_file = DataFile::new(dir_path, current_fid, IOType::Standard)?;
      old_files.insert(current_fid, old_file);

      *active_file = DataFile::new(dir_path, current_fid + 1, IOType::Standard)?;
    }

    let write_off = active_file.get_write_off();
    active_file.write(&enc_record)?;

    let written = self
      .bytes_write
      .fetch_add(enc_record.len(), Ordering::SeqCst)
      + enc_record.len();
    let need_sync = self.options.sync_writes
      || (self.options.bytes_per_sync > 0 && written >= self.options.bytes_per_sync);
    if need_sync {
      active_file.sync()?;
      self.bytes_write.store(0, Ordering::SeqCst);
    }

    Ok(RecordPos {
      file_id: active_file.get_file_id(),
      offset: write_off,
      size: enc_record.len() as u32,
    })
  }

  /// Rebuilds the index by replaying every data file at or above the merge
  /// boundary, resurrecting batch records only once their terminator shows
  /// up.
  fn load_index_from_data_files(&self) -> Result<()> {
    if self.file_ids.is_empty() {
      return Ok(());
    }

    let mut has_merge = false;
    let mut non_merge_file_id = 0;
    if self
      .options
      .dir_path
      .join(MERGE_FINISHED_FILE_NAME)
      .is_file()
    {
      non_merge_file_id = get_non_merge_file_id(&self.options.dir_path)?;
      has_merge = true;
    }

    let update_index = |key: Vec<u8>, rec_type: LogRecordType, pos: RecordPos| {
      let old_pos = if rec_type == LogRecordType::Deleted {
        self
          .reclaim_size
          .fetch_add(pos.size as u64, Ordering::SeqCst);
        self.index.delete(key)
      } else {
        self.index.put(key, pos)
      };
      if let Some(old_pos) = old_pos {
        self
          .reclaim_size
          .fetch_add(old_pos.size as u64, Ordering::SeqCst);
      }
    };

    let mut txn_records: HashMap<u64, Vec<TransactionRecord>> = HashMap::new();
    let mut current_seq_no = NON_TXN_SEQ_NO;

    for (i, &file_id) in self.file_ids.iter().enumerate() {
      // everything below the merge boundary is already covered by the hint
      if has_merge && file_id < non_merge_file_id {
        continue;
      }

      let active_file = self.active_data_file.read();
      let old_files = self.old_data_files.read();
      let data_file = if active_file.get_file_id() == file_id {
        &*active_file
      } else {
        old_files.get(&file_id).ok_or(Errors::DataFileNotFound)?
      };

      let mut offset = 0;
      loop {
        let (record, size) = match data_file.read_record(offset) {
          Ok(read) => (read.record, read.size),
          Err(Errors::ReadDataFileEOF) => break,
          Err(e) => return Err(e),
        };

        let pos = RecordPos {
          file_id,
          offset,
          size: size as u32,
        };
        let (real_key, seq_no) = parse_log_record_key(&record.key);
        if seq_no == NON_TXN_SEQ_NO {
          update_index(real_key, record.rec_type, pos);
        } else if record.rec_type == LogRecordType::TxnFinished {
          if let Some(records) = txn_records.remove(&seq_no) {
            for txn_record in records {
              update_index(txn_record.record.key, txn_record.record.rec_type, txn_record.pos);
            }
          }
          // the terminator never becomes live itself
          self.reclaim_size.fetch_add(size, Ordering::SeqCst);
        } else {
          txn_records.entry(seq_no).or_default().push(TransactionRecord {
            record: LogRecord {
              key: real_key,
              value: record.value,
              rec_type: record.rec_type,
            },
            pos,
          });
        }
        current_seq_no = current_seq_no.max(seq_no);
        offset += size;
      }

      if i == self.file_ids.len() - 1 {
        active_file.set_write_off(offset);
      }
    }

    self.seq_no.store(current_seq_no, Ordering::SeqCst);
    Ok(())
  }

  fn load_seq_no(&mut self) -> Result<()> {
    let file_name = self.options.dir_path.join(SEQ_NO_FILE_NAME);
    if !file_name.is_file() {
      return Ok(());
    }

    let seq_no_file = DataFile::new_seq_no_file(&self.options.dir_path)?;
    let read = seq_no_file.read_record(0)?;
    let seq_no = String::from_utf8(read.record.value)
      .ok()
      .and_then(|v| v.parse::<u64>().ok())
      .ok_or(Errors::DataDirectoryCorrupted)?;
    self.seq_no.store(seq_no, Ordering::SeqCst);
    self.seq_file_exists = true;

    // consume the file so a crash before the next clean close cannot hand
    // out an outdated counter
    if let Err(e) = fs::remove_file(&file_name) {
      error!("failed to remove the seq-no file: {}", e);
      return Err(Errors::FailedToReadDatabaseDir);
    }
    Ok(())
  }

  /// Swaps every data file back to buffered IO after an mmap-assisted open.
  fn reset_io_type(&self) -> Result<()> {
    let mut active_file = self.active_data_file.write();
    active_file.set_io_manager(&self.options.dir_path, IOType::Standard)?;

    let mut old_files = self.old_data_files.write();
    for (_, data_file) in old_files.iter_mut() {
      data_file.set_io_manager(&self.options.dir_path, IOType::Standard)?;
    }
    Ok(())
  }
}

impl Drop for Engine {
  fn drop(&mut self) {
    if let Err(e) = self.close() {
      error!("failed to close the engine: {}", e);
    }
  }
}

fn check_options(options: &Options) -> Result<()> {
  if options.dir_path.as_os_str().is_empty() {
    return Err(Errors::InvalidDirPath);
  }
  if options.data_file_size == 0 {
    return Err(Errors::InvalidDataFileSize);
  }
  if !(0.0..=1.0).contains(&options.data_file_merge_ratio) {
    return Err(Errors::InvalidMergeRatio);
  }
  Ok(())
}

fn dir_is_empty(dir_path: &Path) -> Result<bool> {
  match fs::read_dir(dir_path) {
    Ok(mut entries) => Ok(entries.next().is_none()),
    Err(e) => {
      error!("failed to read the database directory: {}", e);
      Err(Errors::FailedToReadDatabaseDir)
    }
  }
}

fn acquire_dir_lock(dir_path: &Path) -> Result<File> {
  let lock_path = dir_path.join(FILE_LOCK_NAME);
  let lock_file = match OpenOptions::new()
    .create(true)
    .read(true)
    .write(true)
    .open(&lock_path)
  {
    Ok(file) => file,
    Err(e) => {
      error!("failed to open the directory lock file: {}", e);
      return Err(Errors::FailedToOpenDataFile);
    }
  };
  if !util::file::try_lock_file(&lock_file) {
    return Err(Errors::DatabaseIsUsing);
  }
  Ok(lock_file)
}

fn load_data_files(dir_path: &Path, io_type: IOType) -> Result<(Vec<u32>, Vec<DataFile>)> {
  let dir_entries = match fs::read_dir(dir_path) {
    Ok(entries) => entries,
    Err(e) => {
      error!("failed to read the database directory: {}", e);
      return Err(Errors::FailedToReadDatabaseDir);
    }
  };

  let mut file_ids = Vec::new();
  for entry in dir_entries.flatten() {
    let file_os_name = entry.file_name();
    let file_name = file_os_name.to_string_lossy();
    if let Some(stem) = file_name.strip_suffix(DATA_FILE_NAME_SUFFIX) {
      let file_id = stem
        .parse::<u32>()
        .map_err(|_| Errors::DataDirectoryCorrupted)?;
      file_ids.push(file_id);
    }
  }
  file_ids.sort_unstable();

  let mut data_files = Vec::with_capacity(file_ids.len());
  for &file_id in file_ids.iter() {
    data_files.push(DataFile::new(dir_path, file_id, io_type)?);
  }
  Ok((file_ids, data_files))
}
