use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use log::error;

use crate::batch::{log_record_key_with_seq, parse_log_record_key, NON_TXN_SEQ_NO};
use crate::data::data_file::{
  get_data_file_name, DataFile, DATA_FILE_NAME_SUFFIX, HINT_FILE_NAME, MERGE_FINISHED_FILE_NAME,
  SEQ_NO_FILE_NAME,
};
use crate::data::log_record::{decode_record_pos, LogRecord, LogRecordType};
use crate::db::{Engine, FILE_LOCK_NAME};
use crate::errors::{Errors, Result};
use crate::option::{IOType, IndexType, Options};
use crate::util;

const MERGE_DIR_SUFFIX: &str = "-merge";
const MERGE_FIN_KEY: &[u8] = b"merge.finished";

impl Engine {
  /// Compacts the log: copies every live record into a sibling `-merge`
  /// directory, writes a hint file mapping each live key to its new
  /// position, and marks completion. The next open swaps the compacted
  /// files in.
  ///
  /// Writers keep running while the copy is in flight; they land in files
  /// above the recorded boundary, which this pass deliberately leaves
  /// alone.
  pub fn merge(&self) -> Result<()> {
    if self.is_engine_empty() {
      return Ok(());
    }

    let _merge_guard = match self.merging_lock.try_lock() {
      Some(guard) => guard,
      None => return Err(Errors::MergeInProgress),
    };

    let reclaim_size = self.reclaim_size.load(Ordering::SeqCst);
    let total_size = util::file::dir_disk_size(&self.options.dir_path);
    if (reclaim_size as f32) / (total_size as f32) < self.options.data_file_merge_ratio {
      return Err(Errors::MergeRatioUnreached);
    }
    if total_size.saturating_sub(reclaim_size) >= util::file::available_disk_space() {
      return Err(Errors::MergeNoEnoughSpace);
    }

    let merge_path = get_merge_path(&self.options.dir_path);
    if merge_path.is_dir() {
      if let Err(e) = fs::remove_dir_all(&merge_path) {
        error!("failed to remove the stale merge directory: {}", e);
        return Err(Errors::FailedToCreateDatabaseDir);
      }
    }
    if let Err(e) = fs::create_dir_all(&merge_path) {
      error!("failed to create the merge directory: {}", e);
      return Err(Errors::FailedToCreateDatabaseDir);
    }

    let (merge_files, non_merge_file_id) = self.rotate_for_merge()?;

    let merge_engine = Engine::open(Options {
      dir_path: merge_path.clone(),
      data_file_size: self.options.data_file_size,
      sync_writes: false,
      bytes_per_sync: 0,
      index_type: IndexType::BTree,
      mmap_at_startup: false,
      data_file_merge_ratio: self.options.data_file_merge_ratio,
    })?;
    let hint_file = DataFile::new_hint_file(&merge_path)?;

    for data_file in merge_files.iter() {
      let mut offset = 0;
      loop {
        let (record, size) = match data_file.read_record(offset) {
          Ok(read) => (read.record, read.size),
          Err(Errors::ReadDataFileEOF) => break,
          Err(e) => return Err(e),
        };

        let (real_key, _) = parse_log_record_key(&record.key);
        if let Some(index_pos) = self.index.get(real_key.clone()) {
          if index_pos.file_id == data_file.get_file_id() && index_pos.offset == offset {
            // still live; merged records are known-committed, the batch
            // tag goes away
            let rewritten = LogRecord {
              key: log_record_key_with_seq(&real_key, NON_TXN_SEQ_NO),
              value: record.value,
              rec_type: record.rec_type,
            };
            let new_pos = merge_engine.append_log_record(&rewritten)?;
            hint_file.write_hint_record(real_key, new_pos)?;
          }
        }
        offset += size;
      }
    }

    merge_engine.sync()?;
    hint_file.sync()?;

    // the marker is the commit point of the whole merge
    let merge_fin_file = DataFile::new_merge_fin_file(&merge_path)?;
    let fin_record = LogRecord {
      key: MERGE_FIN_KEY.to_vec(),
      value: non_merge_file_id.to_string().into_bytes(),
      rec_type: LogRecordType::Normal,
    };
    merge_fin_file.write(&fin_record.encode())?;
    merge_fin_file.sync()?;

    Ok(())
  }

  fn is_engine_empty(&self) -> bool {
    let active_file = self.active_data_file.read();
    let old_files = self.old_data_files.read();
    active_file.get_write_off() == 0 && old_files.is_empty()
  }

  /// Seals the active file and opens a fresh one, returning read handles on
  /// every sealed file plus the first file id that stays out of this merge
  /// pass. Runs under the engine write lock so no batch commit is split
  /// across the boundary.
  fn rotate_for_merge(&self) -> Result<(Vec<DataFile>, u32)> {
    let _guard = self.write_lock.lock();
    let mut active_file = self.active_data_file.write();
    let mut old_files = self.old_data_files.write();

    active_file.sync()?;
    let active_file_id = active_file.get_file_id();
    *active_file = DataFile::new(&self.options.dir_path, active_file_id + 1, IOType::Standard)?;
    let sealed = DataFile::new(&self.options.dir_path, active_file_id, IOType::Standard)?;
    old_files.insert(active_file_id, sealed);

    let mut merge_file_ids: Vec<u32> = old_files.keys().copied().collect();
    merge_file_ids.sort_unstable();

    // separate handles so the scan never contends with the read path
    let mut merge_files = Vec::with_capacity(merge_file_ids.len());
    for file_id in merge_file_ids {
      merge_files.push(DataFile::new(&self.options.dir_path, file_id, IOType::Standard)?);
    }
    Ok((merge_files, active_file_id + 1))
  }

  /// Preloads the index from the hint file left behind by the last merge.
  pub(crate) fn load_index_from_hint_file(&self) -> Result<()> {
    let hint_file_path = self.options.dir_path.join(HINT_FILE_NAME);
    if !hint_file_path.is_file() {
      return Ok(());
    }

    let hint_file = DataFile::new_hint_file(&self.options.dir_path)?;
    let mut offset = 0;
    loop {
      let (record, size) = match hint_file.read_record(offset) {
        Ok(read) => (read.record, read.size),
        Err(Errors::ReadDataFileEOF) => break,
        Err(e) => return Err(e),
      };
      let pos = decode_record_pos(&record.value);
      self.index.put(record.key, pos);
      offset += size;
    }
    Ok(())
  }
}

fn get_merge_path(dir_path: impl AsRef<Path>) -> PathBuf {
  let dir_path = dir_path.as_ref();
  let file_name = dir_path.file_name().unwrap_or_default();
  let merge_name = format!("{}{}", file_name.to_string_lossy(), MERGE_DIR_SUFFIX);
  dir_path
    .parent()
    .map(|p| p.to_path_buf())
    .unwrap_or_default()
    .join(merge_name)
}

/// Applies a completed merge at open: deletes the compacted-away files from
/// the live directory and moves the merge output in. A `-merge` directory
/// without the finished marker is a crashed attempt and is pruned instead.
pub(crate) fn load_merge_files(dir_path: impl AsRef<Path>) -> Result<()> {
  let merge_path = get_merge_path(&dir_path);
  if !merge_path.is_dir() {
    return Ok(());
  }

  let dir_entries = match fs::read_dir(&merge_path) {
    Ok(entries) => entries,
    Err(e) => {
      error!("failed to read the merge directory: {}", e);
      return Err(Errors::FailedToReadDatabaseDir);
    }
  };

  let mut merge_finished = false;
  let mut merge_file_names = Vec::new();
  for entry in dir_entries.flatten() {
    let file_os_name = entry.file_name();
    let file_name = file_os_name.to_string_lossy().to_string();
    if file_name == MERGE_FINISHED_FILE_NAME {
      merge_finished = true;
    }
    if file_name == SEQ_NO_FILE_NAME || file_name == FILE_LOCK_NAME {
      continue;
    }
    // an empty data file carries nothing worth moving
    if file_name.ends_with(DATA_FILE_NAME_SUFFIX)
      && entry.metadata().map(|m| m.len()).unwrap_or(0) == 0
    {
      continue;
    }
    merge_file_names.push(file_os_name);
  }

  if !merge_finished {
    let _ = fs::remove_dir_all(&merge_path);
    return Ok(());
  }

  let non_merge_file_id = get_non_merge_file_id(&merge_path)?;

  for file_id in 0..non_merge_file_id {
    let file_name = get_data_file_name(&dir_path, file_id);
    if file_name.is_file() {
      if let Err(e) = fs::remove_file(&file_name) {
        error!("failed to remove a compacted data file: {}", e);
        return Err(Errors::DataDirectoryCorrupted);
      }
    }
  }

  for file_name in merge_file_names {
    let src_path = merge_path.join(&file_name);
    let dst_path = dir_path.as_ref().join(&file_name);
    if let Err(e) = fs::rename(&src_path, &dst_path) {
      error!("failed to move a merged file into place: {}", e);
      return Err(Errors::DataDirectoryCorrupted);
    }
  }

  let _ = fs::remove_dir_all(&merge_path);
  Ok(())
}

/// Reads the smallest file id that did not take part in the completed merge
/// out of the finished marker.
pub(crate) fn get_non_merge_file_id(dir_path: impl AsRef<Path>) -> Result<u32> {
  let merge_fin_file = DataFile::new_merge_fin_file(&dir_path)?;
  let read = merge_fin_file.read_record(0)?;
  String::from_utf8(read.record.value)
    .ok()
    .and_then(|v| v.parse::<u32>().ok())
    .ok_or(Errors::DataDirectoryCorrupted)
}
