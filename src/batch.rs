use std::collections::HashMap;
use std::sync::atomic::Ordering;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::data::log_record::{LogRecord, LogRecordType, RecordPos};
use crate::db::Engine;
use crate::errors::{Errors, Result};
use crate::option::{IndexType, WriteBatchOptions};
use crate::util::varint::{decode_uvarint, encode_uvarint, MAX_VARINT_LEN64};

/// Sequence number of plain, non-batch writes.
pub(crate) const NON_TXN_SEQ_NO: u64 = 0;

/// Sentinel user key carried by a batch terminator record. Readers match on
/// the record type, never on this key.
pub(crate) const TXN_FIN_KEY: &[u8] = b"txn-fin";

/// A set of writes staged in memory and committed atomically.
///
/// Staged records only reach the log on [`commit`](WriteBatch::commit): each
/// one is appended tagged with a fresh sequence number, followed by one
/// terminator record that marks the batch as committed. Recovery replays a
/// batch only when its terminator made it to disk, so a crash mid-commit
/// contributes nothing.
pub struct WriteBatch<'a> {
  pending_writes: Mutex<HashMap<Vec<u8>, LogRecord>>,
  engine: &'a Engine,
  options: WriteBatchOptions,
}

impl Engine {
  /// Creates an empty batch.
  ///
  /// With the persistent index the batch counter cannot be rebuilt from the
  /// log, so a directory that is neither fresh nor carries a `seq-no` file
  /// refuses batches instead of risking duplicate sequence numbers.
  pub fn new_write_batch(&self, options: WriteBatchOptions) -> Result<WriteBatch<'_>> {
    if self.options.index_type == IndexType::BPlusTree
      && !self.seq_file_exists
      && !self.is_initial
    {
      return Err(Errors::UnableToUseWriteBatch);
    }
    Ok(WriteBatch {
      pending_writes: Mutex::new(HashMap::new()),
      engine: self,
      options,
    })
  }
}

impl WriteBatch<'_> {
  /// Stages a put. The latest staged write for a key wins.
  pub fn put(&self, key: Bytes, value: Bytes) -> Result<()> {
    if key.is_empty() {
      return Err(Errors::KeyIsEmpty);
    }
    let record = LogRecord {
      key: key.to_vec(),
      value: value.to_vec(),
      rec_type: LogRecordType::Normal,
    };
    self.pending_writes.lock().insert(key.to_vec(), record);
    Ok(())
  }

  /// Stages a delete. Deleting a key unknown to both the index and the
  /// batch just drops any staged put for it.
  pub fn delete(&self, key: Bytes) -> Result<()> {
    if key.is_empty() {
      return Err(Errors::KeyIsEmpty);
    }
    let mut pending = self.pending_writes.lock();
    if self.engine.index.get(key.to_vec()).is_none() {
      pending.remove(&key.to_vec());
      return Ok(());
    }
    let record = LogRecord {
      key: key.to_vec(),
      value: Vec::new(),
      rec_type: LogRecordType::Deleted,
    };
    pending.insert(key.to_vec(), record);
    Ok(())
  }

  /// Writes the staged records under one fresh sequence number, appends the
  /// terminator record, optionally fsyncs, and only then applies the batch
  /// to the index.
  pub fn commit(&self) -> Result<()> {
    let mut pending = self.pending_writes.lock();
    if pending.is_empty() {
      return Ok(());
    }
    if pending.len() > self.options.max_batch_num {
      return Err(Errors::ExceedMaxBatchNum);
    }

    // hold the engine write lock across the whole commit so no other writer
    // interleaves between the batch records and their terminator
    let _guard = self.engine.write_lock.lock();

    let seq_no = self.engine.seq_no.fetch_add(1, Ordering::SeqCst) + 1;

    let mut positions: HashMap<Vec<u8>, RecordPos> = HashMap::with_capacity(pending.len());
    for record in pending.values() {
      let pos = self.engine.append_log_record(&LogRecord {
        key: log_record_key_with_seq(&record.key, seq_no),
        value: record.value.clone(),
        rec_type: record.rec_type,
      })?;
      positions.insert(record.key.clone(), pos);
    }

    // the commit point
    let fin_record = LogRecord {
      key: log_record_key_with_seq(TXN_FIN_KEY, seq_no),
      value: Vec::new(),
      rec_type: LogRecordType::TxnFinished,
    };
    let fin_pos = self.engine.append_log_record(&fin_record)?;
    // the terminator never becomes live itself
    self
      .engine
      .reclaim_size
      .fetch_add(fin_pos.size as u64, Ordering::SeqCst);

    if self.options.sync_writes {
      self.engine.active_data_file.read().sync()?;
    }

    for record in pending.values() {
      let pos = positions[&record.key];
      match record.rec_type {
        LogRecordType::Normal => {
          if let Some(old_pos) = self.engine.index.put(record.key.clone(), pos) {
            self
              .engine
              .reclaim_size
              .fetch_add(old_pos.size as u64, Ordering::SeqCst);
          }
        }
        LogRecordType::Deleted => {
          self
            .engine
            .reclaim_size
            .fetch_add(pos.size as u64, Ordering::SeqCst);
          if let Some(old_pos) = self.engine.index.delete(record.key.clone()) {
            self
              .engine
              .reclaim_size
              .fetch_add(old_pos.size as u64, Ordering::SeqCst);
          }
        }
        LogRecordType::TxnFinished => {}
      }
    }

    pending.clear();
    Ok(())
  }
}

/// Prepends the uvarint-encoded sequence number to a user key, producing the
/// key as stored in the log.
pub(crate) fn log_record_key_with_seq(key: &[u8], seq_no: u64) -> Vec<u8> {
  let mut enc_key = Vec::with_capacity(MAX_VARINT_LEN64 + key.len());
  encode_uvarint(&mut enc_key, seq_no);
  enc_key.extend_from_slice(key);
  enc_key
}

/// Splits a stored key into the user key and its sequence number. The key
/// comes out of a crc-checked record, so a malformed prefix is a programming
/// error.
pub(crate) fn parse_log_record_key(key: &[u8]) -> (Vec<u8>, u64) {
  let (seq_no, n) = decode_uvarint(key).expect("malformed record key");
  (key[n..].to_vec(), seq_no)
}
