use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use bytes::Bytes;

use crate::batch::{log_record_key_with_seq, TXN_FIN_KEY};
use crate::data::data_file::get_data_file_name;
use crate::data::log_record::{LogRecord, LogRecordType};
use crate::db::Engine;
use crate::errors::Errors;
use crate::option::{IndexType, Options, WriteBatchOptions};
use crate::util::rand_kv::{get_test_key, get_test_value};

fn test_opts(dir: &Path) -> Options {
  let mut opts = Options::default();
  opts.dir_path = dir.to_path_buf();
  opts
}

#[test]
fn test_engine_put_and_get() {
  let dir = tempfile::tempdir().unwrap();
  let engine = Engine::open(test_opts(dir.path())).unwrap();

  engine.put(get_test_key(1), get_test_value(1)).unwrap();
  assert_eq!(engine.get(get_test_key(1)).unwrap(), get_test_value(1));

  // overwrite returns the newest value
  engine.put(get_test_key(1), Bytes::from("updated")).unwrap();
  assert_eq!(engine.get(get_test_key(1)).unwrap(), Bytes::from("updated"));

  // value may be empty
  engine.put(get_test_key(2), Bytes::new()).unwrap();
  assert_eq!(engine.get(get_test_key(2)).unwrap(), Bytes::new());

  assert_eq!(engine.get(get_test_key(3)), Err(Errors::KeyNotFound));
}

#[test]
fn test_engine_empty_key_rejected() {
  let dir = tempfile::tempdir().unwrap();
  let engine = Engine::open(test_opts(dir.path())).unwrap();

  assert_eq!(engine.put(Bytes::new(), get_test_value(1)), Err(Errors::KeyIsEmpty));
  assert_eq!(engine.get(Bytes::new()), Err(Errors::KeyIsEmpty));
  assert_eq!(engine.delete(Bytes::new()), Err(Errors::KeyIsEmpty));
}

#[test]
fn test_engine_delete() {
  let dir = tempfile::tempdir().unwrap();
  let engine = Engine::open(test_opts(dir.path())).unwrap();

  engine.put(get_test_key(1), get_test_value(1)).unwrap();
  engine.delete(get_test_key(1)).unwrap();
  assert_eq!(engine.get(get_test_key(1)), Err(Errors::KeyNotFound));

  // deleting an absent key is a no-op
  engine.delete(get_test_key(42)).unwrap();

  // the key is writable again afterwards
  engine.put(get_test_key(1), Bytes::from("reborn")).unwrap();
  assert_eq!(engine.get(get_test_key(1)).unwrap(), Bytes::from("reborn"));
}

#[test]
fn test_engine_basic_persistence() {
  let dir = tempfile::tempdir().unwrap();
  let opts = test_opts(dir.path());

  let engine = Engine::open(opts.clone()).unwrap();
  engine.put(Bytes::from("name"), Bytes::from("bitcask")).unwrap();
  engine.put(Bytes::from("lang"), Bytes::from("rust")).unwrap();
  engine.close().unwrap();
  drop(engine);

  let engine = Engine::open(opts).unwrap();
  assert_eq!(engine.get(Bytes::from("name")).unwrap(), Bytes::from("bitcask"));
  assert_eq!(engine.get(Bytes::from("lang")).unwrap(), Bytes::from("rust"));
}

#[test]
fn test_engine_persistence_every_index_type() {
  for index_type in [
    IndexType::BTree,
    IndexType::Art,
    IndexType::SkipList,
    IndexType::BPlusTree,
  ] {
    let dir = tempfile::tempdir().unwrap();
    let mut opts = test_opts(dir.path());
    opts.index_type = index_type;

    let engine = Engine::open(opts.clone()).unwrap();
    for i in 0..100 {
      engine.put(get_test_key(i), get_test_value(i)).unwrap();
    }
    for i in 0..20 {
      engine.delete(get_test_key(i)).unwrap();
    }
    drop(engine);

    let engine = Engine::open(opts).unwrap();
    assert_eq!(engine.list_keys().unwrap().len(), 80);
    for i in 20..100 {
      assert_eq!(engine.get(get_test_key(i)).unwrap(), get_test_value(i));
    }
    for i in 0..20 {
      assert_eq!(engine.get(get_test_key(i)), Err(Errors::KeyNotFound));
    }
  }
}

#[test]
fn test_engine_file_rotation() {
  let dir = tempfile::tempdir().unwrap();
  let mut opts = test_opts(dir.path());
  opts.data_file_size = 64 * 1024;
  let engine = Engine::open(opts.clone()).unwrap();

  for i in 0..5000 {
    engine.put(get_test_key(i), get_test_value(i)).unwrap();
  }
  let stat = engine.stat().unwrap();
  assert!(stat.data_file_num > 1);

  // reads hit sealed files as well as the active one
  for i in 0..5000 {
    assert_eq!(engine.get(get_test_key(i)).unwrap(), get_test_value(i));
  }
  drop(engine);

  let engine = Engine::open(opts).unwrap();
  assert_eq!(engine.list_keys().unwrap().len(), 5000);
}

#[test]
fn test_engine_reclaimable_accounting() {
  let dir = tempfile::tempdir().unwrap();
  let engine = Engine::open(test_opts(dir.path())).unwrap();

  engine.put(get_test_key(1), get_test_value(1)).unwrap();
  assert_eq!(engine.stat().unwrap().reclaimable_size, 0);

  let first_record = LogRecord {
    key: log_record_key_with_seq(&get_test_key(1), 0),
    value: get_test_value(1).to_vec(),
    rec_type: LogRecordType::Normal,
  };
  let first_size = first_record.encode().len() as u64;

  engine.put(get_test_key(1), get_test_value(2)).unwrap();
  assert_eq!(engine.stat().unwrap().reclaimable_size, first_size);

  // a delete reclaims the overwritten record and the tombstone itself
  engine.delete(get_test_key(1)).unwrap();
  assert!(engine.stat().unwrap().reclaimable_size > first_size * 2);
}

#[test]
fn test_engine_reclaimable_accounting_batch() {
  let dir = tempfile::tempdir().unwrap();
  let opts = test_opts(dir.path());
  let engine = Engine::open(opts.clone()).unwrap();

  let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();
  batch.put(get_test_key(1), get_test_value(1)).unwrap();
  batch.put(get_test_key(2), get_test_value(2)).unwrap();
  batch.commit().unwrap();

  // fresh keys leave nothing reclaimable except the terminator record
  let fin_size = |seq_no: u64| {
    LogRecord {
      key: log_record_key_with_seq(TXN_FIN_KEY, seq_no),
      value: Vec::new(),
      rec_type: LogRecordType::TxnFinished,
    }
    .encode()
    .len() as u64
  };
  assert_eq!(engine.stat().unwrap().reclaimable_size, fin_size(1));

  // a second batch overwriting a key reclaims its first record too
  let first_record_size = LogRecord {
    key: log_record_key_with_seq(&get_test_key(1), 1),
    value: get_test_value(1).to_vec(),
    rec_type: LogRecordType::Normal,
  }
  .encode()
  .len() as u64;
  let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();
  batch.put(get_test_key(1), get_test_value(3)).unwrap();
  batch.commit().unwrap();

  let expected = fin_size(1) + fin_size(2) + first_record_size;
  assert_eq!(engine.stat().unwrap().reclaimable_size, expected);
  drop(engine);

  // replay rebuilds the same counter
  let engine = Engine::open(opts).unwrap();
  assert_eq!(engine.stat().unwrap().reclaimable_size, expected);
}

#[test]
fn test_engine_stat() {
  let dir = tempfile::tempdir().unwrap();
  let engine = Engine::open(test_opts(dir.path())).unwrap();
  for i in 0..50 {
    engine.put(get_test_key(i), get_test_value(i)).unwrap();
  }
  let stat = engine.stat().unwrap();
  assert_eq!(stat.key_num, 50);
  assert_eq!(stat.data_file_num, 1);
  assert!(stat.disk_size > 0);
}

#[test]
fn test_engine_list_keys_and_fold() {
  let dir = tempfile::tempdir().unwrap();
  let engine = Engine::open(test_opts(dir.path())).unwrap();
  engine.put(Bytes::from("banana"), get_test_value(1)).unwrap();
  engine.put(Bytes::from("apple"), get_test_value(2)).unwrap();
  engine.put(Bytes::from("cherry"), get_test_value(3)).unwrap();

  let keys = engine.list_keys().unwrap();
  assert_eq!(
    keys,
    vec![Bytes::from("apple"), Bytes::from("banana"), Bytes::from("cherry")]
  );

  let visited = std::cell::RefCell::new(Vec::new());
  engine
    .fold(|key, _value| {
      visited.borrow_mut().push(key);
      true
    })
    .unwrap();
  assert_eq!(visited.borrow().len(), 3);

  // fold stops when the visitor returns false
  let count = std::sync::atomic::AtomicUsize::new(0);
  engine
    .fold(|_key, _value| {
      count.fetch_add(1, Ordering::SeqCst);
      false
    })
    .unwrap();
  assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_engine_sync_and_close_idempotent() {
  let dir = tempfile::tempdir().unwrap();
  let engine = Engine::open(test_opts(dir.path())).unwrap();
  engine.put(get_test_key(1), get_test_value(1)).unwrap();
  engine.sync().unwrap();
  engine.close().unwrap();
  engine.close().unwrap();
}

#[test]
fn test_engine_directory_lock() {
  let dir = tempfile::tempdir().unwrap();
  let opts = test_opts(dir.path());
  let engine = Engine::open(opts.clone()).unwrap();

  let second = Engine::open(opts.clone());
  assert_eq!(second.err().unwrap(), Errors::DatabaseIsUsing);

  engine.close().unwrap();
  let reopened = Engine::open(opts);
  assert!(reopened.is_ok());
}

#[test]
fn test_engine_backup() {
  let dir = tempfile::tempdir().unwrap();
  let backup_dir = tempfile::tempdir().unwrap();
  let engine = Engine::open(test_opts(dir.path())).unwrap();
  for i in 0..100 {
    engine.put(get_test_key(i), get_test_value(i)).unwrap();
  }
  engine.sync().unwrap();
  engine.backup(backup_dir.path()).unwrap();

  // the copy opens as a standalone engine while the source stays live
  let restored = Engine::open(test_opts(backup_dir.path())).unwrap();
  for i in 0..100 {
    assert_eq!(restored.get(get_test_key(i)).unwrap(), get_test_value(i));
  }
}

#[test]
fn test_batch_atomicity_on_truncated_log() {
  let dir = tempfile::tempdir().unwrap();
  let opts = test_opts(dir.path());

  let engine = Engine::open(opts.clone()).unwrap();
  let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();
  batch.put(get_test_key(1), get_test_value(1)).unwrap();
  batch.put(get_test_key(2), get_test_value(2)).unwrap();
  batch.put(get_test_key(3), get_test_value(3)).unwrap();
  batch.commit().unwrap();
  drop(batch);
  drop(engine);

  // drop the terminator record from the tail of the log, as if the crash
  // had hit between the batch records and the commit point
  let fin_record = LogRecord {
    key: log_record_key_with_seq(TXN_FIN_KEY, 1),
    value: Vec::new(),
    rec_type: LogRecordType::TxnFinished,
  };
  let fin_len = fin_record.encode().len() as u64;
  let data_path = get_data_file_name(dir.path(), 0);
  let file_len = std::fs::metadata(&data_path).unwrap().len();
  let file = std::fs::OpenOptions::new().write(true).open(&data_path).unwrap();
  file.set_len(file_len - fin_len).unwrap();
  drop(file);

  let engine = Engine::open(opts.clone()).unwrap();
  assert_eq!(engine.get(get_test_key(1)), Err(Errors::KeyNotFound));
  assert_eq!(engine.get(get_test_key(2)), Err(Errors::KeyNotFound));
  assert_eq!(engine.get(get_test_key(3)), Err(Errors::KeyNotFound));

  // the interrupted batch still bumps the sequence floor
  assert!(engine.seq_no.load(Ordering::SeqCst) >= 1);
  drop(engine);

  // with the terminator intact the whole batch lands
  let engine = Engine::open(opts.clone()).unwrap();
  let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();
  batch.put(get_test_key(4), get_test_value(4)).unwrap();
  batch.commit().unwrap();
  drop(batch);
  drop(engine);

  let engine = Engine::open(opts).unwrap();
  assert_eq!(engine.get(get_test_key(4)).unwrap(), get_test_value(4));
}

#[test]
fn test_batch_seq_no_monotonic_across_reopen() {
  let dir = tempfile::tempdir().unwrap();
  let opts = test_opts(dir.path());

  let engine = Engine::open(opts.clone()).unwrap();
  for round in 0..3 {
    let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();
    batch.put(get_test_key(round), get_test_value(round)).unwrap();
    batch.commit().unwrap();
  }
  let seq_before = engine.seq_no.load(Ordering::SeqCst);
  assert_eq!(seq_before, 3);
  drop(engine);

  let engine = Engine::open(opts).unwrap();
  assert!(engine.seq_no.load(Ordering::SeqCst) >= seq_before);
}

#[test]
fn test_bptree_batch_requires_seq_no_file() {
  let dir = tempfile::tempdir().unwrap();
  let mut opts = test_opts(dir.path());
  opts.index_type = IndexType::BPlusTree;

  // a fresh directory may hand out batches
  let engine = Engine::open(opts.clone()).unwrap();
  let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();
  batch.put(get_test_key(1), get_test_value(1)).unwrap();
  batch.commit().unwrap();
  drop(batch);
  engine.close().unwrap();
  drop(engine);

  // wipe the counter file, as if the last shutdown never completed
  std::fs::remove_file(dir.path().join("seq-no")).unwrap();

  let engine = Engine::open(opts).unwrap();
  let refused = engine.new_write_batch(WriteBatchOptions::default());
  assert_eq!(refused.err().unwrap(), Errors::UnableToUseWriteBatch);
  // plain writes still work
  engine.put(get_test_key(2), get_test_value(2)).unwrap();
}

#[test]
fn test_engine_concurrent_put_get() {
  let dir = tempfile::tempdir().unwrap();
  let engine = Arc::new(Engine::open(test_opts(dir.path())).unwrap());

  let mut handles = Vec::new();
  for t in 0..4usize {
    let engine = engine.clone();
    handles.push(thread::spawn(move || {
      for i in 0..500usize {
        let n = t * 1000 + i;
        engine.put(get_test_key(n), get_test_value(n)).unwrap();
        assert_eq!(engine.get(get_test_key(n)).unwrap(), get_test_value(n));
      }
    }));
  }
  for handle in handles {
    handle.join().unwrap();
  }
  assert_eq!(engine.stat().unwrap().key_num, 2000);
}

#[test]
fn test_open_rejects_bad_options() {
  let mut opts = Options::default();
  opts.dir_path = std::path::PathBuf::new();
  assert_eq!(Engine::open(opts).err().unwrap(), Errors::InvalidDirPath);

  let dir = tempfile::tempdir().unwrap();
  let mut opts = test_opts(dir.path());
  opts.data_file_size = 0;
  assert_eq!(Engine::open(opts).err().unwrap(), Errors::InvalidDataFileSize);

  let mut opts = test_opts(dir.path());
  opts.data_file_merge_ratio = 1.5;
  assert_eq!(Engine::open(opts).err().unwrap(), Errors::InvalidMergeRatio);
}
