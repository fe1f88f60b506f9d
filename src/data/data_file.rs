use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::errors::{Errors, Result};
use crate::fio::{new_io_manager, IOManager};
use crate::option::IOType;

use super::log_record::{
  decode_record_header, max_record_header_size, LogRecord, LogRecordType, ReadLogRecord, RecordPos,
};

pub const DATA_FILE_NAME_SUFFIX: &str = ".data";
pub const HINT_FILE_NAME: &str = "hint-index";
pub const MERGE_FINISHED_FILE_NAME: &str = "merge-finished";
pub const SEQ_NO_FILE_NAME: &str = "seq-no";

/// An append-only log file with a monotonic write offset. The active file is
/// the only one written to; sealed files only ever serve positioned reads.
pub struct DataFile {
  file_id: u32,
  write_off: RwLock<u64>,
  io: Box<dyn IOManager>,
}

pub fn get_data_file_name(dir_path: impl AsRef<Path>, file_id: u32) -> PathBuf {
  dir_path
    .as_ref()
    .join(format!("{:09}{}", file_id, DATA_FILE_NAME_SUFFIX))
}

impl DataFile {
  pub fn new(dir_path: impl AsRef<Path>, file_id: u32, io_type: IOType) -> Result<DataFile> {
    let file_name = get_data_file_name(dir_path, file_id);
    Ok(DataFile {
      file_id,
      write_off: RwLock::new(0),
      io: new_io_manager(&file_name, io_type)?,
    })
  }

  pub fn new_hint_file(dir_path: impl AsRef<Path>) -> Result<DataFile> {
    let file_name = dir_path.as_ref().join(HINT_FILE_NAME);
    Ok(DataFile {
      file_id: 0,
      write_off: RwLock::new(0),
      io: new_io_manager(&file_name, IOType::Standard)?,
    })
  }

  pub fn new_merge_fin_file(dir_path: impl AsRef<Path>) -> Result<DataFile> {
    let file_name = dir_path.as_ref().join(MERGE_FINISHED_FILE_NAME);
    Ok(DataFile {
      file_id: 0,
      write_off: RwLock::new(0),
      io: new_io_manager(&file_name, IOType::Standard)?,
    })
  }

  pub fn new_seq_no_file(dir_path: impl AsRef<Path>) -> Result<DataFile> {
    let file_name = dir_path.as_ref().join(SEQ_NO_FILE_NAME);
    Ok(DataFile {
      file_id: 0,
      write_off: RwLock::new(0),
      io: new_io_manager(&file_name, IOType::Standard)?,
    })
  }

  pub fn get_file_id(&self) -> u32 {
    self.file_id
  }

  pub fn get_write_off(&self) -> u64 {
    *self.write_off.read()
  }

  pub fn set_write_off(&self, offset: u64) {
    *self.write_off.write() = offset;
  }

  pub fn file_size(&self) -> u64 {
    self.io.size()
  }

  /// Decodes one record starting at `offset`.
  ///
  /// Reaching the written tail of the file, or a run of zero bytes where a
  /// header would be, comes back as [`Errors::ReadDataFileEOF`]. A record
  /// whose payload is cut short or whose crc does not match is
  /// [`Errors::CorruptedRecord`].
  pub fn read_record(&self, offset: u64) -> Result<ReadLogRecord> {
    let file_size = self.io.size();
    if offset >= file_size {
      return Err(Errors::ReadDataFileEOF);
    }

    let header_len = std::cmp::min(max_record_header_size() as u64, file_size - offset);
    let header_buf = self.read_n_bytes(header_len as usize, offset)?;
    let (header, header_size) = match decode_record_header(&header_buf) {
      Some(decoded) => decoded,
      None => return Err(Errors::ReadDataFileEOF),
    };
    if header.crc == 0 && header.key_size == 0 && header.value_size == 0 {
      return Err(Errors::ReadDataFileEOF);
    }
    if header.key_size < 0 || header.value_size < 0 {
      return Err(Errors::CorruptedRecord);
    }
    let rec_type = LogRecordType::from_u8(header.rec_type).ok_or(Errors::CorruptedRecord)?;

    let key_size = header.key_size as usize;
    let value_size = header.value_size as usize;
    let mut record = LogRecord {
      key: Vec::new(),
      value: Vec::new(),
      rec_type,
    };
    if key_size + value_size > 0 {
      let mut kv_buf = self.read_n_bytes(key_size + value_size, offset + header_size)?;
      record.value = kv_buf.split_off(key_size);
      record.key = kv_buf;
    }

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&header_buf[4..header_size as usize]);
    hasher.update(&record.key);
    hasher.update(&record.value);
    if hasher.finalize() != header.crc {
      return Err(Errors::CorruptedRecord);
    }

    Ok(ReadLogRecord {
      record,
      size: header_size + (key_size + value_size) as u64,
    })
  }

  pub fn write(&self, buf: &[u8]) -> Result<usize> {
    let n = self.io.write(buf)?;
    *self.write_off.write() += n as u64;
    Ok(n)
  }

  /// Appends a `key -> position` entry to a hint file.
  pub fn write_hint_record(&self, key: Vec<u8>, pos: RecordPos) -> Result<()> {
    let hint_record = LogRecord {
      key,
      value: pos.encode(),
      rec_type: LogRecordType::Normal,
    };
    self.write(&hint_record.encode())?;
    Ok(())
  }

  pub fn sync(&self) -> Result<()> {
    self.io.sync()
  }

  /// Replaces the IO manager, used to fall back from the startup memory map
  /// to buffered IO.
  pub fn set_io_manager(&mut self, dir_path: impl AsRef<Path>, io_type: IOType) -> Result<()> {
    self.io = new_io_manager(&get_data_file_name(dir_path, self.file_id), io_type)?;
    Ok(())
  }

  fn read_n_bytes(&self, n: usize, offset: u64) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    let read = self.io.read(&mut buf, offset)?;
    if read < n {
      return Err(Errors::CorruptedRecord);
    }
    Ok(buf)
  }
}
