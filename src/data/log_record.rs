use crate::util::varint::{decode_varint, encode_varint, MAX_VARINT_LEN32, MAX_VARINT_LEN64};

/// Largest possible encoded header:
/// crc (4) + type (1) + keyLen (varint, up to 5) + valueLen (varint, up to 5).
pub fn max_record_header_size() -> usize {
  4 + 1 + MAX_VARINT_LEN32 * 2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRecordType {
  /// A live key/value pair.
  Normal = 1,

  /// A tombstone. Never referenced by the index, reclaimed by merge.
  Deleted = 2,

  /// Terminator of a write batch; its presence commits the batch.
  TxnFinished = 3,
}

impl LogRecordType {
  pub fn from_u8(v: u8) -> Option<LogRecordType> {
    match v {
      1 => Some(LogRecordType::Normal),
      2 => Some(LogRecordType::Deleted),
      3 => Some(LogRecordType::TxnFinished),
      _ => None,
    }
  }
}

/// One framed unit in a data file. The key carries a uvarint sequence-number
/// prefix; sequence 0 marks a plain non-batch write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
  pub key: Vec<u8>,
  pub value: Vec<u8>,
  pub rec_type: LogRecordType,
}

impl LogRecord {
  /// Serializes the record:
  ///
  /// ```text
  /// +--------+------+--------+----------+-----+-------+
  /// | crc32  | type | keyLen | valueLen | key | value |
  /// | 4B LE  | 1B   | varint | varint   |  …  |   …   |
  /// +--------+------+--------+----------+-----+-------+
  /// ```
  ///
  /// The crc covers every byte after the crc field itself.
  pub fn encode(&self) -> Vec<u8> {
    let mut buf = Vec::with_capacity(self.encoded_len());
    buf.extend_from_slice(&[0u8; 4]);
    buf.push(self.rec_type as u8);
    encode_varint(&mut buf, self.key.len() as i64);
    encode_varint(&mut buf, self.value.len() as i64);
    buf.extend_from_slice(&self.key);
    buf.extend_from_slice(&self.value);

    let crc = crc32fast::hash(&buf[4..]);
    buf[..4].copy_from_slice(&crc.to_le_bytes());
    buf
  }

  pub fn encoded_len(&self) -> usize {
    max_record_header_size() + self.key.len() + self.value.len()
  }
}

/// Location of a record on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordPos {
  pub file_id: u32,
  pub offset: u64,
  pub size: u32,
}

impl RecordPos {
  /// Encodes the position as the value payload of a hint or index record.
  pub fn encode(&self) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAX_VARINT_LEN32 * 2 + MAX_VARINT_LEN64);
    encode_varint(&mut buf, self.file_id as i64);
    encode_varint(&mut buf, self.offset as i64);
    encode_varint(&mut buf, self.size as i64);
    buf
  }
}

/// Inverse of [`RecordPos::encode`]. The payload comes out of a crc-checked
/// record, so a malformed buffer is a programming error.
pub fn decode_record_pos(buf: &[u8]) -> RecordPos {
  let (file_id, n1) = decode_varint(buf).expect("malformed record position");
  let (offset, n2) = decode_varint(&buf[n1..]).expect("malformed record position");
  let (size, _) = decode_varint(&buf[n1 + n2..]).expect("malformed record position");
  RecordPos {
    file_id: file_id as u32,
    offset: offset as u64,
    size: size as u32,
  }
}

/// A decoded record together with its total encoded length on disk.
#[derive(Debug)]
pub struct ReadLogRecord {
  pub record: LogRecord,
  pub size: u64,
}

/// A batch record buffered during replay until its terminator shows up.
pub(crate) struct TransactionRecord {
  pub(crate) record: LogRecord,
  pub(crate) pos: RecordPos,
}

pub(crate) struct LogRecordHeader {
  pub(crate) crc: u32,
  pub(crate) rec_type: u8,
  pub(crate) key_size: i64,
  pub(crate) value_size: i64,
}

/// Decodes a record header from the front of `buf`, returning the header and
/// its encoded length. `None` means the buffer is too short to hold any
/// header, which a reader treats as end of file. Truncated length varints
/// decode as zero and are caught downstream by the zero-pattern or crc check.
pub(crate) fn decode_record_header(buf: &[u8]) -> Option<(LogRecordHeader, u64)> {
  if buf.len() < 5 {
    return None;
  }
  let crc = u32::from_le_bytes(buf[..4].try_into().unwrap());
  let rec_type = buf[4];
  let mut idx = 5;
  let (key_size, n) = decode_varint(&buf[idx..]).unwrap_or((0, 0));
  idx += n;
  let (value_size, n) = decode_varint(&buf[idx..]).unwrap_or((0, 0));
  idx += n;
  Some((
    LogRecordHeader {
      crc,
      rec_type,
      key_size,
      value_size,
    },
    idx as u64,
  ))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_encode_layout() {
    let record = LogRecord {
      key: b"name".to_vec(),
      value: b"ember-kv".to_vec(),
      rec_type: LogRecordType::Normal,
    };
    let enc = record.encode();
    // crc + type + two single-byte varints + payload
    assert_eq!(enc.len(), 4 + 1 + 1 + 1 + 4 + 8);
    assert_eq!(enc[4], LogRecordType::Normal as u8);
    assert_eq!(enc[5], 4 << 1); // zigzag of 4
    assert_eq!(enc[6], 8 << 1);
    assert_eq!(&enc[7..11], b"name");

    let crc = u32::from_le_bytes(enc[..4].try_into().unwrap());
    assert_eq!(crc, crc32fast::hash(&enc[4..]));
  }

  #[test]
  fn test_encode_decode_header() {
    let record = LogRecord {
      key: b"language".to_vec(),
      value: b"rust".to_vec(),
      rec_type: LogRecordType::Normal,
    };
    let enc = record.encode();
    let (header, header_size) = decode_record_header(&enc).unwrap();
    assert_eq!(header.rec_type, LogRecordType::Normal as u8);
    assert_eq!(header.key_size, 8);
    assert_eq!(header.value_size, 4);
    assert_eq!(header_size, 7);
  }

  #[test]
  fn test_encode_empty_value() {
    let record = LogRecord {
      key: b"gone".to_vec(),
      value: Vec::new(),
      rec_type: LogRecordType::Deleted,
    };
    let enc = record.encode();
    let (header, _) = decode_record_header(&enc).unwrap();
    assert_eq!(header.rec_type, LogRecordType::Deleted as u8);
    assert_eq!(header.value_size, 0);
  }

  #[test]
  fn test_header_too_short_is_eof() {
    assert!(decode_record_header(&[]).is_none());
    assert!(decode_record_header(&[0, 0, 0, 0]).is_none());
  }

  #[test]
  fn test_zero_pattern_header() {
    // what a reader sees past the written tail of a pre-allocated file
    let (header, _) = decode_record_header(&[0u8; 15]).unwrap();
    assert_eq!(header.crc, 0);
    assert_eq!(header.key_size, 0);
    assert_eq!(header.value_size, 0);
  }

  #[test]
  fn test_record_pos_round_trip() {
    let pos = RecordPos {
      file_id: 3,
      offset: 10_240,
      size: 77,
    };
    assert_eq!(decode_record_pos(&pos.encode()), pos);

    let pos = RecordPos {
      file_id: 0,
      offset: 0,
      size: 0,
    };
    assert_eq!(decode_record_pos(&pos.encode()), pos);
  }
}
