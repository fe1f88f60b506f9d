use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum Errors {
  #[error("the key is empty")]
  KeyIsEmpty,

  #[error("key not found in database")]
  KeyNotFound,

  #[error("failed to update index")]
  IndexUpdateFailed,

  #[error("data file not found")]
  DataFileNotFound,

  #[error("the database directory maybe corrupted")]
  DataDirectoryCorrupted,

  #[error("invalid record crc, log record maybe corrupted")]
  CorruptedRecord,

  #[error("exceed the max batch num")]
  ExceedMaxBatchNum,

  #[error("merge is in progress, try again later")]
  MergeInProgress,

  #[error("the merge ratio is unreached")]
  MergeRatioUnreached,

  #[error("no enough disk space for merge")]
  MergeNoEnoughSpace,

  #[error("the database directory is used by another process")]
  DatabaseIsUsing,

  #[error("read data file eof")]
  ReadDataFileEOF,

  #[error("cannot use write batch, the seq-no file does not exist")]
  UnableToUseWriteBatch,

  #[error("the database directory path is empty")]
  InvalidDirPath,

  #[error("the data file size must be greater than 0")]
  InvalidDataFileSize,

  #[error("the data file merge ratio must be between 0 and 1")]
  InvalidMergeRatio,

  #[error("failed to open data file")]
  FailedToOpenDataFile,

  #[error("failed to read from data file")]
  FailedToReadFromDataFile,

  #[error("failed to write to data file")]
  FailedToWriteToDataFile,

  #[error("failed to sync data file")]
  FailedToSyncDataFile,

  #[error("failed to create the database directory")]
  FailedToCreateDatabaseDir,

  #[error("failed to read the database directory")]
  FailedToReadDatabaseDir,

  #[error("failed to copy the database directory")]
  FailedToCopyDirectory,

  #[error("write is not supported on a memory mapped file")]
  UnsupportedMMapWrite,
}

pub type Result<T> = std::result::Result<T, Errors>;
