use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use log::error;
use parking_lot::RwLock;

use crate::errors::{Errors, Result};

use super::IOManager;

/// Buffered file IO. The file is opened read/write in append mode, so every
/// `write` lands at the tail regardless of concurrent readers.
pub struct FileIO {
  fd: Arc<RwLock<File>>,
}

impl FileIO {
  pub fn new<P>(file_name: P) -> Result<Self>
  where
    P: AsRef<Path>,
  {
    match OpenOptions::new()
      .create(true)
      .read(true)
      .append(true)
      .open(file_name)
    {
      Ok(file) => Ok(FileIO {
        fd: Arc::new(RwLock::new(file)),
      }),
      Err(e) => {
        error!("failed to open data file: {}", e);
        Err(Errors::FailedToOpenDataFile)
      }
    }
  }
}

impl IOManager for FileIO {
  fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
    let fd = self.fd.read();

    #[cfg(unix)]
    let res = {
      use std::os::unix::fs::FileExt;
      fd.read_at(buf, offset)
    };

    #[cfg(windows)]
    let res = {
      use std::os::windows::fs::FileExt;
      fd.seek_read(buf, offset)
    };

    match res {
      Ok(n) => Ok(n),
      Err(e) => {
        error!("failed to read from data file: {}", e);
        Err(Errors::FailedToReadFromDataFile)
      }
    }
  }

  fn write(&self, buf: &[u8]) -> Result<usize> {
    let mut fd = self.fd.write();
    match fd.write(buf) {
      Ok(n) => Ok(n),
      Err(e) => {
        error!("failed to write to data file: {}", e);
        Err(Errors::FailedToWriteToDataFile)
      }
    }
  }

  fn sync(&self) -> Result<()> {
    let fd = self.fd.read();
    if let Err(e) = fd.sync_all() {
      error!("failed to sync data file: {}", e);
      return Err(Errors::FailedToSyncDataFile);
    }
    Ok(())
  }

  fn size(&self) -> u64 {
    let fd = self.fd.read();
    fd.metadata().map(|m| m.len()).unwrap_or(0)
  }
}
