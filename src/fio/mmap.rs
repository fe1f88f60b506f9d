use std::fs::OpenOptions;
use std::path::Path;

use log::error;
use memmap2::Mmap;

use crate::errors::{Errors, Result};

use super::IOManager;

/// Read-only memory-mapped IO, used to speed up log replay at startup. The
/// map is taken once at construction; the engine swaps every file back to
/// buffered IO before the open call returns.
pub struct MMapIO {
  map: Mmap,
}

impl MMapIO {
  pub fn new<P>(file_name: P) -> Result<Self>
  where
    P: AsRef<Path>,
  {
    let file = match OpenOptions::new()
      .create(true)
      .read(true)
      .append(true)
      .open(file_name)
    {
      Ok(file) => file,
      Err(e) => {
        error!("failed to open data file: {}", e);
        return Err(Errors::FailedToOpenDataFile);
      }
    };
    match unsafe { Mmap::map(&file) } {
      Ok(map) => Ok(MMapIO { map }),
      Err(e) => {
        error!("failed to map data file: {}", e);
        Err(Errors::FailedToOpenDataFile)
      }
    }
  }
}

impl IOManager for MMapIO {
  fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
    if offset >= self.map.len() as u64 {
      return Err(Errors::ReadDataFileEOF);
    }
    // short reads at the mapped end mirror what buffered IO reports, so
    // callers detect truncated records the same way on both paths
    let end = std::cmp::min(offset as usize + buf.len(), self.map.len());
    let src = &self.map[offset as usize..end];
    buf[..src.len()].copy_from_slice(src);
    Ok(src.len())
  }

  fn write(&self, _buf: &[u8]) -> Result<usize> {
    Err(Errors::UnsupportedMMapWrite)
  }

  fn sync(&self) -> Result<()> {
    Err(Errors::UnsupportedMMapWrite)
  }

  fn size(&self) -> u64 {
    self.map.len() as u64
  }
}
