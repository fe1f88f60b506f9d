pub mod file_io;
pub mod mmap;

use std::path::Path;

use crate::errors::Result;
use crate::option::IOType;

use self::{file_io::FileIO, mmap::MMapIO};

/// Abstract IO capability set backing a data file: positioned read,
/// append-style write, fsync and size probing.
pub trait IOManager: Sync + Send {
  /// Reads up to `buf.len()` bytes starting at `offset`.
  fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize>;

  /// Appends `buf` at the current end of the file.
  fn write(&self, buf: &[u8]) -> Result<usize>;

  fn sync(&self) -> Result<()>;

  fn size(&self) -> u64;
}

pub fn new_io_manager(file_name: &Path, io_type: IOType) -> Result<Box<dyn IOManager>> {
  match io_type {
    IOType::Standard => Ok(Box::new(FileIO::new(file_name)?)),
    IOType::MemoryMap => Ok(Box::new(MMapIO::new(file_name)?)),
  }
}
