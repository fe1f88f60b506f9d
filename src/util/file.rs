use std::fs::{self, File};
use std::io;
use std::path::Path;

/// Total size in bytes of all regular files under `dir_path`, recursively.
pub fn dir_disk_size(dir_path: impl AsRef<Path>) -> u64 {
  let mut size = 0;
  let entries = match fs::read_dir(dir_path.as_ref()) {
    Ok(entries) => entries,
    Err(_) => return 0,
  };
  for entry in entries.flatten() {
    let path = entry.path();
    if path.is_dir() {
      size += dir_disk_size(&path);
    } else if let Ok(meta) = entry.metadata() {
      size += meta.len();
    }
  }
  size
}

/// Free space on the filesystem backing the working directory.
#[cfg(unix)]
pub fn available_disk_space() -> u64 {
  use std::ffi::CString;

  let cwd = match std::env::current_dir() {
    Ok(dir) => dir,
    Err(_) => return 0,
  };
  let path = match CString::new(cwd.to_string_lossy().as_bytes()) {
    Ok(path) => path,
    Err(_) => return 0,
  };
  let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
  let ret = unsafe { libc::statvfs(path.as_ptr(), &mut stat) };
  if ret != 0 {
    return 0;
  }
  stat.f_bavail as u64 * stat.f_frsize as u64
}

#[cfg(not(unix))]
pub fn available_disk_space() -> u64 {
  u64::MAX
}

/// Recursively copies `src` into `dst`, skipping entries whose file name
/// matches one of `exclude`.
pub fn copy_dir(src: impl AsRef<Path>, dst: impl AsRef<Path>, exclude: &[&str]) -> io::Result<()> {
  let src = src.as_ref();
  let dst = dst.as_ref();
  if !dst.is_dir() {
    fs::create_dir_all(dst)?;
  }
  for entry in fs::read_dir(src)? {
    let entry = entry?;
    let file_name = entry.file_name();
    if exclude.iter().any(|e| file_name.to_string_lossy() == *e) {
      continue;
    }
    let src_path = entry.path();
    let dst_path = dst.join(&file_name);
    if src_path.is_dir() {
      copy_dir(&src_path, &dst_path, exclude)?;
    } else {
      fs::copy(&src_path, &dst_path)?;
    }
  }
  Ok(())
}

/// Takes an exclusive advisory lock on `file` without blocking. Returns
/// false when another handle already holds the lock.
#[cfg(unix)]
pub fn try_lock_file(file: &File) -> bool {
  use std::os::unix::io::AsRawFd;
  let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
  ret == 0
}

#[cfg(not(unix))]
pub fn try_lock_file(_file: &File) -> bool {
  // No advisory locking on this platform, single-process use is assumed.
  true
}

#[cfg(unix)]
pub fn unlock_file(file: &File) {
  use std::os::unix::io::AsRawFd;
  unsafe {
    libc::flock(file.as_raw_fd(), libc::LOCK_UN);
  }
}

#[cfg(not(unix))]
pub fn unlock_file(_file: &File) {}
