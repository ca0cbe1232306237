// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Memory-mapped arena files using mmap-io.

use std::path::{Path, PathBuf};

use mmap_io::MemoryMappedFile;
use snafu::{ResultExt, ensure};

use crate::{
    Result,
    error::{ArenaCorruptedSnafu, MmapSnafu},
    message::{LENGTH_PREFIX_SIZE, decode_length},
};

/// One fixed-size, file-backed memory mapping.
///
/// Reads and writes are clamped to the arena bound: they report how many
/// bytes were transferred so the caller can continue in the next arena.
/// Dropping an `Arena` unmaps it; only the
/// [`ArenaManager`](crate::arena_manager::ArenaManager) holds them.
pub(crate) struct Arena {
    aid:  u64,
    mmap: MemoryMappedFile,
    path: PathBuf,
    size: u64,
}

impl Arena {
    /// Create a new arena file pre-allocated to `size` bytes.
    pub fn create<P: AsRef<Path>>(path: P, aid: u64, size: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mmap = MemoryMappedFile::create_rw(&path, size).context(MmapSnafu { aid })?;
        Ok(Self {
            aid,
            mmap,
            path,
            size,
        })
    }

    /// Map an existing arena file, checking it has the expected size.
    pub fn open<P: AsRef<Path>>(path: P, aid: u64, size: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mmap = MemoryMappedFile::open_rw(&path).context(MmapSnafu { aid })?;

        let actual = mmap.len();
        ensure!(actual == size, ArenaCorruptedSnafu {
            aid,
            actual,
            expected: size,
        });

        Ok(Self {
            aid,
            mmap,
            path,
            size,
        })
    }

    /// Copy bytes starting at `offset` into `buf`.
    ///
    /// Returns fewer than `buf.len()` bytes only when the arena end is hit.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let n = self.clamp(offset, buf.len());
        if n == 0 {
            return Ok(0);
        }
        self.mmap
            .read_into(offset, &mut buf[..n])
            .context(MmapSnafu { aid: self.aid })?;
        Ok(n)
    }

    /// Copy bytes from `data` into the arena starting at `offset`.
    ///
    /// Returns fewer than `data.len()` bytes only when the arena end is hit.
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<usize> {
        let n = self.clamp(offset, data.len());
        if n == 0 {
            return Ok(0);
        }
        self.mmap
            .update_region(offset, &data[..n])
            .context(MmapSnafu { aid: self.aid })?;
        Ok(n)
    }

    /// Decode the length prefix stored at `offset`.
    ///
    /// Callers guarantee all eight bytes lie inside this arena.
    pub fn read_u64(&self, offset: u64) -> Result<u64> {
        let mut buf = [0u8; LENGTH_PREFIX_SIZE as usize];
        self.mmap
            .read_into(offset, &mut buf)
            .context(MmapSnafu { aid: self.aid })?;
        Ok(decode_length(buf))
    }

    /// Synchronize dirty pages of this mapping to disk.
    pub fn flush(&self) -> Result<()> { self.mmap.flush().context(MmapSnafu { aid: self.aid }) }

    pub const fn aid(&self) -> u64 { self.aid }

    pub const fn size(&self) -> u64 { self.size }

    pub fn path(&self) -> &Path { &self.path }

    fn clamp(&self, offset: u64, want: usize) -> usize {
        let remaining = self.size.saturating_sub(offset);
        usize::try_from(remaining).map_or(want, |remaining| remaining.min(want))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::message::encode_length;

    #[test]
    fn test_create_arena() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("arena.dat");

        let arena = Arena::create(&path, 3, 4096).unwrap();
        assert_eq!(arena.size(), 4096);
        assert_eq!(arena.aid(), 3);
        assert_eq!(arena.path(), path);
        assert!(path.exists());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4096);
    }

    #[test]
    fn test_write_and_read_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("arena.dat");

        {
            let arena = Arena::create(&path, 0, 64).unwrap();
            assert_eq!(arena.write_at(10, b"Hello, World!").unwrap(), 13);
            arena.flush().unwrap();
        }

        let arena = Arena::open(&path, 0, 64).unwrap();
        let mut buf = [0u8; 13];
        assert_eq!(arena.read_at(10, &mut buf).unwrap(), 13);
        assert_eq!(&buf, b"Hello, World!");
    }

    #[test]
    fn test_io_is_clamped_at_arena_end() {
        let temp_dir = TempDir::new().unwrap();
        let arena = Arena::create(temp_dir.path().join("arena.dat"), 0, 16).unwrap();

        assert_eq!(arena.write_at(12, b"abcdefgh").unwrap(), 4);

        let mut buf = [0u8; 8];
        assert_eq!(arena.read_at(12, &mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"abcd");

        assert_eq!(arena.read_at(16, &mut buf).unwrap(), 0);
        assert_eq!(arena.write_at(16, b"x").unwrap(), 0);
    }

    #[test]
    fn test_read_u64() {
        let temp_dir = TempDir::new().unwrap();
        let arena = Arena::create(temp_dir.path().join("arena.dat"), 0, 16).unwrap();

        arena.write_at(8, &encode_length(0xDEAD_BEEF)).unwrap();
        assert_eq!(arena.read_u64(8).unwrap(), 0xDEAD_BEEF);
        assert_eq!(arena.read_u64(0).unwrap(), 0);
    }

    #[test]
    fn test_open_rejects_truncated_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("arena.dat");
        drop(Arena::create(&path, 0, 32).unwrap());
        std::fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(8)
            .unwrap();

        let err = Arena::open(&path, 0, 32).err().unwrap();
        assert!(err.is_io());
        assert!(matches!(err, crate::QueueError::ArenaCorrupted {
            aid: 0,
            actual: 8,
            expected: 32,
            ..
        }));
    }

    #[test]
    fn test_open_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = Arena::open(temp_dir.path().join("missing.dat"), 9, 64)
            .err()
            .unwrap();
        assert!(err.is_io());
    }
}
