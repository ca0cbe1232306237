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

//! Durable head/tail index.
//!
//! The index records where the queue starts and ends so a restart resumes
//! without scanning arena contents. Updates land in memory first
//! (`put_head`/`put_tail`) and are persisted by [`Index::flush`].
//!
//! ## Dual-slot persistence
//!
//! Two slot files, `index.1` and `index.2`, are written alternately with a
//! monotonically increasing generation. A crash while writing one slot leaves
//! the other intact; on open the valid slot with the highest generation wins.
//!
//! ## Record Format
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │ magic: [u8; 4]   │ "BQIX"                              │
//! │ version: u32     │ Format version, currently 1         │
//! │ generation: u64  │ Bumped on every write               │
//! │ arena_size: u64  │ Arena size the queue was created with│
//! │ head_aid: u64    │                                     │
//! │ head_offset: u64 │                                     │
//! │ tail_aid: u64    │                                     │
//! │ tail_offset: u64 │                                     │
//! │ checksum: u32    │ CRC32 of all preceding bytes        │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian.

use std::{
    fs::{File, OpenOptions},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use crc32fast::Hasher;
use snafu::ensure;
use tracing::{debug, warn};

use crate::{
    Result,
    error::{IndexCorruptedSnafu, InvalidConfigurationSnafu},
    path::index_slot_path,
    position::Position,
};

/// Magic bytes identifying an index slot: "BQIX"
pub const INDEX_MAGIC: [u8; 4] = *b"BQIX";

/// Current index format version.
pub const INDEX_VERSION: u32 = 1;

/// Size of one encoded index record in bytes.
pub const INDEX_RECORD_SIZE: usize = 60;

const CHECKSUM_OFFSET: usize = INDEX_RECORD_SIZE - 4;

const SLOTS: [u8; 2] = [1, 2];

/// One decoded index slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IndexRecord {
    generation: u64,
    arena_size: u64,
    head:       Position,
    tail:       Position,
}

impl IndexRecord {
    fn encode(&self) -> [u8; INDEX_RECORD_SIZE] {
        let mut buf = [0u8; INDEX_RECORD_SIZE];
        buf[0..4].copy_from_slice(&INDEX_MAGIC);
        buf[4..8].copy_from_slice(&INDEX_VERSION.to_le_bytes());
        let fields = [
            self.generation,
            self.arena_size,
            self.head.aid,
            self.head.offset,
            self.tail.aid,
            self.tail.offset,
        ];
        for (i, value) in fields.iter().enumerate() {
            let at = 8 + i * 8;
            buf[at..at + 8].copy_from_slice(&value.to_le_bytes());
        }
        let checksum = checksum(&buf[..CHECKSUM_OFFSET]);
        buf[CHECKSUM_OFFSET..].copy_from_slice(&checksum.to_le_bytes());
        buf
    }

    fn decode(data: &[u8]) -> Result<Self> {
        ensure!(data.len() == INDEX_RECORD_SIZE, IndexCorruptedSnafu {
            reason: format!(
                "expected {INDEX_RECORD_SIZE} bytes, found {}",
                data.len()
            ),
        });
        ensure!(data[0..4] == INDEX_MAGIC, IndexCorruptedSnafu {
            reason: "bad magic",
        });

        let version = read_u32(data, 4);
        ensure!(version == INDEX_VERSION, IndexCorruptedSnafu {
            reason: format!("unsupported version {version}"),
        });

        let stored = read_u32(data, CHECKSUM_OFFSET);
        let computed = checksum(&data[..CHECKSUM_OFFSET]);
        ensure!(stored == computed, IndexCorruptedSnafu {
            reason: format!("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}"),
        });

        Ok(Self {
            generation: read_u64(data, 8),
            arena_size: read_u64(data, 16),
            head:       Position::new(read_u64(data, 24), read_u64(data, 32)),
            tail:       Position::new(read_u64(data, 40), read_u64(data, 48)),
        })
    }
}

fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[at..at + 4]);
    u32::from_le_bytes(buf)
}

fn read_u64(data: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(buf)
}

/// In-memory head/tail with dual-slot durable backing.
pub(crate) struct Index {
    base_path:    PathBuf,
    arena_size:   u64,
    head:         Position,
    tail:         Position,
    /// Generation of the last record written or loaded.
    generation:   u64,
    /// Slot holding the latest record; 0 before the first write.
    current_slot: u8,
    dirty:        bool,
}

impl Index {
    /// Load the newest valid slot, or initialize a fresh index.
    ///
    /// Fails if slots exist but none decodes, or if the persisted arena size
    /// differs from `arena_size`.
    pub fn open<P: AsRef<Path>>(base_path: P, arena_size: u64) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();

        let mut found_any = false;
        let mut latest: Option<(u8, IndexRecord)> = None;
        for slot in SLOTS {
            let path = index_slot_path(&base_path, slot);
            if !path.exists() {
                continue;
            }
            found_any = true;

            let mut data = Vec::with_capacity(INDEX_RECORD_SIZE);
            File::open(&path)?.read_to_end(&mut data)?;
            match IndexRecord::decode(&data) {
                Ok(record) => {
                    if latest.is_none_or(|(_, best)| record.generation > best.generation) {
                        latest = Some((slot, record));
                    }
                }
                Err(e) => warn!(path = ?path, error = %e, "Ignoring unreadable index slot"),
            }
        }

        let Some((slot, record)) = latest else {
            ensure!(!found_any, IndexCorruptedSnafu {
                reason: "no index slot could be decoded",
            });

            let mut index = Self {
                base_path,
                arena_size,
                head: Position::default(),
                tail: Position::default(),
                generation: 0,
                current_slot: 0,
                dirty: true,
            };
            index.flush()?;
            debug!(path = ?index.base_path, "Created fresh index");
            return Ok(index);
        };

        ensure!(record.arena_size == arena_size, InvalidConfigurationSnafu {
            message: format!(
                "queue was created with arena size {}, cannot reopen with {arena_size}",
                record.arena_size
            ),
        });
        ensure!(
            record.head <= record.tail
                && record.head.offset < arena_size
                && record.tail.offset < arena_size,
            IndexCorruptedSnafu {
                reason: format!(
                    "inconsistent positions head={} tail={}",
                    record.head, record.tail
                ),
            }
        );

        debug!(
            slot,
            generation = record.generation,
            head = %record.head,
            tail = %record.tail,
            "Loaded index"
        );

        Ok(Self {
            base_path,
            arena_size,
            head: record.head,
            tail: record.tail,
            generation: record.generation,
            current_slot: slot,
            dirty: false,
        })
    }

    pub const fn head(&self) -> Position { self.head }

    pub const fn tail(&self) -> Position { self.tail }

    pub fn is_empty(&self) -> bool { self.head == self.tail }

    #[cfg(test)]
    pub const fn is_dirty(&self) -> bool { self.dirty }

    pub fn put_head(&mut self, head: Position) {
        self.head = head;
        self.dirty = true;
    }

    pub fn put_tail(&mut self, tail: Position) {
        self.tail = tail;
        self.dirty = true;
    }

    /// Persist the current head/tail into the next slot if anything changed.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        let next_slot = if self.current_slot == 1 { 2 } else { 1 };
        let record = IndexRecord {
            generation: self.generation + 1,
            arena_size: self.arena_size,
            head:       self.head,
            tail:       self.tail,
        };

        let path = index_slot_path(&self.base_path, next_slot);
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.write_all(&record.encode())?;
        file.sync_all()?;

        self.generation = record.generation;
        self.current_slot = next_slot;
        self.dirty = false;

        debug!(
            slot = next_slot,
            generation = record.generation,
            head = %self.head,
            tail = %self.tail,
            "Index flushed"
        );
        Ok(())
    }
}
