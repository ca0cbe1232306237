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

//! Bounded window of memory-mapped arenas.
//!
//! The [`ArenaManager`] is the only component that opens, maps, unmaps or
//! deletes arena files. It keeps at most `max_active` arenas mapped, no matter
//! how many arenas the queue spans on disk:
//!
//! ```text
//!   on disk:  [3] [4] [5] [6] [7] [8] [9] [10]
//!   mapped:    ▲   ▲   ▲               ▲
//!            head  read-ahead         tail
//! ```
//!
//! - Arenas are mapped lazily by [`ArenaManager::get_arena`]; when the window
//!   is full the highest-id arena that is neither the head, the tail nor the
//!   requested arena is flushed and unmapped.
//! - New arena files are only allocated at the tail edge.
//! - Consumed arenas are unmapped and their files deleted once the head has
//!   moved past them.

use std::{
    collections::BTreeMap,
    io,
    ops::{Range, RangeInclusive},
    path::{Path, PathBuf},
};

use snafu::{OptionExt, ensure};
use tracing::{debug, warn};

use crate::{
    Result,
    arena::Arena,
    error::{ArenaMissingSnafu, InternalSnafu},
    path::{arena_file_path, scan_arena_files},
    position::Position,
};

pub(crate) struct ArenaManager {
    base_path:     PathBuf,
    arena_size:    u64,
    max_active:    usize,
    /// Currently mapped arenas keyed by arena id.
    active:        BTreeMap<u64, Arena>,
    /// Highest arena id that has a backing file.
    max_allocated: Option<u64>,
}

impl ArenaManager {
    /// Take over the arena files of a queue directory.
    ///
    /// Files below the head arena are leftovers of an interrupted retirement
    /// and are deleted. The head arena and the ones after it are mapped up to
    /// the window bound.
    pub fn open(
        base_path: PathBuf,
        arena_size: u64,
        max_active: usize,
        head: Position,
        tail: Position,
    ) -> Result<Self> {
        let mut max_allocated = None;
        for (aid, path) in scan_arena_files(&base_path)? {
            if aid < head.aid {
                warn!(aid, path = ?path, "Deleting arena left behind by the head");
                remove_arena_file(&path)?;
                continue;
            }
            max_allocated = Some(aid);
        }

        let mut manager = Self {
            base_path,
            arena_size,
            max_active,
            active: BTreeMap::new(),
            max_allocated,
        };
        manager.activate_arena_range(head.aid..=tail.aid)?;

        debug!(
            max_allocated = ?manager.max_allocated,
            active = manager.active.len(),
            "Arena manager ready"
        );
        Ok(manager)
    }

    /// Return the mapped arena `aid`, mapping it on demand.
    ///
    /// `pinned` holds the head and tail arena ids; they are never evicted to
    /// make room.
    pub fn get_arena(&mut self, aid: u64, pinned: [u64; 2]) -> Result<&Arena> {
        if !self.active.contains_key(&aid) {
            self.make_room(aid, pinned)?;
            let arena = self.map_arena(aid)?;
            let arena: &Arena = self.active.entry(aid).or_insert(arena);
            return Ok(arena);
        }
        Ok(&self.active[&aid])
    }

    /// Eagerly map the arenas in `range` as read-ahead.
    ///
    /// Stops at the highest allocated arena and when the window is full.
    pub fn activate_arena_range(&mut self, range: RangeInclusive<u64>) -> Result<()> {
        let Some(max_allocated) = self.max_allocated else {
            return Ok(());
        };
        let (start, end) = range.into_inner();

        for aid in start..=end.min(max_allocated) {
            if self.active.len() >= self.max_active {
                break;
            }
            if self.active.contains_key(&aid) {
                continue;
            }
            let arena = self.map_arena(aid)?;
            self.active.insert(aid, arena);
        }
        Ok(())
    }

    /// Unmap the arenas in `range`, deleting their files when `delete_files`
    /// is set. Unmapped content is not flushed: callers only pass arenas the
    /// head has already consumed.
    pub fn unmap_arena_range(&mut self, range: Range<u64>, delete_files: bool) -> Result<()> {
        for aid in range {
            if self.active.remove(&aid).is_some() {
                debug!(aid, "Unmapped arena");
            }
            if delete_files {
                remove_arena_file(&arena_file_path(&self.base_path, aid))?;
                debug!(aid, "Deleted arena");
            }
        }
        Ok(())
    }

    /// Highest arena id currently mapped.
    pub fn max_active_aid(&self) -> Option<u64> { self.active.keys().next_back().copied() }

    pub fn active_count(&self) -> usize { self.active.len() }

    /// Synchronize every mapped arena to disk.
    pub fn flush(&self) -> Result<()> {
        for arena in self.active.values() {
            arena.flush()?;
        }
        Ok(())
    }

    /// Drop every mapping. Callers flush first.
    pub fn unmap_all(&mut self) {
        let count = self.active.len();
        self.active.clear();
        debug!(count, "Unmapped all arenas");
    }

    fn make_room(&mut self, aid: u64, pinned: [u64; 2]) -> Result<()> {
        if self.active.len() < self.max_active {
            return Ok(());
        }

        let victim = self
            .active
            .keys()
            .rev()
            .copied()
            .find(|id| *id != aid && !pinned.contains(id))
            .context(InternalSnafu {
                message: format!("no arena can be evicted to map arena {aid}"),
            })?;

        if let Some(arena) = self.active.remove(&victim) {
            arena.flush()?;
            debug!(aid = arena.aid(), "Evicted arena");
        }
        Ok(())
    }

    fn map_arena(&mut self, aid: u64) -> Result<Arena> {
        let path = arena_file_path(&self.base_path, aid);

        match self.max_allocated {
            Some(max_allocated) if aid <= max_allocated => {
                ensure!(path.exists(), ArenaMissingSnafu { aid });
                let arena = Arena::open(&path, aid, self.arena_size)?;
                debug!(aid, path = ?arena.path(), "Mapped arena");
                Ok(arena)
            }
            _ => {
                let arena = Arena::create(&path, aid, self.arena_size)?;
                self.max_allocated = Some(aid);
                debug!(aid, path = ?arena.path(), size = arena.size(), "Allocated arena");
                Ok(arena)
            }
        }
    }
}

fn remove_arena_file(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const SIZE: u64 = 16;

    fn manager(temp_dir: &TempDir, max_active: usize) -> ArenaManager {
        ArenaManager::open(
            temp_dir.path().to_path_buf(),
            SIZE,
            max_active,
            Position::default(),
            Position::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_get_arena_allocates_at_tail_edge() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = manager(&temp_dir, 3);
        assert_eq!(manager.active_count(), 0);
        assert_eq!(manager.max_active_aid(), None);

        let arena = manager.get_arena(0, [0, 0]).unwrap();
        assert_eq!(arena.aid(), 0);
        assert!(arena_file_path(temp_dir.path(), 0).exists());
        assert_eq!(manager.max_active_aid(), Some(0));
        assert_eq!(manager.max_allocated, Some(0));
    }

    #[test]
    fn test_window_is_bounded() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = manager(&temp_dir, 3);

        for aid in 0..10 {
            manager.get_arena(aid, [0, aid]).unwrap();
            assert!(manager.active_count() <= 3);
        }

        // head and tail survive eviction
        assert!(manager.active.contains_key(&0));
        assert!(manager.active.contains_key(&9));
        assert_eq!(manager.max_allocated, Some(9));
    }

    #[test]
    fn test_evicted_arena_keeps_its_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = manager(&temp_dir, 3);

        manager.get_arena(0, [0, 0]).unwrap();
        manager.get_arena(1, [0, 0]).unwrap().write_at(0, b"kept").unwrap();
        manager.get_arena(2, [0, 2]).unwrap();
        manager.get_arena(3, [0, 2]).unwrap();
        assert!(!manager.active.contains_key(&1));
        assert_eq!(manager.active_count(), 3);

        let mut buf = [0u8; 4];
        manager
            .get_arena(1, [0, 2])
            .unwrap()
            .read_at(0, &mut buf)
            .unwrap();
        assert_eq!(&buf, b"kept");
    }

    #[test]
    fn test_activate_range_caps_at_allocated() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = manager(&temp_dir, 10);
        for aid in 0..4 {
            manager.get_arena(aid, [0, aid]).unwrap();
        }
        manager.unmap_arena_range(0..4, false).unwrap();
        assert_eq!(manager.active_count(), 0);

        manager.activate_arena_range(1..=20).unwrap();
        assert_eq!(manager.active_count(), 3);
        assert_eq!(manager.max_active_aid(), Some(3));
        assert!(!arena_file_path(temp_dir.path(), 4).exists());

        let (start, end) = (5, 4);
        manager.activate_arena_range(start..=end).unwrap();
        assert_eq!(manager.active_count(), 3);
    }

    #[test]
    fn test_activate_range_respects_window() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = manager(&temp_dir, 3);
        for aid in 0..6 {
            manager.get_arena(aid, [0, aid]).unwrap();
        }
        manager.unmap_arena_range(0..6, false).unwrap();

        manager.activate_arena_range(0..=5).unwrap();
        assert_eq!(manager.active_count(), 3);
        assert_eq!(manager.max_active_aid(), Some(2));
    }

    #[test]
    fn test_unmap_and_delete() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = manager(&temp_dir, 5);
        for aid in 0..3 {
            manager.get_arena(aid, [0, aid]).unwrap();
        }

        manager.unmap_arena_range(0..2, true).unwrap();
        assert_eq!(manager.active_count(), 1);
        assert!(!arena_file_path(temp_dir.path(), 0).exists());
        assert!(!arena_file_path(temp_dir.path(), 1).exists());
        assert!(arena_file_path(temp_dir.path(), 2).exists());

        // deleting again is harmless
        manager.unmap_arena_range(0..2, true).unwrap();
    }

    #[test]
    fn test_missing_arena_below_tail_edge() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = manager(&temp_dir, 5);
        for aid in 0..3 {
            manager.get_arena(aid, [0, aid]).unwrap();
        }
        manager.unmap_arena_range(1..2, true).unwrap();

        let err = manager.get_arena(1, [0, 2]).err().unwrap();
        assert!(err.is_io());
        assert!(matches!(err, crate::QueueError::ArenaMissing { aid: 1, .. }));
    }

    #[test]
    fn test_open_sweeps_consumed_arenas() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut manager = manager(&temp_dir, 5);
            for aid in 0..4 {
                manager.get_arena(aid, [0, aid]).unwrap();
            }
        }

        let manager = ArenaManager::open(
            temp_dir.path().to_path_buf(),
            SIZE,
            5,
            Position::new(2, 3),
            Position::new(3, 0),
        )
        .unwrap();

        assert!(!arena_file_path(temp_dir.path(), 0).exists());
        assert!(!arena_file_path(temp_dir.path(), 1).exists());
        assert_eq!(manager.max_allocated, Some(3));
        assert_eq!(manager.active_count(), 2);
        assert_eq!(manager.max_active_aid(), Some(3));
    }
}
