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

//! Cursor positions in arena-address space.
//!
//! The queue's byte stream is laid out over a sequence of fixed-size arenas.
//! A [`Position`] names one byte of that stream as `(aid, offset)`, where
//! `offset` is always normalized into `[0, arena_size)`. Ordering is
//! lexicographic on `(aid, offset)`, which matches stream order.
//!
//! ```text
//!   arena 0            arena 1            arena 2
//! ┌──────────────────┬──────────────────┬──────────────────┐
//! │ ....[len][payl...│...oad][len][pay..│load]             │
//! └──────────────────┴──────────────────┴──────────────────┘
//!       ▲ head (0, 4)                        ▲ tail (2, 4)
//! ```
//!
//! All boundary arithmetic used by the read, write and retirement paths lives
//! here so that it is written exactly once.

use std::fmt;

use crate::message::LENGTH_PREFIX_SIZE;

/// A byte position `(aid, offset)` inside the arena sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    /// Arena id.
    pub aid:    u64,
    /// Byte offset inside the arena, always `< arena_size`.
    pub offset: u64,
}

impl Position {
    #[must_use]
    pub const fn new(aid: u64, offset: u64) -> Self { Self { aid, offset } }

    /// First byte of the next arena.
    #[must_use]
    pub const fn next_arena(self) -> Self { Self::new(self.aid + 1, 0) }

    /// Bytes left in the current arena starting at this position.
    #[must_use]
    pub const fn remaining_in_arena(self, arena_size: u64) -> u64 { arena_size - self.offset }

    /// Moves the cursor forward by `n` bytes, rolling into following arenas.
    ///
    /// Returns `None` if the resulting arena id does not fit in a `u64`.
    #[must_use]
    pub fn advance(self, n: u64, arena_size: u64) -> Option<Self> {
        let total = self.offset.checked_add(n)?;
        let aid = self.aid.checked_add(total / arena_size)?;
        Some(Self::new(aid, total % arena_size))
    }

    /// Skips to the next arena when a length prefix would straddle the
    /// current arena's end. Prefixes are always read and written whole.
    #[must_use]
    pub const fn align_for_prefix(self, arena_size: u64) -> Self {
        if self.remaining_in_arena(arena_size) < LENGTH_PREFIX_SIZE {
            self.next_arena()
        } else {
            self
        }
    }

    /// Number of stream bytes from `self` up to `other`.
    ///
    /// Returns `None` when `other` lies before `self`.
    #[must_use]
    pub fn distance_to(self, other: Self, arena_size: u64) -> Option<u64> {
        if other < self {
            return None;
        }
        let arenas = other.aid - self.aid;
        arenas
            .checked_mul(arena_size)?
            .checked_add(other.offset)?
            .checked_sub(self.offset)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.aid, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn test_ordering_is_arena_then_offset() {
        assert!(Position::new(0, 15) < Position::new(1, 0));
        assert!(Position::new(1, 3) < Position::new(1, 4));
        assert_eq!(Position::new(2, 7), Position::new(2, 7));
    }

    #[test_case(Position::new(0, 0), 4, Position::new(0, 4) ; "within arena")]
    #[test_case(Position::new(0, 12), 4, Position::new(1, 0) ; "exactly to the boundary")]
    #[test_case(Position::new(0, 12), 5, Position::new(1, 1) ; "across one boundary")]
    #[test_case(Position::new(3, 10), 40, Position::new(6, 2) ; "across several arenas")]
    #[test_case(Position::new(5, 9), 0, Position::new(5, 9) ; "zero bytes")]
    fn test_advance(start: Position, n: u64, expected: Position) {
        assert_eq!(start.advance(n, 16), Some(expected));
    }

    #[test]
    fn test_advance_overflow() {
        assert_eq!(Position::new(u64::MAX, 0).advance(16, 16), None);
    }

    #[test_case(0, 0 ; "start of arena")]
    #[test_case(8, 8 ; "prefix ends exactly at the boundary")]
    #[test_case(9, 16 ; "prefix would straddle")]
    #[test_case(15, 16 ; "one byte left")]
    fn test_align_for_prefix(offset: u64, expected_stream_offset: u64) {
        let aligned = Position::new(0, offset).align_for_prefix(16);
        assert_eq!(aligned.aid * 16 + aligned.offset, expected_stream_offset);
    }

    #[test]
    fn test_distance() {
        let head = Position::new(1, 12);
        let tail = Position::new(3, 2);
        assert_eq!(head.distance_to(tail, 16), Some(22));
        assert_eq!(head.distance_to(head, 16), Some(0));
        assert_eq!(tail.distance_to(head, 16), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Position::new(4, 2).to_string(), "(4, 2)");
    }
}
