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

use std::{io, string::FromUtf8Error};

use snafu::Snafu;

use crate::position::Position;

/// Queue operation errors.
#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum QueueError {
    /// Peek or dequeue on a queue with no elements.
    #[snafu(display("queue is empty"))]
    EmptyQueue {
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    /// An option value was rejected at construction time.
    #[snafu(display("invalid configuration: {message}"))]
    InvalidConfiguration {
        message: String,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },

    /// The payload cannot be framed under the configured limits.
    #[snafu(display("element of {size} bytes exceeds the limit of {limit} bytes"))]
    ElementTooLarge {
        size:  u64,
        limit: u64,
        #[snafu(implicit)]
        loc:   snafu::Location,
    },

    /// Filesystem I/O failure.
    #[snafu(context(false), display("IO error: {source}"))]
    Io {
        source: io::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// Mapping, reading, writing or syncing an arena mapping failed.
    #[snafu(display("mmap operation on arena {aid} failed: {source}"))]
    Mmap {
        aid:    u64,
        source: mmap_io::MmapIoError,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// An arena between head and tail has no backing file.
    #[snafu(display("arena {aid} has no backing file"))]
    ArenaMissing {
        aid: u64,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    /// An arena file on disk does not have the arena size.
    #[snafu(display("arena {aid} holds {actual} bytes, expected {expected}"))]
    ArenaCorrupted {
        aid:      u64,
        actual:   u64,
        expected: u64,
        #[snafu(implicit)]
        loc:      snafu::Location,
    },

    /// No index slot could be decoded.
    #[snafu(display("index corrupted: {reason}"))]
    IndexCorrupted {
        reason: String,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// A length prefix points past the tail of the queue.
    #[snafu(display("corrupted message at {position}: length {length} reaches past the tail"))]
    CorruptedMessage {
        position: Position,
        length:   u64,
        #[snafu(implicit)]
        loc:      snafu::Location,
    },

    /// The head element is not valid UTF-8.
    #[snafu(display("element is not valid UTF-8"))]
    InvalidUtf8 {
        source: FromUtf8Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// Operation attempted after the queue was closed.
    #[snafu(display("queue is closed"))]
    Closed {
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("internal error: {message}"))]
    Internal {
        message: String,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },
}

impl QueueError {
    /// Returns `true` for [`QueueError::EmptyQueue`].
    #[must_use]
    pub const fn is_empty_queue(&self) -> bool { matches!(self, Self::EmptyQueue { .. }) }

    /// Returns `true` for [`QueueError::Closed`].
    #[must_use]
    pub const fn is_closed(&self) -> bool { matches!(self, Self::Closed { .. }) }

    /// Returns `true` when the failure came from the backing files,
    /// including arena files that are missing or truncated.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::Mmap { .. }
                | Self::ArenaMissing { .. }
                | Self::ArenaCorrupted { .. }
        )
    }

    /// Returns `true` for [`QueueError::InvalidConfiguration`].
    #[must_use]
    pub const fn is_invalid_configuration(&self) -> bool {
        matches!(self, Self::InvalidConfiguration { .. })
    }
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
