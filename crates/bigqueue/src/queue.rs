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

//! Main queue struct and lifecycle management.
//!
//! The [`Queue`] is the central entry point for the persistent queue library.
//! It manages:
//! - Recovery of the head/tail index and arena files on startup
//! - The read path (`peek`, `dequeue`) and write path (`enqueue`)
//! - Operation-count and background interval flushing
//! - Orderly shutdown
//!
//! ## Usage
//!
//! ```ignore
//! let queue = QueueBuilder::new("/path/to/queue")
//!     .arena_size(64 * 1024 * 1024)
//!     .periodic_flush_duration(Duration::from_secs(1))
//!     .build()?;
//!
//! queue.enqueue(b"hello")?;
//! let head = queue.peek()?;
//! queue.dequeue()?;
//!
//! queue.close()?;
//! ```
//!
//! ## Locking
//!
//! One mutex guards the whole engine: the index, the arena manager and the
//! mutation counter. The background flusher takes the same lock for its sync
//! pass, so an arena is never synchronized while a write into it is in
//! progress.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use crossbeam::channel::Sender;
use snafu::{OptionExt, ResultExt, ensure};
use tracing::{debug, error, info, warn};

use crate::{
    QueueBuilder, QueueConfig, Result,
    arena::Arena,
    arena_manager::ArenaManager,
    error::{
        ClosedSnafu, CorruptedMessageSnafu, ElementTooLargeSnafu, EmptyQueueSnafu, InternalSnafu,
        InvalidUtf8Snafu,
    },
    flusher::{FlushSignal, Flusher},
    index::Index,
    message::{LENGTH_PREFIX_SIZE, encode_length, framed_size},
    position::Position,
};

/// State shared between caller threads and the flusher, behind one lock.
pub(crate) struct Engine {
    arena_size:       u64,
    flush_ops:        Option<u64>,
    max_element_size: Option<u64>,
    index:            Index,
    arenas:           ArenaManager,
    /// Mutating operations since the last flush.
    ops_since_flush:  u64,
    /// Lets an inline flush restart the flusher's interval.
    flush_notifier:   Option<Sender<FlushSignal>>,
    closed:           bool,
}

impl Engine {
    fn open(config: &QueueConfig) -> Result<Self> {
        let index = Index::open(&config.base_path, config.arena_size)?;
        let arenas = ArenaManager::open(
            config.base_path.clone(),
            config.arena_size,
            config.max_active_arenas,
            index.head(),
            index.tail(),
        )?;

        Ok(Self {
            arena_size: config.arena_size,
            flush_ops: config.flush_ops,
            max_element_size: config.max_element_size,
            index,
            arenas,
            ops_since_flush: 0,
            flush_notifier: None,
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        ensure!(!self.closed, ClosedSnafu);
        Ok(())
    }

    fn ensure_not_empty(&self) -> Result<()> {
        self.ensure_open()?;
        ensure!(!self.index.is_empty(), EmptyQueueSnafu);
        Ok(())
    }

    fn arena(&mut self, aid: u64) -> Result<&Arena> {
        let pinned = [self.index.head().aid, self.index.tail().aid];
        self.arenas.get_arena(aid, pinned)
    }

    fn advance(&self, pos: Position, n: u64) -> Result<Position> {
        pos.advance(n, self.arena_size)
            .with_context(|| InternalSnafu {
                message: format!("position {pos} cannot advance by {n} bytes"),
            })
    }

    fn peek(&mut self) -> Result<Bytes> {
        self.ensure_not_empty()?;

        let (payload_start, length) = self.read_length(self.index.head())?;
        let (payload, _) = self.read_bytes(payload_start, length)?;
        Ok(payload)
    }

    fn dequeue(&mut self) -> Result<()> {
        self.ensure_not_empty()?;

        let old_head = self.index.head();
        let (payload_start, length) = self.read_length(old_head)?;
        let new_head = self.advance(payload_start, length)?;

        let retired = old_head.aid..new_head.aid;
        if retired.is_empty() {
            self.index.put_head(new_head);
            if let Err(e) = self.record_mutation() {
                self.index.put_head(old_head);
                return Err(e);
            }
            return Ok(());
        }

        self.arenas.unmap_arena_range(retired.clone(), false)?;

        let count = new_head.aid - old_head.aid;
        let tail_aid = self.index.tail().aid;
        let (from, to) = match self.arenas.max_active_aid() {
            Some(max_active) => (max_active + 1, max_active + count),
            None => (new_head.aid, new_head.aid + count - 1),
        };
        self.arenas.activate_arena_range(from..=to.min(tail_aid))?;

        // The new head must be durable before consumed files disappear.
        self.index.put_head(new_head);
        if let Err(e) = self.flush() {
            self.index.put_head(old_head);
            return Err(e);
        }

        if let Err(e) = self.arenas.unmap_arena_range(retired.clone(), true) {
            warn!(
                from = retired.start,
                to = retired.end,
                error = %e,
                "Failed to delete consumed arenas, they will be removed on next open"
            );
        }

        debug!(head = %new_head, retired = count, "Retired arenas");
        self.notify_flushed();
        Ok(())
    }

    fn enqueue(&mut self, payload: &[u8]) -> Result<()> {
        self.ensure_open()?;

        let size = payload.len() as u64;
        if let Some(limit) = self.max_element_size {
            ensure!(size <= limit, ElementTooLargeSnafu { size, limit });
        }
        let framed = framed_size(size).context(ElementTooLargeSnafu {
            size,
            limit: u64::MAX - LENGTH_PREFIX_SIZE,
        })?;

        let start = self.index.tail().align_for_prefix(self.arena_size);
        let end = start
            .advance(framed, self.arena_size)
            .context(ElementTooLargeSnafu {
                size,
                limit: u64::MAX - LENGTH_PREFIX_SIZE,
            })?;

        let payload_start = self.write_bytes(start, &encode_length(size))?;
        self.write_bytes(payload_start, payload)?;

        let old_tail = self.index.tail();
        self.index.put_tail(end);
        if let Err(e) = self.record_mutation() {
            self.index.put_tail(old_tail);
            return Err(e);
        }
        Ok(())
    }

    /// Decode the length prefix at `pos`.
    ///
    /// Returns the position of the first payload byte and the payload length.
    fn read_length(&mut self, pos: Position) -> Result<(Position, u64)> {
        let at = pos.align_for_prefix(self.arena_size);
        let length = self.arena(at.aid)?.read_u64(at.offset)?;
        let payload_start = self.advance(at, LENGTH_PREFIX_SIZE)?;

        let available = payload_start.distance_to(self.index.tail(), self.arena_size);
        ensure!(
            available.is_some_and(|available| length <= available),
            CorruptedMessageSnafu {
                position: at,
                length,
            }
        );
        Ok((payload_start, length))
    }

    /// Copy `length` bytes starting at `pos`, crossing arenas as needed.
    fn read_bytes(&mut self, mut pos: Position, length: u64) -> Result<(Bytes, Position)> {
        let length = usize::try_from(length).ok().context(ElementTooLargeSnafu {
            size:  length,
            limit: usize::MAX as u64,
        })?;

        let mut buf = vec![0u8; length];
        let mut copied = 0;
        while copied < length {
            let n = self.arena(pos.aid)?.read_at(pos.offset, &mut buf[copied..])?;
            copied += n;
            pos = self.advance(pos, n as u64)?;
        }
        Ok((Bytes::from(buf), pos))
    }

    /// Copy `data` into the arenas starting at `pos`, allocating new arenas
    /// at the tail edge. Returns the position after the last byte.
    fn write_bytes(&mut self, mut pos: Position, data: &[u8]) -> Result<Position> {
        let mut written = 0;
        while written < data.len() {
            let n = self.arena(pos.aid)?.write_at(pos.offset, &data[written..])?;
            written += n;
            pos = self.advance(pos, n as u64)?;
        }
        Ok(pos)
    }

    /// Count one mutation and flush once `flush_ops` is reached.
    ///
    /// The counter is left untouched when the flush fails, so the caller can
    /// roll the operation back and the next one retries the flush.
    fn record_mutation(&mut self) -> Result<()> {
        let ops = self.ops_since_flush + 1;
        match self.flush_ops {
            Some(limit) if ops >= limit => {
                self.flush()?;
                self.notify_flushed();
            }
            _ => self.ops_since_flush = ops,
        }
        Ok(())
    }

    /// Restart the flusher's interval after an inline flush.
    fn notify_flushed(&self) {
        if let Some(tx) = &self.flush_notifier
            && tx.send(FlushSignal::Reset).is_err()
        {
            debug!("Flusher gone, interval not reset");
        }
    }

    /// Sync mapped arenas, then the index, so the durable tail never points
    /// at bytes that are not on disk yet.
    fn flush(&mut self) -> Result<()> {
        self.arenas.flush()?;
        self.index.flush()?;
        self.ops_since_flush = 0;
        debug!(
            head = %self.index.head(),
            tail = %self.index.tail(),
            active = self.arenas.active_count(),
            "Flushed"
        );
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;
        self.flush_notifier = None;

        let result = self.flush();
        self.arenas.unmap_all();
        result
    }
}

fn lock(engine: &Mutex<Engine>) -> Result<MutexGuard<'_, Engine>> {
    engine.lock().map_err(|_| {
        InternalSnafu {
            message: "queue engine lock poisoned".to_string(),
        }
        .build()
    })
}

/// A persistent, disk-backed FIFO queue of byte messages.
///
/// The queue is thread-safe: every method takes `&self`, so it can be shared
/// behind an `Arc` between producers and consumers. Operations are
/// serialized by one internal lock.
///
/// Resident memory is bounded by `max_active_arenas * arena_size` regardless
/// of how many bytes are queued.
pub struct Queue {
    /// Shared configuration (base path, arena size, flush knobs).
    config:  Arc<QueueConfig>,
    engine:  Arc<Mutex<Engine>>,
    /// Background interval flusher. `None` without an interval or after close.
    flusher: Mutex<Option<Flusher>>,
}

impl Queue {
    /// Open the queue in `base_path` with default options.
    pub fn open<P: Into<std::path::PathBuf>>(base_path: P) -> Result<Self> {
        QueueBuilder::new(base_path).build()
    }

    /// Create or reopen a queue.
    ///
    /// Validates the configuration, creates the directory if needed, loads
    /// the index and maps the head arenas. Spawns the flusher thread when a
    /// flush interval is configured.
    pub(crate) fn new(config: QueueConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.base_path)?;

        let config = Arc::new(config);
        let engine = Arc::new(Mutex::new(Engine::open(&config)?));

        let flusher = match config.flush_interval {
            Some(interval) => {
                let target = Arc::clone(&engine);
                let flusher = Flusher::spawn(interval, move || {
                    let mut engine = lock(&target)?;
                    if engine.closed {
                        return Ok(false);
                    }
                    engine.flush()?;
                    Ok(true)
                })?;
                lock(&engine)?.flush_notifier = Some(flusher.notifier());
                Some(flusher)
            }
            None => None,
        };

        {
            let engine = lock(&engine)?;
            info!(
                path = ?config.base_path,
                arena_size = config.arena_size,
                head = %engine.index.head(),
                tail = %engine.index.tail(),
                "Queue opened"
            );
        }

        Ok(Self {
            config,
            engine,
            flusher: Mutex::new(flusher),
        })
    }

    /// Append one element at the tail.
    pub fn enqueue<T: AsRef<[u8]>>(&self, data: T) -> Result<()> {
        lock(&self.engine)?.enqueue(data.as_ref())
    }

    /// Append a string element at the tail.
    pub fn enqueue_str(&self, data: &str) -> Result<()> { self.enqueue(data.as_bytes()) }

    /// Return the head element without removing it.
    pub fn peek(&self) -> Result<Bytes> { lock(&self.engine)?.peek() }

    /// Return the head element as a string without removing it.
    pub fn peek_string(&self) -> Result<String> {
        let payload = self.peek()?;
        String::from_utf8(payload.to_vec()).context(InvalidUtf8Snafu)
    }

    /// Remove the head element.
    pub fn dequeue(&self) -> Result<()> { lock(&self.engine)?.dequeue() }

    /// Returns `true` when head and tail meet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .index
            .is_empty()
    }

    /// Force mapped arenas and the index to disk now.
    pub fn flush(&self) -> Result<()> {
        let mut engine = lock(&self.engine)?;
        engine.ensure_open()?;
        engine.flush()
    }

    /// Close the queue.
    ///
    /// Stops the flusher (waiting for an in-flight flush), flushes everything
    /// one last time and unmaps all arenas. Later operations fail with
    /// [`QueueError::Closed`](crate::QueueError::Closed).
    pub fn close(&self) -> Result<()> {
        let flusher = self
            .flusher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let stopped = flusher.map_or(Ok(()), Flusher::stop);

        let closed = lock(&self.engine)?.close();
        if closed.is_ok() {
            info!(path = ?self.config.base_path, "Queue closed");
        }
        stopped.and(closed)
    }

    /// Get the queue configuration.
    #[must_use]
    pub fn config(&self) -> &QueueConfig { &self.config }
}

impl Drop for Queue {
    fn drop(&mut self) {
        match self.close() {
            Err(e) if !e.is_closed() => error!(error = %e, "Failed to close queue on drop"),
            _ => {}
        }
    }
}
