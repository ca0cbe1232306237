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

//! A persistent, disk-backed FIFO queue of byte messages.
//!
//! Messages are framed with a little-endian `u64` length prefix and written
//! into a sequence of fixed-size, memory-mapped arena files. A small dual-slot
//! index file tracks the head (next message to read) and tail (next write
//! position), so a reopened queue resumes exactly where the last flush left it.
//!
//! ```ignore
//! use bigqueue::QueueBuilder;
//!
//! let queue = QueueBuilder::new("/tmp/my_queue")
//!     .arena_size(64 * 1024 * 1024)
//!     .periodic_flush_ops(1000)
//!     .build()?;
//!
//! queue.enqueue(b"hello")?;
//! assert_eq!(queue.peek()?.as_ref(), b"hello");
//! queue.dequeue()?;
//! ```

mod arena;
mod arena_manager;
pub mod builder;
pub mod config;
pub mod error;
mod flusher;
mod index;
pub mod message;
pub mod path;
pub mod position;
mod queue;

pub use builder::QueueBuilder;
pub use config::QueueConfig;
pub use error::{QueueError, Result};
pub use message::LENGTH_PREFIX_SIZE;
pub use position::Position;
pub use queue::Queue;
