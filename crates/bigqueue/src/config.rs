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

use std::{path::PathBuf, time::Duration};

use snafu::ensure;

use crate::{Result, error::InvalidConfigurationSnafu, message::LENGTH_PREFIX_SIZE};

/// Default bytes per arena (128 MiB).
pub const DEFAULT_ARENA_SIZE: u64 = 128 * 1024 * 1024;

/// Default bound on simultaneously mapped arenas.
pub const DEFAULT_MAX_ACTIVE_ARENAS: usize = 10;

/// Smallest usable window: the head arena, the tail arena and one arena in
/// motion between them.
pub const MIN_ACTIVE_ARENAS: usize = 3;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub base_path:         PathBuf,
    pub arena_size:        u64,
    pub max_active_arenas: usize,
    /// Flush after this many mutating operations.
    pub flush_ops:         Option<u64>,
    /// Flush at least this often from a background thread.
    pub flush_interval:    Option<Duration>,
    /// Reject payloads larger than this many bytes.
    pub max_element_size:  Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            base_path:         PathBuf::from("./queue_data"),
            arena_size:        DEFAULT_ARENA_SIZE,
            max_active_arenas: DEFAULT_MAX_ACTIVE_ARENAS,
            flush_ops:         None,
            flush_interval:    None,
            max_element_size:  None,
        }
    }
}

impl QueueConfig {
    /// Check every knob before anything touches the disk.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.arena_size > 0, InvalidConfigurationSnafu {
            message: "arena size must be greater than zero",
        });
        ensure!(self.arena_size >= LENGTH_PREFIX_SIZE, InvalidConfigurationSnafu {
            message: format!(
                "arena size must be at least {LENGTH_PREFIX_SIZE} bytes, got {}",
                self.arena_size
            ),
        });
        ensure!(self.max_active_arenas > 0, InvalidConfigurationSnafu {
            message: "max active arenas must be greater than zero",
        });
        ensure!(
            self.max_active_arenas >= MIN_ACTIVE_ARENAS,
            InvalidConfigurationSnafu {
                message: format!(
                    "max active arenas must be at least {MIN_ACTIVE_ARENAS}, got {}",
                    self.max_active_arenas
                ),
            }
        );
        if let Some(ops) = self.flush_ops {
            ensure!(ops > 0, InvalidConfigurationSnafu {
                message: "periodic flush ops must be greater than zero",
            });
        }
        if let Some(interval) = self.flush_interval {
            ensure!(!interval.is_zero(), InvalidConfigurationSnafu {
                message: "periodic flush duration must be greater than zero",
            });
        }
        if let Some(limit) = self.max_element_size {
            ensure!(limit > 0, InvalidConfigurationSnafu {
                message: "max element size must be greater than zero",
            });
        }
        Ok(())
    }
}
