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

use crate::{Queue, QueueConfig, Result};

pub struct QueueBuilder {
    config: QueueConfig,
}

impl QueueBuilder {
    pub fn new<P: Into<PathBuf>>(base_path: P) -> Self {
        Self {
            config: QueueConfig {
                base_path: base_path.into(),
                ..Default::default()
            },
        }
    }

    /// Bytes per arena file. Fixed for the lifetime of the queue directory.
    #[must_use]
    pub fn arena_size(mut self, size: u64) -> Self {
        self.config.arena_size = size;
        self
    }

    #[must_use]
    pub fn max_active_arenas(mut self, count: usize) -> Self {
        self.config.max_active_arenas = count;
        self
    }

    #[must_use]
    pub fn periodic_flush_ops(mut self, ops: u64) -> Self {
        self.config.flush_ops = Some(ops);
        self
    }

    #[must_use]
    pub fn periodic_flush_duration(mut self, interval: Duration) -> Self {
        self.config.flush_interval = Some(interval);
        self
    }

    #[must_use]
    pub fn max_element_size(mut self, bytes: u64) -> Self {
        self.config.max_element_size = Some(bytes);
        self
    }

    /// Validate the options and open the queue.
    pub fn build(self) -> Result<Queue> { Queue::new(self.config) }
}
