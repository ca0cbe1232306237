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

//! Basic usage: enqueue a few messages, reopen the queue and drain it.
//!
//! Run with `RUST_LOG=debug cargo run --example basic` to see the arena and
//! index activity.

use std::time::Duration;

use bigqueue::{QueueBuilder, Result};

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    let dir = std::env::temp_dir().join("bigqueue-basic");
    let _ = std::fs::remove_dir_all(&dir);

    {
        let queue = QueueBuilder::new(&dir)
            .arena_size(4096)
            .max_active_arenas(4)
            .periodic_flush_ops(100)
            .periodic_flush_duration(Duration::from_millis(200))
            .build()?;

        for i in 0..1000 {
            queue.enqueue_str(&format!("message-{i}"))?;
        }
        queue.close()?;
    }

    let queue = QueueBuilder::new(&dir)
        .arena_size(4096)
        .max_active_arenas(4)
        .build()?;

    let mut drained = 0;
    while !queue.is_empty() {
        let message = queue.peek_string()?;
        if drained % 250 == 0 {
            println!("{message}");
        }
        queue.dequeue()?;
        drained += 1;
    }
    println!("drained {drained} messages");

    queue.close()?;
    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
