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

//! Background periodic flusher.
//!
//! ## Architecture
//!
//! The flusher runs on a dedicated thread and waits on a crossbeam channel
//! with a timeout equal to the flush interval. Foreground operations never
//! wait for it; they only send it signals.
//!
//! ```text
//! ┌──────────────┐   Reset / Stop    ┌──────────────┐   lock + sync   ┌──────────────┐
//! │ Queue (ops)  │ ────────────────► │   Flusher    │ ──────────────► │   Engine     │
//! │  (caller)    │                   │  (bg thread) │   on timeout    │ arenas+index │
//! └──────────────┘                   └──────────────┘                 └──────────────┘
//! ```
//!
//! - **Timeout**: the interval elapsed without a signal, run the flush.
//! - **Reset**: an operation-count flush just happened inline, restart the
//!   wait so the two triggers do not flush back to back.
//! - **Stop**: leave the loop. [`Flusher::stop`] joins the thread, so an
//!   in-flight flush always finishes before the caller tears anything down.

use std::{
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use tracing::{debug, error, info};

use crate::{Result, error::InternalSnafu};

/// Signals sent to the flusher thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlushSignal {
    /// A flush just happened elsewhere; restart the interval.
    Reset,
    /// Exit the run loop.
    Stop,
}

/// Handle to the background flush thread.
pub(crate) struct Flusher {
    tx:     Sender<FlushSignal>,
    handle: Option<JoinHandle<()>>,
}

impl Flusher {
    /// Spawn the flusher thread.
    ///
    /// `flush` runs on every interval timeout. It returns `Ok(false)` when the
    /// flushed target is gone, which ends the thread.
    pub fn spawn<F>(interval: Duration, flush: F) -> Result<Self>
    where
        F: FnMut() -> Result<bool> + Send + 'static,
    {
        let (tx, rx) = unbounded();
        let handle = thread::Builder::new()
            .name("bigqueue-flusher".into())
            .spawn(move || run(&rx, interval, flush))?;

        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    /// Sender used by foreground operations to reset the interval.
    pub fn notifier(&self) -> Sender<FlushSignal> { self.tx.clone() }

    /// Stop the thread and wait for it, including any in-flight flush.
    pub fn stop(mut self) -> Result<()> { self.shutdown() }

    fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        if self.tx.send(FlushSignal::Stop).is_err() {
            debug!("Flusher already exited");
        }
        handle.join().map_err(|_| {
            InternalSnafu {
                message: "flusher thread panicked".to_string(),
            }
            .build()
        })
    }
}

impl Drop for Flusher {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(error = %e, "Failed to stop flusher");
        }
    }
}

fn run<F>(rx: &Receiver<FlushSignal>, interval: Duration, mut flush: F)
where
    F: FnMut() -> Result<bool>,
{
    info!(interval = ?interval, "Flusher starting");

    loop {
        match rx.recv_timeout(interval) {
            Ok(FlushSignal::Reset) => {}
            Ok(FlushSignal::Stop) => {
                info!("Flusher received stop signal");
                break;
            }
            Err(RecvTimeoutError::Disconnected) => {
                info!("Flusher channel disconnected");
                break;
            }
            Err(RecvTimeoutError::Timeout) => match flush() {
                Ok(true) => {}
                Ok(false) => {
                    debug!("Flush target closed");
                    break;
                }
                Err(e) => error!(error = %e, "Periodic flush failed"),
            },
        }
    }

    info!("Flusher stopped");
}
