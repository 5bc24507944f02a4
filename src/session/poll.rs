//! Periodic job status polling.
//!
//! A poller only fetches and forwards; the session applies what it
//! receives. Every successful fetch is forwarded as-is (last write wins).
//! Each [`PollTask`] owns its channel, so snapshots still queued when the
//! task is dropped are dropped with it.

use super::backend::Backend;
use crate::error::Result;
use crate::models::{ExcelStatusResponse, ParseProgress};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Snapshots buffered per poller
const POLL_CHANNEL_CAPACITY: usize = 8;

/// Default polling interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// One polled snapshot
#[derive(Debug, Clone)]
pub enum PollUpdate {
    Parse(ParseProgress),
    Excel(ExcelStatusResponse),
}

/// Owns a running poll loop and its updates; dropping it stops the loop
/// and discards anything not yet received.
#[derive(Debug)]
pub struct PollTask {
    handle: JoinHandle<()>,
    updates: mpsc::Receiver<PollUpdate>,
}

impl PollTask {
    /// Next snapshot from this poller.
    pub async fn next(&mut self) -> Option<PollUpdate> {
        self.updates.recv().await
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PollTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn spawn_poller<F, Fut>(name: &'static str, interval: Duration, mut fetch: F) -> PollTask
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<PollUpdate>> + Send,
{
    let (tx, updates) = mpsc::channel(POLL_CHANNEL_CAPACITY);
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match fetch().await {
                Ok(update) => {
                    if tx.send(update).await.is_err() {
                        debug!(poller = name, "Receiver gone, stopping poller");
                        break;
                    }
                }
                // Poll failures are ignored; the next tick retries.
                Err(e) => debug!(poller = name, error = %e, "Poll failed"),
            }
        }
    });
    PollTask { handle, updates }
}

/// Poll `GET /parse/progress` every `interval`.
pub fn spawn_parse_poller<B: Backend + 'static>(backend: Arc<B>, interval: Duration) -> PollTask {
    spawn_poller("parse", interval, move || {
        let backend = Arc::clone(&backend);
        async move { backend.parse_progress().await.map(PollUpdate::Parse) }
    })
}

/// Poll `GET /excel/status` every `interval`.
pub fn spawn_excel_poller<B: Backend + 'static>(backend: Arc<B>, interval: Duration) -> PollTask {
    spawn_poller("excel", interval, move || {
        let backend = Arc::clone(&backend);
        async move { backend.excel_status().await.map(PollUpdate::Excel) }
    })
}
