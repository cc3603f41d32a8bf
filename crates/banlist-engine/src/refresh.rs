//! Background refresh of policy lists.
//!
//! A single task owns all store-backed rebuilds: requests queued by the
//! engine (boot loads, live records) and a periodic full refresh. Queries
//! never wait on it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use banlist_core::RawRecord;

use crate::engine::PolicyEngine;
use crate::store::PolicyStore;

#[derive(Debug, Clone)]
pub enum RefreshRequest {
    /// Re-read one list from the store.
    Full { container_id: String },
    /// Re-read one list and fold `record` over the snapshot.
    Incremental {
        container_id: String,
        record: RawRecord,
    },
}

pub fn channel() -> (
    mpsc::UnboundedSender<RefreshRequest>,
    mpsc::UnboundedReceiver<RefreshRequest>,
) {
    mpsc::unbounded_channel()
}

pub struct Refresher {
    engine: Arc<PolicyEngine>,
    store: Arc<dyn PolicyStore>,
    rx: mpsc::UnboundedReceiver<RefreshRequest>,
    interval: Duration,
}

impl Refresher {
    pub fn new(
        engine: Arc<PolicyEngine>,
        store: Arc<dyn PolicyStore>,
        rx: mpsc::UnboundedReceiver<RefreshRequest>,
        interval: Duration,
    ) -> Self {
        Self {
            engine,
            store,
            rx,
            interval,
        }
    }

    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; boot loads arrive as requests.
        tick.tick().await;

        loop {
            tokio::select! {
                req = self.rx.recv() => match req {
                    Some(req) => self.handle(req).await,
                    None => {
                        tracing::info!("refresh queue closed; refresher stopping");
                        break;
                    }
                },
                _ = tick.tick() => {
                    tracing::debug!("periodic ban list refresh");
                    self.engine.rebuild_all(self.store.as_ref()).await;
                }
            }
        }
    }

    async fn handle(&self, req: RefreshRequest) {
        match req {
            RefreshRequest::Full { container_id } => {
                self.engine
                    .rebuild(self.store.as_ref(), &container_id, None)
                    .await;
            }
            RefreshRequest::Incremental {
                container_id,
                record,
            } => {
                self.engine
                    .rebuild(self.store.as_ref(), &container_id, Some(&record))
                    .await;
            }
        }
    }
}
