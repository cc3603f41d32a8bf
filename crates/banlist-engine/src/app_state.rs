//! Shared application state: engine, checkers, and the refresher wiring.

use std::sync::Arc;
use std::time::Duration;

use banlist_core::error::Result;

use crate::checks::{CheckerRegistry, MessageMaxLength};
use crate::config::BanlistConfig;
use crate::engine::{Enforcement, PolicyEngine};
use crate::obs::metrics::EngineMetrics;
use crate::refresh::{self, RefreshRequest, Refresher};
use crate::store::PolicyStore;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: BanlistConfig,
    engine: Arc<PolicyEngine>,
    checkers: CheckerRegistry,
    store: Arc<dyn PolicyStore>,
    metrics: Arc<EngineMetrics>,
}

impl AppState {
    /// Build state and the refresher that keeps it current.
    ///
    /// Every tracked list is registered (empty) and a load is queued for it;
    /// the lists fill in once the returned `Refresher` runs.
    pub fn new(cfg: BanlistConfig, store: Arc<dyn PolicyStore>) -> Result<(Self, Refresher)> {
        cfg.validate()?;

        let metrics = Arc::new(EngineMetrics::default());
        let (tx, rx) = refresh::channel();
        let engine = Arc::new(PolicyEngine::new(
            Enforcement::from(&cfg.engine),
            Some(tx),
            Arc::clone(&metrics),
        ));

        for id in &cfg.engine.tracked_containers {
            engine.get_or_create(id);
            engine.request_refresh(RefreshRequest::Full {
                container_id: id.clone(),
            });
        }

        let mut checkers = CheckerRegistry::new(Arc::clone(&engine));
        if cfg.message_max_length.threshold.is_some() {
            checkers.register(Arc::new(MessageMaxLength::new(
                cfg.server_name.clone(),
                &cfg.message_max_length,
            )));
        }
        tracing::info!(
            lists = cfg.engine.tracked_containers.len(),
            checks = ?checkers.registered(),
            "banlist engine configured"
        );

        let refresher = Refresher::new(
            Arc::clone(&engine),
            Arc::clone(&store),
            rx,
            Duration::from_millis(cfg.engine.refresh_interval_ms),
        );

        Ok((
            Self {
                inner: Arc::new(AppStateInner {
                    cfg,
                    engine,
                    checkers,
                    store,
                    metrics,
                }),
            },
            refresher,
        ))
    }

    pub fn cfg(&self) -> &BanlistConfig {
        &self.inner.cfg
    }

    pub fn engine(&self) -> Arc<PolicyEngine> {
        Arc::clone(&self.inner.engine)
    }

    pub fn checkers(&self) -> &CheckerRegistry {
        &self.inner.checkers
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.inner.metrics
    }

    /// Load every tracked list now instead of waiting for the refresher.
    pub async fn load_all(&self) {
        self.inner.engine.rebuild_all(self.inner.store.as_ref()).await;
    }
}
