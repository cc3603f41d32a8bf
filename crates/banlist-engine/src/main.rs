//! banlist engine runner.
//!
//! Usage: `banlist-engine [config.yaml] [records.json]`
//!
//! - Loads config (strict) and seeds an in-memory store from a JSON array of records
//! - Loads every tracked list, then keeps them fresh in the background
//! - Reads one JSON event per line on stdin and prints `<event_id> spam|ok`

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

use banlist_core::RawRecord;
use banlist_engine::{app_state::AppState, config, store::InMemoryStore};

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let cfg_path = args.next().unwrap_or_else(|| "banlist.yaml".to_string());
    let cfg = config::load_from_file(&cfg_path).expect("config load failed");

    let store = Arc::new(InMemoryStore::new());
    if let Some(path) = args.next() {
        let raw = std::fs::read_to_string(&path).expect("failed to read records file");
        let n = store.load_json(&raw).expect("records file must be a JSON array of records");
        tracing::info!(%path, records = n, "store seeded");
    }

    let (state, refresher) = AppState::new(cfg, store).expect("engine setup failed");
    state.load_all().await;
    let _refresh = refresher.spawn();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let event: RawRecord = match serde_json::from_str(&line) {
            Ok(ev) => ev,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed event");
                continue;
            }
        };
        let spam = state.checkers().check_event_for_spam(&event).await;
        println!("{} {}", event.event_id, if spam { "spam" } else { "ok" });
    }

    tracing::debug!(metrics = %state.metrics().render(), "shutting down");
}
