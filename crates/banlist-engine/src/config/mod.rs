//! Engine config loader (strict parsing).

pub mod schema;

use std::fs;

use banlist_core::error::{BanlistError, Result};

pub use schema::{BanlistConfig, EngineSection, MessageMaxLengthSection};

pub fn load_from_file(path: &str) -> Result<BanlistConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| BanlistError::Internal(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<BanlistConfig> {
    let cfg: BanlistConfig = serde_yaml::from_str(s)
        .map_err(|e| BanlistError::BadRequest(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
