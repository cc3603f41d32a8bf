use serde::Deserialize;
use banlist_core::error::{BanlistError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BanlistConfig {
    pub version: u32,

    /// Name of the local homeserver; senders on it count as local.
    #[serde(default)]
    pub server_name: String,

    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub message_max_length: MessageMaxLengthSection,
}

impl BanlistConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(BanlistError::UnsupportedVersion);
        }

        self.engine.validate()?;
        self.message_max_length.validate()?;

        Ok(())
    }
}

/// What the policy engine enforces and which lists it follows.
///
/// The `block_*` and `ban_lists` spellings from older deployments are
/// accepted as aliases.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    #[serde(default, alias = "block_messages")]
    pub enforce_messages: bool,

    #[serde(default = "default_true", alias = "block_invites")]
    pub enforce_invites: bool,

    #[serde(default, alias = "block_usernames")]
    pub enforce_usernames: bool,

    #[serde(default, alias = "ban_lists")]
    pub tracked_containers: Vec<String>,

    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            enforce_messages: false,
            enforce_invites: true,
            enforce_usernames: false,
            tracked_containers: Vec::new(),
            refresh_interval_ms: default_refresh_interval_ms(),
        }
    }
}

impl EngineSection {
    pub fn validate(&self) -> Result<()> {
        if !(1_000..=86_400_000).contains(&self.refresh_interval_ms) {
            return Err(BanlistError::BadRequest(
                "engine.refresh_interval_ms must be between 1000 and 86400000".into(),
            ));
        }
        if self.tracked_containers.iter().any(|c| c.trim().is_empty()) {
            return Err(BanlistError::BadRequest(
                "engine.tracked_containers must not contain empty ids".into(),
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
fn default_refresh_interval_ms() -> u64 {
    300_000
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MessageMaxLengthSection {
    /// Maximum body length in characters. Unset disables the check.
    #[serde(default)]
    pub threshold: Option<usize>,

    /// Rooms the limit applies to; empty means every room.
    #[serde(default)]
    pub rooms: Vec<String>,

    /// Also limit messages from remote senders.
    #[serde(default)]
    pub remote_servers: bool,
}

impl MessageMaxLengthSection {
    pub fn validate(&self) -> Result<()> {
        if self.threshold == Some(0) {
            return Err(BanlistError::BadRequest(
                "message_max_length.threshold must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
