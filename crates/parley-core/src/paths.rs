//! Standard paths used by Parley components

use std::path::PathBuf;

/// Standard Parley paths
pub struct Paths {
    /// Data directory (~/.local/share/parley)
    pub data: PathBuf,
    /// Config directory (~/.config/parley)
    pub config: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let data = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("parley");

        let config = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("parley");

        Self { data, config }
    }

    /// Default ledger file (JSON lines)
    pub fn ledger(&self) -> PathBuf {
        self.data.join("ledger").join("ledger.jsonl")
    }

    /// Directory holding persisted session files
    pub fn sessions(&self) -> PathBuf {
        self.data.join("sessions")
    }

    /// Escalation notification history file
    pub fn escalations(&self) -> PathBuf {
        self.data.join("escalations.jsonl")
    }

    /// Main config file
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.json")
    }
}
