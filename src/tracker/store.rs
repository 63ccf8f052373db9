use crate::errors::Result;
use crate::tracker::state::OrderState;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// JSON mirror of the tracker map, used only to survive restarts.
///
/// The file is rewritten in place after every tick; a crash mid-write can
/// leave it truncated, in which case the next start begins from empty state.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable files yield an empty map.
    pub async fn load(&self) -> BTreeMap<String, OrderState> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no state file, starting fresh");
                return BTreeMap::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not read state file, starting fresh");
                return BTreeMap::new();
            }
        };

        match serde_json::from_str::<BTreeMap<String, OrderState>>(&raw) {
            Ok(orders) => {
                info!(path = %self.path.display(), orders = orders.len(), "restored state");
                orders
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file is corrupt, starting fresh");
                BTreeMap::new()
            }
        }
    }

    pub async fn save(&self, orders: &BTreeMap<String, OrderState>) -> Result<()> {
        let json = serde_json::to_string_pretty(orders)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}
