use crate::error::FleetError;
use crate::inventory::Inventory;
use crate::model::InventoryEntry;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const INVENTORY_VERSION: u64 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct InventoryFile {
    version: u64,
    #[serde(default)]
    entries: Vec<InventoryEntry>,
}

/// On-disk JSON snapshot of the inventory.
#[derive(Debug, Clone)]
pub struct InventoryStore {
    path: PathBuf,
}

impl InventoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> anyhow::Result<Inventory> {
        if !self.path.exists() {
            return Ok(Inventory::new());
        }
        let data = fs::read_to_string(&self.path).map_err(|err| self.error(err.to_string()))?;
        let json: serde_json::Value =
            serde_json::from_str(&data).map_err(|err| self.error(err.to_string()))?;
        match json.get("version").and_then(|value| value.as_u64()) {
            Some(INVENTORY_VERSION) => {
                let file: InventoryFile =
                    serde_json::from_value(json).map_err(|err| self.error(err.to_string()))?;
                Ok(Inventory::from_entries(file.entries))
            }
            Some(other) => Err(FleetError::InventoryVersion(other).into()),
            None => Err(self.error("missing version field".to_string()).into()),
        }
    }

    pub fn save(&self, inventory: &Inventory) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("create inventory directory")?;
        }
        let file = InventoryFile {
            version: INVENTORY_VERSION,
            entries: inventory.entries().to_vec(),
        };
        let data = serde_json::to_string_pretty(&file).context("serialize inventory")?;
        fs::write(&self.path, data)
            .with_context(|| format!("write inventory {}", self.path.display()))?;
        Ok(())
    }

    fn error(&self, message: String) -> FleetError {
        FleetError::Inventory {
            path: self.path.clone(),
            message,
        }
    }
}
