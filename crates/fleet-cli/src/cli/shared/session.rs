use super::*;

/// Config and inventory location resolved for one invocation.
pub(in crate::cli) struct Session {
    pub(in crate::cli) config: FleetConfig,
    pub(in crate::cli) config_path: PathBuf,
    pub(in crate::cli) store: InventoryStore,
}

impl Session {
    pub(in crate::cli) fn open(global: &GlobalArgs) -> anyhow::Result<Self> {
        let config_path = match &global.config {
            Some(path) => path.clone(),
            None => default_config_path()?,
        };
        let config = FleetConfig::load(&config_path)?;
        let inventory_path = match &global.inventory {
            Some(path) => path.clone(),
            None => config.inventory_path()?,
        };
        Ok(Self {
            config,
            config_path,
            store: InventoryStore::new(inventory_path),
        })
    }

    /// Held across load-modify-save of the inventory.
    pub(in crate::cli) fn lock(&self, command: &str) -> anyhow::Result<RunLock> {
        RunLock::for_inventory(self.store.path(), command)
    }

    pub(in crate::cli) fn load_inventory(&self) -> anyhow::Result<Inventory> {
        self.store
            .load()
            .with_context(|| format!("load inventory {}", self.store.path().display()))
    }

    pub(in crate::cli) fn save_inventory(&self, inventory: &Inventory) -> anyhow::Result<()> {
        self.store.save(inventory)
    }

    /// Engine with `--jobs` / `--timeout` applied over the config.
    pub(in crate::cli) fn fleet(&self, run: &RunArgs) -> Fleet {
        let mut config = self.config.clone();
        if let Some(jobs) = run.jobs {
            config.concurrency = Some(jobs);
        }
        if let Some(timeout) = run.timeout {
            config.timeout_secs = timeout;
        }
        Fleet::from_config(&config, RunContext::new())
    }
}

pub(in crate::cli) fn stdin_is_tty() -> bool {
    use std::io::IsTerminal;
    io::stdin().is_terminal()
}

pub(in crate::cli) fn audit_status(severity: Severity) -> AuditStatus {
    match severity {
        Severity::Ok => AuditStatus::Ok,
        Severity::Warning => AuditStatus::Warning,
        Severity::Failure => AuditStatus::Failed,
    }
}
