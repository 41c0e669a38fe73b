use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::info;

use crate::compactor;
use crate::engine::{SchedulingEngine, TenantEngine};
use crate::limits::*;
use crate::store::JournalStore;

/// Manages per-organization engines. Each tenant gets its own store, journal
/// and compactor. Tenant = database name from the pgwire connection.
pub struct TenantManager {
    engines: DashMap<String, Arc<TenantEngine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
}

impl TenantManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
        }
    }

    /// Get or lazily create the engine for the given organization.
    pub fn get_or_create(&self, tenant: &str) -> std::io::Result<Arc<TenantEngine>> {
        if let Some(engine) = self.engines.get(tenant) {
            return Ok(engine.value().clone());
        }
        if tenant.len() > MAX_TENANT_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "tenant name too long",
            ));
        }
        if self.engines.len() >= MAX_TENANTS {
            return Err(std::io::Error::other("too many tenants"));
        }

        // The name is the journal file stem. Refuse anything that would need
        // rewriting, so two names can never share one file.
        if tenant.is_empty()
            || !tenant
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "tenant name must be [A-Za-z0-9_-]",
            ));
        }

        // Two connections may race to open the same tenant; the entry lock
        // makes sure only one journal writer is started per file.
        let vacant = match self.engines.entry(tenant.to_string()) {
            Entry::Occupied(existing) => return Ok(existing.get().clone()),
            Entry::Vacant(vacant) => vacant,
        };

        let journal_path = self.data_dir.join(format!("{tenant}.journal"));
        let store = Arc::new(JournalStore::open(journal_path)?);

        let compactor_store = store.clone();
        let threshold = self.compact_threshold;
        tokio::spawn(async move {
            compactor::run_compactor(compactor_store, threshold).await;
        });

        let engine = Arc::new(SchedulingEngine::new(store));
        vacant.insert(engine.clone());
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        info!(tenant, "tenant loaded");
        Ok(engine)
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}
