use std::path::PathBuf;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use drip_core::config::EngineConfig;
use drip_core::{DripConfig, InstanceKey};
use drip_engine::{AdmissionGate, Engine, WakeTimer};
use drip_report::StatusReporter;
use drip_store::JobStore;
use tokio::sync::watch;
use tracing::{info, warn};

/// One live engine instance: admission, drain loop, and status reads over
/// a single per-key database file. Each subsystem holds its own connection
/// so status polling never contends with the drain loop.
pub struct Instance {
    pub gate: AdmissionGate,
    pub engine: Engine,
    pub reporter: StatusReporter,
}

/// Maps routing keys to isolated engine instances.
///
/// Lazily opens `{data_dir}/{key}.db` on first use; `recover_all` walks the
/// data directory on startup so interrupted drains resume without waiting
/// for the next client call.
pub struct InstanceRouter {
    data_dir: PathBuf,
    engine_cfg: EngineConfig,
    instances: DashMap<InstanceKey, Arc<Instance>>,
    /// Cloned into every instance's watch loop for clean shutdown.
    shutdown: watch::Receiver<bool>,
}

impl InstanceRouter {
    pub fn new(config: &DripConfig, shutdown: watch::Receiver<bool>) -> anyhow::Result<Self> {
        let data_dir = PathBuf::from(&config.database.dir);
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self {
            data_dir,
            engine_cfg: config.engine.clone(),
            instances: DashMap::new(),
            shutdown,
        })
    }

    /// Number of activated instances (health endpoint).
    pub fn active(&self) -> usize {
        self.instances.len()
    }

    /// Number of instances currently running a drain loop.
    pub fn draining(&self) -> usize {
        self.instances
            .iter()
            .filter(|entry| entry.engine.is_draining())
            .count()
    }

    /// Get the live instance for `key`, activating it if needed.
    ///
    /// The vacant-entry path holds the map shard lock during boot, so two
    /// racing requests can never produce two engines for one key.
    pub fn open(&self, key: &InstanceKey) -> anyhow::Result<Arc<Instance>> {
        if let Some(instance) = self.instances.get(key) {
            return Ok(Arc::clone(&instance));
        }
        match self.instances.entry(key.clone()) {
            Entry::Occupied(e) => Ok(Arc::clone(e.get())),
            Entry::Vacant(v) => {
                let instance = self.boot(key)?;
                v.insert(Arc::clone(&instance));
                Ok(instance)
            }
        }
    }

    /// Activate every instance persisted under the data directory.
    pub fn recover_all(&self) -> anyhow::Result<()> {
        for entry in std::fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(key) = InstanceKey::from_db_file_name(name) else {
                continue;
            };
            if let Err(e) = self.open(&key) {
                warn!(instance = %key, error = %e, "instance activation failed");
            }
        }
        Ok(())
    }

    fn boot(&self, key: &InstanceKey) -> anyhow::Result<Arc<Instance>> {
        let path = self.data_dir.join(key.db_file_name());

        let engine = Engine::new(
            JobStore::open(&path)?,
            WakeTimer::open(&path)?,
            &self.engine_cfg,
        )?;
        let gate = AdmissionGate::new(JobStore::open(&path)?, engine.clone());
        let reporter = StatusReporter::new(JobStore::open(&path)?);

        // Per-instance watch loop: turns the persisted wake timer into an
        // actual callback.
        let watcher = engine.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move { watcher.run(shutdown).await });

        // Crash recovery: an armed timer means a drain was interrupted.
        engine.recover()?;

        info!(instance = %key, path = %path.display(), "instance activated");
        Ok(Arc::new(Instance {
            gate,
            engine,
            reporter,
        }))
    }
}
