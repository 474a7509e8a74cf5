use crate::hooks::Hooks;
use crate::logger;
use crate::registry::Registry;
use crate::repository::Repository;
use crate::settings::AppConfig;
use crate::storage::Storage;
use crate::sync::Synchronizer;
use crate::{info, AppError};
use std::sync::Arc;

/// Everything wired from settings: schema, compiled mappings, hooks and the database.
#[derive(Clone)]
pub struct Runtime {
    pub registry: Arc<Registry>,
    pub synchronizer: Arc<Synchronizer>,
    pub repository: Repository,
}

impl Runtime {
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let storage = Storage::open(&config.storage.db_path, Arc::new(config.to_schema()?), config.storage.db_cache_size_mb)?;
        Self::with_storage(config, storage)
    }

    /// Same wiring over an already opened storage, its schema must come from `config`.
    pub fn with_storage(config: &AppConfig, storage: Storage) -> Result<Self, AppError> {
        logger::set_level(config.sync.log_level);
        let mut registry = Registry::new(Arc::clone(storage.schema())).with_sync_flag_suffix(&config.sync.sync_flag_suffix);
        for (model, tree) in &config.mappings {
            registry.configure(model, tree)?;
        }
        for (model, expressions) in &config.expressions {
            registry.configure_expressions(model, expressions.as_slice())?;
        }
        let registry = Arc::new(registry);
        let synchronizer = Arc::new(Synchronizer::new(Arc::clone(&registry)).with_propagation(config.sync.propagation));

        let mut hooks = Hooks::new();
        synchronizer.install(&mut hooks);
        let repository = Repository::new(storage, Arc::new(hooks));
        info!("Runtime ready with {} models and {} mappings", registry.schema().len(), registry.entries().len());
        Ok(Self { registry, synchronizer, repository })
    }
}
