use crate::hooks::{Hooks, LifecycleEvent};
use crate::record::Record;
use crate::schema::ModelId;
use crate::storage::{Storage, TxStore};
use crate::store::RecordStore;
use crate::sync::SyncOutcome;
use crate::value::RecordId;
use crate::{debug, error, AppError};
use std::sync::Arc;

/// Persists records through lifecycle hooks, every hook write shares the caller's transaction.
#[derive(Clone)]
pub struct Repository {
    storage: Storage,
    hooks: Arc<Hooks>,
}

impl Repository {
    pub fn new(storage: Storage, hooks: Arc<Hooks>) -> Self {
        Self { storage, hooks }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Runs `f` in one write transaction, committed on success and aborted on error.
    pub fn transaction<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut TxStore<'_>) -> Result<T, AppError>,
    {
        let tx = self.storage.begin_write()?;
        let result = {
            let mut store = self.storage.tx_store(&tx);
            f(&mut store)
        };
        match result {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = tx.abort() {
                    error!("Failed to abort transaction after {}: {}", err, abort_err);
                }
                Err(err)
            }
        }
    }

    pub fn insert(&self, store: &mut dyn RecordStore, record: &mut Record) -> Result<SyncOutcome, AppError> {
        let outcome = self.hooks.dispatch(LifecycleEvent::BeforeCreate, store, record)?;
        store.insert(record)?;
        Ok(outcome)
    }

    /// No-op for a record without pending changes.
    pub fn update(&self, store: &mut dyn RecordStore, record: &mut Record) -> Result<SyncOutcome, AppError> {
        if record.id().is_none() {
            return Err(AppError::NotPersisted { model: store.schema().name(record.model()).to_string() });
        }
        if !record.has_changes() {
            debug!("Skipping update of unchanged {} {:?}", store.schema().name(record.model()), record.id());
            return Ok(SyncOutcome::default());
        }
        let outcome = self.hooks.dispatch(LifecycleEvent::BeforeUpdate, store, record)?;
        store.write(record)?;
        Ok(outcome)
    }

    pub fn destroy(&self, store: &mut dyn RecordStore, record: &mut Record) -> Result<SyncOutcome, AppError> {
        let id = record.id().ok_or_else(|| AppError::NotPersisted { model: store.schema().name(record.model()).to_string() })?;
        let outcome = self.hooks.dispatch(LifecycleEvent::BeforeDestroy, store, record)?;
        if !store.delete(record.model(), id)? {
            return Err(AppError::NotFound(format!("{} {}", store.schema().name(record.model()), id)));
        }
        Ok(outcome)
    }

    pub fn find(&self, model: ModelId, id: RecordId) -> Result<Option<Record>, AppError> {
        self.storage.find(model, id)
    }
}
