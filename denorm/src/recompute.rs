use crate::record::{Attributes, Record};
use crate::registry::MappingEntry;
use crate::store::RecordStore;
use crate::sync::{resolve_forward, synced_values, Synchronizer};
use crate::value::Value;
use crate::{debug, AppError};

/// Pull-based rebuild of one record's cached columns, written without firing hooks.
impl Synchronizer {
    /// Freshly resolved value of every cached column, nothing is written.
    pub fn recompute_all_values(&self, store: &dyn RecordStore, record: &Record) -> Result<Attributes, AppError> {
        let mut values = Attributes::new();
        for (column, entry) in self.registry.mapping_entries(record.model()) {
            values.insert(column.to_string(), resolve_forward(store, &entry.chain, 0, record)?);
        }
        Ok(values)
    }

    /// Rewrites every cached column and marks every flag as synced.
    pub fn recompute_all(&self, store: &mut dyn RecordStore, record: &mut Record) -> Result<Attributes, AppError> {
        let entries: Vec<&MappingEntry> = self.registry.mapping_entries(record.model()).map(|(_, e)| e).collect();
        self.persist(store, record, &entries)
    }

    pub fn recompute_one(&self, store: &mut dyn RecordStore, record: &mut Record, column: &str) -> Result<Value, AppError> {
        let model = record.model();
        let entry = self.registry.mapping_entry(model, column).ok_or_else(|| AppError::UnknownMapping {
            model: self.registry.schema().name(model).to_string(),
            column: column.to_string(),
            defined: self.registry.target_columns(model),
        })?;
        let mut written = self.persist(store, record, &[entry])?;
        Ok(written.remove(column).unwrap_or_default())
    }

    /// Recomputes only the columns whose flag is not true, in a single write. Returns how many
    /// columns were caught up.
    pub fn sync_unsynced(&self, store: &mut dyn RecordStore, record: &mut Record) -> Result<usize, AppError> {
        let stale: Vec<&MappingEntry> = self
            .registry
            .mapping_entries(record.model())
            .map(|(_, e)| e)
            .filter(|e| e.sync_flag.as_deref().is_some_and(|flag| record.get(flag).as_bool() != Some(true)))
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }
        self.persist(store, record, &stale)?;
        Ok(stale.len())
    }

    fn persist(&self, store: &mut dyn RecordStore, record: &mut Record, entries: &[&MappingEntry]) -> Result<Attributes, AppError> {
        let id = record.id().ok_or_else(|| AppError::NotPersisted {
            model: self.registry.schema().name(record.model()).to_string(),
        })?;
        let mut values = Attributes::new();
        for entry in entries {
            let value = resolve_forward(store, &entry.chain, 0, record)?;
            values.extend(synced_values(entry, value));
        }
        store.update_columns(record.model(), id, &values)?;
        record.apply_persisted(&values);
        debug!("Recomputed {} columns of {} {}", entries.len(), self.registry.schema().name(record.model()), id);
        Ok(values)
    }
}
