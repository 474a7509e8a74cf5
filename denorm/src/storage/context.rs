use crate::query::DependentQuery;
use crate::record::{Attributes, Record};
use crate::schema::{ModelDef, ModelId, Schema};
use crate::storage::table_index::ForeignKeyIndex;
use crate::storage::table_plain::{next_id, RecordTable};
use crate::storage::Layout;
use crate::store::RecordStore;
use crate::value::{RecordId, Value};
use crate::{debug, AppError};
use redb::WriteTransaction;
use std::sync::Arc;

/// [`RecordStore`] bound to one redb write transaction. Tables are opened per call so that
/// nested reads and writes of the same table never overlap.
pub struct TxStore<'txn> {
    tx: &'txn WriteTransaction,
    schema: Arc<Schema>,
    layout: Arc<Layout>,
}

impl<'txn> TxStore<'txn> {
    pub fn new(tx: &'txn WriteTransaction, schema: Arc<Schema>, layout: Arc<Layout>) -> Self {
        Self { tx, schema, layout }
    }

    pub fn tx(&self) -> &'txn WriteTransaction {
        self.tx
    }

    fn records(&self, model: ModelId) -> Result<RecordTable<'txn>, AppError> {
        RecordTable::open(self.tx, &self.layout.table(model).records)
    }

    /// Unknown columns are rejected, keys must hold ids or null.
    fn validate(&self, model: &ModelDef, attributes: &Attributes) -> Result<(), AppError> {
        for (column, value) in attributes {
            if !model.has_column(column) {
                return Err(AppError::UnknownColumn { model: model.name.clone(), column: column.clone() });
            }
            let is_key = *column == model.primary_key || model.is_foreign_key(column);
            if is_key && !value.is_null() && value.as_id().is_none() {
                return Err(AppError::TypeMismatch {
                    model: model.name.clone(),
                    column: column.clone(),
                    expected: "id",
                    found: value.type_name().to_string(),
                });
            }
        }
        Ok(())
    }

    fn reindex(&self, model: ModelId, id: RecordId, old: Option<&Attributes>, new: Option<&Attributes>) -> Result<(), AppError> {
        let fk_of = |attrs: Option<&Attributes>, column: &str| attrs.and_then(|a| a.get(column)).and_then(Value::as_id);
        for (column, index) in &self.layout.table(model).indexes {
            let (before, after) = (fk_of(old, column), fk_of(new, column));
            if before == after {
                continue;
            }
            let mut index = ForeignKeyIndex::open(self.tx, index)?;
            if let Some(fk) = before {
                index.remove(fk, id)?;
            }
            if let Some(fk) = after {
                index.insert(fk, id)?;
            }
        }
        Ok(())
    }
}

impl RecordStore for TxStore<'_> {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn find(&self, model: ModelId, id: RecordId) -> Result<Option<Record>, AppError> {
        let attributes = self.records(model)?.get(id)?;
        Ok(attributes.map(|attrs| Record::loaded(model, id, attrs)))
    }

    fn insert(&mut self, record: &mut Record) -> Result<RecordId, AppError> {
        let schema = Arc::clone(&self.schema);
        let model = schema.model(record.model());
        self.validate(model, record.attributes())?;
        let explicit = record.get(&model.primary_key).as_id().or(record.id());
        let id = next_id(self.tx, &self.layout.table(model.id).records, explicit)?;
        {
            let mut table = self.records(model.id)?;
            if table.contains(id)? {
                return Err(AppError::DuplicateKey { model: model.name.clone(), id });
            }
            record.assign_id(&model.primary_key, id);
            table.put(id, record.attributes())?;
        }
        self.reindex(model.id, id, None, Some(record.attributes()))?;
        record.mark_persisted();
        debug!("Inserted {} {}", model.name, id);
        Ok(id)
    }

    fn write(&mut self, record: &mut Record) -> Result<(), AppError> {
        let schema = Arc::clone(&self.schema);
        let model = schema.model(record.model());
        let id = record.id().ok_or_else(|| AppError::NotPersisted { model: model.name.clone() })?;
        let changes: Attributes = record
            .changed_columns()
            .into_iter()
            .map(|column| {
                let value = record.get(&column).clone();
                (column, value)
            })
            .collect();
        self.validate(model, &changes)?;
        // only dirty columns, cached values written by bulk updates since the load stay intact
        let (old, new) = {
            let mut table = self.records(model.id)?;
            let old = table.get(id)?.ok_or_else(|| AppError::NotFound(format!("{} {}", model.name, id)))?;
            let mut new = old.clone();
            new.extend(changes);
            table.put(id, &new)?;
            (old, new)
        };
        self.reindex(model.id, id, Some(&old), Some(&new))?;
        record.reload(new);
        Ok(())
    }

    fn delete(&mut self, model: ModelId, id: RecordId) -> Result<bool, AppError> {
        let removed = self.records(model)?.remove(id)?;
        match removed {
            Some(old) => {
                self.reindex(model, id, Some(&old), None)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn update_columns(&mut self, model: ModelId, id: RecordId, values: &Attributes) -> Result<(), AppError> {
        let schema = Arc::clone(&self.schema);
        let def = schema.model(model);
        self.validate(def, values)?;
        let (old, new) = {
            let mut table = self.records(model)?;
            let old = table.get(id)?.ok_or_else(|| AppError::NotFound(format!("{} {}", def.name, id)))?;
            let mut new = old.clone();
            new.extend(values.iter().map(|(c, v)| (c.clone(), v.clone())));
            table.put(id, &new)?;
            (old, new)
        };
        self.reindex(model, id, Some(&old), Some(&new))
    }

    fn resolve(&self, query: &DependentQuery) -> Result<Vec<RecordId>, AppError> {
        let mut ids = vec![query.target_id];
        for hop in query.joins.iter().rev() {
            let name = self.layout.index(hop.from, &hop.foreign_key).ok_or_else(|| AppError::UnknownColumn {
                model: self.schema.name(hop.from).to_string(),
                column: hop.foreign_key.clone(),
            })?;
            let index = ForeignKeyIndex::open(self.tx, name)?;
            let mut next = Vec::new();
            for id in &ids {
                next.extend(index.pks(*id)?);
            }
            ids = next;
            if ids.is_empty() {
                break;
            }
        }
        Ok(ids)
    }
}
