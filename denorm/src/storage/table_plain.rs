use crate::record::Attributes;
use crate::value::RecordId;
use crate::AppError;
use redb::{ReadTransaction, ReadableTable, Table, TableDefinition, WriteTransaction};

pub(crate) fn records_def(name: &str) -> TableDefinition<'_, RecordId, &'static [u8]> {
    TableDefinition::new(name)
}

pub(crate) fn sequences_def() -> TableDefinition<'static, &'static str, RecordId> {
    TableDefinition::new(super::SEQUENCES)
}

/// `pk -> bincode(attributes)` for one model.
pub struct RecordTable<'txn> {
    table: Table<'txn, RecordId, &'static [u8]>,
}

impl<'txn> RecordTable<'txn> {
    pub fn open(tx: &'txn WriteTransaction, name: &str) -> Result<Self, AppError> {
        Ok(Self { table: tx.open_table(records_def(name))? })
    }

    pub fn get(&self, id: RecordId) -> Result<Option<Attributes>, AppError> {
        match self.table.get(&id)? {
            Some(guard) => Ok(Some(bincode::deserialize(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, id: RecordId) -> Result<bool, AppError> {
        Ok(self.table.get(&id)?.is_some())
    }

    pub fn put(&mut self, id: RecordId, attributes: &Attributes) -> Result<(), AppError> {
        let bytes = bincode::serialize(attributes)?;
        self.table.insert(&id, bytes.as_slice())?;
        Ok(())
    }

    pub fn remove(&mut self, id: RecordId) -> Result<Option<Attributes>, AppError> {
        let removed = match self.table.remove(&id)? {
            Some(guard) => Some(bincode::deserialize(guard.value())?),
            None => None,
        };
        Ok(removed)
    }
}

pub fn read_record(tx: &ReadTransaction, name: &str, id: RecordId) -> Result<Option<Attributes>, AppError> {
    let table = tx.open_table(records_def(name))?;
    let attributes = match table.get(&id)? {
        Some(guard) => Some(bincode::deserialize(guard.value())?),
        None => None,
    };
    Ok(attributes)
}

/// Advances the sequence of `name`, or moves it up to an explicitly chosen id.
pub(crate) fn next_id(tx: &WriteTransaction, name: &str, explicit: Option<RecordId>) -> Result<RecordId, AppError> {
    let mut table = tx.open_table(sequences_def())?;
    let current = table.get(name)?.map(|guard| guard.value()).unwrap_or(0);
    let id = match explicit {
        Some(id) => id,
        None => current + 1,
    };
    table.insert(name, id.max(current))?;
    Ok(id)
}
