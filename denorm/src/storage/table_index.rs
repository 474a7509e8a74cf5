use crate::value::RecordId;
use crate::AppError;
use redb::{MultimapTable, MultimapTableDefinition, ReadableMultimapTable, WriteTransaction};

pub(crate) fn index_def(name: &str) -> MultimapTableDefinition<'_, RecordId, RecordId> {
    MultimapTableDefinition::new(name)
}

/// `fk -> {pk}` for one foreign-key column, walked backward when resolving dependents.
pub struct ForeignKeyIndex<'txn> {
    table: MultimapTable<'txn, RecordId, RecordId>,
}

impl<'txn> ForeignKeyIndex<'txn> {
    pub fn open(tx: &'txn WriteTransaction, name: &str) -> Result<Self, AppError> {
        Ok(Self { table: tx.open_multimap_table(index_def(name))? })
    }

    pub fn insert(&mut self, fk: RecordId, pk: RecordId) -> Result<(), AppError> {
        self.table.insert(&fk, &pk)?;
        Ok(())
    }

    pub fn remove(&mut self, fk: RecordId, pk: RecordId) -> Result<(), AppError> {
        self.table.remove(&fk, &pk)?;
        Ok(())
    }

    pub fn pks(&self, fk: RecordId) -> Result<Vec<RecordId>, AppError> {
        let mut pks = Vec::new();
        for guard in self.table.get(&fk)? {
            pks.push(guard?.value());
        }
        Ok(pks)
    }
}
