use crate::query::DependentQuery;
use crate::record::{Attributes, Record};
use crate::schema::{ModelId, Schema};
use crate::value::RecordId;
use crate::AppError;

/// Host persistence as seen by the synchronization engine.
///
/// Every call runs inside the ambient write transaction of the implementor, direct column
/// writes (`update_columns`, `update_all`) never fire lifecycle hooks.
pub trait RecordStore {
    fn schema(&self) -> &Schema;

    fn find(&self, model: ModelId, id: RecordId) -> Result<Option<Record>, AppError>;

    /// Persists a new record, assigning its id unless the primary key is already set.
    fn insert(&mut self, record: &mut Record) -> Result<RecordId, AppError>;

    /// Persists the changed columns of an already stored record and reloads it from the stored row.
    fn write(&mut self, record: &mut Record) -> Result<(), AppError>;

    fn delete(&mut self, model: ModelId, id: RecordId) -> Result<bool, AppError>;

    fn update_columns(&mut self, model: ModelId, id: RecordId, values: &Attributes) -> Result<(), AppError>;

    /// Ids of `query.root` rows reachable from the changed record.
    fn resolve(&self, query: &DependentQuery) -> Result<Vec<RecordId>, AppError>;

    /// One bulk update of every row matching `query`, returns the number of rows written.
    fn update_all(&mut self, query: &DependentQuery, values: &Attributes) -> Result<usize, AppError> {
        let ids = self.resolve(query)?;
        for id in &ids {
            self.update_columns(query.root, *id, values)?;
        }
        Ok(ids.len())
    }
}
