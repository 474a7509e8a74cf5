pub mod context;
pub mod table_index;
pub mod table_plain;

pub use context::TxStore;

use crate::record::Record;
use crate::schema::{ModelId, Schema};
use crate::storage::table_index::index_def;
use crate::storage::table_plain::{read_record, records_def, sequences_def};
use crate::value::RecordId;
use crate::{info, AppError};
use redb::backends::InMemoryBackend;
use redb::{Database, WriteTransaction};
use std::path::Path;
use std::sync::Arc;
use std::{env, fs};

pub(crate) const SEQUENCES: &str = "SEQUENCES";

/// Table names of one model.
#[derive(Debug, Clone)]
pub struct TableLayout {
    pub records: String,
    /// Foreign-key column to its index table.
    pub indexes: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct Layout {
    tables: Vec<TableLayout>,
}

impl Layout {
    pub fn new(schema: &Schema) -> Self {
        let tables = schema
            .models()
            .map(|model| {
                let table = model.table.to_uppercase();
                let mut indexes: Vec<(String, String)> = Vec::new();
                for association in &model.associations {
                    if indexes.iter().all(|(fk, _)| *fk != association.foreign_key) {
                        let name = format!("{}_{}_INDEX", table, association.foreign_key.to_uppercase());
                        indexes.push((association.foreign_key.clone(), name));
                    }
                }
                TableLayout { records: format!("{}_BY_{}", table, model.primary_key.to_uppercase()), indexes }
            })
            .collect();
        Self { tables }
    }

    pub fn table(&self, model: ModelId) -> &TableLayout {
        &self.tables[model.0]
    }

    pub fn index(&self, model: ModelId, foreign_key: &str) -> Option<&str> {
        self.table(model).indexes.iter().find(|(fk, _)| fk == foreign_key).map(|(_, name)| name.as_str())
    }
}

/// redb database holding one record table per model plus the foreign-key indexes.
#[derive(Clone)]
pub struct Storage {
    db: Arc<Database>,
    schema: Arc<Schema>,
    layout: Arc<Layout>,
}

impl Storage {
    pub fn open(path: impl AsRef<Path>, schema: Arc<Schema>, cache_size_mb: usize) -> Result<Self, AppError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let db = Database::builder().set_cache_size(cache_size_mb * 1024 * 1024).create(path)?;
        info!("Opened database at {}", path.display());
        Self::init(db, schema)
    }

    /// Fresh database under the temp dir, unique per call.
    pub fn temp(name: &str, schema: Arc<Schema>) -> Result<Self, AppError> {
        let db_path = env::temp_dir().join("denorm").join(format!("{}_{}", name, rand::random::<u64>()));
        Self::open(db_path, schema, 16)
    }

    pub fn in_memory(schema: Arc<Schema>) -> Result<Self, AppError> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        Self::init(db, schema)
    }

    fn init(db: Database, schema: Arc<Schema>) -> Result<Self, AppError> {
        let layout = Layout::new(&schema);
        let tx = db.begin_write()?;
        tx.open_table(sequences_def())?;
        for table in &layout.tables {
            tx.open_table(records_def(&table.records))?;
            for (_, index) in &table.indexes {
                tx.open_multimap_table(index_def(index))?;
            }
        }
        tx.commit()?;
        Ok(Self { db: Arc::new(db), schema, layout: Arc::new(layout) })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn begin_write(&self) -> Result<WriteTransaction, AppError> {
        Ok(self.db.begin_write()?)
    }

    pub fn tx_store<'txn>(&self, tx: &'txn WriteTransaction) -> TxStore<'txn> {
        TxStore::new(tx, Arc::clone(&self.schema), Arc::clone(&self.layout))
    }

    /// Reads committed state only.
    pub fn find(&self, model: ModelId, id: RecordId) -> Result<Option<Record>, AppError> {
        let tx = self.db.begin_read()?;
        let attributes = read_record(&tx, &self.layout.table(model).records, id)?;
        Ok(attributes.map(|attrs| Record::loaded(model, id, attrs)))
    }
}
