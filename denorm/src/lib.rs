//! denorm keeps denormalized columns in sync with the values they mirror.
//!
//! A cached column on a record (the depender) copies a column reachable only through a chain of
//! belongs-to associations, e.g. `employee.branch.company.country.name`. Mappings are compiled once
//! into chains and registered against every model they touch. Lifecycle hooks then recompute the
//! cached value when the depender's own foreign key changes and push new values backward, in
//! batched bulk updates, when a record further down the chain changes or disappears.
//!
//! Records live in [Redb](https://github.com/cberner/redb), encoded with `bincode`, with a multimap
//! index per foreign key so dependent rows are found without scans.

pub mod chain;
pub mod compiler;
pub mod error;
pub mod hooks;
pub mod logger;
pub mod macro_rules;
pub mod mapping;
pub mod query;
pub mod recompute;
pub mod record;
pub mod registry;
pub mod repository;
pub mod runtime;
pub mod schema;
pub mod settings;
pub mod storage;
pub mod store;
pub mod sync;
pub mod value;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use chain::{Chain, ChainNode};
pub use error::AppError;
pub use hooks::{Hooks, LifecycleEvent};
pub use mapping::{FlatMapping, MappingNode, MappingTree};
pub use query::DependentQuery;
pub use record::{Attributes, Record};
pub use redb;
pub use redb::WriteTransaction;
pub use registry::{MappingEntry, MappingId, Registry, Role};
pub use repository::Repository;
pub use runtime::Runtime;
pub use schema::{ModelId, Schema};
pub use settings::AppConfig;
pub use storage::{Storage, TxStore};
pub use store::RecordStore;
pub use sync::{Propagation, SyncOutcome, Synchronizer};
pub use value::{RecordId, Value};
