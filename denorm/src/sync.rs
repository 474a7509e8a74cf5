use crate::chain::Chain;
use crate::hooks::Hooks;
use crate::query::{BatchQueue, DependentQuery};
use crate::record::{Attributes, Record};
use crate::registry::{MappingEntry, MappingId, Registry, Role};
use crate::schema::ModelId;
use crate::store::RecordStore;
use crate::value::{RecordId, Value};
use crate::{debug, info, AppError};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Propagation {
    /// Dependent rows receive the new value right away.
    #[default]
    Eager,
    /// Dependent rows with a sync flag only get the flag cleared, see [`Synchronizer::sync_unsynced`].
    Deferred,
}

/// One executed bulk update.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub query: DependentQuery,
    pub columns: Vec<String>,
    /// Mappings whose values went into this write, in queue order.
    pub mappings: Vec<MappingId>,
    pub rows: usize,
}

/// What a lifecycle event changed: columns staged on the record itself and the bulk updates
/// issued for dependent rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncOutcome {
    pub staged: Vec<String>,
    pub batches: Vec<BatchReport>,
}

impl SyncOutcome {
    pub fn merge(&mut self, other: SyncOutcome) {
        self.staged.extend(other.staged);
        self.batches.extend(other.batches);
    }

    /// Number of bulk writes issued.
    pub fn writes(&self) -> usize {
        self.batches.len()
    }

    pub fn rows(&self) -> usize {
        self.batches.iter().map(|b| b.rows).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty() && self.batches.is_empty()
    }
}

/// Keeps cached columns consistent with the records their chains lead to.
#[derive(Debug, Clone)]
pub struct Synchronizer {
    pub(crate) registry: Arc<Registry>,
    propagation: Propagation,
}

impl Synchronizer {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry, propagation: Propagation::default() }
    }

    pub fn with_propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn propagation(&self) -> Propagation {
        self.propagation
    }

    /// Subscribes to the lifecycle events of every model that takes part in a chain.
    pub fn install(self: &Arc<Self>, hooks: &mut Hooks) {
        let schema = Arc::clone(self.registry.schema());
        for model in schema.models() {
            let id = model.id;
            if self.registry.has_role(id, Role::Depender) {
                let sync = Arc::clone(self);
                hooks.on_before_create(id, move |store, record| sync.before_create(store, record));
            }
            if self.registry.has_any_role(id) {
                let sync = Arc::clone(self);
                hooks.on_before_update(id, move |store, record| sync.before_update(store, record));
            }
            if self.registry.has_role(id, Role::Dependee) || self.registry.has_role(id, Role::Intermediary) {
                let sync = Arc::clone(self);
                hooks.on_before_destroy(id, move |store, record| sync.before_destroy(store, record));
            }
        }
        info!("Synchronizer installed {} hooks for {} mappings", hooks.handler_count(), self.registry.entries().len());
    }

    pub fn before_create(&self, store: &mut dyn RecordStore, record: &mut Record) -> Result<SyncOutcome, AppError> {
        let mut outcome = SyncOutcome::default();
        for (entry, _) in self.registry.participations(record.model(), Role::Depender) {
            self.stage(store, entry, record, &mut outcome)?;
        }
        Ok(outcome)
    }

    pub fn before_update(&self, store: &mut dyn RecordStore, record: &mut Record) -> Result<SyncOutcome, AppError> {
        let model = record.model();
        let mut outcome = SyncOutcome::default();
        for (entry, _) in self.registry.participations(model, Role::Depender) {
            if record.is_changed(entry.chain.trigger_column(0)) {
                self.stage(store, entry, record, &mut outcome)?;
            }
        }
        if !self.registry.has_role(model, Role::Dependee) && !self.registry.has_role(model, Role::Intermediary) {
            return Ok(outcome);
        }

        let id = self.persisted_id(record)?;
        let mut queue = BatchQueue::new();
        for (role, entry, position) in self.backward_participations(model) {
            if role == Role::Dependee {
                let source = entry.chain.source_column();
                if record.is_changed(source) {
                    self.enqueue(&mut queue, entry, position, id, record.get(source).clone());
                }
            } else if record.is_changed(entry.chain.trigger_column(position)) {
                let value = resolve_forward(store, &entry.chain, position, record)?;
                self.enqueue(&mut queue, entry, position, id, value);
            }
        }
        self.execute(store, queue, &mut outcome)?;
        Ok(outcome)
    }

    /// Dependent rows lose their cached value, their flags stay true since null is exact.
    pub fn before_destroy(&self, store: &mut dyn RecordStore, record: &mut Record) -> Result<SyncOutcome, AppError> {
        let model = record.model();
        let mut outcome = SyncOutcome::default();
        if !self.registry.has_role(model, Role::Dependee) && !self.registry.has_role(model, Role::Intermediary) {
            return Ok(outcome);
        }
        let id = self.persisted_id(record)?;
        let mut queue = BatchQueue::new();
        for (_, entry, position) in self.backward_participations(model) {
            let query = DependentQuery::for_position(&entry.chain, position, id);
            queue.push(query, entry.id, synced_values(entry, Value::Null));
        }
        self.execute(store, queue, &mut outcome)?;
        Ok(outcome)
    }

    /// Dependee and intermediary participations of `model` in mapping declaration order.
    fn backward_participations(&self, model: ModelId) -> Vec<(Role, &MappingEntry, usize)> {
        let mut refs: Vec<(Role, &MappingEntry, usize)> = [Role::Dependee, Role::Intermediary]
            .into_iter()
            .flat_map(|role| self.registry.participations(model, role).map(move |(entry, position)| (role, entry, position)))
            .collect();
        refs.sort_by_key(|(_, entry, _)| entry.id);
        refs
    }

    fn persisted_id(&self, record: &Record) -> Result<RecordId, AppError> {
        record.id().ok_or_else(|| AppError::NotPersisted { model: self.registry.schema().name(record.model()).to_string() })
    }

    fn stage(&self, store: &dyn RecordStore, entry: &MappingEntry, record: &mut Record, outcome: &mut SyncOutcome) -> Result<(), AppError> {
        let value = resolve_forward(store, &entry.chain, 0, record)?;
        for (column, value) in synced_values(entry, value) {
            record.set(&column, value);
        }
        outcome.staged.push(entry.target_column.clone());
        Ok(())
    }

    fn enqueue(&self, queue: &mut BatchQueue, entry: &MappingEntry, position: usize, id: RecordId, value: Value) {
        let query = DependentQuery::for_position(&entry.chain, position, id);
        match (&entry.sync_flag, self.propagation) {
            (Some(flag), Propagation::Deferred) => queue.push(query, entry.id, [(flag.clone(), Value::Bool(false))]),
            _ => queue.push(query, entry.id, synced_values(entry, value)),
        }
    }

    fn execute(&self, store: &mut dyn RecordStore, queue: BatchQueue, outcome: &mut SyncOutcome) -> Result<(), AppError> {
        for batch in queue.into_batches() {
            let rows = store.update_all(&batch.query, &batch.values)?;
            let columns: Vec<String> = batch.values.keys().cloned().collect();
            debug!("{} -> {} rows via {}", columns.join(", "), rows, batch.query.describe(store.schema()));
            outcome.batches.push(BatchReport { query: batch.query, columns, mappings: batch.mappings, rows });
        }
        Ok(())
    }
}

/// Target value plus the sync flag set to true when the depender declares one.
pub(crate) fn synced_values(entry: &MappingEntry, value: Value) -> Attributes {
    let mut values = Attributes::new();
    values.insert(entry.target_column.clone(), value);
    if let Some(flag) = &entry.sync_flag {
        values.insert(flag.clone(), Value::Bool(true));
    }
    values
}

/// Walks `chain` from the node at `from`, whose record is `record`, to the source column.
///
/// The first hop reads the in-memory record so unsaved foreign keys are honoured, later hops
/// read persisted rows. A null key or a missing row resolves to null.
pub fn resolve_forward(store: &dyn RecordStore, chain: &Chain, from: usize, record: &Record) -> Result<Value, AppError> {
    let mut loaded: Option<Record> = None;
    for position in from..chain.len() {
        let current = loaded.as_ref().unwrap_or(record);
        let node = chain.node(position);
        if let Some(column) = node.source_column.as_deref() {
            return Ok(current.get(column).clone());
        }
        let Some(next_id) = node.foreign_key.as_deref().and_then(|fk| current.get(fk).as_id()) else {
            return Ok(Value::Null);
        };
        match store.find(chain.node(position + 1).model, next_id)? {
            Some(next) => loaded = Some(next),
            None => return Ok(Value::Null),
        }
    }
    Ok(Value::Null)
}

#[cfg(test)]
mod sync_tests {
    use super::*;
    use crate::schema::Schema;
    use crate::storage::Storage;
    use crate::test_utils::{company_registry, load, seed_company_graph, seed_synced_company_graph};

    fn synchronizer() -> Synchronizer {
        Synchronizer::new(Arc::new(company_registry()))
    }

    #[test]
    fn forward_resolution_follows_in_memory_first_hop() {
        let sync = synchronizer();
        let schema = sync.registry().schema().clone();
        let storage = Storage::in_memory(schema.clone()).expect("storage");
        let tx = storage.begin_write().expect("begin");
        let mut store = storage.tx_store(&tx);
        let graph = seed_company_graph(&mut store);

        let employees = schema.model_id("employees").unwrap();
        let entry = sync.registry().mapping_entry(employees, "branch_company_country_name").unwrap();
        let unsaved = Record::new(employees).with("branch_id", graph.branch_b);
        assert_eq!(resolve_forward(&store, &entry.chain, 0, &unsaved).unwrap(), Value::from("B"));

        let dangling = Record::new(employees).with("branch_id", 999);
        assert_eq!(resolve_forward(&store, &entry.chain, 0, &dangling).unwrap(), Value::Null);
        assert_eq!(resolve_forward(&store, &entry.chain, 0, &Record::new(employees)).unwrap(), Value::Null);

        let company = load(&store, "companies", graph.acme);
        assert_eq!(resolve_forward(&store, &entry.chain, 2, &company).unwrap(), Value::from("A"));
    }

    #[test]
    fn create_stages_values_and_flags() {
        let sync = synchronizer();
        let schema = sync.registry().schema().clone();
        let storage = Storage::in_memory(schema.clone()).expect("storage");
        let tx = storage.begin_write().expect("begin");
        let mut store = storage.tx_store(&tx);
        let graph = seed_synced_company_graph(&sync, &mut store);

        let alice = load(&store, "employees", graph.alice);
        assert_eq!(alice.get("branch_company_country_name"), &Value::from("A"));
        assert_eq!(alice.get("branch_company_country_id"), &Value::id(graph.country_a));
        assert_eq!(alice.get("branch_company_name"), &Value::from("Acme"));
        assert_eq!(alice.get("branch_company_name_is_synced"), &Value::Bool(true));

        let dave = load(&store, "employees", graph.dave);
        assert_eq!(dave.get("branch_company_country_name"), &Value::Null);
        assert_eq!(dave.get("branch_company_country_name_is_synced"), &Value::Bool(true));
    }

    #[test]
    fn update_of_unsaved_dependee_requires_id() {
        let sync = synchronizer();
        let schema = sync.registry().schema().clone();
        let storage = Storage::in_memory(schema.clone()).expect("storage");
        let tx = storage.begin_write().expect("begin");
        let mut store = storage.tx_store(&tx);
        let countries = schema.model_id("countries").unwrap();
        let mut country = Record::new(countries).with("name", "Z");
        assert!(matches!(sync.before_update(&mut store, &mut country), Err(AppError::NotPersisted { .. })));
    }

    #[test]
    fn deferred_mode_only_clears_flags() {
        let sync = synchronizer().with_propagation(Propagation::Deferred);
        let schema = sync.registry().schema().clone();
        let storage = Storage::in_memory(schema.clone()).expect("storage");
        let tx = storage.begin_write().expect("begin");
        let mut store = storage.tx_store(&tx);
        let graph = seed_synced_company_graph(&sync, &mut store);

        let mut country = load(&store, "countries", graph.country_a);
        country.set("name", "Atlantis");
        let outcome = sync.before_update(&mut store, &mut country).unwrap();
        assert_eq!(outcome.writes(), 1);
        assert_eq!(outcome.batches[0].columns, vec!["branch_company_country_name_is_synced"]);

        let alice = load(&store, "employees", graph.alice);
        assert_eq!(alice.get("branch_company_country_name"), &Value::from("A"));
        assert_eq!(alice.get("branch_company_country_name_is_synced"), &Value::Bool(false));
    }

    /// companies is intermediary for `country_name` and dependee for `offices.company_name`.
    fn office_synchronizer() -> Synchronizer {
        let schema = Schema::builder()
            .model("countries", |m| m.column("name"))
            .model("companies", |m| m.column("name").belongs_to("country", "countries", "country_id"))
            .model("employees", |m| m.columns(["name", "nickname", "country_name"]).belongs_to("company", "companies", "company_id"))
            .model("offices", |m| m.column("company_name").belongs_to("company", "companies", "company_id"))
            .build()
            .expect("office schema");
        let mut registry = Registry::new(Arc::new(schema));
        registry.configure_expressions("employees", &["company.country.name == country_name", "name == nickname"][..]).expect("employees");
        registry.configure_expressions("offices", &["company.name == company_name"][..]).expect("offices");
        Synchronizer::new(Arc::new(registry))
    }

    fn create(sync: &Synchronizer, store: &mut dyn RecordStore, mut record: Record) -> RecordId {
        sync.before_create(&mut *store, &mut record).expect("before create");
        store.insert(&mut record).expect("insert")
    }

    #[test]
    fn direct_column_mapping_follows_its_source() {
        let sync = office_synchronizer();
        let schema = sync.registry().schema().clone();
        let storage = Storage::in_memory(schema.clone()).expect("storage");
        let tx = storage.begin_write().expect("begin");
        let mut store = storage.tx_store(&tx);
        let employees = schema.model_id("employees").unwrap();

        let bob = create(&sync, &mut store, Record::new(employees).with("name", "Bob"));
        assert_eq!(load(&store, "employees", bob).get("nickname"), &Value::from("Bob"));

        let mut record = load(&store, "employees", bob);
        record.set("name", "Robert");
        let outcome = sync.before_update(&mut store, &mut record).unwrap();
        assert_eq!(outcome.staged, vec!["nickname"]);
        assert_eq!(outcome.writes(), 0);
        store.write(&mut record).unwrap();
        assert_eq!(load(&store, "employees", bob).get("nickname"), &Value::from("Robert"));
    }

    #[test]
    fn backward_batches_follow_mapping_declaration_order() {
        let sync = office_synchronizer();
        let schema = sync.registry().schema().clone();
        let storage = Storage::in_memory(schema.clone()).expect("storage");
        let tx = storage.begin_write().expect("begin");
        let mut store = storage.tx_store(&tx);
        let (countries, companies) = (schema.model_id("countries").unwrap(), schema.model_id("companies").unwrap());
        let (employees, offices) = (schema.model_id("employees").unwrap(), schema.model_id("offices").unwrap());

        let x = create(&sync, &mut store, Record::new(countries).with("name", "X"));
        let y = create(&sync, &mut store, Record::new(countries).with("name", "Y"));
        let initech = create(&sync, &mut store, Record::new(companies).with("name", "Initech").with("country_id", x));
        let peter = create(&sync, &mut store, Record::new(employees).with("name", "Peter").with("company_id", initech));
        let office = create(&sync, &mut store, Record::new(offices).with("company_id", initech));
        assert_eq!(load(&store, "employees", peter).get("country_name"), &Value::from("X"));
        assert_eq!(load(&store, "offices", office).get("company_name"), &Value::from("Initech"));

        let mut company = load(&store, "companies", initech);
        company.set("name", "Initrode");
        company.set("country_id", y);
        let outcome = sync.before_update(&mut store, &mut company).unwrap();
        let roots: Vec<ModelId> = outcome.batches.iter().map(|b| b.query.root).collect();
        assert_eq!(roots, vec![employees, offices]);
        let country_name = sync.registry().mapping_entry(employees, "country_name").unwrap().id;
        assert_eq!(outcome.batches[0].mappings, vec![country_name]);

        assert_eq!(load(&store, "employees", peter).get("country_name"), &Value::from("Y"));
        assert_eq!(load(&store, "offices", office).get("company_name"), &Value::from("Initrode"));
    }
}
