use crate::record::Record;
use crate::registry::Registry;
use crate::schema::Schema;
use crate::store::RecordStore;
use crate::sync::Synchronizer;
use crate::value::{RecordId, Value};
use std::sync::Arc;

/// employees -> branches -> companies -> countries, with categories hanging off every level.
pub fn company_schema() -> Arc<Schema> {
    let schema = Schema::builder()
        .model("categories", |m| m.column("name"))
        .model("countries", |m| m.column("name").belongs_to("category", "categories", "category_id"))
        .model("companies", |m| {
            m.column("name")
                .belongs_to("country", "countries", "country_id")
                .belongs_to("category", "categories", "category_id")
        })
        .model("branches", |m| {
            m.column("name")
                .belongs_to("company", "companies", "company_id")
                .belongs_to("category", "categories", "category_id")
        })
        .model("employees", |m| {
            m.columns([
                "name",
                "branch_company_country_name",
                "branch_company_country_name_is_synced",
                "branch_company_name",
                "branch_company_name_is_synced",
            ])
            .belongs_to("branch", "branches", "branch_id")
            .belongs_to("category", "categories", "category_id")
            .belongs_to("country", "countries", "branch_company_country_id")
        })
        .build()
        .expect("company schema");
    Arc::new(schema)
}

pub fn company_registry() -> Registry {
    let mut registry = Registry::new(company_schema());
    registry
        .configure(
            "employees",
            &crate::mapping! {
                branch: {
                    company: {
                        country: { name: branch_company_country_name, id: branch_company_country_id },
                        name: branch_company_name
                    }
                }
            },
        )
        .expect("company mappings");
    registry
}

/// Ids of the rows created by [`seed_company_graph`].
///
/// Alice and Bob work at branch A of Acme (country A), Carol at branch B of Globex
/// (country B), Dave has no branch.
#[derive(Debug, Clone, Copy)]
pub struct CompanyGraph {
    pub country_a: RecordId,
    pub country_b: RecordId,
    pub acme: RecordId,
    pub globex: RecordId,
    pub branch_a: RecordId,
    pub branch_b: RecordId,
    pub alice: RecordId,
    pub bob: RecordId,
    pub carol: RecordId,
    pub dave: RecordId,
}

/// Plain inserts, caches stay empty.
pub fn seed_company_graph(store: &mut dyn RecordStore) -> CompanyGraph {
    seed(store, None)
}

/// Inserts through the create hook so every cached column starts out in sync.
pub fn seed_synced_company_graph(sync: &Synchronizer, store: &mut dyn RecordStore) -> CompanyGraph {
    seed(store, Some(sync))
}

fn seed(store: &mut dyn RecordStore, sync: Option<&Synchronizer>) -> CompanyGraph {
    let schema = store.schema().clone();
    let model = |name: &str| schema.model_id(name).expect("model");
    let countries = model("countries");
    let companies = model("companies");
    let branches = model("branches");
    let employees = model("employees");

    let country_a = insert(store, sync, Record::new(countries).with("name", "A"));
    let country_b = insert(store, sync, Record::new(countries).with("name", "B"));
    let acme = insert(store, sync, Record::new(companies).with("name", "Acme").with("country_id", country_a));
    let globex = insert(store, sync, Record::new(companies).with("name", "Globex").with("country_id", country_b));
    let branch_a = insert(store, sync, Record::new(branches).with("name", "Branch A").with("company_id", acme));
    let branch_b = insert(store, sync, Record::new(branches).with("name", "Branch B").with("company_id", globex));
    let alice = insert(store, sync, Record::new(employees).with("name", "Alice").with("branch_id", branch_a));
    let bob = insert(store, sync, Record::new(employees).with("name", "Bob").with("branch_id", branch_a));
    let carol = insert(store, sync, Record::new(employees).with("name", "Carol").with("branch_id", branch_b));
    let dave = insert(store, sync, Record::new(employees).with("name", "Dave").with("branch_id", Value::Null));

    CompanyGraph { country_a, country_b, acme, globex, branch_a, branch_b, alice, bob, carol, dave }
}

fn insert(store: &mut dyn RecordStore, sync: Option<&Synchronizer>, mut record: Record) -> RecordId {
    if let Some(sync) = sync {
        sync.before_create(&mut *store, &mut record).expect("before create");
    }
    store.insert(&mut record).expect("insert")
}

pub fn load(store: &dyn RecordStore, model: &str, id: RecordId) -> Record {
    let model = store.schema().model_id(model).expect("model");
    store.find(model, id).expect("find").expect("record present")
}
