use crate::schema::ModelId;
use crate::value::{RecordId, Value, NULL};
use std::collections::BTreeMap;

pub type Attributes = BTreeMap<String, Value>;

/// In-memory row with its last persisted state, the unit lifecycle hooks operate on.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    model: ModelId,
    id: Option<RecordId>,
    attributes: Attributes,
    persisted: Option<Attributes>,
}

impl Record {
    pub fn new(model: ModelId) -> Self {
        Self { model, id: None, attributes: Attributes::new(), persisted: None }
    }

    /// Row as loaded from storage, with nothing changed yet.
    pub fn loaded(model: ModelId, id: RecordId, attributes: Attributes) -> Self {
        Self { model, id: Some(id), persisted: Some(attributes.clone()), attributes }
    }

    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn model(&self) -> ModelId {
        self.model
    }

    pub fn id(&self) -> Option<RecordId> {
        self.id
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted.is_some()
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn get(&self, column: &str) -> &Value {
        self.attributes.get(column).unwrap_or(&NULL)
    }

    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.attributes.insert(column.to_string(), value.into());
    }

    pub fn persisted_value(&self, column: &str) -> &Value {
        self.persisted.as_ref().and_then(|p| p.get(column)).unwrap_or(&NULL)
    }

    pub fn is_changed(&self, column: &str) -> bool {
        match &self.persisted {
            Some(_) => self.get(column) != self.persisted_value(column),
            None => !self.get(column).is_null(),
        }
    }

    /// For a new record every non-null attribute counts as changed.
    pub fn changed_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self.attributes.keys().filter(|c| self.is_changed(c)).cloned().collect();
        if let Some(persisted) = &self.persisted {
            // cleared by removal rather than by an explicit null
            columns.extend(persisted.keys().filter(|c| !self.attributes.contains_key(*c) && self.is_changed(c)).cloned());
        }
        columns
    }

    pub fn has_changes(&self) -> bool {
        !self.changed_columns().is_empty()
    }

    pub(crate) fn assign_id(&mut self, primary_key: &str, id: RecordId) {
        self.id = Some(id);
        self.attributes.insert(primary_key.to_string(), Value::id(id));
    }

    /// Current attributes become the persisted state.
    pub(crate) fn mark_persisted(&mut self) {
        self.persisted = Some(self.attributes.clone());
    }

    /// Replaces both the attributes and the snapshot with the stored row.
    pub(crate) fn reload(&mut self, attributes: Attributes) {
        self.persisted = Some(attributes.clone());
        self.attributes = attributes;
    }

    /// Applies columns written behind the record's back, without touching other pending changes.
    pub(crate) fn apply_persisted(&mut self, values: &Attributes) {
        let persisted = self.persisted.get_or_insert_with(Attributes::new);
        for (column, value) in values {
            persisted.insert(column.clone(), value.clone());
            self.attributes.insert(column.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod record_tests {
    use super::*;

    #[test]
    fn new_record_reports_non_null_attributes_as_changed() {
        let record = Record::new(ModelId(0)).with("name", "Bob").with("branch_id", Value::Null);
        assert_eq!(record.changed_columns(), vec!["name"]);
        assert!(!record.is_persisted());
    }

    #[test]
    fn loaded_record_tracks_changes_against_storage() {
        let mut attrs = Attributes::new();
        attrs.insert("name".into(), "Bob".into());
        attrs.insert("branch_id".into(), Value::Int(1));
        let mut record = Record::loaded(ModelId(0), 5, attrs);
        assert!(!record.has_changes());

        record.set("branch_id", 2);
        record.set("name", "Bob");
        assert_eq!(record.changed_columns(), vec!["branch_id"]);
        assert_eq!(record.persisted_value("branch_id"), &Value::Int(1));
        assert_eq!(record.get("missing"), &Value::Null);
    }

    #[test]
    fn applied_columns_are_no_longer_changed() {
        let mut record = Record::loaded(ModelId(0), 1, Attributes::new());
        record.set("name", "Alice");
        let mut written = Attributes::new();
        written.insert("cache".into(), "x".into());
        record.apply_persisted(&written);
        assert_eq!(record.get("cache"), &Value::from("x"));
        assert_eq!(record.changed_columns(), vec!["name"]);
    }
}
