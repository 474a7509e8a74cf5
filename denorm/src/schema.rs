use crate::AppError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Index of a model in its [`Schema`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelId(pub usize);

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Single-valued forward reference, `belongs_to` style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    pub name: String,
    pub target: ModelId,
    pub foreign_key: String,
}

#[derive(Debug, Clone)]
pub struct ModelDef {
    pub id: ModelId,
    pub name: String,
    pub table: String,
    pub primary_key: String,
    pub columns: Vec<String>,
    pub associations: Vec<Association>,
}

/// What a path segment resolves to on a given model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Association(&'a Association),
    Column(&'a str),
}

/// Typed capability set consulted while building chains.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities<'a> {
    pub associations: &'a [Association],
    pub columns: &'a [String],
}

impl<'a> Capabilities<'a> {
    /// Association names win over identically named columns.
    pub fn resolve(&self, segment: &str) -> Option<Segment<'a>> {
        if let Some(association) = self.associations.iter().find(|a| a.name == segment) {
            return Some(Segment::Association(association));
        }
        self.columns.iter().find(|c| *c == segment).map(|c| Segment::Column(c.as_str()))
    }
}

impl ModelDef {
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn association(&self, name: &str) -> Option<&Association> {
        self.associations.iter().find(|a| a.name == name)
    }

    pub fn capabilities(&self) -> Capabilities<'_> {
        Capabilities { associations: &self.associations, columns: &self.columns }
    }

    pub fn is_foreign_key(&self, column: &str) -> bool {
        self.associations.iter().any(|a| a.foreign_key == column)
    }
}

/// Immutable arena of reflected models.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    models: Vec<ModelDef>,
    by_name: HashMap<String, ModelId>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn model(&self, id: ModelId) -> &ModelDef {
        &self.models[id.0]
    }

    pub fn get(&self, id: ModelId) -> Option<&ModelDef> {
        self.models.get(id.0)
    }

    pub fn model_id(&self, name: &str) -> Result<ModelId, AppError> {
        self.by_name.get(name).copied().ok_or_else(|| AppError::UnknownModel(name.to_string()))
    }

    pub fn capabilities(&self, id: ModelId) -> Capabilities<'_> {
        self.model(id).capabilities()
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelDef> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn name(&self, id: ModelId) -> &str {
        &self.model(id).name
    }
}

#[derive(Debug, Clone)]
pub struct ModelSpec {
    name: String,
    table: Option<String>,
    primary_key: String,
    columns: Vec<String>,
    belongs_to: Vec<(String, String, String)>,
}

impl ModelSpec {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), table: None, primary_key: "id".to_string(), columns: Vec::new(), belongs_to: Vec::new() }
    }

    pub fn table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn primary_key(mut self, pk: &str) -> Self {
        self.primary_key = pk.to_string();
        self
    }

    pub fn column(mut self, column: &str) -> Self {
        if !self.columns.iter().any(|c| c == column) {
            self.columns.push(column.to_string());
        }
        self
    }

    pub fn columns<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        columns.into_iter().fold(self, |spec, c| spec.column(c.as_ref()))
    }

    /// Declares `name -> target` through `foreign_key`, adding the key column when missing.
    pub fn belongs_to(mut self, name: &str, target: &str, foreign_key: &str) -> Self {
        self.belongs_to.push((name.to_string(), target.to_string(), foreign_key.to_string()));
        self.column(foreign_key)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    specs: Vec<ModelSpec>,
}

impl SchemaBuilder {
    pub fn model(mut self, name: &str, f: impl FnOnce(ModelSpec) -> ModelSpec) -> Self {
        self.specs.push(f(ModelSpec::new(name)));
        self
    }

    pub fn spec(mut self, spec: ModelSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn build(self) -> Result<Schema, AppError> {
        let mut by_name = HashMap::new();
        for (idx, spec) in self.specs.iter().enumerate() {
            if by_name.insert(spec.name.clone(), ModelId(idx)).is_some() {
                return Err(AppError::new(format!("model {} declared twice", spec.name)));
            }
        }
        let mut models = Vec::with_capacity(self.specs.len());
        for (idx, spec) in self.specs.into_iter().enumerate() {
            let mut associations = Vec::with_capacity(spec.belongs_to.len());
            for (name, target, foreign_key) in spec.belongs_to {
                let target = by_name.get(&target).copied().ok_or_else(|| AppError::UnknownModel(target.clone()))?;
                associations.push(Association { name, target, foreign_key });
            }
            let mut columns = spec.columns;
            if !columns.iter().any(|c| *c == spec.primary_key) {
                columns.insert(0, spec.primary_key.clone());
            }
            models.push(ModelDef {
                id: ModelId(idx),
                table: spec.table.unwrap_or_else(|| spec.name.clone()),
                name: spec.name,
                primary_key: spec.primary_key,
                columns,
                associations,
            });
        }
        Ok(Schema { models, by_name })
    }
}

#[cfg(test)]
mod schema_tests {
    use super::*;

    fn schema() -> Schema {
        Schema::builder()
            .model("countries", |m| m.columns(["name", "branch"]))
            .model("branches", |m| m.column("name").belongs_to("country", "countries", "country_id"))
            .build()
            .expect("schema")
    }

    #[test]
    fn primary_and_foreign_keys_become_columns() {
        let schema = schema();
        let branches = schema.model(schema.model_id("branches").unwrap());
        assert_eq!(branches.columns, vec!["id", "name", "country_id"]);
        assert!(branches.is_foreign_key("country_id"));
        assert!(!branches.is_foreign_key("name"));
    }

    #[test]
    fn association_wins_over_column_of_same_name() {
        let schema = Schema::builder()
            .model("countries", |m| m.column("name"))
            .model("companies", |m| m.column("country").belongs_to("country", "countries", "country_id"))
            .build()
            .expect("schema");
        let companies = schema.capabilities(schema.model_id("companies").unwrap());
        match companies.resolve("country") {
            Some(Segment::Association(a)) => assert_eq!(a.foreign_key, "country_id"),
            other => panic!("expected association, got {:?}", other),
        }
        assert_eq!(companies.resolve("id"), Some(Segment::Column("id")));
        assert_eq!(companies.resolve("missing"), None);
    }

    #[test]
    fn unknown_association_target_fails() {
        let err = Schema::builder()
            .model("branches", |m| m.belongs_to("company", "companies", "company_id"))
            .build()
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownModel(ref m) if m == "companies"));
    }

    #[test]
    fn capabilities_expose_columns_and_associations() {
        let schema = schema();
        let caps = schema.capabilities(schema.model_id("branches").unwrap());
        assert_eq!(caps.associations.len(), 1);
        assert_eq!(caps.columns.len(), 3);
        assert!(matches!(caps.resolve("country"), Some(Segment::Association(a)) if a.target == schema.model_id("countries").unwrap()));
        assert_eq!(caps.resolve("country_id"), Some(Segment::Column("country_id")));
        assert_eq!(caps.resolve("company"), None);
    }
}
