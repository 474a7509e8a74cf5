use crate::chain::{Chain, ChainNode};
use crate::compiler;
use crate::mapping::{FlatMapping, MappingTree};
use crate::schema::{ModelId, Schema};
use crate::AppError;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const DEFAULT_SYNC_FLAG_SUFFIX: &str = "_is_synced";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Depender,
    Dependee,
    Intermediary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MappingId(pub(crate) usize);

/// Back-reference from a model's role slot to the node it occupies in a mapping's chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainRef {
    pub mapping: MappingId,
    pub position: usize,
}

/// A compiled target column bound to its chain.
#[derive(Debug, Clone)]
pub struct MappingEntry {
    pub id: MappingId,
    pub depender: ModelId,
    pub target_column: String,
    pub sync_flag: Option<String>,
    pub chain: Chain,
}

impl MappingEntry {
    pub fn node(&self, position: usize) -> &ChainNode {
        self.chain.node(position)
    }
}

#[derive(Debug, Clone, Default)]
struct ModelRoles {
    dependers: Vec<ChainRef>,
    dependees: Vec<ChainRef>,
    intermediaries: Vec<ChainRef>,
    by_target: BTreeMap<String, MappingId>,
}

impl ModelRoles {
    fn refs(&self, role: Role) -> &[ChainRef] {
        match role {
            Role::Depender => &self.dependers,
            Role::Dependee => &self.dependees,
            Role::Intermediary => &self.intermediaries,
        }
    }

    fn refs_mut(&mut self, role: Role) -> &mut Vec<ChainRef> {
        match role {
            Role::Depender => &mut self.dependers,
            Role::Dependee => &mut self.dependees,
            Role::Intermediary => &mut self.intermediaries,
        }
    }
}

/// Per-model index of every chain a model takes part in.
///
/// Populated while configuring, then frozen behind an `Arc` and only read.
#[derive(Debug, Clone)]
pub struct Registry {
    schema: Arc<Schema>,
    sync_flag_suffix: String,
    entries: Vec<MappingEntry>,
    roles: Vec<ModelRoles>,
}

impl Registry {
    pub fn new(schema: Arc<Schema>) -> Self {
        let roles = vec![ModelRoles::default(); schema.len()];
        Self { schema, sync_flag_suffix: DEFAULT_SYNC_FLAG_SUFFIX.to_string(), entries: Vec::new(), roles }
    }

    pub fn with_sync_flag_suffix(mut self, suffix: &str) -> Self {
        self.sync_flag_suffix = suffix.to_string();
        self
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn sync_flag_suffix(&self) -> &str {
        &self.sync_flag_suffix
    }

    /// Compiles a nested mapping declared on `model`.
    pub fn configure(&mut self, model: &str, mapping: &MappingTree) -> Result<Vec<MappingId>, AppError> {
        let model = self.schema.model_id(model)?;
        compiler::compile(self, model, &mapping.flatten())
    }

    /// Compiles `a.b.column == target` expressions declared on `model`.
    pub fn configure_expressions<S: AsRef<str>>(&mut self, model: &str, expressions: &[S]) -> Result<Vec<MappingId>, AppError> {
        let model = self.schema.model_id(model)?;
        let mappings = FlatMapping::parse_all(expressions)?;
        compiler::compile(self, model, &mappings)
    }

    pub fn configure_flat(&mut self, model: &str, mappings: &[FlatMapping]) -> Result<Vec<MappingId>, AppError> {
        let model = self.schema.model_id(model)?;
        compiler::compile(self, model, mappings)
    }

    pub fn entry(&self, id: MappingId) -> &MappingEntry {
        &self.entries[id.0]
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn has_role(&self, model: ModelId, role: Role) -> bool {
        self.roles.get(model.0).is_some_and(|r| !r.refs(role).is_empty())
    }

    pub fn has_any_role(&self, model: ModelId) -> bool {
        [Role::Depender, Role::Dependee, Role::Intermediary].into_iter().any(|role| self.has_role(model, role))
    }

    pub fn refs(&self, model: ModelId, role: Role) -> &[ChainRef] {
        self.roles.get(model.0).map(|r| r.refs(role)).unwrap_or(&[])
    }

    /// Entries of `model` in `role` together with the position the model holds in each chain.
    pub fn participations(&self, model: ModelId, role: Role) -> impl Iterator<Item = (&MappingEntry, usize)> + '_ {
        self.refs(model, role).iter().map(move |r| (self.entry(r.mapping), r.position))
    }

    /// Target column to entry, for the mappings `model` holds as depender.
    pub fn mapping_entries(&self, model: ModelId) -> impl Iterator<Item = (&str, &MappingEntry)> + '_ {
        self.roles
            .get(model.0)
            .into_iter()
            .flat_map(|r| r.by_target.iter())
            .map(move |(column, id)| (column.as_str(), self.entry(*id)))
    }

    pub fn mapping_entry(&self, model: ModelId, target_column: &str) -> Option<&MappingEntry> {
        self.roles.get(model.0).and_then(|r| r.by_target.get(target_column)).map(|id| self.entry(*id))
    }

    pub fn target_columns(&self, model: ModelId) -> Vec<String> {
        self.mapping_entries(model).map(|(column, _)| column.to_string()).collect()
    }

    pub(crate) fn push_entry(
        &mut self,
        depender: ModelId,
        target_column: String,
        sync_flag: Option<String>,
        chain: Chain,
    ) -> MappingId {
        let id = MappingId(self.entries.len());
        self.entries.push(MappingEntry { id, depender, target_column, sync_flag, chain });
        id
    }

    pub(crate) fn bind_target(&mut self, model: ModelId, target_column: &str, id: MappingId) {
        self.roles[model.0].by_target.insert(target_column.to_string(), id);
    }

    pub(crate) fn register(&mut self, model: ModelId, role: Role, chain_ref: ChainRef) {
        self.roles[model.0].refs_mut(role).push(chain_ref);
    }
}
