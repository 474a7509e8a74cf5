use crate::chain::Chain;
use crate::registry::MappingId;
use crate::schema::{ModelId, Schema};
use crate::value::{RecordId, Value};
use std::collections::{BTreeMap, HashMap};

/// `from.foreign_key = to.primary_key`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinHop {
    pub from: ModelId,
    pub association: String,
    pub foreign_key: String,
    pub to: ModelId,
}

/// Rows of `root` whose association path through `joins` leads to `target_id` of `target`.
///
/// Equality is structural, two mappings sharing the join path and the changed record resolve
/// to the same rows and are written together.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependentQuery {
    pub root: ModelId,
    pub joins: Vec<JoinHop>,
    pub target: ModelId,
    pub target_id: RecordId,
}

impl DependentQuery {
    /// Query from the outermost model of `chain` down to the record sitting at `position`.
    pub fn for_position(chain: &Chain, position: usize, target_id: RecordId) -> Self {
        let joins = chain.nodes()[..position]
            .iter()
            .zip(chain.nodes()[1..=position].iter())
            .map(|(from, to)| JoinHop {
                from: from.model,
                association: from.association.clone().unwrap_or_default(),
                foreign_key: from.foreign_key.clone().unwrap_or_default(),
                to: to.model,
            })
            .collect();
        Self { root: chain.depender(), joins, target: chain.node(position).model, target_id }
    }

    pub fn describe(&self, schema: &Schema) -> String {
        let root = schema.model(self.root);
        let mut out = root.table.clone();
        let mut path = Vec::new();
        for hop in &self.joins {
            path.push(hop.association.as_str());
        }
        if !path.is_empty() {
            out.push_str(&format!(" JOIN {}", path.join(" > ")));
        }
        let target = schema.model(self.target);
        out.push_str(&format!(" WHERE {}.{} = {}", target.table, target.primary_key, self.target_id));
        out
    }
}

/// Column changes queued for one dependent query.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub query: DependentQuery,
    pub values: BTreeMap<String, Value>,
    pub mappings: Vec<MappingId>,
}

/// Batches keyed by query, kept in order of first appearance.
#[derive(Debug, Default)]
pub struct BatchQueue {
    batches: Vec<Batch>,
    index: HashMap<DependentQuery, usize>,
}

impl BatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<I>(&mut self, query: DependentQuery, mapping: MappingId, values: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let idx = match self.index.get(&query) {
            Some(idx) => *idx,
            None => {
                let idx = self.batches.len();
                self.index.insert(query.clone(), idx);
                self.batches.push(Batch { query, values: BTreeMap::new(), mappings: Vec::new() });
                idx
            }
        };
        let batch = &mut self.batches[idx];
        batch.values.extend(values);
        batch.mappings.push(mapping);
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn into_batches(self) -> Vec<Batch> {
        self.batches
    }
}
