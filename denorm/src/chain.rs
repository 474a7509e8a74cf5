use crate::schema::{ModelId, Schema, Segment};
use crate::AppError;
use std::ops::Range;

/// One hop of an association chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainNode {
    pub model: ModelId,
    /// Association followed to reach the child node.
    pub association: Option<String>,
    pub foreign_key: Option<String>,
    /// Only set on the innermost node.
    pub source_column: Option<String>,
}

impl ChainNode {
    fn new(model: ModelId) -> Self {
        Self { model, association: None, foreign_key: None, source_column: None }
    }

    pub fn is_terminal(&self) -> bool {
        self.source_column.is_some()
    }
}

/// Association hops from the depender (position 0) to the dependee (last position).
///
/// Parent of node `i` is node `i - 1` and its child is node `i + 1`. Exactly the last node
/// carries a source column, exactly the first has no parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    nodes: Vec<ChainNode>,
}

impl Chain {
    /// Walks `segments` over the schema starting at `model`, failing on the first segment that
    /// is neither a belongs-to association nor a column of the current model.
    pub fn build<S: AsRef<str>>(schema: &Schema, model: ModelId, segments: &[S]) -> Result<Chain, AppError> {
        let mut nodes = vec![ChainNode::new(model)];
        let mut remaining = segments.iter().map(AsRef::<str>::as_ref);
        while let Some(segment) = remaining.next() {
            let idx = nodes.len() - 1;
            let current = schema.model(nodes[idx].model);
            match schema.capabilities(current.id).resolve(segment) {
                Some(Segment::Association(association)) => {
                    nodes[idx].association = Some(association.name.clone());
                    nodes[idx].foreign_key = Some(association.foreign_key.clone());
                    nodes.push(ChainNode::new(association.target));
                }
                Some(Segment::Column(column)) => {
                    if let Some(trailing) = remaining.next() {
                        return Err(AppError::InvalidAssociationOrAttribute {
                            model: current.name.clone(),
                            segment: trailing.to_string(),
                        });
                    }
                    nodes[idx].source_column = Some(column.to_string());
                    return Ok(Chain { nodes });
                }
                None => {
                    return Err(AppError::InvalidAssociationOrAttribute {
                        model: current.name.clone(),
                        segment: segment.to_string(),
                    });
                }
            }
        }
        Err(AppError::IncompleteChain {
            model: schema.name(model).to_string(),
            path: segments.iter().map(AsRef::<str>::as_ref).collect::<Vec<_>>().join("."),
        })
    }

    pub fn nodes(&self) -> &[ChainNode] {
        &self.nodes
    }

    pub fn node(&self, position: usize) -> &ChainNode {
        &self.nodes[position]
    }

    pub fn parent(&self, position: usize) -> Option<&ChainNode> {
        position.checked_sub(1).map(|p| &self.nodes[p])
    }

    pub fn child(&self, position: usize) -> Option<&ChainNode> {
        self.nodes.get(position + 1)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of association hops, zero when depender and dependee coincide.
    pub fn hops(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn depender(&self) -> ModelId {
        self.nodes[0].model
    }

    pub fn dependee(&self) -> ModelId {
        self.nodes[self.nodes.len() - 1].model
    }

    pub fn dependee_position(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn source_column(&self) -> &str {
        self.nodes[self.nodes.len() - 1].source_column.as_deref().unwrap_or_default()
    }

    /// Positions strictly between the depender and the dependee.
    pub fn intermediary_positions(&self) -> Range<usize> {
        if self.nodes.len() < 3 {
            1..1
        } else {
            1..self.nodes.len() - 1
        }
    }

    /// Column whose change on the record at `position` invalidates the cached value: the
    /// outgoing foreign key, or the source column on the terminal node.
    pub fn trigger_column(&self, position: usize) -> &str {
        let node = &self.nodes[position];
        node.foreign_key.as_deref().or(node.source_column.as_deref()).unwrap_or_default()
    }

    pub fn path(&self) -> String {
        self.nodes
            .iter()
            .filter_map(|n| n.association.as_deref().or(n.source_column.as_deref()))
            .collect::<Vec<_>>()
            .join(".")
    }
}
