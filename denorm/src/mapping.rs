use crate::AppError;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;

/// Nested declaration where every root-to-leaf path names a chain and the leaf names the
/// target column, e.g. `branch -> company -> country -> name = branch_company_country_name`.
///
/// Keys keep their insertion order, later leaves overwrite earlier ones for the same key.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MappingTree {
    entries: Vec<(String, MappingNode)>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MappingNode {
    Target(String),
    Nested(MappingTree),
}

/// One flattened declaration: the path of segments and the target column it feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatMapping {
    pub path: Vec<String>,
    pub target: String,
}

impl MappingTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, node: MappingNode) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = node,
            None => self.entries.push((key.to_string(), node)),
        }
    }

    pub fn leaf(mut self, key: &str, target: &str) -> Self {
        self.insert(key, MappingNode::Target(target.to_string()));
        self
    }

    pub fn nested(mut self, key: &str, tree: MappingTree) -> Self {
        self.insert(key, MappingNode::Nested(tree));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(String, MappingNode)] {
        &self.entries
    }

    /// Depth-first, in insertion order.
    pub fn flatten(&self) -> Vec<FlatMapping> {
        let mut out = Vec::new();
        self.flatten_into(&mut Vec::new(), &mut out);
        out
    }

    fn flatten_into(&self, prefix: &mut Vec<String>, out: &mut Vec<FlatMapping>) {
        for (key, node) in &self.entries {
            prefix.push(key.clone());
            match node {
                MappingNode::Target(target) => out.push(FlatMapping { path: prefix.clone(), target: target.clone() }),
                MappingNode::Nested(tree) => tree.flatten_into(prefix, out),
            }
            prefix.pop();
        }
    }

    pub fn from_json(json: &str) -> Result<Self, AppError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl FlatMapping {
    pub fn new<S: AsRef<str>>(path: &[S], target: &str) -> Self {
        Self { path: path.iter().map(|s| s.as_ref().to_string()).collect(), target: target.to_string() }
    }

    pub fn parse_all<I, S>(expressions: I) -> Result<Vec<FlatMapping>, AppError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        expressions.into_iter().map(|e| e.as_ref().parse()).collect()
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}

/// Parses `branch.company.country.name == branch_company_country_name`.
impl FromStr for FlatMapping {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AppError::InvalidExpression(s.to_string());
        let (path, target) = s.split_once("==").ok_or_else(invalid)?;
        let target = target.trim().trim_start_matches(':');
        let path: Vec<String> = path.trim().split('.').map(|seg| seg.trim().to_string()).collect();
        if !is_identifier(target) || !path.iter().all(|seg| is_identifier(seg)) {
            return Err(invalid());
        }
        Ok(FlatMapping { path, target: target.to_string() })
    }
}

impl fmt::Display for FlatMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} == {}", self.path.join("."), self.target)
    }
}

impl<'de> Deserialize<'de> for MappingTree {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TreeVisitor;

        impl<'de> Visitor<'de> for TreeVisitor {
            type Value = MappingTree;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of association names to nested maps or target column names")
            }

            fn visit_map<A>(self, mut map: A) -> Result<MappingTree, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut tree = MappingTree::new();
                while let Some((key, node)) = map.next_entry::<String, MappingNode>()? {
                    tree.insert(&key, node);
                }
                Ok(tree)
            }
        }

        deserializer.deserialize_map(TreeVisitor)
    }
}

#[cfg(test)]
mod mapping_tests {
    use super::*;

    #[test]
    fn flatten_keeps_insertion_order() {
        let tree = crate::mapping! {
            branch: {
                company: {
                    country: { name: branch_company_country_name, id: branch_company_country_id },
                    name: branch_company_name
                }
            }
        };
        let flat = tree.flatten();
        assert_eq!(flat, vec![
            FlatMapping::new(&["branch", "company", "country", "name"], "branch_company_country_name"),
            FlatMapping::new(&["branch", "company", "country", "id"], "branch_company_country_id"),
            FlatMapping::new(&["branch", "company", "name"], "branch_company_name"),
        ]);
    }

    #[test]
    fn builder_and_macro_agree() {
        let built = MappingTree::new().nested("branch", MappingTree::new().leaf("name", "branch_name"));
        let declared = crate::mapping! { branch: { name: branch_name } };
        assert_eq!(built, declared);
    }

    #[test]
    fn json_preserves_document_order() {
        let tree = MappingTree::from_json(r#"{"branch": {"name": "b", "company": {"name": "a"}}}"#).expect("json");
        let targets: Vec<String> = tree.flatten().into_iter().map(|m| m.target).collect();
        assert_eq!(targets, vec!["b", "a"]);
    }

    #[test]
    fn json_rejects_non_string_leaf() {
        assert!(MappingTree::from_json(r#"{"branch": {"name": 3}}"#).is_err());
    }

    #[test]
    fn parses_path_expressions() {
        let m: FlatMapping = "branch.company.country.name == :branch_company_country_name".parse().expect("parse");
        assert_eq!(m.path, vec!["branch", "company", "country", "name"]);
        assert_eq!(m.target, "branch_company_country_name");
        assert_eq!(m.to_string(), "branch.company.country.name == branch_company_country_name");
    }

    #[test]
    fn rejects_malformed_expressions() {
        for bad in ["branch.name", "branch..name == x", " == x", "branch.name == ", "branch.name == a b"] {
            assert!(matches!(bad.parse::<FlatMapping>(), Err(AppError::InvalidExpression(_))), "{} should not parse", bad);
        }
    }

    #[test]
    fn redeclared_key_replaces_in_place() {
        let mut tree = MappingTree::new().leaf("name", "first").leaf("id", "second");
        tree.insert("name", MappingNode::Target("third".into()));
        let targets: Vec<String> = tree.flatten().into_iter().map(|m| m.target).collect();
        assert_eq!(targets, vec!["third", "second"]);
    }
}
