use std::collections::HashMap;

use crate::task::{Unit, noop};

/// Name of the synthetic node a run is rooted at.
pub const ROOT: &str = "";

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub unit: Unit,
    pub deps: Vec<String>,
}

impl Node {
    pub fn new(name: impl Into<String>, unit: Unit, deps: Vec<String>) -> Self {
        Self {
            name: name.into(),
            unit,
            deps,
        }
    }

    /// The synthetic root depending on every requested target.
    pub fn root(targets: &[&str]) -> Self {
        let deps = targets.iter().map(|t| t.to_string()).collect();
        Self::new(ROOT, Unit::Plain(std::sync::Arc::new(noop())), deps)
    }

    pub fn is_root(&self) -> bool {
        self.name == ROOT
    }
}

/// Tasks by name. Edges may point at names that are not registered yet;
/// they are only checked when a run is resolved.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: HashMap<String, Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `node`, replacing any node with the same name.
    pub fn insert(&mut self, node: Node) {
        self.nodes.insert(node.name.clone(), node);
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Registered task names in sorted order, without the synthetic root.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .nodes
            .keys()
            .filter(|name| name.as_str() != ROOT)
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
