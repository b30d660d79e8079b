//! Dependency graph over entities
//!
//! Tracks which entities must exist before which others. Ordering is
//! deterministic: among entities that are ready at the same time, the one
//! declared first comes first.

use crate::error::{Result, SyncError};
use std::collections::{HashMap, VecDeque};

pub struct DependencyGraph {
    /// Declaration order
    nodes: Vec<String>,
    /// Map from node to its dependencies (nodes that must come first)
    dependencies: HashMap<String, Vec<String>>,
    /// Map from node to nodes that depend on it
    dependents: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            dependencies: HashMap::new(),
            dependents: HashMap::new(),
        }
    }

    /// Add a node with its dependencies
    pub fn add_node(&mut self, node: String, deps: Vec<String>) {
        if !self.dependencies.contains_key(&node) {
            self.nodes.push(node.clone());
        }
        for dep in &deps {
            self.dependents
                .entry(dep.clone())
                .or_default()
                .push(node.clone());
        }
        self.dependents.entry(node.clone()).or_default();
        self.dependencies.insert(node, deps);
    }

    fn dependencies(&self, node: &str) -> Vec<String> {
        self.dependencies.get(node).cloned().unwrap_or_default()
    }

    /// Kahn's algorithm; dependencies come before dependents.
    pub fn topological_sort(&self) -> Result<Vec<String>> {
        let position: HashMap<&str, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();

        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        for node in &self.nodes {
            let known = self
                .dependencies(node)
                .iter()
                .filter(|d| position.contains_key(d.as_str()))
                .count();
            in_degree.insert(node.as_str(), known);
        }

        let mut queue: VecDeque<&str> = self
            .nodes
            .iter()
            .map(String::as_str)
            .filter(|n| in_degree[n] == 0)
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());
        while let Some(node) = queue.pop_front() {
            result.push(node.to_string());

            let mut released = Vec::new();
            if let Some(deps) = self.dependents.get(node) {
                for dependent in deps {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            released.push(dependent.as_str());
                        }
                    }
                }
            }
            released.sort_by_key(|n| position[n]);
            queue.extend(released);
        }

        if result.len() != self.nodes.len() {
            let stuck: Vec<&str> = self
                .nodes
                .iter()
                .map(String::as_str)
                .filter(|n| !result.iter().any(|r| r == n))
                .collect();
            return Err(SyncError::Schema(format!(
                "Dependency graph contains cycles among: {}",
                stuck.join(", ")
            )));
        }

        Ok(result)
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_graph_topological_sort() {
        let mut graph = DependencyGraph::new();

        // A -> B -> C
        graph.add_node("C".to_string(), vec!["B".to_string()]);
        graph.add_node("B".to_string(), vec!["A".to_string()]);
        graph.add_node("A".to_string(), vec![]);

        let order = graph.topological_sort().unwrap();
        assert_eq!(order, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_star_ties_follow_declaration_order() {
        let mut graph = DependencyGraph::new();
        graph.add_node("dim_date".to_string(), vec![]);
        graph.add_node("dim_segment".to_string(), vec![]);
        graph.add_node("dim_product".to_string(), vec![]);
        graph.add_node(
            "fact".to_string(),
            vec![
                "dim_product".to_string(),
                "dim_segment".to_string(),
                "dim_date".to_string(),
            ],
        );

        let order = graph.topological_sort().unwrap();
        assert_eq!(order, vec!["dim_date", "dim_segment", "dim_product", "fact"]);
        assert_eq!(graph.dependents["dim_date"], vec!["fact".to_string()]);
    }

    #[test]
    fn test_cycle_is_schema_error() {
        let mut graph = DependencyGraph::new();
        graph.add_node("A".to_string(), vec!["B".to_string()]);
        graph.add_node("B".to_string(), vec!["A".to_string()]);

        let err = graph.topological_sort().unwrap_err();
        assert!(matches!(err, SyncError::Schema(_)));
    }
}
