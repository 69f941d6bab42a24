//! Single-parent is-a trees for concepts and relationships.
//!
//! Every node has at most one outgoing `isA` edge. Finding more than one is
//! a data-integrity violation and fails with `AmbiguousParent`. Walks carry
//! a visited set and a depth limit so a cyclic import fails instead of
//! looping.

use std::collections::{HashSet, VecDeque};

use crate::error::OntologyError;
use crate::graph::{Authorizations, Direction, Edge, GraphStore};

use super::codec::{self, label};

/// Default depth limit for hierarchy walks.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Navigates is-a edges by vertex id.
pub struct HierarchyNavigator<'a> {
    graph: &'a dyn GraphStore,
    auths: &'a Authorizations,
    max_depth: usize,
}

impl<'a> HierarchyNavigator<'a> {
    pub fn new(graph: &'a dyn GraphStore, auths: &'a Authorizations, max_depth: usize) -> Self {
        Self {
            graph,
            auths,
            max_depth,
        }
    }

    /// Parent vertex id, or `None` for a forest root.
    pub fn parent_of(&self, vertex_id: &str) -> Result<Option<String>, OntologyError> {
        let mut parents =
            self.graph
                .vertex_ids(vertex_id, Direction::Out, label::IS_A, self.auths)?;
        match parents.len() {
            0 => Ok(None),
            1 => Ok(parents.pop()),
            count => Err(OntologyError::AmbiguousParent {
                iri: codec::display_iri(vertex_id).to_string(),
                count,
            }),
        }
    }

    /// Direct children in edge creation order.
    pub fn children_of(&self, vertex_id: &str) -> Result<Vec<String>, OntologyError> {
        Ok(self
            .graph
            .vertex_ids(vertex_id, Direction::In, label::IS_A, self.auths)?)
    }

    /// Ancestors from the nearest parent up to the forest root.
    pub fn ancestors(&self, vertex_id: &str) -> Result<Vec<String>, OntologyError> {
        let mut visited = HashSet::from([vertex_id.to_string()]);
        let mut chain = Vec::new();
        let mut current = vertex_id.to_string();
        while let Some(parent) = self.parent_of(&current)? {
            if !visited.insert(parent.clone()) || chain.len() >= self.max_depth {
                return Err(self.too_deep(vertex_id));
            }
            chain.push(parent.clone());
            current = parent;
        }
        Ok(chain)
    }

    /// Every node below `vertex_id`, breadth first. Does not include the start.
    pub fn descendants(&self, vertex_id: &str) -> Result<Vec<String>, OntologyError> {
        let mut visited = HashSet::from([vertex_id.to_string()]);
        let mut queue = VecDeque::from([(vertex_id.to_string(), 0usize)]);
        let mut found = Vec::new();
        while let Some((node, depth)) = queue.pop_front() {
            for child in self.children_of(&node)? {
                if !visited.insert(child.clone()) || depth + 1 > self.max_depth {
                    return Err(self.too_deep(vertex_id));
                }
                found.push(child.clone());
                queue.push_back((child, depth + 1));
            }
        }
        Ok(found)
    }

    /// Find or add the is-a edge from `child` to `parent`.
    pub fn link(&self, child: &str, parent: &str, visibility: &str) -> Result<Edge, OntologyError> {
        Ok(self.graph.get_or_create_edge(
            &codec::edge_id(child, parent),
            child,
            parent,
            label::IS_A,
            visibility,
            self.auths,
        )?)
    }

    fn too_deep(&self, vertex_id: &str) -> OntologyError {
        OntologyError::HierarchyTooDeep {
            iri: codec::display_iri(vertex_id).to_string(),
            max_depth: self.max_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryGraph;

    fn tree(ids: &[&str], edges: &[(&str, &str)]) -> MemoryGraph {
        let g = MemoryGraph::new();
        let auths = Authorizations::public();
        for id in ids {
            g.get_or_create_vertex(id, "", &auths).unwrap();
        }
        for (child, parent) in edges {
            g.get_or_create_edge(
                &codec::edge_id(child, parent),
                child,
                parent,
                label::IS_A,
                "",
                &auths,
            )
            .unwrap();
        }
        g
    }

    #[test]
    fn parent_and_children() {
        let g = tree(&["root", "a", "b"], &[("a", "root"), ("b", "root")]);
        let auths = Authorizations::public();
        let nav = HierarchyNavigator::new(&g, &auths, DEFAULT_MAX_DEPTH);
        assert_eq!(nav.parent_of("a").unwrap().as_deref(), Some("root"));
        assert_eq!(nav.parent_of("root").unwrap(), None);
        assert_eq!(nav.children_of("root").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn second_parent_is_fatal() {
        let g = tree(
            &["ontology_concept_x", "p1", "p2"],
            &[("ontology_concept_x", "p1"), ("ontology_concept_x", "p2")],
        );
        let auths = Authorizations::public();
        let nav = HierarchyNavigator::new(&g, &auths, DEFAULT_MAX_DEPTH);
        let err = nav.parent_of("ontology_concept_x").unwrap_err();
        match err {
            OntologyError::AmbiguousParent { iri, count } => {
                assert_eq!(iri, "x");
                assert_eq!(count, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn ancestors_and_descendants() {
        let g = tree(
            &["root", "a", "b", "c"],
            &[("a", "root"), ("b", "a"), ("c", "a")],
        );
        let auths = Authorizations::public();
        let nav = HierarchyNavigator::new(&g, &auths, DEFAULT_MAX_DEPTH);
        assert_eq!(nav.ancestors("b").unwrap(), vec!["a", "root"]);
        assert_eq!(nav.descendants("root").unwrap(), vec!["a", "b", "c"]);
        assert!(nav.descendants("c").unwrap().is_empty());
    }

    #[test]
    fn cycle_fails_fast() {
        let g = tree(&["a", "b"], &[("a", "b"), ("b", "a")]);
        let auths = Authorizations::public();
        let nav = HierarchyNavigator::new(&g, &auths, DEFAULT_MAX_DEPTH);
        assert!(matches!(
            nav.ancestors("a"),
            Err(OntologyError::HierarchyTooDeep { .. })
        ));
        assert!(matches!(
            nav.descendants("a"),
            Err(OntologyError::HierarchyTooDeep { .. })
        ));
    }

    #[test]
    fn depth_limit_applies() {
        let g = tree(&["a", "b", "c"], &[("c", "b"), ("b", "a")]);
        let auths = Authorizations::public();
        let nav = HierarchyNavigator::new(&g, &auths, 1);
        assert!(nav.ancestors("b").is_ok());
        assert!(matches!(
            nav.ancestors("c"),
            Err(OntologyError::HierarchyTooDeep { max_depth: 1, .. })
        ));
    }
}
