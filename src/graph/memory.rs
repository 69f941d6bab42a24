//! In-memory property graph with an optional durable tier.
//!
//! Uses `petgraph` for the topology and hash maps keyed by element id for
//! O(1) lookups. Property definitions live in a `DashMap` since they are read
//! on every import and never removed.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, RwLock};

use dashmap::DashMap;
use petgraph::Direction as PetDirection;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::store::{self, DurableStore, Table, WriteOp};

use super::{
    Authorizations, Direction, Edge, GraphResult, GraphStore, Property, PropertyDefinition, Vertex,
};

/// Edge as persisted: creation sequence plus the element.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EdgeRecord {
    seq: u64,
    edge: Edge,
}

#[derive(Debug, Clone)]
struct StoredEdge {
    index: EdgeIndex,
    seq: u64,
    edge: Edge,
}

#[derive(Debug, Clone, Default)]
struct GraphState {
    /// Node weights are vertex ids, edge weights are edge ids.
    topology: StableDiGraph<String, String>,
    nodes: HashMap<String, NodeIndex>,
    vertices: HashMap<String, Vertex>,
    edges: HashMap<String, StoredEdge>,
    next_seq: u64,
}

/// Ids touched since the last durable write.
#[derive(Debug, Clone, Default)]
struct Dirty {
    vertices: HashSet<String>,
    edges: HashSet<String>,
    definitions: HashSet<String>,
}

impl Dirty {
    fn is_empty(&self) -> bool {
        self.vertices.is_empty() && self.edges.is_empty() && self.definitions.is_empty()
    }

    fn merge(&mut self, other: Dirty) {
        self.vertices.extend(other.vertices);
        self.edges.extend(other.edges);
        self.definitions.extend(other.definitions);
    }
}

/// Everything needed to roll back an aborted batch.
struct BatchSnapshot {
    state: GraphState,
    definitions: Vec<PropertyDefinition>,
    dirty: Dirty,
}

/// Property graph backed by petgraph, optionally persisted to redb.
pub struct MemoryGraph {
    state: RwLock<GraphState>,
    definitions: DashMap<String, PropertyDefinition>,
    dirty: Mutex<Dirty>,
    batch: Mutex<Option<BatchSnapshot>>,
    durable: Option<DurableStore>,
}

impl MemoryGraph {
    /// Create an empty memory-only graph.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(GraphState::default()),
            definitions: DashMap::new(),
            dirty: Mutex::new(Dirty::default()),
            batch: Mutex::new(None),
            durable: None,
        }
    }

    /// Open a persistent graph in `data_dir`, loading every stored element.
    pub fn open(data_dir: &Path) -> GraphResult<Self> {
        let durable = DurableStore::open(data_dir)?;

        let definitions = DashMap::new();
        for (name, bytes) in durable.scan(Table::Definitions)? {
            let def: PropertyDefinition = store::decode("property definition", &bytes)?;
            definitions.insert(name, def);
        }

        let mut state = GraphState::default();
        for (_, bytes) in durable.scan(Table::Vertices)? {
            let vertex: Vertex = store::decode("vertex", &bytes)?;
            let index = state.topology.add_node(vertex.id.clone());
            state.nodes.insert(vertex.id.clone(), index);
            state.vertices.insert(vertex.id.clone(), vertex);
        }

        let mut records = Vec::new();
        for (_, bytes) in durable.scan(Table::Edges)? {
            let record: EdgeRecord = store::decode("edge", &bytes)?;
            records.push(record);
        }
        records.sort_by_key(|r| r.seq);
        for record in records {
            let out_idx = node_of(&state, &record.edge.out_vertex_id)?;
            let in_idx = node_of(&state, &record.edge.in_vertex_id)?;
            let index = state
                .topology
                .add_edge(out_idx, in_idx, record.edge.id.clone());
            state.next_seq = state.next_seq.max(record.seq + 1);
            state.edges.insert(
                record.edge.id.clone(),
                StoredEdge {
                    index,
                    seq: record.seq,
                    edge: record.edge,
                },
            );
        }

        tracing::info!(
            dir = %data_dir.display(),
            vertices = state.vertices.len(),
            edges = state.edges.len(),
            definitions = definitions.len(),
            "opened persistent graph"
        );

        Ok(Self {
            state: RwLock::new(state),
            definitions,
            dirty: Mutex::new(Dirty::default()),
            batch: Mutex::new(None),
            durable: Some(durable),
        })
    }

    /// Whether flushes reach disk.
    pub fn is_durable(&self) -> bool {
        self.durable.is_some()
    }

    pub fn vertex_count(&self) -> usize {
        self.state.read().expect("graph lock poisoned").vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.state.read().expect("graph lock poisoned").edges.len()
    }

    fn mark_vertex(&self, id: &str) {
        self.dirty
            .lock()
            .expect("dirty lock poisoned")
            .vertices
            .insert(id.to_string());
    }

    fn mark_edge(&self, id: &str) {
        self.dirty
            .lock()
            .expect("dirty lock poisoned")
            .edges
            .insert(id.to_string());
    }

    fn batch_open(&self) -> bool {
        self.batch.lock().expect("batch lock poisoned").is_some()
    }

    /// Write every dirty element to the durable tier in one transaction.
    fn persist_dirty(&self) -> GraphResult<()> {
        let taken = std::mem::take(&mut *self.dirty.lock().expect("dirty lock poisoned"));
        let Some(durable) = &self.durable else {
            return Ok(());
        };
        if taken.is_empty() {
            return Ok(());
        }

        let ops = match self.build_ops(&taken) {
            Ok(ops) => ops,
            Err(e) => {
                self.dirty.lock().expect("dirty lock poisoned").merge(taken);
                return Err(e);
            }
        };
        if let Err(e) = durable.apply(&ops) {
            self.dirty.lock().expect("dirty lock poisoned").merge(taken);
            return Err(e.into());
        }
        tracing::debug!(ops = ops.len(), "flushed graph to durable store");
        Ok(())
    }

    fn build_ops(&self, dirty: &Dirty) -> GraphResult<Vec<WriteOp>> {
        let state = self.state.read().expect("graph lock poisoned");
        let mut ops = Vec::with_capacity(
            dirty.vertices.len() + dirty.edges.len() + dirty.definitions.len(),
        );
        for id in &dirty.vertices {
            let value = match state.vertices.get(id) {
                Some(v) => Some(store::encode("vertex", v)?),
                None => None,
            };
            ops.push(WriteOp {
                table: Table::Vertices,
                key: id.clone(),
                value,
            });
        }
        for id in &dirty.edges {
            let value = match state.edges.get(id) {
                Some(stored) => Some(store::encode(
                    "edge",
                    &EdgeRecord {
                        seq: stored.seq,
                        edge: stored.edge.clone(),
                    },
                )?),
                None => None,
            };
            ops.push(WriteOp {
                table: Table::Edges,
                key: id.clone(),
                value,
            });
        }
        for name in &dirty.definitions {
            let value = match self.definitions.get(name) {
                Some(def) => Some(store::encode("property definition", def.value())?),
                None => None,
            };
            ops.push(WriteOp {
                table: Table::Definitions,
                key: name.clone(),
                value,
            });
        }
        Ok(ops)
    }
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryGraph")
            .field("vertices", &self.vertex_count())
            .field("edges", &self.edge_count())
            .field("definitions", &self.definitions.len())
            .field("durable", &self.durable.is_some())
            .finish()
    }
}

fn node_of(state: &GraphState, id: &str) -> GraphResult<NodeIndex> {
    state
        .nodes
        .get(id)
        .copied()
        .ok_or_else(|| GraphError::VertexNotFound { id: id.to_string() })
}

fn visible_vertex_mut<'a>(
    state: &'a mut GraphState,
    id: &str,
    auths: &Authorizations,
) -> GraphResult<&'a mut Vertex> {
    match state.vertices.get_mut(id) {
        Some(v) if auths.can_read(&v.visibility) => Ok(v),
        _ => Err(GraphError::VertexNotFound { id: id.to_string() }),
    }
}

fn upsert_property(properties: &mut Vec<Property>, property: Property) {
    match properties
        .iter_mut()
        .find(|p| p.key == property.key && p.name == property.name)
    {
        Some(existing) => *existing = property,
        None => properties.push(property),
    }
}

impl GraphStore for MemoryGraph {
    fn is_property_defined(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    fn define_property(&self, definition: PropertyDefinition) -> GraphResult<bool> {
        if self.definitions.contains_key(&definition.name) {
            return Ok(false);
        }
        let name = definition.name.clone();
        self.definitions.insert(name.clone(), definition);
        self.dirty
            .lock()
            .expect("dirty lock poisoned")
            .definitions
            .insert(name);
        Ok(true)
    }

    fn property_definition(&self, name: &str) -> Option<PropertyDefinition> {
        self.definitions.get(name).map(|d| d.value().clone())
    }

    fn get_vertex(&self, id: &str, auths: &Authorizations) -> GraphResult<Option<Vertex>> {
        let state = self.state.read().expect("graph lock poisoned");
        Ok(state
            .vertices
            .get(id)
            .filter(|v| auths.can_read(&v.visibility))
            .cloned())
    }

    fn get_or_create_vertex(
        &self,
        id: &str,
        visibility: &str,
        auths: &Authorizations,
    ) -> GraphResult<Vertex> {
        let mut state = self.state.write().expect("graph lock poisoned");
        if let Some(existing) = state.vertices.get(id) {
            if !auths.can_read(&existing.visibility) {
                return Err(GraphError::VertexNotFound { id: id.to_string() });
            }
            return Ok(existing.clone());
        }
        let vertex = Vertex {
            id: id.to_string(),
            visibility: visibility.to_string(),
            properties: Vec::new(),
        };
        let index = state.topology.add_node(id.to_string());
        state.nodes.insert(id.to_string(), index);
        state.vertices.insert(id.to_string(), vertex.clone());
        drop(state);
        self.mark_vertex(id);
        Ok(vertex)
    }

    fn vertices_with_prefix(
        &self,
        prefix: &str,
        auths: &Authorizations,
    ) -> GraphResult<Vec<Vertex>> {
        let state = self.state.read().expect("graph lock poisoned");
        let mut found: Vec<Vertex> = state
            .vertices
            .values()
            .filter(|v| v.id.starts_with(prefix) && auths.can_read(&v.visibility))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    fn set_vertex_property(
        &self,
        vertex_id: &str,
        property: Property,
        auths: &Authorizations,
    ) -> GraphResult<()> {
        let mut state = self.state.write().expect("graph lock poisoned");
        let vertex = visible_vertex_mut(&mut state, vertex_id, auths)?;
        upsert_property(&mut vertex.properties, property);
        drop(state);
        self.mark_vertex(vertex_id);
        Ok(())
    }

    fn soft_delete_vertex_property(
        &self,
        vertex_id: &str,
        name: &str,
        auths: &Authorizations,
    ) -> GraphResult<usize> {
        let mut state = self.state.write().expect("graph lock poisoned");
        let vertex = visible_vertex_mut(&mut state, vertex_id, auths)?;
        let before = vertex.properties.len();
        vertex.properties.retain(|p| p.name != name);
        let removed = before - vertex.properties.len();
        drop(state);
        if removed > 0 {
            self.mark_vertex(vertex_id);
        }
        Ok(removed)
    }

    fn soft_delete_vertex_property_value(
        &self,
        vertex_id: &str,
        key: &str,
        name: &str,
        auths: &Authorizations,
    ) -> GraphResult<bool> {
        let mut state = self.state.write().expect("graph lock poisoned");
        let vertex = visible_vertex_mut(&mut state, vertex_id, auths)?;
        let before = vertex.properties.len();
        vertex
            .properties
            .retain(|p| !(p.key == key && p.name == name));
        let removed = before != vertex.properties.len();
        drop(state);
        if removed {
            self.mark_vertex(vertex_id);
        }
        Ok(removed)
    }

    fn get_edge(&self, id: &str, auths: &Authorizations) -> GraphResult<Option<Edge>> {
        let state = self.state.read().expect("graph lock poisoned");
        Ok(state
            .edges
            .get(id)
            .filter(|s| auths.can_read(&s.edge.visibility))
            .map(|s| s.edge.clone()))
    }

    fn get_or_create_edge(
        &self,
        id: &str,
        out_vertex_id: &str,
        in_vertex_id: &str,
        label: &str,
        visibility: &str,
        auths: &Authorizations,
    ) -> GraphResult<Edge> {
        let mut state = self.state.write().expect("graph lock poisoned");
        if let Some(existing) = state.edges.get(id) {
            let edge = &existing.edge;
            if edge.out_vertex_id != out_vertex_id || edge.in_vertex_id != in_vertex_id {
                return Err(GraphError::EdgeConflict {
                    id: id.to_string(),
                    existing_out: edge.out_vertex_id.clone(),
                    existing_in: edge.in_vertex_id.clone(),
                });
            }
            return Ok(edge.clone());
        }

        for endpoint in [out_vertex_id, in_vertex_id] {
            visible_vertex_mut(&mut state, endpoint, auths)?;
        }
        let out_idx = node_of(&state, out_vertex_id)?;
        let in_idx = node_of(&state, in_vertex_id)?;

        let edge = Edge {
            id: id.to_string(),
            label: label.to_string(),
            out_vertex_id: out_vertex_id.to_string(),
            in_vertex_id: in_vertex_id.to_string(),
            visibility: visibility.to_string(),
            properties: Vec::new(),
        };
        let index = state.topology.add_edge(out_idx, in_idx, id.to_string());
        let seq = state.next_seq;
        state.next_seq += 1;
        state.edges.insert(
            id.to_string(),
            StoredEdge {
                index,
                seq,
                edge: edge.clone(),
            },
        );
        drop(state);
        self.mark_edge(id);
        Ok(edge)
    }

    fn set_edge_property(
        &self,
        edge_id: &str,
        property: Property,
        auths: &Authorizations,
    ) -> GraphResult<()> {
        let mut state = self.state.write().expect("graph lock poisoned");
        match state.edges.get_mut(edge_id) {
            Some(stored) if auths.can_read(&stored.edge.visibility) => {
                upsert_property(&mut stored.edge.properties, property);
            }
            _ => {
                return Err(GraphError::EdgeNotFound {
                    id: edge_id.to_string(),
                });
            }
        }
        drop(state);
        self.mark_edge(edge_id);
        Ok(())
    }

    fn delete_edge(&self, id: &str, auths: &Authorizations) -> GraphResult<bool> {
        let mut state = self.state.write().expect("graph lock poisoned");
        let index = match state.edges.get(id) {
            Some(stored) if auths.can_read(&stored.edge.visibility) => stored.index,
            _ => return Ok(false),
        };
        state.topology.remove_edge(index);
        state.edges.remove(id);
        drop(state);
        self.mark_edge(id);
        Ok(true)
    }

    fn edges(
        &self,
        vertex_id: &str,
        direction: Direction,
        label: Option<&str>,
        auths: &Authorizations,
    ) -> GraphResult<Vec<Edge>> {
        let state = self.state.read().expect("graph lock poisoned");
        let Some(&node) = state.nodes.get(vertex_id) else {
            return Ok(Vec::new());
        };

        let directions: &[PetDirection] = match direction {
            Direction::Out => &[PetDirection::Outgoing],
            Direction::In => &[PetDirection::Incoming],
            Direction::Both => &[PetDirection::Outgoing, PetDirection::Incoming],
        };

        let mut seen = HashSet::new();
        let mut found: Vec<&StoredEdge> = Vec::new();
        for dir in directions {
            for edge_ref in state.topology.edges_directed(node, *dir) {
                let Some(stored) = state.edges.get(edge_ref.weight()) else {
                    continue;
                };
                if label.is_some_and(|l| stored.edge.label != l)
                    || !auths.can_read(&stored.edge.visibility)
                {
                    continue;
                }
                if seen.insert(stored.edge.id.as_str()) {
                    found.push(stored);
                }
            }
        }
        found.sort_by_key(|s| s.seq);
        Ok(found.into_iter().map(|s| s.edge.clone()).collect())
    }

    fn flush(&self) -> GraphResult<()> {
        if self.batch_open() {
            tracing::trace!("flush inside batch deferred to commit");
            return Ok(());
        }
        self.persist_dirty()
    }

    fn begin_batch(&self) -> GraphResult<()> {
        let mut batch = self.batch.lock().expect("batch lock poisoned");
        if batch.is_some() {
            return Err(GraphError::Batch {
                message: "a batch is already open".into(),
            });
        }
        let state = self.state.read().expect("graph lock poisoned").clone();
        let definitions = self.definitions.iter().map(|d| d.value().clone()).collect();
        let dirty = self.dirty.lock().expect("dirty lock poisoned").clone();
        *batch = Some(BatchSnapshot {
            state,
            definitions,
            dirty,
        });
        Ok(())
    }

    fn commit_batch(&self) -> GraphResult<()> {
        let snapshot = self.batch.lock().expect("batch lock poisoned").take();
        if snapshot.is_none() {
            return Err(GraphError::Batch {
                message: "commit without an open batch".into(),
            });
        }
        self.persist_dirty()
    }

    fn abort_batch(&self) -> GraphResult<()> {
        let Some(snapshot) = self.batch.lock().expect("batch lock poisoned").take() else {
            return Err(GraphError::Batch {
                message: "abort without an open batch".into(),
            });
        };
        *self.state.write().expect("graph lock poisoned") = snapshot.state;
        self.definitions.clear();
        for def in snapshot.definitions {
            self.definitions.insert(def.name.clone(), def);
        }
        *self.dirty.lock().expect("dirty lock poisoned") = snapshot.dirty;
        tracing::debug!("graph batch rolled back");
        Ok(())
    }
}
