//! Property graph substrate the ontology is stored in.
//!
//! The ontology layer only talks to the [`GraphStore`] trait: vertices and
//! edges addressed by string ids, multi-valued properties with metadata, a
//! prefix-scoped vertex scan, and `flush` as the commit boundary. Every call
//! carries an [`Authorizations`] token.
//!
//! [`MemoryGraph`] is the shipped adapter: `petgraph` topology with an
//! optional redb-backed durable tier.

pub mod memory;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

pub use memory::MemoryGraph;

/// Result type for graph operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Which edges of a vertex to walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Edges whose out-vertex is the given vertex.
    Out,
    /// Edges whose in-vertex is the given vertex.
    In,
    /// Both of the above.
    Both,
}

/// Read/write capability passed through every graph call.
///
/// An element is visible when its visibility string is empty or is one of
/// the token's visibilities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Authorizations {
    visibilities: BTreeSet<String>,
}

impl Authorizations {
    pub fn new<I, S>(visibilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            visibilities: visibilities.into_iter().map(Into::into).collect(),
        }
    }

    /// A token that can only see public (empty-visibility) elements.
    pub fn public() -> Self {
        Self::default()
    }

    pub fn can_read(&self, visibility: &str) -> bool {
        visibility.is_empty() || self.visibilities.contains(visibility)
    }
}

/// Scalar value stored in a graph property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    String(String),
    Boolean(bool),
    Integer(i64),
    Double(f64),
    /// Milliseconds since the UNIX epoch, UTC.
    Date(i64),
    GeoPoint { latitude: f64, longitude: f64 },
    Binary(Vec<u8>),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Double(d) => Some(*d),
            PropertyValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PropertyValue::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// The schema kind this value belongs to.
    pub fn kind(&self) -> ValueKind {
        match self {
            PropertyValue::String(_) => ValueKind::String,
            PropertyValue::Boolean(_) => ValueKind::Boolean,
            PropertyValue::Integer(_) => ValueKind::Integer,
            PropertyValue::Double(_) => ValueKind::Double,
            PropertyValue::Date(_) => ValueKind::Date,
            PropertyValue::GeoPoint { .. } => ValueKind::GeoPoint,
            PropertyValue::Binary(_) => ValueKind::Binary,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Boolean(b)
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Integer(i)
    }
}

impl From<f64> for PropertyValue {
    fn from(d: f64) -> Self {
        PropertyValue::Double(d)
    }
}

impl From<Vec<u8>> for PropertyValue {
    fn from(b: Vec<u8>) -> Self {
        PropertyValue::Binary(b)
    }
}

/// Basic scalar kinds a property name can be registered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    String,
    Boolean,
    Integer,
    Double,
    Date,
    GeoPoint,
    Binary,
}

/// How a property's values should be indexed for text search.
///
/// An empty hint set means indexing is disabled (`NONE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TextIndexHint {
    FullText,
    ExactMatch,
}

impl TextIndexHint {
    /// Both hints: the `ALL` shorthand.
    pub fn all() -> BTreeSet<TextIndexHint> {
        [TextIndexHint::FullText, TextIndexHint::ExactMatch]
            .into_iter()
            .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TextIndexHint::FullText => "FULL_TEXT",
            TextIndexHint::ExactMatch => "EXACT_MATCH",
        }
    }

    pub fn parse(s: &str) -> Option<TextIndexHint> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FULL_TEXT" => Some(TextIndexHint::FullText),
            "EXACT_MATCH" => Some(TextIndexHint::ExactMatch),
            _ => None,
        }
    }
}

impl fmt::Display for TextIndexHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registration of a property name in the graph's schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub name: String,
    pub kind: ValueKind,
    pub text_index_hints: BTreeSet<TextIndexHint>,
    pub boost: Option<f64>,
    pub sortable: bool,
}

impl PropertyDefinition {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            text_index_hints: BTreeSet::new(),
            boost: None,
            sortable: false,
        }
    }

    pub fn with_hints(mut self, hints: BTreeSet<TextIndexHint>) -> Self {
        self.text_index_hints = hints;
        self
    }
}

/// Metadata attached to a single property value.
pub type Metadata = BTreeMap<String, PropertyValue>;

/// One value of a (possibly multi-valued) property.
///
/// `(key, name)` identifies the value on its element; setting a property
/// with an existing pair replaces the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub name: String,
    pub value: PropertyValue,
    pub metadata: Metadata,
}

/// Key used by single-valued properties.
pub const DEFAULT_KEY: &str = "";

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self {
            key: DEFAULT_KEY.to_string(),
            name: name.into(),
            value: value.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_metadata(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }
}

/// Lookup helpers shared by vertices and edges.
pub trait HasProperties {
    fn properties(&self) -> &[Property];

    fn property(&self, name: &str) -> Option<&Property> {
        self.properties().iter().find(|p| p.name == name)
    }

    fn property_value(&self, name: &str) -> Option<&PropertyValue> {
        self.property(name).map(|p| &p.value)
    }

    fn property_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Property> + 'a {
        self.properties().iter().filter(move |p| p.name == name)
    }

    fn string_value(&self, name: &str) -> Option<&str> {
        self.property_value(name).and_then(PropertyValue::as_str)
    }

    fn bool_value(&self, name: &str) -> Option<bool> {
        self.property_value(name).and_then(PropertyValue::as_bool)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: String,
    pub visibility: String,
    pub properties: Vec<Property>,
}

impl HasProperties for Vertex {
    fn properties(&self) -> &[Property] {
        &self.properties
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub label: String,
    pub out_vertex_id: String,
    pub in_vertex_id: String,
    pub visibility: String,
    pub properties: Vec<Property>,
}

impl Edge {
    /// The endpoint on the far side from `vertex_id`.
    pub fn other_vertex_id(&self, vertex_id: &str) -> &str {
        if self.out_vertex_id == vertex_id {
            &self.in_vertex_id
        } else {
            &self.out_vertex_id
        }
    }
}

impl HasProperties for Edge {
    fn properties(&self) -> &[Property] {
        &self.properties
    }
}

/// Storage-agnostic graph contract consumed by the ontology layer.
///
/// Mutations become durable at the next `flush`. Between `begin_batch` and
/// `commit_batch` nothing is durable, and `abort_batch` rolls the graph back
/// to the state at `begin_batch`.
pub trait GraphStore: Send + Sync {
    fn is_property_defined(&self, name: &str) -> bool;

    /// Register a property name. Re-registering an existing name is a no-op.
    fn define_property(&self, definition: PropertyDefinition) -> GraphResult<bool>;

    fn property_definition(&self, name: &str) -> Option<PropertyDefinition>;

    fn get_vertex(&self, id: &str, auths: &Authorizations) -> GraphResult<Option<Vertex>>;

    /// Get the vertex with `id`, creating it with no properties if absent.
    fn get_or_create_vertex(
        &self,
        id: &str,
        visibility: &str,
        auths: &Authorizations,
    ) -> GraphResult<Vertex>;

    /// All visible vertices whose id starts with `prefix`, ordered by id.
    fn vertices_with_prefix(&self, prefix: &str, auths: &Authorizations)
    -> GraphResult<Vec<Vertex>>;

    fn set_vertex_property(
        &self,
        vertex_id: &str,
        property: Property,
        auths: &Authorizations,
    ) -> GraphResult<()>;

    /// Remove every value of `name` on the vertex. Returns how many were removed.
    fn soft_delete_vertex_property(
        &self,
        vertex_id: &str,
        name: &str,
        auths: &Authorizations,
    ) -> GraphResult<usize>;

    /// Remove the single `(key, name)` value on the vertex.
    fn soft_delete_vertex_property_value(
        &self,
        vertex_id: &str,
        key: &str,
        name: &str,
        auths: &Authorizations,
    ) -> GraphResult<bool>;

    fn get_edge(&self, id: &str, auths: &Authorizations) -> GraphResult<Option<Edge>>;

    /// Get the edge with `id`, creating it between the two vertices if absent.
    fn get_or_create_edge(
        &self,
        id: &str,
        out_vertex_id: &str,
        in_vertex_id: &str,
        label: &str,
        visibility: &str,
        auths: &Authorizations,
    ) -> GraphResult<Edge>;

    fn set_edge_property(
        &self,
        edge_id: &str,
        property: Property,
        auths: &Authorizations,
    ) -> GraphResult<()>;

    /// Delete an edge. Returns whether it existed.
    fn delete_edge(&self, id: &str, auths: &Authorizations) -> GraphResult<bool>;

    /// Visible edges touching `vertex_id`, optionally filtered by label,
    /// in creation order.
    fn edges(
        &self,
        vertex_id: &str,
        direction: Direction,
        label: Option<&str>,
        auths: &Authorizations,
    ) -> GraphResult<Vec<Edge>>;

    /// Commit boundary.
    fn flush(&self) -> GraphResult<()>;

    fn begin_batch(&self) -> GraphResult<()>;

    fn commit_batch(&self) -> GraphResult<()>;

    fn abort_batch(&self) -> GraphResult<()>;

    /// Ids of the vertices on the far side of the matching edges, in edge creation order.
    fn vertex_ids(
        &self,
        vertex_id: &str,
        direction: Direction,
        label: &str,
        auths: &Authorizations,
    ) -> GraphResult<Vec<String>> {
        Ok(self
            .edges(vertex_id, direction, Some(label), auths)?
            .iter()
            .map(|e| e.other_vertex_id(vertex_id).to_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_token_reads_only_public() {
        let public = Authorizations::public();
        assert!(public.can_read(""));
        assert!(!public.can_read("secret"));

        let auths = Authorizations::new(["secret"]);
        assert!(auths.can_read("secret"));
        assert!(!auths.can_read("other"));
    }

    #[test]
    fn property_lookup_helpers() {
        let v = Vertex {
            id: "v".into(),
            visibility: String::new(),
            properties: vec![
                Property::new("intent", "person").with_key("person"),
                Property::new("intent", "actor").with_key("actor"),
                Property::new("searchable", true),
            ],
        };
        assert_eq!(v.property_values("intent").count(), 2);
        assert_eq!(v.bool_value("searchable"), Some(true));
        assert_eq!(v.string_value("searchable"), None);
        assert!(v.property("missing").is_none());
    }

    #[test]
    fn text_index_hint_parse() {
        assert_eq!(TextIndexHint::parse(" exact_match"), Some(TextIndexHint::ExactMatch));
        assert_eq!(TextIndexHint::parse("FULL_TEXT"), Some(TextIndexHint::FullText));
        assert_eq!(TextIndexHint::parse("bogus"), None);
        assert_eq!(TextIndexHint::all().len(), 2);
    }

    #[test]
    fn other_vertex_id_picks_far_side() {
        let e = Edge {
            id: "a-b".into(),
            label: "l".into(),
            out_vertex_id: "a".into(),
            in_vertex_id: "b".into(),
            visibility: String::new(),
            properties: vec![],
        };
        assert_eq!(e.other_vertex_id("a"), "b");
        assert_eq!(e.other_vertex_id("b"), "a");
    }
}
