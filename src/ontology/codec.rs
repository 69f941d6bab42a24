//! Deterministic mapping between ontology IRIs and graph element ids, plus
//! the attribute schema every ontology vertex uses.
//!
//! Vertex ids are `prefix + iri`, one disjoint prefix per element kind, so
//! creating an element twice always lands on the same vertex. Structural
//! edges between two elements use `"{out}-{in}"` as their id.

use std::collections::BTreeSet;

use crate::graph::{
    Authorizations, GraphResult, GraphStore, PropertyDefinition, TextIndexHint, ValueKind,
};

pub const ID_PREFIX: &str = "ontology_";
pub const CONCEPT_PREFIX: &str = "ontology_concept_";
pub const RELATIONSHIP_PREFIX: &str = "ontology_rel_";
pub const PROPERTY_PREFIX: &str = "ontology_prop_";

/// Edge labels used for structure.
pub mod label {
    pub const IS_A: &str = "http://visallo.org#isA";
    pub const HAS_EDGE: &str = "http://visallo.org#hasEdge";
    pub const HAS_PROPERTY: &str = "http://visallo.org#hasProperty";
    pub const INVERSE_OF: &str = "http://visallo.org#inverseOf";
    pub const DEPENDENT_PROPERTY: &str = "http://visallo.org#dependentPropertyIri";
}

/// Attribute (vertex property) names.
pub mod attr {
    pub const CONCEPT_TYPE: &str = "http://visallo.org#conceptType";
    pub const ONTOLOGY_TITLE: &str = "http://visallo.org#ontologyTitle";
    pub const DISPLAY_NAME: &str = "http://visallo.org#displayName";
    pub const DISPLAY_TYPE: &str = "http://visallo.org#displayType";
    pub const DATA_TYPE: &str = "http://visallo.org#dataType";
    pub const TITLE_FORMULA: &str = "http://visallo.org#titleFormula";
    pub const SUBTITLE_FORMULA: &str = "http://visallo.org#subtitleFormula";
    pub const TIME_FORMULA: &str = "http://visallo.org#timeFormula";
    pub const VALIDATION_FORMULA: &str = "http://visallo.org#validationFormula";
    pub const DISPLAY_FORMULA: &str = "http://visallo.org#displayFormula";
    pub const PROPERTY_GROUP: &str = "http://visallo.org#propertyGroup";
    pub const COLOR: &str = "http://visallo.org#color";
    pub const GLYPH_ICON: &str = "http://visallo.org#glyphIcon";
    pub const GLYPH_ICON_FILE_NAME: &str = "http://visallo.org#glyphIconFileName";
    pub const GLYPH_ICON_SELECTED: &str = "http://visallo.org#glyphIconSelected";
    pub const GLYPH_ICON_SELECTED_FILE_NAME: &str = "http://visallo.org#glyphIconSelectedFileName";
    pub const MAP_GLYPH_ICON: &str = "http://visallo.org#mapGlyphIcon";
    pub const MAP_GLYPH_ICON_FILE_NAME: &str = "http://visallo.org#mapGlyphIconFileName";
    pub const ADD_RELATED_CONCEPT_WHITE_LIST: &str = "http://visallo.org#addRelatedConceptWhiteList";
    pub const USER_VISIBLE: &str = "http://visallo.org#userVisible";
    pub const SEARCHABLE: &str = "http://visallo.org#searchable";
    pub const SORTABLE: &str = "http://visallo.org#sortable";
    pub const ADDABLE: &str = "http://visallo.org#addable";
    pub const DELETEABLE: &str = "http://visallo.org#deleteable";
    pub const UPDATEABLE: &str = "http://visallo.org#updateable";
    pub const INTENT: &str = "http://visallo.org#intent";
    pub const TEXT_INDEX_HINTS: &str = "http://visallo.org#textIndexHints";
    pub const POSSIBLE_VALUES: &str = "http://visallo.org#possibleValues";
    pub const BOOST: &str = "http://visallo.org#boost";
    pub const ONTOLOGY_FILE_HASH: &str = "http://visallo.org#ontologyFileHash";
    /// Metadata name on `ONTOLOGY_FILE_HASH` values recording import order.
    pub const DOCUMENT_INDEX: &str = "index";
    /// Integer order on dependent-property edges.
    pub const DEPENDENT_PROPERTY_ORDER: &str = "order";
    /// Prefix for verbatim annotation metadata on concepts.
    pub const META_PREFIX: &str = "meta:";

    /// Attributes stripped and reapplied on every re-import.
    pub const CHANGEABLE: &[&str] = &[
        DISPLAY_TYPE,
        USER_VISIBLE,
        DELETEABLE,
        UPDATEABLE,
        ADDABLE,
        SORTABLE,
        SEARCHABLE,
        INTENT,
        POSSIBLE_VALUES,
        COLOR,
        SUBTITLE_FORMULA,
        TIME_FORMULA,
        TITLE_FORMULA,
        VALIDATION_FORMULA,
        PROPERTY_GROUP,
        DISPLAY_FORMULA,
        GLYPH_ICON_FILE_NAME,
        GLYPH_ICON,
        GLYPH_ICON_SELECTED_FILE_NAME,
        GLYPH_ICON_SELECTED,
        MAP_GLYPH_ICON,
        MAP_GLYPH_ICON_FILE_NAME,
        ADD_RELATED_CONCEPT_WHITE_LIST,
    ];
}

/// The three kinds of ontology element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Concept,
    Relationship,
    Property,
}

impl ElementKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            ElementKind::Concept => CONCEPT_PREFIX,
            ElementKind::Relationship => RELATIONSHIP_PREFIX,
            ElementKind::Property => PROPERTY_PREFIX,
        }
    }

    /// Value of the `CONCEPT_TYPE` attribute for this kind.
    pub fn type_tag(&self) -> &'static str {
        match self {
            ElementKind::Concept => "concept",
            ElementKind::Relationship => "relationship",
            ElementKind::Property => "property",
        }
    }
}

pub fn vertex_id(kind: ElementKind, iri: &str) -> String {
    format!("{}{iri}", kind.prefix())
}

pub fn concept_id(iri: &str) -> String {
    vertex_id(ElementKind::Concept, iri)
}

pub fn relationship_id(iri: &str) -> String {
    vertex_id(ElementKind::Relationship, iri)
}

pub fn property_id(iri: &str) -> String {
    vertex_id(ElementKind::Property, iri)
}

/// Split a vertex id back into its kind and IRI.
pub fn decode_vertex_id(id: &str) -> Option<(ElementKind, &str)> {
    [
        ElementKind::Concept,
        ElementKind::Relationship,
        ElementKind::Property,
    ]
    .into_iter()
    .find_map(|kind| id.strip_prefix(kind.prefix()).map(|iri| (kind, iri)))
}

/// IRI for a vertex id of the given kind, if it carries that kind's prefix.
pub fn iri_of(kind: ElementKind, id: &str) -> Option<&str> {
    id.strip_prefix(kind.prefix())
}

/// IRI for any ontology vertex id; unknown ids are returned unchanged.
pub fn display_iri(id: &str) -> &str {
    decode_vertex_id(id).map(|(_, iri)| iri).unwrap_or(id)
}

/// Structural edge id between two vertices.
pub fn edge_id(out_vertex_id: &str, in_vertex_id: &str) -> String {
    format!("{out_vertex_id}-{in_vertex_id}")
}

/// Id of the `index`-th dependent-property edge of a property vertex.
pub fn dependent_edge_id(property_vertex_id: &str, index: usize) -> String {
    format!("{property_vertex_id}-dependentProperty-{index}")
}

/// Soft-delete every changeable attribute of an element vertex.
pub fn delete_changeable_attributes(
    graph: &dyn GraphStore,
    vertex_id: &str,
    auths: &Authorizations,
) -> GraphResult<usize> {
    let mut removed = 0;
    for name in attr::CHANGEABLE {
        removed += graph.soft_delete_vertex_property(vertex_id, name, auths)?;
    }
    Ok(removed)
}

/// Attribute schema for every ontology vertex.
pub fn required_definitions() -> Vec<PropertyDefinition> {
    let exact: BTreeSet<TextIndexHint> = [TextIndexHint::ExactMatch].into_iter().collect();
    let mut defs = Vec::new();
    for name in [
        attr::CONCEPT_TYPE,
        attr::ONTOLOGY_TITLE,
        attr::DISPLAY_NAME,
        attr::DATA_TYPE,
        attr::INTENT,
    ] {
        defs.push(PropertyDefinition::new(name, ValueKind::String).with_hints(exact.clone()));
    }
    for name in [
        attr::DISPLAY_TYPE,
        attr::TITLE_FORMULA,
        attr::SUBTITLE_FORMULA,
        attr::TIME_FORMULA,
        attr::VALIDATION_FORMULA,
        attr::DISPLAY_FORMULA,
        attr::PROPERTY_GROUP,
        attr::COLOR,
        attr::GLYPH_ICON_FILE_NAME,
        attr::GLYPH_ICON_SELECTED_FILE_NAME,
        attr::MAP_GLYPH_ICON_FILE_NAME,
        attr::ADD_RELATED_CONCEPT_WHITE_LIST,
        attr::TEXT_INDEX_HINTS,
        attr::POSSIBLE_VALUES,
        attr::ONTOLOGY_FILE_HASH,
    ] {
        defs.push(PropertyDefinition::new(name, ValueKind::String));
    }
    for name in [attr::GLYPH_ICON, attr::GLYPH_ICON_SELECTED, attr::MAP_GLYPH_ICON] {
        defs.push(PropertyDefinition::new(name, ValueKind::Binary));
    }
    for name in [
        attr::USER_VISIBLE,
        attr::SEARCHABLE,
        attr::SORTABLE,
        attr::ADDABLE,
        attr::DELETEABLE,
        attr::UPDATEABLE,
    ] {
        defs.push(PropertyDefinition::new(name, ValueKind::Boolean));
    }
    defs.push(PropertyDefinition::new(attr::BOOST, ValueKind::Double));
    defs.push(PropertyDefinition::new(
        attr::DEPENDENT_PROPERTY_ORDER,
        ValueKind::Integer,
    ));
    defs
}

/// Register the attribute schema, skipping names already defined.
///
/// Returns how many definitions were new.
pub fn define_required_properties(graph: &dyn GraphStore) -> GraphResult<usize> {
    let mut defined = 0;
    for def in required_definitions() {
        if graph.is_property_defined(&def.name) {
            continue;
        }
        if graph.define_property(def)? {
            defined += 1;
        }
    }
    if defined > 0 {
        tracing::debug!(defined, "registered ontology attribute schema");
    }
    Ok(defined)
}
