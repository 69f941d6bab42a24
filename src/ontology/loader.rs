//! Rebuilds ontology structs from their graph vertices.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::OntologyError;
use crate::graph::{Authorizations, Direction, GraphStore, HasProperties, PropertyValue, TextIndexHint, Vertex};

use super::catalog::{DEFAULT_MAX_DEPENDENT_PROPERTIES, PropertyCatalog};
use super::codec::{self, ElementKind, attr, label};
use super::hierarchy::HierarchyNavigator;
use super::{Concept, Flags, OntologyProperty, PropertyType, Relationship};

/// Reads ontology elements out of the graph.
pub struct Loader<'a> {
    graph: &'a dyn GraphStore,
    auths: &'a Authorizations,
    max_depth: usize,
}

impl<'a> Loader<'a> {
    pub fn new(graph: &'a dyn GraphStore, auths: &'a Authorizations, max_depth: usize) -> Self {
        Self {
            graph,
            auths,
            max_depth,
        }
    }

    pub fn navigator(&self) -> HierarchyNavigator<'a> {
        HierarchyNavigator::new(self.graph, self.auths, self.max_depth)
    }

    fn catalog(&self) -> PropertyCatalog<'a> {
        PropertyCatalog::new(self.graph, self.auths, "", DEFAULT_MAX_DEPENDENT_PROPERTIES)
    }

    /// Vertex for an element, if present and visible.
    pub fn vertex(&self, kind: ElementKind, iri: &str) -> Result<Option<Vertex>, OntologyError> {
        Ok(self.graph.get_vertex(&codec::vertex_id(kind, iri), self.auths)?)
    }

    /// Every element vertex of a kind, ordered by IRI.
    pub fn vertices(&self, kind: ElementKind) -> Result<Vec<Vertex>, OntologyError> {
        Ok(self
            .graph
            .vertices_with_prefix(kind.prefix(), self.auths)?
            .into_iter()
            .filter(|v| v.string_value(attr::CONCEPT_TYPE) == Some(kind.type_tag()))
            .collect())
    }

    pub fn concept(&self, iri: &str) -> Result<Option<Concept>, OntologyError> {
        match self.vertex(ElementKind::Concept, iri)? {
            Some(v) => self.concept_from(&v).map(Some),
            None => Ok(None),
        }
    }

    pub fn relationship(&self, iri: &str) -> Result<Option<Relationship>, OntologyError> {
        match self.vertex(ElementKind::Relationship, iri)? {
            Some(v) => self.relationship_from(&v).map(Some),
            None => Ok(None),
        }
    }

    pub fn property(&self, iri: &str) -> Result<Option<OntologyProperty>, OntologyError> {
        match self.vertex(ElementKind::Property, iri)? {
            Some(v) => self.property_from(&v).map(Some),
            None => Ok(None),
        }
    }

    pub fn concepts(&self) -> Result<Vec<Concept>, OntologyError> {
        self.vertices(ElementKind::Concept)?
            .iter()
            .map(|v| self.concept_from(v))
            .collect()
    }

    pub fn relationships(&self) -> Result<Vec<Relationship>, OntologyError> {
        self.vertices(ElementKind::Relationship)?
            .iter()
            .map(|v| self.relationship_from(v))
            .collect()
    }

    pub fn properties(&self) -> Result<Vec<OntologyProperty>, OntologyError> {
        self.vertices(ElementKind::Property)?
            .iter()
            .map(|v| self.property_from(v))
            .collect()
    }

    pub fn concept_from(&self, v: &Vertex) -> Result<Concept, OntologyError> {
        let parent_iri = self
            .navigator()
            .parent_of(&v.id)?
            .and_then(|p| codec::iri_of(ElementKind::Concept, &p).map(str::to_string));
        let metadata: BTreeMap<String, String> = v
            .properties
            .iter()
            .filter_map(|p| {
                let name = p.name.strip_prefix(attr::META_PREFIX)?;
                Some((name.to_string(), p.value.as_str()?.to_string()))
            })
            .collect();

        Ok(Concept {
            iri: element_iri(v, ElementKind::Concept),
            vertex_id: v.id.clone(),
            parent_iri,
            display_name: string_attr(v, attr::DISPLAY_NAME),
            display_type: string_attr(v, attr::DISPLAY_TYPE),
            title_formula: string_attr(v, attr::TITLE_FORMULA),
            subtitle_formula: string_attr(v, attr::SUBTITLE_FORMULA),
            time_formula: string_attr(v, attr::TIME_FORMULA),
            color: string_attr(v, attr::COLOR),
            glyph_icon: bytes_attr(v, attr::GLYPH_ICON),
            glyph_icon_selected: bytes_attr(v, attr::GLYPH_ICON_SELECTED),
            map_glyph_icon: bytes_attr(v, attr::MAP_GLYPH_ICON),
            flags: flags(v),
            intents: intents(v),
            add_related_concept_white_list: json_list(v, attr::ADD_RELATED_CONCEPT_WHITE_LIST),
            property_iris: self.catalog().properties_of(&v.id)?,
            metadata,
        })
    }

    pub fn relationship_from(&self, v: &Vertex) -> Result<Relationship, OntologyError> {
        let parent_iri = self
            .navigator()
            .parent_of(&v.id)?
            .and_then(|p| codec::iri_of(ElementKind::Relationship, &p).map(str::to_string));
        let concepts = |direction| -> Result<Vec<String>, OntologyError> {
            Ok(self
                .graph
                .vertex_ids(&v.id, direction, label::HAS_EDGE, self.auths)?
                .iter()
                .filter_map(|id| codec::iri_of(ElementKind::Concept, id))
                .map(str::to_string)
                .collect())
        };
        let inverse_of_iris = self
            .graph
            .vertex_ids(&v.id, Direction::Out, label::INVERSE_OF, self.auths)?
            .iter()
            .filter_map(|id| codec::iri_of(ElementKind::Relationship, id))
            .map(str::to_string)
            .collect();

        Ok(Relationship {
            iri: element_iri(v, ElementKind::Relationship),
            vertex_id: v.id.clone(),
            parent_iri,
            display_name: string_attr(v, attr::DISPLAY_NAME),
            title_formula: string_attr(v, attr::TITLE_FORMULA),
            subtitle_formula: string_attr(v, attr::SUBTITLE_FORMULA),
            time_formula: string_attr(v, attr::TIME_FORMULA),
            flags: flags(v),
            domain_iris: concepts(Direction::In)?,
            range_iris: concepts(Direction::Out)?,
            inverse_of_iris,
            intents: intents(v),
            property_iris: self.catalog().properties_of(&v.id)?,
        })
    }

    pub fn property_from(&self, v: &Vertex) -> Result<OntologyProperty, OntologyError> {
        let iri = element_iri(v, ElementKind::Property);
        let data_type: PropertyType = v
            .string_value(attr::DATA_TYPE)
            .unwrap_or_default()
            .parse()?;
        let possible_values = match v.string_value(attr::POSSIBLE_VALUES) {
            Some(json) => match serde_json::from_str::<BTreeMap<String, String>>(json) {
                Ok(map) => Some(map),
                Err(e) => {
                    tracing::warn!(iri = %iri, error = %e, "ignoring malformed possible values");
                    None
                }
            },
            None => None,
        };
        let text_index_hints: BTreeSet<TextIndexHint> = v
            .property_values(attr::TEXT_INDEX_HINTS)
            .filter_map(|p| p.value.as_str().and_then(TextIndexHint::parse))
            .collect();

        let catalog = self.catalog();
        let mut concept_iris = Vec::new();
        let mut relationship_iris = Vec::new();
        let mut table_iris = Vec::new();
        for owner in catalog.owners_of(&v.id)? {
            match codec::decode_vertex_id(&owner) {
                Some((ElementKind::Concept, o)) => concept_iris.push(o.to_string()),
                Some((ElementKind::Relationship, o)) => relationship_iris.push(o.to_string()),
                Some((ElementKind::Property, o)) => table_iris.push(o.to_string()),
                None => {}
            }
        }
        let table_property_iris = if data_type == PropertyType::ExtendedDataTable {
            catalog.properties_of(&v.id)?
        } else {
            Vec::new()
        };

        Ok(OntologyProperty {
            vertex_id: v.id.clone(),
            display_name: string_attr(v, attr::DISPLAY_NAME),
            data_type,
            display_type: string_attr(v, attr::DISPLAY_TYPE),
            property_group: string_attr(v, attr::PROPERTY_GROUP),
            possible_values,
            text_index_hints,
            boost: v.property_value(attr::BOOST).and_then(PropertyValue::as_f64),
            validation_formula: string_attr(v, attr::VALIDATION_FORMULA),
            display_formula: string_attr(v, attr::DISPLAY_FORMULA),
            dependent_property_iris: catalog.dependent_properties(&v.id)?,
            flags: flags(v),
            intents: intents(v),
            concept_iris,
            relationship_iris,
            table_iris,
            table_property_iris,
            iri,
        })
    }
}

fn element_iri(v: &Vertex, kind: ElementKind) -> String {
    v.string_value(attr::ONTOLOGY_TITLE)
        .or_else(|| codec::iri_of(kind, &v.id))
        .unwrap_or(&v.id)
        .to_string()
}

fn string_attr(v: &Vertex, name: &str) -> Option<String> {
    v.string_value(name).map(str::to_string)
}

fn bytes_attr(v: &Vertex, name: &str) -> Option<Vec<u8>> {
    v.property_value(name)
        .and_then(PropertyValue::as_bytes)
        .map(<[u8]>::to_vec)
}

fn intents(v: &Vertex) -> Vec<String> {
    v.property_values(attr::INTENT)
        .filter_map(|p| p.value.as_str().map(str::to_string))
        .collect()
}

fn flags(v: &Vertex) -> Flags {
    let defaults = Flags::default();
    Flags {
        user_visible: v.bool_value(attr::USER_VISIBLE).unwrap_or(defaults.user_visible),
        searchable: v.bool_value(attr::SEARCHABLE).unwrap_or(defaults.searchable),
        addable: v.bool_value(attr::ADDABLE).unwrap_or(defaults.addable),
        sortable: v.bool_value(attr::SORTABLE).unwrap_or(defaults.sortable),
        updateable: v.bool_value(attr::UPDATEABLE).unwrap_or(defaults.updateable),
        deleteable: v.bool_value(attr::DELETEABLE).unwrap_or(defaults.deleteable),
    }
}

fn json_list(v: &Vertex, name: &str) -> Vec<String> {
    let Some(raw) = v.string_value(name) else {
        return Vec::new();
    };
    match serde_json::from_str(raw) {
        Ok(list) => list,
        Err(e) => {
            tracing::warn!(vertex = %v.id, attribute = name, error = %e, "ignoring malformed list");
            Vec::new()
        }
    }
}
