//! Typed ontology stored as graph elements.
//!
//! Concepts, relationships and properties are plain structs independent of
//! the storage adapter. The submodules map them to and from graph vertices
//! and edges:
//!
//! - [`codec`]: deterministic IRI to vertex-id mapping and the attribute schema
//! - [`hierarchy`]: single-parent is-a trees
//! - [`catalog`]: property attachment, dependent-property order, table columns
//! - [`types`]: datatype resolution and derived flags
//! - [`cache`]: TTL caches over the aggregate views
//! - [`writer`]: serialized mutations
//! - [`importer`]: idempotent import of parsed ontology documents
//! - [`repository`]: the public facade

pub mod cache;
pub mod catalog;
pub mod client;
pub mod codec;
pub mod document;
pub mod hierarchy;
pub mod importer;
pub mod loader;
pub mod repository;
pub mod types;
pub mod writer;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OntologyError;
use crate::graph::{PropertyValue, TextIndexHint};

pub use repository::OntologyRepository;

/// Root of the concept forest.
pub const ROOT_CONCEPT_IRI: &str = "http://visallo.org#root";
/// The entity concept every imported class without a parent hangs under.
pub const ENTITY_CONCEPT_IRI: &str = "http://www.w3.org/2002/07/owl#Thing";
/// Root of the relationship forest.
pub const TOP_OBJECT_PROPERTY_IRI: &str = "http://www.w3.org/2002/07/owl#topObjectProperty";

/// Closed set of property data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyType {
    String,
    Date,
    Double,
    Integer,
    Boolean,
    GeoLocation,
    #[serde(rename = "directory/entity")]
    DirectoryEntity,
    Currency,
    Image,
    ExtendedDataTable,
    Binary,
}

impl PropertyType {
    pub const ALL: [PropertyType; 11] = [
        PropertyType::String,
        PropertyType::Date,
        PropertyType::Double,
        PropertyType::Integer,
        PropertyType::Boolean,
        PropertyType::GeoLocation,
        PropertyType::DirectoryEntity,
        PropertyType::Currency,
        PropertyType::Image,
        PropertyType::ExtendedDataTable,
        PropertyType::Binary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::String => "string",
            PropertyType::Date => "date",
            PropertyType::Double => "double",
            PropertyType::Integer => "integer",
            PropertyType::Boolean => "boolean",
            PropertyType::GeoLocation => "geoLocation",
            PropertyType::DirectoryEntity => "directory/entity",
            PropertyType::Currency => "currency",
            PropertyType::Image => "image",
            PropertyType::ExtendedDataTable => "extendedDataTable",
            PropertyType::Binary => "binary",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = OntologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PropertyType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| OntologyError::UnknownDataType { iri: s.to_string() })
    }
}

/// Boolean flags shared by every ontology element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flags {
    pub user_visible: bool,
    pub searchable: bool,
    pub addable: bool,
    pub sortable: bool,
    pub updateable: bool,
    pub deleteable: bool,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            user_visible: true,
            searchable: true,
            addable: true,
            sortable: true,
            updateable: true,
            deleteable: true,
        }
    }
}

/// A class in the domain model.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Concept {
    pub iri: String,
    pub vertex_id: String,
    pub parent_iri: Option<String>,
    pub display_name: Option<String>,
    pub display_type: Option<String>,
    pub title_formula: Option<String>,
    pub subtitle_formula: Option<String>,
    pub time_formula: Option<String>,
    pub color: Option<String>,
    pub glyph_icon: Option<Vec<u8>>,
    pub glyph_icon_selected: Option<Vec<u8>>,
    pub map_glyph_icon: Option<Vec<u8>>,
    pub flags: Flags,
    pub intents: Vec<String>,
    pub add_related_concept_white_list: Vec<String>,
    /// Directly attached properties; inherited ones are not included.
    pub property_iris: Vec<String>,
    /// Annotations with no dedicated attribute, stored verbatim.
    pub metadata: BTreeMap<String, String>,
}

impl Concept {
    /// Display name, falling back to the IRI.
    pub fn title(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.iri)
    }

    pub fn has_intent(&self, intent: &str) -> bool {
        self.intents.iter().any(|i| i == intent)
    }
}

/// A typed, directed edge kind.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Relationship {
    pub iri: String,
    pub vertex_id: String,
    pub parent_iri: Option<String>,
    pub display_name: Option<String>,
    pub title_formula: Option<String>,
    pub subtitle_formula: Option<String>,
    pub time_formula: Option<String>,
    pub flags: Flags,
    pub domain_iris: Vec<String>,
    pub range_iris: Vec<String>,
    pub inverse_of_iris: Vec<String>,
    pub intents: Vec<String>,
    pub property_iris: Vec<String>,
}

impl Relationship {
    pub fn title(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.iri)
    }

    pub fn has_intent(&self, intent: &str) -> bool {
        self.intents.iter().any(|i| i == intent)
    }
}

/// A typed attribute definable on concepts, relationships and tables.
#[derive(Debug, Clone, PartialEq)]
pub struct OntologyProperty {
    pub iri: String,
    pub vertex_id: String,
    pub display_name: Option<String>,
    pub data_type: PropertyType,
    pub display_type: Option<String>,
    pub property_group: Option<String>,
    pub possible_values: Option<BTreeMap<String, String>>,
    /// Empty means text indexing is disabled.
    pub text_index_hints: BTreeSet<TextIndexHint>,
    pub boost: Option<f64>,
    pub validation_formula: Option<String>,
    pub display_formula: Option<String>,
    pub dependent_property_iris: Vec<String>,
    pub flags: Flags,
    pub intents: Vec<String>,
    pub concept_iris: Vec<String>,
    pub relationship_iris: Vec<String>,
    /// Extended data tables this property is a column of.
    pub table_iris: Vec<String>,
    /// Columns, in creation order. Only populated for `ExtendedDataTable`.
    pub table_property_iris: Vec<String>,
}

impl OntologyProperty {
    pub fn title(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.iri)
    }

    pub fn has_intent(&self, intent: &str) -> bool {
        self.intents.iter().any(|i| i == intent)
    }

    pub fn is_extended_data_table(&self) -> bool {
        self.data_type == PropertyType::ExtendedDataTable
    }

    /// Convert a raw string into a value of this property's type.
    pub fn convert_string(&self, raw: &str) -> Result<PropertyValue, OntologyError> {
        types::TypeResolver::convert_string(&self.iri, self.data_type, raw)
    }

    /// A value for a property with dependents must carry one entry per dependent.
    pub fn validate_dependent_values<T>(&self, values: &[T]) -> Result<(), OntologyError> {
        if self.dependent_property_iris.is_empty() {
            return Ok(());
        }
        if values.len() != self.dependent_property_iris.len() {
            return Err(OntologyError::DependentValueCountMismatch {
                iri: self.iri.clone(),
                expected: self.dependent_property_iris.len(),
                actual: values.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn property(dependents: &[&str]) -> OntologyProperty {
        OntologyProperty {
            iri: "http://example.org#name".into(),
            vertex_id: "ontology_prop_http://example.org#name".into(),
            display_name: None,
            data_type: PropertyType::String,
            display_type: None,
            property_group: None,
            possible_values: None,
            text_index_hints: BTreeSet::new(),
            boost: None,
            validation_formula: None,
            display_formula: None,
            dependent_property_iris: dependents.iter().map(|s| s.to_string()).collect(),
            flags: Flags::default(),
            intents: vec![],
            concept_iris: vec![],
            relationship_iris: vec![],
            table_iris: vec![],
            table_property_iris: vec![],
        }
    }

    #[test]
    fn property_type_names_round_trip() {
        for t in PropertyType::ALL {
            assert_eq!(t.as_str().parse::<PropertyType>().unwrap(), t);
        }
        assert!("varchar".parse::<PropertyType>().is_err());
    }

    #[test]
    fn dependent_value_count_is_enforced() {
        let p = property(&["http://example.org#first", "http://example.org#last"]);
        assert!(p.validate_dependent_values(&["a", "b"]).is_ok());
        let err = p.validate_dependent_values(&["a"]).unwrap_err();
        assert!(matches!(
            err,
            OntologyError::DependentValueCountMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn no_dependents_accepts_anything() {
        let p = property(&[]);
        assert!(p.validate_dependent_values::<&str>(&[]).is_ok());
        assert!(p.validate_dependent_values(&["x", "y", "z"]).is_ok());
    }

    #[test]
    fn title_falls_back_to_iri() {
        let c = Concept {
            iri: "http://example.org#Person".into(),
            ..Default::default()
        };
        assert_eq!(c.title(), "http://example.org#Person");
    }
}
