//! Serializable snapshot of the ontology for presentation layers.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use url::form_urlencoded;

use super::{Concept, OntologyProperty, PropertyType, Relationship};

static RE_CONSONANT_Y: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^aeiouAEIOU]y$").unwrap());

static RE_SIBILANT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(s|x|z|ch|sh)$").unwrap());

/// Whole-ontology view handed to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientApiOntology {
    pub concepts: Vec<ClientConcept>,
    pub properties: Vec<ClientProperty>,
    pub relationships: Vec<ClientRelationship>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConcept {
    pub id: String,
    pub title: String,
    pub display_name: String,
    pub plural_display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_concept: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_formula: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle_formula: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_formula: Option<String>,
    /// Only present when the concept is hidden.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_visible: Option<bool>,
    pub searchable: bool,
    pub addable: bool,
    pub deleteable: bool,
    pub updateable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub glyph_icon_href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub glyph_icon_selected_href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_glyph_icon_href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub intents: Vec<String>,
    pub add_related_concept_white_list: Vec<String>,
    pub properties: Vec<String>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientProperty {
    pub title: String,
    pub display_name: String,
    pub data_type: PropertyType,
    pub user_visible: bool,
    pub searchable: bool,
    pub addable: bool,
    pub sortable: bool,
    pub deleteable: bool,
    pub updateable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub possible_values: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_formula: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_formula: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependent_property_iris: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub table_property_iris: Vec<String>,
    pub text_index_hints: Vec<String>,
    pub intents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InverseOf {
    pub iri: String,
    /// The lexicographically smaller IRI of the pair.
    pub primary_iri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRelationship {
    pub title: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_iri: Option<String>,
    pub user_visible: bool,
    pub deleteable: bool,
    pub updateable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_formula: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle_formula: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_formula: Option<String>,
    pub domain_concept_iris: Vec<String>,
    pub range_concept_iris: Vec<String>,
    pub inverse_ofs: Vec<InverseOf>,
    pub intents: Vec<String>,
    pub properties: Vec<String>,
}

/// Naive English plural for display names.
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    if RE_CONSONANT_Y.is_match(word) {
        return format!("{}ies", &word[..word.len() - 1]);
    }
    if RE_SIBILANT.is_match(word) {
        return format!("{word}es");
    }
    format!("{word}s")
}

fn resource_href(iri: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(iri.as_bytes()).collect();
    format!("resource?id={encoded}")
}

impl From<&Concept> for ClientConcept {
    fn from(c: &Concept) -> Self {
        let display_name = c.title().to_string();
        let href = |present: bool| present.then(|| resource_href(&c.iri));
        Self {
            id: c.vertex_id.clone(),
            title: c.iri.clone(),
            plural_display_name: pluralize(&display_name),
            display_name,
            parent_concept: c.parent_iri.clone(),
            display_type: c.display_type.clone(),
            title_formula: c.title_formula.clone(),
            subtitle_formula: c.subtitle_formula.clone(),
            time_formula: c.time_formula.clone(),
            user_visible: (!c.flags.user_visible).then_some(false),
            searchable: c.flags.searchable,
            addable: c.flags.addable,
            deleteable: c.flags.deleteable,
            updateable: c.flags.updateable,
            glyph_icon_href: href(c.glyph_icon.is_some()),
            glyph_icon_selected_href: href(c.glyph_icon_selected.is_some()),
            map_glyph_icon_href: href(c.map_glyph_icon.is_some()),
            color: c.color.clone(),
            intents: c.intents.clone(),
            add_related_concept_white_list: c.add_related_concept_white_list.clone(),
            properties: c.property_iris.clone(),
            metadata: c.metadata.clone(),
        }
    }
}

impl From<&OntologyProperty> for ClientProperty {
    fn from(p: &OntologyProperty) -> Self {
        Self {
            title: p.iri.clone(),
            display_name: p.title().to_string(),
            data_type: p.data_type,
            user_visible: p.flags.user_visible,
            searchable: p.flags.searchable,
            addable: p.flags.addable,
            sortable: p.flags.sortable,
            deleteable: p.flags.deleteable,
            updateable: p.flags.updateable,
            display_type: p.display_type.clone(),
            property_group: p.property_group.clone(),
            possible_values: p.possible_values.clone(),
            validation_formula: p.validation_formula.clone(),
            display_formula: p.display_formula.clone(),
            dependent_property_iris: p.dependent_property_iris.clone(),
            table_property_iris: p.table_property_iris.clone(),
            text_index_hints: p.text_index_hints.iter().map(|h| h.as_str().to_string()).collect(),
            intents: p.intents.clone(),
        }
    }
}

impl From<&Relationship> for ClientRelationship {
    fn from(r: &Relationship) -> Self {
        let inverse_ofs = r
            .inverse_of_iris
            .iter()
            .map(|other| InverseOf {
                iri: other.clone(),
                primary_iri: std::cmp::min(&r.iri, other).clone(),
            })
            .collect();
        Self {
            title: r.iri.clone(),
            display_name: r.title().to_string(),
            parent_iri: r.parent_iri.clone(),
            user_visible: r.flags.user_visible,
            deleteable: r.flags.deleteable,
            updateable: r.flags.updateable,
            title_formula: r.title_formula.clone(),
            subtitle_formula: r.subtitle_formula.clone(),
            time_formula: r.time_formula.clone(),
            domain_concept_iris: r.domain_iris.clone(),
            range_concept_iris: r.range_iris.clone(),
            inverse_ofs,
            intents: r.intents.clone(),
            properties: r.property_iris.clone(),
        }
    }
}

impl ClientApiOntology {
    /// Convert the three views in parallel.
    pub fn build(
        concepts: &[Concept],
        properties: &[OntologyProperty],
        relationships: &[Relationship],
    ) -> Self {
        let (concepts, (properties, relationships)) = rayon::join(
            || concepts.iter().map(ClientConcept::from).collect::<Vec<_>>(),
            || {
                rayon::join(
                    || properties.iter().map(ClientProperty::from).collect::<Vec<_>>(),
                    || relationships.iter().map(ClientRelationship::from).collect::<Vec<_>>(),
                )
            },
        );
        Self {
            concepts,
            properties,
            relationships,
        }
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::Flags;

    #[test]
    fn plural_forms() {
        assert_eq!(pluralize("Person"), "Persons");
        assert_eq!(pluralize("Company"), "Companies");
        assert_eq!(pluralize("Day"), "Days");
        assert_eq!(pluralize("Address"), "Addresses");
        assert_eq!(pluralize("Match"), "Matches");
        assert_eq!(pluralize(""), "");
    }

    #[test]
    fn hidden_concept_reports_user_visible_false_only() {
        let mut c = Concept {
            iri: "http://example.org#Person".into(),
            glyph_icon: Some(vec![1, 2]),
            ..Default::default()
        };
        let visible = ClientConcept::from(&c);
        assert_eq!(visible.user_visible, None);
        assert_eq!(
            visible.glyph_icon_href.as_deref(),
            Some("resource?id=http%3A%2F%2Fexample.org%23Person")
        );
        assert!(visible.map_glyph_icon_href.is_none());

        c.flags = Flags {
            user_visible: false,
            ..Flags::default()
        };
        assert_eq!(ClientConcept::from(&c).user_visible, Some(false));
    }

    #[test]
    fn inverse_primary_is_smaller_iri() {
        let r = Relationship {
            iri: "http://example.org#owns".into(),
            inverse_of_iris: vec!["http://example.org#ownedBy".into()],
            ..Default::default()
        };
        let client = ClientRelationship::from(&r);
        assert_eq!(client.inverse_ofs[0].primary_iri, "http://example.org#ownedBy");
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let c = Concept {
            iri: "http://example.org#Person".into(),
            display_name: Some("Person".into()),
            ..Default::default()
        };
        let snapshot = ClientApiOntology::build(&[c], &[], &[]);
        let json = snapshot.to_json_pretty().unwrap();
        assert!(json.contains("\"pluralDisplayName\": \"Persons\""));
        assert!(!json.contains("userVisible"));
    }
}
