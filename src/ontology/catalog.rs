//! Property definitions and their attachment to owners.
//!
//! `hasProperty` edges run from owner (concept, relationship or table) to
//! property. Dependent properties are an ordered list encoded as edges with
//! ids `{property}-dependentProperty-{i}`, each carrying its index in an
//! `order` attribute; reads sort on that attribute.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::OntologyError;
use crate::graph::{
    Authorizations, Direction, GraphStore, HasProperties, Property, PropertyDefinition,
    PropertyValue, TextIndexHint,
};

use super::PropertyType;
use super::codec::{self, ElementKind, attr, label};
use super::types::TypeResolver;

/// Default ceiling for the dependent-edge scan.
pub const DEFAULT_MAX_DEPENDENT_PROPERTIES: usize = 1000;

/// Everything needed to create or update a property.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProperty {
    pub iri: String,
    pub data_type: PropertyType,
    pub display_name: Option<String>,
    pub concept_iris: Vec<String>,
    pub relationship_iris: Vec<String>,
    pub table_iris: Vec<String>,
    pub possible_values: Option<BTreeMap<String, String>>,
    /// `None` means undeclared; the data type's defaults apply.
    pub text_index_hints: Option<BTreeSet<TextIndexHint>>,
    pub user_visible: bool,
    /// `None` derives the flag from the text index hints.
    pub searchable: Option<bool>,
    pub addable: bool,
    pub sortable: bool,
    pub updateable: bool,
    pub deleteable: bool,
    pub display_type: Option<String>,
    pub property_group: Option<String>,
    pub boost: Option<f64>,
    pub validation_formula: Option<String>,
    pub display_formula: Option<String>,
    pub dependent_property_iris: Vec<String>,
    pub intents: Vec<String>,
}

impl NewProperty {
    pub fn new(iri: impl Into<String>, data_type: PropertyType) -> Self {
        Self {
            iri: iri.into(),
            data_type,
            display_name: None,
            concept_iris: Vec::new(),
            relationship_iris: Vec::new(),
            table_iris: Vec::new(),
            possible_values: None,
            text_index_hints: None,
            user_visible: true,
            searchable: None,
            addable: true,
            sortable: true,
            updateable: true,
            deleteable: true,
            display_type: None,
            property_group: None,
            boost: None,
            validation_formula: None,
            display_formula: None,
            dependent_property_iris: Vec::new(),
            intents: Vec::new(),
        }
    }

    pub fn on_concept(mut self, iri: impl Into<String>) -> Self {
        self.concept_iris.push(iri.into());
        self
    }

    pub fn on_relationship(mut self, iri: impl Into<String>) -> Self {
        self.relationship_iris.push(iri.into());
        self
    }

    pub fn on_table(mut self, iri: impl Into<String>) -> Self {
        self.table_iris.push(iri.into());
        self
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn text_index_hints(mut self, hints: BTreeSet<TextIndexHint>) -> Self {
        self.text_index_hints = Some(hints);
        self
    }

    pub fn searchable(mut self, searchable: bool) -> Self {
        self.searchable = Some(searchable);
        self
    }

    pub fn dependents<I, S>(mut self, iris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependent_property_iris = iris.into_iter().map(Into::into).collect();
        self
    }

    pub fn intent(mut self, intent: impl Into<String>) -> Self {
        self.intents.push(intent.into());
        self
    }

    fn has_owner(&self) -> bool {
        !(self.concept_iris.is_empty()
            && self.relationship_iris.is_empty()
            && self.table_iris.is_empty())
    }
}

/// Property operations over a graph.
pub struct PropertyCatalog<'a> {
    graph: &'a dyn GraphStore,
    auths: &'a Authorizations,
    visibility: &'a str,
    max_dependents: usize,
}

impl<'a> PropertyCatalog<'a> {
    pub fn new(
        graph: &'a dyn GraphStore,
        auths: &'a Authorizations,
        visibility: &'a str,
        max_dependents: usize,
    ) -> Self {
        Self {
            graph,
            auths,
            visibility,
            max_dependents,
        }
    }

    fn require_vertex(&self, kind: ElementKind, vertex_id: &str) -> Result<(), OntologyError> {
        match self.graph.get_vertex(vertex_id, self.auths)? {
            Some(_) => Ok(()),
            None => Err(OntologyError::NotFound {
                kind: kind.type_tag(),
                iri: codec::display_iri(vertex_id).to_string(),
            }),
        }
    }

    fn set_attr(&self, vertex_id: &str, name: &str, value: impl Into<PropertyValue>) -> Result<(), OntologyError> {
        self.graph
            .set_vertex_property(vertex_id, Property::new(name, value), self.auths)?;
        Ok(())
    }

    fn set_non_blank(&self, vertex_id: &str, name: &str, value: Option<&str>) -> Result<(), OntologyError> {
        match value.map(str::trim).filter(|s| !s.is_empty()) {
            Some(v) => self.set_attr(vertex_id, name, v),
            None => Ok(()),
        }
    }

    /// Find or add the `hasProperty` edge from `owner_id` to `property_id`.
    pub fn attach_property(
        &self,
        owner_kind: ElementKind,
        owner_id: &str,
        property_id: &str,
    ) -> Result<(), OntologyError> {
        self.require_vertex(owner_kind, owner_id)?;
        self.require_vertex(ElementKind::Property, property_id)?;
        self.graph.get_or_create_edge(
            &codec::edge_id(owner_id, property_id),
            owner_id,
            property_id,
            label::HAS_PROPERTY,
            self.visibility,
            self.auths,
        )?;
        Ok(())
    }

    /// IRIs of properties attached directly to `owner_id`, in attachment order.
    ///
    /// For an extended data table these are its columns.
    pub fn properties_of(&self, owner_id: &str) -> Result<Vec<String>, OntologyError> {
        Ok(self
            .graph
            .vertex_ids(owner_id, Direction::Out, label::HAS_PROPERTY, self.auths)?
            .iter()
            .filter_map(|id| codec::iri_of(ElementKind::Property, id))
            .map(str::to_string)
            .collect())
    }

    /// Vertex ids of everything `property_id` is attached to.
    pub fn owners_of(&self, property_id: &str) -> Result<Vec<String>, OntologyError> {
        Ok(self
            .graph
            .vertex_ids(property_id, Direction::In, label::HAS_PROPERTY, self.auths)?)
    }

    /// Replace the dependent-property list of `property_id`.
    ///
    /// Deletes the existing edges by scanning indices until the first gap,
    /// flushes, then recreates one edge per dependent with its order.
    pub fn set_dependent_properties(
        &self,
        property_id: &str,
        ordered_iris: &[String],
    ) -> Result<(), OntologyError> {
        let iri = codec::display_iri(property_id).to_string();
        if ordered_iris.len() > self.max_dependents {
            return Err(OntologyError::TooManyDependentProperties {
                iri,
                count: ordered_iris.len(),
                max: self.max_dependents,
            });
        }
        self.require_vertex(ElementKind::Property, property_id)?;
        let dependent_ids: Vec<String> = ordered_iris.iter().map(|i| codec::property_id(i)).collect();
        for id in &dependent_ids {
            self.require_vertex(ElementKind::Property, id)?;
        }

        let mut deleted = 0;
        for i in 0..self.max_dependents {
            if !self
                .graph
                .delete_edge(&codec::dependent_edge_id(property_id, i), self.auths)?
            {
                break;
            }
            deleted += 1;
        }
        self.graph.flush()?;

        for (i, dependent_id) in dependent_ids.iter().enumerate() {
            let edge_id = codec::dependent_edge_id(property_id, i);
            self.graph.get_or_create_edge(
                &edge_id,
                property_id,
                dependent_id,
                label::DEPENDENT_PROPERTY,
                self.visibility,
                self.auths,
            )?;
            self.graph.set_edge_property(
                &edge_id,
                Property::new(attr::DEPENDENT_PROPERTY_ORDER, i as i64),
                self.auths,
            )?;
        }
        tracing::debug!(
            iri = %iri,
            deleted,
            created = dependent_ids.len(),
            "replaced dependent properties"
        );
        Ok(())
    }

    /// Dependent property IRIs, sorted by their stored order.
    pub fn dependent_properties(&self, property_id: &str) -> Result<Vec<String>, OntologyError> {
        let mut edges = self.graph.edges(
            property_id,
            Direction::Out,
            Some(label::DEPENDENT_PROPERTY),
            self.auths,
        )?;
        edges.sort_by_key(|e| {
            e.property_value(attr::DEPENDENT_PROPERTY_ORDER)
                .and_then(PropertyValue::as_i64)
                .unwrap_or(0)
        });
        Ok(edges
            .iter()
            .map(|e| codec::display_iri(e.other_vertex_id(property_id)).to_string())
            .collect())
    }

    /// Add `property_id` as a column of the extended data table `table_id`.
    pub fn add_table_property(&self, table_id: &str, property_id: &str) -> Result<(), OntologyError> {
        let table = self.graph.get_vertex(table_id, self.auths)?.ok_or_else(|| {
            OntologyError::NotFound {
                kind: ElementKind::Property.type_tag(),
                iri: codec::display_iri(table_id).to_string(),
            }
        })?;
        if table.string_value(attr::DATA_TYPE) != Some(PropertyType::ExtendedDataTable.as_str()) {
            return Err(OntologyError::InvalidTableProperty {
                iri: codec::display_iri(table_id).to_string(),
            });
        }
        self.attach_property(ElementKind::Property, table_id, property_id)
    }

    /// Reconcile the concept and relationship owners of a property.
    ///
    /// Owner edges whose IRI is not in `domain_iris` are deleted; missing
    /// owners are looked up as a concept first, then as a relationship.
    /// Table membership is left alone.
    pub fn update_domains(&self, property_id: &str, domain_iris: &[String]) -> Result<(), OntologyError> {
        self.require_vertex(ElementKind::Property, property_id)?;
        let mut remaining: Vec<&str> = domain_iris.iter().map(String::as_str).collect();

        for edge in self
            .graph
            .edges(property_id, Direction::In, Some(label::HAS_PROPERTY), self.auths)?
        {
            let owner = edge.other_vertex_id(property_id);
            let owner_iri = match codec::decode_vertex_id(owner) {
                Some((ElementKind::Concept | ElementKind::Relationship, iri)) => iri,
                _ => continue,
            };
            if let Some(pos) = remaining.iter().position(|d| *d == owner_iri) {
                remaining.remove(pos);
            } else {
                self.graph.delete_edge(&edge.id, self.auths)?;
                tracing::debug!(domain = %owner_iri, "removed property domain");
            }
        }

        for domain in remaining {
            let concept_id = codec::concept_id(domain);
            if self.graph.get_vertex(&concept_id, self.auths)?.is_some() {
                self.attach_property(ElementKind::Concept, &concept_id, property_id)?;
                continue;
            }
            let relationship_id = codec::relationship_id(domain);
            if self.graph.get_vertex(&relationship_id, self.auths)?.is_some() {
                self.attach_property(ElementKind::Relationship, &relationship_id, property_id)?;
                continue;
            }
            return Err(OntologyError::UnknownDomain {
                iri: codec::display_iri(property_id).to_string(),
                domain: domain.to_string(),
            });
        }
        Ok(())
    }

    /// Create or update a property vertex and wire it to its owners.
    ///
    /// An existing vertex keeps its identity and data type; its changeable
    /// attributes are stripped and reapplied from `spec`.
    pub fn add_property_to(&self, spec: &NewProperty) -> Result<String, OntologyError> {
        if !spec.has_owner() {
            return Err(OntologyError::MissingOwner {
                iri: spec.iri.clone(),
            });
        }
        let mut owners = Vec::new();
        for iri in &spec.concept_iris {
            let id = codec::concept_id(iri);
            self.require_vertex(ElementKind::Concept, &id)?;
            owners.push((ElementKind::Concept, id));
        }
        for iri in &spec.relationship_iris {
            let id = codec::relationship_id(iri);
            self.require_vertex(ElementKind::Relationship, &id)?;
            owners.push((ElementKind::Relationship, id));
        }

        let id = codec::property_id(&spec.iri);
        let hints = spec
            .text_index_hints
            .clone()
            .unwrap_or_else(|| TypeResolver::default_text_index_hints(spec.data_type));

        match self.graph.get_vertex(&id, self.auths)? {
            None => {
                self.graph.get_or_create_vertex(&id, self.visibility, self.auths)?;
                self.set_attr(&id, attr::CONCEPT_TYPE, ElementKind::Property.type_tag())?;
                self.set_attr(&id, attr::ONTOLOGY_TITLE, spec.iri.as_str())?;
                self.set_attr(&id, attr::DATA_TYPE, spec.data_type.as_str())?;
                tracing::debug!(iri = %spec.iri, data_type = %spec.data_type, "created property");
            }
            Some(existing) => {
                let stored = existing.string_value(attr::DATA_TYPE);
                if stored.is_some_and(|s| s != spec.data_type.as_str()) {
                    tracing::warn!(
                        iri = %spec.iri,
                        stored = stored.unwrap_or_default(),
                        declared = %spec.data_type,
                        "property data type differs from stored; keeping stored"
                    );
                }
                codec::delete_changeable_attributes(self.graph, &id, self.auths)?;
            }
        }

        for hint in &hints {
            self.graph.set_vertex_property(
                &id,
                Property::new(attr::TEXT_INDEX_HINTS, hint.as_str()).with_key(hint.as_str()),
                self.auths,
            )?;
        }

        let searchable = TypeResolver::determine_searchable(spec.text_index_hints.as_ref(), spec.searchable);
        self.set_attr(&id, attr::SEARCHABLE, searchable)?;
        self.set_attr(&id, attr::SORTABLE, spec.sortable)?;
        self.set_attr(&id, attr::ADDABLE, spec.addable)?;
        self.set_attr(&id, attr::DELETEABLE, spec.deleteable)?;
        self.set_attr(&id, attr::UPDATEABLE, spec.updateable)?;
        self.set_attr(&id, attr::USER_VISIBLE, spec.user_visible)?;
        if let Some(boost) = spec.boost {
            self.set_attr(&id, attr::BOOST, boost)?;
        }
        self.set_non_blank(&id, attr::DISPLAY_NAME, spec.display_name.as_deref())?;
        self.set_non_blank(&id, attr::DISPLAY_TYPE, spec.display_type.as_deref())?;
        self.set_non_blank(&id, attr::PROPERTY_GROUP, spec.property_group.as_deref())?;
        self.set_non_blank(&id, attr::VALIDATION_FORMULA, spec.validation_formula.as_deref())?;
        self.set_non_blank(&id, attr::DISPLAY_FORMULA, spec.display_formula.as_deref())?;
        if let Some(values) = &spec.possible_values {
            let json = serde_json::to_string(values).map_err(|e| OntologyError::InvalidValue {
                iri: spec.iri.clone(),
                data_type: "possibleValues".into(),
                value: format!("{values:?}"),
                message: e.to_string(),
            })?;
            self.set_attr(&id, attr::POSSIBLE_VALUES, json)?;
        }
        for intent in &spec.intents {
            self.graph.set_vertex_property(
                &id,
                Property::new(attr::INTENT, intent.as_str()).with_key(intent.as_str()),
                self.auths,
            )?;
        }

        if !self.graph.is_property_defined(&spec.iri) {
            let mut definition =
                PropertyDefinition::new(spec.iri.clone(), TypeResolver::value_kind(spec.data_type))
                    .with_hints(hints);
            definition.boost = spec.boost;
            definition.sortable = spec.sortable;
            self.graph.define_property(definition)?;
        }

        for (kind, owner_id) in &owners {
            self.attach_property(*kind, owner_id, &id)?;
        }
        for table_iri in &spec.table_iris {
            self.add_table_property(&codec::property_id(table_iri), &id)?;
        }
        if !spec.dependent_property_iris.is_empty() {
            self.set_dependent_properties(&id, &spec.dependent_property_iris)?;
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryGraph;

    struct Fixture {
        graph: MemoryGraph,
        auths: Authorizations,
    }

    impl Fixture {
        fn new() -> Self {
            let graph = MemoryGraph::new();
            let auths = Authorizations::public();
            for iri in ["Person", "Company"] {
                graph
                    .get_or_create_vertex(&codec::concept_id(iri), "", &auths)
                    .unwrap();
            }
            graph
                .get_or_create_vertex(&codec::relationship_id("worksFor"), "", &auths)
                .unwrap();
            Self { graph, auths }
        }

        fn catalog(&self) -> PropertyCatalog<'_> {
            PropertyCatalog::new(&self.graph, &self.auths, "", DEFAULT_MAX_DEPENDENT_PROPERTIES)
        }

        fn add(&self, iri: &str) -> String {
            self.catalog()
                .add_property_to(&NewProperty::new(iri, PropertyType::String).on_concept("Person"))
                .unwrap()
        }
    }

    fn iris(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn property_without_owner_is_rejected() {
        let f = Fixture::new();
        let err = f
            .catalog()
            .add_property_to(&NewProperty::new("age", PropertyType::Integer))
            .unwrap_err();
        assert!(matches!(err, OntologyError::MissingOwner { .. }));
    }

    #[test]
    fn unknown_owner_is_rejected() {
        let f = Fixture::new();
        let err = f
            .catalog()
            .add_property_to(&NewProperty::new("age", PropertyType::Integer).on_concept("Ghost"))
            .unwrap_err();
        assert!(matches!(err, OntologyError::NotFound { kind: "concept", .. }));
    }

    #[test]
    fn attach_is_idempotent() {
        let f = Fixture::new();
        let id = f.add("age");
        f.add("age");
        let catalog = f.catalog();
        catalog
            .attach_property(ElementKind::Concept, &codec::concept_id("Person"), &id)
            .unwrap();
        assert_eq!(catalog.properties_of(&codec::concept_id("Person")).unwrap(), vec!["age"]);
        assert_eq!(catalog.owners_of(&id).unwrap().len(), 1);
    }

    #[test]
    fn dependents_round_trip_and_replace() {
        let f = Fixture::new();
        let p = f.add("name");
        for iri in ["a", "b", "c"] {
            f.add(iri);
        }
        let catalog = f.catalog();
        catalog.set_dependent_properties(&p, &iris(&["a", "b", "c"])).unwrap();
        assert_eq!(catalog.dependent_properties(&p).unwrap(), vec!["a", "b", "c"]);

        catalog.set_dependent_properties(&p, &iris(&["c", "a"])).unwrap();
        assert_eq!(catalog.dependent_properties(&p).unwrap(), vec!["c", "a"]);
        assert!(
            f.graph
                .get_edge(&codec::dependent_edge_id(&p, 2), &f.auths)
                .unwrap()
                .is_none()
        );

        catalog.set_dependent_properties(&p, &[]).unwrap();
        assert!(catalog.dependent_properties(&p).unwrap().is_empty());
    }

    #[test]
    fn dependents_must_exist_and_fit_the_ceiling() {
        let f = Fixture::new();
        let p = f.add("name");
        let err = f
            .catalog()
            .set_dependent_properties(&p, &iris(&["missing"]))
            .unwrap_err();
        assert!(matches!(err, OntologyError::NotFound { .. }));

        f.add("a");
        f.add("b");
        let small = PropertyCatalog::new(&f.graph, &f.auths, "", 1);
        let err = small.set_dependent_properties(&p, &iris(&["a", "b"])).unwrap_err();
        assert!(matches!(err, OntologyError::TooManyDependentProperties { max: 1, .. }));
    }

    #[test]
    fn table_columns_require_table_type() {
        let f = Fixture::new();
        let catalog = f.catalog();
        let table = catalog
            .add_property_to(
                &NewProperty::new("addresses", PropertyType::ExtendedDataTable).on_concept("Person"),
            )
            .unwrap();
        catalog
            .add_property_to(&NewProperty::new("street", PropertyType::String).on_table("addresses"))
            .unwrap();
        let city = f.add("city");
        catalog.add_table_property(&table, &city).unwrap();
        assert_eq!(catalog.properties_of(&table).unwrap(), vec!["street", "city"]);

        let err = catalog.add_table_property(&city, &table).unwrap_err();
        assert!(matches!(err, OntologyError::InvalidTableProperty { .. }));
    }

    #[test]
    fn update_domains_diffs_owners() {
        let f = Fixture::new();
        let p = f.add("age");
        let catalog = f.catalog();
        catalog
            .update_domains(&p, &iris(&["Company", "worksFor"]))
            .unwrap();
        let mut owners = catalog.owners_of(&p).unwrap();
        owners.sort();
        assert_eq!(
            owners,
            vec![codec::concept_id("Company"), codec::relationship_id("worksFor")]
        );

        let err = catalog.update_domains(&p, &iris(&["Nowhere"])).unwrap_err();
        assert!(matches!(err, OntologyError::UnknownDomain { .. }));
    }

    #[test]
    fn readd_strips_changeable_attributes() {
        let f = Fixture::new();
        let catalog = f.catalog();
        let mut spec = NewProperty::new("age", PropertyType::Integer).on_concept("Person");
        spec.display_formula = Some("value + ' years'".into());
        spec.intents = vec!["age".into()];
        let id = catalog.add_property_to(&spec).unwrap();

        spec.display_formula = None;
        spec.intents.clear();
        catalog.add_property_to(&spec).unwrap();

        let v = f.graph.get_vertex(&id, &f.auths).unwrap().unwrap();
        assert!(v.property(attr::DISPLAY_FORMULA).is_none());
        assert!(v.property(attr::INTENT).is_none());
        assert_eq!(v.string_value(attr::ONTOLOGY_TITLE), Some("age"));
        assert!(f.graph.is_property_defined("age"));
    }

    #[test]
    fn searchable_follows_hints() {
        let f = Fixture::new();
        let catalog = f.catalog();
        let id = catalog
            .add_property_to(
                &NewProperty::new("raw", PropertyType::String)
                    .on_concept("Person")
                    .text_index_hints(BTreeSet::new()),
            )
            .unwrap();
        let v = f.graph.get_vertex(&id, &f.auths).unwrap().unwrap();
        assert_eq!(v.bool_value(attr::SEARCHABLE), Some(false));
        assert_eq!(v.property_values(attr::TEXT_INDEX_HINTS).count(), 0);
    }

    #[test]
    fn binary_without_hints_is_searchable() {
        let f = Fixture::new();
        let catalog = f.catalog();
        let id = catalog
            .add_property_to(&NewProperty::new("photo", PropertyType::Binary).on_concept("Person"))
            .unwrap();
        let v = f.graph.get_vertex(&id, &f.auths).unwrap().unwrap();
        assert_eq!(v.bool_value(attr::SEARCHABLE), Some(true));
        // The type default still decides what gets indexed.
        assert_eq!(v.property_values(attr::TEXT_INDEX_HINTS).count(), 0);
    }
}
