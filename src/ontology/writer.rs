//! Serialized mutations against the ontology graph.
//!
//! An [`OntologyWriter`] holds the repository's write gate for its whole
//! lifetime, so two writers obtained from the same repository never
//! interleave. Writers going through different repository instances over a
//! shared store are not coordinated. Dropping the writer invalidates every
//! cached view.

use std::sync::MutexGuard;

use crate::error::OntologyError;
use crate::graph::{Authorizations, GraphResult, GraphStore, HasProperties, Property, PropertyValue};

use super::cache::CacheManager;
use super::catalog::{NewProperty, PropertyCatalog};
use super::codec::{self, ElementKind, attr, label};
use super::hierarchy::HierarchyNavigator;
use super::loader::Loader;
use super::{
    Concept, ENTITY_CONCEPT_IRI, OntologyProperty, Relationship, TOP_OBJECT_PROPERTY_IRI,
};

pub const ENTITY_TITLE_FORMULA: &str = "prop('http://visallo.org#title') || ''";
pub const ENTITY_SUBTITLE_FORMULA: &str = "prop('http://visallo.org#source') || ''";
pub const ENTITY_TIME_FORMULA: &str = "prop('http://visallo.org#publishedDate') || ''";

/// Exclusive handle for mutating the ontology.
pub struct OntologyWriter<'a> {
    graph: &'a dyn GraphStore,
    auths: &'a Authorizations,
    visibility: &'a str,
    max_depth: usize,
    max_dependents: usize,
    cache: &'a CacheManager,
    _gate: MutexGuard<'a, ()>,
}

impl<'a> OntologyWriter<'a> {
    pub(crate) fn new(
        graph: &'a dyn GraphStore,
        auths: &'a Authorizations,
        visibility: &'a str,
        max_depth: usize,
        max_dependents: usize,
        cache: &'a CacheManager,
        gate: MutexGuard<'a, ()>,
    ) -> Self {
        Self {
            graph,
            auths,
            visibility,
            max_depth,
            max_dependents,
            cache,
            _gate: gate,
        }
    }

    pub fn graph(&self) -> &'a dyn GraphStore {
        self.graph
    }

    pub fn authorizations(&self) -> &'a Authorizations {
        self.auths
    }

    pub fn catalog(&self) -> PropertyCatalog<'a> {
        PropertyCatalog::new(self.graph, self.auths, self.visibility, self.max_dependents)
    }

    pub fn loader(&self) -> Loader<'a> {
        Loader::new(self.graph, self.auths, self.max_depth)
    }

    fn navigator(&self) -> HierarchyNavigator<'a> {
        HierarchyNavigator::new(self.graph, self.auths, self.max_depth)
    }

    /// Drop cached views now rather than when the writer goes away.
    pub fn invalidate_caches(&self) {
        self.cache.invalidate_all();
    }

    fn require(&self, kind: ElementKind, iri: &str) -> Result<String, OntologyError> {
        let id = codec::vertex_id(kind, iri);
        match self.graph.get_vertex(&id, self.auths)? {
            Some(_) => Ok(id),
            None => Err(OntologyError::NotFound {
                kind: kind.type_tag(),
                iri: iri.to_string(),
            }),
        }
    }

    fn set(&self, vertex_id: &str, name: &str, value: impl Into<PropertyValue>) -> Result<(), OntologyError> {
        self.graph
            .set_vertex_property(vertex_id, Property::new(name, value), self.auths)?;
        Ok(())
    }

    /// Create the vertex for an element or reuse the existing one.
    ///
    /// Returns the vertex id and whether it was created. With
    /// `reset_changeable` an existing vertex loses its changeable attributes.
    fn upsert_vertex(
        &self,
        kind: ElementKind,
        iri: &str,
        reset_changeable: bool,
    ) -> Result<(String, bool), OntologyError> {
        let id = codec::vertex_id(kind, iri);
        if let Some(existing) = self.graph.get_vertex(&id, self.auths)? {
            if reset_changeable {
                let mut removed = codec::delete_changeable_attributes(self.graph, &id, self.auths)?;
                let metadata: Vec<&str> = existing
                    .properties
                    .iter()
                    .filter(|p| p.name.starts_with(attr::META_PREFIX))
                    .map(|p| p.name.as_str())
                    .collect();
                for name in metadata {
                    removed += self.graph.soft_delete_vertex_property(&id, name, self.auths)?;
                }
                tracing::trace!(iri, removed, "reset changeable attributes");
            }
            return Ok((id, false));
        }
        self.graph.get_or_create_vertex(&id, self.visibility, self.auths)?;
        self.set(&id, attr::CONCEPT_TYPE, kind.type_tag())?;
        self.set(&id, attr::ONTOLOGY_TITLE, iri)?;
        Ok((id, true))
    }

    /// Add the is-a edge unless the node already has a parent.
    fn ensure_parent(&self, kind: ElementKind, id: &str, parent_id: &str) -> Result<(), OntologyError> {
        let nav = self.navigator();
        match nav.parent_of(id)? {
            None => {
                nav.link(id, parent_id, self.visibility)?;
            }
            Some(existing) if existing != parent_id => {
                tracing::warn!(
                    kind = kind.type_tag(),
                    iri = codec::display_iri(id),
                    stored = codec::display_iri(&existing),
                    declared = codec::display_iri(parent_id),
                    "parent differs from stored; keeping stored"
                );
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Find or create a concept under `parent_iri`.
    ///
    /// `None` makes a forest root. The parent must already exist.
    pub fn get_or_create_concept(
        &self,
        parent_iri: Option<&str>,
        iri: &str,
        display_name: Option<&str>,
    ) -> Result<Concept, OntologyError> {
        let id = self.upsert_concept(parent_iri, iri, display_name, false)?;
        self.concept_at(&id)
    }

    pub(crate) fn upsert_concept(
        &self,
        parent_iri: Option<&str>,
        iri: &str,
        display_name: Option<&str>,
        reset_changeable: bool,
    ) -> Result<String, OntologyError> {
        let parent_id = parent_iri
            .map(|p| self.require(ElementKind::Concept, p))
            .transpose()?;
        let (id, created) = self.upsert_vertex(ElementKind::Concept, iri, reset_changeable)?;
        if let Some(name) = display_name.map(str::trim).filter(|s| !s.is_empty()) {
            self.set(&id, attr::DISPLAY_NAME, name)?;
        }
        if let Some(parent_id) = &parent_id {
            self.ensure_parent(ElementKind::Concept, &id, parent_id)?;
        }
        // Formulas are changeable, so a reset entity gets its defaults back.
        if iri == ENTITY_CONCEPT_IRI && (created || reset_changeable) {
            self.set(&id, attr::TITLE_FORMULA, ENTITY_TITLE_FORMULA)?;
            self.set(&id, attr::SUBTITLE_FORMULA, ENTITY_SUBTITLE_FORMULA)?;
            self.set(&id, attr::TIME_FORMULA, ENTITY_TIME_FORMULA)?;
        }
        if created {
            tracing::info!(iri, parent = parent_iri.unwrap_or("-"), "created concept");
        }
        Ok(id)
    }

    fn concept_at(&self, id: &str) -> Result<Concept, OntologyError> {
        let loader = self.loader();
        let v = self.graph.get_vertex(id, self.auths)?.ok_or_else(|| OntologyError::NotFound {
            kind: ElementKind::Concept.type_tag(),
            iri: codec::display_iri(id).to_string(),
        })?;
        loader.concept_from(&v)
    }

    /// Find or create a relationship type and add its domain and range edges.
    ///
    /// `None` for the parent hangs the relationship under
    /// `owl:topObjectProperty`, which is created on first use. Domains and
    /// ranges must name existing concepts; edges already present are kept.
    pub fn get_or_create_relationship_type(
        &self,
        parent_iri: Option<&str>,
        domain_iris: &[String],
        range_iris: &[String],
        iri: &str,
    ) -> Result<Relationship, OntologyError> {
        let id = self.upsert_relationship(parent_iri, domain_iris, range_iris, iri, false)?;
        let v = self.graph.get_vertex(&id, self.auths)?.ok_or_else(|| OntologyError::NotFound {
            kind: ElementKind::Relationship.type_tag(),
            iri: iri.to_string(),
        })?;
        self.loader().relationship_from(&v)
    }

    pub(crate) fn upsert_relationship(
        &self,
        parent_iri: Option<&str>,
        domain_iris: &[String],
        range_iris: &[String],
        iri: &str,
        reset_changeable: bool,
    ) -> Result<String, OntologyError> {
        let parent_id = match parent_iri {
            Some(p) => Some(self.require(ElementKind::Relationship, p)?),
            None if iri == TOP_OBJECT_PROPERTY_IRI => None,
            None => Some(self.upsert_vertex(ElementKind::Relationship, TOP_OBJECT_PROPERTY_IRI, false)?.0),
        };
        let domain_ids = domain_iris
            .iter()
            .map(|d| self.require(ElementKind::Concept, d))
            .collect::<Result<Vec<_>, _>>()?;
        let range_ids = range_iris
            .iter()
            .map(|r| self.require(ElementKind::Concept, r))
            .collect::<Result<Vec<_>, _>>()?;

        let (id, created) = self.upsert_vertex(ElementKind::Relationship, iri, reset_changeable)?;
        if let Some(parent_id) = &parent_id {
            self.ensure_parent(ElementKind::Relationship, &id, parent_id)?;
        }
        for domain_id in &domain_ids {
            self.has_edge(domain_id, &id)?;
        }
        for range_id in &range_ids {
            self.has_edge(&id, range_id)?;
        }
        if created {
            tracing::info!(
                iri,
                domains = domain_ids.len(),
                ranges = range_ids.len(),
                "created relationship"
            );
        }
        Ok(id)
    }

    fn has_edge(&self, out_id: &str, in_id: &str) -> GraphResult<()> {
        self.graph.get_or_create_edge(
            &codec::edge_id(out_id, in_id),
            out_id,
            in_id,
            label::HAS_EDGE,
            self.visibility,
            self.auths,
        )?;
        Ok(())
    }

    /// Create or update a property and attach it to its owners.
    pub fn add_property_to(&self, spec: &NewProperty) -> Result<OntologyProperty, OntologyError> {
        let id = self.catalog().add_property_to(spec)?;
        let v = self.graph.get_vertex(&id, self.auths)?.ok_or_else(|| OntologyError::NotFound {
            kind: ElementKind::Property.type_tag(),
            iri: spec.iri.clone(),
        })?;
        self.loader().property_from(&v)
    }

    /// Replace the ordered dependent-property list of a property.
    pub fn update_property_dependent_iris(
        &self,
        property_iri: &str,
        dependent_iris: &[String],
    ) -> Result<(), OntologyError> {
        let id = self.require(ElementKind::Property, property_iri)?;
        self.catalog().set_dependent_properties(&id, dependent_iris)
    }

    /// Reconcile which concepts and relationships a property is attached to.
    pub fn update_property_domain_iris(
        &self,
        property_iri: &str,
        domain_iris: &[String],
    ) -> Result<(), OntologyError> {
        let id = self.require(ElementKind::Property, property_iri)?;
        self.catalog().update_domains(&id, domain_iris)
    }

    /// Add `property_iri` as a column of the table property `table_iri`.
    pub fn add_extended_data_table_property(
        &self,
        table_iri: &str,
        property_iri: &str,
    ) -> Result<(), OntologyError> {
        let table_id = self.require(ElementKind::Property, table_iri)?;
        let property_id = self.require(ElementKind::Property, property_iri)?;
        self.catalog().add_table_property(&table_id, &property_id)
    }

    /// Pair two relationships as inverses of each other.
    pub fn set_inverse_of(&self, iri: &str, inverse_iri: &str) -> Result<(), OntologyError> {
        let a = self.require(ElementKind::Relationship, iri)?;
        let b = self.require(ElementKind::Relationship, inverse_iri)?;
        for (out_id, in_id) in [(&a, &b), (&b, &a)] {
            self.graph.get_or_create_edge(
                &codec::edge_id(out_id, in_id),
                out_id,
                in_id,
                label::INVERSE_OF,
                self.visibility,
                self.auths,
            )?;
        }
        tracing::debug!(iri, inverse = inverse_iri, "linked inverse relationships");
        Ok(())
    }

    /// Set a single-valued attribute on an existing element.
    pub fn set_attribute(
        &self,
        kind: ElementKind,
        iri: &str,
        name: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<(), OntologyError> {
        let id = self.require(kind, iri)?;
        self.set(&id, name, value)
    }

    /// Store an annotation with no dedicated attribute on a concept.
    pub fn set_concept_metadata(&self, iri: &str, name: &str, value: &str) -> Result<(), OntologyError> {
        self.set_attribute(
            ElementKind::Concept,
            iri,
            &format!("{}{name}", attr::META_PREFIX),
            value,
        )
    }

    pub fn add_intent(&self, kind: ElementKind, iri: &str, intent: &str) -> Result<(), OntologyError> {
        let id = self.require(kind, iri)?;
        self.graph.set_vertex_property(
            &id,
            Property::new(attr::INTENT, intent).with_key(intent),
            self.auths,
        )?;
        Ok(())
    }

    /// Make the intents of an element exactly `intents`.
    ///
    /// Only the difference is written: stale intents are removed and missing
    /// ones added.
    pub fn update_intents(&self, kind: ElementKind, iri: &str, intents: &[String]) -> Result<(), OntologyError> {
        let id = self.require(kind, iri)?;
        let existing: Vec<String> = self
            .graph
            .get_vertex(&id, self.auths)?
            .map(|v| {
                v.property_values(attr::INTENT)
                    .filter_map(|p| p.value.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let mut removed = 0;
        for stale in existing.iter().filter(|i| !intents.contains(i)) {
            if self
                .graph
                .soft_delete_vertex_property_value(&id, stale, attr::INTENT, self.auths)?
            {
                removed += 1;
            }
        }
        let mut added = 0;
        for intent in intents.iter().filter(|i| !existing.contains(i)) {
            self.graph.set_vertex_property(
                &id,
                Property::new(attr::INTENT, intent.as_str()).with_key(intent.as_str()),
                self.auths,
            )?;
            added += 1;
        }
        tracing::debug!(iri, added, removed, "updated intents");
        Ok(())
    }

    /// Record the digest of an imported document on the root concept.
    ///
    /// The first import of a document IRI is assigned the next index; later
    /// imports keep it.
    pub fn record_document(&self, document_iri: &str, digest: &str) -> Result<(), OntologyError> {
        let root_id = self.require(ElementKind::Concept, super::ROOT_CONCEPT_IRI)?;
        let root = self.graph.get_vertex(&root_id, self.auths)?;
        let hashes: Vec<&Property> = root
            .as_ref()
            .map(|v| v.property_values(attr::ONTOLOGY_FILE_HASH).collect())
            .unwrap_or_default();
        let index = hashes
            .iter()
            .find(|p| p.key == document_iri)
            .and_then(|p| p.metadata.get(attr::DOCUMENT_INDEX))
            .and_then(PropertyValue::as_i64)
            .unwrap_or(hashes.len() as i64);
        self.graph.set_vertex_property(
            &root_id,
            Property::new(attr::ONTOLOGY_FILE_HASH, digest)
                .with_key(document_iri)
                .with_metadata(attr::DOCUMENT_INDEX, index),
            self.auths,
        )?;
        tracing::debug!(document = document_iri, index, "recorded ontology document");
        Ok(())
    }
}

impl Drop for OntologyWriter<'_> {
    fn drop(&mut self) {
        self.cache.invalidate_all();
    }
}

/// Stored digest of a document, if it was imported before.
pub fn stored_digest(
    graph: &dyn GraphStore,
    auths: &Authorizations,
    document_iri: &str,
) -> GraphResult<Option<String>> {
    let root = graph.get_vertex(&codec::concept_id(super::ROOT_CONCEPT_IRI), auths)?;
    Ok(root.and_then(|v| {
        v.property_values(attr::ONTOLOGY_FILE_HASH)
            .find(|p| p.key == document_iri)
            .and_then(|p| p.value.as_str().map(str::to_string))
    }))
}

/// Imported document IRIs in import order.
pub fn document_iris(graph: &dyn GraphStore, auths: &Authorizations) -> GraphResult<Vec<String>> {
    let Some(root) = graph.get_vertex(&codec::concept_id(super::ROOT_CONCEPT_IRI), auths)? else {
        return Ok(Vec::new());
    };
    let mut docs: Vec<(i64, String)> = root
        .property_values(attr::ONTOLOGY_FILE_HASH)
        .map(|p| {
            let index = p
                .metadata
                .get(attr::DOCUMENT_INDEX)
                .and_then(PropertyValue::as_i64)
                .unwrap_or(i64::MAX);
            (index, p.key.clone())
        })
        .collect();
    docs.sort();
    Ok(docs.into_iter().map(|(_, iri)| iri).collect())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::graph::{Direction, MemoryGraph};
    use crate::ontology::{PropertyType, ROOT_CONCEPT_IRI};
    use crate::ontology::catalog::DEFAULT_MAX_DEPENDENT_PROPERTIES;
    use crate::ontology::hierarchy::DEFAULT_MAX_DEPTH;

    struct Fixture {
        graph: MemoryGraph,
        auths: Authorizations,
        cache: CacheManager,
        gate: Mutex<()>,
    }

    impl Fixture {
        fn new() -> Self {
            let f = Self {
                graph: MemoryGraph::new(),
                auths: Authorizations::public(),
                cache: CacheManager::default(),
                gate: Mutex::new(()),
            };
            {
                let w = f.writer();
                w.upsert_concept(None, ROOT_CONCEPT_IRI, Some("root"), false).unwrap();
                w.upsert_concept(Some(ROOT_CONCEPT_IRI), ENTITY_CONCEPT_IRI, Some("thing"), false)
                    .unwrap();
            }
            f
        }

        fn writer(&self) -> OntologyWriter<'_> {
            OntologyWriter::new(
                &self.graph,
                &self.auths,
                "",
                DEFAULT_MAX_DEPTH,
                DEFAULT_MAX_DEPENDENT_PROPERTIES,
                &self.cache,
                self.gate.lock().unwrap(),
            )
        }
    }

    #[test]
    fn concept_creation_is_idempotent() {
        let f = Fixture::new();
        let w = f.writer();
        let first = w
            .get_or_create_concept(Some(ENTITY_CONCEPT_IRI), "Person", Some("Person"))
            .unwrap();
        let second = w
            .get_or_create_concept(Some(ENTITY_CONCEPT_IRI), "Person", Some("Person"))
            .unwrap();
        assert_eq!(first.vertex_id, second.vertex_id);
        assert_eq!(second.parent_iri.as_deref(), Some(ENTITY_CONCEPT_IRI));
        let parents = f
            .graph
            .edges(&first.vertex_id, Direction::Out, Some(label::IS_A), &f.auths)
            .unwrap();
        assert_eq!(parents.len(), 1);
    }

    #[test]
    fn entity_concept_gets_default_formulas() {
        let f = Fixture::new();
        let entity = f.writer().loader().concept(ENTITY_CONCEPT_IRI).unwrap().unwrap();
        assert_eq!(entity.title_formula.as_deref(), Some(ENTITY_TITLE_FORMULA));
        assert_eq!(entity.parent_iri.as_deref(), Some(ROOT_CONCEPT_IRI));
    }

    #[test]
    fn missing_parent_is_rejected() {
        let f = Fixture::new();
        let err = f
            .writer()
            .get_or_create_concept(Some("Ghost"), "Person", None)
            .unwrap_err();
        assert!(matches!(err, OntologyError::NotFound { kind: "concept", .. }));
    }

    #[test]
    fn relationship_defaults_under_top_object_property() {
        let f = Fixture::new();
        let w = f.writer();
        w.get_or_create_concept(Some(ENTITY_CONCEPT_IRI), "Person", None).unwrap();
        w.get_or_create_concept(Some(ENTITY_CONCEPT_IRI), "Company", None).unwrap();
        let rel = w
            .get_or_create_relationship_type(None, &["Person".into()], &["Company".into()], "worksFor")
            .unwrap();
        assert_eq!(rel.parent_iri.as_deref(), Some(TOP_OBJECT_PROPERTY_IRI));
        assert_eq!(rel.domain_iris, vec!["Person"]);
        assert_eq!(rel.range_iris, vec!["Company"]);
        let domain_edges = f
            .graph
            .vertex_ids(&rel.vertex_id, Direction::In, label::HAS_EDGE, &f.auths)
            .unwrap();
        assert_eq!(domain_edges, vec![codec::concept_id("Person")]);
    }

    #[test]
    fn inverse_is_symmetric() {
        let f = Fixture::new();
        let w = f.writer();
        w.get_or_create_relationship_type(None, &[], &[], "owns").unwrap();
        w.get_or_create_relationship_type(None, &[], &[], "ownedBy").unwrap();
        w.set_inverse_of("owns", "ownedBy").unwrap();
        let loader = w.loader();
        assert_eq!(loader.relationship("owns").unwrap().unwrap().inverse_of_iris, vec!["ownedBy"]);
        assert_eq!(loader.relationship("ownedBy").unwrap().unwrap().inverse_of_iris, vec!["owns"]);
    }

    #[test]
    fn update_intents_diffs() {
        let f = Fixture::new();
        let w = f.writer();
        w.get_or_create_concept(Some(ENTITY_CONCEPT_IRI), "Person", None).unwrap();
        w.add_intent(ElementKind::Concept, "Person", "person").unwrap();
        w.add_intent(ElementKind::Concept, "Person", "human").unwrap();
        w.update_intents(ElementKind::Concept, "Person", &["person".into(), "actor".into()])
            .unwrap();
        let mut intents = w.loader().concept("Person").unwrap().unwrap().intents;
        intents.sort();
        assert_eq!(intents, vec!["actor", "person"]);
    }

    #[test]
    fn documents_keep_their_first_index() {
        let f = Fixture::new();
        let w = f.writer();
        w.record_document("doc:a", "h1").unwrap();
        w.record_document("doc:b", "h2").unwrap();
        w.record_document("doc:a", "h3").unwrap();
        assert_eq!(document_iris(&f.graph, &f.auths).unwrap(), vec!["doc:a", "doc:b"]);
        assert_eq!(stored_digest(&f.graph, &f.auths, "doc:a").unwrap().as_deref(), Some("h3"));
        assert_eq!(stored_digest(&f.graph, &f.auths, "doc:c").unwrap(), None);
    }

    #[test]
    fn writer_drop_invalidates_cache() {
        let f = Fixture::new();
        f.cache
            .concepts(|| Ok::<_, OntologyError>(Vec::new()))
            .unwrap();
        {
            let w = f.writer();
            w.get_or_create_concept(Some(ENTITY_CONCEPT_IRI), "Person", None).unwrap();
        }
        let concepts = f
            .cache
            .concepts(|| Loader::new(&f.graph, &f.auths, DEFAULT_MAX_DEPTH).concepts())
            .unwrap();
        assert!(concepts.iter().any(|c| c.iri == "Person"));
    }

    #[test]
    fn property_round_trip_through_writer() {
        let f = Fixture::new();
        let w = f.writer();
        w.get_or_create_concept(Some(ENTITY_CONCEPT_IRI), "Person", None).unwrap();
        let p = w
            .add_property_to(&NewProperty::new("age", PropertyType::Integer).on_concept("Person"))
            .unwrap();
        assert_eq!(p.concept_iris, vec!["Person"]);
        assert_eq!(p.data_type, PropertyType::Integer);
    }
}
