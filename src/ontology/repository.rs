//! Repository facade: the public API over the ontology graph.
//!
//! The `OntologyRepository` owns the graph handle, the caches and the write
//! gate. Aggregate reads go through the caches; every mutating call takes the
//! gate, writes, flushes and invalidates before it returns.

use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::config::RepositoryConfig;
use crate::error::{OntoResult, OntologyError};
use crate::graph::{Authorizations, GraphStore, MemoryGraph, PropertyValue};

use super::cache::CacheManager;
use super::catalog::NewProperty;
use super::client::ClientApiOntology;
use super::codec::{self, ElementKind};
use super::document::OntologyDocument;
use super::importer::{ImportReport, OntologyImporter};
use super::loader::Loader;
use super::writer::{self, OntologyWriter};
use super::{
    Concept, ENTITY_CONCEPT_IRI, OntologyProperty, ROOT_CONCEPT_IRI, Relationship,
};

/// Summary of the repository contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    pub durable: bool,
    pub concepts: usize,
    pub relationships: usize,
    pub properties: usize,
    pub documents: Vec<String>,
}

/// The ontology repository.
pub struct OntologyRepository {
    graph: Arc<dyn GraphStore>,
    auths: Authorizations,
    config: RepositoryConfig,
    cache: CacheManager,
    write_gate: Mutex<()>,
    durable: bool,
}

impl OntologyRepository {
    /// Open over an existing graph with public authorizations.
    ///
    /// Registers the attribute schema and makes sure the root and entity
    /// concepts exist.
    pub fn open(graph: Arc<dyn GraphStore>, config: RepositoryConfig) -> OntoResult<Self> {
        Self::open_with_authorizations(graph, config, Authorizations::public())
    }

    pub fn open_with_authorizations(
        graph: Arc<dyn GraphStore>,
        config: RepositoryConfig,
        auths: Authorizations,
    ) -> OntoResult<Self> {
        config.validate()?;
        let repo = Self {
            cache: CacheManager::new(config.cache_ttl()),
            durable: config.data_dir.is_some(),
            graph,
            auths,
            config,
            write_gate: Mutex::new(()),
        };
        let defined = codec::define_required_properties(repo.graph.as_ref())?;
        {
            let w = repo.writer();
            w.upsert_concept(None, ROOT_CONCEPT_IRI, Some("root"), false)?;
            w.upsert_concept(Some(ROOT_CONCEPT_IRI), ENTITY_CONCEPT_IRI, Some("thing"), false)?;
        }
        repo.graph.flush()?;
        tracing::info!(
            schema_defined = defined,
            ttl_secs = repo.config.cache_ttl_secs,
            "ontology repository opened"
        );
        Ok(repo)
    }

    /// Build the graph described by `config` and import its documents.
    pub fn from_config(config: RepositoryConfig) -> OntoResult<Self> {
        let graph: Arc<dyn GraphStore> = match &config.data_dir {
            Some(dir) => Arc::new(MemoryGraph::open(dir)?),
            None => Arc::new(MemoryGraph::new()),
        };
        let documents = config.documents.clone();
        let repo = Self::open(graph, config)?;
        for source in &documents {
            repo.import_file(&source.file, &source.iri)?;
        }
        Ok(repo)
    }

    pub fn graph(&self) -> &dyn GraphStore {
        self.graph.as_ref()
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn authorizations(&self) -> &Authorizations {
        &self.auths
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    fn loader(&self) -> Loader<'_> {
        Loader::new(self.graph.as_ref(), &self.auths, self.config.max_hierarchy_depth)
    }

    /// Take the write gate. Blocks while another writer of this repository
    /// is alive.
    pub fn writer(&self) -> OntologyWriter<'_> {
        let gate = self.write_gate.lock().expect("write gate poisoned");
        OntologyWriter::new(
            self.graph.as_ref(),
            &self.auths,
            &self.config.visibility,
            self.config.max_hierarchy_depth,
            self.config.max_dependent_properties,
            &self.cache,
            gate,
        )
    }

    /// Run one mutation under the gate, then flush.
    ///
    /// The writer is dropped, and the caches invalidated, before this returns.
    fn mutate<T>(&self, op: impl FnOnce(&OntologyWriter<'_>) -> Result<T, OntologyError>) -> OntoResult<T> {
        let value = {
            let w = self.writer();
            op(&w)?
        };
        self.graph.flush()?;
        Ok(value)
    }

    // ── Aggregate reads ─────────────────────────────────────────────────

    /// Every concept with its directly attached property IRIs.
    pub fn concepts_with_properties(&self) -> OntoResult<Arc<Vec<Concept>>> {
        Ok(self.cache.concepts(|| self.loader().concepts())?)
    }

    pub fn properties(&self) -> OntoResult<Arc<Vec<OntologyProperty>>> {
        Ok(self.cache.properties(|| self.loader().properties())?)
    }

    pub fn relationships(&self) -> OntoResult<Arc<Vec<Relationship>>> {
        Ok(self.cache.relationships(|| self.loader().relationships())?)
    }

    /// The serializable snapshot handed to presentation layers.
    pub fn client_api_object(&self) -> OntoResult<Arc<ClientApiOntology>> {
        self.cache.client(|| {
            let concepts = self.concepts_with_properties()?;
            let properties = self.properties()?;
            let relationships = self.relationships()?;
            Ok(ClientApiOntology::build(&concepts, &properties, &relationships))
        })
    }

    /// Flush pending graph writes and drop every cached view.
    pub fn clear_cache(&self) -> OntoResult<()> {
        self.graph.flush()?;
        self.cache.invalidate_all();
        tracing::debug!("ontology cache cleared");
        Ok(())
    }

    // ── Lookups ─────────────────────────────────────────────────────────

    pub fn concept_by_iri(&self, iri: &str) -> OntoResult<Option<Concept>> {
        Ok(self
            .concepts_with_properties()?
            .iter()
            .find(|c| c.iri == iri)
            .cloned())
    }

    pub fn property_by_iri(&self, iri: &str) -> OntoResult<Option<OntologyProperty>> {
        Ok(self.properties()?.iter().find(|p| p.iri == iri).cloned())
    }

    pub fn relationship_by_iri(&self, iri: &str) -> OntoResult<Option<Relationship>> {
        Ok(self
            .relationships()?
            .iter()
            .find(|r| r.iri == iri)
            .cloned())
    }

    pub fn required_concept(&self, iri: &str) -> OntoResult<Concept> {
        self.concept_by_iri(iri)?.ok_or_else(|| not_found(ElementKind::Concept, iri))
    }

    pub fn required_property(&self, iri: &str) -> OntoResult<OntologyProperty> {
        self.property_by_iri(iri)?.ok_or_else(|| not_found(ElementKind::Property, iri))
    }

    pub fn required_relationship(&self, iri: &str) -> OntoResult<Relationship> {
        self.relationship_by_iri(iri)?
            .ok_or_else(|| not_found(ElementKind::Relationship, iri))
    }

    pub fn root_concept(&self) -> OntoResult<Concept> {
        self.well_known(ROOT_CONCEPT_IRI)
    }

    pub fn entity_concept(&self) -> OntoResult<Concept> {
        self.well_known(ENTITY_CONCEPT_IRI)
    }

    fn well_known(&self, iri: &str) -> OntoResult<Concept> {
        self.concept_by_iri(iri)?.ok_or_else(|| {
            OntologyError::MissingWellKnownConcept {
                iri: iri.to_string(),
            }
            .into()
        })
    }

    // ── Hierarchy ───────────────────────────────────────────────────────

    pub fn parent_concept(&self, concept: &Concept) -> OntoResult<Option<Concept>> {
        match &concept.parent_iri {
            Some(parent) => self.concept_by_iri(parent),
            None => Ok(None),
        }
    }

    pub fn parent_relationship(&self, relationship: &Relationship) -> OntoResult<Option<Relationship>> {
        match &relationship.parent_iri {
            Some(parent) => self.relationship_by_iri(parent),
            None => Ok(None),
        }
    }

    /// Direct child concepts, in creation order.
    pub fn child_concepts(&self, iri: &str) -> OntoResult<Vec<Concept>> {
        let ids = self
            .loader()
            .navigator()
            .children_of(&codec::concept_id(iri))?;
        self.concepts_for_ids(&ids)
    }

    /// The concept followed by every descendant, breadth first.
    pub fn concept_and_all_children(&self, iri: &str) -> OntoResult<Vec<Concept>> {
        let root = self.required_concept(iri)?;
        let ids = self.loader().navigator().descendants(&root.vertex_id)?;
        let mut all = vec![root];
        all.extend(self.concepts_for_ids(&ids)?);
        Ok(all)
    }

    /// The concept followed by its ancestors up to the forest root.
    pub fn concept_and_ancestors(&self, iri: &str) -> OntoResult<Vec<Concept>> {
        let concept = self.required_concept(iri)?;
        let ids = self.loader().navigator().ancestors(&concept.vertex_id)?;
        let mut all = vec![concept];
        all.extend(self.concepts_for_ids(&ids)?);
        Ok(all)
    }

    pub fn relationship_and_all_children(&self, iri: &str) -> OntoResult<Vec<Relationship>> {
        let root = self.required_relationship(iri)?;
        let ids = self.loader().navigator().descendants(&root.vertex_id)?;
        let cached = self.relationships()?;
        let mut all = vec![root];
        for id in &ids {
            if let Some(r) = cached.iter().find(|r| &r.vertex_id == id) {
                all.push(r.clone());
            }
        }
        Ok(all)
    }

    fn concepts_for_ids(&self, ids: &[String]) -> OntoResult<Vec<Concept>> {
        let cached = self.concepts_with_properties()?;
        Ok(ids
            .iter()
            .filter_map(|id| cached.iter().find(|c| &c.vertex_id == id).cloned())
            .collect())
    }

    // ── Intents ─────────────────────────────────────────────────────────

    /// The concept playing `intent`.
    ///
    /// A configured override wins. Otherwise the single concept declaring the
    /// intent is returned; more than one is an error.
    pub fn concept_by_intent(&self, intent: &str) -> OntoResult<Option<Concept>> {
        if let Some(iri) = self.config.intents.concepts.get(intent) {
            return self.concept_by_iri(iri);
        }
        let concepts = self.concepts_with_properties()?;
        single_by_intent("concept", intent, concepts.iter().filter(|c| c.has_intent(intent)))
    }

    pub fn relationship_by_intent(&self, intent: &str) -> OntoResult<Option<Relationship>> {
        if let Some(iri) = self.config.intents.relationships.get(intent) {
            return self.relationship_by_iri(iri);
        }
        let relationships = self.relationships()?;
        single_by_intent(
            "relationship",
            intent,
            relationships.iter().filter(|r| r.has_intent(intent)),
        )
    }

    pub fn property_by_intent(&self, intent: &str) -> OntoResult<Option<OntologyProperty>> {
        if let Some(iri) = self.config.intents.properties.get(intent) {
            return self.property_by_iri(iri);
        }
        let properties = self.properties()?;
        single_by_intent("property", intent, properties.iter().filter(|p| p.has_intent(intent)))
    }

    pub fn required_concept_by_intent(&self, intent: &str) -> OntoResult<Concept> {
        self.concept_by_intent(intent)?
            .ok_or_else(|| intent_not_found("concept", intent))
    }

    pub fn required_relationship_by_intent(&self, intent: &str) -> OntoResult<Relationship> {
        self.relationship_by_intent(intent)?
            .ok_or_else(|| intent_not_found("relationship", intent))
    }

    pub fn required_property_by_intent(&self, intent: &str) -> OntoResult<OntologyProperty> {
        self.property_by_intent(intent)?
            .ok_or_else(|| intent_not_found("property", intent))
    }

    // ── Mutations ───────────────────────────────────────────────────────

    pub fn get_or_create_concept(
        &self,
        parent_iri: Option<&str>,
        iri: &str,
        display_name: Option<&str>,
    ) -> OntoResult<Concept> {
        self.mutate(|w| w.get_or_create_concept(parent_iri, iri, display_name))
    }

    pub fn get_or_create_relationship_type(
        &self,
        parent_iri: Option<&str>,
        domain_iris: &[String],
        range_iris: &[String],
        iri: &str,
    ) -> OntoResult<Relationship> {
        self.mutate(|w| w.get_or_create_relationship_type(parent_iri, domain_iris, range_iris, iri))
    }

    pub fn add_property_to(&self, spec: &NewProperty) -> OntoResult<OntologyProperty> {
        self.mutate(|w| w.add_property_to(spec))
    }

    pub fn update_property_dependent_iris(&self, property_iri: &str, dependent_iris: &[String]) -> OntoResult<()> {
        self.mutate(|w| w.update_property_dependent_iris(property_iri, dependent_iris))
    }

    pub fn update_property_domain_iris(&self, property_iri: &str, domain_iris: &[String]) -> OntoResult<()> {
        self.mutate(|w| w.update_property_domain_iris(property_iri, domain_iris))
    }

    pub fn add_extended_data_table_property(&self, table_iri: &str, property_iri: &str) -> OntoResult<()> {
        self.mutate(|w| w.add_extended_data_table_property(table_iri, property_iri))
    }

    pub fn set_inverse_of(&self, iri: &str, inverse_iri: &str) -> OntoResult<()> {
        self.mutate(|w| w.set_inverse_of(iri, inverse_iri))
    }

    pub fn update_intents(&self, kind: ElementKind, iri: &str, intents: &[String]) -> OntoResult<()> {
        self.mutate(|w| w.update_intents(kind, iri, intents))
    }

    // ── Values ──────────────────────────────────────────────────────────

    /// Check that a value for `property_iri` carries one entry per dependent.
    pub fn validate_dependent_values<T>(&self, property_iri: &str, values: &[T]) -> OntoResult<()> {
        Ok(self
            .required_property(property_iri)?
            .validate_dependent_values(values)?)
    }

    pub fn convert_string(&self, property_iri: &str, raw: &str) -> OntoResult<PropertyValue> {
        Ok(self.required_property(property_iri)?.convert_string(raw)?)
    }

    // ── Documents ───────────────────────────────────────────────────────

    /// Import a parsed document, skipping it if its digest is unchanged.
    pub fn import_document(&self, document_iri: &str, doc: &OntologyDocument) -> OntoResult<ImportReport> {
        let w = self.writer();
        let report = OntologyImporter::new(&w).import(document_iri, doc)?;
        drop(w);
        self.graph.flush()?;
        Ok(report)
    }

    /// Load a TOML or JSON document from disk and import it.
    pub fn import_file(&self, path: &Path, document_iri: &str) -> OntoResult<ImportReport> {
        let doc = OntologyDocument::load(path)?;
        self.import_document(document_iri, &doc)
    }

    pub fn is_ontology_defined(&self, document_iri: &str) -> OntoResult<bool> {
        Ok(writer::stored_digest(self.graph(), &self.auths, document_iri)?.is_some())
    }

    pub fn has_document_changed(&self, document_iri: &str, doc: &OntologyDocument) -> OntoResult<bool> {
        let stored = writer::stored_digest(self.graph(), &self.auths, document_iri)?;
        Ok(stored.as_deref() != Some(doc.digest().as_str()))
    }

    /// Imported document IRIs in import order.
    pub fn documents(&self) -> OntoResult<Vec<String>> {
        Ok(writer::document_iris(self.graph(), &self.auths)?)
    }

    pub fn info(&self) -> OntoResult<RepositoryInfo> {
        Ok(RepositoryInfo {
            durable: self.durable,
            concepts: self.concepts_with_properties()?.len(),
            relationships: self.relationships()?.len(),
            properties: self.properties()?.len(),
            documents: self.documents()?,
        })
    }
}

impl std::fmt::Debug for OntologyRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OntologyRepository")
            .field("durable", &self.durable)
            .field("ttl", &self.cache.ttl())
            .finish_non_exhaustive()
    }
}

fn not_found(kind: ElementKind, iri: &str) -> crate::error::OntoError {
    OntologyError::NotFound {
        kind: kind.type_tag(),
        iri: iri.to_string(),
    }
    .into()
}

fn intent_not_found(kind: &'static str, intent: &str) -> crate::error::OntoError {
    OntologyError::NotFound {
        kind,
        iri: format!("intent:{intent}"),
    }
    .into()
}

fn single_by_intent<'t, T: Clone + 't>(
    kind: &'static str,
    intent: &str,
    mut matches: impl Iterator<Item = &'t T>,
) -> OntoResult<Option<T>> {
    let Some(first) = matches.next() else {
        return Ok(None);
    };
    let rest = matches.count();
    if rest > 0 {
        return Err(OntologyError::AmbiguousIntent {
            kind,
            intent: intent.to_string(),
            count: rest + 1,
        }
        .into());
    }
    Ok(Some(first.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OntoError;
    use crate::ontology::PropertyType;

    fn repo() -> OntologyRepository {
        OntologyRepository::open(Arc::new(MemoryGraph::new()), RepositoryConfig::in_memory()).unwrap()
    }

    #[test]
    fn open_bootstraps_well_known_concepts() {
        let repo = repo();
        let root = repo.root_concept().unwrap();
        assert_eq!(root.display_name.as_deref(), Some("root"));
        assert_eq!(root.parent_iri, None);
        let entity = repo.entity_concept().unwrap();
        assert_eq!(entity.parent_iri.as_deref(), Some(ROOT_CONCEPT_IRI));
    }

    #[test]
    fn reopening_over_same_graph_is_a_no_op() {
        let graph: Arc<dyn GraphStore> = Arc::new(MemoryGraph::new());
        let first = OntologyRepository::open(Arc::clone(&graph), RepositoryConfig::in_memory()).unwrap();
        let before = first.concepts_with_properties().unwrap().len();
        let second = OntologyRepository::open(graph, RepositoryConfig::in_memory()).unwrap();
        assert_eq!(second.concepts_with_properties().unwrap().len(), before);
    }

    #[test]
    fn ambiguous_intent_is_an_error() {
        let repo = repo();
        for iri in ["a", "b"] {
            repo.get_or_create_concept(Some(ENTITY_CONCEPT_IRI), iri, None).unwrap();
            repo.update_intents(ElementKind::Concept, iri, &["shared".into()]).unwrap();
        }
        let err = repo.concept_by_intent("shared").unwrap_err();
        assert!(matches!(
            err,
            OntoError::Ontology(OntologyError::AmbiguousIntent { count: 2, .. })
        ));
        assert!(repo.concept_by_intent("nobody").unwrap().is_none());
        assert!(repo.required_concept_by_intent("nobody").is_err());
    }

    #[test]
    fn configured_intent_override_wins() {
        let mut config = RepositoryConfig::in_memory();
        config.intents.concepts.insert("shared".into(), "b".into());
        let repo = OntologyRepository::open(Arc::new(MemoryGraph::new()), config).unwrap();
        for iri in ["a", "b"] {
            repo.get_or_create_concept(Some(ENTITY_CONCEPT_IRI), iri, None).unwrap();
            repo.update_intents(ElementKind::Concept, iri, &["shared".into()]).unwrap();
        }
        assert_eq!(repo.concept_by_intent("shared").unwrap().unwrap().iri, "b");
    }

    #[test]
    fn hierarchy_helpers_walk_both_ways() {
        let repo = repo();
        repo.get_or_create_concept(Some(ENTITY_CONCEPT_IRI), "Person", None).unwrap();
        repo.get_or_create_concept(Some("Person"), "Employee", None).unwrap();
        repo.get_or_create_concept(Some("Employee"), "Manager", None).unwrap();

        let down: Vec<String> = repo
            .concept_and_all_children("Person")
            .unwrap()
            .into_iter()
            .map(|c| c.iri)
            .collect();
        assert_eq!(down, vec!["Person", "Employee", "Manager"]);

        let up: Vec<String> = repo
            .concept_and_ancestors("Manager")
            .unwrap()
            .into_iter()
            .map(|c| c.iri)
            .collect();
        assert_eq!(
            up,
            vec!["Manager", "Employee", "Person", ENTITY_CONCEPT_IRI, ROOT_CONCEPT_IRI]
        );

        let manager = repo.required_concept("Manager").unwrap();
        assert_eq!(repo.parent_concept(&manager).unwrap().unwrap().iri, "Employee");
        assert_eq!(repo.child_concepts("Person").unwrap().len(), 1);
    }

    #[test]
    fn validate_dependent_values_uses_declared_count() {
        let repo = repo();
        repo.get_or_create_concept(Some(ENTITY_CONCEPT_IRI), "Person", None).unwrap();
        for iri in ["first", "last", "name"] {
            repo.add_property_to(&NewProperty::new(iri, PropertyType::String).on_concept("Person"))
                .unwrap();
        }
        repo.update_property_dependent_iris("name", &["first".into(), "last".into()])
            .unwrap();
        assert!(repo.validate_dependent_values("name", &["Ada", "Lovelace"]).is_ok());
        let err = repo.validate_dependent_values("name", &["Ada"]).unwrap_err();
        assert!(matches!(
            err,
            OntoError::Ontology(OntologyError::DependentValueCountMismatch { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn client_snapshot_is_cached_until_a_write() {
        let repo = repo();
        let first = repo.client_api_object().unwrap();
        assert!(Arc::ptr_eq(&first, &repo.client_api_object().unwrap()));
        repo.get_or_create_concept(Some(ENTITY_CONCEPT_IRI), "Person", None).unwrap();
        let second = repo.client_api_object().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.concepts.iter().any(|c| c.title == "Person"));
    }

    #[test]
    fn relationship_children() {
        let repo = repo();
        repo.get_or_create_relationship_type(None, &[], &[], "knows").unwrap();
        repo.get_or_create_relationship_type(Some("knows"), &[], &[], "friendOf").unwrap();
        let all: Vec<String> = repo
            .relationship_and_all_children("knows")
            .unwrap()
            .into_iter()
            .map(|r| r.iri)
            .collect();
        assert_eq!(all, vec!["knows", "friendOf"]);
        let friend = repo.required_relationship("friendOf").unwrap();
        assert_eq!(repo.parent_relationship(&friend).unwrap().unwrap().iri, "knows");
    }
}
