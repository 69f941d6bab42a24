//! Persistence and recovery tests for the ontology repository.
//!
//! These tests verify that imported ontologies and direct mutations survive
//! a repository restart (flush + reopen cycle), and that failed imports
//! leave nothing behind on disk.

use std::path::{Path, PathBuf};

use ontograph::ontology::document::{ClassDecl, DataPropertyDecl, OntologyDocument};
use ontograph::ontology::{ENTITY_CONCEPT_IRI, PropertyType, ROOT_CONCEPT_IRI};
use ontograph::{OntologyRepository, RepositoryConfig};

const PEOPLE: &str = "http://example.org/people";

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn persistent_repo(dir: &Path) -> OntologyRepository {
    OntologyRepository::from_config(RepositoryConfig::with_data_dir(dir)).unwrap()
}

#[test]
fn imported_ontology_survives_restart() {
    let dir = tempfile::TempDir::new().unwrap();

    // First session: import.
    let concept_count = {
        let repo = persistent_repo(dir.path());
        let report = repo.import_file(&fixture("people.toml"), PEOPLE).unwrap();
        assert!(!report.skipped);
        repo.concepts_with_properties().unwrap().len()
    };

    // Second session: reopen and verify.
    {
        let repo = persistent_repo(dir.path());
        assert_eq!(repo.concepts_with_properties().unwrap().len(), concept_count);
        assert!(repo.is_ontology_defined(PEOPLE).unwrap());

        let age = repo
            .required_property("http://example.org/people#age")
            .unwrap();
        assert_eq!(age.data_type, PropertyType::Integer);

        let full_name = repo
            .required_property("http://example.org/people#fullName")
            .unwrap();
        assert_eq!(full_name.dependent_property_iris.len(), 2);

        // Same bytes, same digest: the second import is a no-op.
        let report = repo.import_file(&fixture("people.toml"), PEOPLE).unwrap();
        assert!(report.skipped);
    }
}

#[test]
fn well_known_concepts_are_not_duplicated_on_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    for _ in 0..3 {
        let repo = persistent_repo(dir.path());
        let concepts = repo.concepts_with_properties().unwrap();
        assert_eq!(concepts.len(), 2);
        assert!(concepts.iter().any(|c| c.iri == ROOT_CONCEPT_IRI));
        assert!(concepts.iter().any(|c| c.iri == ENTITY_CONCEPT_IRI));
    }
}

#[test]
fn direct_mutations_survive_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    {
        let repo = persistent_repo(dir.path());
        repo.get_or_create_concept(Some(ENTITY_CONCEPT_IRI), "urn:place", Some("Place"))
            .unwrap();
        repo.get_or_create_relationship_type(None, &["urn:place".into()], &["urn:place".into()], "urn:near")
            .unwrap();
    }
    {
        let repo = persistent_repo(dir.path());
        let place = repo.required_concept("urn:place").unwrap();
        assert_eq!(place.display_name.as_deref(), Some("Place"));
        let near = repo.required_relationship("urn:near").unwrap();
        assert_eq!(near.domain_iris, vec!["urn:place".to_string()]);
    }
}

#[test]
fn aborted_import_leaves_no_trace() {
    let dir = tempfile::TempDir::new().unwrap();
    let doc = OntologyDocument {
        classes: vec![ClassDecl {
            iri: "urn:thing".into(),
            super_classes: vec![],
            annotations: vec![],
        }],
        data_properties: vec![DataPropertyDecl {
            iri: "urn:weight".into(),
            domains: vec!["urn:thing".into()],
            ranges: vec!["urn:unknown-datatype".into()],
            annotations: vec![],
        }],
        ..Default::default()
    };

    {
        let repo = persistent_repo(dir.path());
        assert!(repo.import_document("urn:doc", &doc).is_err());
    }
    {
        let repo = persistent_repo(dir.path());
        assert!(repo.concept_by_iri("urn:thing").unwrap().is_none());
        assert!(!repo.is_ontology_defined("urn:doc").unwrap());
        assert!(repo.documents().unwrap().is_empty());
    }
}
