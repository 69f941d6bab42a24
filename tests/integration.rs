//! End-to-end integration tests for the ontology repository.
//!
//! These tests drive the public facade: document import, cached reads,
//! hierarchy walks, intents and the client snapshot, over an in-memory
//! graph.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ontograph::error::{ImportError, OntoError, OntologyError};
use ontograph::graph::{Authorizations, GraphStore, MemoryGraph};
use ontograph::ontology::catalog::NewProperty;
use ontograph::ontology::codec::{self, label};
use ontograph::ontology::document::{Annotation, ClassDecl, OntologyDocument};
use ontograph::ontology::{ENTITY_CONCEPT_IRI, PropertyType, ROOT_CONCEPT_IRI};
use ontograph::{OntologyRepository, RepositoryConfig};

const PEOPLE: &str = "http://example.org/people";

fn people(name: &str) -> String {
    format!("{PEOPLE}#{name}")
}

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn test_repo() -> OntologyRepository {
    OntologyRepository::open(Arc::new(MemoryGraph::new()), RepositoryConfig::in_memory()).unwrap()
}

fn people_repo() -> OntologyRepository {
    let repo = test_repo();
    repo.import_file(&fixture("people.toml"), PEOPLE).unwrap();
    repo
}

#[test]
fn end_to_end_import_and_read_back() {
    let repo = people_repo();

    let person = repo.required_concept(&people("Person")).unwrap();
    assert_eq!(person.display_name.as_deref(), Some("Person"));
    assert_eq!(person.parent_iri.as_deref(), Some(ENTITY_CONCEPT_IRI));
    assert_eq!(person.color.as_deref(), Some("rgb(28, 137, 28)"));
    assert!(person.property_iris.contains(&people("age")));

    let age = repo.required_property(&people("age")).unwrap();
    assert_eq!(age.data_type, PropertyType::Integer);
    assert_eq!(age.display_name.as_deref(), Some("Age"));
    assert!(age.flags.sortable);
    assert_eq!(age.concept_iris, vec![people("Person")]);

    let works_for = repo.required_relationship(&people("worksFor")).unwrap();
    assert_eq!(works_for.display_name.as_deref(), Some("Works For"));
    assert_eq!(works_for.domain_iris, vec![people("Employee")]);
    assert_eq!(works_for.range_iris, vec![people("Company")]);
    assert_eq!(works_for.inverse_of_iris, vec![people("employs")]);

    let employs = repo.required_relationship(&people("employs")).unwrap();
    assert_eq!(employs.inverse_of_iris, vec![people("worksFor")]);

    assert_eq!(repo.documents().unwrap(), vec![PEOPLE.to_string()]);
}

#[test]
fn person_with_age_through_direct_calls() {
    let repo = test_repo();
    let create = |repo: &OntologyRepository| {
        let person = repo
            .get_or_create_concept(Some(ENTITY_CONCEPT_IRI), &people("Person"), Some("Person"))
            .unwrap();
        let age = repo
            .add_property_to(
                &NewProperty::new(people("age"), PropertyType::Integer).on_concept(people("Person")),
            )
            .unwrap();
        (person.vertex_id, age.vertex_id)
    };

    let first = create(&repo);
    let snapshot = repo.concepts_with_properties().unwrap();
    let person = snapshot.iter().find(|c| c.iri == people("Person")).unwrap();
    assert_eq!(person.property_iris, vec![people("age")]);

    let second = create(&repo);
    assert_eq!(first, second);
    assert_eq!(repo.concepts_with_properties().unwrap(), snapshot);
    assert_eq!(repo.properties().unwrap().len(), 1);
}

#[test]
fn reimporting_unchanged_document_is_skipped() {
    let repo = people_repo();
    let before = repo.client_api_object().unwrap();

    let report = repo.import_file(&fixture("people.toml"), PEOPLE).unwrap();
    assert!(report.skipped);
    assert_eq!(report.concepts, 0);

    // Nothing was written, so the cached snapshot is still current.
    assert!(Arc::ptr_eq(&before, &repo.client_api_object().unwrap()));
    assert!(repo.is_ontology_defined(PEOPLE).unwrap());
}

#[test]
fn changed_document_is_reimported_without_duplicates() {
    let repo = people_repo();
    let mut doc = OntologyDocument::load(&fixture("people.toml")).unwrap();
    assert!(!repo.has_document_changed(PEOPLE, &doc).unwrap());

    doc.classes.push(ClassDecl {
        iri: people("Contractor"),
        super_classes: vec![people("Person")],
        annotations: vec![],
    });
    assert!(repo.has_document_changed(PEOPLE, &doc).unwrap());

    let concepts_before = repo.concepts_with_properties().unwrap().len();
    let report = repo.import_document(PEOPLE, &doc).unwrap();
    assert!(!report.skipped);
    assert_eq!(repo.concepts_with_properties().unwrap().len(), concepts_before + 1);

    let age = repo.required_property(&people("age")).unwrap();
    assert_eq!(age.concept_iris, vec![people("Person")]);
    assert_eq!(repo.documents().unwrap(), vec![PEOPLE.to_string()]);
}

#[test]
fn dependent_properties_keep_declared_order() {
    let repo = people_repo();
    let full_name = repo.required_property(&people("fullName")).unwrap();
    assert_eq!(
        full_name.dependent_property_iris,
        vec![people("firstName"), people("lastName")]
    );

    repo.validate_dependent_values(&people("fullName"), &["Ada", "Lovelace"])
        .unwrap();
    let err = repo
        .validate_dependent_values(&people("fullName"), &["Ada"])
        .unwrap_err();
    assert!(matches!(
        err,
        OntoError::Ontology(OntologyError::DependentValueCountMismatch { expected: 2, actual: 1, .. })
    ));

    repo.update_property_dependent_iris(&people("fullName"), &[people("lastName")])
        .unwrap();
    let full_name = repo.required_property(&people("fullName")).unwrap();
    assert_eq!(full_name.dependent_property_iris, vec![people("lastName")]);
}

#[test]
fn hierarchy_walks_through_the_facade() {
    let repo = people_repo();

    let up: Vec<String> = repo
        .concept_and_ancestors(&people("Employee"))
        .unwrap()
        .into_iter()
        .map(|c| c.iri)
        .collect();
    assert_eq!(
        up,
        vec![
            people("Employee"),
            people("Person"),
            ENTITY_CONCEPT_IRI.to_string(),
            ROOT_CONCEPT_IRI.to_string(),
        ]
    );

    let entity_tree = repo.concept_and_all_children(ENTITY_CONCEPT_IRI).unwrap();
    assert!(entity_tree.iter().any(|c| c.iri == people("Employee")));
    assert!(entity_tree.iter().any(|c| c.iri == people("Company")));
}

#[test]
fn writes_are_visible_to_the_next_read() {
    let repo = people_repo();
    let concepts = repo.concepts_with_properties().unwrap();
    assert!(!concepts.iter().any(|c| c.iri == people("Manager")));

    repo.get_or_create_concept(Some(&people("Employee")), &people("Manager"), Some("Manager"))
        .unwrap();
    repo.add_property_to(
        &NewProperty::new(people("reports"), PropertyType::Integer).on_concept(people("Manager")),
    )
    .unwrap();

    let manager = repo.required_concept(&people("Manager")).unwrap();
    assert_eq!(manager.property_iris, vec![people("reports")]);
    assert!(repo.property_by_iri(&people("reports")).unwrap().is_some());
}

#[test]
fn ambiguous_parent_surfaces_on_read() {
    let repo = people_repo();
    let auths = Authorizations::public();
    let employee = codec::concept_id(&people("Employee"));
    let company = codec::concept_id(&people("Company"));
    repo.graph()
        .get_or_create_edge(
            &codec::edge_id(&employee, &company),
            &employee,
            &company,
            label::IS_A,
            "",
            &auths,
        )
        .unwrap();
    repo.clear_cache().unwrap();

    let err = repo.concepts_with_properties().unwrap_err();
    assert!(matches!(
        err,
        OntoError::Ontology(OntologyError::AmbiguousParent { count: 2, .. })
    ));
}

#[test]
fn intents_resolve_to_single_elements() {
    let repo = people_repo();
    assert_eq!(
        repo.required_concept_by_intent("person").unwrap().iri,
        people("Person")
    );
    assert_eq!(
        repo.required_relationship_by_intent("employment").unwrap().iri,
        people("worksFor")
    );
    assert_eq!(
        repo.property_by_intent("name").unwrap().map(|p| p.iri),
        Some(people("fullName"))
    );
    assert!(repo.relationship_by_intent("unused").unwrap().is_none());
}

#[test]
fn client_snapshot_serializes_to_json() {
    let repo = people_repo();
    let json: serde_json::Value =
        serde_json::from_str(&repo.client_api_object().unwrap().to_json_pretty().unwrap()).unwrap();

    let concepts = json["concepts"].as_array().unwrap();
    let employee = concepts
        .iter()
        .find(|c| c["title"] == people("Employee"))
        .unwrap();
    assert_eq!(employee["parentConcept"], people("Person"));
    assert_eq!(employee["pluralDisplayName"], "Employees");

    let relationships = json["relationships"].as_array().unwrap();
    let works_for = relationships
        .iter()
        .find(|r| r["title"] == people("worksFor"))
        .unwrap();
    assert_eq!(works_for["inverseOfs"][0]["iri"], people("employs"));
}

#[test]
fn failed_import_rolls_back() {
    let repo = test_repo();
    let doc = OntologyDocument {
        classes: vec![
            ClassDecl {
                iri: people("Person"),
                super_classes: vec![],
                annotations: vec![Annotation::new(
                    "http://www.w3.org/2000/01/rdf-schema#label",
                    "Person",
                )],
            },
            ClassDecl {
                iri: people("Hybrid"),
                super_classes: vec![people("Person"), ENTITY_CONCEPT_IRI.to_string()],
                annotations: vec![],
            },
        ],
        ..Default::default()
    };

    let err = repo.import_document(PEOPLE, &doc).unwrap_err();
    assert!(matches!(
        err,
        OntoError::Import(ImportError::MultipleSuperClasses { count: 2, .. })
    ));
    assert!(repo.concept_by_iri(&people("Person")).unwrap().is_none());
    assert!(!repo.is_ontology_defined(PEOPLE).unwrap());
}

#[test]
fn from_config_imports_listed_documents() {
    let dir = tempfile::TempDir::new().unwrap();
    let config_path = dir.path().join("ontograph.toml");
    std::fs::copy(fixture("people.toml"), dir.path().join("people.toml")).unwrap();
    std::fs::write(
        &config_path,
        format!(
            "cache_ttl_secs = 60\n\n[[documents]]\niri = \"{PEOPLE}\"\nfile = \"people.toml\"\n\n\
             [intents.concepts]\nperson = \"{}\"\n",
            people("Employee")
        ),
    )
    .unwrap();

    let config = RepositoryConfig::load(&config_path).unwrap();
    let repo = OntologyRepository::from_config(config).unwrap();
    assert!(repo.is_ontology_defined(PEOPLE).unwrap());
    // The configured pin wins over the intent declared on Person.
    assert_eq!(
        repo.required_concept_by_intent("person").unwrap().iri,
        people("Employee")
    );
}

#[test]
fn concurrent_readers_and_writers_agree_on_dependents() {
    let repo = Arc::new(people_repo());
    let full_name = people("fullName");
    let both = vec![people("firstName"), people("lastName")];
    let last_only = vec![people("lastName")];

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let repo = Arc::clone(&repo);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let concepts = repo.concepts_with_properties().unwrap();
                    assert!(concepts.iter().any(|c| c.iri == people("Person")));
                    let snapshot = repo.client_api_object().unwrap();
                    assert!(!snapshot.properties.is_empty());
                }
            })
        })
        .collect();

    let writers: Vec<_> = [both.clone(), last_only.clone()]
        .into_iter()
        .map(|dependents| {
            let repo = Arc::clone(&repo);
            let full_name = full_name.clone();
            std::thread::spawn(move || {
                for _ in 0..25 {
                    repo.update_property_dependent_iris(&full_name, &dependents)
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in readers.into_iter().chain(writers) {
        handle.join().unwrap();
    }

    let settled = repo.required_property(&full_name).unwrap().dependent_property_iris;
    assert!(settled == both || settled == last_only, "mixed dependents: {settled:?}");

    // A write after the race is observed by the very next read.
    repo.update_property_dependent_iris(&full_name, &last_only).unwrap();
    assert_eq!(
        repo.required_property(&full_name).unwrap().dependent_property_iris,
        last_only
    );
    let snapshot = repo.client_api_object().unwrap();
    let client_full_name = snapshot
        .properties
        .iter()
        .find(|p| p.title == full_name)
        .unwrap();
    assert_eq!(client_full_name.dependent_property_iris, last_only);
}
