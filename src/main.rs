//! ontograph CLI: inspect and populate an ontology repository.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use ontograph::ontology::Concept;
use ontograph::{OntologyRepository, RepositoryConfig};

#[derive(Parser)]
#[command(name = "ontograph", version, about = "Ontology repository over a property graph")]
struct Cli {
    /// Repository config file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for persistent storage. Overrides the config file.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a TOML or JSON ontology document.
    Import {
        /// Path to the document.
        file: PathBuf,

        /// IRI the document is registered under.
        #[arg(long)]
        iri: String,
    },

    /// List concepts as an indented hierarchy.
    Concepts,

    /// List properties with their data types.
    Properties,

    /// List relationship types with domains and ranges.
    Relationships,

    /// Show details of a concept.
    Concept {
        /// Concept IRI.
        iri: String,
    },

    /// Print the client ontology snapshot as JSON.
    Export,

    /// Show repository info and statistics.
    Info,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RepositoryConfig::load(path).into_diagnostic()?,
        None => RepositoryConfig::default(),
    };
    if cli.data_dir.is_some() {
        config.data_dir = cli.data_dir.clone();
    }
    let repo = OntologyRepository::from_config(config).into_diagnostic()?;

    match cli.command {
        Commands::Import { file, iri } => {
            let report = repo.import_file(&file, &iri).into_diagnostic()?;
            if report.skipped {
                println!("{iri} is unchanged, nothing imported.");
            } else {
                println!("Imported {iri} from {}", file.display());
                println!("  concepts:              {}", report.concepts);
                println!("  properties:            {}", report.properties);
                println!("  relationships:         {}", report.relationships);
                println!("  inverses:              {}", report.inverses);
                println!("  annotation properties: {}", report.annotation_properties);
                println!("  elapsed:               {:?}", report.elapsed);
            }
        }

        Commands::Concepts => {
            let concepts = repo.concepts_with_properties().into_diagnostic()?;
            let root = repo.root_concept().into_diagnostic()?;
            print_tree(&concepts, &root, 0);
        }

        Commands::Properties => {
            let properties = repo.properties().into_diagnostic()?;
            println!("Properties ({}):", properties.len());
            for p in properties.iter() {
                println!("  {} [{}]", p.iri, p.data_type);
                if !p.dependent_property_iris.is_empty() {
                    println!("    dependents: {}", p.dependent_property_iris.join(", "));
                }
            }
        }

        Commands::Relationships => {
            let relationships = repo.relationships().into_diagnostic()?;
            println!("Relationships ({}):", relationships.len());
            for r in relationships.iter() {
                println!(
                    "  {} ({} -> {})",
                    r.iri,
                    r.domain_iris.join(", "),
                    r.range_iris.join(", ")
                );
            }
        }

        Commands::Concept { iri } => {
            let concept = repo.required_concept(&iri).into_diagnostic()?;
            println!("Concept: \"{}\"", concept.title());
            println!("  iri:        {}", concept.iri);
            println!("  vertex id:  {}", concept.vertex_id);
            if let Some(parent) = &concept.parent_iri {
                println!("  parent:     {parent}");
            }
            if !concept.intents.is_empty() {
                println!("  intents:    {}", concept.intents.join(", "));
            }
            let ancestors = repo.concept_and_ancestors(&iri).into_diagnostic()?;
            let inherited: Vec<&str> = ancestors
                .iter()
                .skip(1)
                .flat_map(|c| c.property_iris.iter().map(String::as_str))
                .collect();
            if !concept.property_iris.is_empty() {
                println!("  properties ({}):", concept.property_iris.len());
                for p in &concept.property_iris {
                    println!("    {p}");
                }
            }
            if !inherited.is_empty() {
                println!("  inherited properties ({}):", inherited.len());
                for p in inherited {
                    println!("    {p}");
                }
            }
        }

        Commands::Export => {
            let snapshot = repo.client_api_object().into_diagnostic()?;
            let json = snapshot.to_json_pretty().into_diagnostic()?;
            println!("{json}");
        }

        Commands::Info => {
            let info = repo.info().into_diagnostic()?;
            println!("ontograph repository");
            println!("  durable:       {}", info.durable);
            println!("  concepts:      {}", info.concepts);
            println!("  relationships: {}", info.relationships);
            println!("  properties:    {}", info.properties);
            if info.documents.is_empty() {
                println!("  documents:     none");
            } else {
                println!("  documents:");
                for doc in &info.documents {
                    println!("    {doc}");
                }
            }
        }
    }

    Ok(())
}

fn print_tree(concepts: &[Concept], node: &Concept, depth: usize) {
    println!("{}{} ({})", "  ".repeat(depth), node.title(), node.iri);
    for child in concepts
        .iter()
        .filter(|c| c.parent_iri.as_deref() == Some(node.iri.as_str()))
    {
        print_tree(concepts, child, depth + 1);
    }
}
