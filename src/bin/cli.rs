//! `mnemo` CLI: a thin `clap` binary over the memory engine

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mnemo::config::{ContextConfig, DecayConfig, FusionConfig, ScoringConfig, StorageConfig};
use mnemo::embedding::{Embedder, HttpEmbedder, NullEmbedder};
use mnemo::error::Result;
use mnemo::storage::{Store, SCHEMA_VERSION};
use mnemo::types::FactType;

#[derive(Parser)]
#[command(name = "mnemo")]
#[command(about = "Local knowledge-graph memory engine for an AI coding assistant")]
#[command(version)]
struct Cli {
    #[arg(long, env = "CLAUDE_MEMORY_DB")]
    db_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Entity operations
    Entity {
        #[command(subcommand)]
        action: EntityAction,
    },
    /// Observation operations
    Obs {
        #[command(subcommand)]
        action: ObsAction,
    },
    /// Relation operations
    Rel {
        #[command(subcommand)]
        action: RelAction,
    },
    /// Lexical search over observation content and entity names
    Search {
        query: String,
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// FTS + vector hybrid search
    HybridSearch {
        query: String,
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Print the full entity/relation graph as JSON
    Graph,
    /// Create the database and apply all migrations
    Init,
    /// Recompute and print the schema version
    Upgrade,
    /// Import a graph dump from a prior tool's export
    Migrate {
        #[arg(long)]
        from: String,
    },
    /// Embedding provider operations
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },
    /// Importance scoring operations
    Importance {
        #[command(subcommand)]
        action: ImportanceAction,
    },
    /// Assemble context for injection into a prompt
    Context {
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        token_budget: Option<usize>,
    },
    /// Decay and archival maintenance
    Decay {
        #[command(subcommand)]
        action: DecayAction,
    },
    /// Session-scope (container tag) operations
    Workdir {
        #[command(subcommand)]
        action: WorkdirAction,
    },
    /// Print schema version and basic counts
    Stats,
}

#[derive(Subcommand)]
enum EntityAction {
    Create {
        name: String,
        #[arg(short = 't', long, default_value = "note")]
        entity_type: String,
        #[arg(short, long)]
        observation: Vec<String>,
    },
    Get {
        name: String,
    },
    List {
        #[arg(short = 't', long)]
        entity_type: Option<String>,
    },
    Delete {
        name: String,
    },
}

#[derive(Subcommand)]
enum ObsAction {
    Add {
        entity: String,
        content: String,
        #[arg(short, long, default_value = "dynamic")]
        fact_type: String,
    },
    Delete {
        entity: String,
        content: String,
    },
}

#[derive(Subcommand)]
enum RelAction {
    Create {
        from: String,
        to: String,
        relation_type: String,
    },
    List {
        entity: String,
    },
    Delete {
        from: String,
        to: String,
        relation_type: String,
    },
}

#[derive(Subcommand)]
enum EmbedAction {
    Test,
    Generate,
    Stats,
}

#[derive(Subcommand)]
enum ImportanceAction {
    Recalculate,
    Stats,
}

#[derive(Subcommand)]
enum DecayAction {
    Stats,
    Apply,
    Archive,
    Forget,
}

#[derive(Subcommand)]
enum WorkdirAction {
    Set { entity: String, tag: String },
    Get { entity: String },
    List { tag: String },
    Search { tag: String, query: String },
}

fn build_embedder() -> Box<dyn Embedder> {
    let timeout = mnemo::config::EmbedderTimeouts::default().search;
    match std::env::var("CLAUDE_MEMORY_EMBEDDER_URL") {
        Ok(url) if url == "disabled" => Box::new(NullEmbedder),
        #[cfg(feature = "http-embedder")]
        Ok(url) => Box::new(
            HttpEmbedder::new(url, "nomic-embed-text", timeout)
                .unwrap_or_else(|_| panic!("invalid embedder configuration")),
        ),
        #[cfg(feature = "http-embedder")]
        Err(_) => Box::new(
            HttpEmbedder::new(HttpEmbedder::default_base_url(), "nomic-embed-text", timeout)
                .unwrap_or_else(|_| panic!("invalid embedder configuration")),
        ),
        #[cfg(not(feature = "http-embedder"))]
        _ => Box::new(NullEmbedder),
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let db_path = cli
        .db_path
        .map(|p| shellexpand::tilde(&p).to_string())
        .unwrap_or_else(mnemo::config::default_db_path);

    let store = Store::open(StorageConfig { db_path })?;

    match cli.command {
        Commands::Entity { action } => match action {
            EntityAction::Create { name, entity_type, observation } => {
                let entity = store.create_entity(&name, &entity_type, &observation)?;
                println!("{}", serde_json::to_string_pretty(&entity)?);
            }
            EntityAction::Get { name } => {
                let entity = store.get_entity(&name)?;
                println!("{}", serde_json::to_string_pretty(&entity)?);
            }
            EntityAction::List { entity_type } => {
                let entities = store.list_entities(entity_type.as_deref())?;
                for entity in entities {
                    println!("{} [{}]", entity.name, entity.entity_type);
                }
            }
            EntityAction::Delete { name } => {
                store.delete_entity(&name)?;
                println!("deleted {name}");
            }
        },

        Commands::Obs { action } => match action {
            ObsAction::Add { entity, content, fact_type } => {
                let fact_type: FactType = fact_type.parse().unwrap_or_default();
                store.add_observation_with_type(&entity, &content, fact_type)?;
                println!("added observation to {entity}");
            }
            ObsAction::Delete { entity, content } => {
                store.delete_observation(&entity, &content)?;
                println!("deleted observation from {entity}");
            }
        },

        Commands::Rel { action } => match action {
            RelAction::Create { from, to, relation_type } => {
                store.create_relation(&from, &to, &relation_type)?;
                println!("{from} --{relation_type}--> {to}");
            }
            RelAction::List { entity } => {
                let relations = store.list_relations(&entity)?;
                for relation in relations {
                    println!("{} (#{} -> #{})", relation.relation_type, relation.from_entity_id, relation.to_entity_id);
                }
            }
            RelAction::Delete { from, to, relation_type } => {
                store.delete_relation(&from, &to, &relation_type)?;
                println!("deleted {from} --{relation_type}--> {to}");
            }
        },

        Commands::Search { query, limit } => {
            let hits = store.fts_search(&query, limit)?;
            for hit in hits {
                println!("{:.3}  {} :: {}", hit.score, hit.entity_name, hit.content);
            }
        }

        Commands::HybridSearch { query, limit } => {
            let embedder = build_embedder();
            let fusion = FusionConfig::default();
            let results = store.hybrid_search_with_embedder(&query, embedder.as_ref(), limit, fusion.rrf_k)?;
            for result in results {
                println!("{:.4}  {} :: {}", result.fused_score, result.entity_name, result.content);
            }
        }

        Commands::Graph => {
            let dump = store.read_graph()?;
            println!("{}", serde_json::to_string_pretty(&dump)?);
        }

        Commands::Init => {
            println!("initialized schema at version {}", SCHEMA_VERSION);
        }

        Commands::Upgrade => {
            let version = store.current_version()?;
            println!("schema version {version}");
        }

        Commands::Migrate { from } => {
            import_graph_dump(&store, &from)?;
        }

        Commands::Embed { action } => match action {
            EmbedAction::Test => {
                let embedder = build_embedder();
                match embedder.create_embedding("hello world") {
                    Ok(vector) => println!("ok: {} dimensions", vector.len()),
                    Err(e) => println!("embedder unavailable: {e}"),
                }
            }
            EmbedAction::Generate => {
                let embedder = build_embedder();
                let pending = store.observations_without_embeddings()?;
                let mut generated = 0usize;
                for (observation_id, content, _entity_name, _entity_type) in pending {
                    if let Ok(vector) = embedder.create_embedding(&content) {
                        store.store_embedding(observation_id, &vector, "nomic-embed-text")?;
                        generated += 1;
                    }
                }
                println!("generated {generated} embeddings");
            }
            EmbedAction::Stats => {
                let (total, with_embeddings) = store.embedding_stats()?;
                println!("{with_embeddings}/{total} observations embedded");
            }
        },

        Commands::Importance { action } => match action {
            ImportanceAction::Recalculate => {
                let updated = store.recalculate_importance(&ScoringConfig::default())?;
                println!("updated {updated} observations");
            }
            ImportanceAction::Stats => {
                let stats = store.decay_stats(&DecayConfig::default())?;
                println!(
                    "{} observations, {} below soft threshold",
                    stats.total_observations, stats.below_soft_threshold
                );
            }
        },

        Commands::Context { project, token_budget } => {
            let mut config = ContextConfig::default();
            if let Some(budget) = token_budget {
                config.token_budget = budget;
            }
            let entries = store.get_context_for_injection(&config, project.as_deref())?;
            println!("{}", mnemo::context::format_context_results(&entries));
        }

        Commands::Decay { action } => {
            let config = DecayConfig::default();
            match action {
                DecayAction::Stats => {
                    let stats = store.decay_stats(&config)?;
                    println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                        "total_observations": stats.total_observations,
                        "below_soft_threshold": stats.below_soft_threshold,
                        "archived": stats.archived,
                        "expired_pending": stats.expired_pending,
                    }))?);
                }
                DecayAction::Apply => {
                    let touched = store.apply_soft_decay(config.soft_decay_threshold, ScoringConfig::default().decay_constant)?;
                    println!("decayed {touched} observations");
                }
                DecayAction::Archive => {
                    let archived = store.archive_old(&config)?;
                    println!("archived {archived} observations");
                }
                DecayAction::Forget => {
                    let forgotten = store.forget_expired()?;
                    println!("forgot {forgotten} expired observations");
                }
            }
        }

        Commands::Workdir { action } => match action {
            WorkdirAction::Set { entity, tag } => {
                store.set_container_tag(&entity, &tag)?;
                println!("tagged {entity} with {tag}");
            }
            WorkdirAction::Get { entity } => {
                match store.get_container_tag(&entity)? {
                    Some(tag) => println!("{tag}"),
                    None => println!("(no tag)"),
                }
            }
            WorkdirAction::List { tag } => {
                let entities = store.list_by_container_tag(&tag)?;
                for entity in entities {
                    println!("{}", entity.name);
                }
            }
            WorkdirAction::Search { tag, query } => {
                let fusion = FusionConfig::default();
                let results = store.hybrid_search_with_boost(&query, None, 10, fusion.rrf_k, &tag, 2.0)?;
                for result in results {
                    println!("{:.4}  {} :: {}", result.fused_score, result.entity_name, result.content);
                }
            }
        },

        Commands::Stats => {
            let version = store.current_version()?;
            let (total_obs, with_embeddings) = store.embedding_stats()?;
            println!("schema version: {version}");
            println!("observations: {total_obs} ({with_embeddings} embedded)");
        }
    }

    Ok(())
}

/// Import `{ entities: [...], relations: [...] }` or newline-delimited
/// `{ "type": "entity"|"relation", ... }` records
fn import_graph_dump(store: &Store, path: &str) -> Result<()> {
    let raw = std::fs::read_to_string(path)?;

    if let Ok(dump) = serde_json::from_str::<mnemo::types::GraphDump>(&raw) {
        for entity in dump.entities {
            let contents: Vec<String> = entity.observations.iter().map(|o| o.content.clone()).collect();
            let _ = store.create_entity(&entity.entity.name, &entity.entity.entity_type, &contents);
        }
        for relation in dump.relations {
            // Relations reference ids from the source database; re-resolve by
            // name is out of scope for a raw dump, so this path only restores
            // entities from a full graph export.
            let _ = relation;
        }
        println!("imported graph dump");
        return Ok(());
    }

    let mut imported = 0usize;
    for line in raw.lines().filter(|l| !l.trim().is_empty()) {
        let value: serde_json::Value = serde_json::from_str(line)?;
        match value.get("type").and_then(|t| t.as_str()) {
            Some("entity") => {
                let name = value.get("name").and_then(|v| v.as_str()).unwrap_or_default();
                let entity_type = value.get("entity_type").and_then(|v| v.as_str()).unwrap_or("note");
                let _ = store.create_entity(name, entity_type, &[]);
                imported += 1;
            }
            Some("relation") => {
                let from = value.get("from").and_then(|v| v.as_str()).unwrap_or_default();
                let to = value.get("to").and_then(|v| v.as_str()).unwrap_or_default();
                let relation_type = value.get("relation_type").and_then(|v| v.as_str()).unwrap_or("related_to");
                let _ = store.create_relation(from, to, relation_type);
                imported += 1;
            }
            _ => {}
        }
    }
    println!("imported {imported} records");
    Ok(())
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_ansi(false))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = run() {
        eprintln!("{}: {}", e.kind(), e);
        std::process::exit(1);
    }
}
