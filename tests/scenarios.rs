//! End-to-end scenarios exercising the engine the way a caller would:
//! open a store, drive several operations across modules, and check the
//! externally observable result.

use mnemo::config::{ContextConfig, DecayConfig};
use mnemo::embedding::Embedder;
use mnemo::error::{MemoryError, Result};
use mnemo::search::fuse_rrf;
use mnemo::storage::Store;
use mnemo::types::{RankedItem, SearchSource};

#[test]
fn session_lifecycle_survives_reopen_and_scopes_by_container() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("mnemo.db").to_string_lossy().to_string();

    {
        let store = Store::open(mnemo::config::StorageConfig { db_path: db_path.clone() }).unwrap();
        store
            .create_entity("MyApp", "project", &["React frontend".into(), "Node backend".into()])
            .unwrap();
        store.set_container_tag("MyApp", "my-app").unwrap();
        store.create_entity("Architecture", "decision", &["Use Redux".into()]).unwrap();
        store.set_container_tag("Architecture", "my-app").unwrap();
        store.create_relation("MyApp", "Architecture", "has_decision").unwrap();
    }

    let store = Store::open(mnemo::config::StorageConfig { db_path }).unwrap();
    let config = ContextConfig {
        min_importance: 0.0,
        token_budget: 1_000_000,
    };
    let results = store.get_context_with_container_tag(&config, "my-app").unwrap();
    assert!(results.len() >= 3, "expected at least 3 entries, got {}", results.len());

    let tagged = store.list_entities(None).unwrap();
    for entity in tagged.iter().filter(|e| e.name == "MyApp" || e.name == "Architecture") {
        assert_eq!(entity.container_tag.as_deref(), Some("my-app"));
    }
}

#[test]
fn versioning_tracks_latest_and_full_history() {
    let store = Store::open_in_memory().unwrap();
    store.create_or_update_entity("Doc", "page", &["v1".into()]).unwrap();
    store.create_or_update_entity("Doc", "page", &["v2".into()]).unwrap();

    let latest = store.get_entity("Doc").unwrap();
    assert_eq!(latest.entity.version, 2);
    assert_eq!(
        latest.observations.iter().map(|o| o.content.as_str()).collect::<Vec<_>>(),
        vec!["v2"]
    );

    let history = store.get_entity_history("Doc").unwrap();
    assert_eq!(history.iter().map(|e| e.version).collect::<Vec<_>>(), vec![2, 1]);
}

struct AlwaysFailsEmbedder;

impl Embedder for AlwaysFailsEmbedder {
    fn create_embedding(&self, _text: &str) -> Result<Vec<f64>> {
        Err(MemoryError::External("provider unreachable".into()))
    }
}

#[test]
fn hybrid_search_falls_back_to_fts_only_when_embedder_errors() {
    let store = Store::open_in_memory().unwrap();
    store.create_entity("Lang", "note", &["typescript is a superset of javascript".into()]).unwrap();
    store.create_entity("Other", "note", &["rust has no garbage collector".into()]).unwrap();

    let plain = store.fts_search("typescript", 10).unwrap();
    let via_embedder = store
        .hybrid_search_with_embedder("typescript", &AlwaysFailsEmbedder, 10, 60.0)
        .unwrap();

    assert_eq!(plain.len(), via_embedder.len());
    for (fts_hit, fused) in plain.iter().zip(via_embedder.iter()) {
        assert_eq!(fts_hit.content, fused.content);
        assert!((fts_hit.score - fused.fused_score).abs() < 1e-9);
        assert_eq!(fused.contributions.len(), 1);
    }
}

#[test]
fn rrf_math_matches_closed_form_for_crossed_rankings() {
    let list_a = vec![
        RankedItem { entity_name: "A".into(), entity_type: "note".into(), content: "doc1".into(), score: 2.0, source: SearchSource::Fts },
        RankedItem { entity_name: "A".into(), entity_type: "note".into(), content: "doc2".into(), score: 1.0, source: SearchSource::Fts },
    ];
    let list_b = vec![
        RankedItem { entity_name: "A".into(), entity_type: "note".into(), content: "doc2".into(), score: 2.0, source: SearchSource::Vector },
        RankedItem { entity_name: "A".into(), entity_type: "note".into(), content: "doc1".into(), score: 1.0, source: SearchSource::Vector },
    ];

    let fused = fuse_rrf(&[list_a, list_b], 60.0);
    let expected = 1.0 / 61.0 + 1.0 / 62.0;
    assert_eq!(fused.len(), 2);
    for item in &fused {
        assert!((item.fused_score - expected).abs() < 1e-9, "{} got {}", item.content, item.fused_score);
    }
}

#[test]
fn decay_archives_stale_low_importance_observations_only() {
    let store = Store::open_in_memory().unwrap();
    store.create_entity("Scratch", "note", &["temp".into()]).unwrap();

    store
        .with_connection(|conn| {
            conn.execute(
                "UPDATE observations SET importance = 0.05, last_accessed = datetime('now', '-120 days')
                 WHERE content = 'temp'",
                [],
            )?;
            Ok(())
        })
        .unwrap();

    let config = DecayConfig {
        soft_decay_threshold: 0.3,
        archive_after_days: 90.0,
        min_to_keep: 0.1,
    };
    let archived = store.archive_old(&config).unwrap();
    assert_eq!(archived, 1);

    let remaining = store.get_entity("Scratch").unwrap();
    assert!(remaining.observations.iter().all(|o| o.content != "temp"));
}

#[test]
fn expired_observations_are_forgotten() {
    let store = Store::open_in_memory().unwrap();
    store.create_entity("Owner", "note", &["bye".into()]).unwrap();

    store
        .with_connection(|conn| {
            conn.execute(
                "UPDATE observations SET forget_after = datetime('now', '-1 hours') WHERE content = 'bye'",
                [],
            )?;
            Ok(())
        })
        .unwrap();

    let removed = store.forget_expired().unwrap();
    assert_eq!(removed, 1);

    let owner = store.get_entity("Owner").unwrap();
    assert!(owner.observations.iter().all(|o| o.content != "bye"));
}

#[test]
fn token_budget_is_never_exceeded() {
    let store = Store::open_in_memory().unwrap();
    for i in 0..20 {
        store
            .create_entity(&format!("Doc{i}"), "note", &[format!("observation number {i} with some body text")])
            .unwrap();
    }
    let config = ContextConfig {
        min_importance: 0.0,
        token_budget: 50,
    };
    let entries = store.get_context_for_injection(&config, None).unwrap();
    let used: usize = entries
        .iter()
        .map(|e| (e.entity_name.len() + e.content.len() + 20) / 4)
        .sum();
    assert!(used <= 50, "packed {used} tokens over a budget of 50");
}
