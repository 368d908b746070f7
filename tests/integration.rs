//! End-to-end tests over a real SQLite database in a temporary directory.
//!
//! The language model and embedding server are never reachable here
//! (`http://127.0.0.1:1`), which is itself part of what is under test: the
//! chunk stage, the graph store, scope deletion, and the no-information
//! short-circuit must all work without a model.

use sqlx::SqlitePool;
use tempfile::TempDir;

use cairn::config::Config;
use cairn::graph::GraphStore;
use cairn::ingest::{self, Stage};
use cairn::llm::LlmClient;
use cairn::models::{ChatMessage, ConversationState, Triple};
use cairn::{db, migrate, retrieve, scopes};

async fn setup() -> (TempDir, Config, SqlitePool) {
    let dir = tempfile::tempdir().unwrap();
    let toml = format!(
        r#"
        [storage]
        data_dir = "{data}"

        [chunking]
        chunk_size = 50
        overlap = 10

        [llm]
        base_url = "http://127.0.0.1:1"
        timeout_secs = 1
        max_retries = 1
        backoff_ms = 1

        [embedding]
        base_url = "http://127.0.0.1:1"
        timeout_secs = 1
        max_retries = 1
        backoff_ms = 1
        "#,
        data = dir.path().display()
    );
    let config: Config = toml::from_str(&toml).unwrap();
    let pool = db::connect(&config).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    (dir, config, pool)
}

fn write_raw_file(config: &Config, scope: &str, name: &str, content: &str) {
    let dir = config.raw_dir(scope);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(name), content).unwrap();
}

async fn chunk_count(pool: &SqlitePool, scope: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE scope = ?")
        .bind(scope)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn chunk_stage_ingests_new_files_and_skips_reingestion() {
    let (_dir, config, pool) = setup().await;
    write_raw_file(&config, "notes", "a.txt", &"solar panel output ".repeat(10));
    write_raw_file(&config, "notes", "b.md", "short file");

    let report = ingest::run_ingest(&config, &pool, "notes", Stage::Chunk)
        .await
        .unwrap();
    assert_eq!(report.files_loaded, 2);
    assert_eq!(report.files_skipped, 0);
    assert!(report.chunks_written > 0);
    assert_eq!(
        chunk_count(&pool, "notes").await,
        report.chunks_written as i64
    );

    // Identical content is skipped on the second run.
    let report = ingest::run_ingest(&config, &pool, "notes", Stage::Chunk)
        .await
        .unwrap();
    assert_eq!(report.files_loaded, 0);
    assert_eq!(report.files_skipped, 2);
    assert_eq!(report.chunks_written, 0);
}

#[tokio::test]
async fn modified_file_replaces_its_chunks() {
    let (_dir, config, pool) = setup().await;
    write_raw_file(&config, "notes", "a.txt", &"first version ".repeat(20));
    ingest::run_ingest(&config, &pool, "notes", Stage::Chunk)
        .await
        .unwrap();
    let before = chunk_count(&pool, "notes").await;
    assert!(before > 1);

    // Shorter content: the old windows must not linger.
    write_raw_file(&config, "notes", "a.txt", "second version");
    let report = ingest::run_ingest(&config, &pool, "notes", Stage::Chunk)
        .await
        .unwrap();
    assert_eq!(report.files_loaded, 1);
    assert_eq!(chunk_count(&pool, "notes").await, 1);
}

#[tokio::test]
async fn unsupported_extensions_are_counted_not_fatal() {
    let (_dir, config, pool) = setup().await;
    write_raw_file(&config, "notes", "a.txt", "plain text");
    write_raw_file(&config, "notes", "image.png", "not really a png");

    let report = ingest::run_ingest(&config, &pool, "notes", Stage::Chunk)
        .await
        .unwrap();
    assert_eq!(report.files_loaded, 1);
    assert_eq!(report.files_unsupported, 1);
}

#[tokio::test]
async fn reupserting_a_triple_keeps_edge_count_stable() {
    let (_dir, _config, pool) = setup().await;
    let graph = GraphStore::new(pool.clone());
    let triple = Triple::normalized("NASA", "launched", "Artemis I", "space");

    graph.upsert_triple(&triple).await.unwrap();
    graph.upsert_triple(&triple).await.unwrap();
    graph.upsert_triple(&triple).await.unwrap();

    assert_eq!(graph.relation_count("space").await.unwrap(), 1);
    assert!(graph.entity_exists("nasa").await.unwrap());
    assert!(graph.entity_exists("artemis i").await.unwrap());
}

#[tokio::test]
async fn deleting_a_scope_removes_orphaned_entities_only() {
    let (_dir, _config, pool) = setup().await;
    let graph = GraphStore::new(pool.clone());

    // "b" also participates in an edge of scope s2; "a" does not.
    graph
        .upsert_triple(&Triple::normalized("a", "rel", "b", "s1"))
        .await
        .unwrap();
    graph
        .upsert_triple(&Triple::normalized("b", "rel", "c", "s2"))
        .await
        .unwrap();

    graph.delete_scope("s1").await.unwrap();

    assert_eq!(graph.relation_count("s1").await.unwrap(), 0);
    assert_eq!(graph.relation_count("s2").await.unwrap(), 1);
    assert!(!graph.entity_exists("a").await.unwrap());
    assert!(graph.entity_exists("b").await.unwrap());
    assert!(graph.entity_exists("c").await.unwrap());
}

#[tokio::test]
async fn keyword_lookup_is_substring_case_insensitive_and_capped() {
    let (_dir, _config, pool) = setup().await;
    let graph = GraphStore::new(pool.clone());

    graph
        .upsert_triple(&Triple::normalized("Solar Panel", "generates", "power", "energy"))
        .await
        .unwrap();
    graph
        .upsert_triple(&Triple::normalized("wind turbine", "generates", "power", "energy"))
        .await
        .unwrap();
    graph
        .upsert_triple(&Triple::normalized("inverter", "converts", "solar output", "energy"))
        .await
        .unwrap();

    // "SOLAR" matches subject of one edge and object of another.
    let hits = graph
        .find_by_keywords("energy", &["SOLAR".to_string()], 25)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);

    let capped = graph
        .find_by_keywords("energy", &["power".to_string(), "solar".to_string()], 1)
        .await
        .unwrap();
    assert_eq!(capped.len(), 1);

    // Other scopes are invisible.
    let other = graph
        .find_by_keywords("elsewhere", &["solar".to_string()], 25)
        .await
        .unwrap();
    assert!(other.is_empty());
}

#[tokio::test]
async fn keyword_lookup_matches_like_metacharacters_literally() {
    let (_dir, _config, pool) = setup().await;
    let graph = GraphStore::new(pool.clone());

    graph
        .upsert_triple(&Triple::normalized("100% cotton", "is", "fabric", "s"))
        .await
        .unwrap();
    graph
        .upsert_triple(&Triple::normalized("100x cotton", "is", "blend", "s"))
        .await
        .unwrap();

    // '%' must not act as a wildcard bridging "100" and " cotton".
    let hits = graph
        .find_by_keywords("s", &["100%".to_string()], 25)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].subject, "100% cotton");
}

#[tokio::test]
async fn delete_scope_clears_every_footprint() {
    let (_dir, config, pool) = setup().await;
    write_raw_file(&config, "doomed", "a.txt", "content that will go away");
    ingest::run_ingest(&config, &pool, "doomed", Stage::Chunk)
        .await
        .unwrap();
    GraphStore::new(pool.clone())
        .upsert_triple(&Triple::normalized("x", "rel", "y", "doomed"))
        .await
        .unwrap();

    let deletion = scopes::delete_scope(&config, &pool, "doomed").await.unwrap();

    assert_eq!(deletion.ledger_entries, 1);
    assert!(deletion.chunks > 0);
    assert!(!config.raw_dir("doomed").exists());
    assert_eq!(chunk_count(&pool, "doomed").await, 0);
    assert_eq!(
        GraphStore::new(pool.clone())
            .relation_count("doomed")
            .await
            .unwrap(),
        0
    );
    assert!(scopes::list_scopes(&config).unwrap().is_empty());

    // The file can be ingested again afterwards.
    write_raw_file(&config, "doomed", "a.txt", "content that will go away");
    let report = ingest::run_ingest(&config, &pool, "doomed", Stage::Chunk)
        .await
        .unwrap();
    assert_eq!(report.files_loaded, 1);
}

#[tokio::test]
async fn asking_an_unknown_scope_is_a_hard_error() {
    let (_dir, config, pool) = setup().await;
    let llm = LlmClient::new(&config.llm).unwrap();

    let err = retrieve::answer_question(
        &config,
        &pool,
        &llm,
        "never-ingested",
        "anything?",
        ConversationState::new(),
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("no vector index"));
}

#[tokio::test]
async fn empty_retrieval_short_circuits_without_a_model() {
    let (_dir, config, pool) = setup().await;
    // A known scope: chunks exist, but no vectors and no graph edges. With
    // the model unreachable, any model dependence would surface as an error
    // or a changed history.
    write_raw_file(&config, "notes", "a.txt", "some content");
    ingest::run_ingest(&config, &pool, "notes", Stage::Chunk)
        .await
        .unwrap();

    let llm = LlmClient::new(&config.llm).unwrap();
    let history = ConversationState {
        messages: vec![
            ChatMessage::user("earlier"),
            ChatMessage::assistant("earlier answer"),
        ],
    };

    let (answer, updated) =
        retrieve::answer_question(&config, &pool, &llm, "notes", "anything?", history.clone())
            .await
            .unwrap();

    assert_eq!(answer, retrieve::NO_INFORMATION_MESSAGE);
    assert_eq!(updated, history);
}

#[tokio::test]
async fn graph_stage_failure_never_fails_ingestion() {
    let (_dir, config, pool) = setup().await;
    write_raw_file(&config, "notes", "a.txt", "NASA launched Artemis I.");
    ingest::run_ingest(&config, &pool, "notes", Stage::Chunk)
        .await
        .unwrap();

    // Extraction degrades to empty against the unreachable model; the run
    // itself must still succeed.
    let report = ingest::run_ingest(&config, &pool, "notes", Stage::Graph)
        .await
        .unwrap();
    assert_eq!(report.triples_upserted, 0);
}
