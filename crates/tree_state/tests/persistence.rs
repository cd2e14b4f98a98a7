//! Orchestrator persistence through TreeRepository

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{test_config, ScriptedGateway};
use tempfile::tempdir;
use tree_core::{LabelOrigin, Node, NodeId, Position, TreeConfig, TreeSnapshot};
use tree_state::{
    FileTreeRepository, MemoryTreeRepository, StorageError, TreeOrchestrator, TreeRepository,
    DEFAULT_TREE_NAME,
};

#[tokio::test]
async fn test_open_missing_tree_starts_empty() {
    let gateway = ScriptedGateway::new();
    let repo = Arc::new(MemoryTreeRepository::new());

    let orch = TreeOrchestrator::open(test_config(), gateway.clone(), repo.clone(), "fresh")
        .await
        .unwrap();
    assert!(orch.nodes().await.is_empty());
    assert_eq!(repo.save_count(), 0);
}

#[tokio::test]
async fn test_mutations_round_trip_through_file_repository() {
    let dir = tempdir().unwrap();
    let repo = Arc::new(FileTreeRepository::new(dir.path().join("trees")));
    let gateway = ScriptedGateway::new();

    let orch = TreeOrchestrator::open(test_config(), gateway.clone(), repo.clone(), "study")
        .await
        .unwrap();
    let root = orch.create_root(Position::new(5.0, 5.0)).await;
    gateway.reply("Recursion calls itself.\nCONCEPT: Recursion");
    orch.ask_question(root.as_str(), "What is recursion?", None).await;
    gateway.reply("Smaller each time.");
    let child = orch
        .branch_from_selection(root.as_str(), "calls itself", "why?")
        .await
        .node_id()
        .cloned()
        .unwrap();
    orch.flush().await.unwrap();
    let expected = orch.snapshot().await;
    drop(orch);

    let reopened = TreeOrchestrator::open(test_config(), gateway.clone(), repo.clone(), "study")
        .await
        .unwrap();
    let loaded = reopened.snapshot().await;
    assert_eq!(loaded.edges, expected.edges);
    for (loaded, expected) in loaded.nodes.iter().zip(&expected.nodes) {
        assert_eq!(loaded.id, expected.id);
        assert_eq!(loaded.label, expected.label);
        assert_eq!(loaded.label_origin, expected.label_origin);
        assert_eq!(loaded.highlights, expected.highlights);
        assert_eq!(loaded.messages, expected.messages);
    }
    assert_eq!(reopened.node(root.as_str()).await.unwrap().label, "Recursion");
    let node = reopened.node(child.as_str()).await.unwrap();
    assert_eq!(node.parent_id, Some(root));
    assert_eq!(node.messages.len(), 2);

    let listed = repo.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, "study");
    assert_eq!(listed[0].node_count, 2);
}

#[tokio::test]
async fn test_rapid_mutations_share_one_save() {
    let gateway = ScriptedGateway::new();
    let repo = Arc::new(MemoryTreeRepository::new());
    let orch = TreeOrchestrator::open(test_config(), gateway.clone(), repo.clone(), "t")
        .await
        .unwrap();

    let root = orch.create_root(Position::default()).await;
    orch.rename_node(root.as_str(), "Trees").await;
    orch.move_node(root.as_str(), Position::new(1.0, 2.0)).await;
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(repo.save_count(), 1);
    let stored = repo.stored("t").unwrap();
    assert_eq!(stored.nodes[0].label, "Trees");
    assert_eq!(stored.nodes[0].position, Position::new(1.0, 2.0));
}

#[tokio::test]
async fn test_save_failure_warns_without_rollback() {
    let gateway = ScriptedGateway::new();
    let repo = Arc::new(MemoryTreeRepository::new());
    let config = TreeConfig {
        save_debounce_ms: 60_000,
        ..test_config()
    };
    let orch = TreeOrchestrator::open(config, gateway.clone(), repo.clone(), "t")
        .await
        .unwrap();
    let warnings = orch.save_warnings().unwrap();

    repo.set_failing(true);
    let root = orch.create_root(Position::default()).await;
    orch.rename_node(root.as_str(), "Kept in memory").await;
    let result = orch.flush().await;
    assert!(matches!(result, Err(StorageError::Io(_))));

    assert_eq!(orch.node(root.as_str()).await.unwrap().label, "Kept in memory");
    let warning = warnings.borrow().clone().unwrap();
    assert_eq!(warning.tree_id, "t");

    orch.dismiss_save_warning();
    assert!(warnings.borrow().is_none());

    repo.set_failing(false);
    orch.rename_node(root.as_str(), "Saved now").await;
    orch.flush().await.unwrap();
    assert_eq!(repo.stored("t").unwrap().nodes[0].label, "Saved now");
}

#[tokio::test]
async fn test_open_rejects_broken_tree() {
    let mut orphan = Node::root(
        NodeId::from("child"),
        "Orphan",
        LabelOrigin::Concept,
        Position::default(),
    );
    orphan.parent_id = Some(NodeId::from("missing"));
    let repo = Arc::new(MemoryTreeRepository::new().with_tree(
        "broken",
        TreeSnapshot {
            nodes: vec![orphan],
            edges: Vec::new(),
        },
    ));

    let gateway = ScriptedGateway::new();
    let result = TreeOrchestrator::open(test_config(), gateway, repo, "broken").await;
    assert!(matches!(result, Err(StorageError::InvalidData(_))));
}

#[tokio::test]
async fn test_unpersisted_orchestrator_flush_is_noop() {
    let gateway = ScriptedGateway::new();
    let orch = common::orchestrator(&gateway);
    orch.create_root(Position::default()).await;

    assert!(orch.save_warnings().is_none());
    orch.flush().await.unwrap();
}

#[tokio::test]
async fn test_named_tree_lifecycle() {
    let dir = tempdir().unwrap();
    let repo = Arc::new(FileTreeRepository::new(dir.path()));
    let gateway = ScriptedGateway::new();

    let created = repo.create("bio", "Biology").await.unwrap();
    assert_eq!(created.name, "Biology");

    let orch = TreeOrchestrator::open(test_config(), gateway.clone(), repo.clone(), "bio")
        .await
        .unwrap();
    assert!(orch.nodes().await.is_empty());
    let root = orch.create_root(Position::default()).await;
    orch.rename_node(root.as_str(), "Cells").await;
    orch.flush().await.unwrap();

    let listed = repo.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "Biology");
    assert_eq!(listed[0].node_count, 1);
    assert_eq!(listed[0].created_at, created.created_at);

    repo.rename("bio", "Cell Biology").await.unwrap();
    orch.move_node(root.as_str(), Position::new(3.0, 4.0)).await;
    orch.flush().await.unwrap();
    drop(orch);

    let listed = repo.list().await.unwrap();
    assert_eq!(listed[0].name, "Cell Biology");
    let reopened = TreeOrchestrator::open(test_config(), gateway, repo.clone(), "bio")
        .await
        .unwrap();
    let node = reopened.node(root.as_str()).await.unwrap();
    assert_eq!(node.label, "Cells");
    assert_eq!(node.position, Position::new(3.0, 4.0));
}

#[tokio::test]
async fn test_tree_saved_without_create_gets_default_name() {
    let gateway = ScriptedGateway::new();
    let repo = Arc::new(MemoryTreeRepository::new());
    let orch = TreeOrchestrator::open(test_config(), gateway, repo.clone(), "scratch")
        .await
        .unwrap();
    orch.create_root(Position::default()).await;
    orch.flush().await.unwrap();

    let listed = repo.list().await.unwrap();
    assert_eq!(listed[0].id, "scratch");
    assert_eq!(listed[0].name, DEFAULT_TREE_NAME);

    assert!(matches!(
        repo.rename("scratch", " \t").await,
        Err(StorageError::InvalidData(_))
    ));
    assert!(matches!(
        repo.create("scratch", "Again").await,
        Err(StorageError::AlreadyExists(_))
    ));
}
