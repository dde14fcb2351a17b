use super::*;
use crate::backend::BackendRegistry;
use crate::error::ConsoleError;
use crate::models::{
    DeploymentVersion, LoginIdentity, MetricKind, MetricSample, MetricsQuery, PageRequest,
};
use crate::store::{DeploymentVersionStore, Inventory, MemoryStore, MetricsStore, RecordStores};
use async_trait::async_trait;
use crate::test_support::{self, FakeBackend};
use chrono::{Duration, Utc};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncReadExt;

const REPLICA: &str = "shop-1-prod-dhorse-7d9c6b5f4-x2k4p";

struct Fixture {
    backend: Arc<FakeBackend>,
    store: Arc<MemoryStore>,
    directory: Arc<ReplicaDirectory>,
    operations: ReplicaOperations,
}

fn fixture() -> Fixture {
    let backend = FakeBackend::new("fake")
        .with_replica(test_support::replica(REPLICA, "shop", Some("shop-v1")))
        .with_replica(test_support::replica(
            "shop-1-prod-dhorse-7d9c6b5f4-b8n2q",
            "shop",
            Some("shop-v1"),
        ))
        .with_replica(test_support::replica(
            "shop-1-prod-dhorse-5f6d8c9b7-zz9k1",
            "shop",
            Some("shop-v0"),
        ))
        .with_file("app.log", b"started\n")
        .with_log("line one\nline two\n");
    fixture_with(backend)
}

fn fixture_with(backend: FakeBackend) -> Fixture {
    let backend = Arc::new(backend);
    let store = Arc::new(MemoryStore::with_inventory(Inventory {
        apps: vec![test_support::app("a1", "shop"), test_support::app("a2", "blog")],
        environments: vec![
            test_support::environment("e1", "a1", "prod", "c1", "shop"),
            test_support::environment("e2", "a2", "prod", "c1", "blog"),
        ],
        clusters: vec![test_support::cluster("c1", "main", "fake")],
        versions: vec![test_support::version("a1", "shop-v1", "main")],
        members: vec![test_support::member("a1", "u1")],
    }));
    let registry = BackendRegistry::builder().register(backend.clone()).build();
    let directory = Arc::new(ReplicaDirectory::new(
        RecordStores::from_memory(store.clone()),
        registry,
    ));
    let operations = ReplicaOperations::new(directory.clone(), store.clone());

    Fixture {
        backend,
        store,
        directory,
        operations,
    }
}

fn page_request(environment_id: Option<&str>) -> PageRequest {
    PageRequest {
        app_id: "a1".to_string(),
        environment_id: environment_id.map(str::to_string),
        page_number: 1,
        page_size: 10,
    }
}

#[tokio::test]
async fn test_page_enriches_branch_names() {
    let f = fixture();
    let page = f
        .directory
        .page(&LoginIdentity::normal("u1"), &page_request(Some("e1")))
        .await
        .unwrap();

    assert_eq!(page.item_count, 3);
    let names: Vec<&str> = page.items.iter().map(|r| r.snapshot.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "shop-1-prod-dhorse-5f6d8c9b7-zz9k1",
            "shop-1-prod-dhorse-7d9c6b5f4-b8n2q",
            REPLICA,
        ]
    );
    // shop-v0 has no deployment version record
    assert_eq!(page.items[0].branch_name, None);
    assert_eq!(page.items[1].branch_name.as_deref(), Some("main"));
    assert_eq!(page.items[2].branch_name.as_deref(), Some("main"));
    assert!(page.items.iter().all(|r| r.app_id == "a1" && r.environment_id == "e1"));
}

/// Records every version lookup that reaches the store
struct CountingVersions {
    inner: Arc<MemoryStore>,
    lookups: Mutex<Vec<String>>,
}

#[async_trait]
impl DeploymentVersionStore for CountingVersions {
    async fn query_by_version_name(
        &self,
        version_name: &str,
    ) -> crate::error::Result<Option<DeploymentVersion>> {
        self.lookups
            .lock()
            .unwrap()
            .push(version_name.to_string());
        self.inner.query_by_version_name(version_name).await
    }
}

#[tokio::test]
async fn test_page_looks_up_each_version_once() {
    let f = fixture();
    let versions = Arc::new(CountingVersions {
        inner: f.store.clone(),
        lookups: Mutex::new(Vec::new()),
    });
    let mut stores = RecordStores::from_memory(f.store.clone());
    stores.versions = versions.clone();
    let directory = ReplicaDirectory::new(
        stores,
        BackendRegistry::builder().register(f.backend.clone()).build(),
    );

    let page = directory
        .page(&LoginIdentity::normal("u1"), &page_request(Some("e1")))
        .await
        .unwrap();
    assert_eq!(page.items.len(), 3);

    // shop-v1 backs two replicas, shop-v0 is a miss
    let mut lookups = versions.lookups.lock().unwrap().clone();
    lookups.sort();
    assert_eq!(lookups, vec!["shop-v0".to_string(), "shop-v1".to_string()]);

    // The cache lives for one page only
    directory
        .page(&LoginIdentity::normal("u1"), &page_request(Some("e1")))
        .await
        .unwrap();
    assert_eq!(versions.lookups.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn test_page_without_environment_is_empty() {
    let f = fixture();
    let login = LoginIdentity::admin("root");

    let page = f.directory.page(&login, &page_request(None)).await.unwrap();
    assert_eq!(page.item_count, 0);

    let page = f
        .directory
        .page(&login, &page_request(Some("missing")))
        .await
        .unwrap();
    assert_eq!(page.item_count, 0);
    assert!(page.items.is_empty());
    assert_eq!(f.backend.calls(), 0);
}

#[tokio::test]
async fn test_non_member_gets_empty_page_and_rights_error() {
    let f = fixture();
    let stranger = LoginIdentity::normal("u2");

    let page = f
        .directory
        .page(&stranger, &page_request(Some("e1")))
        .await
        .unwrap();
    assert_eq!(page.item_count, 0);

    let err = f.directory.resolve(REPLICA, &stranger).await.unwrap_err();
    assert!(matches!(err, ConsoleError::Rights { ref user_id, ref app_id } if user_id == "u2" && app_id == "a1"));

    let err = f.operations.rebuild(&stranger, REPLICA).await.unwrap_err();
    assert!(matches!(err, ConsoleError::Rights { .. }));
    assert_eq!(f.backend.calls(), 0);
}

#[tokio::test]
async fn test_admin_bypasses_membership() {
    let f = fixture();
    let ctx = f
        .directory
        .resolve(REPLICA, &LoginIdentity::admin("root"))
        .await
        .unwrap();

    assert_eq!(ctx.app.id, "a1");
    assert_eq!(ctx.environment.id, "e1");
    assert_eq!(ctx.cluster.id, "c1");
}

#[tokio::test]
async fn test_resolve_rejects_unknown_tag() {
    let f = fixture();
    let err = f
        .directory
        .resolve("shop-1-staging-dhorse-abc", &LoginIdentity::admin("root"))
        .await
        .unwrap_err();
    assert!(matches!(err, ConsoleError::ReplicaNameInvalid(_)));
}

#[tokio::test]
async fn test_resolve_rejects_unknown_app_and_blank_name() {
    let f = fixture();
    let admin = LoginIdentity::admin("root");

    let err = f
        .directory
        .resolve("cart-1-prod-dhorse-abc", &admin)
        .await
        .unwrap_err();
    assert!(matches!(err, ConsoleError::ReplicaNameInvalid(_)));

    let err = f.directory.resolve("  ", &admin).await.unwrap_err();
    assert!(matches!(err, ConsoleError::RequiredField("replica_name")));

    let err = f.directory.resolve("shop-prod-abc", &admin).await.unwrap_err();
    assert!(matches!(err, ConsoleError::MalformedName(_)));
}

#[tokio::test]
async fn test_resolve_reports_missing_cluster() {
    let f = fixture();
    f.store
        .insert_environment(test_support::environment("e3", "a1", "dev", "gone", "shop-dev"))
        .await;

    let err = f
        .directory
        .resolve("shop-1-dev-dhorse-abc", &LoginIdentity::admin("root"))
        .await
        .unwrap_err();
    assert!(matches!(err, ConsoleError::ClusterNotFound(id) if id == "gone"));
}

#[tokio::test]
async fn test_download_file_rejects_traversal_without_backend_call() {
    let f = fixture();
    let err = f
        .operations
        .download_file(&LoginIdentity::admin("root"), REPLICA, "../../etc/passwd")
        .await
        .err()
        .unwrap();

    assert!(matches!(err, ConsoleError::PathTraversal(_)));
    assert_eq!(f.backend.calls(), 0);
}

#[tokio::test]
async fn test_download_file_streams_content() {
    let f = fixture();
    let mut stream = f
        .operations
        .download_file(&LoginIdentity::normal("u1"), REPLICA, "app.log")
        .await
        .unwrap();

    let mut content = String::new();
    stream.read_to_string(&mut content).await.unwrap();
    assert_eq!(content, "started\n");

    let err = f
        .operations
        .download_file(&LoginIdentity::normal("u1"), REPLICA, "heap.hprof")
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ConsoleError::FileNotFound(_)));
}

#[tokio::test]
async fn test_operations_dispatch_to_backend() {
    let f = fixture();
    let login = LoginIdentity::normal("u1");

    f.operations.rebuild(&login, REPLICA).await.unwrap();
    assert_eq!(f.backend.rebuilt(), vec![REPLICA.to_string()]);

    assert_eq!(
        f.operations.query_files(&login, REPLICA).await.unwrap(),
        vec!["app.log".to_string()]
    );
    assert_eq!(
        f.operations.download_log(&login, REPLICA).await.unwrap(),
        "line one\nline two\n"
    );

    let mut stream = f.operations.stream_log(&login, REPLICA).await.unwrap();
    let mut content = String::new();
    stream.read_to_string(&mut content).await.unwrap();
    assert_eq!(content, "line one\nline two\n");
}

#[tokio::test]
async fn test_unknown_replica_is_typed_not_found() {
    let f = fixture();
    let err = f
        .operations
        .download_log(&LoginIdentity::normal("u1"), "shop-1-prod-dhorse-gone")
        .await
        .unwrap_err();
    assert!(matches!(err, ConsoleError::ReplicaNotFound(_)));
}

#[tokio::test]
async fn test_backend_failure_surfaces_unchanged() {
    let f = fixture_with(FakeBackend::new("fake").unavailable());
    let err = f
        .operations
        .rebuild(&LoginIdentity::admin("root"), REPLICA)
        .await
        .unwrap_err();
    assert!(matches!(err, ConsoleError::BackendUnavailable { .. }));
    assert_eq!(f.backend.calls(), 1);
}

#[tokio::test]
async fn test_replica_metrics_list_enforces_rights() {
    let f = fixture();
    let now = Utc::now();
    let sample = |replica: &str, age_minutes: i64| MetricSample {
        app_id: "a1".to_string(),
        replica_name: replica.to_string(),
        kind: MetricKind::Cpu,
        current_value: 1,
        min_value: 2,
        max_value: 2,
        timestamp: now - Duration::minutes(age_minutes),
    };
    f.store
        .add_batch(vec![
            sample(REPLICA, 5),
            sample(REPLICA, 90),
            sample("shop-1-prod-dhorse-other", 5),
        ])
        .await
        .unwrap();

    let query = MetricsQuery {
        replica_name: REPLICA.to_string(),
        start_time: now - Duration::hours(1),
        end_time: now,
    };

    let samples = f
        .operations
        .replica_metrics_list(&LoginIdentity::normal("u1"), &query)
        .await
        .unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].replica_name, REPLICA);

    let err = f
        .operations
        .replica_metrics_list(&LoginIdentity::normal("u2"), &query)
        .await
        .unwrap_err();
    assert!(matches!(err, ConsoleError::Rights { .. }));
}
