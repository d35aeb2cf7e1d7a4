use std::path::PathBuf;
use std::sync::Arc;
use strata_cloud::{
    ActionType, MemoryStateStore, ProviderRegistry, ResourceStatus, RetryConfig, Session,
    StateStore,
};
use strata_cloud_local::LocalProvider;
use strata_core::{Deployment, parse_kdl_file};

fn login_stack() -> Deployment {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../stacks/login.kdl");
    parse_kdl_file(path).unwrap()
}

fn session(provider: Arc<LocalProvider>, store: Arc<MemoryStateStore>) -> Session {
    let store: Arc<dyn StateStore> = store;
    Session::new(ProviderRegistry::new().with_fallback(provider), store)
        .with_retry(RetryConfig::none())
}

#[tokio::test]
async fn test_login_stack_applies() {
    let store = Arc::new(MemoryStateStore::new());
    let session = session(Arc::new(LocalProvider::default()), store.clone());
    let deployment = login_stack();

    let report = session.apply(&deployment).await.unwrap();
    assert!(report.is_success(), "{:#?}", report);
    assert_eq!(report.resources.len(), 12);
    assert_eq!(store.snapshot().await.resources.len(), 12);

    let endpoint = report.outputs.require("db_endpoint").unwrap();
    assert!(endpoint.as_str().unwrap().ends_with(".ap-south-1.rds.amazonaws.com:5432"));
    assert_eq!(report.outputs.require("db_name").unwrap().as_str(), Some("loginapp"));
    assert_eq!(
        report.outputs.require("eks_cluster_name").unwrap().as_str(),
        Some("login-eks-cluster")
    );
    assert_eq!(
        report.outputs.require("kubeconfig").unwrap()["current-context"],
        "login-eks-cluster"
    );

    let db = store.get("login-db").await.unwrap().unwrap();
    assert!(!db.outputs.contains_key("password"));
    assert_eq!(db.dependencies, vec!["db-subnet-group", "eks-sg"]);
}

#[tokio::test]
async fn test_login_stack_reapply_is_a_no_op() {
    let store = Arc::new(MemoryStateStore::new());
    let session = session(Arc::new(LocalProvider::default()), store);
    let deployment = login_stack();

    session.apply(&deployment).await.unwrap();
    let plan = session.plan(&deployment).await.unwrap();
    assert!(!plan.has_changes, "{}", plan.summary());

    let report = session.apply(&deployment).await.unwrap();
    assert_eq!(report.summary().changed, 0);
}

#[tokio::test]
async fn test_database_failure_spares_the_cluster() {
    let store = Arc::new(MemoryStateStore::new());
    let provider = Arc::new(
        LocalProvider::default().with_failure("login-db", "InsufficientDBInstanceCapacity"),
    );
    let session = session(provider, store);

    let report = session.apply(&login_stack()).await.unwrap();
    assert!(!report.is_success());
    assert_eq!(report.status_of("login-db"), Some(ResourceStatus::Failed));
    assert_eq!(report.status_of("db-subnet-group"), Some(ResourceStatus::Applied));
    assert_eq!(report.status_of("fargate-profile"), Some(ResourceStatus::Applied));

    assert!(!report.outputs.get("db_endpoint").unwrap().is_available());
    assert!(report.outputs.get("kubeconfig").unwrap().is_available());
}

#[tokio::test]
async fn test_engine_change_is_rejected_on_update() {
    let store = Arc::new(MemoryStateStore::new());
    let session = session(Arc::new(LocalProvider::default()), store);
    let mut deployment = login_stack();
    session.apply(&deployment).await.unwrap();

    let mut changed = Deployment::new(deployment.name.clone());
    for resource in deployment.resources() {
        let mut resource = resource.clone();
        if resource.id == "login-db" {
            resource.set_input("engine", "mysql");
        }
        changed.register(resource).unwrap();
    }
    for output in deployment.outputs() {
        changed.export(output.clone()).unwrap();
    }
    deployment = changed;

    let plan = session.plan(&deployment).await.unwrap();
    assert_eq!(plan.get("login-db").unwrap().action_type, ActionType::Update);

    let report = session.apply(&deployment).await.unwrap();
    let db = report.get("login-db").unwrap();
    assert_eq!(db.status, ResourceStatus::Failed);
    assert!(db.error.as_ref().unwrap().contains("'engine' cannot change"));
}

#[tokio::test]
async fn test_destroy_removes_everything() {
    let store = Arc::new(MemoryStateStore::new());
    let session = session(Arc::new(LocalProvider::default()), store.clone());
    session.apply(&login_stack()).await.unwrap();

    let report = session.destroy().await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.deleted(), 12);
    assert!(store.snapshot().await.resources.is_empty());

    let order: Vec<&str> = report.resources.iter().map(|r| r.id.as_str()).collect();
    let position = |id: &str| order.iter().position(|o| *o == id).unwrap();
    assert!(position("fargate-profile") < position("login-eks-cluster"));
    assert!(position("login-db") < position("db-subnet-group"));
    assert!(position("private-subnet-1") < position("login-vpc"));
}
