use super::*;
use crate::graph::DependencyGraph;
use crate::model::{FailurePolicy, ResourceKind, Value};

const LOGIN_STACK: &str = r#"
stack "login"

settings {
    concurrency 2
    on-failure "continue"
}

resource "network" "login-vpc" {
    cidr_block "10.0.0.0/16"
    tags { Name "login-vpc"; }
}

resource "subnet" "private-subnet-1" {
    vpc_id (ref)"login-vpc.id"
    cidr_block "10.0.3.0/24"
    availability_zone "ap-south-1a"
}

resource "subnet" "private-subnet-2" {
    vpc_id (ref)"login-vpc.id"
    cidr_block "10.0.4.0/24"
    availability_zone "ap-south-1b"
}

resource "security-group" "eks-sg" {
    vpc_id (ref)"login-vpc.id"
    ingress {
        - protocol="tcp" from_port=5432 to_port=5432 {
            cidr_blocks "10.0.0.0/16"
        }
    }
}

resource "subnet-group" "db-subnet-group" {
    subnet_ids (ref)"private-subnet-1.id" (ref)"private-subnet-2.id"
}

resource "database" "login-db" {
    engine "postgres"
    db_name "loginapp"
    db_subnet_group_name (ref)"db-subnet-group.id"
    vpc_security_group_ids (ref)"eks-sg.id"
}

output "db_endpoint" (ref)"login-db.endpoint"
output "db_url" {
    (concat)value "postgres://" (ref)"login-db.endpoint" "/" (ref)"login-db.db_name"
}
"#;

#[test]
fn test_parse_login_stack() {
    let deployment = parse_kdl_string(LOGIN_STACK, "fallback".to_string()).unwrap();

    assert_eq!(deployment.name, "login");
    assert_eq!(deployment.len(), 6);
    assert_eq!(deployment.outputs().len(), 2);
    assert_eq!(deployment.settings.concurrency, 2);
    assert_eq!(deployment.settings.failure_policy, FailurePolicy::Continue);

    let sg = deployment.get("eks-sg").unwrap();
    assert_eq!(sg.kind, ResourceKind::SecurityGroup);
    let Value::List(rules) = &sg.inputs["ingress"] else {
        panic!("ingress should be a list");
    };
    assert_eq!(
        rules[0],
        Value::map([
            ("protocol", Value::from("tcp")),
            ("from_port", Value::Integer(5432)),
            ("to_port", Value::Integer(5432)),
            ("cidr_blocks", Value::from("10.0.0.0/16")),
        ])
    );
}

#[test]
fn test_parsed_stack_builds_a_graph() {
    let deployment = parse_kdl_string(LOGIN_STACK, "login".to_string()).unwrap();
    let graph = DependencyGraph::build(&deployment).unwrap();

    assert_eq!(
        graph.ordered_ids(),
        vec![
            "login-vpc",
            "private-subnet-1",
            "private-subnet-2",
            "eks-sg",
            "db-subnet-group",
            "login-db",
        ]
    );
}

#[test]
fn test_stack_name_defaults_when_not_declared() {
    let deployment =
        parse_kdl_string(r#"resource "network" "vpc""#, "from-file".to_string()).unwrap();
    assert_eq!(deployment.name, "from-file");
}

#[test]
fn test_duplicate_resource_ids_fail_to_parse() {
    let kdl = r#"
        resource "network" "vpc"
        resource "subnet" "vpc"
    "#;
    let err = parse_kdl_string(kdl, "dup".to_string()).unwrap_err();
    assert!(matches!(err, FlowError::DuplicateResource(id) if id == "vpc"));
}

#[test]
fn test_unknown_top_level_node_is_rejected() {
    let err = parse_kdl_string(r#"service "web""#, "x".to_string()).unwrap_err();
    assert!(err.to_string().contains("unknown top-level node 'service'"));
}

#[test]
fn test_invalid_kdl_is_a_parse_error() {
    let err = parse_kdl_string("resource \"network\" {", "x".to_string()).unwrap_err();
    assert!(matches!(err, FlowError::KdlParse(_)));
}

#[test]
fn test_parse_kdl_file_uses_file_stem() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("staging.kdl");
    std::fs::write(&path, r#"resource "network" "vpc" { cidr_block "10.0.0.0/16"; }"#).unwrap();

    let deployment = parse_kdl_file(&path).unwrap();
    assert_eq!(deployment.name, "staging");
    assert!(deployment.contains("vpc"));
}

#[test]
fn test_parse_kdl_file_missing() {
    let err = parse_kdl_file("/definitely/not/here.kdl").unwrap_err();
    assert!(matches!(err, FlowError::IoError { .. }));
}
