//! Deterministic identifiers for simulated objects
//!
//! Everything is derived from the region and the resource id, so the same
//! declaration always yields the same ids, ARNs and endpoints.

use serde_json::{Value as Json, json};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a over `parts`, with a separator byte between them
pub fn fingerprint(parts: &[&str]) -> u64 {
    parts.iter().fold(FNV_OFFSET, |hash, part| {
        part.bytes()
            .chain(std::iter::once(0xff))
            .fold(hash, |h, b| (h ^ u64::from(b)).wrapping_mul(FNV_PRIME))
    })
}

/// `<prefix>-<16 hex digits>`, the shape of EC2 and RDS ids
pub fn physical_id(prefix: &str, region: &str, id: &str) -> String {
    format!("{prefix}-{:016x}", fingerprint(&[region, id]))
}

pub fn arn(service: &str, region: &str, account_id: &str, resource: &str) -> String {
    format!("arn:aws:{service}:{region}:{account_id}:{resource}")
}

pub fn iam_arn(account_id: &str, resource: &str) -> String {
    format!("arn:aws:iam::{account_id}:{resource}")
}

pub fn database_address(db_identifier: &str, region: &str) -> String {
    let suffix = fingerprint(&[region, db_identifier, "rds"]) & 0xffff_ffff_ffff;
    format!("{db_identifier}.c{suffix:012x}.{region}.rds.amazonaws.com")
}

pub fn cluster_endpoint(cluster_name: &str, region: &str) -> String {
    let high = fingerprint(&[region, cluster_name, "eks"]);
    let low = fingerprint(&[cluster_name, region, "eks"]);
    format!("https://{high:016X}{low:016X}.gr7.{region}.eks.amazonaws.com")
}

/// Kubeconfig for a cluster, authenticating through `aws eks get-token`
pub fn kubeconfig(cluster_name: &str, endpoint: &str, region: &str) -> Json {
    json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{
            "name": cluster_name,
            "cluster": { "server": endpoint },
        }],
        "contexts": [{
            "name": cluster_name,
            "context": { "cluster": cluster_name, "user": cluster_name },
        }],
        "current-context": cluster_name,
        "users": [{
            "name": cluster_name,
            "user": {
                "exec": {
                    "apiVersion": "client.authentication.k8s.io/v1beta1",
                    "command": "aws",
                    "args": [
                        "eks", "get-token",
                        "--cluster-name", cluster_name,
                        "--region", region,
                    ],
                },
            },
        }],
    })
}
