//! Per-kind input rules and simulated outputs

use crate::error::{LocalError, Result};
use crate::naming;
use serde_json::{Value as Json, json};
use strata_cloud::ResourceContext;
use strata_core::{Properties, ResourceKind};

/// Inputs never echoed back as outputs
const SECRET_INPUTS: [&str; 2] = ["password", "master_password"];

/// Inputs each built-in kind cannot do without
pub fn required_inputs(kind: &ResourceKind) -> &'static [&'static str] {
    match kind {
        ResourceKind::Network => &["cidr_block"],
        ResourceKind::Subnet => &["vpc_id", "cidr_block"],
        ResourceKind::SecurityGroup => &["vpc_id"],
        ResourceKind::SubnetGroup => &["subnet_ids"],
        ResourceKind::Database => &["engine", "instance_class"],
        ResourceKind::Cluster => &["vpc_id", "subnet_ids"],
        ResourceKind::Role => &["assume_role_policy"],
        ResourceKind::PolicyAttachment => &["role", "policy_arn"],
        ResourceKind::FargateProfile => &["cluster_name", "pod_execution_role_arn", "selectors"],
        ResourceKind::Custom(_) => &[],
    }
}

/// Inputs that must keep their value across updates
pub fn immutable_inputs(kind: &ResourceKind) -> &'static [&'static str] {
    match kind {
        ResourceKind::Subnet => &["vpc_id"],
        ResourceKind::SecurityGroup => &["vpc_id"],
        ResourceKind::Database => &["engine"],
        ResourceKind::Cluster => &["vpc_id"],
        ResourceKind::FargateProfile => &["cluster_name"],
        _ => &[],
    }
}

pub fn validate(resource: &ResourceContext, inputs: &Properties) -> Result<()> {
    for &input in required_inputs(&resource.kind) {
        if inputs.get(input).is_none_or(Json::is_null) {
            return Err(LocalError::MissingInput {
                kind: resource.kind.to_string(),
                id: resource.id.clone(),
                input,
            });
        }
    }

    for list in ["subnet_ids", "selectors", "security_group_ids", "vpc_security_group_ids"] {
        match inputs.get(list) {
            None | Some(Json::Null) => {}
            Some(Json::Array(items)) if !items.is_empty() => {}
            Some(Json::Array(_)) => return Err(invalid(list, "must not be empty")),
            Some(_) => return Err(invalid(list, "must be a list")),
        }
    }

    if let Some(cidr) = inputs.get("cidr_block") {
        check_cidr(cidr)?;
    }

    if resource.kind == ResourceKind::Role
        && let Some(policy) = inputs.get("assume_role_policy")
    {
        let text = policy
            .as_str()
            .ok_or_else(|| invalid("assume_role_policy", "must be a string"))?;
        serde_json::from_str::<Json>(text)
            .map_err(|e| invalid("assume_role_policy", &format!("not a JSON document: {e}")))?;
    }

    if let Some(storage) = inputs.get("allocated_storage")
        && !storage.as_i64().is_some_and(|gb| gb > 0)
    {
        return Err(invalid("allocated_storage", "must be a positive number of GiB"));
    }

    Ok(())
}

pub fn check_immutable(
    kind: &ResourceKind,
    previous: &Properties,
    inputs: &Properties,
) -> Result<()> {
    for &input in immutable_inputs(kind) {
        let was = previous.get(input).unwrap_or(&Json::Null);
        let now = inputs.get(input).unwrap_or(&Json::Null);
        if was != now {
            return Err(LocalError::Immutable {
                input,
                was: was.to_string(),
                now: now.to_string(),
            });
        }
    }
    Ok(())
}

fn invalid(input: &str, reason: &str) -> LocalError {
    LocalError::InvalidInput {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

fn check_cidr(value: &Json) -> Result<()> {
    let text = value
        .as_str()
        .ok_or_else(|| invalid("cidr_block", "must be a string"))?;
    let (address, prefix) = text
        .split_once('/')
        .ok_or_else(|| invalid("cidr_block", "expected <address>/<prefix>"))?;

    let octets: Vec<&str> = address.split('.').collect();
    let address_ok = octets.len() == 4 && octets.iter().all(|o| o.parse::<u8>().is_ok());
    let prefix_ok = prefix.parse::<u8>().is_ok_and(|p| p <= 32);
    if address_ok && prefix_ok {
        Ok(())
    } else {
        Err(invalid("cidr_block", &format!("'{text}' is not an IPv4 CIDR block")))
    }
}

fn text<'a>(inputs: &'a Properties, key: &str) -> Option<&'a str> {
    inputs.get(key).and_then(Json::as_str)
}

/// Outputs of the simulated object: the inputs (minus secrets) plus what
/// the real service would report.
pub fn outputs(
    resource: &ResourceContext,
    inputs: &Properties,
    region: &str,
    account_id: &str,
) -> Properties {
    let mut outputs: Properties = inputs
        .iter()
        .filter(|(name, _)| !SECRET_INPUTS.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    let id = resource.id.as_str();
    let mut set = |key: &str, value: Json| {
        outputs.insert(key.to_string(), value);
    };

    match &resource.kind {
        ResourceKind::Network => {
            let vpc_id = naming::physical_id("vpc", region, id);
            set("arn", json!(naming::arn("ec2", region, account_id, &format!("vpc/{vpc_id}"))));
            set("id", json!(vpc_id));
        }
        ResourceKind::Subnet => {
            let subnet_id = naming::physical_id("subnet", region, id);
            let zone = text(inputs, "availability_zone")
                .map(str::to_string)
                .unwrap_or_else(|| format!("{region}a"));
            let arn = naming::arn("ec2", region, account_id, &format!("subnet/{subnet_id}"));
            set("arn", json!(arn));
            set("availability_zone", json!(zone));
            set("id", json!(subnet_id));
        }
        ResourceKind::SecurityGroup => {
            let group_id = naming::physical_id("sg", region, id);
            let path = format!("security-group/{group_id}");
            set("arn", json!(naming::arn("ec2", region, account_id, &path)));
            set("name", json!(text(inputs, "name").unwrap_or(id)));
            set("id", json!(group_id));
        }
        ResourceKind::SubnetGroup => {
            let name = text(inputs, "name").unwrap_or(id).to_string();
            set("arn", json!(naming::arn("rds", region, account_id, &format!("subgrp:{name}"))));
            set("id", json!(name));
            set("name", json!(name));
        }
        ResourceKind::Database => {
            let identifier = text(inputs, "identifier").unwrap_or(id).to_string();
            let port = inputs
                .get("port")
                .and_then(Json::as_i64)
                .unwrap_or_else(|| default_port(text(inputs, "engine")));
            let address = naming::database_address(&identifier, region);
            set("arn", json!(naming::arn("rds", region, account_id, &format!("db:{identifier}"))));
            set("id", json!(naming::physical_id("db", region, id)));
            set("address", json!(address));
            set("endpoint", json!(format!("{address}:{port}")));
            set("port", json!(port));
            set("identifier", json!(identifier));
        }
        ResourceKind::Cluster => {
            let name = text(inputs, "name").unwrap_or(id).to_string();
            let endpoint = naming::cluster_endpoint(&name, region);
            set("arn", json!(naming::arn("eks", region, account_id, &format!("cluster/{name}"))));
            set("kubeconfig", naming::kubeconfig(&name, &endpoint, region));
            set("endpoint", json!(endpoint));
            set("id", json!(name));
            set("name", json!(name));
        }
        ResourceKind::Role => {
            let name = text(inputs, "name").unwrap_or(id).to_string();
            set("arn", json!(naming::iam_arn(account_id, &format!("role/{name}"))));
            set("id", json!(name));
            set("name", json!(name));
        }
        ResourceKind::PolicyAttachment => {
            let role = text(inputs, "role").unwrap_or(id);
            set("id", json!(format!("{role}-{:08x}", naming::fingerprint(&[id]) & 0xffff_ffff)));
        }
        ResourceKind::FargateProfile => {
            let cluster = text(inputs, "cluster_name").unwrap_or_default().to_string();
            let suffix = naming::fingerprint(&[region, cluster.as_str(), id]) & 0xffff_ffff;
            set(
                "arn",
                json!(naming::arn(
                    "eks",
                    region,
                    account_id,
                    &format!("fargateprofile/{cluster}/{id}/{suffix:08x}")
                )),
            );
            set("id", json!(format!("{cluster}:{id}")));
            set("status", json!("ACTIVE"));
        }
        ResourceKind::Custom(kind) => {
            set("id", json!(naming::physical_id(kind, region, id)));
        }
    }

    outputs
}

fn default_port(engine: Option<&str>) -> i64 {
    match engine {
        Some("mysql") | Some("mariadb") | Some("aurora-mysql") => 3306,
        Some("sqlserver-ex") | Some("sqlserver-se") => 1433,
        _ => 5432,
    }
}
