//! `settings` node parsing

use crate::error::{FlowError, Result};
use crate::model::EngineSettings;
use kdl::KdlNode;

pub fn parse_settings(node: &KdlNode) -> Result<EngineSettings> {
    let mut settings = EngineSettings::default();

    let Some(children) = node.children() else {
        return Ok(settings);
    };

    for child in children.nodes() {
        let first = child.entries().first().map(|e| e.value());
        match child.name().value() {
            "concurrency" => {
                let value = first
                    .and_then(|v| v.as_integer())
                    .and_then(|v| usize::try_from(v).ok())
                    .filter(|v| *v > 0)
                    .ok_or_else(|| {
                        FlowError::InvalidConfig(
                            "settings.concurrency must be a positive integer".to_string(),
                        )
                    })?;
                settings.concurrency = value;
            }
            "on-failure" | "on_failure" => {
                settings.failure_policy = first
                    .and_then(|v| v.as_string())
                    .ok_or_else(|| {
                        FlowError::InvalidConfig("settings.on-failure must be a string".to_string())
                    })?
                    .parse()?;
            }
            "rollback" => {
                settings.rollback_policy = first
                    .and_then(|v| v.as_string())
                    .ok_or_else(|| {
                        FlowError::InvalidConfig("settings.rollback must be a string".to_string())
                    })?
                    .parse()?;
            }
            other => {
                tracing::warn!("Ignoring unknown setting '{}'", other);
            }
        }
    }

    Ok(settings)
}
