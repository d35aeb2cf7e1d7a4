//! Engine settings

use crate::error::FlowError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_CONCURRENCY: usize = 4;

/// What the evaluator does after a resource fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Keep applying independent branches
    #[default]
    Continue,
    /// Let in-flight calls finish, dispatch nothing new
    StopOnFirstError,
}

/// What happens to successful changes when a run does not fully succeed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RollbackPolicy {
    /// Leave applied resources in place
    #[default]
    Incremental,
    /// Undo every change made by the run
    Transactional,
}

impl FromStr for FailurePolicy {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "continue" => Ok(FailurePolicy::Continue),
            "stop" | "stop-on-first-error" => Ok(FailurePolicy::StopOnFirstError),
            other => Err(FlowError::InvalidConfig(format!(
                "unknown failure policy '{}' (expected continue or stop)",
                other
            ))),
        }
    }
}

impl FromStr for RollbackPolicy {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incremental" => Ok(RollbackPolicy::Incremental),
            "transactional" => Ok(RollbackPolicy::Transactional),
            other => Err(FlowError::InvalidConfig(format!(
                "unknown rollback policy '{}' (expected incremental or transactional)",
                other
            ))),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Continue => write!(f, "continue"),
            FailurePolicy::StopOnFirstError => write!(f, "stop"),
        }
    }
}

impl fmt::Display for RollbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackPolicy::Incremental => write!(f, "incremental"),
            RollbackPolicy::Transactional => write!(f, "transactional"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Maximum provider calls in flight
    pub concurrency: usize,

    pub failure_policy: FailurePolicy,

    pub rollback_policy: RollbackPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            failure_policy: FailurePolicy::default(),
            rollback_policy: RollbackPolicy::default(),
        }
    }
}

impl EngineSettings {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_rollback_policy(mut self, policy: RollbackPolicy) -> Self {
        self.rollback_policy = policy;
        self
    }

    /// Concurrency clamped to at least one worker.
    pub fn worker_limit(&self) -> usize {
        self.concurrency.max(1)
    }
}
