//! Provisioning engine boundary.
//!
//! The builder only declares; an external engine creates the resources. This
//! module defines what the rest of the crate needs from such an engine and
//! provides a CloudFormation-backed implementation.
//!
//! Engine failures are surfaced verbatim. Nothing here retries: a failed
//! deployment is fixed by re-running the whole declaration.

mod cloudformation;
mod deployer;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use cloudformation::CloudFormation;
pub use deployer::{Deployer, Deployment, DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT};

/// Errors that can occur while provisioning a stack.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// The engine rejected a request. The message is the engine's own.
    #[error("Provisioning engine error: {0}")]
    Engine(String),

    /// The stack reached a failed terminal status.
    #[error("Stack {stack} ended in {status}: {reason}")]
    Failed {
        stack: String,
        status: StackStatus,
        reason: String,
    },

    /// The stack does not exist.
    #[error("Stack not found: {0}")]
    NotFound(String),

    /// The stack did not settle in time.
    #[error("Stack {stack} still in progress after {secs} seconds")]
    Timeout { stack: String, secs: u64 },

    /// The template could not be rendered.
    #[error("Template error: {0}")]
    Template(#[from] crate::error::StackError),
}

/// Coarse stack status, mapped from the engine's status strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackStatus {
    /// An operation is still running.
    InProgress,
    /// The last create or update succeeded.
    Complete,
    /// The last operation failed and was not rolled back.
    Failed,
    /// The last operation failed and was rolled back.
    RolledBack,
    /// The stack was deleted.
    Deleted,
    /// Unknown status.
    #[serde(other)]
    Unknown,
}

impl StackStatus {
    /// Map a CloudFormation status such as `CREATE_COMPLETE`.
    #[must_use]
    pub fn from_cloudformation(status: &str) -> Self {
        match status {
            "DELETE_COMPLETE" => Self::Deleted,
            "CREATE_COMPLETE" | "UPDATE_COMPLETE" | "IMPORT_COMPLETE" => Self::Complete,
            "ROLLBACK_COMPLETE" | "UPDATE_ROLLBACK_COMPLETE" | "IMPORT_ROLLBACK_COMPLETE" => {
                Self::RolledBack
            }
            s if s.ends_with("_FAILED") => Self::Failed,
            s if s.ends_with("_IN_PROGRESS") => Self::InProgress,
            _ => Self::Unknown,
        }
    }

    /// Whether no further transition happens without a new request.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl std::fmt::Display for StackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
            Self::RolledBack => write!(f, "rolled_back"),
            Self::Deleted => write!(f, "deleted"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// What the engine reports about a stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDescription {
    /// Engine-assigned stack id.
    pub stack_id: String,
    /// Stack name.
    pub name: String,
    /// Current status.
    pub status: StackStatus,
    /// Raw engine status string.
    pub raw_status: String,
    /// Engine-provided reason for the status, if any.
    pub reason: Option<String>,
    /// Output values keyed by output name.
    pub outputs: BTreeMap<String, String>,
}

impl StackDescription {
    /// Whether the stack's first creation failed and was rolled back.
    ///
    /// CloudFormation refuses updates in this state; the stack can only be
    /// deleted and created again.
    #[must_use]
    pub fn is_failed_creation(&self) -> bool {
        self.raw_status == "ROLLBACK_COMPLETE"
    }
}

/// An external infrastructure provisioning engine.
#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    /// Create the stack, or update it if it exists. Returns the stack id.
    async fn submit(&self, stack_name: &str, template_body: &str)
        -> Result<String, ProvisionError>;

    /// Describe a stack; `None` if it does not exist.
    async fn describe(&self, stack_name: &str)
        -> Result<Option<StackDescription>, ProvisionError>;

    /// Request deletion of a stack.
    async fn delete(&self, stack_name: &str) -> Result<(), ProvisionError>;
}
