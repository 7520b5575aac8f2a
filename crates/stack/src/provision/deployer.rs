//! Submits a resource graph to an engine and waits for the outcome.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{ProvisionError, ProvisioningEngine, StackDescription, StackStatus};
use crate::template::ResourceGraph;

/// Default polling interval while a stack operation runs.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Default time to wait for a stack operation to finish.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// A successfully provisioned stack.
#[derive(Debug, Clone, Serialize)]
pub struct Deployment {
    /// Stack name.
    pub stack_name: String,
    /// Engine-assigned stack id.
    pub stack_id: String,
    /// Output values keyed by output name.
    pub outputs: BTreeMap<String, String>,
    /// When the engine reported completion.
    pub completed_at: DateTime<Utc>,
}

impl Deployment {
    /// Look up an output value.
    #[must_use]
    pub fn output(&self, key: &str) -> Option<&str> {
        self.outputs.get(key).map(String::as_str)
    }
}

/// Drives a [`ProvisioningEngine`] for one stack at a time.
pub struct Deployer<E> {
    engine: E,
    poll_interval: Duration,
    timeout: Duration,
}

impl<E: ProvisioningEngine> Deployer<E> {
    /// Create a deployer with the default poll interval and timeout.
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the polling interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set how long to wait for a stack operation.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Submit the graph and wait until the stack settles.
    ///
    /// A stack left behind by a failed first creation is deleted before the
    /// graph is submitted, since it cannot be updated.
    ///
    /// # Errors
    /// Returns the engine's error unchanged, [`ProvisionError::Failed`] if the
    /// stack ends in a failed or rolled-back state, and
    /// [`ProvisionError::Timeout`] if it does not settle in time.
    pub async fn deploy(&self, graph: &ResourceGraph) -> Result<Deployment, ProvisionError> {
        let stack_name = graph.stack_name.as_str();
        let body = graph.to_compact_json()?;

        if let Some(existing) = self.engine.describe(stack_name).await? {
            if existing.is_failed_creation() {
                warn!(
                    stack = %stack_name,
                    reason = existing.reason.as_deref().unwrap_or(""),
                    "Replacing stack whose creation was rolled back"
                );
                self.remove(stack_name).await?;
            }
        }

        info!(
            stack = %stack_name,
            resources = graph.resources.len(),
            template_bytes = body.len(),
            "Submitting stack"
        );
        let stack_id = self.engine.submit(stack_name, &body).await?;
        info!(stack = %stack_name, stack_id = %stack_id, "Stack submitted");

        let description = self
            .wait(stack_name)
            .await?
            .ok_or_else(|| ProvisionError::NotFound(stack_name.to_string()))?;

        if description.status != StackStatus::Complete {
            return Err(Self::failed(stack_name, description));
        }

        info!(stack = %stack_name, outputs = description.outputs.len(), "Stack deployed");
        Ok(Deployment {
            stack_name: stack_name.to_string(),
            stack_id: description.stack_id,
            outputs: description.outputs,
            completed_at: Utc::now(),
        })
    }

    /// Outputs of an existing stack.
    ///
    /// # Errors
    /// Returns [`ProvisionError::NotFound`] if the stack does not exist.
    pub async fn outputs(&self, stack_name: &str) -> Result<BTreeMap<String, String>, ProvisionError> {
        self.engine
            .describe(stack_name)
            .await?
            .map(|d| d.outputs)
            .ok_or_else(|| ProvisionError::NotFound(stack_name.to_string()))
    }

    /// Delete the stack and wait until it is gone.
    ///
    /// # Errors
    /// Returns [`ProvisionError::NotFound`] if the stack does not exist and
    /// [`ProvisionError::Failed`] if deletion fails.
    pub async fn destroy(&self, stack_name: &str) -> Result<(), ProvisionError> {
        if self.engine.describe(stack_name).await?.is_none() {
            return Err(ProvisionError::NotFound(stack_name.to_string()));
        }

        self.remove(stack_name).await
    }

    /// Request deletion and wait until the stack is gone.
    async fn remove(&self, stack_name: &str) -> Result<(), ProvisionError> {
        info!(stack = %stack_name, "Deleting stack");
        self.engine.delete(stack_name).await?;

        match self.wait(stack_name).await? {
            None => {}
            Some(d) if d.status == StackStatus::Deleted => {}
            Some(d) => return Err(Self::failed(stack_name, d)),
        }

        info!(stack = %stack_name, "Stack deleted");
        Ok(())
    }

    /// Poll until the stack reaches a terminal status or disappears.
    async fn wait(&self, stack_name: &str) -> Result<Option<StackDescription>, ProvisionError> {
        let start = Instant::now();

        loop {
            let Some(description) = self.engine.describe(stack_name).await? else {
                return Ok(None);
            };

            debug!(
                stack = %stack_name,
                status = %description.raw_status,
                elapsed_secs = start.elapsed().as_secs(),
                "Polling stack status"
            );

            if description.status.is_terminal() {
                return Ok(Some(description));
            }

            if start.elapsed() >= self.timeout {
                return Err(ProvisionError::Timeout {
                    stack: stack_name.to_string(),
                    secs: self.timeout.as_secs(),
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn failed(stack_name: &str, description: StackDescription) -> ProvisionError {
        warn!(
            stack = %stack_name,
            status = %description.raw_status,
            reason = description.reason.as_deref().unwrap_or(""),
            "Stack operation failed"
        );
        ProvisionError::Failed {
            stack: stack_name.to_string(),
            status: description.status,
            reason: description
                .reason
                .unwrap_or_else(|| description.raw_status.clone()),
        }
    }
}
