//! AWS CloudFormation engine.
//!
//! Credentials and region come from the standard AWS SDK provider chain
//! (environment, shared profile, instance metadata).

use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_cloudformation::types::{Capability, Stack};
use aws_sdk_cloudformation::Client;
use tracing::{debug, info};

use super::{ProvisionError, ProvisioningEngine, StackDescription, StackStatus};

/// Message CloudFormation returns when an update would change nothing.
const NO_UPDATES_MESSAGE: &str = "No updates are to be performed";

/// CloudFormation-backed provisioning engine.
#[derive(Clone, Debug)]
pub struct CloudFormation {
    client: Client,
}

impl CloudFormation {
    /// Build an engine from the default AWS configuration, optionally pinned
    /// to a region.
    pub async fn from_env(region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let config = loader.load().await;
        debug!(region = ?config.region(), "Loaded AWS configuration");
        Self {
            client: Client::new(&config),
        }
    }

    fn to_description(stack: &Stack) -> StackDescription {
        let raw_status = stack
            .stack_status()
            .map(|s| s.as_str().to_string())
            .unwrap_or_default();

        let outputs = stack
            .outputs()
            .iter()
            .filter_map(|o| {
                Some((
                    o.output_key()?.to_string(),
                    o.output_value()?.to_string(),
                ))
            })
            .collect::<BTreeMap<_, _>>();

        StackDescription {
            stack_id: stack.stack_id().unwrap_or_default().to_string(),
            name: stack.stack_name().unwrap_or_default().to_string(),
            status: StackStatus::from_cloudformation(&raw_status),
            raw_status,
            reason: stack.stack_status_reason().map(str::to_string),
            outputs,
        }
    }

    /// Whether a service error means the stack does not exist.
    fn is_missing_stack(message: Option<&str>) -> bool {
        message.is_some_and(|m| m.contains("does not exist"))
    }

    async fn create(&self, stack_name: &str, template_body: &str) -> Result<String, ProvisionError> {
        info!(stack = %stack_name, "Creating CloudFormation stack");
        let output = self
            .client
            .create_stack()
            .stack_name(stack_name)
            .template_body(template_body)
            .capabilities(Capability::CapabilityNamedIam)
            .send()
            .await
            .map_err(|e| ProvisionError::Engine(DisplayErrorContext(&e).to_string()))?;
        Ok(output.stack_id().unwrap_or(stack_name).to_string())
    }

    async fn update(&self, stack_name: &str, template_body: &str) -> Result<String, ProvisionError> {
        info!(stack = %stack_name, "Updating CloudFormation stack");
        let result = self
            .client
            .update_stack()
            .stack_name(stack_name)
            .template_body(template_body)
            .capabilities(Capability::CapabilityNamedIam)
            .send()
            .await;

        match result {
            Ok(output) => Ok(output.stack_id().unwrap_or(stack_name).to_string()),
            Err(e)
                if e.as_service_error()
                    .and_then(ProvideErrorMetadata::message)
                    .is_some_and(|m| m.contains(NO_UPDATES_MESSAGE)) =>
            {
                info!(stack = %stack_name, "Stack is already up to date");
                Ok(stack_name.to_string())
            }
            Err(e) => Err(ProvisionError::Engine(DisplayErrorContext(&e).to_string())),
        }
    }
}

#[async_trait]
impl ProvisioningEngine for CloudFormation {
    async fn submit(
        &self,
        stack_name: &str,
        template_body: &str,
    ) -> Result<String, ProvisionError> {
        match self.describe(stack_name).await? {
            Some(existing) if existing.status != StackStatus::Deleted => {
                self.update(stack_name, template_body).await
            }
            _ => self.create(stack_name, template_body).await,
        }
    }

    async fn describe(
        &self,
        stack_name: &str,
    ) -> Result<Option<StackDescription>, ProvisionError> {
        let result = self
            .client
            .describe_stacks()
            .stack_name(stack_name)
            .send()
            .await;

        match result {
            Ok(output) => Ok(output.stacks().first().map(Self::to_description)),
            Err(e)
                if Self::is_missing_stack(
                    e.as_service_error().and_then(ProvideErrorMetadata::message),
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(ProvisionError::Engine(DisplayErrorContext(&e).to_string())),
        }
    }

    async fn delete(&self, stack_name: &str) -> Result<(), ProvisionError> {
        info!(stack = %stack_name, "Deleting CloudFormation stack");
        self.client
            .delete_stack()
            .stack_name(stack_name)
            .send()
            .await
            .map_err(|e| ProvisionError::Engine(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_cloudformation::types::{Output, StackStatus as CfnStackStatus};

    #[test]
    fn test_to_description() {
        let stack = Stack::builder()
            .stack_id("arn:aws:cloudformation:us-east-1:123456789012:stack/demo/abc")
            .stack_name("demo")
            .stack_status(CfnStackStatus::CreateComplete)
            .outputs(
                Output::builder()
                    .output_key("demoDNS")
                    .output_value("demo-1.us-east-1.elb.amazonaws.com")
                    .build(),
            )
            .outputs(Output::builder().output_key("NoValue").build())
            .build();

        let description = CloudFormation::to_description(&stack);
        assert_eq!(description.name, "demo");
        assert_eq!(description.status, StackStatus::Complete);
        assert_eq!(description.raw_status, "CREATE_COMPLETE");
        assert_eq!(description.outputs.len(), 1);
        assert_eq!(
            description.outputs.get("demoDNS").map(String::as_str),
            Some("demo-1.us-east-1.elb.amazonaws.com")
        );
    }

    #[test]
    fn test_missing_stack_detection() {
        assert!(CloudFormation::is_missing_stack(Some(
            "Stack with id demo does not exist"
        )));
        assert!(!CloudFormation::is_missing_stack(Some("Rate exceeded")));
        assert!(!CloudFormation::is_missing_stack(None));
    }
}
