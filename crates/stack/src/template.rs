//! CloudFormation template representation of a resource graph.
//!
//! All maps are `BTreeMap`s and property bags are `serde_json::Value`s built
//! without the `preserve_order` feature, so serialising the same graph always
//! produces the same bytes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::Result;

/// Template format version understood by CloudFormation.
pub const FORMAT_VERSION: &str = "2010-09-09";

/// A single declared resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// CloudFormation resource type (e.g. `AWS::EC2::VPC`).
    #[serde(rename = "Type")]
    pub kind: String,
    /// Resource properties.
    #[serde(rename = "Properties")]
    pub properties: Value,
    /// Logical ids this resource must be created after.
    #[serde(rename = "DependsOn", default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// What CloudFormation does with the physical resource on stack deletion.
    #[serde(rename = "DeletionPolicy", skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<String>,
}

impl Resource {
    /// Create a resource of the given type.
    #[must_use]
    pub fn new(kind: impl Into<String>, properties: Value) -> Self {
        Self {
            kind: kind.into(),
            properties,
            depends_on: Vec::new(),
            deletion_policy: None,
        }
    }

    /// Add an explicit creation-order dependency.
    #[must_use]
    pub fn depends_on(mut self, logical_id: impl Into<String>) -> Self {
        self.depends_on.push(logical_id.into());
        self
    }

    /// Set the deletion policy (`Delete`, `Retain`, `Snapshot`).
    #[must_use]
    pub fn with_deletion_policy(mut self, policy: impl Into<String>) -> Self {
        self.deletion_policy = Some(policy.into());
        self
    }
}

/// A template parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter type.
    #[serde(rename = "Type")]
    pub kind: String,
    /// Default value.
    #[serde(rename = "Default", skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Description shown in the console.
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A named stack output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    /// Output value (usually an intrinsic).
    #[serde(rename = "Value")]
    pub value: Value,
    /// Description shown in the console.
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The whole declared graph as a CloudFormation template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceGraph {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Parameters", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Parameter>,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, Resource>,
    #[serde(rename = "Outputs", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Output>,
    /// Stack name the graph is deployed under. Not part of the template body.
    #[serde(skip)]
    pub stack_name: String,
}

impl ResourceGraph {
    /// Empty graph for the named stack.
    #[must_use]
    pub fn new(stack_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            description: description.into(),
            parameters: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
            stack_name: stack_name.into(),
        }
    }

    /// Add a resource under a logical id.
    pub fn add(&mut self, logical_id: impl Into<String>, resource: Resource) {
        self.resources.insert(logical_id.into(), resource);
    }

    /// Logical ids of every resource of the given type.
    #[must_use]
    pub fn resources_of_type(&self, kind: &str) -> Vec<(&str, &Resource)> {
        self.resources
            .iter()
            .filter(|(_, r)| r.kind == kind)
            .map(|(id, r)| (id.as_str(), r))
            .collect()
    }

    /// Template body as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Template body as compact JSON, as submitted to the provisioning engine.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_compact_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Intrinsic functions
// ============================================================================

/// `{"Ref": logical_id}`.
#[must_use]
pub fn reference(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

/// `{"Fn::GetAtt": [logical_id, attribute]}`.
#[must_use]
pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

/// Selects the `index`-th availability zone of the deployment region.
#[must_use]
pub fn availability_zone(index: usize) -> Value {
    json!({ "Fn::Select": [index, { "Fn::GetAZs": "" }] })
}

/// ARN of an AWS managed IAM policy in the current partition.
#[must_use]
pub fn managed_policy_arn(policy_name: &str) -> Value {
    json!({
        "Fn::Join": ["", ["arn:", reference("AWS::Partition"), ":iam::aws:policy/", policy_name]]
    })
}

/// Logical id safe form of a stack id: alphanumerics only.
#[must_use]
pub fn sanitize_logical_id(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_alphanumeric).collect()
}
