//! Declared stack entities.
//!
//! Every record here is produced by [`StackBuilder`](crate::StackBuilder) and
//! is immutable once declared. Records reference each other by id.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StackError;

/// Trust principal for ECS task execution roles.
pub const ECS_TASKS_PRINCIPAL: &str = "ecs-tasks.amazonaws.com";

/// AWS managed policy granting image pull and log delivery.
pub const TASK_EXECUTION_POLICY: &str = "service-role/AmazonECSTaskExecutionRolePolicy";

/// AWS managed policy for container instances joining an ECS cluster.
pub const CONTAINER_INSTANCE_POLICY: &str = "service-role/AmazonEC2ContainerServiceforEC2Role";

// ============================================================================
// Capacity
// ============================================================================

/// EC2 instance type, split into class and size (e.g. `t3` + `small`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstanceType {
    /// Instance class (e.g. "t3", "m6i").
    pub class: String,
    /// Instance size (e.g. "small", "xlarge").
    pub size: String,
}

impl InstanceType {
    /// Build an instance type from its class and size.
    #[must_use]
    pub fn of(class: impl Into<String>, size: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            size: size.into(),
        }
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class, self.size)
    }
}

impl FromStr for InstanceType {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((class, size))
                if !class.is_empty()
                    && !size.is_empty()
                    && !size.contains('.')
                    && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-') =>
            {
                Ok(Self::of(class.to_lowercase(), size.to_lowercase()))
            }
            _ => Err(StackError::Config(format!(
                "instance type must look like <class>.<size>, got {s:?}"
            ))),
        }
    }
}

impl TryFrom<String> for InstanceType {
    type Error = StackError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InstanceType> for String {
    fn from(value: InstanceType) -> Self {
        value.to_string()
    }
}

/// Amazon Linux generation of an ECS-optimized image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmiGeneration {
    /// Amazon Linux 2023.
    #[default]
    AmazonLinux2023,
    /// Amazon Linux 2.
    AmazonLinux2,
}

/// Hardware flavour of an ECS-optimized image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmiHardware {
    /// x86_64.
    #[default]
    Standard,
    /// Graviton (arm64).
    Arm,
    /// NVIDIA GPU.
    Gpu,
    /// AWS Inferentia / Trainium.
    Neuron,
}

/// Machine image for container instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MachineImage {
    /// The recommended ECS-optimized AMI, resolved at deploy time.
    EcsOptimized {
        #[serde(default)]
        generation: AmiGeneration,
        #[serde(default)]
        hardware: AmiHardware,
    },
    /// A fixed AMI id.
    Ami { id: String },
}

impl MachineImage {
    /// ECS-optimized Amazon Linux 2023 for the given hardware.
    #[must_use]
    pub fn amazon_linux_2023(hardware: AmiHardware) -> Self {
        Self::EcsOptimized {
            generation: AmiGeneration::AmazonLinux2023,
            hardware,
        }
    }

    /// Public SSM parameter holding the recommended AMI id, if this image is
    /// resolved through one.
    #[must_use]
    pub fn ssm_parameter(&self) -> Option<String> {
        let Self::EcsOptimized {
            generation,
            hardware,
        } = self
        else {
            return None;
        };

        let base = match generation {
            AmiGeneration::AmazonLinux2023 => "amazon-linux-2023",
            AmiGeneration::AmazonLinux2 => "amazon-linux-2",
        };
        let flavour = match (generation, hardware) {
            (_, AmiHardware::Standard) => "",
            (_, AmiHardware::Arm) => "arm64/",
            (_, AmiHardware::Gpu) => "gpu/",
            (AmiGeneration::AmazonLinux2023, AmiHardware::Neuron) => "neuron/",
            (AmiGeneration::AmazonLinux2, AmiHardware::Neuron) => "inf/",
        };
        Some(format!(
            "/aws/service/ecs/optimized-ami/{base}/{flavour}recommended/image_id"
        ))
    }
}

/// Capacity strategy requested when declaring a cluster.
///
/// EC2 parameters are optional here so that partially-filled profiles can be
/// rejected with a precise error by
/// [`StackBuilder::define_cluster`](crate::StackBuilder::define_cluster).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case", try_from = "CapacitySection")]
pub enum CapacityMode {
    /// Self-managed instances in an auto-scaling group.
    Ec2 {
        instance_type: Option<InstanceType>,
        machine_image: Option<MachineImage>,
        min_capacity: u32,
        max_capacity: u32,
    },
    /// Serverless capacity.
    Fargate,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum CapacityKind {
    Ec2,
    Fargate,
}

/// `capacity` section of a profile as written, before the mode is checked
/// against the fields present.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CapacitySection {
    mode: CapacityKind,
    #[serde(default)]
    instance_type: Option<InstanceType>,
    #[serde(default)]
    machine_image: Option<MachineImage>,
    #[serde(default)]
    min_capacity: Option<u32>,
    #[serde(default)]
    max_capacity: Option<u32>,
}

impl TryFrom<CapacitySection> for CapacityMode {
    type Error = StackError;

    fn try_from(section: CapacitySection) -> Result<Self, Self::Error> {
        match section.mode {
            CapacityKind::Ec2 => Ok(Self::Ec2 {
                instance_type: section.instance_type,
                machine_image: section.machine_image,
                min_capacity: section.min_capacity.unwrap_or_else(default_min_capacity),
                max_capacity: section.max_capacity.unwrap_or_else(default_max_capacity),
            }),
            CapacityKind::Fargate => {
                let ec2_only = [
                    ("instance_type", section.instance_type.is_some()),
                    ("machine_image", section.machine_image.is_some()),
                    ("min_capacity", section.min_capacity.is_some()),
                    ("max_capacity", section.max_capacity.is_some()),
                ];
                match ec2_only.iter().find(|(_, present)| *present) {
                    Some((field, _)) => Err(StackError::Config(format!(
                        "{field} only applies to EC2 capacity"
                    ))),
                    None => Ok(Self::Fargate),
                }
            }
        }
    }
}

fn default_min_capacity() -> u32 {
    1
}

fn default_max_capacity() -> u32 {
    1
}

impl CapacityMode {
    /// EC2 capacity with the given instance type and image, one instance.
    #[must_use]
    pub fn ec2(instance_type: InstanceType, machine_image: MachineImage) -> Self {
        Self::Ec2 {
            instance_type: Some(instance_type),
            machine_image: Some(machine_image),
            min_capacity: default_min_capacity(),
            max_capacity: default_max_capacity(),
        }
    }
}

/// Resolved EC2 capacity backing a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AsgCapacity {
    /// Instance type of the auto-scaling group.
    pub instance_type: InstanceType,
    /// Image the instances boot from.
    pub machine_image: MachineImage,
    /// Minimum group size.
    pub min_capacity: u32,
    /// Maximum group size.
    pub max_capacity: u32,
}

/// Capacity backing a declared cluster. Exactly one per cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Capacity {
    /// Auto-scaling group registered through a capacity provider.
    Ec2(AsgCapacity),
    /// Fargate.
    Fargate,
}

/// Launch type a task definition is compatible with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Compatibility {
    /// EC2 container instances (bridge networking).
    #[serde(rename = "EC2")]
    Ec2,
    /// Fargate (awsvpc networking).
    #[serde(rename = "FARGATE")]
    Fargate,
}

impl Capacity {
    /// Launch compatibility of tasks placed on this capacity.
    #[must_use]
    pub fn compatibility(&self) -> Compatibility {
        match self {
            Self::Ec2(_) => Compatibility::Ec2,
            Self::Fargate => Compatibility::Fargate,
        }
    }
}

impl fmt::Display for Compatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ec2 => write!(f, "EC2"),
            Self::Fargate => write!(f, "FARGATE"),
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// Virtual network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkConfig {
    /// Network identifier (also the VPC name).
    pub id: String,
    /// Maximum number of availability zones to spread subnets over.
    pub max_azs: u8,
}

/// ECS cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterConfig {
    /// Cluster name.
    pub id: String,
    /// Owning network id.
    pub network: String,
    /// Capacity strategy.
    pub capacity: Capacity,
}

/// IAM role assumed by the ECS agent to pull images and ship logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionRole {
    /// Role name.
    pub id: String,
    /// Service principal trusted to assume the role.
    pub principal: String,
    /// AWS managed policies attached to the role.
    pub managed_policies: Vec<String>,
    /// Human-readable description.
    pub description: String,
}

/// Container parameters supplied to
/// [`StackBuilder::define_task`](crate::StackBuilder::define_task).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name used for load balancer targeting.
    pub name: String,
    /// Image reference (e.g. `repo/name:latest`).
    pub image: String,
    /// Port the container listens on.
    pub port: u16,
    /// CPU units (1024 = 1 vCPU).
    pub cpu: u32,
    /// Hard memory limit in MiB.
    pub memory_mib: u32,
    /// Log stream prefix; defaults to the task id.
    pub stream_prefix: Option<String>,
}

/// `awslogs` driver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogConfig {
    /// Prefix for log stream names.
    pub stream_prefix: String,
    /// Retention in days; `None` keeps logs forever.
    pub retention_days: Option<u32>,
}

/// Task definition with a single container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSpec {
    /// Task family.
    pub id: String,
    /// CPU units.
    pub cpu: u32,
    /// Memory limit in MiB.
    pub memory_mib: u32,
    /// Container name.
    pub container_name: String,
    /// Container image reference.
    pub image: String,
    /// Container port.
    pub container_port: u16,
    /// Execution role id.
    pub execution_role: String,
    /// Log configuration.
    pub logging: LogConfig,
    /// Launch compatibility, taken from the cluster.
    pub compatibility: Compatibility,
}

/// ECS service running the task on the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceConfig {
    /// Service name.
    pub id: String,
    /// Cluster id.
    pub cluster: String,
    /// Task family.
    pub task: String,
    /// Number of tasks kept running.
    pub desired_count: u32,
}

/// Application load balancer in front of the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadBalancerConfig {
    /// Load balancer (and target group) name.
    pub id: String,
    /// Network id.
    pub network: String,
    /// Whether the load balancer has a public address.
    pub internet_facing: bool,
    /// HTTP listener port.
    pub listener_port: u16,
    /// Service receiving traffic.
    pub service: String,
    /// Container receiving traffic.
    pub container_name: String,
    /// Container port receiving traffic.
    pub container_port: u16,
    /// Whether deletion protection is enabled.
    pub deletion_protection: bool,
    /// CIDR allowed to reach the listener.
    pub ingress_cidr: String,
}
