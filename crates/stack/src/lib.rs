//! Declarative ECS service stack.
//!
//! This crate declares a small, fixed piece of AWS infrastructure and hands it
//! to CloudFormation:
//!
//! - **Network** - a VPC with one public subnet per availability zone
//! - **Cluster** - an ECS cluster backed by either Fargate or an EC2
//!   auto-scaling group
//! - **Task** - a single-container task definition with `awslogs` logging
//! - **Service** - an ECS service keeping the task running
//! - **Load balancer** - a public application load balancer whose port 80
//!   listener forwards to the container port
//!
//! ## Capacity Modes
//!
//! 1. **Fargate** - serverless; task sizes must be a Fargate combination
//! 2. **EC2** - self-managed instances registered through one capacity
//!    provider; any positive task size is accepted
//!
//! # Example
//!
//! ```rust
//! use ecs_stack::{CapacityMode, ContainerSpec, StackBuilder};
//!
//! let mut builder = StackBuilder::new("simple-service-fargate");
//! let network = builder.define_network("simple-service-fargate", 3);
//! let cluster = builder.define_cluster("simple-service-fargate", &network, CapacityMode::Fargate)?;
//! let role = builder.define_execution_role("simple-service-fargate-container");
//! let task = builder.define_task(
//!     "simple-service-fargate",
//!     &cluster,
//!     &role,
//!     ContainerSpec {
//!         name: "web".into(),
//!         image: "stevepotterredefine/simple_server:latest".into(),
//!         port: 5100,
//!         cpu: 256,
//!         memory_mib: 512,
//!         stream_prefix: None,
//!     },
//! )?;
//! let service = builder.define_service("simple-service-fargate", &cluster, &task)?;
//! builder.define_load_balancer("simple-service-fargate", &network, &service, 5100)?;
//!
//! let template = builder.emit()?.to_json()?;
//! assert!(template.contains("AWS::ElasticLoadBalancingV2::Listener"));
//! # Ok::<(), ecs_stack::StackError>(())
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod builder;
pub mod config;
pub mod error;
pub mod fargate;
pub mod model;
pub mod provision;
mod render;
pub mod template;

pub use builder::{StackBuilder, LISTENER_PORT};
pub use config::StackConfig;
pub use error::StackError;
pub use model::{
    AmiGeneration, AmiHardware, Capacity, CapacityMode, ClusterConfig, Compatibility,
    ContainerSpec, ExecutionRole, InstanceType, LoadBalancerConfig, MachineImage, NetworkConfig,
    ServiceConfig, TaskSpec,
};
pub use render::dns_output_key;
pub use template::ResourceGraph;
