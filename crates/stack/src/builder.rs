//! Stack definition builder.
//!
//! Declaration is a straight-line sequence: network, cluster, execution role,
//! task, service, load balancer, then [`StackBuilder::emit`]. Each `define_*`
//! call validates its own inputs; `emit` validates that the declared entities
//! reference each other consistently and renders the resource graph.

use tracing::{debug, info};

use crate::config::StackConfig;
use crate::error::{Result, StackError};
use crate::fargate;
use crate::model::{
    AsgCapacity, Capacity, CapacityMode, ClusterConfig, Compatibility, ContainerSpec,
    ExecutionRole, LoadBalancerConfig, LogConfig, NetworkConfig, ServiceConfig, TaskSpec,
    ECS_TASKS_PRINCIPAL, TASK_EXECUTION_POLICY,
};
use crate::render::{self, DeclaredStack};
use crate::template::ResourceGraph;

/// Port of the single public HTTP listener.
pub const LISTENER_PORT: u16 = 80;

/// CIDR the listener accepts traffic from.
pub const OPEN_INGRESS_CIDR: &str = "0.0.0.0/0";

/// Lower bound on availability zones; an application load balancer needs
/// subnets in at least two.
pub const MIN_SUPPORTED_AZS: u8 = 2;

/// Upper bound on availability zones a network may span.
pub const MAX_SUPPORTED_AZS: u8 = 6;

/// Default number of running tasks per service.
pub const DEFAULT_DESIRED_COUNT: u32 = 1;

/// Character and length limits AWS places on a resource name.
struct NameRule {
    what: &'static str,
    min_len: usize,
    max_len: usize,
    /// Punctuation allowed besides ASCII letters and digits.
    punctuation: &'static str,
    letter_first: bool,
    hyphen_edges: bool,
}

const STACK_NAME: NameRule = NameRule {
    what: "stack name",
    min_len: 1,
    max_len: 128,
    punctuation: "-",
    letter_first: true,
    hyphen_edges: true,
};

const LOAD_BALANCER_NAME: NameRule = NameRule {
    what: "load balancer name",
    min_len: 1,
    max_len: 32,
    punctuation: "-",
    letter_first: false,
    hyphen_edges: false,
};

const ROLE_NAME: NameRule = NameRule {
    what: "role name",
    min_len: 1,
    max_len: 64,
    punctuation: "+=,.@_-",
    letter_first: false,
    hyphen_edges: true,
};

const ECS_NAME: NameRule = NameRule {
    what: "cluster, service or task family name",
    min_len: 1,
    max_len: 255,
    punctuation: "_-",
    letter_first: false,
    hyphen_edges: true,
};

const LAUNCH_TEMPLATE_NAME: NameRule = NameRule {
    what: "launch template and auto-scaling group name",
    min_len: 3,
    max_len: 128,
    punctuation: "()./_-",
    letter_first: false,
    hyphen_edges: true,
};

impl NameRule {
    fn check(&self, name: &str) -> Result<()> {
        let problem = if name.len() < self.min_len || name.len() > self.max_len {
            Some(format!(
                "must be {} to {} characters long",
                self.min_len, self.max_len
            ))
        } else if let Some(c) = name
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !self.punctuation.contains(*c))
        {
            Some(format!("contains {c:?}"))
        } else if self.letter_first && !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
            Some("must start with a letter".to_string())
        } else if !self.hyphen_edges && (name.starts_with('-') || name.ends_with('-')) {
            Some("must not start or end with a hyphen".to_string())
        } else {
            None
        };

        match problem {
            Some(problem) => Err(StackError::Config(format!(
                "{} {name:?} {problem}",
                self.what
            ))),
            None => Ok(()),
        }
    }
}

/// Builds one stack's resource graph.
#[derive(Debug, Clone)]
pub struct StackBuilder {
    stack_id: String,
    desired_count: u32,
    log_retention_days: Option<u32>,
    network: Option<NetworkConfig>,
    cluster: Option<ClusterConfig>,
    role: Option<ExecutionRole>,
    task: Option<TaskSpec>,
    service: Option<ServiceConfig>,
    load_balancer: Option<LoadBalancerConfig>,
}

impl StackBuilder {
    /// Start declaring the stack named `stack_id`.
    #[must_use]
    pub fn new(stack_id: impl Into<String>) -> Self {
        Self {
            stack_id: stack_id.into(),
            desired_count: DEFAULT_DESIRED_COUNT,
            log_retention_days: None,
            network: None,
            cluster: None,
            role: None,
            task: None,
            service: None,
            load_balancer: None,
        }
    }

    /// Set the number of tasks services declared afterwards keep running.
    #[must_use]
    pub fn with_desired_count(mut self, desired_count: u32) -> Self {
        self.desired_count = desired_count;
        self
    }

    /// Expire task logs after the given number of days.
    #[must_use]
    pub fn with_log_retention_days(mut self, days: u32) -> Self {
        self.log_retention_days = Some(days);
        self
    }

    /// Declare the virtual network.
    ///
    /// The rendered network has exactly `max_azs` public subnets, taken in
    /// order from the region's availability zones, so the target region must
    /// have at least that many. [`emit`](Self::emit) accepts
    /// [`MIN_SUPPORTED_AZS`] to [`MAX_SUPPORTED_AZS`].
    pub fn define_network(&mut self, id: impl Into<String>, max_azs: u8) -> NetworkConfig {
        let network = NetworkConfig {
            id: id.into(),
            max_azs,
        };
        debug!(network = %network.id, max_azs, "Declared network");
        self.network = Some(network.clone());
        network
    }

    /// Declare the ECS cluster and its capacity.
    ///
    /// # Errors
    /// Returns [`StackError::MissingCapacityParameter`] if EC2 capacity is
    /// requested without an instance type or machine image, and
    /// [`StackError::Config`] if the group size bounds are unusable.
    pub fn define_cluster(
        &mut self,
        id: impl Into<String>,
        network: &NetworkConfig,
        mode: CapacityMode,
    ) -> Result<ClusterConfig> {
        let capacity = match mode {
            CapacityMode::Fargate => Capacity::Fargate,
            CapacityMode::Ec2 {
                instance_type,
                machine_image,
                min_capacity,
                max_capacity,
            } => {
                let instance_type =
                    instance_type.ok_or(StackError::MissingCapacityParameter("instance_type"))?;
                let machine_image =
                    machine_image.ok_or(StackError::MissingCapacityParameter("machine_image"))?;
                if max_capacity == 0 || min_capacity > max_capacity {
                    return Err(StackError::Config(format!(
                        "auto-scaling group bounds must satisfy 0 <= min <= max and max > 0, got min={min_capacity} max={max_capacity}"
                    )));
                }
                Capacity::Ec2(AsgCapacity {
                    instance_type,
                    machine_image,
                    min_capacity,
                    max_capacity,
                })
            }
        };

        let cluster = ClusterConfig {
            id: id.into(),
            network: network.id.clone(),
            capacity,
        };
        debug!(
            cluster = %cluster.id,
            compatibility = %cluster.capacity.compatibility(),
            "Declared cluster"
        );
        self.cluster = Some(cluster.clone());
        Ok(cluster)
    }

    /// Declare the task execution role.
    pub fn define_execution_role(&mut self, id: impl Into<String>) -> ExecutionRole {
        let role = ExecutionRole {
            id: id.into(),
            principal: ECS_TASKS_PRINCIPAL.to_string(),
            managed_policies: vec![TASK_EXECUTION_POLICY.to_string()],
            description: "Role for the ECS container.".to_string(),
        };
        debug!(role = %role.id, "Declared execution role");
        self.role = Some(role.clone());
        role
    }

    /// Declare the task definition running `container` on `cluster`.
    ///
    /// # Errors
    /// Returns [`StackError::InvalidTaskSize`] if the cluster is Fargate and
    /// the cpu/memory pair is not a Fargate size, and [`StackError::Config`]
    /// if any size or the port is zero.
    pub fn define_task(
        &mut self,
        id: impl Into<String>,
        cluster: &ClusterConfig,
        role: &ExecutionRole,
        container: ContainerSpec,
    ) -> Result<TaskSpec> {
        let id = id.into();
        if container.cpu == 0 || container.memory_mib == 0 {
            return Err(StackError::Config(format!(
                "task {id} needs positive cpu and memory, got cpu={} memory={}",
                container.cpu, container.memory_mib
            )));
        }
        if container.port == 0 {
            return Err(StackError::Config(format!("task {id} needs a container port")));
        }

        let compatibility = cluster.capacity.compatibility();
        if compatibility == Compatibility::Fargate
            && !fargate::accepts(container.cpu, container.memory_mib)
        {
            return Err(StackError::InvalidTaskSize {
                cpu: container.cpu,
                memory_mib: container.memory_mib,
            });
        }

        let task = TaskSpec {
            cpu: container.cpu,
            memory_mib: container.memory_mib,
            container_name: container.name,
            image: container.image,
            container_port: container.port,
            execution_role: role.id.clone(),
            logging: LogConfig {
                stream_prefix: container.stream_prefix.unwrap_or_else(|| id.clone()),
                retention_days: self.log_retention_days,
            },
            compatibility,
            id,
        };
        debug!(
            task = %task.id,
            cpu = task.cpu,
            memory_mib = task.memory_mib,
            image = %task.image,
            "Declared task"
        );
        self.task = Some(task.clone());
        Ok(task)
    }

    /// Declare the service running `task` on `cluster`.
    ///
    /// # Errors
    /// Returns [`StackError::Inconsistent`] if the task was declared for a
    /// different launch type than the cluster provides.
    pub fn define_service(
        &mut self,
        id: impl Into<String>,
        cluster: &ClusterConfig,
        task: &TaskSpec,
    ) -> Result<ServiceConfig> {
        let id = id.into();
        let cluster_compatibility = cluster.capacity.compatibility();
        if task.compatibility != cluster_compatibility {
            return Err(StackError::Inconsistent(format!(
                "service {id}: task {} targets {} but cluster {} provides {}",
                task.id, task.compatibility, cluster.id, cluster_compatibility
            )));
        }

        let service = ServiceConfig {
            id,
            cluster: cluster.id.clone(),
            task: task.id.clone(),
            desired_count: self.desired_count,
        };
        debug!(service = %service.id, desired_count = service.desired_count, "Declared service");
        self.service = Some(service.clone());
        Ok(service)
    }

    /// Declare the public load balancer routing port 80 to the service.
    ///
    /// # Errors
    /// Returns [`StackError::Incomplete`] if the service's task has not been
    /// declared, and [`StackError::Inconsistent`] if `container_port` is not
    /// the port that task exposes.
    pub fn define_load_balancer(
        &mut self,
        id: impl Into<String>,
        network: &NetworkConfig,
        service: &ServiceConfig,
        container_port: u16,
    ) -> Result<LoadBalancerConfig> {
        let id = id.into();
        let task = self
            .task
            .as_ref()
            .filter(|t| t.id == service.task)
            .ok_or(StackError::Incomplete("task for the load-balanced service"))?;

        if task.container_port != container_port {
            return Err(StackError::Inconsistent(format!(
                "load balancer {id} targets port {container_port} but container {} listens on {}",
                task.container_name, task.container_port
            )));
        }

        let load_balancer = LoadBalancerConfig {
            id,
            network: network.id.clone(),
            internet_facing: true,
            listener_port: LISTENER_PORT,
            service: service.id.clone(),
            container_name: task.container_name.clone(),
            container_port,
            deletion_protection: false,
            ingress_cidr: OPEN_INGRESS_CIDR.to_string(),
        };
        debug!(
            load_balancer = %load_balancer.id,
            listener_port = load_balancer.listener_port,
            container_port,
            "Declared load balancer"
        );
        self.load_balancer = Some(load_balancer.clone());
        Ok(load_balancer)
    }

    /// Validate the declared entities and render the resource graph.
    ///
    /// # Errors
    /// Returns [`StackError::Incomplete`] if an entity is missing,
    /// [`StackError::Config`] if a name or the zone count is not accepted by
    /// AWS, and [`StackError::Inconsistent`] if the declarations do not fit
    /// together.
    pub fn emit(&self) -> Result<ResourceGraph> {
        let declared = self.declared()?;
        let graph = render::render(&self.stack_id, &declared);
        info!(
            stack = %self.stack_id,
            resources = graph.resources.len(),
            outputs = graph.outputs.len(),
            "Emitted resource graph"
        );
        Ok(graph)
    }

    /// Run the whole declaration sequence for a stack profile.
    ///
    /// Every entity is named after the stack id, and the execution role is
    /// named `<stack_id>-container`.
    ///
    /// # Errors
    /// Returns the first declaration error encountered.
    pub fn from_profile(config: &StackConfig) -> Result<ResourceGraph> {
        let id = config.stack_id.as_str();
        let mut builder = Self::new(id).with_desired_count(config.desired_count);
        if let Some(days) = config.log_retention_days {
            builder = builder.with_log_retention_days(days);
        }

        let network = builder.define_network(id, config.max_azs);
        let cluster = builder.define_cluster(id, &network, config.capacity.clone())?;
        let role = builder.define_execution_role(format!("{id}-container"));
        let task = builder.define_task(
            id,
            &cluster,
            &role,
            ContainerSpec {
                name: config.container_name.clone(),
                image: config.image.clone(),
                port: config.container_port,
                cpu: config.cpu,
                memory_mib: config.memory_mib,
                stream_prefix: None,
            },
        )?;
        let service = builder.define_service(id, &cluster, &task)?;
        builder.define_load_balancer(id, &network, &service, config.container_port)?;
        builder.emit()
    }

    fn declared(&self) -> Result<DeclaredStack<'_>> {
        let network = self.network.as_ref().ok_or(StackError::Incomplete("network"))?;
        let cluster = self.cluster.as_ref().ok_or(StackError::Incomplete("cluster"))?;
        let role = self
            .role
            .as_ref()
            .ok_or(StackError::Incomplete("execution role"))?;
        let task = self.task.as_ref().ok_or(StackError::Incomplete("task"))?;
        let service = self.service.as_ref().ok_or(StackError::Incomplete("service"))?;
        let load_balancer = self
            .load_balancer
            .as_ref()
            .ok_or(StackError::Incomplete("load balancer"))?;

        if !(MIN_SUPPORTED_AZS..=MAX_SUPPORTED_AZS).contains(&network.max_azs) {
            return Err(StackError::Config(format!(
                "network {} must span {MIN_SUPPORTED_AZS} to {MAX_SUPPORTED_AZS} availability zones, got {}",
                network.id, network.max_azs
            )));
        }

        STACK_NAME.check(&self.stack_id)?;
        LOAD_BALANCER_NAME.check(&load_balancer.id)?;
        ROLE_NAME.check(&role.id)?;
        for name in [&cluster.id, &service.id, &task.id] {
            ECS_NAME.check(name)?;
        }
        if matches!(cluster.capacity, Capacity::Ec2(_)) {
            LAUNCH_TEMPLATE_NAME.check(&cluster.id)?;
        }

        let links = [
            ("cluster network", &cluster.network, &network.id),
            ("task execution role", &task.execution_role, &role.id),
            ("service cluster", &service.cluster, &cluster.id),
            ("service task", &service.task, &task.id),
            ("load balancer network", &load_balancer.network, &network.id),
            ("load balancer service", &load_balancer.service, &service.id),
            (
                "load balancer container",
                &load_balancer.container_name,
                &task.container_name,
            ),
        ];
        for (what, referenced, declared) in links {
            if referenced != declared {
                return Err(StackError::Inconsistent(format!(
                    "{what} refers to {referenced:?} but {declared:?} is declared"
                )));
            }
        }
        if load_balancer.container_port != task.container_port {
            return Err(StackError::Inconsistent(format!(
                "load balancer targets port {} but task {} exposes {}",
                load_balancer.container_port, task.id, task.container_port
            )));
        }
        if task.compatibility != cluster.capacity.compatibility() {
            return Err(StackError::Inconsistent(format!(
                "task {} targets {} but cluster {} provides {}",
                task.id,
                task.compatibility,
                cluster.id,
                cluster.capacity.compatibility()
            )));
        }

        Ok(DeclaredStack {
            network,
            cluster,
            role,
            task,
            service,
            load_balancer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AmiHardware, InstanceType, MachineImage};

    fn container(cpu: u32, memory_mib: u32) -> ContainerSpec {
        ContainerSpec {
            name: "web".to_string(),
            image: "stevepotterredefine/simple_server:latest".to_string(),
            port: 5100,
            cpu,
            memory_mib,
            stream_prefix: None,
        }
    }

    fn declare(builder: &mut StackBuilder, mode: CapacityMode) -> Result<()> {
        let network = builder.define_network("demo", 3);
        let cluster = builder.define_cluster("demo", &network, mode)?;
        let role = builder.define_execution_role("demo-container");
        let task = builder.define_task("demo", &cluster, &role, container(256, 512))?;
        let service = builder.define_service("demo", &cluster, &task)?;
        builder.define_load_balancer("demo", &network, &service, 5100)?;
        Ok(())
    }

    #[test]
    fn test_fargate_accepts_every_table_entry() {
        let mut builder = StackBuilder::new("demo");
        let network = builder.define_network("demo", 3);
        let cluster = builder
            .define_cluster("demo", &network, CapacityMode::Fargate)
            .unwrap();
        let role = builder.define_execution_role("demo-container");

        for (cpu, memory) in fargate::combinations() {
            let task = builder.define_task("demo", &cluster, &role, container(cpu, memory));
            assert!(task.is_ok(), "{cpu}/{memory} should be accepted");
        }
    }

    #[test]
    fn test_fargate_rejects_pairs_outside_table() {
        let mut builder = StackBuilder::new("demo");
        let network = builder.define_network("demo", 3);
        let cluster = builder
            .define_cluster("demo", &network, CapacityMode::Fargate)
            .unwrap();
        let role = builder.define_execution_role("demo-container");

        for (cpu, memory) in [(256, 4096), (512, 512), (1024, 1024), (300, 512), (128, 256)] {
            let err = builder
                .define_task("demo", &cluster, &role, container(cpu, memory))
                .unwrap_err();
            assert!(
                matches!(err, StackError::InvalidTaskSize { .. }),
                "{cpu}/{memory} gave {err}"
            );
        }
    }

    #[test]
    fn test_ec2_accepts_any_positive_size() {
        let mut builder = StackBuilder::new("demo");
        let network = builder.define_network("demo", 3);
        let cluster = builder
            .define_cluster(
                "demo",
                &network,
                CapacityMode::ec2(
                    InstanceType::of("t3", "small"),
                    MachineImage::amazon_linux_2023(AmiHardware::Standard),
                ),
            )
            .unwrap();
        let role = builder.define_execution_role("demo-container");

        let task = builder
            .define_task("demo", &cluster, &role, container(300, 700))
            .unwrap();
        assert_eq!(task.compatibility, Compatibility::Ec2);

        let err = builder
            .define_task("demo", &cluster, &role, container(0, 512))
            .unwrap_err();
        assert!(matches!(err, StackError::Config(_)));
    }

    #[test]
    fn test_ec2_cluster_requires_instance_parameters() {
        let mut builder = StackBuilder::new("demo");
        let network = builder.define_network("demo", 3);

        let err = builder
            .define_cluster(
                "demo",
                &network,
                CapacityMode::Ec2 {
                    instance_type: None,
                    machine_image: Some(MachineImage::amazon_linux_2023(AmiHardware::Standard)),
                    min_capacity: 1,
                    max_capacity: 1,
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            StackError::MissingCapacityParameter("instance_type")
        ));

        let err = builder
            .define_cluster(
                "demo",
                &network,
                CapacityMode::Ec2 {
                    instance_type: Some(InstanceType::of("t3", "small")),
                    machine_image: None,
                    min_capacity: 1,
                    max_capacity: 1,
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            StackError::MissingCapacityParameter("machine_image")
        ));
    }

    #[test]
    fn test_ec2_cluster_rejects_inverted_bounds() {
        let mut builder = StackBuilder::new("demo");
        let network = builder.define_network("demo", 3);
        let err = builder
            .define_cluster(
                "demo",
                &network,
                CapacityMode::Ec2 {
                    instance_type: Some(InstanceType::of("t3", "small")),
                    machine_image: Some(MachineImage::amazon_linux_2023(AmiHardware::Standard)),
                    min_capacity: 3,
                    max_capacity: 2,
                },
            )
            .unwrap_err();
        assert!(matches!(err, StackError::Config(_)));
    }

    #[test]
    fn test_service_rejects_mismatched_task() {
        let mut builder = StackBuilder::new("demo");
        let network = builder.define_network("demo", 3);
        let ec2 = builder
            .define_cluster(
                "demo-ec2",
                &network,
                CapacityMode::ec2(
                    InstanceType::of("t3", "small"),
                    MachineImage::amazon_linux_2023(AmiHardware::Standard),
                ),
            )
            .unwrap();
        let fargate_cluster = builder
            .define_cluster("demo", &network, CapacityMode::Fargate)
            .unwrap();
        let role = builder.define_execution_role("demo-container");
        let task = builder
            .define_task("demo", &ec2, &role, container(256, 512))
            .unwrap();

        let err = builder
            .define_service("demo", &fargate_cluster, &task)
            .unwrap_err();
        assert!(matches!(err, StackError::Inconsistent(_)));
    }

    #[test]
    fn test_load_balancer_requires_task_port() {
        let mut builder = StackBuilder::new("demo");
        let network = builder.define_network("demo", 3);
        let cluster = builder
            .define_cluster("demo", &network, CapacityMode::Fargate)
            .unwrap();
        let role = builder.define_execution_role("demo-container");
        let task = builder
            .define_task("demo", &cluster, &role, container(256, 512))
            .unwrap();
        let service = builder.define_service("demo", &cluster, &task).unwrap();

        let err = builder
            .define_load_balancer("demo", &network, &service, 8080)
            .unwrap_err();
        assert!(matches!(err, StackError::Inconsistent(_)));

        let lb = builder
            .define_load_balancer("demo", &network, &service, 5100)
            .unwrap();
        assert_eq!(lb.listener_port, 80);
        assert!(lb.internet_facing);
        assert!(!lb.deletion_protection);
        assert_eq!(lb.ingress_cidr, "0.0.0.0/0");
        assert_eq!(lb.container_name, "web");
    }

    #[test]
    fn test_emit_requires_every_entity() {
        let mut builder = StackBuilder::new("demo");
        assert!(matches!(
            builder.emit().unwrap_err(),
            StackError::Incomplete("network")
        ));

        let network = builder.define_network("demo", 3);
        let cluster = builder
            .define_cluster("demo", &network, CapacityMode::Fargate)
            .unwrap();
        let role = builder.define_execution_role("demo-container");
        builder
            .define_task("demo", &cluster, &role, container(256, 512))
            .unwrap();
        assert!(matches!(
            builder.emit().unwrap_err(),
            StackError::Incomplete("service")
        ));
    }

    #[test]
    fn test_emit_rejects_unusable_az_counts() {
        for max_azs in [0, 1, 7] {
            let mut builder = StackBuilder::new("demo");
            declare(&mut builder, CapacityMode::Fargate).unwrap();
            builder.define_network("demo", max_azs);
            assert!(
                matches!(builder.emit().unwrap_err(), StackError::Config(_)),
                "max_azs {max_azs} should be rejected"
            );
        }

        let mut builder = StackBuilder::new("demo");
        declare(&mut builder, CapacityMode::Fargate).unwrap();
        builder.define_network("demo", 2);
        let graph = builder.emit().unwrap();
        assert_eq!(
            graph.resources["LoadBalancer"].properties["Subnets"]
                .as_array()
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn test_emit_rejects_names_aws_refuses() {
        for stack_id in [
            "simple-service-fargate-with-a-long-name",
            "-bad name_",
            "demo-",
            "9lives",
        ] {
            let config = StackConfig {
                stack_id: stack_id.to_string(),
                ..StackConfig::default()
            };
            let err = StackBuilder::from_profile(&config).unwrap_err();
            assert!(
                matches!(err, StackError::Config(_)),
                "{stack_id:?} gave {err}"
            );
        }

        // Exactly 32 characters is the longest usable load balancer name.
        let config = StackConfig {
            stack_id: "a".repeat(32),
            ..StackConfig::default()
        };
        assert!(StackBuilder::from_profile(&config).is_ok());
    }

    #[test]
    fn test_emit_rejects_long_role_name() {
        let mut builder = StackBuilder::new("demo");
        declare(&mut builder, CapacityMode::Fargate).unwrap();
        let role = builder.define_execution_role("r".repeat(65));
        let cluster = builder.cluster.clone().unwrap();
        builder
            .define_task("demo", &cluster, &role, container(256, 512))
            .unwrap();
        let err = builder.emit().unwrap_err();
        assert!(err.to_string().contains("role name"), "{err}");
    }

    #[test]
    fn test_ec2_cluster_name_must_fit_launch_template() {
        let mut builder = StackBuilder::new("demo");
        let network = builder.define_network("demo", 3);
        let cluster = builder
            .define_cluster(
                "ab",
                &network,
                CapacityMode::ec2(
                    InstanceType::of("t3", "small"),
                    MachineImage::amazon_linux_2023(AmiHardware::Standard),
                ),
            )
            .unwrap();
        let role = builder.define_execution_role("demo-container");
        let task = builder
            .define_task("demo", &cluster, &role, container(256, 512))
            .unwrap();
        let service = builder.define_service("demo", &cluster, &task).unwrap();
        builder
            .define_load_balancer("demo", &network, &service, 5100)
            .unwrap();
        let err = builder.emit().unwrap_err();
        assert!(err.to_string().contains("launch template"), "{err}");
    }

    #[test]
    fn test_emit_rejects_dangling_reference() {
        let mut builder = StackBuilder::new("demo");
        declare(&mut builder, CapacityMode::Fargate).unwrap();
        // Redeclaring the network under another id leaves the cluster dangling.
        builder.define_network("other", 3);
        assert!(matches!(
            builder.emit().unwrap_err(),
            StackError::Inconsistent(_)
        ));
    }

    #[test]
    fn test_stream_prefix_and_desired_count_defaults() {
        let mut builder = StackBuilder::new("demo").with_log_retention_days(7);
        declare(&mut builder, CapacityMode::Fargate).unwrap();
        let task = builder.task.as_ref().unwrap();
        assert_eq!(task.logging.stream_prefix, "demo");
        assert_eq!(task.logging.retention_days, Some(7));
        assert_eq!(builder.service.as_ref().unwrap().desired_count, 1);
    }

    #[test]
    fn test_from_profile_defaults() {
        let graph = StackBuilder::from_profile(&StackConfig::default()).unwrap();
        assert_eq!(graph.stack_name, "simple-service-fargate");
        assert!(graph.outputs.contains_key("simpleservicefargateDNS"));
    }
}
