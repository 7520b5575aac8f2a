//! Stack profile configuration.
//!
//! A profile is a YAML file naming every parameter of the stack. Missing
//! fields take the defaults below; unknown fields are rejected so that typos
//! do not silently fall back to a default.
//!
//! ```yaml
//! stack_id: simple-service-fargate
//! max_azs: 3
//! image: stevepotterredefine/simple_server:latest
//! container_port: 5100
//! cpu: 256
//! memory_mib: 512
//! capacity:
//!   mode: fargate
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, StackError};
use crate::model::{AmiHardware, CapacityMode, InstanceType, MachineImage};

/// Default stack name.
pub const DEFAULT_STACK_ID: &str = "simple-service-fargate";

/// Default container image.
pub const DEFAULT_IMAGE: &str = "stevepotterredefine/simple_server:latest";

/// Default container name.
pub const DEFAULT_CONTAINER_NAME: &str = "web";

/// Default container port.
pub const DEFAULT_CONTAINER_PORT: u16 = 5100;

/// Default CPU units (0.25 vCPU).
pub const DEFAULT_CPU: u32 = 256;

/// Default memory limit in MiB.
pub const DEFAULT_MEMORY_MIB: u32 = 512;

/// Default number of availability zones.
pub const DEFAULT_MAX_AZS: u8 = 3;

/// Instance class and size used when EC2 capacity is selected without a
/// profile section.
pub const DEFAULT_INSTANCE_TYPE: (&str, &str) = ("t3", "small");

/// Capacity strategy chosen outside the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityChoice {
    /// EC2 instances; keeps the profile's EC2 section if it has one.
    Ec2,
    /// Fargate.
    Fargate,
}

/// Values replacing profile fields, typically from command-line flags.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub stack_id: Option<String>,
    pub capacity: Option<CapacityChoice>,
    pub instance_type: Option<InstanceType>,
    pub image: Option<String>,
    pub container_port: Option<u16>,
    pub cpu: Option<u32>,
    pub memory_mib: Option<u32>,
    pub region: Option<String>,
}

/// Parameters of one stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StackConfig {
    /// Stack name; also names the VPC, cluster, task family, service and
    /// load balancer.
    pub stack_id: String,
    /// Maximum availability zones for the network.
    pub max_azs: u8,
    /// Container image reference.
    pub image: String,
    /// Container name.
    pub container_name: String,
    /// Port the container listens on.
    pub container_port: u16,
    /// CPU units.
    pub cpu: u32,
    /// Memory limit in MiB.
    pub memory_mib: u32,
    /// Number of running tasks.
    pub desired_count: u32,
    /// Capacity strategy.
    pub capacity: CapacityMode,
    /// Task log retention in days; logs are kept forever when unset.
    pub log_retention_days: Option<u32>,
    /// AWS region to deploy to; the SDK default chain is used when unset.
    pub region: Option<String>,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            stack_id: DEFAULT_STACK_ID.to_string(),
            max_azs: DEFAULT_MAX_AZS,
            image: DEFAULT_IMAGE.to_string(),
            container_name: DEFAULT_CONTAINER_NAME.to_string(),
            container_port: DEFAULT_CONTAINER_PORT,
            cpu: DEFAULT_CPU,
            memory_mib: DEFAULT_MEMORY_MIB,
            desired_count: 1,
            capacity: CapacityMode::Fargate,
            log_retention_days: None,
            region: None,
        }
    }
}

impl StackConfig {
    /// Load a profile from a YAML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| StackError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&contents)?;
        info!(path = %path.display(), stack = %config.stack_id, "Loaded stack profile");
        Ok(config)
    }

    /// Parse a profile from YAML text.
    ///
    /// # Errors
    /// Returns an error if the text is not a valid profile.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Replace profile fields with the overrides that are set.
    ///
    /// Selecting EC2 capacity on a Fargate profile uses a `t3.small`
    /// ECS-optimized Amazon Linux 2023 group; a profile that already has an
    /// EC2 section keeps it.
    ///
    /// # Errors
    /// Returns [`StackError::Config`] if an instance type is given for
    /// Fargate capacity.
    pub fn apply_overrides(&mut self, overrides: Overrides) -> Result<()> {
        let Overrides {
            stack_id,
            capacity,
            instance_type,
            image,
            container_port,
            cpu,
            memory_mib,
            region,
        } = overrides;

        if let Some(stack_id) = stack_id {
            self.stack_id = stack_id;
        }
        if let Some(image) = image {
            self.image = image;
        }
        if let Some(port) = container_port {
            self.container_port = port;
        }
        if let Some(cpu) = cpu {
            self.cpu = cpu;
        }
        if let Some(memory_mib) = memory_mib {
            self.memory_mib = memory_mib;
        }
        if region.is_some() {
            self.region = region;
        }

        match capacity {
            Some(CapacityChoice::Fargate) => self.capacity = CapacityMode::Fargate,
            Some(CapacityChoice::Ec2) if self.capacity == CapacityMode::Fargate => {
                let (class, size) = DEFAULT_INSTANCE_TYPE;
                self.capacity = CapacityMode::ec2(
                    InstanceType::of(class, size),
                    MachineImage::amazon_linux_2023(AmiHardware::Standard),
                );
            }
            _ => {}
        }
        if let Some(instance_type) = instance_type {
            match &mut self.capacity {
                CapacityMode::Ec2 {
                    instance_type: slot,
                    ..
                } => *slot = Some(instance_type),
                CapacityMode::Fargate => {
                    return Err(StackError::Config(format!(
                        "instance type {instance_type} only applies to EC2 capacity"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Load the profile at `path`, or the defaults when no path is given.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_match_reference_service() {
        let config = StackConfig::default();
        assert_eq!(config.stack_id, "simple-service-fargate");
        assert_eq!(config.max_azs, 3);
        assert_eq!(config.image, "stevepotterredefine/simple_server:latest");
        assert_eq!(config.container_name, "web");
        assert_eq!(config.container_port, 5100);
        assert_eq!(config.cpu, 256);
        assert_eq!(config.memory_mib, 512);
        assert_eq!(config.desired_count, 1);
        assert_eq!(config.capacity, CapacityMode::Fargate);
    }

    #[test]
    fn test_partial_profile_keeps_defaults() {
        let config = StackConfig::from_yaml("stack_id: demo\ncpu: 512\nmemory_mib: 1024\n").unwrap();
        assert_eq!(config.stack_id, "demo");
        assert_eq!(config.cpu, 512);
        assert_eq!(config.memory_mib, 1024);
        assert_eq!(config.container_port, 5100);
    }

    #[test]
    fn test_empty_profile_is_default() {
        assert_eq!(StackConfig::from_yaml("").unwrap(), StackConfig::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = StackConfig::from_yaml("stack_id: demo\nlistener_prot: 81\n").unwrap_err();
        assert!(matches!(err, StackError::Profile(_)));
    }

    #[test]
    fn test_load_ec2_profile_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "stack_id: simple-service\ncapacity:\n  mode: ec2\n  instance_type: t3.small\n  machine_image:\n    kind: ecs_optimized\n    hardware: standard\n"
        )
        .unwrap();

        let config = StackConfig::load(file.path()).unwrap();
        assert_eq!(config.stack_id, "simple-service");
        assert_eq!(
            config.capacity,
            CapacityMode::ec2(
                InstanceType::of("t3", "small"),
                MachineImage::amazon_linux_2023(AmiHardware::Standard)
            )
        );
    }

    #[test]
    fn test_load_missing_file() {
        let err = StackConfig::load(Path::new("/nonexistent/stack.yaml")).unwrap_err();
        assert!(matches!(err, StackError::Io { .. }));
    }

    #[test]
    fn test_overrides_replace_profile_fields() {
        let mut config = StackConfig::default();
        config
            .apply_overrides(Overrides {
                stack_id: Some("demo".to_string()),
                image: Some("nginx:latest".to_string()),
                container_port: Some(8080),
                cpu: Some(512),
                memory_mib: Some(1024),
                region: Some("eu-west-1".to_string()),
                ..Overrides::default()
            })
            .unwrap();
        assert_eq!(config.stack_id, "demo");
        assert_eq!(config.image, "nginx:latest");
        assert_eq!(config.container_port, 8080);
        assert_eq!(config.cpu, 512);
        assert_eq!(config.memory_mib, 1024);
        assert_eq!(config.region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.capacity, CapacityMode::Fargate);

        let before = config.clone();
        config.apply_overrides(Overrides::default()).unwrap();
        assert_eq!(config, before);
    }

    #[test]
    fn test_ec2_override_on_fargate_profile_uses_default_group() {
        let mut config = StackConfig::default();
        config
            .apply_overrides(Overrides {
                capacity: Some(CapacityChoice::Ec2),
                ..Overrides::default()
            })
            .unwrap();
        assert_eq!(
            config.capacity,
            CapacityMode::ec2(
                InstanceType::of("t3", "small"),
                MachineImage::amazon_linux_2023(AmiHardware::Standard)
            )
        );
    }

    #[test]
    fn test_ec2_override_keeps_existing_ec2_section() {
        let existing = CapacityMode::Ec2 {
            instance_type: Some(InstanceType::of("m6i", "large")),
            machine_image: Some(MachineImage::amazon_linux_2023(AmiHardware::Arm)),
            min_capacity: 2,
            max_capacity: 4,
        };
        let mut config = StackConfig {
            capacity: existing.clone(),
            ..StackConfig::default()
        };
        config
            .apply_overrides(Overrides {
                capacity: Some(CapacityChoice::Ec2),
                ..Overrides::default()
            })
            .unwrap();
        assert_eq!(config.capacity, existing);

        config
            .apply_overrides(Overrides {
                instance_type: Some(InstanceType::of("c7g", "xlarge")),
                ..Overrides::default()
            })
            .unwrap();
        let CapacityMode::Ec2 {
            instance_type,
            min_capacity,
            ..
        } = &config.capacity
        else {
            panic!("expected EC2 capacity, got {:?}", config.capacity);
        };
        assert_eq!(instance_type, &Some(InstanceType::of("c7g", "xlarge")));
        assert_eq!(*min_capacity, 2);

        config
            .apply_overrides(Overrides {
                capacity: Some(CapacityChoice::Fargate),
                ..Overrides::default()
            })
            .unwrap();
        assert_eq!(config.capacity, CapacityMode::Fargate);
    }

    #[test]
    fn test_instance_type_override_rejected_for_fargate() {
        let mut config = StackConfig::default();
        let err = config
            .apply_overrides(Overrides {
                instance_type: Some(InstanceType::of("t3", "small")),
                ..Overrides::default()
            })
            .unwrap_err();
        assert!(matches!(err, StackError::Config(_)));
        assert!(err.to_string().contains("t3.small"));
    }

    #[test]
    fn test_load_or_default_without_path() {
        assert_eq!(
            StackConfig::load_or_default(None).unwrap(),
            StackConfig::default()
        );
    }
}
