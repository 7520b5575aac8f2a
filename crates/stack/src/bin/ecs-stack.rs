//! ecs-stack CLI - synthesize and deploy the ECS service stack.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ecs_stack::config::{CapacityChoice, Overrides};
use ecs_stack::provision::{CloudFormation, Deployer, DEFAULT_POLL_INTERVAL};
use ecs_stack::{dns_output_key, InstanceType, StackBuilder, StackConfig};

/// ecs-stack CLI - ECS service behind a public load balancer.
#[derive(Parser)]
#[command(name = "ecs-stack")]
#[command(about = "Synthesize and deploy an ECS service stack")]
struct Cli {
    /// Stack profile (YAML). Defaults are used when omitted.
    #[arg(long, env = "ECS_STACK_CONFIG")]
    config: Option<PathBuf>,

    /// Stack name; overrides the profile.
    #[arg(long, env = "ECS_STACK_ID")]
    stack_id: Option<String>,

    /// Capacity strategy; overrides the profile.
    #[arg(long, value_enum)]
    capacity: Option<CapacityArg>,

    /// EC2 instance type (e.g., t3.small) for EC2 capacity.
    #[arg(long)]
    instance_type: Option<InstanceType>,

    /// Container image; overrides the profile.
    #[arg(long, env = "ECS_STACK_IMAGE")]
    image: Option<String>,

    /// Container port; overrides the profile.
    #[arg(long)]
    container_port: Option<u16>,

    /// Task CPU units; overrides the profile.
    #[arg(long)]
    cpu: Option<u32>,

    /// Task memory in MiB; overrides the profile.
    #[arg(long)]
    memory: Option<u32>,

    /// AWS region; overrides the profile.
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum CapacityArg {
    /// Self-managed EC2 instances in an auto-scaling group.
    Ec2,
    /// Serverless Fargate capacity.
    Fargate,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the CloudFormation template.
    Synth {
        /// Write the template to a file instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Deploy the stack and print the load balancer DNS name.
    Deploy {
        /// Seconds to wait for the stack to settle.
        #[arg(long, default_value = "1800")]
        timeout: u64,
    },

    /// Print the outputs of a deployed stack.
    Outputs,

    /// Delete the stack.
    Destroy {
        /// Seconds to wait for deletion.
        #[arg(long, default_value = "1800")]
        timeout: u64,
    },
}

impl From<CapacityArg> for CapacityChoice {
    fn from(arg: CapacityArg) -> Self {
        match arg {
            CapacityArg::Ec2 => Self::Ec2,
            CapacityArg::Fargate => Self::Fargate,
        }
    }
}

impl Cli {
    /// Profile from file with command-line overrides applied.
    fn stack_config(&self) -> Result<StackConfig> {
        let mut config = StackConfig::load_or_default(self.config.as_deref())
            .context("Failed to load stack profile")?;
        config
            .apply_overrides(Overrides {
                stack_id: self.stack_id.clone(),
                capacity: self.capacity.map(CapacityChoice::from),
                instance_type: self.instance_type.clone(),
                image: self.image.clone(),
                container_port: self.container_port,
                cpu: self.cpu,
                memory_mib: self.memory,
                region: self.region.clone(),
            })
            .context("Invalid command-line override")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.stack_config()?;

    match cli.command {
        Commands::Synth { output } => {
            let graph = StackBuilder::from_profile(&config).context("Invalid stack definition")?;
            let json = graph.to_json()?;
            if let Some(path) = output {
                std::fs::write(&path, format!("{json}\n"))
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!(path = %path.display(), "Template written");
            } else {
                println!("{json}");
            }
        }

        Commands::Deploy { timeout } => {
            let graph = StackBuilder::from_profile(&config).context("Invalid stack definition")?;
            let engine = CloudFormation::from_env(config.region.clone()).await;
            let deployer = Deployer::new(engine)
                .with_poll_interval(DEFAULT_POLL_INTERVAL)
                .with_timeout(Duration::from_secs(timeout));

            let deployment = deployer.deploy(&graph).await?;
            println!("✅ Stack {} deployed", deployment.stack_name);
            let key = dns_output_key(&config.stack_id);
            if let Some(dns) = deployment.output(&key) {
                println!("{key} = {dns}");
            }
        }

        Commands::Outputs => {
            let engine = CloudFormation::from_env(config.region.clone()).await;
            let outputs = Deployer::new(engine).outputs(&config.stack_id).await?;
            for (key, value) in outputs {
                println!("{key} = {value}");
            }
        }

        Commands::Destroy { timeout } => {
            let engine = CloudFormation::from_env(config.region.clone()).await;
            Deployer::new(engine)
                .with_timeout(Duration::from_secs(timeout))
                .destroy(&config.stack_id)
                .await?;
            println!("✅ Stack {} deleted", config.stack_id);
        }
    }

    Ok(())
}
