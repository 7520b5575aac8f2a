//! Renders declared entities into CloudFormation resources.

use serde_json::{json, Value};

use crate::model::{
    AsgCapacity, Capacity, ClusterConfig, Compatibility, ExecutionRole, LoadBalancerConfig,
    MachineImage, NetworkConfig, ServiceConfig, TaskSpec, CONTAINER_INSTANCE_POLICY,
};
use crate::template::{
    availability_zone, get_att, managed_policy_arn, reference, sanitize_logical_id, Output,
    Parameter, Resource, ResourceGraph,
};

const VPC: &str = "Vpc";
const INTERNET_GATEWAY: &str = "VpcInternetGateway";
const GATEWAY_ATTACHMENT: &str = "VpcGatewayAttachment";
const PUBLIC_ROUTE_TABLE: &str = "VpcPublicRouteTable";
const PUBLIC_DEFAULT_ROUTE: &str = "VpcPublicDefaultRoute";
const CLUSTER: &str = "EcsCluster";
const INSTANCE_ROLE: &str = "InstanceRole";
const INSTANCE_PROFILE: &str = "InstanceProfile";
const INSTANCE_SECURITY_GROUP: &str = "InstanceSecurityGroup";
const INSTANCE_IMAGE_PARAMETER: &str = "EcsOptimizedImageId";
const LAUNCH_TEMPLATE: &str = "LaunchTemplate";
const AUTO_SCALING_GROUP: &str = "AutoScalingGroup";
const CAPACITY_PROVIDER: &str = "AsgCapacityProvider";
const CAPACITY_ASSOCIATIONS: &str = "ClusterCapacityProviderAssociations";
const EXECUTION_ROLE: &str = "TaskExecutionRole";
const LOG_GROUP: &str = "TaskLogGroup";
const TASK_DEFINITION: &str = "TaskDefinition";
const SERVICE_SECURITY_GROUP: &str = "ServiceSecurityGroup";
const SERVICE: &str = "EcsService";
const LOAD_BALANCER: &str = "LoadBalancer";
const LOAD_BALANCER_SECURITY_GROUP: &str = "LoadBalancerSecurityGroup";
const LISTENER: &str = "PublicListener";
const TARGET_GROUP: &str = "TargetGroup";

const VPC_CIDR: &str = "10.0.0.0/16";

/// Ephemeral host port range used by bridge-mode dynamic port mapping.
const EPHEMERAL_PORTS: (u16, u16) = (32768, 65535);

/// Entities validated by the builder, ready to render.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DeclaredStack<'a> {
    pub network: &'a NetworkConfig,
    pub cluster: &'a ClusterConfig,
    pub role: &'a ExecutionRole,
    pub task: &'a TaskSpec,
    pub service: &'a ServiceConfig,
    pub load_balancer: &'a LoadBalancerConfig,
}

/// Logical id of the output carrying the load balancer DNS name.
#[must_use]
pub fn dns_output_key(stack_id: &str) -> String {
    format!("{}DNS", sanitize_logical_id(stack_id))
}

pub(crate) fn render(stack_id: &str, stack: &DeclaredStack<'_>) -> ResourceGraph {
    let mut graph = ResourceGraph::new(
        stack_id,
        format!(
            "ECS service {} on {} capacity behind a public application load balancer",
            stack.service.id,
            stack.task.compatibility
        ),
    );

    let subnets = render_network(&mut graph, stack.network);
    graph.add(
        CLUSTER,
        Resource::new(
            "AWS::ECS::Cluster",
            json!({ "ClusterName": stack.cluster.id }),
        ),
    );
    if let Capacity::Ec2(asg) = &stack.cluster.capacity {
        render_asg_capacity(&mut graph, stack.cluster, asg, &subnets);
    }
    render_execution_role(&mut graph, stack.role);
    render_task(&mut graph, stack.task);
    render_service(&mut graph, stack, &subnets);
    render_load_balancer(&mut graph, stack, &subnets);

    graph.outputs.insert(
        dns_output_key(stack_id),
        Output {
            value: get_att(LOAD_BALANCER, "DNSName"),
            description: Some("Public DNS name of the load balancer".to_string()),
        },
    );
    graph
}

fn name_tag(value: &str) -> Value {
    json!([{ "Key": "Name", "Value": value }])
}

fn allow_all_egress() -> Value {
    json!([{ "CidrIp": "0.0.0.0/0", "Description": "Allow all outbound traffic", "IpProtocol": "-1" }])
}

fn assume_role_policy(service: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Action": "sts:AssumeRole",
            "Effect": "Allow",
            "Principal": { "Service": service }
        }]
    })
}

/// VPC with one public subnet per availability zone. Returns subnet refs.
fn render_network(graph: &mut ResourceGraph, network: &NetworkConfig) -> Vec<Value> {
    graph.add(
        VPC,
        Resource::new(
            "AWS::EC2::VPC",
            json!({
                "CidrBlock": VPC_CIDR,
                "EnableDnsHostnames": true,
                "EnableDnsSupport": true,
                "InstanceTenancy": "default",
                "Tags": name_tag(&network.id)
            }),
        ),
    );
    graph.add(
        INTERNET_GATEWAY,
        Resource::new(
            "AWS::EC2::InternetGateway",
            json!({ "Tags": name_tag(&network.id) }),
        ),
    );
    graph.add(
        GATEWAY_ATTACHMENT,
        Resource::new(
            "AWS::EC2::VPCGatewayAttachment",
            json!({
                "InternetGatewayId": reference(INTERNET_GATEWAY),
                "VpcId": reference(VPC)
            }),
        ),
    );
    graph.add(
        PUBLIC_ROUTE_TABLE,
        Resource::new(
            "AWS::EC2::RouteTable",
            json!({
                "Tags": name_tag(&format!("{}/PublicRouteTable", network.id)),
                "VpcId": reference(VPC)
            }),
        ),
    );
    graph.add(
        PUBLIC_DEFAULT_ROUTE,
        Resource::new(
            "AWS::EC2::Route",
            json!({
                "DestinationCidrBlock": "0.0.0.0/0",
                "GatewayId": reference(INTERNET_GATEWAY),
                "RouteTableId": reference(PUBLIC_ROUTE_TABLE)
            }),
        )
        .depends_on(GATEWAY_ATTACHMENT),
    );

    let mut subnets = Vec::with_capacity(usize::from(network.max_azs));
    for index in 0..usize::from(network.max_azs) {
        let subnet_id = format!("VpcPublicSubnet{}", index + 1);
        // /19 blocks: 10.0.0.0, 10.0.32.0, 10.0.64.0, ...
        let cidr = format!("10.0.{}.0/19", index * 32);
        graph.add(
            subnet_id.clone(),
            Resource::new(
                "AWS::EC2::Subnet",
                json!({
                    "AvailabilityZone": availability_zone(index),
                    "CidrBlock": cidr,
                    "MapPublicIpOnLaunch": true,
                    "Tags": name_tag(&format!("{}/PublicSubnet{}", network.id, index + 1)),
                    "VpcId": reference(VPC)
                }),
            ),
        );
        graph.add(
            format!("{subnet_id}RouteTableAssociation"),
            Resource::new(
                "AWS::EC2::SubnetRouteTableAssociation",
                json!({
                    "RouteTableId": reference(PUBLIC_ROUTE_TABLE),
                    "SubnetId": reference(&subnet_id)
                }),
            ),
        );
        subnets.push(reference(&subnet_id));
    }
    subnets
}

fn render_asg_capacity(
    graph: &mut ResourceGraph,
    cluster: &ClusterConfig,
    asg: &AsgCapacity,
    subnets: &[Value],
) {
    graph.add(
        INSTANCE_ROLE,
        Resource::new(
            "AWS::IAM::Role",
            json!({
                "AssumeRolePolicyDocument": assume_role_policy("ec2.amazonaws.com"),
                "ManagedPolicyArns": [managed_policy_arn(CONTAINER_INSTANCE_POLICY)]
            }),
        ),
    );
    graph.add(
        INSTANCE_PROFILE,
        Resource::new(
            "AWS::IAM::InstanceProfile",
            json!({ "Roles": [reference(INSTANCE_ROLE)] }),
        ),
    );
    graph.add(
        INSTANCE_SECURITY_GROUP,
        Resource::new(
            "AWS::EC2::SecurityGroup",
            json!({
                "GroupDescription": format!("{}/InstanceSecurityGroup", cluster.id),
                "SecurityGroupEgress": allow_all_egress(),
                "Tags": name_tag(&cluster.id),
                "VpcId": reference(VPC)
            }),
        ),
    );

    let image_id = match &asg.machine_image {
        MachineImage::Ami { id } => Value::String(id.clone()),
        image @ MachineImage::EcsOptimized { .. } => {
            graph.parameters.insert(
                INSTANCE_IMAGE_PARAMETER.to_string(),
                Parameter {
                    kind: "AWS::SSM::Parameter::Value<AWS::EC2::Image::Id>".to_string(),
                    default: image.ssm_parameter(),
                    description: Some("Recommended ECS-optimized AMI".to_string()),
                },
            );
            reference(INSTANCE_IMAGE_PARAMETER)
        }
    };

    graph.add(
        LAUNCH_TEMPLATE,
        Resource::new(
            "AWS::EC2::LaunchTemplate",
            json!({
                "LaunchTemplateData": {
                    "IamInstanceProfile": { "Arn": get_att(INSTANCE_PROFILE, "Arn") },
                    "ImageId": image_id,
                    "InstanceType": asg.instance_type.to_string(),
                    "SecurityGroupIds": [get_att(INSTANCE_SECURITY_GROUP, "GroupId")],
                    "UserData": {
                        "Fn::Base64": {
                            "Fn::Join": ["", [
                                "#!/bin/bash\necho ECS_CLUSTER=",
                                reference(CLUSTER),
                                " >> /etc/ecs/ecs.config\n"
                            ]]
                        }
                    }
                },
                "LaunchTemplateName": cluster.id
            }),
        )
        .depends_on(INSTANCE_ROLE),
    );
    graph.add(
        AUTO_SCALING_GROUP,
        Resource::new(
            "AWS::AutoScaling::AutoScalingGroup",
            json!({
                "AutoScalingGroupName": cluster.id,
                "LaunchTemplate": {
                    "LaunchTemplateId": reference(LAUNCH_TEMPLATE),
                    "Version": get_att(LAUNCH_TEMPLATE, "LatestVersionNumber")
                },
                "MaxSize": asg.max_capacity.to_string(),
                "MinSize": asg.min_capacity.to_string(),
                "VPCZoneIdentifier": subnets
            }),
        )
        .depends_on(PUBLIC_DEFAULT_ROUTE),
    );
    graph.add(
        CAPACITY_PROVIDER,
        Resource::new(
            "AWS::ECS::CapacityProvider",
            json!({
                "AutoScalingGroupProvider": {
                    "AutoScalingGroupArn": reference(AUTO_SCALING_GROUP),
                    "ManagedScaling": { "Status": "ENABLED", "TargetCapacity": 100 },
                    "ManagedTerminationProtection": "DISABLED"
                }
            }),
        ),
    );
    graph.add(
        CAPACITY_ASSOCIATIONS,
        Resource::new(
            "AWS::ECS::ClusterCapacityProviderAssociations",
            json!({
                "CapacityProviders": [reference(CAPACITY_PROVIDER)],
                "Cluster": reference(CLUSTER),
                "DefaultCapacityProviderStrategy": [
                    { "CapacityProvider": reference(CAPACITY_PROVIDER), "Weight": 1 }
                ]
            }),
        ),
    );
}

fn render_execution_role(graph: &mut ResourceGraph, role: &ExecutionRole) {
    let policies: Vec<Value> = role
        .managed_policies
        .iter()
        .map(|p| managed_policy_arn(p))
        .collect();
    graph.add(
        EXECUTION_ROLE,
        Resource::new(
            "AWS::IAM::Role",
            json!({
                "AssumeRolePolicyDocument": assume_role_policy(&role.principal),
                "Description": role.description,
                "ManagedPolicyArns": policies,
                "RoleName": role.id
            }),
        ),
    );
}

fn render_task(graph: &mut ResourceGraph, task: &TaskSpec) {
    let mut log_group = json!({});
    if let Some(days) = task.logging.retention_days {
        log_group["RetentionInDays"] = json!(days);
    }
    graph.add(
        LOG_GROUP,
        Resource::new("AWS::Logs::LogGroup", log_group).with_deletion_policy("Retain"),
    );

    let mut port_mapping = json!({ "ContainerPort": task.container_port, "Protocol": "tcp" });
    let network_mode = match task.compatibility {
        Compatibility::Fargate => "awsvpc",
        Compatibility::Ec2 => {
            port_mapping["HostPort"] = json!(0);
            "bridge"
        }
    };

    let mut properties = json!({
        "ContainerDefinitions": [{
            "Cpu": task.cpu,
            "Essential": true,
            "Image": task.image,
            "LogConfiguration": {
                "LogDriver": "awslogs",
                "Options": {
                    "awslogs-group": reference(LOG_GROUP),
                    "awslogs-region": reference("AWS::Region"),
                    "awslogs-stream-prefix": task.logging.stream_prefix
                }
            },
            "Memory": task.memory_mib,
            "Name": task.container_name,
            "PortMappings": [port_mapping]
        }],
        "ExecutionRoleArn": get_att(EXECUTION_ROLE, "Arn"),
        "Family": task.id,
        "NetworkMode": network_mode,
        "RequiresCompatibilities": [task.compatibility]
    });
    if task.compatibility == Compatibility::Fargate {
        // Fargate sizes are declared at task level, as strings.
        properties["Cpu"] = json!(task.cpu.to_string());
        properties["Memory"] = json!(task.memory_mib.to_string());
    }

    graph.add(
        TASK_DEFINITION,
        Resource::new("AWS::ECS::TaskDefinition", properties),
    );
}

fn render_service(graph: &mut ResourceGraph, stack: &DeclaredStack<'_>, subnets: &[Value]) {
    let service = stack.service;
    let mut properties = json!({
        "Cluster": reference(CLUSTER),
        "DeploymentConfiguration": { "MaximumPercent": 200, "MinimumHealthyPercent": 50 },
        "DesiredCount": service.desired_count,
        "HealthCheckGracePeriodSeconds": 60,
        "LoadBalancers": [{
            "ContainerName": stack.load_balancer.container_name,
            "ContainerPort": stack.load_balancer.container_port,
            "TargetGroupArn": reference(TARGET_GROUP)
        }],
        "ServiceName": service.id,
        "TaskDefinition": reference(TASK_DEFINITION)
    });

    let mut resource = match stack.task.compatibility {
        Compatibility::Fargate => {
            graph.add(
                SERVICE_SECURITY_GROUP,
                Resource::new(
                    "AWS::EC2::SecurityGroup",
                    json!({
                        "GroupDescription": format!("{}/ServiceSecurityGroup", service.id),
                        "SecurityGroupEgress": allow_all_egress(),
                        "VpcId": reference(VPC)
                    }),
                ),
            );
            properties["LaunchType"] = json!("FARGATE");
            properties["NetworkConfiguration"] = json!({
                "AwsvpcConfiguration": {
                    "AssignPublicIp": "ENABLED",
                    "SecurityGroups": [get_att(SERVICE_SECURITY_GROUP, "GroupId")],
                    "Subnets": subnets
                }
            });
            Resource::new("AWS::ECS::Service", properties)
        }
        Compatibility::Ec2 => {
            properties["CapacityProviderStrategy"] = json!([
                { "CapacityProvider": reference(CAPACITY_PROVIDER), "Weight": 1 }
            ]);
            Resource::new("AWS::ECS::Service", properties).depends_on(CAPACITY_ASSOCIATIONS)
        }
    };
    resource = resource.depends_on(LISTENER);
    graph.add(SERVICE, resource);
}

fn render_load_balancer(graph: &mut ResourceGraph, stack: &DeclaredStack<'_>, subnets: &[Value]) {
    let lb = stack.load_balancer;

    graph.add(
        LOAD_BALANCER_SECURITY_GROUP,
        Resource::new(
            "AWS::EC2::SecurityGroup",
            json!({
                "GroupDescription": format!("{}/LoadBalancerSecurityGroup", lb.id),
                "SecurityGroupEgress": allow_all_egress(),
                "SecurityGroupIngress": [{
                    "CidrIp": lb.ingress_cidr,
                    "Description": format!("Allow from anyone on port {}", lb.listener_port),
                    "FromPort": lb.listener_port,
                    "IpProtocol": "tcp",
                    "ToPort": lb.listener_port
                }],
                "VpcId": reference(VPC)
            }),
        ),
    );

    graph.add(
        LOAD_BALANCER,
        Resource::new(
            "AWS::ElasticLoadBalancingV2::LoadBalancer",
            json!({
                "LoadBalancerAttributes": [{
                    "Key": "deletion_protection.enabled",
                    "Value": lb.deletion_protection.to_string()
                }],
                "Name": lb.id,
                "Scheme": if lb.internet_facing { "internet-facing" } else { "internal" },
                "SecurityGroups": [get_att(LOAD_BALANCER_SECURITY_GROUP, "GroupId")],
                "Subnets": subnets,
                "Type": "application"
            }),
        )
        .depends_on(PUBLIC_DEFAULT_ROUTE),
    );

    let target_type = match stack.task.compatibility {
        Compatibility::Fargate => "ip",
        Compatibility::Ec2 => "instance",
    };
    graph.add(
        TARGET_GROUP,
        Resource::new(
            "AWS::ElasticLoadBalancingV2::TargetGroup",
            json!({
                "Name": lb.id,
                "Port": lb.container_port,
                "Protocol": "HTTP",
                "TargetType": target_type,
                "VpcId": reference(VPC)
            }),
        ),
    );

    graph.add(
        LISTENER,
        Resource::new(
            "AWS::ElasticLoadBalancingV2::Listener",
            json!({
                "DefaultActions": [{
                    "TargetGroupArn": reference(TARGET_GROUP),
                    "Type": "forward"
                }],
                "LoadBalancerArn": reference(LOAD_BALANCER),
                "Port": lb.listener_port,
                "Protocol": "HTTP"
            }),
        ),
    );

    // Targets only accept traffic from the load balancer.
    let (target_group_id, from_port, to_port) = match stack.task.compatibility {
        Compatibility::Fargate => (SERVICE_SECURITY_GROUP, lb.container_port, lb.container_port),
        Compatibility::Ec2 => (INSTANCE_SECURITY_GROUP, EPHEMERAL_PORTS.0, EPHEMERAL_PORTS.1),
    };
    graph.add(
        format!("{target_group_id}FromLoadBalancer"),
        Resource::new(
            "AWS::EC2::SecurityGroupIngress",
            json!({
                "Description": "Load balancer to target",
                "FromPort": from_port,
                "GroupId": get_att(target_group_id, "GroupId"),
                "IpProtocol": "tcp",
                "SourceSecurityGroupId": get_att(LOAD_BALANCER_SECURITY_GROUP, "GroupId"),
                "ToPort": to_port
            }),
        ),
    );
}
