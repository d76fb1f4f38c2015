//! Network topology builder (container services only)
//!
//! Builds the virtual network in dependency order: address space →
//! per-zone subnets → gateways → route tables → associations → chained
//! security groups. Fails closed before any resource is built when the
//! requested zone spread exceeds the region's failure domains.

use serde_json::json;
use tracing::info;

use plinth_cloud::{ResourceKind, ResourceRecord};
use plinth_common::{Error, Result};

use crate::BuildContext;

/// Address space of every workload network
const VPC_CIDR: &str = "10.0.0.0/16";

/// Offset of the private subnet block within the VPC (10.0.10+i.0/24)
const PRIVATE_OFFSET: u8 = 10;

/// Offset of the data subnet block within the VPC (10.0.20+i.0/24)
const DATA_OFFSET: u8 = 20;

/// The resolved network for one container-service workload
#[derive(Debug)]
pub struct NetworkTopology {
    /// The virtual network record
    pub vpc: ResourceRecord,
    /// Public subnet identifiers in zone order
    pub public_subnet_ids: Vec<String>,
    /// Private subnet identifiers in zone order
    pub private_subnet_ids: Vec<String>,
    /// Data subnet identifiers in zone order; empty without a database
    pub data_subnet_ids: Vec<String>,
    /// Load balancer security group identifier
    pub alb_sg_id: String,
    /// Service security group identifier
    pub service_sg_id: String,
    /// Database security group identifier, present iff a database was
    /// requested
    pub database_sg_id: Option<String>,
}

/// Builds the virtual network for a container-service workload
pub struct NetworkBuilder<'a> {
    ctx: &'a BuildContext<'a>,
}

impl<'a> NetworkBuilder<'a> {
    /// Create a builder over the shared context
    pub fn new(ctx: &'a BuildContext<'a>) -> Self {
        Self { ctx }
    }

    /// Build the full network topology.
    ///
    /// `database_port` carries the engine's canonical port when the
    /// workload attaches a database; `None` skips the data subnets and
    /// database security group entirely.
    pub async fn build(
        &self,
        container_port: u16,
        database_port: Option<u16>,
        zone_count: usize,
    ) -> Result<NetworkTopology> {
        let ctx = self.ctx;
        let meta = ctx.meta;

        let zones = ctx.plane.availability_zones(&meta.region);
        if zone_count == 0 {
            return Err(Error::validation_for(
                &meta.identity,
                "at least one availability zone is required",
            ));
        }
        if zone_count > zones.len() {
            // fail closed: nothing has been applied yet
            return Err(Error::validation_for(
                &meta.identity,
                format!(
                    "requested {zone_count} zones but region {} has {}",
                    meta.region,
                    zones.len()
                ),
            ));
        }
        let zones = &zones[..zone_count];
        info!(workload = %meta.identity, zones = zone_count, "building network topology");

        let vpc = ctx
            .plane
            .apply(
                ctx.manifest(ResourceKind::Vpc, "network/vpc", ctx.namer.derive("vpc"))
                    .with_spec(json!({
                        "cidrBlock": VPC_CIDR,
                        "enableDnsSupport": true,
                        "enableDnsHostnames": true,
                    })),
            )
            .await?;
        let vpc_id = vpc.require_attr("vpcId")?;

        let public_subnet_ids = self
            .build_subnet_tier("public", zones, &vpc_id, 0, true)
            .await?;
        let private_subnet_ids = self
            .build_subnet_tier("private", zones, &vpc_id, PRIVATE_OFFSET, false)
            .await?;
        let data_subnet_ids = if database_port.is_some() {
            self.build_subnet_tier("data", zones, &vpc_id, DATA_OFFSET, false)
                .await?
        } else {
            Vec::new()
        };

        let igw = ctx
            .plane
            .apply(
                ctx.manifest(
                    ResourceKind::InternetGateway,
                    "network/igw",
                    ctx.namer.derive("igw"),
                )
                .with_spec(json!({ "vpcId": vpc_id })),
            )
            .await?;

        // one NAT gateway, in the first public subnet
        let nat = ctx
            .plane
            .apply(
                ctx.manifest(
                    ResourceKind::NatGateway,
                    "network/nat",
                    ctx.namer.derive("nat"),
                )
                .with_spec(json!({
                    "subnetId": public_subnet_ids[0],
                    "connectivityType": "public",
                })),
            )
            .await?;

        let public_rtb = ctx
            .plane
            .apply(
                ctx.manifest(
                    ResourceKind::RouteTable,
                    "network/rtb-public",
                    ctx.namer.derive("rtb-public"),
                )
                .with_spec(json!({
                    "vpcId": vpc_id,
                    "routes": [{
                        "destinationCidrBlock": "0.0.0.0/0",
                        "gatewayId": igw.require_attr("gatewayId")?,
                    }],
                })),
            )
            .await?;
        let private_rtb = ctx
            .plane
            .apply(
                ctx.manifest(
                    ResourceKind::RouteTable,
                    "network/rtb-private",
                    ctx.namer.derive("rtb-private"),
                )
                .with_spec(json!({
                    "vpcId": vpc_id,
                    "routes": [{
                        "destinationCidrBlock": "0.0.0.0/0",
                        "natGatewayId": nat.require_attr("gatewayId")?,
                    }],
                })),
            )
            .await?;

        self.associate("public", &public_rtb, &public_subnet_ids)
            .await?;
        self.associate("private", &private_rtb, &private_subnet_ids)
            .await?;
        self.associate("data", &private_rtb, &data_subnet_ids).await?;

        // security groups chain: ALB ← service ← database
        let alb_sg = ctx
            .plane
            .apply(
                ctx.manifest(
                    ResourceKind::SecurityGroup,
                    "network/sg-alb",
                    ctx.namer.derive("alb-sg"),
                )
                .with_spec(json!({
                    "vpcId": vpc_id,
                    "ingress": [
                        { "protocol": "tcp", "fromPort": 80, "toPort": 80, "cidrBlocks": ["0.0.0.0/0"] },
                        { "protocol": "tcp", "fromPort": 443, "toPort": 443, "cidrBlocks": ["0.0.0.0/0"] },
                    ],
                    "egress": [{ "protocol": "-1", "fromPort": 0, "toPort": 0, "cidrBlocks": ["0.0.0.0/0"] }],
                })),
            )
            .await?;
        let alb_sg_id = alb_sg.require_attr("groupId")?;

        let service_sg = ctx
            .plane
            .apply(
                ctx.manifest(
                    ResourceKind::SecurityGroup,
                    "network/sg-service",
                    ctx.namer.derive("service-sg"),
                )
                .with_spec(json!({
                    "vpcId": vpc_id,
                    "ingress": [{
                        "protocol": "tcp",
                        "fromPort": container_port,
                        "toPort": container_port,
                        "sourceSecurityGroupId": alb_sg_id,
                    }],
                    "egress": [{ "protocol": "-1", "fromPort": 0, "toPort": 0, "cidrBlocks": ["0.0.0.0/0"] }],
                })),
            )
            .await?;
        let service_sg_id = service_sg.require_attr("groupId")?;

        let database_sg_id = match database_port {
            None => None,
            Some(port) => {
                let db_sg = ctx
                    .plane
                    .apply(
                        ctx.manifest(
                            ResourceKind::SecurityGroup,
                            "network/sg-database",
                            ctx.namer.derive("db-sg"),
                        )
                        .with_spec(json!({
                            "vpcId": vpc_id,
                            "ingress": [{
                                "protocol": "tcp",
                                "fromPort": port,
                                "toPort": port,
                                "sourceSecurityGroupId": service_sg_id,
                            }],
                            "egress": [{ "protocol": "-1", "fromPort": 0, "toPort": 0, "cidrBlocks": ["0.0.0.0/0"] }],
                        })),
                    )
                    .await?;
                Some(db_sg.require_attr("groupId")?)
            }
        };

        Ok(NetworkTopology {
            vpc,
            public_subnet_ids,
            private_subnet_ids,
            data_subnet_ids,
            alb_sg_id,
            service_sg_id,
            database_sg_id,
        })
    }

    async fn build_subnet_tier(
        &self,
        tier: &str,
        zones: &[String],
        vpc_id: &str,
        offset: u8,
        public: bool,
    ) -> Result<Vec<String>> {
        let ctx = self.ctx;
        let mut ids = Vec::with_capacity(zones.len());
        for (i, zone) in zones.iter().enumerate() {
            let role = format!("network/subnet-{tier}-{i}");
            let record = ctx
                .plane
                .apply(
                    ctx.manifest(
                        ResourceKind::Subnet,
                        &role,
                        ctx.namer.derive(&format!("{tier}-{i}")),
                    )
                    .with_spec(json!({
                        "vpcId": vpc_id,
                        "cidrBlock": format!("10.0.{}.0/24", offset as usize + i),
                        "availabilityZone": zone,
                        "mapPublicIpOnLaunch": public,
                    })),
                )
                .await?;
            ids.push(record.require_attr("subnetId")?);
        }
        Ok(ids)
    }

    async fn associate(
        &self,
        tier: &str,
        route_table: &ResourceRecord,
        subnet_ids: &[String],
    ) -> Result<()> {
        let ctx = self.ctx;
        let rtb_id = route_table.require_attr("routeTableId")?;
        for (i, subnet_id) in subnet_ids.iter().enumerate() {
            let role = format!("network/rtbassoc-{tier}-{i}");
            ctx.plane
                .apply(
                    ctx.manifest(
                        ResourceKind::RouteTableAssociation,
                        &role,
                        ctx.namer.derive(&format!("rtbassoc-{tier}-{i}")),
                    )
                    .with_spec(json!({
                        "routeTableId": rtb_id,
                        "subnetId": subnet_id,
                    })),
                )
                .await?;
        }
        Ok(())
    }
}
