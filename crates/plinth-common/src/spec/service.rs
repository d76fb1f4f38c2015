//! Containerized service workload fields

use serde::{Deserialize, Serialize};

use super::{DatabaseSpec, WorkloadMeta};
use crate::Error;

fn default_container_port() -> u16 {
    3000
}

fn default_cpu_units() -> u32 {
    256
}

fn default_memory_mib() -> u32 {
    512
}

fn default_desired_count() -> u32 {
    1
}

fn default_health_check_path() -> String {
    "/".to_string()
}

// =============================================================================
// Scaling bounds
// =============================================================================

/// Inclusive replica bounds for the auto-scaling target
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ScalingBounds {
    /// Minimum running task count
    pub min: u32,
    /// Maximum running task count
    pub max: u32,
}

impl Default for ScalingBounds {
    fn default() -> Self {
        Self { min: 1, max: 5 }
    }
}

// =============================================================================
// Environment variables
// =============================================================================

/// A single container environment variable. Order of declaration is
/// preserved into the task definition.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct EnvVar {
    /// Variable name
    pub name: String,
    /// Variable value
    pub value: String,
}

impl EnvVar {
    /// Create an environment variable
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

// =============================================================================
// Container service spec
// =============================================================================

/// Containerized service workload: a container cluster behind a load
/// balancer, auto-scaled on resource utilization, with an optional
/// managed relational database.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerServiceSpec {
    /// Shared workload metadata
    #[serde(flatten)]
    pub meta: WorkloadMeta,

    /// Container image reference
    pub container_image: String,

    /// Port the container listens on
    #[serde(default = "default_container_port")]
    pub container_port: u16,

    /// CPU units for the task (1024 = one vCPU)
    #[serde(default = "default_cpu_units")]
    pub cpu_units: u32,

    /// Memory for the task in MiB
    #[serde(default = "default_memory_mib")]
    pub memory_mib: u32,

    /// Initial running task count
    #[serde(default = "default_desired_count")]
    pub desired_count: u32,

    /// Auto-scaling replica bounds
    #[serde(default)]
    pub scaling_bounds: ScalingBounds,

    /// Path probed by the load balancer health check
    #[serde(default = "default_health_check_path")]
    pub health_check_path: String,

    /// Container environment variables, in declaration order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment_variables: Vec<EnvVar>,

    /// Managed relational database attachment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseSpec>,
}

impl ContainerServiceSpec {
    /// Create a service spec with defaults for everything but the image
    pub fn new(meta: WorkloadMeta, container_image: impl Into<String>) -> Self {
        Self {
            meta,
            container_image: container_image.into(),
            container_port: default_container_port(),
            cpu_units: default_cpu_units(),
            memory_mib: default_memory_mib(),
            desired_count: default_desired_count(),
            scaling_bounds: ScalingBounds::default(),
            health_check_path: default_health_check_path(),
            environment_variables: Vec::new(),
            database: None,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        let workload = &self.meta.identity;

        if self.container_image.is_empty() {
            return Err(Error::validation_for_field(
                workload,
                "containerImage",
                "container image must not be empty",
            ));
        }
        if self.container_port == 0 {
            return Err(Error::validation_for_field(
                workload,
                "containerPort",
                "container port must be non-zero",
            ));
        }
        if self.cpu_units == 0 || self.memory_mib == 0 {
            return Err(Error::validation_for_field(
                workload,
                "cpu/memory",
                "cpu and memory must be non-zero",
            ));
        }

        let bounds = self.scaling_bounds;
        if bounds.min == 0 {
            return Err(Error::validation_for_field(
                workload,
                "scalingBounds.min",
                "minimum task count must be at least 1",
            ));
        }
        if bounds.min > bounds.max {
            return Err(Error::validation_for_field(
                workload,
                "scalingBounds",
                format!(
                    "minimum task count {} exceeds maximum {}",
                    bounds.min, bounds.max
                ),
            ));
        }
        if self.desired_count < bounds.min || self.desired_count > bounds.max {
            return Err(Error::validation_for_field(
                workload,
                "desiredCount",
                format!(
                    "desired count {} is outside scaling bounds {}..{}",
                    self.desired_count, bounds.min, bounds.max
                ),
            ));
        }

        if !self.health_check_path.starts_with('/') {
            return Err(Error::validation_for_field(
                workload,
                "healthCheckPath",
                "health check path must start with '/'",
            ));
        }

        let mut seen = std::collections::BTreeSet::new();
        for var in &self.environment_variables {
            if var.name.is_empty() {
                return Err(Error::validation_for_field(
                    workload,
                    "environmentVariables",
                    "environment variable names must not be empty",
                ));
            }
            if !seen.insert(var.name.as_str()) {
                return Err(Error::validation_for_field(
                    workload,
                    "environmentVariables",
                    format!("duplicate environment variable '{}'", var.name),
                ));
            }
        }

        if let Some(db) = &self.database {
            db.validate(workload)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ContainerServiceSpec {
        ContainerServiceSpec::new(WorkloadMeta::new("todo"), "registry.example.com/todo:1")
    }

    #[test]
    fn defaults_match_documented_values() {
        let s = spec();
        assert_eq!(s.container_port, 3000);
        assert_eq!(s.cpu_units, 256);
        assert_eq!(s.memory_mib, 512);
        assert_eq!(s.desired_count, 1);
        assert_eq!(s.scaling_bounds, ScalingBounds { min: 1, max: 5 });
        assert_eq!(s.health_check_path, "/");
    }

    #[test]
    fn desired_count_outside_bounds_is_rejected() {
        let mut s = spec();
        s.desired_count = 9;
        assert!(s.validate().is_err());
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let mut s = spec();
        s.scaling_bounds = ScalingBounds { min: 4, max: 2 };
        assert!(s.validate().is_err());
    }

    #[test]
    fn duplicate_env_vars_are_rejected() {
        let mut s = spec();
        s.environment_variables = vec![EnvVar::new("PORT", "3000"), EnvVar::new("PORT", "8080")];
        assert!(s.validate().is_err());
    }

    #[test]
    fn relative_health_check_path_is_rejected() {
        let mut s = spec();
        s.health_check_path = "health".to_string();
        assert!(s.validate().is_err());
    }
}
