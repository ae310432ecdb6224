// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller configuration loaded once at start-up.
//!
//! The file is YAML. The `loadBalancer` block also accepts the lower-case
//! `loadbalancer` key used by older deployments:
//!
//! ```yaml
//! clusterName: prod-east
//! loadbalancer:
//!   compartment: ocid1.compartment.oc1..aaaa
//!   subnets:
//!     - ocid1.subnet.oc1.iad.aaaa
//!     - ocid1.subnet.oc1.iad.bbbb
//! api:
//!   endpoint: https://iaas.us-ashburn-1.oraclecloud.com
//! ```

use crate::constants::{
    AVAILABLE_SHAPES, COMPARTMENT_OCID_PREFIX, DEFAULT_API_ENDPOINT, DEFAULT_CALL_TIMEOUT_SECS,
    DEFAULT_CLUSTER_NAME, DEFAULT_HEALTH_CHECK_PATH, DEFAULT_HEALTH_CHECK_PORT,
    DEFAULT_HEALTH_CHECK_PROTOCOL, DEFAULT_HTTPS_PORT, DEFAULT_HTTP_PORT, DEFAULT_INGRESS_CLASS,
    DEFAULT_INITIAL_BACKOFF_MILLIS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF_SECS,
    DEFAULT_NAME_PREFIX, DEFAULT_POLICY, DEFAULT_SHAPE, DEFAULT_WORK_REQUEST_POLL_MILLIS,
    DEFAULT_WORK_REQUEST_TIMEOUT_SECS, TENANCY_OCID_PREFIX,
};
use crate::model::HealthCheck;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config field '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Top-level controller configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerConfig {
    /// Cluster identity used in the ownership tag
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    #[serde(default)]
    pub ingress_class: IngressClassConfig,

    #[serde(alias = "loadbalancer")]
    pub load_balancer: LoadBalancerConfig,

    #[serde(default)]
    pub api: ApiConfig,
}

/// Which Ingress objects this controller claims.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressClassConfig {
    #[serde(default = "default_ingress_class")]
    pub name: String,

    /// Also manage Ingresses that name no class at all
    #[serde(default)]
    pub manage_unclassed: bool,
}

impl Default for IngressClassConfig {
    fn default() -> Self {
        Self {
            name: default_ingress_class(),
            manage_unclassed: false,
        }
    }
}

/// Defaults applied to every load balancer, some overridable per Ingress.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerConfig {
    pub compartment: String,

    pub subnets: Vec<String>,

    #[serde(default = "default_shape")]
    pub default_shape: String,

    #[serde(default = "default_policy")]
    pub policy: String,

    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    #[serde(default = "default_https_port")]
    pub https_port: u16,

    #[serde(default)]
    pub health_check: HealthCheckConfig,

    /// Freeform tags added to every load balancer
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckConfig {
    #[serde(default = "default_health_check_protocol")]
    pub protocol: String,

    #[serde(default = "default_health_check_port")]
    pub port: u16,

    #[serde(default = "default_health_check_path")]
    pub url_path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            protocol: default_health_check_protocol(),
            port: default_health_check_port(),
            url_path: default_health_check_path(),
        }
    }
}

impl From<&HealthCheckConfig> for HealthCheck {
    fn from(cfg: &HealthCheckConfig) -> Self {
        Self {
            protocol: cfg.protocol.clone(),
            port: cfg.port,
            url_path: cfg.url_path.clone(),
        }
    }
}

/// Cloud API client settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    #[serde(default = "default_api_endpoint")]
    pub endpoint: String,

    /// File holding a bearer token, re-read on every call (rotated by a sidecar)
    #[serde(default)]
    pub auth_token_file: Option<PathBuf>,

    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_millis: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    #[serde(default = "default_work_request_poll")]
    pub work_request_poll_millis: u64,

    #[serde(default = "default_work_request_timeout")]
    pub work_request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_api_endpoint(),
            auth_token_file: None,
            call_timeout_secs: default_call_timeout(),
            max_attempts: default_max_attempts(),
            initial_backoff_millis: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            work_request_poll_millis: default_work_request_poll(),
            work_request_timeout_secs: default_work_request_timeout(),
        }
    }
}

impl ApiConfig {
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    #[must_use]
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_millis)
    }

    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    #[must_use]
    pub fn work_request_poll(&self) -> Duration {
        Duration::from_millis(self.work_request_poll_millis)
    }

    #[must_use]
    pub fn work_request_timeout(&self) -> Duration {
        Duration::from_secs(self.work_request_timeout_secs)
    }
}

fn default_cluster_name() -> String {
    DEFAULT_CLUSTER_NAME.to_string()
}

fn default_ingress_class() -> String {
    DEFAULT_INGRESS_CLASS.to_string()
}

fn default_shape() -> String {
    DEFAULT_SHAPE.to_string()
}

fn default_policy() -> String {
    DEFAULT_POLICY.to_string()
}

fn default_name_prefix() -> String {
    DEFAULT_NAME_PREFIX.to_string()
}

fn default_http_port() -> u16 {
    DEFAULT_HTTP_PORT
}

fn default_https_port() -> u16 {
    DEFAULT_HTTPS_PORT
}

fn default_health_check_protocol() -> String {
    DEFAULT_HEALTH_CHECK_PROTOCOL.to_string()
}

fn default_health_check_port() -> u16 {
    DEFAULT_HEALTH_CHECK_PORT
}

fn default_health_check_path() -> String {
    DEFAULT_HEALTH_CHECK_PATH.to_string()
}

fn default_api_endpoint() -> String {
    DEFAULT_API_ENDPOINT.to_string()
}

fn default_call_timeout() -> u64 {
    DEFAULT_CALL_TIMEOUT_SECS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_initial_backoff() -> u64 {
    DEFAULT_INITIAL_BACKOFF_MILLIS
}

fn default_max_backoff() -> u64 {
    DEFAULT_MAX_BACKOFF_SECS
}

fn default_work_request_poll() -> u64 {
    DEFAULT_WORK_REQUEST_POLL_MILLIS
}

fn default_work_request_timeout() -> u64 {
    DEFAULT_WORK_REQUEST_TIMEOUT_SECS
}

/// Whether a value looks like a compartment (or tenancy root) OCID.
#[must_use]
pub fn is_compartment_ocid(value: &str) -> bool {
    value.starts_with(COMPARTMENT_OCID_PREFIX) || value.starts_with(TENANCY_OCID_PREFIX)
}

impl ControllerConfig {
    /// Parse and validate a YAML document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for invalid YAML and `ConfigError::Invalid`
    /// when a field fails validation.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate the configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` if the file cannot be read, otherwise the
    /// errors of [`ControllerConfig::from_yaml`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Check cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let lb = &self.load_balancer;

        if !is_compartment_ocid(&lb.compartment) {
            return Err(ConfigError::Invalid {
                field: "loadBalancer.compartment",
                reason: format!("'{}' is not a compartment OCID", lb.compartment),
            });
        }

        if lb.subnets.is_empty() {
            return Err(ConfigError::Invalid {
                field: "loadBalancer.subnets",
                reason: "at least one subnet is required".to_string(),
            });
        }

        if let Some(subnet) = lb.subnets.iter().find(|s| !s.starts_with("ocid1.subnet.")) {
            return Err(ConfigError::Invalid {
                field: "loadBalancer.subnets",
                reason: format!("'{subnet}' is not a subnet OCID"),
            });
        }

        if !AVAILABLE_SHAPES.contains(&lb.default_shape.as_str()) {
            return Err(ConfigError::Invalid {
                field: "loadBalancer.defaultShape",
                reason: format!(
                    "'{}' is not one of {}",
                    lb.default_shape,
                    AVAILABLE_SHAPES.join(", ")
                ),
            });
        }

        if lb.name_prefix.is_empty() {
            return Err(ConfigError::Invalid {
                field: "loadBalancer.namePrefix",
                reason: "must not be empty".to_string(),
            });
        }

        if self.cluster_name.is_empty() {
            return Err(ConfigError::Invalid {
                field: "clusterName",
                reason: "must not be empty".to_string(),
            });
        }

        url::Url::parse(&self.api.endpoint).map_err(|e| ConfigError::Invalid {
            field: "api.endpoint",
            reason: e.to_string(),
        })?;

        if self.api.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "api.callTimeoutSecs",
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.api.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "api.maxAttempts",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
