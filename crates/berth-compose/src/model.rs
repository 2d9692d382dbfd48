//! Typed model for compose documents.
//!
//! The model is a strictly tree-shaped owned structure: dependencies between
//! services are represented by name, never by pointer. Dropping a
//! [`ComposeFile`] releases every nested collection and string. Iteration
//! order of services, environment, labels, and logging options mirrors the
//! source document.

use std::fmt;

use indexmap::IndexMap;

/// Nanoseconds per second, for duration fields.
pub const NS_PER_SEC: u64 = 1_000_000_000;

/// Default `stop_grace_period` (10 seconds).
pub const DEFAULT_STOP_GRACE_PERIOD_NS: u64 = 10 * NS_PER_SEC;

/// A parsed compose document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComposeFile {
    /// Project name, if the document sets one.
    pub name: Option<String>,
    /// Services, in source order.
    pub services: IndexMap<String, Service>,
    /// Named volumes, in source order. Bodies are not modeled.
    pub volumes: IndexMap<String, Volume>,
    /// Named networks, in source order. Bodies are not modeled.
    pub networks: IndexMap<String, Network>,
}

impl ComposeFile {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a service by name.
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }
}

/// A single service definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    /// Service name (the key under `services`).
    pub name: String,
    /// Container image reference.
    pub image: Option<String>,
    /// Published ports.
    pub ports: Vec<Port>,
    /// Environment variables, in source order.
    pub environment: IndexMap<String, String>,
    /// Startup dependencies on other services.
    pub depends_on: Vec<Dependency>,
    /// Health probe configuration.
    pub healthcheck: Option<Healthcheck>,
    /// Volume mounts.
    pub volumes: Vec<VolumeMount>,
    /// Container command.
    pub command: Vec<String>,
    /// Container entrypoint.
    pub entrypoint: Vec<String>,
    /// Working directory inside the container.
    pub working_dir: Option<String>,
    /// User to run as.
    pub user: Option<String>,
    /// Explicit container name.
    pub container_name: Option<String>,
    /// Container hostname.
    pub hostname: Option<String>,
    /// Container NIS domain name.
    pub domainname: Option<String>,
    /// Restart policy.
    pub restart: RestartPolicy,
    /// Whether to run an init process as PID 1.
    pub run_init: bool,
    /// Signal used to stop the container.
    pub stop_signal: Option<String>,
    /// Grace period before the container is killed, in nanoseconds.
    pub stop_grace_period_ns: u64,
    /// Mount the root filesystem read-only.
    pub read_only: bool,
    /// Run with extended privileges.
    pub privileged: bool,
    /// Capabilities to add.
    pub cap_add: Vec<String>,
    /// Capabilities to drop.
    pub cap_drop: Vec<String>,
    /// Ports exposed to linked services without publishing.
    pub expose: Vec<String>,
    /// Custom DNS servers.
    pub dns: Vec<String>,
    /// Custom DNS search domains.
    pub dns_search: Vec<String>,
    /// Additional `/etc/hosts` entries.
    pub extra_hosts: Vec<String>,
    /// Networks this service attaches to.
    pub networks: Vec<String>,
    /// Labels, in source order.
    pub labels: IndexMap<String, String>,
    /// Environment files to load.
    pub env_file: Vec<String>,
    /// Memory limit in bytes.
    pub mem_limit: Option<u64>,
    /// Memory reservation in bytes.
    pub mem_reservation: Option<u64>,
    /// CPU quota.
    pub cpus: Option<f64>,
    /// PID limit (`-1` for unlimited).
    pub pids_limit: Option<i64>,
    /// Logging driver configuration.
    pub logging: Option<Logging>,
}

impl Service {
    /// Create a service with default field values.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: None,
            ports: Vec::new(),
            environment: IndexMap::new(),
            depends_on: Vec::new(),
            healthcheck: None,
            volumes: Vec::new(),
            command: Vec::new(),
            entrypoint: Vec::new(),
            working_dir: None,
            user: None,
            container_name: None,
            hostname: None,
            domainname: None,
            restart: RestartPolicy::default(),
            run_init: false,
            stop_signal: None,
            stop_grace_period_ns: DEFAULT_STOP_GRACE_PERIOD_NS,
            read_only: false,
            privileged: false,
            cap_add: Vec::new(),
            cap_drop: Vec::new(),
            expose: Vec::new(),
            dns: Vec::new(),
            dns_search: Vec::new(),
            extra_hosts: Vec::new(),
            networks: Vec::new(),
            labels: IndexMap::new(),
            env_file: Vec::new(),
            mem_limit: None,
            mem_reservation: None,
            cpus: None,
            pids_limit: None,
            logging: None,
        }
    }
}

/// A named volume. The body is shape-checked but not modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Volume {}

/// A named network. The body is shape-checked but not modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Network {}

/// A published port mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Port {
    /// Host port.
    pub host: u16,
    /// Container port.
    pub container: u16,
    /// Transport protocol.
    pub protocol: Protocol,
}

/// Transport protocol of a published port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    /// TCP (the default).
    #[default]
    Tcp,
    /// UDP.
    Udp,
}

impl Protocol {
    /// String form as written in compose files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A startup dependency on another service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Name of the depended-on service.
    pub service: String,
    /// Condition the dependency must reach.
    pub condition: Condition,
}

/// Condition a dependency must reach before this service starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Condition {
    /// The dependency has started (the default).
    #[default]
    ServiceStarted,
    /// The dependency reports healthy.
    ServiceHealthy,
    /// The dependency ran to completion successfully.
    ServiceCompletedSuccessfully,
}

impl Condition {
    /// Parse a condition name; unknown names return `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "service_started" => Some(Condition::ServiceStarted),
            "service_healthy" => Some(Condition::ServiceHealthy),
            "service_completed_successfully" => Some(Condition::ServiceCompletedSuccessfully),
            _ => None,
        }
    }
}

/// Health probe configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Healthcheck {
    /// Probe command. Stored verbatim; no shell tokenization.
    pub test_cmd: Vec<String>,
    /// Interval between probes, in nanoseconds.
    pub interval_ns: u64,
    /// Probe timeout, in nanoseconds.
    pub timeout_ns: u64,
    /// Consecutive failures before the container is unhealthy.
    pub retries: u32,
    /// Startup grace period, in nanoseconds.
    pub start_period_ns: u64,
}

impl Default for Healthcheck {
    fn default() -> Self {
        Self {
            test_cmd: Vec::new(),
            interval_ns: 30 * NS_PER_SEC,
            timeout_ns: 30 * NS_PER_SEC,
            retries: 3,
            start_period_ns: 0,
        }
    }
}

/// A bind or volume mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    /// Mount source (volume name or host path).
    pub source: String,
    /// Mount target inside the container.
    pub target: String,
    /// Mount read-only.
    pub read_only: bool,
}

/// Container restart policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestartPolicy {
    /// Policy kind.
    pub kind: RestartKind,
    /// Retry cap for `on-failure:N`.
    pub max_retries: Option<u32>,
}

/// Restart policy kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartKind {
    /// Never restart (the default).
    #[default]
    No,
    /// Always restart.
    Always,
    /// Restart on non-zero exit.
    OnFailure,
    /// Restart unless explicitly stopped.
    UnlessStopped,
}

/// Logging driver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Logging {
    /// Driver name.
    pub driver: Option<String>,
    /// Driver options, in source order.
    pub options: IndexMap<String, String>,
}
