//! Configuration for the scheduler.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use corral_proto::FrameworkInfo;

use crate::offers::TaskResources;
use crate::queue::DEFAULT_QUEUE_CAPACITY;

/// Path of the scheduler endpoint on the resource manager.
pub const SCHEDULER_API_PATH: &str = "/api/v1/scheduler";

/// Framework registration defaults, used when no framework was persisted.
#[derive(Debug, Clone)]
pub struct FrameworkConfig {
    /// Unix user tasks run as.
    pub user: String,

    /// Framework display name.
    pub name: String,

    /// Hostname advertised to the resource manager.
    pub hostname: String,

    /// URL of the admin interface.
    pub webui_url: String,

    /// How long the resource manager keeps tasks alive while disconnected.
    pub failover_timeout_secs: f64,

    /// Whether agents checkpoint task state.
    pub checkpoint: bool,
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Resource manager base URL (example: http://127.0.0.1:5050).
    pub master_url: String,

    /// Admin interface listen address.
    pub listen_addr: SocketAddr,

    /// Directory holding the framework and task state documents.
    pub state_dir: PathBuf,

    /// Framework registration defaults.
    pub framework: FrameworkConfig,

    /// Capacity of the pending command queue.
    pub queue_capacity: usize,

    /// Resources reserved for every launched task.
    pub task_resources: TaskResources,

    /// Optional refuse_seconds filter sent with declines.
    pub decline_refuse_secs: Option<f64>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let master_url = std::env::var("CORRAL_MASTER_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:5050".to_string());

        let listen_addr: SocketAddr = std::env::var("CORRAL_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:9090".to_string())
            .parse()
            .context("CORRAL_LISTEN_ADDR must be a socket address (host:port).")?;

        let state_dir = std::env::var("CORRAL_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("corral"));

        let hostname = match std::env::var("CORRAL_HOSTNAME") {
            Ok(hostname) => hostname,
            Err(_) => hostname::get()
                .context("Failed to resolve hostname. Set CORRAL_HOSTNAME.")?
                .to_string_lossy()
                .into_owned(),
        };

        let webui_url = std::env::var("CORRAL_WEBUI_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", hostname, listen_addr.port()));

        let framework = FrameworkConfig {
            user: std::env::var("CORRAL_USER").unwrap_or_else(|_| "root".to_string()),
            name: std::env::var("CORRAL_FRAMEWORK_NAME")
                .unwrap_or_else(|_| "simple_framework".to_string()),
            hostname,
            webui_url,
            failover_timeout_secs: env_parse("CORRAL_FAILOVER_TIMEOUT_SECS")?.unwrap_or(3600.0),
            checkpoint: std::env::var("CORRAL_CHECKPOINT")
                .map(|v| v == "1" || v.to_lowercase() == "true")
                .unwrap_or(true),
        };

        let queue_capacity = env_parse::<usize>("CORRAL_QUEUE_CAPACITY")?
            .unwrap_or(DEFAULT_QUEUE_CAPACITY)
            .max(1);

        let defaults = TaskResources::default();
        let task_resources = TaskResources {
            cpus: env_parse("CORRAL_TASK_CPUS")?.unwrap_or(defaults.cpus),
            mem_mb: env_parse("CORRAL_TASK_MEM_MB")?.unwrap_or(defaults.mem_mb),
        };

        let decline_refuse_secs = env_parse("CORRAL_DECLINE_REFUSE_SECS")?;

        let log_level = std::env::var("CORRAL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            master_url,
            listen_addr,
            state_dir,
            framework,
            queue_capacity,
            task_resources,
            decline_refuse_secs,
            log_level,
        })
    }

    /// Full URL of the scheduler endpoint.
    pub fn scheduler_endpoint(&self) -> String {
        format!(
            "{}{}",
            self.master_url.trim_end_matches('/'),
            SCHEDULER_API_PATH
        )
    }

    /// Framework info used when nothing was persisted yet.
    pub fn default_framework_info(&self) -> FrameworkInfo {
        FrameworkInfo {
            user: self.framework.user.clone(),
            name: self.framework.name.clone(),
            id: None,
            failover_timeout: Some(self.framework.failover_timeout_secs),
            checkpoint: Some(self.framework.checkpoint),
            hostname: Some(self.framework.hostname.clone()),
            webui_url: Some(self.framework.webui_url.clone()),
        }
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    std::env::var(name)
        .ok()
        .map(|v| v.trim().parse::<T>())
        .transpose()
        .with_context(|| format!("{name} has an invalid value."))
}
