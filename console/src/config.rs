use clap::Parser;
use common::{factory::BuildOptions, BackendKind, RegistryConfig};
use std::{path::PathBuf, time::Duration};

#[derive(Parser, Debug)]
#[command(author, version, about = "Operations console for Kubernetes and Elasticsearch instances", long_about = None)]
pub struct Parameters {
    /// Address the HTTP API listens on
    #[arg(long, env = "CONSOLE_BIND", default_value = "0.0.0.0:9000")]
    pub bind: String,

    /// YAML inventory of instances and auth configs to start from
    #[arg(long, env = "CONSOLE_INVENTORY")]
    pub inventory: Option<PathBuf>,

    /// Connect timeout of the cluster clients, in seconds
    #[arg(long, env = "CONSOLE_CONNECT_TIMEOUT", default_value_t = 5)]
    pub connect_timeout: u64,

    /// Read timeout of the cluster clients, in seconds
    #[arg(long, env = "CONSOLE_READ_TIMEOUT", default_value_t = 30)]
    pub read_timeout: u64,

    /// Bound of the network probes run while building clients, in seconds
    #[arg(long, env = "CONSOLE_PROBE_TIMEOUT", default_value_t = 3)]
    pub probe_timeout: u64,

    /// Bound of a whole client build for one instance, in seconds
    #[arg(long, env = "CONSOLE_BUILD_TIMEOUT", default_value_t = 20)]
    pub build_timeout: u64,

    /// Instances built in parallel at startup
    #[arg(long, env = "CONSOLE_INIT_CONCURRENCY", default_value_t = 8)]
    pub init_concurrency: usize,

    /// Also register elasticsearch instances at startup
    #[arg(long, env = "CONSOLE_BOOTSTRAP_ELASTICSEARCH")]
    pub bootstrap_elasticsearch: bool,

    /// Log as JSON lines
    #[arg(long, env = "CONSOLE_LOG_JSON")]
    pub log_json: bool,
}

impl Parameters {
    pub fn registry_config(&self) -> RegistryConfig {
        let mut bootstrap_kinds = vec![BackendKind::Kubernetes];
        if self.bootstrap_elasticsearch {
            bootstrap_kinds.push(BackendKind::Elasticsearch);
        }
        RegistryConfig {
            build: BuildOptions {
                connect_timeout: Duration::from_secs(self.connect_timeout),
                read_timeout: Duration::from_secs(self.read_timeout),
                probe_timeout: Duration::from_secs(self.probe_timeout),
            },
            build_timeout: Duration::from_secs(self.build_timeout),
            init_concurrency: self.init_concurrency.max(1),
            bootstrap_kinds,
        }
    }
}
