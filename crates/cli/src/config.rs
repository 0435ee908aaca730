//! Command-line and environment configuration.

use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use engine::{Arguments, Dependencies, ModuleConfig};

#[derive(Debug, Parser)]
#[command(name = "juno-module")]
#[command(version)]
#[command(about = "Run a module on a Juno bus, or call into one")]
pub struct Cli {
    /// Bus address: `host:port` for TCP, otherwise a Unix socket path
    #[arg(long, env = "JUNO_CONNECT", default_value = "../juno.sock", global = true)]
    pub connect: String,

    /// Identifier this module registers under
    #[arg(long, env = "JUNO_MODULE_ID", default_value = "juno-module", global = true)]
    pub module_id: String,

    /// Version reported at registration
    #[arg(long, env = "JUNO_MODULE_VERSION", default_value = env!("CARGO_PKG_VERSION"), global = true)]
    pub module_version: String,

    /// Module dependency as `name=range`; repeatable
    #[arg(long = "dependency", value_name = "NAME=RANGE", value_parser = parse_dependency, global = true)]
    pub dependencies: Vec<(String, String)>,

    #[arg(long, value_enum, env = "JUNO_LOG_FORMAT", default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,

    /// Give up on a request after this many seconds (default: wait forever)
    #[arg(long, env = "JUNO_REQUEST_TIMEOUT_SECS", global = true)]
    pub request_timeout_secs: Option<u64>,

    /// OTLP gRPC endpoint for span export, e.g. `http://localhost:4317`
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT", global = true)]
    pub otlp_endpoint: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Declare an `echo` function and listen on hooks until Ctrl-C
    Serve {
        /// Hook to subscribe to; repeatable
        #[arg(long = "hook", value_name = "HOOK")]
        hooks: Vec<String>,
    },
    /// Call a function declared by another module and print its result
    Call {
        function: String,
        /// Arguments as a JSON object
        #[arg(long, value_parser = parse_arguments, default_value = "{}")]
        args: Arguments,
    },
    /// Fire a hook for every module subscribed to it
    Trigger { hook: String },
}

impl Cli {
    pub fn module_config(&self) -> ModuleConfig {
        let config = ModuleConfig::default();
        match self.request_timeout_secs {
            Some(secs) => config.with_request_timeout(Duration::from_secs(secs)),
            None => config,
        }
    }

    pub fn dependencies(&self) -> Dependencies {
        self.dependencies.iter().cloned().collect()
    }
}

fn parse_dependency(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, range)) if !name.is_empty() && !range.is_empty() => {
            Ok((name.to_owned(), range.to_owned()))
        }
        _ => Err(format!("expected NAME=RANGE, got '{raw}'")),
    }
}

fn parse_arguments(raw: &str) -> Result<Arguments, String> {
    serde_json::from_str(raw).map_err(|error| format!("arguments must be a JSON object: {error}"))
}
