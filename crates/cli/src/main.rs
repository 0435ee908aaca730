//! Juno module command-line client.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration**: flags with environment fallbacks (see [`config`]).
//! 2. **Wire observability**: `tracing-subscriber` with a pretty or JSON
//!    formatter and, when configured, an OpenTelemetry OTLP exporter. Spans and
//!    events from every crate in the workspace flow through it.
//! 3. **Construct infrastructure**: resolve the bus endpoint, build a
//!    [`SocketTransport`], and hand it to a [`JunoModule`].
//! 4. **Run the subcommand**: `serve`, `call`, or `trigger`.

mod config;
mod telemetry;

use std::future::IntoFuture;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use engine::{JunoModule, PendingResponse};
use serde_json::Value;
use tracing::{error, info};
use transport::{Endpoint, SocketTransport};

use crate::config::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let telemetry = telemetry::init(cli.log_format, cli.otlp_endpoint.as_deref())?;

    let result = run(cli).await;
    if let Err(error) = &result {
        let chain = format!("{error:#}");
        error!(error = %chain, "juno-module failed");
    }

    telemetry.shutdown();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let transport = Arc::new(SocketTransport::new(Endpoint::parse(&cli.connect)));
    let endpoint = transport.endpoint().clone();
    let module = JunoModule::new(transport, cli.module_config());

    let registration = module
        .initialize(&cli.module_id, &cli.module_version, cli.dependencies())
        .await
        .with_context(|| format!("registering with the bus at {endpoint}"))?;
    info!(%endpoint, module_id = %cli.module_id, "registration sent");

    match cli.command {
        Command::Serve { hooks } => serve(&module, registration, &hooks).await?,
        Command::Call { function, args } => {
            let value = module
                .call_function(&function, args)
                .await?
                .await
                .with_context(|| format!("calling {function}"))?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Command::Trigger { hook } => {
            module
                .trigger_hook(&hook)
                .await?
                .await
                .with_context(|| format!("triggering {hook}"))?;
            info!(%hook, "hook triggered");
        }
    }

    module.close()?;
    Ok(())
}

async fn serve(
    module: &JunoModule,
    registration: PendingResponse,
    hooks: &[String],
) -> anyhow::Result<()> {
    let _echo = module
        .declare_function("echo", |arguments| async move { Value::Object(arguments) })
        .await?;
    for hook in hooks {
        let name = hook.clone();
        let _subscription = module
            .register_hook(hook, move || info!(hook = %name, "hook fired"))
            .await?;
    }

    tokio::select! {
        acknowledged = registration.into_future() => {
            acknowledged.context("registration was not acknowledged")?;
            info!(hooks = hooks.len(), "registered; serving until Ctrl-C");
        }
        interrupted = tokio::signal::ctrl_c() => {
            interrupted.context("listening for Ctrl-C")?;
            info!("interrupted before registration completed");
            return Ok(());
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("listening for Ctrl-C")?;
    info!("shutting down");
    Ok(())
}
