use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tenantshift_migrate::cli::Cli;
use tenantshift_migrate::{run, MigrationConfig, MigrationContext, YamlMarshaller};
use tenantshift_platform::{CfClient, PlatformClient};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let mut config = MigrationConfig::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    cli.apply(&mut config);
    config.validate()?;

    let direction = cli.direction();
    let scope = cli.scope();
    tracing::info!(%direction, ?scope, dry_run = config.dry_run, "tshift starting");

    let cancel = CancellationToken::new();
    let source: Arc<dyn PlatformClient> = Arc::new(CfClient::new(
        config.source.clone(),
        config.retry.clone(),
        cancel.clone(),
    ));
    let target: Arc<dyn PlatformClient> = Arc::new(CfClient::new(
        config.target.clone(),
        config.retry.clone(),
        cancel.clone(),
    ));
    let marshaller = Arc::new(YamlMarshaller::new(config.export_dir.clone()));
    let ctx = Arc::new(MigrationContext::new(config, source, target, marshaller, cancel.clone()));

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; cancelling outstanding work");
            interrupt.cancel();
        }
    });

    let outcome = run(Arc::clone(&ctx), direction, &scope).await;
    println!("{}", ctx.summary);

    outcome.with_context(|| format!("{} aborted", direction))?;
    if ctx.summary.has_failures() {
        anyhow::bail!("{} instance(s) failed", ctx.summary.failed_count());
    }
    Ok(())
}
