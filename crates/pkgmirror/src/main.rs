use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pkgmirror_core::{CacheLayout, Mirror, MirrorConfig};
use pkgmirror_fetch::{ClientSettings, ReqwestClient};
use pkgmirror_ledger::ExpiryLedger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{App, Commands};
use crate::lock::LockGuard;
use crate::report::Summary;

mod cli;
mod lock;
mod report;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app = App::parse();
    let config = MirrorConfig::load(&app.config)
        .with_context(|| format!("failed to load config '{}'", app.config.display()))?;

    // removed on every exit path, including errors
    let _lock = LockGuard::acquire(&config.lockfile)?;
    let mut mirror = open_mirror(&config)?;

    match app.cmd {
        Commands::Sync => sync(&config, &mut mirror).await,
        Commands::Check => check(&mirror),
        Commands::Reclaim => reclaim(&mirror),
    }
}

fn open_mirror(config: &MirrorConfig) -> Result<Mirror<ReqwestClient>> {
    let client = ReqwestClient::new(ClientSettings {
        user_agent: config.user_agent.clone(),
        timeout:    config.request_timeout(),
        proxy:      config.proxy.clone(),
    })
    .context("failed to build HTTP client")?;
    let ledger = ExpiryLedger::open(&config.expired_db)
        .with_context(|| format!("failed to open expiry ledger '{}'", config.expired_db.display()))?;
    let layout = CacheLayout::new(&config.cache_dir, &config.upstream_url);

    Ok(Mirror::new(Arc::new(client), layout, ledger, config.mirror_options()?))
}

async fn sync(config: &MirrorConfig, mirror: &mut Mirror<ReqwestClient>) -> Result<()> {
    tracing::info!(upstream = %config.upstream_url, cache = %config.cache_dir.display(), "pkgmirror v{}", env!("CARGO_PKG_VERSION"));
    let report = mirror.run().await.context("sync failed")?;

    let summary = Summary {
        display_url:  config.display_url().to_string(),
        upstream_url: config.upstream_url.clone(),
        packages:     report.leaves,
        finished_at:  report.finished_at,
    };
    let path = summary.write(mirror.layout().root())?;
    tracing::info!(
        passes = report.passes,
        shards = report.shards_fetched,
        leaves = report.leaves_fetched,
        reclaimed = report.reclaimed,
        report = %path.display(),
        "sync complete"
    );
    Ok(())
}

fn check(mirror: &Mirror<ReqwestClient>) -> Result<()> {
    let report = mirror.check().context("consistency check failed")?;
    if !report.is_consistent() {
        anyhow::bail!(
            "{} of {} leaves bad, {} shards missing; run `pkgmirror sync`",
            report.bad,
            report.total,
            report.missing_shards
        );
    }
    tracing::info!(total = report.total, "mirror is consistent");
    Ok(())
}

fn reclaim(mirror: &Mirror<ReqwestClient>) -> Result<()> {
    let report = mirror.reclaim()?;
    tracing::info!(
        reclaimed = report.reclaimed.len(),
        missing = report.missing,
        failed = report.failed,
        remaining = mirror.ledger().len(),
        "reclaim complete"
    );
    Ok(())
}
