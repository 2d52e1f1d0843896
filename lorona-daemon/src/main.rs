use anyhow::Result;
use clap::Parser;

use lorona_core::config::LoronaConfig;
use lorona_daemon::cli::DaemonCli;
use lorona_daemon::logging;
use lorona_daemon::orchestrator::Orchestrator;
use lorona_log_pipeline::PatternRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = LoronaConfig::from_file(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config: {e}"))?;
    config.apply_env_overrides();
    cli.apply_overrides(&mut config);

    if cli.validate {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid config: {e}"))?;
        let registry = PatternRegistry::load(&config.log_pipeline.pattern_file)
            .await
            .map_err(|e| anyhow::anyhow!("invalid pattern file: {e}"))?;
        let sources = config.usable_log_sources();
        let unknown = sources
            .iter()
            .filter(|s| registry.get(&s.log_type).is_none())
            .count();
        println!(
            "configuration OK: {} log sources ({} with unknown log type), {} patterns, {} endpoints, {} backup folders",
            sources.len(),
            unknown,
            registry.len(),
            config.usable_endpoints().len(),
            config.usable_backups().len(),
        );
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(
        config = %cli.config.display(),
        version = env!("CARGO_PKG_VERSION"),
        "lorona-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config)?;
    orchestrator.run().await?;

    tracing::info!("lorona-daemon shut down");
    Ok(())
}
