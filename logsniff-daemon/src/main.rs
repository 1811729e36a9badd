use anyhow::Result;
use clap::Parser;

use logsniff_daemon::cli::DaemonCli;
use logsniff_daemon::logging;
use logsniff_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();
    let config = cli.load_config().await?;
    logging::init_tracing(&config.general)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "logsniff-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config).await?;

    if cli.validate {
        let summary = orchestrator.validate();
        for error in &summary.errors {
            tracing::error!(error = %error, "invalid sniff rule");
        }
        tracing::info!(
            groups = summary.groups,
            valid_rules = summary.valid_rules,
            disabled_rules = summary.disabled_rules,
            invalid_rules = summary.errors.len(),
            "validation finished"
        );
        if !summary.errors.is_empty() {
            return Err(anyhow::anyhow!(
                "{} sniff rule(s) failed validation",
                summary.errors.len()
            ));
        }
        return Ok(());
    }

    if cli.compile_only {
        let sets = orchestrator.compile().await;
        let rules: usize = sets.iter().map(|set| set.len()).sum();
        tracing::info!(groups = sets.len(), rules, "scripts compiled");
        return Ok(());
    }

    orchestrator.run().await?;
    Ok(())
}
