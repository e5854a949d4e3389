// Tournament simulation entry point.
//
// Startup sequence:
// 1. Initialize tracing
// 2. Load config (copying defaults on first run)
// 3. Run the contest pipeline (slate load, bayesian update, optimizer,
//    field generation, swap planning, sampling, scoring, output files)
// 4. Print the run summary

use anyhow::Context;
use tracing::info;

use slatesim::config;
use slatesim::sim;

fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("slatesim starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "config loaded: {} {:?}, {} lineups, field {}, {} iterations",
        config.site.display_str(),
        config.style,
        config.engine.num_lineups,
        config.engine.field_size,
        config.engine.iterations
    );

    // 3. Run the pipeline
    let report = sim::run(&config).context("simulation failed")?;

    // 4. Summary
    let summary = report.summary;
    println!(
        "{} unique lineups scored over {} iterations \
         ({} skipped entries, {} infeasible solves, {} degenerate matchups, {} flagged entries)",
        report.entries.len(),
        report.iterations,
        summary.skipped_entries,
        summary.infeasible_solves,
        summary.degenerate_matchups,
        summary.flagged_entries
    );
    info!("slatesim finished");
    Ok(())
}

/// Initialize tracing to stderr with an env-filter default.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("slatesim=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
