// eb/src/pipeline/runner.rs
//! Builds a resolved plan one easyconfig at a time, dependencies first.
use std::time::Instant;

use colored::Colorize;
use eb_common::config::Config;
use eb_common::dependency::ResolvedGraph;
use eb_common::error::Result;
use eb_common::InstalledModules;
use eb_core::build::context::format_duration;
use eb_core::{build_and_install, BuildOptions};
use tracing::{debug, error, info, instrument};

/// Stops at the first failing build; everything built before it stays installed.
#[instrument(skip_all, fields(items = graph.build_plan.len(), dry_run = options.dry_run))]
pub async fn run_build_plan(
    graph: &ResolvedGraph,
    config: &Config,
    installed: &InstalledModules,
    options: &BuildOptions,
) -> Result<()> {
    if graph.build_plan.is_empty() {
        println!("== No easyconfigs left to be built.");
        return Ok(());
    }
    if options.trace && !graph.filtered.is_empty() {
        println!(
            "  >> filtered dependencies: {}",
            graph.filtered.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }

    let started = Instant::now();
    let total = graph.build_plan.len();
    let mut succeeded = 0;
    for item in &graph.build_plan {
        debug!(
            "Building {} ({} of {})",
            item.easyconfig.full_mod_name(),
            succeeded + 1,
            total
        );
        match build_and_install(item, config, installed, options).await {
            Ok(outcome) => {
                succeeded += 1;
                info!(
                    "Installed {} in {} (module file {})",
                    outcome.mod_name,
                    outcome.install_dir.display(),
                    outcome.module_file.display()
                );
            }
            Err(e) => {
                error!("Build of {} failed: {}", item.easyconfig.full_mod_name(), e);
                if !options.dry_run {
                    println!("{}", format!("== Build succeeded for {succeeded} out of {total}").red());
                }
                return Err(e);
            }
        }
    }

    if !options.dry_run {
        println!(
            "{}",
            format!("== Build succeeded for {succeeded} out of {total}").green()
        );
        println!("== Total time: {}", format_duration(started.elapsed()));
    }
    Ok(())
}
