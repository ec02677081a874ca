// eb/src/cli/build.rs
use eb_common::config::Config;
use eb_common::error::Result;
use eb_core::BuildOptions;
use tracing::instrument;

use super::CliArgs;
use crate::pipeline::planner::{dry_run_report, BuildPlanner, PlanFlags};
use crate::pipeline::runner;

#[instrument(skip_all, fields(targets = ?args.easyconfigs))]
pub async fn run(args: &CliArgs, config: &Config) -> Result<()> {
    let mut planner = BuildPlanner::new(config, args.extra_robot_paths());
    let targets = planner.load_targets(&args.easyconfigs)?;

    let flags = PlanFlags {
        robot: args.robot.is_some(),
        // An extended dry run always walks the steps of the requested easyconfigs.
        rebuild: args.rebuild || args.force || args.extended_dry_run,
        ignore_missing: args.dry_run || args.extended_dry_run,
    };
    let graph = planner.plan(&targets, flags)?;

    if args.dry_run {
        print!("{}", dry_run_report(&graph));
        return Ok(());
    }

    let options = BuildOptions {
        dry_run: args.extended_dry_run,
        trace: config.trace,
    };
    runner::run_build_plan(&graph, config, planner.installed(), &options).await
}
