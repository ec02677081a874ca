// eb/src/pipeline/planner.rs
//! Turns easyconfig arguments into an ordered build plan.
use std::path::PathBuf;
use std::sync::Arc;

use eb_common::config::Config;
use eb_common::dependency::{DependencyResolver, ResolutionContext, ResolutionStatus, ResolvedGraph};
use eb_common::error::Result;
use eb_common::{EasyConfig, EasyConfigRepository, InstalledModules};
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, Default)]
pub struct PlanFlags {
    pub robot: bool,
    pub rebuild: bool,
    /// Keep going when dependencies are neither installed nor buildable.
    pub ignore_missing: bool,
}

pub struct BuildPlanner<'a> {
    config: &'a Config,
    repository: EasyConfigRepository,
    installed: InstalledModules,
}

impl<'a> BuildPlanner<'a> {
    /// `extra_robot_paths` are searched before the configured robot paths.
    pub fn new(config: &'a Config, extra_robot_paths: Vec<PathBuf>) -> Self {
        let mut repository = EasyConfigRepository::new(config);
        for path in extra_robot_paths.into_iter().rev() {
            repository.prepend_path(path);
        }
        Self {
            config,
            repository,
            installed: InstalledModules::new(config),
        }
    }

    pub fn installed(&self) -> &InstalledModules {
        &self.installed
    }

    /// Locates and parses the easyconfigs given on the command line. The directory of
    /// each one joins the front of the robot search path.
    pub fn load_targets(&mut self, args: &[String]) -> Result<Vec<Arc<EasyConfig>>> {
        let mut targets = Vec::with_capacity(args.len());
        for arg in args {
            let path = self.repository.locate(arg)?;
            debug!("Easyconfig argument {} resolved to {}", arg, path.display());
            let ec = self.repository.load(&path)?;
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                self.repository.prepend_path(dir.to_path_buf());
            }
            targets.push(ec);
        }
        Ok(targets)
    }

    #[instrument(skip_all, fields(targets = targets.len()))]
    pub fn plan(&self, targets: &[Arc<EasyConfig>], flags: PlanFlags) -> Result<ResolvedGraph> {
        let context = ResolutionContext {
            config: self.config,
            repository: &self.repository,
            installed: &self.installed,
            robot: flags.robot,
            rebuild_targets: flags.rebuild,
            ignore_missing: flags.ignore_missing,
        };
        let graph = DependencyResolver::new(context).resolve_targets(targets)?;
        if !graph.filtered.is_empty() {
            debug!(
                "Filtered dependencies: {}",
                graph.filtered.iter().cloned().collect::<Vec<_>>().join(", ")
            );
        }
        Ok(graph)
    }
}

/// Build status of everything the targets need: `[x]` installed, `[ ]` to be built,
/// `[?]` neither installed nor buildable.
pub fn dry_run_report(graph: &ResolvedGraph) -> String {
    let mut lines = vec!["Dry run: printing build status of easyconfigs and dependencies".to_string()];
    let describe = |mod_name: &str, path: Option<&std::path::Path>| match path {
        Some(path) => format!("{} (module: {})", path.display(), mod_name),
        None => format!("(module: {mod_name})"),
    };
    for node in graph.resolution_details.values() {
        if node.status == ResolutionStatus::Installed {
            let path = node.easyconfig.as_ref().and_then(|ec| ec.path.clone());
            lines.push(format!(" * [x] {}", describe(&node.mod_name, path.as_deref())));
        }
    }
    for item in &graph.build_plan {
        lines.push(format!(
            " * [ ] {}",
            describe(&item.easyconfig.full_mod_name(), item.easyconfig.path.as_deref())
        ));
    }
    for mod_name in &graph.missing {
        lines.push(format!(" * [?] {}", describe(mod_name, None)));
    }
    lines.join("\n") + "\n"
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;

    fn write_ec(dir: &Path, file: &str, body: &str) -> PathBuf {
        fs::create_dir_all(dir).unwrap();
        let path = dir.join(file);
        fs::write(&path, body).unwrap();
        path
    }

    fn header(name: &str, version: &str) -> String {
        format!(
            "easyblock = 'Bundle'\nname = '{name}'\nversion = '{version}'\nhomepage = 'https://example.org'\n\
             description = '{name}'\ntoolchain = SYSTEM\n"
        )
    }

    #[test]
    fn robot_plan_puts_dependencies_first() {
        let tmp = tempfile::tempdir().unwrap();
        let ecs = tmp.path().join("ecs");
        write_ec(&ecs.join("z/zlib"), "zlib-1.3.eb", &header("zlib", "1.3"));
        let top = write_ec(
            &ecs.join("t/toy"),
            "toy-1.0.eb",
            &format!("{}dependencies = [('zlib', '1.3')]\n", header("toy", "1.0")),
        );
        let config = Config::with_prefix(&tmp.path().join("prefix")).unwrap();

        let mut planner = BuildPlanner::new(&config, vec![ecs.clone()]);
        let targets = planner
            .load_targets(&[top.display().to_string()])
            .unwrap();
        let graph = planner
            .plan(&targets, PlanFlags { robot: true, ..Default::default() })
            .unwrap();
        let order: Vec<String> = graph
            .build_plan
            .iter()
            .map(|i| i.easyconfig.full_mod_name())
            .collect();
        assert_eq!(order, vec!["zlib/1.3", "toy/1.0"]);

        let report = dry_run_report(&graph);
        assert!(report.contains(" * [ ] "));
        assert!(report.contains("zlib-1.3.eb (module: zlib/1.3)"));
    }

    #[test]
    fn missing_dependency_is_reported_without_robot() {
        let tmp = tempfile::tempdir().unwrap();
        let top = write_ec(
            tmp.path(),
            "toy-1.0.eb",
            &format!("{}dependencies = [('zlib', '1.3')]\n", header("toy", "1.0")),
        );
        let config = Config::with_prefix(&tmp.path().join("prefix")).unwrap();
        let mut planner = BuildPlanner::new(&config, Vec::new());
        let targets = planner.load_targets(&[top.display().to_string()]).unwrap();

        let err = planner.plan(&targets, PlanFlags::default()).unwrap_err();
        assert!(err.to_string().contains("zlib/1.3"));

        let graph = planner
            .plan(&targets, PlanFlags { ignore_missing: true, ..Default::default() })
            .unwrap();
        assert!(dry_run_report(&graph).contains(" * [?] (module: zlib/1.3)"));
    }
}
