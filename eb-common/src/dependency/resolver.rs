// eb-common/src/dependency/resolver.rs
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::config::Config;
use crate::dependency::{Dependency, DependencyTag};
use crate::easyconfig::EasyConfig;
use crate::error::{EbError, Result};
use crate::installed::InstalledModules;
use crate::repository::EasyConfigRepository;
use crate::toolchain::{get_toolchain, ToolchainSpec, SYSTEM_TOOLCHAIN_NAME};

pub struct ResolutionContext<'a> {
    pub config: &'a Config,
    pub repository: &'a EasyConfigRepository,
    pub installed: &'a InstalledModules,
    /// Search the robot path for easyconfigs of missing dependencies and build them.
    pub robot: bool,
    /// Rebuild the requested easyconfigs even when their module already exists.
    pub rebuild_targets: bool,
    /// Report missing dependencies instead of failing (dry runs).
    pub ignore_missing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStatus {
    Installed,
    Missing,
    Requested,
}

#[derive(Debug, Clone)]
pub struct ResolvedEasyConfig {
    pub mod_name: String,
    /// `None` for modules that were already installed and never needed their easyconfig.
    pub easyconfig: Option<Arc<EasyConfig>>,
    pub status: ResolutionStatus,
    pub accumulated_tags: DependencyTag,
    /// Dependencies with their toolchain settled, minus filtered ones.
    pub dependencies: Vec<Dependency>,
}

/// One easyconfig to build, with the dependencies its environment and module must load.
#[derive(Debug, Clone)]
pub struct BuildItem {
    pub easyconfig: Arc<EasyConfig>,
    pub dependencies: Vec<Dependency>,
    pub requested: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    /// Dependencies before their dependents.
    pub build_plan: Vec<BuildItem>,
    pub resolution_details: BTreeMap<String, ResolvedEasyConfig>,
    pub filtered: BTreeSet<String>,
    /// Only populated when `ignore_missing` is set.
    pub missing: Vec<String>,
}

enum DepResolution {
    /// Module exists, or is already part of the plan.
    Available(Dependency),
    EasyConfig(Dependency, Arc<EasyConfig>),
    Missing(Dependency),
}

pub struct DependencyResolver<'a> {
    context: ResolutionContext<'a>,
    visiting: HashSet<String>,
    resolution_details: BTreeMap<String, ResolvedEasyConfig>,
    discovery_order: Vec<String>,
    hierarchy_cache: HashMap<ToolchainSpec, Vec<ToolchainSpec>>,
    filtered: BTreeSet<String>,
    missing: Vec<String>,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(context: ResolutionContext<'a>) -> Self {
        Self {
            context,
            visiting: HashSet::new(),
            resolution_details: BTreeMap::new(),
            discovery_order: Vec::new(),
            hierarchy_cache: HashMap::new(),
            filtered: BTreeSet::new(),
            missing: Vec::new(),
        }
    }

    pub fn resolve_targets(&mut self, targets: &[Arc<EasyConfig>]) -> Result<ResolvedGraph> {
        debug!(
            "Starting dependency resolution for targets: {:?}",
            targets.iter().map(|ec| ec.full_mod_name()).collect::<Vec<_>>()
        );
        self.visiting.clear();
        self.resolution_details.clear();
        self.discovery_order.clear();
        self.filtered.clear();
        self.missing.clear();

        for ec in targets {
            self.resolve_recursive(Arc::clone(ec), DependencyTag::RUNTIME, true)?;
        }

        let mut missing = std::mem::take(&mut self.missing);
        missing.sort();
        missing.dedup();
        if !missing.is_empty() {
            if self.context.ignore_missing {
                warn!("Missing dependencies: {}", missing.join(", "));
            } else {
                error!("Missing dependencies: {}", missing.join(", "));
                return Err(EbError::MissingDependencies(missing));
            }
        }

        let build_plan = self.topological_sort()?;
        debug!(
            "Build plan: {:?}",
            build_plan
                .iter()
                .map(|item| item.easyconfig.full_mod_name())
                .collect::<Vec<_>>()
        );
        Ok(ResolvedGraph {
            build_plan,
            resolution_details: self.resolution_details.clone(),
            filtered: self.filtered.clone(),
            missing,
        })
    }

    fn resolve_recursive(
        &mut self,
        ec: Arc<EasyConfig>,
        tags_from_parent_edge: DependencyTag,
        is_initial_target: bool,
    ) -> Result<()> {
        let mod_name = ec.full_mod_name();
        debug!(
            "Resolving: {} (requested as {:?}, is_target: {})",
            mod_name, tags_from_parent_edge, is_initial_target
        );

        if self.visiting.contains(&mod_name) {
            error!("Dependency cycle detected involving: {}", mod_name);
            return Err(EbError::DependencyError(format!(
                "Dependency cycle detected involving '{mod_name}'"
            )));
        }

        if let Some(existing) = self.resolution_details.get_mut(&mod_name) {
            existing.accumulated_tags |= tags_from_parent_edge;
            if is_initial_target && existing.status == ResolutionStatus::Missing {
                existing.status = ResolutionStatus::Requested;
            }
            if existing.easyconfig.is_some() {
                debug!("'{}' already resolved", mod_name);
                return Ok(());
            }
            // Known only as an installed module so far; a rebuild needs its dependencies.
            if existing.status == ResolutionStatus::Installed {
                return Ok(());
            }
        }

        for deprecation in ec.deprecations() {
            self.context
                .config
                .log_deprecated(&deprecation.msg, &deprecation.removal_version)?;
        }

        let installed = self.context.installed.is_installed(&mod_name);
        let status = if installed && !(is_initial_target && self.context.rebuild_targets) {
            ResolutionStatus::Installed
        } else if is_initial_target {
            ResolutionStatus::Requested
        } else {
            ResolutionStatus::Missing
        };
        debug!("Initial status for '{}': {:?}", mod_name, status);
        if !self.resolution_details.contains_key(&mod_name) {
            self.discovery_order.push(mod_name.clone());
        }
        self.resolution_details.insert(
            mod_name.clone(),
            ResolvedEasyConfig {
                mod_name: mod_name.clone(),
                easyconfig: Some(Arc::clone(&ec)),
                status,
                accumulated_tags: tags_from_parent_edge,
                dependencies: Vec::new(),
            },
        );
        if status == ResolutionStatus::Installed {
            return Ok(());
        }

        self.visiting.insert(mod_name.clone());
        let mut resolved_deps = Vec::new();
        for dep in ec.all_dependencies()? {
            if self.is_filtered(&dep) {
                debug!("Dependency '{}' of '{}' is filtered", dep.name, mod_name);
                self.filtered.insert(dep.module_name());
                continue;
            }
            match self.resolve_dependency(&dep)? {
                DepResolution::Available(resolved) => {
                    let child = resolved.module_name();
                    match self.resolution_details.get_mut(&child) {
                        Some(node) => node.accumulated_tags |= resolved.tags,
                        None => {
                            self.discovery_order.push(child.clone());
                            self.resolution_details.insert(
                                child.clone(),
                                ResolvedEasyConfig {
                                    mod_name: child,
                                    easyconfig: None,
                                    status: ResolutionStatus::Installed,
                                    accumulated_tags: resolved.tags,
                                    dependencies: Vec::new(),
                                },
                            );
                        }
                    }
                    resolved_deps.push(resolved);
                }
                DepResolution::EasyConfig(resolved, child_ec) => {
                    self.resolve_recursive(child_ec, resolved.tags, false)?;
                    resolved_deps.push(resolved);
                }
                DepResolution::Missing(resolved) => {
                    let child = resolved.module_name();
                    if self.context.robot {
                        self.visiting.remove(&mod_name);
                        return Err(EbError::NotFound(format!(
                            "Irresolvable dependencies encountered: {child} (no easyconfig file or existing module found)"
                        )));
                    }
                    debug!("Dependency '{}' of '{}' is missing", child, mod_name);
                    self.missing.push(child);
                    resolved_deps.push(resolved);
                }
            }
        }
        self.visiting.remove(&mod_name);
        if let Some(node) = self.resolution_details.get_mut(&mod_name) {
            node.dependencies = resolved_deps;
        }
        debug!("Finished resolving '{}'", mod_name);
        Ok(())
    }

    fn resolve_dependency(&mut self, dep: &Dependency) -> Result<DepResolution> {
        let candidates: Vec<Dependency> = if dep.toolchain_inherited {
            self.toolchain_hierarchy(&dep.toolchain)?
                .into_iter()
                .map(|tc| dep.with_toolchain(tc))
                .collect()
        } else {
            vec![dep.clone()]
        };

        for candidate in &candidates {
            let mod_name = candidate.module_name();
            let planned = self
                .resolution_details
                .get(&mod_name)
                .is_some_and(|n| n.easyconfig.is_some() || n.status == ResolutionStatus::Installed);
            if planned || self.context.installed.is_installed(&mod_name) {
                debug!("Dependency {} satisfied by {}", dep, mod_name);
                return Ok(DepResolution::Available(candidate.clone()));
            }
        }

        if self.context.robot {
            for candidate in &candidates {
                if let Some(ec) = self
                    .context
                    .repository
                    .load_by_name(&candidate.name, &candidate.easyconfig_filename())?
                {
                    debug!(
                        "Dependency {} resolved to easyconfig {}",
                        dep,
                        candidate.easyconfig_filename()
                    );
                    return Ok(DepResolution::EasyConfig(candidate.clone(), ec));
                }
            }
        }
        Ok(DepResolution::Missing(dep.clone()))
    }

    /// `toolchain` followed by its sub-toolchains, down to the system toolchain.
    pub fn toolchain_hierarchy(&mut self, toolchain: &ToolchainSpec) -> Result<Vec<ToolchainSpec>> {
        if let Some(cached) = self.hierarchy_cache.get(toolchain) {
            return Ok(cached.clone());
        }
        let mut chain = vec![toolchain.clone()];
        let mut current = toolchain.clone();
        while let Some(sub) = get_toolchain(&current.name).and_then(|def| def.subtoolchain) {
            if sub == SYSTEM_TOOLCHAIN_NAME {
                break;
            }
            match self.subtoolchain_version(&current, sub)? {
                Some(version) => {
                    current = ToolchainSpec::new(sub, version);
                    chain.push(current.clone());
                }
                None => {
                    warn!(
                        "Can't determine version of sub-toolchain {} of {}",
                        sub, current
                    );
                    break;
                }
            }
        }
        if !toolchain.is_system() {
            chain.push(ToolchainSpec::system());
        }
        debug!("Toolchain hierarchy for {}: {:?}", toolchain, chain);
        self.hierarchy_cache.insert(toolchain.clone(), chain.clone());
        Ok(chain)
    }

    fn subtoolchain_version(&self, current: &ToolchainSpec, sub: &str) -> Result<Option<String>> {
        let filename = format!("{}-{}.eb", current.name, current.version);
        if let Some(tc_ec) = self
            .context
            .repository
            .load_by_name(&current.name, &filename)?
        {
            for dep in tc_ec.all_dependencies()? {
                if dep.name == sub {
                    return Ok(Some(dep.version));
                }
                if dep.toolchain.name == sub {
                    return Ok(Some(dep.toolchain.version));
                }
            }
        }
        // Toolchains of one generation often share their version (foss/2023a, gompi/2023a).
        let same = ToolchainSpec::new(sub, current.version.clone());
        let known = same
            .module_name()
            .is_some_and(|m| self.context.installed.is_installed(&m))
            || self
                .context
                .repository
                .find(sub, &format!("{}-{}.eb", sub, current.version))
                .is_some();
        Ok(known.then(|| current.version.clone()))
    }

    fn is_filtered(&self, dep: &Dependency) -> bool {
        self.context.config.filter_deps.iter().any(|spec| {
            match spec.split_once('=') {
                Some((name, version)) => name == dep.name && version == dep.version,
                None => spec == &dep.name,
            }
        })
    }

    fn topological_sort(&self) -> Result<Vec<BuildItem>> {
        let plan_nodes: Vec<&ResolvedEasyConfig> = self
            .discovery_order
            .iter()
            .filter_map(|name| self.resolution_details.get(name))
            .filter(|node| node.status != ResolutionStatus::Installed)
            .collect();
        let in_plan: HashSet<&str> = plan_nodes.iter().map(|n| n.mod_name.as_str()).collect();

        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for node in &plan_nodes {
            in_degree.entry(node.mod_name.as_str()).or_default();
            let mut seen = HashSet::new();
            for dep in &node.dependencies {
                let Some(child) = in_plan.get(dep.module_name().as_str()).copied() else {
                    continue;
                };
                if seen.insert(child) {
                    *in_degree.entry(node.mod_name.as_str()).or_default() += 1;
                    dependents
                        .entry(child)
                        .or_default()
                        .push(node.mod_name.as_str());
                }
            }
        }

        let mut queue: VecDeque<&str> = plan_nodes
            .iter()
            .map(|n| n.mod_name.as_str())
            .filter(|name| in_degree.get(name).copied().unwrap_or(0) == 0)
            .collect();
        let mut sorted = Vec::with_capacity(plan_nodes.len());
        while let Some(name) = queue.pop_front() {
            sorted.push(name);
            if let Some(parents) = dependents.get(name) {
                for parent in parents {
                    if let Some(degree) = in_degree.get_mut(parent) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(parent);
                        }
                    }
                }
            }
        }

        if sorted.len() != plan_nodes.len() {
            error!(
                "Cycle detected! Sorted count ({}) != plan node count ({}).",
                sorted.len(),
                plan_nodes.len()
            );
            return Err(EbError::DependencyError(
                "Circular dependency detected".to_string(),
            ));
        }

        let mut plan = Vec::with_capacity(sorted.len());
        for name in sorted {
            let node = &self.resolution_details[name];
            let Some(ec) = &node.easyconfig else {
                continue;
            };
            plan.push(BuildItem {
                easyconfig: Arc::clone(ec),
                dependencies: node.dependencies.clone(),
                requested: node.status == ResolutionStatus::Requested,
            });
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;
    use crate::config::Config;

    fn write_ec(root: &Path, name: &str, version: &str, toolchain: &str, deps: &str) -> Arc<EasyConfig> {
        let tc = if toolchain == "system" {
            "SYSTEM".to_string()
        } else {
            let (n, v) = toolchain.split_once('/').unwrap();
            format!("{{'name': '{n}', 'version': '{v}'}}")
        };
        let src = format!(
            "name = '{name}'\nversion = '{version}'\nhomepage = 'h'\ndescription = 'd'\ntoolchain = {tc}\ndependencies = [{deps}]\n"
        );
        let ec: EasyConfig = src.parse().unwrap();
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(ec.filename()), &src).unwrap();
        Arc::new(ec)
    }

    struct Fixture {
        _tmp: tempfile::TempDir,
        config: Config,
        repository: EasyConfigRepository,
        installed: InstalledModules,
        robot_root: std::path::PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::with_prefix(&tmp.path().join("prefix")).unwrap();
        let robot_root = tmp.path().join("easyconfigs");
        fs::create_dir_all(&robot_root).unwrap();
        let repository = EasyConfigRepository::with_paths(vec![robot_root.clone()]);
        let installed = InstalledModules::with_paths(vec![config.modules_dir()], config.software_dir());
        Fixture {
            _tmp: tmp,
            config,
            repository,
            installed,
            robot_root,
        }
    }

    fn resolve(f: &Fixture, targets: &[Arc<EasyConfig>], robot: bool) -> Result<ResolvedGraph> {
        let mut resolver = DependencyResolver::new(ResolutionContext {
            config: &f.config,
            repository: &f.repository,
            installed: &f.installed,
            robot,
            rebuild_targets: false,
            ignore_missing: false,
        });
        resolver.resolve_targets(targets)
    }

    fn plan_names(graph: &ResolvedGraph) -> Vec<String> {
        graph
            .build_plan
            .iter()
            .map(|i| i.easyconfig.full_mod_name())
            .collect()
    }

    fn install_module(f: &Fixture, mod_name: &str) {
        let path = f.config.modules_dir().join(mod_name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "#%Module").unwrap();
    }

    #[test]
    fn dependencies_come_first() {
        let f = fixture();
        write_ec(&f.robot_root, "zlib", "1.2.13", "system", "");
        write_ec(&f.robot_root, "libpng", "1.6.39", "system", "('zlib', '1.2.13')");
        let app = write_ec(
            &f.robot_root,
            "app",
            "1.0",
            "system",
            "('libpng', '1.6.39'), ('zlib', '1.2.13')",
        );
        let graph = resolve(&f, &[app], true).unwrap();
        assert_eq!(plan_names(&graph), vec!["zlib/1.2.13", "libpng/1.6.39", "app/1.0"]);
        assert!(graph.build_plan[2].requested);
        assert!(!graph.build_plan[0].requested);
    }

    #[test]
    fn installed_modules_are_skipped() {
        let f = fixture();
        write_ec(&f.robot_root, "zlib", "1.2.13", "system", "");
        let app = write_ec(&f.robot_root, "app", "1.0", "system", "('zlib', '1.2.13')");
        install_module(&f, "zlib/1.2.13");
        let graph = resolve(&f, &[Arc::clone(&app)], true).unwrap();
        assert_eq!(plan_names(&graph), vec!["app/1.0"]);

        install_module(&f, "app/1.0");
        let graph = resolve(&f, &[app], true).unwrap();
        assert!(graph.build_plan.is_empty());
    }

    #[test]
    fn missing_dependency_without_robot_is_an_error() {
        let f = fixture();
        write_ec(&f.robot_root, "zlib", "1.2.13", "system", "");
        let app = write_ec(&f.robot_root, "app", "1.0", "system", "('zlib', '1.2.13')");
        let err = resolve(&f, &[app], false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing modules for dependencies (use --robot?): zlib/1.2.13"
        );
    }

    #[test]
    fn unresolvable_dependency_with_robot_is_an_error() {
        let f = fixture();
        let app = write_ec(&f.robot_root, "app", "1.0", "system", "('zlib', '9.9')");
        let err = resolve(&f, &[app], true).unwrap_err();
        assert!(err.to_string().contains("Irresolvable dependencies encountered: zlib/9.9"));
    }

    #[test]
    fn cycles_are_reported() {
        let f = fixture();
        write_ec(&f.robot_root, "a", "1", "system", "('b', '1')");
        let b = write_ec(&f.robot_root, "b", "1", "system", "('a', '1')");
        let err = resolve(&f, &[b], true).unwrap_err();
        assert!(matches!(err, EbError::DependencyError(_)));
    }

    #[test]
    fn filtered_dependencies_are_neither_built_nor_loaded() {
        let mut f = fixture();
        f.config.filter_deps = vec!["zlib".to_string()];
        let app = write_ec(&f.robot_root, "app", "1.0", "system", "('zlib', '1.2.13')");
        let graph = resolve(&f, &[app], true).unwrap();
        assert_eq!(plan_names(&graph), vec!["app/1.0"]);
        assert!(graph.build_plan[0].dependencies.is_empty());
        assert!(graph.filtered.contains("zlib/1.2.13"));
    }

    #[test]
    fn inherited_toolchain_falls_back_to_subtoolchain() {
        let f = fixture();
        write_ec(&f.robot_root, "GCCcore", "12.3.0", "system", "");
        write_ec(&f.robot_root, "GCC", "12.3.0", "system", "('GCCcore', '12.3.0')");
        write_ec(&f.robot_root, "zlib", "1.2.13", "GCCcore/12.3.0", "");
        let app = write_ec(&f.robot_root, "app", "1.0", "GCC/12.3.0", "('zlib', '1.2.13')");
        let graph = resolve(&f, &[app], true).unwrap();
        assert_eq!(
            plan_names(&graph),
            vec![
                "GCCcore/12.3.0",
                "GCC/12.3.0",
                "zlib/1.2.13-GCCcore-12.3.0",
                "app/1.0-GCC-12.3.0"
            ]
        );
        let app_deps: Vec<String> = graph.build_plan[3]
            .dependencies
            .iter()
            .map(Dependency::module_name)
            .collect();
        assert_eq!(app_deps, vec!["GCC/12.3.0", "zlib/1.2.13-GCCcore-12.3.0"]);
    }
}
