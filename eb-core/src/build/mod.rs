// eb-core/src/build/mod.rs
//! Building and installing one easyconfig: the step sequence, with the easyblock
//! supplying the configure/build/install specifics.
pub mod context;
pub mod env;
pub mod sanity;
pub mod sources;
pub mod steps;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{Local, Utc};
use eb_aio::fs as eb_fs;
use eb_common::config::Config;
use eb_common::dependency::{BuildItem, DependencyTag};
use eb_common::error::{EbError, Result};
use eb_common::receipt::{BuiltOn, InstallReceipt, RECEIPT_DIR};
use eb_common::InstalledModules;
use tracing::{debug, info, warn};

use self::context::{format_duration, BuildContext};
use self::env::{env_name_suffix, BuildEnvironment};
use self::steps::{parse_skipsteps, Step};
use crate::easyblocks::{select_easyblock, EasyBlock};
use crate::module_gen::{module_generator, ModuleSpec};
use crate::EB_VERSION;

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Extended dry run: describe every step, execute and write nothing.
    pub dry_run: bool,
    pub trace: bool,
}

#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub mod_name: String,
    pub install_dir: PathBuf,
    pub module_file: PathBuf,
    /// Build log copied into the installation; `None` for dry runs.
    pub log_file: Option<PathBuf>,
    pub duration: Duration,
}

/// Runs every step for `item`, then moves the log and easyconfig into the installation.
pub async fn build_and_install(
    item: &BuildItem,
    config: &Config,
    installed: &InstalledModules,
    options: &BuildOptions,
) -> Result<BuildOutcome> {
    let started = Instant::now();
    let easyblock = select_easyblock(&item.easyconfig)?;
    let skip = parse_skipsteps(&item.easyconfig.skipsteps())?;

    let mut ec = (*item.easyconfig).clone();
    let verstr = ec.version_string();
    let install_dir = config.software_install_dir(&ec.name, &verstr);
    let build_dir = config.build_dir(&ec.name, &verstr).join(&ec.toolchain.name);
    ec.set_template("installdir", install_dir.display().to_string());
    ec.set_template("builddir", build_dir.display().to_string());
    let parallel = ec.parallel(config.parallel);
    ec.set_template("parallel", parallel.to_string());

    let log_file = config.tmp_logdir.join(format!(
        "easybuild-{}-{}-{}.log",
        ec.name,
        ec.version,
        Local::now().format("%Y%m%d.%H%M%S")
    ));
    if !options.dry_run {
        eb_fs::create_dir_all(&config.tmp_logdir)?;
    }

    let ec_path = ec.path.clone();
    let mut ctx = BuildContext {
        config,
        ec,
        easyblock: easyblock.name(),
        dependencies: item.dependencies.clone(),
        build_dir: build_dir.clone(),
        install_dir: install_dir.clone(),
        start_dir: build_dir,
        sources: Vec::new(),
        patches: Vec::new(),
        env: BuildEnvironment::new(),
        log_file,
        parallel,
        dry_run: options.dry_run,
        trace: options.trace,
    };
    let mod_name = ctx.ec.full_mod_name();
    info!("Building {} with easyblock {}", mod_name, easyblock.name());

    if options.dry_run {
        println!(
            "*** DRY RUN using '{}' easyblock ({} @ {}) ***\n",
            easyblock.name(),
            easyblock.location(),
            ec_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<string>".to_string())
        );
    } else {
        println!(
            "== temporary log file in case of crash {}",
            ctx.log_file.display()
        );
    }
    ctx.print_msg(&format!("== building and installing {mod_name}..."));
    if options.trace && !options.dry_run {
        println!("  >> installation prefix: {}", install_dir.display());
    }

    let result = run_steps(&mut ctx, easyblock, installed, &skip).await;
    let duration = started.elapsed();

    let module_file = match result {
        Ok(module_file) => module_file,
        Err(e) => {
            if !options.dry_run {
                ctx.print_msg(&format!(
                    "== FAILED: Installation ended unsuccessfully (build directory: {}): {} (took {})",
                    ctx.build_dir.display(),
                    e,
                    format_duration(duration)
                ));
                println!(
                    "== Results of the build can be found in the log file(s) {}",
                    ctx.log_file.display()
                );
            }
            return Err(e);
        }
    };

    if options.dry_run {
        println!("(no ignored errors during dry run)");
        return Ok(BuildOutcome {
            mod_name,
            install_dir,
            module_file,
            log_file: None,
            duration,
        });
    }

    ctx.print_msg(&format!(
        "== COMPLETED: Installation ended successfully (took {})",
        format_duration(duration)
    ));
    let log_file = archive_build_files(&ctx)?;
    println!(
        "== Results of the build can be found in the log file(s) {}",
        log_file.display()
    );
    Ok(BuildOutcome {
        mod_name,
        install_dir,
        module_file,
        log_file: Some(log_file),
        duration,
    })
}

async fn run_steps(
    ctx: &mut BuildContext<'_>,
    easyblock: &dyn EasyBlock,
    installed: &InstalledModules,
    skip: &[Step],
) -> Result<PathBuf> {
    let mut module_file = ctx
        .config
        .module_file_path(&ctx.ec.name, &ctx.ec.version_string());
    for step in Step::ALL {
        if skip.contains(&step) {
            ctx.print_msg(&format!("== {} [skipped]", step.description()));
            continue;
        }
        if ctx.dry_run {
            println!("== {}... [DRY RUN]\n", step.description());
            println!("[{}_step method]", step.name());
        } else {
            ctx.print_msg(&format!("== {}...", step.description()));
        }
        debug!("Running {} step for {}", step, ctx.ec.full_mod_name());
        let result = match step {
            Step::Fetch => sources::fetch_step(ctx).await,
            Step::Ready => ready_step(ctx),
            Step::Source => easyblock.extract_step(ctx),
            Step::Patch => sources::apply_patches(ctx),
            Step::Prepare => prepare_step(ctx, installed),
            Step::Configure => easyblock.configure_step(ctx),
            Step::Build => easyblock.build_step(ctx),
            Step::Test => easyblock.test_step(ctx),
            Step::Install => install_step(ctx, easyblock),
            Step::PostProc => postproc_step(ctx),
            Step::SanityCheck => sanity::sanity_check_step(ctx, easyblock),
            Step::Cleanup => cleanup_step(ctx),
            Step::Module => module_step(ctx, easyblock).map(|path| module_file = path),
            Step::Permissions => permissions_step(ctx),
        };
        result.map_err(|e| step_error(step, e))?;
        if ctx.dry_run {
            println!();
        }
    }
    Ok(module_file)
}

fn step_error(step: Step, err: EbError) -> EbError {
    match err {
        EbError::Build { .. } => err,
        other => EbError::Build {
            step: step.name().to_string(),
            msg: other.to_string(),
        },
    }
}

/// Fresh build directory.
fn ready_step(ctx: &mut BuildContext<'_>) -> Result<()> {
    if !ctx.dry_run && ctx.build_dir.exists() {
        debug!("Removing stale build directory {}", ctx.build_dir.display());
        eb_fs::remove_directory_recursive(&ctx.build_dir)?;
    }
    ctx.mkdir(&ctx.build_dir)?;
    ctx.start_dir = ctx.build_dir.clone();
    Ok(())
}

fn prepare_step(ctx: &mut BuildContext<'_>, installed: &InstalledModules) -> Result<()> {
    ctx.env = BuildEnvironment::for_build(ctx.config, &ctx.ec, &ctx.dependencies, installed)?;
    let described = ctx.env.describe();
    if ctx.dry_run {
        ctx.dry_run_msg(&format!(
            "Defining build environment for {} toolchain",
            ctx.ec.toolchain
        ));
        println!();
        for line in &described {
            ctx.dry_run_msg(&format!("  {line}"));
        }
    } else {
        ctx.log(&format!("Build environment:\n{}", described.join("\n")));
    }
    Ok(())
}

/// Removes a previous installation, then hands over to the easyblock.
fn install_step(ctx: &mut BuildContext<'_>, easyblock: &dyn EasyBlock) -> Result<()> {
    if ctx.install_dir.exists() {
        if ctx.dry_run {
            ctx.dry_run_msg(&format!(
                "removing existing installation directory {}",
                ctx.install_dir.display()
            ));
        } else {
            ctx.log(&format!(
                "Removing existing installation directory {}",
                ctx.install_dir.display()
            ));
            eb_fs::remove_directory_recursive(&ctx.install_dir)?;
        }
    }
    ctx.mkdir(&ctx.install_dir)?;
    easyblock.install_step(ctx)
}

fn postproc_step(ctx: &mut BuildContext<'_>) -> Result<()> {
    let install_dir = ctx.install_dir.clone();
    for cmd in ctx.ec.get_str_list("postinstallcmds") {
        ctx.run_cmd(&cmd, &install_dir)?;
    }
    Ok(())
}

/// Removes the build directory and any parents left empty, up to the build path.
fn cleanup_step(ctx: &mut BuildContext<'_>) -> Result<()> {
    if ctx.dry_run {
        ctx.dry_run_msg(&format!("removing build directory {}", ctx.build_dir.display()));
        return Ok(());
    }
    eb_fs::remove_directory_recursive(&ctx.build_dir)?;
    let mut dir: Option<&Path> = ctx.build_dir.parent();
    while let Some(parent) = dir {
        if !parent.starts_with(&ctx.config.buildpath) || parent == ctx.config.buildpath {
            break;
        }
        let empty = parent
            .read_dir()
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !empty || std::fs::remove_dir(parent).is_err() {
            break;
        }
        dir = parent.parent();
    }
    Ok(())
}

/// Writes the module file, the devel module and the install receipt.
fn module_step(ctx: &mut BuildContext<'_>, easyblock: &dyn EasyBlock) -> Result<PathBuf> {
    let name = ctx.ec.name.clone();
    let verstr = ctx.ec.version_string();
    let suffix = env_name_suffix(&name);

    let runtime_loads: Vec<String> = ctx
        .dependencies
        .iter()
        .filter(|dep| dep.tags.contains(DependencyTag::RUNTIME))
        .map(|dep| dep.module_name())
        .collect();

    let mut prepend_paths = easyblock.module_prepend_paths(ctx);
    for (var, paths) in ctx.ec.modextrapaths() {
        let entry = prepend_paths.entry(var).or_default();
        for path in paths {
            if !entry.contains(&path) {
                entry.push(path);
            }
        }
    }

    let devel_module = ctx
        .install_dir
        .join(RECEIPT_DIR)
        .join(format!("{name}-{verstr}-easybuild-devel"));
    let mut set_env = vec![
        (format!("EBROOT{suffix}"), ctx.install_dir.display().to_string()),
        (format!("EBVERSION{suffix}"), ctx.ec.version.clone()),
        (format!("EBDEVEL{suffix}"), devel_module.display().to_string()),
    ];
    set_env.extend(easyblock.module_extra_env(ctx));
    set_env.extend(ctx.ec.modextravars());

    let spec = ModuleSpec {
        name: name.clone(),
        version: ctx.ec.version.clone(),
        description: ctx.ec.description(),
        homepage: ctx.ec.homepage(),
        docurls: ctx.ec.get_str_list("docurls"),
        site_contacts: ctx.ec.get_str_list("site_contacts"),
        whatis: ctx.ec.whatis(),
        install_dir: ctx.install_dir.clone(),
        conflicts: vec![name.clone()],
        loads: runtime_loads.clone(),
        prepend_paths: prepend_paths.clone(),
        set_env: set_env.clone(),
        load_message: ctx.ec.get_opt_str("modloadmsg"),
        eb_version: EB_VERSION.to_string(),
    };
    let generator = module_generator(ctx.config.module_syntax);
    let text = generator.generate(&spec);
    let module_file = ctx.config.module_file_path(&name, &verstr);

    if ctx.dry_run {
        ctx.dry_run_msg(&format!(
            "Generating module file {}, with contents:\n",
            module_file.display()
        ));
        for line in text.lines() {
            ctx.dry_run_msg(&format!("    {line}"));
        }
        return Ok(module_file);
    }

    eb_fs::atomic_write_file(&module_file, text.as_bytes())?;
    if ctx.trace {
        println!("  >> generated module file @ {}", module_file.display());
    }
    ctx.log(&format!("Module file {} written", module_file.display()));

    // The devel module also loads build dependencies.
    let devel_spec = ModuleSpec {
        loads: ctx.dependencies.iter().map(|dep| dep.module_name()).collect(),
        ..spec
    };
    eb_fs::atomic_write_file(&devel_module, generator.generate(&devel_spec).as_bytes())?;

    let receipt = InstallReceipt {
        name: name.clone(),
        version: ctx.ec.version.clone(),
        version_string: verstr,
        module_name: ctx.ec.full_mod_name(),
        install_dir: ctx.install_dir.clone(),
        toolchain: ctx.ec.toolchain.to_string(),
        easyblock: easyblock.name().to_string(),
        dependencies: runtime_loads,
        prepend_paths,
        set_env: set_env.into_iter().collect(),
        installed_at: Utc::now(),
        eb_version: EB_VERSION.to_string(),
        built_on: BuiltOn::default(),
    };
    receipt.write()?;
    Ok(module_file)
}

fn permissions_step(ctx: &mut BuildContext<'_>) -> Result<()> {
    if ctx.dry_run {
        ctx.dry_run_msg(&format!(
            "making {} readable for group and others",
            ctx.install_dir.display()
        ));
        return Ok(());
    }
    eb_fs::make_world_readable(&ctx.install_dir)?;
    Ok(())
}

/// Copies the easyconfig and the build log into `<installdir>/easybuild`, and the
/// easyconfig into the repository. Returns the final log location.
fn archive_build_files(ctx: &BuildContext<'_>) -> Result<PathBuf> {
    let eb_dir = ctx.install_dir.join(RECEIPT_DIR);
    let filename = ctx.ec.filename();
    if let Some(src) = ctx.ec.path.as_deref() {
        eb_fs::copy_file(src, &eb_dir.join(&filename))?;
        let repo_copy = ctx
            .config
            .repositorypath
            .join(&ctx.ec.name)
            .join(&filename);
        eb_fs::copy_file(src, &repo_copy)?;
        debug!("Easyconfig archived at {}", repo_copy.display());
    }

    let log_name = ctx
        .log_file
        .file_name()
        .map(|n| n.to_os_string())
        .ok_or_else(|| EbError::Generic("Build log has no file name".to_string()))?;
    let final_log = eb_dir.join(log_name);
    if ctx.log_file.is_file() {
        eb_fs::copy_file(&ctx.log_file, &final_log)?;
        if let Err(e) = std::fs::remove_file(&ctx.log_file) {
            warn!("Failed to remove temporary log {}: {}", ctx.log_file.display(), e);
        }
    }
    Ok(final_log)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use eb_common::EasyConfig;

    use super::*;

    fn toy_item(ec_dir: &Path, extra: &str) -> BuildItem {
        let path = ec_dir.join("toy-0.0.eb");
        fs::write(
            &path,
            format!(
                "easyblock = 'Binary'\nname = 'toy'\nversion = '0.0'\n\
                 homepage = 'https://example.org/toy'\ndescription = 'Toy tool'\n\
                 toolchain = SYSTEM\nsources = ['toy.sh']\n\
                 postinstallcmds = ['mkdir -p %(installdir)s/bin && mv %(installdir)s/toy.sh %(installdir)s/bin/toy && chmod +x %(installdir)s/bin/toy']\n\
                 sanity_check_paths = {{'files': ['bin/toy'], 'dirs': []}}\n\
                 sanity_check_commands = ['toy']\n{extra}"
            ),
        )
        .unwrap();
        BuildItem {
            easyconfig: Arc::new(EasyConfig::from_source(&fs::read_to_string(&path).unwrap(), Some(&path)).unwrap()),
            dependencies: Vec::new(),
            requested: true,
        }
    }

    fn setup() -> (tempfile::TempDir, Config) {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::with_prefix(&tmp.path().join("prefix")).unwrap();
        let store = config.source_store_dir("toy");
        fs::create_dir_all(&store).unwrap();
        fs::write(store.join("toy.sh"), "#!/bin/bash\necho toy\n").unwrap();
        (tmp, config)
    }

    #[tokio::test]
    async fn builds_binary_installation_with_module() {
        let (tmp, config) = setup();
        let item = toy_item(tmp.path(), "");
        let installed = InstalledModules::new(&config);

        let outcome = build_and_install(&item, &config, &installed, &BuildOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.mod_name, "toy/0.0");
        assert!(outcome.install_dir.join("bin/toy").is_file());

        let module = fs::read_to_string(&outcome.module_file).unwrap();
        assert!(module.contains("EBROOTTOY"));
        assert!(module.contains("conflict"));

        let eb_dir = outcome.install_dir.join("easybuild");
        assert!(eb_dir.join("toy-0.0.eb").is_file());
        assert!(eb_dir.join("toy-0.0-easybuild-devel").is_file());
        assert!(outcome.log_file.unwrap().is_file());
        assert!(config.repositorypath.join("toy/toy-0.0.eb").is_file());

        let receipt = InstallReceipt::read(&outcome.install_dir).unwrap();
        assert_eq!(receipt.easyblock, "Binary");
        assert_eq!(receipt.prepend_paths.get("PATH"), Some(&vec!["bin".to_string()]));
        assert!(!config.build_dir("toy", "0.0").exists());
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let (tmp, config) = setup();
        let item = toy_item(tmp.path(), "");
        let installed = InstalledModules::new(&config);
        let options = BuildOptions {
            dry_run: true,
            trace: false,
        };
        let outcome = build_and_install(&item, &config, &installed, &options).await.unwrap();
        assert!(outcome.log_file.is_none());
        assert!(!outcome.install_dir.exists());
        assert!(!outcome.module_file.exists());
        assert!(!config.buildpath.join("toy").exists());
    }

    #[tokio::test]
    async fn failing_sanity_check_fails_the_build() {
        let (tmp, config) = setup();
        let item = toy_item(tmp.path(), "skipsteps = ['postproc']\n");
        let installed = InstalledModules::new(&config);
        let err = build_and_install(&item, &config, &installed, &BuildOptions::default())
            .await
            .unwrap_err();
        match err {
            EbError::Build { step, msg } => {
                assert_eq!(step, "sanitycheck");
                assert!(msg.contains("bin/toy"));
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(!config.module_file_path("toy", "0.0").exists());
    }

    #[tokio::test]
    async fn any_listed_checksum_alternative_is_accepted() {
        let (tmp, config) = setup();
        let sha = eb_aio::checksum::compute_sha256(&config.source_store_dir("toy").join("toy.sh")).unwrap();
        let item = toy_item(
            tmp.path(),
            &format!("checksums = [['{}', '{sha}']]\n", "0".repeat(64)),
        );
        let installed = InstalledModules::new(&config);
        let outcome = build_and_install(&item, &config, &installed, &BuildOptions::default())
            .await
            .unwrap();
        assert!(outcome.install_dir.join("bin/toy").is_file());
    }

    #[tokio::test]
    async fn dynamic_templates_reach_the_module() {
        let (tmp, config) = setup();
        let item = toy_item(
            tmp.path(),
            "maxparallel = 1\nmodextravars = {'TOY_ARCH': '%(arch)s', 'TOY_JOBS': '%(parallel)s'}\n",
        );
        let installed = InstalledModules::new(&config);
        let outcome = build_and_install(&item, &config, &installed, &BuildOptions::default())
            .await
            .unwrap();
        let module = fs::read_to_string(&outcome.module_file).unwrap();
        assert!(module.contains(std::env::consts::ARCH));
        assert!(!module.contains("%(arch)s"));
        assert!(!module.contains("%(parallel)s"));
    }

    #[tokio::test]
    async fn checksum_without_matching_alternative_fails_fetch() {
        let (tmp, config) = setup();
        let item = toy_item(
            tmp.path(),
            &format!("checksums = [['{}', '{}']]\n", "0".repeat(64), "1".repeat(64)),
        );
        let installed = InstalledModules::new(&config);
        let err = build_and_install(&item, &config, &installed, &BuildOptions::default())
            .await
            .unwrap_err();
        match err {
            EbError::Build { step, msg } => {
                assert_eq!(step, "fetch");
                assert!(msg.contains("expected one of"));
            }
            other => panic!("unexpected error {other}"),
        }
    }
}
