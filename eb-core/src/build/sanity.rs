// eb-core/src/build/sanity.rs
use std::path::Path;

use eb_common::easyconfig::SanityCheckPaths;
use eb_common::error::{EbError, Result};
use tracing::debug;

use super::context::BuildContext;
use crate::easyblocks::EasyBlock;

/// Failures for `paths` below `install_dir`: every `files` entry needs one existing
/// file among its alternatives, every `dirs` entry one non-empty directory.
pub fn check_paths(install_dir: &Path, paths: &SanityCheckPaths) -> Vec<String> {
    let mut failures = Vec::new();
    for alternatives in &paths.files {
        let found = alternatives
            .iter()
            .any(|rel| install_dir.join(rel).is_file());
        if !found {
            failures.push(format!(
                "no file found at {} in {}",
                describe(alternatives),
                install_dir.display()
            ));
        }
    }
    for alternatives in &paths.dirs {
        let found = alternatives.iter().any(|rel| {
            install_dir
                .join(rel)
                .read_dir()
                .map(|mut entries| entries.next().is_some())
                .unwrap_or(false)
        });
        if !found {
            failures.push(format!(
                "no (non-empty) directory found at {} in {}",
                describe(alternatives),
                install_dir.display()
            ));
        }
    }
    failures
}

fn describe(alternatives: &[String]) -> String {
    if alternatives.len() == 1 {
        alternatives[0].clone()
    } else {
        format!("one of ({})", alternatives.join(", "))
    }
}

/// Checks the installation: paths from the easyconfig (or the easyblock defaults),
/// then `sanity_check_commands` with the environment of the new module.
pub fn sanity_check_step(ctx: &mut BuildContext<'_>, easyblock: &dyn EasyBlock) -> Result<()> {
    let paths = match ctx.ec.sanity_check_paths()? {
        Some(paths) => paths,
        None => easyblock.sanity_check_defaults(ctx),
    };
    let commands = ctx.ec.sanity_check_commands();

    if ctx.dry_run {
        ctx.dry_run_msg("Sanity check paths - file ['files']");
        for alternatives in &paths.files {
            ctx.dry_run_msg(&format!("  * {}", describe(alternatives)));
        }
        ctx.dry_run_msg("Sanity check paths - (non-empty) directory ['dirs']");
        for alternatives in &paths.dirs {
            ctx.dry_run_msg(&format!("  * {}", describe(alternatives)));
        }
        if !commands.is_empty() {
            ctx.dry_run_msg("Sanity check commands");
            for cmd in &commands {
                ctx.dry_run_msg(&format!("  * {cmd}"));
            }
        }
        return Ok(());
    }

    let mut failures = check_paths(&ctx.install_dir, &paths);
    for failure in &failures {
        ctx.log(&format!("Sanity check: {failure}"));
    }

    if !commands.is_empty() {
        let mut module_env = ctx.env.clone();
        let install_dir = ctx.install_dir.clone();
        module_env.apply_install_dir(&install_dir, &ctx.ec.name, &ctx.ec.version);
        let build_env = std::mem::replace(&mut ctx.env, module_env);
        let result = run_commands(ctx, &commands, &install_dir);
        ctx.env = build_env;
        failures.extend(result?);
    }

    if failures.is_empty() {
        debug!("Sanity check for {} passed", ctx.ec.full_mod_name());
        Ok(())
    } else {
        Err(EbError::SanityCheck(failures.join(", ")))
    }
}

fn run_commands(ctx: &BuildContext<'_>, commands: &[String], cwd: &Path) -> Result<Vec<String>> {
    let mut failures = Vec::new();
    for cmd in commands {
        if let Some(out) = ctx.run_cmd_allow_failure(cmd, cwd)? {
            if !out.success() {
                failures.push(format!(
                    "sanity check command {cmd} exited with code {} (output: {})",
                    out.exit_code,
                    out.output.trim()
                ));
            }
        }
    }
    Ok(failures)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn paths_with_alternatives() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::write(root.join("bin/bzip2"), "").unwrap();
        fs::create_dir_all(root.join("lib64")).unwrap();
        fs::write(root.join("lib64/libbz2.a"), "").unwrap();
        fs::create_dir_all(root.join("share")).unwrap();

        let ok = SanityCheckPaths {
            files: vec![vec!["bin/bzip2".into()], vec!["lib/libbz2.a".into(), "lib64/libbz2.a".into()]],
            dirs: vec![vec!["bin".into()], vec!["lib".into(), "lib64".into()]],
        };
        assert!(check_paths(root, &ok).is_empty());

        let bad = SanityCheckPaths {
            files: vec![vec!["bin/bunzip2".into()]],
            dirs: vec![vec!["share".into()]],
        };
        let failures = check_paths(root, &bad);
        assert_eq!(failures.len(), 2);
        assert!(failures[0].starts_with("no file found at bin/bunzip2"));
        assert!(failures[1].starts_with("no (non-empty) directory found at share"));
    }
}
