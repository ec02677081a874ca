// eb-core/src/easyblocks/bzip2.rs
//! bzip2 ships plain Makefiles: no configure, the install prefix goes on the
//! `make install` command line and shared libraries come from a separate Makefile.
use std::fs;
use std::path::Path;

use eb_common::easyconfig::SanityCheckPaths;
use eb_common::error::Result;
use tracing::debug;

use super::generic::command_line;
use super::EasyBlock;
use crate::build::context::BuildContext;

const SHLIB_EXT: &str = "so";

const BINARIES: &[&str] = &[
    "bunzip2", "bzcat", "bzdiff", "bzgrep", "bzip2", "bzip2recover", "bzmore",
];

pub struct Bzip2;

impl Bzip2 {
    /// `CC`/`CFLAGS` from the build environment, as make variable overrides.
    fn compiler_opts(ctx: &BuildContext) -> String {
        let mut opts = Vec::new();
        if let Some(cc) = ctx.env.vars().get("CC") {
            opts.push(format!("CC=\"{cc}\""));
        }
        if let Some(cflags) = ctx.env.vars().get("CFLAGS") {
            opts.push(format!("CFLAGS=\"-Wall -Winline {cflags} -g \\$(BIGFILES)\""));
        }
        opts.join(" ")
    }

    fn shared_libs(start_dir: &Path) -> Vec<String> {
        let prefix = format!("libbz2.{SHLIB_EXT}");
        let mut libs: Vec<String> = fs::read_dir(start_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| e.file_name().into_string().ok())
                    .filter(|name| name.starts_with(&prefix))
                    .collect()
            })
            .unwrap_or_default();
        libs.sort();
        libs
    }
}

impl EasyBlock for Bzip2 {
    fn name(&self) -> &'static str {
        "EB_bzip2"
    }

    fn parent(&self) -> &'static str {
        "ConfigureMake"
    }

    fn location(&self) -> &'static str {
        module_path!()
    }

    fn build_step(&self, ctx: &mut BuildContext) -> Result<()> {
        let start_dir = ctx.start_dir.clone();
        let prebuildopts = ctx.ec.get_str("prebuildopts");
        let buildopts = command_line(&[&Self::compiler_opts(ctx), &ctx.ec.get_str("buildopts")]);

        if ctx.ec.get_bool("with_shared_libs") {
            let cmd = command_line(&[&prebuildopts, "make -f Makefile-libbz2_so", &buildopts]);
            ctx.run_cmd(&cmd, &start_dir)?;
        }
        let jobs = format!("-j {}", ctx.parallel);
        let cmd = command_line(&[&prebuildopts, "make", &jobs, &buildopts]);
        ctx.run_cmd(&cmd, &start_dir)?;
        Ok(())
    }

    fn install_step(&self, ctx: &mut BuildContext) -> Result<()> {
        let start_dir = ctx.start_dir.clone();
        let prefix = format!("PREFIX={}", ctx.install_dir.display());
        let cmd = command_line(&[
            &ctx.ec.get_str("preinstallopts"),
            "make install",
            &prefix,
            &ctx.ec.get_str("installopts"),
        ]);
        ctx.run_cmd(&cmd, &start_dir)?;

        if !ctx.ec.get_bool("with_shared_libs") {
            return Ok(());
        }
        let lib_dir = ctx.install_dir.join("lib");
        ctx.mkdir(&lib_dir)?;
        if ctx.dry_run {
            ctx.dry_run_msg(&format!(
                "copying libbz2.{SHLIB_EXT}* from {} to {}",
                start_dir.display(),
                lib_dir.display()
            ));
        } else {
            for lib in Self::shared_libs(&start_dir) {
                debug!("Installing shared library {}", lib);
                ctx.copy(&start_dir.join(&lib), &lib_dir.join(&lib))?;
            }
        }
        let versioned = format!("libbz2.{SHLIB_EXT}.{}", ctx.ec.version);
        for link in [format!("libbz2.{SHLIB_EXT}"), format!("libbz2.{SHLIB_EXT}.1")] {
            ctx.symlink(Path::new(&versioned), &lib_dir.join(link))?;
        }
        Ok(())
    }

    fn sanity_check_defaults(&self, ctx: &BuildContext) -> SanityCheckPaths {
        let mut files: Vec<Vec<String>> = BINARIES
            .iter()
            .map(|bin| vec![format!("bin/{bin}")])
            .collect();
        files.push(vec!["include/bzlib.h".to_string()]);
        files.push(vec!["lib/libbz2.a".to_string()]);
        if ctx.ec.get_bool("with_shared_libs") {
            files.push(vec![format!("lib/libbz2.{SHLIB_EXT}")]);
        }
        SanityCheckPaths {
            files,
            dirs: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_shared_libraries() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["libbz2.so.1.0.8", "libbz2.so.1.0", "libbz2.a", "bzip2.c"] {
            fs::write(tmp.path().join(name), "").unwrap();
        }
        assert_eq!(
            Bzip2::shared_libs(tmp.path()),
            vec!["libbz2.so.1.0".to_string(), "libbz2.so.1.0.8".to_string()]
        );
    }
}
