// eb-core/src/easyblocks/generic/configuremake.rs
//! `./configure --prefix=<installdir> && make && make install`.
use eb_common::easyconfig::Value;
use eb_common::error::Result;

use super::command_line;
use crate::build::context::BuildContext;
use crate::easyblocks::EasyBlock;

pub struct ConfigureMake;

impl EasyBlock for ConfigureMake {
    fn name(&self) -> &'static str {
        "ConfigureMake"
    }

    fn location(&self) -> &'static str {
        module_path!()
    }

    fn configure_step(&self, ctx: &mut BuildContext) -> Result<()> {
        let configure_cmd = ctx.ec.get_str("configure_cmd");
        let prefix = format!("--prefix={}", ctx.install_dir.display());
        let cmd = command_line(&[
            &ctx.ec.get_str("preconfigopts"),
            &configure_cmd,
            &prefix,
            &ctx.ec.get_str("configopts"),
        ]);
        let start_dir = ctx.start_dir.clone();
        ctx.run_cmd(&cmd, &start_dir)?;
        Ok(())
    }

    fn build_step(&self, ctx: &mut BuildContext) -> Result<()> {
        run_make(ctx)
    }

    fn test_step(&self, ctx: &mut BuildContext) -> Result<()> {
        run_make_test(ctx)
    }

    fn install_step(&self, ctx: &mut BuildContext) -> Result<()> {
        run_make_install(ctx)
    }
}

/// `<prebuildopts> make -j <parallel> <buildopts>` in the start directory.
pub(crate) fn run_make(ctx: &mut BuildContext) -> Result<()> {
    let jobs = format!("-j {}", ctx.parallel);
    let cmd = command_line(&[
        &ctx.ec.get_str("prebuildopts"),
        "make",
        &jobs,
        &ctx.ec.get_str("buildopts"),
    ]);
    let start_dir = ctx.start_dir.clone();
    ctx.run_cmd(&cmd, &start_dir)?;
    Ok(())
}

/// `make <runtest>`; `runtest = True` means `make check`.
pub(crate) fn run_make_test(ctx: &mut BuildContext) -> Result<()> {
    let target = match ctx.ec.get("runtest") {
        Value::Bool(true) => "check".to_string(),
        Value::Str(target) if !target.is_empty() => target,
        _ => return Ok(()),
    };
    let cmd = format!("make {target}");
    let start_dir = ctx.start_dir.clone();
    ctx.run_cmd(&cmd, &start_dir)?;
    Ok(())
}

/// `<preinstallopts> <install_cmd> <installopts>`, `install_cmd` defaulting to `make install`.
pub(crate) fn run_make_install(ctx: &mut BuildContext) -> Result<()> {
    let install_cmd = ctx
        .ec
        .get_opt_str("install_cmd")
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "make install".to_string());
    let cmd = command_line(&[
        &ctx.ec.get_str("preinstallopts"),
        &install_cmd,
        &ctx.ec.get_str("installopts"),
    ]);
    let start_dir = ctx.start_dir.clone();
    ctx.run_cmd(&cmd, &start_dir)?;
    Ok(())
}
