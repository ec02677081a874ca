// eb-core/src/easyblocks/generic/cmakemake.rs
use eb_common::error::Result;

use super::command_line;
use super::configuremake::{run_make, run_make_install, run_make_test};
use crate::build::context::BuildContext;
use crate::easyblocks::EasyBlock;

/// Out-of-source build directory, below the build directory.
const OBJ_DIR: &str = "easybuild_obj";

/// `cmake` configure, then the `ConfigureMake` build and install steps.
pub struct CMakeMake;

impl EasyBlock for CMakeMake {
    fn name(&self) -> &'static str {
        "CMakeMake"
    }

    fn parent(&self) -> &'static str {
        "ConfigureMake"
    }

    fn location(&self) -> &'static str {
        module_path!()
    }

    fn configure_step(&self, ctx: &mut BuildContext) -> Result<()> {
        let source_dir = ctx.start_dir.clone();
        let obj_dir = ctx.build_dir.join(OBJ_DIR);
        ctx.mkdir(&obj_dir)?;

        let mut defines = vec![
            format!("-DCMAKE_INSTALL_PREFIX={}", ctx.install_dir.display()),
            "-DCMAKE_BUILD_TYPE=Release".to_string(),
        ];
        for (var, define) in [
            ("CC", "CMAKE_C_COMPILER"),
            ("CXX", "CMAKE_CXX_COMPILER"),
            ("FC", "CMAKE_Fortran_COMPILER"),
        ] {
            if let Some(compiler) = ctx.env.vars().get(var) {
                defines.push(format!("-D{define}='{compiler}'"));
            }
        }
        if !ctx.ec.get_bool("with_shared_libs") {
            defines.push("-DBUILD_SHARED_LIBS=OFF".to_string());
        }

        let source = source_dir.display().to_string();
        let defines = defines.join(" ");
        let cmd = command_line(&[
            &ctx.ec.get_str("preconfigopts"),
            "cmake",
            &source,
            &defines,
            &ctx.ec.get_str("configopts"),
        ]);
        ctx.run_cmd(&cmd, &obj_dir)?;
        ctx.start_dir = obj_dir;
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
