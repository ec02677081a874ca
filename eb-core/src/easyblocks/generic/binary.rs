// eb-core/src/easyblocks/generic/binary.rs
use eb_common::easyconfig::SanityCheckPaths;
use eb_common::error::{EbError, Result};

use crate::build::context::BuildContext;
use crate::easyblocks::EasyBlock;

/// Sources are installed without unpacking: copied as-is, or handed to `install_cmd`.
pub struct Binary;

impl EasyBlock for Binary {
    fn name(&self) -> &'static str {
        "Binary"
    }

    fn location(&self) -> &'static str {
        module_path!()
    }

    fn extract_step(&self, ctx: &mut BuildContext) -> Result<()> {
        for src in ctx.sources.clone() {
            let file_name = src
                .file_name()
                .ok_or_else(|| EbError::Generic(format!("Invalid source path {}", src.display())))?;
            let dest = ctx.build_dir.join(file_name);
            ctx.copy(&src, &dest)?;
        }
        ctx.start_dir = ctx.build_dir.clone();
        Ok(())
    }

    fn install_step(&self, ctx: &mut BuildContext) -> Result<()> {
        if let Some(install_cmd) = ctx.ec.get_opt_str("install_cmd").filter(|c| !c.is_empty()) {
            let build_dir = ctx.build_dir.clone();
            ctx.run_cmd(&install_cmd, &build_dir)?;
            return Ok(());
        }
        for src in ctx.sources.clone() {
            let Some(file_name) = src.file_name() else {
                continue;
            };
            let staged = ctx.build_dir.join(file_name);
            let dest = ctx.install_dir.join(file_name);
            ctx.copy(&staged, &dest)?;
        }
        Ok(())
    }

    fn sanity_check_defaults(&self, _ctx: &BuildContext) -> SanityCheckPaths {
        SanityCheckPaths {
            files: Vec::new(),
            dirs: vec![vec![String::new()]],
        }
    }
}
