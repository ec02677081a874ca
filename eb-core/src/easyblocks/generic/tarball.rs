// eb-core/src/easyblocks/generic/tarball.rs
use eb_common::easyconfig::SanityCheckPaths;
use eb_common::error::Result;

use crate::build::context::BuildContext;
use crate::easyblocks::EasyBlock;

/// Installs the unpacked sources as they are.
pub struct Tarball;

impl EasyBlock for Tarball {
    fn name(&self) -> &'static str {
        "Tarball"
    }

    fn location(&self) -> &'static str {
        module_path!()
    }

    fn install_step(&self, ctx: &mut BuildContext) -> Result<()> {
        let start_dir = ctx.start_dir.clone();
        let install_dir = ctx.install_dir.clone();
        ctx.copy(&start_dir, &install_dir)
    }

    fn sanity_check_defaults(&self, _ctx: &BuildContext) -> SanityCheckPaths {
        SanityCheckPaths {
            files: Vec::new(),
            dirs: vec![vec![String::new()]],
        }
    }
}
