// eb-core/src/easyblocks/generic/bundle.rs
use eb_common::easyconfig::SanityCheckPaths;
use eb_common::error::Result;

use crate::build::context::BuildContext;
use crate::easyblocks::EasyBlock;

/// A module that only loads its dependencies; nothing is built.
pub struct Bundle;

impl EasyBlock for Bundle {
    fn name(&self) -> &'static str {
        "Bundle"
    }

    fn location(&self) -> &'static str {
        module_path!()
    }

    fn extract_step(&self, _ctx: &mut BuildContext) -> Result<()> {
        Ok(())
    }

    fn install_step(&self, _ctx: &mut BuildContext) -> Result<()> {
        Ok(())
    }

    fn sanity_check_defaults(&self, _ctx: &BuildContext) -> SanityCheckPaths {
        SanityCheckPaths::default()
    }
}

/// Compiler toolchains: a bundle of the toolchain components.
pub struct Toolchain;

impl EasyBlock for Toolchain {
    fn name(&self) -> &'static str {
        "Toolchain"
    }

    fn parent(&self) -> &'static str {
        "Bundle"
    }

    fn location(&self) -> &'static str {
        module_path!()
    }

    fn extract_step(&self, _ctx: &mut BuildContext) -> Result<()> {
        Ok(())
    }

    fn install_step(&self, _ctx: &mut BuildContext) -> Result<()> {
        Ok(())
    }

    fn sanity_check_defaults(&self, _ctx: &BuildContext) -> SanityCheckPaths {
        SanityCheckPaths::default()
    }
}
