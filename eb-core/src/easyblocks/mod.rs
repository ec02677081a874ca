// eb-core/src/easyblocks/mod.rs
//! Build procedures. Generic easyblocks cover common build systems; software-specific
//! ones are named `EB_<software name>` and picked automatically.
use std::collections::BTreeMap;

use eb_common::easyconfig::SanityCheckPaths;
use eb_common::error::{EbError, Result};
use eb_common::EasyConfig;
use tracing::debug;

use crate::build::context::BuildContext;
use crate::build::env::standard_prepend_paths;
use crate::build::sources;

pub mod bzip2;
pub mod generic;

use self::bzip2::Bzip2;
use self::generic::{Binary, Bundle, CMakeMake, ConfigureMake, MakeCp, Tarball, Toolchain};

/// Root of the easyblock hierarchy.
pub const BASE_EASYBLOCK: &str = "EasyBlock";

/// Steps of a build that differ between build procedures. Default implementations
/// do nothing, except for unpacking sources.
pub trait EasyBlock: Send + Sync {
    fn name(&self) -> &'static str;

    /// Easyblock this one specialises.
    fn parent(&self) -> &'static str {
        BASE_EASYBLOCK
    }

    /// Rust module implementing the easyblock, shown by detailed listings.
    fn location(&self) -> &'static str;

    fn extract_step(&self, ctx: &mut BuildContext) -> Result<()> {
        sources::unpack_sources(ctx)
    }

    fn configure_step(&self, _ctx: &mut BuildContext) -> Result<()> {
        Ok(())
    }

    fn build_step(&self, _ctx: &mut BuildContext) -> Result<()> {
        Ok(())
    }

    fn test_step(&self, _ctx: &mut BuildContext) -> Result<()> {
        Ok(())
    }

    fn install_step(&self, ctx: &mut BuildContext) -> Result<()>;

    /// Paths checked when the easyconfig sets no `sanity_check_paths`.
    fn sanity_check_defaults(&self, _ctx: &BuildContext) -> SanityCheckPaths {
        SanityCheckPaths {
            files: Vec::new(),
            dirs: vec![vec!["bin".to_string()], vec!["lib".to_string(), "lib64".to_string()]],
        }
    }

    /// Paths (relative to the installation) the module prepends, keyed by variable.
    fn module_prepend_paths(&self, ctx: &BuildContext) -> BTreeMap<String, Vec<String>> {
        standard_prepend_paths(&ctx.install_dir)
    }

    /// Extra environment variables for the module.
    fn module_extra_env(&self, _ctx: &BuildContext) -> Vec<(String, String)> {
        Vec::new()
    }
}

static EASYBLOCKS: &[&dyn EasyBlock] = &[
    &Binary,
    &Bundle,
    &CMakeMake,
    &ConfigureMake,
    &MakeCp,
    &Tarball,
    &Toolchain,
    &Bzip2,
];

pub fn all_easyblocks() -> &'static [&'static dyn EasyBlock] {
    EASYBLOCKS
}

pub fn get_easyblock(name: &str) -> Option<&'static dyn EasyBlock> {
    EASYBLOCKS.iter().copied().find(|eb| eb.name() == name)
}

/// Name of the software-specific easyblock for `software`: special characters are
/// spelled out, e.g. `EB_Python_minus_bundle`.
pub fn easyblock_class_name(software: &str) -> String {
    let mut encoded = String::from("EB_");
    for c in software.chars() {
        match c {
            '-' => encoded.push_str("_minus_"),
            '+' => encoded.push_str("_plus_"),
            '.' => encoded.push_str("_period_"),
            ' ' => encoded.push_str("_space_"),
            c => encoded.push(c),
        }
    }
    encoded
}

/// The `easyblock` parameter if set, otherwise the software-specific easyblock.
pub fn select_easyblock(ec: &EasyConfig) -> Result<&'static dyn EasyBlock> {
    let name = match ec.easyblock() {
        Some(name) => name,
        None => {
            let class = easyblock_class_name(&ec.name);
            if get_easyblock(&class).is_none() {
                return Err(EbError::EasyConfig(
                    ec.filename(),
                    format!(
                        "No software-specific easyblock '{class}' found for {}; set 'easyblock' to a generic easyblock",
                        ec.name
                    ),
                ));
            }
            class
        }
    };
    debug!("Using easyblock {} for {}", name, ec.full_mod_name());
    get_easyblock(&name).ok_or_else(|| {
        EbError::EasyConfig(
            ec.filename(),
            format!("Failed to obtain class for easyblock '{name}'"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ec(extra: &str) -> EasyConfig {
        format!(
            "name = 'bzip2'\nversion = '1.0.8'\nhomepage = 'https://sourceware.org/bzip2'\n\
             description = 'bzip2'\ntoolchain = SYSTEM\n{extra}"
        )
        .parse()
        .unwrap()
    }

    #[test]
    fn encodes_class_names() {
        assert_eq!(easyblock_class_name("bzip2"), "EB_bzip2");
        assert_eq!(easyblock_class_name("Python-bundle"), "EB_Python_minus_bundle");
        assert_eq!(easyblock_class_name("GTK+"), "EB_GTK_plus_");
    }

    #[test]
    fn selection_prefers_explicit_easyblock() {
        assert_eq!(select_easyblock(&ec("")).unwrap().name(), "EB_bzip2");
        assert_eq!(
            select_easyblock(&ec("easyblock = 'ConfigureMake'")).unwrap().name(),
            "ConfigureMake"
        );
        assert!(select_easyblock(&ec("easyblock = 'NoSuchBlock'")).is_err());
    }

    #[test]
    fn missing_software_specific_easyblock_is_an_error() {
        let toy: EasyConfig = "name = 'toy'\nversion = '0.0'\nhomepage = 'https://example.org'\n\
                               description = 'toy'\ntoolchain = SYSTEM\n"
            .parse()
            .unwrap();
        let Err(err) = select_easyblock(&toy) else {
            panic!("toy has no easyblock");
        };
        assert!(err.to_string().contains("EB_toy"));
    }

    #[test]
    fn hierarchy_is_rooted() {
        for eb in all_easyblocks() {
            let mut parent = eb.parent();
            let mut depth = 0;
            while parent != BASE_EASYBLOCK {
                parent = get_easyblock(parent).unwrap().parent();
                depth += 1;
                assert!(depth < 10);
            }
        }
    }
}
