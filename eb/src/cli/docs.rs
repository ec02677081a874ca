// eb/src/cli/docs.rs
use colored::Colorize;
use eb_common::config::{cfgfile_constants, home_dir, Config};
use eb_common::error::{EbError, Result};
use eb_common::{EasyConfigRepository, InstalledModules};
use eb_core::docs;

use super::CliArgs;

fn detailed(value: &str, option: &str) -> Result<bool> {
    match value {
        "simple" => Ok(false),
        "detailed" => Ok(true),
        other => Err(EbError::ValidationError(format!(
            "Invalid value '{other}' for --{option} (use simple or detailed)"
        ))),
    }
}

pub fn run(args: &CliArgs, config: &Config) -> Result<()> {
    let format = args.output_format;
    let mut repository = EasyConfigRepository::new(config);
    for path in args.extra_robot_paths().into_iter().rev() {
        repository.prepend_path(path);
    }

    if args.list_toolchains {
        println!("{}", docs::list_toolchains(format)?);
    }
    if let Some(toolchain) = &args.avail_toolchain_opts {
        println!("{}", docs::avail_toolchain_opts(toolchain, format)?);
    }
    if let Some(level) = &args.list_easyblocks {
        println!("{}", docs::list_easyblocks(detailed(level, "list-easyblocks")?, format)?);
    }
    if args.avail_easyconfig_params {
        println!("{}", docs::avail_easyconfig_params(format)?);
    }
    if args.avail_easyconfig_constants {
        println!("{}", docs::avail_easyconfig_constants(format)?);
    }
    if args.avail_easyconfig_templates {
        println!("{}", docs::avail_easyconfig_templates(format)?);
    }
    if args.avail_easyconfig_licenses {
        println!("{}", docs::avail_easyconfig_licenses(format)?);
    }
    if args.avail_cfgfile_constants {
        println!("{}", docs::avail_cfgfile_constants(&cfgfile_constants(&home_dir()), format)?);
    }
    if let Some(level) = &args.list_software {
        println!(
            "{}",
            docs::list_software(&repository, detailed(level, "list-software")?, format, None)?
        );
    }
    if let Some(level) = &args.list_installed_software {
        let installed = InstalledModules::new(config);
        let detail = detailed(level, "list-installed-software")?;
        println!(
            "{}",
            docs::list_software(&repository, detail, format, Some(&installed))?
        );
    }
    if let Some(query) = &args.search {
        let hits = docs::search_easyconfigs(&repository, query)?;
        if hits.is_empty() {
            println!("{}", format!("No easyconfigs found matching '{query}'").yellow());
        }
        for path in hits {
            println!(" * {}", path.display());
        }
    }
    Ok(())
}
