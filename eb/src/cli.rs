// eb/src/cli.rs
//! Command-line surface. `eb` is option driven: easyconfigs are positional, everything
//! else is a flag, and several informational flags may be combined in one call.
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use eb_common::config::{split_paths, Config, RawConfig};
use eb_common::error::{EbError, Result};
use eb_core::docs::DocFormat;

pub mod bootstrap;
pub mod build;
pub mod docs;
pub mod info;

#[derive(Parser, Debug)]
#[command(
    name = "eb",
    bin_name = "eb",
    about = "Build and install software from easyconfig files",
    disable_version_flag = true
)]
pub struct CliArgs {
    /// Easyconfig files, as paths or file names looked up in the robot search path
    pub easyconfigs: Vec<String>,

    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Print version information and exit
    #[arg(long)]
    pub version: bool,

    /// Show information about this system
    #[arg(long)]
    pub show_system_info: bool,

    /// Check presence and version of required and optional external tools
    #[arg(long)]
    pub check_eb_deps: bool,

    /// Show the effective configuration and where each value comes from
    #[arg(long)]
    pub show_config: bool,

    /// Print build status of the easyconfigs and their dependencies, build nothing
    #[arg(short = 'D', long)]
    pub dry_run: bool,

    /// Print what every build step would do, execute nothing
    #[arg(short = 'x', long)]
    pub extended_dry_run: bool,

    /// Build missing dependencies; optional colon-separated paths are searched first
    #[arg(
        short = 'r',
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "",
        value_name = "PATHS"
    )]
    pub robot: Option<String>,

    /// Colon-separated easyconfig search path
    #[arg(long, value_name = "PATHS")]
    pub robot_paths: Option<String>,

    /// Rebuild the given easyconfigs even when their module exists
    #[arg(long)]
    pub rebuild: bool,

    /// Same as --rebuild
    #[arg(short, long)]
    pub force: bool,

    /// Print shell commands and their outcome while building
    #[arg(long)]
    pub trace: bool,

    /// Dependencies to leave out (names, or name=version)
    #[arg(long, value_delimiter = ',', value_name = "NAMES")]
    pub filter_deps: Vec<String>,

    #[arg(long, value_name = "DIR")]
    pub prefix: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    pub installpath: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    pub buildpath: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    pub sourcepath: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    pub repositorypath: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    pub tmp_logdir: Option<PathBuf>,

    /// Lmod, EnvironmentModules, EnvironmentModulesC or EnvironmentModulesTcl
    #[arg(long, value_name = "TOOL")]
    pub modules_tool: Option<String>,

    /// Lua or Tcl
    #[arg(long, value_name = "SYNTAX")]
    pub module_syntax: Option<String>,

    #[arg(long, value_name = "N")]
    pub parallel: Option<usize>,

    /// Pretend to be this version when checking for deprecated functionality
    #[arg(long, value_name = "VERSION")]
    pub deprecated: Option<String>,

    #[arg(long)]
    pub list_toolchains: bool,

    /// Show the options a toolchain accepts in `toolchainopts`
    #[arg(long, value_name = "TOOLCHAIN")]
    pub avail_toolchain_opts: Option<String>,

    /// simple or detailed
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "simple",
        value_name = "DETAIL"
    )]
    pub list_easyblocks: Option<String>,

    #[arg(long)]
    pub avail_easyconfig_params: bool,

    #[arg(long)]
    pub avail_easyconfig_constants: bool,

    #[arg(long)]
    pub avail_easyconfig_templates: bool,

    /// Show the license constants usable as `software_license`
    #[arg(long)]
    pub avail_easyconfig_licenses: bool,

    /// Show the constants usable as `%(NAME)s` in configuration files
    #[arg(long)]
    pub avail_cfgfile_constants: bool,

    /// simple or detailed
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "simple",
        value_name = "DETAIL"
    )]
    pub list_software: Option<String>,

    /// Like --list-software, limited to software with an available module
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "simple",
        value_name = "DETAIL"
    )]
    pub list_installed_software: Option<String>,

    /// Search easyconfig files by (case-insensitive) regular expression
    #[arg(short = 'S', long, value_name = "REGEX")]
    pub search: Option<String>,

    /// txt, md, rst or json
    #[arg(long, default_value = "txt", value_name = "FORMAT")]
    pub output_format: DocFormat,

    /// Check a bootstrap script against --bootstrap-expected
    #[arg(long, value_name = "SCRIPT", requires = "bootstrap_expected")]
    pub verify_bootstrap: Option<PathBuf>,

    /// Pinned "<version> <sha256>" pair for --verify-bootstrap
    #[arg(long, value_name = "PAIR")]
    pub bootstrap_expected: Option<String>,
}

impl CliArgs {
    /// Command-line layer of the configuration.
    pub fn raw_config(&self) -> RawConfig {
        RawConfig {
            prefix: self.prefix.clone(),
            buildpath: self.buildpath.clone(),
            installpath: self.installpath.clone(),
            sourcepath: self.sourcepath.clone(),
            repositorypath: self.repositorypath.clone(),
            robot_paths: self.robot_paths.as_deref().map(split_paths),
            tmp_logdir: self.tmp_logdir.clone(),
            modules_tool: self.modules_tool.clone(),
            module_syntax: self.module_syntax.clone(),
            parallel: self.parallel,
            filter_deps: (!self.filter_deps.is_empty()).then(|| self.filter_deps.clone()),
            deprecated: self.deprecated.clone(),
            trace: self.trace.then_some(true),
            bootstrap_deprecated: None,
        }
    }

    /// Paths given via `--robot=PATHS`.
    pub fn extra_robot_paths(&self) -> Vec<PathBuf> {
        self.robot.as_deref().map(split_paths).unwrap_or_default()
    }

    fn wants_listing(&self) -> bool {
        self.list_toolchains
            || self.avail_toolchain_opts.is_some()
            || self.list_easyblocks.is_some()
            || self.avail_easyconfig_params
            || self.avail_easyconfig_constants
            || self.avail_easyconfig_templates
            || self.avail_easyconfig_licenses
            || self.avail_cfgfile_constants
            || self.list_software.is_some()
            || self.list_installed_software.is_some()
            || self.search.is_some()
    }

    fn wants_info(&self) -> bool {
        self.show_system_info || self.check_eb_deps || self.show_config
    }

    /// Runs whatever was asked for. Informational options are handled first; easyconfigs
    /// given alongside them are built afterwards.
    pub async fn run(&self, config: &Config) -> Result<()> {
        let mut handled = false;
        if self.wants_info() {
            info::run(self, config)?;
            handled = true;
        }
        if self.wants_listing() {
            docs::run(self, config)?;
            handled = true;
        }
        if let Some(script) = &self.verify_bootstrap {
            bootstrap::run(config, script, self.bootstrap_expected.as_deref().unwrap_or(""))?;
            handled = true;
        }
        if !self.easyconfigs.is_empty() {
            return build::run(self, config).await;
        }
        if handled {
            Ok(())
        } else {
            Err(EbError::Generic(
                "Please provide one or multiple easyconfig files, or use an informational option (see --help)"
                    .to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn robot_takes_optional_paths() {
        let args = CliArgs::parse_from(["eb", "bzip2-1.0.8.eb", "--trace", "--robot"]);
        assert_eq!(args.easyconfigs, vec!["bzip2-1.0.8.eb"]);
        assert_eq!(args.robot.as_deref(), Some(""));
        assert!(args.extra_robot_paths().is_empty());

        let args = CliArgs::parse_from(["eb", "--robot=/a:/b", "zlib-1.3.eb"]);
        assert_eq!(args.extra_robot_paths(), vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(args.easyconfigs, vec!["zlib-1.3.eb"]);
    }

    #[test]
    fn filter_deps_and_config_layer() {
        let args = CliArgs::parse_from([
            "eb",
            "-x",
            "bzip2-1.0.8.eb",
            "--filter-deps=zlib,ncurses=6.4",
            "--parallel",
            "4",
            "--trace",
        ]);
        assert!(args.extended_dry_run);
        let raw = args.raw_config();
        assert_eq!(
            raw.filter_deps,
            Some(vec!["zlib".to_string(), "ncurses=6.4".to_string()])
        );
        assert_eq!(raw.parallel, Some(4));
        assert_eq!(raw.trace, Some(true));
        assert_eq!(raw.installpath, None);
    }

    #[test]
    fn listing_options() {
        let args = CliArgs::parse_from(["eb", "--list-easyblocks=detailed", "--output-format", "md"]);
        assert_eq!(args.list_easyblocks.as_deref(), Some("detailed"));
        assert_eq!(args.output_format, DocFormat::Md);
        assert!(args.wants_listing());

        let args = CliArgs::parse_from(["eb", "--list-software"]);
        assert_eq!(args.list_software.as_deref(), Some("simple"));
        let args = CliArgs::parse_from(["eb", "--list-installed-software=detailed", "--output-format", "rst"]);
        assert_eq!(args.list_installed_software.as_deref(), Some("detailed"));
        assert_eq!(args.output_format, DocFormat::Rst);
        assert!(args.wants_listing());
        assert!(CliArgs::parse_from(["eb", "--avail-easyconfig-licenses"]).wants_listing());
        assert!(CliArgs::parse_from(["eb", "--avail-cfgfile-constants"]).wants_listing());
        assert!(CliArgs::try_parse_from(["eb", "--output-format", "xml"]).is_err());
    }

    #[test]
    fn verify_bootstrap_needs_expected_pair() {
        assert!(CliArgs::try_parse_from(["eb", "--verify-bootstrap", "bootstrap_eb.py"]).is_err());
        let args = CliArgs::parse_from([
            "eb",
            "--verify-bootstrap",
            "bootstrap_eb.py",
            "--bootstrap-expected",
            "20231214.01 abcdef",
        ]);
        assert_eq!(args.bootstrap_expected.as_deref(), Some("20231214.01 abcdef"));
    }
}
