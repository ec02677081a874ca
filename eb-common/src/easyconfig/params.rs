// eb-common/src/easyconfig/params.rs
use super::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParamCategory {
    Mandatory,
    Toolchain,
    Build,
    Dependencies,
    Module,
    Other,
}

impl ParamCategory {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Mandatory => "MANDATORY",
            Self::Toolchain => "TOOLCHAIN",
            Self::Build => "BUILD",
            Self::Dependencies => "DEPENDENCIES",
            Self::Module => "MODULES",
            Self::Other => "OTHER",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub default: Value,
    pub description: &'static str,
    pub category: ParamCategory,
}

fn p(name: &'static str, default: Value, description: &'static str, category: ParamCategory) -> ParamSpec {
    ParamSpec {
        name,
        default,
        description,
        category,
    }
}

fn empty_str() -> Value {
    Value::Str(String::new())
}

fn empty_list() -> Value {
    Value::List(Vec::new())
}

/// Every parameter an easyconfig may set.
pub fn known_params() -> Vec<ParamSpec> {
    use ParamCategory::*;
    vec![
        p("name", Value::None, "Name of software", Mandatory),
        p("version", Value::None, "Version of software", Mandatory),
        p("homepage", Value::None, "The homepage of the software", Mandatory),
        p("description", Value::None, "A short description of the software", Mandatory),
        p("toolchain", Value::None, "Name and version of toolchain", Mandatory),
        p("versionsuffix", empty_str(), "Additional suffix for software version (placed after toolchain name)", Other),
        p("easyblock", Value::None, "EasyBlock to use for building; if set to None, an easyblock is selected based on the software name", Other),
        p("toolchainopts", Value::None, "Extra options for compilers", Toolchain),
        p("source_urls", empty_list(), "List of URLs for source files", Build),
        p("sources", empty_list(), "List of source files", Build),
        p("patches", empty_list(), "List of patches to apply", Build),
        p("checksums", empty_list(), "Checksums for sources and patches", Build),
        p("preconfigopts", empty_str(), "Extra options pre-passed to configure", Build),
        p("configopts", empty_str(), "Extra options passed to configure (default already has --prefix)", Build),
        p("configure_cmd", Value::Str("./configure".to_string()), "Command used for the configure step", Build),
        p("prebuildopts", empty_str(), "Extra options pre-passed to build command", Build),
        p("buildopts", empty_str(), "Extra options passed to make step (default already has -j X)", Build),
        p("preinstallopts", empty_str(), "Extra prefix options for installation", Build),
        p("installopts", empty_str(), "Extra options for installation", Build),
        p("install_cmd", Value::None, "Install command to be used", Build),
        p("runtest", Value::None, "Indicates if a test should be run after make; should specify argument after make (for e.g., 'test' for make test)", Build),
        p("postinstallcmds", empty_list(), "Commands to run after the install step", Build),
        p("parallel", Value::None, "Degree of parallelism for e.g. make (default: based on the number of cores)", Build),
        p("maxparallel", Value::None, "Max degree of parallelism", Build),
        p("start_dir", Value::None, "Path to start the make in; if the path is absolute, use that path; if not, this is added to the guessed path", Build),
        p("separate_build_dir", Value::Bool(false), "Perform build in a separate directory", Build),
        p("files_to_copy", empty_list(), "List of files or dirs to copy to the installation directory", Build),
        p("skipsteps", empty_list(), "Skip these steps", Build),
        p("sanity_check_paths", Value::Dict(Vec::new()), "List of files and directories to check (format: {'files':<list>, 'dirs':<list>})", Build),
        p("sanity_check_commands", empty_list(), "format: [(name, options)] e.g. [('gzip','-h')]. Using a non-tuple is equivalent to (name, '-h')", Build),
        p("with_shared_libs", Value::Bool(true), "Build and install shared libraries", Build),
        p("github_account", Value::None, "GitHub account name to be used to resolve template values in source URLs", Build),
        p("dependencies", empty_list(), "List of dependencies", Dependencies),
        p("builddependencies", empty_list(), "List of build dependencies", Dependencies),
        p("modextravars", Value::Dict(Vec::new()), "Extra environment variables to be added to module file", Module),
        p("modextrapaths", Value::Dict(Vec::new()), "Extra paths to be prepended in module file", Module),
        p("modloadmsg", empty_str(), "Message that should be printed when generated module is loaded", Module),
        p("moduleclass", Value::Str("base".to_string()), "Module class to be used for this software", Module),
        p("whatis", Value::None, "List of brief (one line) description entries for the software", Module),
        p("docurls", Value::None, "List of urls with documentation of the software (not necessarily on homepage)", Other),
        p("software_license", Value::None, "Software license", Other),
        p("site_contacts", Value::None, "String/list of strings with site contacts for the software", Other),
    ]
}

pub fn param_spec(name: &str) -> Option<ParamSpec> {
    known_params().into_iter().find(|p| p.name == name)
}

pub fn is_known_param(name: &str) -> bool {
    name.starts_with("local_") || param_spec(name).is_some()
}
