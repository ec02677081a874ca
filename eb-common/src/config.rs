// eb-common/src/config.rs
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, fs};

use directories::{BaseDirs, UserDirs};
use serde::Deserialize;
use tracing::{debug, warn};

use super::error::{EbError, Result};
use super::version::LooseVersion;

const ENV_PREFIX: &str = "EASYBUILD_";
const DEFAULT_PREFIX_SUBDIR: &str = ".local/easybuild";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Where an effective configuration value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigSource {
    Default,
    File,
    Env,
    CmdLine,
}

impl ConfigSource {
    pub fn marker(&self) -> char {
        match self {
            Self::Default => 'D',
            Self::File => 'F',
            Self::Env => 'E',
            Self::CmdLine => 'C',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModulesToolKind {
    Lmod,
    EnvironmentModules,
    EnvironmentModulesC,
    EnvironmentModulesTcl,
}

impl ModulesToolKind {
    pub fn supports_lua(&self) -> bool {
        matches!(self, Self::Lmod)
    }
}

impl FromStr for ModulesToolKind {
    type Err = EbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "Lmod" => Ok(Self::Lmod),
            "EnvironmentModules" => Ok(Self::EnvironmentModules),
            "EnvironmentModulesC" => Ok(Self::EnvironmentModulesC),
            "EnvironmentModulesTcl" => Ok(Self::EnvironmentModulesTcl),
            other => Err(EbError::Config(format!(
                "Unknown modules tool '{other}' (known: Lmod, EnvironmentModules, EnvironmentModulesC, EnvironmentModulesTcl)"
            ))),
        }
    }
}

impl fmt::Display for ModulesToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Lmod => "Lmod",
            Self::EnvironmentModules => "EnvironmentModules",
            Self::EnvironmentModulesC => "EnvironmentModulesC",
            Self::EnvironmentModulesTcl => "EnvironmentModulesTcl",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleSyntax {
    Lua,
    Tcl,
}

impl ModuleSyntax {
    /// File name extension for module files in this syntax.
    pub fn file_ext(&self) -> &'static str {
        match self {
            Self::Lua => ".lua",
            Self::Tcl => "",
        }
    }
}

impl FromStr for ModuleSyntax {
    type Err = EbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "Lua" | "lua" => Ok(Self::Lua),
            "Tcl" | "tcl" => Ok(Self::Tcl),
            other => Err(EbError::Config(format!(
                "Unknown module syntax '{other}' (known: Lua, Tcl)"
            ))),
        }
    }
}

impl fmt::Display for ModuleSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lua => f.write_str("Lua"),
            Self::Tcl => f.write_str("Tcl"),
        }
    }
}

/// One layer of (partial) configuration: defaults, a file, the environment or the command line.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub prefix: Option<PathBuf>,
    pub buildpath: Option<PathBuf>,
    pub installpath: Option<PathBuf>,
    pub sourcepath: Option<PathBuf>,
    pub repositorypath: Option<PathBuf>,
    pub robot_paths: Option<Vec<PathBuf>>,
    pub tmp_logdir: Option<PathBuf>,
    pub modules_tool: Option<String>,
    pub module_syntax: Option<String>,
    pub parallel: Option<usize>,
    pub filter_deps: Option<Vec<String>>,
    pub deprecated: Option<String>,
    pub trace: Option<bool>,
    pub bootstrap_deprecated: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    config: RawConfig,
}

impl RawConfig {
    /// Builds a layer from `EASYBUILD_*` variables.
    pub fn from_env_map(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            vars.get(&format!("{ENV_PREFIX}{key}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let parallel = match get("PARALLEL") {
            Some(v) => Some(v.parse::<usize>().map_err(|e| {
                EbError::Config(format!("Invalid value '{v}' for {ENV_PREFIX}PARALLEL: {e}"))
            })?),
            None => None,
        };

        Ok(Self {
            prefix: get("PREFIX").map(PathBuf::from),
            buildpath: get("BUILDPATH").map(PathBuf::from),
            installpath: get("INSTALLPATH").map(PathBuf::from),
            sourcepath: get("SOURCEPATH").map(PathBuf::from),
            repositorypath: get("REPOSITORYPATH").map(PathBuf::from),
            robot_paths: get("ROBOT_PATHS").map(|v| split_paths(&v)),
            tmp_logdir: get("TMP_LOGDIR").map(PathBuf::from),
            modules_tool: get("MODULES_TOOL"),
            module_syntax: get("MODULE_SYNTAX"),
            parallel,
            filter_deps: get("FILTER_DEPS").map(|v| split_list(&v)),
            deprecated: get("DEPRECATED"),
            trace: get("TRACE").map(|v| parse_bool(&v)),
            bootstrap_deprecated: get("BOOTSTRAP_DEPRECATED").map(|v| parse_bool(&v)),
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)?;
        Ok(file.config)
    }
}

/// Constants configuration files may refer to as `%(NAME)s`: (name, value, help).
pub fn cfgfile_constants(home: &Path) -> Vec<(&'static str, String, &'static str)> {
    let default_prefix = home.join(DEFAULT_PREFIX_SUBDIR);
    let user = env::var("USER")
        .or_else(|_| env::var("LOGNAME"))
        .unwrap_or_default();
    vec![
        (
            "DEFAULT_REPOSITORYPATH",
            default_prefix.join("ebfiles_repo").display().to_string(),
            "Default easyconfigs repository path",
        ),
        (
            "DEFAULT_ROBOT_PATHS",
            default_prefix.join("easyconfigs").display().to_string(),
            "Default robot path",
        ),
        ("HOME", home.display().to_string(), "Current user's home directory, expanded '~'"),
        ("USER", user, "Current username"),
    ]
}

fn expand_cfgfile_constants(content: &str, constants: &[(&str, String, &str)]) -> String {
    constants
        .iter()
        .fold(content.to_string(), |text, (name, value, _)| {
            text.replace(&format!("%({name})s"), value)
        })
}

/// Home directory of the current user.
pub fn home_dir() -> PathBuf {
    UserDirs::new()
        .map(|ud| ud.home_dir().to_path_buf())
        .or_else(|| env::var_os("HOME").map(PathBuf::from))
        .unwrap_or_else(env::temp_dir)
}

pub fn split_paths(value: &str) -> Vec<PathBuf> {
    value
        .split(':')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

#[derive(Debug, Clone)]
pub struct Config {
    pub prefix: PathBuf,
    pub buildpath: PathBuf,
    pub installpath: PathBuf,
    pub sourcepath: PathBuf,
    pub repositorypath: PathBuf,
    pub robot_paths: Vec<PathBuf>,
    pub tmp_logdir: PathBuf,
    pub modules_tool: ModulesToolKind,
    pub module_syntax: ModuleSyntax,
    pub parallel: usize,
    pub filter_deps: Vec<String>,
    pub deprecated: Option<String>,
    pub trace: bool,
    pub bootstrap_deprecated: bool,
    sources: HashMap<&'static str, ConfigSource>,
}

impl Config {
    /// Loads defaults, configuration files and the process environment, then applies
    /// `cmdline` on top.
    pub fn load(cmdline: RawConfig) -> Result<Self> {
        debug!("Loading eb configuration");
        let vars: HashMap<String, String> = env::vars().collect();
        let home = home_dir();
        let constants = cfgfile_constants(&home);

        let mut layers = Vec::new();
        for file in config_file_candidates(&vars) {
            if file.is_file() {
                debug!("Reading configuration file {}", file.display());
                let content = expand_cfgfile_constants(&fs::read_to_string(&file)?, &constants);
                let raw = RawConfig::from_toml_str(&content).map_err(|e| {
                    EbError::Config(format!("Failed to parse {}: {e}", file.display()))
                })?;
                layers.push((ConfigSource::File, raw));
            } else if vars.contains_key("EASYBUILD_CONFIGFILES") {
                warn!("Configuration file {} does not exist", file.display());
            }
        }
        layers.push((ConfigSource::Env, RawConfig::from_env_map(&vars)?));
        layers.push((ConfigSource::CmdLine, cmdline));

        let config = Self::resolve(layers, &home)?;
        debug!("Configuration loaded successfully.");
        Ok(config)
    }

    /// Merges configuration layers; later layers win for every key they set.
    pub fn resolve(layers: Vec<(ConfigSource, RawConfig)>, home: &Path) -> Result<Self> {
        let mut sources: HashMap<&'static str, ConfigSource> = HashMap::new();

        macro_rules! pick {
            ($field:ident) => {{
                let mut value = None;
                for (source, layer) in &layers {
                    if let Some(v) = &layer.$field {
                        value = Some(v.clone());
                        sources.insert(stringify!($field), *source);
                    }
                }
                value
            }};
        }

        let prefix = pick!(prefix).unwrap_or_else(|| home.join(DEFAULT_PREFIX_SUBDIR));
        let buildpath = pick!(buildpath).unwrap_or_else(|| prefix.join("build"));
        let installpath = pick!(installpath).unwrap_or_else(|| prefix.clone());
        let sourcepath = pick!(sourcepath).unwrap_or_else(|| prefix.join("sources"));
        let repositorypath = pick!(repositorypath).unwrap_or_else(|| prefix.join("ebfiles_repo"));
        let robot_paths = pick!(robot_paths).unwrap_or_else(|| vec![prefix.join("easyconfigs")]);
        let tmp_logdir = pick!(tmp_logdir).unwrap_or_else(env::temp_dir);

        let modules_tool = match pick!(modules_tool) {
            Some(s) => s.parse::<ModulesToolKind>()?,
            None => ModulesToolKind::Lmod,
        };
        let module_syntax = match pick!(module_syntax) {
            Some(s) => {
                let syntax = s.parse::<ModuleSyntax>()?;
                if syntax == ModuleSyntax::Lua && !modules_tool.supports_lua() {
                    return Err(EbError::Config(format!(
                        "Module syntax Lua is not supported by modules tool {modules_tool}"
                    )));
                }
                syntax
            }
            None if modules_tool.supports_lua() => ModuleSyntax::Lua,
            None => ModuleSyntax::Tcl,
        };

        let parallel = pick!(parallel).unwrap_or_else(num_cpus::get);
        if parallel == 0 {
            return Err(EbError::Config("parallel must be at least 1".to_string()));
        }

        let deprecated = pick!(deprecated);
        if let Some(version) = &deprecated {
            LooseVersion::parse(version).map_err(|e| {
                EbError::Config(format!("Invalid value for deprecated: {e}"))
            })?;
        }

        Ok(Self {
            prefix,
            buildpath,
            installpath,
            sourcepath,
            repositorypath,
            robot_paths,
            tmp_logdir,
            modules_tool,
            module_syntax,
            parallel,
            filter_deps: pick!(filter_deps).unwrap_or_default(),
            deprecated,
            trace: pick!(trace).unwrap_or(false),
            bootstrap_deprecated: pick!(bootstrap_deprecated).unwrap_or(false),
            sources,
        })
    }

    /// Configuration rooted at `prefix` with every other key at its default.
    pub fn with_prefix(prefix: &Path) -> Result<Self> {
        let raw = RawConfig {
            prefix: Some(prefix.to_path_buf()),
            ..Default::default()
        };
        Self::resolve(vec![(ConfigSource::CmdLine, raw)], prefix)
    }

    pub fn source_of(&self, key: &str) -> ConfigSource {
        self.sources
            .get(key)
            .copied()
            .unwrap_or(ConfigSource::Default)
    }

    pub fn software_dir(&self) -> PathBuf {
        self.installpath.join("software")
    }

    pub fn modules_dir(&self) -> PathBuf {
        self.installpath.join("modules").join("all")
    }

    pub fn software_install_dir(&self, name: &str, version_string: &str) -> PathBuf {
        self.software_dir().join(name).join(version_string)
    }

    pub fn module_file_path(&self, name: &str, version_string: &str) -> PathBuf {
        self.modules_dir().join(name).join(format!(
            "{version_string}{}",
            self.module_syntax.file_ext()
        ))
    }

    pub fn build_dir(&self, name: &str, version_string: &str) -> PathBuf {
        self.buildpath.join(name).join(version_string)
    }

    /// Directories searched (in order) for a source file of software `name`.
    pub fn source_dirs(&self, name: &str) -> Vec<PathBuf> {
        let letter = name
            .chars()
            .next()
            .map(|c| c.to_ascii_lowercase().to_string())
            .unwrap_or_default();
        vec![
            self.sourcepath.join(&letter).join(name),
            self.sourcepath.join(name),
            self.sourcepath.clone(),
        ]
    }

    /// Directory that downloaded sources of `name` are stored in.
    pub fn source_store_dir(&self, name: &str) -> PathBuf {
        self.source_dirs(name).remove(0)
    }

    /// Checks use of deprecated functionality against the configured `deprecated` version.
    /// Errors once the pretend version has reached `removal_version`, warns otherwise.
    pub fn log_deprecated(&self, msg: &str, removal_version: &str) -> Result<()> {
        if let Some(pretend) = &self.deprecated {
            let pretend = LooseVersion::parse(pretend)
                .map_err(|e| EbError::Config(format!("Invalid value for deprecated: {e}")))?;
            let removal = LooseVersion::parse(removal_version)
                .map_err(|e| EbError::Config(format!("Invalid removal version: {e}")))?;
            if pretend >= removal {
                return Err(EbError::Deprecated {
                    msg: msg.to_string(),
                    version: removal_version.to_string(),
                });
            }
        }
        warn!(
            "Deprecated functionality, will no longer work in v{}: {}",
            removal_version, msg
        );
        Ok(())
    }

    /// Rows for `--show-config`: `(key, source, value)`, sorted by key.
    pub fn show_config_rows(&self) -> Vec<(String, ConfigSource, String)> {
        let join_paths = |paths: &[PathBuf]| {
            paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut rows = vec![
            ("buildpath", self.buildpath.display().to_string()),
            ("installpath", self.installpath.display().to_string()),
            ("modules_tool", self.modules_tool.to_string()),
            ("module_syntax", self.module_syntax.to_string()),
            ("parallel", self.parallel.to_string()),
            ("prefix", self.prefix.display().to_string()),
            ("repositorypath", self.repositorypath.display().to_string()),
            ("robot_paths", join_paths(&self.robot_paths)),
            ("sourcepath", self.sourcepath.display().to_string()),
            ("tmp_logdir", self.tmp_logdir.display().to_string()),
        ];
        if !self.filter_deps.is_empty() {
            rows.push(("filter_deps", self.filter_deps.join(", ")));
        }
        if let Some(deprecated) = &self.deprecated {
            rows.push(("deprecated", deprecated.clone()));
        }
        if self.trace {
            rows.push(("trace", "True".to_string()));
        }
        if self.bootstrap_deprecated {
            rows.push(("bootstrap_deprecated", "True".to_string()));
        }
        let mut rows: Vec<(String, ConfigSource, String)> = rows
            .into_iter()
            .map(|(key, value)| (key.replace('_', "-"), self.source_of(key), value))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }
}

fn config_file_candidates(vars: &HashMap<String, String>) -> Vec<PathBuf> {
    if let Some(files) = vars.get("EASYBUILD_CONFIGFILES") {
        return split_list(files).into_iter().map(PathBuf::from).collect();
    }
    let config_home = vars
        .get("XDG_CONFIG_HOME")
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .or_else(|| BaseDirs::new().map(|b| b.config_dir().to_path_buf()));
    config_home
        .map(|dir| vec![dir.join("easybuild").join(CONFIG_FILE_NAME)])
        .unwrap_or_default()
}
