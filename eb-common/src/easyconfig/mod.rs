// eb-common/src/easyconfig/mod.rs
//! Easyconfig files: evaluation, validation and template-aware access to their
//! parameters.
pub mod constants;
pub mod licenses;
pub mod params;
pub mod parser;
pub mod templates;
pub mod value;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::debug;

use self::params::{is_known_param, known_params, param_spec, ParamCategory};
use self::parser::parse_assignments;
use self::licenses::license_by_name;
use self::templates::{
    resolve_template, resolve_value, software_version_templates, TemplateValues, TEMPLATE_NAMES_LOWER,
};
pub use self::value::Value;
use crate::dependency::{det_version_string, Dependency, DependencyTag};
use crate::error::{EbError, Result};
use crate::toolchain::{ToolchainSpec, DUMMY_TOOLCHAIN_NAME, SYSTEM_TOOLCHAIN_NAME};

pub const EASYCONFIG_EXT: &str = ".eb";

/// Checksum types accepted in `(type, value)` checksum tuples.
const CHECKSUM_TYPES: &[&str] = &["adler32", "crc32", "md5", "sha1", "sha256", "sha512", "size"];

/// Use of deprecated functionality found while evaluating an easyconfig; reported
/// through `Config::log_deprecated` by whoever loads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deprecation {
    pub msg: String,
    pub removal_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub filename: String,
    /// Name of the file on the download server, when it differs from `filename`.
    pub download_filename: Option<String>,
    pub source_urls: Vec<String>,
    pub extract_cmd: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchFile {
    pub filename: String,
    pub level: Option<u32>,
    /// Directory (relative to the unpacked sources) the patch applies in.
    pub subdir: Option<String>,
}

/// `sanity_check_paths`; every inner vector lists alternatives of which one must exist.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SanityCheckPaths {
    pub files: Vec<Vec<String>>,
    pub dirs: Vec<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct EasyConfig {
    pub path: Option<PathBuf>,
    pub name: String,
    pub version: String,
    pub versionsuffix: String,
    pub toolchain: ToolchainSpec,
    params: BTreeMap<String, Value>,
    templates: TemplateValues,
    deprecations: Vec<Deprecation>,
}

pub fn parse_easyconfig(path: &Path) -> Result<EasyConfig> {
    debug!("Parsing easyconfig {}", path.display());
    let src = fs::read_to_string(path).map_err(|e| {
        EbError::NotFound(format!("Failed to read easyconfig {}: {}", path.display(), e))
    })?;
    EasyConfig::from_source(&src, Some(path))
}

impl FromStr for EasyConfig {
    type Err = EbError;

    fn from_str(src: &str) -> Result<Self> {
        Self::from_source(src, None)
    }
}

fn toolchain_from_value(
    value: &Value,
    deprecations: &mut Vec<Deprecation>,
) -> std::result::Result<ToolchainSpec, String> {
    match value {
        Value::Bool(true) => Ok(ToolchainSpec::system()),
        Value::Dict(_) => {
            let name = value
                .dict_get("name")
                .and_then(Value::as_str)
                .ok_or("toolchain specification lacks a 'name' string")?;
            let version = value
                .dict_get("version")
                .map(Value::to_plain_string)
                .ok_or("toolchain specification lacks a 'version'")?;
            match name {
                SYSTEM_TOOLCHAIN_NAME => Ok(ToolchainSpec::system()),
                DUMMY_TOOLCHAIN_NAME => {
                    deprecations.push(Deprecation {
                        msg: "Use of 'dummy' toolchain is deprecated, use 'system' toolchain instead"
                            .to_string(),
                        removal_version: "5.0".to_string(),
                    });
                    Ok(ToolchainSpec::system())
                }
                _ => Ok(ToolchainSpec::new(name, version)),
            }
        }
        other => Err(format!(
            "toolchain must be SYSTEM or a dict with 'name' and 'version', found {other}"
        )),
    }
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::None => Vec::new(),
        Value::Str(s) if s.is_empty() => Vec::new(),
        Value::Str(s) => vec![s.clone()],
        Value::List(items) | Value::Tuple(items) => {
            items.iter().map(Value::to_plain_string).collect()
        }
        other => vec![other.to_plain_string()],
    }
}

impl EasyConfig {
    pub fn from_source(src: &str, path: Option<&Path>) -> Result<Self> {
        let label = path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<string>".to_string());
        let assignments = parse_assignments(src).map_err(|e| EbError::EasyConfigParse {
            file: label.clone(),
            line: e.line,
            msg: e.msg,
        })?;

        let mut params = BTreeMap::new();
        for (key, value, line) in assignments {
            if !is_known_param(&key) {
                return Err(EbError::EasyConfigParse {
                    file: label,
                    line,
                    msg: format!("unknown easyconfig parameter '{key}'"),
                });
            }
            if !key.starts_with("local_") {
                params.insert(key, value);
            }
        }

        let invalid = |msg: String| EbError::EasyConfig(label.clone(), msg);
        for spec in known_params()
            .iter()
            .filter(|p| p.category == ParamCategory::Mandatory)
        {
            if params.get(spec.name).is_none_or(Value::is_none) {
                return Err(invalid(format!(
                    "mandatory parameter '{}' not provided",
                    spec.name
                )));
            }
        }

        let name = match params.get("name") {
            Some(Value::Str(s)) if !s.is_empty() => s.clone(),
            _ => return Err(invalid("'name' must be a non-empty string".to_string())),
        };
        let version = match params.get("version") {
            Some(Value::Str(s)) if !s.is_empty() => s.clone(),
            _ => return Err(invalid("'version' must be a non-empty string".to_string())),
        };
        let mut deprecations = Vec::new();
        let toolchain = params
            .get("toolchain")
            .map(|v| toolchain_from_value(v, &mut deprecations))
            .transpose()
            .map_err(invalid)?
            .unwrap_or_else(ToolchainSpec::system);

        let mut templates = TemplateValues::new();
        templates.insert("name".to_string(), name.clone());
        templates.insert("namelower".to_string(), name.to_lowercase());
        templates.insert(
            "nameletter".to_string(),
            name.chars().next().map(String::from).unwrap_or_default(),
        );
        templates.insert("version".to_string(), version.clone());
        let mut parts = version.split('.');
        if let Some(major) = parts.next() {
            templates.insert("version_major".to_string(), major.to_string());
            if let Some(minor) = parts.next() {
                templates.insert("version_minor".to_string(), minor.to_string());
                templates.insert(
                    "version_major_minor".to_string(),
                    format!("{major}.{minor}"),
                );
            }
        }
        templates.insert("toolchain_name".to_string(), toolchain.name.clone());
        templates.insert("toolchain_version".to_string(), toolchain.version.clone());
        let github_account = match params.get("github_account") {
            Some(Value::Str(s)) => resolve_template(s, &templates),
            _ => name.to_lowercase(),
        };
        templates.insert("github_account".to_string(), github_account);
        let versionsuffix = match params.get("versionsuffix") {
            Some(Value::Str(s)) => resolve_template(s, &templates),
            Some(Value::None) | None => String::new(),
            Some(other) => {
                return Err(invalid(format!(
                    "'versionsuffix' must be a string, found {other}"
                )))
            }
        };
        templates.insert("versionsuffix".to_string(), versionsuffix.clone());
        for key in TEMPLATE_NAMES_LOWER {
            if let Some(value) = templates.get(*key).map(|v| v.to_lowercase()) {
                templates.insert(format!("{key}lower"), value);
            }
        }
        templates.insert("arch".to_string(), std::env::consts::ARCH.to_string());

        if let Some(license) = params.get("software_license") {
            match license {
                Value::None => {}
                Value::Str(name) if license_by_name(name).is_some() => {}
                other => return Err(invalid(format!("Invalid license {other}"))),
            }
        }

        let mut ec = Self {
            path: path.map(Path::to_path_buf),
            name,
            version,
            versionsuffix,
            toolchain,
            params,
            templates,
            deprecations,
        };
        // Surface malformed dependency specifications at load time.
        let deps = ec.dependencies()?;
        let build_deps = ec.builddependencies()?;
        let versions = software_version_templates(
            std::iter::once((ec.name.as_str(), ec.version.as_str())).chain(
                deps.iter()
                    .chain(&build_deps)
                    .map(|d| (d.name.as_str(), d.version.as_str())),
            ),
        );
        ec.templates.extend(versions);
        debug!("Loaded easyconfig for {}", ec.full_mod_name());
        Ok(ec)
    }

    fn invalid(&self, msg: impl Into<String>) -> EbError {
        EbError::EasyConfig(self.label(), msg.into())
    }

    fn label(&self) -> String {
        self.path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| self.filename())
    }

    pub fn deprecations(&self) -> &[Deprecation] {
        &self.deprecations
    }

    pub fn version_string(&self) -> String {
        det_version_string(&self.version, &self.toolchain, &self.versionsuffix)
    }

    pub fn full_mod_name(&self) -> String {
        format!("{}/{}", self.name, self.version_string())
    }

    pub fn filename(&self) -> String {
        format!("{}-{}{}", self.name, self.version_string(), EASYCONFIG_EXT)
    }

    /// Makes `%(key)s` available to later reads, e.g. `installdir` once it is known.
    pub fn set_template(&mut self, key: &str, value: impl Into<String>) {
        self.templates.insert(key.to_string(), value.into());
    }

    /// Value as written in the file, before template resolution.
    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Parameter value with templates resolved, falling back to the parameter default.
    pub fn get(&self, key: &str) -> Value {
        let value = match self.params.get(key) {
            Some(v) => v.clone(),
            None => param_spec(key).map(|p| p.default).unwrap_or(Value::None),
        };
        resolve_value(&value, &self.templates)
    }

    pub fn get_str(&self, key: &str) -> String {
        match self.get(key) {
            Value::None => String::new(),
            other => other.to_plain_string(),
        }
    }

    pub fn get_opt_str(&self, key: &str) -> Option<String> {
        match self.get(key) {
            Value::None => None,
            other => Some(other.to_plain_string()),
        }
    }

    /// A string or a list of strings, as a list.
    pub fn get_str_list(&self, key: &str) -> Vec<String> {
        string_list(&self.get(key))
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).truthy()
    }

    /// Parameters that are set, resolved, in name order.
    pub fn params(&self) -> Vec<(String, Value)> {
        self.params
            .keys()
            .map(|k| (k.clone(), self.get(k)))
            .collect()
    }

    pub fn description(&self) -> String {
        self.get_str("description").trim().to_string()
    }

    pub fn homepage(&self) -> String {
        self.get_str("homepage")
    }

    pub fn moduleclass(&self) -> String {
        self.get_str("moduleclass")
    }

    pub fn easyblock(&self) -> Option<String> {
        self.get_opt_str("easyblock").filter(|s| !s.is_empty())
    }

    pub fn skipsteps(&self) -> Vec<String> {
        self.get_str_list("skipsteps")
    }

    /// Build parallelism: `parallel` if set, else `default`, capped by `maxparallel`.
    pub fn parallel(&self, default: usize) -> usize {
        let as_usize = |v: Value| match v {
            Value::Int(i) if i > 0 => Some(i as usize),
            _ => None,
        };
        let mut parallel = as_usize(self.get("parallel")).unwrap_or(default);
        if let Some(max) = as_usize(self.get("maxparallel")) {
            parallel = parallel.min(max);
        }
        parallel.max(1)
    }

    pub fn toolchainopts(&self) -> BTreeMap<String, String> {
        self.get("toolchainopts")
            .as_dict()
            .map(|items| {
                items
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_plain_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn source_urls(&self) -> Vec<String> {
        self.get_str_list("source_urls")
    }

    pub fn sources(&self) -> Result<Vec<SourceFile>> {
        let value = self.get("sources");
        let items = match &value {
            Value::None => return Ok(Vec::new()),
            Value::Str(_) => std::slice::from_ref(&value),
            other => other
                .as_seq()
                .ok_or_else(|| self.invalid("'sources' must be a list"))?,
        };
        items
            .iter()
            .map(|item| match item {
                Value::Str(s) => Ok(SourceFile {
                    filename: s.clone(),
                    download_filename: None,
                    source_urls: Vec::new(),
                    extract_cmd: None,
                }),
                Value::Dict(_) => {
                    let filename = item
                        .dict_get("filename")
                        .and_then(Value::as_str)
                        .ok_or_else(|| self.invalid("source spec dict lacks 'filename'"))?;
                    Ok(SourceFile {
                        filename: filename.to_string(),
                        download_filename: item
                            .dict_get("download_filename")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        source_urls: item.dict_get("source_urls").map(string_list).unwrap_or_default(),
                        extract_cmd: item
                            .dict_get("extract_cmd")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    })
                }
                other => Err(self.invalid(format!("invalid source spec {other}"))),
            })
            .collect()
    }

    pub fn patches(&self) -> Result<Vec<PatchFile>> {
        let value = self.get("patches");
        let Some(items) = value.as_seq() else {
            return match value {
                Value::None => Ok(Vec::new()),
                other => Err(self.invalid(format!("'patches' must be a list, found {other}"))),
            };
        };
        items
            .iter()
            .map(|item| match item {
                Value::Str(s) => Ok(PatchFile {
                    filename: s.clone(),
                    level: None,
                    subdir: None,
                }),
                Value::Tuple(parts) | Value::List(parts) if parts.len() == 2 => {
                    let filename = parts[0]
                        .as_str()
                        .ok_or_else(|| self.invalid(format!("invalid patch spec {item}")))?;
                    let (level, subdir) = match &parts[1] {
                        Value::Int(l) if *l >= 0 => (Some(*l as u32), None),
                        Value::Str(dir) => (None, Some(dir.clone())),
                        _ => return Err(self.invalid(format!("invalid patch spec {item}"))),
                    };
                    Ok(PatchFile {
                        filename: filename.to_string(),
                        level,
                        subdir,
                    })
                }
                Value::Dict(_) => {
                    let filename = item
                        .dict_get("name")
                        .or_else(|| item.dict_get("filename"))
                        .and_then(Value::as_str)
                        .ok_or_else(|| self.invalid(format!("invalid patch spec {item}")))?;
                    let level = match item.dict_get("level") {
                        Some(Value::Int(l)) if *l >= 0 => Some(*l as u32),
                        _ => None,
                    };
                    Ok(PatchFile {
                        filename: filename.to_string(),
                        level,
                        subdir: item
                            .dict_get("sourcepath")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    })
                }
                other => Err(self.invalid(format!("invalid patch spec {other}"))),
            })
            .collect()
    }

    /// Accepted SHA-256 digests of the `index`-th source/patch file (sources first, then
    /// patches). Several entries are alternatives; empty when nothing is specified.
    pub fn checksums_for(&self, index: usize, filename: &str) -> Vec<String> {
        fn collect(entry: &Value, filename: &str, out: &mut Vec<String>) {
            match entry {
                Value::Str(s) if !s.is_empty() => out.push(s.clone()),
                Value::Tuple(parts)
                    if parts.len() == 2
                        && parts[0].as_str().is_some_and(|t| CHECKSUM_TYPES.contains(&t)) =>
                {
                    if parts[0].as_str() == Some("sha256") {
                        if let Some(digest) = parts[1].as_str() {
                            out.push(digest.to_string());
                        }
                    }
                }
                Value::Dict(_) => {
                    if let Some(v) = entry.dict_get(filename) {
                        collect(v, filename, out);
                    }
                }
                Value::List(alternatives) | Value::Tuple(alternatives) => {
                    for alternative in alternatives {
                        collect(alternative, filename, out);
                    }
                }
                _ => {}
            }
        }
        let checksums = self.get("checksums");
        let mut found = Vec::new();
        if let Some(entry) = checksums.as_seq().and_then(|entries| entries.get(index)) {
            collect(entry, filename, &mut found);
        }
        found
    }

    /// `None` when the easyconfig does not set any paths and the easyblock default applies.
    pub fn sanity_check_paths(&self) -> Result<Option<SanityCheckPaths>> {
        let value = self.get("sanity_check_paths");
        let Some(items) = value.as_dict() else {
            return match value {
                Value::None => Ok(None),
                other => Err(self.invalid(format!(
                    "'sanity_check_paths' must be a dict, found {other}"
                ))),
            };
        };
        if items.is_empty() {
            return Ok(None);
        }
        let mut paths = SanityCheckPaths::default();
        for (key, entries) in items {
            let entries: Vec<Vec<String>> = entries
                .as_seq()
                .ok_or_else(|| self.invalid(format!("sanity_check_paths['{key}'] must be a list")))?
                .iter()
                .map(|entry| match entry {
                    Value::Tuple(alts) | Value::List(alts) => {
                        alts.iter().map(Value::to_plain_string).collect()
                    }
                    other => vec![other.to_plain_string()],
                })
                .collect();
            match key.as_str() {
                "files" => paths.files = entries,
                "dirs" => paths.dirs = entries,
                other => {
                    return Err(self.invalid(format!(
                        "unknown key '{other}' in sanity_check_paths, expected 'files' and 'dirs'"
                    )))
                }
            }
        }
        Ok(Some(paths))
    }

    pub fn sanity_check_commands(&self) -> Vec<String> {
        let value = self.get("sanity_check_commands");
        let Some(items) = value.as_seq() else {
            return string_list(&value);
        };
        items
            .iter()
            .map(|item| match item {
                Value::Tuple(parts) if parts.len() == 2 => format!(
                    "{} {}",
                    parts[0].to_plain_string(),
                    parts[1].to_plain_string()
                ),
                other => other.to_plain_string(),
            })
            .collect()
    }

    pub fn modextravars(&self) -> Vec<(String, String)> {
        self.get("modextravars")
            .as_dict()
            .map(|items| {
                items
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_plain_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn modextrapaths(&self) -> Vec<(String, Vec<String>)> {
        self.get("modextrapaths")
            .as_dict()
            .map(|items| {
                items
                    .iter()
                    .map(|(k, v)| (k.clone(), string_list(v)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn whatis(&self) -> Vec<String> {
        self.get_str_list("whatis")
    }

    /// Runtime dependencies declared in `dependencies`.
    pub fn dependencies(&self) -> Result<Vec<Dependency>> {
        self.parse_dependency_list("dependencies", DependencyTag::RUNTIME)
    }

    pub fn builddependencies(&self) -> Result<Vec<Dependency>> {
        self.parse_dependency_list("builddependencies", DependencyTag::BUILD)
    }

    /// The toolchain as a dependency of its own; `None` for the system toolchain.
    pub fn toolchain_dependency(&self) -> Option<Dependency> {
        if self.toolchain.is_system() {
            return None;
        }
        Some(
            Dependency::new_runtime(
                self.toolchain.name.clone(),
                self.toolchain.version.clone(),
                ToolchainSpec::system(),
            )
            .with_tags(DependencyTag::TOOLCHAIN | DependencyTag::RUNTIME),
        )
    }

    /// Toolchain, build and runtime dependencies, in that order.
    pub fn all_dependencies(&self) -> Result<Vec<Dependency>> {
        let mut deps: Vec<Dependency> = self.toolchain_dependency().into_iter().collect();
        deps.extend(self.builddependencies()?);
        deps.extend(self.dependencies()?);
        Ok(deps)
    }

    fn parse_dependency_list(&self, key: &str, tags: DependencyTag) -> Result<Vec<Dependency>> {
        let value = self.get(key);
        let items = match &value {
            Value::None => return Ok(Vec::new()),
            other => other
                .as_seq()
                .ok_or_else(|| self.invalid(format!("'{key}' must be a list, found {other}")))?,
        };
        items
            .iter()
            .map(|item| self.parse_dependency(item, tags))
            .collect()
    }

    fn parse_dependency(&self, item: &Value, tags: DependencyTag) -> Result<Dependency> {
        let bad = || self.invalid(format!("invalid dependency specification {item}"));
        let parts = item.as_seq().ok_or_else(bad)?;
        if parts.len() < 2 || parts.len() > 4 {
            return Err(bad());
        }
        let name = parts[0].as_str().ok_or_else(bad)?.to_string();
        let version = match &parts[1] {
            Value::Str(s) => s.clone(),
            Value::Int(_) | Value::Float(_) => parts[1].to_plain_string(),
            _ => return Err(bad()),
        };
        let versionsuffix = match parts.get(2) {
            None | Some(Value::None) => String::new(),
            Some(Value::Str(s)) => s.clone(),
            Some(_) => return Err(bad()),
        };
        let (toolchain, toolchain_inherited) = match parts.get(3) {
            None => (self.toolchain.clone(), true),
            Some(tc) => {
                let mut ignored = Vec::new();
                let spec = toolchain_from_value(tc, &mut ignored)
                    .map_err(|e| self.invalid(format!("dependency {name}: {e}")))?;
                (spec, false)
            }
        };
        Ok(Dependency {
            name,
            version,
            versionsuffix,
            toolchain,
            toolchain_inherited,
            tags,
        })
    }
}
