// eb-core/src/docs.rs
//! Listings and overviews: toolchains, easyblocks, easyconfig parameters, constants,
//! templates, licenses, available software and easyconfig search.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use eb_common::easyconfig::constants::easyconfig_constants;
use eb_common::easyconfig::licenses::all_licenses;
use eb_common::easyconfig::params::known_params;
use eb_common::easyconfig::templates::{
    template_constants, TEMPLATE_NAMES_CONFIG, TEMPLATE_NAMES_DYNAMIC, TEMPLATE_NAMES_EASYBLOCK_RUN_STEP,
    TEMPLATE_NAMES_EASYCONFIG, TEMPLATE_NAMES_LOWER, TEMPLATE_SOFTWARE_VERSIONS,
};
use eb_common::error::{EbError, Result};
use eb_common::toolchain::{all_toolchains, TOOLCHAIN_OPTIONS};
use eb_common::version::LooseVersion;
use eb_common::{EasyConfigRepository, InstalledModules};
use regex::RegexBuilder;
use serde::Serialize;
use tracing::{debug, warn};

use crate::easyblocks::{all_easyblocks, BASE_EASYBLOCK};

const INDENT_4SPACES: &str = "    ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocFormat {
    #[default]
    Txt,
    Md,
    Rst,
    Json,
}

impl FromStr for DocFormat {
    type Err = EbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "txt" => Ok(Self::Txt),
            "md" => Ok(Self::Md),
            "rst" => Ok(Self::Rst),
            "json" => Ok(Self::Json),
            other => Err(EbError::Config(format!(
                "Unknown output format '{other}' (use txt, md, rst or json)"
            ))),
        }
    }
}

impl fmt::Display for DocFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Txt => "txt",
            Self::Md => "md",
            Self::Rst => "rst",
            Self::Json => "json",
        })
    }
}

fn json_unsupported(what: &str) -> EbError {
    EbError::Generic(format!("JSON output format not supported for {what}"))
}

/// Markdown table; `columns` holds one vector of cells per column.
fn md_table(titles: &[&str], columns: &[Vec<String>]) -> Vec<String> {
    let row = |cells: Vec<String>| format!("| {} |", cells.join(" | "));
    let mut lines = vec![
        row(titles.iter().map(|t| t.to_string()).collect()),
        row(titles.iter().map(|t| "-".repeat(t.len().max(3))).collect()),
    ];
    let rows = columns.first().map(Vec::len).unwrap_or(0);
    for idx in 0..rows {
        lines.push(row(columns.iter().map(|col| col[idx].clone()).collect()));
    }
    lines
}

/// reStructuredText simple table: columns padded to their widest cell, framed by `=` rules.
fn rst_table(titles: &[&str], columns: &[Vec<String>]) -> Vec<String> {
    let widths: Vec<usize> = titles
        .iter()
        .zip(columns)
        .map(|(title, col)| {
            col.iter()
                .map(|c| c.chars().count())
                .chain([title.chars().count()])
                .max()
                .unwrap_or(0)
        })
        .collect();
    let line = |cells: Vec<&str>, fill: char| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| {
                let mut padded = cell.to_string();
                padded.extend(std::iter::repeat(fill).take(width - cell.chars().count()));
                padded
            })
            .collect::<Vec<_>>()
            .join(INDENT_4SPACES)
    };
    let rule = line(vec![""; titles.len()], '=');
    let mut lines = vec![rule.clone(), line(titles.to_vec(), ' '), rule.clone()];
    let rows = columns.first().map(Vec::len).unwrap_or(0);
    for idx in 0..rows {
        lines.push(line(columns.iter().map(|col| col[idx].as_str()).collect(), ' '));
    }
    lines.push(rule);
    lines.push(String::new());
    lines
}

fn rst_title(title: &str, underline: char) -> Vec<String> {
    vec![
        title.to_string(),
        underline.to_string().repeat(title.chars().count()),
        String::new(),
    ]
}

/// Table under an optional section title, for the markdown and rst formats.
fn titled_table(
    format: DocFormat,
    title: Option<&str>,
    md_level: usize,
    titles: &[&str],
    columns: &[Vec<String>],
) -> Vec<String> {
    let mut doc = Vec::new();
    if format == DocFormat::Rst {
        if let Some(title) = title {
            doc.extend(rst_title(title, '-'));
        }
        doc.extend(rst_table(titles, columns));
    } else {
        if let Some(title) = title {
            doc.push(format!("{} {title}", "#".repeat(md_level)));
            doc.push(String::new());
        }
        doc.extend(md_table(titles, columns));
    }
    doc
}

pub fn list_toolchains(format: DocFormat) -> Result<String> {
    let mut toolchains: Vec<_> = all_toolchains().iter().collect();
    toolchains.sort_by_key(|tc| tc.name.to_lowercase());
    match format {
        DocFormat::Txt => {
            let mut doc = vec!["List of known toolchains (toolchain name: module[, module, ...]):".to_string()];
            for tc in toolchains {
                let mut components: Vec<&str> = tc.components.to_vec();
                components.sort_unstable();
                components.dedup();
                doc.push(format!("\t{}: {}", tc.name, components.join(", ")));
            }
            Ok(doc.join("\n"))
        }
        DocFormat::Md | DocFormat::Rst => {
            let none = || "*(none)*".to_string();
            let columns = vec![
                toolchains.iter().map(|tc| format!("**{}**", tc.name)).collect(),
                toolchains
                    .iter()
                    .map(|tc| tc.compiler.map(|c| c.name().to_string()).unwrap_or_else(none))
                    .collect(),
                toolchains
                    .iter()
                    .map(|tc| tc.mpi.map(|m| m.name().to_string()).unwrap_or_else(none))
                    .collect(),
                toolchains.iter().map(|tc| tc.components.join(", ")).collect(),
            ];
            let doc = titled_table(
                format,
                Some("List of known toolchains"),
                1,
                &["NAME", "COMPILER", "MPI", "COMPONENTS"],
                &columns,
            );
            Ok(doc.join("\n"))
        }
        DocFormat::Json => Err(json_unsupported("--list-toolchains")),
    }
}

/// Options available via `toolchainopts`.
pub fn avail_toolchain_opts(name: &str, format: DocFormat) -> Result<String> {
    if !all_toolchains().iter().any(|tc| tc.name == name) {
        return Err(EbError::NotFound(format!("Couldn't find toolchain: '{name}'")));
    }
    let mut opts: Vec<_> = TOOLCHAIN_OPTIONS.to_vec();
    opts.sort_unstable();
    match format {
        DocFormat::Txt => {
            let mut doc = vec![format!("Available options for {name} toolchain:")];
            for (opt, descr) in opts {
                doc.push(format!("{INDENT_4SPACES}{opt}: {descr}"));
            }
            Ok(doc.join("\n"))
        }
        DocFormat::Md | DocFormat::Rst => {
            let columns = vec![
                opts.iter().map(|(o, _)| format!("``{o}``")).collect(),
                opts.iter().map(|(_, d)| d.to_string()).collect(),
            ];
            let title = format!("Available options for {name} toolchain");
            Ok(titled_table(format, Some(title.as_str()), 2, &["option", "description"], &columns).join("\n"))
        }
        DocFormat::Json => Err(json_unsupported("--avail-toolchain-opts")),
    }
}

struct TreeFormat {
    root: fn(&str, Option<&str>) -> String,
    zero_indent: &'static str,
    indent: &'static str,
    sep: &'static str,
    /// Blank line around every nested list.
    newline: bool,
}

const TXT_TREE: TreeFormat = TreeFormat {
    root: |name, loc| match loc {
        Some(loc) => format!("{name} ({loc})"),
        None => name.to_string(),
    },
    zero_indent: "",
    indent: "|   ",
    sep: "|-- ",
    newline: false,
};

const MD_TREE: TreeFormat = TreeFormat {
    root: |name, loc| match loc {
        Some(loc) => format!("- **{name}** ({loc})"),
        None => format!("- **{name}**"),
    },
    zero_indent: "  ",
    indent: "  ",
    sep: "- ",
    newline: false,
};

const RST_TREE: TreeFormat = TreeFormat {
    root: |name, loc| match loc {
        Some(loc) => format!("* **{name}** ({loc})"),
        None => format!("* **{name}**"),
    },
    zero_indent: "  ",
    indent: "  ",
    sep: "* ",
    newline: true,
};

/// Easyblocks as a class tree below `EasyBlock`.
pub fn list_easyblocks(detailed: bool, format: DocFormat) -> Result<String> {
    let tree = match format {
        DocFormat::Txt => TXT_TREE,
        DocFormat::Md => MD_TREE,
        DocFormat::Rst => RST_TREE,
        DocFormat::Json => return Err(json_unsupported("--list-easyblocks")),
    };
    let mut children: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut locations: BTreeMap<&str, &str> = BTreeMap::new();
    for eb in all_easyblocks() {
        children.entry(eb.parent()).or_default().push(eb.name());
        locations.insert(eb.name(), eb.location());
    }
    for names in children.values_mut() {
        names.sort_by_key(|n| n.to_lowercase());
    }

    let base_loc = detailed.then_some("eb_core::easyblocks");
    let mut lines = vec![(tree.root)(BASE_EASYBLOCK, base_loc)];
    if tree.newline {
        lines.push(String::new());
    }
    add_subtree(&mut lines, &tree, &children, &locations, BASE_EASYBLOCK, detailed, 0);
    if tree.newline {
        lines.push(String::new());
    }
    Ok(lines.join("\n"))
}

fn add_subtree(
    lines: &mut Vec<String>,
    tree: &TreeFormat,
    children: &BTreeMap<&str, Vec<&str>>,
    locations: &BTreeMap<&str, &str>,
    parent: &str,
    detailed: bool,
    depth: usize,
) {
    let Some(names) = children.get(parent) else {
        return;
    };
    for name in names {
        let mut line = format!("{}{}{}{}", tree.zero_indent, tree.indent.repeat(depth), tree.sep, name);
        if detailed {
            if let Some(loc) = locations.get(name) {
                line.push_str(&format!(" ({loc})"));
            }
        }
        lines.push(line);
        let nested = children.get(name).is_some_and(|c| !c.is_empty());
        if nested && tree.newline {
            lines.push(String::new());
        }
        add_subtree(lines, tree, children, locations, name, detailed, depth + 1);
        if nested && tree.newline {
            lines.push(String::new());
        }
    }
}

/// Every known easyconfig parameter, grouped by category.
pub fn avail_easyconfig_params(format: DocFormat) -> Result<String> {
    let mut grouped: BTreeMap<_, Vec<_>> = BTreeMap::new();
    for spec in known_params() {
        grouped.entry(spec.category).or_default().push(spec);
    }
    for params in grouped.values_mut() {
        params.sort_by_key(|p| p.name);
    }
    let title = "Available easyconfig parameters (* indicates specific to the EasyBlock easyblock)";
    let titles = ["**Parameter name**", "**Description**", "**Default value**"];
    match format {
        DocFormat::Txt => {
            let mut doc = vec![format!("{title}:"), String::new()];
            for (category, params) in &grouped {
                doc.push(category.title().to_string());
                doc.push("-".repeat(category.title().len()));
                let width = params.iter().map(|p| p.name.len()).max().unwrap_or(0);
                for p in params {
                    doc.push(format!(
                        "{:<width$}   {} [default: {}]",
                        p.name, p.description, p.default
                    ));
                }
                doc.push(String::new());
            }
            Ok(doc.join("\n"))
        }
        DocFormat::Md => {
            let mut doc = vec![format!("# {title}"), String::new()];
            for (category, params) in &grouped {
                let name = category.title().to_lowercase();
                let mut chars = name.chars();
                let heading = match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                };
                let columns = vec![
                    params.iter().map(|p| format!("`{}`", p.name)).collect(),
                    params
                        .iter()
                        .map(|p| p.description.replace('<', "&lt;").replace('>', "&gt;"))
                        .collect(),
                    params.iter().map(|p| format!("`{}`", p.default)).collect(),
                ];
                let section = format!("{heading} parameters");
                doc.extend(titled_table(format, Some(section.as_str()), 2, &titles, &columns));
                doc.push(String::new());
            }
            Ok(doc.join("\n"))
        }
        DocFormat::Rst => {
            let mut doc = rst_title(title, '=');
            for (category, params) in &grouped {
                let columns = vec![
                    params.iter().map(|p| format!("``{}``", p.name)).collect(),
                    params.iter().map(|p| p.description.to_string()).collect(),
                    params.iter().map(|p| p.default.to_string()).collect(),
                ];
                let section = format!("{} parameters", category.title().to_lowercase());
                doc.extend(titled_table(format, Some(section.as_str()), 2, &titles, &columns));
                doc.push(String::new());
            }
            Ok(doc.join("\n"))
        }
        DocFormat::Json => Err(json_unsupported("--avail-easyconfig-params")),
    }
}

pub fn avail_easyconfig_constants(format: DocFormat) -> Result<String> {
    let mut constants = easyconfig_constants();
    constants.sort_by_key(|(name, _, _)| *name);
    let title = "Constants that can be used in easyconfigs";
    match format {
        DocFormat::Txt => {
            let mut doc = vec![title.to_string()];
            for (name, value, descr) in constants {
                doc.push(format!("{INDENT_4SPACES}{name}: {value} ({descr})"));
            }
            Ok(doc.join("\n"))
        }
        DocFormat::Md | DocFormat::Rst => {
            let columns = vec![
                constants.iter().map(|(n, _, _)| format!("``{n}``")).collect(),
                constants.iter().map(|(_, v, _)| format!("``{v}``")).collect(),
                constants.iter().map(|(_, _, d)| d.to_string()).collect(),
            ];
            let titles = ["Constant name", "Constant value", "Description"];
            Ok(titled_table(format, Some(title), 1, &titles, &columns).join("\n"))
        }
        DocFormat::Json => Err(json_unsupported("--avail-easyconfig-constants")),
    }
}

/// Licenses usable as `software_license`, by constant name.
pub fn avail_easyconfig_licenses(format: DocFormat) -> Result<String> {
    let licenses = all_licenses();
    let title = "License constants that can be used in easyconfigs";
    match format {
        DocFormat::Txt => {
            let mut doc = vec![title.to_string()];
            for license in licenses {
                let version = license
                    .version_string()
                    .map(|v| format!(" (version: {v})"))
                    .unwrap_or_default();
                doc.push(format!(
                    "{INDENT_4SPACES}{}: {}{version}",
                    license.constant_name(),
                    license.description
                ));
            }
            Ok(doc.join("\n"))
        }
        DocFormat::Md | DocFormat::Rst => {
            let columns = vec![
                licenses.iter().map(|l| format!("``{}``", l.constant_name())).collect(),
                licenses.iter().map(|l| l.description.to_string()).collect(),
                licenses
                    .iter()
                    .map(|l| l.version_string().map(|v| format!("``{v}``")).unwrap_or_default())
                    .collect(),
            ];
            let titles = ["License name", "License description", "Version"];
            Ok(titled_table(format, Some(title), 1, &titles, &columns).join("\n"))
        }
        DocFormat::Json => Err(json_unsupported("--avail-easyconfig-licenses")),
    }
}

/// Constants available in configuration files; see `eb_common::config::cfgfile_constants`.
pub fn avail_cfgfile_constants(constants: &[(&str, String, &str)], format: DocFormat) -> Result<String> {
    let mut constants = constants.to_vec();
    constants.sort_by_key(|(name, _, _)| *name);
    let title = "Constants available (only) in configuration files";
    match format {
        DocFormat::Txt => {
            let mut doc = vec![format!("{title}:"), "syntax: %(CONSTANT_NAME)s".to_string(), String::new()];
            for (name, value, help) in &constants {
                doc.push(format!("* {name}: {help} [value: {value}]"));
            }
            Ok(doc.join("\n"))
        }
        DocFormat::Md | DocFormat::Rst => {
            let columns = vec![
                constants.iter().map(|(n, _, _)| format!("``{n}``")).collect(),
                constants.iter().map(|(_, _, h)| h.to_string()).collect(),
                constants.iter().map(|(_, v, _)| format!("``{v}``")).collect(),
            ];
            let titles = ["Constant name", "Constant help", "Constant value"];
            Ok(titled_table(format, Some(title), 1, &titles, &columns).join("\n"))
        }
        DocFormat::Json => Err(json_unsupported("--avail-cfgfile-constants")),
    }
}

struct TemplateGroup {
    title: &'static str,
    rows: Vec<(String, String)>,
}

fn template_groups() -> (Vec<TemplateGroup>, Vec<TemplateGroup>) {
    let described = |names: &[(&str, &str)]| -> Vec<(String, String)> {
        names.iter().map(|(n, d)| (n.to_string(), d.to_string())).collect()
    };
    let mut versions = Vec::new();
    for (name, prefix) in TEMPLATE_SOFTWARE_VERSIONS {
        versions.push((format!("{prefix}majver"), format!("major version for {name}")));
        versions.push((format!("{prefix}shortver"), format!("short version for {name} (<major>.<minor>)")));
        versions.push((format!("{prefix}ver"), format!("full version for {name}")));
    }
    let before = vec![
        TemplateGroup {
            title: "Template names/values derived from easyconfig instance",
            rows: described(TEMPLATE_NAMES_EASYCONFIG),
        },
        TemplateGroup {
            title: "Template names/values for (short) software versions",
            rows: versions,
        },
    ];
    let after = vec![
        TemplateGroup {
            title: "Lowercase values of template values",
            rows: TEMPLATE_NAMES_LOWER
                .iter()
                .map(|n| (format!("{n}lower"), format!("lower case of value of {n}")))
                .collect(),
        },
        TemplateGroup {
            title: "Template values set outside EasyBlock runstep",
            rows: described(TEMPLATE_NAMES_EASYBLOCK_RUN_STEP),
        },
        TemplateGroup {
            title: "Template values which are defined dynamically",
            rows: described(TEMPLATE_NAMES_DYNAMIC),
        },
    ];
    (before, after)
}

/// Template names by group, followed by the template constants.
pub fn avail_easyconfig_templates(format: DocFormat) -> Result<String> {
    let (before, after) = template_groups();
    let config_title = "Template names/values as set in easyconfig";
    let constants_title = "Template constants that can be used in easyconfigs";
    let constants = template_constants();
    match format {
        DocFormat::Txt => {
            let mut doc = Vec::new();
            let push_group = |doc: &mut Vec<String>, group: &TemplateGroup| {
                doc.push(group.title.to_string());
                for (name, descr) in &group.rows {
                    doc.push(format!("{INDENT_4SPACES}%({name})s: {descr}"));
                }
                doc.push(String::new());
            };
            for group in &before {
                push_group(&mut doc, group);
            }
            doc.push(config_title.to_string());
            for name in TEMPLATE_NAMES_CONFIG {
                doc.push(format!("{INDENT_4SPACES}%({name})s"));
            }
            doc.push(String::new());
            for group in &after {
                push_group(&mut doc, group);
            }
            doc.push(constants_title.to_string());
            for (name, value, descr) in &constants {
                doc.push(format!("{INDENT_4SPACES}{name}: {descr} ({})", value.to_plain_string()));
            }
            Ok(doc.join("\n"))
        }
        DocFormat::Md | DocFormat::Rst => {
            let rst = format == DocFormat::Rst;
            let titles = ["Template name", "Template value"];
            let group_table = |group: &TemplateGroup| {
                let columns = vec![
                    group.rows.iter().map(|(n, _)| format!("``%({n})s``")).collect(),
                    group.rows.iter().map(|(_, d)| d.clone()).collect(),
                ];
                let mut doc = titled_table(format, Some(group.title), 2, &titles, &columns);
                if !rst {
                    doc.push(String::new());
                }
                doc
            };
            let mut doc = Vec::new();
            for group in &before {
                doc.extend(group_table(group));
                if rst {
                    doc.push(String::new());
                }
            }
            if rst {
                doc.extend(rst_title(config_title, '-'));
            } else {
                doc.push(format!("## {config_title}"));
                doc.push(String::new());
            }
            for name in TEMPLATE_NAMES_CONFIG {
                doc.push(format!("* ``%({name})s``"));
            }
            doc.push(String::new());
            for group in &after {
                doc.extend(group_table(group));
            }
            let columns = vec![
                constants.iter().map(|(n, _, _)| format!("``{n}``")).collect(),
                constants.iter().map(|(_, _, d)| d.to_string()).collect(),
                constants
                    .iter()
                    .map(|(_, v, _)| format!("``{}``", v.to_plain_string()))
                    .collect(),
            ];
            doc.extend(titled_table(
                format,
                Some(constants_title),
                2,
                &["Constant", "Template description", "Template value"],
                &columns,
            ));
            Ok(doc.join("\n"))
        }
        DocFormat::Json => Err(json_unsupported("--avail-easyconfig-templates")),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SoftwareEntry {
    pub name: String,
    pub version: String,
    pub versionsuffix: String,
    pub toolchain: String,
    pub description: String,
    pub homepage: String,
    #[serde(skip)]
    pub mod_name: String,
}

/// One entry per easyconfig found below the robot paths; unparsable files are skipped.
pub fn collect_software(repository: &EasyConfigRepository) -> BTreeMap<String, Vec<SoftwareEntry>> {
    let mut software: BTreeMap<String, Vec<SoftwareEntry>> = BTreeMap::new();
    let files = repository.all_easyconfig_files();
    debug!("Processing {} easyconfigs", files.len());
    for path in files {
        match repository.load(&path) {
            Ok(ec) => software.entry(ec.name.clone()).or_default().push(SoftwareEntry {
                name: ec.name.clone(),
                version: ec.version.clone(),
                versionsuffix: ec.versionsuffix.clone(),
                toolchain: ec.toolchain.to_string(),
                description: ec.description().split_whitespace().collect::<Vec<_>>().join(" "),
                homepage: ec.homepage(),
                mod_name: ec.full_mod_name(),
            }),
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }
    debug!("Found {} different software packages", software.len());
    software
}

/// Keeps the entries whose module is available in `installed`.
fn retain_installed(
    software: &mut BTreeMap<String, Vec<SoftwareEntry>>,
    installed: &InstalledModules,
) -> Result<()> {
    let available: BTreeSet<String> = installed.list()?.into_iter().map(|m| m.mod_name).collect();
    for entries in software.values_mut() {
        entries.retain(|e| available.contains(&e.mod_name));
    }
    software.retain(|_, entries| !entries.is_empty());
    debug!("Retained {} installed software packages", software.len());
    Ok(())
}

/// Supported software; with `installed`, only software whose module is available.
pub fn list_software(
    repository: &EasyConfigRepository,
    detailed: bool,
    format: DocFormat,
    installed: Option<&InstalledModules>,
) -> Result<String> {
    let mut software = collect_software(repository);
    if let Some(installed) = installed {
        retain_installed(&mut software, installed)?;
    }
    let mut names: Vec<&String> = software.keys().collect();
    names.sort_by_key(|n| n.to_lowercase());

    match format {
        DocFormat::Txt => {
            let mut lines = vec![String::new()];
            for name in names {
                lines.push(format!("* {name}"));
                if detailed {
                    push_detailed(&mut lines, name, &software[name], "  * ", false);
                }
            }
            Ok(lines.join("\n"))
        }
        DocFormat::Md => {
            let mut lines = vec!["# List of supported software".to_string(), String::new()];
            lines.push(format!(
                "eb supports {} different software packages (incl. toolchains, bundles):",
                names.len()
            ));
            lines.push(String::new());
            for name in names {
                if detailed {
                    lines.push(format!("## {name}"));
                    push_detailed(&mut lines, name, &software[name], "* ", true);
                } else {
                    lines.push(format!("* {name}"));
                }
            }
            Ok(lines.join("\n"))
        }
        DocFormat::Rst => Ok(list_software_rst(&software, &names, detailed).join("\n")),
        DocFormat::Json => {
            let entries: Vec<serde_json::Value> = names
                .into_iter()
                .flat_map(|name| {
                    let entries = &software[name];
                    let take = if detailed { entries.len() } else { 1 };
                    entries.iter().take(take).map(move |entry| {
                        if detailed {
                            serde_json::to_value(entry).unwrap_or(serde_json::Value::Null)
                        } else {
                            serde_json::json!({ "name": name })
                        }
                    })
                })
                .collect();
            Ok(serde_json::to_string_pretty(&entries)?)
        }
    }
}

/// Label for cross-references to `name` in rst output.
fn rst_software_ref(name: &str) -> String {
    let sum: u32 = name.chars().map(u32::from).sum();
    format!("list_software_{name}_{sum}")
}

fn list_software_rst(
    software: &BTreeMap<String, Vec<SoftwareEntry>>,
    names: &[&String],
    detailed: bool,
) -> Vec<String> {
    fn initial(name: &str) -> Option<char> {
        name.chars().next().map(|c| c.to_ascii_lowercase())
    }
    let mut lines = rst_title("List of supported software", '=');
    lines.push(format!(
        "eb supports {} different software packages (incl. toolchains, bundles):",
        names.len()
    ));
    lines.push(String::new());
    let letters: BTreeSet<char> = names.iter().filter_map(|n| initial(n)).collect();
    lines.push(
        letters
            .iter()
            .map(|l| format!(":ref:`list_software_letter_{l}`"))
            .collect::<Vec<_>>()
            .join(" - "),
    );
    lines.push(String::new());

    let mut letter = None;
    for name in names {
        if initial(name) != letter {
            letter = initial(name);
            let l = letter.unwrap_or_default();
            lines.extend([
                String::new(),
                format!(".. _list_software_letter_{l}:"),
                String::new(),
                format!("*{}*", l.to_ascii_uppercase()),
                "---".to_string(),
                String::new(),
            ]);
            if detailed {
                let refs: Vec<String> = names
                    .iter()
                    .filter(|n| initial(n) == letter)
                    .map(|n| format!(":ref:`{}`", rst_software_ref(n)))
                    .collect();
                lines.extend([String::new(), refs.join(" - "), String::new()]);
            }
        }
        if !detailed {
            lines.push(format!("* {name}"));
            continue;
        }
        let entries = &software[name.as_str()];
        let Some(last) = entries.last() else {
            continue;
        };
        let rows = version_rows(entries);
        let with_suffix = rows.iter().any(|(_, suffix, _)| !suffix.is_empty());
        let mut titles = vec!["version"];
        let mut columns = vec![rows.iter().map(|(v, _, _)| format!("``{v}``")).collect::<Vec<_>>()];
        if with_suffix {
            titles.push("versionsuffix");
            columns.push(
                rows.iter()
                    .map(|(_, s, _)| if s.is_empty() { String::new() } else { format!("``{s}``") })
                    .collect(),
            );
        }
        titles.push("toolchain");
        columns.push(
            rows.iter()
                .map(|(_, _, tcs)| tcs.iter().map(|tc| format!("``{tc}``")).collect::<Vec<_>>().join(", "))
                .collect(),
        );
        lines.extend([
            String::new(),
            format!(".. _{}:", rst_software_ref(name)),
            String::new(),
            format!("*{name}*"),
            "+".repeat(name.chars().count() + 2),
            String::new(),
            last.description.clone(),
            String::new(),
            format!("*homepage*: {}", last.homepage),
            String::new(),
        ]);
        lines.extend(rst_table(&titles, &columns));
    }
    lines
}

/// Distinct (version, versionsuffix) pairs in version order, with their toolchains.
fn version_rows(entries: &[SoftwareEntry]) -> Vec<(&str, &str, Vec<&str>)> {
    let mut pairs: Vec<(&str, &str)> = entries
        .iter()
        .map(|e| (e.version.as_str(), e.versionsuffix.as_str()))
        .collect();
    pairs.sort_by(|a, b| {
        let va = LooseVersion::parse(a.0).ok();
        let vb = LooseVersion::parse(b.0).ok();
        va.cmp(&vb).then_with(|| a.0.cmp(b.0)).then_with(|| a.1.cmp(b.1))
    });
    pairs.dedup();
    pairs
        .into_iter()
        .map(|(version, suffix)| {
            let mut toolchains: Vec<&str> = entries
                .iter()
                .filter(|e| e.version == version && e.versionsuffix == suffix)
                .map(|e| e.toolchain.as_str())
                .collect();
            toolchains.sort_unstable();
            toolchains.dedup();
            (version, suffix, toolchains)
        })
        .collect()
}

fn push_detailed(lines: &mut Vec<String>, name: &str, entries: &[SoftwareEntry], bullet: &str, md: bool) {
    let Some(last) = entries.last() else {
        return;
    };
    lines.push(String::new());
    lines.push(last.description.clone());
    lines.push(String::new());
    if md {
        lines.push(format!("*homepage*: <{}>", last.homepage));
    } else {
        lines.push(format!("homepage: {}", last.homepage));
    }
    lines.push(String::new());

    for (version, suffix, toolchains) in version_rows(entries) {
        let mut line = format!("{bullet}{name} v{version}");
        if !suffix.is_empty() {
            line.push_str(&format!(" (versionsuffix: '{suffix}')"));
        }
        line.push_str(&format!(": {}", toolchains.join(", ")));
        lines.push(line);
    }
    lines.push(String::new());
}

/// Easyconfig files whose path matches `query` (case-insensitive regex).
pub fn search_easyconfigs(repository: &EasyConfigRepository, query: &str) -> Result<Vec<PathBuf>> {
    let re = RegexBuilder::new(query)
        .case_insensitive(true)
        .build()
        .map_err(|e| EbError::ValidationError(format!("Invalid search pattern '{query}': {e}")))?;
    Ok(repository
        .all_easyconfig_files()
        .into_iter()
        .filter(|path| re.is_match(&path.display().to_string()))
        .collect())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn write_ec(root: &std::path::Path, name: &str, version: &str, tc: &str) {
        let dir = root.join(name.chars().next().unwrap().to_ascii_lowercase().to_string()).join(name);
        fs::create_dir_all(&dir).unwrap();
        let (tc_line, infix) = if tc == "system" {
            ("SYSTEM".to_string(), String::new())
        } else {
            (format!("{{'name': 'GCCcore', 'version': '{tc}'}}"), format!("-GCCcore-{tc}"))
        };
        fs::write(
            dir.join(format!("{name}-{version}{infix}.eb")),
            format!(
                "name = '{name}'\nversion = '{version}'\nhomepage = 'https://example.org/{name}'\n\
                 description = \"\"\"{name} is\n a tool\"\"\"\ntoolchain = {tc_line}\n"
            ),
        )
        .unwrap();
    }

    #[test]
    fn easyblock_tree_txt() {
        let text = list_easyblocks(false, DocFormat::Txt).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "EasyBlock");
        assert!(lines.contains(&"|-- ConfigureMake"));
        assert!(lines.contains(&"|   |-- CMakeMake"));
        assert!(lines.contains(&"|   |-- EB_bzip2"));
        assert!(lines.contains(&"|-- Bundle"));
        assert!(lines.contains(&"|   |-- Toolchain"));
    }

    #[test]
    fn easyblock_tree_detailed_shows_location() {
        let text = list_easyblocks(true, DocFormat::Md).unwrap();
        assert!(text.starts_with("- **EasyBlock** (eb_core::easyblocks)"));
        assert!(text.contains("  - ConfigureMake (eb_core::easyblocks::generic::configuremake)"));
        assert!(list_easyblocks(false, DocFormat::Json).is_err());
    }

    #[test]
    fn toolchain_listing() {
        let text = list_toolchains(DocFormat::Txt).unwrap();
        assert!(text.starts_with("List of known toolchains (toolchain name: module[, module, ...]):"));
        assert!(text.contains("\tfoss: FFTW, FlexiBLAS, GCC, OpenMPI, ScaLAPACK"));
        assert!(list_toolchains(DocFormat::Md).unwrap().contains("| **gompi** | GCC |"));
    }

    #[test]
    fn params_constants_templates() {
        let params = avail_easyconfig_params(DocFormat::Txt).unwrap();
        assert!(params.contains("MANDATORY\n---------\n"));
        assert!(params.contains("configure_cmd"));
        assert!(params.contains("[default: './configure']"));

        let constants = avail_easyconfig_constants(DocFormat::Txt).unwrap();
        assert!(constants.contains("    SOURCE_TAR_GZ: '%(name)s-%(version)s.tar.gz' (Source .tar.gz bundle)"));

        let templates = avail_easyconfig_templates(DocFormat::Txt).unwrap();
        assert!(templates.contains("    %(version_major)s: Major version"));
        assert!(templates.contains("Template values set outside EasyBlock runstep\n    %(builddir)s"));
    }

    #[test]
    fn templates_list_every_group() {
        let text = avail_easyconfig_templates(DocFormat::Txt).unwrap();
        for title in [
            "Template names/values derived from easyconfig instance",
            "Template names/values for (short) software versions",
            "Template names/values as set in easyconfig",
            "Lowercase values of template values",
            "Template values which are defined dynamically",
            "Template constants that can be used in easyconfigs",
        ] {
            assert!(text.contains(title), "missing {title}");
        }
        assert!(text.contains("    %(pyshortver)s: short version for Python (<major>.<minor>)"));
        assert!(text.contains("    %(namelower)s: lower case of value of name"));
        assert!(text.contains("    %(arch)s: System architecture"));
        assert!(text.contains("    SHLIB_EXT: extension for shared libraries ("));

        let md = avail_easyconfig_templates(DocFormat::Md).unwrap();
        assert!(md.contains("## Template constants that can be used in easyconfigs"));
        assert!(md.contains("| ``%(pymajver)s`` | major version for Python |"));
        let rst = avail_easyconfig_templates(DocFormat::Rst).unwrap();
        assert!(rst.contains("Template values which are defined dynamically\n---------------------------------------------\n"));
        assert!(rst.contains("* ``%(versionsuffix)s``"));
    }

    #[test]
    fn rst_tables_are_aligned() {
        let table = rst_table(
            &["name", "description"],
            &[vec!["``GCC``".to_string()], vec!["compiler".to_string()]],
        );
        assert_eq!(
            table,
            vec![
                "=======    ===========",
                "name       description",
                "=======    ===========",
                "``GCC``    compiler   ",
                "=======    ===========",
                "",
            ]
        );
        let toolchains = list_toolchains(DocFormat::Rst).unwrap();
        assert!(toolchains.starts_with("List of known toolchains\n------------------------\n\n===="));
        assert!(toolchains.contains("**gompi**"));
    }

    #[test]
    fn rst_easyblock_tree_has_blank_lines_around_nesting() {
        let text = list_easyblocks(false, DocFormat::Rst).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "* **EasyBlock**");
        assert_eq!(lines[1], "");
        let configure = lines.iter().position(|l| *l == "  * ConfigureMake").unwrap();
        assert_eq!(lines[configure + 1], "");
        assert_eq!(lines[configure + 2], "    * CMakeMake");
    }

    #[test]
    fn license_listing() {
        let text = avail_easyconfig_licenses(DocFormat::Txt).unwrap();
        assert!(text.starts_with("License constants that can be used in easyconfigs\n"));
        assert!(text.contains("    LicenseGPLv3: The GNU General Public License"));
        assert!(text.contains("(version: 3)"));
        assert!(text.contains("    LicenseMIT: The MIT license, a short permissive license.\n"));

        let md = avail_easyconfig_licenses(DocFormat::Md).unwrap();
        assert!(md.contains("| ``LicenseLGPLv2_1`` |"));
        assert!(md.contains("| ``2.1`` |"));
        assert!(avail_easyconfig_licenses(DocFormat::Json).is_err());
    }

    #[test]
    fn cfgfile_constant_listing() {
        let constants = eb_common::config::cfgfile_constants(std::path::Path::new("/home/test"));
        let text = avail_cfgfile_constants(&constants, DocFormat::Txt).unwrap();
        assert!(text.starts_with("Constants available (only) in configuration files:\nsyntax: %(CONSTANT_NAME)s\n"));
        assert!(text.contains("* HOME: Current user's home directory, expanded '~' [value: /home/test]"));
        let first = text.find("* DEFAULT_REPOSITORYPATH").unwrap();
        assert!(first < text.find("* USER").unwrap());

        let rst = avail_cfgfile_constants(&constants, DocFormat::Rst).unwrap();
        assert!(rst.contains("``/home/test/.local/easybuild/easyconfigs``"));
    }

    #[test]
    fn software_listing_formats() {
        let tmp = tempfile::tempdir().unwrap();
        write_ec(tmp.path(), "zlib", "1.2.13", "12.3.0");
        write_ec(tmp.path(), "zlib", "1.2.9", "system");
        write_ec(tmp.path(), "bzip2", "1.0.8", "12.3.0");
        let repo = EasyConfigRepository::with_paths(vec![tmp.path().to_path_buf()]);

        let simple = list_software(&repo, false, DocFormat::Txt, None).unwrap();
        assert_eq!(simple, "\n* bzip2\n* zlib");

        let detailed = list_software(&repo, true, DocFormat::Txt, None).unwrap();
        assert!(detailed.contains("zlib is a tool"));
        assert!(detailed.contains("homepage: https://example.org/zlib"));
        let v9 = detailed.find("  * zlib v1.2.9: system").unwrap();
        let v13 = detailed.find("  * zlib v1.2.13: GCCcore/12.3.0").unwrap();
        assert!(v9 < v13);

        let json: serde_json::Value =
            serde_json::from_str(&list_software(&repo, false, DocFormat::Json, None).unwrap()).unwrap();
        assert_eq!(json, serde_json::json!([{ "name": "bzip2" }, { "name": "zlib" }]));
    }

    #[test]
    fn installed_software_only() {
        let tmp = tempfile::tempdir().unwrap();
        let ecs = tmp.path().join("ecs");
        write_ec(&ecs, "zlib", "1.2.13", "12.3.0");
        write_ec(&ecs, "zlib", "1.2.9", "system");
        write_ec(&ecs, "bzip2", "1.0.8", "12.3.0");
        let repo = EasyConfigRepository::with_paths(vec![ecs]);

        let modules = tmp.path().join("modules");
        fs::create_dir_all(modules.join("zlib")).unwrap();
        fs::write(modules.join("zlib/1.2.13-GCCcore-12.3.0"), "#%Module\n").unwrap();
        let installed = InstalledModules::with_paths(vec![modules], tmp.path().join("software"));

        let simple = list_software(&repo, false, DocFormat::Txt, Some(&installed)).unwrap();
        assert_eq!(simple, "\n* zlib");
        let detailed = list_software(&repo, true, DocFormat::Txt, Some(&installed)).unwrap();
        assert!(detailed.contains("  * zlib v1.2.13: GCCcore/12.3.0"));
        assert!(!detailed.contains("v1.2.9"));
    }

    #[test]
    fn software_listing_rst() {
        let tmp = tempfile::tempdir().unwrap();
        write_ec(tmp.path(), "zlib", "1.2.13", "12.3.0");
        write_ec(tmp.path(), "bzip2", "1.0.8", "system");
        let repo = EasyConfigRepository::with_paths(vec![tmp.path().to_path_buf()]);

        let simple = list_software(&repo, false, DocFormat::Rst, None).unwrap();
        assert!(simple.starts_with("List of supported software\n==========================\n"));
        assert!(simple.contains(":ref:`list_software_letter_b` - :ref:`list_software_letter_z`"));
        assert!(simple.contains(".. _list_software_letter_z:\n\n*Z*\n---\n\n* zlib"));

        let detailed = list_software(&repo, true, DocFormat::Rst, None).unwrap();
        assert!(detailed.contains(&format!(".. _{}:", rst_software_ref("zlib"))));
        assert!(detailed.contains("*zlib*\n++++++\n"));
        assert!(detailed.contains("``1.2.13``    ``GCCcore/12.3.0``"));
    }

    #[test]
    fn search_by_regex() {
        let tmp = tempfile::tempdir().unwrap();
        write_ec(tmp.path(), "zlib", "1.2.13", "12.3.0");
        write_ec(tmp.path(), "bzip2", "1.0.8", "12.3.0");
        let repo = EasyConfigRepository::with_paths(vec![tmp.path().to_path_buf()]);
        let hits = search_easyconfigs(&repo, "ZLIB-1\\.2").unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].ends_with("zlib-1.2.13-GCCcore-12.3.0.eb"));
        assert!(search_easyconfigs(&repo, "(").is_err());
    }
}
