// eb/src/cli/info.rs
//! `--version`, `--show-system-info`, `--check-eb-deps` and `--show-config`.
use colored::Colorize;
use eb_common::config::Config;
use eb_common::error::{EbError, Result};
use eb_core::check::eb_deps::all_required_found;
use eb_core::check::{check_eb_deps, hostname, SystemInfo, ToolCheck};
use eb_core::docs::DocFormat;
use eb_core::EB_VERSION;
use prettytable::{format, Cell, Row, Table};

use super::CliArgs;

pub fn version_line() -> String {
    format!(
        "This is eb {EB_VERSION} (framework: {EB_VERSION}, easyblocks: {EB_VERSION}) on host {}.",
        hostname()
    )
}

pub fn run(args: &CliArgs, config: &Config) -> Result<()> {
    let json = args.output_format == DocFormat::Json;
    if args.show_system_info {
        let info = SystemInfo::gather(config);
        if json {
            println!("{}", serde_json::to_string_pretty(&info)?);
        } else {
            print!("{}", info.render());
        }
    }
    if args.show_config {
        print!("{}", show_config(config));
    }
    if args.check_eb_deps {
        let checks = check_eb_deps(config);
        if json {
            println!("{}", serde_json::to_string_pretty(&checks)?);
        } else {
            print_eb_deps(&checks);
        }
        if !all_required_found(&checks) {
            let missing: Vec<&str> = checks
                .iter()
                .filter(|c| c.required && c.is_missing())
                .map(|c| c.name.as_str())
                .collect();
            return Err(EbError::NotFound(format!(
                "Required external tools not found: {}",
                missing.join(", ")
            )));
        }
    }
    Ok(())
}

/// `key (S) = value` lines with aligned keys, `S` naming where the value came from.
pub fn show_config(config: &Config) -> String {
    let rows = config.show_config_rows();
    let width = rows.iter().map(|(key, _, _)| key.len()).max().unwrap_or(0);
    let mut out = String::from(
        "#\n# Current eb configuration\n# (C: command line argument, D: default value, E: environment variable, F: configuration file)\n#\n",
    );
    for (key, source, value) in rows {
        out.push_str(&format!("{key:<width$} ({}) = {value}\n", source.marker()));
    }
    out
}

fn print_eb_deps(checks: &[ToolCheck]) {
    for (title, required) in [("Required dependencies:", true), ("Optional dependencies:", false)] {
        println!("{}", title.bold());
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_CLEAN);
        for check in checks.iter().filter(|c| c.required == required) {
            let status = if check.is_missing() {
                if required {
                    Cell::new("NOT FOUND").style_spec("Fr")
                } else {
                    Cell::new("not found").style_spec("Fy")
                }
            } else {
                Cell::new("OK").style_spec("Fg")
            };
            let version = match &check.status {
                eb_core::check::ToolStatus::Found(Some(v)) => v.clone(),
                _ => "-".to_string(),
            };
            let path = check
                .path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            table.add_row(Row::new(vec![
                Cell::new(&format!("* {}", check.name)),
                Cell::new(&version),
                status,
                Cell::new(&path),
            ]));
        }
        table.printstd();
        println!();
    }
}
