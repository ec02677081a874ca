// eb-core/src/check/system_info.rs
use std::env::consts;

use eb_aio::process::run_command_sync;
use eb_common::config::Config;
use serde::Serialize;
use sysinfo::System;
use tracing::debug;

use crate::modules_tool::modules_tool;

const UNKNOWN: &str = "UNKNOWN";

#[derive(Debug, Clone, Serialize)]
pub struct OsInfo {
    pub name: String,
    pub os_type: String,
    pub version: String,
    pub kernel: String,
    pub platform_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CpuInfo {
    pub vendor: String,
    pub arch: String,
    pub model: String,
    /// Maximum frequency over all cores, in MHz.
    pub speed_mhz: u64,
    pub cores: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SoftwareInfo {
    pub glibc_version: String,
    pub modules_tool: String,
    pub modules_tool_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub hostname: String,
    pub os: OsInfo,
    pub cpu: CpuInfo,
    pub software: SoftwareInfo,
}

impl SystemInfo {
    /// Inspects the host. Anything that can't be determined is reported as `UNKNOWN`.
    pub fn gather(config: &Config) -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        let cpus = sys.cpus();
        let first = cpus.first();

        let tool = modules_tool(config);
        let modules_tool_version = tool.version().unwrap_or_else(|e| {
            debug!("Could not determine modules tool version: {}", e);
            UNKNOWN.to_string()
        });

        Self {
            hostname: hostname(),
            os: OsInfo {
                name: System::name().unwrap_or_else(|| UNKNOWN.to_string()),
                os_type: os_type().to_string(),
                version: System::os_version().unwrap_or_else(|| UNKNOWN.to_string()),
                kernel: System::kernel_version().unwrap_or_else(|| UNKNOWN.to_string()),
                platform_name: platform_name(),
            },
            cpu: CpuInfo {
                vendor: first
                    .map(|c| c.vendor_id().to_string())
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| UNKNOWN.to_string()),
                arch: consts::ARCH.to_string(),
                model: first
                    .map(|c| c.brand().trim().to_string())
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| UNKNOWN.to_string()),
                speed_mhz: cpus.iter().map(|c| c.frequency()).max().unwrap_or(0),
                cores: num_cpus::get(),
            },
            software: SoftwareInfo {
                glibc_version: glibc_version().unwrap_or_else(|| UNKNOWN.to_string()),
                modules_tool: tool.name(),
                modules_tool_version,
            },
        }
    }

    pub fn render(&self) -> String {
        let mut out = format!("System information ({}):\n\n", self.hostname);
        out.push_str("* OS:\n");
        push_field(&mut out, "name", &self.os.name);
        push_field(&mut out, "type", &self.os.os_type);
        push_field(&mut out, "version", &self.os.version);
        push_field(&mut out, "kernel", &self.os.kernel);
        push_field(&mut out, "platform name", &self.os.platform_name);
        out.push_str("* CPU:\n");
        push_field(&mut out, "vendor", &self.cpu.vendor);
        push_field(&mut out, "architecture", &self.cpu.arch);
        push_field(&mut out, "model", &self.cpu.model);
        let speed = if self.cpu.speed_mhz == 0 {
            UNKNOWN.to_string()
        } else {
            format!("{} MHz", self.cpu.speed_mhz)
        };
        push_field(&mut out, "speed", &speed);
        push_field(&mut out, "cores", &self.cpu.cores.to_string());
        out.push_str("* Software:\n");
        push_field(&mut out, "glibc version", &self.software.glibc_version);
        push_field(
            &mut out,
            "modules tool",
            &format!(
                "{} {}",
                self.software.modules_tool, self.software.modules_tool_version
            ),
        );
        out
    }
}

/// Name of this host, as reported by the OS.
pub fn hostname() -> String {
    System::host_name().unwrap_or_else(|| UNKNOWN.to_string())
}

fn push_field(out: &mut String, key: &str, value: &str) {
    out.push_str(&format!("  -> {key}: {value}\n"));
}

fn os_type() -> &'static str {
    match consts::OS {
        "linux" => "Linux",
        "macos" => "Darwin",
        other => other,
    }
}

/// `<arch>-unknown-<os>`, e.g. `x86_64-unknown-linux`.
pub fn platform_name() -> String {
    let os = match consts::OS {
        "macos" => "darwin",
        other => other,
    };
    format!("{}-unknown-{}", consts::ARCH, os)
}

fn glibc_version() -> Option<String> {
    let output = run_command_sync("getconf", &["GNU_LIBC_VERSION"], None, None).ok()?;
    if !output.status.success() {
        return None;
    }
    parse_glibc_version(&String::from_utf8_lossy(&output.stdout))
}

/// `getconf GNU_LIBC_VERSION` prints e.g. `glibc 2.36`.
fn parse_glibc_version(output: &str) -> Option<String> {
    output
        .split_whitespace()
        .nth(1)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glibc_from_getconf_output() {
        assert_eq!(parse_glibc_version("glibc 2.36\n").as_deref(), Some("2.36"));
        assert_eq!(parse_glibc_version(""), None);
    }

    #[test]
    fn render_lists_every_section() {
        let info = SystemInfo {
            hostname: "node001".into(),
            os: OsInfo {
                name: "Debian GNU/Linux".into(),
                os_type: "Linux".into(),
                version: "12".into(),
                kernel: "6.1.0".into(),
                platform_name: "x86_64-unknown-linux".into(),
            },
            cpu: CpuInfo {
                vendor: "GenuineIntel".into(),
                arch: "x86_64".into(),
                model: "Intel(R) Xeon(R) Gold 6248".into(),
                speed_mhz: 0,
                cores: 40,
            },
            software: SoftwareInfo {
                glibc_version: "2.36".into(),
                modules_tool: "Lmod".into(),
                modules_tool_version: "8.7.32".into(),
            },
        };
        let text = info.render();
        assert!(text.starts_with("System information (node001):\n"));
        assert!(text.contains("  -> platform name: x86_64-unknown-linux\n"));
        assert!(text.contains("  -> speed: UNKNOWN\n"));
        assert!(text.contains("  -> cores: 40\n"));
        assert!(text.contains("  -> modules tool: Lmod 8.7.32\n"));
    }

    #[test]
    fn platform_name_has_arch() {
        assert!(platform_name().starts_with(consts::ARCH));
    }
}
