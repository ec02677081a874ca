// eb-core/src/build/context.rs
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use eb_aio::fs as eb_fs;
use eb_aio::process::{run_shell, ShellCommand, ShellOutput};
use eb_common::config::Config;
use eb_common::dependency::Dependency;
use eb_common::easyconfig::PatchFile;
use eb_common::error::Result;
use eb_common::EasyConfig;
use tracing::debug;

use super::env::BuildEnvironment;

/// Everything a running build knows about itself; handed to every easyblock step.
pub struct BuildContext<'a> {
    pub config: &'a Config,
    /// Own copy of the easyconfig, with `installdir`/`builddir` templates filled in.
    pub ec: EasyConfig,
    pub easyblock: &'static str,
    /// Toolchain, build and runtime dependencies with settled toolchains.
    pub dependencies: Vec<Dependency>,
    pub build_dir: PathBuf,
    pub install_dir: PathBuf,
    /// Where configure/build/install commands run; set while unpacking.
    pub start_dir: PathBuf,
    pub sources: Vec<PathBuf>,
    pub patches: Vec<(PatchFile, PathBuf)>,
    pub env: BuildEnvironment,
    pub log_file: PathBuf,
    pub parallel: usize,
    /// Extended dry run: report, never execute or write.
    pub dry_run: bool,
    pub trace: bool,
}

impl<'a> BuildContext<'a> {
    pub fn name(&self) -> &str {
        &self.ec.name
    }

    /// A user-facing line; also appended to the build log.
    pub fn print_msg(&self, msg: &str) {
        println!("{msg}");
        self.log(msg.trim_start_matches("== "));
    }

    /// Appends `msg` to the build log. Logging is best effort.
    pub fn log(&self, msg: &str) {
        if self.dry_run {
            return;
        }
        let line = format!("== {} {}\n", Local::now().format("%Y-%m-%d %H:%M:%S"), msg);
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(e) = written {
            debug!("Failed to write to build log {}: {}", self.log_file.display(), e);
        }
    }

    /// Dry-run output, indented below the current step.
    pub fn dry_run_msg(&self, msg: &str) {
        for line in msg.lines() {
            println!("  {line}");
        }
    }

    /// Runs `cmd` with the build environment in `cwd`, or describes it in a dry run.
    pub fn run_cmd(&self, cmd: &str, cwd: &Path) -> Result<Option<ShellOutput>> {
        self.run_cmd_with(ShellCommand::new(cmd).cwd(cwd))
    }

    /// Like `run_cmd`, but a non-zero exit code is returned instead of being an error.
    pub fn run_cmd_allow_failure(&self, cmd: &str, cwd: &Path) -> Result<Option<ShellOutput>> {
        self.run_cmd_with(ShellCommand::new(cmd).cwd(cwd).allow_failure())
    }

    fn run_cmd_with(&self, command: ShellCommand) -> Result<Option<ShellOutput>> {
        let cwd = command
            .cwd
            .clone()
            .unwrap_or_else(|| self.start_dir.clone());
        if self.dry_run {
            self.dry_run_msg(&format!(
                "running shell command \"{}\"\n(in {})",
                command.cmd,
                cwd.display()
            ));
            return Ok(None);
        }
        let command = command
            .cwd(&cwd)
            .envs(self.env.vars())
            .log_to(Some(self.log_file.clone()));
        if self.trace {
            println!("  >> running shell command:");
            println!("\t{}", command.cmd);
            println!("\t[started at: {}]", Local::now().format("%Y-%m-%d %H:%M:%S"));
            println!("\t[working dir: {}]", cwd.display());
            println!("\t[output and state saved to {}]", self.log_file.display());
        }
        let result = run_shell(&command);
        if self.trace {
            match &result {
                Ok(out) => println!(
                    "  >> command completed: exit {}, ran in {}",
                    out.exit_code,
                    format_duration(out.duration)
                ),
                Err(e) => println!("  >> command failed: {e}"),
            }
        }
        result.map(Some)
    }

    pub fn mkdir(&self, dir: &Path) -> Result<()> {
        if self.dry_run {
            self.dry_run_msg(&format!("creating directory {}", dir.display()));
            return Ok(());
        }
        eb_fs::create_dir_all(dir)
    }

    /// Copies a file or directory tree to `dest`.
    pub fn copy(&self, src: &Path, dest: &Path) -> Result<()> {
        if self.dry_run {
            self.dry_run_msg(&format!("copying {} to {}", src.display(), dest.display()));
            return Ok(());
        }
        if src.is_dir() {
            eb_fs::copy_dir_recursive(src, dest)
        } else {
            eb_fs::copy_file(src, dest)
        }
    }

    pub fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        if self.dry_run {
            self.dry_run_msg(&format!(
                "creating symlink {} -> {}",
                link.display(),
                target.display()
            ));
            return Ok(());
        }
        if link.symlink_metadata().is_ok() {
            std::fs::remove_file(link)?;
        }
        eb_fs::create_symlink(target, link)
    }
}

/// Durations as shown in trace output: `< 1s`, else whole seconds.
pub fn format_duration(duration: Duration) -> String {
    if duration.as_secs() == 0 {
        "< 1s".to_string()
    } else {
        humantime::format_duration(Duration::from_secs(duration.as_secs())).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_durations() {
        assert_eq!(format_duration(Duration::from_millis(300)), "< 1s");
        assert_eq!(format_duration(Duration::from_millis(65_400)), "1m 5s");
    }
}
