// eb-aio/src/process.rs
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output as StdOutput, Stdio};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use eb_common::error::{EbError, Result};
use tracing::{debug, error};

/// Lines of output kept in the error of a failing command.
const ERROR_OUTPUT_TAIL: usize = 30;

/// Runs an external program and captures its output, whatever its exit status.
pub fn run_command_sync(
    command: &str,
    args: &[&str],
    cwd: Option<PathBuf>,
    envs: Option<BTreeMap<String, String>>,
) -> Result<StdOutput> {
    debug!(
        "Sync Running command: {} {:?} (cwd: {:?}, envs: {:?})",
        command,
        args,
        cwd,
        envs.as_ref().map(|e| e.keys().collect::<Vec<_>>())
    );
    let mut cmd = Command::new(command);
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    if let Some(env_map) = envs {
        cmd.envs(env_map);
    }
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.stdin(Stdio::null());

    match cmd.output() {
        Ok(output) => {
            if !output.status.success() {
                debug!("Sync Command failed with status: {}", output.status);
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stdout.trim().is_empty() {
                    debug!("Stdout:\n{}", stdout.trim());
                }
                if !stderr.trim().is_empty() {
                    debug!("Stderr:\n{}", stderr.trim());
                }
            } else {
                debug!("Sync Command finished successfully.");
            }
            Ok(output)
        }
        Err(e) => {
            error!("Sync Failed to execute command {}: {}", command, e);
            Err(e.into())
        }
    }
}

/// A shell command line as run by the build steps.
#[derive(Debug, Clone, Default)]
pub struct ShellCommand {
    pub cmd: String,
    pub cwd: Option<PathBuf>,
    /// Added to (and overriding) the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Command, output and exit code are appended here.
    pub log_file: Option<PathBuf>,
    /// Return `EbError::Command` on a non-zero exit code.
    pub fail_on_error: bool,
}

impl ShellCommand {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            fail_on_error: true,
            ..Default::default()
        }
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn log_to(mut self, log_file: Option<PathBuf>) -> Self {
        self.log_file = log_file;
        self
    }

    pub fn allow_failure(mut self) -> Self {
        self.fail_on_error = false;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ShellOutput {
    pub exit_code: i32,
    /// stdout and stderr, interleaved.
    pub output: String,
    pub started_at: DateTime<Local>,
    pub duration: Duration,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

fn append_log(log_file: &Option<PathBuf>, text: &str) -> Result<()> {
    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(text.as_bytes())?;
    }
    Ok(())
}

/// Runs `command.cmd` through `bash -c` with stderr merged into stdout.
pub fn run_shell(command: &ShellCommand) -> Result<ShellOutput> {
    let started_at = Local::now();
    let cwd_display = command
        .cwd
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| ".".to_string());
    debug!("Running shell command \"{}\" in {}", command.cmd, cwd_display);
    append_log(
        &command.log_file,
        &format!(
            "== {} run_shell_cmd: \"{}\"\n  (in {})\n",
            started_at.format("%Y-%m-%d %H:%M:%S"),
            command.cmd,
            cwd_display
        ),
    )?;

    let mut cmd = Command::new("bash");
    cmd.arg("-c").arg(format!("exec 2>&1\n{}", command.cmd));
    if let Some(dir) = &command.cwd {
        cmd.current_dir(dir);
    }
    cmd.envs(&command.env);
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::null());
    cmd.stdin(Stdio::null());

    let start = Instant::now();
    let output = cmd.output().map_err(|e| {
        error!("Failed to execute bash for \"{}\": {}", command.cmd, e);
        EbError::from(e)
    })?;
    let duration = start.elapsed();
    let exit_code = output.status.code().unwrap_or(-1);
    let text = String::from_utf8_lossy(&output.stdout).into_owned();

    let mut log_entry = text.clone();
    if !log_entry.is_empty() && !log_entry.ends_with('\n') {
        log_entry.push('\n');
    }
    log_entry.push_str(&format!("== exit code: {exit_code}\n"));
    append_log(&command.log_file, &log_entry)?;
    debug!(
        "Shell command \"{}\" exited with {} after {:?}",
        command.cmd, exit_code, duration
    );

    if exit_code != 0 && command.fail_on_error {
        let lines: Vec<&str> = text.lines().collect();
        let tail = lines[lines.len().saturating_sub(ERROR_OUTPUT_TAIL)..].join("\n");
        return Err(EbError::Command {
            cmd: command.cmd.clone(),
            code: exit_code,
            output: tail,
        });
    }
    Ok(ShellOutput {
        exit_code,
        output: text,
        started_at,
        duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_merges_output_and_logs() {
        let tmp = tempfile::tempdir().unwrap();
        let log = tmp.path().join("build.log");
        let mut env = BTreeMap::new();
        env.insert("EB_TEST_VAR".to_string(), "value".to_string());
        let out = run_shell(
            &ShellCommand::new("echo out; echo err >&2; echo $EB_TEST_VAR; pwd")
                .cwd(tmp.path())
                .envs(&env)
                .log_to(Some(log.clone())),
        )
        .unwrap();
        assert!(out.success());
        assert!(out.output.contains("out\nerr\nvalue\n"));
        let logged = std::fs::read_to_string(&log).unwrap();
        assert!(logged.contains("run_shell_cmd: \"echo out;"));
        assert!(logged.contains("== exit code: 0"));
    }

    #[test]
    fn failing_command_is_an_error_unless_allowed() {
        let err = run_shell(&ShellCommand::new("echo boom; exit 3")).unwrap_err();
        match err {
            EbError::Command { code, output, .. } => {
                assert_eq!(code, 3);
                assert_eq!(output, "boom");
            }
            other => panic!("unexpected error {other:?}"),
        }
        let out = run_shell(&ShellCommand::new("exit 2").allow_failure()).unwrap();
        assert_eq!(out.exit_code, 2);
    }

    #[test]
    fn run_command_captures_output() {
        let out = run_command_sync("bash", &["-c", "echo hi"], None, None).unwrap();
        assert!(out.status.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hi");
    }
}
