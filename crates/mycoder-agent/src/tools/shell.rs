//! Shell tool: execute commands in a subprocess.
//!
//! Includes deny-pattern safety guard and optional workspace restriction.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::base::{optional_i64, optional_string, require_string, Tool, ToolArgs};
use super::error::ToolError;

/// Maximum length of each output stream before truncation (bytes).
const MAX_OUTPUT_LEN: usize = 10_000;

/// Default command timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Dangerous command patterns that are always blocked.
const DENY_PATTERNS: &[&str] = &[
    r"\brm\s+-[rf]{1,2}\s+/(\s|$)",
    r"\brm\s+-[rf]{1,2}\s+~",
    r"\b(mkfs|diskpart)\b",
    r"\bdd\s+if=",
    r">\s*/dev/sd",
    r"\b(shutdown|reboot|poweroff|halt)\b",
    r":\(\)\s*\{.*\};\s*:", // fork bomb
];

// ─────────────────────────────────────────────
// ShellTool
// ─────────────────────────────────────────────

/// Execute shell commands via `sh -c`.
pub struct ShellTool {
    /// Working directory for commands.
    working_dir: PathBuf,
    /// Default timeout, overridable per call.
    timeout: Duration,
    /// If true, block commands that reference paths outside `working_dir`.
    restrict_to_workspace: bool,
    deny_regexes: Vec<Regex>,
}

impl ShellTool {
    pub fn new(working_dir: PathBuf, timeout_secs: Option<u64>, restrict_to_workspace: bool) -> Self {
        let deny_regexes: Vec<Regex> = DENY_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();

        Self {
            working_dir,
            timeout: Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            restrict_to_workspace,
            deny_regexes,
        }
    }

    /// Check if a command is safe to execute. Returns the reason if blocked.
    fn guard_command(&self, command: &str, cwd: &str) -> Option<String> {
        let lower = command.to_lowercase();

        if self.deny_regexes.iter().any(|re| re.is_match(&lower)) {
            warn!(command = command, "command blocked by safety guard");
            return Some("Command blocked by safety guard (dangerous pattern detected)".into());
        }

        if self.restrict_to_workspace {
            if command.contains("../") {
                return Some("Command blocked: path traversal (../) not allowed in restricted mode".into());
            }

            let cwd_path = PathBuf::from(cwd);
            let abs_path_re = Regex::new(r#"(?:^|\s)(/[^\s"']+)"#).ok();
            if let Some(re) = abs_path_re {
                for cap in re.captures_iter(command) {
                    let Some(m) = cap.get(1) else { continue };
                    let p = PathBuf::from(m.as_str());
                    let resolved = p.canonicalize().unwrap_or(p);
                    if !resolved.starts_with(&cwd_path) {
                        return Some(format!(
                            "Command references path '{}' outside workspace",
                            m.as_str()
                        ));
                    }
                }
            }
        }

        None
    }
}

/// Cut `text` to at most `MAX_OUTPUT_LEN` bytes on a char boundary.
fn truncate_output(mut text: String) -> String {
    if text.len() <= MAX_OUTPUT_LEN {
        return text;
    }
    let mut cut = MAX_OUTPUT_LEN;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let remaining = text.len() - cut;
    text.truncate(cut);
    text.push_str(&format!("\n... (truncated, {remaining} more bytes)"));
    text
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its exit code, stdout and stderr. \
         Use this for running builds, tests, git, or any CLI tool."
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "minLength": 1,
                    "description": "The shell command to execute"
                },
                "working_dir": {
                    "type": "string",
                    "description": "Optional working directory (defaults to workspace root)"
                },
                "timeout": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Timeout in seconds"
                },
                "env": {
                    "type": "object",
                    "additionalProperties": { "type": "string" },
                    "description": "Additional environment variables"
                }
            },
            "required": ["command"]
        })
    }

    fn returns_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "success": { "type": "boolean" },
                "exit_code": { "type": "integer" },
                "stdout": { "type": "string" },
                "stderr": { "type": "string" },
                "duration": { "type": "number" },
                "command": { "type": "string" }
            }
        }))
    }

    async fn execute(&self, args: ToolArgs) -> anyhow::Result<Value> {
        let command = require_string(&args, "command")?;
        let cwd = optional_string(&args, "working_dir")
            .unwrap_or_else(|| self.working_dir.to_string_lossy().to_string());
        let timeout = optional_i64(&args, "timeout")
            .filter(|t| *t > 0)
            .map(|t| Duration::from_secs(t as u64))
            .unwrap_or(self.timeout);

        if let Some(reason) = self.guard_command(&command, &cwd) {
            anyhow::bail!(reason);
        }
        if !PathBuf::from(&cwd).is_dir() {
            anyhow::bail!("Working directory does not exist: {cwd}");
        }

        info!(command = %command, cwd = %cwd, "executing shell command");
        let started = Instant::now();

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&command)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(env) = args.get("env").and_then(|v| v.as_object()) {
            for (key, value) in env {
                if let Some(value) = value.as_str() {
                    cmd.env(key, value);
                }
            }
        }
        let child = cmd
            .spawn()
            .map_err(|e| anyhow::anyhow!("Failed to spawn command: {e}"))?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| anyhow::anyhow!("Command failed: {e}"))?,
            Err(_) => {
                return Err(ToolError::Timeout {
                    tool: self.name().to_string(),
                    after: timeout,
                }
                .into())
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let duration = started.elapsed().as_secs_f64();
        debug!(exit_code, duration, "shell command finished");

        Ok(json!({
            "success": output.status.success(),
            "exit_code": exit_code,
            "stdout": truncate_output(String::from_utf8_lossy(&output.stdout).to_string()),
            "stderr": truncate_output(String::from_utf8_lossy(&output.stderr).to_string()),
            "duration": duration,
            "command": command,
        }))
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
