//! Filesystem tools: read, write, edit, list directory.
//!
//! Each tool optionally restricts paths to an `allowed_dir`; relative paths
//! resolve against that directory when it is set.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;

use mycoder_core::utils::expand_home;

use super::base::{optional_bool, optional_i64, optional_string, require_string, Tool, ToolArgs};

// ─────────────────────────────────────────────
// Shared path helper
// ─────────────────────────────────────────────

/// Resolve a user-supplied path, optionally restricting it to `allowed_dir`.
///
/// Returns `Err` if the resolved path is outside the allowed directory.
fn resolve_path(path: &str, allowed_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let expanded = expand_home(path);
    let expanded = match allowed_dir {
        Some(base) if expanded.is_relative() => base.join(expanded),
        _ => expanded,
    };

    // The target may not exist yet (writes), so canonicalize the parent.
    let resolved = if expanded.exists() {
        expanded.canonicalize().unwrap_or(expanded)
    } else {
        match (expanded.parent(), expanded.file_name()) {
            (Some(parent), Some(name)) if parent.exists() => parent
                .canonicalize()
                .unwrap_or_else(|_| parent.to_path_buf())
                .join(name),
            _ => expanded,
        }
    };

    if let Some(allowed) = allowed_dir {
        let allowed_canon = allowed
            .canonicalize()
            .unwrap_or_else(|_| allowed.to_path_buf());
        if !resolved.starts_with(&allowed_canon) {
            anyhow::bail!(
                "Access denied: path '{}' is outside allowed directory '{}'",
                resolved.display(),
                allowed_canon.display()
            );
        }
    }

    Ok(resolved)
}

// ─────────────────────────────────────────────
// ReadFileTool
// ─────────────────────────────────────────────

/// Reads a file, optionally a window of its lines.
pub struct ReadFileTool {
    allowed_dir: Option<PathBuf>,
}

impl ReadFileTool {
    pub fn new(allowed_dir: Option<PathBuf>) -> Self {
        Self { allowed_dir }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Use offset and limit to read a range of lines."
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or relative path to the file to read"
                },
                "offset": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Line number to start reading from (0-indexed)"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Maximum number of lines to read"
                }
            },
            "required": ["path"]
        })
    }

    fn returns_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "content": { "type": "string" },
                "path": { "type": "string" },
                "total_lines": { "type": "integer" },
                "start_line": { "type": "integer" },
                "end_line": { "type": "integer" }
            }
        }))
    }

    async fn execute(&self, args: ToolArgs) -> anyhow::Result<Value> {
        let path_str = require_string(&args, "path")?;
        let path = resolve_path(&path_str, self.allowed_dir.as_deref())?;

        if !path.exists() {
            anyhow::bail!("File not found: {}", path.display());
        }
        if !path.is_file() {
            anyhow::bail!("Not a file: {}", path.display());
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let offset = optional_i64(&args, "offset").unwrap_or(0).max(0) as usize;
        let limit = optional_i64(&args, "limit").map(|l| l.max(1) as usize);
        let lines: Vec<&str> = content.lines().collect();
        let total_lines = lines.len();

        let (text, start, end) = if offset == 0 && limit.is_none() {
            (content.clone(), 0, total_lines)
        } else {
            let start = offset.min(total_lines);
            let end = limit.map_or(total_lines, |l| (start + l).min(total_lines));
            (lines[start..end].join("\n"), start, end)
        };

        Ok(json!({
            "content": text,
            "path": path.display().to_string(),
            "total_lines": total_lines,
            "start_line": start,
            "end_line": end,
        }))
    }
}

// ─────────────────────────────────────────────
// WriteFileTool
// ─────────────────────────────────────────────

/// Creates, overwrites or appends to a file.
pub struct WriteFileTool {
    allowed_dir: Option<PathBuf>,
}

impl WriteFileTool {
    pub fn new(allowed_dir: Option<PathBuf>) -> Self {
        Self { allowed_dir }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating it if it doesn't exist. Mode 'w' overwrites, \
         'a' appends. Parent directories are created automatically."
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or relative path for the file"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                },
                "mode": {
                    "type": "string",
                    "enum": ["w", "a"],
                    "description": "'w' to overwrite (default), 'a' to append"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: ToolArgs) -> anyhow::Result<Value> {
        let path_str = require_string(&args, "path")?;
        let content = require_string(&args, "content")?;
        let append = optional_string(&args, "mode").as_deref() == Some("a");
        let path = resolve_path(&path_str, self.allowed_dir.as_deref())?;

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create directory {}", parent.display()))?;
            }
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        file.write_all(content.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        file.flush().await?;

        let verb = if append { "appended" } else { "wrote" };
        Ok(Value::String(format!(
            "Successfully {verb} {} bytes to {}",
            content.len(),
            path.display()
        )))
    }
}

// ─────────────────────────────────────────────
// EditFileTool
// ─────────────────────────────────────────────

/// Edits an existing file in place and reports a unified diff.
///
/// Operations:
/// - `replace`: every match of `search` (literal or regex, optionally
///   case-insensitive) becomes `replacement`
/// - `insert`: `content` goes before 1-indexed `line`; past the end appends
/// - `append`: `content` goes at the end on a fresh line
pub struct EditFileTool {
    allowed_dir: Option<PathBuf>,
}

impl EditFileTool {
    pub fn new(allowed_dir: Option<PathBuf>) -> Self {
        Self { allowed_dir }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Edit an existing file. 'replace' substitutes every match of `search` (set regex=true \
         for a pattern, case_sensitive=false to ignore case), 'insert' puts `content` before \
         line `line` (1-indexed), 'append' adds `content` at the end. Returns a unified diff."
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to edit"
                },
                "operation": {
                    "type": "string",
                    "enum": ["replace", "insert", "append"],
                    "description": "Kind of edit"
                },
                "search": {
                    "type": "string",
                    "description": "replace: text or pattern to find"
                },
                "replacement": {
                    "type": "string",
                    "description": "replace: substitute text ($1 refers to a capture group when regex=true)"
                },
                "regex": {
                    "type": "boolean",
                    "description": "replace: treat `search` as a regular expression"
                },
                "case_sensitive": {
                    "type": "boolean",
                    "description": "replace: match case (default true)"
                },
                "content": {
                    "type": "string",
                    "description": "insert/append: text to add"
                },
                "line": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "insert: line number the content is placed before"
                }
            },
            "required": ["path", "operation"]
        })
    }

    fn returns_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "success": { "type": "boolean" },
                "changes": { "type": "integer" },
                "diff": { "type": "string" },
                "path": { "type": "string" }
            }
        }))
    }

    async fn execute(&self, args: ToolArgs) -> anyhow::Result<Value> {
        let path_str = require_string(&args, "path")?;
        let operation = require_string(&args, "operation")?;
        let path = resolve_path(&path_str, self.allowed_dir.as_deref())?;

        if !path.is_file() {
            anyhow::bail!("File not found: {}", path.display());
        }
        let original = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let (updated, changes) = match operation.as_str() {
            "replace" => {
                let search = require_string(&args, "search")?;
                let replacement = require_string(&args, "replacement")?;
                let case_sensitive = args
                    .get("case_sensitive")
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                replace_text(
                    &original,
                    &search,
                    &replacement,
                    optional_bool(&args, "regex"),
                    case_sensitive,
                )?
            }
            "insert" => {
                let content = require_string(&args, "content")?;
                let line = optional_i64(&args, "line")
                    .ok_or_else(|| anyhow::anyhow!("Missing required parameter: line"))?;
                if line < 1 {
                    anyhow::bail!("line must be at least 1, got {line}");
                }
                insert_lines(&original, &content, line as usize)
            }
            "append" => {
                let content = require_string(&args, "content")?;
                append_text(&original, &content)
            }
            other => anyhow::bail!("Unknown operation '{other}', expected replace, insert or append"),
        };

        if changes > 0 {
            tokio::fs::write(&path, &updated)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(json!({
            "success": changes > 0,
            "changes": changes,
            "diff": unified_diff(&original, &updated, &name),
            "path": path.display().to_string(),
        }))
    }
}

/// Replace every match, returning the new text and the number of matches.
fn replace_text(
    text: &str,
    search: &str,
    replacement: &str,
    regex: bool,
    case_sensitive: bool,
) -> anyhow::Result<(String, usize)> {
    if search.is_empty() {
        anyhow::bail!("search must not be empty");
    }
    if !regex && case_sensitive {
        let count = text.matches(search).count();
        return Ok((text.replace(search, replacement), count));
    }

    let pattern = if regex {
        search.to_string()
    } else {
        regex::escape(search)
    };
    let re = regex::RegexBuilder::new(&pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .with_context(|| format!("Invalid regex '{search}'"))?;
    let count = re.find_iter(text).count();
    let updated = if regex {
        re.replace_all(text, replacement).into_owned()
    } else {
        re.replace_all(text, regex::NoExpand(replacement)).into_owned()
    };
    Ok((updated, count))
}

/// Insert `content` as whole lines before 1-indexed `line`.
fn insert_lines(text: &str, content: &str, line: usize) -> (String, usize) {
    let mut lines: Vec<String> = text.split_inclusive('\n').map(str::to_string).collect();
    if let Some(last) = lines.last_mut() {
        if !last.ends_with('\n') {
            last.push('\n');
        }
    }
    let at = (line - 1).min(lines.len());
    let body = content.strip_suffix('\n').unwrap_or(content);
    let added: Vec<String> = body.split('\n').map(|l| format!("{l}\n")).collect();
    let changes = added.len();
    lines.splice(at..at, added);
    (lines.concat(), changes)
}

/// Append `content`, starting a new line if the file does not end with one.
fn append_text(text: &str, content: &str) -> (String, usize) {
    if content.is_empty() {
        return (text.to_string(), 0);
    }
    let mut updated = text.to_string();
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(content);
    (updated, content.lines().count().max(1))
}

/// Lines of context around a change.
const DIFF_CONTEXT: usize = 3;

/// A single-hunk unified diff spanning the first to the last changed line.
/// Empty when nothing changed.
fn unified_diff(before: &str, after: &str, name: &str) -> String {
    let old: Vec<&str> = before.lines().collect();
    let new: Vec<&str> = after.lines().collect();
    if old == new {
        return String::new();
    }

    let prefix = old.iter().zip(&new).take_while(|(a, b)| a == b).count();
    let max_suffix = old.len().min(new.len()) - prefix;
    let suffix = old
        .iter()
        .rev()
        .zip(new.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    let lead = prefix.min(DIFF_CONTEXT);
    let trail = suffix.min(DIFF_CONTEXT);
    let start = prefix - lead;
    let old_end = old.len() - suffix + trail;
    let new_end = new.len() - suffix + trail;

    let range = |from: usize, to: usize| match to - from {
        0 => format!("{from},0"),
        1 => format!("{}", from + 1),
        len => format!("{},{len}", from + 1),
    };

    let mut out = vec![
        format!("--- a/{name}"),
        format!("+++ b/{name}"),
        format!("@@ -{} +{} @@", range(start, old_end), range(start, new_end)),
    ];
    out.extend(old[start..prefix].iter().map(|l| format!(" {l}")));
    out.extend(old[prefix..old.len() - suffix].iter().map(|l| format!("-{l}")));
    out.extend(new[prefix..new.len() - suffix].iter().map(|l| format!("+{l}")));
    out.extend(old[old.len() - suffix..old_end].iter().map(|l| format!(" {l}")));
    out.join("\n")
}

// ─────────────────────────────────────────────
// ListDirTool
// ─────────────────────────────────────────────

/// Lists the contents of a directory.
pub struct ListDirTool {
    allowed_dir: Option<PathBuf>,
}

impl ListDirTool {
    pub fn new(allowed_dir: Option<PathBuf>) -> Self {
        Self { allowed_dir }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the contents of a directory with name, type and size of each entry."
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the directory to list"
                },
                "include_hidden": {
                    "type": "boolean",
                    "description": "Include entries starting with '.'"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: ToolArgs) -> anyhow::Result<Value> {
        let path_str = require_string(&args, "path")?;
        let include_hidden = optional_bool(&args, "include_hidden");
        let path = resolve_path(&path_str, self.allowed_dir.as_deref())?;

        if !path.is_dir() {
            anyhow::bail!("Not a directory: {}", path.display());
        }

        let mut reader = tokio::fs::read_dir(&path)
            .await
            .with_context(|| format!("Failed to read directory {}", path.display()))?;
        let mut items = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !include_hidden && name.starts_with('.') {
                continue;
            }
            let meta = entry.metadata().await.ok();
            let is_dir = meta.as_ref().map(|m| m.is_dir()).unwrap_or(false);
            let size = meta.as_ref().map(|m| m.len()).unwrap_or(0);
            items.push((name, is_dir, size));
        }
        items.sort_by(|a, b| a.0.cmp(&b.0));

        let items: Vec<Value> = items
            .into_iter()
            .map(|(name, is_dir, size)| json!({ "name": name, "is_dir": is_dir, "size": size }))
            .collect();
        Ok(json!({
            "path": path.display().to_string(),
            "count": items.len(),
            "items": items,
        }))
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args(value: Value) -> ToolArgs {
        value.as_object().cloned().unwrap()
    }

    // ── ReadFileTool ──

    #[tokio::test]
    async fn test_read_file_success() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("hello.txt");
        std::fs::write(&file, "Hello, MyCoder!").unwrap();

        let tool = ReadFileTool::new(None);
        let result = tool
            .execute(make_args(json!({"path": file.to_str().unwrap()})))
            .await
            .unwrap();
        assert_eq!(result["content"], "Hello, MyCoder!");
        assert_eq!(result["total_lines"], 1);
    }

    #[tokio::test]
    async fn test_read_file_window() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lines.txt");
        std::fs::write(&file, "one\ntwo\nthree\nfour\n").unwrap();

        let tool = ReadFileTool::new(None);
        let result = tool
            .execute(make_args(json!({"path": file.to_str().unwrap(), "offset": 1, "limit": 2})))
            .await
            .unwrap();
        assert_eq!(result["content"], "two\nthree");
        assert_eq!(result["start_line"], 1);
        assert_eq!(result["end_line"], 3);
        assert_eq!(result["total_lines"], 4);
    }

    #[tokio::test]
    async fn test_read_file_not_found() {
        let tool = ReadFileTool::new(None);
        let result = tool
            .execute(make_args(json!({"path": "/tmp/nonexistent_mycoder_test_file.txt"})))
            .await;
        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_read_file_restricted() {
        let dir = tempfile::tempdir().unwrap();
        let allowed = dir.path().join("safe");
        std::fs::create_dir(&allowed).unwrap();
        let outside = dir.path().join("secret.txt");
        std::fs::write(&outside, "nope").unwrap();

        let tool = ReadFileTool::new(Some(allowed));
        let result = tool
            .execute(make_args(json!({"path": outside.to_str().unwrap()})))
            .await;
        assert!(result.unwrap_err().to_string().contains("Access denied"));

        let result = tool.execute(make_args(json!({"path": "../secret.txt"}))).await;
        assert!(result.unwrap_err().to_string().contains("Access denied"));
    }

    #[tokio::test]
    async fn test_relative_path_resolves_in_allowed_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.md"), "inside").unwrap();

        let tool = ReadFileTool::new(Some(dir.path().to_path_buf()));
        let result = tool
            .execute(make_args(json!({"path": "notes.md"})))
            .await
            .unwrap();
        assert_eq!(result["content"], "inside");
    }

    // ── WriteFileTool ──

    #[tokio::test]
    async fn test_write_file_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("sub").join("deep").join("file.txt");

        let tool = WriteFileTool::new(None);
        let result = tool
            .execute(make_args(json!({
                "path": file.to_str().unwrap(),
                "content": "deep content"
            })))
            .await
            .unwrap();
        assert!(result.as_str().unwrap().contains("Successfully wrote 12 bytes"));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "deep content");
    }

    #[tokio::test]
    async fn test_write_file_overwrite_and_append() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("log.txt");
        std::fs::write(&file, "old content").unwrap();
        let path = file.to_str().unwrap();

        let tool = WriteFileTool::new(None);
        tool.execute(make_args(json!({"path": path, "content": "first\n"})))
            .await
            .unwrap();
        let result = tool
            .execute(make_args(json!({"path": path, "content": "second\n", "mode": "a"})))
            .await
            .unwrap();
        assert!(result.as_str().unwrap().contains("appended"));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "first\nsecond\n");
    }

    // ── EditFileTool ──

    fn edit(file: &Path, extra: Value) -> ToolArgs {
        let mut args = make_args(extra);
        args.insert("path".into(), json!(file.to_str().unwrap()));
        args
    }

    #[tokio::test]
    async fn test_edit_replace_literal() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("main.rs");
        std::fs::write(&file, "fn main() {\n    println!(\"hi\");\n    println!(\"hi\");\n}\n").unwrap();

        let tool = EditFileTool::new(None);
        let result = tool
            .execute(edit(
                &file,
                json!({"operation": "replace", "search": "\"hi\"", "replacement": "\"bye\""}),
            ))
            .await
            .unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(result["changes"], 2);
        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "fn main() {\n    println!(\"bye\");\n    println!(\"bye\");\n}\n"
        );
        assert_eq!(
            result["diff"],
            "--- a/main.rs\n+++ b/main.rs\n@@ -1,4 +1,4 @@\n fn main() {\n-    println!(\"hi\");\n-    println!(\"hi\");\n+    println!(\"bye\");\n+    println!(\"bye\");\n }"
        );
    }

    #[tokio::test]
    async fn test_edit_replace_regex_and_case() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("conf.txt");
        std::fs::write(&file, "Port=80\nport=81\nhost=x\n").unwrap();
        let tool = EditFileTool::new(None);

        let result = tool
            .execute(edit(
                &file,
                json!({"operation": "replace", "search": "port", "replacement": "PORT", "case_sensitive": false}),
            ))
            .await
            .unwrap();
        assert_eq!(result["changes"], 2);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "PORT=80\nPORT=81\nhost=x\n");

        let result = tool
            .execute(edit(
                &file,
                json!({"operation": "replace", "search": r"PORT=(\d+)", "replacement": "port: $1", "regex": true}),
            ))
            .await
            .unwrap();
        assert_eq!(result["changes"], 2);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "port: 80\nport: 81\nhost=x\n");

        // Literal mode does not expand `$1`.
        tool.execute(edit(
            &file,
            json!({"operation": "replace", "search": "HOST", "replacement": "$1", "case_sensitive": false}),
        ))
        .await
        .unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "port: 80\nport: 81\n$1=x\n");
    }

    #[tokio::test]
    async fn test_edit_replace_no_match_leaves_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "unchanged\n").unwrap();
        let result = EditFileTool::new(None)
            .execute(edit(&file, json!({"operation": "replace", "search": "zzz", "replacement": "y"})))
            .await
            .unwrap();
        assert_eq!(result["success"], false);
        assert_eq!(result["changes"], 0);
        assert_eq!(result["diff"], "");
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "unchanged\n");
    }

    #[tokio::test]
    async fn test_edit_insert_at_line() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("list.txt");
        std::fs::write(&file, "one\nthree").unwrap();
        let tool = EditFileTool::new(None);

        let result = tool
            .execute(edit(&file, json!({"operation": "insert", "content": "two", "line": 2})))
            .await
            .unwrap();
        assert_eq!(result["changes"], 1);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "one\ntwo\nthree\n");
        assert!(result["diff"].as_str().unwrap().contains("\n+two\n"));

        // Past the end appends.
        tool.execute(edit(&file, json!({"operation": "insert", "content": "four\nfive\n", "line": 99})))
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "one\ntwo\nthree\nfour\nfive\n");

        let err = tool
            .execute(edit(&file, json!({"operation": "insert", "content": "x", "line": 0})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[tokio::test]
    async fn test_edit_append_starts_new_line() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("log.txt");
        std::fs::write(&file, "first").unwrap();
        let result = EditFileTool::new(None)
            .execute(edit(&file, json!({"operation": "append", "content": "second"})))
            .await
            .unwrap();
        assert_eq!(result["changes"], 1);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "first\nsecond");
        assert_eq!(
            result["diff"],
            "--- a/log.txt\n+++ b/log.txt\n@@ -1 +1,2 @@\n first\n+second"
        );
    }

    #[tokio::test]
    async fn test_edit_rejects_missing_file_and_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let tool = EditFileTool::new(Some(dir.path().to_path_buf()));

        let err = tool
            .execute(make_args(json!({"path": "missing.txt", "operation": "append", "content": "x"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("File not found"));

        std::fs::write(dir.path().join("a.txt"), "x\n").unwrap();
        let err = tool
            .execute(make_args(json!({"path": "a.txt", "operation": "delete"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown operation"));

        let err = tool
            .execute(make_args(
                json!({"path": "a.txt", "operation": "replace", "search": "(", "replacement": "", "regex": true}),
            ))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid regex"));

        let err = tool
            .execute(make_args(json!({"path": "/etc/hostname", "operation": "append", "content": "x"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Access denied"));
    }

    #[test]
    fn test_unified_diff_context_window() {
        let before = "1\n2\n3\n4\n5\n6\n7\n8\n9\n";
        let after = "1\n2\n3\n4\nfive\n6\n7\n8\n9\n";
        assert_eq!(
            unified_diff(before, after, "n.txt"),
            "--- a/n.txt\n+++ b/n.txt\n@@ -2,7 +2,7 @@\n 2\n 3\n 4\n-5\n+five\n 6\n 7\n 8"
        );
        assert_eq!(unified_diff("same\n", "same\n", "n.txt"), "");
        assert_eq!(
            unified_diff("", "new\n", "n.txt"),
            "--- a/n.txt\n+++ b/n.txt\n@@ -0,0 +1 @@\n+new"
        );
    }

    // ── ListDirTool ──

    #[tokio::test]
    async fn test_list_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file_a.txt"), "abc").unwrap();
        std::fs::write(dir.path().join(".hidden"), "").unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();

        let tool = ListDirTool::new(None);
        let result = tool
            .execute(make_args(json!({"path": dir.path().to_str().unwrap()})))
            .await
            .unwrap();
        assert_eq!(result["count"], 2);
        assert_eq!(result["items"][0]["name"], "file_a.txt");
        assert_eq!(result["items"][0]["size"], 3);
        assert_eq!(result["items"][1]["name"], "subdir");
        assert_eq!(result["items"][1]["is_dir"], true);

        let result = tool
            .execute(make_args(json!({
                "path": dir.path().to_str().unwrap(),
                "include_hidden": true
            })))
            .await
            .unwrap();
        assert_eq!(result["count"], 3);
    }

    #[tokio::test]
    async fn test_list_dir_not_a_dir() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file.txt");
        std::fs::write(&file, "").unwrap();

        let tool = ListDirTool::new(None);
        let result = tool
            .execute(make_args(json!({"path": file.to_str().unwrap()})))
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_tool_specs() {
        let tools: Vec<Box<dyn Tool>> = vec![
            Box::new(ReadFileTool::new(None)),
            Box::new(WriteFileTool::new(None)),
            Box::new(ListDirTool::new(None)),
        ];
        let names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["read_file", "write_file", "list_dir"]);
        for tool in &tools {
            let spec = tool.spec();
            assert_eq!(spec.parameters["type"], "object");
            assert!(!spec.description.is_empty());
        }
    }
}
