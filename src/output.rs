//! Rendering of command results.
//!
//! A command builds a [`Report`] for people and hands its structured data
//! to [`emit`]. With `--json` the data goes out as one `tasklog.v1`
//! envelope on stdout and the report only contributes its warnings and
//! suggested commands.

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

pub const SCHEMA_VERSION: &str = "tasklog.v1";

/// How results are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Quiet,
    Json,
}

impl Format {
    /// `--json` wins over `--quiet`.
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        match (json, quiet) {
            (true, _) => Format::Json,
            (false, true) => Format::Quiet,
            (false, false) => Format::Text,
        }
    }
}

/// Text rendering of one command result.
#[derive(Debug, Clone, Default)]
pub struct Report {
    title: String,
    fields: Vec<(String, String)>,
    lines: Vec<String>,
    warnings: Vec<String>,
    suggestions: Vec<String>,
}

impl Report {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// A labelled value. An empty value renders as a bare flag.
    pub fn field(&mut self, label: impl Into<String>, value: impl Into<String>) {
        self.fields.push((label.into(), value.into()));
    }

    pub fn line(&mut self, text: impl Into<String>) {
        self.lines.push(text.into());
    }

    pub fn warn(&mut self, text: impl Into<String>) {
        self.warnings.push(text.into());
    }

    /// A command worth running next.
    pub fn suggest(&mut self, command: impl Into<String>) {
        self.suggestions.push(command.into());
    }

    /// Fields are aligned on the widest label; lines are indented under
    /// them, warnings and suggestions follow with their own prefixes.
    pub fn render(&self) -> String {
        let mut out = self.title.clone();
        let width = self
            .fields
            .iter()
            .map(|(label, _)| label.len())
            .max()
            .unwrap_or(0);

        for (label, value) in &self.fields {
            if value.is_empty() {
                let _ = write!(out, "\n  {label}");
            } else {
                let _ = write!(out, "\n  {label:<width$}  {value}");
            }
        }
        if !self.lines.is_empty() {
            out.push('\n');
            for line in &self.lines {
                let _ = write!(out, "\n    {line}");
            }
        }
        if !self.warnings.is_empty() || !self.suggestions.is_empty() {
            out.push('\n');
        }
        for warning in &self.warnings {
            let _ = write!(out, "\nwarning: {warning}");
        }
        for command in &self.suggestions {
            let _ = write!(out, "\n   next: {command}");
        }
        out
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    schema_version: &'static str,
    command: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Failure>,
    #[serde(skip_serializing_if = "no_items")]
    warnings: &'a [String],
    #[serde(skip_serializing_if = "no_items")]
    next_steps: &'a [String],
}

#[derive(Serialize)]
struct Failure {
    message: String,
    code: i32,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

fn no_items(items: &&[String]) -> bool {
    items.is_empty()
}

impl<'a> Envelope<'a> {
    fn print(&self) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(self)?);
        Ok(())
    }
}

/// Write a successful result in the requested format.
pub fn emit<T: Serialize>(format: Format, command: &str, data: &T, report: &Report) -> Result<()> {
    match format {
        Format::Quiet => Ok(()),
        Format::Text => {
            println!("{}", report.render());
            Ok(())
        }
        Format::Json => Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "success",
            data: Some(serde_json::to_value(data)?),
            error: None,
            warnings: &report.warnings,
            next_steps: &report.suggestions,
        }
        .print(),
    }
}

/// Report a failed command: an error envelope on stdout with `--json`,
/// otherwise the message and suggestions on stderr.
pub fn emit_error(command: &str, err: &Error, json: bool) -> Result<()> {
    let suggestions = suggestions_for(err);
    if json {
        return Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "error",
            data: None,
            error: Some(Failure {
                message: err.to_string(),
                code: err.exit_code(),
                kind: error_kind(err),
                details: err.details(),
            }),
            warnings: &[],
            next_steps: &suggestions,
        }
        .print();
    }

    eprintln!("error: {err}");
    for command in &suggestions {
        eprintln!("   try: {command}");
    }
    Ok(())
}

/// Command name for error envelopes, read before clap parses so that a
/// parse failure is still attributed.
pub fn infer_command_name_from_args() -> String {
    command_name(std::env::args().skip(1))
}

fn command_name(args: impl IntoIterator<Item = String>) -> String {
    let mut args = args.into_iter();
    let mut words: Vec<String> = Vec::new();

    while let Some(arg) = args.next() {
        if arg == "--repo" {
            args.next();
        } else if !arg.starts_with('-') {
            let group = words.is_empty() && arg == "worktree";
            words.push(arg);
            if !group {
                break;
            }
        }
    }

    if words.is_empty() {
        "tasklog".to_string()
    } else {
        words.join(" ")
    }
}

fn error_kind(err: &Error) -> &'static str {
    match err {
        Error::Validation(_) => "invalid_record",
        Error::TaskBlocked { .. } => "task_blocked",
        Error::PullFailed { .. } => "pull_failed",
        _ => match err.exit_code() {
            2 => "user_error",
            3 => "policy_blocked",
            _ => "operation_failed",
        },
    }
}

fn suggestions_for(err: &Error) -> Vec<String> {
    match err {
        Error::TaskNotFound(_) => vec!["tasklog list --all".to_string()],
        Error::TaskBlocked { id, blockers } => {
            let mut steps = vec![format!("tasklog why-blocked {id}")];
            steps.extend(blockers.iter().map(|blocker| format!("tasklog show {blocker}")));
            steps.push(format!("tasklog start {id} --force"));
            steps
        }
        Error::PullFailed { kind, .. } => vec![kind.remediation().to_string()],
        Error::UnpushedCommits { path, .. } => vec![
            format!("git -C {} push", path.display()),
            format!("tasklog worktree remove {} --force", path.display()),
        ],
        Error::WorktreeNotFound(_) => vec!["tasklog worktree list".to_string()],
        Error::NotARepo(_) => vec!["git init".to_string()],
        Error::InvalidConfig(_) => vec!["fix .tasklog.toml then retry".to_string()],
        _ => Vec::new(),
    }
}
