//! Process seam for the git driver.
//!
//! [`GitRunner`] is the only place a git process is spawned. [`SystemGit`]
//! shells out to the `git` executable; [`ScriptedGit`] answers from canned
//! outputs so classification and parsing can be exercised without a
//! repository.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::Result;

/// Captured result of one git invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GitOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout and stderr together; git reports merge conflicts on stdout.
    pub fn combined(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            ("", err) => err.to_string(),
            (out, "") => out.to_string(),
            (out, err) => format!("{err}\n{out}"),
        }
    }
}

pub trait GitRunner {
    /// Run `git <args>` in `dir`.
    ///
    /// A non-zero exit is reported through [`GitOutput`]; `Err` means the
    /// process could not be started at all.
    fn run(&self, dir: &Path, args: &[&str]) -> Result<GitOutput>;
}

impl<R: GitRunner + ?Sized> GitRunner for &R {
    fn run(&self, dir: &Path, args: &[&str]) -> Result<GitOutput> {
        (**self).run(dir, args)
    }
}

/// Runs the system `git` executable.
#[derive(Debug, Clone)]
pub struct SystemGit {
    program: PathBuf,
}

impl SystemGit {
    pub fn new() -> Self {
        Self::with_program("git")
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Build the process for one invocation. Output is forced to the C
    /// locale because callers match on git's English messages.
    fn command(&self, dir: &Path, args: &[&str]) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C")
            .env("LANGUAGE", "C");
        command
    }
}

impl Default for SystemGit {
    fn default() -> Self {
        Self::new()
    }
}

impl GitRunner for SystemGit {
    fn run(&self, dir: &Path, args: &[&str]) -> Result<GitOutput> {
        tracing::debug!(dir = %dir.display(), args = ?args, "running git");
        let output = self.command(dir, args).output()?;

        Ok(GitOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCall {
    pub dir: PathBuf,
    pub args: Vec<String>,
}

/// Fake runner answering from scripted responses.
///
/// Rules match when their args are a prefix of the invocation's args; the
/// first matching rule wins. Unmatched calls fail with exit code 1.
#[derive(Debug, Default)]
pub struct ScriptedGit {
    rules: Vec<(Vec<String>, GitOutput)>,
    calls: RefCell<Vec<GitCall>>,
}

impl ScriptedGit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, args: &[&str], output: GitOutput) -> Self {
        let prefix = args.iter().map(|arg| arg.to_string()).collect();
        self.rules.push((prefix, output));
        self
    }

    pub fn calls(&self) -> Vec<GitCall> {
        self.calls.borrow().clone()
    }

    /// Invocations rendered as `git`-style command lines.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(|call| call.args.join(" "))
            .collect()
    }
}

impl GitRunner for ScriptedGit {
    fn run(&self, dir: &Path, args: &[&str]) -> Result<GitOutput> {
        self.calls.borrow_mut().push(GitCall {
            dir: dir.to_path_buf(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        });

        let output = self
            .rules
            .iter()
            .find(|(prefix, _)| {
                prefix.len() <= args.len()
                    && prefix.iter().zip(args.iter()).all(|(want, got)| want == got)
            })
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| {
                GitOutput::failed(1, format!("unscripted git call: git {}", args.join(" ")))
            });
        Ok(output)
    }
}
