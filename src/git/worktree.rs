//! Worktree listing, main-repository resolution and naming.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};

/// One entry of `git worktree list --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<String>,
    /// Short branch name (`refs/heads/` stripped).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub detached: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub bare: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub locked: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub prunable: bool,
}

impl WorktreeEntry {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            head: None,
            branch: None,
            detached: false,
            bare: false,
            locked: false,
            prunable: false,
        }
    }
}

/// Parse the porcelain listing: attribute lines, blank line between entries.
pub fn parse_porcelain(output: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    let mut current: Option<WorktreeEntry> = None;

    for line in output.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            entries.extend(current.take());
            continue;
        }
        let (key, value) = match line.split_once(' ') {
            Some((key, value)) => (key, Some(value)),
            None => (line, None),
        };
        if key == "worktree" {
            entries.extend(current.take());
            current = value.map(|path| WorktreeEntry::new(PathBuf::from(path)));
            continue;
        }
        let Some(entry) = current.as_mut() else {
            continue;
        };
        match key {
            "HEAD" => entry.head = value.map(str::to_string),
            "branch" => entry.branch = value.map(short_branch),
            "detached" => entry.detached = true,
            "bare" => entry.bare = true,
            "locked" => entry.locked = true,
            "prunable" => entry.prunable = true,
            _ => {}
        }
    }
    entries.extend(current);
    entries
}

/// Strip `refs/heads/` from a branch ref.
pub fn short_branch(name: &str) -> String {
    name.trim()
        .strip_prefix("refs/heads/")
        .unwrap_or(name.trim())
        .to_string()
}

/// Where a directory sits relative to its repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLocation {
    /// Root of the working tree containing the directory.
    pub worktree_root: PathBuf,
    /// Root of the main repository.
    pub main_root: PathBuf,
    /// Whether `worktree_root` is a secondary worktree.
    pub secondary: bool,
}

/// Locate the working tree and main repository for `dir`.
///
/// A `.git` directory marks a main checkout. A `.git` file holding a
/// `gitdir:` redirect marks a secondary worktree; the main repository is
/// found through the `commondir` file of the redirect target.
pub fn locate_repo(dir: &Path) -> Result<RepoLocation> {
    let start = absolute(dir)?;
    for candidate in start.ancestors() {
        let marker = candidate.join(".git");
        let Ok(meta) = fs::metadata(&marker) else {
            continue;
        };
        if meta.is_dir() {
            return Ok(RepoLocation {
                worktree_root: candidate.to_path_buf(),
                main_root: candidate.to_path_buf(),
                secondary: false,
            });
        }
        let gitdir = read_gitdir_redirect(&marker)?;
        let main_root = main_root_from_gitdir(&gitdir);
        let secondary = main_root.is_some();
        return Ok(RepoLocation {
            worktree_root: candidate.to_path_buf(),
            main_root: main_root.unwrap_or_else(|| candidate.to_path_buf()),
            secondary,
        });
    }
    Err(Error::NotARepo(start))
}

/// Main repository root for any directory inside a checkout or worktree.
pub fn main_repo_root(dir: &Path) -> Result<PathBuf> {
    Ok(locate_repo(dir)?.main_root)
}

pub fn is_secondary_worktree(dir: &Path) -> Result<bool> {
    Ok(locate_repo(dir)?.secondary)
}

fn read_gitdir_redirect(marker: &Path) -> Result<PathBuf> {
    let content = fs::read_to_string(marker)?;
    let target = content
        .lines()
        .find_map(|line| line.trim().strip_prefix("gitdir:"))
        .map(str::trim)
        .filter(|target| !target.is_empty())
        .ok_or_else(|| {
            Error::OperationFailed(format!(
                "{} has no gitdir redirect",
                marker.display()
            ))
        })?;

    let target = PathBuf::from(target);
    let base = marker.parent().unwrap_or(Path::new("."));
    Ok(normalize(&if target.is_absolute() {
        target
    } else {
        base.join(target)
    }))
}

/// Resolve `<main>/.git/worktrees/<name>` back to `<main>`.
///
/// Returns `None` when the gitdir is not a linked-worktree admin directory
/// (for example a submodule's separate git dir).
fn main_root_from_gitdir(gitdir: &Path) -> Option<PathBuf> {
    let common = fs::read_to_string(gitdir.join("commondir"))
        .ok()
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .map(|content| {
            let common = PathBuf::from(content);
            if common.is_absolute() {
                normalize(&common)
            } else {
                normalize(&gitdir.join(common))
            }
        })
        .or_else(|| {
            let worktrees = gitdir.parent()?;
            if worktrees.file_name()? == "worktrees" {
                worktrees.parent().map(Path::to_path_buf)
            } else {
                None
            }
        })?;

    if common.file_name().map(|name| name == ".git").unwrap_or(false) {
        common.parent().map(Path::to_path_buf)
    } else {
        // Bare common dir: the repository root is the common dir itself.
        Some(common)
    }
}

fn absolute(dir: &Path) -> Result<PathBuf> {
    if dir.is_absolute() {
        Ok(normalize(dir))
    } else {
        Ok(normalize(&std::env::current_dir()?.join(dir)))
    }
}

/// Lexically resolve `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Compare paths, resolving symlinks when both exist.
pub fn same_path(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => normalize(a) == normalize(b),
    }
}

/// Lowercase, dash-separated slug of at most `word_limit` words.
///
/// Whitespace, `-` and `_` separate words; other non-alphanumeric
/// characters are dropped.
pub fn slugify(title: &str, word_limit: usize) -> String {
    let cleaned: String = title
        .to_lowercase()
        .chars()
        .filter_map(|ch| {
            if ch.is_alphanumeric() {
                Some(ch)
            } else if ch.is_whitespace() || ch == '-' || ch == '_' {
                Some(' ')
            } else {
                None
            }
        })
        .collect();
    cleaned
        .split_whitespace()
        .take(word_limit)
        .collect::<Vec<_>>()
        .join("-")
}

/// Sibling directory for a task's worktree: `<parent>/<project>-<id>-<slug>`.
pub fn worktree_path(project_dir: &Path, title: &str, id: u64, word_limit: usize) -> PathBuf {
    let project_dir = normalize(project_dir);
    let project = project_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());
    let parent = project_dir
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| project_dir.clone());

    let slug = slugify(title, word_limit);
    let name = if slug.is_empty() {
        format!("{project}-{id}")
    } else {
        format!("{project}-{id}-{slug}")
    };
    parent.join(name)
}

/// Branch for a task: `<prefix>/<id>-<slug>`.
pub fn branch_name(prefix: &str, title: &str, id: u64, word_limit: usize) -> String {
    let slug = slugify(title, word_limit);
    let prefix = prefix.trim().trim_end_matches('/');
    if slug.is_empty() {
        format!("{prefix}/{id}")
    } else {
        format!("{prefix}/{id}-{slug}")
    }
}
