//! Pull failure classification.
//!
//! The exit status only decides which patterns are tried first: git exits
//! 1 for ordinary failures (merge conflicts) and 128 for fatal ones
//! (missing remote, network). Which code a given failure uses has moved
//! between git releases, so the message patterns decide the result.

use serde::Serialize;

/// Why a pull did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullFailureKind {
    Conflict,
    NoRemote,
    Network,
    Other,
}

impl PullFailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PullFailureKind::Conflict => "conflict",
            PullFailureKind::NoRemote => "no-remote",
            PullFailureKind::Network => "network",
            PullFailureKind::Other => "other",
        }
    }

    /// Suggested next step for a human or agent.
    pub fn remediation(self) -> &'static str {
        match self {
            PullFailureKind::Conflict => "resolve the conflicting files, commit, then retry",
            PullFailureKind::NoRemote => "proceeding without pull",
            PullFailureKind::Network => "check connectivity and retry the pull",
            PullFailureKind::Other => "inspect the git output before retrying",
        }
    }
}

impl std::fmt::Display for PullFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    /// Exit 1: the command ran but could not complete.
    General,
    /// Exit 128: git refused before doing any work.
    Fatal,
    Unknown,
}

pub fn exit_class(code: Option<i32>) -> ExitClass {
    match code {
        Some(1) => ExitClass::General,
        Some(128) => ExitClass::Fatal,
        _ => ExitClass::Unknown,
    }
}

const CONFLICT_PATTERNS: &[&str] = &[
    "conflict",
    "automatic merge failed",
    "fix conflicts",
    "would be overwritten by merge",
    "you have unmerged files",
    "you have not concluded your merge",
];

const NO_REMOTE_PATTERNS: &[&str] = &[
    "does not appear to be a git repository",
    "no remote repository specified",
    "no such remote",
    "no configured push destination",
    "couldn't find remote ref",
    "there is no tracking information",
];

const NETWORK_PATTERNS: &[&str] = &[
    "could not resolve host",
    "could not resolve hostname",
    "temporary failure in name resolution",
    "connection refused",
    "connection timed out",
    "operation timed out",
    "network is unreachable",
    "connection reset",
    "failed to connect",
    "could not connect",
    "the remote end hung up unexpectedly",
    "early eof",
    "could not read from remote repository",
];

/// Classify a failed pull from its exit code and combined output.
pub fn classify_pull_failure(code: Option<i32>, output: &str) -> PullFailureKind {
    let text = output.to_lowercase();
    let order: [(PullFailureKind, &[&str]); 3] = match exit_class(code) {
        ExitClass::Fatal => [
            (PullFailureKind::NoRemote, NO_REMOTE_PATTERNS),
            (PullFailureKind::Network, NETWORK_PATTERNS),
            (PullFailureKind::Conflict, CONFLICT_PATTERNS),
        ],
        ExitClass::General | ExitClass::Unknown => [
            (PullFailureKind::Conflict, CONFLICT_PATTERNS),
            (PullFailureKind::NoRemote, NO_REMOTE_PATTERNS),
            (PullFailureKind::Network, NETWORK_PATTERNS),
        ],
    };

    for (kind, patterns) in order {
        if patterns.iter().any(|pattern| text.contains(pattern)) {
            return kind;
        }
    }

    tracing::warn!(code = ?code, output = %output.trim(), "unrecognized pull failure");
    PullFailureKind::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_from_stdout_marker() {
        let out = "Auto-merging src/lib.rs\nCONFLICT (content): Merge conflict in src/lib.rs\nAutomatic merge failed; fix conflicts and then commit the result.";
        assert_eq!(classify_pull_failure(Some(1), out), PullFailureKind::Conflict);
    }

    #[test]
    fn non_repository_remote_is_no_remote_even_with_read_error() {
        let out = "fatal: 'origin' does not appear to be a git repository\nfatal: Could not read from remote repository.\n\nPlease make sure you have the correct access rights\nand the repository exists.";
        assert_eq!(classify_pull_failure(Some(128), out), PullFailureKind::NoRemote);
        assert_eq!(classify_pull_failure(Some(1), out), PullFailureKind::NoRemote);
    }

    #[test]
    fn network_patterns() {
        for out in [
            "fatal: unable to access 'https://example.com/x.git/': Could not resolve host: example.com",
            "ssh: connect to host example.com port 22: Connection refused",
            "ssh: connect to host example.com port 22: Operation timed out",
        ] {
            assert_eq!(classify_pull_failure(Some(128), out), PullFailureKind::Network, "{out}");
        }
    }

    #[test]
    fn patterns_win_over_exit_class() {
        // Newer git reports some merge refusals as fatal.
        let out = "error: Your local changes to the following files would be overwritten by merge:\n\tREADME.md";
        assert_eq!(classify_pull_failure(Some(128), out), PullFailureKind::Conflict);
        assert_eq!(
            classify_pull_failure(Some(1), "fatal: couldn't find remote ref feature"),
            PullFailureKind::NoRemote
        );
    }

    #[test]
    fn unknown_output_is_other() {
        assert_eq!(
            classify_pull_failure(Some(128), "fatal: Need to specify how to reconcile divergent branches."),
            PullFailureKind::Other
        );
        assert_eq!(classify_pull_failure(None, ""), PullFailureKind::Other);
    }

    #[test]
    fn exit_classes() {
        assert_eq!(exit_class(Some(1)), ExitClass::General);
        assert_eq!(exit_class(Some(128)), ExitClass::Fatal);
        assert_eq!(exit_class(Some(2)), ExitClass::Unknown);
        assert_eq!(exit_class(None), ExitClass::Unknown);
    }
}
