use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Auth,
    Network,
    Timeout,
    Corrupt,
    MissingRemote,
    Missing,
    Unknown,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Auth => "auth",
            ErrorClass::Network => "network",
            ErrorClass::Timeout => "timeout",
            ErrorClass::Corrupt => "corrupt",
            ErrorClass::MissingRemote => "missing_remote",
            ErrorClass::Missing => "missing",
            ErrorClass::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed external-tool step for one repository. Always carried as data in
/// the per-repository result; never propagated across a batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{class}: {message}")]
pub struct VcsError {
    pub class: ErrorClass,
    pub message: String,
}

impl VcsError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Timeout, message)
    }

    pub fn missing(path: &std::path::Path) -> Self {
        Self::new(
            ErrorClass::Missing,
            format!("path does not exist: {}", path.display()),
        )
    }

    /// Builds an error from a non-zero exit, classifying the tool's stderr.
    pub fn from_exit(command: &str, code: Option<i32>, stderr: &str) -> Self {
        let class = classify_stderr(stderr);
        let detail = first_meaningful_line(stderr);
        let message = match (code, detail) {
            (Some(code), Some(line)) => format!("git {command} exited with {code}: {line}"),
            (Some(code), None) => format!("git {command} exited with {code}"),
            (None, Some(line)) => format!("git {command} terminated by signal: {line}"),
            (None, None) => format!("git {command} terminated by signal"),
        };
        Self::new(class, message)
    }
}

/// Conditions that are fatal to a whole invocation.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("failed to load config {path}: {message}")]
    Config { path: PathBuf, message: String },
    #[error("failed to load inventory {path}: {message}")]
    Inventory { path: PathBuf, message: String },
    #[error("unsupported inventory version {0}")]
    InventoryVersion(u64),
    #[error("another fleet run holds the lock at {path} ({holder})")]
    LockHeld { path: PathBuf, holder: String },
    #[error("confirmation declined; nothing was changed")]
    ConfirmationDeclined,
    #[error("invalid glob pattern {pattern}: {message}")]
    Pattern { pattern: String, message: String },
}

const AUTH_MARKERS: &[&str] = &[
    "authentication failed",
    "permission denied",
    "could not read username",
    "could not read password",
    "terminal prompts disabled",
    "access denied",
    "host key verification failed",
    "the requested url returned error: 401",
    "the requested url returned error: 403",
    "invalid username or password",
];

const MISSING_REMOTE_MARKERS: &[&str] = &[
    "does not appear to be a git repository",
    "no such remote",
    "repository not found",
    "the requested url returned error: 404",
    "no remote repository specified",
];

const NETWORK_MARKERS: &[&str] = &[
    "could not resolve host",
    "could not resolve hostname",
    "connection timed out",
    "connection refused",
    "connection reset",
    "network is unreachable",
    "operation timed out",
    "unable to access",
    "the remote end hung up unexpectedly",
    "early eof",
    "failed to connect",
    "ssl certificate problem",
    "temporary failure in name resolution",
];

const CORRUPT_MARKERS: &[&str] = &[
    "not a git repository",
    "bad object",
    "corrupt",
    "object file",
    "is empty",
    "loose object",
    "unable to read tree",
    "bad config",
    "invalid gitfile format",
];

/// Maps the tool's error text onto the taxonomy. Order matters: an auth
/// failure message often also says "unable to access", and a missing remote
/// message contains "not a git repository"-like phrasing.
pub fn classify_stderr(stderr: &str) -> ErrorClass {
    let text = stderr.to_ascii_lowercase();
    if text.trim().is_empty() {
        return ErrorClass::Unknown;
    }
    let matches_any = |markers: &[&str]| markers.iter().any(|marker| text.contains(marker));
    if matches_any(AUTH_MARKERS) {
        ErrorClass::Auth
    } else if matches_any(MISSING_REMOTE_MARKERS) {
        ErrorClass::MissingRemote
    } else if matches_any(NETWORK_MARKERS) {
        ErrorClass::Network
    } else if matches_any(CORRUPT_MARKERS) {
        ErrorClass::Corrupt
    } else {
        ErrorClass::Unknown
    }
}

fn first_meaningful_line(stderr: &str) -> Option<&str> {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    lines
        .iter()
        .find(|line| line.starts_with("fatal:") || line.starts_with("error:"))
        .or_else(|| lines.first())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_auth_failures() {
        let stderr = "remote: Invalid username or password.\nfatal: Authentication failed for 'https://github.com/org/repo.git/'";
        assert_eq!(classify_stderr(stderr), ErrorClass::Auth);
        let stderr = "fatal: could not read Username for 'https://github.com': terminal prompts disabled";
        assert_eq!(classify_stderr(stderr), ErrorClass::Auth);
    }

    #[test]
    fn classifies_network_failures() {
        let stderr = "fatal: unable to access 'https://example.invalid/repo.git/': Could not resolve host: example.invalid";
        assert_eq!(classify_stderr(stderr), ErrorClass::Network);
    }

    #[test]
    fn classifies_missing_remote() {
        let stderr = "fatal: 'upstream' does not appear to be a git repository\nfatal: Could not read from remote repository.";
        assert_eq!(classify_stderr(stderr), ErrorClass::MissingRemote);
    }

    #[test]
    fn classifies_corrupt_repository() {
        let stderr = "fatal: not a git repository (or any of the parent directories): .git";
        assert_eq!(classify_stderr(stderr), ErrorClass::Corrupt);
    }

    #[test]
    fn unknown_for_empty_or_unrecognized() {
        assert_eq!(classify_stderr(""), ErrorClass::Unknown);
        assert_eq!(classify_stderr("something odd happened"), ErrorClass::Unknown);
    }

    #[test]
    fn from_exit_prefers_fatal_line() {
        let err = VcsError::from_exit(
            "fetch",
            Some(128),
            "warning: redirecting\nfatal: Authentication failed for 'x'\n",
        );
        assert_eq!(err.class, ErrorClass::Auth);
        assert_eq!(
            err.message,
            "git fetch exited with 128: fatal: Authentication failed for 'x'"
        );
    }

    #[test]
    fn error_class_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorClass::MissingRemote).unwrap();
        assert_eq!(json, "\"missing_remote\"");
    }
}
