use crate::config::default_audit_dir;
use anyhow::Context;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

const MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Append-only JSONL trail of what each invocation did, rotated by size
/// within one file per day.
#[derive(Clone, Debug)]
pub struct AuditLogger {
    session_id: String,
    base_dir: PathBuf,
    max_bytes: u64,
}

impl AuditLogger {
    pub fn new() -> anyhow::Result<Self> {
        Self::new_with_dir(default_audit_dir()?, MAX_BYTES)
    }

    pub fn new_with_dir(base_dir: PathBuf, max_bytes: u64) -> anyhow::Result<Self> {
        fs::create_dir_all(&base_dir).context("create audit dir")?;
        Ok(Self {
            session_id: Uuid::new_v4().to_string(),
            base_dir,
            max_bytes,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn record(
        &self,
        event: &str,
        status: AuditStatus,
        command: Option<&str>,
        details: Option<Value>,
        error: Option<&str>,
    ) -> anyhow::Result<String> {
        self.record_for_repo(event, status, command, None, details, error)
    }

    pub fn record_for_repo(
        &self,
        event: &str,
        status: AuditStatus,
        command: Option<&str>,
        repo: Option<AuditRepo<'_>>,
        details: Option<Value>,
        error: Option<&str>,
    ) -> anyhow::Result<String> {
        let ts = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .context("format timestamp")?;
        let audit_id = Uuid::new_v4().to_string();
        let entry = AuditEvent {
            ts,
            level: status.level(),
            event,
            audit_id: &audit_id,
            session_id: &self.session_id,
            status: status.as_str(),
            command,
            repo_id: repo.map(|repo| repo.repo_id),
            path: repo.map(|repo| repo.path.display().to_string()),
            error,
            details,
        };
        self.write_entry(&entry)?;
        Ok(audit_id)
    }

    fn write_entry(&self, entry: &AuditEvent<'_>) -> anyhow::Result<()> {
        let date = OffsetDateTime::now_utc()
            .format(&time::format_description::parse_borrowed::<2>("[year][month][day]")?)
            .context("format date")?;
        let path = next_audit_path(&self.base_dir, &date, self.max_bytes);
        let line = serde_json::to_string(entry).context("serialize audit entry")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open audit log {}", path.display()))?;
        writeln!(file, "{line}").context("write audit entry")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AuditStatus {
    Ok,
    Warning,
    Failed,
    Skipped,
}

impl AuditStatus {
    fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Ok => "ok",
            AuditStatus::Warning => "warning",
            AuditStatus::Failed => "failed",
            AuditStatus::Skipped => "skipped",
        }
    }

    fn level(&self) -> &'static str {
        match self {
            AuditStatus::Ok => "INFO",
            AuditStatus::Warning | AuditStatus::Skipped => "WARN",
            AuditStatus::Failed => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AuditRepo<'a> {
    pub repo_id: &'a str,
    pub path: &'a Path,
}

#[derive(Serialize)]
struct AuditEvent<'a> {
    ts: String,
    level: &'static str,
    event: &'a str,
    audit_id: &'a str,
    session_id: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    repo_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

fn next_audit_path(base_dir: &Path, date: &str, max_bytes: u64) -> PathBuf {
    let mut suffix = 0;
    loop {
        let name = if suffix == 0 {
            format!("audit-{date}.jsonl")
        } else {
            format!("audit-{date}-{suffix}.jsonl")
        };
        let path = base_dir.join(name);
        match fs::metadata(&path) {
            Ok(metadata) if metadata.len() >= max_bytes => suffix += 1,
            _ => return path,
        }
    }
}
