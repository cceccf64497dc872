use std::path::Path;

pub const LOCAL_PREFIX: &str = "local:";

/// Reduces a remote URL to `host/path`: scheme, credentials and port are
/// dropped, the host is lowercased, trailing `/` and `.git` are stripped.
/// scp-style `user@host:path` is accepted. Local paths are only trimmed.
pub fn normalize_remote_url(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() {
        return String::new();
    }

    let (rest, had_scheme) = match url.find("://") {
        Some(idx) => (&url[idx + 3..], true),
        None => (url, false),
    };
    if url.starts_with("file://") {
        return trim_repo_suffix(rest).to_string();
    }

    if !had_scheme && !is_scp_like(rest) {
        return trim_repo_suffix(rest).to_string();
    }

    let (authority, path) = if had_scheme {
        match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx + 1..]),
            None => (rest, ""),
        }
    } else {
        match rest.find(':') {
            Some(idx) => (&rest[..idx], &rest[idx + 1..]),
            None => (rest, ""),
        }
    };

    let host = authority
        .rsplit_once('@')
        .map(|(_, host)| host)
        .unwrap_or(authority);
    let host = strip_port(host).to_ascii_lowercase();
    let path = trim_repo_suffix(path.trim_start_matches('/'));

    if path.is_empty() {
        host
    } else {
        format!("{host}/{path}")
    }
}

/// Identifier used as the cross-machine join key.
pub fn repo_id_for(remote_url: Option<&str>, path: &Path) -> String {
    match remote_url.map(normalize_remote_url) {
        Some(normalized) if !normalized.is_empty() => normalized,
        _ => local_repo_id(path),
    }
}

pub fn local_repo_id(path: &Path) -> String {
    format!("{LOCAL_PREFIX}{}", path.display())
}

pub fn is_local_id(repo_id: &str) -> bool {
    repo_id.starts_with(LOCAL_PREFIX)
}

fn is_scp_like(value: &str) -> bool {
    // `host:path` without a scheme; a Windows drive letter is not a host.
    let Some(colon) = value.find(':') else {
        return false;
    };
    let before = &value[..colon];
    if before.len() == 1 && before.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return false;
    }
    !before.is_empty() && !before.contains('/') && !before.contains('\\')
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|ch| ch.is_ascii_digit()) => name,
        _ => host,
    }
}

fn trim_repo_suffix(path: &str) -> &str {
    let mut trimmed = path.trim_end_matches('/');
    loop {
        let next = trimmed
            .strip_suffix(".git")
            .unwrap_or(trimmed)
            .trim_end_matches('/');
        if next == trimmed {
            return trimmed;
        }
        trimmed = next;
    }
}
