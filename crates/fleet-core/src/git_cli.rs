use crate::context::TaskContext;
use crate::error::{ErrorClass, VcsError};
use crate::exec::{self, ExecError, ExecOutput, ExecRequest};
use crate::git_parse::{
    FIELD_SEP, parse_branch_tracking, parse_left_right, parse_porcelain, parse_probe,
    parse_remote_config,
};
use crate::model::{Head, Worktree};
use crate::vcs::{BranchTracking, RemoteConfig, RepoLayout, VcsBackend, VcsResult};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const FETCH_ARGS: &[&str] = &[
    "fetch",
    "--all",
    "--prune",
    "--prune-tags",
    "--no-recurse-submodules",
];
const NO_SUBMODULE_FETCH: &str = "fetch.recurseSubmodules=false";
const NO_SUBMODULE_RECURSE: &str = "submodule.recurse=false";
const STASH_MESSAGE: &str = "fleet autostash";

/// `VcsBackend` that drives the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("git"),
        }
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn request<I, S>(&self, cwd: Option<&Path>, args: I) -> ExecRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let mut request = ExecRequest::new(self.program.as_os_str())
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_OPTIONAL_LOCKS", "0")
            .env("LC_ALL", "C");
        if let Some(cwd) = cwd {
            request = request.cwd(cwd);
        }
        request
    }

    fn output<I, S>(
        &self,
        cwd: Option<&Path>,
        label: &str,
        args: I,
        task: &TaskContext,
    ) -> VcsResult<ExecOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let request = self.request(cwd, args);
        exec::run(&request, task).map_err(|err| exec_error(label, err))
    }

    /// Runs and requires a zero exit.
    fn run_ok<I, S>(
        &self,
        cwd: Option<&Path>,
        label: &str,
        args: I,
        task: &TaskContext,
    ) -> VcsResult<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let output = self.output(cwd, label, args, task)?;
        if !output.success() {
            return Err(VcsError::from_exit(label, output.code(), &output.stderr));
        }
        Ok(output.stdout)
    }
}

fn exec_error(label: &str, err: ExecError) -> VcsError {
    match err {
        ExecError::TimedOut { elapsed, .. } => {
            VcsError::timeout(format!("git {label} timed out after {elapsed:?}"))
        }
        ExecError::Cancelled { .. } => {
            VcsError::new(ErrorClass::Unknown, format!("git {label} cancelled"))
        }
        ExecError::Spawn { source, .. } => VcsError::new(
            ErrorClass::Unknown,
            format!("failed to run git {label}: {source}"),
        ),
        ExecError::Wait { source, .. } => VcsError::new(
            ErrorClass::Unknown,
            format!("failed to wait for git {label}: {source}"),
        ),
    }
}

impl VcsBackend for GitCli {
    fn name(&self) -> &'static str {
        "git"
    }

    fn probe(&self, path: &Path, task: &TaskContext) -> VcsResult<RepoLayout> {
        let stdout = self.run_ok(
            Some(path),
            "rev-parse",
            [
                "rev-parse",
                "--is-bare-repository",
                "--is-inside-work-tree",
                "--show-cdup",
            ],
            task,
        )?;
        let probe = parse_probe(&stdout).ok_or_else(|| {
            VcsError::new(
                ErrorClass::Corrupt,
                format!("unexpected rev-parse output: {}", stdout.trim()),
            )
        })?;
        if probe.bare {
            return Ok(RepoLayout { bare: true });
        }
        if !probe.inside_work_tree {
            return Err(VcsError::new(
                ErrorClass::Corrupt,
                format!("{} is not inside a work tree", path.display()),
            ));
        }
        if !probe.cdup.is_empty() {
            return Err(VcsError::new(
                ErrorClass::Corrupt,
                format!(
                    "{} is not a repository root (enclosing repository at {})",
                    path.display(),
                    probe.cdup
                ),
            ));
        }
        Ok(RepoLayout { bare: false })
    }

    fn remotes(&self, path: &Path, task: &TaskContext) -> VcsResult<RemoteConfig> {
        let output = self.output(
            Some(path),
            "config",
            ["config", "--get-regexp", r"^remote\."],
            task,
        )?;
        match output.code() {
            Some(0) => Ok(parse_remote_config(&output.stdout)),
            // Exit 1: no matching keys, i.e. no remotes configured.
            Some(1) => Ok(RemoteConfig::default()),
            code => Err(VcsError::from_exit("config", code, &output.stderr)),
        }
    }

    fn head(&self, path: &Path, task: &TaskContext) -> VcsResult<Head> {
        let output = self.output(
            Some(path),
            "symbolic-ref",
            ["symbolic-ref", "--quiet", "--short", "HEAD"],
            task,
        )?;
        match output.code() {
            Some(0) => Ok(Head {
                branch: Some(output.stdout.trim().to_string()),
                detached: false,
            }),
            Some(1) => Ok(Head {
                branch: None,
                detached: true,
            }),
            code => Err(VcsError::from_exit("symbolic-ref", code, &output.stderr)),
        }
    }

    fn worktree(&self, path: &Path, task: &TaskContext) -> VcsResult<Worktree> {
        let stdout = self.run_ok(
            Some(path),
            "status",
            [
                "status",
                "--porcelain=v1",
                "--untracked-files=normal",
                "--ignore-submodules=dirty",
            ],
            task,
        )?;
        Ok(parse_porcelain(&stdout))
    }

    fn has_submodules(&self, path: &Path, task: &TaskContext) -> VcsResult<bool> {
        let source: Vec<OsString> = if path.join(".gitmodules").is_file() {
            vec!["--file".into(), path.join(".gitmodules").into_os_string()]
        } else {
            vec!["--blob".into(), "HEAD:.gitmodules".into()]
        };
        let mut args: Vec<OsString> = vec!["config".into()];
        args.extend(source);
        args.extend([
            OsString::from("--name-only"),
            OsString::from("--get-regexp"),
            OsString::from(r"^submodule\..*\.path$"),
        ]);
        let output = self.output(Some(path), "config", args, task)?;
        // Non-zero covers both "no entries" and "no .gitmodules at HEAD".
        Ok(output.success() && !output.stdout.trim().is_empty())
    }

    fn branch_tracking(&self, path: &Path, task: &TaskContext) -> VcsResult<Vec<BranchTracking>> {
        let sep = format!("%{:02x}", FIELD_SEP as u32);
        let format = format!(
            "--format=%(refname:short){sep}%(upstream){sep}%(upstream:short){sep}%(upstream:track,nobracket)"
        );
        let stdout = self.run_ok(
            Some(path),
            "for-each-ref",
            ["for-each-ref".to_string(), format, "refs/heads".to_string()],
            task,
        )?;
        Ok(parse_branch_tracking(&stdout))
    }

    fn ahead_behind(
        &self,
        path: &Path,
        branch: &str,
        upstream_ref: &str,
        task: &TaskContext,
    ) -> VcsResult<(u32, u32)> {
        let range = format!("refs/heads/{branch}...{upstream_ref}");
        let stdout = self.run_ok(
            Some(path),
            "rev-list",
            ["rev-list", "--left-right", "--count", range.as_str()],
            task,
        )?;
        parse_left_right(&stdout).ok_or_else(|| {
            VcsError::new(
                ErrorClass::Unknown,
                format!("unexpected rev-list output: {}", stdout.trim()),
            )
        })
    }

    fn fetch_all(&self, path: &Path, task: &TaskContext) -> VcsResult<()> {
        let mut args = vec!["-c", NO_SUBMODULE_FETCH];
        args.extend_from_slice(FETCH_ARGS);
        info!(path = %path.display(), "fetching all remotes");
        self.run_ok(Some(path), "fetch", args, task)?;
        Ok(())
    }

    fn stash_push(&self, path: &Path, task: &TaskContext) -> VcsResult<bool> {
        let before = self.stash_depth(path, task)?;
        self.run_ok(
            Some(path),
            "stash",
            ["stash", "push", "--include-untracked", "-m", STASH_MESSAGE],
            task,
        )?;
        let after = self.stash_depth(path, task)?;
        Ok(after > before)
    }

    fn stash_pop(&self, path: &Path, task: &TaskContext) -> VcsResult<()> {
        self.run_ok(Some(path), "stash", ["stash", "pop"], task)?;
        Ok(())
    }

    fn rebase(&self, path: &Path, upstream: &str, task: &TaskContext) -> VcsResult<()> {
        let result = self.run_ok(
            Some(path),
            "rebase",
            ["-c", NO_SUBMODULE_RECURSE, "rebase", upstream],
            task,
        );
        if let Err(err) = result {
            warn!(path = %path.display(), error = %err, "rebase failed; aborting");
            // The abort gets its own budget so a timed-out rebase still unwinds.
            let abort_task = TaskContext::new(
                Some(std::time::Duration::from_secs(30)),
                crate::context::CancelToken::new(),
            );
            if let Err(abort_err) =
                self.run_ok(Some(path), "rebase", ["rebase", "--abort"], &abort_task)
            {
                debug!(error = %abort_err, "rebase --abort reported an error");
            }
            return Err(err);
        }
        Ok(())
    }

    fn push(&self, path: &Path, task: &TaskContext) -> VcsResult<()> {
        self.run_ok(
            Some(path),
            "push",
            ["-c", "push.recurseSubmodules=no", "push"],
            task,
        )?;
        Ok(())
    }

    fn clone_repo(
        &self,
        url: &str,
        path: &Path,
        mirror: bool,
        task: &TaskContext,
    ) -> VcsResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                VcsError::new(
                    ErrorClass::Unknown,
                    format!("create clone parent {}: {err}", parent.display()),
                )
            })?;
        }
        let mut args: Vec<OsString> = vec![
            "-c".into(),
            NO_SUBMODULE_RECURSE.into(),
            "clone".into(),
            "--no-recurse-submodules".into(),
        ];
        if mirror {
            args.push("--mirror".into());
        }
        args.push(url.into());
        args.push(path.as_os_str().to_os_string());
        info!(path = %path.display(), mirror, "cloning repo");
        self.run_ok(None, "clone", args, task)?;
        Ok(())
    }

    fn set_remote_url(
        &self,
        path: &Path,
        remote: &str,
        url: &str,
        task: &TaskContext,
    ) -> VcsResult<()> {
        self.run_ok(
            Some(path),
            "remote",
            ["remote", "set-url", remote, url],
            task,
        )?;
        Ok(())
    }
}

impl GitCli {
    fn stash_depth(&self, path: &Path, task: &TaskContext) -> VcsResult<usize> {
        let stdout = self.run_ok(Some(path), "stash", ["stash", "list"], task)?;
        Ok(stdout.lines().filter(|line| !line.trim().is_empty()).count())
    }
}
